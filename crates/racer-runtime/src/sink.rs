//! Telemetry sinks.
//!
//! The drive loop hands each aggregated [`TelemetryReport`] to a
//! [`TelemetrySink`] and never waits for an acknowledgement.  Writing to a
//! file or socket belongs off the control path: wrap the real sink in a
//! [`ForwardingSink`], which queues a bounded number of reports onto a
//! writer thread.

use std::io::Write;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use racer_types::{RacerError, TelemetryReport};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::ratelimit::LogThrottle;

/// Destination for per-iteration reports.
pub trait TelemetrySink: Send {
    /// Accept one report.
    ///
    /// # Errors
    ///
    /// Returns [`RacerError::Telemetry`] when the report could not be taken.
    /// The loop logs the failure and carries on.
    fn emit(&mut self, report: TelemetryReport) -> Result<(), RacerError>;

    fn flush(&mut self) -> Result<(), RacerError> {
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Memory sink
// ────────────────────────────────────────────────────────────────────────────

/// Keeps every report in a shared buffer.  Clones share the buffer, so a
/// handle kept by the caller sees what the loop emitted.
#[derive(Debug, Clone, Default)]
pub struct MemorySink(Arc<Mutex<Vec<TelemetryReport>>>);

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<TelemetryReport> {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TelemetrySink for MemorySink {
    fn emit(&mut self, report: TelemetryReport) -> Result<(), RacerError> {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).push(report);
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// JSON lines
// ────────────────────────────────────────────────────────────────────────────

/// One JSON object per line.
pub struct JsonLinesSink<W: Write + Send> {
    writer: W,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> TelemetrySink for JsonLinesSink<W> {
    fn emit(&mut self, report: TelemetryReport) -> Result<(), RacerError> {
        serde_json::to_writer(&mut self.writer, &report)
            .map_err(|e| RacerError::Telemetry(format!("serialize frame {}: {e}", report.frame)))?;
        self.writer
            .write_all(b"\n")
            .map_err(|e| RacerError::Telemetry(e.to_string()))
    }

    fn flush(&mut self) -> Result<(), RacerError> {
        self.writer
            .flush()
            .map_err(|e| RacerError::Telemetry(e.to_string()))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Null sink
// ────────────────────────────────────────────────────────────────────────────

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl TelemetrySink for NullSink {
    fn emit(&mut self, _report: TelemetryReport) -> Result<(), RacerError> {
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Forwarding sink
// ────────────────────────────────────────────────────────────────────────────

/// Reports the writer thread may hold before [`ForwardingSink::emit`]
/// starts dropping.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

enum Message {
    Report(TelemetryReport),
    Flush(oneshot::Sender<()>),
}

/// Queues reports onto a bounded channel drained by a dedicated writer
/// thread.  `emit` never blocks: when the writer falls behind and the queue
/// is full, the report is dropped and counted.  Reports that are queued
/// reach the inner sink in the order they were emitted.
pub struct ForwardingSink {
    tx: Option<mpsc::Sender<Message>>,
    writer: Option<JoinHandle<()>>,
    dropped: u64,
    throttle: LogThrottle,
}

impl ForwardingSink {
    /// Start the writer thread in front of `inner` with
    /// [`DEFAULT_QUEUE_CAPACITY`].
    ///
    /// # Errors
    ///
    /// Returns [`RacerError::FatalInit`] if the thread cannot be spawned.
    pub fn spawn(inner: Box<dyn TelemetrySink>) -> Result<Self, RacerError> {
        Self::with_capacity(inner, DEFAULT_QUEUE_CAPACITY)
    }

    /// Like [`spawn`](Self::spawn) with an explicit queue capacity (at
    /// least 1).
    pub fn with_capacity(
        inner: Box<dyn TelemetrySink>,
        capacity: usize,
    ) -> Result<Self, RacerError> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let dispatch = tracing::dispatcher::get_default(|current| current.clone());
        let writer = thread::Builder::new()
            .name("telemetry-writer".to_string())
            .spawn(move || tracing::dispatcher::with_default(&dispatch, || drain(rx, inner)))
            .map_err(|e| RacerError::init("telemetry", format!("spawn writer thread: {e}")))?;
        Ok(Self {
            tx: Some(tx),
            writer: Some(writer),
            dropped: 0,
            throttle: LogThrottle::default(),
        })
    }

    /// Reports discarded because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Stop accepting reports, wait for the writer to drain the queue, and
    /// flush the inner sink.
    pub fn close(&mut self) {
        self.tx.take();
        if let Some(writer) = self.writer.take() {
            if writer.join().is_err() {
                warn!("telemetry writer thread panicked");
            }
        }
        if self.dropped > 0 {
            debug!(dropped = self.dropped, "telemetry queue overflowed during run");
        }
    }

    fn sender(&self) -> Result<&mpsc::Sender<Message>, RacerError> {
        self.tx
            .as_ref()
            .ok_or_else(|| RacerError::Telemetry("sink is closed".to_string()))
    }
}

fn drain(mut rx: mpsc::Receiver<Message>, mut inner: Box<dyn TelemetrySink>) {
    let mut throttle = LogThrottle::default();
    let mut written = 0u64;
    while let Some(message) = rx.blocking_recv() {
        match message {
            Message::Report(report) => {
                let frame = report.frame;
                match inner.emit(report) {
                    Ok(()) => written += 1,
                    Err(e) => {
                        if let Some(suppressed) = throttle.admit() {
                            warn!(frame, suppressed, error = %e, "telemetry write failed");
                        }
                    }
                }
            }
            Message::Flush(done) => {
                if let Err(e) = inner.flush() {
                    warn!(error = %e, "telemetry flush failed");
                }
                let _ = done.send(());
            }
        }
    }
    if let Err(e) = inner.flush() {
        warn!(error = %e, "telemetry flush failed");
    }
    debug!(written, "telemetry writer finished");
}

impl TelemetrySink for ForwardingSink {
    fn emit(&mut self, report: TelemetryReport) -> Result<(), RacerError> {
        let frame = report.frame;
        let sent = self.sender()?.try_send(Message::Report(report));
        match sent {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.dropped += 1;
                if let Some(suppressed) = self.throttle.admit() {
                    warn!(
                        frame,
                        suppressed,
                        dropped = self.dropped,
                        "telemetry queue full, report dropped"
                    );
                }
                Ok(())
            }
            Err(TrySendError::Closed(_)) => {
                Err(RacerError::Telemetry("telemetry writer has stopped".to_string()))
            }
        }
    }

    /// Wait until everything queued so far has reached the inner sink, then
    /// flush it.  The sink stays open.
    fn flush(&mut self) -> Result<(), RacerError> {
        let (done, ack) = oneshot::channel();
        self.sender()?
            .blocking_send(Message::Flush(done))
            .map_err(|_| RacerError::Telemetry("telemetry writer has stopped".to_string()))?;
        ack.blocking_recv()
            .map_err(|_| RacerError::Telemetry("telemetry writer has stopped".to_string()))
    }
}

impl Drop for ForwardingSink {
    fn drop(&mut self) {
        self.close();
    }
}
