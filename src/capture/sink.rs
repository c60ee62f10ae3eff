//! Subscribers for captured frames

use super::{CaptureError, WorkerControl};
use crate::frame::Frame;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

/// Poll interval while a full channel waits for its receiver
const SEND_RETRY: Duration = Duration::from_millis(5);

/// Tells a sink whether its worker has been asked to terminate
#[derive(Debug, Clone)]
pub struct StopSignal {
    control: Arc<WorkerControl>,
}

impl StopSignal {
    pub(crate) fn new(control: Arc<WorkerControl>) -> Self {
        Self { control }
    }

    pub fn is_requested(&self) -> bool {
        self.control.is_terminating()
    }
}

/// Receives the output of a capture worker.
///
/// Called on the worker thread while the capture lock is held: exactly one
/// `on_frame` per captured frame, in capture order.
pub trait FrameSink: Send {
    /// Called once when the worker starts running, before any frame
    fn attach(&mut self, _stop: StopSignal) {}

    fn on_frame(&mut self, frame: Frame);

    fn on_error(&mut self, error: &CaptureError) {
        warn!(error = %error, "Frame capture failed");
    }
}

impl<F> FrameSink for F
where
    F: FnMut(Frame) + Send,
{
    fn on_frame(&mut self, frame: Frame) {
        self(frame)
    }
}

/// Event delivered through a [`ChannelSink`]
#[derive(Debug)]
pub enum CaptureEvent {
    Frame(Frame),
    Error(String),
}

/// Forwards capture events into a tokio channel.
///
/// Sends wait while the channel is full, so no frame is dropped while a
/// receiver drains it. Once the worker is asked to terminate, an event that
/// does not fit is dropped instead, so a stalled receiver cannot keep the
/// worker alive. Must not be driven from inside an async context.
pub struct ChannelSink {
    tx: mpsc::Sender<CaptureEvent>,
    stop: Option<StopSignal>,
    undelivered: u64,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<CaptureEvent>) -> Self {
        Self {
            tx,
            stop: None,
            undelivered: 0,
        }
    }

    /// Creates a sink together with its receiving end
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<CaptureEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }

    /// Events dropped because the receiver was gone or the worker was
    /// terminating
    pub fn undelivered(&self) -> u64 {
        self.undelivered
    }

    fn send(&mut self, event: CaptureEvent) {
        let stop = match &self.stop {
            Some(stop) => stop,
            None => {
                if self.tx.blocking_send(event).is_err() {
                    self.undelivered += 1;
                    debug!(undelivered = %self.undelivered, "Capture event receiver closed");
                }
                return;
            }
        };

        let mut event = event;
        loop {
            match self.tx.try_send(event) {
                Ok(()) => return,
                Err(TrySendError::Closed(_)) => {
                    self.undelivered += 1;
                    debug!(undelivered = %self.undelivered, "Capture event receiver closed");
                    return;
                }
                Err(TrySendError::Full(returned)) => {
                    if stop.is_requested() {
                        self.undelivered += 1;
                        debug!(undelivered = %self.undelivered, "Dropping capture event, worker terminating");
                        return;
                    }
                    event = returned;
                    thread::sleep(SEND_RETRY);
                }
            }
        }
    }
}

impl FrameSink for ChannelSink {
    fn attach(&mut self, stop: StopSignal) {
        self.stop = Some(stop);
    }

    fn on_frame(&mut self, frame: Frame) {
        self.send(CaptureEvent::Frame(frame));
    }

    fn on_error(&mut self, error: &CaptureError) {
        self.send(CaptureEvent::Error(error.to_string()));
    }
}
