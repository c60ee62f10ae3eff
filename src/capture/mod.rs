//! Polling capture worker

mod sink;
mod stats;

pub use sink::{CaptureEvent, ChannelSink, FrameSink, StopSignal};
pub use stats::CaptureStats;

use crate::camera::{CameraHandle, DeviceError};
use crate::frame::{Frame, PixelFormat};
use crate::geometry::FrameGeometry;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, trace, warn};

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("camera read failed: {0}")]
    Device(#[from] DeviceError),

    #[error("frame size mismatch: expected {expected} bytes, got {actual}")]
    FrameSizeMismatch { expected: usize, actual: usize },

    #[error("failed to spawn capture thread: {0}")]
    Spawn(std::io::Error),

    #[error("capture thread panicked")]
    WorkerPanicked,
}

/// What the worker does after a failed frame read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorPolicy {
    /// Report the error and terminate
    #[default]
    Halt,

    /// Report the error and keep polling
    Continue,
}

/// Worker timing and error handling
#[derive(Debug, Clone)]
pub struct CaptureSettings {
    /// Bound on each capture lock attempt; also the worst-case latency for
    /// noticing a termination request (plus any in-flight capture)
    pub lock_timeout: Duration,

    pub on_error: ErrorPolicy,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_millis(100),
            on_error: ErrorPolicy::Halt,
        }
    }
}

/// Lifecycle of a capture worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Running,
    Terminated,
}

impl WorkerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => WorkerState::Idle,
            1 => WorkerState::Running,
            _ => WorkerState::Terminated,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            WorkerState::Idle => 0,
            WorkerState::Running => 1,
            WorkerState::Terminated => 2,
        }
    }
}

/// Outcome of a finished capture loop
#[derive(Debug)]
pub struct WorkerReport {
    pub state: WorkerState,
    pub stats: CaptureStats,

    /// Error that stopped the worker under [`ErrorPolicy::Halt`]
    pub error: Option<CaptureError>,
}

/// State shared between a worker and its handles
#[derive(Debug)]
pub(crate) struct WorkerControl {
    terminate: AtomicBool,
    capturing: AtomicBool,
    state: AtomicU8,
    frames_captured: AtomicU64,
    lock_timeouts: AtomicU64,
    capture_errors: AtomicU64,
}

impl WorkerControl {
    fn new() -> Self {
        Self {
            terminate: AtomicBool::new(false),
            capturing: AtomicBool::new(false),
            state: AtomicU8::new(WorkerState::Idle.as_u8()),
            frames_captured: AtomicU64::new(0),
            lock_timeouts: AtomicU64::new(0),
            capture_errors: AtomicU64::new(0),
        }
    }

    fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: WorkerState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    fn terminate(&self) {
        self.terminate.store(true, Ordering::Release);
    }

    pub(crate) fn is_terminating(&self) -> bool {
        self.terminate.load(Ordering::Acquire)
    }

    fn stats(&self) -> CaptureStats {
        CaptureStats {
            frames_captured: self.frames_captured.load(Ordering::Relaxed),
            lock_timeouts: self.lock_timeouts.load(Ordering::Relaxed),
            capture_errors: self.capture_errors.load(Ordering::Relaxed),
            is_running: self.state() == WorkerState::Running,
        }
    }
}

/// Pulls raw frames from a shared camera and publishes them to a sink.
///
/// Geometry and pixel format are fixed at construction; a different size
/// needs a new worker. The camera mutex is the capture lock: it is held for
/// the whole read-convert-publish sequence and released between frames.
pub struct CaptureWorker<C: CameraHandle> {
    camera: Arc<Mutex<C>>,
    geometry: FrameGeometry,
    format: PixelFormat,
    settings: CaptureSettings,
    control: Arc<WorkerControl>,
}

impl<C: CameraHandle> CaptureWorker<C> {
    pub fn new(
        camera: Arc<Mutex<C>>,
        geometry: FrameGeometry,
        format: PixelFormat,
        settings: CaptureSettings,
    ) -> Self {
        Self {
            camera,
            geometry,
            format,
            settings,
            control: Arc::new(WorkerControl::new()),
        }
    }

    pub fn geometry(&self) -> FrameGeometry {
        self.geometry
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn state(&self) -> WorkerState {
        self.control.state()
    }

    pub fn stats(&self) -> CaptureStats {
        self.control.stats()
    }

    /// True while a frame is being read and published
    pub fn is_capturing(&self) -> bool {
        self.control.capturing.load(Ordering::Acquire)
    }

    /// Requests termination; takes effect before the next lock attempt.
    /// The request cannot be withdrawn.
    pub fn terminate(&self) {
        self.control.terminate();
    }

    /// Runs the polling loop on the calling thread until terminated
    pub fn run<S: FrameSink + ?Sized>(&self, sink: &mut S) -> WorkerReport {
        if self.control.is_terminating() {
            self.control.set_state(WorkerState::Terminated);
            debug!("Termination requested before start, not capturing");
            return self.report(None);
        }

        if self
            .control
            .state
            .compare_exchange(
                WorkerState::Idle.as_u8(),
                WorkerState::Running.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            warn!(state = ?self.state(), "Capture worker cannot be restarted");
            return self.report(None);
        }

        sink.attach(StopSignal::new(Arc::clone(&self.control)));

        info!(
            geometry = %self.geometry,
            format = ?self.format,
            lock_timeout_ms = %self.settings.lock_timeout.as_millis(),
            "Capture worker started"
        );

        let mut sequence = 0u64;
        let mut fatal = None;

        while !self.control.is_terminating() {
            let mut camera = match self.camera.try_lock_for(self.settings.lock_timeout) {
                Some(guard) => guard,
                None => {
                    self.control.lock_timeouts.fetch_add(1, Ordering::Relaxed);
                    trace!("Capture lock busy, retrying");
                    continue;
                }
            };

            // Termination may have been requested while waiting for the lock
            if self.control.is_terminating() {
                break;
            }

            self.control.capturing.store(true, Ordering::Release);
            let result = self.capture_frame(&mut *camera, sequence);

            let failed = match result {
                Ok(frame) => {
                    sink.on_frame(frame);
                    self.control.frames_captured.fetch_add(1, Ordering::Relaxed);
                    sequence += 1;
                    false
                }
                Err(e) => {
                    self.control.capture_errors.fetch_add(1, Ordering::Relaxed);
                    sink.on_error(&e);
                    match self.settings.on_error {
                        ErrorPolicy::Halt => {
                            error!(error = %e, "Capture failed, stopping worker");
                            fatal = Some(e);
                        }
                        ErrorPolicy::Continue => {
                            warn!(error = %e, "Capture failed, continuing");
                        }
                    }
                    true
                }
            };

            self.control.capturing.store(false, Ordering::Release);
            drop(camera);

            if fatal.is_some() || self.control.is_terminating() {
                break;
            }
            if failed {
                // Back off outside the lock before retrying a failing device
                thread::sleep(self.settings.lock_timeout);
            }
        }

        self.control.set_state(WorkerState::Terminated);

        let report = self.report(fatal);
        info!(
            frames = %report.stats.frames_captured,
            lock_timeouts = %report.stats.lock_timeouts,
            errors = %report.stats.capture_errors,
            "Capture worker stopped"
        );
        report
    }

    /// Runs the polling loop on a dedicated thread
    pub fn spawn<S>(self, mut sink: S) -> Result<WorkerHandle, CaptureError>
    where
        S: FrameSink + 'static,
    {
        let control = Arc::clone(&self.control);
        let thread = thread::Builder::new()
            .name("sf-camera-capture".to_string())
            .spawn(move || self.run(&mut sink))
            .map_err(CaptureError::Spawn)?;

        Ok(WorkerHandle {
            control,
            thread: Some(thread),
        })
    }

    fn capture_frame(&self, camera: &mut C, sequence: u64) -> Result<Frame, CaptureError> {
        let raw = camera.get_raw_image()?;

        let expected = self.geometry.frame_len(self.format);
        if raw.len() != expected {
            return Err(CaptureError::FrameSizeMismatch {
                expected,
                actual: raw.len(),
            });
        }

        Ok(Frame::new(raw, self.geometry, self.format, sequence))
    }

    fn report(&self, error: Option<CaptureError>) -> WorkerReport {
        WorkerReport {
            state: self.state(),
            stats: self.stats(),
            error,
        }
    }
}

impl<C: CameraHandle> Drop for CaptureWorker<C> {
    fn drop(&mut self) {
        self.control.terminate();
        self.control.set_state(WorkerState::Terminated);
    }
}

/// Handle to a worker running on its own thread.
///
/// Dropping the handle requests termination without waiting for the thread.
pub struct WorkerHandle {
    control: Arc<WorkerControl>,
    thread: Option<JoinHandle<WorkerReport>>,
}

impl WorkerHandle {
    pub fn terminate(&self) {
        self.control.terminate();
    }

    pub fn state(&self) -> WorkerState {
        self.control.state()
    }

    pub fn stats(&self) -> CaptureStats {
        self.control.stats()
    }

    pub fn is_capturing(&self) -> bool {
        self.control.capturing.load(Ordering::Acquire)
    }

    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, |t| t.is_finished())
    }

    /// Waits for the worker thread to exit
    pub fn join(mut self) -> Result<WorkerReport, CaptureError> {
        match self.thread.take() {
            Some(thread) => thread.join().map_err(|_| CaptureError::WorkerPanicked),
            None => Err(CaptureError::WorkerPanicked),
        }
    }

    /// Requests termination and waits for the worker thread to exit
    pub fn stop(self) -> Result<WorkerReport, CaptureError> {
        self.terminate();
        self.join()
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.control.terminate();
    }
}
