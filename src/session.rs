//! Camera session: hardware setup and ownership of the capture worker

use crate::camera::{CameraHandle, ColorMode, DeviceError};
use crate::capture::{
    CaptureError, CaptureSettings, CaptureStats, CaptureWorker, FrameSink, WorkerHandle,
    WorkerReport, WorkerState,
};
use crate::frame::PixelFormat;
use crate::geometry::{FrameGeometry, GeometryError};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Hardware step of [`CameraSession::setup`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupStep {
    ResetCamera,
    SelectColorMode,
    ResetCounts,
}

impl fmt::Display for SetupStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SetupStep::ResetCamera => "camera reset",
            SetupStep::SelectColorMode => "colour mode selection",
            SetupStep::ResetCounts => "counter reset",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum SetupError {
    #[error("{step} failed: {source}")]
    Device {
        step: SetupStep,
        #[source]
        source: DeviceError,
    },

    #[error("invalid frame geometry: {0}")]
    Geometry(#[from] GeometryError),

    #[error("capture lock not acquired within {0:?}")]
    LockTimeout(Duration),
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("session has not been set up")]
    NotSetUp,

    #[error("capture worker already running")]
    AlreadyRunning,

    #[error(transparent)]
    Capture(#[from] CaptureError),
}

/// Session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Colour mode applied by the next `setup`
    pub color_mode: ColorMode,

    /// Wait after the counter reset before reading geometry
    pub settle_delay: Duration,

    /// Bound on acquiring the capture lock during setup
    pub setup_lock_timeout: Duration,

    pub capture: CaptureSettings,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            color_mode: ColorMode::Rgb,
            settle_delay: Duration::from_millis(500),
            setup_lock_timeout: Duration::from_secs(1),
            capture: CaptureSettings::default(),
        }
    }
}

/// Owns a camera behind the capture lock and at most one capture worker.
///
/// Geometry is only available after a successful [`setup`](Self::setup).
/// A failed setup leaves the hardware in whatever state the failing step
/// reached.
pub struct CameraSession<C: CameraHandle> {
    camera: Arc<Mutex<C>>,
    config: SessionConfig,
    format: PixelFormat,
    geometry: Option<FrameGeometry>,
    worker: Option<CaptureWorker<C>>,
    running: Option<WorkerHandle>,
}

impl<C: CameraHandle> CameraSession<C> {
    pub fn new(camera: C, config: SessionConfig) -> Self {
        let format = PixelFormat::from(config.color_mode);
        Self {
            camera: Arc::new(Mutex::new(camera)),
            config,
            format,
            geometry: None,
            worker: None,
            running: None,
        }
    }

    /// Resets the camera, selects the colour mode, clears the counters, waits
    /// for the hardware to settle, resolves the frame geometry and builds a
    /// new capture worker. Any existing worker is stopped first.
    pub fn setup(&mut self) -> Result<FrameGeometry, SetupError> {
        self.shutdown_worker();
        self.geometry = None;

        let mode = self.config.color_mode;
        let format = PixelFormat::from(mode);

        let geometry = {
            let mut camera = self
                .camera
                .try_lock_for(self.config.setup_lock_timeout)
                .ok_or(SetupError::LockTimeout(self.config.setup_lock_timeout))?;

            info!(color_mode = ?mode, "Setting up camera");

            camera.reset_camera().map_err(|source| SetupError::Device {
                step: SetupStep::ResetCamera,
                source,
            })?;
            camera
                .set_color_mode(mode)
                .map_err(|source| SetupError::Device {
                    step: SetupStep::SelectColorMode,
                    source,
                })?;
            camera.reset_counts().map_err(|source| SetupError::Device {
                step: SetupStep::ResetCounts,
                source,
            })?;

            debug!(delay_ms = %self.config.settle_delay.as_millis(), "Waiting for camera to settle");
            thread::sleep(self.config.settle_delay);

            FrameGeometry::resolve(&mut *camera, format)?
        };

        match geometry.image_size() {
            Some(size) => info!(geometry = %geometry, size = ?size, format = ?format, "Camera ready"),
            None => info!(geometry = %geometry, format = ?format, "Camera ready (non-standard size)"),
        }

        self.format = format;
        self.geometry = Some(geometry);
        self.worker = Some(CaptureWorker::new(
            Arc::clone(&self.camera),
            geometry,
            format,
            self.config.capture.clone(),
        ));

        Ok(geometry)
    }

    /// Selects black-and-white output for the next `setup`
    pub fn set_black_and_white(&mut self) {
        debug!("Black and white mode requested");
        self.config.color_mode = ColorMode::BlackAndWhite;
    }

    /// Selects colour output for the next `setup`
    pub fn set_color_mode(&mut self) {
        debug!("Colour mode requested");
        self.config.color_mode = ColorMode::Rgb;
    }

    /// Runs the prepared worker on its own thread
    pub fn start<S>(&mut self, sink: S) -> Result<(), SessionError>
    where
        S: FrameSink + 'static,
    {
        if self.running.is_some() {
            return Err(SessionError::AlreadyRunning);
        }
        let worker = self.worker.take().ok_or(SessionError::NotSetUp)?;
        self.running = Some(worker.spawn(sink)?);
        Ok(())
    }

    /// Takes the prepared worker to run it on the caller's thread
    pub fn take_worker(&mut self) -> Option<CaptureWorker<C>> {
        self.worker.take()
    }

    /// Stops the running worker and waits for it.
    ///
    /// The wait is bounded by one lock timeout plus the capture in flight.
    /// A sink that blocks indefinitely in `on_frame` without honouring its
    /// [`StopSignal`](crate::capture::StopSignal) blocks this call too;
    /// [`ChannelSink`](crate::capture::ChannelSink) gives up on a full
    /// channel once termination is requested.
    pub fn stop(&mut self) -> Result<Option<WorkerReport>, SessionError> {
        match self.running.take() {
            Some(handle) => Ok(Some(handle.stop()?)),
            None => Ok(None),
        }
    }

    /// Stops any worker and forgets the geometry
    pub fn close(&mut self) -> Option<WorkerReport> {
        let report = self.shutdown_worker();
        self.geometry = None;
        report
    }

    pub fn geometry(&self) -> Option<FrameGeometry> {
        self.geometry
    }

    pub fn pixel_format(&self) -> PixelFormat {
        self.format
    }

    pub fn color_mode(&self) -> ColorMode {
        self.config.color_mode
    }

    /// The camera behind the capture lock
    pub fn camera(&self) -> Arc<Mutex<C>> {
        Arc::clone(&self.camera)
    }

    pub fn worker_state(&self) -> Option<WorkerState> {
        match (&self.running, &self.worker) {
            (Some(handle), _) => Some(handle.state()),
            (None, Some(worker)) => Some(worker.state()),
            (None, None) => None,
        }
    }

    pub fn stats(&self) -> Option<CaptureStats> {
        match (&self.running, &self.worker) {
            (Some(handle), _) => Some(handle.stats()),
            (None, Some(worker)) => Some(worker.stats()),
            (None, None) => None,
        }
    }

    fn shutdown_worker(&mut self) -> Option<WorkerReport> {
        self.worker = None;
        let handle = self.running.take()?;
        match handle.stop() {
            Ok(report) => {
                debug!(frames = %report.stats.frames_captured, "Previous capture worker stopped");
                Some(report)
            }
            Err(e) => {
                warn!(error = %e, "Previous capture worker did not stop cleanly");
                None
            }
        }
    }
}

impl<C: CameraHandle> Drop for CameraSession<C> {
    fn drop(&mut self) {
        self.shutdown_worker();
    }
}
