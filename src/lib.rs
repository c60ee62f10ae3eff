//! Capture pipeline for the sf_camera peripheral
//!
//! This library drives a register-level camera core through a vendor driver:
//! - Frame geometry resolution from the pixel/row counters
//! - A session controller that resets the hardware and owns the capture lock
//! - A polling capture worker that publishes decoded frames to a subscriber
//!
//! # Example
//!
//! ```no_run
//! use sf_camera::{CameraSession, Frame, SessionConfig, SimulatedCamera};
//!
//! let camera = SimulatedCamera::new(640, 480);
//! let mut session = CameraSession::new(camera, SessionConfig::default());
//! session.setup()?;
//! session.start(|frame: Frame| {
//!     println!("frame {} {}x{}", frame.sequence(), frame.width(), frame.height());
//! })?;
//! // ...
//! let report = session.stop()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod camera;
pub mod capture;
pub mod config;
pub mod frame;
pub mod geometry;
pub mod session;

// Re-exports for convenience
pub use camera::{CameraHandle, ColorMode, DeviceError, SimulatedCamera};
pub use capture::{
    CaptureError, CaptureEvent, CaptureSettings, CaptureStats, CaptureWorker, ChannelSink,
    ErrorPolicy, FrameSink, StopSignal, WorkerHandle, WorkerReport, WorkerState,
};
pub use frame::{Frame, PixelFormat};
pub use geometry::{FrameGeometry, GeometryError, ImageSize};
pub use session::{CameraSession, SessionConfig, SessionError, SetupError, SetupStep};
