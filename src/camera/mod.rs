//! Camera handle capability exposed by the vendor driver

mod simulated;

pub use simulated::SimulatedCamera;

use bytes::Bytes;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("camera not responding: {0}")]
    NotResponding(String),

    #[error("register access failed: {0}")]
    Register(String),
}

/// Colour mode selected on the camera core
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ColorMode {
    /// 16-bit RGB565 output
    #[default]
    Rgb,

    /// 8-bit luminance output
    BlackAndWhite,
}

/// Operations the capture pipeline needs from a camera driver.
///
/// Implementations talk to the hardware; the pipeline serialises all calls
/// through the session's capture lock, so `&mut self` is enough.
pub trait CameraHandle: Send + 'static {
    /// Puts the camera core into a known hardware state
    fn reset_camera(&mut self) -> Result<(), DeviceError>;

    /// Selects the output colour mode
    fn set_color_mode(&mut self, mode: ColorMode) -> Result<(), DeviceError>;

    /// Clears the internal frame and row counters
    fn reset_counts(&mut self) -> Result<(), DeviceError>;

    /// Number of bytes the core reports per row
    fn read_pixel_count(&mut self) -> Result<u32, DeviceError>;

    /// Number of rows the core reports per frame
    fn read_row_count(&mut self) -> Result<u32, DeviceError>;

    /// Reads one complete raw frame
    fn get_raw_image(&mut self) -> Result<Bytes, DeviceError>;
}

impl<C: CameraHandle + ?Sized> CameraHandle for Box<C> {
    fn reset_camera(&mut self) -> Result<(), DeviceError> {
        (**self).reset_camera()
    }

    fn set_color_mode(&mut self, mode: ColorMode) -> Result<(), DeviceError> {
        (**self).set_color_mode(mode)
    }

    fn reset_counts(&mut self) -> Result<(), DeviceError> {
        (**self).reset_counts()
    }

    fn read_pixel_count(&mut self) -> Result<u32, DeviceError> {
        (**self).read_pixel_count()
    }

    fn read_row_count(&mut self) -> Result<u32, DeviceError> {
        (**self).read_row_count()
    }

    fn get_raw_image(&mut self) -> Result<Bytes, DeviceError> {
        (**self).get_raw_image()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boxed_handle_forwards_calls() {
        let mut camera: Box<dyn CameraHandle> = Box::new(SimulatedCamera::new(4, 2));
        camera.reset_camera().unwrap();
        camera.set_color_mode(ColorMode::BlackAndWhite).unwrap();
        camera.reset_counts().unwrap();

        assert_eq!(camera.read_pixel_count().unwrap(), 4);
        assert_eq!(camera.read_row_count().unwrap(), 2);
        assert_eq!(camera.get_raw_image().unwrap().len(), 8);
    }
}
