//! Frame geometry derived from the camera's pixel and row counters

use crate::camera::{CameraHandle, DeviceError};
use crate::frame::PixelFormat;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GeometryError {
    #[error("camera reported zero rows")]
    ZeroRows,

    #[error("camera reported zero pixel bytes per row")]
    ZeroPixels,

    #[error("pixel count {pixel_count} is not a multiple of {bytes_per_pixel} bytes per pixel")]
    Misaligned {
        pixel_count: u32,
        bytes_per_pixel: u32,
    },

    #[error("failed to read geometry counters: {0}")]
    Device(#[from] DeviceError),
}

/// Width and height of the frames a camera produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameGeometry {
    pub width: u32,
    pub height: u32,
}

impl FrameGeometry {
    /// Computes geometry from the reported counters.
    ///
    /// The pixel counter reports bytes per row, so the width is the count
    /// divided by the format's byte width. Counts that do not divide evenly
    /// are rejected rather than truncated.
    pub fn from_counts(
        pixel_count: u32,
        row_count: u32,
        format: PixelFormat,
    ) -> Result<Self, GeometryError> {
        if row_count == 0 {
            return Err(GeometryError::ZeroRows);
        }
        if pixel_count == 0 {
            return Err(GeometryError::ZeroPixels);
        }

        let bytes_per_pixel = format.bytes_per_pixel();
        if pixel_count % bytes_per_pixel != 0 {
            return Err(GeometryError::Misaligned {
                pixel_count,
                bytes_per_pixel,
            });
        }

        Ok(Self {
            width: pixel_count / bytes_per_pixel,
            height: row_count,
        })
    }

    /// Reads the row and pixel counters from a camera that has already been
    /// reset and placed in the colour mode matching `format`.
    pub fn resolve<C>(camera: &mut C, format: PixelFormat) -> Result<Self, GeometryError>
    where
        C: CameraHandle + ?Sized,
    {
        let row_count = camera.read_row_count()?;
        let pixel_count = camera.read_pixel_count()?;
        Self::from_counts(pixel_count, row_count, format)
    }

    /// Byte length of one raw frame in `format`
    pub fn frame_len(&self, format: PixelFormat) -> usize {
        self.width as usize * self.height as usize * format.bytes_per_pixel() as usize
    }

    /// Standard sensor size matching these dimensions, if any
    pub fn image_size(&self) -> Option<ImageSize> {
        ImageSize::from_dimensions(self.width, self.height)
    }
}

impl fmt::Display for FrameGeometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Output sizes selectable on the camera core, keyed by register code.
///
/// The `Z` variants are zoomed (centre-cropped) windows with the same output
/// dimensions as their base size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSize {
    Vga,
    Qvga,
    Qqvga,
    Zqqvga,
    Cif,
    Qcif,
    Zcif,
    SubQcif,
    ZsubQcif,
}

impl ImageSize {
    const ALL: [ImageSize; 9] = [
        ImageSize::Vga,
        ImageSize::Qvga,
        ImageSize::Qqvga,
        ImageSize::Zqqvga,
        ImageSize::Cif,
        ImageSize::Qcif,
        ImageSize::Zcif,
        ImageSize::SubQcif,
        ImageSize::ZsubQcif,
    ];

    /// Register code; 2 is unassigned on the core
    pub fn code(self) -> u8 {
        match self {
            ImageSize::Vga => 0,
            ImageSize::Qvga => 1,
            ImageSize::Qqvga => 3,
            ImageSize::Zqqvga => 4,
            ImageSize::Cif => 5,
            ImageSize::Qcif => 6,
            ImageSize::Zcif => 7,
            ImageSize::SubQcif => 8,
            ImageSize::ZsubQcif => 9,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|size| size.code() == code)
    }

    pub fn dimensions(self) -> (u32, u32) {
        match self {
            ImageSize::Vga => (640, 480),
            ImageSize::Qvga => (320, 240),
            ImageSize::Qqvga | ImageSize::Zqqvga => (160, 120),
            ImageSize::Cif | ImageSize::Zcif => (352, 288),
            ImageSize::Qcif => (176, 144),
            ImageSize::SubQcif | ImageSize::ZsubQcif => (128, 96),
        }
    }

    pub fn is_zoomed(self) -> bool {
        matches!(
            self,
            ImageSize::Zqqvga | ImageSize::Zcif | ImageSize::ZsubQcif
        )
    }

    /// Non-zoomed size with the given output dimensions
    pub fn from_dimensions(width: u32, height: u32) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|size| !size.is_zoomed() && size.dimensions() == (width, height))
    }
}
