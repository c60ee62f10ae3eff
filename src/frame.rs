//! Decoded frames and pixel formats

use crate::camera::ColorMode;
use crate::geometry::FrameGeometry;
use bytes::Bytes;
use image::{Rgb, RgbImage};
use std::path::Path;
use std::time::Instant;

/// Pixel encoding of a raw frame buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// 16-bit little-endian, 5 bits red, 6 bits green, 5 bits blue
    Rgb565,

    /// 8-bit luminance
    Gray8,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            PixelFormat::Rgb565 => 2,
            PixelFormat::Gray8 => 1,
        }
    }
}

impl From<ColorMode> for PixelFormat {
    fn from(mode: ColorMode) -> Self {
        match mode {
            ColorMode::Rgb => PixelFormat::Rgb565,
            ColorMode::BlackAndWhite => PixelFormat::Gray8,
        }
    }
}

/// Expands an RGB565 pixel to 8 bits per channel, replicating the high bits
/// into the low bits so that full scale maps to 255.
#[inline]
pub fn rgb565_to_rgb888(pixel: u16) -> [u8; 3] {
    let r = ((pixel >> 11) & 0x1F) as u8;
    let g = ((pixel >> 5) & 0x3F) as u8;
    let b = (pixel & 0x1F) as u8;
    [(r << 3) | (r >> 2), (g << 2) | (g >> 4), (b << 3) | (b >> 2)]
}

/// One captured frame.
///
/// The buffer length always equals `width * height * bytes_per_pixel`; the
/// capture worker never builds a frame from a short or oversized read.
#[derive(Debug, Clone)]
pub struct Frame {
    data: Bytes,
    width: u32,
    height: u32,
    format: PixelFormat,
    sequence: u64,
    captured_at: Instant,
}

impl Frame {
    pub(crate) fn new(data: Bytes, geometry: FrameGeometry, format: PixelFormat, sequence: u64) -> Self {
        debug_assert_eq!(data.len(), geometry.frame_len(format));
        Self {
            data,
            width: geometry.width,
            height: geometry.height,
            format,
            sequence,
            captured_at: Instant::now(),
        }
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn into_data(self) -> Bytes {
        self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Capture order, starting at 0 for the first frame of a worker
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }

    /// Raw value of the pixel at (x, y), or `None` outside the frame
    pub fn pixel(&self, x: u32, y: u32) -> Option<u16> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let bpp = self.format.bytes_per_pixel() as usize;
        let offset = (y as usize * self.width as usize + x as usize) * bpp;
        match self.format {
            PixelFormat::Rgb565 => Some(u16::from_le_bytes([
                self.data[offset],
                self.data[offset + 1],
            ])),
            PixelFormat::Gray8 => Some(self.data[offset] as u16),
        }
    }

    /// Converts the frame to 8-bit RGB for display or export
    pub fn to_rgb8(&self) -> RgbImage {
        RgbImage::from_fn(self.width, self.height, |x, y| {
            let value = self.pixel(x, y).unwrap_or(0);
            match self.format {
                PixelFormat::Rgb565 => Rgb(rgb565_to_rgb888(value)),
                PixelFormat::Gray8 => {
                    let v = value as u8;
                    Rgb([v, v, v])
                }
            }
        })
    }

    /// Writes the frame as a PNG file
    pub fn save_png<P: AsRef<Path>>(&self, path: P) -> Result<(), image::ImageError> {
        self.to_rgb8()
            .save_with_format(path, image::ImageFormat::Png)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry(width: u32, height: u32) -> FrameGeometry {
        FrameGeometry { width, height }
    }

    #[test]
    fn test_rgb565_expansion() {
        assert_eq!(rgb565_to_rgb888(0xFFFF), [255, 255, 255]);
        assert_eq!(rgb565_to_rgb888(0x0000), [0, 0, 0]);
        assert_eq!(rgb565_to_rgb888(0xF800), [255, 0, 0]);
        assert_eq!(rgb565_to_rgb888(0x07E0), [0, 255, 0]);
        assert_eq!(rgb565_to_rgb888(0x001F), [0, 0, 255]);
    }

    #[test]
    fn test_format_from_color_mode() {
        assert_eq!(PixelFormat::from(ColorMode::Rgb), PixelFormat::Rgb565);
        assert_eq!(PixelFormat::from(ColorMode::BlackAndWhite), PixelFormat::Gray8);
        assert_eq!(PixelFormat::Rgb565.bytes_per_pixel(), 2);
        assert_eq!(PixelFormat::Gray8.bytes_per_pixel(), 1);
    }

    #[test]
    fn test_pixel_access() {
        // 2x1 frame: red, blue
        let data = Bytes::from_static(&[0x00, 0xF8, 0x1F, 0x00]);
        let frame = Frame::new(data, geometry(2, 1), PixelFormat::Rgb565, 0);

        assert_eq!(frame.pixel(0, 0), Some(0xF800));
        assert_eq!(frame.pixel(1, 0), Some(0x001F));
        assert_eq!(frame.pixel(2, 0), None);
        assert_eq!(frame.pixel(0, 1), None);
    }

    #[test]
    fn test_to_rgb8() {
        let data = Bytes::from_static(&[0x00, 0xF8, 0x1F, 0x00]);
        let frame = Frame::new(data, geometry(2, 1), PixelFormat::Rgb565, 0);

        let rgb = frame.to_rgb8();
        assert_eq!(rgb.dimensions(), (2, 1));
        assert_eq!(rgb.get_pixel(0, 0), &Rgb([255, 0, 0]));
        assert_eq!(rgb.get_pixel(1, 0), &Rgb([0, 0, 255]));
    }

    #[test]
    fn test_gray_to_rgb8() {
        let data = Bytes::from_static(&[0, 128, 255]);
        let frame = Frame::new(data, geometry(3, 1), PixelFormat::Gray8, 7);

        assert_eq!(frame.sequence(), 7);
        let rgb = frame.to_rgb8();
        assert_eq!(rgb.get_pixel(1, 0), &Rgb([128, 128, 128]));
        assert_eq!(rgb.get_pixel(2, 0), &Rgb([255, 255, 255]));
    }

    #[test]
    fn test_save_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.png");

        let data = Bytes::from(vec![0xFFu8; 4 * 2 * 2]);
        let frame = Frame::new(data, geometry(4, 2), PixelFormat::Rgb565, 0);
        frame.save_png(&path).unwrap();

        let loaded = image::open(&path).unwrap().to_rgb8();
        assert_eq!(loaded.dimensions(), (4, 2));
        assert_eq!(loaded.get_pixel(3, 1), &Rgb([255, 255, 255]));
    }
}
