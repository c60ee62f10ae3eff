//! Test-pattern camera for running the pipeline without hardware

use super::{CameraHandle, ColorMode, DeviceError};
use bytes::{BufMut, Bytes, BytesMut};
use std::thread;
use std::time::Duration;
use tracing::debug;

/// RGB565 colour bars: white, yellow, cyan, green, magenta, red, blue, black
const COLOR_BARS: [u16; 8] = [0xFFFF, 0xFFE0, 0x07FF, 0x07E0, 0xF81F, 0xF800, 0x001F, 0x0000];

/// Simulated camera core producing moving colour bars (RGB) or a
/// gradient (black and white).
#[derive(Debug, Clone)]
pub struct SimulatedCamera {
    width: u32,
    height: u32,
    mode: ColorMode,
    ready: bool,
    frames_read: u64,
    fail_after: Option<u64>,
    readout: Option<Duration>,
}

impl SimulatedCamera {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            mode: ColorMode::Rgb,
            ready: false,
            frames_read: 0,
            fail_after: None,
            readout: None,
        }
    }

    /// Blocks each `get_raw_image` for `readout`, like a sensor at a fixed
    /// frame rate
    pub fn with_readout(mut self, readout: Duration) -> Self {
        self.readout = Some(readout);
        self
    }

    /// Makes `get_raw_image` fail once `frames` frames have been read
    pub fn fail_after(mut self, frames: u64) -> Self {
        self.fail_after = Some(frames);
        self
    }

    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    fn bytes_per_pixel(&self) -> u32 {
        match self.mode {
            ColorMode::Rgb => 2,
            ColorMode::BlackAndWhite => 1,
        }
    }

    /// Byte length of one frame, or an error when it does not fit in memory
    fn frame_len(&self) -> Result<usize, DeviceError> {
        let len = u64::from(self.width) * u64::from(self.height) * u64::from(self.bytes_per_pixel());
        usize::try_from(len).map_err(|_| {
            DeviceError::Register(format!(
                "{}x{} frame of {} bytes is not addressable",
                self.width, self.height, len
            ))
        })
    }

    fn render(&self, len: usize) -> Bytes {
        let width = u64::from(self.width.max(1));
        let shift = self.frames_read % width;
        let bars = COLOR_BARS.len() as u64;
        let mut buf = BytesMut::with_capacity(len);

        for y in 0..u64::from(self.height) {
            for x in 0..u64::from(self.width) {
                match self.mode {
                    ColorMode::Rgb => {
                        let bar = ((x + shift) * bars / width % bars) as usize;
                        buf.put_u16_le(COLOR_BARS[bar]);
                    }
                    ColorMode::BlackAndWhite => {
                        buf.put_u8(((x + y + shift) % 256) as u8);
                    }
                }
            }
        }

        buf.freeze()
    }
}

impl CameraHandle for SimulatedCamera {
    fn reset_camera(&mut self) -> Result<(), DeviceError> {
        self.ready = true;
        self.frames_read = 0;
        debug!(width = %self.width, height = %self.height, "Simulated camera reset");
        Ok(())
    }

    fn set_color_mode(&mut self, mode: ColorMode) -> Result<(), DeviceError> {
        self.mode = mode;
        Ok(())
    }

    fn reset_counts(&mut self) -> Result<(), DeviceError> {
        self.frames_read = 0;
        Ok(())
    }

    fn read_pixel_count(&mut self) -> Result<u32, DeviceError> {
        if !self.ready {
            return Err(DeviceError::NotResponding("camera not reset".to_string()));
        }
        self.width.checked_mul(self.bytes_per_pixel()).ok_or_else(|| {
            DeviceError::Register(format!("pixel counter overflow at width {}", self.width))
        })
    }

    fn read_row_count(&mut self) -> Result<u32, DeviceError> {
        if !self.ready {
            return Err(DeviceError::NotResponding("camera not reset".to_string()));
        }
        Ok(self.height)
    }

    fn get_raw_image(&mut self) -> Result<Bytes, DeviceError> {
        if !self.ready {
            return Err(DeviceError::NotResponding("camera not reset".to_string()));
        }
        if let Some(limit) = self.fail_after {
            if self.frames_read >= limit {
                return Err(DeviceError::Register(format!(
                    "image read failed after {} frames",
                    limit
                )));
            }
        }

        if let Some(readout) = self.readout {
            thread::sleep(readout);
        }

        let image = self.render(self.frame_len()?);
        self.frames_read += 1;
        Ok(image)
    }
}
