//! Device boundary: enumerate devices, negotiate a binding, run a stream.
//!
//! A backend receives a fully built [`BlockProcessor`] and is responsible
//! for feeding it fixed-size mono blocks from the device clock. The stream
//! runs until the returned [`StreamHandle`] is dropped.

use std::any::Any;

use serde::Serialize;

use super::processor::BlockProcessor;
use crate::error::DeviceError;

/// Called from the backend when the running stream fails
pub type ErrorCallback = Box<dyn FnMut(String) + Send + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Input,
    Output,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AudioDevice {
    pub name: String,
    pub direction: Direction,
    pub is_default: bool,
    pub channels: u16,
    pub default_sample_rate: u32,
}

/// What the caller would like; the backend decides what it gets
#[derive(Debug, Clone, PartialEq)]
pub struct StreamRequest {
    /// Name fragments; host defaults when `None`
    pub input_device: Option<String>,
    pub output_device: Option<String>,
    pub sample_rate: u32,
    pub block_size: u32,
}

impl Default for StreamRequest {
    fn default() -> Self {
        Self {
            input_device: None,
            output_device: None,
            sample_rate: 48000,
            block_size: 256,
        }
    }
}

/// Negotiated devices and format. Fixed for the lifetime of a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceBinding {
    pub input_device: String,
    pub output_device: String,
    pub sample_rate: u32,
    pub block_size: u32,
    pub input_channels: u16,
    pub output_channels: u16,
}

impl DeviceBinding {
    /// Wall-clock duration of one block
    pub fn block_period_ns(&self) -> u64 {
        (self.block_size as u64 * 1_000_000_000) / self.sample_rate.max(1) as u64
    }
}

/// Keeps a running stream alive. Dropping it stops the stream and releases
/// the devices.
pub struct StreamHandle {
    _inner: Box<dyn Any>,
}

impl StreamHandle {
    pub fn new<T: 'static>(stream: T) -> Self {
        Self {
            _inner: Box::new(stream),
        }
    }
}

impl std::fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamHandle").finish_non_exhaustive()
    }
}

pub trait AudioBackend {
    fn name(&self) -> &'static str;

    fn list_devices(&self) -> Result<Vec<AudioDevice>, DeviceError>;

    /// Open both devices far enough to agree on rate, block size and
    /// channel counts
    fn negotiate(&self, request: &StreamRequest) -> Result<DeviceBinding, DeviceError>;

    /// Start streaming through `processor`
    fn start(
        &self,
        binding: &DeviceBinding,
        processor: BlockProcessor,
        on_error: ErrorCallback,
    ) -> Result<StreamHandle, DeviceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_period() {
        let binding = DeviceBinding {
            input_device: "in".into(),
            output_device: "out".into(),
            sample_rate: 48000,
            block_size: 480,
            input_channels: 1,
            output_channels: 2,
        };
        assert_eq!(binding.block_period_ns(), 10_000_000);
    }
}
