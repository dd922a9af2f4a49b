#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use tonerig::engine::{
    AudioBackend, AudioDevice, BlockProcessor, DeviceBinding, ErrorCallback, StreamHandle, StreamRequest,
};
use tonerig::error::DeviceError;

pub type SharedProcessor = Arc<Mutex<Option<BlockProcessor>>>;

/// Backend without hardware. The processor it is given is parked in a
/// shared slot so tests can run blocks by hand; dropping the stream handle
/// takes it away again, like closing a device.
#[derive(Default)]
pub struct ManualBackend {
    pub processor: SharedProcessor,
    pub errors: Arc<Mutex<Option<ErrorCallback>>>,
    pub fail_negotiation: bool,
}

struct Released(SharedProcessor);

impl Drop for Released {
    fn drop(&mut self) {
        self.0.lock().unwrap().take();
    }
}

impl ManualBackend {
    /// Run one block through the captured processor
    pub fn run_block(&self, block: &mut [f32]) -> bool {
        match self.processor.lock().unwrap().as_mut() {
            Some(processor) => {
                processor.process_block(block);
                true
            }
            None => false,
        }
    }

    pub fn active_version(&self) -> Option<u64> {
        self.processor.lock().unwrap().as_ref().map(|p| p.active_version())
    }

    /// Report a runtime failure the way a device driver would
    pub fn fail(&self, message: &str) {
        if let Some(callback) = self.errors.lock().unwrap().as_mut() {
            callback(message.to_string());
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.processor.lock().unwrap().is_some()
    }
}

impl AudioBackend for ManualBackend {
    fn name(&self) -> &'static str {
        "manual"
    }

    fn list_devices(&self) -> Result<Vec<AudioDevice>, DeviceError> {
        Ok(Vec::new())
    }

    fn negotiate(&self, request: &StreamRequest) -> Result<DeviceBinding, DeviceError> {
        if self.fail_negotiation {
            return Err(DeviceError::Negotiation("no common sample rate".to_string()));
        }
        Ok(DeviceBinding {
            input_device: request.input_device.clone().unwrap_or_else(|| "manual in".to_string()),
            output_device: request.output_device.clone().unwrap_or_else(|| "manual out".to_string()),
            sample_rate: request.sample_rate,
            block_size: request.block_size,
            input_channels: 1,
            output_channels: 2,
        })
    }

    fn start(
        &self,
        _binding: &DeviceBinding,
        processor: BlockProcessor,
        on_error: ErrorCallback,
    ) -> Result<StreamHandle, DeviceError> {
        *self.processor.lock().unwrap() = Some(processor);
        *self.errors.lock().unwrap() = Some(on_error);
        Ok(StreamHandle::new(Released(Arc::clone(&self.processor))))
    }
}

pub fn request(block_size: u32) -> StreamRequest {
    StreamRequest {
        block_size,
        sample_rate: 48000,
        ..StreamRequest::default()
    }
}
