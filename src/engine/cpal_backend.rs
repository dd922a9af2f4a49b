//! cpal implementation of [`AudioBackend`].
//!
//! The input callback mixes each frame to mono and pushes it into a
//! lock-free SPSC ring. The output callback pulls fixed-size blocks from the
//! ring, runs them through the [`BlockProcessor`] and writes the result to
//! every output channel. Missing input is zero-filled and counted.

use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Host, Sample, SampleFormat, Stream, StreamConfig};
use parking_lot::Mutex;
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

use super::backend::{AudioBackend, AudioDevice, DeviceBinding, Direction, ErrorCallback, StreamHandle, StreamRequest};
use super::processor::{BlockProcessor, EngineStats};
use crate::error::DeviceError;

/// Ring capacity in blocks; one block of silence is queued up front
const RING_BLOCKS: usize = 8;

type SharedErrorCallback = Arc<Mutex<ErrorCallback>>;

pub struct CpalBackend {
    host: Host,
}

impl CpalBackend {
    pub fn new() -> Self {
        let host = cpal::default_host();
        tracing::info!(host = host.id().name(), "cpal backend initialized");
        Self { host }
    }

    fn devices(&self, direction: Direction) -> Result<Vec<Device>, DeviceError> {
        let devices = match direction {
            Direction::Input => self.host.input_devices(),
            Direction::Output => self.host.output_devices(),
        };
        devices
            .map(|d| d.collect())
            .map_err(|e| DeviceError::Stream(e.to_string()))
    }

    /// Find a device whose name equals or contains `name` (case-insensitive),
    /// or the host default
    fn find_device(&self, direction: Direction, name: Option<&str>) -> Result<Device, DeviceError> {
        let Some(search) = name else {
            let default = match direction {
                Direction::Input => self.host.default_input_device(),
                Direction::Output => self.host.default_output_device(),
            };
            return default.ok_or(DeviceError::NoDevice);
        };

        let search_lower = search.to_lowercase();
        let named: Vec<(String, Device)> = self
            .devices(direction)?
            .into_iter()
            .filter_map(|d| d.name().ok().map(|n| (n, d)))
            .collect();

        let exact = named.iter().position(|(n, _)| n.to_lowercase() == search_lower);
        let fragment = || named.iter().position(|(n, _)| n.to_lowercase().contains(&search_lower));
        match exact.or_else(fragment) {
            Some(i) => named.into_iter().nth(i).map(|(_, d)| d).ok_or(DeviceError::NoDevice),
            None => Err(DeviceError::DeviceNotFound {
                direction: direction_name(direction),
                name: search.to_string(),
            }),
        }
    }
}

impl Default for CpalBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn direction_name(direction: Direction) -> &'static str {
    match direction {
        Direction::Input => "input",
        Direction::Output => "output",
    }
}

fn supports_rate(device: &Device, direction: Direction, rate: u32) -> bool {
    let within = |r: cpal::SupportedStreamConfigRange| r.min_sample_rate().0 <= rate && rate <= r.max_sample_rate().0;
    match direction {
        Direction::Input => device
            .supported_input_configs()
            .map(|mut configs| configs.any(within))
            .unwrap_or(false),
        Direction::Output => device
            .supported_output_configs()
            .map(|mut configs| configs.any(within))
            .unwrap_or(false),
    }
}

fn default_config(device: &Device, direction: Direction) -> Result<cpal::SupportedStreamConfig, DeviceError> {
    let config = match direction {
        Direction::Input => device.default_input_config(),
        Direction::Output => device.default_output_config(),
    };
    config.map_err(|e| DeviceError::Negotiation(format!("{} device: {}", direction_name(direction), e)))
}

fn buffer_size(config: &cpal::SupportedStreamConfig, block_size: u32) -> cpal::BufferSize {
    match config.buffer_size() {
        cpal::SupportedBufferSize::Range { min, max } if (*min..=*max).contains(&block_size) => {
            cpal::BufferSize::Fixed(block_size)
        }
        _ => cpal::BufferSize::Default,
    }
}

impl AudioBackend for CpalBackend {
    fn name(&self) -> &'static str {
        "cpal"
    }

    fn list_devices(&self) -> Result<Vec<AudioDevice>, DeviceError> {
        let mut out = Vec::new();
        for direction in [Direction::Input, Direction::Output] {
            let default_name = match direction {
                Direction::Input => self.host.default_input_device(),
                Direction::Output => self.host.default_output_device(),
            }
            .and_then(|d| d.name().ok());

            for device in self.devices(direction)? {
                let Ok(name) = device.name() else { continue };
                let Ok(config) = default_config(&device, direction) else { continue };
                out.push(AudioDevice {
                    is_default: default_name.as_deref() == Some(name.as_str()),
                    name,
                    direction,
                    channels: config.channels(),
                    default_sample_rate: config.sample_rate().0,
                });
            }
        }
        Ok(out)
    }

    fn negotiate(&self, request: &StreamRequest) -> Result<DeviceBinding, DeviceError> {
        let input = self.find_device(Direction::Input, request.input_device.as_deref())?;
        let output = self.find_device(Direction::Output, request.output_device.as_deref())?;
        let in_config = default_config(&input, Direction::Input)?;
        let out_config = default_config(&output, Direction::Output)?;

        let rate_ok = |rate| supports_rate(&input, Direction::Input, rate) && supports_rate(&output, Direction::Output, rate);
        let sample_rate = if rate_ok(request.sample_rate) {
            request.sample_rate
        } else if rate_ok(out_config.sample_rate().0) {
            let fallback = out_config.sample_rate().0;
            tracing::warn!(requested = request.sample_rate, using = fallback, "sample rate not supported, using device default");
            fallback
        } else {
            return Err(DeviceError::Negotiation(format!(
                "no common sample rate (requested {} Hz)",
                request.sample_rate
            )));
        };

        let name = |d: &Device| d.name().map_err(|e| DeviceError::Negotiation(e.to_string()));
        let binding = DeviceBinding {
            input_device: name(&input)?,
            output_device: name(&output)?,
            sample_rate,
            block_size: request.block_size,
            input_channels: in_config.channels(),
            output_channels: out_config.channels(),
        };
        tracing::info!(
            input = %binding.input_device,
            output = %binding.output_device,
            sample_rate = binding.sample_rate,
            block_size = binding.block_size,
            "devices negotiated"
        );
        Ok(binding)
    }

    fn start(
        &self,
        binding: &DeviceBinding,
        processor: BlockProcessor,
        on_error: ErrorCallback,
    ) -> Result<StreamHandle, DeviceError> {
        let input = self.find_device(Direction::Input, Some(&binding.input_device))?;
        let output = self.find_device(Direction::Output, Some(&binding.output_device))?;
        let in_config = default_config(&input, Direction::Input)?;
        let out_config = default_config(&output, Direction::Output)?;

        let block_size = binding.block_size as usize;
        let (mut producer, consumer) = HeapRb::<f32>::new(block_size * RING_BLOCKS).split();
        producer.push_slice(&vec![0.0; block_size]);

        let on_error: SharedErrorCallback = Arc::new(Mutex::new(on_error));
        let stats = processor.stats();

        let input_stream_config = StreamConfig {
            channels: binding.input_channels,
            sample_rate: cpal::SampleRate(binding.sample_rate),
            buffer_size: buffer_size(&in_config, binding.block_size),
        };
        let output_stream_config = StreamConfig {
            channels: binding.output_channels,
            sample_rate: cpal::SampleRate(binding.sample_rate),
            buffer_size: buffer_size(&out_config, binding.block_size),
        };

        let input_stream = match in_config.sample_format() {
            SampleFormat::F32 => build_input::<f32>(&input, &input_stream_config, producer, stats, on_error.clone())?,
            SampleFormat::I16 => build_input::<i16>(&input, &input_stream_config, producer, stats, on_error.clone())?,
            SampleFormat::U16 => build_input::<u16>(&input, &input_stream_config, producer, stats, on_error.clone())?,
            format => {
                return Err(DeviceError::Negotiation(format!("unsupported input sample format: {:?}", format)))
            }
        };

        let output_stream = match out_config.sample_format() {
            SampleFormat::F32 => {
                build_output::<f32>(&output, &output_stream_config, consumer, processor, block_size, on_error)?
            }
            SampleFormat::I16 => {
                build_output::<i16>(&output, &output_stream_config, consumer, processor, block_size, on_error)?
            }
            SampleFormat::U16 => {
                build_output::<u16>(&output, &output_stream_config, consumer, processor, block_size, on_error)?
            }
            format => {
                return Err(DeviceError::Negotiation(format!("unsupported output sample format: {:?}", format)))
            }
        };

        input_stream.play().map_err(|e| DeviceError::Stream(e.to_string()))?;
        output_stream.play().map_err(|e| DeviceError::Stream(e.to_string()))?;
        tracing::info!(
            input_channels = binding.input_channels,
            output_channels = binding.output_channels,
            sample_rate = binding.sample_rate,
            "streams started"
        );

        Ok(StreamHandle::new((input_stream, output_stream)))
    }
}

fn report(on_error: &SharedErrorCallback, err: cpal::StreamError) {
    tracing::error!(error = %err, "audio stream error");
    let mut callback = on_error.lock();
    (*callback)(err.to_string());
}

/// Build the capture stream for a specific sample format
fn build_input<T>(
    device: &Device,
    config: &StreamConfig,
    mut producer: HeapProd<f32>,
    stats: Arc<EngineStats>,
    on_error: SharedErrorCallback,
) -> Result<Stream, DeviceError>
where
    T: cpal::SizedSample,
    f32: cpal::FromSample<T>,
{
    let channels = (config.channels as usize).max(1);
    let scale = 1.0 / channels as f32;
    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let mut dropped = 0;
                for frame in data.chunks(channels) {
                    let mono: f32 = frame.iter().map(|s| f32::from_sample(*s)).sum::<f32>() * scale;
                    // a full ring means output stalled; drop rather than wait
                    if producer.try_push(mono).is_err() {
                        dropped += 1;
                    }
                }
                stats.note_input_overflow(dropped);
            },
            move |err| report(&on_error, err),
            None,
        )
        .map_err(|e| DeviceError::Stream(e.to_string()))
}

/// Build the playback stream for a specific sample format
fn build_output<T>(
    device: &Device,
    config: &StreamConfig,
    mut consumer: HeapCons<f32>,
    mut processor: BlockProcessor,
    block_size: usize,
    on_error: SharedErrorCallback,
) -> Result<Stream, DeviceError>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    let channels = (config.channels as usize).max(1);
    let mut block = vec![0.0f32; block_size.max(1)];
    let mut pos = block.len();

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                for frame in data.chunks_mut(channels) {
                    if pos == block.len() {
                        let got = consumer.pop_slice(&mut block);
                        block[got..].fill(0.0);
                        processor.note_underrun(block.len() - got);
                        processor.process_block(&mut block);
                        pos = 0;
                    }
                    let sample = T::from_sample(block[pos]);
                    pos += 1;
                    for channel_sample in frame.iter_mut() {
                        *channel_sample = sample;
                    }
                }
            },
            move |err| report(&on_error, err),
            None,
        )
        .map_err(|e| DeviceError::Stream(e.to_string()))
}
