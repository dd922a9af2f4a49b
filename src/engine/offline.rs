//! Offline rendering of WAV files through a chain, using the same block
//! processor as the live stream.

use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::{Context, Result};
use crossbeam_channel::{bounded, unbounded};

use super::processor::{BlockProcessor, EngineEvent, EngineStats};
use super::slot;
use crate::chain::EffectChain;

/// Seconds of silence appended so delay and reverb tails ring out
const TAIL_SECONDS: f32 = 1.0;

pub struct RenderResult {
    pub duration_secs: f32,
    pub samples: usize,
    pub sample_rate: u32,
    pub faulted_units: usize,
}

/// Render `input` through `chain` into a mono 16-bit `output`
pub fn render_file(
    chain: &EffectChain,
    input: &Path,
    output: &Path,
    block_size: usize,
) -> Result<RenderResult> {
    let mut reader = hound::WavReader::open(input)
        .with_context(|| format!("Failed to open WAV file: {}", input.display()))?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()
            .with_context(|| format!("Failed to read samples: {}", input.display()))?,
        hound::SampleFormat::Int => {
            let scale = 1.0 / (1i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<Result<_, _>>()
                .with_context(|| format!("Failed to read samples: {}", input.display()))?
        }
    };

    let tail = (spec.sample_rate as f32 * TAIL_SECONDS) as usize;
    let mut mono: Vec<f32> = interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect();
    mono.resize(mono.len() + tail, 0.0);

    let block_size = block_size.max(1);
    let (_publisher, receiver) = slot::channel();
    let (retire_tx, _retired) = bounded(1);
    let (event_tx, events) = unbounded::<EngineEvent>();
    let mut processor = BlockProcessor::new(
        receiver,
        Box::new(chain.prepare(spec.sample_rate as f32, block_size)),
        retire_tx,
        event_tx,
        Arc::new(EngineStats::default()),
        Arc::new(AtomicBool::new(true)),
        u64::MAX,
    );
    for block in mono.chunks_mut(block_size) {
        processor.process_block(block);
    }

    let faulted_units = events
        .try_iter()
        .filter(|e| matches!(e, EngineEvent::UnitFaulted { .. }))
        .inspect(|e| tracing::warn!(?e, "unit disabled during render"))
        .count();

    let out_spec = hound::WavSpec {
        channels: 1,
        sample_rate: spec.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(output, out_spec)
        .with_context(|| format!("Failed to create WAV file: {}", output.display()))?;
    for sample in &mono {
        writer.write_sample((*sample * 32767.0).clamp(-32768.0, 32767.0) as i16)?;
    }
    writer
        .finalize()
        .with_context(|| format!("Failed to finalize WAV file: {}", output.display()))?;

    tracing::info!(
        input = %input.display(),
        output = %output.display(),
        samples = mono.len(),
        units = chain.len(),
        "render complete"
    );

    Ok(RenderResult {
        duration_secs: mono.len() as f32 / spec.sample_rate as f32,
        samples: mono.len(),
        sample_rate: spec.sample_rate,
        faulted_units,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::UnitSpec;

    fn write_tone(path: &Path, sample_rate: u32, channels: u16, seconds: f32) {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        let frames = (sample_rate as f32 * seconds) as usize;
        for i in 0..frames {
            let s = ((i as f32 * 440.0 * std::f32::consts::TAU / sample_rate as f32).sin() * 16000.0) as i16;
            for _ in 0..channels {
                writer.write_sample(s).unwrap();
            }
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn renders_with_tail() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.wav");
        let output = dir.path().join("out.wav");
        write_tone(&input, 22050, 2, 0.5);

        let chain = EffectChain::build(&[
            UnitSpec::new("distortion").param("drive", 20.0),
            UnitSpec::new("delay").param("time", 0.2),
        ])
        .unwrap();
        let result = render_file(&chain, &input, &output, 128).unwrap();
        assert_eq!(result.sample_rate, 22050);
        assert_eq!(result.samples, 11025 + 22050);
        assert_eq!(result.faulted_units, 0);

        let reader = hound::WavReader::open(&output).unwrap();
        assert_eq!(reader.spec().channels, 1);
        assert_eq!(reader.len() as usize, result.samples);
    }

    #[test]
    fn missing_input_has_context() {
        let dir = tempfile::tempdir().unwrap();
        let err = render_file(
            &EffectChain::new(),
            &dir.path().join("nope.wav"),
            &dir.path().join("out.wav"),
            256,
        )
        .err()
        .unwrap();
        assert!(err.to_string().contains("Failed to open WAV file"));
    }
}
