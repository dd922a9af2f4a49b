pub mod delay;
pub mod distortion;
pub mod dynamics;
pub mod filter;
pub mod kind;
pub mod modulation;
pub mod reverb;

pub use delay::{Delay, DelayLine};
pub use distortion::{db_to_linear, linear_to_db, Distortion};
pub use dynamics::{Compressor, EnvelopeFollower, Limiter, NoiseGate};
pub use filter::{FilterType, LadderFilter, PeakingEq, SvfFilter};
pub use kind::{EffectKind, ParamSpec, ParamUnit, ParamValues, MAX_DELAY_SECS, MAX_PARAMS, SCHEMA_VERSION};
pub use modulation::{Chorus, Lfo, Phaser};
pub use reverb::Reverb;

/// DSP state for one effect kind. The variant set mirrors [`EffectKind`]
/// one to one, so dispatch is a plain `match` rather than a vtable.
pub enum Dsp {
    Compressor(Compressor),
    NoiseGate(NoiseGate),
    Gain(f32),
    Distortion(Distortion),
    Highpass(SvfFilter),
    Lowpass(SvfFilter),
    LadderFilter(LadderFilter),
    EqBand(PeakingEq),
    Chorus(Chorus),
    Phaser(Phaser),
    Delay(Delay),
    Reverb(Reverb),
    Limiter(Limiter),
}

impl Dsp {
    /// Allocate all buffers for `sample_rate`. Nothing in here allocates again.
    pub fn new(kind: EffectKind, sample_rate: f32) -> Self {
        match kind {
            EffectKind::Compressor => Dsp::Compressor(Compressor::new(sample_rate)),
            EffectKind::NoiseGate => Dsp::NoiseGate(NoiseGate::new(sample_rate)),
            EffectKind::Gain => Dsp::Gain(1.0),
            EffectKind::Distortion => Dsp::Distortion(Distortion::new(sample_rate)),
            EffectKind::Highpass => Dsp::Highpass(SvfFilter::new(sample_rate, FilterType::HighPass)),
            EffectKind::Lowpass => Dsp::Lowpass(SvfFilter::new(sample_rate, FilterType::LowPass)),
            EffectKind::LadderFilter => Dsp::LadderFilter(LadderFilter::new(sample_rate)),
            EffectKind::EqBand => Dsp::EqBand(PeakingEq::new(sample_rate)),
            EffectKind::Chorus => Dsp::Chorus(Chorus::new(sample_rate)),
            EffectKind::Phaser => Dsp::Phaser(Phaser::new(sample_rate)),
            EffectKind::Delay => Dsp::Delay(Delay::new(sample_rate, MAX_DELAY_SECS)),
            EffectKind::Reverb => Dsp::Reverb(Reverb::new(sample_rate)),
            EffectKind::Limiter => Dsp::Limiter(Limiter::new(sample_rate)),
        }
    }

    pub fn kind(&self) -> EffectKind {
        match self {
            Dsp::Compressor(_) => EffectKind::Compressor,
            Dsp::NoiseGate(_) => EffectKind::NoiseGate,
            Dsp::Gain(_) => EffectKind::Gain,
            Dsp::Distortion(_) => EffectKind::Distortion,
            Dsp::Highpass(_) => EffectKind::Highpass,
            Dsp::Lowpass(_) => EffectKind::Lowpass,
            Dsp::LadderFilter(_) => EffectKind::LadderFilter,
            Dsp::EqBand(_) => EffectKind::EqBand,
            Dsp::Chorus(_) => EffectKind::Chorus,
            Dsp::Phaser(_) => EffectKind::Phaser,
            Dsp::Delay(_) => EffectKind::Delay,
            Dsp::Reverb(_) => EffectKind::Reverb,
            Dsp::Limiter(_) => EffectKind::Limiter,
        }
    }

    /// Coefficient update from schema-ordered values
    pub fn configure(&mut self, p: &ParamValues) {
        match self {
            Dsp::Compressor(c) => c.configure(p.get(0), p.get(1), p.get(2), p.get(3), p.get(4)),
            Dsp::NoiseGate(g) => g.configure(p.get(0), p.get(1), p.get(2)),
            Dsp::Gain(gain) => *gain = db_to_linear(p.get(0)),
            Dsp::Distortion(d) => {
                d.set_drive_db(p.get(0));
                d.set_tone(p.get(1));
                d.set_mix(p.get(2));
            }
            Dsp::Highpass(f) | Dsp::Lowpass(f) => f.set_cutoff(p.get(0)),
            Dsp::LadderFilter(f) => {
                f.set_cutoff(p.get(0));
                f.set_resonance(p.get(1));
                f.set_drive(p.get(2));
            }
            Dsp::EqBand(eq) => eq.configure(p.get(0), p.get(1), p.get(2)),
            Dsp::Chorus(c) => c.configure(p.get(0), p.get(1), p.get(2), p.get(3), p.get(4)),
            Dsp::Phaser(ph) => ph.configure(p.get(0), p.get(1), p.get(2), p.get(3), p.get(4)),
            Dsp::Delay(d) => {
                d.set_time(p.get(0));
                d.set_feedback(p.get(1));
                d.set_mix(p.get(2));
            }
            Dsp::Reverb(r) => {
                r.set_decay(p.get(0));
                r.set_damping(p.get(1));
                r.set_mix(p.get(2));
            }
            Dsp::Limiter(l) => l.configure(p.get(0), p.get(1)),
        }
    }

    /// Process a block in place
    pub fn process(&mut self, block: &mut [f32]) {
        match self {
            Dsp::Compressor(c) => block.iter_mut().for_each(|s| *s = c.process(*s)),
            Dsp::NoiseGate(g) => block.iter_mut().for_each(|s| *s = g.process(*s)),
            Dsp::Gain(gain) => block.iter_mut().for_each(|s| *s *= *gain),
            Dsp::Distortion(d) => block.iter_mut().for_each(|s| *s = d.process(*s)),
            Dsp::Highpass(f) | Dsp::Lowpass(f) => block.iter_mut().for_each(|s| *s = f.process(*s)),
            Dsp::LadderFilter(f) => block.iter_mut().for_each(|s| *s = f.process(*s)),
            Dsp::EqBand(eq) => block.iter_mut().for_each(|s| *s = eq.process(*s)),
            Dsp::Chorus(c) => block.iter_mut().for_each(|s| *s = c.process(*s)),
            Dsp::Phaser(ph) => block.iter_mut().for_each(|s| *s = ph.process(*s)),
            Dsp::Delay(d) => block.iter_mut().for_each(|s| *s = d.process(*s)),
            Dsp::Reverb(r) => block.iter_mut().for_each(|s| *s = r.process(*s)),
            Dsp::Limiter(l) => block.iter_mut().for_each(|s| *s = l.process(*s)),
        }
    }

    /// Clear filter and delay memory without reallocating
    pub fn reset(&mut self) {
        match self {
            Dsp::Compressor(c) => c.reset(),
            Dsp::NoiseGate(g) => g.reset(),
            Dsp::Gain(_) => {}
            Dsp::Distortion(d) => d.reset(),
            Dsp::Highpass(f) | Dsp::Lowpass(f) => f.reset(),
            Dsp::LadderFilter(f) => f.reset(),
            Dsp::EqBand(eq) => eq.reset(),
            Dsp::Chorus(c) => c.reset(),
            Dsp::Phaser(ph) => ph.reset(),
            Dsp::Delay(d) => d.reset(),
            Dsp::Reverb(r) => r.reset(),
            Dsp::Limiter(l) => l.reset(),
        }
    }
}

/// A [`Dsp`] plus the parameter snapshot it was last configured with, so
/// coefficients are only recomputed when a value actually changes.
pub struct EffectProcessor {
    dsp: Dsp,
    applied: Option<ParamValues>,
}

impl EffectProcessor {
    pub fn new(kind: EffectKind, sample_rate: f32) -> Self {
        Self {
            dsp: Dsp::new(kind, sample_rate),
            applied: None,
        }
    }

    pub fn kind(&self) -> EffectKind {
        self.dsp.kind()
    }

    pub fn process(&mut self, params: &ParamValues, block: &mut [f32]) {
        if self.applied.as_ref() != Some(params) {
            self.dsp.configure(params);
            self.applied = Some(*params);
        }
        self.dsp.process(block);
    }

    pub fn reset(&mut self) {
        self.dsp.reset();
    }
}
