use std::f32::consts::{PI, TAU};

use super::delay::DelayLine;

/// Longest chorus sweep: 30 ms centre plus full depth
const CHORUS_MAX_SECONDS: f32 = 0.065;
const PHASER_STAGES: usize = 6;

/// Sine LFO with phase kept in [0, 1)
pub struct Lfo {
    sample_rate: f32,
    phase: f32,
    increment: f32,
}

impl Lfo {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            sample_rate,
            phase: 0.0,
            increment: 1.0 / sample_rate,
        }
    }

    pub fn set_rate(&mut self, hz: f32) {
        self.increment = hz.max(0.0) / self.sample_rate;
    }

    /// Next value in [-1, 1]
    pub fn next(&mut self) -> f32 {
        let value = (self.phase * TAU).sin();
        self.phase = (self.phase + self.increment).fract();
        value
    }

    pub fn reset(&mut self) {
        self.phase = 0.0;
    }
}

/// Modulated short delay mixed with the dry signal
pub struct Chorus {
    line: DelayLine,
    lfo: Lfo,
    sample_rate: f32,
    depth: f32,
    centre_ms: f32,
    feedback: f32,
    mix: f32,
    last: f32,
}

impl Chorus {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            line: DelayLine::new((sample_rate * CHORUS_MAX_SECONDS) as usize + 2),
            lfo: Lfo::new(sample_rate),
            sample_rate,
            depth: 0.25,
            centre_ms: 7.0,
            feedback: 0.0,
            mix: 0.5,
            last: 0.0,
        }
    }

    pub fn configure(&mut self, rate_hz: f32, depth: f32, centre_ms: f32, feedback: f32, mix: f32) {
        self.lfo.set_rate(rate_hz);
        self.depth = depth.clamp(0.0, 1.0);
        self.centre_ms = centre_ms.clamp(1.0, 30.0);
        self.feedback = feedback.clamp(0.0, 0.9);
        self.mix = mix.clamp(0.0, 1.0);
    }

    pub fn process(&mut self, input: f32) -> f32 {
        // depth 1.0 sweeps +/- the centre delay
        let sweep_ms = self.centre_ms * (1.0 + self.depth * self.lfo.next() * 0.95);
        let delay = sweep_ms * 0.001 * self.sample_rate;
        let wet = self.line.read(delay);
        self.line.write(input + self.last * self.feedback);
        self.last = wet;
        input * (1.0 - self.mix) + wet * self.mix
    }

    pub fn reset(&mut self) {
        self.line.clear();
        self.lfo.reset();
        self.last = 0.0;
    }
}

/// First-order allpass stage
#[derive(Clone, Copy, Default)]
struct AllpassStage {
    z: f32,
}

impl AllpassStage {
    fn process(&mut self, input: f32, coeff: f32) -> f32 {
        let out = -coeff * input + self.z;
        self.z = input + coeff * out;
        out
    }
}

/// Six-stage phaser with an LFO-swept notch frequency
pub struct Phaser {
    stages: [AllpassStage; PHASER_STAGES],
    lfo: Lfo,
    sample_rate: f32,
    depth: f32,
    centre_hz: f32,
    feedback: f32,
    mix: f32,
    last: f32,
}

impl Phaser {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            stages: [AllpassStage::default(); PHASER_STAGES],
            lfo: Lfo::new(sample_rate),
            sample_rate,
            depth: 0.5,
            centre_hz: 1300.0,
            feedback: 0.0,
            mix: 0.5,
            last: 0.0,
        }
    }

    pub fn configure(&mut self, rate_hz: f32, depth: f32, centre_hz: f32, feedback: f32, mix: f32) {
        self.lfo.set_rate(rate_hz);
        self.depth = depth.clamp(0.0, 1.0);
        self.centre_hz = centre_hz;
        self.feedback = feedback.clamp(0.0, 0.9);
        self.mix = mix.clamp(0.0, 1.0);
    }

    pub fn process(&mut self, input: f32) -> f32 {
        // sweep one octave either side of the centre at full depth
        let freq = self.centre_hz * 2.0f32.powf(self.depth * self.lfo.next());
        let freq = freq.clamp(20.0, self.sample_rate * 0.45);
        let t = (PI * freq / self.sample_rate).tan();
        let coeff = (1.0 - t) / (1.0 + t);

        let mut x = input + self.last * self.feedback;
        for stage in &mut self.stages {
            x = stage.process(x, coeff);
        }
        self.last = x;
        input * (1.0 - self.mix) + x * self.mix
    }

    pub fn reset(&mut self) {
        self.stages = [AllpassStage::default(); PHASER_STAGES];
        self.lfo.reset();
        self.last = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lfo_stays_in_unit_range() {
        let mut lfo = Lfo::new(1000.0);
        lfo.set_rate(3.0);
        for _ in 0..5000 {
            let v = lfo.next();
            assert!((-1.0..=1.0).contains(&v));
        }
    }

    #[test]
    fn dry_only_mix_is_transparent() {
        let mut chorus = Chorus::new(48000.0);
        chorus.configure(1.0, 1.0, 30.0, 0.9, 0.0);
        let mut phaser = Phaser::new(48000.0);
        phaser.configure(5.0, 1.0, 4000.0, 0.9, 0.0);
        for i in 0..2048 {
            let x = (i as f32 * 0.01).sin() * 0.5;
            assert_eq!(chorus.process(x), x);
            assert_eq!(phaser.process(x), x);
        }
    }

    #[test]
    fn phaser_with_feedback_stays_finite() {
        let mut phaser = Phaser::new(44100.0);
        phaser.configure(0.5, 1.0, 1000.0, 0.9, 1.0);
        for i in 0..44100 {
            let x = if i % 100 == 0 { 1.0 } else { 0.0 };
            assert!(phaser.process(x).is_finite());
        }
    }
}
