/// Tanh soft-clip distortion with a post tone filter and dry/wet mix
pub struct Distortion {
    sample_rate: f32,
    gain: f32,
    norm: f32,
    mix: f32,
    tone_coeff: f32,
    tone_state: f32,
}

impl Distortion {
    pub fn new(sample_rate: f32) -> Self {
        let mut d = Self {
            sample_rate,
            gain: 1.0,
            norm: 1.0,
            mix: 1.0,
            tone_coeff: 0.0,
            tone_state: 0.0,
        };
        d.set_drive_db(25.0);
        d.set_tone(0.5);
        d
    }

    pub fn set_drive_db(&mut self, drive_db: f32) {
        self.gain = db_to_linear(drive_db.clamp(0.0, 60.0));
        self.norm = self.gain.tanh().max(1e-6);
    }

    /// 0 = dark (~800 Hz corner), 1 = fully open
    pub fn set_tone(&mut self, tone: f32) {
        let tone = tone.clamp(0.0, 1.0);
        let corner = 800.0 * (20000.0f32 / 800.0).powf(tone);
        let corner = corner.min(self.sample_rate * 0.49);
        self.tone_coeff = (-2.0 * std::f32::consts::PI * corner / self.sample_rate).exp();
    }

    pub fn set_mix(&mut self, mix: f32) {
        self.mix = mix.clamp(0.0, 1.0);
    }

    pub fn process(&mut self, input: f32) -> f32 {
        let shaped = (input * self.gain).tanh() / self.norm;
        self.tone_state = shaped * (1.0 - self.tone_coeff) + self.tone_state * self.tone_coeff;
        input * (1.0 - self.mix) + self.tone_state * self.mix
    }

    pub fn reset(&mut self) {
        self.tone_state = 0.0;
    }
}

pub fn db_to_linear(db: f32) -> f32 {
    10.0f32.powf(db / 20.0)
}

pub fn linear_to_db(linear: f32) -> f32 {
    20.0 * linear.max(1e-9).log10()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_stays_bounded_at_full_drive() {
        let mut d = Distortion::new(48000.0);
        d.set_drive_db(60.0);
        d.set_tone(1.0);
        for i in 0..4800 {
            let x = (i as f32 * 0.05).sin();
            let y = d.process(x);
            assert!(y.abs() <= 1.0 + 1e-3, "sample {} = {}", i, y);
        }
    }

    #[test]
    fn silence_in_silence_out() {
        let mut d = Distortion::new(44100.0);
        for _ in 0..64 {
            assert_eq!(d.process(0.0), 0.0);
        }
    }
}
