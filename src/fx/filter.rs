use std::f32::consts::PI;

/// Filter response selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterType {
    LowPass,
    HighPass,
}

/// State Variable Filter (2-pole SVF, trapezoidal)
pub struct SvfFilter {
    sample_rate: f32,
    filter_type: FilterType,
    cutoff: f32,
    // Integrator states
    low: f32,
    band: f32,
    // Precomputed coefficients
    g: f32, // frequency coefficient
    k: f32, // damping coefficient (1/Q)
}

impl SvfFilter {
    pub fn new(sample_rate: f32, filter_type: FilterType) -> Self {
        let mut f = Self {
            sample_rate,
            filter_type,
            cutoff: 1000.0,
            low: 0.0,
            band: 0.0,
            g: 0.0,
            k: std::f32::consts::SQRT_2,
        };
        f.update_coefficients();
        f
    }

    fn update_coefficients(&mut self) {
        let freq = self.cutoff.clamp(10.0, self.sample_rate * 0.49);
        self.g = (PI * freq / self.sample_rate).tan();
    }

    pub fn set_cutoff(&mut self, hz: f32) {
        self.cutoff = hz;
        self.update_coefficients();
    }

    pub fn process(&mut self, input: f32) -> f32 {
        let a1 = 1.0 / (1.0 + self.g * (self.g + self.k));
        let a2 = self.g * a1;
        let a3 = self.g * a2;

        let v3 = input - self.low;
        let v1 = a1 * self.band + a2 * v3;
        let v2 = self.low + a2 * self.band + a3 * v3;

        self.band = 2.0 * v1 - self.band;
        self.low = 2.0 * v2 - self.low;

        match self.filter_type {
            FilterType::LowPass => v2,
            FilterType::HighPass => input - self.k * v1 - v2,
        }
    }

    pub fn reset(&mut self) {
        self.low = 0.0;
        self.band = 0.0;
    }
}

/// Peaking EQ band (RBJ cookbook biquad, transposed direct form II)
pub struct PeakingEq {
    sample_rate: f32,
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
    z1: f32,
    z2: f32,
}

impl PeakingEq {
    pub fn new(sample_rate: f32) -> Self {
        let mut eq = Self {
            sample_rate,
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
            z1: 0.0,
            z2: 0.0,
        };
        eq.configure(1000.0, 0.0, 0.707);
        eq
    }

    pub fn configure(&mut self, freq: f32, gain_db: f32, q: f32) {
        let freq = freq.clamp(10.0, self.sample_rate * 0.49);
        let a = 10.0f32.powf(gain_db / 40.0);
        let w0 = 2.0 * PI * freq / self.sample_rate;
        let alpha = w0.sin() / (2.0 * q.max(0.01));
        let cos_w0 = w0.cos();

        let a0 = 1.0 + alpha / a;
        self.b0 = (1.0 + alpha * a) / a0;
        self.b1 = (-2.0 * cos_w0) / a0;
        self.b2 = (1.0 - alpha * a) / a0;
        self.a1 = (-2.0 * cos_w0) / a0;
        self.a2 = (1.0 - alpha / a) / a0;
    }

    pub fn process(&mut self, input: f32) -> f32 {
        let out = self.b0 * input + self.z1;
        self.z1 = self.b1 * input - self.a1 * out + self.z2;
        self.z2 = self.b2 * input - self.a2 * out;
        out
    }

    pub fn reset(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }
}

/// Four cascaded one-pole stages with tanh-saturated resonance feedback
pub struct LadderFilter {
    sample_rate: f32,
    g: f32,
    resonance: f32,
    drive: f32,
    stages: [f32; 4],
}

impl LadderFilter {
    pub fn new(sample_rate: f32) -> Self {
        let mut f = Self {
            sample_rate,
            g: 0.0,
            resonance: 0.2,
            drive: 1.0,
            stages: [0.0; 4],
        };
        f.set_cutoff(1000.0);
        f
    }

    pub fn set_cutoff(&mut self, hz: f32) {
        let hz = hz.clamp(10.0, self.sample_rate * 0.45);
        // one-pole coefficient, kept below 1 for stability
        self.g = (1.0 - (-2.0 * PI * hz / self.sample_rate).exp()).min(0.99);
    }

    /// 0..1, where 1 approaches self-oscillation
    pub fn set_resonance(&mut self, resonance: f32) {
        self.resonance = resonance.clamp(0.0, 1.0);
    }

    pub fn set_drive(&mut self, drive: f32) {
        self.drive = drive.clamp(1.0, 10.0);
    }

    pub fn process(&mut self, input: f32) -> f32 {
        let feedback = self.resonance * 3.9 * self.stages[3];
        let mut x = (input * self.drive - feedback).tanh();
        for stage in &mut self.stages {
            *stage += self.g * (x - *stage);
            x = *stage;
        }
        self.stages[3] / self.drive.sqrt()
    }

    pub fn reset(&mut self) {
        self.stages = [0.0; 4];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rms(samples: &[f32]) -> f32 {
        (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
    }

    fn sine(freq: f32, sample_rate: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * PI * freq * i as f32 / sample_rate).sin())
            .collect()
    }

    #[test]
    fn highpass_attenuates_below_cutoff() {
        let mut hp = SvfFilter::new(48000.0, FilterType::HighPass);
        hp.set_cutoff(1000.0);
        let out: Vec<f32> = sine(50.0, 48000.0, 48000).iter().map(|&x| hp.process(x)).collect();
        assert!(rms(&out[24000..]) < 0.05);
    }

    #[test]
    fn lowpass_passes_below_cutoff() {
        let mut lp = SvfFilter::new(48000.0, FilterType::LowPass);
        lp.set_cutoff(5000.0);
        let out: Vec<f32> = sine(100.0, 48000.0, 48000).iter().map(|&x| lp.process(x)).collect();
        assert!((rms(&out[24000..]) - std::f32::consts::FRAC_1_SQRT_2).abs() < 0.05);
    }

    #[test]
    fn flat_eq_band_is_transparent() {
        let mut eq = PeakingEq::new(48000.0);
        eq.configure(1000.0, 0.0, 1.0);
        for x in sine(440.0, 48000.0, 512) {
            assert!((eq.process(x) - x).abs() < 1e-4);
        }
    }

    #[test]
    fn ladder_stays_finite_at_full_resonance() {
        let mut ladder = LadderFilter::new(44100.0);
        ladder.set_resonance(1.0);
        ladder.set_drive(10.0);
        for x in sine(220.0, 44100.0, 44100) {
            assert!(ladder.process(x).is_finite());
        }
    }
}
