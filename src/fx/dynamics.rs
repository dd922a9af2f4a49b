use super::distortion::{db_to_linear, linear_to_db};

/// Peak envelope follower with separate attack/release smoothing
pub struct EnvelopeFollower {
    sample_rate: f32,
    attack_coeff: f32,
    release_coeff: f32,
    envelope: f32,
}

impl EnvelopeFollower {
    pub fn new(sample_rate: f32) -> Self {
        let mut env = Self {
            sample_rate,
            attack_coeff: 0.0,
            release_coeff: 0.0,
            envelope: 0.0,
        };
        env.set_attack_ms(10.0);
        env.set_release_ms(100.0);
        env
    }

    fn coeff(&self, ms: f32) -> f32 {
        let samples = (ms.max(0.01) * 0.001 * self.sample_rate).max(1.0);
        (-1.0 / samples).exp()
    }

    pub fn set_attack_ms(&mut self, ms: f32) {
        self.attack_coeff = self.coeff(ms);
    }

    pub fn set_release_ms(&mut self, ms: f32) {
        self.release_coeff = self.coeff(ms);
    }

    pub fn process(&mut self, input: f32) -> f32 {
        let level = input.abs();
        let coeff = if level > self.envelope {
            self.attack_coeff
        } else {
            self.release_coeff
        };
        self.envelope = level + (self.envelope - level) * coeff;
        self.envelope
    }

    pub fn reset(&mut self) {
        self.envelope = 0.0;
    }
}

/// Feed-forward hard-knee compressor
pub struct Compressor {
    envelope: EnvelopeFollower,
    threshold_db: f32,
    ratio: f32,
    makeup: f32,
}

impl Compressor {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            envelope: EnvelopeFollower::new(sample_rate),
            threshold_db: -20.0,
            ratio: 4.0,
            makeup: 1.0,
        }
    }

    pub fn configure(&mut self, threshold_db: f32, ratio: f32, attack_ms: f32, release_ms: f32, makeup_db: f32) {
        self.threshold_db = threshold_db;
        self.ratio = ratio.max(1.0);
        self.envelope.set_attack_ms(attack_ms);
        self.envelope.set_release_ms(release_ms);
        self.makeup = db_to_linear(makeup_db);
    }

    pub fn process(&mut self, input: f32) -> f32 {
        let env_db = linear_to_db(self.envelope.process(input));
        let over = env_db - self.threshold_db;
        let reduction_db = if over > 0.0 {
            over - over / self.ratio
        } else {
            0.0
        };
        input * db_to_linear(-reduction_db) * self.makeup
    }

    pub fn reset(&mut self) {
        self.envelope.reset();
    }
}

/// Downward gate: closes below threshold with smoothed gain
pub struct NoiseGate {
    envelope: EnvelopeFollower,
    threshold: f32,
    gain: f32,
    attack_coeff: f32,
    release_coeff: f32,
}

impl NoiseGate {
    pub fn new(sample_rate: f32) -> Self {
        let mut gate = Self {
            envelope: EnvelopeFollower::new(sample_rate),
            threshold: db_to_linear(-60.0),
            gain: 0.0,
            attack_coeff: 0.0,
            release_coeff: 0.0,
        };
        gate.configure(-60.0, 1.0, 100.0);
        gate
    }

    pub fn configure(&mut self, threshold_db: f32, attack_ms: f32, release_ms: f32) {
        self.threshold = db_to_linear(threshold_db);
        self.envelope.set_attack_ms(0.1);
        self.envelope.set_release_ms(release_ms);
        self.attack_coeff = self.envelope.coeff(attack_ms);
        self.release_coeff = self.envelope.coeff(release_ms);
    }

    pub fn process(&mut self, input: f32) -> f32 {
        let level = self.envelope.process(input);
        let (target, coeff) = if level >= self.threshold {
            (1.0, self.attack_coeff)
        } else {
            (0.0, self.release_coeff)
        };
        self.gain = target + (self.gain - target) * coeff;
        input * self.gain
    }

    pub fn reset(&mut self) {
        self.envelope.reset();
        self.gain = 0.0;
    }
}

/// Instant-attack peak limiter
pub struct Limiter {
    sample_rate: f32,
    ceiling: f32,
    release_coeff: f32,
    gain: f32,
}

impl Limiter {
    pub fn new(sample_rate: f32) -> Self {
        let mut limiter = Self {
            sample_rate,
            ceiling: 1.0,
            release_coeff: 0.0,
            gain: 1.0,
        };
        limiter.configure(-1.0, 100.0);
        limiter
    }

    pub fn configure(&mut self, threshold_db: f32, release_ms: f32) {
        self.ceiling = db_to_linear(threshold_db);
        let samples = (release_ms * 0.001 * self.sample_rate).max(1.0);
        self.release_coeff = (-1.0 / samples).exp();
    }

    pub fn process(&mut self, input: f32) -> f32 {
        let level = input.abs();
        let needed = if level > self.ceiling {
            self.ceiling / level
        } else {
            1.0
        };
        self.gain = if needed < self.gain {
            needed
        } else {
            needed + (self.gain - needed) * self.release_coeff
        };
        input * self.gain
    }

    pub fn reset(&mut self) {
        self.gain = 1.0;
    }
}
