/// Comb delay times in seconds (prime-ish spacing for a less metallic tail)
const COMB_TIMES: [f32; 4] = [0.0297, 0.0341, 0.0393, 0.0442];
/// Allpass diffusion delays: ~5ms, ~1.7ms
const ALLPASS_TIMES: [f32; 2] = [0.005, 0.0017];

/// Mono Schroeder reverb: 4 parallel damped combs into 2 series allpasses
pub struct Reverb {
    combs: [CombFilter; 4],
    allpasses: [AllpassFilter; 2],
    sample_rate: f32,
    decay_secs: f32,
    mix: f32,
}

impl Reverb {
    pub fn new(sample_rate: f32) -> Self {
        let samples = |secs: f32| (sample_rate * secs) as usize;
        let mut reverb = Self {
            combs: COMB_TIMES.map(|t| CombFilter::new(samples(t), 0.5, 0.5)),
            allpasses: ALLPASS_TIMES.map(|t| AllpassFilter::new(samples(t))),
            sample_rate,
            decay_secs: 1.5,
            mix: 0.3,
        };
        reverb.set_decay(1.5);
        reverb
    }

    /// Decay is the RT60 in seconds; each comb gets the feedback that reaches
    /// -60 dB after that time.
    pub fn set_decay(&mut self, decay_secs: f32) {
        self.decay_secs = decay_secs.max(0.01);
        for comb in &mut self.combs {
            let loop_secs = comb.len() as f32 / self.sample_rate;
            let feedback = 10.0f32.powf(-3.0 * loop_secs / self.decay_secs);
            comb.set_feedback(feedback.min(0.98));
        }
    }

    pub fn set_damping(&mut self, damping: f32) {
        let damping = damping.clamp(0.0, 1.0);
        for comb in &mut self.combs {
            comb.set_damping(damping);
        }
    }

    pub fn set_mix(&mut self, mix: f32) {
        self.mix = mix.clamp(0.0, 1.0);
    }

    pub fn process(&mut self, input: f32) -> f32 {
        let mut wet = 0.0f32;
        for c in &mut self.combs {
            wet += c.process(input);
        }
        wet *= 0.25;

        for ap in &mut self.allpasses {
            wet = ap.process(wet);
        }

        input * (1.0 - self.mix) + wet * self.mix
    }

    pub fn reset(&mut self) {
        for c in &mut self.combs {
            c.reset();
        }
        for ap in &mut self.allpasses {
            ap.reset();
        }
    }
}

/// Comb filter with damping (one-pole LP in feedback path)
struct CombFilter {
    buffer: Vec<f32>,
    pos: usize,
    feedback: f32,
    damp_state: f32,
    damping: f32,
}

impl CombFilter {
    fn new(delay: usize, feedback: f32, damping: f32) -> Self {
        Self {
            buffer: vec![0.0; delay.max(1)],
            pos: 0,
            feedback,
            damp_state: 0.0,
            damping,
        }
    }

    fn len(&self) -> usize {
        self.buffer.len()
    }

    fn set_feedback(&mut self, feedback: f32) {
        self.feedback = feedback;
    }

    fn set_damping(&mut self, damping: f32) {
        self.damping = damping;
    }

    fn process(&mut self, input: f32) -> f32 {
        let delayed = self.buffer[self.pos];

        self.damp_state = delayed * (1.0 - self.damping) + self.damp_state * self.damping;

        self.buffer[self.pos] = input + self.damp_state * self.feedback;
        self.pos = (self.pos + 1) % self.buffer.len();

        delayed
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.damp_state = 0.0;
        self.pos = 0;
    }
}

/// Allpass filter for diffusion
struct AllpassFilter {
    buffer: Vec<f32>,
    pos: usize,
}

impl AllpassFilter {
    fn new(delay: usize) -> Self {
        Self {
            buffer: vec![0.0; delay.max(1)],
            pos: 0,
        }
    }

    fn process(&mut self, input: f32) -> f32 {
        let delayed = self.buffer[self.pos];
        let coeff = 0.5f32;

        let output = -input + delayed;
        self.buffer[self.pos] = input + delayed * coeff;
        self.pos = (self.pos + 1) % self.buffer.len();

        output
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.pos = 0;
    }
}
