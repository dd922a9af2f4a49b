/// Circular buffer with fractional (linearly interpolated) reads
pub struct DelayLine {
    buffer: Vec<f32>,
    write_pos: usize,
}

impl DelayLine {
    /// Allocate room for `max_samples` of history. Never grows afterwards.
    pub fn new(max_samples: usize) -> Self {
        Self {
            buffer: vec![0.0; max_samples.max(2)],
            write_pos: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Read `delay` samples behind the write head
    pub fn read(&self, delay: f32) -> f32 {
        let buf_len = self.buffer.len() as f32;
        let delay = delay.clamp(1.0, buf_len - 1.0);
        let read_pos_f = self.write_pos as f32 - delay;
        let read_pos_f = if read_pos_f < 0.0 {
            read_pos_f + buf_len
        } else {
            read_pos_f
        };

        let read_idx = read_pos_f as usize;
        let frac = read_pos_f - read_idx as f32;
        let idx0 = read_idx % self.buffer.len();
        let idx1 = (read_idx + 1) % self.buffer.len();
        self.buffer[idx0] * (1.0 - frac) + self.buffer[idx1] * frac
    }

    pub fn write(&mut self, sample: f32) {
        self.buffer[self.write_pos] = sample;
        self.write_pos = (self.write_pos + 1) % self.buffer.len();
    }

    pub fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
    }
}

/// Feedback echo with dry/wet mix
pub struct Delay {
    line: DelayLine,
    sample_rate: f32,
    feedback: f32,
    mix: f32,
    // Smoothed read position to avoid clicks
    current_delay_samples: f32,
    target_delay_samples: f32,
    /// False until the first `set_time`, which jumps instead of gliding
    settled: bool,
}

impl Delay {
    /// The line is sized once for `max_seconds`; later time changes only move the read head.
    pub fn new(sample_rate: f32, max_seconds: f32) -> Self {
        let max_samples = (sample_rate * max_seconds) as usize + 2;
        Self {
            line: DelayLine::new(max_samples),
            sample_rate,
            feedback: 0.3,
            mix: 0.3,
            current_delay_samples: sample_rate * 0.5,
            target_delay_samples: sample_rate * 0.5,
            settled: false,
        }
    }

    pub fn set_time(&mut self, seconds: f32) {
        let max = (self.line.capacity() - 2) as f32;
        self.target_delay_samples = (self.sample_rate * seconds).clamp(1.0, max);
        if !self.settled {
            self.current_delay_samples = self.target_delay_samples;
            self.settled = true;
        }
    }

    pub fn set_feedback(&mut self, feedback: f32) {
        self.feedback = feedback.clamp(0.0, 0.95);
    }

    pub fn set_mix(&mut self, mix: f32) {
        self.mix = mix.clamp(0.0, 1.0);
    }

    pub fn process(&mut self, input: f32) -> f32 {
        let smooth_speed = 0.001;
        self.current_delay_samples +=
            (self.target_delay_samples - self.current_delay_samples) * smooth_speed;

        let delayed = self.line.read(self.current_delay_samples);
        self.line.write(input + delayed * self.feedback);

        input * (1.0 - self.mix) + delayed * self.mix
    }

    pub fn reset(&mut self) {
        self.line.clear();
        self.current_delay_samples = self.target_delay_samples;
    }
}
