use rodio::Source;
use std::f32::consts::PI;
use std::time::Duration;

/// Finite sine beep with an exponential fade-out to avoid clicks.
pub struct Tone {
    freq: f32,
    amplitude: f32,
    sample_rate: u32,
    total_samples: usize,
    num_sample: usize,
}

impl Tone {
    pub fn new(freq: f32, duration: Duration) -> Self {
        let sample_rate = 44100;
        Self {
            freq,
            amplitude: 0.8,
            sample_rate,
            total_samples: (duration.as_secs_f32() * sample_rate as f32) as usize,
            num_sample: 0,
        }
    }

    /// Silent gap between beeps in a pattern.
    pub fn silence(duration: Duration) -> Self {
        let mut tone = Self::new(0.0, duration);
        tone.amplitude = 0.0;
        tone
    }
}

impl Iterator for Tone {
    type Item = f32;

    fn next(&mut self) -> Option<Self::Item> {
        if self.num_sample >= self.total_samples {
            return None;
        }

        let t = self.num_sample as f32 / self.sample_rate as f32;
        self.num_sample += 1;

        let progress = self.num_sample as f32 / self.total_samples.max(1) as f32;
        // Ramp gain down to -60dB over the beep, like an exponential fade.
        let fade = 0.001f32.powf(progress);

        Some((2.0 * PI * self.freq * t).sin() * self.amplitude * fade)
    }
}

impl Source for Tone {
    fn current_frame_len(&self) -> Option<usize> {
        Some(self.total_samples - self.num_sample)
    }

    fn channels(&self) -> u16 {
        1
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        Some(Duration::from_secs_f32(
            self.total_samples as f32 / self.sample_rate as f32,
        ))
    }
}
