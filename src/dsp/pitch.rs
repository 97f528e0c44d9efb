use std::f32::consts::PI;

/*
Delay-Line Pitch Shifter
========================

Reading a delay line at a delay that changes over time shifts pitch: a
delay shrinking by one sample per sample plays the input back twice as
fast. The delay cannot shrink forever, so two taps sweep a window of
`WINDOW_MS` half a window apart, each faded in and out with a raised
cosine. When one tap wraps around it is silent, and the other carries the
signal.

    delay
      ▲   tap A       tap B
    W │╲      ╲     ╲      ╲
      │ ╲      ╲     ╲      ╲
      │  ╲      ╲     ╲      ╲
    0 └───╲──────╲─────╲──────╲──→ time     (ratio > 1)

Ratio is `2^((semitones + cents / 100) / 12)`. At exactly unison the unit
passes audio through untouched.
*/

pub const MAX_SEMITONES: f32 = 24.0;
pub const MAX_CENTS: f32 = 100.0;
const WINDOW_MS: f32 = 50.0;

pub fn pitch_ratio(semitones: f32, cents: f32) -> f32 {
    let semitones = semitones.clamp(-MAX_SEMITONES, MAX_SEMITONES);
    let cents = cents.clamp(-MAX_CENTS, MAX_CENTS);
    2.0f32.powf((semitones + cents / 100.0) / 12.0)
}

pub struct PitchShifter {
    buffer: Vec<f32>,
    write_pos: usize,
    window: f32,
    phase: f32,
    ratio: f32,
}

impl PitchShifter {
    pub fn new(sample_rate: f32) -> Self {
        let window = (WINDOW_MS * sample_rate / 1000.0).max(4.0);
        Self {
            // Room for the full window plus the interpolation neighbour.
            buffer: vec![0.0; window as usize + 2],
            write_pos: 0,
            window,
            phase: 0.0,
            ratio: 1.0,
        }
    }

    pub fn configure(&mut self, semitones: f32, cents: f32) {
        self.ratio = pitch_ratio(semitones, cents);
    }

    pub fn ratio(&self) -> f32 {
        self.ratio
    }

    #[inline]
    pub fn next_sample(&mut self, input: f32) -> f32 {
        let len = self.buffer.len();
        self.buffer[self.write_pos] = input;

        let output = if self.ratio == 1.0 {
            input
        } else {
            let a = self.phase;
            let b = (self.phase + 0.5).fract();
            self.tap(a) * fade(a) + self.tap(b) * fade(b)
        };

        self.phase = (self.phase + (1.0 - self.ratio) / self.window).rem_euclid(1.0);
        self.write_pos = (self.write_pos + 1) % len;
        output
    }

    pub fn render(&mut self, buffer: &mut [f32]) {
        for sample in buffer.iter_mut() {
            *sample = self.next_sample(*sample);
        }
    }

    pub fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
        self.phase = 0.0;
    }

    /// Linear-interpolated read `phase * window` samples behind the write head.
    #[inline]
    fn tap(&self, phase: f32) -> f32 {
        let len = self.buffer.len();
        let delay = phase * self.window;
        let whole = delay as usize;
        let frac = delay - whole as f32;

        let i0 = (self.write_pos + len - whole % len) % len;
        let i1 = (i0 + len - 1) % len;
        self.buffer[i0] * (1.0 - frac) + self.buffer[i1] * frac
    }
}

/// Raised-cosine window; zero at both edges, one in the middle.
#[inline]
fn fade(phase: f32) -> f32 {
    0.5 - 0.5 * (2.0 * PI * phase).cos()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::TAU;

    fn zero_crossings(buffer: &[f32]) -> usize {
        buffer
            .windows(2)
            .filter(|w| w[0] <= 0.0 && w[1] > 0.0)
            .count()
    }

    #[test]
    fn unison_is_transparent() {
        let mut shifter = PitchShifter::new(48_000.0);
        shifter.configure(0.0, 0.0);
        for x in [0.1, -0.4, 0.9] {
            assert_eq!(shifter.next_sample(x), x);
        }
    }

    #[test]
    fn ratio_follows_equal_temperament() {
        assert!((pitch_ratio(12.0, 0.0) - 2.0).abs() < 1e-5);
        assert!((pitch_ratio(-12.0, 0.0) - 0.5).abs() < 1e-5);
        assert!((pitch_ratio(0.0, 100.0) - pitch_ratio(1.0, 0.0)).abs() < 1e-5);
        assert_eq!(pitch_ratio(99.0, 0.0), pitch_ratio(24.0, 0.0));
    }

    #[test]
    fn octave_up_doubles_crossings() {
        let sample_rate = 48_000.0;
        let mut shifter = PitchShifter::new(sample_rate);
        shifter.configure(12.0, 0.0);

        let len = 48_000;
        let mut buffer: Vec<f32> = (0..len)
            .map(|n| (TAU * 250.0 * n as f32 / sample_rate).sin())
            .collect();
        shifter.render(&mut buffer);

        // 250 Hz in, ~500 Hz out. Window seams blur the count.
        let crossings = zero_crossings(&buffer[4_800..]) as f32 / 0.9;
        assert!((crossings - 500.0).abs() < 60.0, "got {crossings}");
    }

    #[test]
    fn output_stays_bounded() {
        let mut shifter = PitchShifter::new(44_100.0);
        shifter.configure(-24.0, -100.0);
        let mut buffer = vec![1.0f32; 10_000];
        shifter.render(&mut buffer);
        assert!(buffer.iter().all(|x| x.is_finite() && x.abs() <= 1.0 + 1e-5));
    }
}
