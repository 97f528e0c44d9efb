//! Distortion / Waveshaping
//!
//! Three characters, each a different transfer function applied to
//! `input * (1 + drive)`:
//!
//!   Tube    soft clip, x / (1 + |x|). Warm, compresses peaks gradually.
//!   Crush   bit reduction plus sample-and-hold decimation. Gritty, lo-fi.
//!   Cosmic  foldback at ±0.6: the signal mirrors back when it overshoots,
//!           producing dense metallic harmonics.
//!
//! The result is blended with the dry input by `mix` (0..100 percent).

use std::fmt;
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

pub const MAX_DRIVE: f32 = 20.0;
const FOLD_THRESHOLD: f32 = 0.6;

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum DistortionPreset {
    #[default]
    Tube = 0,
    Crush = 1,
    Cosmic = 2,
}

impl DistortionPreset {
    pub const ALL: [DistortionPreset; 3] = [
        DistortionPreset::Tube,
        DistortionPreset::Crush,
        DistortionPreset::Cosmic,
    ];

    pub fn name(self) -> &'static str {
        match self {
            DistortionPreset::Tube => "tube",
            DistortionPreset::Crush => "crush",
            DistortionPreset::Cosmic => "cosmic",
        }
    }

    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => DistortionPreset::Crush,
            2 => DistortionPreset::Cosmic,
            _ => DistortionPreset::Tube,
        }
    }
}

impl fmt::Display for DistortionPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DistortionPreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tube" | "overdrive" => Ok(DistortionPreset::Tube),
            "crush" | "bitcrush" => Ok(DistortionPreset::Crush),
            "cosmic" => Ok(DistortionPreset::Cosmic),
            other => Err(format!("unknown distortion preset `{other}`")),
        }
    }
}

#[inline]
pub fn soft_clip(x: f32) -> f32 {
    x / (1.0 + x.abs())
}

#[inline]
pub fn foldback(mut x: f32, threshold: f32) -> f32 {
    // Bounded: each pass moves x toward the band by at least 2*threshold.
    for _ in 0..16 {
        if x > threshold {
            x = 2.0 * threshold - x;
        } else if x < -threshold {
            x = -2.0 * threshold - x;
        } else {
            break;
        }
    }
    x.clamp(-threshold, threshold)
}

pub struct Distortion {
    preset: DistortionPreset,
    drive: f32,
    mix: f32,
    held: f32,
    hold_counter: u32,
}

impl Distortion {
    pub fn new() -> Self {
        Self {
            preset: DistortionPreset::Tube,
            drive: 6.0,
            mix: 0.5,
            held: 0.0,
            hold_counter: 0,
        }
    }

    /// `drive` in 0..20, `mix` in percent.
    pub fn configure(&mut self, preset: DistortionPreset, drive: f32, mix: f32) {
        self.preset = preset;
        self.drive = drive.clamp(0.0, MAX_DRIVE);
        self.mix = (mix / 100.0).clamp(0.0, 1.0);
    }

    #[inline]
    pub fn next_sample(&mut self, input: f32) -> f32 {
        let x = input * (1.0 + self.drive);
        let wet = match self.preset {
            DistortionPreset::Tube => soft_clip(x),
            DistortionPreset::Crush => {
                // Fewer bits and a longer hold as drive rises.
                let hold = 1 + (self.drive / 4.0) as u32;
                if self.hold_counter == 0 {
                    let steps = (64.0 / (1.0 + self.drive)).max(2.0);
                    self.held = (soft_clip(x) * steps).round() / steps;
                }
                self.hold_counter = (self.hold_counter + 1) % hold;
                self.held
            }
            DistortionPreset::Cosmic => foldback(x, FOLD_THRESHOLD),
        };
        input + (wet - input) * self.mix
    }

    pub fn render(&mut self, buffer: &mut [f32]) {
        for sample in buffer.iter_mut() {
            *sample = self.next_sample(*sample);
        }
    }
}

impl Default for Distortion {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dry_mix_is_transparent() {
        let mut dist = Distortion::new();
        dist.configure(DistortionPreset::Cosmic, 20.0, 0.0);
        assert!((dist.next_sample(0.3) - 0.3).abs() < 1e-6);
    }

    #[test]
    fn tube_output_is_bounded() {
        let mut dist = Distortion::new();
        dist.configure(DistortionPreset::Tube, 20.0, 100.0);
        for i in -100..=100 {
            let y = dist.next_sample(i as f32 / 10.0);
            assert!(y.abs() < 1.0);
        }
    }

    #[test]
    fn foldback_mirrors_overshoot() {
        // 0.8 folds to 2 * 0.6 - 0.8 = 0.4
        assert!((foldback(0.8, 0.6) - 0.4).abs() < 1e-6);
        assert!((foldback(-0.8, 0.6) + 0.4).abs() < 1e-6);
        assert!(foldback(1e6, 0.6).abs() <= 0.6);
    }

    #[test]
    fn crush_quantizes() {
        let mut dist = Distortion::new();
        dist.configure(DistortionPreset::Crush, 0.0, 100.0);
        let y = dist.next_sample(0.123_456);
        let steps = 64.0;
        assert!(((y * steps).round() - y * steps).abs() < 1e-4);
    }

    #[test]
    fn presets_parse_by_name() {
        assert_eq!("Crush".parse::<DistortionPreset>().unwrap(), DistortionPreset::Crush);
        assert!("fuzz".parse::<DistortionPreset>().is_err());
    }
}
