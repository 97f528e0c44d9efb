use std::f32::consts::{PI, TAU};
use std::fmt;
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/*
Waveform Shapes
===============

Every note of an oscillator shares one shape. A shape maps the note's phase
(radians, kept in [0, 2π)) to an instantaneous value:

  Sine      sin(phase)                                  [-1, 1]
  Square    +0.5 for the first half cycle, -0.5 after   [-0.5, 0.5]
  Triangle  two-sided ramp over the fractional phase    [-1, 1]
  Saw       rising ramp over the fractional phase       [-1, 1)

The square is deliberately half height: it carries far more energy than the
other shapes at the same peak, and the halved level keeps it roughly in line
with them when chords stack up.

Triangle and saw work on the fractional position x = phase / 2π:

  saw(x)      = 2 * (x - floor(x + 0.5))
  triangle(x) = 2 * |saw(x)| - 1

The saw is centred so it crosses zero at the start of the cycle, matching
sine's phase.
*/

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Waveform {
    #[default]
    Sine = 0,
    Square = 1,
    Triangle = 2,
    Saw = 3,
}

impl Waveform {
    pub const ALL: [Waveform; 4] = [
        Waveform::Sine,
        Waveform::Square,
        Waveform::Triangle,
        Waveform::Saw,
    ];

    /// Value of this shape at `phase` radians.
    #[inline]
    pub fn sample(self, phase: f32) -> f32 {
        match self {
            Waveform::Sine => phase.sin(),
            Waveform::Square => {
                if phase < PI {
                    0.5
                } else {
                    -0.5
                }
            }
            Waveform::Triangle => 2.0 * centred_ramp(phase).abs() - 1.0,
            Waveform::Saw => centred_ramp(phase),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Waveform::Sine => "sine",
            Waveform::Square => "square",
            Waveform::Triangle => "triangle",
            Waveform::Saw => "saw",
        }
    }

    /// Inverse of `self as u8`; unknown values fall back to sine.
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Waveform::Square,
            2 => Waveform::Triangle,
            3 => Waveform::Saw,
            _ => Waveform::Sine,
        }
    }
}

#[inline]
fn centred_ramp(phase: f32) -> f32 {
    let x = phase / TAU;
    2.0 * (x - (x + 0.5).floor())
}

impl fmt::Display for Waveform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Waveform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sine" | "sin" => Ok(Waveform::Sine),
            "square" | "sqr" => Ok(Waveform::Square),
            "triangle" | "tri" => Ok(Waveform::Triangle),
            "saw" | "sawtooth" => Ok(Waveform::Saw),
            other => Err(format!("unknown waveform `{other}`")),
        }
    }
}
