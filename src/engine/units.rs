use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use crate::dsp::distortion::{Distortion, DistortionPreset, MAX_DRIVE};
use crate::dsp::filter::{
    FilterMode, PeakingFilter, StateVariableFilter, MAX_BANDWIDTH, MAX_CUTOFF, MAX_PEAK_FREQUENCY,
    MAX_PEAK_GAIN_DB, MAX_RESONANCE, MIN_BANDWIDTH, MIN_CUTOFF,
};
use crate::dsp::pitch::{PitchShifter, MAX_CENTS, MAX_SEMITONES};
use crate::dsp::reverb::{Reverb, ReverbPreset};
use crate::dsp::AtomicF32;
use crate::engine::{ProcessingUnit, UnitHandle, UnitId};
use crate::synth::OscillatorCore;
use crate::MAX_BLOCK_SIZE;

// Parameter cells. The control side writes, the render side reads once per
// block. Setters clamp; NaN leaves the old value in place.

fn store_clamped(cell: &AtomicF32, value: f32, min: f32, max: f32) {
    if !value.is_nan() {
        cell.set(value.clamp(min, max));
    }
}

pub struct EqualizerParams {
    mode: AtomicU8,
    cutoff: AtomicF32,
    resonance: AtomicF32,
}

impl EqualizerParams {
    pub fn new() -> Self {
        Self {
            mode: AtomicU8::new(FilterMode::LowPass as u8),
            cutoff: AtomicF32::new(1_000.0),
            resonance: AtomicF32::new(0.0),
        }
    }

    pub fn set_mode(&self, mode: FilterMode) {
        self.mode.store(mode as u8, Ordering::Relaxed);
    }

    pub fn mode(&self) -> FilterMode {
        FilterMode::from_u8(self.mode.load(Ordering::Relaxed))
    }

    pub fn set_cutoff(&self, hz: f32) {
        store_clamped(&self.cutoff, hz, MIN_CUTOFF, MAX_CUTOFF);
    }

    pub fn cutoff(&self) -> f32 {
        self.cutoff.get()
    }

    pub fn set_resonance(&self, resonance: f32) {
        store_clamped(&self.resonance, resonance, 0.0, MAX_RESONANCE);
    }

    pub fn resonance(&self) -> f32 {
        self.resonance.get()
    }
}

impl Default for EqualizerParams {
    fn default() -> Self {
        Self::new()
    }
}

/// One parametric band: centre, boost, width.
pub struct PeakParams {
    frequency: AtomicF32,
    gain_db: AtomicF32,
    bandwidth: AtomicF32,
}

impl PeakParams {
    pub fn new() -> Self {
        Self {
            frequency: AtomicF32::new(1_000.0),
            gain_db: AtomicF32::new(0.0),
            bandwidth: AtomicF32::new(0.5),
        }
    }

    pub fn set_frequency(&self, hz: f32) {
        store_clamped(&self.frequency, hz, MIN_CUTOFF, MAX_PEAK_FREQUENCY);
    }

    pub fn frequency(&self) -> f32 {
        self.frequency.get()
    }

    pub fn set_gain_db(&self, db: f32) {
        store_clamped(&self.gain_db, db, 0.0, MAX_PEAK_GAIN_DB);
    }

    pub fn gain_db(&self) -> f32 {
        self.gain_db.get()
    }

    /// Width in octaves.
    pub fn set_bandwidth(&self, octaves: f32) {
        store_clamped(&self.bandwidth, octaves, MIN_BANDWIDTH, MAX_BANDWIDTH);
    }

    pub fn bandwidth(&self) -> f32 {
        self.bandwidth.get()
    }
}

impl Default for PeakParams {
    fn default() -> Self {
        Self::new()
    }
}

pub struct ReverbParams {
    preset: AtomicU8,
    mix: AtomicF32,
}

impl ReverbParams {
    pub fn new() -> Self {
        Self {
            preset: AtomicU8::new(ReverbPreset::LargeHall as u8),
            mix: AtomicF32::new(100.0),
        }
    }

    pub fn set_preset(&self, preset: ReverbPreset) {
        self.preset.store(preset as u8, Ordering::Relaxed);
    }

    pub fn preset(&self) -> ReverbPreset {
        ReverbPreset::from_u8(self.preset.load(Ordering::Relaxed))
    }

    /// Wet share in percent.
    pub fn set_mix(&self, percent: f32) {
        store_clamped(&self.mix, percent, 0.0, 100.0);
    }

    pub fn mix(&self) -> f32 {
        self.mix.get()
    }
}

impl Default for ReverbParams {
    fn default() -> Self {
        Self::new()
    }
}

pub struct DistortionParams {
    preset: AtomicU8,
    drive: AtomicF32,
    mix: AtomicF32,
}

impl DistortionParams {
    pub fn new() -> Self {
        Self {
            preset: AtomicU8::new(DistortionPreset::Tube as u8),
            drive: AtomicF32::new(6.0),
            mix: AtomicF32::new(50.0),
        }
    }

    pub fn set_preset(&self, preset: DistortionPreset) {
        self.preset.store(preset as u8, Ordering::Relaxed);
    }

    pub fn preset(&self) -> DistortionPreset {
        DistortionPreset::from_u8(self.preset.load(Ordering::Relaxed))
    }

    pub fn set_drive(&self, drive: f32) {
        store_clamped(&self.drive, drive, 0.0, MAX_DRIVE);
    }

    pub fn drive(&self) -> f32 {
        self.drive.get()
    }

    pub fn set_mix(&self, percent: f32) {
        store_clamped(&self.mix, percent, 0.0, 100.0);
    }

    pub fn mix(&self) -> f32 {
        self.mix.get()
    }
}

impl Default for DistortionParams {
    fn default() -> Self {
        Self::new()
    }
}

pub struct PitchParams {
    semitones: AtomicF32,
    cents: AtomicF32,
}

impl PitchParams {
    pub fn new() -> Self {
        Self {
            semitones: AtomicF32::new(0.0),
            cents: AtomicF32::new(0.0),
        }
    }

    /// Whole semitones; fractional input is rounded.
    pub fn set_semitones(&self, semitones: f32) {
        store_clamped(&self.semitones, semitones.round(), -MAX_SEMITONES, MAX_SEMITONES);
    }

    pub fn semitones(&self) -> f32 {
        self.semitones.get()
    }

    pub fn set_cents(&self, cents: f32) {
        store_clamped(&self.cents, cents, -MAX_CENTS, MAX_CENTS);
    }

    pub fn cents(&self) -> f32 {
        self.cents.get()
    }
}

impl Default for PitchParams {
    fn default() -> Self {
        Self::new()
    }
}

/// Render-side state of one attached unit.
///
/// Built on the control side (it allocates the DSP buffers) and moved to the
/// render side whole.
pub(crate) struct UnitSlot {
    id: UnitId,
    dsp: UnitDsp,
    output: Vec<f32>,
}

enum UnitDsp {
    Source(OscillatorCore),
    Gain {
        target: Arc<AtomicF32>,
        current: f32,
    },
    Equalizer {
        params: Arc<EqualizerParams>,
        filter: StateVariableFilter,
    },
    Peak {
        params: Arc<PeakParams>,
        filter: PeakingFilter,
    },
    Reverb {
        params: Arc<ReverbParams>,
        reverb: Reverb,
    },
    Distortion {
        params: Arc<DistortionParams>,
        distortion: Distortion,
    },
    Pitch {
        params: Arc<PitchParams>,
        shifter: PitchShifter,
    },
}

impl UnitSlot {
    pub(crate) fn new(handle: &UnitHandle, sample_rate: f32) -> Self {
        let dsp = match handle.unit() {
            ProcessingUnit::Source(osc) => UnitDsp::Source(osc.clone()),
            ProcessingUnit::Mixer(gain) | ProcessingUnit::Output(gain) => UnitDsp::Gain {
                target: Arc::clone(gain),
                current: gain.get(),
            },
            ProcessingUnit::Equalizer(params) => UnitDsp::Equalizer {
                params: Arc::clone(params),
                filter: StateVariableFilter::new(sample_rate),
            },
            ProcessingUnit::ParametricEq(params) => UnitDsp::Peak {
                params: Arc::clone(params),
                filter: PeakingFilter::new(sample_rate),
            },
            ProcessingUnit::Reverb(params) => UnitDsp::Reverb {
                params: Arc::clone(params),
                reverb: Reverb::new(sample_rate),
            },
            ProcessingUnit::Distortion(params) => UnitDsp::Distortion {
                params: Arc::clone(params),
                distortion: Distortion::new(),
            },
            ProcessingUnit::TimePitch(params) => UnitDsp::Pitch {
                params: Arc::clone(params),
                shifter: PitchShifter::new(sample_rate),
            },
        };

        Self {
            id: handle.id(),
            dsp,
            output: vec![0.0; MAX_BLOCK_SIZE],
        }
    }

    pub(crate) fn id(&self) -> UnitId {
        self.id
    }

    pub(crate) fn output(&self, frames: usize) -> &[f32] {
        &self.output[..frames]
    }

    /// Produce `input.len()` frames into this slot's output buffer.
    pub(crate) fn process(&mut self, input: &[f32]) {
        let frames = input.len().min(MAX_BLOCK_SIZE);
        let input = &input[..frames];
        let out = &mut self.output[..frames];

        match &mut self.dsp {
            UnitDsp::Source(osc) => osc.render_mono(out),
            UnitDsp::Gain { target, current } => {
                // Ramp across the block so control-rate steps do not click.
                let goal = target.get();
                let step = (goal - *current) / frames.max(1) as f32;
                for (o, &x) in out.iter_mut().zip(input) {
                    *current += step;
                    *o = x * *current;
                }
                *current = goal;
            }
            UnitDsp::Equalizer { params, filter } => {
                filter.configure(params.mode(), params.cutoff(), params.resonance());
                out.copy_from_slice(input);
                filter.render(out);
            }
            UnitDsp::Peak { params, filter } => {
                filter.configure(params.frequency(), params.gain_db(), params.bandwidth());
                out.copy_from_slice(input);
                filter.render(out);
            }
            UnitDsp::Reverb { params, reverb } => {
                reverb.configure(params.preset(), params.mix());
                out.copy_from_slice(input);
                reverb.render(out);
            }
            UnitDsp::Distortion { params, distortion } => {
                distortion.configure(params.preset(), params.drive(), params.mix());
                out.copy_from_slice(input);
                distortion.render(out);
            }
            UnitDsp::Pitch { params, shifter } => {
                shifter.configure(params.semitones(), params.cents());
                out.copy_from_slice(input);
                shifter.render(out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_clamp_and_ignore_nan() {
        let eq = EqualizerParams::new();
        eq.set_cutoff(5.0);
        assert_eq!(eq.cutoff(), MIN_CUTOFF);
        eq.set_cutoff(f32::NAN);
        assert_eq!(eq.cutoff(), MIN_CUTOFF);

        let peak = PeakParams::new();
        peak.set_gain_db(30.0);
        assert_eq!(peak.gain_db(), MAX_PEAK_GAIN_DB);
        peak.set_bandwidth(0.0);
        assert_eq!(peak.bandwidth(), MIN_BANDWIDTH);

        let pitch = PitchParams::new();
        pitch.set_semitones(3.4);
        assert_eq!(pitch.semitones(), 3.0);
        pitch.set_semitones(-99.0);
        assert_eq!(pitch.semitones(), -MAX_SEMITONES);
    }

    #[test]
    fn gain_slot_ramps_to_target() {
        let gain = Arc::new(AtomicF32::new(0.0));
        let handle = UnitHandle::new(ProcessingUnit::Mixer(Arc::clone(&gain)));
        let mut slot = UnitSlot::new(&handle, 44_100.0);

        gain.set(1.0);
        slot.process(&[1.0; 4]);
        assert_eq!(slot.output(4), &[0.25, 0.5, 0.75, 1.0]);

        slot.process(&[0.5; 2]);
        assert_eq!(slot.output(2), &[0.5, 0.5]);
    }

    #[test]
    fn source_slot_ignores_input() {
        let osc = OscillatorCore::new(44_100.0);
        let handle = UnitHandle::new(ProcessingUnit::Source(osc));
        let mut slot = UnitSlot::new(&handle, 44_100.0);
        slot.process(&[1.0; 8]);
        assert!(slot.output(8).iter().all(|&s| s == 0.0));
    }

    #[test]
    fn peak_slot_boosts_its_band() {
        let params = Arc::new(PeakParams::new());
        params.set_frequency(1_000.0);
        params.set_gain_db(6.0);
        let handle = UnitHandle::new(ProcessingUnit::ParametricEq(Arc::clone(&params)));
        let mut slot = UnitSlot::new(&handle, 48_000.0);

        let input: Vec<f32> = (0..MAX_BLOCK_SIZE)
            .map(|n| (std::f32::consts::TAU * 1_000.0 * n as f32 / 48_000.0).sin())
            .collect();
        slot.process(&input);
        let peak = slot.output(MAX_BLOCK_SIZE)[MAX_BLOCK_SIZE / 2..]
            .iter()
            .fold(0.0f32, |acc, x| acc.max(x.abs()));
        assert!((peak - 10f32.powf(6.0 / 20.0)).abs() < 0.05, "peak = {peak}");
    }
}
