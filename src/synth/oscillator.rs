use std::f32::consts::TAU;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

use arrayvec::ArrayVec;
use parking_lot::Mutex;

use crate::dsp::{AtomicF32, Waveform};
use crate::DEFAULT_SAMPLE_RATE;

/// Upper bound on simultaneously sounding notes per oscillator.
pub const MAX_POLYPHONY: usize = 32;
/// Each note contributes at most this share of the volume.
pub const NOTE_SCALE: f32 = 0.3;
/// Hard ceiling on the mixed output, and on the volume setting.
pub const CLIP_LEVEL: f32 = 0.5;
pub const DEFAULT_VOLUME: f32 = 0.1;

/// A sounding pitch with its own phase accumulator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActiveNote {
    pub frequency: f32,
    /// Radians, kept in [0, 2π).
    pub phase: f32,
}

struct Shared {
    notes: Mutex<ArrayVec<ActiveNote, MAX_POLYPHONY>>,
    waveform: AtomicU8,
    volume: AtomicF32,
    sample_rate: AtomicF32,
    polyphony: AtomicUsize,
}

/// Polyphonic waveform generator.
///
/// Clones are handles to the same generator: the control side keeps one to
/// add and remove notes, the render side keeps another to pull samples.
/// The note set sits behind one lock held for the whole block on the render
/// side and for a single insert or remove on the control side. The set is
/// fixed-capacity, so neither side allocates while holding it.
#[derive(Clone)]
pub struct OscillatorCore {
    shared: Arc<Shared>,
}

impl OscillatorCore {
    pub fn new(sample_rate: f32) -> Self {
        let sample_rate = if sample_rate.is_finite() && sample_rate > 0.0 {
            sample_rate
        } else {
            DEFAULT_SAMPLE_RATE
        };
        Self {
            shared: Arc::new(Shared {
                notes: Mutex::new(ArrayVec::new()),
                waveform: AtomicU8::new(Waveform::Sine as u8),
                volume: AtomicF32::new(DEFAULT_VOLUME),
                sample_rate: AtomicF32::new(sample_rate),
                polyphony: AtomicUsize::new(MAX_POLYPHONY),
            }),
        }
    }

    /// Start a note at phase 0. A frequency that is already sounding is left
    /// alone, so repeated note-ons never stack.
    ///
    /// When the set is full (`MAX_POLYPHONY`, 32 notes, by default) the
    /// oldest note is stolen to make room, so long chords can cut earlier
    /// notes short. Returns `false` for an invalid or duplicate frequency.
    pub fn note_on(&self, frequency: f32) -> bool {
        if !(frequency.is_finite() && frequency > 0.0) {
            return false;
        }
        let limit = self.polyphony();
        let mut notes = self.shared.notes.lock();
        if notes.iter().any(|n| n.frequency == frequency) {
            return false;
        }
        while notes.len() >= limit {
            notes.remove(0);
        }
        notes.push(ActiveNote {
            frequency,
            phase: 0.0,
        });
        true
    }

    /// Stop the note with exactly this frequency, if it is sounding.
    pub fn note_off(&self, frequency: f32) -> bool {
        let mut notes = self.shared.notes.lock();
        match notes.iter().position(|n| n.frequency == frequency) {
            Some(index) => {
                notes.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn all_notes_off(&self) {
        self.shared.notes.lock().clear();
    }

    /// Fill an interleaved buffer, writing the same sample to each of
    /// `channels` channels. A trailing partial frame is left untouched.
    pub fn render(&self, out: &mut [f32], channels: usize) {
        let channels = channels.max(1);
        let waveform = self.waveform();
        let scale = NOTE_SCALE * self.volume();
        let step = TAU / self.sample_rate();

        let mut notes = self.shared.notes.lock();
        for frame in out.chunks_exact_mut(channels) {
            let mut sum = 0.0;
            for note in notes.iter_mut() {
                sum += waveform.sample(note.phase) * scale;
                note.phase = wrap_phase(note.phase + step * note.frequency);
            }
            frame.fill(sum.clamp(-CLIP_LEVEL, CLIP_LEVEL));
        }
    }

    pub fn render_mono(&self, out: &mut [f32]) {
        self.render(out, 1);
    }

    pub fn set_waveform(&self, waveform: Waveform) {
        self.shared.waveform.store(waveform as u8, Ordering::Relaxed);
    }

    pub fn waveform(&self) -> Waveform {
        Waveform::from_u8(self.shared.waveform.load(Ordering::Relaxed))
    }

    /// Volume in [0, 0.5].
    pub fn set_volume(&self, volume: f32) {
        let volume = if volume.is_nan() { 0.0 } else { volume.clamp(0.0, CLIP_LEVEL) };
        self.shared.volume.set(volume);
    }

    pub fn volume(&self) -> f32 {
        self.shared.volume.get()
    }

    pub fn set_sample_rate(&self, sample_rate: f32) {
        if sample_rate.is_finite() && sample_rate > 0.0 {
            self.shared.sample_rate.set(sample_rate);
        }
    }

    pub fn sample_rate(&self) -> f32 {
        self.shared.sample_rate.get()
    }

    /// Cap on simultaneous notes, between 1 and [`MAX_POLYPHONY`].
    pub fn set_polyphony(&self, voices: usize) {
        let voices = voices.clamp(1, MAX_POLYPHONY);
        self.shared.polyphony.store(voices, Ordering::Relaxed);
        let mut notes = self.shared.notes.lock();
        while notes.len() > voices {
            notes.remove(0);
        }
    }

    pub fn polyphony(&self) -> usize {
        self.shared.polyphony.load(Ordering::Relaxed)
    }

    /// Snapshot of the sounding notes.
    pub fn active_notes(&self) -> Vec<ActiveNote> {
        self.shared.notes.lock().to_vec()
    }

    pub fn note_count(&self) -> usize {
        self.shared.notes.lock().len()
    }
}

impl Default for OscillatorCore {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_RATE)
    }
}

#[inline]
fn wrap_phase(phase: f32) -> f32 {
    let wrapped = phase.rem_euclid(TAU);
    // rem_euclid can round up to exactly TAU for tiny negative inputs.
    if wrapped >= TAU {
        0.0
    } else {
        wrapped
    }
}
