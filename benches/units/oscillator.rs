//! Benchmarks for the polyphonic oscillator core.

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion};
use oscillate::dsp::Waveform;
use oscillate::OscillatorCore;

use crate::BLOCK_SIZES;

pub fn bench_oscillator(c: &mut Criterion) {
    let mut group = c.benchmark_group("units/oscillator");

    for &size in BLOCK_SIZES {
        let mut buffer = vec![0.0f32; size];

        for waveform in Waveform::ALL {
            let core = OscillatorCore::new(44_100.0);
            core.set_waveform(waveform);
            core.note_on(440.0);
            group.bench_with_input(BenchmarkId::new(waveform.name(), size), &size, |b, _| {
                b.iter(|| core.render_mono(black_box(&mut buffer)))
            });
        }

        // Chord at the polyphony limit, stereo interleaved
        let core = OscillatorCore::new(44_100.0);
        for n in 0..32 {
            core.note_on(110.0 * 2f32.powf(n as f32 / 12.0));
        }
        let mut stereo = vec![0.0f32; size * 2];
        group.bench_with_input(BenchmarkId::new("full_chord", size), &size, |b, _| {
            b.iter(|| core.render(black_box(&mut stereo), 2))
        });
    }

    group.finish();
}
