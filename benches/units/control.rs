//! Control-rate ticks: one call per period, so these bench single steps.

use std::hint::black_box;

use criterion::Criterion;
use oscillate::dsp::automation::FilterAutomation;
use oscillate::dsp::envelope::EnvelopeGenerator;

pub fn bench_envelope(c: &mut Criterion) {
    let mut group = c.benchmark_group("units/envelope");

    let mut env = EnvelopeGenerator::adsr(0.1, 0.1, 0.5, 0.3);
    env.note_on(0.0);
    let mut now = 0.0;
    group.bench_function("tick_sustain", |b| {
        b.iter(|| {
            now += 0.001;
            black_box(env.tick(black_box(now)))
        })
    });

    let mut env = EnvelopeGenerator::adsr(0.1, 0.1, 0.5, 0.3);
    let mut now = 0.0;
    group.bench_function("press_release", |b| {
        b.iter(|| {
            now += 0.001;
            env.note_on(now);
            env.note_off(now);
            black_box(env.tick(now))
        })
    });

    group.finish();
}

pub fn bench_automation(c: &mut Criterion) {
    let mut group = c.benchmark_group("units/automation");

    let mut sweep = FilterAutomation::new(1_000.0, 200.0, 8_000.0);
    sweep.set_enabled(true);
    group.bench_function("tick", |b| {
        b.iter(|| {
            if !sweep.is_sweeping() {
                sweep.note_on();
            }
            black_box(sweep.tick())
        })
    });

    group.finish();
}
