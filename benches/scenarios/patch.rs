//! The default player patch rendered through the rack, with and without
//! effects on the chain.

use std::hint::black_box;
use std::sync::Arc;

use criterion::{BenchmarkId, Criterion};
use oscillate::engine::Rack;
use oscillate::{EngineConfig, ManualClock, NodeGraph, NodeKind, Position};

use crate::BLOCK_SIZES;

fn chain(kinds: &[NodeKind]) -> (NodeGraph<Rack>, oscillate::engine::RackRenderer) {
    let (rack, renderer) = Rack::new(44_100.0);
    let clock = ManualClock::new();
    let mut graph = NodeGraph::new(rack, Arc::new(clock.clone()), EngineConfig::default());

    let mut previous = None;
    for &kind in kinds {
        if let Some(id) = graph.spawn(kind, Position::default()) {
            if let Some(prev) = previous {
                graph.connect(prev, id);
            }
            previous = Some(id);
        }
    }
    if let Some(last) = previous {
        let out = graph.output();
        graph.connect(last, out);
    }

    for note in [60u8, 64, 67, 71] {
        graph.note_on(oscillate::io::midi::note_to_frequency(note));
    }
    clock.advance(0.3);
    graph.tick();
    (graph, renderer)
}

pub fn bench_patch(c: &mut Criterion) {
    let mut group = c.benchmark_group("scenarios/patch");

    let layouts: [(&str, &[NodeKind]); 2] = [
        (
            "osc_env_filter",
            &[NodeKind::Oscillator, NodeKind::Envelope, NodeKind::Filter],
        ),
        (
            "full_chain",
            &[
                NodeKind::Oscillator,
                NodeKind::Envelope,
                NodeKind::Filter,
                NodeKind::Distortion,
                NodeKind::Pitch,
                NodeKind::Resonance,
                NodeKind::Reverb,
            ],
        ),
    ];

    for (name, kinds) in layouts {
        // Keep the graph alive so its units stay attached.
        let (_graph, mut renderer) = chain(kinds);
        for &size in BLOCK_SIZES {
            let mut buffer = vec![0.0f32; size * 2];
            group.bench_with_input(BenchmarkId::new(name, size), &size, |b, _| {
                b.iter(|| renderer.render(black_box(&mut buffer), 2))
            });
        }
    }

    group.finish();
}
