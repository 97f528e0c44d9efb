use std::collections::HashSet;
use std::f32::consts::TAU;
use std::sync::Arc;

use oscillate::dsp::envelope::EnvelopeGenerator;
use oscillate::dsp::Waveform;
use oscillate::engine::Rack;
use oscillate::synth::oscillator::CLIP_LEVEL;
use oscillate::{EngineConfig, ManualClock, NodeGraph, NodeKind, OscillatorCore, Position};
use proptest::prelude::*;

#[derive(Clone, Debug)]
enum Operation {
    Spawn { kind_hint: u8 },
    Connect { source_hint: u8, dest_hint: u8 },
    Disconnect { wire_hint: u8 },
    Remove { node_hint: u8 },
}

fn operation_strategy() -> impl Strategy<Value = Operation> {
    prop_oneof![
        any::<u8>().prop_map(|kind_hint| Operation::Spawn { kind_hint }),
        (any::<u8>(), any::<u8>()).prop_map(|(source_hint, dest_hint)| Operation::Connect {
            source_hint,
            dest_hint,
        }),
        any::<u8>().prop_map(|wire_hint| Operation::Disconnect { wire_hint }),
        any::<u8>().prop_map(|node_hint| Operation::Remove { node_hint }),
    ]
}

proptest! {
    #[test]
    fn random_edits_keep_wires_consistent(ops in prop::collection::vec(operation_strategy(), 1..48)) {
        let (rack, mut renderer) = Rack::new(44_100.0);
        let mut graph = NodeGraph::new(rack, Arc::new(ManualClock::new()), EngineConfig::default());
        let mut scratch = vec![0.0f32; 64];

        for op in ops {
            let ids: Vec<_> = graph.nodes().iter().map(|n| n.id()).collect();
            let pick = |hint: u8| ids[hint as usize % ids.len()];

            match op {
                Operation::Spawn { kind_hint } => {
                    // Output is unique; everything else may repeat.
                    let kinds = &NodeKind::ALL[..NodeKind::ALL.len() - 1];
                    let kind = kinds[kind_hint as usize % kinds.len()];
                    let _ = graph.spawn(kind, Position::default());
                }
                Operation::Connect { source_hint, dest_hint } => {
                    let _ = graph.connect(pick(source_hint), pick(dest_hint));
                }
                Operation::Disconnect { wire_hint } => {
                    let wires: Vec<_> = graph.connections().iter().map(|c| c.id).collect();
                    if !wires.is_empty() {
                        prop_assert!(graph.disconnect(wires[wire_hint as usize % wires.len()]));
                    }
                }
                Operation::Remove { node_hint } => {
                    let id = pick(node_hint);
                    prop_assert_eq!(graph.remove_node(id), id != graph.output());
                }
            }
            // Keep the command queue drained, as an audio callback would.
            renderer.render(&mut scratch, 1);

            let live: HashSet<_> = graph.nodes().iter().map(|n| n.id()).collect();
            prop_assert!(live.contains(&graph.output()));

            let mut pairs = HashSet::new();
            for wire in graph.connections() {
                prop_assert!(live.contains(&wire.source));
                prop_assert!(live.contains(&wire.dest));
                prop_assert_ne!(wire.source, wire.dest);
                prop_assert_ne!(wire.source, graph.output());
                prop_assert!(pairs.insert((wire.source, wire.dest)));
            }
            prop_assert_eq!(graph.backend().routes().len(), graph.connections().len());
        }
    }

    #[test]
    fn mixed_notes_never_exceed_the_clip_level(
        notes in prop::collection::vec(20.0f32..8_000.0, 1..32),
        volume in 0.0f32..1.0,
        shape in 0u8..4,
    ) {
        let core = OscillatorCore::new(44_100.0);
        core.set_waveform(Waveform::from_u8(shape));
        core.set_volume(volume);
        for frequency in &notes {
            core.note_on(*frequency);
        }

        let mut buffer = vec![0.0f32; 2048];
        core.render_mono(&mut buffer);
        prop_assert!(buffer.iter().all(|s| s.abs() <= CLIP_LEVEL));

        for note in core.active_notes() {
            prop_assert!((0.0..TAU).contains(&note.phase));
        }
    }

    #[test]
    fn envelope_gain_stays_in_unit_range(
        presses in prop::collection::vec((0.0f64..0.5, any::<bool>()), 1..24),
        sustain in 0.0f32..1.0,
    ) {
        let mut env = EnvelopeGenerator::adsr(0.05, 0.05, sustain, 0.1);
        let mut now = 0.0;
        for (gap, press) in presses {
            now += gap;
            if press {
                env.note_on(now);
            } else {
                env.note_off(now);
            }
            let gain = env.tick(now);
            prop_assert!((0.0..=1.0).contains(&gain));
        }
        let tail = env.tick(now + 10.0);
        prop_assert!((0.0..=1.0).contains(&tail));
    }
}
