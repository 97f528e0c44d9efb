use std::io::Write;
use std::sync::Arc;

use oscillate::engine::{Rack, RackRenderer};
use oscillate::{
    EngineConfig, ManualClock, MidiError, MidiEventKind, MidiSequencer, NodeGraph, NodeKind,
    Position,
};

/// One track, 96 ticks per quarter at the default tempo: middle C for half
/// a second, then E for a quarter.
fn two_note_song() -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(b"MThd");
    bytes.extend_from_slice(&6u32.to_be_bytes());
    bytes.extend_from_slice(&[0, 0, 0, 1, 0, 96]);

    let track: &[u8] = &[
        0x00, 0x90, 60, 100, // C4 on
        0x60, 0x80, 60, 0, // C4 off at 0.5 s
        0x00, 0x90, 64, 90, // E4 on
        0x30, 64, 0, // running status, velocity 0 is note off, 0.75 s
        0x00, 0xFF, 0x2F, 0x00,
    ];
    bytes.extend_from_slice(b"MTrk");
    bytes.extend_from_slice(&(track.len() as u32).to_be_bytes());
    bytes.extend_from_slice(track);
    bytes
}

fn patched() -> (NodeGraph<Rack>, RackRenderer, ManualClock, oscillate::NodeId) {
    let clock = ManualClock::new();
    let (rack, renderer) = Rack::new(44_100.0);
    let mut graph = NodeGraph::new(rack, Arc::new(clock.clone()), EngineConfig::default());
    let osc = graph.spawn(NodeKind::Oscillator, Position::default()).unwrap();
    let out = graph.output();
    graph.connect(osc, out).unwrap();
    (graph, renderer, clock, osc)
}

fn peak(renderer: &mut RackRenderer) -> f32 {
    let mut buffer = vec![0.0f32; 1024];
    renderer.render(&mut buffer, 2);
    buffer.iter().fold(0.0f32, |acc, x| acc.max(x.abs()))
}

#[test]
fn midi_file_drives_the_patch() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&two_note_song()).unwrap();

    let (mut graph, mut renderer, clock, _osc) = patched();
    let mut sequencer = MidiSequencer::new(Arc::new(clock.clone()));
    let song = sequencer.load_file(file.path()).unwrap();

    assert_eq!(song.track_count, 1);
    assert_eq!(song.events.len(), 4);
    assert_eq!(song.events[3].kind, MidiEventKind::NoteOff);
    assert!((song.duration - 0.75).abs() < 1e-9);
    assert_eq!(peak(&mut renderer), 0.0);

    sequencer.play().unwrap();
    assert_eq!(sequencer.tick(&mut graph), 1);
    assert!(peak(&mut renderer) > 0.0);

    clock.advance(0.6);
    assert_eq!(sequencer.tick(&mut graph), 2);
    assert_eq!(sequencer.sounding_notes(), 1);
    assert!(peak(&mut renderer) > 0.0);

    clock.advance(0.2);
    sequencer.tick(&mut graph);
    assert!(!sequencer.is_playing());
    assert_eq!(peak(&mut renderer), 0.0);
}

#[test]
fn stopping_mid_note_silences_the_output() {
    let (mut graph, mut renderer, clock, _osc) = patched();
    let mut sequencer = MidiSequencer::new(Arc::new(clock.clone()));
    sequencer.load(oscillate::io::midi::parse(&two_note_song()).unwrap().events);

    sequencer.play().unwrap();
    sequencer.tick(&mut graph);
    assert!(peak(&mut renderer) > 0.0);

    sequencer.stop(&mut graph);
    assert_eq!(peak(&mut renderer), 0.0);
}

#[test]
fn double_speed_reaches_the_end_in_half_the_time() {
    let (mut graph, _renderer, clock, _osc) = patched();
    let mut sequencer = MidiSequencer::new(Arc::new(clock.clone()));
    sequencer.load(oscillate::io::midi::parse(&two_note_song()).unwrap().events);
    sequencer.set_playback_speed(2.0);

    sequencer.play().unwrap();
    sequencer.tick(&mut graph);
    clock.advance(0.4);
    sequencer.tick(&mut graph);
    assert!(!sequencer.is_playing());
    assert!((sequencer.song_position() - 0.8).abs() < 1e-9);
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut sequencer = MidiSequencer::new(Arc::new(ManualClock::new()));
    let err = sequencer.load_file(dir.path().join("absent.mid")).unwrap_err();
    assert!(matches!(err, MidiError::Io(_)));
    assert!(sequencer.events().is_empty());
}

#[test]
fn removing_the_oscillator_silences_the_rack() {
    let (mut graph, mut renderer, _clock, osc) = patched();
    graph.note_on(440.0);
    assert!(peak(&mut renderer) > 0.0);

    assert!(graph.remove_node(osc));
    assert!(graph.connections().is_empty());
    assert_eq!(peak(&mut renderer), 0.0);
}
