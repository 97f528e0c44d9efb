//! Player setup: engine, default patch, audio stream, transport.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use color_eyre::eyre::{eyre, Result as EyreResult, WrapErr};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use rtrb::RingBuffer;
use tracing::{error, info};

use oscillate::{
    engine::Rack,
    io::midi,
    runtime::Session,
    EngineConfig, MidiSequencer, NodeGraph, NodeId, NodeKind, Position, SystemClock,
};

use super::ui::UiApp;
use super::PlayArgs;

/// Samples kept for the scope; the audio thread drops what does not fit.
const SCOPE_CAPACITY: usize = 4096;

const MIN_SPEED: f64 = 0.1;
const MAX_SPEED: f64 = 5.0;

/// The nodes of the default patch.
#[derive(Debug, Clone, Copy)]
pub struct Patch {
    pub oscillator: NodeId,
    pub envelope: NodeId,
    pub filter: NodeId,
}

/// oscillator -> envelope -> filter -> output
fn default_patch(graph: &mut NodeGraph<Rack>) -> EyreResult<Patch> {
    let mut spawn = |kind: NodeKind, x: f32| {
        graph
            .spawn(kind, Position::new(x, 0.0))
            .ok_or_else(|| eyre!("failed to spawn {kind} node"))
    };
    let oscillator = spawn(NodeKind::Oscillator, 0.0)?;
    let envelope = spawn(NodeKind::Envelope, 200.0)?;
    let filter = spawn(NodeKind::Filter, 400.0)?;

    let output = graph.output();
    for (source, dest) in [(oscillator, envelope), (envelope, filter), (filter, output)] {
        graph
            .connect(source, dest)
            .ok_or_else(|| eyre!("failed to wire {source} into {dest}"))?;
    }

    Ok(Patch {
        oscillator,
        envelope,
        filter,
    })
}

pub fn clamp_speed(speed: f64) -> f64 {
    speed.clamp(MIN_SPEED, MAX_SPEED)
}

pub fn play(args: PlayArgs) -> EyreResult<()> {
    let config = match &args.config {
        Some(path) => EngineConfig::load(path)
            .wrap_err_with(|| format!("failed to load config {}", path.display()))?,
        None => EngineConfig::default(),
    };

    // Set up audio
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| eyre!("no default output device available"))?;
    let supported = device
        .default_output_config()
        .wrap_err("failed to fetch default output config")?;

    let channels = supported.channels() as usize;
    let mut stream_config = supported.config();
    if let Some(rate) = args.sample_rate {
        stream_config.sample_rate = cpal::SampleRate(rate);
    }
    let config = config.with_sample_rate(stream_config.sample_rate.0 as f32);

    // Engine
    let clock = Arc::new(SystemClock::new());
    let (rack, mut renderer) = Rack::new(config.sample_rate);
    let mut graph = NodeGraph::new(rack, clock.clone(), config.clone());
    let patch = default_patch(&mut graph)?;
    graph
        .set_param(patch.oscillator, "waveform", args.waveform.as_str())
        .wrap_err("invalid --waveform")?;

    let mut sequencer = MidiSequencer::new(clock);
    let file = sequencer
        .load_file(&args.file)
        .wrap_err_with(|| format!("failed to load {}", args.file.display()))?;
    sequencer.set_playback_speed(clamp_speed(args.speed));

    // Audio stream; the renderer moves onto the audio thread.
    let (mut scope_tx, scope_rx) = RingBuffer::<f32>::new(SCOPE_CAPACITY);
    let stream = device.build_output_stream(
        &stream_config,
        move |data: &mut [f32], _| {
            renderer.render(data, channels);
            for frame in data.chunks(channels) {
                let _ = scope_tx.push(frame[0]);
            }
        },
        |err| error!(%err, "audio stream error"),
        None,
    )?;
    stream.play()?;

    let mut session = Session::start(graph, sequencer, config.clone())?;
    info!(
        file = %args.file.display(),
        events = file.events.len(),
        duration = file.duration,
        sample_rate = config.sample_rate,
        channels,
        "ready"
    );

    if args.headless {
        session.play()?;
        while session.is_playing() {
            std::thread::sleep(Duration::from_millis(100));
        }
        session.stop();
        return Ok(());
    }

    let title = args
        .file
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut terminal = ratatui::init();
    let result = UiApp::new(&mut session, patch, scope_rx, title, config.sample_rate).run(&mut terminal);
    ratatui::restore();
    session.stop();
    result
}

pub fn inspect(path: &Path) -> EyreResult<()> {
    let file = midi::parse_file(path).wrap_err_with(|| format!("failed to parse {}", path.display()))?;

    println!("=== {} ===", path.display());
    println!("Format: {}", file.format);
    println!("Tracks: {}", file.track_count);
    println!("Ticks per quarter: {}", file.ticks_per_quarter);
    println!("Duration: {:.3} s", file.duration);
    if !file.truncated_tracks.is_empty() {
        println!("Truncated tracks: {:?}", file.truncated_tracks);
    }
    println!();

    for event in &file.events {
        println!(
            "{:>10.4}  {:<8}  note {:>3} ({:>8.2} Hz)  vel {:>3}  ch {:>2}  track {}",
            event.timestamp,
            event.kind,
            event.note,
            event.frequency(),
            event.velocity,
            event.channel,
            event.track,
        );
    }
    Ok(())
}
