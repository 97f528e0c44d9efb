//! Control-rate execution.
//!
//! A [`Session`] owns the graph and the sequencer behind one lock and drives
//! them from two independent periodic tasks:
//!
//! - the control task ticks envelopes and filter automation at
//!   `control_rate`, for as long as the session lives;
//! - the sequencer task dispatches MIDI events at `sequencer_rate` while
//!   playback runs, and ends itself when the song does.
//!
//! Interactive calls (keys, parameter edits, transport) take the same lock,
//! so every mutation of graph or sequencer state is serialized. The render
//! side never takes it.

use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::engine::AudioBackend;
use crate::error::RuntimeError;
use crate::graph::NodeGraph;
use crate::sequencing::MidiSequencer;

/// A closure run on its own thread at a fixed period until it breaks or
/// the task is stopped.
pub struct PeriodicTask {
    name: &'static str,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicTask {
    pub fn spawn<F>(name: &'static str, period: Duration, mut step: F) -> Result<Self, RuntimeError>
    where
        F: FnMut() -> ControlFlow<()> + Send + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);

        let handle = thread::Builder::new()
            .name(format!("oscillate-{name}"))
            .spawn(move || {
                let mut deadline = Instant::now();
                while flag.load(Ordering::Acquire) {
                    if step().is_break() {
                        break;
                    }
                    deadline += period;
                    let now = Instant::now();
                    if deadline > now {
                        thread::sleep(deadline - now);
                    } else {
                        // Fell behind; do not try to catch up with a burst.
                        deadline = now;
                    }
                }
                flag.store(false, Ordering::Release);
            })
            .map_err(|source| RuntimeError::Spawn { name, source })?;

        debug!(task = name, ?period, "periodic task started");
        Ok(Self {
            name,
            running,
            handle: Some(handle),
        })
    }

    /// Still looping. Turns false once the closure breaks or after `stop`.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Ask the loop to end and wait for the thread. The closure is not
    /// called again after this returns.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!(task = self.name, "periodic task panicked");
            } else {
                debug!(task = self.name, "periodic task stopped");
            }
        }
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Everything the periodic tasks and the interactive side share.
pub struct Playback<B: AudioBackend> {
    pub graph: NodeGraph<B>,
    pub sequencer: MidiSequencer,
}

pub struct Session<B: AudioBackend + 'static> {
    shared: Arc<Mutex<Playback<B>>>,
    config: EngineConfig,
    control: Option<PeriodicTask>,
    sequencer: Option<PeriodicTask>,
}

impl<B: AudioBackend + 'static> Session<B> {
    /// Take ownership of the graph and sequencer and start the control task.
    pub fn start(
        graph: NodeGraph<B>,
        sequencer: MidiSequencer,
        config: EngineConfig,
    ) -> Result<Self, RuntimeError> {
        let shared = Arc::new(Mutex::new(Playback { graph, sequencer }));

        let control = {
            let shared = Arc::clone(&shared);
            PeriodicTask::spawn("control", period(config.control_rate), move || {
                shared.lock().graph.tick();
                ControlFlow::Continue(())
            })?
        };

        Ok(Self {
            shared,
            config,
            control: Some(control),
            sequencer: None,
        })
    }

    /// Start the loaded sequence from the top.
    pub fn play(&mut self) -> Result<(), RuntimeError> {
        // Never join while holding the lock: the task takes it every tick.
        self.stop_sequencer_task();
        self.shared.lock().sequencer.play()?;

        let shared = Arc::clone(&self.shared);
        let task = PeriodicTask::spawn("sequencer", period(self.config.sequencer_rate), move || {
            let mut guard = shared.lock();
            let Playback { graph, sequencer } = &mut *guard;
            sequencer.tick(graph);
            if sequencer.is_playing() {
                ControlFlow::Continue(())
            } else {
                ControlFlow::Break(())
            }
        })?;
        self.sequencer = Some(task);
        Ok(())
    }

    /// Stop playback and release every note it left sounding. The
    /// sequencer task has ended when this returns.
    pub fn stop(&mut self) {
        self.stop_sequencer_task();
        let mut guard = self.shared.lock();
        let Playback { graph, sequencer } = &mut *guard;
        sequencer.stop(graph);
    }

    pub fn toggle(&mut self) -> Result<bool, RuntimeError> {
        if self.is_playing() {
            self.stop();
            Ok(false)
        } else {
            self.play()?;
            Ok(true)
        }
    }

    pub fn is_playing(&self) -> bool {
        self.shared.lock().sequencer.is_playing()
    }

    /// Whether the sequencer task is still looping.
    pub fn sequencer_running(&self) -> bool {
        self.sequencer.as_ref().is_some_and(PeriodicTask::is_running)
    }

    pub fn note_on(&self, frequency: f32) {
        self.shared.lock().graph.note_on(frequency);
    }

    pub fn note_off(&self, frequency: f32) {
        self.shared.lock().graph.note_off(frequency);
    }

    pub fn set_playback_speed(&self, speed: f64) {
        self.shared.lock().sequencer.set_playback_speed(speed);
    }

    /// Lock the shared state for inspection or edits.
    pub fn lock(&self) -> MutexGuard<'_, Playback<B>> {
        self.shared.lock()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Stop both tasks and hand back the graph and sequencer.
    pub fn shutdown(mut self) -> Option<Playback<B>> {
        self.stop();
        if let Some(mut control) = self.control.take() {
            control.stop();
        }
        let shared = Arc::clone(&self.shared);
        drop(self);
        Arc::into_inner(shared).map(Mutex::into_inner)
    }

    fn stop_sequencer_task(&mut self) {
        if let Some(mut task) = self.sequencer.take() {
            task.stop();
        }
    }
}

impl<B: AudioBackend + 'static> Drop for Session<B> {
    fn drop(&mut self) {
        self.stop_sequencer_task();
        if let Some(mut control) = self.control.take() {
            control.stop();
        }
    }
}

fn period(rate_hz: f64) -> Duration {
    Duration::from_secs_f64(1.0 / rate_hz.max(1.0))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::clock::ManualClock;
    use crate::engine::Rack;
    use crate::graph::{NodeKind, Position};
    use crate::io::midi::MidiEvent;

    fn wait_for(mut done: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if done() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        done()
    }

    fn session(events: Vec<MidiEvent>) -> (Session<Rack>, ManualClock) {
        let clock = ManualClock::new();
        let (rack, _renderer) = Rack::new(44_100.0);
        let config = EngineConfig::default();
        let graph = NodeGraph::new(rack, Arc::new(clock.clone()), config.clone());
        let mut sequencer = MidiSequencer::new(Arc::new(clock.clone()));
        sequencer.load(events);
        (Session::start(graph, sequencer, config).unwrap(), clock)
    }

    #[test]
    fn periodic_task_stops_on_break_and_on_request() {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let finite = PeriodicTask::spawn("finite", Duration::from_millis(1), move || {
            if seen.fetch_add(1, Ordering::Relaxed) == 2 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })
        .unwrap();
        assert!(wait_for(|| !finite.is_running()));
        assert_eq!(count.load(Ordering::Relaxed), 3);

        let mut endless =
            PeriodicTask::spawn("endless", Duration::from_millis(1), || ControlFlow::Continue(()))
                .unwrap();
        endless.stop();
        assert!(!endless.is_running());
    }

    #[test]
    fn control_task_ticks_envelopes() {
        let (session, clock) = session(Vec::new());
        let env = session
            .lock()
            .graph
            .spawn(NodeKind::Envelope, Position::default())
            .unwrap();

        session.note_on(440.0);
        // Sustain level once attack and decay have run.
        assert!(wait_for(|| {
            clock.advance(0.05);
            session.lock().graph.meter(env) == Some(0.5)
        }));
    }

    #[test]
    fn sequencer_task_ends_with_the_song() {
        let (mut session, clock) = session(vec![
            MidiEvent::note_on(0.0, 60, 100),
            MidiEvent::note_off(0.5, 60),
        ]);
        session.play().unwrap();
        assert!(session.is_playing());

        clock.advance(1.0);
        assert!(wait_for(|| !session.is_playing()));
        assert!(wait_for(|| !session.sequencer_running()));
    }

    #[test]
    fn stop_joins_and_releases_notes() {
        let (mut session, _clock) = session(vec![
            MidiEvent::note_on(0.0, 60, 100),
            MidiEvent::note_off(10.0, 60),
        ]);
        let osc = session
            .lock()
            .graph
            .spawn(NodeKind::Oscillator, Position::default())
            .unwrap();
        session.play().unwrap();
        assert!(wait_for(|| session.lock().sequencer.sounding_notes() == 1));

        session.stop();
        assert!(!session.sequencer_running());
        assert!(!session.is_playing());

        let playback = session.shutdown().unwrap();
        assert_eq!(playback.sequencer.sounding_notes(), 0);
        assert!(playback.graph.node(osc).is_some());
    }

    #[test]
    fn empty_sequence_cannot_play() {
        let (mut session, _) = session(Vec::new());
        assert!(matches!(session.play(), Err(RuntimeError::Sequencer(_))));
        assert!(!session.sequencer_running());
    }
}
