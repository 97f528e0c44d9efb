use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;

use arrayvec::ArrayVec;
use rtrb::{Consumer, Producer, PushError, RingBuffer};

use crate::dsp::AtomicF32;
use crate::engine::units::UnitSlot;
use crate::engine::{AudioBackend, ProcessingUnit, UnitHandle, UnitId};
use crate::error::BackendError;
use crate::MAX_BLOCK_SIZE;

/*
In-process audio backend
========================

Split in two halves joined by a pair of ring buffers:

    Rack (control)                           RackRenderer (audio callback)
    ──────────────                           ─────────────────────────────
    attach / connect / detach
      │ builds UnitSlot, Routing
      └──── Command ──────── rtrb ─────────→ apply, then render in order
                                               │
      drop ←─ Garbage ────── rtrb ─────────────┘ detached slots, old routing

The control side owns the topology. Every change is compiled into a fresh
`Routing`: the units that can reach the output, in dependency order, each
with the list of units summed into its input. The render side only swaps
the whole routing in, so it never sees a half-applied change. Anything it
lets go of is sent back and dropped on the control side, which keeps
deallocation off the audio thread. If the return ring is full, the
renderer parks the item in a fixed backlog and retries on the next block.

Cycles are refused at connect time, so a routing is always a DAG.
*/

const QUEUE_CAPACITY: usize = 256;
/// Attached units, output included.
pub const MAX_UNITS: usize = 128;

enum Command {
    Attach(Box<UnitSlot>),
    Detach(UnitId),
    Route(Box<Routing>),
}

enum Garbage {
    Slot(Box<UnitSlot>),
    Routing(Box<Routing>),
}

struct Step {
    unit: UnitId,
    inputs: Vec<UnitId>,
}

struct Routing {
    steps: Vec<Step>,
}

pub struct Rack {
    sample_rate: f32,
    output: UnitHandle,
    attached: HashMap<UnitId, UnitHandle>,
    routes: Vec<(UnitId, UnitId)>,
    commands: Producer<Command>,
    garbage: Consumer<Garbage>,
}

impl Rack {
    /// Build both halves. The renderer goes to the audio callback.
    pub fn new(sample_rate: f32) -> (Self, RackRenderer) {
        let (commands, command_rx) = RingBuffer::new(QUEUE_CAPACITY);
        let (garbage_tx, garbage) = RingBuffer::new(QUEUE_CAPACITY);

        let output = UnitHandle::new(ProcessingUnit::Output(Arc::new(AtomicF32::new(1.0))));
        let mut slots = Vec::with_capacity(MAX_UNITS);
        slots.push(Box::new(UnitSlot::new(&output, sample_rate)));

        let renderer = RackRenderer {
            slots,
            routing: Box::new(Routing {
                steps: vec![Step {
                    unit: output.id(),
                    inputs: Vec::new(),
                }],
            }),
            commands: command_rx,
            garbage: garbage_tx,
            backlog: ArrayVec::new(),
            late_frees: 0,
            scratch: vec![0.0; MAX_BLOCK_SIZE],
            output: output.id(),
        };

        let mut attached = HashMap::new();
        attached.insert(output.id(), output.clone());

        let rack = Self {
            sample_rate,
            output,
            attached,
            routes: Vec::new(),
            commands,
            garbage,
        };
        (rack, renderer)
    }

    pub fn is_attached(&self, unit: UnitId) -> bool {
        self.attached.contains_key(&unit)
    }

    pub fn unit_count(&self) -> usize {
        self.attached.len()
    }

    /// Every `(source, dest)` route, in the order it was made.
    pub fn routes(&self) -> &[(UnitId, UnitId)] {
        &self.routes
    }

    /// Units that currently reach the output, in the order they render.
    pub fn render_order(&self) -> Vec<UnitId> {
        self.compile().steps.iter().map(|step| step.unit).collect()
    }

    /// Drop whatever the renderer has handed back.
    pub fn collect_garbage(&mut self) -> usize {
        let mut dropped = 0;
        while let Ok(item) = self.garbage.pop() {
            match item {
                Garbage::Slot(slot) => drop(slot),
                Garbage::Routing(routing) => drop(routing),
            }
            dropped += 1;
        }
        dropped
    }

    fn send(&mut self, command: Command) -> Result<(), BackendError> {
        self.commands.push(command).map_err(|_| BackendError::QueueFull)
    }

    fn publish(&mut self) -> Result<(), BackendError> {
        let routing = Box::new(self.compile());
        self.send(Command::Route(routing))
    }

    /// Does a path of routes lead from `from` to `to`?
    fn reaches(&self, from: UnitId, to: UnitId) -> bool {
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::from([from]);
        while let Some(unit) = queue.pop_front() {
            if unit == to {
                return true;
            }
            if seen.insert(unit) {
                queue.extend(self.routes.iter().filter(|(a, _)| *a == unit).map(|(_, b)| *b));
            }
        }
        false
    }

    fn compile(&self) -> Routing {
        let out = self.output.id();

        // Walk backwards from the output to find the units worth rendering.
        let mut live = BTreeSet::new();
        let mut queue = VecDeque::from([out]);
        while let Some(unit) = queue.pop_front() {
            if live.insert(unit) {
                queue.extend(self.routes.iter().filter(|(_, b)| *b == unit).map(|(a, _)| *a));
            }
        }

        let edges: Vec<(UnitId, UnitId)> = self
            .routes
            .iter()
            .copied()
            .filter(|(a, b)| live.contains(a) && live.contains(b))
            .collect();

        // Kahn's algorithm; the ready set is ordered so the result is stable.
        let mut pending: HashMap<UnitId, usize> = live.iter().map(|&u| (u, 0)).collect();
        for (_, b) in &edges {
            if let Some(count) = pending.get_mut(b) {
                *count += 1;
            }
        }
        let mut ready: BTreeSet<UnitId> = pending
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(&u, _)| u)
            .collect();

        let mut steps = Vec::with_capacity(live.len());
        while let Some(unit) = ready.pop_first() {
            for (_, b) in edges.iter().filter(|(a, _)| *a == unit) {
                if let Some(count) = pending.get_mut(b) {
                    *count -= 1;
                    if *count == 0 {
                        ready.insert(*b);
                    }
                }
            }
            let inputs = edges
                .iter()
                .filter(|(_, b)| *b == unit)
                .map(|(a, _)| *a)
                .collect();
            steps.push(Step { unit, inputs });
        }

        Routing { steps }
    }
}

impl AudioBackend for Rack {
    fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    fn output(&self) -> UnitHandle {
        self.output.clone()
    }

    fn attach(&mut self, unit: &UnitHandle) -> Result<(), BackendError> {
        self.collect_garbage();
        if self.attached.contains_key(&unit.id()) {
            return Err(BackendError::AlreadyAttached(unit.id().raw()));
        }
        if self.attached.len() >= MAX_UNITS {
            return Err(BackendError::RackFull {
                capacity: MAX_UNITS,
            });
        }

        let slot = Box::new(UnitSlot::new(unit, self.sample_rate));
        self.send(Command::Attach(slot))?;
        self.attached.insert(unit.id(), unit.clone());
        tracing::debug!(unit = %unit.id(), kind = unit.unit().name(), "attached");
        Ok(())
    }

    fn detach(&mut self, unit: UnitId) -> Result<(), BackendError> {
        self.collect_garbage();
        if unit == self.output.id() {
            return Err(BackendError::InvalidRoute(unit.raw()));
        }
        if !self.attached.contains_key(&unit) {
            return Err(BackendError::UnknownUnit(unit.raw()));
        }

        let touches_unit = |(a, b): &(UnitId, UnitId)| *a == unit || *b == unit;
        let rerouted = self.routes.iter().any(touches_unit);
        // A new routing (when routes change) and the detach go out together.
        let needed = if rerouted { 2 } else { 1 };
        if self.commands.slots() < needed {
            return Err(BackendError::QueueFull);
        }

        let before = self.routes.clone();
        if rerouted {
            self.routes.retain(|route| !touches_unit(route));
            if let Err(err) = self.publish() {
                self.routes = before;
                return Err(err);
            }
        }
        if let Err(err) = self.send(Command::Detach(unit)) {
            self.routes = before;
            return Err(err);
        }
        self.attached.remove(&unit);
        tracing::debug!(%unit, "detached");
        Ok(())
    }

    fn connect(&mut self, source: UnitId, dest: UnitId) -> Result<(), BackendError> {
        self.collect_garbage();
        for unit in [source, dest] {
            if !self.attached.contains_key(&unit) {
                return Err(BackendError::UnknownUnit(unit.raw()));
            }
        }
        if source == self.output.id() {
            return Err(BackendError::InvalidRoute(source.raw()));
        }
        if self.routes.contains(&(source, dest)) {
            return Ok(());
        }
        if source == dest || self.reaches(dest, source) {
            return Err(BackendError::Cycle {
                from: source.raw(),
                to: dest.raw(),
            });
        }

        self.routes.push((source, dest));
        if let Err(err) = self.publish() {
            self.routes.pop();
            return Err(err);
        }
        tracing::debug!(%source, %dest, "routed");
        Ok(())
    }

    fn disconnect(&mut self, source: UnitId, dest: UnitId) -> Result<(), BackendError> {
        self.collect_garbage();
        for unit in [source, dest] {
            if !self.attached.contains_key(&unit) {
                return Err(BackendError::UnknownUnit(unit.raw()));
            }
        }
        let Some(index) = self.routes.iter().position(|route| *route == (source, dest)) else {
            return Ok(());
        };

        let route = self.routes.remove(index);
        if let Err(err) = self.publish() {
            self.routes.insert(index, route);
            return Err(err);
        }
        tracing::debug!(%source, %dest, "unrouted");
        Ok(())
    }

    fn disconnect_output(&mut self, source: UnitId) -> Result<(), BackendError> {
        self.collect_garbage();
        if !self.attached.contains_key(&source) {
            return Err(BackendError::UnknownUnit(source.raw()));
        }

        let removed: Vec<(UnitId, UnitId)> = self
            .routes
            .iter()
            .copied()
            .filter(|(a, _)| *a == source)
            .collect();
        if removed.is_empty() {
            return Ok(());
        }
        self.routes.retain(|(a, _)| *a != source);
        if let Err(err) = self.publish() {
            self.routes.extend(removed);
            return Err(err);
        }
        tracing::debug!(%source, "output disconnected");
        Ok(())
    }
}

/// Audio-thread half of the rack. Does not allocate or free.
pub struct RackRenderer {
    slots: Vec<Box<UnitSlot>>,
    routing: Box<Routing>,
    commands: Consumer<Command>,
    garbage: Producer<Garbage>,
    /// Garbage the return ring had no room for.
    backlog: ArrayVec<Garbage, QUEUE_CAPACITY>,
    late_frees: usize,
    scratch: Vec<f32>,
    output: UnitId,
}

impl RackRenderer {
    /// Fill an interleaved buffer with the output unit's signal, the same
    /// sample on every channel.
    pub fn render(&mut self, out: &mut [f32], channels: usize) {
        self.apply_commands();

        let channels = channels.max(1);
        for chunk in out.chunks_mut(MAX_BLOCK_SIZE * channels) {
            let frames = chunk.len() / channels;
            self.render_block(frames);

            let output = self.output;
            match self.slots.iter().find(|slot| slot.id() == output) {
                Some(slot) => {
                    for (frame, &sample) in chunk.chunks_exact_mut(channels).zip(slot.output(frames)) {
                        frame.fill(sample);
                    }
                    chunk[frames * channels..].fill(0.0);
                }
                None => chunk.fill(0.0),
            }
        }
    }

    /// Items dropped on the render thread because the return ring and the
    /// backlog were both full.
    pub fn late_frees(&self) -> usize {
        self.late_frees
    }

    fn apply_commands(&mut self) {
        self.retry_backlog();
        while let Ok(command) = self.commands.pop() {
            match command {
                Command::Attach(slot) => {
                    if self.slots.len() < self.slots.capacity() {
                        self.slots.push(slot);
                    } else {
                        self.discard(Garbage::Slot(slot));
                    }
                }
                Command::Detach(unit) => {
                    if let Some(index) = self.slots.iter().position(|slot| slot.id() == unit) {
                        let slot = self.slots.swap_remove(index);
                        self.discard(Garbage::Slot(slot));
                    }
                }
                Command::Route(routing) => {
                    let old = std::mem::replace(&mut self.routing, routing);
                    self.discard(Garbage::Routing(old));
                }
            }
        }
    }

    fn discard(&mut self, item: Garbage) {
        if let Err(PushError::Full(item)) = self.garbage.push(item) {
            if self.backlog.try_push(item).is_err() {
                self.late_frees += 1;
            }
        }
    }

    fn retry_backlog(&mut self) {
        while let Some(item) = self.backlog.pop() {
            if let Err(PushError::Full(item)) = self.garbage.push(item) {
                self.backlog.push(item);
                break;
            }
        }
    }

    fn render_block(&mut self, frames: usize) {
        for step in &self.routing.steps {
            let input = &mut self.scratch[..frames];
            input.fill(0.0);
            for source in &step.inputs {
                if let Some(slot) = self.slots.iter().find(|slot| slot.id() == *source) {
                    for (acc, &x) in input.iter_mut().zip(slot.output(frames)) {
                        *acc += x;
                    }
                }
            }
            if let Some(slot) = self.slots.iter_mut().find(|slot| slot.id() == step.unit) {
                slot.process(input);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::OscillatorCore;

    fn source() -> (UnitHandle, OscillatorCore) {
        let osc = OscillatorCore::new(44_100.0);
        (UnitHandle::new(ProcessingUnit::Source(osc.clone())), osc)
    }

    fn mixer(gain: f32) -> UnitHandle {
        UnitHandle::new(ProcessingUnit::Mixer(Arc::new(AtomicF32::new(gain))))
    }

    fn peak(buffer: &[f32]) -> f32 {
        buffer.iter().fold(0.0f32, |acc, x| acc.max(x.abs()))
    }

    #[test]
    fn silent_until_routed() {
        let (mut rack, mut renderer) = Rack::new(44_100.0);
        let (unit, osc) = source();
        rack.attach(&unit).unwrap();
        osc.note_on(440.0);

        let mut out = vec![1.0f32; 512];
        renderer.render(&mut out, 2);
        assert_eq!(peak(&out), 0.0);

        rack.connect(unit.id(), rack.output().id()).unwrap();
        renderer.render(&mut out, 2);
        assert!(peak(&out) > 0.0);
    }

    #[test]
    fn fan_in_sums_sources() {
        let (mut rack, mut renderer) = Rack::new(44_100.0);
        let out_id = rack.output().id();
        let (a, osc_a) = source();
        let (b, osc_b) = source();
        for unit in [&a, &b] {
            rack.attach(unit).unwrap();
            rack.connect(unit.id(), out_id).unwrap();
        }
        osc_a.note_on(440.0);
        osc_b.note_on(440.0);

        let mut both = vec![0.0f32; 64];
        renderer.render(&mut both, 1);

        let reference = OscillatorCore::new(44_100.0);
        reference.note_on(440.0);
        let mut single = vec![0.0f32; 64];
        reference.render_mono(&mut single);

        for (x, y) in both.iter().zip(&single) {
            assert!((x - 2.0 * y).abs() < 1e-6);
        }
    }

    #[test]
    fn refuses_cycles_and_unknown_units() {
        let (mut rack, _renderer) = Rack::new(44_100.0);
        let a = mixer(1.0);
        let b = mixer(1.0);
        rack.attach(&a).unwrap();
        rack.attach(&b).unwrap();

        rack.connect(a.id(), b.id()).unwrap();
        assert!(matches!(
            rack.connect(b.id(), a.id()),
            Err(BackendError::Cycle { .. })
        ));
        assert!(matches!(
            rack.connect(a.id(), a.id()),
            Err(BackendError::Cycle { .. })
        ));

        let stray = mixer(1.0);
        assert_eq!(
            rack.connect(stray.id(), a.id()),
            Err(BackendError::UnknownUnit(stray.id().raw()))
        );
        assert_eq!(rack.routes().len(), 1);
    }

    #[test]
    fn output_cannot_be_detached_or_used_as_source() {
        let (mut rack, _renderer) = Rack::new(44_100.0);
        let out_id = rack.output().id();
        let a = mixer(1.0);
        rack.attach(&a).unwrap();

        assert!(rack.detach(out_id).is_err());
        assert!(rack.connect(out_id, a.id()).is_err());
        assert_eq!(rack.attach(&a), Err(BackendError::AlreadyAttached(a.id().raw())));
    }

    #[test]
    fn render_order_follows_dependencies() {
        let (mut rack, _renderer) = Rack::new(44_100.0);
        let out_id = rack.output().id();
        let (src, _osc) = source();
        let env = mixer(1.0);
        let unrouted = mixer(1.0);
        for unit in [&src, &env, &unrouted] {
            rack.attach(unit).unwrap();
        }
        rack.connect(env.id(), out_id).unwrap();
        rack.connect(src.id(), env.id()).unwrap();

        assert_eq!(rack.render_order(), vec![src.id(), env.id(), out_id]);
    }

    #[test]
    fn detached_units_come_back_to_be_dropped() {
        let (mut rack, mut renderer) = Rack::new(44_100.0);
        let (unit, _osc) = source();
        rack.attach(&unit).unwrap();
        rack.connect(unit.id(), rack.output().id()).unwrap();
        renderer.render(&mut [0.0; 32], 1);
        rack.collect_garbage();

        rack.detach(unit.id()).unwrap();
        assert!(rack.routes().is_empty());
        renderer.render(&mut [0.0; 32], 1);

        // The slot and the replaced routing.
        assert_eq!(rack.collect_garbage(), 2);
        assert!(!rack.is_attached(unit.id()));
    }

    #[test]
    fn disconnect_output_drops_every_route_from_source() {
        let (mut rack, _renderer) = Rack::new(44_100.0);
        let out_id = rack.output().id();
        let (src, _osc) = source();
        let a = mixer(1.0);
        let b = mixer(1.0);
        for unit in [&src, &a, &b] {
            rack.attach(unit).unwrap();
        }
        rack.connect(src.id(), a.id()).unwrap();
        rack.connect(src.id(), b.id()).unwrap();
        rack.connect(a.id(), out_id).unwrap();

        rack.disconnect_output(src.id()).unwrap();
        assert_eq!(rack.routes(), &[(a.id(), out_id)]);
    }

    #[test]
    fn disconnect_drops_a_single_route() {
        let (mut rack, _renderer) = Rack::new(44_100.0);
        let out_id = rack.output().id();
        let (src, _osc) = source();
        let a = mixer(1.0);
        for unit in [&src, &a] {
            rack.attach(unit).unwrap();
        }
        rack.connect(src.id(), a.id()).unwrap();
        rack.connect(src.id(), out_id).unwrap();

        rack.disconnect(src.id(), out_id).unwrap();
        rack.disconnect(src.id(), out_id).unwrap();
        assert_eq!(rack.routes(), &[(src.id(), a.id())]);
    }

    #[test]
    fn refused_detach_changes_nothing() {
        let (mut rack, mut renderer) = Rack::new(44_100.0);
        let out_id = rack.output().id();
        let (src, _osc) = source();
        let spare = mixer(1.0);
        rack.attach(&src).unwrap();
        rack.attach(&spare).unwrap();
        rack.connect(src.id(), out_id).unwrap();

        // Fill the command ring; nothing drains it until the next render.
        while rack.connect(spare.id(), out_id).is_ok() {
            if rack.disconnect_output(spare.id()).is_err() {
                break;
            }
        }
        let routes = rack.routes().to_vec();

        assert_eq!(rack.detach(src.id()), Err(BackendError::QueueFull));
        assert!(rack.is_attached(src.id()));
        assert_eq!(rack.routes(), routes.as_slice());

        renderer.render(&mut [0.0; 32], 1);
        rack.detach(src.id()).unwrap();
        assert!(!rack.is_attached(src.id()));
        assert!(rack.routes().iter().all(|(a, _)| *a != src.id()));
    }

    #[test]
    fn full_return_ring_parks_garbage_for_later() {
        let (mut rack, mut renderer) = Rack::new(44_100.0);
        let empty = || Garbage::Routing(Box::new(Routing { steps: Vec::new() }));
        while renderer.garbage.push(empty()).is_ok() {}

        renderer.discard(empty());
        assert_eq!(renderer.backlog.len(), 1);
        assert_eq!(renderer.late_frees(), 0);

        assert_eq!(rack.collect_garbage(), QUEUE_CAPACITY);
        renderer.render(&mut [0.0; 32], 1);
        assert!(renderer.backlog.is_empty());
        assert_eq!(rack.collect_garbage(), 1);
    }

    #[test]
    fn output_gain_scales_everything() {
        let (mut rack, mut renderer) = Rack::new(44_100.0);
        let (src, osc) = source();
        rack.attach(&src).unwrap();
        rack.connect(src.id(), rack.output().id()).unwrap();
        osc.note_on(440.0);

        if let ProcessingUnit::Output(gain) = rack.output().unit() {
            gain.set(0.0);
        }
        // First block ramps down from unity; the next one is silent.
        let mut out = vec![0.0f32; 256];
        renderer.render(&mut out, 1);
        renderer.render(&mut out, 1);
        assert_eq!(peak(&out), 0.0);
    }
}
