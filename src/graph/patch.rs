/*
Patch
=====

A `NodeGraph` is the live patch: the nodes on the canvas and the wires
between them. It never touches samples. Every topology change is mirrored
into an `AudioBackend`, which owns the render side.

    spawn ──► attach unit ──► node appended
    connect ──► backend.connect ──► wire recorded
    disconnect ──► backend.disconnect (or disconnect_output for the last
                   wire out of the source) ──► wire dropped
    remove_node ──► backend.detach (routes, then unit) ──► wires and node dropped

The backend goes first and the graph changes only when it succeeded, so a
refused edit (a full command queue, say) leaves both sides as they were.
A wire never outlives either endpoint. The graph is created with exactly one
output node that wraps the backend's output gate; it can be wired into but
never removed, and a second one cannot be spawned.

Several wires may leave one node and several may enter one node. A node
with more than one incoming wire sums its inputs before processing.

Note events fan out by capability, not by kind: every node reporting
`NOTE_REACTIVE` sees every note, and every `AUTOMATABLE` node moves on
`tick`.
*/

use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::engine::AudioBackend;
use crate::error::ParamError;
use crate::graph::node::{Capabilities, NodeId, NodeKind, NodeProcessor, Position};
use crate::graph::nodes::{self, OutputNode};
use crate::graph::params::{ParamSpec, ParamValue};
use crate::sequencing::NoteHandler;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "wire#{}", self.0)
    }
}

/// A directed wire from one node's output to another node's input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connection {
    pub id: ConnectionId,
    pub source: NodeId,
    pub dest: NodeId,
}

impl Connection {
    pub fn touches(&self, node: NodeId) -> bool {
        self.source == node || self.dest == node
    }
}

pub struct Node {
    id: NodeId,
    kind: NodeKind,
    position: Position,
    processor: Box<dyn NodeProcessor>,
}

impl Node {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn capabilities(&self) -> Capabilities {
        self.processor.capabilities()
    }

    pub fn params(&self) -> &'static [ParamSpec] {
        self.processor.params()
    }

    pub fn param(&self, name: &str) -> Option<ParamValue> {
        self.processor.param(name)
    }

    pub fn processor(&self) -> &dyn NodeProcessor {
        self.processor.as_ref()
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("position", &self.position)
            .field("unit", self.processor.unit())
            .finish()
    }
}

pub struct NodeGraph<B: AudioBackend> {
    backend: B,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
    nodes: Vec<Node>,
    connections: Vec<Connection>,
    next_node: u64,
    next_connection: u64,
    output: NodeId,
}

impl<B: AudioBackend> NodeGraph<B> {
    /// Build a graph holding only the output node.
    pub fn new(backend: B, clock: Arc<dyn Clock>, config: EngineConfig) -> Self {
        let output = NodeId(0);
        let gate = OutputNode::new(backend.output());
        Self {
            backend,
            clock,
            config,
            nodes: vec![Node {
                id: output,
                kind: NodeKind::Output,
                position: Position::default(),
                processor: Box::new(gate),
            }],
            connections: Vec::new(),
            next_node: 1,
            next_connection: 0,
            output,
        }
    }

    /// Create a node and attach its unit to the backend.
    ///
    /// `None` when the kind cannot be spawned (the output) or the backend
    /// refused the unit.
    pub fn spawn(&mut self, kind: NodeKind, position: Position) -> Option<NodeId> {
        let processor = nodes::build(kind, self.backend.sample_rate(), &self.config)?;

        if let Err(err) = self.backend.attach(processor.unit()) {
            warn!(%kind, %err, "backend refused node");
            return None;
        }

        let id = NodeId(self.next_node);
        self.next_node += 1;
        debug!(%id, %kind, unit = %processor.unit().id(), "spawned node");

        self.nodes.push(Node {
            id,
            kind,
            position,
            processor,
        });
        Some(id)
    }

    /// [`spawn`](Self::spawn) by kind name. Unrecognized names are a no-op.
    pub fn spawn_named(&mut self, kind: &str, position: Position) -> Option<NodeId> {
        match kind.parse::<NodeKind>() {
            Ok(kind) => self.spawn(kind, position),
            Err(err) => {
                debug!(%err, "ignored spawn request");
                None
            }
        }
    }

    /// Wire `source`'s output into `dest`.
    ///
    /// Both ids must name distinct live nodes. An existing identical wire
    /// is returned as is. Nothing is recorded when the backend refuses.
    pub fn connect(&mut self, source: NodeId, dest: NodeId) -> Option<ConnectionId> {
        if source == dest {
            return None;
        }
        let src_unit = self.node(source)?.processor.unit().id();
        let dst_unit = self.node(dest)?.processor.unit().id();

        if let Some(existing) = self
            .connections
            .iter()
            .find(|c| c.source == source && c.dest == dest)
        {
            return Some(existing.id);
        }

        if let Err(err) = self.backend.connect(src_unit, dst_unit) {
            warn!(%source, %dest, %err, "backend refused connection");
            return None;
        }

        let id = ConnectionId(self.next_connection);
        self.next_connection += 1;
        self.connections.push(Connection { id, source, dest });
        debug!(%id, %source, %dest, "connected");
        Some(id)
    }

    /// Remove one wire. Other wires leaving the same source keep sounding.
    ///
    /// `false` when the id is unknown or the backend refused, in which case
    /// the wire stays.
    pub fn disconnect(&mut self, id: ConnectionId) -> bool {
        let Some(index) = self.connections.iter().position(|c| c.id == id) else {
            return false;
        };
        let wire = self.connections[index];
        let (Some(src_unit), Some(dst_unit)) = (self.unit_of(wire.source), self.unit_of(wire.dest))
        else {
            return false;
        };

        let last_out = !self
            .connections
            .iter()
            .any(|c| c.source == wire.source && c.id != id);
        let result = if last_out {
            self.backend.disconnect_output(src_unit)
        } else {
            self.backend.disconnect(src_unit, dst_unit)
        };
        if let Err(err) = result {
            warn!(%id, %err, "backend refused to disconnect");
            return false;
        }

        self.connections.remove(index);
        debug!(%id, source = %wire.source, dest = %wire.dest, "disconnected");
        true
    }

    /// Remove a node and every wire touching it. The output node stays.
    ///
    /// The backend drops the unit's routes and the unit in one step; the
    /// graph follows only once that succeeded.
    pub fn remove_node(&mut self, id: NodeId) -> bool {
        if id == self.output {
            return false;
        }
        let Some(index) = self.index_of(id) else {
            return false;
        };

        let unit = self.nodes[index].processor.unit().id();
        if let Err(err) = self.backend.detach(unit) {
            warn!(%id, %unit, %err, "backend refused to detach node");
            return false;
        }

        self.connections.retain(|c| !c.touches(id));
        let node = self.nodes.remove(index);
        debug!(%id, kind = %node.kind, "removed node");
        true
    }

    /// Press a key on every note-reactive node.
    pub fn note_on(&mut self, frequency: f32) {
        if !is_playable(frequency) {
            return;
        }
        let now = self.clock.now();
        for node in &mut self.nodes {
            if let Some(target) = node.processor.as_note_reactive() {
                target.note_on(frequency, now);
            }
        }
    }

    pub fn note_off(&mut self, frequency: f32) {
        if !is_playable(frequency) {
            return;
        }
        let now = self.clock.now();
        for node in &mut self.nodes {
            if let Some(target) = node.processor.as_note_reactive() {
                target.note_off(frequency, now);
            }
        }
    }

    /// Release every held note on every note-reactive node.
    pub fn all_notes_off(&mut self) {
        let now = self.clock.now();
        for node in &mut self.nodes {
            if let Some(target) = node.processor.as_note_reactive() {
                target.all_notes_off(now);
            }
        }
    }

    /// One control-rate step for every automatable node.
    pub fn tick(&mut self) {
        let now = self.clock.now();
        for node in &mut self.nodes {
            if let Some(target) = node.processor.as_automatable() {
                target.tick(now);
            }
        }
    }

    pub fn set_param(
        &mut self,
        id: NodeId,
        name: &str,
        value: impl Into<ParamValue>,
    ) -> Result<(), ParamError> {
        let node = self
            .nodes
            .iter_mut()
            .find(|n| n.id == id)
            .ok_or(ParamError::UnknownNode(id.raw()))?;
        node.processor.set_param(name, value.into())
    }

    pub fn param(&self, id: NodeId, name: &str) -> Option<ParamValue> {
        self.node(id)?.param(name)
    }

    pub fn meter(&self, id: NodeId) -> Option<f32> {
        self.node(id)?.processor.meter()
    }

    pub fn move_node(&mut self, id: NodeId, position: Position) -> bool {
        match self.nodes.iter_mut().find(|n| n.id == id) {
            Some(node) => {
                node.position = position;
                true
            }
            None => false,
        }
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    /// Wires entering `dest`.
    pub fn inputs(&self, dest: NodeId) -> impl Iterator<Item = &Connection> + '_ {
        self.connections.iter().filter(move |c| c.dest == dest)
    }

    pub fn output(&self) -> NodeId {
        self.output
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    fn index_of(&self, id: NodeId) -> Option<usize> {
        self.nodes.iter().position(|n| n.id == id)
    }

    fn unit_of(&self, id: NodeId) -> Option<crate::engine::UnitId> {
        self.node(id).map(|n| n.processor.unit().id())
    }
}

impl<B: AudioBackend> NoteHandler for NodeGraph<B> {
    fn note_on(&mut self, frequency: f32) {
        NodeGraph::note_on(self, frequency);
    }

    fn note_off(&mut self, frequency: f32) {
        NodeGraph::note_off(self, frequency);
    }
}

fn is_playable(frequency: f32) -> bool {
    frequency.is_finite() && frequency > 0.0
}
