//! The patchable node graph.
//!
//! Nodes wrap a processing unit that lives in an [`AudioBackend`] and
//! expose named parameters plus a set of capabilities. The graph mirrors
//! every wiring change into the backend and fans note events out to the
//! nodes that react to them.
//!
//! [`AudioBackend`]: crate::engine::AudioBackend

/// Node identity, kinds and the capability traits.
pub mod node;
/// Concrete processors for each node kind.
pub mod nodes;
/// Named, bounded parameters.
pub mod params;
/// `NodeGraph` and its wires.
pub mod patch;

pub use node::{
    Automatable, Capabilities, NodeId, NodeKind, NodeProcessor, NoteReactive, Position, Renderable,
};
pub use params::{ParamRange, ParamSpec, ParamValue};
pub use patch::{Connection, ConnectionId, Node, NodeGraph};
