//! Graph execution engine.
//!
//! A graph is a set of named nodes; each node lists the children whose
//! results it consumes. `Graph` loads and validates the structure,
//! `sequencer` orders it, and `Executor` runs every node as its own task.
//! Nodes hand results to each other through a write-once `ResultRegistry`,
//! so independent branches run concurrently and a node starts the moment
//! its last child publishes.

pub mod dispatch;
pub mod executor;
pub mod graph;
pub mod registry;
pub mod sequencer;

pub use dispatch::AgentRegistry;
pub use executor::{execute, Executor, RunReport};
pub use graph::{Graph, GraphSpec, Node, NodeSpec};
pub use registry::ResultRegistry;
