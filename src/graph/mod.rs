//! Node-graph dataflow engine.
//!
//! A [`Graph`] owns typed, stateful nodes and the connections between
//! their ports. Once per tick it evaluates nodes in a cached topological
//! order; a node recomputes only when one of its inputs changed since the
//! previous pass, or when its type always evaluates.
//!
//! # Modules
//!
//! - [`id`] - Node, layer and port identifiers
//! - [`dtype`] - Value kinds and port data types
//! - [`port`] - Port descriptors and custom-port diffing
//! - [`value`] - Value holders with change tracking
//! - [`node_type`] - Type declarations and the type registry
//! - [`node`] - Node instances and node behavior
//! - [`listener`] - Structural-change notifications
//! - [`order`] - Topological sort and its cache
//! - [`executor`] - The graph itself
//! - [`document`] - JSON documents, tolerant loading
//! - [`nodes`] - Built-in node library

pub mod document;
pub mod dtype;
pub mod error;
pub mod executor;
pub mod id;
pub mod listener;
pub mod node;
pub mod node_type;
pub mod nodes;
pub mod order;
pub mod port;
pub mod value;

pub use document::{
    deserialize, duplicate_nodes, serialize, serialize_all, GraphDocument, LoadReport,
};
pub use dtype::{BaseType, DType, Value};
pub use error::{GraphError, GraphResult};
pub use executor::{EvaluationReport, Graph, NodeSpec};
pub use id::{LayerId, NodeId, PortId};
pub use listener::{ChannelListener, Connection, GraphEvent, NodeGraphListener};
pub use node::{AnyNode, BuiltinNode, NodeContext, NodePlugin, TickInfo};
pub use node_type::{NodeType, NodeTypeDecl, NodeTypeDescriptor, NodeTypeRegistry};
pub use port::{diff_ports, PortDescriptor, PortDiff, PortDirection};
pub use value::{InputValue, OutputLookup, SettableValue, ValueHolder};
