//! # lumagraph-rs: Node-Graph Dataflow Engine
//!
//! The patchable core of a live visual-performance tool. Patches are graphs
//! of typed, stateful nodes (generators, math, expressions, external
//! sources) joined by directed data edges, evaluated once per frame.
//!
//! ## Architecture
//!
//! - **Graph**: Owns nodes and connections, caches a topological order and
//!   recomputes only the nodes whose inputs changed
//! - **Nodes**: Built-in library plus `NodePlugin` trait objects for nodes
//!   with their own state (modules, external sources)
//! - **Documents**: JSON save/load that tolerates renamed or removed types
//! - **Scripting**: Rhai-based `Expression` nodes
//! - **Communication**: Crossbeam channels feed values from worker threads
//!
//! ## Example
//!
//! ```
//! use lumagraph_rs::graph::{Graph, PortId, Value};
//!
//! let mut graph = Graph::with_builtins();
//! let a = graph
//!     .create_node("Float", [(PortId::input("value"), Value::Float(2.0))])
//!     .unwrap();
//! let double = graph
//!     .create_node("Multiply", [(PortId::input("b"), Value::Float(2.0))])
//!     .unwrap();
//! graph
//!     .create_connection(a, PortId::output("value"), double, PortId::input("a"))
//!     .unwrap();
//!
//! graph.evaluate(true);
//! assert_eq!(
//!     graph.value(double, &PortId::output("result")),
//!     Some(Value::Float(4.0))
//! );
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod scripting;

// Re-export commonly used types
pub use config::{EngineConfig, GraphConfig};
pub use error::{LumaError, Result, ResultExt};
pub use graph::{Graph, GraphDocument, GraphError, NodeId, PortId, Value};
pub use scripting::ScriptEngine;
