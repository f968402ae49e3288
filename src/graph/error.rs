//! Graph-specific error types.
//!
//! These cover recoverable conditions reported to callers. Broken structural
//! invariants (double connection to one input, removing a connection that
//! does not exist) are assertions instead.

use crate::graph::id::{NodeId, PortId};
use thiserror::Error;

/// Errors that can occur within the graph engine.
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Unknown node {0}")]
    UnknownNode(NodeId),

    #[error("Node {node} has no port {port}")]
    UnknownPort { node: NodeId, port: PortId },

    #[error("Unknown node type '{0}'")]
    UnknownType(String),

    #[error("Node type '{0}' is virtual and cannot be instantiated")]
    VirtualType(String),

    #[error("Node type '{0}' is already registered")]
    DuplicateType(String),

    #[error("Base type '{base}' of '{name}' is not registered")]
    MissingBase { name: String, base: String },

    #[error("Port {port} of '{owner}' shadows an existing port")]
    ShadowedPort { owner: String, port: PortId },

    #[error("Node id {0} is already in use")]
    IdInUse(NodeId),

    #[error("Cannot connect {src}.{src_port} -> {dst}.{dst_port}: {reason}")]
    InvalidConnection {
        src: NodeId,
        src_port: PortId,
        dst: NodeId,
        dst_port: PortId,
        reason: &'static str,
    },

    #[error("Value for {port} does not match its dtype '{expected}'")]
    TypeMismatch { port: PortId, expected: &'static str },

    #[error("Document error: {0}")]
    Document(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type GraphResult<T> = std::result::Result<T, GraphError>;
