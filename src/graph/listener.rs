//! Structural change notifications.
//!
//! The graph reports every structural mutation to its listeners. The
//! evaluation-order cache is one such listener; editors are others. A
//! [`ChannelListener`] forwards [`GraphEvent`]s to another thread.

use crate::graph::id::{NodeId, PortId};
use crossbeam_channel::{Receiver, Sender};

/// A directed edge from an output port to an input port.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Connection {
    pub src: NodeId,
    pub src_port: PortId,
    pub dst: NodeId,
    pub dst_port: PortId,
}

impl Connection {
    pub fn new(src: NodeId, src_port: PortId, dst: NodeId, dst_port: PortId) -> Self {
        Self {
            src,
            src_port,
            dst,
            dst_port,
        }
    }

    pub fn touches(&self, node: NodeId) -> bool {
        self.src == node || self.dst == node
    }
}

/// Observer of graph structure. All methods default to no-ops.
#[cfg_attr(test, mockall::automock)]
pub trait NodeGraphListener: Send {
    fn created_node(&mut self, _node: NodeId, _type_name: &str) {}

    fn removed_node(&mut self, _node: NodeId) {}

    fn created_connection(&mut self, _connection: &Connection) {}

    fn removed_connection(&mut self, _connection: &Connection) {}

    /// `None` for graph-level UI data.
    fn changed_ui_data(&mut self, _node: Option<NodeId>) {}

    fn changed_ports(&mut self, _node: NodeId) {}
}

/// Owned form of a listener notification.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphEvent {
    NodeCreated { node: NodeId, type_name: String },
    NodeRemoved { node: NodeId },
    ConnectionCreated(Connection),
    ConnectionRemoved(Connection),
    UiDataChanged { node: Option<NodeId> },
    PortsChanged { node: NodeId },
}

/// Forwards notifications over a channel, e.g. to an editor thread.
pub struct ChannelListener {
    tx: Sender<GraphEvent>,
}

impl ChannelListener {
    pub fn new(tx: Sender<GraphEvent>) -> Self {
        Self { tx }
    }

    /// Listener plus the receiving end of an unbounded channel.
    pub fn unbounded() -> (Self, Receiver<GraphEvent>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Self::new(tx), rx)
    }

    fn send(&self, event: GraphEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("Graph event receiver dropped");
        }
    }
}

impl NodeGraphListener for ChannelListener {
    fn created_node(&mut self, node: NodeId, type_name: &str) {
        self.send(GraphEvent::NodeCreated {
            node,
            type_name: type_name.to_string(),
        });
    }

    fn removed_node(&mut self, node: NodeId) {
        self.send(GraphEvent::NodeRemoved { node });
    }

    fn created_connection(&mut self, connection: &Connection) {
        self.send(GraphEvent::ConnectionCreated(connection.clone()));
    }

    fn removed_connection(&mut self, connection: &Connection) {
        self.send(GraphEvent::ConnectionRemoved(connection.clone()));
    }

    fn changed_ui_data(&mut self, node: Option<NodeId>) {
        self.send(GraphEvent::UiDataChanged { node });
    }

    fn changed_ports(&mut self, node: NodeId) {
        self.send(GraphEvent::PortsChanged { node });
    }
}
