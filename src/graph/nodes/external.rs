//! ExternalSource node: values produced on another thread.
//!
//! A worker (audio analysis, MIDI, network) holds an [`ExternalFeed`] and
//! sends values whenever it has them. The node drains the channel without
//! blocking on every tick and outputs the most recent value.

use crate::graph::dtype::Value;
use crate::graph::node::{NodeContext, NodePlugin};
use crossbeam_channel::{unbounded, Receiver, Sender, TrySendError};
use std::any::Any;

/// Sending half of an external source. Cheap to clone, usable from any thread.
#[derive(Debug, Clone)]
pub struct ExternalFeed {
    tx: Sender<f64>,
}

impl ExternalFeed {
    /// Queue a value for the next tick. Returns false once the node is gone.
    pub fn send(&self, value: f64) -> bool {
        match self.tx.try_send(value) {
            Ok(()) => true,
            Err(TrySendError::Disconnected(_)) => false,
            Err(TrySendError::Full(_)) => {
                tracing::warn!("External feed full, value dropped");
                true
            }
        }
    }
}

pub struct ExternalSourceNode {
    tx: Sender<f64>,
    rx: Receiver<f64>,
    received: u64,
}

impl ExternalSourceNode {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx, received: 0 }
    }

    pub fn feed(&self) -> ExternalFeed {
        ExternalFeed {
            tx: self.tx.clone(),
        }
    }

    /// Total values received so far.
    pub fn received(&self) -> u64 {
        self.received
    }
}

impl Default for ExternalSourceNode {
    fn default() -> Self {
        Self::new()
    }
}

impl NodePlugin for ExternalSourceNode {
    fn name(&self) -> &str {
        "ExternalSource"
    }

    fn recompute(&mut self, ctx: &mut NodeContext) {
        let mut latest = None;
        while let Ok(value) = self.rx.try_recv() {
            latest = Some(value);
            self.received += 1;
        }
        if let Some(value) = latest {
            ctx.set_output("value", Value::Float(value));
        }
    }

    fn always_evaluate(&self) -> bool {
        true
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
