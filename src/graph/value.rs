//! Value holders: the per-port storage cells of a node.
//!
//! Output ports own a [`SettableValue`]. Input ports own an [`InputValue`],
//! which keeps a manual value and optionally a [`Link`] to another node's
//! output. Links are stored as ids, so reading a connected input goes
//! through an [`OutputLookup`] (normally the graph's node arena).

use crate::graph::dtype::Value;
use crate::graph::id::{NodeId, PortId};

/// Read access to output holders of other nodes.
pub trait OutputLookup {
    fn output(&self, node: NodeId, port: &PortId) -> Option<&SettableValue>;
}

/// Lookup that resolves nothing. Connected inputs read their manual value.
pub struct Detached;

impl OutputLookup for Detached {
    fn output(&self, _node: NodeId, _port: &PortId) -> Option<&SettableValue> {
        None
    }
}

/// A value cell with a "changed since last reset" flag.
#[derive(Debug, Clone, PartialEq)]
pub struct SettableValue {
    value: Value,
    changed: bool,
}

impl SettableValue {
    pub fn new(value: Value) -> Self {
        Self {
            value,
            changed: false,
        }
    }

    #[inline]
    pub fn get(&self) -> &Value {
        &self.value
    }

    pub fn set(&mut self, value: Value) {
        self.value = value;
        self.changed = true;
    }

    #[inline]
    pub fn has_changed(&self) -> bool {
        self.changed
    }

    pub fn reset_changed(&mut self) {
        self.changed = false;
    }

    /// Write this value into `other` if it changed since the last reset.
    pub fn copy_to(&self, other: &mut SettableValue) {
        if self.changed {
            other.set(self.value.clone());
        }
    }
}

/// Source end of a connection, as seen from the destination input.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Link {
    pub node: NodeId,
    pub port: PortId,
}

/// Input port storage: a manual value plus an optional connection.
#[derive(Debug, Clone, PartialEq)]
pub struct InputValue {
    manual: SettableValue,
    link: Option<Link>,
    link_changed: bool,
}

impl InputValue {
    pub fn new(manual: Value) -> Self {
        Self {
            manual: SettableValue::new(manual),
            link: None,
            link_changed: false,
        }
    }

    /// Connected source value, or the manual value when unconnected or the
    /// source holder cannot be resolved.
    pub fn get<'a>(&'a self, lookup: &'a dyn OutputLookup) -> &'a Value {
        self.link
            .as_ref()
            .and_then(|link| lookup.output(link.node, &link.port))
            .map(SettableValue::get)
            .unwrap_or_else(|| self.manual.get())
    }

    pub fn has_changed(&self, lookup: &dyn OutputLookup) -> bool {
        if self.link_changed {
            return true;
        }
        match &self.link {
            Some(link) => lookup
                .output(link.node, &link.port)
                .is_some_and(SettableValue::has_changed),
            None => self.manual.has_changed(),
        }
    }

    pub fn manual(&self) -> &SettableValue {
        &self.manual
    }

    pub fn set_manual(&mut self, value: Value) {
        self.manual.set(value);
    }

    pub fn link(&self) -> Option<&Link> {
        self.link.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_some()
    }

    /// # Panics
    /// If the input is already connected. Callers check first.
    pub fn connect(&mut self, link: Link) {
        assert!(
            self.link.is_none(),
            "input already connected to {:?}.{}",
            self.link.as_ref().map(|l| l.node),
            self.link.as_ref().map(|l| l.port.as_str()).unwrap_or("")
        );
        self.link = Some(link);
        self.link_changed = true;
    }

    /// Drop the connection. The manual value stays as the fallback.
    ///
    /// # Panics
    /// If the input is not connected.
    pub fn disconnect(&mut self) {
        assert!(self.link.is_some(), "disconnect on an unconnected input");
        self.link = None;
        self.link_changed = true;
    }

    /// Does not touch the connected source holder.
    pub fn reset_changed(&mut self) {
        self.link_changed = false;
        self.manual.reset_changed();
    }
}

/// Storage behind one port of a node instance.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueHolder {
    Output(SettableValue),
    Input(InputValue),
}

impl ValueHolder {
    pub fn get<'a>(&'a self, lookup: &'a dyn OutputLookup) -> &'a Value {
        match self {
            ValueHolder::Output(v) => v.get(),
            ValueHolder::Input(v) => v.get(lookup),
        }
    }

    /// Set the owned value, or the manual slot of an input.
    pub fn set(&mut self, value: Value) {
        match self {
            ValueHolder::Output(v) => v.set(value),
            ValueHolder::Input(v) => v.set_manual(value),
        }
    }

    pub fn has_changed(&self, lookup: &dyn OutputLookup) -> bool {
        match self {
            ValueHolder::Output(v) => v.has_changed(),
            ValueHolder::Input(v) => v.has_changed(lookup),
        }
    }

    pub fn reset_changed(&mut self) {
        match self {
            ValueHolder::Output(v) => v.reset_changed(),
            ValueHolder::Input(v) => v.reset_changed(),
        }
    }

    /// The value that is persisted for this port.
    pub fn manual(&self) -> &Value {
        match self {
            ValueHolder::Output(v) => v.get(),
            ValueHolder::Input(v) => v.manual().get(),
        }
    }

    pub fn as_input(&self) -> Option<&InputValue> {
        match self {
            ValueHolder::Input(v) => Some(v),
            ValueHolder::Output(_) => None,
        }
    }

    pub fn as_input_mut(&mut self) -> Option<&mut InputValue> {
        match self {
            ValueHolder::Input(v) => Some(v),
            ValueHolder::Output(_) => None,
        }
    }

    pub fn as_output(&self) -> Option<&SettableValue> {
        match self {
            ValueHolder::Output(v) => Some(v),
            ValueHolder::Input(_) => None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.as_input().is_some_and(InputValue::is_connected)
    }

    /// Write this holder's value into `other` if it changed.
    pub fn copy_to(&self, lookup: &dyn OutputLookup, other: &mut ValueHolder) {
        if self.has_changed(lookup) {
            other.set(self.get(lookup).clone());
        }
    }
}
