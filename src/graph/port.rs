//! Port descriptors for the node system.
//!
//! Node types declare their ports (inputs/outputs) as `PortDescriptor` lists.
//! Node instances may add instance-local "custom" ports on top of those at
//! runtime; [`diff_ports`] computes how such a change affects existing ports.

use crate::graph::dtype::{DType, Value};
use crate::graph::id::PortId;

/// Whether a port is an input or output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortDirection {
    Input,
    Output,
}

/// Descriptor for one port of a node.
#[derive(Debug, Clone, PartialEq)]
pub struct PortDescriptor {
    pub name: String,
    pub direction: PortDirection,
    pub dtype: DType,
    /// Display grouping hint for editors.
    pub group: Option<String>,
    /// Instance-local port, not part of the declared node type.
    pub custom: bool,
}

impl PortDescriptor {
    pub fn input(name: &str, dtype: DType) -> Self {
        Self {
            name: name.to_string(),
            direction: PortDirection::Input,
            dtype,
            group: None,
            custom: false,
        }
    }

    pub fn output(name: &str, dtype: DType) -> Self {
        Self {
            name: name.to_string(),
            direction: PortDirection::Output,
            dtype,
            group: None,
            custom: false,
        }
    }

    pub fn with_group(mut self, group: &str) -> Self {
        self.group = Some(group.to_string());
        self
    }

    pub fn into_custom(mut self) -> Self {
        self.custom = true;
        self
    }

    pub fn id(&self) -> PortId {
        PortId::new(self.direction, &self.name)
    }

    pub fn is_input(&self) -> bool {
        self.direction == PortDirection::Input
    }

    pub fn default_value(&self) -> Value {
        self.dtype.default_value()
    }
}

/// Result of comparing an old custom-port list against a new one.
///
/// A port whose base type changed appears in both `dropped` and `added`:
/// its value holder must be discarded and recreated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortDiff {
    pub dropped: Vec<PortId>,
    pub kept: Vec<PortId>,
    pub added: Vec<PortId>,
}

impl PortDiff {
    pub fn is_empty(&self) -> bool {
        self.dropped.is_empty() && self.added.is_empty()
    }
}

/// Compare two port lists by id and base type.
pub fn diff_ports(old: &[PortDescriptor], new: &[PortDescriptor]) -> PortDiff {
    let mut diff = PortDiff::default();

    for port in old {
        let id = port.id();
        match new.iter().find(|p| p.id() == id) {
            Some(replacement) if replacement.dtype.base_type() == port.dtype.base_type() => {
                diff.kept.push(id);
            }
            Some(_) => {
                diff.dropped.push(id.clone());
                diff.added.push(id);
            }
            None => diff.dropped.push(id),
        }
    }

    for port in new {
        let id = port.id();
        if !old.iter().any(|p| p.id() == id) {
            diff.added.push(id);
        }
    }

    diff
}
