//! Identity types for the graph engine.
//!
//! `NodeId` is a newtype over `u32` that keys the graph's node arena.
//! Port ids are strings prefixed by their direction (`i_` for inputs,
//! `o_` for outputs), which is also how they appear in saved documents.

use crate::graph::port::PortDirection;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Key into `Graph` node storage. Unique within its graph.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u32);

impl NodeId {
    pub const INVALID: NodeId = NodeId(u32::MAX);

    #[inline]
    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::INVALID {
            write!(f, "NodeId(INVALID)")
        } else {
            write!(f, "NodeId({})", self.0)
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Evaluation layer a node belongs to.
///
/// Layers are sorted and evaluated independently unless the graph is
/// configured to evaluate globally.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayerId(pub u32);

impl LayerId {
    pub const ROOT: LayerId = LayerId(0);

    #[inline]
    pub fn is_root(&self) -> bool {
        *self == Self::ROOT
    }
}

impl fmt::Debug for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LayerId({})", self.0)
    }
}

const INPUT_PREFIX: &str = "i_";
const OUTPUT_PREFIX: &str = "o_";

/// Direction-prefixed port identifier, e.g. `i_speed` or `o_result`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PortId(String);

impl PortId {
    pub fn input(name: &str) -> Self {
        Self(format!("{INPUT_PREFIX}{name}"))
    }

    pub fn output(name: &str) -> Self {
        Self(format!("{OUTPUT_PREFIX}{name}"))
    }

    pub fn new(direction: PortDirection, name: &str) -> Self {
        match direction {
            PortDirection::Input => Self::input(name),
            PortDirection::Output => Self::output(name),
        }
    }

    /// Parse a saved port id. Returns `None` without a direction prefix or name.
    pub fn parse(raw: &str) -> Option<Self> {
        let name = raw
            .strip_prefix(INPUT_PREFIX)
            .or_else(|| raw.strip_prefix(OUTPUT_PREFIX))?;
        if name.is_empty() {
            return None;
        }
        Some(Self(raw.to_string()))
    }

    #[inline]
    pub fn is_input(&self) -> bool {
        self.0.starts_with(INPUT_PREFIX)
    }

    pub fn direction(&self) -> PortDirection {
        if self.is_input() {
            PortDirection::Input
        } else {
            PortDirection::Output
        }
    }

    /// Port name without the direction prefix.
    pub fn name(&self) -> &str {
        &self.0[INPUT_PREFIX.len()..]
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PortId({})", self.0)
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id() {
        let id = NodeId(42);
        assert!(id.is_valid());
        assert_eq!(format!("{:?}", id), "NodeId(42)");
        assert!(!NodeId::INVALID.is_valid());
    }

    #[test]
    fn test_port_id_prefixes() {
        let port = PortId::input("speed");
        assert_eq!(port.as_str(), "i_speed");
        assert_eq!(port.name(), "speed");
        assert!(port.is_input());

        let port = PortId::output("result");
        assert_eq!(port.as_str(), "o_result");
        assert_eq!(port.direction(), PortDirection::Output);
    }

    #[test]
    fn test_port_id_parse() {
        assert_eq!(PortId::parse("i_weight_0"), Some(PortId::input("weight_0")));
        assert_eq!(PortId::parse("o_value"), Some(PortId::output("value")));
        assert_eq!(PortId::parse("value"), None);
        assert_eq!(PortId::parse("i_"), None);
    }
}
