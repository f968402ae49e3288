//! Node type registry.
//!
//! Node types are declared with a [`NodeTypeDecl`] and registered once at
//! startup. Registration composes the effective port list from the base-type
//! chain (root ports first) and freezes it into a [`NodeTypeDescriptor`].
//! The registry is read-only afterwards and is shared between graphs
//! through an `Arc`.

use crate::graph::error::{GraphError, GraphResult};
use crate::graph::id::PortId;
use crate::graph::node::AnyNode;
use crate::graph::port::PortDescriptor;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Creates the behavior of a new node instance.
pub type NodeFactory = Arc<dyn Fn() -> AnyNode + Send + Sync>;

/// Options attached to a node type.
#[derive(Debug, Clone, Default)]
pub struct TypeOptions {
    /// Base type only, never instantiated directly.
    pub is_virtual: bool,
    /// Recompute every tick regardless of input changes.
    pub always_evaluate: bool,
    /// Holds the previous tick's value, so cyclic edges through it are legal.
    pub breaks_cycles: bool,
    pub description: &'static str,
}

/// Interface the graph uses to instantiate node types.
pub trait NodeType {
    fn name(&self) -> &str;
    fn declared_ports(&self) -> Vec<&PortDescriptor>;
    fn make_instance(&self) -> GraphResult<AnyNode>;
}

/// Declaration of a node type before registration.
pub struct NodeTypeDecl {
    name: String,
    base: Option<String>,
    inputs: Vec<PortDescriptor>,
    outputs: Vec<PortDescriptor>,
    options: TypeOptions,
    factory: Option<NodeFactory>,
}

impl NodeTypeDecl {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            base: None,
            inputs: Vec::new(),
            outputs: Vec::new(),
            options: TypeOptions::default(),
            factory: None,
        }
    }

    pub fn base(mut self, base: &str) -> Self {
        self.base = Some(base.to_string());
        self
    }

    pub fn input(mut self, port: PortDescriptor) -> Self {
        self.inputs.push(port);
        self
    }

    pub fn output(mut self, port: PortDescriptor) -> Self {
        self.outputs.push(port);
        self
    }

    pub fn virtual_type(mut self) -> Self {
        self.options.is_virtual = true;
        self
    }

    pub fn always_evaluate(mut self) -> Self {
        self.options.always_evaluate = true;
        self
    }

    pub fn breaks_cycles(mut self) -> Self {
        self.options.breaks_cycles = true;
        self
    }

    pub fn description(mut self, text: &'static str) -> Self {
        self.options.description = text;
        self
    }

    pub fn factory<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> AnyNode + Send + Sync + 'static,
    {
        self.factory = Some(Arc::new(factory));
        self
    }
}

/// A registered node type with its composed port list.
pub struct NodeTypeDescriptor {
    name: String,
    base: Option<String>,
    inputs: Vec<PortDescriptor>,
    outputs: Vec<PortDescriptor>,
    options: TypeOptions,
    factory: Option<NodeFactory>,
}

impl NodeTypeDescriptor {
    pub fn base(&self) -> Option<&str> {
        self.base.as_deref()
    }

    pub fn inputs(&self) -> &[PortDescriptor] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[PortDescriptor] {
        &self.outputs
    }

    pub fn options(&self) -> &TypeOptions {
        &self.options
    }

    pub fn is_virtual(&self) -> bool {
        self.options.is_virtual
    }

    pub fn port(&self, id: &PortId) -> Option<&PortDescriptor> {
        self.inputs
            .iter()
            .chain(&self.outputs)
            .find(|p| &p.id() == id)
    }
}

impl NodeType for NodeTypeDescriptor {
    fn name(&self) -> &str {
        &self.name
    }

    fn declared_ports(&self) -> Vec<&PortDescriptor> {
        self.inputs.iter().chain(&self.outputs).collect()
    }

    fn make_instance(&self) -> GraphResult<AnyNode> {
        match (&self.factory, self.options.is_virtual) {
            (Some(factory), false) => Ok(factory()),
            _ => Err(GraphError::VirtualType(self.name.clone())),
        }
    }
}

impl fmt::Debug for NodeTypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeTypeDescriptor")
            .field("name", &self.name)
            .field("base", &self.base)
            .field("inputs", &self.inputs.len())
            .field("outputs", &self.outputs.len())
            .field("options", &self.options)
            .finish()
    }
}

/// Catalog of node types keyed by name.
#[derive(Default)]
pub struct NodeTypeRegistry {
    types: HashMap<String, Arc<NodeTypeDescriptor>>,
    order: Vec<String>,
}

impl NodeTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry populated with the built-in node library.
    pub fn with_builtins() -> GraphResult<Self> {
        let mut registry = Self::new();
        crate::graph::nodes::register_builtins(&mut registry)?;
        Ok(registry)
    }

    /// Register a type. Its base must already be registered.
    pub fn register(&mut self, decl: NodeTypeDecl) -> GraphResult<Arc<NodeTypeDescriptor>> {
        if self.types.contains_key(&decl.name) {
            return Err(GraphError::DuplicateType(decl.name));
        }

        let base = match &decl.base {
            Some(base_name) => Some(self.types.get(base_name).cloned().ok_or_else(|| {
                GraphError::MissingBase {
                    name: decl.name.clone(),
                    base: base_name.clone(),
                }
            })?),
            None => None,
        };

        let (mut inputs, mut outputs, mut options, mut factory) = match &base {
            Some(b) => (
                b.inputs.clone(),
                b.outputs.clone(),
                TypeOptions {
                    is_virtual: false,
                    ..b.options.clone()
                },
                b.factory.clone(),
            ),
            None => (Vec::new(), Vec::new(), TypeOptions::default(), None),
        };

        for port in decl.inputs.into_iter().chain(decl.outputs) {
            let id = port.id();
            if inputs.iter().chain(&outputs).any(|p| p.id() == id) {
                return Err(GraphError::ShadowedPort {
                    owner: decl.name,
                    port: id,
                });
            }
            if port.is_input() {
                inputs.push(port);
            } else {
                outputs.push(port);
            }
        }

        options.is_virtual = decl.options.is_virtual;
        options.always_evaluate |= decl.options.always_evaluate;
        options.breaks_cycles |= decl.options.breaks_cycles;
        if !decl.options.description.is_empty() {
            options.description = decl.options.description;
        }
        if decl.factory.is_some() {
            factory = decl.factory;
        }
        if factory.is_none() && !options.is_virtual {
            return Err(GraphError::VirtualType(decl.name));
        }

        let descriptor = Arc::new(NodeTypeDescriptor {
            name: decl.name.clone(),
            base: decl.base,
            inputs,
            outputs,
            options,
            factory,
        });
        tracing::trace!("Registered node type '{}'", descriptor.name);
        self.order.push(decl.name.clone());
        self.types.insert(decl.name, descriptor.clone());
        Ok(descriptor)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<NodeTypeDescriptor>> {
        self.types.get(name)
    }

    /// Type names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Process-wide registry of the built-in node types.
    pub fn global() -> Arc<NodeTypeRegistry> {
        static GLOBAL: OnceLock<Arc<NodeTypeRegistry>> = OnceLock::new();
        GLOBAL
            .get_or_init(|| match NodeTypeRegistry::with_builtins() {
                Ok(registry) => Arc::new(registry),
                Err(e) => {
                    tracing::error!("Failed to register built-in node types: {}", e);
                    Arc::new(NodeTypeRegistry::new())
                }
            })
            .clone()
    }
}
