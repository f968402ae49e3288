//! Built-in node library.

pub mod expression;
pub mod external;
pub mod math;
pub mod module;
pub mod time;
pub mod vars;
pub mod weighted_choice;

pub use expression::ExpressionNode;
pub use external::{ExternalFeed, ExternalSourceNode};
pub use math::{ColorNode, FloatNode, MathNode, MathOp};
pub use module::{ModuleInputNode, ModuleNode, ModuleOutputNode};
pub use time::{DelayNode, LfoNode, LfoShape, TimeNode};
pub use vars::{GetVarNode, SetVarNode};
pub use weighted_choice::WeightedChoiceNode;

use crate::graph::error::GraphResult;
use crate::graph::node::{AnyNode, BuiltinNode};
use crate::graph::node_type::{NodeTypeDecl, NodeTypeRegistry};
use crate::graph::port::PortDescriptor;

fn with_ports(mut decl: NodeTypeDecl, ports: Vec<PortDescriptor>) -> NodeTypeDecl {
    for port in ports {
        decl = if port.is_input() {
            decl.input(port)
        } else {
            decl.output(port)
        };
    }
    decl
}

fn builtin(node: impl Fn() -> BuiltinNode + Send + Sync + 'static) -> impl Fn() -> AnyNode + Send + Sync + 'static {
    move || AnyNode::Builtin(node())
}

/// Register every built-in node type.
pub fn register_builtins(registry: &mut NodeTypeRegistry) -> GraphResult<()> {
    registry.register(
        with_ports(NodeTypeDecl::new("Float"), FloatNode::ports())
            .description("A single editable number")
            .factory(builtin(|| BuiltinNode::Float(FloatNode))),
    )?;

    registry.register(
        with_ports(NodeTypeDecl::new("BinaryMath"), MathNode::ports())
            .virtual_type()
            .description("Arithmetic on two numbers"),
    )?;
    for op in MathOp::ALL {
        registry.register(
            NodeTypeDecl::new(op.name())
                .base("BinaryMath")
                .factory(builtin(move || BuiltinNode::Math(MathNode::new(op)))),
        )?;
    }

    registry.register(
        with_ports(NodeTypeDecl::new("Color"), ColorNode::ports())
            .description("RGBA color from four channels")
            .factory(builtin(|| BuiltinNode::Color(ColorNode))),
    )?;

    registry.register(
        with_ports(NodeTypeDecl::new("Time"), TimeNode::ports())
            .always_evaluate()
            .description("Graph clock")
            .factory(builtin(|| BuiltinNode::Time(TimeNode))),
    )?;
    registry.register(
        with_ports(NodeTypeDecl::new("Lfo"), LfoNode::ports())
            .always_evaluate()
            .description("Low-frequency oscillator")
            .factory(builtin(|| BuiltinNode::Lfo(LfoNode))),
    )?;
    registry.register(
        with_ports(NodeTypeDecl::new("Delay"), DelayNode::ports())
            .always_evaluate()
            .breaks_cycles()
            .description("Previous tick's input")
            .factory(builtin(|| BuiltinNode::Delay(DelayNode))),
    )?;

    registry.register(
        with_ports(NodeTypeDecl::new("WeightedChoice"), WeightedChoiceNode::ports())
            .description("Weighted pick among `count` slots")
            .factory(builtin(|| BuiltinNode::WeightedChoice(WeightedChoiceNode))),
    )?;
    registry.register(
        with_ports(NodeTypeDecl::new("Expression"), ExpressionNode::ports())
            .always_evaluate()
            .description("Rhai expression over a, b and c")
            .factory(builtin(|| BuiltinNode::Expression(ExpressionNode::new()))),
    )?;

    registry.register(
        with_ports(NodeTypeDecl::new("SetVar"), SetVarNode::ports())
            .description("Publish a value under a name")
            .factory(builtin(|| BuiltinNode::SetVar(SetVarNode::new()))),
    )?;
    registry.register(
        with_ports(NodeTypeDecl::new("GetVar"), GetVarNode::ports())
            .always_evaluate()
            .description("Read a value published by SetVar")
            .factory(builtin(|| BuiltinNode::GetVar(GetVarNode))),
    )?;

    registry.register(
        with_ports(NodeTypeDecl::new(module::MODULE_INPUT), ModuleInputNode::ports())
            .description("Input of the enclosing module")
            .factory(builtin(|| BuiltinNode::ModuleInput(ModuleInputNode))),
    )?;
    registry.register(
        with_ports(NodeTypeDecl::new(module::MODULE_OUTPUT), ModuleOutputNode::ports())
            .description("Output of the enclosing module")
            .factory(builtin(|| BuiltinNode::ModuleOutput(ModuleOutputNode))),
    )?;
    registry.register(
        NodeTypeDecl::new("Module")
            .always_evaluate()
            .description("Nested graph")
            .factory(|| AnyNode::Plugin(Box::new(ModuleNode::new()))),
    )?;

    registry.register(
        with_ports(
            NodeTypeDecl::new("ExternalSource"),
            vec![PortDescriptor::output(
                "value",
                crate::graph::dtype::DType::float(0.0),
            )],
        )
        .always_evaluate()
        .description("Values fed from another thread")
        .factory(|| AnyNode::Plugin(Box::new(ExternalSourceNode::new()))),
    )?;

    tracing::debug!("Registered {} built-in node types", registry.len());
    Ok(())
}
