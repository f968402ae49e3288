//! Graph builders for integration tests

use lumagraph_rs::graph::{Graph, NodeId, PortId, Value};

/// Output of a `Float` node
pub fn float_out() -> PortId {
    PortId::output("value")
}

/// Input of a `Float` node
pub fn float_in() -> PortId {
    PortId::input("value")
}

/// Builder for test graphs made of `Float` and binary math nodes
pub struct GraphBuilder {
    graph: Graph,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self {
            graph: Graph::with_builtins(),
        }
    }

    pub fn float(&mut self, value: f64) -> NodeId {
        self.graph
            .create_node("Float", [(float_in(), Value::Float(value))])
            .unwrap()
    }

    /// A math node (`"Add"`, `"Multiply"`, ...) with both operands manual
    pub fn math(&mut self, op: &str, a: f64, b: f64) -> NodeId {
        self.graph
            .create_node(
                op,
                [
                    (PortId::input("a"), Value::Float(a)),
                    (PortId::input("b"), Value::Float(b)),
                ],
            )
            .unwrap()
    }

    pub fn connect(&mut self, src: NodeId, src_port: &str, dst: NodeId, dst_port: &str) -> &mut Self {
        self.graph
            .create_connection(src, PortId::output(src_port), dst, PortId::input(dst_port))
            .unwrap();
        self
    }

    /// `len` Float nodes, each reading the previous one. Returns them in chain order.
    pub fn float_chain(&mut self, start: f64, len: usize) -> Vec<NodeId> {
        let mut chain: Vec<NodeId> = Vec::with_capacity(len);
        for i in 0..len {
            let node = self.float(if i == 0 { start } else { 0.0 });
            if let Some(&prev) = chain.last() {
                self.connect(prev, "value", node, "value");
            }
            chain.push(node);
        }
        chain
    }

    /// `len` Add nodes adding `step` each, fed by a Float holding `start`.
    /// Returns the Float followed by the adders.
    pub fn add_chain(&mut self, start: f64, step: f64, len: usize) -> Vec<NodeId> {
        let mut chain = vec![self.float(start)];
        for _ in 0..len {
            let add = self.math("Add", 0.0, step);
            let prev = *chain.last().unwrap();
            let port = if chain.len() == 1 { "value" } else { "result" };
            self.connect(prev, port, add, "a");
            chain.push(add);
        }
        chain
    }

    /// `top` feeds two adders whose results meet in a Multiply.
    /// Returns `[top, left, right, bottom]`.
    pub fn diamond(&mut self, top: f64) -> [NodeId; 4] {
        let source = self.float(top);
        let left = self.math("Add", 0.0, 1.0);
        let right = self.math("Add", 0.0, 2.0);
        let bottom = self.math("Multiply", 0.0, 0.0);
        self.connect(source, "value", left, "a")
            .connect(source, "value", right, "a")
            .connect(left, "result", bottom, "a")
            .connect(right, "result", bottom, "b");
        [source, left, right, bottom]
    }

    pub fn graph(&mut self) -> &mut Graph {
        &mut self.graph
    }

    pub fn build(self) -> Graph {
        self.graph
    }
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}
