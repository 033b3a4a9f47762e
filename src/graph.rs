//! SignalFlowGraph - Structural description of a signal-flow graph
//!
//! Operations connected by signals, with feedback permitted only through
//! delay elements. The graph is a flat arena addressed by [`OperationId`];
//! nested subgraphs are instantiated by copying their operations into the
//! arena, so the compiler can walk everything through one id space.
//!
//! The graph is write-once: the builder methods construct it, the simulation
//! subsystem only reads it.
//!
//! # Example
//! ```
//! use sigflow::{Num, SignalFlowGraph};
//!
//! // First-order recursive filter: add = in + 0.5 * t, t <<= add, out = t.
//! let mut graph = SignalFlowGraph::new();
//! let input = graph.input();
//! let delay = graph.delay(Num::ZERO);
//! let scaled = graph.constant_multiplication(Num::real(0.5), delay);
//! let sum = graph.addition(input, scaled);
//! graph.connect(delay, 0, sum);
//! graph.output(delay);
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use crate::number::Num;

/// External callable backing a custom operation.
///
/// Called as `(output_index, input_values, quantize)` and returns the value
/// of that output. Receives everything by value and must not retain state
/// that observes the engine.
pub type CustomFn = Arc<dyn Fn(usize, &[Num], bool) -> Num + Send + Sync>;

/// Identifier of one operation in a [`SignalFlowGraph`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct OperationId(pub(crate) usize);

/// One signal: a producing operation output, with an optional word length.
///
/// A signal carrying `bits` is quantized to that many bits whenever the
/// simulation runs with quantization enabled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Source {
    pub(crate) operation: OperationId,
    pub(crate) output: usize,
    pub(crate) bits: Option<u8>,
}

impl Source {
    /// Signal from a specific output of an operation
    #[inline]
    pub const fn new(operation: OperationId, output: usize) -> Self {
        Self { operation, output, bits: None }
    }

    /// Declare a finite word length for this signal
    #[inline]
    pub const fn quantized(mut self, bits: u8) -> Self {
        self.bits = Some(bits);
        self
    }
}

impl From<OperationId> for Source {
    /// Signal from the first output of an operation
    #[inline]
    fn from(operation: OperationId) -> Self {
        Self::new(operation, 0)
    }
}

/// What an operation computes, plus any type-specific payload.
#[derive(Clone)]
pub(crate) enum OperationKind {
    Constant(Num),
    Addition,
    Subtraction,
    Multiplication,
    Division,
    Min,
    Max,
    SquareRoot,
    Conjugate,
    Absolute,
    ConstantMultiplication(Num),
    /// Two outputs: sum and difference of the two inputs
    Butterfly,
    Input,
    Output,
    Delay {
        initial: Num,
    },
    /// A flattened-at-compile-time nested graph. The operation lists point
    /// at the instantiated copies inside the parent arena.
    Subgraph {
        input_operations: Vec<OperationId>,
        output_operations: Vec<OperationId>,
    },
    Custom {
        name: String,
        evaluate: CustomFn,
    },
}

impl OperationKind {
    pub(crate) fn type_name(&self) -> &str {
        match self {
            Self::Constant(_) => "c",
            Self::Addition => "add",
            Self::Subtraction => "sub",
            Self::Multiplication => "mul",
            Self::Division => "div",
            Self::Min => "min",
            Self::Max => "max",
            Self::SquareRoot => "sqrt",
            Self::Conjugate => "conj",
            Self::Absolute => "abs",
            Self::ConstantMultiplication(_) => "cmul",
            Self::Butterfly => "bfly",
            Self::Input => "in",
            Self::Output => "out",
            Self::Delay { .. } => "t",
            Self::Subgraph { .. } => "sfg",
            Self::Custom { name, .. } => name,
        }
    }
}

pub(crate) struct OperationNode {
    /// Name within the owning graph's namespace, e.g. "add0"
    pub(crate) graph_id: String,
    pub(crate) kind: OperationKind,
    pub(crate) inputs: Vec<Option<Source>>,
    pub(crate) output_count: usize,
}

/// Structural description of a signal-flow graph.
#[derive(Default)]
pub struct SignalFlowGraph {
    nodes: Vec<OperationNode>,
    inputs: Vec<OperationId>,
    outputs: Vec<OperationId>,
    id_counters: HashMap<String, usize>,
}

impl SignalFlowGraph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of inputs the graph takes per iteration
    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    /// Number of outputs the graph produces per iteration
    pub fn output_count(&self) -> usize {
        self.outputs.len()
    }

    /// Number of operations, including those of instantiated subgraphs
    pub fn operation_count(&self) -> usize {
        self.nodes.len()
    }

    /// Name of an operation within its owning graph's namespace
    pub fn graph_id(&self, operation: OperationId) -> &str {
        &self.nodes[operation.0].graph_id
    }

    pub(crate) fn node(&self, operation: OperationId) -> &OperationNode {
        &self.nodes[operation.0]
    }

    pub(crate) fn input_operations(&self) -> &[OperationId] {
        &self.inputs
    }

    pub(crate) fn output_operations(&self) -> &[OperationId] {
        &self.outputs
    }

    fn insert(
        &mut self,
        kind: OperationKind,
        inputs: Vec<Option<Source>>,
        output_count: usize,
    ) -> OperationId {
        let counter = self.id_counters.entry(kind.type_name().to_string()).or_insert(0);
        let graph_id = format!("{}{}", kind.type_name(), *counter);
        *counter += 1;
        self.nodes.push(OperationNode { graph_id, kind, inputs, output_count });
        OperationId(self.nodes.len() - 1)
    }

    /// Add an input operation and register it as the next graph input
    pub fn input(&mut self) -> OperationId {
        let id = self.insert(OperationKind::Input, Vec::new(), 1);
        self.inputs.push(id);
        id
    }

    /// Add an output sink fed by `source` and register it as the next graph
    /// output
    pub fn output(&mut self, source: impl Into<Source>) -> OperationId {
        let id = self.insert(OperationKind::Output, vec![Some(source.into())], 0);
        self.outputs.push(id);
        id
    }

    /// Add a constant source
    pub fn constant(&mut self, value: impl Into<Num>) -> OperationId {
        self.insert(OperationKind::Constant(value.into()), Vec::new(), 1)
    }

    fn binary(
        &mut self,
        kind: OperationKind,
        lhs: impl Into<Source>,
        rhs: impl Into<Source>,
    ) -> OperationId {
        self.insert(kind, vec![Some(lhs.into()), Some(rhs.into())], 1)
    }

    fn unary(&mut self, kind: OperationKind, input: impl Into<Source>) -> OperationId {
        self.insert(kind, vec![Some(input.into())], 1)
    }

    /// lhs + rhs
    pub fn addition(&mut self, lhs: impl Into<Source>, rhs: impl Into<Source>) -> OperationId {
        self.binary(OperationKind::Addition, lhs, rhs)
    }

    /// lhs - rhs
    pub fn subtraction(&mut self, lhs: impl Into<Source>, rhs: impl Into<Source>) -> OperationId {
        self.binary(OperationKind::Subtraction, lhs, rhs)
    }

    /// lhs * rhs
    pub fn multiplication(
        &mut self,
        lhs: impl Into<Source>,
        rhs: impl Into<Source>,
    ) -> OperationId {
        self.binary(OperationKind::Multiplication, lhs, rhs)
    }

    /// lhs / rhs
    pub fn division(&mut self, lhs: impl Into<Source>, rhs: impl Into<Source>) -> OperationId {
        self.binary(OperationKind::Division, lhs, rhs)
    }

    /// min(lhs, rhs), real values only
    pub fn min(&mut self, lhs: impl Into<Source>, rhs: impl Into<Source>) -> OperationId {
        self.binary(OperationKind::Min, lhs, rhs)
    }

    /// max(lhs, rhs), real values only
    pub fn max(&mut self, lhs: impl Into<Source>, rhs: impl Into<Source>) -> OperationId {
        self.binary(OperationKind::Max, lhs, rhs)
    }

    /// Principal square root
    pub fn square_root(&mut self, input: impl Into<Source>) -> OperationId {
        self.unary(OperationKind::SquareRoot, input)
    }

    /// Complex conjugate
    pub fn conjugate(&mut self, input: impl Into<Source>) -> OperationId {
        self.unary(OperationKind::Conjugate, input)
    }

    /// Magnitude
    pub fn absolute(&mut self, input: impl Into<Source>) -> OperationId {
        self.unary(OperationKind::Absolute, input)
    }

    /// coefficient * input
    pub fn constant_multiplication(
        &mut self,
        coefficient: impl Into<Num>,
        input: impl Into<Source>,
    ) -> OperationId {
        self.unary(OperationKind::ConstantMultiplication(coefficient.into()), input)
    }

    /// Butterfly: output 0 is `lhs + rhs`, output 1 is `lhs - rhs`
    pub fn butterfly(&mut self, lhs: impl Into<Source>, rhs: impl Into<Source>) -> OperationId {
        self.insert(
            OperationKind::Butterfly,
            vec![Some(lhs.into()), Some(rhs.into())],
            2,
        )
    }

    /// Single-sample delay publishing `initial` on the first iteration.
    ///
    /// The input is left unconnected so feedback loops can be closed with
    /// [`connect`](Self::connect) once the downstream expression exists.
    pub fn delay(&mut self, initial: impl Into<Num>) -> OperationId {
        self.insert(OperationKind::Delay { initial: initial.into() }, vec![None], 1)
    }

    /// Custom operation evaluated through `evaluate` at run time.
    ///
    /// `name` must not collide with a built-in type tag. The callable is
    /// invoked once per referenced output and per iteration.
    ///
    /// # Panics
    /// Panics if `inputs` does not match `input_count`.
    pub fn custom<F>(
        &mut self,
        name: impl Into<String>,
        input_count: usize,
        output_count: usize,
        inputs: &[Source],
        evaluate: F,
    ) -> OperationId
    where
        F: Fn(usize, &[Num], bool) -> Num + Send + Sync + 'static,
    {
        assert_eq!(
            inputs.len(),
            input_count,
            "custom operation declared {input_count} inputs"
        );
        self.insert(
            OperationKind::Custom { name: name.into(), evaluate: Arc::new(evaluate) },
            inputs.iter().copied().map(Some).collect(),
            output_count,
        )
    }

    /// Instantiate `inner` as a nested operation fed by `inputs`.
    ///
    /// The inner operations are copied into this graph with their ids
    /// remapped; they keep their inner names, which become dotted result-key
    /// prefixes once compiled.
    ///
    /// # Panics
    /// Panics if `inputs` does not match the inner graph's input count.
    pub fn subgraph(&mut self, inner: &SignalFlowGraph, inputs: &[Source]) -> OperationId {
        assert_eq!(
            inputs.len(),
            inner.input_count(),
            "subgraph declares {} inputs",
            inner.input_count()
        );
        let offset = self.nodes.len();
        let remap = |id: OperationId| OperationId(id.0 + offset);
        for node in &inner.nodes {
            let mut ports = node.inputs.clone();
            for port in ports.iter_mut().flatten() {
                port.operation = remap(port.operation);
            }
            let mut kind = node.kind.clone();
            if let OperationKind::Subgraph { input_operations, output_operations } = &mut kind {
                for id in input_operations.iter_mut().chain(output_operations.iter_mut()) {
                    *id = remap(*id);
                }
            }
            self.nodes.push(OperationNode {
                graph_id: node.graph_id.clone(),
                kind,
                inputs: ports,
                output_count: node.output_count,
            });
        }
        let kind = OperationKind::Subgraph {
            input_operations: inner.inputs.iter().copied().map(remap).collect(),
            output_operations: inner.outputs.iter().copied().map(remap).collect(),
        };
        self.insert(
            kind,
            inputs.iter().copied().map(Some).collect(),
            inner.output_count(),
        )
    }

    /// Attach `source` to an input port, replacing whatever was there.
    ///
    /// This is how feedback loops are closed: create the delay first, build
    /// the expression that consumes it, then connect the delay's input.
    ///
    /// # Panics
    /// Panics if `input` is not a valid port of `operation`.
    pub fn connect(&mut self, operation: OperationId, input: usize, source: impl Into<Source>) {
        self.nodes[operation.0].inputs[input] = Some(source.into());
    }
}
