//! Compiler - Lowers a signal-flow graph to a flat stack-machine program
//!
//! Traversal is depth-first and driven by the graph's output sinks: each
//! sink is walked upstream so producers emit before consumers. Along the
//! way the compiler
//!
//! - memoizes per-output results so shared expressions emit once,
//! - defers every delay's input walk until all sinks are lowered, which is
//!   what breaks feedback cycles,
//! - flattens nested subgraphs in place, prefixing their result keys,
//! - rejects feedback that does not pass through a delay, and
//! - proves the exact stack depth the program needs.

use std::collections::{HashMap, HashSet};

use log::debug;

use crate::error::{Result, SimulationError};
use crate::graph::{OperationId, OperationKind, SignalFlowGraph};
use crate::sim::instruction::{Instruction, InstructionKind, ResultIndex, RESULT_NONE};
use crate::sim::program::{CustomOperation, CustomSource, DelayInfo, Program};

/// An operation as seen by the traversal: either the graph being compiled
/// or one of its operations. The graph itself acts as the outermost
/// subgraph so output walks and input resolution are uniform at every
/// nesting level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum OpRef {
    Root,
    Operation(OperationId),
}

/// Identity of one operation output, the memoization unit.
type OutputRef = (OpRef, usize);

/// One entered subgraph: the operation and the length of the key prefix in
/// force outside it.
#[derive(Clone, Copy)]
struct SfgFrame {
    sfg: OpRef,
    prefix_length: usize,
}

/// A delay whose input walk is postponed until all sinks are lowered.
struct DeferredDelay {
    delay_index: usize,
    operation: OperationId,
    prefix: String,
    sfg_stack: Vec<SfgFrame>,
}

/// Compile `graph` into an executable [`Program`].
pub fn compile(graph: &SignalFlowGraph) -> Result<Program> {
    debug!("compiling signal-flow graph");
    let mut compiler = Compiler::new(graph);
    let mut deferred = Vec::new();
    for index in 0..graph.output_count() {
        compiler.add_operation_output(OpRef::Root, index, "", &[], &mut deferred)?;
    }
    compiler.add_deferred_delays(deferred)?;
    compiler.resolve_ignored_result_indices();
    debug!("compiled program:\n{}", compiler.code);
    Ok(compiler.code)
}

struct Compiler<'a> {
    graph: &'a SignalFlowGraph,
    code: Program,
    /// Outputs whose instructions are currently being emitted. Hitting one
    /// of these again means a combinational cycle.
    incomplete_outputs: HashSet<OutputRef>,
    /// Result index per output already emitted
    added_results: HashMap<OutputRef, ResultIndex>,
    /// Custom-operation table index per custom operation
    added_custom_operations: HashMap<OperationId, usize>,
    stack_depth: isize,
}

impl<'a> Compiler<'a> {
    fn new(graph: &'a SignalFlowGraph) -> Self {
        let code = Program {
            input_count: graph.input_count(),
            output_count: graph.output_count(),
            ..Program::default()
        };
        Self {
            graph,
            code,
            incomplete_outputs: HashSet::new(),
            added_results: HashMap::new(),
            added_custom_operations: HashMap::new(),
            stack_depth: 0,
        }
    }

    fn graph_id(&self, op: OpRef) -> &str {
        match op {
            OpRef::Root => "",
            OpRef::Operation(id) => self.graph.graph_id(id),
        }
    }

    fn output_count(&self, op: OpRef) -> usize {
        match op {
            OpRef::Root => self.graph.output_count(),
            OpRef::Operation(id) => self.graph.node(id).output_count,
        }
    }

    fn key_base(&self, op: OpRef, prefix: &str) -> String {
        let graph_id = self.graph_id(op);
        if prefix.is_empty() {
            graph_id.to_string()
        } else {
            format!("{prefix}.{graph_id}")
        }
    }

    fn key_of_output(&self, op: OpRef, output_index: usize, prefix: &str) -> String {
        let base = self.key_base(op, prefix);
        if base.is_empty() {
            output_index.to_string()
        } else if self.output_count(op) == 1 {
            base
        } else {
            format!("{base}.{output_index}")
        }
    }

    /// Append an instruction and account for its stack effect. A depth that
    /// would go negative means the graph's operation arities do not line up.
    fn add_instruction(
        &mut self,
        kind: InstructionKind,
        result_index: ResultIndex,
        stack_effect: isize,
    ) -> Result<()> {
        self.stack_depth += stack_effect;
        if self.stack_depth < 0 {
            return Err(SimulationError::ArityMismatch);
        }
        let depth = self.stack_depth as usize;
        if depth > self.code.required_stack_size {
            self.code.required_stack_size = depth;
        }
        self.code.instructions.push(Instruction { kind, result_index });
        Ok(())
    }

    /// Start emitting one operation output.
    ///
    /// Returns the fresh result index on first visit. On a revisit a single
    /// push_result re-reads the memoized value and `None` tells the caller
    /// to emit nothing else. Revisiting an output that is still being
    /// emitted is the direct-feedback error, unless it belongs to a delay.
    fn begin_operation_output(
        &mut self,
        op: OpRef,
        output_index: usize,
        prefix: &str,
    ) -> Result<Option<ResultIndex>> {
        let output = (op, output_index);
        if self.incomplete_outputs.contains(&output) {
            let is_delay = matches!(
                op,
                OpRef::Operation(id)
                    if matches!(self.graph.node(id).kind, OperationKind::Delay { .. })
            );
            if !is_delay {
                return Err(SimulationError::DirectFeedbackLoop);
            }
        }
        if let Some(&index) = self.added_results.get(&output) {
            self.add_instruction(InstructionKind::PushResult(index as usize), index, 1)?;
            return Ok(None);
        }
        if self.code.result_keys.len() >= RESULT_NONE as usize {
            return Err(SimulationError::TooManyResults { limit: RESULT_NONE as usize });
        }
        let index = self.code.result_keys.len() as ResultIndex;
        self.code
            .result_keys
            .push(self.key_of_output(op, output_index, prefix));
        self.added_results.insert(output, index);
        self.incomplete_outputs.insert(output);
        Ok(Some(index))
    }

    fn end_operation_output(&mut self, op: OpRef, output_index: usize) {
        let erased = self.incomplete_outputs.remove(&(op, output_index));
        debug_assert!(erased);
    }

    fn try_add_custom_operation(&mut self, id: OperationId) -> usize {
        if let Some(&index) = self.added_custom_operations.get(&id) {
            return index;
        }
        let OperationKind::Custom { evaluate, .. } = &self.graph.node(id).kind else {
            unreachable!("registered operation is custom by construction");
        };
        let index = self.code.custom_operations.len();
        self.code.custom_operations.push(CustomOperation {
            evaluate: evaluate.clone(),
            input_count: self.graph.node(id).inputs.len(),
            output_count: self.graph.node(id).output_count,
        });
        self.added_custom_operations.insert(id, index);
        index
    }

    /// Walk the signal feeding `input_index` of `id`, then quantize it if
    /// the signal declares a word length.
    fn add_source(
        &mut self,
        id: OperationId,
        input_index: usize,
        prefix: &str,
        sfg_stack: &[SfgFrame],
        deferred: &mut Vec<DeferredDelay>,
    ) -> Result<()> {
        let Some(source) = self.graph.node(id).inputs[input_index] else {
            return Err(SimulationError::UnconnectedInput {
                operation: self.graph.graph_id(id).to_string(),
                input: input_index,
            });
        };
        self.add_operation_output(
            OpRef::Operation(source.operation),
            source.output,
            prefix,
            sfg_stack,
            deferred,
        )?;
        if let Some(bits) = source.bits {
            if bits > 64 {
                return Err(SimulationError::QuantizationTooWide { bits });
            }
            let mask = if bits == 64 { -1 } else { (1i64 << bits) - 1 };
            self.add_instruction(InstructionKind::Quantize { mask }, RESULT_NONE, 0)?;
        }
        Ok(())
    }

    fn add_unary_operation_output(
        &mut self,
        id: OperationId,
        result_index: ResultIndex,
        prefix: &str,
        sfg_stack: &[SfgFrame],
        deferred: &mut Vec<DeferredDelay>,
        kind: InstructionKind,
    ) -> Result<()> {
        self.add_source(id, 0, prefix, sfg_stack, deferred)?;
        self.add_instruction(kind, result_index, 0)
    }

    fn add_binary_operation_output(
        &mut self,
        id: OperationId,
        result_index: ResultIndex,
        prefix: &str,
        sfg_stack: &[SfgFrame],
        deferred: &mut Vec<DeferredDelay>,
        kind: InstructionKind,
    ) -> Result<()> {
        self.add_source(id, 0, prefix, sfg_stack, deferred)?;
        self.add_source(id, 1, prefix, sfg_stack, deferred)?;
        self.add_instruction(kind, result_index, -1)
    }

    fn add_operation_output(
        &mut self,
        op: OpRef,
        output_index: usize,
        prefix: &str,
        sfg_stack: &[SfgFrame],
        deferred: &mut Vec<DeferredDelay>,
    ) -> Result<()> {
        // Output sinks record nothing themselves; they pass their source
        // through.
        if let OpRef::Operation(id) = op {
            if matches!(self.graph.node(id).kind, OperationKind::Output) {
                return self.add_source(id, 0, prefix, sfg_stack, deferred);
            }
        }
        let Some(result_index) = self.begin_operation_output(op, output_index, prefix)? else {
            return Ok(());
        };
        match op {
            OpRef::Root => {
                let output_op = self.graph.output_operations()[output_index];
                self.add_subgraph_output(
                    op,
                    output_op,
                    result_index,
                    prefix,
                    sfg_stack,
                    deferred,
                )?;
            }
            OpRef::Operation(id) => {
                let kind = self.graph.node(id).kind.clone();
                match kind {
                    OperationKind::Constant(value) => {
                        self.add_instruction(
                            InstructionKind::PushConstant(value),
                            result_index,
                            1,
                        )?;
                    }
                    OperationKind::Addition => self.add_binary_operation_output(
                        id,
                        result_index,
                        prefix,
                        sfg_stack,
                        deferred,
                        InstructionKind::Addition,
                    )?,
                    OperationKind::Subtraction => self.add_binary_operation_output(
                        id,
                        result_index,
                        prefix,
                        sfg_stack,
                        deferred,
                        InstructionKind::Subtraction,
                    )?,
                    OperationKind::Multiplication => self.add_binary_operation_output(
                        id,
                        result_index,
                        prefix,
                        sfg_stack,
                        deferred,
                        InstructionKind::Multiplication,
                    )?,
                    OperationKind::Division => self.add_binary_operation_output(
                        id,
                        result_index,
                        prefix,
                        sfg_stack,
                        deferred,
                        InstructionKind::Division,
                    )?,
                    OperationKind::Min => self.add_binary_operation_output(
                        id,
                        result_index,
                        prefix,
                        sfg_stack,
                        deferred,
                        InstructionKind::Min,
                    )?,
                    OperationKind::Max => self.add_binary_operation_output(
                        id,
                        result_index,
                        prefix,
                        sfg_stack,
                        deferred,
                        InstructionKind::Max,
                    )?,
                    OperationKind::SquareRoot => self.add_unary_operation_output(
                        id,
                        result_index,
                        prefix,
                        sfg_stack,
                        deferred,
                        InstructionKind::SquareRoot,
                    )?,
                    OperationKind::Conjugate => self.add_unary_operation_output(
                        id,
                        result_index,
                        prefix,
                        sfg_stack,
                        deferred,
                        InstructionKind::Conjugate,
                    )?,
                    OperationKind::Absolute => self.add_unary_operation_output(
                        id,
                        result_index,
                        prefix,
                        sfg_stack,
                        deferred,
                        InstructionKind::Absolute,
                    )?,
                    OperationKind::ConstantMultiplication(value) => self
                        .add_unary_operation_output(
                            id,
                            result_index,
                            prefix,
                            sfg_stack,
                            deferred,
                            InstructionKind::ConstantMultiplication(value),
                        )?,
                    OperationKind::Butterfly => {
                        // Output 0 is the sum, output 1 the difference.
                        let kind = if output_index == 0 {
                            InstructionKind::Addition
                        } else {
                            InstructionKind::Subtraction
                        };
                        self.add_binary_operation_output(
                            id,
                            result_index,
                            prefix,
                            sfg_stack,
                            deferred,
                            kind,
                        )?;
                    }
                    OperationKind::Input => {
                        self.add_input_output(id, result_index, prefix, sfg_stack, deferred)?;
                    }
                    OperationKind::Delay { initial } => {
                        let delay_index = self.code.delays.len();
                        self.code.delays.push(DelayInfo {
                            initial_value: initial,
                            result_index,
                        });
                        deferred.push(DeferredDelay {
                            delay_index,
                            operation: id,
                            prefix: prefix.to_string(),
                            sfg_stack: sfg_stack.to_vec(),
                        });
                        self.add_instruction(
                            InstructionKind::PushDelay(delay_index),
                            result_index,
                            1,
                        )?;
                    }
                    OperationKind::Subgraph { ref output_operations, .. } => {
                        let output_op = output_operations[output_index];
                        self.add_subgraph_output(
                            op,
                            output_op,
                            result_index,
                            prefix,
                            sfg_stack,
                            deferred,
                        )?;
                    }
                    OperationKind::Custom { .. } => {
                        let custom_operation_index = self.try_add_custom_operation(id);
                        let input_count =
                            self.code.custom_operations[custom_operation_index].input_count;
                        for input_index in 0..input_count {
                            self.add_source(id, input_index, prefix, sfg_stack, deferred)?;
                        }
                        let custom_source_index = self.code.custom_sources.len();
                        self.code.custom_sources.push(CustomSource {
                            custom_operation_index,
                            output_index,
                        });
                        self.add_instruction(
                            InstructionKind::Custom(custom_source_index),
                            result_index,
                            1 - input_count as isize,
                        )?;
                    }
                    OperationKind::Output => unreachable!("handled before memoization"),
                }
            }
        }
        self.end_operation_output(op, output_index);
        Ok(())
    }

    /// Enter a subgraph (or the root): walk the sink belonging to
    /// `output_index` under the subgraph's own key prefix, then forward the
    /// value so it is also recorded under the subgraph's key.
    fn add_subgraph_output(
        &mut self,
        op: OpRef,
        output_op: OperationId,
        result_index: ResultIndex,
        prefix: &str,
        sfg_stack: &[SfgFrame],
        deferred: &mut Vec<DeferredDelay>,
    ) -> Result<()> {
        let inner_prefix = self.key_base(op, prefix);
        let mut inner_stack = sfg_stack.to_vec();
        inner_stack.push(SfgFrame { sfg: op, prefix_length: prefix.len() });
        self.add_source(output_op, 0, &inner_prefix, &inner_stack, deferred)?;
        self.add_instruction(InstructionKind::ForwardValue, result_index, 0)
    }

    /// Resolve an input operation against the innermost entered subgraph.
    ///
    /// At the outermost level it becomes a push_input; deeper down it walks
    /// the outer signal feeding the matching subgraph port and forwards the
    /// value under the inner key.
    fn add_input_output(
        &mut self,
        id: OperationId,
        result_index: ResultIndex,
        prefix: &str,
        sfg_stack: &[SfgFrame],
        deferred: &mut Vec<DeferredDelay>,
    ) -> Result<()> {
        let Some(frame) = sfg_stack.last() else {
            return Err(SimulationError::InputOutsideGraph);
        };
        let input_index = self.find_input_operation_index(frame.sfg, id)?;
        if sfg_stack.len() == 1 {
            self.add_instruction(InstructionKind::PushInput(input_index), result_index, 1)
        } else {
            let OpRef::Operation(sfg_op) = frame.sfg else {
                unreachable!("the root frame is always the bottom of the stack");
            };
            let outer_prefix = &prefix[..frame.prefix_length];
            let outer_stack = &sfg_stack[..sfg_stack.len() - 1];
            self.add_source(sfg_op, input_index, outer_prefix, outer_stack, deferred)?;
            self.add_instruction(InstructionKind::ForwardValue, result_index, 0)
        }
    }

    fn find_input_operation_index(&self, sfg: OpRef, id: OperationId) -> Result<usize> {
        let input_operations = match sfg {
            OpRef::Root => self.graph.input_operations(),
            OpRef::Operation(sfg_id) => {
                let OperationKind::Subgraph { input_operations, .. } =
                    &self.graph.node(sfg_id).kind
                else {
                    unreachable!("only subgraphs are pushed on the traversal stack");
                };
                input_operations.as_slice()
            }
        };
        input_operations
            .iter()
            .position(|&candidate| candidate == id)
            .ok_or(SimulationError::StrayInputOperation)
    }

    /// Drain the deferred delays. Each drained input walk may defer more
    /// delays; those are collected into a fresh batch and drained next
    /// round, until no batch remains.
    fn add_deferred_delays(&mut self, mut deferred: Vec<DeferredDelay>) -> Result<()> {
        while !deferred.is_empty() {
            let batch = std::mem::take(&mut deferred);
            for entry in batch {
                self.add_source(entry.operation, 0, &entry.prefix, &entry.sfg_stack, &mut deferred)?;
                self.add_instruction(
                    InstructionKind::UpdateDelay(entry.delay_index),
                    RESULT_NONE,
                    -1,
                )?;
            }
        }
        Ok(())
    }

    /// Point every unobserved result at the scratch slot one past the last
    /// real key, so the interpreter stores unconditionally.
    fn resolve_ignored_result_indices(&mut self) {
        let scratch = self.code.result_keys.len() as ResultIndex;
        for instruction in &mut self.code.instructions {
            if instruction.result_index == RESULT_NONE {
                instruction.result_index = scratch;
            }
        }
    }
}
