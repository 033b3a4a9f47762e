//! Interpreter - Executes one iteration of a compiled program
//!
//! A LIFO stack of [`Num`] slots, sized exactly to the program's proven
//! requirement, plus a result row with one slot per key and a scratch slot
//! that absorbs unobserved values. Delay state lives outside and persists
//! across iterations: current values are published into the result row
//! before the first instruction, and update_delay latches next values as
//! the last thing a feedback path does.

use log::trace;

use crate::error::{Result, SimulationError};
use crate::number::Num;
use crate::sim::instruction::InstructionKind;
use crate::sim::program::Program;

/// Values produced by one iteration: the output stack and the full result
/// row.
pub(crate) struct IterationState {
    /// The first `output_count` values left on the stack
    pub(crate) outputs: Vec<Num>,
    /// One value per result key, in key order
    pub(crate) results: Vec<Num>,
}

/// Fixed-capacity LIFO over a preallocated buffer. The compiler proves the
/// bound, so push and pop never reallocate.
struct Stack {
    values: Vec<Num>,
    top: usize,
}

impl Stack {
    fn new(capacity: usize) -> Self {
        Self { values: vec![Num::ZERO; capacity], top: 0 }
    }

    #[inline]
    fn push(&mut self, value: Num) {
        debug_assert!(self.top < self.values.len());
        self.values[self.top] = value;
        self.top += 1;
    }

    #[inline]
    fn pop(&mut self) -> Num {
        debug_assert!(self.top > 0);
        self.top -= 1;
        self.values[self.top]
    }

    #[inline]
    fn peek(&self) -> Num {
        self.values[self.top - 1]
    }

    #[inline]
    fn peek_mut(&mut self) -> &mut Num {
        &mut self.values[self.top - 1]
    }

    fn into_outputs(mut self, count: usize) -> Vec<Num> {
        self.values.truncate(count);
        self.values
    }
}

/// Truncate the integer part of a real value to the bits kept by `mask`.
fn truncate_value(value: Num, mask: i64) -> Result<Num> {
    if value.im != 0.0 {
        return Err(SimulationError::ComplexTruncation);
    }
    Ok(Num::real((value.re as i64 & mask) as f64))
}

/// Resolve the two quantization inputs into the effective per-signal flag
/// and the optional global mask. A global override supersedes per-signal
/// quantization entirely; without the per-signal flag both are off.
fn setup_truncation(quantize: bool, bits_override: Option<u8>) -> Result<(bool, Option<i64>)> {
    if !quantize {
        return Ok((false, None));
    }
    match bits_override {
        Some(bits) if bits > 64 => Err(SimulationError::QuantizationTooWide { bits }),
        Some(64) => Ok((false, Some(-1))),
        Some(bits) => Ok((false, Some((1i64 << bits) - 1))),
        None => Ok((true, None)),
    }
}

/// Run all instructions of `code` once against `inputs` and the persistent
/// `delays`, returning the outputs and the recorded result row.
pub(crate) fn run_iteration(
    code: &Program,
    inputs: &[Num],
    delays: &mut [Num],
    bits_override: Option<u8>,
    quantize: bool,
) -> Result<IterationState> {
    debug_assert_eq!(inputs.len(), code.input_count);
    debug_assert_eq!(delays.len(), code.delays.len());
    debug_assert!(code.output_count <= code.required_stack_size);

    let (quantize, override_mask) = setup_truncation(quantize, bits_override)?;

    // One slot per key plus the scratch slot for unobserved values.
    let mut results = vec![Num::ZERO; code.result_keys.len() + 1];
    for (value, delay) in delays.iter().zip(&code.delays) {
        results[delay.result_index as usize] = *value;
    }

    let mut stack = Stack::new(code.required_stack_size);

    for instruction in &code.instructions {
        trace!("evaluating {instruction}");
        // update_delay records the popped value; everything else records
        // the value it leaves on top of the stack.
        let mut latched = None;
        match instruction.kind {
            InstructionKind::PushInput(index) => stack.push(inputs[index]),
            InstructionKind::PushResult(index) => stack.push(results[index]),
            InstructionKind::PushDelay(index) => stack.push(delays[index]),
            InstructionKind::PushConstant(value) => stack.push(value),
            InstructionKind::Quantize { mask } => {
                if quantize {
                    let value = truncate_value(stack.pop(), mask)?;
                    stack.push(value);
                }
            }
            InstructionKind::Addition => {
                let rhs = stack.pop();
                let lhs = stack.pop();
                stack.push(lhs + rhs);
            }
            InstructionKind::Subtraction => {
                let rhs = stack.pop();
                let lhs = stack.pop();
                stack.push(lhs - rhs);
            }
            InstructionKind::Multiplication => {
                let rhs = stack.pop();
                let lhs = stack.pop();
                stack.push(lhs * rhs);
            }
            InstructionKind::Division => {
                let rhs = stack.pop();
                let lhs = stack.pop();
                stack.push(lhs / rhs);
            }
            InstructionKind::Min => {
                let rhs = stack.pop();
                let lhs = stack.pop();
                if !lhs.is_real() || !rhs.is_real() {
                    return Err(SimulationError::ComplexComparison { operation: "Min" });
                }
                stack.push(Num::real(lhs.re.min(rhs.re)));
            }
            InstructionKind::Max => {
                let rhs = stack.pop();
                let lhs = stack.pop();
                if !lhs.is_real() || !rhs.is_real() {
                    return Err(SimulationError::ComplexComparison { operation: "Max" });
                }
                stack.push(Num::real(lhs.re.max(rhs.re)));
            }
            InstructionKind::SquareRoot => {
                let value = stack.pop();
                stack.push(value.sqrt());
            }
            InstructionKind::Conjugate => {
                let value = stack.pop();
                stack.push(value.conj());
            }
            InstructionKind::Absolute => {
                let value = stack.pop();
                stack.push(value.abs());
            }
            InstructionKind::ConstantMultiplication(value) => {
                let operand = stack.pop();
                stack.push(operand * value);
            }
            InstructionKind::UpdateDelay(index) => {
                let value = stack.pop();
                delays[index] = value;
                latched = Some(value);
            }
            InstructionKind::Custom(index) => {
                let source = &code.custom_sources[index];
                let operation = &code.custom_operations[source.custom_operation_index];
                // Arguments arrive last-pushed-first.
                let mut arguments = Vec::with_capacity(operation.input_count);
                for _ in 0..operation.input_count {
                    arguments.push(stack.pop());
                }
                stack.push((operation.evaluate)(source.output_index, &arguments, quantize));
            }
            InstructionKind::ForwardValue => {}
        }
        // A global bit override truncates whatever the instruction left on
        // top. update_delay leaves nothing new; its operand was truncated
        // when produced.
        if let Some(mask) = override_mask {
            if latched.is_none() {
                let top = stack.peek_mut();
                *top = truncate_value(*top, mask)?;
            }
        }
        results[instruction.result_index as usize] = latched.unwrap_or_else(|| stack.peek());
    }

    debug_assert_eq!(stack.top, code.output_count);

    // Drop the scratch slot; it is not a real result.
    results.pop();
    Ok(IterationState { outputs: stack.into_outputs(code.output_count), results })
}
