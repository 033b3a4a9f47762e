//! Program - Immutable compiled form of a signal-flow graph
//!
//! The flat container the interpreter executes once per iteration:
//! instruction sequence, delay table, custom-operation directory, result-key
//! table, I/O arities and the proven stack requirement. Created by
//! [`compile`](crate::sim::compile) and never mutated afterwards.

use std::fmt;

use crate::graph::CustomFn;
use crate::number::Num;
use crate::sim::instruction::{Instruction, ResultIndex};

/// One delay element of a compiled program.
#[derive(Clone, Debug, PartialEq)]
pub struct DelayInfo {
    /// Value published on the first iteration
    pub initial_value: Num,
    /// Result slot holding the delay's current value each iteration
    pub result_index: ResultIndex,
}

/// A registered external callable with its declared arities.
#[derive(Clone)]
pub struct CustomOperation {
    pub(crate) evaluate: CustomFn,
    pub(crate) input_count: usize,
    pub(crate) output_count: usize,
}

/// One referenced output of a custom operation.
///
/// The indirection lets several instructions share a single multi-output
/// callable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CustomSource {
    pub(crate) custom_operation_index: usize,
    pub(crate) output_index: usize,
}

/// Compiled simulation program.
#[derive(Clone, Default)]
pub struct Program {
    /// Instructions for one full iteration
    pub(crate) instructions: Vec<Instruction>,
    /// Delay elements, indexed by the payload of push_delay/update_delay
    pub(crate) delays: Vec<DelayInfo>,
    /// Custom operations used by the program
    pub(crate) custom_operations: Vec<CustomOperation>,
    /// Signal sources drawing from custom operations
    pub(crate) custom_sources: Vec<CustomSource>,
    /// Key per observable result; the index is the result index
    pub(crate) result_keys: Vec<String>,
    /// Number of input values consumed per iteration
    pub(crate) input_count: usize,
    /// Number of values left on the stack after one iteration
    pub(crate) output_count: usize,
    /// Proven upper bound on stack depth during one iteration
    pub(crate) required_stack_size: usize,
}

impl Program {
    /// Instruction sequence executed per iteration
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Delay table
    pub fn delays(&self) -> &[DelayInfo] {
        &self.delays
    }

    /// Ordered result keys; position equals result index
    pub fn result_keys(&self) -> &[String] {
        &self.result_keys
    }

    pub fn input_count(&self) -> usize {
        self.input_count
    }

    pub fn output_count(&self) -> usize {
        self.output_count
    }

    /// Exact stack capacity one iteration needs
    pub fn required_stack_size(&self) -> usize {
        self.required_stack_size
    }

    fn key_for(&self, result_index: ResultIndex) -> &str {
        self.result_keys
            .get(result_index as usize)
            .map(String::as_str)
            .unwrap_or("-")
    }
}

impl fmt::Display for Program {
    /// Disassembly: one instruction per line with the key it records to.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "program: {} inputs, {} outputs, {} results, stack size {}",
            self.input_count,
            self.output_count,
            self.result_keys.len(),
            self.required_stack_size
        )?;
        for (position, instruction) in self.instructions.iter().enumerate() {
            writeln!(
                f,
                "{position:4}: {:32} [{}]",
                instruction.kind.to_string(),
                self.key_for(instruction.result_index)
            )?;
        }
        for (index, delay) in self.delays.iter().enumerate() {
            writeln!(
                f,
                "delay {index}: initial {} [{}]",
                delay.initial_value,
                self.key_for(delay.result_index)
            )?;
        }
        for (index, operation) in self.custom_operations.iter().enumerate() {
            writeln!(
                f,
                "custom {index}: {} inputs, {} outputs",
                operation.input_count, operation.output_count
            )?;
        }
        Ok(())
    }
}

impl fmt::Debug for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Program")
            .field("instructions", &self.instructions)
            .field("delays", &self.delays)
            .field("custom_operations", &self.custom_operations.len())
            .field("custom_sources", &self.custom_sources)
            .field("result_keys", &self.result_keys)
            .field("input_count", &self.input_count)
            .field("output_count", &self.output_count)
            .field("required_stack_size", &self.required_stack_size)
            .finish()
    }
}
