//! Simulation subsystem - Compiler, program, interpreter and driver
//!
//! A [`SignalFlowGraph`](crate::SignalFlowGraph) is lowered once by
//! [`compile`] into a flat [`Program`] for a stack machine, then executed
//! iteration by iteration, either directly or through [`Simulation`].
//!
//! ## Pipeline
//!
//! ```text
//! SignalFlowGraph --compile--> Program --per iteration--> outputs
//!                                 |            ^
//!                            result keys   delay state
//! ```
//!
//! Delays are the only state carried between iterations: each one publishes
//! its stored value at the start of an iteration and latches its next value
//! at the end, which is what makes feedback loops computable by a flat
//! instruction sequence.

mod compiler;
mod instruction;
mod interpreter;
mod program;
mod simulation;

pub use compiler::compile;
pub use instruction::{Instruction, InstructionKind, ResultIndex, RESULT_NONE};
pub use program::{CustomOperation, CustomSource, DelayInfo, Program};
pub use simulation::{InputFunction, InputProvider, Iteration, Simulation};
