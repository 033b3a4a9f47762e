//! # sigflow - Signal-Flow-Graph Simulation Engine
//!
//! Simulates signal-flow graphs: operations connected by signals, with
//! feedback through single-sample delay elements. A graph is compiled once
//! into a flat program for a small stack machine, then executed iteration by
//! iteration while every labelled node value is recorded as a time series.
//!
//! ## Core Components
//!
//! - **Num**: complex double-precision scalar carried by every signal
//! - **SignalFlowGraph**: the structural description, built once and read-only
//!   afterwards
//! - **compile / Program**: lowering into instructions, delay table, result
//!   keys and a proven stack bound
//! - **Simulation**: the iteration driver with pluggable input providers
//! - **Signal generators**: impulse, step, sinusoid and friends as inputs
//!
//! ## Example
//!
//! ```
//! use sigflow::{Num, SignalFlowGraph, Simulation};
//!
//! // Accumulator: add = in + t, t <<= add.
//! let mut graph = SignalFlowGraph::new();
//! let input = graph.input();
//! let delay = graph.delay(Num::ZERO);
//! let sum = graph.addition(input, delay);
//! graph.connect(delay, 0, sum);
//! graph.output(sum);
//!
//! let mut simulation = Simulation::with_inputs(
//!     &graph,
//!     vec![Some(vec![1.0, 2.0, 3.0, 4.0].into())],
//! )?;
//! simulation.run(true, None, false)?;
//! let results = simulation.results();
//! assert_eq!(
//!     results["0"],
//!     vec![
//!         Num::real(1.0),
//!         Num::real(3.0),
//!         Num::real(6.0),
//!         Num::real(10.0),
//!     ]
//! );
//! # Ok::<(), sigflow::SimulationError>(())
//! ```

// Num - the numeric unit of every signal
mod number;
pub use number::Num;

// Graph description
mod graph;
pub use graph::{CustomFn, OperationId, SignalFlowGraph, Source};

// Simulation subsystem - compiler, program, interpreter, driver
pub mod sim;
pub use sim::{
    compile, InputFunction, InputProvider, Instruction, InstructionKind, Iteration, Program,
    ResultIndex, Simulation, RESULT_NONE,
};

// Signal generators
mod generator;
pub use generator::{
    Constant, Delayed, Gaussian, Impulse, SignalGenerator, Sinusoid, Step, Uniform, ZeroPad,
};

// Error types
mod error;
pub use error::{Result, SimulationError};
