//! Error types for sigflow

use thiserror::Error;

/// Sigflow error type
#[derive(Debug, Error)]
pub enum SimulationError {
    /// A combinational cycle that does not pass through a delay
    #[error("Direct feedback loop detected in simulation graph")]
    DirectFeedbackLoop,

    /// An input operation that its containing subgraph does not declare
    #[error("Stray input operation in simulation graph")]
    StrayInputOperation,

    /// An input operation reached with no enclosing graph
    #[error("Encountered input operation outside any graph in simulation")]
    InputOutsideGraph,

    /// More observable node outputs than result indices can address
    #[error("Simulation graph requires too many outputs to be stored (limit: {limit})")]
    TooManyResults { limit: usize },

    /// Quantization width beyond what a 64-bit mask can express
    #[error("Cannot quantize to more than 64 bits (got {bits})")]
    QuantizationTooWide { bits: u8 },

    /// Stack underflow while lowering, i.e. mismatched operation arities
    #[error("Detected input/output count mismatch in simulation graph")]
    ArityMismatch,

    /// A walked input port with no signal attached
    #[error("Input {input} of operation {operation} is not connected")]
    UnconnectedInput { operation: String, input: usize },

    /// Truncation applied to a value with a non-zero imaginary part
    #[error("Complex value cannot be truncated")]
    ComplexTruncation,

    /// min/max applied to a value with a non-zero imaginary part
    #[error("{operation} does not support complex numbers")]
    ComplexComparison { operation: &'static str },

    /// Input provider index outside the graph's input arity
    #[error("Input index out of range (expected 0-{max}, got {index})")]
    InputIndexOutOfRange { index: usize, max: usize },

    /// Sequence inputs of differing lengths
    #[error("Inconsistent input length for simulation (was {expected}, got {got})")]
    InconsistentInputLength { expected: u32, got: u32 },

    /// Provider vector length differs from the graph's input arity
    #[error("Wrong number of inputs supplied to simulation (expected {expected}, got {got})")]
    WrongNumberOfInputs { expected: usize, got: usize },

    /// Iteration ran past the end of a finite input sequence
    #[error("Input sequence of length {length} exhausted")]
    InputExhausted { length: u32 },

    /// Iteration counter overflow
    #[error("Simulation iteration count overflow")]
    IterationOverflow,

    /// `run()` on a simulation with no finite input length
    #[error("Tried to run unlimited simulation")]
    UnlimitedRun,
}

pub type Result<T> = std::result::Result<T, SimulationError>;
