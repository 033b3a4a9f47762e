//! Simulation - Iteration driver over a compiled program
//!
//! Owns the compiled program, the persistent delay state and one input
//! provider per graph input. Each iteration evaluates the providers at the
//! current iteration number, runs the interpreter, optionally appends the
//! result row, and advances the counter. Sequence providers freeze the
//! simulation's input length and make `run()` possible.

use std::collections::BTreeMap;

use crate::error::{Result, SimulationError};
use crate::graph::SignalFlowGraph;
use crate::number::Num;
use crate::sim::compiler::compile;
use crate::sim::interpreter::run_iteration;
use crate::sim::program::Program;

/// Iteration counter type
pub type Iteration = u32;

/// Resolved input: a value per iteration number
pub type InputFunction = Box<dyn FnMut(Iteration) -> Num>;

/// One way of feeding a graph input.
///
/// Constants and sequences are rewritten to functions at registration, so
/// the iteration loop performs one call per input regardless of shape.
pub enum InputProvider {
    /// The same value every iteration
    Constant(Num),
    /// A finite sequence; fixes the simulation's input length
    Sequence(Vec<Num>),
    /// An arbitrary function of the iteration number
    Function(InputFunction),
}

impl InputProvider {
    /// Provider backed by a closure
    pub fn function(function: impl FnMut(Iteration) -> Num + 'static) -> Self {
        Self::Function(Box::new(function))
    }

    /// Provider backed by a signal generator
    pub fn generator(mut generator: impl crate::generator::SignalGenerator + 'static) -> Self {
        Self::Function(Box::new(move |iteration| generator.evaluate(iteration)))
    }
}

impl From<Num> for InputProvider {
    fn from(value: Num) -> Self {
        Self::Constant(value)
    }
}

impl From<f64> for InputProvider {
    fn from(value: f64) -> Self {
        Self::Constant(Num::real(value))
    }
}

impl From<Vec<Num>> for InputProvider {
    fn from(values: Vec<Num>) -> Self {
        Self::Sequence(values)
    }
}

impl From<Vec<f64>> for InputProvider {
    fn from(values: Vec<f64>) -> Self {
        Self::Sequence(values.into_iter().map(Num::real).collect())
    }
}

/// Simulation of a signal-flow graph.
///
/// Construction compiles the graph once; the compiled program is never
/// mutated afterwards. Delay state persists across iterations and is the
/// only channel between them.
pub struct Simulation {
    code: Program,
    delays: Vec<Num>,
    input_functions: Vec<InputFunction>,
    input_length: Option<Iteration>,
    iteration: Iteration,
    /// One result row per saved iteration
    results: Vec<Vec<Num>>,
}

impl Simulation {
    /// Compile `graph` and set every input to a zero source.
    pub fn new(graph: &SignalFlowGraph) -> Result<Self> {
        let code = compile(graph)?;
        let delays = code.delays().iter().map(|delay| delay.initial_value).collect();
        let input_functions = (0..code.input_count())
            .map(|_| Box::new(|_| Num::ZERO) as InputFunction)
            .collect();
        Ok(Self {
            code,
            delays,
            input_functions,
            input_length: None,
            iteration: 0,
            results: Vec::new(),
        })
    }

    /// Compile `graph` and register the given providers; `None` entries
    /// keep the zero source.
    pub fn with_inputs(
        graph: &SignalFlowGraph,
        input_providers: Vec<Option<InputProvider>>,
    ) -> Result<Self> {
        let mut simulation = Self::new(graph)?;
        simulation.set_inputs(input_providers)?;
        Ok(simulation)
    }

    /// The compiled program this simulation executes
    pub fn program(&self) -> &Program {
        &self.code
    }

    /// Register the provider for one input.
    pub fn set_input(&mut self, index: usize, input_provider: InputProvider) -> Result<()> {
        if index >= self.input_functions.len() {
            return Err(SimulationError::InputIndexOutOfRange {
                index,
                max: self.input_functions.len().saturating_sub(1),
            });
        }
        self.input_functions[index] = match input_provider {
            InputProvider::Constant(value) => Box::new(move |_| value),
            InputProvider::Sequence(values) => {
                let length = values.len() as Iteration;
                match self.input_length {
                    None => self.input_length = Some(length),
                    Some(expected) if expected != length => {
                        return Err(SimulationError::InconsistentInputLength {
                            expected,
                            got: length,
                        });
                    }
                    Some(_) => {}
                }
                Box::new(move |iteration| values[iteration as usize])
            }
            InputProvider::Function(function) => function,
        };
        Ok(())
    }

    /// Register providers for all inputs at once; the vector length must
    /// equal the graph's input count.
    pub fn set_inputs(&mut self, input_providers: Vec<Option<InputProvider>>) -> Result<()> {
        if input_providers.len() != self.input_functions.len() {
            return Err(SimulationError::WrongNumberOfInputs {
                expected: self.input_functions.len(),
                got: input_providers.len(),
            });
        }
        for (index, input_provider) in input_providers.into_iter().enumerate() {
            if let Some(input_provider) = input_provider {
                self.set_input(index, input_provider)?;
            }
        }
        Ok(())
    }

    /// Run one iteration and return its outputs.
    pub fn step(
        &mut self,
        save_results: bool,
        bits_override: Option<u8>,
        quantize: bool,
    ) -> Result<Vec<Num>> {
        self.run_for(1, save_results, bits_override, quantize)
    }

    /// Run until the iteration counter reaches `iteration` and return the
    /// outputs of the last executed iteration. A target at or below the
    /// current counter is a no-op.
    pub fn run_until(
        &mut self,
        iteration: Iteration,
        save_results: bool,
        bits_override: Option<u8>,
        quantize: bool,
    ) -> Result<Vec<Num>> {
        let mut outputs = Vec::new();
        while self.iteration < iteration {
            if let Some(length) = self.input_length {
                if self.iteration >= length {
                    return Err(SimulationError::InputExhausted { length });
                }
            }
            let now = self.iteration;
            let inputs: Vec<Num> = self
                .input_functions
                .iter_mut()
                .map(|function| function(now))
                .collect();
            let state =
                run_iteration(&self.code, &inputs, &mut self.delays, bits_override, quantize)?;
            outputs = state.outputs;
            if save_results {
                self.results.push(state.results);
            }
            self.iteration += 1;
        }
        Ok(outputs)
    }

    /// Run `iterations` more iterations.
    pub fn run_for(
        &mut self,
        iterations: Iteration,
        save_results: bool,
        bits_override: Option<u8>,
        quantize: bool,
    ) -> Result<Vec<Num>> {
        if iterations > Iteration::MAX - self.iteration {
            return Err(SimulationError::IterationOverflow);
        }
        self.run_until(self.iteration + iterations, save_results, bits_override, quantize)
    }

    /// Run to the end of the finite input sequences.
    pub fn run(
        &mut self,
        save_results: bool,
        bits_override: Option<u8>,
        quantize: bool,
    ) -> Result<Vec<Num>> {
        match self.input_length {
            Some(length) => self.run_until(length, save_results, bits_override, quantize),
            None => Err(SimulationError::UnlimitedRun),
        }
    }

    /// Number of iterations run so far
    pub fn iteration(&self) -> Iteration {
        self.iteration
    }

    /// Saved results as one time series per result key.
    ///
    /// Series cover every iteration run with saving enabled, in order.
    pub fn results(&self) -> BTreeMap<String, Vec<Num>> {
        let mut map = BTreeMap::new();
        if self.results.is_empty() {
            return map;
        }
        for (index, key) in self.code.result_keys().iter().enumerate() {
            let series = self.results.iter().map(|row| row[index]).collect();
            map.insert(key.clone(), series);
        }
        map
    }

    /// Discard all saved results.
    pub fn clear_results(&mut self) {
        self.results.clear();
    }

    /// Reset every delay to its initial value. The iteration counter and
    /// saved results are untouched.
    pub fn clear_state(&mut self) {
        for (value, delay) in self.delays.iter_mut().zip(self.code.delays()) {
            *value = delay.initial_value;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Source;

    /// out0 = in0 + in1, out1 = out0 + in1
    fn two_inputs_two_outputs() -> SignalFlowGraph {
        let mut graph = SignalFlowGraph::new();
        let in0 = graph.input();
        let in1 = graph.input();
        let add0 = graph.addition(in0, in1);
        let add1 = graph.addition(add0, in1);
        graph.output(add0);
        graph.output(add1);
        graph
    }

    /// add = in + 0.5 * t, t <<= add, out = t
    fn first_order_filter() -> SignalFlowGraph {
        let mut graph = SignalFlowGraph::new();
        let in0 = graph.input();
        let t0 = graph.delay(Num::ZERO);
        let cmul = graph.constant_multiplication(Num::real(0.5), t0);
        let sum = graph.addition(in0, cmul);
        graph.connect(t0, 0, sum);
        graph.output(t0);
        graph
    }

    fn reals(values: &[f64]) -> Vec<Num> {
        values.iter().copied().map(Num::real).collect()
    }

    #[test]
    fn test_additions_with_function_inputs() {
        let graph = two_inputs_two_outputs();
        let mut simulation = Simulation::with_inputs(
            &graph,
            vec![
                Some(InputProvider::function(|n| Num::real(n as f64 + 3.0))),
                Some(InputProvider::function(|n| Num::real(1.0 + 2.0 * n as f64))),
            ],
        )
        .unwrap();

        let outputs = simulation.run_for(101, true, None, false).unwrap();
        assert_eq!(outputs, reals(&[304.0, 505.0]));
        assert_eq!(simulation.iteration(), 101);

        let results = simulation.results();
        assert_eq!(results["0"][100], Num::real(304.0));
        assert_eq!(results["1"][100], Num::real(505.0));
        assert_eq!(&results["in0"][..3], &reals(&[3.0, 4.0, 5.0])[..]);
        assert_eq!(&results["in1"][..3], &reals(&[1.0, 3.0, 5.0])[..]);
        assert_eq!(&results["add0"][..3], &reals(&[4.0, 7.0, 10.0])[..]);
        assert_eq!(&results["add1"][..3], &reals(&[5.0, 10.0, 15.0])[..]);
    }

    #[test]
    fn test_additions_with_sequence_inputs() {
        let graph = two_inputs_two_outputs();
        let mut simulation = Simulation::with_inputs(
            &graph,
            vec![
                Some(vec![5.0, 9.0, 25.0, -5.0, 7.0].into()),
                Some(vec![7.0, 3.0, 3.0, 54.0, 2.0].into()),
            ],
        )
        .unwrap();

        let outputs = simulation.run_for(5, true, None, false).unwrap();
        assert_eq!(outputs, reals(&[9.0, 11.0]));

        let results = simulation.results();
        assert_eq!(results["add0"], reals(&[12.0, 12.0, 28.0, 49.0, 9.0]));
        assert_eq!(results["add1"], reals(&[19.0, 15.0, 31.0, 103.0, 11.0]));

        // The sequences are spent; another step must fail without advancing.
        assert!(matches!(
            simulation.step(true, None, false),
            Err(SimulationError::InputExhausted { length: 5 })
        ));
        assert_eq!(simulation.iteration(), 5);
    }

    #[test]
    fn test_run_requires_finite_input() {
        let graph = two_inputs_two_outputs();
        let mut simulation = Simulation::with_inputs(
            &graph,
            vec![Some(2.0.into()), Some(3.0.into())],
        )
        .unwrap();
        assert!(matches!(
            simulation.run(true, None, false),
            Err(SimulationError::UnlimitedRun)
        ));
    }

    #[test]
    fn test_run_consumes_whole_sequence() {
        let graph = two_inputs_two_outputs();
        let mut simulation = Simulation::with_inputs(
            &graph,
            vec![
                Some(vec![5.0, 9.0, 25.0].into()),
                Some(vec![7.0, 3.0, 3.0].into()),
            ],
        )
        .unwrap();
        simulation.run(true, None, false).unwrap();
        assert_eq!(simulation.iteration(), 3);
        assert_eq!(simulation.results()["0"].len(), 3);
    }

    #[test]
    fn test_inconsistent_sequence_lengths() {
        let graph = two_inputs_two_outputs();
        let result = Simulation::with_inputs(
            &graph,
            vec![
                Some(vec![1.0, 2.0, 3.0].into()),
                Some(vec![1.0, 2.0].into()),
            ],
        );
        assert!(matches!(
            result,
            Err(SimulationError::InconsistentInputLength { expected: 3, got: 2 })
        ));
    }

    #[test]
    fn test_wrong_number_of_providers() {
        let graph = two_inputs_two_outputs();
        assert!(matches!(
            Simulation::with_inputs(&graph, vec![Some(1.0.into())]),
            Err(SimulationError::WrongNumberOfInputs { expected: 2, got: 1 })
        ));
    }

    #[test]
    fn test_input_index_out_of_range() {
        let graph = two_inputs_two_outputs();
        let mut simulation = Simulation::new(&graph).unwrap();
        assert!(matches!(
            simulation.set_input(2, 1.0.into()),
            Err(SimulationError::InputIndexOutOfRange { index: 2, max: 1 })
        ));
    }

    #[test]
    fn test_iteration_overflow() {
        let graph = two_inputs_two_outputs();
        let mut simulation = Simulation::new(&graph).unwrap();
        simulation.step(false, None, false).unwrap();
        assert!(matches!(
            simulation.run_for(Iteration::MAX, false, None, false),
            Err(SimulationError::IterationOverflow)
        ));
    }

    #[test]
    fn test_run_until_past_target_is_noop() {
        let graph = two_inputs_two_outputs();
        let mut simulation = Simulation::new(&graph).unwrap();
        simulation.run_for(5, false, None, false).unwrap();
        let outputs = simulation.run_until(3, false, None, false).unwrap();
        assert!(outputs.is_empty());
        assert_eq!(simulation.iteration(), 5);
    }

    #[test]
    fn test_constant_addition() {
        // out = in + 3.
        let mut graph = SignalFlowGraph::new();
        let in0 = graph.input();
        let c0 = graph.constant(Num::real(3.0));
        let sum = graph.addition(in0, c0);
        graph.output(sum);

        let mut simulation = Simulation::with_inputs(
            &graph,
            vec![Some(vec![1.0, 2.0, 5.0].into())],
        )
        .unwrap();
        simulation.run(true, None, false).unwrap();
        assert_eq!(simulation.results()["0"], reals(&[4.0, 5.0, 8.0]));
    }

    #[test]
    fn test_impulse_through_delay() {
        let mut graph = SignalFlowGraph::new();
        let in0 = graph.input();
        let t0 = graph.delay(Num::ZERO);
        graph.connect(t0, 0, in0);
        graph.output(t0);

        let mut simulation = Simulation::with_inputs(
            &graph,
            vec![Some(InputProvider::generator(crate::generator::Impulse::new()))],
        )
        .unwrap();
        simulation.run_for(3, true, None, false).unwrap();
        assert_eq!(simulation.results()["0"], reals(&[0.0, 1.0, 0.0]));
    }

    #[test]
    fn test_delay_pipeline() {
        // out = in delayed by one sample.
        let mut graph = SignalFlowGraph::new();
        let in0 = graph.input();
        let t0 = graph.delay(Num::ZERO);
        graph.connect(t0, 0, in0);
        graph.output(t0);

        let mut simulation = Simulation::new(&graph).unwrap();
        simulation
            .set_input(0, vec![5.0, -2.0, 25.0, -6.0, 7.0, 0.0].into())
            .unwrap();
        simulation.run_for(6, true, None, false).unwrap();
        assert_eq!(
            simulation.results()["0"],
            reals(&[0.0, 5.0, -2.0, 25.0, -6.0, 7.0])
        );
    }

    #[test]
    fn test_accumulator_with_initial_delay_value() {
        // out = in + t(initial 7), t <<= in.
        let mut graph = SignalFlowGraph::new();
        let in0 = graph.input();
        let t0 = graph.delay(Num::real(7.0));
        graph.connect(t0, 0, in0);
        let sum = graph.addition(in0, t0);
        graph.output(sum);

        let mut simulation = Simulation::with_inputs(
            &graph,
            vec![Some(vec![1.0, 1.0, 1.0, 1.0].into())],
        )
        .unwrap();
        let mut trajectory = Vec::new();
        for _ in 0..4 {
            trajectory.push(simulation.step(false, None, false).unwrap()[0]);
        }
        assert_eq!(trajectory, reals(&[8.0, 2.0, 2.0, 2.0]));
    }

    #[test]
    fn test_simple_accumulator() {
        // add = in + t, t <<= add, out = add.
        let mut graph = SignalFlowGraph::new();
        let in0 = graph.input();
        let t0 = graph.delay(Num::ZERO);
        let sum = graph.addition(in0, t0);
        graph.connect(t0, 0, sum);
        graph.output(sum);

        let sequence: Vec<f64> = (0..10).map(f64::from).collect();
        let mut simulation =
            Simulation::with_inputs(&graph, vec![Some(sequence.into())]).unwrap();
        simulation.run(true, None, false).unwrap();
        assert_eq!(
            simulation.results()["0"],
            reals(&[0.0, 1.0, 3.0, 6.0, 10.0, 15.0, 21.0, 28.0, 36.0, 45.0])
        );
    }

    #[test]
    fn test_first_order_filter() {
        let graph = first_order_filter();
        let mut simulation = Simulation::with_inputs(
            &graph,
            vec![Some(vec![1.0, 2.0, 3.0, 4.0, 5.0].into())],
        )
        .unwrap();
        simulation.run_for(5, true, None, false).unwrap();
        assert_eq!(
            simulation.results()["0"],
            reals(&[0.0, 1.0, 2.5, 4.25, 6.125])
        );
    }

    #[test]
    fn test_constant_multiplication_chain() {
        // out = in * (2 * in), scenario: [2, 8, 18] for input [1, 2, 3].
        let mut graph = SignalFlowGraph::new();
        let in0 = graph.input();
        let cmul = graph.constant_multiplication(Num::real(2.0), in0);
        let product = graph.multiplication(in0, cmul);
        graph.output(product);

        let mut simulation = Simulation::with_inputs(
            &graph,
            vec![Some(vec![1.0, 2.0, 3.0].into())],
        )
        .unwrap();
        simulation.run(true, None, false).unwrap();
        assert_eq!(simulation.results()["0"], reals(&[2.0, 8.0, 18.0]));
    }

    #[test]
    fn test_butterfly_outputs() {
        let mut graph = SignalFlowGraph::new();
        let in0 = graph.input();
        let in1 = graph.input();
        let bfly = graph.butterfly(in0, in1);
        graph.output(Source::new(bfly, 0));
        graph.output(Source::new(bfly, 1));

        let mut simulation =
            Simulation::with_inputs(&graph, vec![Some(3.0.into()), Some(1.0.into())])
                .unwrap();
        let outputs = simulation.step(true, None, false).unwrap();
        assert_eq!(outputs, reals(&[4.0, 2.0]));
        let results = simulation.results();
        assert_eq!(results["bfly0.0"], reals(&[4.0]));
        assert_eq!(results["bfly0.1"], reals(&[2.0]));
    }

    #[test]
    fn test_complex_conjugate() {
        let mut graph = SignalFlowGraph::new();
        let in0 = graph.input();
        let conj = graph.conjugate(in0);
        graph.output(conj);

        let mut simulation = Simulation::with_inputs(
            &graph,
            vec![Some(Num::new(1.0, 2.0).into())],
        )
        .unwrap();
        let outputs = simulation.step(false, None, false).unwrap();
        assert_eq!(outputs, vec![Num::new(1.0, -2.0)]);
    }

    #[test]
    fn test_per_signal_quantization() {
        // A 4-bit signal feeding the sink: 19 & 15 = 3.
        let mut graph = SignalFlowGraph::new();
        let in0 = graph.input();
        graph.output(Source::new(in0, 0).quantized(4));

        let mut simulation =
            Simulation::with_inputs(&graph, vec![Some(19.0.into())]).unwrap();
        let outputs = simulation.step(false, None, true).unwrap();
        assert_eq!(outputs, vec![Num::real(3.0)]);

        // With quantization disabled the same program passes values through.
        let outputs = simulation.step(false, None, false).unwrap();
        assert_eq!(outputs, vec![Num::real(19.0)]);
    }

    #[test]
    fn test_override_beats_per_signal_quantization() {
        let mut graph = SignalFlowGraph::new();
        let in0 = graph.input();
        graph.output(Source::new(in0, 0).quantized(4));

        let mut simulation =
            Simulation::with_inputs(&graph, vec![Some(19.0.into())]).unwrap();
        // 19 & 0x3f = 19: the 4-bit signal width is ignored.
        let outputs = simulation.step(false, Some(6), true).unwrap();
        assert_eq!(outputs, vec![Num::real(19.0)]);
    }

    #[test]
    fn test_override_rejects_complex_values() {
        let mut graph = SignalFlowGraph::new();
        let in0 = graph.input();
        graph.output(in0);

        let mut simulation = Simulation::with_inputs(
            &graph,
            vec![Some(Num::new(1.0, 2.0).into())],
        )
        .unwrap();
        assert!(matches!(
            simulation.step(false, Some(8), true),
            Err(SimulationError::ComplexTruncation)
        ));
        // The failed iteration must not advance the counter.
        assert_eq!(simulation.iteration(), 0);
    }

    #[test]
    fn test_min_max_reject_complex_values() {
        let mut graph = SignalFlowGraph::new();
        let in0 = graph.input();
        let in1 = graph.input();
        let minimum = graph.min(in0, in1);
        graph.output(minimum);

        let mut simulation = Simulation::with_inputs(
            &graph,
            vec![Some(Num::new(0.0, 1.0).into()), Some(2.0.into())],
        )
        .unwrap();
        assert!(matches!(
            simulation.step(false, None, false),
            Err(SimulationError::ComplexComparison { operation: "Min" })
        ));
    }

    #[test]
    fn test_min_max_of_real_values() {
        let mut graph = SignalFlowGraph::new();
        let in0 = graph.input();
        let in1 = graph.input();
        let minimum = graph.min(in0, in1);
        let maximum = graph.max(in0, in1);
        graph.output(minimum);
        graph.output(maximum);

        let mut simulation =
            Simulation::with_inputs(&graph, vec![Some(3.0.into()), Some((-2.0).into())])
                .unwrap();
        let outputs = simulation.step(false, None, false).unwrap();
        assert_eq!(outputs, reals(&[-2.0, 3.0]));
    }

    #[test]
    fn test_nested_subgraphs_flatten_and_memoize() {
        // mac(a, b, c) = a + b * c, instantiated three times with shared
        // intermediate results.
        let mut mac = SignalFlowGraph::new();
        let a = mac.input();
        let b = mac.input();
        let c = mac.input();
        let product = mac.multiplication(b, c);
        let sum = mac.addition(a, product);
        mac.output(sum);

        let mut graph = SignalFlowGraph::new();
        let in0 = graph.input();
        let in1 = graph.input();
        let mac0 = graph.subgraph(&mac, &[in0.into(), in0.into(), in1.into()]);
        let mac1 = graph.subgraph(&mac, &[in0.into(), in1.into(), mac0.into()]);
        let mac2 = graph.subgraph(&mac, &[in0.into(), mac0.into(), mac1.into()]);
        graph.output(mac2);

        let mut simulation = Simulation::with_inputs(
            &graph,
            vec![
                Some(vec![5.0, 9.0].into()),
                Some(vec![7.0, 3.0].into()),
            ],
        )
        .unwrap();
        assert_eq!(
            simulation.step(true, None, false).unwrap(),
            reals(&[11405.0])
        );
        assert_eq!(simulation.step(true, None, false).unwrap(), reals(&[4221.0]));

        let results = simulation.results();
        // Inner nodes are observable under their prefixed keys.
        assert_eq!(results["sfg0"], reals(&[40.0, 36.0]));
        assert_eq!(results["sfg1"], reals(&[285.0, 117.0]));
        assert_eq!(results["sfg0.mul0"], reals(&[35.0, 27.0]));
    }

    #[test]
    fn test_custom_operation_outputs() {
        // Two outputs per evaluation: a * 2 and 2^a.
        let mut graph = SignalFlowGraph::new();
        let in0 = graph.input();
        let custom = graph.custom("dblpow", 1, 2, &[in0.into()], |output_index, inputs, _| {
            let a = inputs[0];
            match output_index {
                0 => a * Num::real(2.0),
                _ => Num::real(2f64.powf(a.re)),
            }
        });
        graph.output(Source::new(custom, 0));
        graph.output(Source::new(custom, 1));

        let mut simulation = Simulation::with_inputs(
            &graph,
            vec![Some(InputProvider::function(|n| Num::real(n as f64 + 1.0)))],
        )
        .unwrap();
        simulation.run_for(5, true, None, false).unwrap();
        let results = simulation.results();
        assert_eq!(results["0"], reals(&[2.0, 4.0, 6.0, 8.0, 10.0]));
        assert_eq!(results["1"], reals(&[2.0, 4.0, 8.0, 16.0, 32.0]));
    }

    #[test]
    fn test_custom_arguments_arrive_last_pushed_first() {
        let mut graph = SignalFlowGraph::new();
        let in0 = graph.input();
        let in1 = graph.input();
        let custom = graph.custom(
            "pair",
            2,
            1,
            &[in0.into(), in1.into()],
            |_, inputs, _| inputs[0] * Num::real(10.0) + inputs[1],
        );
        graph.output(custom);

        let mut simulation =
            Simulation::with_inputs(&graph, vec![Some(1.0.into()), Some(2.0.into())])
                .unwrap();
        // The second input sits on top of the stack, so it pops first.
        let outputs = simulation.step(false, None, false).unwrap();
        assert_eq!(outputs, reals(&[21.0]));
    }

    #[test]
    fn test_save_results_bookkeeping() {
        let graph = two_inputs_two_outputs();
        let mut simulation =
            Simulation::with_inputs(&graph, vec![Some(2.0.into()), Some(3.0.into())])
                .unwrap();
        assert!(simulation.results().is_empty());
        simulation.run_for(10, false, None, false).unwrap();
        assert!(simulation.results().is_empty());
        simulation.run_for(10, true, None, false).unwrap();
        assert_eq!(simulation.results()["0"].len(), 10);
        simulation.run_for(10, false, None, false).unwrap();
        assert_eq!(simulation.results()["0"].len(), 10);
        simulation.run_for(13, true, None, false).unwrap();
        assert_eq!(simulation.results()["0"].len(), 23);
        simulation.clear_results();
        assert!(simulation.results().is_empty());
    }

    #[test]
    fn test_clear_state_restores_initial_trajectory() {
        let graph = first_order_filter();
        let mut simulation =
            Simulation::with_inputs(&graph, vec![Some(1.0.into())]).unwrap();
        simulation.run_for(5, true, None, false).unwrap();
        let first: Vec<Num> = simulation.results()["0"].clone();

        simulation.clear_state();
        simulation.clear_results();
        simulation.run_for(5, true, None, false).unwrap();
        assert_eq!(simulation.results()["0"], first);
    }

    #[test]
    fn test_determinism_across_simulations() {
        let graph = first_order_filter();
        let run = || {
            let mut simulation =
                Simulation::with_inputs(&graph, vec![Some(1.0.into())]).unwrap();
            simulation.run_for(32, true, None, false).unwrap();
            simulation.results()["0"]
                .iter()
                .map(|value| (value.re.to_bits(), value.im.to_bits()))
                .collect::<Vec<_>>()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_expression_tree_matches_direct_evaluation() {
        // sqrt(|in0|) / (in0 - c) for a delay-free graph equals the direct
        // expression.
        let mut graph = SignalFlowGraph::new();
        let in0 = graph.input();
        let c = graph.constant(Num::real(2.0));
        let magnitude = graph.absolute(in0);
        let root = graph.square_root(magnitude);
        let difference = graph.subtraction(in0, c);
        let quotient = graph.division(root, difference);
        graph.output(quotient);

        let input = Num::new(-3.0, 4.0);
        let mut simulation =
            Simulation::with_inputs(&graph, vec![Some(input.into())]).unwrap();
        let outputs = simulation.step(false, None, false).unwrap();
        let expected = input.abs().sqrt() / (input - Num::real(2.0));
        assert_eq!(outputs, vec![expected]);
    }
}
