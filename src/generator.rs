//! Signal generators - Reusable input sources for simulations
//!
//! Small stateful objects mapping an iteration number to a value. Any
//! generator converts into an input provider through
//! [`InputProvider::generator`](crate::InputProvider::generator).
//!
//! # Example
//! ```
//! use sigflow::{Impulse, SignalGenerator};
//!
//! let mut impulse = Impulse::new();
//! assert_eq!(impulse.evaluate(0), sigflow::Num::ONE);
//! assert_eq!(impulse.evaluate(1), sigflow::Num::ZERO);
//! ```

use std::f64::consts::PI;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::number::Num;
use crate::sim::Iteration;

/// A value per iteration number.
///
/// Takes `&mut self` so generators may carry state, e.g. a random number
/// generator.
pub trait SignalGenerator {
    fn evaluate(&mut self, time: Iteration) -> Num;
}

/// A one at a single iteration, zero everywhere else.
#[derive(Clone, Copy, Debug, Default)]
pub struct Impulse {
    delay: Iteration,
}

impl Impulse {
    /// Impulse at iteration zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Impulse at iteration `delay`
    pub fn with_delay(delay: Iteration) -> Self {
        Self { delay }
    }
}

impl SignalGenerator for Impulse {
    fn evaluate(&mut self, time: Iteration) -> Num {
        if time == self.delay {
            Num::ONE
        } else {
            Num::ZERO
        }
    }
}

/// Zero before a given iteration, one from it onwards.
#[derive(Clone, Copy, Debug, Default)]
pub struct Step {
    delay: Iteration,
}

impl Step {
    /// Step at iteration zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Step at iteration `delay`
    pub fn with_delay(delay: Iteration) -> Self {
        Self { delay }
    }
}

impl SignalGenerator for Step {
    fn evaluate(&mut self, time: Iteration) -> Num {
        if time >= self.delay {
            Num::ONE
        } else {
            Num::ZERO
        }
    }
}

/// The same value forever.
#[derive(Clone, Copy, Debug)]
pub struct Constant {
    value: Num,
}

impl Constant {
    pub fn new(value: impl Into<Num>) -> Self {
        Self { value: value.into() }
    }
}

impl SignalGenerator for Constant {
    fn evaluate(&mut self, _time: Iteration) -> Num {
        self.value
    }
}

/// A finite sequence padded with zeros once it runs out.
#[derive(Clone, Debug)]
pub struct ZeroPad {
    data: Vec<Num>,
}

impl ZeroPad {
    pub fn new(data: Vec<Num>) -> Self {
        Self { data }
    }
}

impl SignalGenerator for ZeroPad {
    fn evaluate(&mut self, time: Iteration) -> Num {
        self.data.get(time as usize).copied().unwrap_or(Num::ZERO)
    }
}

/// sin(pi * (frequency * t + phase)).
///
/// The frequency is normalized so 1 corresponds to half the sample rate.
#[derive(Clone, Copy, Debug)]
pub struct Sinusoid {
    frequency: f64,
    phase: f64,
}

impl Sinusoid {
    pub fn new(frequency: f64) -> Self {
        Self { frequency, phase: 0.0 }
    }

    pub fn with_phase(frequency: f64, phase: f64) -> Self {
        Self { frequency, phase }
    }
}

impl SignalGenerator for Sinusoid {
    fn evaluate(&mut self, time: Iteration) -> Num {
        Num::real((PI * (self.frequency * time as f64 + self.phase)).sin())
    }
}

/// Uniform noise over `[low, high)`.
#[derive(Clone, Debug)]
pub struct Uniform {
    rng: StdRng,
    low: f64,
    high: f64,
}

impl Uniform {
    /// Unseeded noise over `[low, high)`
    pub fn new(low: f64, high: f64) -> Self {
        Self { rng: StdRng::from_entropy(), low, high }
    }

    /// Reproducible noise over `[low, high)`
    pub fn with_seed(seed: u64, low: f64, high: f64) -> Self {
        Self { rng: StdRng::seed_from_u64(seed), low, high }
    }
}

impl SignalGenerator for Uniform {
    fn evaluate(&mut self, _time: Iteration) -> Num {
        Num::real(self.rng.gen_range(self.low..self.high))
    }
}

/// Gaussian noise with mean `loc` and standard deviation `scale`.
#[derive(Clone, Debug)]
pub struct Gaussian {
    rng: StdRng,
    loc: f64,
    scale: f64,
}

impl Gaussian {
    /// Unseeded noise with mean `loc` and standard deviation `scale`
    pub fn new(loc: f64, scale: f64) -> Self {
        Self { rng: StdRng::from_entropy(), loc, scale }
    }

    /// Reproducible noise with mean `loc` and standard deviation `scale`
    pub fn with_seed(seed: u64, loc: f64, scale: f64) -> Self {
        Self { rng: StdRng::seed_from_u64(seed), loc, scale }
    }
}

impl SignalGenerator for Gaussian {
    fn evaluate(&mut self, _time: Iteration) -> Num {
        // Box-Muller transform over two uniform draws. The first draw is
        // shifted into (0, 1] so the logarithm stays finite.
        let u1: f64 = 1.0 - self.rng.gen::<f64>();
        let u2: f64 = self.rng.gen();
        let standard = (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos();
        Num::real(self.loc + self.scale * standard)
    }
}

/// Another generator shifted later in time, zero before the shift.
#[derive(Clone, Copy, Debug)]
pub struct Delayed<G> {
    generator: G,
    delay: Iteration,
}

impl<G: SignalGenerator> Delayed<G> {
    pub fn new(generator: G, delay: Iteration) -> Self {
        Self { generator, delay }
    }
}

impl<G: SignalGenerator> SignalGenerator for Delayed<G> {
    fn evaluate(&mut self, time: Iteration) -> Num {
        if time < self.delay {
            Num::ZERO
        } else {
            self.generator.evaluate(time - self.delay)
        }
    }
}
