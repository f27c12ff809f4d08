//! Particles and the kernels that move them across the statespace.
//!
//! A [`Particle`] is nothing more than a handle to its current [`State`](crate::domain::State). Two kernels
//! advance particles:
//!
//! - [`DiscreteTimeKernel`]: one step of the uniformized chain. With probability `1 - δλ(s)` the particle
//!   stays put; otherwise it jumps to a neighbour drawn from the transition probabilities.
//! - [`GillespieKernel`]: exact continuous-time simulation between two time points using exponential
//!   holding times and the jump chain.
//!
//! Proposals wrap a kernel into the per-step operator consumed by the particle filter.

use std::fmt::{self, Display};

use nalgebra::DVector;
use rand::Rng;
use rand_distr::{Distribution, Exp};

use crate::domain::{StateId, Statespace};
use crate::error::{MovementError, Result};
use crate::transition::{TransitionProbabilities, TransitionRate};

/// A single realisation of the latent movement state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Particle {
    pub state: StateId,
}
impl Particle {
    pub fn new(state: StateId) -> Self {
        Particle { state }
    }
}
impl From<StateId> for Particle {
    fn from(state: StateId) -> Self {
        Particle { state }
    }
}
impl Display for Particle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Particle(state: {})", self.state.0)
    }
}

/// Pick the first neighbour of `state` whose cumulative transition mass exceeds `u`.
///
/// `probabilities` must be aligned with `state.to_states()`. If rounding leaves the total mass just below
/// `u`, the last neighbour is returned.
pub fn select_neighbor(
    statespace: &Statespace,
    state: StateId,
    probabilities: &DVector<f64>,
    u: f64,
) -> Result<StateId> {
    let to = statespace.state(state).to_states();
    if to.is_empty() {
        return Err(MovementError::NotFound(format!(
            "state {:?} has no outgoing transitions",
            statespace.state_key(state)
        )));
    }
    if probabilities.len() != to.len() {
        return Err(MovementError::InvalidParameter(format!(
            "{} transition probabilities for {} neighbours",
            probabilities.len(),
            to.len()
        )));
    }
    let mut cumulative_mass = 0.0;
    for (&destination, &mass) in to.iter().zip(probabilities.iter()) {
        cumulative_mass += mass;
        if cumulative_mass > u {
            return Ok(destination);
        }
    }
    Ok(to[to.len() - 1])
}

/// A kernel advancing a state by one discrete time step.
pub trait DiscreteKernel {
    fn step<R: Rng + ?Sized>(
        &mut self,
        statespace: &Statespace,
        state: StateId,
        rng: &mut R,
    ) -> Result<StateId>;
}

/// Discrete-time step of the uniformized CTDS chain.
///
/// `rate` must already be uniformized (e.g. a [`UniformizedRate`](crate::transition::UniformizedRate)) so
/// that it reads as a per-step jump probability.
#[derive(Clone, Debug)]
pub struct DiscreteTimeKernel<T, P> {
    rate: T,
    probabilities: P,
}
impl<T, P> DiscreteTimeKernel<T, P> {
    pub fn new(rate: T, probabilities: P) -> Self {
        DiscreteTimeKernel {
            rate,
            probabilities,
        }
    }
    pub fn rate(&self) -> &T {
        &self.rate
    }
    pub fn rate_mut(&mut self) -> &mut T {
        &mut self.rate
    }
    pub fn probabilities(&self) -> &P {
        &self.probabilities
    }
    pub fn probabilities_mut(&mut self) -> &mut P {
        &mut self.probabilities
    }
}
impl<T: TransitionRate, P: TransitionProbabilities> DiscreteKernel for DiscreteTimeKernel<T, P> {
    fn step<R: Rng + ?Sized>(
        &mut self,
        statespace: &Statespace,
        state: StateId,
        rng: &mut R,
    ) -> Result<StateId> {
        let uniformized_rate = self.rate.transition_rate(statespace, state);
        if !(0.0..=1.0).contains(&uniformized_rate) {
            return Err(MovementError::InvalidParameter(format!(
                "uniformized rate {uniformized_rate} at state {:?} is not a probability; reduce delta",
                statespace.state_key(state)
            )));
        }
        if rng.random::<f64>() < 1.0 - uniformized_rate {
            return Ok(state);
        }
        let probabilities = self.probabilities.probabilities(statespace, state);
        let u = rng.random::<f64>();
        select_neighbor(statespace, state, &probabilities, u)
    }
}

/// Continuous-time (Gillespie) simulation of the CTDS chain.
#[derive(Clone, Debug)]
pub struct GillespieKernel<T, P> {
    rate: T,
    probabilities: P,
}
impl<T, P> GillespieKernel<T, P> {
    pub fn new(rate: T, probabilities: P) -> Self {
        GillespieKernel {
            rate,
            probabilities,
        }
    }
    pub fn rate_mut(&mut self) -> &mut T {
        &mut self.rate
    }
    pub fn probabilities_mut(&mut self) -> &mut P {
        &mut self.probabilities
    }
}
impl<T: TransitionRate, P: TransitionProbabilities> GillespieKernel<T, P> {
    /// Advance `state` from time `t` to `t_next`, returning the state occupied at `t_next`.
    pub fn advance<R: Rng + ?Sized>(
        &mut self,
        statespace: &Statespace,
        state: StateId,
        t: f64,
        t_next: f64,
        rng: &mut R,
    ) -> Result<StateId> {
        let mut state = state;
        let mut t = t;
        loop {
            let rate = self.rate.transition_rate(statespace, state);
            if !(rate.is_finite() && rate >= 0.0) {
                return Err(MovementError::InvalidParameter(format!(
                    "transition rate {rate} at state {:?} is not a finite, non-negative number",
                    statespace.state_key(state)
                )));
            }
            if rate == 0.0 {
                // absorbing: the holding time is infinite
                return Ok(state);
            }
            let holding = Exp::new(rate)
                .map_err(|e| MovementError::InvalidParameter(format!("holding time: {e}")))?
                .sample(rng);
            t += holding;
            if t >= t_next {
                return Ok(state);
            }
            let probabilities = self.probabilities.probabilities(statespace, state);
            let u = rng.random::<f64>();
            state = select_neighbor(statespace, state, &probabilities, u)?;
        }
    }
}

/// Per-step proposal distribution used by the particle filter, driven by a kernel `K`.
pub trait Proposal<K> {
    fn propose<R: Rng + ?Sized>(
        &self,
        kernel: &mut K,
        statespace: &Statespace,
        particle: &mut Particle,
        rng: &mut R,
    ) -> Result<()>;
}

/// Advance a particle by a fixed number of discrete-time steps.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NStepProposal {
    pub steps: usize,
}
impl NStepProposal {
    pub fn new(steps: usize) -> Self {
        NStepProposal { steps }
    }
}
impl<K: DiscreteKernel> Proposal<K> for NStepProposal {
    fn propose<R: Rng + ?Sized>(
        &self,
        kernel: &mut K,
        statespace: &Statespace,
        particle: &mut Particle,
        rng: &mut R,
    ) -> Result<()> {
        for _ in 0..self.steps {
            particle.state = kernel.step(statespace, particle.state, rng)?;
        }
        Ok(())
    }
}

/// `len` identical proposals of `steps` steps each.
pub fn constant_step_family(len: usize, steps: usize) -> Vec<NStepProposal> {
    vec![NStepProposal::new(steps); len]
}

/// Advance a particle across a continuous-time interval with the Gillespie kernel.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IntervalProposal {
    pub start: f64,
    pub end: f64,
}
impl<T: TransitionRate, P: TransitionProbabilities> Proposal<GillespieKernel<T, P>>
    for IntervalProposal
{
    fn propose<R: Rng + ?Sized>(
        &self,
        kernel: &mut GillespieKernel<T, P>,
        statespace: &Statespace,
        particle: &mut Particle,
        rng: &mut R,
    ) -> Result<()> {
        particle.state = kernel.advance(statespace, particle.state, self.start, self.end, rng)?;
        Ok(())
    }
}

/// One [`IntervalProposal`] per consecutive pair of `time_points`.
///
/// # Errors
/// `InvalidInput` if `time_points` is empty, not finite, or decreasing.
pub fn interval_family(time_points: &[f64]) -> Result<Vec<IntervalProposal>> {
    validate_time_points(time_points)?;
    Ok(time_points
        .windows(2)
        .map(|pair| IntervalProposal {
            start: pair[0],
            end: pair[1],
        })
        .collect())
}

pub(crate) fn validate_time_points(time_points: &[f64]) -> Result<()> {
    if time_points.is_empty() {
        return Err(MovementError::InvalidInput(
            "at least one time point is required".to_string(),
        ));
    }
    if time_points.iter().any(|t| !t.is_finite()) {
        return Err(MovementError::InvalidInput(
            "time points must be finite".to_string(),
        ));
    }
    if time_points.windows(2).any(|pair| pair[1] < pair[0]) {
        return Err(MovementError::InvalidInput(
            "time points must be non-decreasing".to_string(),
        ));
    }
    Ok(())
}
