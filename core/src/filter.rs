//! Bootstrap (sequential importance resampling) particle filter over a [`Statespace`].
//!
//! Each filter step runs three stages over an ensemble of `M` particles:
//!
//! 1. **Propose**: every particle is advanced independently by the step's [`Proposal`].
//! 2. **Weight**: particle `i` gets log-weight `ℓ_i = log p(y_t | s_i) - log M`. The weights are combined in
//!    log space, `log_mass = log Σ exp(ℓ_i)`, and the marginal log-likelihood grows by `log_mass - log M`.
//!    A step without an observation therefore contributes `-log M`, and only a single-particle filter over
//!    flat likelihoods accumulates exactly zero.
//! 3. **Resample**: multiplicities are drawn with a sequential conditional binomial scheme,
//!    `n_i ~ Binomial(remaining, p_i / (1 - Σ_{k<i} p_k))`, and every slot still unallocated goes to the last
//!    particle.
//!
//! All randomness is drawn from the caller's generator in a fixed order (all proposals in ensemble order,
//! then the resampling draws), so a seeded generator reproduces a run exactly.

use std::iter::repeat_n;

use log::{debug, info, warn};
use rand::Rng;
use rand_distr::{Binomial, Distribution};

use crate::config::FilterConfig;
use crate::domain::{StateId, Statespace};
use crate::error::{MovementError, Result};
use crate::linalg::log_sum;
use crate::measurements::{Likelihood, LocationLikelihood};
use crate::particle::{DiscreteKernel, DiscreteTimeKernel, NStepProposal, Particle, Proposal};
use crate::search::StatespaceSearch;
use crate::transition::{
    CachedProbabilities, CachedRate, DirectionalPersistence, LocationBasedRate, UniformizedRate,
};

/// Receives each resampled ensemble as the filter runs.
pub trait FilterObserver {
    fn observe(&mut self, step: usize, particles: &[Particle], log_likelihood_increment: f64);
}

/// Observer that discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullObserver;
impl FilterObserver for NullObserver {
    fn observe(&mut self, _step: usize, _particles: &[Particle], _log_likelihood_increment: f64) {}
}

/// Every resampled ensemble of a filter run, with the per-step log-likelihood increments.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FilteringHistory {
    pub distributions: Vec<Vec<Particle>>,
    pub log_likelihood_increments: Vec<f64>,
}
impl FilteringHistory {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn len(&self) -> usize {
        self.distributions.len()
    }
    pub fn is_empty(&self) -> bool {
        self.distributions.is_empty()
    }
    /// Particle coordinates indexed as `[step][particle] -> (easting, northing)`.
    pub fn locations(&self, statespace: &Statespace) -> Vec<Vec<(f64, f64)>> {
        self.distributions
            .iter()
            .map(|ensemble| {
                ensemble
                    .iter()
                    .map(|particle| {
                        let location = statespace.location_of(particle.state);
                        (location.easting, location.northing)
                    })
                    .collect()
            })
            .collect()
    }
}
impl FilterObserver for FilteringHistory {
    fn observe(&mut self, _step: usize, particles: &[Particle], log_likelihood_increment: f64) {
        self.distributions.push(particles.to_vec());
        self.log_likelihood_increments.push(log_likelihood_increment);
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FilterOutput {
    pub log_likelihood: f64,
    pub history: Option<FilteringHistory>,
}

#[derive(Clone, Debug)]
pub struct BootstrapParticleFilter {
    particles_init: Vec<Particle>,
}

impl BootstrapParticleFilter {
    /// # Errors
    /// `InvalidInput` for an empty ensemble.
    pub fn new(particles: Vec<Particle>) -> Result<Self> {
        if particles.is_empty() {
            return Err(MovementError::InvalidInput(
                "the particle filter needs at least one particle".to_string(),
            ));
        }
        Ok(BootstrapParticleFilter {
            particles_init: particles,
        })
    }

    /// Start one particle at each of `states`, checking that every state exists in `statespace`.
    pub fn from_states(statespace: &Statespace, states: &[StateId]) -> Result<Self> {
        if let Some(missing) = states.iter().find(|s| s.0 >= statespace.num_states()) {
            return Err(MovementError::NotFound(format!(
                "initial state {} is not in a statespace of {} states",
                missing.0,
                statespace.num_states()
            )));
        }
        Self::new(states.iter().copied().map(Particle::from).collect())
    }

    pub fn num_particles(&self) -> usize {
        self.particles_init.len()
    }

    pub fn initial_particles(&self) -> &[Particle] {
        &self.particles_init
    }

    /// Run the filter and return the estimated marginal log-likelihood.
    ///
    /// # Arguments
    /// * `kernel` - movement kernel driven by every proposal
    /// * `proposals` - one proposal per step
    /// * `likelihoods` - one likelihood per step, same length as `proposals`
    /// * `observer` - notified with every resampled ensemble
    ///
    /// # Errors
    /// `InvalidInput` if the sequences differ in length, `DegenerateFilter` when every weight at a step is
    /// zero (or not a number), and any kernel error.
    pub fn marginal_log_likelihood<K, P, O, R>(
        &self,
        statespace: &Statespace,
        kernel: &mut K,
        proposals: &[P],
        likelihoods: &[Likelihood],
        observer: &mut O,
        rng: &mut R,
    ) -> Result<f64>
    where
        P: Proposal<K>,
        O: FilterObserver + ?Sized,
        R: Rng + ?Sized,
    {
        if proposals.len() != likelihoods.len() {
            return Err(MovementError::InvalidInput(format!(
                "{} proposals but {} likelihoods",
                proposals.len(),
                likelihoods.len()
            )));
        }
        let m = self.particles_init.len();
        let log_m = (m as f64).ln();
        let mut particles = self.particles_init.clone();
        let mut resampled: Vec<Particle> = Vec::with_capacity(m);
        let mut log_weights = vec![0.0; m];
        let mut log_likelihood = 0.0;

        for (step, (proposal, likelihood)) in proposals.iter().zip(likelihoods).enumerate() {
            for particle in particles.iter_mut() {
                proposal.propose(kernel, statespace, particle, rng)?;
            }
            for (log_weight, particle) in log_weights.iter_mut().zip(&particles) {
                *log_weight = likelihood.log_density_particle(statespace, particle) - log_m;
            }
            let log_mass = log_sum(&log_weights);
            if !log_mass.is_finite() {
                warn!("Particle filter degenerate at step {step}: log weight mass is {log_mass}");
                return Err(MovementError::DegenerateFilter { step });
            }
            let increment = log_mass - log_m;
            log_likelihood += increment;

            resample(&particles, &log_weights, log_mass, &mut resampled, rng)?;
            std::mem::swap(&mut particles, &mut resampled);
            debug!("Step {step}: log-likelihood increment {increment:.6}, total {log_likelihood:.6}");
            observer.observe(step, &particles, increment);
        }
        Ok(log_likelihood)
    }
}

/// Sequential conditional binomial resampling into `out`, which ends up with `particles.len()` entries.
fn resample<R: Rng + ?Sized>(
    particles: &[Particle],
    log_weights: &[f64],
    log_mass: f64,
    out: &mut Vec<Particle>,
    rng: &mut R,
) -> Result<()> {
    out.clear();
    let Some((last, rest)) = particles.split_last() else {
        return Ok(());
    };
    let mut remaining = particles.len() as u64;
    let mut cumulative = 0.0;
    for (particle, &log_weight) in rest.iter().zip(log_weights) {
        if remaining == 0 {
            break;
        }
        let p = (log_weight - log_mass).exp();
        if p > 0.0 {
            let unallocated = 1.0 - cumulative;
            let conditional = if unallocated > 0.0 {
                (p / unallocated).clamp(0.0, 1.0)
            } else {
                1.0
            };
            let count = Binomial::new(remaining, conditional)
                .map_err(|e| MovementError::InvalidParameter(format!("resampling: {e}")))?
                .sample(rng);
            out.extend(repeat_n(*particle, count as usize));
            remaining -= count;
        }
        cumulative += p;
    }
    out.extend(repeat_n(*last, remaining as usize));
    Ok(())
}

/// Filter `likelihoods` with a one-step discrete-time proposal per likelihood.
///
/// Transition caches are created fresh for every call, so changed parameters never see stale values.
/// `initial_states` holds one state per particle and must have exactly `config.num_particles` entries.
///
/// # Errors
/// `InvalidInput` when the particle count disagrees with the configuration. Otherwise propagates
/// configuration validation, statespace lookup and filter errors.
pub fn run_particle_filter<R: Rng + ?Sized>(
    statespace: &Statespace,
    initial_states: &[StateId],
    likelihoods: &[Likelihood],
    config: &FilterConfig,
    rng: &mut R,
) -> Result<FilterOutput> {
    config.validate()?;
    if initial_states.len() != config.num_particles {
        return Err(MovementError::InvalidInput(format!(
            "{} initial states given for {} particles",
            initial_states.len(),
            config.num_particles
        )));
    }
    let parameters = &config.parameters;
    let filter = BootstrapParticleFilter::from_states(statespace, initial_states)?;
    let rate = UniformizedRate::new(
        LocationBasedRate::new(parameters.beta_vector(), statespace)?,
        parameters.delta,
    )?;
    let probabilities = DirectionalPersistence::new(parameters.persistence);
    let proposals = vec![NStepProposal::new(1); likelihoods.len()];
    let mut history = config.record_history.then(FilteringHistory::new);

    let log_likelihood = if config.cache_transitions {
        let mut kernel = DiscreteTimeKernel::new(
            CachedRate::new(rate),
            CachedProbabilities::new(probabilities),
        );
        run_with_kernel(&filter, statespace, &mut kernel, &proposals, likelihoods, &mut history, rng)?
    } else {
        let mut kernel = DiscreteTimeKernel::new(rate, probabilities);
        run_with_kernel(&filter, statespace, &mut kernel, &proposals, likelihoods, &mut history, rng)?
    };
    info!(
        "Particle filter finished: {} particles, {} steps, log-likelihood {log_likelihood:.6}",
        filter.num_particles(),
        likelihoods.len()
    );
    Ok(FilterOutput {
        log_likelihood,
        history,
    })
}

fn run_with_kernel<K: DiscreteKernel, R: Rng + ?Sized>(
    filter: &BootstrapParticleFilter,
    statespace: &Statespace,
    kernel: &mut K,
    proposals: &[NStepProposal],
    likelihoods: &[Likelihood],
    history: &mut Option<FilteringHistory>,
    rng: &mut R,
) -> Result<f64> {
    match history {
        Some(history) => {
            filter.marginal_log_likelihood(statespace, kernel, proposals, likelihoods, history, rng)
        }
        None => filter.marginal_log_likelihood(
            statespace,
            kernel,
            proposals,
            likelihoods,
            &mut NullObserver,
            rng,
        ),
    }
}

/// Draw `config.num_particles` initial states around a location fix.
pub fn sample_initial_states<R: Rng + ?Sized>(
    search: &StatespaceSearch,
    fix: &LocationLikelihood,
    config: &FilterConfig,
    rng: &mut R,
) -> Result<Vec<StateId>> {
    search.sample_gaussian_states(fix, config.num_particles, rng)
}
