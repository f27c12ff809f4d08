//! Local transition model for CTDS movement (Hewitt et al. 2023, eqs. 14 and 15).
//!
//! Movement away from a state is split into two parts:
//!
//! - a total transition rate `λ(s) = exp(β · x(s))` driven by the covariates of the state's location, and
//! - a categorical distribution over the states reachable in one move, driven by directional persistence:
//!   `p(s') ∝ exp(γ · cov(d(s), d(s')))`.
//!
//! Both are exposed through small traits so that simulators can be handed a plain evaluator, a uniformized
//! one, or a cached one. Caches are explicit side tables indexed by [`StateId`]. They are only valid for the
//! parameters they were filled under: whoever changes the parameters must call `invalidate_all()` before the
//! cache is used again.

use log::debug;
use nalgebra::DVector;

use crate::domain::{StateId, Statespace};
use crate::error::{MovementError, Result};

/// Total rate at which a particle leaves a state.
pub trait TransitionRate {
    fn transition_rate(&mut self, statespace: &Statespace, state: StateId) -> f64;
}

/// Probability of moving to each state in `state.to_states()`, in that order.
pub trait TransitionProbabilities {
    fn probabilities(&mut self, statespace: &Statespace, state: StateId) -> DVector<f64>;
}

impl<T: TransitionRate + ?Sized> TransitionRate for &mut T {
    fn transition_rate(&mut self, statespace: &Statespace, state: StateId) -> f64 {
        (**self).transition_rate(statespace, state)
    }
}

impl<T: TransitionProbabilities + ?Sized> TransitionProbabilities for &mut T {
    fn probabilities(&mut self, statespace: &Statespace, state: StateId) -> DVector<f64> {
        (**self).probabilities(statespace, state)
    }
}

/// Log-linear, location-based transition rate `exp(β · x)`.
#[derive(Clone, Debug, PartialEq)]
pub struct LocationBasedRate {
    beta: DVector<f64>,
}
impl LocationBasedRate {
    /// # Errors
    /// `InvalidParameter` if `beta` does not have one entry per covariate in `statespace`.
    pub fn new(beta: DVector<f64>, statespace: &Statespace) -> Result<Self> {
        if beta.len() != statespace.num_covariates() {
            return Err(MovementError::InvalidParameter(format!(
                "beta has length {} but the statespace has {} covariates",
                beta.len(),
                statespace.num_covariates()
            )));
        }
        Ok(LocationBasedRate { beta })
    }
    pub fn beta(&self) -> &DVector<f64> {
        &self.beta
    }
}
impl TransitionRate for LocationBasedRate {
    fn transition_rate(&mut self, statespace: &Statespace, state: StateId) -> f64 {
        self.beta.dot(&statespace.state_covariates(state)).exp()
    }
}

/// Rate scaled by a positive constant `δ`, read as a per-step jump probability by discrete-time simulation.
#[derive(Clone, Debug, PartialEq)]
pub struct UniformizedRate<T> {
    inner: T,
    scale: f64,
}
impl<T> UniformizedRate<T> {
    /// # Errors
    /// `InvalidParameter` if `scale` is not finite and positive.
    pub fn new(inner: T, scale: f64) -> Result<Self> {
        if !(scale.is_finite() && scale > 0.0) {
            return Err(MovementError::InvalidParameter(format!(
                "uniformization scale must be positive and finite, got {scale}"
            )));
        }
        Ok(UniformizedRate { inner, scale })
    }
    pub fn scale(&self) -> f64 {
        self.scale
    }
    pub fn inner(&self) -> &T {
        &self.inner
    }
}
impl<T: TransitionRate> TransitionRate for UniformizedRate<T> {
    fn transition_rate(&mut self, statespace: &Statespace, state: StateId) -> f64 {
        self.scale * self.inner.transition_rate(statespace, state)
    }
}

/// Transition probabilities driven only by directional persistence. `persistence = 0` is a random walk.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DirectionalPersistence {
    persistence: f64,
}
impl DirectionalPersistence {
    pub fn new(persistence: f64) -> Self {
        DirectionalPersistence { persistence }
    }
    pub fn persistence(&self) -> f64 {
        self.persistence
    }
}
impl TransitionProbabilities for DirectionalPersistence {
    fn probabilities(&mut self, statespace: &Statespace, state: StateId) -> DVector<f64> {
        let current = statespace.state(state);
        let last = current.last_movement_direction;
        let log_mass: Vec<f64> = current
            .to_states()
            .iter()
            .map(|&next| {
                self.persistence
                    * last.persistence_covariate(statespace.state(next).last_movement_direction)
            })
            .collect();
        // shift by the max so large |persistence| cannot overflow exp()
        let max = log_mass.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mass = DVector::from_iterator(log_mass.len(), log_mass.iter().map(|m| (m - max).exp()));
        let total = mass.sum();
        mass / total
    }
}

/// Lazily-filled side table of per-state values.
#[derive(Clone, Debug)]
pub struct StateCache<V> {
    values: Vec<Option<V>>,
}
impl<V> Default for StateCache<V> {
    fn default() -> Self {
        StateCache { values: Vec::new() }
    }
}
impl<V: Clone> StateCache<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached value for `state`, computing and storing it on first request.
    pub fn get_or_insert_with<F>(&mut self, state: StateId, num_states: usize, compute: F) -> V
    where
        F: FnOnce() -> V,
    {
        if self.values.len() < num_states.max(state.0 + 1) {
            self.values.resize(num_states.max(state.0 + 1), None);
        }
        if let Some(value) = &self.values[state.0] {
            return value.clone();
        }
        let value = compute();
        self.values[state.0] = Some(value.clone());
        value
    }

    pub fn get(&self, state: StateId) -> Option<&V> {
        self.values.get(state.0).and_then(Option::as_ref)
    }

    pub fn is_cached(&self, state: StateId) -> bool {
        self.get(state).is_some()
    }

    /// Number of states holding a cached value.
    pub fn len(&self) -> usize {
        self.values.iter().filter(|v| v.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reset every entry to "unset".
    pub fn invalidate_all(&mut self) {
        let cleared = self.len();
        self.values.iter_mut().for_each(|v| *v = None);
        debug!("Invalidated {cleared} cached state entries");
    }
}

/// Memoizes a [`TransitionRate`] per state.
#[derive(Clone, Debug)]
pub struct CachedRate<T> {
    inner: T,
    cache: StateCache<f64>,
}
impl<T> CachedRate<T> {
    pub fn new(inner: T) -> Self {
        CachedRate {
            inner,
            cache: StateCache::new(),
        }
    }
    pub fn inner(&self) -> &T {
        &self.inner
    }
    /// Swap the underlying evaluator. Cached values are kept; call [`Self::invalidate_all`] if they are stale.
    pub fn replace_inner(&mut self, inner: T) -> T {
        std::mem::replace(&mut self.inner, inner)
    }
    pub fn cache(&self) -> &StateCache<f64> {
        &self.cache
    }
    pub fn invalidate_all(&mut self) {
        self.cache.invalidate_all();
    }
}
impl<T: TransitionRate> TransitionRate for CachedRate<T> {
    fn transition_rate(&mut self, statespace: &Statespace, state: StateId) -> f64 {
        let inner = &mut self.inner;
        self.cache.get_or_insert_with(state, statespace.num_states(), || {
            inner.transition_rate(statespace, state)
        })
    }
}

/// Memoizes [`TransitionProbabilities`] per state.
#[derive(Clone, Debug)]
pub struct CachedProbabilities<T> {
    inner: T,
    cache: StateCache<DVector<f64>>,
}
impl<T> CachedProbabilities<T> {
    pub fn new(inner: T) -> Self {
        CachedProbabilities {
            inner,
            cache: StateCache::new(),
        }
    }
    pub fn inner(&self) -> &T {
        &self.inner
    }
    /// Swap the underlying evaluator. Cached values are kept; call [`Self::invalidate_all`] if they are stale.
    pub fn replace_inner(&mut self, inner: T) -> T {
        std::mem::replace(&mut self.inner, inner)
    }
    pub fn cache(&self) -> &StateCache<DVector<f64>> {
        &self.cache
    }
    pub fn invalidate_all(&mut self) {
        self.cache.invalidate_all();
    }
}
impl<T: TransitionProbabilities> TransitionProbabilities for CachedProbabilities<T> {
    fn probabilities(&mut self, statespace: &Statespace, state: StateId) -> DVector<f64> {
        let inner = &mut self.inner;
        self.cache.get_or_insert_with(state, statespace.num_states(), || {
            inner.probabilities(statespace, state)
        })
    }
}
