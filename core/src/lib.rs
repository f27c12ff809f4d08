//! Continuous-time discrete-space (CTDS) animal movement toolbox
//!
//! This crate provides the inference and simulation engine for CTDS movement models. An animal moves between
//! the cells of a rectangular landscape grid as a continuous-time Markov chain whose jump rate depends on
//! spatial covariates and whose jump direction prefers to continue in the direction of the previous move
//! (directional persistence). Noisy location fixes (Argos error ellipses or GPS fixes) are combined with the
//! movement model by a bootstrap particle filter, which estimates the marginal likelihood of the observations
//! and samples the filtering distribution of the latent path.
//!
//! The crate is built on a few dependencies:
//! - [`nalgebra`](https://crates.io/crates/nalgebra): covariate tables and parameter vectors.
//! - [`rand`](https://crates.io/crates/rand) and [`rand_distr`](https://crates.io/crates/rand_distr): uniform,
//!   normal, exponential and binomial draws. Every stochastic routine takes the generator as an argument.
//! - [`rstar`](https://crates.io/crates/rstar): nearest-cell queries for arbitrary coordinates.
//!
//! Parameter estimation is not part of this crate; it provides the likelihood and simulation primitives such
//! routines call repeatedly.
//!
//! ## Crate overview
//!
//! This crate is organized into several modules:
//! - [directions]: Compass directions and the directional persistence covariate.
//! - [domain]: The landscape grid ([domain::Location]) and the directional statespace graph ([domain::State]).
//! - [search]: Nearest-location index and location-to-states lookup, and initial ensemble sampling.
//! - [transition]: Transition rates, uniformization, persistence transition probabilities and their caches.
//! - [measurements]: Bivariate normal location-error likelihoods and likelihood families.
//! - [particle]: Particles, discrete-time and Gillespie kernels, and filter proposals.
//! - [filter]: The bootstrap particle filter.
//! - [sim]: Path simulation entry points and CSV observation records.
//! - [config]: Model parameters and filter configuration (JSON, YAML, TOML).
//! - [linalg]: Log-space arithmetic.
//! - [error]: The crate error type.
//!
//! ## Statespace
//!
//! Given easting coordinates $e_0, \dots, e_{E-1}$ and northing coordinates $n_0, \dots, n_{N-1}$, cell $(i, j)$
//! sits at $(e_i, n_j)$ and owns column $k = jE + i$ of the covariate table (easting varies fastest). An optional
//! linear constraint $w$ keeps only the cells with $w \cdot x_k \geq 0$.
//!
//! A state is a pair (cell, direction of the last move). A state heading `North` into cell $c$ exists only if
//! the cell south of $c$ exists. Edges join $s \to s'$ exactly when the cells are rook neighbours and the direction
//! of $s'$ is the direction of the move from $s$ to $s'$.
//!
//! ## Movement model
//!
//! The rate of leaving state $s$ at cell $c$ is log-linear in the cell covariates
//!
//! $$
//! \lambda(s) = \exp(\beta \cdot x_c)
//! $$
//!
//! and the destination is chosen with probability proportional to $\exp(\gamma \cdot \mathrm{cov}(d_s, d_{s'}))$,
//! where $\mathrm{cov}$ is $+1$ for the same direction, $-1$ for the opposite direction and $0$ otherwise.
//!
//! Discrete-time simulation uses the uniformized rate $\delta \lambda(s)$ as the probability of jumping during a
//! step; $\delta$ must keep it within $[0, 1]$. Continuous-time simulation draws exponential holding times with
//! rate $\lambda(s)$.
//!
//! ## Particle filter
//!
//! At each step $t$ the filter proposes, weights with $\log p(y_t \mid s_i) - \log M$ and resamples. The
//! marginal log-likelihood estimate is
//!
//! $$
//! \ell = \sum_{t=1}^{T} \left( \log \sum_{i=1}^{M} \frac{p(y_t \mid s_i^{(t)})}{M} - \log M \right)
//! $$
//!
//! so every step without an observation contributes $-\log M$.
//!
//! ## Example
//!
//! ```
//! use movecon::config::{FilterConfig, MovementParameters};
//! use movecon::directions::Direction;
//! use movecon::domain::Statespace;
//! use movecon::filter::run_particle_filter;
//! use movecon::measurements::{LocationLikelihood, likelihood_family};
//! use nalgebra::DMatrix;
//!
//! let coords = [0.0, 1.0, 2.0, 3.0];
//! let statespace = Statespace::new(&coords, &coords, DMatrix::zeros(1, 16), None).unwrap();
//! let start = statespace.state_at(Direction::North, 1, 1).unwrap();
//! let fix = LocationLikelihood::from_hdop_uere(1.5, 1.0, 2.0, 1.0).unwrap();
//! let likelihoods = likelihood_family(&[fix], &[4], 5).unwrap();
//!
//! let mut config = FilterConfig::new(MovementParameters::new(vec![0.0], 0.2, 1.0));
//! config.num_particles = 64;
//! let mut rng = config.rng();
//! let output = run_particle_filter(&statespace, &[start; 64], &likelihoods, &config, &mut rng).unwrap();
//! assert!(output.log_likelihood.is_finite());
//! ```

pub mod config;
pub mod directions;
pub mod domain;
pub mod error;
pub mod filter;
pub mod linalg;
pub mod measurements;
pub mod particle;
pub mod search;
pub mod sim;
pub mod transition;

pub use config::{FilterConfig, MovementParameters};
pub use directions::Direction;
pub use domain::{Location, LocationId, State, StateId, Statespace};
pub use error::{MovementError, Result};
pub use filter::{BootstrapParticleFilter, FilterOutput, FilteringHistory, run_particle_filter};
pub use measurements::{Likelihood, LocationLikelihood};
pub use particle::Particle;
pub use search::StatespaceSearch;
pub use sim::{simulate_continuous, simulate_discrete};
