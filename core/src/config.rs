//! Model and filter configuration.
//!
//! [`FilterConfig`] bundles the movement parameters with the particle filter settings and reads or writes
//! itself as JSON, YAML or TOML, picking the format from the file extension:
//!
//! ```toml
//! num_particles = 500
//! seed = 7
//! cache_transitions = true
//! record_history = false
//!
//! [parameters]
//! beta = [0.5, -1.0]
//! delta = 0.1
//! persistence = 2.0
//! ```
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use nalgebra::DVector;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::error::{MovementError, Result};

fn default_num_particles() -> usize {
    1000
}
fn default_seed() -> u64 {
    42
}
fn default_true() -> bool {
    true
}

/// Parameters of the CTDS movement model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MovementParameters {
    /// Log-linear rate coefficients, one per covariate.
    pub beta: Vec<f64>,
    /// Uniformization scale for discrete-time simulation.
    pub delta: f64,
    /// Directional persistence strength; 0 is a random walk.
    #[serde(default)]
    pub persistence: f64,
}

impl MovementParameters {
    pub fn new(beta: Vec<f64>, delta: f64, persistence: f64) -> Self {
        MovementParameters {
            beta,
            delta,
            persistence,
        }
    }

    pub fn beta_vector(&self) -> DVector<f64> {
        DVector::from_vec(self.beta.clone())
    }

    pub fn validate(&self) -> Result<()> {
        if self.beta.is_empty() || self.beta.iter().any(|b| !b.is_finite()) {
            return Err(MovementError::InvalidParameter(format!(
                "beta must be a non-empty vector of finite values, got {:?}",
                self.beta
            )));
        }
        if !(self.delta.is_finite() && self.delta > 0.0) {
            return Err(MovementError::InvalidParameter(format!(
                "delta must be positive and finite, got {}",
                self.delta
            )));
        }
        if !self.persistence.is_finite() {
            return Err(MovementError::InvalidParameter(format!(
                "persistence must be finite, got {}",
                self.persistence
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    #[serde(default = "default_num_particles")]
    pub num_particles: usize,

    /// Seed for [`FilterConfig::rng`]. The same seed repeats a run exactly.
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Memoize transition rates and probabilities per state during a run.
    #[serde(default = "default_true")]
    pub cache_transitions: bool,

    /// Keep every resampled ensemble.
    #[serde(default)]
    pub record_history: bool,

    pub parameters: MovementParameters,
}

impl FilterConfig {
    pub fn new(parameters: MovementParameters) -> Self {
        FilterConfig {
            num_particles: default_num_particles(),
            seed: default_seed(),
            cache_transitions: true,
            record_history: false,
            parameters,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_particles == 0 {
            return Err(MovementError::InvalidParameter(
                "num_particles must be at least 1".to_string(),
            ));
        }
        self.parameters.validate()
    }

    /// Generator seeded from `seed`.
    pub fn rng(&self) -> StdRng {
        StdRng::seed_from_u64(self.seed)
    }

    /// Write the configuration to a JSON file (pretty-printed).
    pub fn to_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(file, self).map_err(|e| MovementError::Config(e.to_string()))
    }

    pub fn from_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        serde_json::from_reader(file).map_err(|e| MovementError::Config(e.to_string()))
    }

    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut file = File::create(path)?;
        let s = serde_yaml::to_string(self).map_err(|e| MovementError::Config(e.to_string()))?;
        file.write_all(s.as_bytes())?;
        Ok(())
    }

    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        serde_yaml::from_reader(file).map_err(|e| MovementError::Config(e.to_string()))
    }

    pub fn to_toml<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut file = File::create(path)?;
        let s = toml::to_string(self).map_err(|e| MovementError::Config(e.to_string()))?;
        file.write_all(s.as_bytes())?;
        Ok(())
    }

    pub fn from_toml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut s = String::new();
        let mut file = File::open(path)?;
        file.read_to_string(&mut s)?;
        toml::from_str(&s).map_err(|e| MovementError::Config(e.to_string()))
    }

    /// Write in the format given by the extension (.json/.yaml/.yml/.toml).
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let p = path.as_ref();
        match extension(p).as_deref() {
            Some("json") => self.to_json(p),
            Some("yaml") | Some("yml") => self.to_yaml(p),
            Some("toml") => self.to_toml(p),
            _ => Err(unsupported_extension(p)),
        }
    }

    /// Read in the format given by the extension (.json/.yaml/.yml/.toml).
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let p = path.as_ref();
        match extension(p).as_deref() {
            Some("json") => Self::from_json(p),
            Some("yaml") | Some("yml") => Self::from_yaml(p),
            Some("toml") => Self::from_toml(p),
            _ => Err(unsupported_extension(p)),
        }
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_lowercase())
}

fn unsupported_extension(path: &Path) -> MovementError {
    MovementError::Config(format!(
        "unsupported configuration file extension: {}",
        path.display()
    ))
}
