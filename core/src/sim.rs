//! Path simulation and observation records.
//!
//! [`simulate_discrete`] and [`simulate_continuous`] draw movement paths from the CTDS model.
//! [`EllipseObservation`] and [`GpsObservation`] are the CSV records of location fixes that feed the
//! particle filter, one row per observed step:
//!
//! ```text
//! step,easting,northing,semi_major,semi_minor,orientation
//! 0,512034.5,4391020.0,350.0,120.0,45.0
//! 3,512210.0,4390870.5,500.0,200.0,90.0
//! ```

use std::path::Path;

use log::debug;
use nalgebra::DVector;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::domain::{StateId, Statespace};
use crate::error::{MovementError, Result};
use crate::measurements::{Likelihood, LocationLikelihood, likelihood_family};
use crate::particle::{DiscreteKernel, DiscreteTimeKernel, GillespieKernel, validate_time_points};
use crate::transition::{DirectionalPersistence, LocationBasedRate, UniformizedRate};

fn check_state(statespace: &Statespace, state: StateId) -> Result<()> {
    if state.0 >= statespace.num_states() {
        return Err(MovementError::NotFound(format!(
            "start state {} is not in a statespace of {} states",
            state.0,
            statespace.num_states()
        )));
    }
    Ok(())
}

/// Simulate `n_steps` discrete-time steps of the uniformized chain.
///
/// Returns the path including `start`, so its length is `n_steps + 1`.
///
/// # Errors
/// `InvalidParameter` if `delta · λ(s)` leaves `[0, 1]` at a visited state, or if `delta` is not positive.
pub fn simulate_discrete<R: Rng + ?Sized>(
    statespace: &Statespace,
    start: StateId,
    beta: &DVector<f64>,
    delta: f64,
    persistence: f64,
    n_steps: usize,
    rng: &mut R,
) -> Result<Vec<StateId>> {
    check_state(statespace, start)?;
    let rate = UniformizedRate::new(LocationBasedRate::new(beta.clone(), statespace)?, delta)?;
    let mut kernel = DiscreteTimeKernel::new(rate, DirectionalPersistence::new(persistence));
    let mut path = Vec::with_capacity(n_steps + 1);
    path.push(start);
    let mut state = start;
    for _ in 0..n_steps {
        state = kernel.step(statespace, state, rng)?;
        path.push(state);
    }
    debug!("Simulated {n_steps} discrete steps from state {}", start.0);
    Ok(path)
}

/// Simulate the continuous-time chain and report the state occupied at each of `time_points`.
///
/// The first entry is `start` (occupied at `time_points[0]`), so the path has `time_points.len()` entries.
///
/// # Errors
/// `InvalidInput` for empty, non-finite or decreasing `time_points`.
pub fn simulate_continuous<R: Rng + ?Sized>(
    statespace: &Statespace,
    start: StateId,
    beta: &DVector<f64>,
    persistence: f64,
    time_points: &[f64],
    rng: &mut R,
) -> Result<Vec<StateId>> {
    check_state(statespace, start)?;
    validate_time_points(time_points)?;
    let rate = LocationBasedRate::new(beta.clone(), statespace)?;
    let mut kernel = GillespieKernel::new(rate, DirectionalPersistence::new(persistence));
    let mut path = Vec::with_capacity(time_points.len());
    path.push(start);
    let mut state = start;
    for interval in time_points.windows(2) {
        state = kernel.advance(statespace, state, interval[0], interval[1], rng)?;
        path.push(state);
    }
    debug!(
        "Simulated continuous path over {} time points from state {}",
        time_points.len(),
        start.0
    );
    Ok(path)
}

/// An error-ellipse location fix (e.g. Argos) observed at a discrete step.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EllipseObservation {
    pub step: usize,
    pub easting: f64,
    pub northing: f64,
    pub semi_major: f64,
    pub semi_minor: f64,
    /// Degrees.
    pub orientation: f64,
}

impl EllipseObservation {
    pub fn location_likelihood(&self) -> Result<LocationLikelihood> {
        LocationLikelihood::from_ellipse(
            self.easting,
            self.northing,
            self.semi_major,
            self.semi_minor,
            self.orientation,
        )
    }

    /// Likelihood family of length `total_steps` with the records placed at their steps.
    pub fn likelihood_family(records: &[Self], total_steps: usize) -> Result<Vec<Likelihood>> {
        let likelihoods = records
            .iter()
            .map(Self::location_likelihood)
            .collect::<Result<Vec<_>>>()?;
        let steps: Vec<usize> = records.iter().map(|r| r.step).collect();
        likelihood_family(&likelihoods, &steps, total_steps)
    }

    /// Reads a CSV file and returns a vector of `EllipseObservation` structs.
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Vec<Self>> {
        let mut rdr = csv::Reader::from_path(path)?;
        let mut records = Vec::new();
        for result in rdr.deserialize() {
            let record: Self = result?;
            records.push(record);
        }
        Ok(records)
    }

    /// Writes a vector of `EllipseObservation` structs to a CSV file.
    pub fn to_csv<P: AsRef<Path>>(records: &[Self], path: P) -> Result<()> {
        write_csv(records, path)
    }
}

/// A GPS fix with its horizontal dilution of precision.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GpsObservation {
    pub step: usize,
    pub easting: f64,
    pub northing: f64,
    pub hdop: f64,
}

impl GpsObservation {
    pub fn location_likelihood(&self, uere: f64) -> Result<LocationLikelihood> {
        LocationLikelihood::from_hdop_uere(self.easting, self.northing, self.hdop, uere)
    }

    pub fn likelihood_family(
        records: &[Self],
        uere: f64,
        total_steps: usize,
    ) -> Result<Vec<Likelihood>> {
        let likelihoods = records
            .iter()
            .map(|r| r.location_likelihood(uere))
            .collect::<Result<Vec<_>>>()?;
        let steps: Vec<usize> = records.iter().map(|r| r.step).collect();
        likelihood_family(&likelihoods, &steps, total_steps)
    }

    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Vec<Self>> {
        let mut rdr = csv::Reader::from_path(path)?;
        let mut records = Vec::new();
        for result in rdr.deserialize() {
            let record: Self = result?;
            records.push(record);
        }
        Ok(records)
    }

    pub fn to_csv<P: AsRef<Path>>(records: &[Self], path: P) -> Result<()> {
        write_csv(records, path)
    }
}

fn write_csv<T: Serialize, P: AsRef<Path>>(records: &[T], path: P) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}
