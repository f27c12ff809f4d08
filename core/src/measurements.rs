//! Observation likelihoods for projected location fixes.
//!
//! Location error is modelled as a bivariate normal distribution over easting and northing, following the
//! "Materials and Methods" of McClintock et al. (2015, doi: 10.1111/2041-210X.12311). Two parameterizations
//! are supported:
//!
//! - an error ellipse (Argos-style) with semi-major axis `a`, semi-minor axis `b`, and orientation `θ`
//!   (degrees), which is rotated onto the easting/northing axes:
//!
//! $$
//! \sigma_e^2 = \tfrac{a^2}{2}\sin^2\theta + \tfrac{b^2}{2}\cos^2\theta, \quad
//! \sigma_n^2 = \tfrac{a^2}{2}\cos^2\theta + \tfrac{b^2}{2}\sin^2\theta, \quad
//! \rho = \frac{(a^2/2 - b^2/2)\sin\theta\cos\theta}{\sigma_e \sigma_n}
//! $$
//!
//! - a GPS fix with horizontal dilution of precision (HDOP) and user equivalent range error (UERE), which
//!   gives an isotropic error with `σ_e = σ_n = HDOP · UERE / √2`.
//!
//! A discrete-time likelihood family has one entry per filter step. Steps without an observation get a
//! [`Likelihood::Flat`] entry, which contributes nothing to the log-likelihood.

use std::f64::consts::{PI, SQRT_2};
use std::fmt::{self, Display};

use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::domain::{StateId, Statespace};
use crate::error::{MovementError, Result};
use crate::particle::Particle;

/// Bivariate normal location-error distribution centred on an observed fix.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LocationLikelihood {
    mu_easting: f64,
    mu_northing: f64,
    sd_easting: f64,
    sd_northing: f64,
    rho: f64,
    /// 1 - rho^2
    rhosq_c: f64,
    /// log-normalizing constant of the density
    log_normalizer: f64,
    conditional_scaling: f64,
    conditional_sd: f64,
}

impl Display for LocationLikelihood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LocationLikelihood(easting: {}, northing: {}, sd_easting: {:.4}, sd_northing: {:.4}, rho: {:.4})",
            self.mu_easting, self.mu_northing, self.sd_easting, self.sd_northing, self.rho
        )
    }
}

impl LocationLikelihood {
    /// Build directly from the bivariate normal parameters.
    ///
    /// # Errors
    /// `InvalidParameter` if a standard deviation is not positive and finite, or `|rho| >= 1`.
    pub fn new(
        mu_easting: f64,
        mu_northing: f64,
        sd_easting: f64,
        sd_northing: f64,
        rho: f64,
    ) -> Result<Self> {
        if !(sd_easting.is_finite() && sd_easting > 0.0 && sd_northing.is_finite() && sd_northing > 0.0)
        {
            return Err(MovementError::InvalidParameter(format!(
                "location error standard deviations must be positive, got ({sd_easting}, {sd_northing})"
            )));
        }
        if !(rho.abs() < 1.0) {
            return Err(MovementError::InvalidParameter(format!(
                "location error correlation must lie in (-1, 1), got {rho}"
            )));
        }
        if !(mu_easting.is_finite() && mu_northing.is_finite()) {
            return Err(MovementError::InvalidParameter(format!(
                "observed coordinates must be finite, got ({mu_easting}, {mu_northing})"
            )));
        }
        let rhosq_c = 1.0 - rho * rho;
        Ok(LocationLikelihood {
            mu_easting,
            mu_northing,
            sd_easting,
            sd_northing,
            rho,
            rhosq_c,
            log_normalizer: -(2.0 * PI * sd_easting * sd_northing).ln() - 0.5 * rhosq_c.ln(),
            conditional_scaling: sd_northing / sd_easting * rho,
            conditional_sd: rhosq_c.sqrt() * sd_northing,
        })
    }

    /// Parameterize from an error ellipse; `orientation` is in degrees.
    pub fn from_ellipse(
        easting: f64,
        northing: f64,
        semi_major: f64,
        semi_minor: f64,
        orientation: f64,
    ) -> Result<Self> {
        let valid_axis = |axis: f64| axis.is_finite() && axis >= 0.0;
        if !(valid_axis(semi_major) && valid_axis(semi_minor)) {
            return Err(MovementError::InvalidParameter(format!(
                "error ellipse semi-axes must be non-negative, got ({semi_major}, {semi_minor})"
            )));
        }
        let major_sq_half = semi_major * semi_major / 2.0;
        let minor_sq_half = semi_minor * semi_minor / 2.0;
        let (sin_c, cos_c) = orientation.to_radians().sin_cos();
        let sin2_c = sin_c * sin_c;
        let cos2_c = cos_c * cos_c;
        let sd_easting = (major_sq_half * sin2_c + minor_sq_half * cos2_c).sqrt();
        let sd_northing = (major_sq_half * cos2_c + minor_sq_half * sin2_c).sqrt();
        let rho = (major_sq_half - minor_sq_half) * cos_c * sin_c / sd_easting / sd_northing;
        if !rho.is_finite() {
            return Err(MovementError::InvalidParameter(format!(
                "degenerate error ellipse (semi_major: {semi_major}, semi_minor: {semi_minor})"
            )));
        }
        Self::new(easting, northing, sd_easting, sd_northing, rho)
    }

    /// Parameterize an isotropic GPS error from HDOP and UERE.
    pub fn from_hdop_uere(easting: f64, northing: f64, hdop: f64, uere: f64) -> Result<Self> {
        if !(hdop.is_finite() && hdop > 0.0 && uere.is_finite() && uere > 0.0) {
            return Err(MovementError::InvalidParameter(format!(
                "HDOP and UERE must be positive, got ({hdop}, {uere})"
            )));
        }
        let sd = hdop * uere / SQRT_2;
        Self::new(easting, northing, sd, sd, 0.0)
    }

    pub fn mean(&self) -> (f64, f64) {
        (self.mu_easting, self.mu_northing)
    }
    pub fn sd_easting(&self) -> f64 {
        self.sd_easting
    }
    pub fn sd_northing(&self) -> f64 {
        self.sd_northing
    }
    pub fn rho(&self) -> f64 {
        self.rho
    }

    /// Log-density of the true location being at `(easting, northing)`.
    pub fn log_density_at(&self, easting: f64, northing: f64) -> f64 {
        // scaled distances, signed so that only their magnitudes enter the quadratic form
        let zx = -(easting - self.mu_easting).abs() / self.sd_easting;
        let zy = -(northing - self.mu_northing).abs() / self.sd_northing;
        let q = zx * zx - 2.0 * self.rho * zx * zy + zy * zy;
        -q / 2.0 / self.rhosq_c + self.log_normalizer
    }

    /// Log-density evaluated at a state's location.
    pub fn log_density(&self, statespace: &Statespace, state: StateId) -> f64 {
        let location = statespace.location_of(state);
        self.log_density_at(location.easting, location.northing)
    }

    /// Draw a coordinate pair: easting from its marginal, then northing from its conditional.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> (f64, f64) {
        let easting = Normal::new(self.mu_easting, self.sd_easting)
            .map(|d| d.sample(rng))
            .unwrap_or(self.mu_easting);
        let conditional_mean =
            self.mu_northing + self.conditional_scaling * (easting - self.mu_easting);
        let northing = Normal::new(conditional_mean, self.conditional_sd)
            .map(|d| d.sample(rng))
            .unwrap_or(conditional_mean);
        (easting, northing)
    }
}

/// Per-step likelihood: either no observation, or a location fix.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum Likelihood {
    Flat,
    Location(LocationLikelihood),
}

impl Likelihood {
    pub fn log_density_at(&self, easting: f64, northing: f64) -> f64 {
        match self {
            Likelihood::Flat => 0.0,
            Likelihood::Location(likelihood) => likelihood.log_density_at(easting, northing),
        }
    }

    pub fn log_density(&self, statespace: &Statespace, state: StateId) -> f64 {
        match self {
            Likelihood::Flat => 0.0,
            Likelihood::Location(likelihood) => likelihood.log_density(statespace, state),
        }
    }

    pub fn log_density_particle(&self, statespace: &Statespace, particle: &Particle) -> f64 {
        self.log_density(statespace, particle.state)
    }

    pub fn is_flat(&self) -> bool {
        matches!(self, Likelihood::Flat)
    }
}

impl From<LocationLikelihood> for Likelihood {
    fn from(likelihood: LocationLikelihood) -> Self {
        Likelihood::Location(likelihood)
    }
}

/// Build a likelihood for each observation from ellipse vectors.
pub fn location_likelihood_family_from_ellipses(
    eastings: &[f64],
    northings: &[f64],
    semi_majors: &[f64],
    semi_minors: &[f64],
    orientations: &[f64],
) -> Result<Vec<LocationLikelihood>> {
    let n = eastings.len();
    if [northings.len(), semi_majors.len(), semi_minors.len(), orientations.len()]
        .iter()
        .any(|&len| len != n)
    {
        return Err(MovementError::InvalidInput(
            "ellipse observation vectors must all have the same length".to_string(),
        ));
    }
    (0..n)
        .map(|k| {
            LocationLikelihood::from_ellipse(
                eastings[k],
                northings[k],
                semi_majors[k],
                semi_minors[k],
                orientations[k],
            )
        })
        .collect()
}

/// Build a likelihood for each observation from GPS vectors with a shared UERE.
pub fn location_likelihood_family_from_gps(
    eastings: &[f64],
    northings: &[f64],
    hdops: &[f64],
    uere: f64,
) -> Result<Vec<LocationLikelihood>> {
    let n = eastings.len();
    if northings.len() != n || hdops.len() != n {
        return Err(MovementError::InvalidInput(
            "GPS observation vectors must all have the same length".to_string(),
        ));
    }
    (0..n)
        .map(|k| LocationLikelihood::from_hdop_uere(eastings[k], northings[k], hdops[k], uere))
        .collect()
}

/// Spread observations over a discrete timeline of `total_steps`, filling gaps with [`Likelihood::Flat`].
///
/// # Arguments
/// * `observations` - one likelihood per observation
/// * `observed_indices` - strictly increasing, 0-based step at which each observation applies
/// * `total_steps` - length of the returned family (number of filter steps)
pub fn likelihood_family(
    observations: &[LocationLikelihood],
    observed_indices: &[usize],
    total_steps: usize,
) -> Result<Vec<Likelihood>> {
    if observations.len() != observed_indices.len() {
        return Err(MovementError::InvalidInput(format!(
            "{} observations but {} observation indices",
            observations.len(),
            observed_indices.len()
        )));
    }
    if observed_indices.windows(2).any(|pair| pair[1] <= pair[0]) {
        return Err(MovementError::InvalidInput(
            "observation indices must be strictly increasing".to_string(),
        ));
    }
    if let Some(&last) = observed_indices.last()
        && last >= total_steps
    {
        return Err(MovementError::InvalidInput(format!(
            "observation index {last} is outside a timeline of {total_steps} steps"
        )));
    }
    let mut family = vec![Likelihood::Flat; total_steps];
    for (observation, &index) in observations.iter().zip(observed_indices) {
        family[index] = Likelihood::Location(*observation);
    }
    Ok(family)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_circular_ellipse_is_orientation_invariant() {
        for theta in [0.0, 17.0, 45.0, 90.0, 133.0, 270.0] {
            let lik = LocationLikelihood::from_ellipse(0.0, 0.0, 3.0, 3.0, theta).unwrap();
            assert_approx_eq!(lik.rho(), 0.0, 1e-12);
            assert_approx_eq!(lik.sd_easting(), 3.0 / SQRT_2, 1e-12);
            assert_approx_eq!(lik.sd_northing(), 3.0 / SQRT_2, 1e-12);
        }
    }

    #[test]
    fn test_ellipse_axes() {
        // orientation 0: semi-major along northing
        let lik = LocationLikelihood::from_ellipse(0.0, 0.0, 2.0, 1.0, 0.0).unwrap();
        assert_approx_eq!(lik.sd_easting().powi(2), 0.5, 1e-12);
        assert_approx_eq!(lik.sd_northing().powi(2), 2.0, 1e-12);
        // orientation 90: semi-major along easting
        let lik = LocationLikelihood::from_ellipse(0.0, 0.0, 2.0, 1.0, 90.0).unwrap();
        assert_approx_eq!(lik.sd_easting().powi(2), 2.0, 1e-12);
        assert_approx_eq!(lik.sd_northing().powi(2), 0.5, 1e-12);
        assert_approx_eq!(lik.rho(), 0.0, 1e-12);
    }

    #[test]
    fn test_ellipse_correlation() {
        let lik = LocationLikelihood::from_ellipse(0.0, 0.0, 2.0, 1.0, 45.0).unwrap();
        // sd_e^2 = sd_n^2 = (2 + 0.5) / 2
        assert_approx_eq!(lik.sd_easting().powi(2), 1.25, 1e-12);
        assert_approx_eq!(lik.rho(), 0.75 / 1.25, 1e-12);
    }

    #[test]
    fn test_hdop_uere() {
        let lik = LocationLikelihood::from_hdop_uere(10.0, 20.0, 2.0, 5.0).unwrap();
        assert_approx_eq!(lik.sd_easting(), 10.0 / SQRT_2, 1e-12);
        assert_approx_eq!(lik.sd_northing(), 10.0 / SQRT_2, 1e-12);
        assert_eq!(lik.rho(), 0.0);
        assert_eq!(lik.mean(), (10.0, 20.0));
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(matches!(
            LocationLikelihood::from_hdop_uere(0.0, 0.0, 0.0, 5.0),
            Err(MovementError::InvalidParameter(_))
        ));
        assert!(matches!(
            LocationLikelihood::new(0.0, 0.0, -1.0, 1.0, 0.0),
            Err(MovementError::InvalidParameter(_))
        ));
        assert!(matches!(
            LocationLikelihood::new(0.0, 0.0, 1.0, 1.0, 1.0),
            Err(MovementError::InvalidParameter(_))
        ));
        assert!(LocationLikelihood::from_ellipse(0.0, 0.0, 0.0, 0.0, 10.0).is_err());
    }

    #[test]
    fn test_negative_error_sizes_rejected() {
        assert!(matches!(
            LocationLikelihood::from_ellipse(0.0, 0.0, -2.0, 1.0, 0.0),
            Err(MovementError::InvalidParameter(_))
        ));
        assert!(matches!(
            LocationLikelihood::from_ellipse(0.0, 0.0, 2.0, -1.0, 45.0),
            Err(MovementError::InvalidParameter(_))
        ));
        assert!(matches!(
            LocationLikelihood::from_hdop_uere(0.0, 0.0, -1.0, -1.0),
            Err(MovementError::InvalidParameter(_))
        ));
        assert!(matches!(
            LocationLikelihood::from_hdop_uere(0.0, 0.0, 1.5, -4.0),
            Err(MovementError::InvalidParameter(_))
        ));
        assert!(LocationLikelihood::from_hdop_uere(0.0, 0.0, f64::NAN, 4.0).is_err());
        assert!(LocationLikelihood::from_ellipse(0.0, 0.0, 2.0, 1.0, 0.0).is_ok());
    }

    #[test]
    fn test_density_at_mean_isotropic() {
        let lik = LocationLikelihood::new(0.0, 0.0, 1.0, 1.0, 0.0).unwrap();
        assert_approx_eq!(lik.log_density_at(0.0, 0.0), -(2.0 * PI).ln(), 1e-12);
        // product of two standard normals
        let expected = -(2.0 * PI).ln() - 0.5 * (1.0 + 4.0);
        assert_approx_eq!(lik.log_density_at(1.0, -2.0), expected, 1e-12);
    }

    #[test]
    fn test_density_uses_residual_magnitude() {
        let lik = LocationLikelihood::from_ellipse(5.0, 5.0, 3.0, 1.0, 30.0).unwrap();
        let a = lik.log_density_at(6.0, 7.0);
        assert_approx_eq!(a, lik.log_density_at(4.0, 3.0), 1e-12);
        assert_approx_eq!(a, lik.log_density_at(4.0, 7.0), 1e-12);
        assert_approx_eq!(a, lik.log_density_at(6.0, 3.0), 1e-12);
    }

    #[test]
    fn test_sampling_moments() {
        let lik = LocationLikelihood::from_ellipse(0.0, 0.0, 2.0, 1.0, 90.0).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let n = 200_000;
        let samples: Vec<(f64, f64)> = (0..n).map(|_| lik.sample(&mut rng)).collect();
        let mean_e = samples.iter().map(|s| s.0).sum::<f64>() / n as f64;
        let mean_n = samples.iter().map(|s| s.1).sum::<f64>() / n as f64;
        let var_e = samples.iter().map(|s| (s.0 - mean_e).powi(2)).sum::<f64>() / n as f64;
        let var_n = samples.iter().map(|s| (s.1 - mean_n).powi(2)).sum::<f64>() / n as f64;
        let cov = samples
            .iter()
            .map(|s| (s.0 - mean_e) * (s.1 - mean_n))
            .sum::<f64>()
            / n as f64;
        assert_approx_eq!(var_e, 2.0, 0.05);
        assert_approx_eq!(var_n, 0.5, 0.02);
        assert_approx_eq!(cov / (var_e * var_n).sqrt(), 0.0, 0.02);
    }

    #[test]
    fn test_sampling_correlation() {
        let lik = LocationLikelihood::from_ellipse(0.0, 0.0, 2.0, 1.0, 45.0).unwrap();
        let mut rng = StdRng::seed_from_u64(11);
        let n = 200_000;
        let samples: Vec<(f64, f64)> = (0..n).map(|_| lik.sample(&mut rng)).collect();
        let cov = samples.iter().map(|s| s.0 * s.1).sum::<f64>() / n as f64;
        let var_e = samples.iter().map(|s| s.0 * s.0).sum::<f64>() / n as f64;
        let var_n = samples.iter().map(|s| s.1 * s.1).sum::<f64>() / n as f64;
        assert_approx_eq!(cov / (var_e * var_n).sqrt(), lik.rho(), 0.02);
    }

    #[test]
    fn test_likelihood_family() {
        let obs = vec![
            LocationLikelihood::from_hdop_uere(0.0, 0.0, 1.0, 1.0).unwrap(),
            LocationLikelihood::from_hdop_uere(1.0, 1.0, 1.0, 1.0).unwrap(),
        ];
        let family = likelihood_family(&obs, &[1, 4], 6).unwrap();
        assert_eq!(family.len(), 6);
        let flat: Vec<bool> = family.iter().map(Likelihood::is_flat).collect();
        assert_eq!(flat, vec![true, false, true, true, false, true]);
        assert_eq!(family[4], Likelihood::Location(obs[1]));
        assert_eq!(Likelihood::Flat.log_density_at(100.0, -3.0), 0.0);
    }

    #[test]
    fn test_likelihood_family_rejects_bad_indices() {
        let obs = vec![LocationLikelihood::from_hdop_uere(0.0, 0.0, 1.0, 1.0).unwrap(); 2];
        assert!(likelihood_family(&obs, &[3], 5).is_err());
        assert!(likelihood_family(&obs, &[2, 2], 5).is_err());
        assert!(likelihood_family(&obs, &[1, 5], 5).is_err());
    }

    #[test]
    fn test_family_builders() {
        let family = location_likelihood_family_from_ellipses(
            &[0.0, 1.0],
            &[0.0, 1.0],
            &[2.0, 2.0],
            &[1.0, 1.0],
            &[0.0, 45.0],
        )
        .unwrap();
        assert_eq!(family.len(), 2);
        assert!(
            location_likelihood_family_from_ellipses(&[0.0], &[0.0, 1.0], &[1.0], &[1.0], &[0.0])
                .is_err()
        );
        let gps = location_likelihood_family_from_gps(&[0.0, 1.0, 2.0], &[0.0, 1.0, 2.0], &[1.0, 1.5, 2.0], 4.0)
            .unwrap();
        assert_eq!(gps.len(), 3);
        assert_approx_eq!(gps[2].sd_easting(), 8.0 / SQRT_2, 1e-12);
    }
}
