//! Spatial search over a [`Statespace`].
//!
//! Maps arbitrary projected coordinates to the nearest grid cell with an R*-tree, and indexes the states
//! anchored at each cell. Only cells that carry at least one state are indexed: an isolated cell (all of its
//! neighbours infeasible) can never hold a particle, so it is never returned.

use std::collections::BTreeMap;

use log::debug;
use rand::Rng;
use rstar::{PointDistance, RTree};
use rstar::primitives::GeomWithData;

use crate::domain::{LocationId, StateId, Statespace};
use crate::error::{MovementError, Result};
use crate::measurements::LocationLikelihood;

type IndexedLocation = GeomWithData<[f64; 2], LocationId>;

/// Nearest-location index and location-to-states reverse lookup.
#[derive(Clone, Debug)]
pub struct StatespaceSearch {
    tree: RTree<IndexedLocation>,
    states_by_location: BTreeMap<LocationId, Vec<StateId>>,
}

impl StatespaceSearch {
    pub fn new(statespace: &Statespace) -> Self {
        let mut states_by_location: BTreeMap<LocationId, Vec<StateId>> = BTreeMap::new();
        for (id, state) in statespace.states() {
            states_by_location.entry(state.location).or_default().push(id);
        }
        let points: Vec<IndexedLocation> = states_by_location
            .keys()
            .map(|&location| {
                let cell = statespace.location(location);
                GeomWithData::new([cell.easting, cell.northing], location)
            })
            .collect();
        let skipped = statespace.num_locations() - points.len();
        if skipped > 0 {
            debug!("Spatial index skips {skipped} locations without states");
        }
        debug!("Spatial index built over {} locations", points.len());
        StatespaceSearch {
            tree: RTree::bulk_load(points),
            states_by_location,
        }
    }

    /// Location closest (Euclidean) to `(easting, northing)`. Equidistant locations resolve to the lowest
    /// [`LocationId`].
    ///
    /// # Errors
    /// `NotFound` only if the index is empty.
    pub fn nearest_location(&self, easting: f64, northing: f64) -> Result<LocationId> {
        let query = [easting, northing];
        let nearest = self
            .tree
            .nearest_neighbor(&query)
            .ok_or_else(|| MovementError::NotFound("spatial index is empty".to_string()))?;
        let distance_2 = nearest.distance_2(&query);
        Ok(self
            .tree
            .locate_within_distance(query, distance_2)
            .map(|entry| entry.data)
            .min()
            .unwrap_or(nearest.data))
    }

    /// States anchored at `location` (1 to 4 of them for an indexed location, empty otherwise).
    pub fn states_at(&self, location: LocationId) -> &[StateId] {
        self.states_by_location
            .get(&location)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Number of indexed locations.
    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Draw `n` states: a coordinate from `sampler`, snapped to the nearest location, then one of the
    /// states at that location chosen uniformly.
    pub fn sample_gaussian_states<R: Rng + ?Sized>(
        &self,
        sampler: &LocationLikelihood,
        n: usize,
        rng: &mut R,
    ) -> Result<Vec<StateId>> {
        let mut states = Vec::with_capacity(n);
        for _ in 0..n {
            let (easting, northing) = sampler.sample(rng);
            let location = self.nearest_location(easting, northing)?;
            let candidates = self.states_at(location);
            let pick = rng.random_range(0..candidates.len());
            states.push(candidates[pick]);
        }
        Ok(states)
    }
}
