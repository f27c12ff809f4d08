//! Spatial grid and directional statespace for continuous-time discrete-space (CTDS) movement.
//!
//! The grid is a regular lattice of [`Location`] cells defined by a monotonic easting vector and a monotonic
//! northing vector. Each cell carries a covariate column from a shared covariate table. The statespace pairs
//! a cell with the direction of the movement that arrived there, e.g. "at cell (i, j) having just moved
//! north". These [`State`]s are the nodes a particle moves between.
//!
//! ## Grid conventions
//!
//! - `eastings` and `northings` may each be increasing or decreasing; the step sign is taken from the first
//!   two entries and the rest of the vector must follow it strictly.
//! - The covariate table is a `p x (E * N)` matrix. Column `j * E + i` holds the covariates for easting
//!   index `i` and northing index `j`, i.e. eastings vary fastest and northings slowest.
//! - "East" always means increasing easting coordinate and "north" increasing northing coordinate,
//!   regardless of the order of the index vectors.
//!
//! ## Graph structure
//!
//! A state `(d, i, j)` exists only when the cell one step in direction `d.opposite()` from `(i, j)` is part of
//! the grid, since otherwise nothing could have arrived at `(i, j)` by moving in direction `d`. An edge
//! `s -> s'` exists when the two cells are rook-adjacent and `s'` records the direction of that move.
//! Locations and states live in arenas owned by [`Statespace`]; edges are plain index lists.

use std::collections::BTreeMap;
use std::fmt::{self, Display};

use log::{debug, info};
use nalgebra::{DMatrix, DVector, DVectorView};

use crate::directions::Direction;
use crate::error::{MovementError, Result};

/// Opaque handle for a [`Location`] inside a [`Statespace`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocationId(pub usize);

/// Opaque handle for a [`State`] inside a [`Statespace`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateId(pub usize);

/// Grid index pair `(easting index, northing index)`.
pub type LocationIndices = (usize, usize);

/// Key identifying a state: `(last movement direction, easting index, northing index)`.
pub type StateKey = (Direction, usize, usize);

/// A single grid cell.
#[derive(Clone, Debug, PartialEq)]
pub struct Location {
    pub easting: f64,
    pub northing: f64,
    pub easting_index: usize,
    pub northing_index: usize,
    /// Column of the covariate table holding this cell's covariates
    column: usize,
}
impl Location {
    pub fn indices(&self) -> LocationIndices {
        (self.easting_index, self.northing_index)
    }
    pub fn covariate_column(&self) -> usize {
        self.column
    }
}
impl Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Location(i: {}, j: {}, easting: {}, northing: {})",
            self.easting_index, self.northing_index, self.easting, self.northing
        )
    }
}

/// A location paired with the direction of the movement used to arrive there.
#[derive(Clone, Debug, PartialEq)]
pub struct State {
    pub last_movement_direction: Direction,
    pub location: LocationId,
    to: Vec<StateId>,
    from: Vec<StateId>,
}
impl State {
    /// States reachable in one move, in N, E, S, W order of the move direction.
    pub fn to_states(&self) -> &[StateId] {
        &self.to
    }
    /// States from which this state can be reached in one move.
    pub fn from_states(&self) -> &[StateId] {
        &self.from
    }
}

/// Rook-adjacency statespace with directional persistence.
#[derive(Clone, Debug)]
pub struct Statespace {
    eastings: Vec<f64>,
    northings: Vec<f64>,
    east_step: isize,
    north_step: isize,
    covariates: DMatrix<f64>,
    locations: Vec<Location>,
    location_lookup: BTreeMap<LocationIndices, LocationId>,
    states: Vec<State>,
    state_lookup: BTreeMap<StateKey, StateId>,
}

impl Statespace {
    /// Build the grid and statespace.
    ///
    /// # Arguments
    /// * `eastings` - strictly monotonic easting coordinates (at least 2)
    /// * `northings` - strictly monotonic northing coordinates (at least 2)
    /// * `covariates` - `p x (E * N)` covariate table, eastings varying fastest
    /// * `linear_constraint` - optional length-`p` vector `w`; cells with `w . x < 0` are excluded
    ///
    /// # Errors
    /// `InvalidInput` for non-monotonic or too-short coordinate vectors, a covariate table or constraint of
    /// the wrong shape, or a constraint that excludes every cell.
    pub fn new(
        eastings: &[f64],
        northings: &[f64],
        covariates: DMatrix<f64>,
        linear_constraint: Option<&DVector<f64>>,
    ) -> Result<Self> {
        let east_step = step_sign(eastings, "eastings")?;
        let north_step = step_sign(northings, "northings")?;
        let n_cells = eastings.len() * northings.len();
        if covariates.ncols() != n_cells {
            return Err(MovementError::InvalidInput(format!(
                "covariate table has {} columns but the grid has {} cells",
                covariates.ncols(),
                n_cells
            )));
        }
        if let Some(w) = linear_constraint
            && w.len() != covariates.nrows()
        {
            return Err(MovementError::InvalidInput(format!(
                "linear constraint has length {} but there are {} covariates",
                w.len(),
                covariates.nrows()
            )));
        }

        let mut statespace = Statespace {
            eastings: eastings.to_vec(),
            northings: northings.to_vec(),
            east_step,
            north_step,
            covariates,
            locations: Vec::new(),
            location_lookup: BTreeMap::new(),
            states: Vec::new(),
            state_lookup: BTreeMap::new(),
        };
        statespace.build_locations(linear_constraint);
        if statespace.locations.is_empty() {
            return Err(MovementError::InvalidInput(
                "linear constraint excludes every grid cell".to_string(),
            ));
        }
        // states must all exist before any edge can be wired
        statespace.build_states();
        statespace.build_edges();
        info!(
            "Built statespace: {}x{} grid, {} feasible locations, {} states",
            eastings.len(),
            northings.len(),
            statespace.locations.len(),
            statespace.states.len()
        );
        Ok(statespace)
    }

    fn build_locations(&mut self, linear_constraint: Option<&DVector<f64>>) {
        let n_eastings = self.eastings.len();
        for (j, &northing) in self.northings.iter().enumerate() {
            for (i, &easting) in self.eastings.iter().enumerate() {
                let column = j * n_eastings + i;
                let feasible = match linear_constraint {
                    Some(w) => w.dot(&self.covariates.column(column)) >= 0.0,
                    None => true,
                };
                if !feasible {
                    debug!("Excluding cell ({i}, {j}) by linear constraint");
                    continue;
                }
                let id = LocationId(self.locations.len());
                self.locations.push(Location {
                    easting,
                    northing,
                    easting_index: i,
                    northing_index: j,
                    column,
                });
                self.location_lookup.insert((i, j), id);
            }
        }
    }

    fn build_states(&mut self) {
        for index in 0..self.locations.len() {
            let (i, j) = self.locations[index].indices();
            for direction in Direction::ALL {
                // arrival requires a feasible cell behind us
                if self.neighbor_location(i, j, direction.opposite()).is_none() {
                    continue;
                }
                let id = StateId(self.states.len());
                self.states.push(State {
                    last_movement_direction: direction,
                    location: LocationId(index),
                    to: Vec::new(),
                    from: Vec::new(),
                });
                self.state_lookup.insert((direction, i, j), id);
            }
        }
    }

    fn build_edges(&mut self) {
        for index in 0..self.states.len() {
            let (i, j) = self.locations[self.states[index].location.0].indices();
            for direction in Direction::ALL {
                let Some((ni, nj)) = self.neighbor_indices(i, j, direction) else {
                    continue;
                };
                if let Some(&neighbor) = self.state_lookup.get(&(direction, ni, nj)) {
                    self.states[index].to.push(neighbor);
                    self.states[neighbor.0].from.push(StateId(index));
                }
            }
        }
    }

    /// Grid indices one step from `(i, j)` in `direction`, if inside the grid bounds.
    pub fn neighbor_indices(
        &self,
        i: usize,
        j: usize,
        direction: Direction,
    ) -> Option<LocationIndices> {
        let (di, dj) = match direction {
            Direction::East => (self.east_step, 0),
            Direction::West => (-self.east_step, 0),
            Direction::North => (0, self.north_step),
            Direction::South => (0, -self.north_step),
        };
        let ni = i as isize + di;
        let nj = j as isize + dj;
        if ni < 0 || nj < 0 || ni >= self.eastings.len() as isize || nj >= self.northings.len() as isize {
            return None;
        }
        Some((ni as usize, nj as usize))
    }

    /// Feasible location one step from `(i, j)` in `direction`.
    pub fn neighbor_location(&self, i: usize, j: usize, direction: Direction) -> Option<LocationId> {
        self.neighbor_indices(i, j, direction)
            .and_then(|indices| self.location_lookup.get(&indices).copied())
    }

    /// Look up the location handle at grid index `(i, j)`.
    pub fn location_id(&self, i: usize, j: usize) -> Result<LocationId> {
        self.location_lookup.get(&(i, j)).copied().ok_or_else(|| {
            MovementError::NotFound(format!(
                "grid index ({i}, {j}) is outside the feasible domain"
            ))
        })
    }

    /// Look up the location at grid index `(i, j)`.
    pub fn location_at(&self, i: usize, j: usize) -> Result<&Location> {
        self.location_id(i, j).map(|id| &self.locations[id.0])
    }

    /// Look up the state that arrived at `(i, j)` by moving in `direction`.
    pub fn state_at(&self, direction: Direction, i: usize, j: usize) -> Result<StateId> {
        self.state_lookup
            .get(&(direction, i, j))
            .copied()
            .ok_or_else(|| {
                MovementError::NotFound(format!(
                    "no state arriving {direction} at grid index ({i}, {j})"
                ))
            })
    }

    /// Panics if `id` was not produced by this statespace.
    pub fn location(&self, id: LocationId) -> &Location {
        &self.locations[id.0]
    }

    /// Panics if `id` was not produced by this statespace.
    pub fn state(&self, id: StateId) -> &State {
        &self.states[id.0]
    }

    pub fn location_of(&self, state: StateId) -> &Location {
        self.location(self.state(state).location)
    }

    pub fn state_key(&self, state: StateId) -> StateKey {
        let s = self.state(state);
        let (i, j) = self.location(s.location).indices();
        (s.last_movement_direction, i, j)
    }

    /// Covariates at a location, viewed in place in the covariate table.
    pub fn covariates(&self, location: LocationId) -> DVectorView<'_, f64> {
        self.covariates.column(self.location(location).column)
    }

    pub fn state_covariates(&self, state: StateId) -> DVectorView<'_, f64> {
        self.covariates(self.state(state).location)
    }

    pub fn locations(&self) -> impl Iterator<Item = (LocationId, &Location)> {
        self.locations
            .iter()
            .enumerate()
            .map(|(index, location)| (LocationId(index), location))
    }

    pub fn states(&self) -> impl Iterator<Item = (StateId, &State)> {
        self.states
            .iter()
            .enumerate()
            .map(|(index, state)| (StateId(index), state))
    }

    pub fn num_locations(&self) -> usize {
        self.locations.len()
    }

    pub fn num_states(&self) -> usize {
        self.states.len()
    }

    pub fn num_covariates(&self) -> usize {
        self.covariates.nrows()
    }

    pub fn eastings(&self) -> &[f64] {
        &self.eastings
    }

    pub fn northings(&self) -> &[f64] {
        &self.northings
    }
}

impl Display for Statespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Statespace({}x{} grid, {} locations, {} states, {} covariates)",
            self.eastings.len(),
            self.northings.len(),
            self.locations.len(),
            self.states.len(),
            self.covariates.nrows()
        )
    }
}

/// Sign of the coordinate step along an axis, validating strict monotonicity.
fn step_sign(values: &[f64], axis: &str) -> Result<isize> {
    if values.len() < 2 {
        return Err(MovementError::InvalidInput(format!(
            "{axis} must contain at least 2 coordinates, got {}",
            values.len()
        )));
    }
    let increasing = values[1] > values[0];
    let monotonic = values.windows(2).all(|pair| {
        if increasing {
            pair[1] > pair[0]
        } else {
            pair[1] < pair[0]
        }
    });
    if !monotonic {
        return Err(MovementError::InvalidInput(format!(
            "{axis} must be strictly increasing or strictly decreasing"
        )));
    }
    Ok(if increasing { 1 } else { -1 })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unconstrained(n_eastings: usize, n_northings: usize) -> Statespace {
        let eastings: Vec<f64> = (0..n_eastings).map(|i| i as f64).collect();
        let northings: Vec<f64> = (0..n_northings).map(|j| j as f64).collect();
        let covariates = DMatrix::<f64>::zeros(1, n_eastings * n_northings);
        Statespace::new(&eastings, &northings, covariates, None).unwrap()
    }

    #[test]
    fn test_state_counts_3x3() {
        let statespace = unconstrained(3, 3);
        assert_eq!(statespace.num_locations(), 9);
        // one state per directed rook adjacency
        assert_eq!(statespace.num_states(), 24);
        let edges: usize = statespace.states().map(|(_, s)| s.to_states().len()).sum();
        // sum over cells of degree squared: 4 corners * 4 + 4 edges * 9 + center * 16
        assert_eq!(edges, 68);
    }

    #[test]
    fn test_interior_cell_has_all_directions() {
        let statespace = unconstrained(3, 3);
        for d in Direction::ALL {
            assert!(statespace.state_at(d, 1, 1).is_ok());
        }
    }

    #[test]
    fn test_boundary_state_missing() {
        let statespace = unconstrained(3, 3);
        // nothing lies south of the southern row, so no northward arrival there
        let err = statespace.state_at(Direction::North, 1, 0).unwrap_err();
        assert!(matches!(err, MovementError::NotFound(_)));
        assert!(statespace.state_at(Direction::South, 1, 0).is_ok());
        assert!(statespace.state_at(Direction::East, 0, 1).is_err());
        assert!(statespace.state_at(Direction::West, 0, 1).is_ok());
    }

    #[test]
    fn test_edges_encode_move_direction() {
        let statespace = unconstrained(3, 3);
        for (id, state) in statespace.states() {
            let here = statespace.location_of(id).indices();
            for &next in state.to_states() {
                let next_state = statespace.state(next);
                let there = statespace.location(next_state.location).indices();
                let expected = statespace
                    .neighbor_indices(here.0, here.1, next_state.last_movement_direction)
                    .unwrap();
                assert_eq!(there, expected);
            }
        }
    }

    #[test]
    fn test_edge_symmetry() {
        let statespace = unconstrained(4, 3);
        for (id, state) in statespace.states() {
            for &next in state.to_states() {
                assert!(statespace.state(next).from_states().contains(&id));
            }
            for &prev in state.from_states() {
                assert!(statespace.state(prev).to_states().contains(&id));
            }
        }
    }

    #[test]
    fn test_decreasing_eastings() {
        let covariates = DMatrix::<f64>::zeros(1, 9);
        let statespace =
            Statespace::new(&[2.0, 1.0, 0.0], &[0.0, 1.0, 2.0], covariates, None).unwrap();
        // index 0 is the eastern-most column; arriving there moving east is possible
        assert!(statespace.state_at(Direction::East, 0, 1).is_ok());
        assert!(statespace.state_at(Direction::East, 2, 1).is_err());
        let east_of_middle = statespace.neighbor_indices(1, 1, Direction::East).unwrap();
        assert_eq!(east_of_middle, (0, 1));
        assert!(
            statespace.location_at(east_of_middle.0, east_of_middle.1).unwrap().easting
                > statespace.location_at(1, 1).unwrap().easting
        );
    }

    #[test]
    fn test_covariate_column_order() {
        // eastings vary fastest: column = j * E + i
        let covariates = DMatrix::from_row_slice(1, 6, &[0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
        let statespace =
            Statespace::new(&[0.0, 1.0, 2.0], &[10.0, 20.0], covariates, None).unwrap();
        let id = statespace.location_id(2, 1).unwrap();
        assert_eq!(statespace.covariates(id)[0], 5.0);
        let id = statespace.location_id(1, 0).unwrap();
        assert_eq!(statespace.covariates(id)[0], 1.0);
    }

    #[test]
    fn test_linear_constraint_excludes_center() {
        let mut values = vec![1.0; 9];
        values[4] = -1.0;
        let covariates = DMatrix::from_row_slice(1, 9, &values);
        let w = DVector::from_vec(vec![1.0]);
        let statespace =
            Statespace::new(&[0.0, 1.0, 2.0], &[0.0, 1.0, 2.0], covariates, Some(&w)).unwrap();
        assert_eq!(statespace.num_locations(), 8);
        assert!(matches!(
            statespace.location_at(1, 1),
            Err(MovementError::NotFound(_))
        ));
        // the remaining ring has two neighbours per cell
        assert_eq!(statespace.num_states(), 16);
        // no move north into the excluded cell
        let s = statespace.state_at(Direction::East, 1, 0).unwrap();
        assert_eq!(statespace.state(s).to_states().len(), 2);
    }

    #[test]
    fn test_constraint_excluding_everything() {
        let covariates = DMatrix::from_element(1, 4, -1.0);
        let w = DVector::from_vec(vec![1.0]);
        let err = Statespace::new(&[0.0, 1.0], &[0.0, 1.0], covariates, Some(&w)).unwrap_err();
        assert!(matches!(err, MovementError::InvalidInput(_)));
    }

    #[test]
    fn test_invalid_coordinates() {
        let covariates = DMatrix::<f64>::zeros(1, 3);
        assert!(matches!(
            Statespace::new(&[0.0, 1.0, 0.5], &[0.0], covariates.clone(), None),
            Err(MovementError::InvalidInput(_))
        ));
        let covariates = DMatrix::<f64>::zeros(1, 6);
        assert!(matches!(
            Statespace::new(&[0.0, 1.0, 0.5], &[0.0, 1.0], covariates, None),
            Err(MovementError::InvalidInput(_))
        ));
        let covariates = DMatrix::<f64>::zeros(1, 2);
        assert!(matches!(
            Statespace::new(&[0.0, 1.0], &[0.0], covariates, None),
            Err(MovementError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_mismatched_covariates() {
        let covariates = DMatrix::<f64>::zeros(2, 5);
        assert!(matches!(
            Statespace::new(&[0.0, 1.0], &[0.0, 1.0], covariates, None),
            Err(MovementError::InvalidInput(_))
        ));
        let covariates = DMatrix::<f64>::zeros(2, 4);
        let w = DVector::from_vec(vec![1.0]);
        assert!(matches!(
            Statespace::new(&[0.0, 1.0], &[0.0, 1.0], covariates, Some(&w)),
            Err(MovementError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_state_key_round_trip() {
        let statespace = unconstrained(3, 4);
        for (id, _) in statespace.states() {
            let (d, i, j) = statespace.state_key(id);
            assert_eq!(statespace.state_at(d, i, j).unwrap(), id);
        }
    }
}
