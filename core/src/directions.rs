//! Compass directions for rook movement and the directional persistence covariate.
//!
//! A movement step on the grid is always one of the four compass directions. The persistence
//! covariate compares the direction an animal last moved with the direction of a candidate move:
//! continuing straight scores `+1`, reversing scores `-1`, and turning left or right scores `0`.

use std::fmt::{self, Display};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::MovementError;

/// Signed covariate table indexed by `[last direction][candidate direction]` in N, E, S, W order.
const ORIENTATIONS: [[f64; 4]; 4] = [
    [1.0, 0.0, -1.0, 0.0],  // north vs. north, east, south, west
    [0.0, 1.0, 0.0, -1.0],  // east
    [-1.0, 0.0, 1.0, 0.0],  // south
    [0.0, -1.0, 0.0, 1.0],  // west
];

/// One of the four rook-adjacent compass directions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    North = 0,
    East = 1,
    South = 2,
    West = 3,
}

impl Direction {
    /// All directions in their canonical order. Neighbour lists are wired in this order.
    pub const ALL: [Direction; 4] = [
        Direction::North,
        Direction::East,
        Direction::South,
        Direction::West,
    ];

    /// The direction pointing the other way.
    pub fn opposite(self) -> Direction {
        match self {
            Direction::North => Direction::South,
            Direction::East => Direction::West,
            Direction::South => Direction::North,
            Direction::West => Direction::East,
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }

    /// Covariate comparing this (previous) direction with a candidate next direction.
    pub fn persistence_covariate(self, next: Direction) -> f64 {
        ORIENTATIONS[self.index()][next.index()]
    }
}

/// Free-function form of [`Direction::persistence_covariate`].
pub fn directional_persistence_covariate(last: Direction, next: Direction) -> f64 {
    last.persistence_covariate(next)
}

impl Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Direction::North => "north",
            Direction::East => "east",
            Direction::South => "south",
            Direction::West => "west",
        };
        write!(f, "{name}")
    }
}

impl FromStr for Direction {
    type Err = MovementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "north" => Ok(Direction::North),
            "east" => Ok(Direction::East),
            "south" => Ok(Direction::South),
            "west" => Ok(Direction::West),
            other => Err(MovementError::InvalidInput(format!(
                "'{other}' is not a direction (expected north, east, south, or west)"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_covariate_table() {
        for d in Direction::ALL {
            assert_eq!(d.persistence_covariate(d), 1.0);
            assert_eq!(d.persistence_covariate(d.opposite()), -1.0);
        }
        assert_eq!(
            directional_persistence_covariate(Direction::North, Direction::East),
            0.0
        );
        assert_eq!(
            directional_persistence_covariate(Direction::West, Direction::South),
            0.0
        );
    }

    #[test]
    fn test_covariate_table_is_symmetric() {
        for a in Direction::ALL {
            for b in Direction::ALL {
                assert_eq!(a.persistence_covariate(b), b.persistence_covariate(a));
            }
        }
    }

    #[test]
    fn test_string_round_trip() {
        for d in Direction::ALL {
            let parsed: Direction = d.to_string().parse().unwrap();
            assert_eq!(parsed, d);
        }
    }

    #[test]
    fn test_invalid_direction_string() {
        let err = "up".parse::<Direction>().unwrap_err();
        assert!(matches!(err, MovementError::InvalidInput(_)));
    }
}
