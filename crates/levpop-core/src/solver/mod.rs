//! Level-population solvers.
//!
//! Each solver takes the atomic data and the local [`Conditions`] for one
//! call and returns a fresh result; nothing is cached between calls. The
//! closed-form solvers ([`two_level`], [`three_level`]) return populations
//! directly, the matrix solvers ([`nlevel`], [`five_level`]) return a
//! [`SolvedState`].
//!
//! [`Conditions`]: crate::physics::Conditions

pub mod five_level;
pub mod nlevel;
pub mod three_level;
pub mod two_level;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use five_level::{five_level_populations, FiveLevelAtom};
pub use nlevel::{solve_nlevel, LineExchange, NLevelProblem, NLevelSolution};
pub use three_level::{three_level_populations, ThreeLevelAtom, ThreeLevelExtras, ThreeLevelPopulations};
pub use two_level::{solve_two_level_line, two_level_emission, two_level_population};

/// Errors that abort a level-population solve.
///
/// All of these point at inconsistent atomic data or an inconsistent rate
/// network; none of them is expected with a validated species table.
#[derive(Debug, Error)]
pub enum SolverError {
    #[error("Invalid rate: {quantity} = {value:.3e}")]
    InvalidRate { quantity: String, value: f64 },

    #[error("Invalid atomic data: {0}")]
    InvalidInput(String),

    #[error("Singular or ill-conditioned rate matrix for {label}")]
    SingularSystem { label: String },

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Outcome flag of a solve that returned populations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PopulationStatus {
    /// Valid solution.
    Normal,
    /// `count` levels came out significantly negative. The populations were
    /// clamped at zero but the caller should treat the solve as failed.
    NegativePopulation { count: usize },
    /// Too cold for any excited level to matter: everything is in the
    /// ground level and no energy is exchanged.
    TooCold,
}

impl PopulationStatus {
    /// Tri-state code: 0 for a normal solve, the number of negative levels
    /// when positive, -1 when too cold.
    pub fn code(self) -> i32 {
        match self {
            PopulationStatus::Normal => 0,
            PopulationStatus::NegativePopulation { count } => count as i32,
            PopulationStatus::TooCold => -1,
        }
    }

    pub fn is_negative_population(self) -> bool {
        matches!(self, PopulationStatus::NegativePopulation { .. })
    }
}

/// Runtime switches for the matrix solvers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolverOptions {
    /// Dump rate tables, the assembled matrix and the solution at debug level.
    #[serde(default)]
    pub debug: bool,
    /// Put the atom in LTE instead of solving the rate equations.
    #[serde(default)]
    pub lte: bool,
}

/// Populations and energy exchange of one solved species.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolvedState {
    /// Level populations (cm⁻³), ground first.
    pub populations: Vec<f64>,
    /// Departure coefficients relative to ground.
    pub departure: Vec<f64>,
    /// Total collisional cooling (erg cm⁻³ s⁻¹), never negative.
    pub cooling: f64,
    /// Total heating by collisional de-excitation of pumped levels
    /// (erg cm⁻³ s⁻¹), never negative.
    pub heating: f64,
    /// Temperature derivative of `cooling`.
    pub cooling_derivative: f64,
    pub status: PopulationStatus,
}

impl SolvedState {
    /// All of `abundance` in the ground level of an `n_levels` atom.
    ///
    /// Departure coefficients are 1 for ground and 0 elsewhere. Every solver
    /// also reports an empty atom (zero abundance) this way.
    pub fn ground_only(n_levels: usize, abundance: f64, status: PopulationStatus) -> Self {
        let mut populations = vec![0.0; n_levels];
        let mut departure = vec![0.0; n_levels];
        if n_levels > 0 {
            populations[0] = abundance;
            departure[0] = 1.0;
        }
        Self {
            populations,
            departure,
            cooling: 0.0,
            heating: 0.0,
            cooling_derivative: 0.0,
            status,
        }
    }

    pub fn n_levels(&self) -> usize {
        self.populations.len()
    }

    pub fn total_population(&self) -> f64 {
        self.populations.iter().sum()
    }

    /// Net energy removed from the gas, `cooling - heating`.
    pub fn net_cooling(&self) -> f64 {
        self.cooling - self.heating
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(PopulationStatus::Normal.code(), 0);
        assert_eq!(PopulationStatus::NegativePopulation { count: 2 }.code(), 2);
        assert_eq!(PopulationStatus::TooCold.code(), -1);
        assert!(PopulationStatus::NegativePopulation { count: 1 }.is_negative_population());
    }

    #[test]
    fn test_ground_only_state() {
        let state = SolvedState::ground_only(4, 2.5, PopulationStatus::TooCold);
        assert_eq!(state.populations, vec![2.5, 0.0, 0.0, 0.0]);
        assert_eq!(state.departure, vec![1.0, 0.0, 0.0, 0.0]);
        assert_eq!(state.total_population(), 2.5);
        assert_eq!(state.net_cooling(), 0.0);
    }

    #[test]
    fn test_solved_state_json_round_trip() {
        let state = SolvedState::ground_only(2, 1.0, PopulationStatus::Normal);
        let json = serde_json::to_string(&state).unwrap();
        let back: SolvedState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }
}
