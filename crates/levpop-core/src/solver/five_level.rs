//! Generic five-level atom.
//!
//! Used for the many forbidden-line ions whose five lowest levels are all
//! the atomic data available. The levels are given by their adjacent energy
//! gaps in wavenumbers and every pair carries one collision strength and one
//! transition probability.

use serde::{Deserialize, Serialize};

use crate::model::{Level, LevelSet};
use crate::physics::{boltzmann_factor, Conditions, ExcitationUnits, T1CM};
use crate::solver::{solve_nlevel, NLevelProblem, PopulationStatus, SolvedState, SolverError, SolverOptions};

/// Transition order used by [`FiveLevelAtom`]'s per-pair arrays:
/// 1-2, 1-3, 1-4, 1-5, 2-3, 2-4, 2-5, 3-4, 3-5, 4-5 (level numbers from 1).
pub const PAIRS: [(usize, usize); 10] = [
    (1, 0),
    (2, 0),
    (3, 0),
    (4, 0),
    (2, 1),
    (3, 1),
    (4, 1),
    (3, 2),
    (4, 2),
    (4, 3),
];

/// Atomic data of a five-level atom.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FiveLevelAtom {
    pub label: String,
    pub weights: [f64; 5],
    /// Energy gaps between adjacent levels (cm⁻¹): 1-2, 2-3, 3-4, 4-5.
    pub gaps_wn: [f64; 4],
    /// Collision strengths in [`PAIRS`] order.
    pub collision_strengths: [f64; 10],
    /// Transition probabilities (s⁻¹) in [`PAIRS`] order.
    pub transition_probabilities: [f64; 10],
    /// Continuum pumping out of the ground level into levels 2..5 (s⁻¹).
    pub pump_from_ground: [f64; 4],
}

impl FiveLevelAtom {
    /// Level energies relative to ground (cm⁻¹).
    pub fn energies_wn(&self) -> [f64; 5] {
        let mut energies = [0.0; 5];
        for i in 1..5 {
            energies[i] = energies[i - 1] + self.gaps_wn[i - 1];
        }
        energies
    }

    fn to_problem(&self, abundance: f64) -> Result<NLevelProblem, SolverError> {
        let levels = self
            .weights
            .iter()
            .zip(self.energies_wn())
            .map(|(&g, e)| Level::new(g, e))
            .collect();
        let levels = LevelSet::new(levels, ExcitationUnits::Wavenumber)?;

        let mut problem = NLevelProblem::new(self.label.clone(), abundance, levels);
        for (k, &(hi, lo)) in PAIRS.iter().enumerate() {
            let pump = if lo == 0 { self.pump_from_ground[hi - 1] } else { 0.0 };
            problem.set_radiative(hi, lo, self.transition_probabilities[k], 0.0, pump)?;
            problem.set_collision_strength(hi, lo, self.collision_strengths[k])?;
        }
        Ok(problem)
    }
}

/// Populations, cooling and cooling derivative of a five-level atom.
///
/// Zero abundance returns an empty atom with status normal. A top level that is neither
/// thermally nor radiatively reachable leaves the atom in the ground level.
pub fn five_level_populations(
    atom: &FiveLevelAtom,
    abundance: f64,
    cond: &Conditions,
    options: &SolverOptions,
) -> Result<SolvedState, SolverError> {
    if !(abundance >= 0.0) {
        return Err(SolverError::InvalidInput(format!(
            "{} has abundance {abundance}",
            atom.label
        )));
    }
    let top = atom.energies_wn()[4] * T1CM / cond.temperature;
    let reach = boltzmann_factor(top) + atom.pump_from_ground[3];
    if abundance == 0.0 {
        return Ok(SolvedState::ground_only(5, 0.0, PopulationStatus::Normal));
    }
    if reach == 0.0 {
        return Ok(SolvedState::ground_only(5, abundance, PopulationStatus::TooCold));
    }

    let problem = atom.to_problem(abundance)?;
    Ok(solve_nlevel(&problem, cond, options)?.state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// [S II]-like five-level atom.
    fn sulphur_like() -> FiveLevelAtom {
        FiveLevelAtom {
            label: "S  2".into(),
            weights: [4.0, 4.0, 6.0, 2.0, 4.0],
            gaps_wn: [14852.9, 31.5, 3289.3, 41.7],
            collision_strengths: [2.76, 4.14, 0.90, 1.79, 7.47, 2.20, 4.99, 1.71, 3.07, 1.12],
            transition_probabilities: [
                8.8e-4, 2.6e-4, 9.1e-2, 2.2e-1, 3.4e-7, 1.6e-1, 1.2e-1, 1.9e-1, 1.3e-1, 1.0e-6,
            ],
            pump_from_ground: [0.0; 4],
        }
    }

    #[test]
    fn test_conservation_and_positive_cooling() {
        let cond = Conditions::from_electron_density(1.0e4, 1.0e3);
        let state = five_level_populations(&sulphur_like(), 0.7, &cond, &SolverOptions::default()).unwrap();
        assert_eq!(state.status, PopulationStatus::Normal);
        assert_relative_eq!(state.total_population(), 0.7, max_relative = 1e-10);
        assert!(state.cooling > 0.0);
        assert!(state.heating >= 0.0);
    }

    #[test]
    fn test_energies_accumulate_gaps() {
        let e = sulphur_like().energies_wn();
        assert_relative_eq!(e[2], 14852.9 + 31.5);
        assert_relative_eq!(e[4], 14852.9 + 31.5 + 3289.3 + 41.7);
    }

    #[test]
    fn test_zero_abundance_and_cold_top_level() {
        let atom = sulphur_like();
        let cond = Conditions::from_electron_density(1.0e4, 1.0e3);
        let state = five_level_populations(&atom, 0.0, &cond, &SolverOptions::default()).unwrap();
        assert_eq!(state.total_population(), 0.0);
        assert_eq!(state.status, PopulationStatus::Normal);
        assert_eq!(state.departure, vec![1.0, 0.0, 0.0, 0.0, 0.0]);

        let cold = Conditions::new(10.0, 1.0e-3);
        let state = five_level_populations(&atom, 1.0, &cold, &SolverOptions::default()).unwrap();
        assert_eq!(state.populations, vec![1.0, 0.0, 0.0, 0.0, 0.0]);
        assert_eq!(state.status, PopulationStatus::TooCold);
        assert_eq!(state.cooling, 0.0);
    }
}
