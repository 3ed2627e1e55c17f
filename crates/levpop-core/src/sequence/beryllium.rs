//! Be-like four-level atom.
//!
//! Level 0 is the ¹S₀ ground level, levels 1, 2 and 3 are the J = 0, 1, 2
//! levels of the ³P term, all taken at the same excitation energy. Only the
//! 2 → 0 intercombination line is radiatively fast; the caller supplies it as
//! a [`LineTransition`] whose collision strength covers the whole ³P term.
//! That term strength is shared among the J levels in proportion to
//! `2J + 1`, and the figure reported back for the line is the J = 1 share
//! (one third of the input), which is what a critical-density estimate for
//! the line needs.

use nalgebra::{Matrix4, Vector4};
use serde::{Deserialize, Serialize};

use crate::cooling::{split_exchange, CoolingLedger};
use crate::model::LineTransition;
use crate::physics::{Conditions, SMALLFLOAT};
use crate::solver::{PopulationStatus, SolvedState, SolverError};

use super::weight_matches;

/// Abundance below which the atom is left in the ground level.
const MIN_ABUNDANCE: f64 = 1.0e-20;

/// `E/kT` beyond which the ³P term is left empty.
const MAX_EXCITATION_RATIO: f64 = 30.0;

/// Weight ratio `g(³P₂)/g(³P₁)` used for the 1 → 2 collisional rate.
const J2_TO_J1_WEIGHT: f64 = 1.667;

/// Collision data among the ³P levels and the 3 → 0 decay.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BerylliumAtom {
    /// Collision strength ³P₀ – ³P₁.
    pub cs12: f64,
    /// Collision strength ³P₀ – ³P₂.
    pub cs13: f64,
    /// Collision strength ³P₁ – ³P₂.
    pub cs23: f64,
    /// Transition probability ³P₂ → ¹S₀ (s⁻¹).
    pub a30: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BerylliumSolution {
    pub state: SolvedState,
    /// Collision strength of the fast line alone, one third of the term value.
    pub reported_collision_strength: f64,
}

/// Solve the Be-like atom driven by its intercombination `line`.
///
/// Records the line's cooling under its label and wavelength in `ledger`,
/// with zero cooling when the fast exit is taken. A negligible abundance is
/// an empty atom with status normal; a ³P term too far above kT for the
/// temperature is reported as too cold.
pub fn solve_beryllium_like(
    atom: &BerylliumAtom,
    line: &LineTransition,
    abundance: f64,
    cond: &Conditions,
    ledger: &mut dyn CoolingLedger,
) -> Result<BerylliumSolution, SolverError> {
    let term_strength = line.collision_strength;
    let reported_collision_strength = term_strength / 3.0;
    let boltz = line.energy_k / cond.temperature;

    if abundance <= MIN_ABUNDANCE || boltz > MAX_EXCITATION_RATIO {
        ledger.add_coolant(&line.label, line.wavelength, 0.0);
        let status = if abundance <= MIN_ABUNDANCE {
            PopulationStatus::Normal
        } else {
            PopulationStatus::TooCold
        };
        return Ok(BerylliumSolution {
            state: SolvedState::ground_only(4, abundance.max(0.0), status),
            reported_collision_strength,
        });
    }

    if !weight_matches(line.g_lo, 1.0) || !weight_matches(line.g_hi, 3.0) {
        return Err(SolverError::InvalidInput(format!(
            "{} {:.1} must connect g=1 and g=3 levels, has {} and {}",
            line.label, line.wavelength, line.g_lo, line.g_hi
        )));
    }
    if !(term_strength > 0.0) {
        return Err(SolverError::InvalidRate {
            quantity: format!("collision strength of {} {:.1}", line.label, line.wavelength),
            value: term_strength,
        });
    }

    let excit = (-boltz).exp();
    let cf = cond.collision_factor;

    // pumping of the fast line and its induced emission
    let pump_up = line.pump;
    let pump_down = line.pump / 3.0;
    let a20 = line.net_escape_rate()?;

    // term strength shared as 2J+1 over the term weight of 9
    let c10 = term_strength * cf / 9.0;
    let c01 = c10 * excit;
    let c20 = c10;
    let c02 = c01 * 3.0;
    let c30 = c10;
    let c03 = c01 * 5.0;
    let c21 = atom.cs12 * cf / 3.0;
    let c12 = c21 * 3.0;
    let c31 = atom.cs13 * cf / 5.0;
    let c13 = c31 * 5.0;
    let c32 = atom.cs23 * cf / 5.0;
    let c23 = c32 * J2_TO_J1_WEIGHT;

    let r02 = c02 + pump_up;
    let r20 = c20 + a20 + pump_down;
    let r30 = c30 + atom.a30;

    #[rustfmt::skip]
    let matrix = Matrix4::new(
        1.0,  1.0,              1.0,              1.0,
        -c01, c10 + c12 + c13,  -c21,             -c31,
        -r02, -c12,             r20 + c21 + c23,  -c32,
        -c03, -c13,             -c23,             r30 + c31 + c32,
    );
    let rhs = Vector4::new(1.0, 0.0, 0.0, 0.0);

    let relative = matrix
        .lu()
        .solve(&rhs)
        .filter(|x| x.iter().all(|v| v.is_finite()))
        .ok_or_else(|| SolverError::SingularSystem {
            label: line.label.clone(),
        })?;

    let mut populations: Vec<f64> = relative.iter().map(|x| x * abundance).collect();
    let negative = populations.iter().filter(|&&p| p < 0.0).count();
    let status = if negative > 0 {
        log::warn!(
            "{}: non-positive Be-like population at T = {:.4e} K: {:?}",
            line.label,
            cond.temperature,
            populations
        );
        for pop in populations.iter_mut() {
            *pop = pop.max(0.0);
        }
        PopulationStatus::NegativePopulation { count: negative }
    } else {
        PopulationStatus::Normal
    };

    let mut departure = vec![1.0, 0.0, 0.0, 0.0];
    if populations[0] > SMALLFLOAT {
        let ratio = |level: usize| populations[level] / populations[0];
        departure[1] = ratio(1) / excit;
        departure[2] = ratio(2) / (excit * 3.0);
        departure[3] = ratio(3) / (excit * 5.0);
    }

    // lumped excitation out of ground and de-excitation into it
    let energy = line.energy_erg();
    let excitation = populations[0] * (c01 + c02 + c03) * energy;
    let deexcitation =
        (populations[1] * c10 + populations[2] * c20 + populations[3] * c30) * energy;
    let exchange = split_exchange(excitation, deexcitation, c02 / r02);
    let derivative = cond.cooling_derivative(exchange.cooling, line.energy_k);
    ledger.add_line(&line.label, line.wavelength, exchange, derivative);

    Ok(BerylliumSolution {
        state: SolvedState {
            populations,
            departure,
            cooling: exchange.cooling,
            heating: exchange.heating,
            cooling_derivative: derivative,
            status,
        },
        reported_collision_strength,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cooling::CoolingStack;
    use approx::assert_relative_eq;

    /// C III 1909-like intercombination line.
    fn c3_line() -> LineTransition {
        LineTransition::new("C  3", 1908.7, 7.54e4, 1.0, 3.0, 121.0, 1.01)
    }

    fn c3_atom() -> BerylliumAtom {
        BerylliumAtom {
            cs12: 0.9,
            cs13: 0.7,
            cs23: 2.2,
            a30: 5.2e-3,
        }
    }

    #[test]
    fn test_conservation_and_ledger() {
        let cond = Conditions::from_electron_density(1.5e4, 1.0e4);
        let mut ledger = CoolingStack::new();
        let sol = solve_beryllium_like(&c3_atom(), &c3_line(), 0.2, &cond, &mut ledger).unwrap();
        assert_eq!(sol.state.status, PopulationStatus::Normal);
        assert_relative_eq!(sol.state.total_population(), 0.2, max_relative = 1e-10);
        assert_relative_eq!(sol.reported_collision_strength, 1.01 / 3.0);
        assert_eq!(ledger.entries().len(), 1);
        assert_relative_eq!(ledger.total_cooling(), sol.state.cooling);
        assert!(sol.state.cooling > 0.0);
    }

    #[test]
    fn test_fast_exit_records_zero_coolant() {
        let cond = Conditions::from_electron_density(1.0e3, 1.0e4);
        let mut ledger = CoolingStack::new();
        let sol = solve_beryllium_like(&c3_atom(), &c3_line(), 0.2, &cond, &mut ledger).unwrap();
        assert_eq!(sol.state.populations, vec![0.2, 0.0, 0.0, 0.0]);
        assert_eq!(sol.state.status, PopulationStatus::TooCold);
        assert_eq!(ledger.entries().len(), 1);
        assert_eq!(ledger.total_cooling(), 0.0);
        assert_relative_eq!(sol.reported_collision_strength, 1.01 / 3.0);
    }

    #[test]
    fn test_negligible_abundance_is_normal() {
        let cond = Conditions::from_electron_density(1.5e4, 1.0e4);
        let mut ledger = CoolingStack::new();
        let sol = solve_beryllium_like(&c3_atom(), &c3_line(), 1.0e-22, &cond, &mut ledger).unwrap();
        assert_eq!(sol.state.status, PopulationStatus::Normal);
        assert_eq!(sol.state.departure, vec![1.0, 0.0, 0.0, 0.0]);
        assert_eq!(sol.state.cooling, 0.0);
        assert_eq!(ledger.entries().len(), 1);
    }

    #[test]
    fn test_weights_within_single_precision_accepted() {
        let cond = Conditions::from_electron_density(1.5e4, 1.0e4);
        let mut line = c3_line();
        line.g_hi = 3.0 * (1.0 + 1.0e-9);
        let mut ledger = CoolingStack::new();
        let sol = solve_beryllium_like(&c3_atom(), &line, 0.2, &cond, &mut ledger).unwrap();
        assert_eq!(sol.state.status, PopulationStatus::Normal);
    }

    #[test]
    fn test_wrong_weights_rejected() {
        let cond = Conditions::from_electron_density(1.5e4, 1.0e4);
        let mut line = c3_line();
        line.g_hi = 5.0;
        let mut ledger = CoolingStack::new();
        let err = solve_beryllium_like(&c3_atom(), &line, 0.2, &cond, &mut ledger).unwrap_err();
        assert!(matches!(err, SolverError::InvalidInput(_)));
    }

    #[test]
    fn test_high_density_departures_approach_unity() {
        let cond = Conditions::from_electron_density(1.5e4, 1.0e16);
        let mut ledger = CoolingStack::new();
        let sol = solve_beryllium_like(&c3_atom(), &c3_line(), 1.0, &cond, &mut ledger).unwrap();
        for &d in &sol.state.departure[1..] {
            assert_relative_eq!(d, 1.0, max_relative = 1e-3);
        }
    }
}
