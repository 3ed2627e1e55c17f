//! B-like five-level atom.
//!
//! Levels are the ²P°₁/₂ ground, ²P°₃/₂, and the ⁴P₁/₂, ⁴P₃/₂, ⁴P₅/₂ levels
//! of the first excited configuration, with statistical weights
//! `[2, 4, 2, 4, 6]`. Six lines carry real radiative data; the four
//! remaining pairs are given a token transition probability so the rate
//! network stays connected. The solve itself is delegated to the N-level
//! engine.

use serde::{Deserialize, Serialize};

use crate::cooling::{split_level_exchange, CoolingLedger, EnergyExchange};
use crate::model::{LevelSet, LineTransition};
use crate::physics::{Conditions, ExcitationUnits};
use crate::solver::{solve_nlevel, NLevelProblem, PopulationStatus, SolvedState, SolverError, SolverOptions};

use super::weight_matches;

const WEIGHTS: [f64; 5] = [2.0, 4.0, 2.0, 4.0, 6.0];

/// Transition probability given to pairs without radiative data (s⁻¹).
const WEAK_TRANSITION_A: f64 = 1.0e-8;

/// Lines and extra collision strengths of a B-like ion.
///
/// Line names give `(hi, lo)` with level 0 the ground: `t10` is the ground
/// fine-structure line, `t41` ends on level 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoronAtom {
    /// Coolant label shared by all six lines.
    pub label: String,
    pub t10: LineTransition,
    pub t20: LineTransition,
    pub t30: LineTransition,
    pub t21: LineTransition,
    pub t31: LineTransition,
    pub t41: LineTransition,
    pub cs40: f64,
    pub cs32: f64,
    pub cs42: f64,
    pub cs43: f64,
    /// Extra 0 → 1 pumping by permitted UV lines (s⁻¹).
    pub pump_rate: f64,
}

impl BoronAtom {
    /// The six lines with their `(hi, lo)` pair and the excitation energy
    /// used for the cooling temperature derivative.
    fn lines(&self) -> [(&LineTransition, usize, usize, f64); 6] {
        [
            (&self.t10, 1, 0, self.t10.energy_k),
            (&self.t20, 2, 0, self.t20.energy_k),
            (&self.t30, 3, 0, self.t30.energy_k),
            (&self.t21, 2, 1, self.t20.energy_k),
            (&self.t31, 3, 1, self.t30.energy_k),
            (&self.t41, 4, 1, self.t41.energy_k),
        ]
    }

    fn validate(&self) -> Result<(), SolverError> {
        for (line, hi, lo, _) in self.lines() {
            for (g, expected) in [(line.g_lo, WEIGHTS[lo]), (line.g_hi, WEIGHTS[hi])] {
                if !weight_matches(g, expected) {
                    return Err(SolverError::InvalidInput(format!(
                        "{} {:.1}: statistical weight {g}, expected {expected}",
                        line.label, line.wavelength
                    )));
                }
            }
            if !(line.collision_strength > 0.0) {
                return Err(SolverError::InvalidRate {
                    quantity: format!("collision strength of {} {:.1}", line.label, line.wavelength),
                    value: line.collision_strength,
                });
            }
            if !(line.energy_k > 0.0) {
                return Err(SolverError::InvalidInput(format!(
                    "{} {:.1} has excitation energy {}",
                    line.label, line.wavelength, line.energy_k
                )));
            }
        }
        let extra = [
            ("cs40", self.cs40),
            ("cs32", self.cs32),
            ("cs42", self.cs42),
            ("cs43", self.cs43),
        ];
        for (name, cs) in extra {
            if !(cs > 0.0) {
                return Err(SolverError::InvalidRate {
                    quantity: format!("{} {name}", self.label),
                    value: cs,
                });
            }
        }
        Ok(())
    }

    fn to_problem(&self, abundance: f64) -> Result<NLevelProblem, SolverError> {
        let energies = [
            0.0,
            self.t10.energy_k,
            self.t20.energy_k,
            self.t30.energy_k,
            self.t41.energy_k + self.t10.energy_k,
        ];
        let levels = LevelSet::from_slices(&WEIGHTS, &energies, ExcitationUnits::Kelvin)?;
        let mut problem = NLevelProblem::new(self.label.clone(), abundance, levels);

        for (line, hi, lo, _) in self.lines() {
            problem.set_radiative(hi, lo, line.escaping_rate(), line.destruction_rate(), line.pump)?;
            problem.set_collision_strength(hi, lo, line.collision_strength)?;
        }
        let pump10 = self.t10.pump + self.pump_rate;
        problem.pump.set(1, 0, pump10)?;

        let weak = [(4, 0, self.cs40), (3, 2, self.cs32), (4, 2, self.cs42), (4, 3, self.cs43)];
        for (hi, lo, cs) in weak {
            problem.set_radiative(hi, lo, WEAK_TRANSITION_A, 0.0, 0.0)?;
            problem.set_collision_strength(hi, lo, cs)?;
        }
        Ok(problem)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoronSolution {
    pub state: SolvedState,
    /// Exchange of `t10, t20, t30, t21, t31, t41`, in that order.
    pub lines: [EnergyExchange; 6],
}

/// Solve the B-like atom and record its six line coolants in `ledger`.
///
/// The state's cooling, heating and derivative are the sums over the six
/// real lines.
pub fn solve_boron_like(
    atom: &BoronAtom,
    abundance: f64,
    cond: &Conditions,
    options: &SolverOptions,
    ledger: &mut dyn CoolingLedger,
) -> Result<BoronSolution, SolverError> {
    if abundance <= 0.0 {
        for (line, ..) in atom.lines() {
            ledger.add_coolant(&atom.label, line.wavelength, 0.0);
        }
        return Ok(BoronSolution {
            state: SolvedState::ground_only(5, 0.0, PopulationStatus::Normal),
            lines: [EnergyExchange::default(); 6],
        });
    }

    atom.validate()?;
    let problem = atom.to_problem(abundance)?;
    let solution = solve_nlevel(&problem, cond, options)?;
    let pops = &solution.state.populations;

    let mut lines = [EnergyExchange::default(); 6];
    let mut total = EnergyExchange::default();
    let mut derivative = 0.0;
    for (k, (line, hi, lo, energy_k)) in atom.lines().into_iter().enumerate() {
        let collisions = solution.collision_rates.get(hi, lo);
        let exchange = split_level_exchange(
            line.energy_erg(),
            pops[lo],
            pops[hi],
            collisions.up,
            collisions.down,
            line.pump,
        );
        let line_derivative = cond.cooling_derivative(exchange.cooling, energy_k);
        ledger.add_line(&atom.label, line.wavelength, exchange, line_derivative);

        lines[k] = exchange;
        total += exchange;
        derivative += line_derivative;
    }

    let mut state = solution.state;
    state.cooling = total.cooling;
    state.heating = total.heating;
    state.cooling_derivative = derivative;
    Ok(BoronSolution { state, lines })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cooling::CoolingStack;
    use approx::assert_relative_eq;

    /// C II-like atom: 157.7 µm ground line and the 2326 Å multiplet.
    fn c2_atom() -> BoronAtom {
        let line = |wl: f64, e: f64, g_lo: f64, g_hi: f64, a: f64, cs: f64| {
            LineTransition::new("C  2", wl, e, g_lo, g_hi, a, cs)
        };
        BoronAtom {
            label: "C  2".into(),
            t10: line(1.577e6, 91.25, 2.0, 4.0, 2.29e-6, 1.8),
            t20: line(2325.4, 6.187e4, 2.0, 2.0, 55.3, 0.24),
            t30: line(2324.2, 6.190e4, 2.0, 4.0, 1.71, 0.36),
            t21: line(2328.8, 6.178e4, 4.0, 2.0, 65.0, 0.18),
            t31: line(2327.6, 6.181e4, 4.0, 4.0, 5.2, 0.50),
            t41: line(2326.1, 6.186e4, 4.0, 6.0, 43.0, 1.04),
            cs40: 0.15,
            cs32: 0.7,
            cs42: 0.6,
            cs43: 1.6,
            pump_rate: 0.0,
        }
    }

    #[test]
    fn test_conservation_and_six_coolants() {
        let cond = Conditions::from_electron_density(1.0e4, 1.0e3);
        let mut ledger = CoolingStack::new();
        let sol = solve_boron_like(&c2_atom(), 0.1, &cond, &SolverOptions::default(), &mut ledger)
            .unwrap();
        assert_eq!(sol.state.status, PopulationStatus::Normal);
        assert_relative_eq!(sol.state.total_population(), 0.1, max_relative = 1e-10);
        assert_eq!(ledger.entries().len(), 6);
        assert!(ledger.entries().iter().all(|c| c.label == "C  2"));
        assert_relative_eq!(ledger.total_cooling(), sol.state.cooling, max_relative = 1e-12);
        assert!(sol.lines[0].cooling > 0.0);
    }

    #[test]
    fn test_zero_abundance_records_zero_coolants() {
        let cond = Conditions::from_electron_density(1.0e4, 1.0e3);
        let mut ledger = CoolingStack::new();
        let sol = solve_boron_like(&c2_atom(), 0.0, &cond, &SolverOptions::default(), &mut ledger)
            .unwrap();
        assert_eq!(ledger.entries().len(), 6);
        assert_eq!(ledger.total_cooling(), 0.0);
        assert_eq!(sol.state.populations, vec![0.0; 5]);
        assert_eq!(sol.state.departure, vec![1.0, 0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_uv_pump_raises_first_excited_level() {
        let cond = Conditions::from_electron_density(1.0e4, 1.0);
        let mut ledger = CoolingStack::new();
        let atom = c2_atom();
        let plain = solve_boron_like(&atom, 1.0, &cond, &SolverOptions::default(), &mut ledger)
            .unwrap();
        let mut pumped = atom.clone();
        pumped.pump_rate = 1.0e-5;
        let driven = solve_boron_like(&pumped, 1.0, &cond, &SolverOptions::default(), &mut ledger)
            .unwrap();
        assert!(driven.state.populations[1] > plain.state.populations[1]);
    }

    #[test]
    fn test_wrong_weight_rejected() {
        let mut atom = c2_atom();
        atom.t41.g_hi = 4.0;
        let mut ledger = CoolingStack::new();
        let err = solve_boron_like(
            &atom,
            1.0,
            &Conditions::new(1.0e4, 0.01),
            &SolverOptions::default(),
            &mut ledger,
        )
        .unwrap_err();
        assert!(matches!(err, SolverError::InvalidInput(_)));
    }
}
