//! Rate evaluation and balance-matrix assembly.
//!
//! For the active levels $0..n$ the statistical-equilibrium equations are
//!
//! $$ \sum_{j \ne i} n_j R_{ji} - n_i \Big(\sum_{j \ne i} R_{ij} + s_i\Big) = -q_i $$
//!
//! where $R_{ij}$ is the total rate from level $i$ to level $j$, $s_i$ an
//! external sink and $q_i$ an external source. Row 0 is redundant for a
//! closed system and is replaced by the conservation constraint
//! $\sum_i n_i = N_{\rm tot}$.

use ndarray::{Array1, Array2};

use crate::model::{CollisionData, DirectedRate, TransitionGrid};
use crate::physics::{boltzmann_factor, Conditions};
use crate::solver::SolverError;

use super::NLevelProblem;

/// Per-call rates of every transition in the atom.
#[derive(Debug, Clone)]
pub struct RateTables {
    /// Boltzmann factor `exp(-(E_hi - E_lo)/kT)` of every pair.
    pub boltzmann: TransitionGrid<f64>,
    /// Electron-impact rates in both directions (s⁻¹).
    pub collisions: TransitionGrid<DirectedRate>,
    /// Continuum pumping and the induced emission it implies (s⁻¹).
    pub pump: TransitionGrid<DirectedRate>,
}

impl RateTables {
    /// Evaluate the rates for all levels of `problem`, including any that
    /// are later trimmed away; callers use the full tables.
    pub fn evaluate(problem: &NLevelProblem, cond: &Conditions) -> Result<Self, SolverError> {
        let levels = &problem.levels;
        let n = levels.len();
        let inv_t = cond.inverse_temperature();

        let boltzmann = TransitionGrid::from_fn(n, |hi, lo| {
            boltzmann_factor((levels.energy_kelvin(hi) - levels.energy_kelvin(lo)) * inv_t)
        });

        let mut pump = TransitionGrid::new(n);
        for (hi, lo, &up) in problem.pump.iter() {
            let rate = DirectedRate::from_up(up, levels.weight(lo), levels.weight(hi))?;
            pump.set(hi, lo, rate)?;
        }

        let collisions = match &problem.collisions {
            CollisionData::Rates(rates) => rates.clone(),
            CollisionData::Strengths(omega) => {
                let mut rates = TransitionGrid::new(n);
                for (hi, lo, &strength) in omega.iter() {
                    let rate = DirectedRate::from_collision_strength(
                        strength,
                        levels.weight(lo),
                        levels.weight(hi),
                        *boltzmann.get(hi, lo),
                        cond.collision_factor,
                    )?;
                    rates.set(hi, lo, rate)?;
                }
                rates
            }
        };

        Ok(Self {
            boltzmann,
            collisions,
            pump,
        })
    }

    /// Total downward rate `hi → lo`: collisions, escape, destruction and
    /// induced emission.
    pub fn downward(&self, problem: &NLevelProblem, hi: usize, lo: usize) -> f64 {
        self.collisions.get(hi, lo).down
            + problem.escape.get(hi, lo)
            + problem.destruction.get(hi, lo)
            + self.pump.get(hi, lo).down
    }

    /// Total upward rate `lo → hi`: collisions and pumping.
    pub fn upward(&self, hi: usize, lo: usize) -> f64 {
        self.collisions.get(hi, lo).up + self.pump.get(hi, lo).up
    }

    /// Total rate out of `level` into the other active levels plus its
    /// external sink (s⁻¹). This is the diagonal of the balance matrix.
    pub fn depopulation(&self, problem: &NLevelProblem, level: usize, n_active: usize) -> f64 {
        let down: f64 = (0..level).map(|lo| self.downward(problem, level, lo)).sum();
        let up: f64 = (level + 1..n_active).map(|hi| self.upward(hi, level)).sum();
        down + up + problem.sink_rate(level)
    }
}

/// Assemble the balance matrix and right-hand side for the first `n_active`
/// levels, with row 0 replaced by population conservation.
///
/// # Returns
/// `(matrix, rhs)` such that `matrix · n = rhs` gives the populations in
/// cm⁻³.
pub fn assemble_balance_matrix(
    problem: &NLevelProblem,
    rates: &RateTables,
    n_active: usize,
) -> (Array2<f64>, Array1<f64>) {
    let mut matrix = Array2::<f64>::zeros((n_active, n_active));
    let mut rhs = Array1::<f64>::zeros(n_active);

    for hi in 1..n_active {
        for lo in 0..hi {
            // hi -> lo leaves hi and feeds lo
            let down = rates.downward(problem, hi, lo);
            matrix[[hi, hi]] += down;
            matrix[[lo, hi]] -= down;

            let up = rates.upward(hi, lo);
            matrix[[lo, lo]] += up;
            matrix[[hi, lo]] -= up;
        }
    }

    for level in 0..n_active {
        matrix[[level, level]] += problem.sink_rate(level);
        rhs[level] = problem.source_rate(level);
    }

    matrix.row_mut(0).fill(1.0);
    rhs[0] = problem.abundance;

    (matrix, rhs)
}
