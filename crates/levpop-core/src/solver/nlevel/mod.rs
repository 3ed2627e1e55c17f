//! General N-level statistical-equilibrium solver.
//!
//! The atom is described by an [`NLevelProblem`]: a [`LevelSet`], the
//! per-transition radiative data in exact-size [`TransitionGrid`]s, electron
//! collision data and optional external sources and sinks. A solve runs
//! these steps:
//!
//! 1. Drop top levels that can be neither collisionally nor radiatively
//!    reached at this temperature; they keep zero population.
//! 2. Evaluate Boltzmann factors, collision rates and pump rates
//!    ([`assembly::RateTables`]).
//! 3. Assemble the balance matrix with the conservation row
//!    ([`assembly::assemble_balance_matrix`]) and solve it by LU
//!    ([`direct::solve_direct`]).
//! 4. Derive departure coefficients and split every transition's energy
//!    exchange into non-negative cooling and heating.
//!
//! With [`SolverOptions::lte`] the linear solve is skipped and the levels are
//! filled from the partition function instead.

pub mod assembly;
pub mod direct;

use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};

use crate::cooling::{split_level_exchange, EnergyExchange};
use crate::model::{CollisionData, DirectedRate, LevelSet, TransitionGrid};
use crate::physics::{Conditions, SMALLFLOAT};
use crate::solver::{PopulationStatus, SolvedState, SolverError, SolverOptions};

use assembly::{assemble_balance_matrix, RateTables};

/// Relative size below which a negative population is rounding noise.
const NEGATIVE_POPULATION_TOLERANCE: f64 = 1.0e-10;

/// Input of one N-level solve.
///
/// All grids are keyed `(hi, lo)`. `pump` holds the upward rate `lo → hi`;
/// the induced downward rate is derived from the statistical weights.
#[derive(Debug, Clone, PartialEq)]
pub struct NLevelProblem {
    /// Species label used in logs and errors.
    pub label: String,
    /// Total population of the species (cm⁻³).
    pub abundance: f64,
    pub levels: LevelSet,
    /// Radiative decay times escape probability, `A Pesc` (s⁻¹).
    pub escape: TransitionGrid<f64>,
    /// Radiative decay times destruction probability, `A Pdest` (s⁻¹).
    pub destruction: TransitionGrid<f64>,
    /// Continuum pumping `lo → hi` (s⁻¹).
    pub pump: TransitionGrid<f64>,
    pub collisions: CollisionData,
    /// External creation rate per level (cm⁻³ s⁻¹). Empty means none.
    pub source: Vec<f64>,
    /// External destruction rate per level (s⁻¹). Empty means none.
    pub sink: Vec<f64>,
}

impl NLevelProblem {
    /// A problem with every rate zero and no sources or sinks.
    pub fn new(label: impl Into<String>, abundance: f64, levels: LevelSet) -> Self {
        let n = levels.len();
        Self {
            label: label.into(),
            abundance,
            levels,
            escape: TransitionGrid::new(n),
            destruction: TransitionGrid::new(n),
            pump: TransitionGrid::new(n),
            collisions: CollisionData::Strengths(TransitionGrid::new(n)),
            source: Vec::new(),
            sink: Vec::new(),
        }
    }

    pub fn n_levels(&self) -> usize {
        self.levels.len()
    }

    /// Set the radiative data of one transition.
    pub fn set_radiative(
        &mut self,
        hi: usize,
        lo: usize,
        escape: f64,
        destruction: f64,
        pump: f64,
    ) -> Result<(), SolverError> {
        self.escape.set(hi, lo, escape)?;
        self.destruction.set(hi, lo, destruction)?;
        self.pump.set(hi, lo, pump)
    }

    /// Set the collision strength of one transition.
    ///
    /// Fails if the problem carries precomputed collision rates.
    pub fn set_collision_strength(&mut self, hi: usize, lo: usize, omega: f64) -> Result<(), SolverError> {
        match &mut self.collisions {
            CollisionData::Strengths(grid) => grid.set(hi, lo, omega),
            CollisionData::Rates(_) => Err(SolverError::InvalidInput(format!(
                "{} carries precomputed collision rates",
                self.label
            ))),
        }
    }

    pub fn source_rate(&self, level: usize) -> f64 {
        self.source.get(level).copied().unwrap_or(0.0)
    }

    pub fn sink_rate(&self, level: usize) -> f64 {
        self.sink.get(level).copied().unwrap_or(0.0)
    }

    fn validate(&self) -> Result<(), SolverError> {
        let n = self.n_levels();
        if n < 2 {
            return Err(SolverError::InvalidInput(format!(
                "{} needs at least two levels, has {n}",
                self.label
            )));
        }
        if !(self.abundance >= 0.0) || !self.abundance.is_finite() {
            return Err(SolverError::InvalidInput(format!(
                "{} has abundance {}",
                self.label, self.abundance
            )));
        }
        if self.levels.energy(0) != 0.0 {
            return Err(SolverError::InvalidInput(format!(
                "{} ground level has energy {}",
                self.label,
                self.levels.energy(0)
            )));
        }

        for size in [
            self.escape.n_levels(),
            self.destruction.n_levels(),
            self.pump.n_levels(),
            self.collisions.n_levels(),
        ] {
            if size != n {
                return Err(SolverError::DimensionMismatch {
                    expected: n,
                    actual: size,
                });
            }
        }
        for extra in [&self.source, &self.sink] {
            if !extra.is_empty() && extra.len() != n {
                return Err(SolverError::DimensionMismatch {
                    expected: n,
                    actual: extra.len(),
                });
            }
        }

        let grids = [
            ("escape rate", &self.escape),
            ("destruction rate", &self.destruction),
            ("pump rate", &self.pump),
        ];
        for (name, grid) in grids {
            if let Some((hi, lo, value)) = grid.find_invalid() {
                return Err(SolverError::InvalidRate {
                    quantity: format!("{} {name} ({hi}, {lo})", self.label),
                    value,
                });
            }
        }
        if let CollisionData::Strengths(omega) = &self.collisions {
            if let Some((hi, lo, value)) = omega.find_invalid() {
                return Err(SolverError::InvalidRate {
                    quantity: format!("{} collision strength ({hi}, {lo})", self.label),
                    value,
                });
            }
        }
        for (level, &rate) in self.source.iter().chain(self.sink.iter()).enumerate() {
            if !(rate >= 0.0) {
                return Err(SolverError::InvalidRate {
                    quantity: format!("{} source/sink entry {level}", self.label),
                    value: rate,
                });
            }
        }
        Ok(())
    }

    /// Number of levels left after dropping unreachable top levels.
    fn active_levels(&self, rates: &RateTables) -> usize {
        let mut n = self.n_levels();
        while n > 1 {
            let top = n - 1;
            let reach = rates.boltzmann.get(top, 0) + self.pump.get(top, 0);
            if reach < SMALLFLOAT && self.source_rate(top) == 0.0 {
                n -= 1;
            } else {
                break;
            }
        }
        n
    }
}

/// Energy exchange of one transition of a solved atom.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LineExchange {
    pub hi: usize,
    pub lo: usize,
    pub exchange: EnergyExchange,
    /// Contribution to the cooling temperature derivative.
    pub derivative: f64,
}

/// Result of an N-level solve.
#[derive(Debug, Clone, PartialEq)]
pub struct NLevelSolution {
    pub state: SolvedState,
    /// Per-transition exchange of the active levels, ordered by `hi` then
    /// `lo`.
    pub lines: Vec<LineExchange>,
    /// Collision rates used in the solve, over all levels.
    pub collision_rates: TransitionGrid<DirectedRate>,
}

impl NLevelSolution {
    /// Exchange of the `hi → lo` transition, if it was active.
    pub fn line(&self, hi: usize, lo: usize) -> Option<&LineExchange> {
        self.lines.iter().find(|l| l.hi == hi && l.lo == lo)
    }
}

/// Solve the statistical equilibrium of an N-level atom.
///
/// Returns [`SolverError::SingularSystem`] when an excited level has no way
/// out of the rate network or the balance matrix cannot be factorised, and the usual validation errors for malformed atomic
/// data. Negative populations and the too-cold case are reported through the
/// state's [`PopulationStatus`].
pub fn solve_nlevel(
    problem: &NLevelProblem,
    cond: &Conditions,
    options: &SolverOptions,
) -> Result<NLevelSolution, SolverError> {
    problem.validate()?;
    let n_levels = problem.n_levels();
    let rates = RateTables::evaluate(problem, cond)?;
    let n_active = problem.active_levels(&rates);

    if problem.abundance == 0.0 || n_active == 1 {
        let status = if n_active == 1 && problem.abundance > 0.0 {
            log::trace!("{}: too cold, all population in ground", problem.label);
            PopulationStatus::TooCold
        } else {
            PopulationStatus::Normal
        };
        return Ok(NLevelSolution {
            state: SolvedState::ground_only(n_levels, problem.abundance, status),
            lines: Vec::new(),
            collision_rates: rates.collisions,
        });
    }

    if options.debug {
        log_rate_tables(problem, &rates, cond);
    }

    let (mut populations, departure, lines) = if options.lte {
        solve_lte(problem, &rates, cond, n_active)
    } else {
        check_depopulation(problem, &rates, n_active)?;
        let (matrix, rhs) = assemble_balance_matrix(problem, &rates, n_active);
        if options.debug {
            log::debug!("{} balance matrix:\n{:.4e}", problem.label, matrix);
            log::debug!("{} right-hand side: {:.4e}", problem.label, rhs);
        }
        let solution = direct::solve_direct(&matrix, &rhs, &problem.label)?;
        let populations = solution.to_vec();
        let departure = departure_coefficients(problem, &rates, &populations);
        let lines = split_exchange(problem, &rates, cond, &populations);
        (populations, departure, lines)
    };

    let status = check_populations(&mut populations, problem.abundance, &problem.label);

    populations.resize(n_levels, 0.0);
    let mut departure = departure;
    departure.resize(n_levels, 0.0);

    if options.debug {
        log::debug!("{} populations: {:.3e}", problem.label, ArrayView1::from(&populations));
        log::debug!("{} departure coefficients: {:.3e}", problem.label, ArrayView1::from(&departure));
    }

    let total = lines
        .iter()
        .fold(EnergyExchange::default(), |acc, l| acc + l.exchange);
    let cooling_derivative = lines.iter().map(|l| l.derivative).sum();

    Ok(NLevelSolution {
        state: SolvedState {
            populations,
            departure,
            cooling: total.cooling,
            heating: total.heating,
            cooling_derivative,
            status,
        },
        lines,
        collision_rates: rates.collisions,
    })
}

/// Every active excited level needs a way out, otherwise the balance system
/// traps all of the population in it.
fn check_depopulation(problem: &NLevelProblem, rates: &RateTables, n_active: usize) -> Result<(), SolverError> {
    for level in 1..n_active {
        let out = rates.depopulation(problem, level, n_active);
        if !(out > 0.0) {
            log::warn!("{}: level {level} has no depopulation route", problem.label);
            return Err(SolverError::SingularSystem {
                label: problem.label.clone(),
            });
        }
    }
    Ok(())
}

/// Departure coefficients of the active levels relative to ground.
fn departure_coefficients(problem: &NLevelProblem, rates: &RateTables, populations: &[f64]) -> Vec<f64> {
    let n = populations.len();
    let mut departure = vec![0.0; n];
    departure[0] = 1.0;
    if populations[0] > SMALLFLOAT && *rates.boltzmann.get(n - 1, 0) > SMALLFLOAT {
        let g0 = problem.levels.weight(0);
        for hi in 1..n {
            departure[hi] = (populations[hi] / populations[0]) * (g0 / problem.levels.weight(hi))
                / rates.boltzmann.get(hi, 0);
        }
    }
    departure
}

/// Non-negative cooling/heating split of every active transition.
fn split_exchange(
    problem: &NLevelProblem,
    rates: &RateTables,
    cond: &Conditions,
    populations: &[f64],
) -> Vec<LineExchange> {
    let levels = &problem.levels;
    let mut lines = Vec::with_capacity(populations.len() * (populations.len() - 1) / 2);
    for hi in 1..populations.len() {
        for lo in 0..hi {
            let collisions = rates.collisions.get(hi, lo);
            let exchange = split_level_exchange(
                levels.transition_energy_erg(hi, lo),
                populations[lo],
                populations[hi],
                collisions.up,
                collisions.down,
                rates.pump.get(hi, lo).up,
            );
            lines.push(LineExchange {
                hi,
                lo,
                exchange,
                derivative: cond.cooling_derivative(exchange.cooling, levels.energy_kelvin(hi)),
            });
        }
    }
    lines
}

/// Populations, departure coefficients and radiative exchange in LTE.
fn solve_lte(
    problem: &NLevelProblem,
    rates: &RateTables,
    cond: &Conditions,
    n_active: usize,
) -> (Vec<f64>, Vec<f64>, Vec<LineExchange>) {
    let levels = &problem.levels;
    let inv_t_sq = cond.inverse_temperature_sq();

    // Boltzmann-weighted level terms and their temperature derivatives
    let weighted: Vec<f64> = (0..n_active)
        .map(|i| {
            if i == 0 {
                levels.weight(0)
            } else {
                levels.weight(i) * rates.boltzmann.get(i, 0)
            }
        })
        .collect();
    let d_weighted: Vec<f64> = (0..n_active)
        .map(|i| weighted[i] * levels.energy_kelvin(i) * inv_t_sq)
        .collect();
    let partition: f64 = weighted.iter().sum();
    let d_partition: f64 = d_weighted.iter().sum();

    let abundance = problem.abundance;
    let populations: Vec<f64> = weighted.iter().map(|w| abundance * w / partition).collect();
    let d_populations: Vec<f64> = (0..n_active)
        .map(|i| abundance * (d_weighted[i] * partition - d_partition * weighted[i]) / (partition * partition))
        .collect();

    let mut lines = Vec::new();
    for hi in 1..n_active {
        for lo in 0..hi {
            let energy = levels.transition_energy_erg(hi, lo);
            let pump = rates.pump.get(hi, lo);
            let emission = problem.escape.get(hi, lo) + pump.down;
            let exchange = EnergyExchange {
                cooling: populations[hi] * emission * energy,
                heating: populations[lo] * pump.up * energy,
            };
            lines.push(LineExchange {
                hi,
                lo,
                exchange,
                derivative: d_populations[hi] * emission * energy,
            });
        }
    }

    (populations, vec![1.0; n_active], lines)
}

/// Reset rounding-level negative populations and count the real ones.
fn check_populations(populations: &mut [f64], abundance: f64, label: &str) -> PopulationStatus {
    let mut count = 0;
    for pop in populations.iter_mut().filter(|p| **p < 0.0) {
        if (*pop / abundance).abs() > NEGATIVE_POPULATION_TOLERANCE {
            count += 1;
        } else {
            *pop = SMALLFLOAT;
        }
    }
    if count == 0 {
        return PopulationStatus::Normal;
    }

    log::warn!(
        "{label}: {count} negative level population(s): {:.2e}",
        ArrayView1::from(&*populations)
    );
    for pop in populations.iter_mut() {
        *pop = pop.max(0.0);
    }
    PopulationStatus::NegativePopulation { count }
}

fn log_rate_tables(problem: &NLevelProblem, rates: &RateTables, cond: &Conditions) {
    log::debug!(
        "{}: N-level solve with abundance {:.3e} at T = {:.4e} K",
        problem.label,
        problem.abundance,
        cond.temperature
    );
    for (hi, lo, escape) in problem.escape.iter() {
        let collisions = rates.collisions.get(hi, lo);
        log::debug!(
            "  {hi:>3} -> {lo:<3} A*esc {:10.2e}  dest {:10.2e}  pump {:10.2e}  C_up {:10.2e}  C_down {:10.2e}  boltz {:10.2e}",
            escape,
            problem.destruction.get(hi, lo),
            problem.pump.get(hi, lo),
            collisions.up,
            collisions.down,
            rates.boltzmann.get(hi, lo)
        );
    }
}
