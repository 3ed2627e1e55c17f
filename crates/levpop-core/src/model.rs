//! Level and transition data model.
//!
//! A model atom is a [`LevelSet`] (statistical weights and excitation
//! energies) plus per-transition data stored in [`TransitionGrid`]s. Every
//! grid is keyed by an ordered pair `(hi, lo)` with `hi > lo`; only the
//! upward or downward direction that carries primary data is ever stored and
//! the other one is derived through [`DirectedRate`].

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::physics::{boltzmann_factor, Conditions, ExcitationUnits, BOLTZMANN};
use crate::solver::SolverError;

/// A single bound level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Level {
    /// Statistical weight `g` (must be positive).
    pub weight: f64,
    /// Excitation energy relative to the ground level, in the units of the
    /// owning [`LevelSet`].
    pub energy: f64,
}

impl Level {
    pub fn new(weight: f64, energy: f64) -> Self {
        Self { weight, energy }
    }
}

/// An ordered set of levels, index 0 being the ground level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelSet {
    levels: Vec<Level>,
    units: ExcitationUnits,
}

impl LevelSet {
    /// Build a level set, rejecting non-positive statistical weights and
    /// non-finite energies.
    pub fn new(levels: Vec<Level>, units: ExcitationUnits) -> Result<Self, SolverError> {
        for (i, level) in levels.iter().enumerate() {
            if !(level.weight > 0.0) || !level.weight.is_finite() {
                return Err(SolverError::InvalidRate {
                    quantity: format!("statistical weight of level {i}"),
                    value: level.weight,
                });
            }
            if !level.energy.is_finite() || level.energy < 0.0 {
                return Err(SolverError::InvalidInput(format!(
                    "level {i} has excitation energy {}",
                    level.energy
                )));
            }
        }
        Ok(Self { levels, units })
    }

    /// Build a level set from parallel weight and energy slices.
    pub fn from_slices(
        weights: &[f64],
        energies: &[f64],
        units: ExcitationUnits,
    ) -> Result<Self, SolverError> {
        if weights.len() != energies.len() {
            return Err(SolverError::DimensionMismatch {
                expected: weights.len(),
                actual: energies.len(),
            });
        }
        let levels = weights
            .iter()
            .zip(energies)
            .map(|(&g, &e)| Level::new(g, e))
            .collect();
        Self::new(levels, units)
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn units(&self) -> ExcitationUnits {
        self.units
    }

    pub fn levels(&self) -> &[Level] {
        &self.levels
    }

    pub fn weight(&self, level: usize) -> f64 {
        self.levels[level].weight
    }

    /// Excitation energy in the set's own units.
    pub fn energy(&self, level: usize) -> f64 {
        self.levels[level].energy
    }

    /// Excitation energy relative to ground in Kelvin.
    pub fn energy_kelvin(&self, level: usize) -> f64 {
        self.units.to_kelvin(self.levels[level].energy)
    }

    /// Energy of the `hi → lo` transition in erg.
    pub fn transition_energy_erg(&self, hi: usize, lo: usize) -> f64 {
        (self.energy_kelvin(hi) - self.energy_kelvin(lo)) * BOLTZMANN
    }

    /// Boltzmann factor $e^{-(E_{hi}-E_{lo})/kT}$ for the pair.
    pub fn boltzmann(&self, lo: usize, hi: usize, cond: &Conditions) -> f64 {
        boltzmann_factor((self.energy_kelvin(hi) - self.energy_kelvin(lo)) / cond.temperature)
    }

    /// Downward collisional rate from a stored upward one:
    /// `down = up * g_lo / g_hi`.
    ///
    /// Any Boltzmann factor is expected to be folded into the stored
    /// coefficient already.
    pub fn collisional_down_rate(&self, hi: usize, lo: usize, up: f64) -> Result<f64, SolverError> {
        Ok(DirectedRate::from_up(up, self.weight(lo), self.weight(hi))?.down)
    }

    /// Upward collisional rate from a stored downward one:
    /// `up = down * g_hi / g_lo`.
    pub fn collisional_up_rate(&self, lo: usize, hi: usize, down: f64) -> Result<f64, SolverError> {
        Ok(DirectedRate::from_down(down, self.weight(lo), self.weight(hi))?.up)
    }
}

/// A rate between two levels in both directions, with the missing direction
/// derived from the stored one and the statistical-weight ratio.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DirectedRate {
    /// Rate `lo → hi` (s⁻¹).
    pub up: f64,
    /// Rate `hi → lo` (s⁻¹).
    pub down: f64,
}

impl DirectedRate {
    /// From an upward rate: `down = up * g_lo / g_hi`.
    pub fn from_up(up: f64, g_lo: f64, g_hi: f64) -> Result<Self, SolverError> {
        check_weights(g_lo, g_hi)?;
        check_rate("upward rate", up)?;
        Ok(Self {
            up,
            down: up * g_lo / g_hi,
        })
    }

    /// From a downward rate: `up = down * g_hi / g_lo`.
    pub fn from_down(down: f64, g_lo: f64, g_hi: f64) -> Result<Self, SolverError> {
        check_weights(g_lo, g_hi)?;
        check_rate("downward rate", down)?;
        Ok(Self {
            up: down * g_hi / g_lo,
            down,
        })
    }

    /// Electron-impact rates from a collision strength.
    ///
    /// `down = Ω · cf / g_hi`, `up = down · (g_hi/g_lo) · boltz`.
    pub fn from_collision_strength(
        omega: f64,
        g_lo: f64,
        g_hi: f64,
        boltz: f64,
        collision_factor: f64,
    ) -> Result<Self, SolverError> {
        check_rate("collision strength", omega)?;
        let down = omega * collision_factor / g_hi;
        let mut rate = Self::from_down(down, g_lo, g_hi)?;
        rate.up *= boltz;
        Ok(rate)
    }
}

fn check_weights(g_lo: f64, g_hi: f64) -> Result<(), SolverError> {
    for g in [g_lo, g_hi] {
        if !(g > 0.0) {
            return Err(SolverError::InvalidRate {
                quantity: "statistical weight".into(),
                value: g,
            });
        }
    }
    Ok(())
}

fn check_rate(quantity: &str, value: f64) -> Result<(), SolverError> {
    if !(value >= 0.0) || !value.is_finite() {
        return Err(SolverError::InvalidRate {
            quantity: quantity.into(),
            value,
        });
    }
    Ok(())
}

/// Exact-size storage for per-transition data of an N-level atom.
///
/// Cells are addressed by `(hi, lo)` with `hi > lo`; the lower triangle of a
/// contiguous N×N buffer holds the data. Addressing a pair with `hi <= lo`
/// or an index outside the atom panics (`get`) or is rejected (`set`).
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionGrid<T> {
    cells: Array2<T>,
}

impl<T: Clone + Default> TransitionGrid<T> {
    /// A grid for `n_levels` levels, every cell at `T::default()`.
    pub fn new(n_levels: usize) -> Self {
        Self {
            cells: Array2::from_elem((n_levels, n_levels), T::default()),
        }
    }

    pub fn n_levels(&self) -> usize {
        self.cells.nrows()
    }

    /// Data for the `hi → lo` pair.
    pub fn get(&self, hi: usize, lo: usize) -> &T {
        assert!(hi > lo, "transition ({hi}, {lo}) must have hi > lo");
        &self.cells[[hi, lo]]
    }

    /// Data for the pair, or `None` when the pair is not a valid transition.
    pub fn try_get(&self, hi: usize, lo: usize) -> Option<&T> {
        if hi > lo {
            self.cells.get([hi, lo])
        } else {
            None
        }
    }

    /// Store data for the `hi → lo` pair.
    pub fn set(&mut self, hi: usize, lo: usize, value: T) -> Result<(), SolverError> {
        if hi <= lo || hi >= self.n_levels() {
            return Err(SolverError::InvalidInput(format!(
                "transition ({hi}, {lo}) is not an ordered pair inside a {}-level atom",
                self.n_levels()
            )));
        }
        self.cells[[hi, lo]] = value;
        Ok(())
    }

    /// Iterate over `(hi, lo, value)` for every `hi > lo` pair.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, &T)> + '_ {
        let n = self.n_levels();
        (1..n).flat_map(move |hi| (0..hi).map(move |lo| (hi, lo, &self.cells[[hi, lo]])))
    }
}

impl TransitionGrid<f64> {
    /// Build a grid from a closure evaluated on every `(hi, lo)` pair.
    pub fn from_fn(n_levels: usize, mut f: impl FnMut(usize, usize) -> f64) -> Self {
        let mut grid = Self::new(n_levels);
        for hi in 1..n_levels {
            for lo in 0..hi {
                grid.cells[[hi, lo]] = f(hi, lo);
            }
        }
        grid
    }

    /// Index of the first negative or non-finite cell, if any.
    pub fn find_invalid(&self) -> Option<(usize, usize, f64)> {
        self.iter()
            .find(|&(_, _, v)| !(*v >= 0.0) || !v.is_finite())
            .map(|(hi, lo, v)| (hi, lo, *v))
    }
}

/// Electron-impact data for an N-level atom.
#[derive(Debug, Clone, PartialEq)]
pub enum CollisionData {
    /// Dimensionless collision strengths Ω; rates are derived per call from
    /// the collision factor and Boltzmann factors.
    Strengths(TransitionGrid<f64>),
    /// Rates already evaluated by the caller in both directions (s⁻¹).
    Rates(TransitionGrid<DirectedRate>),
}

impl CollisionData {
    pub fn n_levels(&self) -> usize {
        match self {
            CollisionData::Strengths(grid) => grid.n_levels(),
            CollisionData::Rates(grid) => grid.n_levels(),
        }
    }
}

/// One radiative line between a lower and an upper level, as handed over by
/// a species wire-up routine together with the radiative-transfer state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineTransition {
    /// Coolant label, e.g. `"C  3"`.
    pub label: String,
    /// Representative wavelength (Å).
    pub wavelength: f64,
    /// Transition energy (K).
    pub energy_k: f64,
    /// Statistical weight of the lower level.
    pub g_lo: f64,
    /// Statistical weight of the upper level.
    pub g_hi: f64,
    /// Einstein A (s⁻¹).
    pub a_ul: f64,
    /// Line escape probability.
    pub p_esc: f64,
    /// Escape probability through electron scattering.
    pub p_elec_esc: f64,
    /// Destruction probability by background opacity.
    pub p_dest: f64,
    /// Continuum pumping rate `lo → hi` (s⁻¹).
    pub pump: f64,
    /// Collision strength Ω.
    pub collision_strength: f64,
}

impl LineTransition {
    /// An optically thin, unpumped line.
    pub fn new(
        label: impl Into<String>,
        wavelength: f64,
        energy_k: f64,
        g_lo: f64,
        g_hi: f64,
        a_ul: f64,
        collision_strength: f64,
    ) -> Self {
        Self {
            label: label.into(),
            wavelength,
            energy_k,
            g_lo,
            g_hi,
            a_ul,
            p_esc: 1.0,
            p_elec_esc: 0.0,
            p_dest: 0.0,
            pump: 0.0,
            collision_strength,
        }
    }

    pub fn with_escape(mut self, p_esc: f64, p_elec_esc: f64, p_dest: f64) -> Self {
        self.p_esc = p_esc;
        self.p_elec_esc = p_elec_esc;
        self.p_dest = p_dest;
        self
    }

    pub fn with_pump(mut self, pump: f64) -> Self {
        self.pump = pump;
        self
    }

    /// Net radiative loss rate `A (Pesc + Pelec_esc + Pdest)` (s⁻¹).
    pub fn net_escape_rate(&self) -> Result<f64, SolverError> {
        if !(self.a_ul >= 0.0) {
            return Err(SolverError::InvalidRate {
                quantity: format!("Einstein A of {} {:.1}", self.label, self.wavelength),
                value: self.a_ul,
            });
        }
        Ok(self.a_ul * (self.p_esc + self.p_elec_esc + self.p_dest))
    }

    /// Rate of photons that leave the gas, `A (Pesc + Pelec_esc)` (s⁻¹).
    pub fn escaping_rate(&self) -> f64 {
        self.a_ul * (self.p_esc + self.p_elec_esc)
    }

    /// Rate of photons destroyed by background opacity, `A Pdest` (s⁻¹).
    pub fn destruction_rate(&self) -> f64 {
        self.a_ul * self.p_dest
    }

    /// Pumping in both directions; the induced downward rate follows from
    /// the statistical weights.
    pub fn pump_rates(&self) -> Result<DirectedRate, SolverError> {
        DirectedRate::from_up(self.pump, self.g_lo, self.g_hi)
    }

    /// Transition energy (erg).
    pub fn energy_erg(&self) -> f64 {
        self.energy_k * BOLTZMANN
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn three_levels() -> LevelSet {
        LevelSet::from_slices(&[9.0, 5.0, 1.0], &[0.0, 1.0e4, 2.5e4], ExcitationUnits::Kelvin)
            .unwrap()
    }

    #[test]
    fn test_down_rate_uses_weight_ratio() {
        let levels = three_levels();
        let down = levels.collisional_down_rate(1, 0, 5.0).unwrap();
        assert_relative_eq!(down, 5.0 * 9.0 / 5.0);
        let up = levels.collisional_up_rate(0, 1, down).unwrap();
        assert_relative_eq!(up, 5.0);
    }

    #[test]
    fn test_non_positive_weight_rejected() {
        let err = DirectedRate::from_up(1.0, 0.0, 3.0).unwrap_err();
        assert!(matches!(err, SolverError::InvalidRate { .. }));
        assert!(LevelSet::from_slices(&[1.0, -2.0], &[0.0, 1.0], ExcitationUnits::Kelvin).is_err());
    }

    #[test]
    fn test_collision_strength_detailed_balance() {
        // g_lo C_up = g_hi C_down exp(-E/kT)
        let boltz = (-2.0f64).exp();
        let rate = DirectedRate::from_collision_strength(2.0, 4.0, 6.0, boltz, 0.5).unwrap();
        assert_relative_eq!(rate.down, 2.0 * 0.5 / 6.0);
        assert_relative_eq!(4.0 * rate.up, 6.0 * rate.down * boltz, max_relative = 1e-14);
    }

    #[test]
    fn test_net_escape_rate() {
        let line = LineTransition::new("O  3", 5006.8, 2.874e4, 5.0, 5.0, 0.02, 2.0)
            .with_escape(0.5, 0.1, 0.2);
        assert_relative_eq!(line.net_escape_rate().unwrap(), 0.02 * 0.8, max_relative = 1e-14);
        assert_relative_eq!(line.escaping_rate(), 0.02 * 0.6, max_relative = 1e-14);

        let bad = LineTransition::new("bad", 1.0, 1.0, 1.0, 1.0, -1.0, 1.0);
        assert!(matches!(bad.net_escape_rate(), Err(SolverError::InvalidRate { .. })));
    }

    #[test]
    fn test_grid_enforces_ordered_pairs() {
        let mut grid = TransitionGrid::<f64>::new(3);
        grid.set(2, 0, 1.5).unwrap();
        assert_eq!(*grid.get(2, 0), 1.5);
        assert!(grid.set(0, 2, 1.0).is_err());
        assert!(grid.set(3, 1, 1.0).is_err());
        assert!(grid.try_get(1, 1).is_none());
        assert_eq!(grid.iter().count(), 3);
    }

    #[test]
    #[should_panic(expected = "must have hi > lo")]
    fn test_grid_get_rejects_reversed_pair() {
        let grid = TransitionGrid::<f64>::new(3);
        grid.get(0, 1);
    }

    #[test]
    fn test_find_invalid_cell() {
        let grid = TransitionGrid::from_fn(3, |hi, lo| if (hi, lo) == (2, 1) { -1.0 } else { 1.0 });
        assert_eq!(grid.find_invalid(), Some((2, 1, -1.0)));
    }
}
