//! Closed-form two-level atom.
//!
//! With only a ground and an excited level the balance equation
//! `n₁ (C₁₂ + P) = n₂ (A + C₂₁ + R₂₁)` has an explicit solution, so there is
//! no matrix to build. [`two_level_population`] is the bare kernel used by
//! species routines that only need the excited population;
//! [`solve_two_level_line`] is the full line-driven version that also handles
//! pumping, induced emission and the cooling/heating bookkeeping.

use crate::cooling::{CoolingLedger, PairRates};
use crate::model::{DirectedRate, LineTransition};
use crate::physics::{boltzmann_factor, Conditions};
use crate::solver::{PopulationStatus, SolvedState, SolverError};

/// `E/kT` beyond which the excited level is taken as empty.
const MAX_EXCITATION_RATIO: f64 = 15.0;

/// Threshold of the rough "is the upper level populated at all" test.
const ROUGH_POPULATION_FLOOR: f64 = 1e-25;

/// Threshold on `Ω × abundance` below which the line is skipped.
const STRENGTH_ABUNDANCE_FLOOR: f64 = 1e-30;

/// Floor on the Boltzmann factor and population for a departure coefficient.
const DEPARTURE_FLOOR: f64 = 1e-20;

/// Ratio `n₁/n₂` of a purely collisional two-level atom, or `None` when the
/// excited level is negligibly populated or has no collisional way in.
fn lower_to_upper_ratio(
    omega: f64,
    g1: f64,
    g2: f64,
    a21: f64,
    energy_k: f64,
    abundance: f64,
    cond: &Conditions,
) -> Option<f64> {
    if abundance == 0.0 || energy_k / cond.temperature > MAX_EXCITATION_RATIO {
        return None;
    }
    assert!(omega > 0.0, "collision strength must be positive, got {omega}");
    assert!(g1 > 0.0 && g2 > 0.0, "statistical weights must be positive");

    let boltz = boltzmann_factor(energy_k / cond.temperature);
    let rate = cond.collision_factor * omega;
    let up = rate / g1 * boltz;
    if !(up > 0.0) {
        return None;
    }
    let down = rate / g2;
    Some((a21 + down) / up)
}

/// Population of the excited level of a two-level atom (cm⁻³).
///
/// `a21` is the net escape rate `A (Pesc + Pelec_esc + Pdest)` and
/// `energy_k` the excitation energy in Kelvin. Returns 0 when `abundance`
/// is zero or collisions cannot excite the upper level, which includes a
/// negligible Boltzmann factor (`E/kT > 15`).
///
/// # Panics
///
/// Panics if `omega` or either statistical weight is not positive, since that
/// can only come from a broken atomic-data table.
pub fn two_level_population(
    omega: f64,
    g1: f64,
    g2: f64,
    a21: f64,
    energy_k: f64,
    abundance: f64,
    cond: &Conditions,
) -> f64 {
    match lower_to_upper_ratio(omega, g1, g2, a21, energy_k, abundance, cond) {
        Some(r) => abundance / (r + 1.0),
        None => 0.0,
    }
}

/// Emission rate `n₂ A₂₁` of a two-level atom (photons cm⁻³ s⁻¹).
///
/// Same early exits and preconditions as [`two_level_population`].
pub fn two_level_emission(
    omega: f64,
    g1: f64,
    g2: f64,
    a21: f64,
    energy_k: f64,
    abundance: f64,
    cond: &Conditions,
) -> f64 {
    match lower_to_upper_ratio(omega, g1, g2, a21, energy_k, abundance, cond) {
        Some(r) => abundance * a21 / (r + 1.0),
        None => 0.0,
    }
}

/// Solve a two-level atom driven by one radiative line.
///
/// Includes continuum pumping and the induced emission it implies. The line's
/// cooling is recorded in `ledger` under its label and wavelength, the heating
/// split off by pumping and the cooling temperature derivative are
/// accumulated there too.
///
/// When a rough estimate says the upper level is empty the atom is returned
/// in the ground level with [`PopulationStatus::TooCold`] and nothing is
/// recorded.
pub fn solve_two_level_line(
    line: &LineTransition,
    abundance: f64,
    cond: &Conditions,
    ledger: &mut dyn CoolingLedger,
) -> Result<SolvedState, SolverError> {
    let rough_boltz = cond.boltzmann(line.energy_k);
    let rough = (rough_boltz * cond.collision_factor + line.pump)
        / (cond.collision_factor + line.a_ul);
    if line.collision_strength * abundance < STRENGTH_ABUNDANCE_FLOOR
        || !(rough >= ROUGH_POPULATION_FLOOR)
    {
        log::trace!(
            "{} {:.1}: upper level negligible, skipping",
            line.label,
            line.wavelength
        );
        return Ok(SolvedState::ground_only(2, abundance, PopulationStatus::TooCold));
    }

    let a21 = line.net_escape_rate()?;
    if !(line.energy_k > 0.0) {
        return Err(SolverError::InvalidInput(format!(
            "{} {:.1} has excitation energy {}",
            line.label, line.wavelength, line.energy_k
        )));
    }
    let boltz = cond.boltzmann(line.energy_k);
    let pump = line.pump_rates()?;
    let collisions = DirectedRate::from_collision_strength(
        line.collision_strength,
        line.g_lo,
        line.g_hi,
        boltz,
        cond.collision_factor,
    )?;

    let rates = PairRates {
        energy_erg: line.energy_erg(),
        pair_population: abundance,
        collisional_up: collisions.up,
        collisional_down: collisions.down,
        radiative_escape: a21,
        induced_down: pump.down,
        pump: pump.up,
    };

    // n_lo / n_hi
    let r = (a21 + collisions.down + pump.down) / rates.total_excitation();
    let upper = abundance / (r + 1.0);
    let lower = upper * r;

    let departure = if boltz > DEPARTURE_FLOOR && upper > DEPARTURE_FLOOR {
        (upper / lower) / (boltz * line.g_hi / line.g_lo)
    } else {
        0.0
    };

    let exchange = rates.split();
    let derivative = cond.cooling_derivative(exchange.cooling, line.energy_k);
    ledger.add_line(&line.label, line.wavelength, exchange, derivative);

    Ok(SolvedState {
        populations: vec![lower, upper],
        departure: vec![1.0, departure],
        cooling: exchange.cooling,
        heating: exchange.heating,
        cooling_derivative: derivative,
        status: PopulationStatus::Normal,
    })
}
