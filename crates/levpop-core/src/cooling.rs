//! Collisional cooling/heating split and the coolant ledger.
//!
//! A line that is pumped by an external continuum can heat the gas: the
//! pumped upper level is collisionally de-excited and hands its energy to the
//! electrons. Writing the energy exchange as a single net "cooling" lets that
//! number go negative, which the outer thermal solver handles badly. The
//! split here instead returns two terms that are each non-negative by
//! construction and whose difference is the net exchange.
//!
//! The [`CoolingLedger`] trait is the sink that solvers report coolants to,
//! one entry per named line; [`CoolingStack`] is the in-memory ledger used by
//! the CLI and the tests.

use serde::{Deserialize, Serialize};

/// Energy exchanged with the gas by one transition (erg cm⁻³ s⁻¹).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EnergyExchange {
    /// Energy taken out of the thermal pool, never negative.
    pub cooling: f64,
    /// Energy returned to the thermal pool, never negative.
    pub heating: f64,
}

impl EnergyExchange {
    /// `cooling - heating`.
    pub fn net(&self) -> f64 {
        self.cooling - self.heating
    }
}

impl std::ops::Add for EnergyExchange {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            cooling: self.cooling + rhs.cooling,
            heating: self.heating + rhs.heating,
        }
    }
}

impl std::ops::AddAssign for EnergyExchange {
    fn add_assign(&mut self, rhs: Self) {
        self.cooling += rhs.cooling;
        self.heating += rhs.heating;
    }
}

/// Rates of an isolated two-level pair.
///
/// All rates are per second and must be non-negative.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PairRates {
    /// Transition energy (erg).
    pub energy_erg: f64,
    /// Combined population of the two levels (cm⁻³).
    pub pair_population: f64,
    /// Collisional excitation `lo → hi`.
    pub collisional_up: f64,
    /// Collisional de-excitation `hi → lo`.
    pub collisional_down: f64,
    /// Net radiative decay, `A (Pesc + Pelec_esc + Pdest)`.
    pub radiative_escape: f64,
    /// Induced emission driven by the pumping continuum.
    pub induced_down: f64,
    /// Continuum pumping `lo → hi`.
    pub pump: f64,
}

impl PairRates {
    /// Collisional plus radiative excitation out of the lower level.
    pub fn total_excitation(&self) -> f64 {
        self.collisional_up + self.pump
    }

    /// Split the exchange into non-negative cooling and heating terms.
    ///
    /// ```text
    /// D       = A + C_down + R_ind + C_up + P
    /// cooling = E n C_up (A + R_ind) / D
    /// heating = E n C_down P / D
    /// ```
    ///
    /// Their difference equals `E (n_lo C_up - n_hi C_down)` with the pair's
    /// equilibrium populations.
    pub fn split(&self) -> EnergyExchange {
        let denominator = self.radiative_escape
            + self.collisional_down
            + self.induced_down
            + self.total_excitation();
        if !(denominator > 0.0) {
            return EnergyExchange::default();
        }
        let scale = self.energy_erg * self.pair_population / denominator;
        EnergyExchange {
            cooling: scale * self.collisional_up * (self.radiative_escape + self.induced_down),
            heating: scale * self.collisional_down * self.pump,
        }
    }
}

/// Split the exchange of one transition inside a multi-level atom.
///
/// `EnrLU = n_lo C_up E` and `EnrUL = n_hi C_down E`. The collisional fraction
/// `f = C_up / (C_up + P)` of the de-excitations is charged against cooling
/// and the rest is heating. When cascades from higher levels make the cooling
/// term negative, the deficit is moved into heating so that both terms stay
/// non-negative and their difference is still `EnrLU - EnrUL`.
pub fn split_level_exchange(
    energy_erg: f64,
    population_lo: f64,
    population_hi: f64,
    collisional_up: f64,
    collisional_down: f64,
    pump: f64,
) -> EnergyExchange {
    let total = collisional_up + pump;
    let collisional_fraction = if total > 0.0 { collisional_up / total } else { 0.0 };
    split_exchange(
        population_lo * collisional_up * energy_erg,
        population_hi * collisional_down * energy_erg,
        collisional_fraction,
    )
}

/// Split collisional excitation and de-excitation energy rates given the
/// fraction of upward transitions that are collisional.
///
/// Used directly by sequence atoms that lump several transitions into one
/// coolant.
pub fn split_exchange(excitation: f64, deexcitation: f64, collisional_fraction: f64) -> EnergyExchange {
    let cooling = excitation - deexcitation * collisional_fraction;
    let heating = deexcitation * (1.0 - collisional_fraction);
    if cooling < 0.0 {
        EnergyExchange {
            cooling: 0.0,
            heating: heating - cooling,
        }
    } else {
        EnergyExchange { cooling, heating }
    }
}

/// Sink for coolants, heating and the cooling derivative.
pub trait CoolingLedger {
    /// Record one named coolant at its representative wavelength (Å).
    fn add_coolant(&mut self, label: &str, wavelength: f64, cooling: f64);

    /// Record heating split off a coolant.
    fn add_heating(&mut self, heating: f64);

    /// Accumulate into $d\,\mathrm{cool}/dT$.
    fn add_derivative(&mut self, derivative: f64);

    /// Record a line's exchange and derivative in one go.
    fn add_line(&mut self, label: &str, wavelength: f64, exchange: EnergyExchange, derivative: f64) {
        self.add_coolant(label, wavelength, exchange.cooling);
        self.add_heating(exchange.heating);
        self.add_derivative(derivative);
    }
}

/// A single ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coolant {
    pub label: String,
    /// Wavelength (Å), zero for non-line coolants.
    pub wavelength: f64,
    /// Cooling (erg cm⁻³ s⁻¹).
    pub cooling: f64,
}

/// In-memory cooling ledger for one zone evaluation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoolingStack {
    entries: Vec<Coolant>,
    heating: f64,
    derivative: f64,
}

impl CoolingStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear every entry and total before a new evaluation.
    pub fn zero(&mut self) {
        self.entries.clear();
        self.heating = 0.0;
        self.derivative = 0.0;
    }

    pub fn entries(&self) -> &[Coolant] {
        &self.entries
    }

    pub fn total_cooling(&self) -> f64 {
        self.entries.iter().map(|c| c.cooling).sum()
    }

    pub fn total_heating(&self) -> f64 {
        self.heating
    }

    pub fn cooling_derivative(&self) -> f64 {
        self.derivative
    }

    /// Entry with the largest cooling, if any.
    pub fn strongest(&self) -> Option<&Coolant> {
        self.entries
            .iter()
            .max_by(|a, b| a.cooling.total_cmp(&b.cooling))
    }
}

impl CoolingLedger for CoolingStack {
    fn add_coolant(&mut self, label: &str, wavelength: f64, cooling: f64) {
        self.entries.push(Coolant {
            label: label.to_string(),
            wavelength,
            cooling,
        });
    }

    fn add_heating(&mut self, heating: f64) {
        self.heating += heating;
    }

    fn add_derivative(&mut self, derivative: f64) {
        self.derivative += derivative;
    }
}
