//! Physical constants and per-call plasma conditions.
//!
//! The solvers never read global state: the local temperature and the
//! electron-collision coupling are handed in through [`Conditions`] on every
//! call, so the same solver can be evaluated for many zones at once.

use serde::{Deserialize, Serialize};

/// Boltzmann constant (erg K⁻¹).
pub const BOLTZMANN: f64 = 1.3806488e-16;

/// Planck constant (erg s).
pub const HPLANCK: f64 = 6.62606957e-27;

/// Speed of light (cm s⁻¹).
pub const SPEEDLIGHT: f64 = 2.99792458e10;

/// Energy of one wavenumber (erg per cm⁻¹).
pub const ERG1CM: f64 = HPLANCK * SPEEDLIGHT;

/// Temperature equivalent of one wavenumber (K per cm⁻¹).
pub const T1CM: f64 = HPLANCK * SPEEDLIGHT / BOLTZMANN;

/// Electron-impact rate constant: a collision strength Ω turns into a
/// de-excitation rate `COLL_CONST * n_e / sqrt(T) * Ω / g_hi` (s⁻¹).
pub const COLL_CONST: f64 = 8.629e-6;

/// Smallest rate or population treated as non-zero.
pub const SMALLFLOAT: f64 = f32::MIN_POSITIVE as f64;

/// Exponent beyond which `exp(-x)` is flushed to zero.
const BOLTZMANN_UNDERFLOW: f64 = 680.0;

/// Boltzmann factor $e^{-x}$, flushed to zero for very large `x`.
///
/// `x` is an energy over temperature ratio and must be non-negative for the
/// usual upward factor; negative values are allowed and simply evaluate the
/// exponential.
pub fn boltzmann_factor(x: f64) -> f64 {
    if x > BOLTZMANN_UNDERFLOW {
        0.0
    } else {
        (-x).exp()
    }
}

/// Unit tag for level excitation energies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExcitationUnits {
    /// Energies are given as temperatures (K).
    #[default]
    Kelvin,
    /// Energies are given in wavenumbers (cm⁻¹).
    Wavenumber,
}

impl ExcitationUnits {
    /// Factor converting an energy in these units to Kelvin.
    pub fn kelvin_per_unit(self) -> f64 {
        match self {
            ExcitationUnits::Kelvin => 1.0,
            ExcitationUnits::Wavenumber => T1CM,
        }
    }

    /// Convert an energy in these units to Kelvin.
    pub fn to_kelvin(self, energy: f64) -> f64 {
        energy * self.kelvin_per_unit()
    }

    /// Convert an energy in these units to erg.
    pub fn to_erg(self, energy: f64) -> f64 {
        self.to_kelvin(energy) * BOLTZMANN
    }
}

/// Local plasma conditions for one solver call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Conditions {
    /// Electron temperature (K).
    pub temperature: f64,
    /// Collision factor `COLL_CONST * n_e / sqrt(T)` (cm³ s⁻¹ × cm⁻³).
    ///
    /// Multiplying a collision strength by this and dividing by the upper
    /// statistical weight gives the collisional de-excitation rate (s⁻¹).
    pub collision_factor: f64,
}

impl Conditions {
    /// Conditions with an explicit collision factor.
    pub fn new(temperature: f64, collision_factor: f64) -> Self {
        Self {
            temperature,
            collision_factor,
        }
    }

    /// Conditions from the electron temperature (K) and density (cm⁻³).
    pub fn from_electron_density(temperature: f64, electron_density: f64) -> Self {
        Self {
            temperature,
            collision_factor: COLL_CONST * electron_density / temperature.sqrt(),
        }
    }

    /// $1/T$ (K⁻¹).
    pub fn inverse_temperature(&self) -> f64 {
        1.0 / self.temperature
    }

    /// Temperature expressed in wavenumbers (cm⁻¹).
    pub fn temperature_wn(&self) -> f64 {
        self.temperature / T1CM
    }

    /// $1/T^2$, used by the cooling temperature derivative.
    pub fn inverse_temperature_sq(&self) -> f64 {
        1.0 / (self.temperature * self.temperature)
    }

    /// $1/(2T)$, used by the cooling temperature derivative.
    pub fn half_inverse_temperature(&self) -> f64 {
        0.5 / self.temperature
    }

    /// Boltzmann factor for an excitation energy in Kelvin.
    pub fn boltzmann(&self, energy_k: f64) -> f64 {
        boltzmann_factor(energy_k / self.temperature)
    }

    /// $d\,\mathrm{cool}/dT$ for a coolant whose excitation energy is
    /// `energy_k`: `cool * (E/T² − 1/(2T))`.
    pub fn cooling_derivative(&self, cooling: f64, energy_k: f64) -> f64 {
        cooling * (energy_k * self.inverse_temperature_sq() - self.half_inverse_temperature())
    }

    /// Check that the conditions describe a physical plasma.
    pub fn is_physical(&self) -> bool {
        self.temperature > 0.0
            && self.temperature.is_finite()
            && self.collision_factor >= 0.0
            && self.collision_factor.is_finite()
    }
}
