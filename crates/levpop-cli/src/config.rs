//! TOML species-deck deserialisation.

use serde::Deserialize;

use levpop_core::physics::ExcitationUnits;
use levpop_core::solver::SolverOptions;

/// Top-level deck.
#[derive(Debug, Deserialize)]
pub struct DeckConfig {
    pub conditions: ConditionsConfig,
    pub species: SpeciesConfig,
    #[serde(default)]
    pub solver: SolverOptions,
    pub sweep: Option<SweepConfig>,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Local plasma conditions.
///
/// Exactly one of `electron_density` and `collision_factor` must be given.
#[derive(Debug, Deserialize)]
pub struct ConditionsConfig {
    /// Electron temperature (K).
    pub temperature: f64,
    /// Electron density (cm⁻³).
    pub electron_density: Option<f64>,
    /// Collision factor used as is, independent of temperature.
    pub collision_factor: Option<f64>,
}

/// One model atom.
#[derive(Debug, Deserialize)]
pub struct SpeciesConfig {
    pub label: String,
    /// Total population (cm⁻³).
    pub abundance: f64,
    /// Units of the level energies: "kelvin" (default) or "wavenumber".
    #[serde(default)]
    pub units: ExcitationUnits,
    /// Levels, ground first.
    pub level: Vec<LevelConfig>,
    #[serde(default)]
    pub line: Vec<LineConfig>,
    /// External creation rate per level (cm⁻³ s⁻¹).
    #[serde(default)]
    pub source: Vec<f64>,
    /// External destruction rate per level (s⁻¹).
    #[serde(default)]
    pub sink: Vec<f64>,
}

#[derive(Debug, Deserialize)]
pub struct LevelConfig {
    pub weight: f64,
    pub energy: f64,
}

/// One transition between two levels, indexed from 0 at the ground level.
#[derive(Debug, Deserialize)]
pub struct LineConfig {
    pub upper: usize,
    pub lower: usize,
    /// Einstein A (s⁻¹).
    #[serde(default)]
    pub transition_probability: f64,
    #[serde(default)]
    pub collision_strength: f64,
    #[serde(default = "default_escape_probability")]
    pub escape_probability: f64,
    #[serde(default)]
    pub destruction_probability: f64,
    /// Continuum pumping `lower → upper` (s⁻¹).
    #[serde(default)]
    pub pump: f64,
    /// Wavelength (Å) reported with the coolant. Derived from the level
    /// energies when absent.
    pub wavelength: Option<f64>,
}

fn default_escape_probability() -> f64 {
    1.0
}

/// Temperature grid for `levpop sweep`.
#[derive(Debug, Deserialize)]
pub struct SweepConfig {
    /// Lowest and highest temperature (K).
    pub range: [f64; 2],
    #[serde(default = "default_sweep_points")]
    pub points: usize,
    /// Space the grid evenly in log T (default: true).
    #[serde(default = "default_true")]
    pub logarithmic: bool,
}

fn default_sweep_points() -> usize {
    50
}

/// Output configuration.
#[derive(Debug, Deserialize)]
pub struct OutputConfig {
    /// Output directory (default: "./output").
    #[serde(default = "default_output_dir")]
    pub directory: String,
    /// Whether to save the solved state as JSON (default: true).
    #[serde(default = "default_true")]
    pub save_json: bool,
    /// Whether to save the cooling curve of a sweep as CSV (default: true).
    #[serde(default = "default_true")]
    pub save_curve: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_dir(),
            save_json: true,
            save_curve: true,
        }
    }
}

fn default_output_dir() -> String {
    "./output".into()
}
fn default_true() -> bool {
    true
}

/// Parse a deck from TOML text.
pub fn parse_config(content: &str) -> anyhow::Result<DeckConfig> {
    let config: DeckConfig = toml::from_str(content)?;
    Ok(config)
}

/// Load and parse a TOML species deck.
pub fn load_config(path: &std::path::Path) -> anyhow::Result<DeckConfig> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}
