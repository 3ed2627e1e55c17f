//! Deck runner: builds the model atom, solves it and writes the results.

use std::path::Path;

use anyhow::{Context, Result};
use rayon::prelude::*;
use serde::Serialize;

use levpop_core::cooling::{Coolant, CoolingLedger, CoolingStack};
use levpop_core::model::{Level, LevelSet};
use levpop_core::physics::{Conditions, HPLANCK, SPEEDLIGHT};
use levpop_core::solver::{solve_nlevel, LineExchange, NLevelProblem, SolvedState};

use crate::config::{ConditionsConfig, DeckConfig, SpeciesConfig, SweepConfig};

/// Result of a single-condition run.
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub label: String,
    pub conditions: Conditions,
    pub state: SolvedState,
    pub lines: Vec<LineExchange>,
    pub coolants: Vec<Coolant>,
}

/// One point of a cooling curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CurvePoint {
    pub temperature: f64,
    pub cooling: f64,
    pub heating: f64,
    pub cooling_derivative: f64,
    pub status: i32,
}

/// Build the N-level problem described by a species section.
pub fn build_problem(species: &SpeciesConfig) -> Result<NLevelProblem> {
    let levels = species
        .level
        .iter()
        .map(|l| Level::new(l.weight, l.energy))
        .collect();
    let levels = LevelSet::new(levels, species.units)
        .with_context(|| format!("Species '{}': invalid level table", species.label))?;

    let mut problem = NLevelProblem::new(species.label.clone(), species.abundance, levels);
    for line in &species.line {
        if line.upper <= line.lower || line.upper >= problem.n_levels() {
            anyhow::bail!(
                "Species '{}': line {} -> {} must go from a higher to a lower level among {}",
                species.label,
                line.upper,
                line.lower,
                problem.n_levels()
            );
        }
        let a = line.transition_probability;
        let context = || {
            format!(
                "Species '{}': line {} -> {}",
                species.label, line.upper, line.lower
            )
        };
        problem
            .set_radiative(
                line.upper,
                line.lower,
                a * line.escape_probability,
                a * line.destruction_probability,
                line.pump,
            )
            .with_context(context)?;
        problem
            .set_collision_strength(line.upper, line.lower, line.collision_strength)
            .with_context(context)?;
    }
    problem.source = species.source.clone();
    problem.sink = species.sink.clone();
    Ok(problem)
}

/// Conditions at `temperature` for the deck's density setting.
pub fn conditions_at(config: &ConditionsConfig, temperature: f64) -> Result<Conditions> {
    let cond = match (config.electron_density, config.collision_factor) {
        (Some(ne), None) => Conditions::from_electron_density(temperature, ne),
        (None, Some(cf)) => Conditions::new(temperature, cf),
        _ => anyhow::bail!(
            "[conditions] needs exactly one of 'electron_density' and 'collision_factor'"
        ),
    };
    if !cond.is_physical() {
        anyhow::bail!("Unphysical conditions: {:?}", cond);
    }
    Ok(cond)
}

/// Temperature grid of a sweep, in increasing order.
pub fn temperature_grid(sweep: &SweepConfig) -> Result<Vec<f64>> {
    let [start, end] = sweep.range;
    if !(start > 0.0 && end >= start) {
        anyhow::bail!("[sweep] range must satisfy 0 < start <= end, got [{start}, {end}]");
    }
    if sweep.points == 0 {
        anyhow::bail!("[sweep] needs at least one point");
    }
    let steps = (sweep.points - 1).max(1) as f64;
    let grid = (0..sweep.points)
        .map(|i| {
            let f = i as f64 / steps;
            if sweep.logarithmic {
                (start.ln() + (end.ln() - start.ln()) * f).exp()
            } else {
                start + (end - start) * f
            }
        })
        .collect();
    Ok(grid)
}

/// Wavelength (Å) reported for the `hi → lo` coolant.
fn line_wavelength(deck: &DeckConfig, levels: &LevelSet, hi: usize, lo: usize) -> f64 {
    let given = deck
        .species
        .line
        .iter()
        .find(|l| l.upper == hi && l.lower == lo)
        .and_then(|l| l.wavelength);
    given.unwrap_or_else(|| {
        let energy = levels.transition_energy_erg(hi, lo);
        if energy > 0.0 {
            HPLANCK * SPEEDLIGHT / energy * 1.0e8
        } else {
            0.0
        }
    })
}

/// Solve the deck once at its own conditions.
pub fn run_single(deck: &DeckConfig) -> Result<RunReport> {
    let problem = build_problem(&deck.species)?;
    let cond = conditions_at(&deck.conditions, deck.conditions.temperature)?;

    let solution = solve_nlevel(&problem, &cond, &deck.solver)
        .with_context(|| format!("Solving {} at T = {:.4e} K", problem.label, cond.temperature))?;
    if solution.state.status.is_negative_population() {
        log::warn!(
            "{}: solve produced negative populations, results are not trustworthy",
            problem.label
        );
    }

    let mut ledger = CoolingStack::new();
    for line in &solution.lines {
        let wavelength = line_wavelength(deck, &problem.levels, line.hi, line.lo);
        ledger.add_line(&problem.label, wavelength, line.exchange, line.derivative);
    }

    Ok(RunReport {
        label: problem.label.clone(),
        conditions: cond,
        state: solution.state,
        lines: solution.lines,
        coolants: ledger.entries().to_vec(),
    })
}

/// Solve the deck over its temperature grid, one zone per rayon task.
pub fn run_sweep(deck: &DeckConfig) -> Result<Vec<CurvePoint>> {
    let sweep = deck
        .sweep
        .as_ref()
        .context("Deck has no [sweep] section")?;
    let temperatures = temperature_grid(sweep)?;
    let problem = build_problem(&deck.species)?;

    let points = temperatures
        .par_iter()
        .map(|&t| {
            let cond = conditions_at(&deck.conditions, t)?;
            let solution = solve_nlevel(&problem, &cond, &deck.solver)
                .with_context(|| format!("Solving {} at T = {t:.4e} K", problem.label))?;
            let state = solution.state;
            Ok(CurvePoint {
                temperature: t,
                cooling: state.cooling,
                heating: state.heating,
                cooling_derivative: state.cooling_derivative,
                status: state.status.code(),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(points)
}

/// Print a short summary of a single run.
pub fn print_report(report: &RunReport) {
    println!(
        "{} at T = {:.4e} K, collision factor {:.4e}",
        report.label, report.conditions.temperature, report.conditions.collision_factor
    );
    println!("  status: {:?}", report.state.status);
    println!("  level  population     departure");
    for (i, (pop, dep)) in report
        .state
        .populations
        .iter()
        .zip(&report.state.departure)
        .enumerate()
    {
        println!("  {i:>5}  {pop:12.4e}  {dep:12.4e}");
    }
    println!(
        "  cooling {:.4e}  heating {:.4e}  dC/dT {:.4e} erg cm^-3 s^-1",
        report.state.cooling, report.state.heating, report.state.cooling_derivative
    );
    let strongest = report
        .coolants
        .iter()
        .max_by(|a, b| a.cooling.total_cmp(&b.cooling));
    if let Some(c) = strongest {
        println!("  strongest coolant: {} {:.1} A ({:.4e})", c.label, c.wavelength, c.cooling);
    }
}

/// Write a run report to a JSON file.
pub fn write_report_json(report: &RunReport, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(report)
        .map_err(|e| anyhow::anyhow!("JSON serialisation error: {}", e))?;
    std::fs::write(path, json)?;

    println!("State (JSON) written to: {}", path.display());
    Ok(())
}

/// Write a cooling curve to a CSV file with a metadata header.
pub fn write_curve_csv(points: &[CurvePoint], path: &Path, deck: &DeckConfig) -> Result<()> {
    use std::io::Write;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut file = std::fs::File::create(path)?;

    writeln!(file, "# levpop cooling curve")?;
    writeln!(file, "# Version: {}", env!("CARGO_PKG_VERSION"))?;
    writeln!(
        file,
        "# species '{}': {} levels, abundance {:.4e}",
        deck.species.label,
        deck.species.level.len(),
        deck.species.abundance
    )?;
    if let Some(ne) = deck.conditions.electron_density {
        writeln!(file, "# electron_density: {ne:.4e}")?;
    }
    if let Some(cf) = deck.conditions.collision_factor {
        writeln!(file, "# collision_factor: {cf:.4e}")?;
    }
    writeln!(file, "#")?;
    writeln!(file, "temperature_K,cooling,heating,cooling_derivative,status")?;

    for p in points {
        writeln!(
            file,
            "{:.6e},{:.6e},{:.6e},{:.6e},{}",
            p.temperature, p.cooling, p.heating, p.cooling_derivative, p.status
        )?;
    }

    println!("Cooling curve written to: {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use approx::assert_relative_eq;

    const DECK: &str = r#"
        [conditions]
        temperature = 1.0e4
        electron_density = 1.0e3

        [species]
        label = "N  2"
        abundance = 1.0

        [[species.level]]
        weight = 1.0
        energy = 0.0
        [[species.level]]
        weight = 3.0
        energy = 70.0
        [[species.level]]
        weight = 5.0
        energy = 188.0
        [[species.level]]
        weight = 5.0
        energy = 2.2e4

        [[species.line]]
        upper = 1
        lower = 0
        transition_probability = 2.1e-6
        collision_strength = 0.41
        [[species.line]]
        upper = 2
        lower = 1
        transition_probability = 7.5e-6
        collision_strength = 1.38
        [[species.line]]
        upper = 2
        lower = 0
        collision_strength = 0.27
        [[species.line]]
        upper = 3
        lower = 2
        transition_probability = 3.0e-3
        collision_strength = 1.6
        wavelength = 6583.4
        [[species.line]]
        upper = 3
        lower = 1
        transition_probability = 1.0e-3
        collision_strength = 0.96
        [[species.line]]
        upper = 3
        lower = 0
        collision_strength = 0.32

        [sweep]
        range = [2.0e3, 4.0e4]
        points = 16
    "#;

    #[test]
    fn test_single_run_conserves_and_fills_ledger() {
        let deck = parse_config(DECK).unwrap();
        let report = run_single(&deck).unwrap();
        assert_relative_eq!(report.state.total_population(), 1.0, max_relative = 1e-10);
        assert_eq!(report.coolants.len(), report.lines.len());
        let total: f64 = report.coolants.iter().map(|c| c.cooling).sum();
        assert_relative_eq!(total, report.state.cooling, max_relative = 1e-12);

        let red = report
            .coolants
            .iter()
            .zip(&report.lines)
            .find(|(_, l)| l.hi == 3 && l.lo == 2)
            .map(|(c, _)| c.wavelength);
        assert_eq!(red, Some(6583.4));
    }

    #[test]
    fn test_sweep_matches_single_runs() {
        let mut deck = parse_config(DECK).unwrap();
        let points = run_sweep(&deck).unwrap();
        assert_eq!(points.len(), 16);
        assert_relative_eq!(points[0].temperature, 2.0e3, max_relative = 1e-12);
        assert_relative_eq!(points[15].temperature, 4.0e4, max_relative = 1e-12);
        assert!(points.windows(2).all(|w| w[0].temperature < w[1].temperature));

        deck.conditions.temperature = points[7].temperature;
        let single = run_single(&deck).unwrap();
        assert_relative_eq!(points[7].cooling, single.state.cooling, max_relative = 1e-12);
    }

    #[test]
    fn test_derived_wavelength() {
        let deck = parse_config(DECK).unwrap();
        let problem = build_problem(&deck.species).unwrap();
        // 70 K is about 206 micron
        let wl = line_wavelength(&deck, &problem.levels, 1, 0);
        assert_relative_eq!(wl, 2.0555e6, max_relative = 1e-3);
    }

    #[test]
    fn test_bad_line_indices_rejected() {
        let text = DECK.replace("upper = 1\n        lower = 0", "upper = 0\n        lower = 1");
        let deck = parse_config(&text).unwrap();
        assert!(build_problem(&deck.species).is_err());
    }

    #[test]
    fn test_conditions_need_one_density() {
        let config = ConditionsConfig {
            temperature: 1.0e4,
            electron_density: Some(1.0),
            collision_factor: Some(1.0),
        };
        assert!(conditions_at(&config, 1.0e4).is_err());

        let config = ConditionsConfig {
            temperature: 1.0e4,
            electron_density: None,
            collision_factor: Some(0.3),
        };
        assert_relative_eq!(conditions_at(&config, 5.0e3).unwrap().collision_factor, 0.3);
    }

    #[test]
    fn test_demo_deck() {
        let deck = parse_config(include_str!("../../../demos/nitrogen_ii.toml")).unwrap();
        let report = run_single(&deck).unwrap();
        assert_eq!(report.state.n_levels(), 5);
        assert_relative_eq!(report.state.total_population(), 1.0e-4, max_relative = 1e-10);
        assert!(report.state.cooling > 0.0);
        assert_eq!(run_sweep(&deck).unwrap().len(), 40);
    }

    #[test]
    fn test_linear_grid() {
        let sweep = SweepConfig {
            range: [100.0, 500.0],
            points: 5,
            logarithmic: false,
        };
        assert_eq!(temperature_grid(&sweep).unwrap(), vec![100.0, 200.0, 300.0, 400.0, 500.0]);
    }
}
