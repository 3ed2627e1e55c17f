//! levpop command-line interface.
//!
//! Solve model atoms from TOML species decks:
//! ```sh
//! levpop run deck.toml
//! levpop sweep deck.toml
//! levpop validate deck.toml
//! ```
//! Set `RUST_LOG=debug` together with `debug = true` under `[solver]` to dump
//! the rate tables and balance matrix.

mod config;
mod runner;

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "levpop")]
#[command(about = "levpop: statistical-equilibrium level populations and line cooling")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Solve a deck at its [conditions] temperature.
    Run {
        /// Path to the species deck.
        config: PathBuf,
        /// Output directory (overrides deck setting).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Solve a deck over its [sweep] temperature grid in parallel.
    Sweep {
        /// Path to the species deck.
        config: PathBuf,
        /// Output directory (overrides deck setting).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Check that a deck parses and describes a valid atom.
    Validate {
        /// Path to the species deck.
        config: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config, output } => {
            let deck = config::load_config(&config)
                .with_context(|| format!("Reading deck {}", config.display()))?;
            println!("Deck: {}", config.display());

            let report = runner::run_single(&deck)?;
            runner::print_report(&report);

            let out_dir = output.unwrap_or_else(|| PathBuf::from(&deck.output.directory));
            if deck.output.save_json {
                let json_path = out_dir.join(format!("{}.json", file_stem(&deck.species.label)));
                runner::write_report_json(&report, &json_path)?;
            }
            Ok(())
        }
        Commands::Sweep { config, output } => {
            let deck = config::load_config(&config)
                .with_context(|| format!("Reading deck {}", config.display()))?;
            println!("Deck: {}", config.display());

            let points = runner::run_sweep(&deck)?;
            println!("Solved {} temperatures for {}", points.len(), deck.species.label);
            let failed = points.iter().filter(|p| p.status > 0).count();
            if failed > 0 {
                log::warn!("{failed} temperatures produced negative populations");
            }

            let out_dir = output.unwrap_or_else(|| PathBuf::from(&deck.output.directory));
            if deck.output.save_curve {
                let csv_path = out_dir.join(format!("{}_cooling.csv", file_stem(&deck.species.label)));
                runner::write_curve_csv(&points, &csv_path, &deck)?;
            }
            Ok(())
        }
        Commands::Validate { config } => {
            let deck = config::load_config(&config)
                .with_context(|| format!("Reading deck {}", config.display()))?;
            let problem = runner::build_problem(&deck.species)?;
            runner::conditions_at(&deck.conditions, deck.conditions.temperature)?;
            if let Some(sweep) = &deck.sweep {
                runner::temperature_grid(sweep)?;
            }
            println!(
                "Deck is valid: {} ({} levels, {} lines)",
                config.display(),
                problem.n_levels(),
                deck.species.line.len()
            );
            Ok(())
        }
    }
}

/// Species label turned into a file name, e.g. "N  2" -> "N_2".
fn file_stem(label: &str) -> String {
    label.split_whitespace().collect::<Vec<_>>().join("_")
}
