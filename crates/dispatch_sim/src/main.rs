//! Play a seeded fleet of drivers and riders against the dispatcher and
//! report how the rides resolved.
//!
//! Run: `cargo run -p dispatch_sim -- --drivers 50 --rides 200 --seed 42`

mod runner;
mod scenario;
mod summary;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use dispatch_core::DispatchConfig;
use tracing_subscriber::EnvFilter;

use crate::runner::Simulation;
use crate::scenario::ScenarioParams;

#[derive(Parser, Debug)]
#[command(about = "Simulate ride dispatch against an in-memory fleet")]
struct Cli {
    /// Number of drivers in the fleet.
    #[arg(long, default_value_t = 50, env = "DISPATCH_SIM_DRIVERS")]
    drivers: usize,
    /// Number of ride requests.
    #[arg(long, default_value_t = 200, env = "DISPATCH_SIM_RIDES")]
    rides: usize,
    #[arg(long, default_value_t = 42, env = "DISPATCH_SIM_SEED")]
    seed: u64,
    /// Minutes over which ride requests arrive.
    #[arg(long, default_value_t = 30)]
    window_mins: u64,
    /// Probability that a driver never answers an offer.
    #[arg(long, default_value_t = 0.1)]
    silent_probability: f64,
    /// Dispatch settings as TOML; defaults apply for missing keys.
    #[arg(long, env = "DISPATCH_SIM_CONFIG")]
    config: Option<PathBuf>,
    /// Print the summary as JSON.
    #[arg(long)]
    json: bool,
}

fn load_config(path: Option<&PathBuf>) -> Result<DispatchConfig> {
    let Some(path) = path else {
        return Ok(DispatchConfig::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    DispatchConfig::from_toml_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;
    let params = ScenarioParams::default()
        .with_seed(cli.seed)
        .with_fleet(cli.drivers, cli.rides)
        .with_request_window_mins(cli.window_mins)
        .with_silent_probability(cli.silent_probability);

    let summary = Simulation::new(params, config).run()?;
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("{summary}");
    }
    Ok(())
}
