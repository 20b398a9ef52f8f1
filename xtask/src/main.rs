use std::path::Path;
use std::process::{exit, Command, ExitStatus};

use clap::{Parser, Subcommand, ValueEnum};

// ── CLI definition ─────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "xtask",
    about = "Task runner for the dispatch workspace",
    long_about = "A unified CLI for running the dispatch simulator, benchmarks,\n\
                  and CI checks in the dispatch workspace."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the dispatch simulator
    Sim {
        #[arg(long, default_value_t = 50)]
        drivers: usize,
        #[arg(long, default_value_t = 200)]
        rides: usize,
        #[arg(long, default_value_t = 42)]
        seed: u64,
        /// Dispatch settings TOML passed through to the simulator
        #[arg(long)]
        config: Option<String>,
        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run the large scenario (5 000 rides, 1 000 drivers)
    SimLarge,
    /// Run Criterion benchmarks
    Bench,
    /// Compare benchmarks: stash changes, create baseline, restore, compare
    BenchCompare,
    /// Run CI checks (fmt, clippy, tests, simulator, benchmarks)
    Ci {
        /// Job to run
        #[arg(value_enum, default_value_t = CiJob::Check)]
        job: CiJob,
    },
}

#[derive(Clone, ValueEnum)]
enum CiJob {
    /// Formatting, clippy, and tests
    Check,
    /// Run the simulator on fixed seeds
    Sim,
    /// Run benchmarks
    Bench,
    /// Run check + sim + bench
    All,
}

// ── helpers ────────────────────────────────────────────────────────

fn step(label: &str) {
    eprintln!("\n=== {label} ===");
}

fn spawn(program: &str, args: &[&str]) -> ExitStatus {
    eprintln!("+ {program} {}", args.join(" "));
    Command::new(program).args(args).status().unwrap_or_else(|err| {
        eprintln!("failed to execute {program}: {err}");
        exit(1);
    })
}

fn run(program: &str, args: &[&str]) {
    let status = spawn(program, args);
    if !status.success() {
        exit(status.code().unwrap_or(1));
    }
}

fn run_cargo(args: &[&str]) {
    run("cargo", args);
}

fn run_git(args: &[&str]) {
    run("git", args);
}

fn run_sim(extra: &[&str]) {
    let mut args = vec!["run", "-p", "dispatch_sim", "--release", "--"];
    args.extend_from_slice(extra);
    run_cargo(&args);
}

fn bench(extra: &[&str]) {
    let mut args = vec!["bench", "--package", "dispatch_core", "--bench", "performance"];
    if !extra.is_empty() {
        args.push("--");
        args.extend_from_slice(extra);
    }
    run_cargo(&args);
}

// ── CI jobs ────────────────────────────────────────────────────────

fn ci_check() {
    step("Check formatting");
    run_cargo(&["fmt", "--all", "--", "--check"]);

    step("Clippy");
    run_cargo(&[
        "clippy",
        "--all-targets",
        "--all-features",
        "--",
        "-D",
        "warnings",
    ]);

    step("Test dispatch_core");
    run_cargo(&["test", "-p", "dispatch_core"]);

    step("Test dispatch_sim");
    run_cargo(&["test", "-p", "dispatch_sim"]);
}

fn ci_sim() {
    for seed in ["1", "42", "1337"] {
        step(&format!("Simulate seed {seed}"));
        run_sim(&["--seed", seed]);
    }
}

fn ci_bench() {
    step("Run benchmarks");
    bench(&[]);
}

// ── main ───────────────────────────────────────────────────────────

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Sim {
            drivers,
            rides,
            seed,
            config,
            json,
        } => {
            let (drivers, rides, seed) = (drivers.to_string(), rides.to_string(), seed.to_string());
            let mut args = vec![
                "--drivers",
                drivers.as_str(),
                "--rides",
                rides.as_str(),
                "--seed",
                seed.as_str(),
            ];
            if let Some(config) = config.as_deref() {
                args.extend_from_slice(&["--config", config]);
            }
            if json {
                args.push("--json");
            }
            run_sim(&args);
        }
        Commands::SimLarge => {
            run_sim(&["--drivers", "1000", "--rides", "5000", "--window-mins", "120"]);
        }
        Commands::Bench => bench(&[]),
        Commands::BenchCompare => {
            let baseline_dir = Path::new("target/criterion");
            if baseline_dir.exists() {
                step("Removing existing benchmark data");
                if let Err(err) = std::fs::remove_dir_all(baseline_dir) {
                    eprintln!("failed to remove target/criterion: {err}");
                    exit(1);
                }
            }

            step("Stashing current changes");
            run_git(&[
                "stash",
                "push",
                "-m",
                "Temporary stash for benchmark comparison",
            ]);

            step("Running benchmark to create baseline");
            bench(&["--save-baseline", "main"]);

            step("Reapplying changes");
            run_git(&["stash", "pop"]);

            step("Running benchmark comparing against baseline");
            bench(&["--baseline", "main"]);

            eprintln!("\nDone! Check the output above to see performance comparison.");
        }
        Commands::Ci { job } => {
            match job {
                CiJob::Check => ci_check(),
                CiJob::Sim => ci_sim(),
                CiJob::Bench => ci_bench(),
                CiJob::All => {
                    ci_check();
                    ci_sim();
                    ci_bench();
                }
            }
            eprintln!("\nCI job passed.");
        }
    }
}
