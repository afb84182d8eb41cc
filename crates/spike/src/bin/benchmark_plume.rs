use anyhow::{Context, Result};
use clap::Parser;
use plume_core::config::{PopulationConfig, PopulationSpec, ScenarioConfig};
use plume_core::mosquito::PlumeFinding;
use plume_core::simulation::Simulation;
use plume_core::spatial::Host;
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha12Rng;
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "benchmark_plume")]
#[command(about = "Time CO2 field steps and mosquito decisions")]
struct Cli {
    /// Scenario JSON; overrides the built-in scenario
    #[arg(long)]
    scenario: Option<PathBuf>,

    /// Grid points per side for the built-in scenario
    #[arg(short, long, default_value_t = 128)]
    grid: usize,

    /// Agents per strategy for the built-in scenario
    #[arg(short, long, default_value_t = 1000)]
    agents: usize,

    /// Field steps to time
    #[arg(short, long, default_value_t = 500)]
    steps: usize,

    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Write the run summary of a full run here
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn builtin_scenario(cli: &Cli) -> ScenarioConfig {
    let mut scenario = ScenarioConfig::default();
    scenario.sim.seed = cli.seed;
    scenario.sim.num_grid_points = cli.grid;
    scenario.hosts = vec![Host::new(50.0, 30.0, 1.0), Host::new(30.0, 45.0, 0.5)];

    let mut rng = ChaCha12Rng::seed_from_u64(cli.seed);
    let length = scenario.sim.domain_length;
    scenario.populations = [PlumeFinding::Upwind, PlumeFinding::Downwind, PlumeFinding::Crosswind]
        .into_iter()
        .enumerate()
        .map(|(k, strategy)| PopulationSpec {
            config: PopulationConfig {
                start_time: 0.0,
                seed: cli.seed + k as u64 + 1,
                ..PopulationConfig::for_strategy(strategy)
            },
            initial_x: (0..cli.agents).map(|_| rng.random::<f64>() * length).collect(),
        })
        .collect();
    scenario
}

fn load_scenario(cli: &Cli) -> Result<ScenarioConfig> {
    match &cli.scenario {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
        }
        None => Ok(builtin_scenario(cli)),
    }
}

fn main() -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
    let cli = Cli::parse();

    let scenario = load_scenario(&cli)?;
    let mut sim = Simulation::try_new(scenario.clone()).context("building simulation")?;
    let steps = cli.steps.min(sim.total_steps());
    println!(
        "Benchmarking {} steps on a {}x{} grid with {} agents",
        steps,
        sim.environment().grid().num_grid_points(),
        sim.environment().grid().num_grid_points(),
        sim.populations().iter().map(|p| p.len()).sum::<usize>()
    );

    let mut field_us = 0u64;
    let mut decision_us = 0u64;
    let mut decisions = 0usize;
    let start = Instant::now();
    for _ in 0..steps {
        let timings = sim.step();
        field_us += timings.field_update_us;
        if timings.decided {
            decision_us += timings.decision_us;
            decisions += 1;
        }
    }
    let elapsed = start.elapsed();

    println!("Total: {:?} ({:?} per step)", elapsed, elapsed / steps.max(1) as u32);
    println!("Field update: {} us per step", field_us / steps.max(1) as u64);
    println!(
        "Decisions: {} us per decision over {} decisions",
        decision_us / decisions.max(1) as u64,
        decisions
    );

    if let Some(path) = &cli.output {
        let mut sim = Simulation::try_new(scenario).context("building simulation")?;
        let summary = sim.run();
        info!(
            steps = summary.steps,
            found = summary.total_found_host(),
            "full run finished"
        );
        let json = serde_json::to_string_pretty(&summary)?;
        std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
        println!("Run summary written to {}", path.display());
    }
    Ok(())
}
