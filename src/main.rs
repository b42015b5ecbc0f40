use std::process;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;

use chr_admission::config::{CoordinatorConfig, SimConfig, WorkloadConfig};
use chr_admission::sim::{ClusterRunner, Simulation, ViolationKind};

#[derive(Parser)]
#[command(name = "chr-admit")]
#[command(about = "Quota-based distributed admission control", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a cluster with one thread per peer
    Run {
        /// Number of peers
        #[arg(short = 'n', long, default_value_t = 4, value_parser = clap::value_parser!(u32).range(1..))]
        peers: u32,

        /// Rounds every peer runs
        #[arg(short, long, default_value_t = 3)]
        rounds: u64,

        /// Resource the peers compete for
        #[arg(long, default_value_t = 0)]
        resource: u32,

        /// Smallest participant count (capacity) drawn per round
        #[arg(long, default_value_t = 2)]
        min_participants: u32,

        /// Largest participant count (capacity) drawn per round
        #[arg(long, default_value_t = 20)]
        max_participants: u32,

        /// How long each peer holds the resource, in milliseconds
        #[arg(long, default_value_t = 2000)]
        hold_ms: u64,

        /// Largest random delay before requesting, in milliseconds
        #[arg(long, default_value_t = 50)]
        max_delay_ms: u64,

        /// Sleep between polls while waiting, in microseconds
        #[arg(long, default_value_t = 2000)]
        poll_us: u64,

        /// Seed for the workload; random if omitted
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Run seeded single-threaded simulations and check their histories
    Simulate {
        /// Number of peers
        #[arg(short = 'n', long, default_value_t = 4, value_parser = clap::value_parser!(u32).range(1..))]
        peers: u32,

        /// Number of resources
        #[arg(long, default_value_t = 1)]
        resources: u32,

        /// Capacity every request uses
        #[arg(short, long, default_value_t = 1)]
        capacity: u32,

        /// Rounds every peer runs
        #[arg(short, long, default_value_t = 3)]
        rounds: u64,

        /// First seed
        #[arg(long, default_value_t = 0)]
        seed: u64,

        /// Number of consecutive seeds to run
        #[arg(long, default_value_t = 100)]
        seeds: u64,
    },
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Run {
            peers,
            rounds,
            resource,
            min_participants,
            max_participants,
            hold_ms,
            max_delay_ms,
            poll_us,
            seed,
        } => run_cluster(WorkloadConfig {
            peers,
            rounds,
            resource,
            min_participants,
            max_participants,
            hold_duration: Duration::from_millis(hold_ms),
            max_request_delay: Duration::from_millis(max_delay_ms),
            seed,
            coordinator: CoordinatorConfig::default()
                .with_poll_interval(Duration::from_micros(poll_us)),
        }),
        Commands::Simulate {
            peers,
            resources,
            capacity,
            rounds,
            seed,
            seeds,
        } => run_simulations(
            SimConfig {
                peers,
                resources,
                capacity,
                rounds,
                ..Default::default()
            },
            seed,
            seeds,
        ),
    };

    if let Err(e) = result {
        error!("{:#}", e);
        process::exit(1);
    }
}

fn run_cluster(config: WorkloadConfig) -> Result<()> {
    let runner = ClusterRunner::new(config)?;
    let report = runner.run().context("cluster run failed")?;

    println!("Peers:          {}", report.peers.len());
    for peer in &report.peers {
        println!(
            "  peer {}: {} rounds, {} deferred grants, final time {}",
            peer.peer, peer.rounds, peer.deferred_grants, peer.final_time
        );
    }
    println!("Peak holders:   {}", report.peak_holders);
    println!("Over-admitted:  {}", report.over_admissions);
    Ok(())
}

fn run_simulations(base: SimConfig, first_seed: u64, seeds: u64) -> Result<()> {
    let mut failed = 0u64;
    let mut peak = 0u32;

    for seed in first_seed..first_seed.saturating_add(seeds) {
        let config = SimConfig { seed, ..base.clone() };
        let report = Simulation::new(config)?
            .run()
            .with_context(|| format!("simulation with seed {} did not finish", seed))?;
        let result = report.check();
        peak = peak.max(result.stats.peak_holders);

        // Holder counts are only a hard bound when a single peer may enter.
        let fatal: Vec<_> = result
            .violations
            .iter()
            .filter(|v| base.capacity == 1 || v.kind != ViolationKind::CapacityExceeded)
            .collect();
        if !fatal.is_empty() {
            failed += 1;
            println!("seed {}: {} violation(s)", seed, fatal.len());
            for v in fatal {
                println!("  {:?}: {}", v.kind, v.description);
            }
        }
    }

    println!("Seeds run:      {}", seeds);
    println!("Seeds failed:   {}", failed);
    println!("Peak holders:   {}", peak);

    if failed > 0 {
        bail!("{} of {} simulations violated the admission properties", failed, seeds);
    }
    Ok(())
}
