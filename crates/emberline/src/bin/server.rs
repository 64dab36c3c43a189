//! # EMBERLINE Server
//!
//! Headless demo of the authoritative tick loop: spawns NPCs, optionally
//! corrupts a few of them, and runs the logic and parallel reset phases
//! for a fixed number of ticks.
//!
//! ```bash
//! # 2000 NPCs, 5 of them faulty, 600 ticks
//! emberline_server --npcs 2000 --faulty 5 --ticks 600
//!
//! # From a config file, with reset failures visible
//! RUST_LOG=info,emberline_core=warn emberline_server --config server.toml
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use emberline::{GameServer, ServerConfig, ServerResult};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// EMBERLINE headless server
#[derive(Parser, Debug)]
#[command(name = "emberline_server")]
#[command(version, about, long_about = None)]
struct Args {
    /// TOML config file. Defaults are used when omitted.
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Number of ticks to run
    #[arg(short = 't', long, default_value = "600")]
    ticks: u64,

    /// Number of NPCs to spawn (overrides the config)
    #[arg(short = 'n', long)]
    npcs: Option<usize>,

    /// Number of NPCs whose state is corrupted before the first tick
    #[arg(long, default_value = "0")]
    faulty: usize,

    /// Reset worker threads, 0 for inline (overrides the config)
    #[arg(short = 'w', long)]
    workers: Option<usize>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "server stopped");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> ServerResult<()> {
    let mut config = match &args.config {
        Some(path) => ServerConfig::from_file(path)?,
        None => ServerConfig::default(),
    };
    if let Some(npcs) = args.npcs {
        config.npc_count = npcs;
    }
    if let Some(workers) = args.workers {
        config.reset.worker_threads = workers;
    }

    info!(
        npcs = config.npc_count,
        faulty = args.faulty,
        ticks = args.ticks,
        tick_rate = config.tick_rate,
        workers = config.reset.worker_threads,
        "starting server"
    );

    let mut server = GameServer::from_config(&config)?;
    let ids = server.populate(config.npc_count)?;

    // Spread the faulty NPCs evenly over the spawn order.
    let faulty = args.faulty.min(ids.len());
    if faulty > 0 {
        let stride = ids.len() / faulty;
        for id in ids.iter().step_by(stride).take(faulty) {
            server.poison(*id);
        }
    }

    let stats = server.run_for(args.ticks)?;
    stats.log_summary();

    info!(
        npcs_remaining = server.world().len(),
        avg_tick_us = server.clock().stats().avg_tick_us,
        late_ticks = server.clock().stats().late_ticks,
        "server finished"
    );
    Ok(())
}
