mod cli;
mod config;
mod demo;
mod terminal;

use anyhow::{Context, Result};
use clap::Parser;
use std::time::Duration;
use tracing::info;

use waymark_core::config::{load_dotenv, load_dotenv_from};
use waymark_core::Config;
use waymark_jobs::{ui_channel, PoolConfig, PoolId, PoolRegistry, PoolTable, Scheduler};

use crate::cli::{CliArgs, Command, DemoArgs};
use crate::config::CliConfig;
use crate::demo::Console;
use crate::terminal::Terminal;

fn main() -> Result<()> {
    let args = CliArgs::parse();

    match args.env_file.as_deref() {
        Some(path) => load_dotenv_from(path).context("failed to load env file")?,
        None => load_dotenv(),
    }
    let env_config = Config::from_env().context("failed to read environment configuration")?;

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&env_config.log_filter)),
        )
        .with_target(false)
        .init();
    env_config.log_summary();

    let terminal = Terminal::new();
    let cli_config = CliConfig::load(args.config.as_deref())
        .context("failed to load configuration")?;
    let background = cli_config.resolve_background(&env_config.background);
    let pool_config = PoolConfig::from(&background);

    terminal.print_banner(env_config.profile_label())?;
    match args.command {
        Command::Show => show(&terminal, &env_config, &cli_config, &pool_config),
        Command::Demo(demo_args) => run_demo(&terminal, &cli_config, &pool_config, &demo_args),
    }
}

/// Register the console's pools and build every worker pool.
fn build_pools(cli_config: &CliConfig, pool_config: &PoolConfig) -> Result<(PoolTable, PoolId)> {
    let mut registry = PoolRegistry::new();
    let threads = cli_config.convert_threads;
    let convert = registry.register_pool("convert", move || threads);
    let table = registry
        .finalize(pool_config)
        .context("failed to build worker pools")?;
    Ok((table, convert))
}

fn show(
    terminal: &Terminal,
    env_config: &Config,
    cli_config: &CliConfig,
    pool_config: &PoolConfig,
) -> Result<()> {
    let mut summary = env_config.summary();
    summary["pools"] = serde_json::to_value(pool_config)?;
    summary["convert_threads"] = cli_config.convert_threads.into();
    terminal.print_info(&serde_json::to_string_pretty(&summary)?)?;

    let (table, _) = build_pools(cli_config, pool_config)?;
    let pools: Vec<(String, usize)> = table
        .ids()
        .into_iter()
        .filter_map(|id| table.get(id))
        .map(|pool| (pool.name().to_string(), pool.max_threads()))
        .collect();
    terminal.print_pools(&pools)
}

fn run_demo(
    terminal: &Terminal,
    cli_config: &CliConfig,
    pool_config: &PoolConfig,
    args: &DemoArgs,
) -> Result<()> {
    let (table, convert) = build_pools(cli_config, pool_config)?;
    let (sender, ui) = ui_channel();
    let scheduler = Scheduler::start(table, sender);

    let tick = Duration::from_millis(cli_config.tick_ms.max(1));
    let mut console = Console::new(&scheduler, ui, terminal, tick);

    let handles = demo::submit_workload(&scheduler, convert, args)
        .context("failed to submit demo jobs")?;
    info!(jobs = handles.len(), "Demo workload submitted");

    let finished = console.run(&handles, args)?;
    if !finished {
        terminal.print_info(&format!(
            "Abandoning {} unfinished jobs",
            scheduler.active_jobs()
        ))?;
    }

    scheduler.shutdown();
    console.flush();

    if args.metrics {
        terminal.print_metrics(&scheduler.metrics())?;
    }
    Ok(())
}
