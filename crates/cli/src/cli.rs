use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Background job console for the waymark viewer.
///
/// Stands in for the viewer's UI thread: it owns the jobs window, drains
/// worker requests and renders progress and the "N items" status.
#[derive(Parser, Debug)]
#[command(name = "waymark", about = "Background job console for the waymark viewer")]
pub struct CliArgs {
    /// Path to config file (default: ~/.config/waymark/config.toml)
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Env file to load instead of ./.env
    #[arg(long, global = true, env = "WAYMARK_ENV_FILE")]
    pub env_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the resolved configuration and pool layout
    Show,
    /// Run a simulated workload and render the jobs window
    Demo(DemoArgs),
}

#[derive(Args, Debug, Clone)]
pub struct DemoArgs {
    /// Tile download jobs (remote pool)
    #[arg(long, default_value = "3")]
    pub downloads: usize,

    /// Tiles fetched by each download job
    #[arg(long, default_value = "4")]
    pub tiles: u32,

    /// DEM loading jobs (local pool)
    #[arg(long, default_value = "2")]
    pub dem_loads: usize,

    /// DEM files read by each loading job
    #[arg(long, default_value = "3")]
    pub dem_files: u32,

    /// File conversion jobs (convert pool)
    #[arg(long, default_value = "2")]
    pub conversions: usize,

    /// Simulated work per item, in milliseconds
    #[arg(long, default_value = "150", env = "WAYMARK_DEMO_ITEM_MS")]
    pub item_ms: u64,

    /// Cancel the job with this id once its row is shown (repeatable)
    #[arg(long = "cancel", value_name = "ID")]
    pub cancel: Vec<u64>,

    /// Cancel every job after this many milliseconds
    #[arg(long, value_name = "MS")]
    pub clear_all_after: Option<u64>,

    /// Shut down after this many milliseconds even if jobs are still running
    #[arg(long, default_value = "30000", value_name = "MS")]
    pub timeout_ms: u64,

    /// Print per-pool job metrics as JSON on exit
    #[arg(long)]
    pub metrics: bool,
}
