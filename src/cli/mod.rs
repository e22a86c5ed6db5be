pub mod app;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "countd")]
#[command(about = "Distributed per-tenant item counter")]
pub struct Cli {
    /// YAML config shared by the coordinator and the workers it launches.
    #[arg(long, global = true, default_value = "config.yaml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Keep the worker pool alive and relay client requests to it.
    Coordinator(CoordinatorArgs),
    /// Run one worker.
    Worker(WorkerArgs),
}

#[derive(Args, Debug)]
pub struct CoordinatorArgs {
    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, default_value_t = 5000)]
    pub port: u16,

    /// Answer 503 after this many failed attempts instead of retrying forever.
    #[arg(long)]
    pub max_attempts: Option<u32>,

    /// Pause before a failed request goes back on the queue.
    #[arg(long, default_value_t = 0)]
    pub retry_delay_ms: u64,
}

#[derive(Args, Debug)]
pub struct WorkerArgs {
    #[arg(long)]
    pub port: u16,

    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,
}
