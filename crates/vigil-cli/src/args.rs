use std::str::FromStr;

use clap::{Args as ClapArgs, Parser, Subcommand};

use vigil_common::Strategy;

#[derive(Debug, Parser)]
#[command(name = "vigil")]
#[command(about = "Inspect and apply GPU assignments for AI services", long_about = None)]
pub struct Args {
    /// Backend base URL
    #[arg(long, env = "VIGIL_API_URL", default_value = "http://127.0.0.1:18000")]
    pub api_url: String,

    /// Backend API token (Authorization: Bearer)
    #[arg(long, env = "VIGIL_API_TOKEN")]
    pub token: Option<String>,

    #[arg(long, env = "VIGIL_OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,

    #[arg(long, env = "VIGIL_OTLP_TOKEN")]
    pub otlp_token: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List detected GPUs
    Gpus,
    /// List AI services and their VRAM requirements
    Services,
    /// Show the persisted assignment configuration
    Config,
    /// Show per-service health and restart status
    Status,
    /// Rescan hardware
    Detect,
    /// Show what a strategy would assign, without changing anything
    Preview {
        #[arg(long)]
        strategy: Strategy,
    },
    /// Persist edits without restarting services
    Save {
        #[command(flatten)]
        edits: EditArgs,
    },
    /// Persist edits, restart affected services and wait for them to come up
    Apply {
        #[command(flatten)]
        edits: EditArgs,

        #[arg(long, default_value_t = 2_000)]
        poll_interval_ms: u64,

        #[arg(long, default_value_t = 120)]
        timeout_secs: u64,

        /// Keep polling after a service reports a failed restart
        #[arg(long)]
        no_fail_fast: bool,
    },
}

#[derive(Debug, Clone, Default, ClapArgs)]
pub struct EditArgs {
    #[arg(long)]
    pub strategy: Option<Strategy>,

    /// Pin a service to a GPU, as SERVICE=INDEX (repeatable)
    #[arg(long = "assign", value_parser = parse_pair::<u32>)]
    pub assign: Vec<(String, u32)>,

    /// Unassign a service (repeatable)
    #[arg(long = "unassign")]
    pub unassign: Vec<String>,

    /// Override a service's VRAM budget, as SERVICE=MB (repeatable)
    #[arg(long = "vram", value_parser = parse_pair::<u64>)]
    pub vram: Vec<(String, u64)>,

    /// Drop a service's VRAM budget override (repeatable)
    #[arg(long = "clear-vram")]
    pub clear_vram: Vec<String>,
}

/// Parse `name=value`.
pub fn parse_pair<T: FromStr>(s: &str) -> Result<(String, T), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected SERVICE=VALUE, got '{s}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing service name in '{s}'"));
    }
    let value = value
        .trim()
        .parse()
        .map_err(|_| format!("invalid value '{}' for {name}", value.trim()))?;
    Ok((name.to_string(), value))
}
