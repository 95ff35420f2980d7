use clap::Parser;

#[derive(Debug, Parser)]
#[command(author, version, about = "Simulated GPU configuration backend")]
pub struct Args {
    #[arg(long, env = "VIGIL_SIM_ADDR", default_value = "127.0.0.1:18000")]
    pub listen_addr: String,

    /// Number of simulated GPUs.
    #[arg(long, default_value_t = 2)]
    pub gpus: u32,

    /// Health reads a restarted service spends in `restarting` before it comes up.
    #[arg(long, default_value_t = 2)]
    pub restart_ticks: u32,

    /// Require this bearer token on every request.
    #[arg(long, env = "VIGIL_SIM_TOKEN")]
    pub token: Option<String>,

    #[arg(long, env = "VIGIL_OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,

    #[arg(long, env = "VIGIL_OTLP_TOKEN")]
    pub otlp_token: Option<String>,
}
