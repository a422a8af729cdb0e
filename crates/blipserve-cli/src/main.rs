mod cli;
mod client;
mod demo;
mod protocol;
mod smoke;

use anyhow::{Context, Result};
use blipserve_core::Device;
use clap::Parser;
use cli::{Cli, Command};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    std::env::set_var("RUST_LOG", &cli.log);
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    match cli.command {
        Command::Demo { url, task } => demo::run(&url, task).await,
        Command::Smoke { device, task } => {
            let device = parse_device(&device)?;
            // ORT calls block; keep them off the async workers
            tokio::task::spawn_blocking(move || smoke::run(task, device))
                .await
                .context("smoke task panicked")?
        }
    }
}

fn parse_device(raw: &str) -> Result<Device> {
    if raw.eq_ignore_ascii_case("cpu") {
        return Ok(Device::Cpu);
    }

    if let Some(rest) = raw.strip_prefix("cuda:") {
        let device_id: u32 = rest.parse().context("invalid cuda device id")?;
        return Ok(Device::Cuda { device_id });
    }

    anyhow::bail!("unsupported device: {raw} (expected cpu or cuda:N)");
}
