//! # rpcprovider
//!
//! Serves every endpoint listed in the config file until interrupted.
//!
//! ## Exit Codes
//!
//! | Code | Meaning |
//! |------|---------|
//! | 0 | Interrupted after a successful start |
//! | 1 | State tracker could not be built, or bad configuration |
//! | 2 | Fatal wiring error; nothing is left serving |

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

use provider_runtime::{
    init_logging, ProviderConfig, ProviderContainer, ProviderError, RejectedOverride,
};

/// Serve chain RPC endpoints as a relay provider.
#[derive(Debug, Parser)]
#[command(name = "rpcprovider", version)]
struct Cli {
    /// Provider config file (YAML).
    #[arg(long, short = 'c', default_value = "rpcprovider.yml")]
    config: PathBuf,

    /// Geolocation applied to every endpoint.
    #[arg(long)]
    geolocation: Option<u64>,

    /// Concurrent request cap per chain node.
    #[arg(long)]
    parallel_connections: Option<u32>,

    /// Name of the signing key.
    #[arg(long)]
    from: Option<String>,

    /// Relay cache backend address.
    #[arg(long = "cache-be")]
    cache_be: Option<String>,

    /// Emit JSON logs.
    #[arg(long)]
    log_json: bool,
}

impl Cli {
    fn apply(self, config: &mut ProviderConfig) {
        if let Some(geolocation) = self.geolocation {
            config.geolocation = geolocation;
        }
        if let Some(parallel) = self.parallel_connections {
            config.parallel_connections = parallel;
        }
        if let Some(from) = self.from {
            config.tx.from = Some(from);
        }
        if let Some(cache) = self.cache_be {
            config.cache_address = Some(cache);
        }
        if self.log_json {
            config.log.json = true;
        }
    }
}

fn load_config(cli: Cli) -> Result<(ProviderConfig, Vec<RejectedOverride>)> {
    let mut config = ProviderConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    let rejected = config.apply_env();
    cli.apply(&mut config);
    Ok((config, rejected))
}

async fn run(cli: Cli) -> Result<()> {
    let (config, rejected) = load_config(cli)?;
    init_logging(&config.log)?;
    for skipped in &rejected {
        warn!(var = skipped.var, value = %skipped.value, "{}", skipped.reason);
    }

    let container = ProviderContainer::from_config(config)?;
    info!(endpoints = container.endpoints.len(), "Starting rpcprovider");
    container.run().await?;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    match run(Cli::parse()).await {
        Ok(()) => {
            info!("rpcprovider stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            let code = match e.downcast_ref::<ProviderError>() {
                Some(provider_error) => provider_error.exit_code(),
                None => 1,
            };
            error!(error = %format!("{e:#}"), "rpcprovider exiting");
            eprintln!("rpcprovider: {e:#}");
            ExitCode::from(code as u8)
        }
    }
}
