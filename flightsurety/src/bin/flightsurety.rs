use std::{
    backtrace::{Backtrace, BacktraceStatus},
    fs,
    path::PathBuf,
    sync::Arc,
};

use alloy::primitives::U256;
use anyhow::{anyhow, Result};
use clap::Parser;
use flightsurety::{
    api,
    cfg::Config,
    facade::AppClient,
    gateway::Gateway,
    node::{NodeParams, OracleNode},
    registry::{OracleIdentity, OracleRegistry},
    rpc::RpcGateway,
    sim::{SimLedger, SimParams},
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
struct Args {
    #[clap(long, short, default_values = ["config.toml"])]
    config_file: Vec<PathBuf>,
    #[clap(long, default_value = "false")]
    log_json: bool,
    /// Run against the in-process simulated ledger instead of a live chain.
    #[clap(long, default_value = "false")]
    sim: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let builder = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_line_number(true)
        .with_ansi(false);
    if args.log_json {
        builder.json().init();
    } else {
        builder.init();
    }

    // Record panics as `tracing` events rather than stderr noise.
    std::panic::set_hook(Box::new(|panic| {
        let message = match panic.payload().downcast_ref::<&'static str>() {
            Some(s) => *s,
            None => match panic.payload().downcast_ref::<String>() {
                Some(s) => &s[..],
                None => "Box<dyn Any>",
            },
        };
        let backtrace = Backtrace::capture();
        let backtrace =
            (backtrace.status() == BacktraceStatus::Captured).then(|| backtrace.to_string());
        match (panic.location(), backtrace) {
            (Some(location), Some(backtrace)) => {
                tracing::error!(message, panic.file = location.file(), panic.line = location.line(), %backtrace);
            }
            (Some(location), None) => {
                tracing::error!(message, panic.file = location.file(), panic.line = location.line());
            }
            (None, Some(backtrace)) => {
                tracing::error!(message, %backtrace);
            }
            (None, None) => {
                tracing::error!(message);
            }
        }
    }));

    let mut merged_config = toml::Table::new();
    for config_file in &args.config_file {
        if !config_file.exists() && args.sim {
            // The simulation needs no mandatory settings; a missing default
            // config file is fine there.
            continue;
        }
        let config = fs::read_to_string(config_file)?;
        let config: toml::Table = toml::from_str(&config)?;
        for key in config.keys() {
            if merged_config.contains_key(key) {
                return Err(anyhow!(
                    "configuration conflict: {config_file:?} contained a key {key:?} that was already included in an earlier file"
                ));
            }
        }
        merged_config.extend(config);
    }
    let config: Config = serde::Deserialize::deserialize(merged_config)?;

    let registry = OracleRegistry::provision(&config.oracles)?;

    let (gateway, query_sender): (Arc<dyn Gateway>, _) = if args.sim {
        let owner = OracleIdentity::derived(config.oracles.seed, "owner", 0).address();
        let ledger = Arc::new(SimLedger::new(SimParams::from_config(owner, &config)));
        // Fund the seeded first airline so the simulated flow is live from
        // the start.
        ledger
            .fund(
                owner,
                owner,
                U256::from(config.airlines.participation_fee),
            )
            .await?;
        info!(%owner, "running against the simulated ledger");
        (ledger, owner)
    } else {
        let chain = config
            .chain
            .clone()
            .ok_or_else(|| anyhow!("a [chain] section is required unless --sim is given"))?;
        let client = OracleIdentity::from_hex(&chain.client_secret_key)?;
        let query_sender = client.address();
        let mut signers = vec![client.signer];
        signers.extend(registry.signers().cloned());
        let gateway =
            RpcGateway::connect(&chain.rpc_url, chain.app_address, signers).await?;
        (Arc::new(gateway), query_sender)
    };

    let params = NodeParams::from_config(&config, query_sender);
    let (handle, node_task) = OracleNode::spawn(gateway.clone(), registry, params).await?;

    let client = AppClient::new(handle, gateway, query_sender);
    let server = api::launch(client, config.api_port).await?;

    tokio::select! {
        result = node_task => {
            result??;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutting down");
        }
    }
    let _ = server.stop();
    Ok(())
}
