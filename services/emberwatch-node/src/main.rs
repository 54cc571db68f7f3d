use anyhow::{bail, Context};
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

use emberwatch_core::{logging, EmberwatchConfig};

mod runner;

const NODE_PROTOCOL_VERSION: u32 = 1;

#[derive(Debug, Serialize)]
struct NodeVersionHandshake {
    version: &'static str,
    protocol_version: u32,
    max_frame_bytes: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|arg| arg == "--version-json") {
        let handshake = NodeVersionHandshake {
            version: env!("CARGO_PKG_VERSION"),
            protocol_version: NODE_PROTOCOL_VERSION,
            max_frame_bytes: emberwatch_transport::MAX_FRAME_BYTES,
        };
        println!("{}", serde_json::to_string(&handshake)?);
        return Ok(());
    }

    if args.iter().any(|arg| arg == "--json-logs") {
        logging::init_json();
    } else {
        logging::init();
    }

    let config = match parse_config_path(&args)? {
        Some(path) => EmberwatchConfig::from_file(&path)
            .with_context(|| format!("loading run file {}", path.display()))?,
        None => {
            info!("No --config given, running the built-in scenario");
            EmberwatchConfig::default_config()
        }
    };

    info!(
        drones = config.drone.count,
        zones = config.zones.len(),
        incidents = config.incidents.len(),
        transport = ?config.network.transport,
        time_scale = config.simulation.time_scale,
        "Emberwatch node starting"
    );

    tokio::select! {
        summary = runner::run(&config) => {
            let summary = summary?;
            info!(
                extinguished = summary.fires_extinguished,
                incidents = summary.incidents_reported,
                drones_stopped = summary.drones_stopped,
                drones_faulted = summary.drones_faulted,
                "Run complete"
            );
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, stopping");
        }
    }
    Ok(())
}

fn parse_config_path(args: &[String]) -> anyhow::Result<Option<PathBuf>> {
    let mut args_iter = args.iter();
    while let Some(arg) = args_iter.next() {
        if arg == "--config" {
            match args_iter.next() {
                Some(path) => return Ok(Some(PathBuf::from(path))),
                None => bail!("--config was provided without a path"),
            }
        }
    }
    Ok(None)
}
