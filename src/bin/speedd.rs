//! speedd - speed trap receiver daemon
//!
//! This daemon:
//! 1. Loads the receiver configuration (file, then environment)
//! 2. Opens the measurement log, status store and alert socket
//! 3. Accepts one frame producer at a time and measures vehicle speeds
//! 4. Re-accepts after every disconnect until Ctrl-C

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::mpsc;

use speedtrap_kernel::{
    build_backend, DominantColorClassifier, ReceiverConfig, ReceiverServer, ReceiverSink,
    SinkWorker,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Speed trap frame receiver")]
struct Args {
    /// Config file (.toml or .json).
    #[arg(long, env = "SPEEDTRAP_CONFIG")]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = ReceiverConfig::load_from(args.config.as_deref())?;
    log::info!(
        "boundaries {:?} at {} and {} (margin {}), distance {}, limit {} {}",
        config.boundaries.orientation,
        config.boundaries.first,
        config.boundaries.second,
        config.margin,
        config.distance,
        config.speed_limit,
        config.unit.label()
    );

    let sink = ReceiverSink::from_settings(&config.sinks)?;
    let worker = SinkWorker::spawn(Box::new(sink), config.sinks.queue_capacity)?;
    let detector = build_backend(&config.detector)?;

    let handle = ReceiverServer::new(config).spawn(
        detector,
        Box::new(DominantColorClassifier::new()),
        worker.handle(),
    )?;

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

    log::info!("speedd waiting for producers on {} (Ctrl-C to stop)", handle.addr);
    let _ = rx.recv();
    log::info!("shutdown signal received, stopping receiver...");
    handle.stop()?;
    worker.shutdown()?;

    Ok(())
}
