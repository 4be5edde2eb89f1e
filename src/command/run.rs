use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use crate::argsets::ConfigPathArgs;
use tagex::interfaces::LogForwarder;
use tagex::node_mgmt::config;
use tagex::readers::simulator::{self, SimulatorFactory};
use tagex::readers::DriverRegistry;
use tagex::Engine;

/// Run the engine against the built-in simulator until Ctrl-C.
pub fn run(args: ConfigPathArgs) -> Result<()> {
    let path = args.resolve();
    let config = config::load(&path).with_context(|| format!("Invalid configuration {}", path.display()))?;
    log::info!("Loaded configuration from {}", path.display());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        let mut registry = DriverRegistry::new();
        registry.register(simulator::DRIVER_KIND, Arc::new(SimulatorFactory::default()));

        let token = CancellationToken::new();
        let engine = Engine::build(config, registry, LogForwarder::all(), token.clone()).await?;
        engine.start().await?;
        log::info!("Engine running, press Ctrl-C to stop");

        tokio::signal::ctrl_c().await?;
        log::info!("Shutting down");
        for (name, stats) in engine.pool_stats().await {
            log::info!(
                "[{}] opened {}, peak in use {}/{}",
                name,
                stats.opened,
                stats.used_peak,
                stats.max_size
            );
        }
        engine.shutdown().await;
        token.cancel();
        Ok(())
    })
}
