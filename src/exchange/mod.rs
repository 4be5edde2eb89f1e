//! Poll, detect, dispatch, forward, acknowledge.
//!
//! [`Engine`] builds everything explicitly from a [`Config`]: one
//! [`DeviceRuntime`] (connection pool) per device, one poller task per
//! flagged tag, one bounded mailbox and one dispatch loop feeding
//! [`Handlers`]. A reload tears the whole generation down and builds the
//! next one.

pub mod broker;
pub mod detect;
mod device;
pub mod events;
mod handlers;
mod poller;

use std::sync::Arc;

use anyhow::{anyhow, Result};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::connection::PoolStats;
use crate::data_mgmt::{AckLedger, SnapshotStore};
use crate::interfaces::Forwarders;
use crate::node_mgmt::config::{self, Config};
use crate::node_mgmt::settings::EngineSettings;
use crate::readers::DriverRegistry;

pub use broker::{dispatch_loop, mailbox, EventHandler, Publisher};
pub use device::DeviceRuntime;
pub use events::{TagContext, TagEvent};
pub use handlers::{ack_code, Handlers};

/// What pollers and handlers of one generation share.
pub struct Services {
    pub settings: EngineSettings,
    pub snapshot: Arc<SnapshotStore>,
    pub ledger: Arc<AckLedger>,
    pub forwarders: Forwarders,
}

struct Generation {
    token: CancellationToken,
    devices: Vec<Arc<DeviceRuntime>>,
    tasks: Vec<JoinHandle<()>>,
    dispatch: JoinHandle<usize>,
}

impl Generation {
    async fn stop(self) {
        self.token.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                log::error!("Engine task ended abnormally: {}", e);
            }
        }
        match self.dispatch.await {
            Ok(handled) => log::info!("Dispatch loop handled {} event(s)", handled),
            Err(e) => log::error!("Dispatch loop ended abnormally: {}", e),
        }
        for device in &self.devices {
            device.pool.close().await;
        }
    }
}

pub struct Engine {
    registry: DriverRegistry,
    forwarders: Forwarders,
    snapshot: Arc<SnapshotStore>,
    ledger: Arc<AckLedger>,
    token: CancellationToken,
    config: Mutex<Config>,
    current: Mutex<Option<Generation>>,
}

impl Engine {
    /// Validate the document and open the ack ledger. Nothing runs until
    /// [`start`](Self::start).
    pub async fn build(
        config: Config,
        registry: DriverRegistry,
        forwarders: Forwarders,
        token: CancellationToken,
    ) -> Result<Self> {
        config::validate(&config)?;
        check_drivers(&config, &registry)?;

        let ledger = match &config.settings.ack_ledger_path {
            Some(path) => AckLedger::open(path).await?,
            None => AckLedger::in_memory(),
        };

        Ok(Self {
            registry,
            forwarders,
            snapshot: Arc::new(SnapshotStore::new()),
            ledger: Arc::new(ledger),
            token,
            config: Mutex::new(config),
            current: Mutex::new(None),
        })
    }

    pub fn snapshot(&self) -> &Arc<SnapshotStore> {
        &self.snapshot
    }

    pub fn ledger(&self) -> &Arc<AckLedger> {
        &self.ledger
    }

    pub async fn is_running(&self) -> bool {
        self.current.lock().await.is_some()
    }

    /// Start pollers and the dispatch loop for the current document. Does
    /// nothing when already running.
    pub async fn start(&self) -> Result<()> {
        let mut current = self.current.lock().await;
        if current.is_some() {
            return Ok(());
        }
        let config = self.config.lock().await.clone();
        *current = Some(self.spawn_generation(&config)?);
        Ok(())
    }

    /// Stop the running generation, waiting for its tasks to finish.
    pub async fn shutdown(&self) {
        if let Some(generation) = self.current.lock().await.take() {
            generation.stop().await;
            log::info!("Engine stopped");
        }
    }

    /// Replace the topology. The snapshot store is cleared and every pool of
    /// the old generation closed before the new one starts.
    pub async fn reload(&self, config: Config) -> Result<()> {
        config::validate(&config)?;
        check_drivers(&config, &self.registry)?;

        let mut current = self.current.lock().await;
        let was_running = current.is_some();
        if let Some(generation) = current.take() {
            generation.stop().await;
        }
        self.snapshot.clear();
        *self.config.lock().await = config.clone();
        log::info!("Configuration reloaded");

        if was_running {
            *current = Some(self.spawn_generation(&config)?);
        }
        Ok(())
    }

    /// Pool statistics per device, keyed `channel/device`.
    pub async fn pool_stats(&self) -> Vec<(String, PoolStats)> {
        let current = self.current.lock().await;
        current
            .iter()
            .flat_map(|g| g.devices.iter())
            .map(|d| (d.pool.inner().name().to_string(), d.pool_stats()))
            .collect()
    }

    fn spawn_generation(&self, config: &Config) -> Result<Generation> {
        let settings = config.settings.clone();
        let token = self.token.child_token();
        let services = Arc::new(Services {
            settings: settings.clone(),
            snapshot: self.snapshot.clone(),
            ledger: self.ledger.clone(),
            forwarders: self.forwarders.clone(),
        });

        let (publisher, rx) = mailbox(settings.mailbox_capacity);
        let handlers = Arc::new(Handlers::new(services.clone(), publisher.clone(), token.clone()));
        let dispatch = tokio::spawn(dispatch_loop(rx, handlers, token.clone()));

        let mut devices = Vec::new();
        let mut tasks = Vec::new();
        for channel in &config.channels {
            let Some(factory) = self.registry.get(&channel.driver) else {
                token.cancel();
                return Err(anyhow!("Unknown driver kind '{}'", channel.driver));
            };
            let channel_ref = Arc::new(channel.clone());

            for device in &channel.devices {
                let runtime = Arc::new(DeviceRuntime::new(
                    channel_ref.clone(),
                    Arc::new(device.clone()),
                    factory.clone(),
                    &settings,
                ));
                tasks.push(runtime.spawn_sweeper(&settings, token.clone()));

                let flagged: Vec<_> = device
                    .flagged_tags()
                    .map(|(group, tag)| {
                        let index = group.and_then(|g| {
                            device.tag_groups.iter().position(|x| std::ptr::eq(x, g))
                        });
                        (index, tag.clone())
                    })
                    .collect();
                log::info!(
                    "[{}/{}] Starting {} poller(s)",
                    channel.name,
                    device.name,
                    flagged.len()
                );
                for (group, tag) in flagged {
                    let ctx = Arc::new(TagContext::new(runtime.clone(), group, tag));
                    tasks.push(tokio::spawn(poller::run_poller(
                        ctx,
                        services.clone(),
                        publisher.clone(),
                        token.clone(),
                    )));
                }
                devices.push(runtime);
            }
        }

        Ok(Generation {
            token,
            devices,
            tasks,
            dispatch,
        })
    }
}

fn check_drivers(config: &Config, registry: &DriverRegistry) -> Result<()> {
    for channel in &config.channels {
        if registry.get(&channel.driver).is_none() {
            return Err(anyhow!(
                "Channel '{}' uses unknown driver kind '{}' (known: {})",
                channel.name,
                channel.driver,
                registry.kinds().join(", ")
            ));
        }
    }
    Ok(())
}
