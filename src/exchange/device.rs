use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::connection::{Lease, PoolSettings, PoolStats, SocketPool};
use crate::data_mgmt::models::{PayloadData, TagValue};
use crate::errors::TagError;
use crate::node_mgmt::settings::EngineSettings;
use crate::node_mgmt::topology::{Channel, Device, Tag};
use crate::readers::{self, Driver, DriverFactory};

/// Per-device state of one engine generation: the device's connection pool
/// and the overrides resolved against the engine settings.
pub struct DeviceRuntime {
    pub channel: Arc<Channel>,
    pub device: Arc<Device>,
    pub pool: SocketPool<Box<dyn Driver>>,
    /// Request ceiling applied on top of what the driver advertises.
    pub max_pdu_size: Option<usize>,
    pub armed_value: i64,
}

impl DeviceRuntime {
    pub fn new(
        channel: Arc<Channel>,
        device: Arc<Device>,
        factory: Arc<dyn DriverFactory>,
        settings: &EngineSettings,
    ) -> Self {
        let pool_settings = PoolSettings {
            max_size: device.pool_size.unwrap_or(settings.pool_max_size),
            expiry: settings.pool_expiry(),
            acquire_poll: settings.pool_acquire_poll(),
        };
        let name = format!("{}/{}", channel.name, device.name);
        let (c, d) = (channel.clone(), device.clone());
        let pool = SocketPool::new(name, pool_settings, move || factory.create(&c, &d));

        Self {
            max_pdu_size: device.max_pdu_size.or(settings.max_pdu_size),
            armed_value: device
                .trigger_armed_value
                .unwrap_or(settings.trigger_armed_value),
            channel,
            device,
            pool,
        }
    }

    pub fn spawn_sweeper(&self, settings: &EngineSettings, token: CancellationToken) -> JoinHandle<()> {
        self.pool.inner().spawn_sweeper(
            settings.pool_sweep_delay(),
            settings.pool_sweep_interval(),
            token,
        )
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    async fn lease(&self, token: &CancellationToken) -> Result<Lease<Box<dyn Driver>>, TagError> {
        tokio::select! {
            lease = self.pool.acquire() => lease,
            _ = token.cancelled() => Err(TagError::cancelled()),
        }
    }

    /// Give the connection back, dropping it (and its idle peers) when the
    /// request left it in an unknown state.
    async fn finish<T>(lease: Lease<Box<dyn Driver>>, result: &Result<T, TagError>) {
        match result {
            Err(e) if e.poisons_connection() || e.is_cancelled() => lease.release_poisoned().await,
            _ => lease.release(),
        }
    }

    /// Batched read of `tags` over one pooled connection.
    pub async fn read(
        &self,
        tags: &[Tag],
        token: &CancellationToken,
    ) -> Result<Vec<PayloadData>, TagError> {
        if tags.is_empty() {
            return Ok(Vec::new());
        }
        let mut lease = self.lease(token).await?;
        let result = tokio::select! {
            values = readers::read_tags(&mut **lease, tags, self.max_pdu_size) => values,
            _ = token.cancelled() => Err(TagError::cancelled()),
        };
        Self::finish(lease, &result).await;
        result
    }

    pub async fn read_one(&self, tag: &Tag, token: &CancellationToken) -> Result<PayloadData, TagError> {
        let mut values = self.read(std::slice::from_ref(tag), token).await?;
        values
            .pop()
            .ok_or_else(|| TagError::BatchDecode(format!("no value returned for '{}'", tag.name)))
    }

    pub async fn write(
        &self,
        tag: &Tag,
        value: &TagValue,
        token: &CancellationToken,
    ) -> Result<PayloadData, TagError> {
        let mut lease = self.lease(token).await?;
        let result = tokio::select! {
            written = readers::write_tag(&mut **lease, tag, value) => written,
            _ = token.cancelled() => Err(TagError::cancelled()),
        };
        Self::finish(lease, &result).await;
        result
    }
}
