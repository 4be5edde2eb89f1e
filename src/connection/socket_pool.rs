use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use super::{ConnectPool, Connectable, PoolSettings, PoolStats, Pooled};
use crate::errors::TagError;

/// [`ConnectPool`] behind a counting semaphore sized to the pool. Callers
/// queue on the semaphore instead of polling the pool.
pub struct SocketPool<T: Connectable> {
    pool: ConnectPool<T>,
    permits: Arc<Semaphore>,
}

impl<T: Connectable> Clone for SocketPool<T> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            permits: self.permits.clone(),
        }
    }
}

impl<T: Connectable> SocketPool<T> {
    pub fn new<F>(name: impl Into<String>, settings: PoolSettings, factory: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        let pool = ConnectPool::new(name, settings, factory);
        let permits = Arc::new(Semaphore::new(pool.max_size()));
        Self { pool, permits }
    }

    /// Take a permit, then a connector. The permit is held until the lease
    /// is released.
    pub async fn acquire(&self) -> Result<Lease<T>, TagError> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| TagError::ConnectionUnavailable(format!("{}: pool closed", self.pool.name())))?;
        let conn = self.pool.acquire().await?;
        Ok(Lease {
            conn,
            _permit: permit,
        })
    }

    pub fn inner(&self) -> &ConnectPool<T> {
        &self.pool
    }

    pub fn stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Fail pending and future acquires and close idle connectors.
    pub async fn close(&self) {
        self.permits.close();
        self.pool.reset().await;
    }
}

/// A connector plus the admission permit it was acquired under.
pub struct Lease<T: Connectable> {
    // dropped first: the connector is back in the pool before the permit frees
    conn: Pooled<T>,
    _permit: OwnedSemaphorePermit,
}

impl<T: Connectable> Lease<T> {
    pub fn release(self) {}

    /// Give the lease back after a transport failure: close this connector,
    /// close every idle one from the same pool, then free the permit.
    pub async fn release_poisoned(self) {
        let Lease { conn, _permit } = self;
        let pool = conn.pool();
        conn.discard().await;
        let evicted = pool.evict_idle().await;
        log::debug!(
            "[{}] Connector poisoned, also evicted {} idle",
            pool.name(),
            evicted
        );
        drop(_permit);
    }
}

impl<T: Connectable> Deref for Lease<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.conn
    }
}

impl<T: Connectable> DerefMut for Lease<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.conn
    }
}
