//! Pools of reusable device connections.
//!
//! [`ConnectPool`] is generic over anything [`Connectable`]; [`SocketPool`]
//! adds permit-based admission control in front of it and is what the engine
//! keeps per device.

mod pool;
mod socket_pool;

use async_trait::async_trait;

use crate::errors::TagError;
use crate::readers::Driver;

pub use pool::{ConnectPool, PoolSettings, PoolStats, Pooled};
pub use socket_pool::{Lease, SocketPool};

/// Capability surface a pooled connector needs.
#[async_trait]
pub trait Connectable: Send + 'static {
    async fn open(&mut self) -> Result<(), TagError>;

    async fn close(&mut self);

    /// False once the connector can no longer carry requests.
    fn is_usable(&self) -> bool;
}

#[async_trait]
impl Connectable for Box<dyn Driver> {
    async fn open(&mut self) -> Result<(), TagError> {
        (**self).open().await
    }

    async fn close(&mut self) {
        (**self).close().await
    }

    fn is_usable(&self) -> bool {
        (**self).is_open()
    }
}
