use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::Connectable;
use crate::errors::TagError;

#[derive(Clone, Copy, Debug)]
pub struct PoolSettings {
    pub max_size: usize,
    /// Idle connectors older than this are closed by the next sweep.
    pub expiry: Duration,
    /// Wait between admission checks while the pool is at capacity.
    pub acquire_poll: Duration,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub max_size: usize,
    pub idle: usize,
    pub in_use: usize,
    /// Highest number of simultaneously checked-out connectors seen.
    pub used_peak: usize,
    pub opened: usize,
    pub evicted: usize,
}

type Factory<T> = Box<dyn Fn() -> T + Send + Sync>;

struct Idle<T> {
    connector: T,
    last_used: Instant,
}

struct PoolState<T> {
    idle: Vec<Idle<T>>,
    in_use: usize,
    opening: usize,
    /// Bumped by `reset`; connectors checked out under an older generation
    /// are closed instead of returned.
    generation: u64,
}

impl<T> PoolState<T> {
    fn tracked(&self) -> usize {
        self.idle.len() + self.in_use + self.opening
    }
}

struct Shared<T> {
    name: String,
    settings: PoolSettings,
    factory: Factory<T>,
    state: Mutex<PoolState<T>>,
    used_peak: AtomicUsize,
    opened: AtomicUsize,
    evicted: AtomicUsize,
}

impl<T: Connectable> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, PoolState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn give_back(&self, connector: T, generation: u64) {
        let stale = {
            let mut state = self.lock();
            state.in_use -= 1;
            if generation == state.generation && connector.is_usable() {
                state.idle.push(Idle {
                    connector,
                    last_used: Instant::now(),
                });
                None
            } else {
                Some(connector)
            }
        };
        if let Some(connector) = stale {
            self.evicted.fetch_add(1, Ordering::Relaxed);
            close_detached(connector);
        }
    }

    fn forget(&self) {
        self.lock().in_use -= 1;
        self.evicted.fetch_add(1, Ordering::Relaxed);
    }

    async fn close_all(&self, connectors: Vec<T>) -> usize {
        let n = connectors.len();
        for mut connector in connectors {
            connector.close().await;
        }
        self.evicted.fetch_add(n, Ordering::Relaxed);
        n
    }

    async fn evict_idle(&self) -> usize {
        let idle: Vec<T> = self.lock().idle.drain(..).map(|i| i.connector).collect();
        self.close_all(idle).await
    }
}

/// Close a connector from a synchronous context (e.g. `Drop`).
fn close_detached<T: Connectable>(mut connector: T) {
    if let Ok(handle) = tokio::runtime::Handle::try_current() {
        handle.spawn(async move { connector.close().await });
    }
}

/// Reserves a slot while a new connector is being opened. Dropping it (on
/// failure or cancellation) gives the slot back.
struct OpeningSlot<'a, T: Connectable> {
    shared: &'a Shared<T>,
    armed: bool,
}

impl<T: Connectable> OpeningSlot<'_, T> {
    /// Turn the reservation into a checked-out connector.
    fn commit(mut self) -> (usize, u64) {
        self.armed = false;
        let mut state = self.shared.lock();
        state.opening -= 1;
        state.in_use += 1;
        (state.in_use, state.generation)
    }
}

impl<T: Connectable> Drop for OpeningSlot<'_, T> {
    fn drop(&mut self) {
        if self.armed {
            self.shared.lock().opening -= 1;
        }
    }
}

enum Admission<T> {
    Reuse(T, usize, u64),
    Open,
    Wait,
}

/// Bounded pool of reusable connectors.
pub struct ConnectPool<T: Connectable> {
    shared: Arc<Shared<T>>,
}

impl<T: Connectable> Clone for ConnectPool<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T: Connectable> ConnectPool<T> {
    pub fn new<F>(name: impl Into<String>, settings: PoolSettings, factory: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self {
            shared: Arc::new(Shared {
                name: name.into(),
                settings: PoolSettings {
                    max_size: settings.max_size.max(1),
                    ..settings
                },
                factory: Box::new(factory),
                state: Mutex::new(PoolState {
                    idle: Vec::new(),
                    in_use: 0,
                    opening: 0,
                    generation: 0,
                }),
                used_peak: AtomicUsize::new(0),
                opened: AtomicUsize::new(0),
                evicted: AtomicUsize::new(0),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn max_size(&self) -> usize {
        self.shared.settings.max_size
    }

    /// Check out a connector: the most recently used idle one, else a newly
    /// opened one while below capacity, else wait until one comes back.
    pub async fn acquire(&self) -> Result<Pooled<T>, TagError> {
        loop {
            let mut unusable = Vec::new();
            let admission = {
                let mut state = self.shared.lock();
                let mut found = None;
                while let Some(idle) = state.idle.pop() {
                    if idle.connector.is_usable() {
                        found = Some(idle.connector);
                        break;
                    }
                    unusable.push(idle.connector);
                }
                match found {
                    Some(connector) => {
                        state.in_use += 1;
                        Admission::Reuse(connector, state.in_use, state.generation)
                    }
                    None if state.tracked() < self.shared.settings.max_size => {
                        state.opening += 1;
                        Admission::Open
                    }
                    None => Admission::Wait,
                }
            };
            if !unusable.is_empty() {
                log::debug!(
                    "[{}] Dropping {} idle connector(s) that are no longer usable",
                    self.shared.name,
                    unusable.len()
                );
                self.shared.close_all(unusable).await;
            }

            match admission {
                Admission::Reuse(connector, in_use, generation) => {
                    return Ok(self.checkout(connector, in_use, generation));
                }
                Admission::Open => {
                    let slot = OpeningSlot {
                        shared: &self.shared,
                        armed: true,
                    };
                    let mut connector = (self.shared.factory)();
                    if let Err(e) = connector.open().await {
                        log::warn!("[{}] Could not open connector: {}", self.shared.name, e);
                        return Err(TagError::ConnectionUnavailable(format!(
                            "{}: {}",
                            self.shared.name, e
                        )));
                    }
                    let (in_use, generation) = slot.commit();
                    self.shared.opened.fetch_add(1, Ordering::Relaxed);
                    log::debug!("[{}] Opened new connector", self.shared.name);
                    return Ok(self.checkout(connector, in_use, generation));
                }
                Admission::Wait => {
                    log::trace!("[{}] Pool exhausted, waiting", self.shared.name);
                    tokio::time::sleep(self.shared.settings.acquire_poll).await;
                }
            }
        }
    }

    fn checkout(&self, connector: T, in_use: usize, generation: u64) -> Pooled<T> {
        self.shared.used_peak.fetch_max(in_use, Ordering::Relaxed);
        Pooled {
            connector: Some(connector),
            generation,
            shared: self.shared.clone(),
        }
    }

    /// Close idle connectors that outlived the expiry. Returns how many
    /// were evicted.
    pub async fn sweep(&self) -> usize {
        let expiry = self.shared.settings.expiry;
        let expired: Vec<T> = {
            let mut state = self.shared.lock();
            let now = Instant::now();
            let (expired, keep): (Vec<_>, Vec<_>) = state
                .idle
                .drain(..)
                .partition(|i| now.duration_since(i.last_used) > expiry);
            state.idle = keep;
            expired.into_iter().map(|i| i.connector).collect()
        };
        let n = self.shared.close_all(expired).await;
        let stats = self.stats();
        log::debug!(
            "[{}] Sweep evicted {}; idle {}, in use {}/{} (peak {})",
            self.shared.name,
            n,
            stats.idle,
            stats.in_use,
            stats.max_size,
            stats.used_peak
        );
        n
    }

    /// Close every idle connector now and make sure connectors currently
    /// checked out are closed when they come back.
    pub async fn reset(&self) -> usize {
        let idle: Vec<T> = {
            let mut state = self.shared.lock();
            state.generation += 1;
            state.idle.drain(..).map(|i| i.connector).collect()
        };
        let n = self.shared.close_all(idle).await;
        log::info!("[{}] Pool reset, closed {} idle connector(s)", self.shared.name, n);
        n
    }

    /// Close every idle connector, leaving checked-out ones alone.
    pub async fn evict_idle(&self) -> usize {
        self.shared.evict_idle().await
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.shared.lock();
        PoolStats {
            max_size: self.shared.settings.max_size,
            idle: state.idle.len(),
            in_use: state.in_use,
            used_peak: self.shared.used_peak.load(Ordering::Relaxed),
            opened: self.shared.opened.load(Ordering::Relaxed),
            evicted: self.shared.evicted.load(Ordering::Relaxed),
        }
    }

    /// Run `sweep` every `every`, starting after `delay`, until cancelled.
    pub fn spawn_sweeper(
        &self,
        delay: Duration,
        every: Duration,
        token: CancellationToken,
    ) -> JoinHandle<()> {
        let pool = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            let mut ticker = tokio::time::interval(every);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        pool.sweep().await;
                    }
                }
            }
            log::debug!("[{}] Sweeper stopped", pool.name());
        })
    }
}

/// A checked-out connector. Dropping it returns the connector to the pool.
pub struct Pooled<T: Connectable> {
    connector: Option<T>,
    generation: u64,
    shared: Arc<Shared<T>>,
}

impl<T: Connectable> Pooled<T> {
    /// Return the connector to the pool as idle.
    pub fn release(self) {}

    /// Close the connector and drop it from the pool instead of returning it.
    pub async fn discard(mut self) {
        if let Some(mut connector) = self.connector.take() {
            connector.close().await;
            self.shared.forget();
        }
    }

    pub(super) fn pool(&self) -> ConnectPool<T> {
        ConnectPool {
            shared: self.shared.clone(),
        }
    }
}

impl<T: Connectable> Deref for Pooled<T> {
    type Target = T;

    fn deref(&self) -> &T {
        match &self.connector {
            Some(connector) => connector,
            None => unreachable!(), // only taken by discard/drop, which consume self
        }
    }
}

impl<T: Connectable> DerefMut for Pooled<T> {
    fn deref_mut(&mut self) -> &mut T {
        match &mut self.connector {
            Some(connector) => connector,
            None => unreachable!(),
        }
    }
}

impl<T: Connectable> Drop for Pooled<T> {
    fn drop(&mut self) {
        if let Some(connector) = self.connector.take() {
            self.shared.give_back(connector, self.generation);
        }
    }
}
