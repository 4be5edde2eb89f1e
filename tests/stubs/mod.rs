#![allow(dead_code)]

pub mod config;
pub mod forwarders;

use std::sync::Arc;
use std::time::Duration;

use tagex::node_mgmt::{Config, Tag};
use tagex::readers::simulator::{self, SimulatorFactory};
use tagex::readers::DriverRegistry;

pub fn simulator_registry() -> (DriverRegistry, Arc<SimulatorFactory>) {
    let factory = Arc::new(SimulatorFactory::default());
    let mut registry = DriverRegistry::new();
    registry.register(simulator::DRIVER_KIND, factory.clone());
    (registry, factory)
}

/// Any tag of the document by name, companions and callback tags included.
pub fn tag(config: &Config, name: &str) -> Tag {
    config
        .channels
        .iter()
        .flat_map(|c| c.devices.iter())
        .flat_map(|d| d.all_tags())
        .find(|t| t.name == name)
        .cloned()
        .unwrap_or_else(|| panic!("no tag named {name}"))
}

/// Poll `check` until it holds or a few seconds have passed.
pub async fn eventually(what: &str, check: impl Fn() -> bool) {
    for _ in 0..500 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}
