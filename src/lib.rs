pub mod connection;
pub mod constants;
pub mod data_mgmt;
pub mod errors;
pub mod exchange;
pub mod helpers;
pub mod interfaces;
pub mod node_mgmt;
pub mod readers;

pub use errors::TagError;
pub use exchange::Engine;
pub use node_mgmt::{Config, ConfigError};
