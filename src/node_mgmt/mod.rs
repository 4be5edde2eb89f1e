pub mod config;
pub mod settings;
pub mod topology;

pub use config::{Config, ConfigError};
pub use settings::EngineSettings;
pub use topology::{Channel, DataType, Device, Flag, PublishMode, Tag, TagGroup, TagId};
