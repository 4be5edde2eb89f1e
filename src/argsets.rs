use std::env;
use std::path::PathBuf;

use tagex::constants::{defaults, envvars};

pub struct ConfigPathArgs {
    pub path: Option<PathBuf>,
}

impl ConfigPathArgs {
    /// Command line first, then `TAGEX_CONFIG`, then `./tagex.json`.
    pub fn resolve(&self) -> PathBuf {
        self.path
            .clone()
            .or_else(|| env::var_os(envvars::CONFIG_PATH).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(defaults::CONFIG_PATH))
    }
}
