use std::env;

use crate::constants::envvars;

/// Load `.env` from the working directory, then from the directory of the
/// configured gateway document if one is set.
pub fn load_dotenv() {
    if dotenv::dotenv().is_ok() {
        log::debug!("Loaded local .env");
    }
    if let Ok(config_path) = env::var(envvars::CONFIG_PATH) {
        if let Some(dir) = std::path::Path::new(&config_path).parent() {
            let dotenv_path = dir.join(".env");
            if dotenv::from_path(&dotenv_path).is_ok() {
                log::debug!("Loaded {}", dotenv_path.display());
            }
        }
    }
}
