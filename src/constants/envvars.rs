pub const LOG_LEVEL: &str = "LOG_LEVEL";
pub const CONFIG_PATH: &str = "TAGEX_CONFIG";
