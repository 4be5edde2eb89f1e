use anyhow::{Context, Result};
use itertools::Itertools;

use crate::argsets::ConfigPathArgs;
use tagex::node_mgmt::{config, Flag};

pub fn check_config(args: ConfigPathArgs) -> Result<()> {
    let path = args.resolve();
    let config = config::load(&path).with_context(|| format!("Invalid configuration {}", path.display()))?;

    let devices = config.channels.iter().flat_map(|c| c.devices.iter()).collect_vec();
    let tags = devices.iter().flat_map(|d| d.all_tags()).collect_vec();
    let by_flag = tags.iter().map(|t| t.flag).counts();
    let count = |flag: Flag| by_flag.get(&flag).copied().unwrap_or(0);

    println!("Configuration OK: {}", path.display());
    println!(
        "  {} channel(s), {} device(s), {} tag(s)",
        config.channels.len(),
        devices.len(),
        tags.len()
    );
    println!(
        "  heartbeat: {}, trigger: {}, notice: {}, switch: {}",
        count(Flag::Heartbeat),
        count(Flag::Trigger),
        count(Flag::Notice),
        count(Flag::Switch)
    );
    Ok(())
}
