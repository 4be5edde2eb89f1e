mod argsets;
mod command;

use anyhow::{anyhow, Result};
use env_logger::Env;

use tagex::constants::{defaults, envvars};
use tagex::helpers::load_dotenv;

const CMD_CHECK_CONFIG: &str = "check-config";
const CMD_RUN: &str = "run";

fn main() -> Result<()> {
    load_dotenv();
    env_logger::Builder::from_env(Env::default().filter_or(envvars::LOG_LEVEL, defaults::LOG_LEVEL))
        .init();

    let mut args = pico_args::Arguments::from_env();
    match args.subcommand()?.as_deref() {
        Some(CMD_CHECK_CONFIG) => command::check_config(argsets::ConfigPathArgs {
            path: args.opt_free_from_str()?,
        }),
        Some(CMD_RUN) => command::run(argsets::ConfigPathArgs {
            path: args.opt_free_from_str()?,
        }),
        _ => Err(anyhow!(
            "Subcommand must be one of '{}', '{}'",
            CMD_CHECK_CONFIG,
            CMD_RUN
        )),
    }
}
