mod check_config;
mod run;

pub use check_config::check_config;
pub use run::run;
