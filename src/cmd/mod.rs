//! CLI command implementations.
//!
//! | Module   | Commands handled   |
//! |----------|--------------------|
//! | `run`    | `Run`              |
//! | `status` | `Status`, `List`   |
//! | `config` | `Config`           |

pub mod config;
pub mod run;
pub mod status;

pub use config::cmd_config;
pub use run::cmd_run;
pub use status::{cmd_list, cmd_status};

/// Split a comma-separated `--only` value into repository names.
pub fn parse_only(only: Option<&str>) -> Vec<String> {
    only.map(|value| {
        value
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(String::from)
            .collect()
    })
    .unwrap_or_default()
}
