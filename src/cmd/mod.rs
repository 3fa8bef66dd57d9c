//! CLI command implementations.
//!
//! Each submodule owns one `Commands` variant:
//!
//! | Module   | Commands handled |
//! |----------|------------------|
//! | `serve`  | `Serve`          |
//! | `run`    | `Run`            |
//! | `qa`     | `Qa`             |
//! | `config` | `Config`         |

pub mod config;
pub mod qa;
pub mod run;
pub mod serve;

pub use config::cmd_config;
pub use qa::cmd_qa;
pub use run::cmd_run;
pub use serve::cmd_serve;

use std::path::Path;

use anyhow::{Context, Result};

/// Read and parse a JSON document given on the command line.
fn read_json(path: &Path) -> Result<serde_json::Value> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("{} is not valid JSON", path.display()))
}
