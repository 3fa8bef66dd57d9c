//! Configuration view and initialization commands: `shipyard config`.

use std::path::{Path, PathBuf};

use anyhow::Result;
use shipyard::config::{CONFIG_FILE, ShipyardToml};

use super::super::ConfigCommands;

pub fn cmd_config(config_path: Option<&Path>, command: Option<ConfigCommands>) -> Result<()> {
    let path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE));

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            if path.exists() {
                println!("Config file: {}", path.display());
            } else {
                println!("No {} found, using defaults.", path.display());
            }
            println!("Effective configuration (with env overrides):");
            println!();

            let config = ShipyardToml::load_or_default(path.exists().then_some(path.as_path()))?;
            print!("{}", config.to_toml()?);

            let warnings = config.validate();
            if !warnings.is_empty() {
                println!();
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Validate) => {
            let config = ShipyardToml::load_or_default(path.exists().then_some(path.as_path()))?;
            let warnings = config.validate();
            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in &warnings {
                    println!("  - {}", warning);
                }
                anyhow::bail!("{} configuration problem(s)", warnings.len());
            }
        }
        Some(ConfigCommands::Init) => {
            if path.exists() {
                println!("{} already exists.", path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent)?;
            }

            ShipyardToml::default().save(&path)?;

            println!("Created {}", path.display());
            println!();
            println!("You can now customize:");
            println!("  - [builder] kind, base_url, webdriver_url, storage_state");
            println!("  - [campaign] default_max_iterations, completion");
            println!("  - [llm] model, api_key_env");
            println!();
        }
    }

    Ok(())
}
