//! Configuration view and validation commands (`repo-migrator config`).

use anyhow::Result;
use std::path::PathBuf;

use repo_migrator::config::Config;
use repo_migrator::migrator_config::MigratorToml;

use super::super::{Cli, ConfigCommands};

pub fn cmd_config(cli: &Cli, project_dir: PathBuf, command: Option<ConfigCommands>) -> Result<()> {
    // `init` must work before any configuration exists.
    if let Some(ConfigCommands::Init) = command {
        return init_config(cli, project_dir);
    }

    let config = Config::new(project_dir, cli.config.clone(), cli.verbose, cli.yes)?;
    let toml = &config.toml;

    match command {
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            let warnings = toml.validate();
            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        _ => {
            println!();
            println!("Migrator Configuration");
            println!("======================");
            println!();

            if config.config_file.exists() {
                println!("Config file: {}", config.config_file.display());
            } else {
                println!("No migrator.toml found at {}", config.config_file.display());
                println!("Using default configuration.");
            }
            println!();

            println!("[source]");
            if let Some(base) = &toml.source.base_url {
                println!("  base_url = \"{}\"", base);
            }
            println!();

            println!("[destination]");
            println!("  api_url = \"{}\"", toml.destination.api_url);
            println!("  git_url = \"{}\"", toml.destination.git_url);
            if let Some(org) = &toml.destination.org {
                println!("  org = \"{}\"", org);
            }
            println!("  token_env = \"{}\"", toml.destination.token_env);
            println!("  private = {}", toml.destination.private);
            println!();

            println!("[migration]");
            println!(
                "  empty_destination = \"{}\"",
                toml.migration.empty_destination
            );
            println!("  save_debounce_ms = {}", toml.migration.save_debounce_ms);
            println!("  backup_retention = {}", toml.migration.backup_retention);
            println!("  keep_local = {}", toml.migration.keep_local);
            println!();

            println!("[retry]");
            println!("  base_delay_ms = {}", toml.retry.base_delay_ms);
            println!("  max_delay_ms = {}", toml.retry.max_delay_ms);
            for (category, max) in &toml.retry.max_retries {
                println!("  max_retries.{} = {}", category, max);
            }
            println!();

            println!("Repositories: {}", toml.repositories.len());
            println!();

            println!("Effective values (with env/CLI overrides):");
            println!(
                "  org = \"{}\"",
                toml.org().unwrap_or_else(|| "<unset>".to_string())
            );
            println!("  git_cmd = \"{}\"", config.git_cmd());
            println!(
                "  token = {}",
                if config.github_token().is_some() {
                    "set"
                } else {
                    "not set"
                }
            );
            println!("  assume_yes = {}", config.yes);
            println!();
        }
    }

    Ok(())
}

fn init_config(cli: &Cli, project_dir: PathBuf) -> Result<()> {
    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => project_dir
            .join(repo_migrator::config::MIGRATOR_DIR)
            .join(repo_migrator::migrator_config::CONFIG_FILE_NAME),
    };

    if config_path.exists() {
        println!("migrator.toml already exists at {}", config_path.display());
        println!("Delete it first if you want to recreate it.");
        return Ok(());
    }

    if let Some(parent) = config_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }

    MigratorToml::template().save(&config_path)?;

    println!("Created migrator.toml at {}", config_path.display());
    println!();
    println!("You can now customize:");
    println!("  - [destination] org, token_env");
    println!("  - [source] base_url");
    println!("  - [[repositories]] entries to migrate");
    println!();
    Ok(())
}
