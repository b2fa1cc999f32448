//! Read-only views of the project (`repo-migrator status` and `repo-migrator list`).

use anyhow::{Context, Result, bail};
use console::style;
use std::path::PathBuf;

use repo_migrator::config::Config;
use repo_migrator::orchestrator::RunSummary;
use repo_migrator::record::MigrationRecordStore;
use repo_migrator::ui::{print_record, print_summary};

use super::super::Cli;

pub fn cmd_status(cli: &Cli, project_dir: PathBuf, name: Option<&str>) -> Result<()> {
    let config = Config::new(project_dir, cli.config.clone(), cli.verbose, cli.yes)?;

    println!();
    println!("Migration Status");
    println!("================");
    println!();

    let entities = config.entities();
    if entities.is_empty() {
        println!("No repositories configured.");
        println!();
        println!("Run 'repo-migrator config init' to create a starter configuration.");
        println!();
        return Ok(());
    }

    if !config.state_file.exists() {
        println!(
            "No migration has run yet ({} repositories configured).",
            entities.len()
        );
        println!();
        println!("Run 'repo-migrator run' to start.");
        println!();
        return Ok(());
    }

    // Loading prunes orphans in memory only; nothing is written back here.
    let store = MigrationRecordStore::load(&config.state_file, &entities, config.store_options())
        .context("Failed to load migration records")?;

    if let Some(name) = name {
        if !entities.iter().any(|e| e.name == name) {
            bail!("Unknown repository '{}'", name);
        }
        match store.get(name) {
            Some(record) => print_record(record),
            None => println!("{} has not started", style(name).bold()),
        }
        println!();
        return Ok(());
    }

    println!(
        "State file: {}",
        config.relative_to_project(store.path()).display()
    );
    if !store.pruned().is_empty() {
        println!(
            "Ignoring records no longer configured: {}",
            store.pruned().join(", ")
        );
    }
    println!();

    for entity in &entities {
        match store.get(&entity.name) {
            Some(record) => print_record(record),
            None => println!("   {:<30} {}", entity.name, style("not started").dim()),
        }
    }

    print_summary(&RunSummary::from_store(&store, 0));
    Ok(())
}

pub fn cmd_list(cli: &Cli, project_dir: PathBuf) -> Result<()> {
    let config = Config::new(project_dir, cli.config.clone(), cli.verbose, cli.yes)?;
    let toml = &config.toml;

    if toml.repositories.is_empty() {
        println!();
        println!("No repositories configured.");
        println!();
        return Ok(());
    }

    let org = toml.org().unwrap_or_else(|| "<unset>".to_string());

    println!();
    println!("Destination organization: {}", org);
    println!();
    println!("{:<30} Source", "Repository");
    println!("{:<30} ------", "-".repeat(30));

    for entry in &toml.repositories {
        let source = toml
            .source_for(entry)
            .unwrap_or_else(|| "<no source>".to_string());
        println!("{:<30} {}", entry.name, source);
        if cli.verbose && !entry.description.is_empty() {
            println!("{:<30} {}", "", style(&entry.description).dim());
        }
    }

    println!();
    println!("{} repositories", toml.repositories.len());
    println!();
    Ok(())
}
