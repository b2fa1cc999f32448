//! Plain-text rendering of run summaries and per-repository status.

use crate::orchestrator::RunSummary;
use crate::record::MigrationRecord;
use crate::ui::icons::{CHECK, CROSS, WARN};
use console::style;

pub fn print_summary(summary: &RunSummary) {
    println!();
    println!("{}", style("═".repeat(70)).cyan());
    println!("{}", style("Migration summary").bold());
    println!("{}", style("═".repeat(70)).cyan());
    println!(
        "  {} succeeded   {} failed   {} with warnings   {} pending   ({} skipped this run)",
        style(summary.succeeded).green().bold(),
        style(summary.failed).red().bold(),
        style(summary.warned).yellow().bold(),
        summary.pending,
        summary.skipped
    );
    println!(
        "  Success rate: {}",
        style(format!("{:.1}%", summary.success_rate())).cyan()
    );

    if !summary.failures.is_empty() {
        println!();
        println!("{}", style("Needs manual attention:").red().underlined());
        for failure in &summary.failures {
            let category = failure
                .category
                .map(|c| c.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            println!(
                "  {}{} [{}] {}",
                CROSS,
                style(&failure.name).bold(),
                style(category).dim(),
                failure.reason
            );
        }
    }

    if !summary.warnings.is_empty() {
        println!();
        println!("{}", style("Completed with warnings:").yellow().underlined());
        for detail in &summary.warnings {
            println!("  {}{}", WARN, style(&detail.name).bold());
            for warning in &detail.warnings {
                println!("      {}", style(warning.trim()).dim());
            }
        }
    }

    if !summary.unfinished.is_empty() {
        println!();
        println!("{}", style("Not finished:").underlined());
        for pending in &summary.unfinished {
            println!("  {} ({})", pending.name, style(&pending.state).dim());
        }
    }
    println!();
}

pub fn print_record(record: &MigrationRecord) {
    let icon = if record.has_failure() {
        CROSS
    } else if record.is_complete() {
        if record.warnings.is_empty() { CHECK } else { WARN }
    } else {
        WARN
    };
    println!(
        "{}{:<30} {:<22} retries: {}",
        icon,
        style(&record.name).bold(),
        record.state().to_string(),
        record.retry_count
    );
    if let Some(address) = &record.destination_address {
        println!("      {} {}", style("destination:").dim(), address);
    }
    for step in record.steps.iter() {
        let duration = step
            .duration_ms
            .map(|ms| format!("{:.1}s", ms as f64 / 1000.0))
            .unwrap_or_default();
        println!(
            "      {:<20} {:<12} {}",
            step.name.to_string(),
            step.status.to_string(),
            style(duration).dim()
        );
        if let Some(error) = &step.error {
            println!("        {}", style(error).red());
        }
    }
    if record.has_failure() {
        println!("      {} {}", style("failure:").red(), record.failure_reason);
    }
    for warning in &record.warnings {
        println!("      {} {}", style("warning:").yellow(), warning.trim());
    }
}
