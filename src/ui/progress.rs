use crate::classify::ErrorCategory;
use crate::record::{StepName, StepStatus};
use crate::ui::icons::{CHECK, CLOCK, CROSS, PACKAGE, RETRY, RUNNING, SKIP, SPARKLE, WARN};
use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::time::Duration;

/// Terminal UI for a migration run, rendered via `indicatif` progress bars.
///
/// Two bars are stacked vertically:
/// - Repository bar: how many repositories have been processed
/// - Step bar: spinner showing the step currently running
pub struct MigrationUI {
    multi: MultiProgress,
    repo_bar: ProgressBar,
    step_bar: ProgressBar,
    verbose: bool,
}

impl MigrationUI {
    /// Create the UI and add both bars to the multiplex renderer.
    ///
    /// # Arguments
    /// * `total_repos`: number of repositories this run will drive
    /// * `verbose`: print every step transition, not just outcomes
    pub fn new(total_repos: u64, verbose: bool) -> Self {
        let multi = MultiProgress::new();

        let repo_style = ProgressStyle::default_bar()
            .template("{prefix:.bold.dim} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .expect("progress bar template is a valid static string")
            .progress_chars("█▓▒░");

        let repo_bar = multi.add(ProgressBar::new(total_repos));
        repo_bar.set_style(repo_style);
        repo_bar.set_prefix("Repos");

        let step_style = ProgressStyle::default_spinner()
            .template("{prefix:.bold.dim} {spinner} {msg}")
            .expect("progress bar template is a valid static string");

        let step_bar = multi.add(ProgressBar::new_spinner());
        step_bar.set_style(step_style);
        step_bar.set_prefix(" Step");

        Self {
            multi,
            repo_bar,
            step_bar,
            verbose,
        }
    }

    /// Print a line via `MultiProgress`, falling back to `eprintln!` if the rich UI fails.
    fn print_line(&self, msg: impl AsRef<str>) {
        if self.multi.println(msg.as_ref()).is_err() {
            eprintln!("{}", msg.as_ref());
        }
    }

    /// Hide the bars while `f` runs, e.g. for an interactive prompt.
    pub fn suspend<F: FnOnce() -> R, R>(&self, f: F) -> R {
        self.multi.suspend(f)
    }

    pub fn start_repo(&self, name: &str) {
        self.repo_bar
            .set_message(format!("{}{}", PACKAGE, style(name).yellow()));
        self.step_bar.reset();
        self.step_bar
            .enable_steady_tick(Duration::from_millis(100));
        if self.verbose {
            self.print_line(format!("{} {}", RUNNING, style(name).bold()));
        }
    }

    pub fn start_step(&self, step: StepName) {
        self.step_bar
            .set_message(format!("{} {}", style(step).cyan(), style("(running)").dim()));
    }

    /// Report a step that reached a terminal or skipped status.
    pub fn step_finished(&self, step: StepName, status: StepStatus) {
        if !self.verbose && status != StepStatus::Warning {
            return;
        }
        let line = match status {
            StepStatus::Completed => format!("    {} {}", CHECK, style(step).green()),
            StepStatus::Warning => format!("    {} {}", WARN, style(step).yellow()),
            StepStatus::Failed => format!("    {} {}", CROSS, style(step).red()),
            StepStatus::Skipped => format!("    {} {}", SKIP, style(step).dim()),
            StepStatus::Pending | StepStatus::InProgress => return,
        };
        self.print_line(line);
    }

    pub fn retrying(&self, step: StepName, category: ErrorCategory, attempt: u32, delay: Duration) {
        self.print_line(format!(
            "    {} {} failed ({}), retry {} in {:.1}s",
            RETRY,
            style(step).yellow(),
            style(category).dim(),
            attempt,
            delay.as_secs_f64()
        ));
    }

    pub fn repo_skipped(&self, name: &str) {
        self.repo_bar.inc(1);
        self.print_line(format!(
            "{} {} {}",
            SKIP,
            style(name).dim(),
            style("already migrated").dim()
        ));
    }

    pub fn repo_succeeded(&self, name: &str, warnings: usize, elapsed: Duration) {
        self.repo_bar.inc(1);
        self.step_bar.finish_and_clear();
        let suffix = if warnings > 0 {
            format!(" {}", style(format!("({} warning(s))", warnings)).yellow())
        } else {
            String::new()
        };
        self.print_line(format!(
            "{} {} migrated {}{:.1}s{}",
            SPARKLE,
            style(name).green().bold(),
            CLOCK,
            elapsed.as_secs_f64(),
            suffix
        ));
    }

    pub fn repo_failed(&self, name: &str, reason: &str) {
        self.repo_bar.inc(1);
        self.step_bar.finish_and_clear();
        self.print_line(format!(
            "{} {} failed: {}",
            CROSS,
            style(name).red().bold(),
            reason
        ));
    }

    pub fn finish(&self) {
        self.step_bar.finish_and_clear();
        self.repo_bar.finish_with_message("done");
    }
}
