//! Terminal UI for the orchestrator, rendered via `indicatif`.
//!
//! Two bars are stacked vertically:
//! - Phase bar — shows the phase currently executing
//! - Iteration bar — spinner with the iteration count and live status

use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::time::Duration;

pub struct OrchestratorUi {
    multi: MultiProgress,
    phase_bar: ProgressBar,
    iteration_bar: ProgressBar,
    verbose: bool,
}

impl OrchestratorUi {
    pub fn new(verbose: bool) -> Self {
        let multi = MultiProgress::new();

        let phase_style = ProgressStyle::default_spinner()
            .template("{prefix:.bold.dim} {msg}")
            .expect("progress bar template is a valid static string");
        let phase_bar = multi.add(ProgressBar::new_spinner());
        phase_bar.set_style(phase_style);
        phase_bar.set_prefix("Phase");

        let iteration_style = ProgressStyle::default_spinner()
            .template("{prefix:.bold.dim} {spinner} {msg}")
            .expect("progress bar template is a valid static string");
        let iteration_bar = multi.add(ProgressBar::new_spinner());
        iteration_bar.set_style(iteration_style);
        iteration_bar.set_prefix(" Iter");

        Self {
            multi,
            phase_bar,
            iteration_bar,
            verbose,
        }
    }

    /// Print a line via `MultiProgress`, falling back to `eprintln!` if the
    /// rich UI fails, so critical messages are never lost.
    fn print_line(&self, msg: impl AsRef<str>) {
        if self.multi.println(msg.as_ref()).is_err() {
            eprintln!("{}", msg.as_ref());
        }
    }

    pub fn show_phase(&self, phase: &str) {
        self.phase_bar.set_message(style(phase).yellow().to_string());
    }

    pub fn start_iteration(&self, iteration: u32, max: u32) {
        self.iteration_bar.set_message(format!(
            "iteration {}/{} {}",
            style(iteration).cyan(),
            max,
            style("(invoking worker...)").dim()
        ));
        self.iteration_bar
            .enable_steady_tick(Duration::from_millis(100));
    }

    pub fn log_step(&self, msg: &str) {
        self.iteration_bar
            .set_message(style(msg).dim().to_string());
        if self.verbose {
            self.print_line(format!("    {} {}", style("→").dim(), style(msg).dim()));
        }
    }

    pub fn show_signal(&self, signal: &str) {
        self.print_line(format!("  {} signal: {}", style("◆").cyan(), signal));
    }

    pub fn show_stray_signal(&self, signal: &str, phase: &str) {
        self.print_line(format!(
            "  {} stray signal {} ignored in phase {}",
            style("!").yellow(),
            signal,
            phase
        ));
    }

    pub fn show_transition(&self, from: &str, to: &str) {
        self.print_line(format!(
            "  {} {} {} {}",
            style("✓").green(),
            from,
            style("→").dim(),
            style(to).bold()
        ));
    }

    pub fn finish_success(&self) {
        self.iteration_bar.finish_and_clear();
        self.phase_bar
            .finish_with_message(style("workflow completed").green().bold().to_string());
    }

    pub fn finish_failure(&self, reason: &str) {
        self.iteration_bar.finish_and_clear();
        self.phase_bar
            .finish_with_message(format!("{} {}", style("failed:").red().bold(), reason));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // The UI is exercised for panics only; rendering is visual.
    #[test]
    fn test_ui_methods_do_not_panic() {
        let ui = OrchestratorUi::new(true);
        ui.show_phase("SETUP");
        ui.start_iteration(1, 100);
        ui.log_step("parsing output");
        ui.show_signal("SETUP_COMPLETE");
        ui.show_stray_signal("CI_PASSED", "SETUP");
        ui.show_transition("SETUP", "PLANNING");
        ui.finish_success();
    }

    #[test]
    fn test_ui_failure_path_does_not_panic() {
        let ui = OrchestratorUi::new(false);
        ui.show_phase("CI_VERIFY");
        ui.finish_failure("CI attempt ceiling reached");
    }
}
