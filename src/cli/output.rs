//! Output formatting module for vpcup
//!
//! Human output is a step-by-step log with a recap; JSON output is the
//! serialized [`ProvisionReport`] on stdout with messages on stderr.

use colored::Colorize;
use std::io::{self, Write};
use std::time::{Duration, Instant};
use vpcup::provision::{ProvisionReport, RunMode, StepOutcome, StepReport};

/// Display status of a provisioning step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    /// Existing resource reused
    Ok,
    /// Resource created or instance launched
    Changed,
    /// Plan mode: resource would be created
    Planned,
}

impl StepStatus {
    /// Get the colored string representation
    pub fn colored_string(&self) -> String {
        match self {
            StepStatus::Ok => "ok".green().to_string(),
            StepStatus::Changed => "changed".yellow().to_string(),
            StepStatus::Planned => "plan".cyan().to_string(),
        }
    }

    /// Get the plain string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Ok => "ok",
            StepStatus::Changed => "changed",
            StepStatus::Planned => "plan",
        }
    }
}

impl From<StepOutcome> for StepStatus {
    fn from(outcome: StepOutcome) -> Self {
        match outcome {
            StepOutcome::Found => StepStatus::Ok,
            StepOutcome::Created | StepOutcome::Launched => StepStatus::Changed,
            StepOutcome::WouldCreate | StepOutcome::WouldLaunch => StepStatus::Planned,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Note {
    Error,
    Warning,
    Hint,
    Info,
    Debug,
}

impl Note {
    fn kind(self) -> &'static str {
        match self {
            Note::Error => "error",
            Note::Warning => "warning",
            Note::Hint => "hint",
            Note::Info => "info",
            Note::Debug => "debug",
        }
    }

    fn label(self) -> &'static str {
        match self {
            Note::Error => "ERROR:",
            Note::Warning => "WARNING:",
            Note::Hint => "HINT:",
            Note::Info => "INFO:",
            Note::Debug => "DEBUG:",
        }
    }

    fn color(self) -> colored::Color {
        match self {
            Note::Error => colored::Color::Red,
            Note::Warning => colored::Color::Yellow,
            Note::Hint => colored::Color::Cyan,
            Note::Info => colored::Color::Blue,
            Note::Debug => colored::Color::Magenta,
        }
    }

    fn min_verbosity(self) -> u8 {
        match self {
            Note::Info => 1,
            Note::Debug => 2,
            _ => 0,
        }
    }
}

/// Output formatter for different output modes
pub struct OutputFormatter {
    /// Use colored output
    use_color: bool,
    /// JSON output mode
    json_mode: bool,
    /// Verbosity level
    verbosity: u8,
    /// Start time for duration calculations
    start_time: Instant,
}

impl OutputFormatter {
    /// Create a new output formatter
    pub fn new(use_color: bool, json_mode: bool, verbosity: u8) -> Self {
        // Respect NO_COLOR environment variable
        let use_color = use_color && std::env::var("NO_COLOR").is_err();

        Self {
            use_color,
            json_mode,
            verbosity,
            start_time: Instant::now(),
        }
    }

    pub fn is_json(&self) -> bool {
        self.json_mode
    }

    /// Print a top-level heading
    pub fn heading(&self, title: &str) {
        if !self.json_mode {
            self.rule(title);
        }
    }

    /// Print a step header
    pub fn step_header(&self, step_name: &str) {
        if !self.json_mode {
            self.rule(&format!("STEP [{}]", step_name));
        }
    }

    fn rule(&self, label: &str) {
        let stars = "*".repeat(80_usize.saturating_sub(label.len() + 1));
        if self.use_color {
            println!("\n{} {}", label.bright_white().bold(), stars.bright_black());
        } else {
            println!("\n{} {}", label, stars);
        }
    }

    /// Print the outcome of one step
    pub fn step_result(&self, step: &StepReport) {
        if self.json_mode {
            return;
        }

        let status = StepStatus::from(step.outcome);
        let status_str = if self.use_color {
            status.colored_string()
        } else {
            status.as_str().to_string()
        };
        let name_str = if self.use_color {
            step.name.bright_white().bold().to_string()
        } else {
            step.name.clone()
        };

        print!("{}: [{}]", status_str, name_str);
        match &step.id {
            Some(id) => print!(" => {}", id),
            None => print!(" => {}", step.outcome.as_str()),
        }
        println!();

        for warning in &step.warnings {
            self.warning(warning);
        }
    }

    /// Print every step of a report under its own header
    pub fn steps(&self, report: &ProvisionReport) {
        for step in &report.steps {
            self.step_header(&step.kind.to_string());
            self.step_result(step);
        }
    }

    /// Print a recap summary
    pub fn recap(&self, report: &ProvisionReport) {
        if self.json_mode {
            self.report_json(report);
            return;
        }

        self.rule("RECAP");

        let (changed_label, changed) = match report.mode {
            RunMode::Apply => ("changed", report.changed()),
            RunMode::Plan => ("to_change", report.changed()),
        };
        let warnings = report.warnings().count();
        let target = format!("{} ({})", report.region, report.backend);

        if self.use_color {
            let fmt_stat = |label: &str, value: usize, color: colored::Color| -> String {
                if value > 0 {
                    format!("{}={:<4}", label.color(color), value)
                } else {
                    format!("{}={:<4}", label, value).dimmed().to_string()
                }
            };

            let target_colored = if changed > 0 {
                target.yellow()
            } else {
                target.green()
            };
            println!(
                "{:<30} : {} {} {}",
                target_colored,
                fmt_stat("ok", report.unchanged(), colored::Color::Green),
                fmt_stat(changed_label, changed, colored::Color::Yellow),
                fmt_stat("warnings", warnings, colored::Color::Magenta)
            );
        } else {
            println!(
                "{:<30} : ok={:<4} {}={:<4} warnings={:<4}",
                target,
                report.unchanged(),
                changed_label,
                changed,
                warnings
            );
        }

        let duration_str = format_duration(self.start_time.elapsed());
        if self.use_color {
            println!(
                "\n{} {}",
                "Run took".bright_black(),
                duration_str.bright_white()
            );
        } else {
            println!("\nRun took {}", duration_str);
        }

        let closing = match report.mode {
            RunMode::Apply => "Provisioning completed successfully.",
            RunMode::Plan => "Plan complete. No changes were made.",
        };
        if self.use_color {
            println!("{}", closing.green().bold());
        } else {
            println!("{}", closing);
        }
    }

    /// Print the report as pretty JSON on stdout
    pub fn report_json(&self, report: &ProvisionReport) {
        match serde_json::to_string_pretty(report) {
            Ok(json) => println!("{}", json),
            Err(e) => self.error(&format!("Failed to serialize report: {}", e)),
        }
    }

    pub fn error(&self, message: &str) {
        self.note(Note::Error, message);
    }

    pub fn warning(&self, message: &str) {
        self.note(Note::Warning, message);
    }

    pub fn hint(&self, message: &str) {
        self.note(Note::Hint, message);
    }

    /// Shown from `-v`
    pub fn info(&self, message: &str) {
        self.note(Note::Info, message);
    }

    /// Shown from `-vv`
    pub fn debug(&self, message: &str) {
        self.note(Note::Debug, message);
    }

    /// Print plan output (always shows, bypasses verbosity)
    pub fn plan(&self, message: &str) {
        if self.json_mode {
            return;
        }

        println!("{}", message);
    }

    /// Notes always go to stderr so stdout carries only the report
    fn note(&self, note: Note, message: &str) {
        if self.verbosity < note.min_verbosity() {
            return;
        }

        if self.json_mode {
            let value = serde_json::json!({
                "type": note.kind(),
                "message": message
            });
            eprintln!("{}", value);
        } else if self.use_color {
            eprintln!("{} {}", note.label().color(note.color()).bold(), message);
        } else {
            eprintln!("{} {}", note.label(), message);
        }
    }

    /// Flush stdout
    pub fn flush(&self) {
        let _ = io::stdout().flush();
    }
}

fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{:.1}s", duration.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_status_display() {
        assert_eq!(StepStatus::Ok.as_str(), "ok");
        assert_eq!(StepStatus::Changed.as_str(), "changed");
        assert_eq!(StepStatus::Planned.as_str(), "plan");

        assert!(StepStatus::Ok.colored_string().contains("ok"));
        assert!(StepStatus::Planned.colored_string().contains("plan"));
    }

    #[test]
    fn test_status_from_outcome() {
        assert_eq!(StepStatus::from(StepOutcome::Found), StepStatus::Ok);
        assert_eq!(StepStatus::from(StepOutcome::Created), StepStatus::Changed);
        assert_eq!(StepStatus::from(StepOutcome::Launched), StepStatus::Changed);
        assert_eq!(
            StepStatus::from(StepOutcome::WouldLaunch),
            StepStatus::Planned
        );
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(500)), "0.5s");
        assert_eq!(format_duration(Duration::from_millis(42_300)), "42.3s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m 5s");
    }
}
