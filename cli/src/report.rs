//! Terminal rendering of progress events and outcomes.

use std::io::Write;
use std::time::{Duration, Instant};

use copier_engine::{CopyOutcome, EngineMessage, ErrorKind, ProgressEvent, SpaceReport, Stage};

pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_idx])
}

pub fn format_duration(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    let hours = secs / 3600;
    let mins = (secs % 3600) / 60;
    let secs = secs % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, mins, secs)
    } else if mins > 0 {
        format!("{}m {}s", mins, secs)
    } else {
        format!("{}s", secs)
    }
}

pub fn progress_bar(percent: u8) -> String {
    let filled = (percent.min(100) / 5) as usize;
    format!("[{}{}] {:>3}%", "=".repeat(filled), " ".repeat(20 - filled), percent)
}

/// How run messages are written out.
pub trait Reporter {
    fn message(&mut self, message: &EngineMessage);
}

/// Human-readable progress on stderr.
pub struct TerminalReporter {
    start_time: Instant,
    last_draw: Option<Instant>,
    last_stage: Option<Stage>,
}

impl TerminalReporter {
    pub fn new() -> Self {
        TerminalReporter {
            start_time: Instant::now(),
            last_draw: None,
            last_stage: None,
        }
    }

    fn progress(&mut self, event: &ProgressEvent) {
        let stage_changed = self.last_stage != Some(event.stage);
        // Redraw at most every 100ms within a stage
        if !stage_changed
            && self
                .last_draw
                .is_some_and(|t| t.elapsed() < Duration::from_millis(100))
        {
            return;
        }
        self.last_stage = Some(event.stage);
        self.last_draw = Some(Instant::now());

        let mut line = format!("\r{} {:<22}", progress_bar(event.percent), event.stage.to_string());
        if event.stage == Stage::Copying && event.files_total > 0 {
            line.push_str(&format!(" {}/{}", event.files_done, event.files_total));
        }
        if let Some(item) = &event.current_item {
            line.push(' ');
            line.push_str(item);
        }
        eprint!("{:<100}", line);
        let _ = std::io::stderr().flush();
    }

    fn finished(&self, outcome: &CopyOutcome) {
        eprintln!();
        match outcome {
            CopyOutcome::Success {
                files_copied,
                bytes_copied,
            } => {
                eprintln!("Copy complete!");
                eprintln!("Files copied: {}", files_copied);
                eprintln!("Bytes copied: {}", format_bytes(*bytes_copied));
            }
            CopyOutcome::Failed {
                reason: ErrorKind::RollbackFailed,
                message,
                ..
            } => {
                eprintln!("{}", "!".repeat(72));
                eprintln!("ROLLBACK FAILED");
                eprintln!("{}", message);
                eprintln!("The destination may be missing or incomplete.");
                eprintln!("Inspect the destination and its _old backup by hand before retrying.");
                eprintln!("{}", "!".repeat(72));
            }
            CopyOutcome::Failed {
                reason,
                message,
                rolled_back,
            } => {
                eprintln!("Copy {}: {}", reason, message);
                if *rolled_back {
                    eprintln!("The previous destination contents were restored.");
                } else {
                    eprintln!("The destination was left as it was before the run.");
                }
            }
        }
        eprintln!("Elapsed: {}", format_duration(self.start_time.elapsed()));
    }
}

impl Default for TerminalReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl Reporter for TerminalReporter {
    fn message(&mut self, message: &EngineMessage) {
        match message {
            EngineMessage::Progress(event) => self.progress(event),
            EngineMessage::Finished(outcome) => self.finished(outcome),
        }
    }
}

/// One JSON object per line on stdout.
pub struct JsonReporter;

impl Reporter for JsonReporter {
    fn message(&mut self, message: &EngineMessage) {
        match serde_json::to_string(message) {
            Ok(line) => println!("{}", line),
            Err(e) => tracing::warn!(error = %e, "could not serialize message"),
        }
    }
}

/// Human summary of a precondition check.
pub fn describe_check(report: &SpaceReport) -> String {
    let mut text = format!(
        "Files: {}\nDirectories: {}\nRequired: {}\nAvailable: {}",
        report.files_total,
        report.dirs_total,
        format_bytes(report.required_bytes),
        format_bytes(report.available_bytes)
    );
    if report.reserve_bytes > 0 {
        text.push_str(&format!("\nReserve: {}", format_bytes(report.reserve_bytes)));
    }
    text
}
