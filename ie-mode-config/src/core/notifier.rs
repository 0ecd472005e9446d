/*!
Notification outputs for the save prompt and the completion summary
*/

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;

use serde_json::json;
use sitelist_engine::{
    BackupOutcome, DocumentReport, FinalizeReport, Notice, NotificationSink, PolicyReport, SiteList,
};
use tracing::{error, info};

use crate::core::config::{NotifierConfig, NotifierKind, TerminalFormat};

/// Fans every notice out to the configured notifiers.
pub struct NotificationManager {
    sinks: Vec<Box<dyn NotificationSink>>,
}

impl NotificationManager {
    pub fn new(configs: &[NotifierConfig]) -> Self {
        let mut sinks: Vec<Box<dyn NotificationSink>> = Vec::new();

        for config in configs {
            if !config.enabled {
                continue;
            }

            let sink: Box<dyn NotificationSink> = match &config.sink {
                NotifierKind::Terminal { format } => Box::new(TerminalNotifier::new(*format, io::stdout())),
                NotifierKind::JsonLog { path } => Box::new(JsonLogNotifier::new(path.clone())),
            };

            sinks.push(sink);
        }

        info!("Initialized notification manager with {} notifiers", sinks.len());
        Self { sinks }
    }
}

impl NotificationSink for NotificationManager {
    fn name(&self) -> &'static str {
        "manager"
    }

    fn notify(&mut self, notice: &Notice<'_>) -> io::Result<()> {
        for sink in &mut self.sinks {
            if let Err(e) = sink.notify(notice) {
                error!("Notifier {} failed: {}", sink.name(), e);
            }
        }
        Ok(())
    }
}

/// Terminal notifier
pub struct TerminalNotifier<W: Write> {
    format: TerminalFormat,
    out: W,
}

impl<W: Write> TerminalNotifier<W> {
    pub fn new(format: TerminalFormat, out: W) -> Self {
        Self { format, out }
    }

    fn format_notice(&self, notice: &Notice<'_>) -> String {
        match (self.format, notice) {
            (TerminalFormat::Json, notice) => {
                serde_json::to_string_pretty(&notice_json(notice))
                    .unwrap_or_else(|_| "JSON serialization failed".to_string())
            }
            (TerminalFormat::Plain, Notice::Saving { entries }) => format!(
                "Saving the IE mode configuration ({} site(s)).\n\n\
                 Changes do not apply immediately:\n\
                 1. Close every Edge window, then reopen Edge (repeat if needed).\n\
                 2. If the change is still missing, wait a few minutes and try again.",
                entries.len()
            ),
            (TerminalFormat::Colored, Notice::Saving { entries }) => format!(
                "\x1b[33m📌 Saving the IE mode configuration\x1b[0m ({} site(s))\n\
                 \x1b[36m1.\x1b[0m Close every Edge window, then reopen Edge (repeat if needed).\n\
                 \x1b[36m2.\x1b[0m If the change is still missing, wait a few minutes and try again.",
                entries.len()
            ),
            (format, Notice::Finished { entries, report }) => summary(format == TerminalFormat::Colored, entries, report),
        }
    }
}

impl<W: Write> NotificationSink for TerminalNotifier<W> {
    fn name(&self) -> &'static str {
        "Terminal"
    }

    fn notify(&mut self, notice: &Notice<'_>) -> io::Result<()> {
        let text = self.format_notice(notice);
        writeln!(self.out, "{}", text)?;
        writeln!(self.out)?;
        self.out.flush()
    }
}

fn summary(colored: bool, entries: &SiteList, report: &FinalizeReport) -> String {
    let mark = |ok: bool| match (colored, ok) {
        (true, true) => "\x1b[32m✅\x1b[0m",
        (true, false) => "\x1b[31m❌\x1b[0m",
        (false, true) => "[ok]",
        (false, false) => "[failed]",
    };

    let mut lines = Vec::new();
    lines.push(match &report.document {
        DocumentReport::Written { path } => format!("{} Site list saved to {}", mark(true), path.display()),
        DocumentReport::Removed { path } => format!("{} All sites removed, {} deleted", mark(true), path.display()),
        DocumentReport::AlreadyAbsent => format!("{} No sites configured", mark(true)),
        DocumentReport::Failed { reason } => format!("{} Site list not saved: {}", mark(false), reason),
    });
    lines.push(match &report.policy {
        PolicyReport::Applied => format!("{} Policy updated (IE mode on)", mark(true)),
        PolicyReport::Cleared => format!("{} IE mode policy cleared", mark(true)),
        PolicyReport::Skipped => format!("{} Policy not updated because the site list was not saved", mark(false)),
        PolicyReport::PartialFailure { succeeded, failed } => format!(
            "{} Policy only partly updated. Written: {}. Failed: {}",
            mark(false),
            succeeded.join(", "),
            failed.join("; ")
        ),
        PolicyReport::TotalFailure { failed } => format!(
            "{} Policy update failed, run as administrator: {}",
            mark(false),
            failed.join("; ")
        ),
    });
    match &report.backup {
        Some(BackupOutcome::Saved { path }) => lines.push(format!("{} Policy backup: {}", mark(true), path.display())),
        Some(BackupOutcome::Failed { reason, .. }) => lines.push(format!("{} Policy backup skipped: {}", mark(false), reason)),
        None => {}
    }

    if !entries.is_empty() {
        lines.push(String::new());
        lines.push("Sites opened in IE mode:".to_string());
        lines.extend(entries.iter().map(|entry| format!("  - {entry}")));
        lines.push(String::new());
        lines.push("Restart Edge for the change to take effect.".to_string());
    }
    lines.join("\n")
}

fn notice_json(notice: &Notice<'_>) -> serde_json::Value {
    match notice {
        Notice::Saving { entries } => json!({
            "event": "saving",
            "entries": entries,
        }),
        Notice::Finished { entries, report } => json!({
            "event": "finished",
            "success": report.is_success(),
            "entries": entries,
            "report": report,
        }),
    }
}

/// Appends one JSON line per notice, for an audit trail of runs.
pub struct JsonLogNotifier {
    path: PathBuf,
    file: Option<File>,
}

impl JsonLogNotifier {
    pub fn new(path: PathBuf) -> Self {
        Self { path, file: None }
    }

    fn file(&mut self) -> io::Result<&mut File> {
        if self.file.is_none() {
            if let Some(parent) = self.path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            self.file = Some(OpenOptions::new().create(true).append(true).open(&self.path)?);
        }
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::other("notifier log is not open"))
    }
}

impl NotificationSink for JsonLogNotifier {
    fn name(&self) -> &'static str {
        "JSON log"
    }

    fn notify(&mut self, notice: &Notice<'_>) -> io::Result<()> {
        let mut record = notice_json(notice);
        record["timestamp"] = json!(chrono::Utc::now().to_rfc3339());

        let file = self.file()?;
        writeln!(file, "{}", record)?;
        file.flush()
    }
}
