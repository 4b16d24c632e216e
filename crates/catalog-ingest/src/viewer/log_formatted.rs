//! Master log viewer

use super::Viewer;
use crate::tracker::{ErrorEvent, TrackerEvent, TrackerState};
use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

const RULE: &str = "================================================================";

/// Appends formatted run headers, error entries and a closing summary to a
/// line-oriented log file.
///
/// The file is opened in append mode when the tracker starts (or on the first
/// entry, if that comes earlier) and closed when the tracker ends. Each error
/// entry is flushed as soon as it is written.
pub struct LogFormatted {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl LogFormatted {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writer: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn writer(&mut self) -> Result<&mut BufWriter<File>> {
        if self.writer.is_none() {
            if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .with_context(|| format!("Failed to open master log {}", self.path.display()))?;
            self.writer = Some(BufWriter::new(file));
        }
        self.writer
            .as_mut()
            .context("master log writer unavailable")
    }

    fn write_header(&mut self, state: &TrackerState) -> Result<()> {
        let started = state
            .started_at
            .unwrap_or_else(Utc::now)
            .to_rfc3339_opts(SecondsFormat::Secs, true);
        let options = match &state.cmd_options {
            Some(options) => serde_json::to_string(options)?,
            None => "{}".to_string(),
        };

        let w = self.writer()?;
        writeln!(w, "{}", RULE)?;
        writeln!(w, "run {} started {}", state.run_id, started)?;
        writeln!(w, "options: {}", options)?;
        w.flush()?;
        Ok(())
    }

    fn write_error(&mut self, event: &ErrorEvent) -> Result<()> {
        let entry = format_entry(event);
        let w = self.writer()?;
        w.write_all(entry.as_bytes())?;
        w.flush()?;
        Ok(())
    }

    fn write_summary_and_close(&mut self, state: &TrackerState) -> Result<()> {
        let summary = format_summary(state);
        let w = self.writer()?;
        w.write_all(summary.as_bytes())?;
        w.flush()?;
        self.writer = None;
        Ok(())
    }
}

impl Viewer for LogFormatted {
    fn name(&self) -> &str {
        "log"
    }

    fn receive(&mut self, state: &TrackerState, event: &TrackerEvent<'_>) -> Result<()> {
        match event {
            TrackerEvent::Started => self.write_header(state),
            TrackerEvent::Error(error) => self.write_error(error),
            TrackerEvent::Ended => self.write_summary_and_close(state),
            _ => Ok(()),
        }
    }
}

/// One log entry: a header line followed by the indented message.
pub(crate) fn format_entry(event: &ErrorEvent) -> String {
    let school = event.school.as_deref().unwrap_or("-");
    let data_type = event
        .data_type
        .map(|t| t.as_str())
        .unwrap_or("-");

    let mut entry = format!(
        "[{}] {} {}/{}\n",
        event.seen_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        event.kind,
        school,
        data_type
    );
    for line in event.message.trim_end().lines() {
        entry.push_str("    ");
        entry.push_str(line);
        entry.push('\n');
    }
    entry
}

fn format_summary(state: &TrackerState) -> String {
    let mut summary = format!("summary for run {}\n", state.run_id);

    for (school, kinds) in &state.stats {
        let total = state.counts(school);
        let breakdown: Vec<String> = kinds
            .iter()
            .map(|(kind, c)| format!("{} {}/{}", kind, c.valid, c.total))
            .collect();
        summary.push_str(&format!(
            "  {}: {}/{} valid ({})\n",
            school,
            total.valid,
            total.total,
            breakdown.join(", ")
        ));
    }

    summary.push_str(&format!("errors: {}\n", state.errors.len()));
    if let (Some(start), Some(end)) = (state.started_at, state.ended_at) {
        let elapsed = (end - start).num_milliseconds() as f64 / 1000.0;
        summary.push_str(&format!("finished in {:.1}s\n", elapsed));
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureCategory;
    use crate::tracker::Tracker;
    use crate::types::DataType;

    #[test]
    fn test_format_entry_indents_every_line() {
        let event = ErrorEvent {
            kind: FailureCategory::CourseParse,
            message: "Error while parsing jhu:\n\nrecord 3\n".to_string(),
            payload: None,
            school: Some("jhu".into()),
            data_type: Some(DataType::Courses),
            seen_at: Utc::now(),
        };

        let entry = format_entry(&event);
        let lines: Vec<&str> = entry.lines().collect();
        assert!(lines[0].ends_with("] course_parse jhu/courses"));
        assert_eq!(lines[1], "    Error while parsing jhu:");
        assert_eq!(lines[2], "    ");
        assert_eq!(lines[3], "    record 3");
    }

    #[test]
    fn test_log_file_receives_header_errors_and_summary() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("master.log");

        let mut tracker = Tracker::new();
        tracker.add_viewer(Box::new(LogFormatted::new(&path)));
        tracker.start();
        tracker.set_school("umd");
        tracker.record_total("course");
        tracker.record_valid("course");
        tracker.see_error("first failure");
        tracker.see_error("second failure");
        tracker.end();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains(&format!("run {} started", tracker.state().run_id)));
        let first = contents.find("first failure").unwrap();
        let second = contents.find("second failure").unwrap();
        assert!(first < second);
        assert!(contents.contains("umd: 1/1 valid (course 1/1)"));
        assert!(contents.contains("errors: 2"));
    }

    #[test]
    fn test_log_file_is_appended_across_runs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("master.log");

        for _ in 0..2 {
            let mut tracker = Tracker::new();
            tracker.add_viewer(Box::new(LogFormatted::new(&path)));
            tracker.start();
            tracker.end();
        }

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.matches(RULE).count(), 2);
    }
}
