//! Per-pair record accumulator
//!
//! The [`Ingestor`] owns the break policy. Validation issues either abort the
//! pair (when the matching `break_on_*` flag is set) or are kept as
//! [`ErrorRecord`]s and written to the error output at the end.

use super::{ParserSettings, Validator};
use crate::error::{IngestError, Result};
use crate::tracker::Tracker;
use crate::types::DataType;
use anyhow::Context;
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// A rejected or flagged record, as written to the error output
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    pub severity: Severity,
    pub message: String,
    pub record: Value,
}

pub struct Ingestor {
    school: String,
    data_type: DataType,
    break_on_error: bool,
    break_on_warning: bool,
    validate: bool,
    validator: Validator,
    output_path: PathBuf,
    output_error_path: PathBuf,
    records: Vec<Value>,
    keys: HashSet<String>,
    errors: Vec<ErrorRecord>,
}

impl Ingestor {
    pub fn new(settings: &ParserSettings) -> Self {
        Self {
            school: settings.school.clone(),
            data_type: settings.data_type,
            break_on_error: settings.break_on_error,
            break_on_warning: settings.break_on_warning,
            validate: settings.validate,
            validator: Validator::new(settings.data_type, settings.granularity),
            output_path: settings.output_path.clone(),
            output_error_path: settings.output_error_path.clone(),
            records: Vec::new(),
            keys: HashSet::new(),
            errors: Vec::new(),
        }
    }

    pub fn records(&self) -> &[Value] {
        &self.records
    }

    pub fn errors(&self) -> &[ErrorRecord] {
        &self.errors
    }

    /// Validate and keep one record.
    ///
    /// Returns `Ok(())` when the record was accepted, skipped as a duplicate,
    /// or rejected under a non-breaking policy.
    pub fn ingest(&mut self, tracker: &mut Tracker, record: Value) -> Result<()> {
        let kind = self.data_type.record_kind();
        tracker.record_total(kind);

        if self.validate {
            let mut rejected = false;
            for issue in self.validator.validate(&record) {
                rejected |= !issue.is_warning();
                self.handle_issue(issue, &record)?;
            }
            if rejected {
                return Ok(());
            }
        }

        if let Some(key) = self.validator.record_key(&record) {
            if !self.keys.insert(key.clone()) {
                let issue = IngestError::ingestor_warning(format!(
                    "Duplicate {} '{}' in {} feed; keeping the first occurrence",
                    kind, key, self.school
                ));
                return self.handle_issue(issue, &record);
            }
        }

        self.records.push(record);
        tracker.record_valid(kind);
        Ok(())
    }

    fn handle_issue(&mut self, issue: IngestError, record: &Value) -> Result<()> {
        let (severity, breaks) = if issue.is_warning() {
            (Severity::Warning, self.break_on_warning)
        } else {
            (Severity::Error, self.break_on_error)
        };
        if breaks {
            return Err(issue);
        }

        let message = match &issue {
            IngestError::JsonValidation { message, .. }
            | IngestError::JsonValidationWarning { message, .. } => message.clone(),
            other => other.to_string(),
        };
        match severity {
            Severity::Error => warn!(school = %self.school, %message, "Rejected record"),
            Severity::Warning => debug!(school = %self.school, %message, "Record warning"),
        }
        self.errors.push(ErrorRecord {
            severity,
            message,
            record: record.clone(),
        });
        Ok(())
    }

    /// Write accepted records and error records to their output files.
    pub fn finish(&self) -> Result<()> {
        let document = json!({
            "meta": {
                "school": self.school,
                "data_type": self.data_type,
                "generated_at": Utc::now().to_rfc3339(),
                "count": self.records.len(),
            },
            "records": self.records,
        });
        write_json(&self.output_path, &document)?;
        let errors = serde_json::to_value(&self.errors).context("serialize error records")?;
        write_json(&self.output_error_path, &errors)?;

        info!(
            school = %self.school,
            data_type = %self.data_type,
            records = self.records.len(),
            errors = self.errors.len(),
            output = %self.output_path.display(),
            "Wrote ingestion output"
        );
        Ok(())
    }

    /// Diagnostic view of the accumulated state.
    pub fn snapshot(&self) -> Value {
        json!({
            "school": self.school,
            "data_type": self.data_type,
            "records": self.records,
            "errors": self.errors,
        })
    }
}

fn write_json(path: &Path, value: &Value) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let body = serde_json::to_string_pretty(value).context("serialize output")?;
    std::fs::write(path, body).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(dir: &Path, break_on_error: bool, break_on_warning: bool) -> ParserSettings {
        ParserSettings {
            school: "jhu".into(),
            data_type: DataType::Courses,
            granularity: 5,
            config: json!({}),
            output_path: dir.join("out").join("courses.json"),
            output_error_path: dir.join("out").join("errors.json"),
            break_on_error,
            break_on_warning,
            display_progress_bar: false,
            validate: true,
        }
    }

    fn course(code: &str) -> Value {
        json!({"code": code, "name": "Calculus I", "department": "Mathematics"})
    }

    #[test]
    fn test_accumulates_valid_and_invalid_records() {
        let dir = tempfile::tempdir().unwrap();
        let mut tracker = Tracker::new();
        tracker.set_school("jhu");
        let mut ingestor = Ingestor::new(&settings(dir.path(), false, false));

        ingestor.ingest(&mut tracker, course("AS.110.108")).unwrap();
        ingestor.ingest(&mut tracker, json!({"code": "AS.110.109"})).unwrap();
        ingestor.ingest(&mut tracker, course("AS.110.108")).unwrap();

        assert_eq!(ingestor.records().len(), 1);
        assert_eq!(ingestor.errors().len(), 2);
        assert_eq!(ingestor.errors()[0].severity, Severity::Error);
        assert_eq!(ingestor.errors()[1].severity, Severity::Warning);
        let counts = tracker.state().counts("jhu");
        assert_eq!((counts.valid, counts.total), (1, 3));
    }

    #[test]
    fn test_break_on_error_aborts_on_first_invalid_record() {
        let dir = tempfile::tempdir().unwrap();
        let mut tracker = Tracker::new();
        let mut ingestor = Ingestor::new(&settings(dir.path(), true, false));

        let err = ingestor
            .ingest(&mut tracker, json!({"name": "No code"}))
            .unwrap_err();
        assert!(matches!(err, IngestError::JsonValidation { .. }));
    }

    #[test]
    fn test_break_on_warning_aborts_on_duplicate() {
        let dir = tempfile::tempdir().unwrap();
        let mut tracker = Tracker::new();
        let mut ingestor = Ingestor::new(&settings(dir.path(), false, true));

        ingestor.ingest(&mut tracker, course("EN.601.226")).unwrap();
        let err = ingestor
            .ingest(&mut tracker, course("EN.601.226"))
            .unwrap_err();
        assert!(matches!(err, IngestError::IngestorWarning(_)));
    }

    #[test]
    fn test_validation_can_be_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let mut tracker = Tracker::new();
        let mut config = settings(dir.path(), true, true);
        config.validate = false;
        let mut ingestor = Ingestor::new(&config);

        ingestor.ingest(&mut tracker, json!({"whatever": 1})).unwrap();
        assert_eq!(ingestor.records().len(), 1);
    }

    #[test]
    fn test_finish_writes_both_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let mut tracker = Tracker::new();
        let config = settings(dir.path(), false, false);
        let mut ingestor = Ingestor::new(&config);
        ingestor.ingest(&mut tracker, course("AS.171.101")).unwrap();
        ingestor.ingest(&mut tracker, json!("not even an object")).unwrap();

        ingestor.finish().unwrap();

        let output: Value =
            serde_json::from_str(&std::fs::read_to_string(&config.output_path).unwrap()).unwrap();
        assert_eq!(output["meta"]["count"], 1);
        assert_eq!(output["records"][0]["code"], "AS.171.101");

        let errors: Value =
            serde_json::from_str(&std::fs::read_to_string(&config.output_error_path).unwrap())
                .unwrap();
        assert_eq!(errors.as_array().unwrap().len(), 1);
        assert_eq!(errors[0]["severity"], "error");
    }
}
