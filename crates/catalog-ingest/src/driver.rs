//! Batch orchestration
//!
//! [`IngestDriver::handle`] runs the whole (data type x school) product.
//! Each pair is isolated: whatever happens inside [`IngestDriver::run`] is
//! turned into a [`PairOutcome`] and the batch moves on.
//!
//! Failure dispatch, by [`FailureCategory`]:
//!
//! | category           | stderr              | tracker entries |
//! |--------------------|---------------------|-----------------|
//! | `PipelineError`    | message             | 0               |
//! | `PipelineWarning`  | message             | 0               |
//! | `CourseParse`      | school-scoped error | 1               |
//! | `Validation`       | school-scoped error | 1               |
//! | `Unclassified`     | trace + dump        | 2               |

use crate::error::{FailureCategory, IngestError, Result};
use crate::options::IngestOptions;
use crate::parser::{ParserFactory, ParserHandle, ParserSettings, StartRequest};
use crate::registry::{RegistryError, SchoolRegistry};
use crate::tracker::{ErrorEvent, Tracker, TrackerMode};
use crate::types::DataType;
use crate::viewer::{LogFormatted, ProgressBar};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::Write;
use tracing::{error, info, info_span, warn, Instrument};

/// Template rendered by the progress viewer
pub const PROGRESS_TEMPLATE: &str = "{valid}/{total}";

/// What happened to one pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PairOutcome {
    Completed,
    Warning { reason: String },
    Failed { category: FailureCategory, detail: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct PairReport {
    pub school: String,
    pub data_type: DataType,
    pub outcome: PairOutcome,
}

/// Summary of a finished batch
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub pairs: Vec<PairReport>,
    pub errors: Vec<ErrorEvent>,
}

impl BatchReport {
    pub fn completed(&self) -> usize {
        self.pairs
            .iter()
            .filter(|p| p.outcome == PairOutcome::Completed)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.pairs
            .iter()
            .filter(|p| matches!(p.outcome, PairOutcome::Failed { .. }))
            .count()
    }
}

pub struct IngestDriver<'r, W> {
    registry: &'r SchoolRegistry,
    stderr: W,
}

impl<'r, W: Write + Send> IngestDriver<'r, W> {
    pub fn new(registry: &'r SchoolRegistry, stderr: W) -> Self {
        Self { registry, stderr }
    }

    pub fn stderr(&self) -> &W {
        &self.stderr
    }

    /// Tracker wired with the viewers requested in `options`.
    pub fn build_tracker(options: &IngestOptions) -> Tracker {
        let mut tracker = Tracker::new();
        tracker.set_cmd_options(options.clone());
        tracker.add_viewer(Box::new(LogFormatted::new(&options.master_log)));
        if options.display_progress_bar {
            tracker.add_viewer(Box::new(ProgressBar::new(PROGRESS_TEMPLATE)));
        }
        tracker
    }

    /// Validate, then ingest every requested pair. No requested schools
    /// means every registered school.
    ///
    /// Only registry validation can fail; pair failures are reported in the
    /// returned [`BatchReport`].
    pub async fn handle(
        &mut self,
        options: &IngestOptions,
    ) -> std::result::Result<BatchReport, RegistryError> {
        let options = IngestOptions {
            schools: self.registry.resolve_schools(&options.schools),
            ..options.clone()
        };
        self.registry.validate(&options)?;

        let mut tracker = Self::build_tracker(&options);
        tracker.start();
        let mut report = self.run_batch(&mut tracker, &options).await;
        tracker.end();

        report.errors = tracker.errors().to_vec();
        info!(
            run_id = %tracker.state().run_id,
            completed = report.completed(),
            failed = report.failed(),
            errors = report.errors.len(),
            "Ingestion batch finished"
        );
        Ok(report)
    }

    /// Run every pair against an already started tracker.
    pub async fn run_batch(
        &mut self,
        tracker: &mut Tracker,
        options: &IngestOptions,
    ) -> BatchReport {
        tracker.set_mode(TrackerMode::Ingesting);
        let mut report = BatchReport::default();

        for (data_type, school) in options.pairs() {
            tracker.set_school(school.as_str());
            tracker.set_data_type(data_type);

            let outcome = match self.registry.parser(&school, data_type).cloned() {
                Some(factory) => self.run(&factory, tracker, options, data_type, &school).await,
                None => {
                    let err = IngestError::pipeline(format!(
                        "No {} parser registered for {}",
                        data_type, school
                    ));
                    self.dispatch(err, tracker, &school, None)
                }
            };

            report.pairs.push(PairReport {
                school,
                data_type,
                outcome,
            });
        }

        report.errors = tracker.errors().to_vec();
        report
    }

    /// Ingest one pair and classify whatever went wrong.
    pub async fn run(
        &mut self,
        factory: &ParserFactory,
        tracker: &mut Tracker,
        options: &IngestOptions,
        data_type: DataType,
        school: &str,
    ) -> PairOutcome {
        let span = info_span!("pair", school, data_type = %data_type);
        let mut handle = None;

        let result = self
            .execute(factory, tracker, options, data_type, school, &mut handle)
            .instrument(span)
            .await;

        match result {
            Ok(()) => {
                info!(school, data_type = %data_type, "Pair completed");
                PairOutcome::Completed
            }
            Err(err) => self.dispatch(err, tracker, school, handle.as_ref()),
        }
    }

    async fn execute(
        &mut self,
        factory: &ParserFactory,
        tracker: &mut Tracker,
        options: &IngestOptions,
        data_type: DataType,
        school: &str,
        handle: &mut Option<ParserHandle>,
    ) -> Result<()> {
        let config = options.config.load(school, data_type)?;
        let settings = ParserSettings {
            school: school.to_string(),
            data_type,
            granularity: self.registry.granularity(school),
            config,
            output_path: options.output_path(school, data_type)?,
            output_error_path: options.output_error_path(school, data_type)?,
            break_on_error: options.break_on_error,
            break_on_warning: options.break_on_warning,
            display_progress_bar: options.display_progress_bar,
            validate: options.validate,
        };
        let request = StartRequest {
            verbosity: options.verbosity,
            textbooks: data_type == DataType::Textbooks,
            departments_filter: options.departments.clone(),
            years_and_terms_filter: options.resolve_years_and_terms(),
        };

        let parser = handle.insert(ParserHandle::new(factory(settings)));
        match parser.start(tracker, &request).await {
            Ok(()) => parser.end(tracker).await,
            Err(err) if parser.can_end() => match parser.end(tracker).await {
                Ok(()) => Err(err),
                Err(end_err) => {
                    // The end failure is what gets classified; keep the warning visible.
                    info!(school, warning = %err, "Pipeline warning");
                    self.emit(tracker, &err.to_string(), false);
                    Err(end_err)
                }
            },
            Err(err) => Err(err),
        }
    }

    fn dispatch(
        &mut self,
        err: IngestError,
        tracker: &mut Tracker,
        school: &str,
        handle: Option<&ParserHandle>,
    ) -> PairOutcome {
        let category = err.category();
        let detail = err.to_string();
        let mut entries: Vec<(String, Option<Value>)> = Vec::new();

        match category {
            FailureCategory::PipelineError => {
                warn!(school, error = %err, "Pipeline error");
                self.emit(tracker, &detail, false);
            }
            FailureCategory::PipelineWarning => {
                info!(school, warning = %err, "Pipeline warning");
                self.emit(tracker, &detail, false);
            }
            FailureCategory::CourseParse | FailureCategory::Validation => {
                error!(school, error = %err, "Failed to parse");
                let message = format!("Error while parsing {}:\n\n{}\n", school, err);
                self.emit(tracker, &message, true);
                entries.push((message, None));
            }
            FailureCategory::Unclassified => {
                let trace = trace_of(&err);
                error!(school, error = %trace, "Unexpected ingestion failure");
                let ingestor = handle.map(ParserHandle::ingestor).unwrap_or(Value::Null);
                let dump = dump_sorted(&ingestor);
                self.emit(tracker, &trace, true);
                self.emit(tracker, &dump, true);
                entries.push((trace, None));
                entries.push((format!("INGESTOR DUMP\n{}", dump), Some(ingestor)));
            }
        }

        if category.is_recorded() {
            for (message, payload) in entries {
                tracker.see_error_event(category, message, payload);
            }
        }

        match category {
            FailureCategory::PipelineWarning => PairOutcome::Warning { reason: detail },
            _ => PairOutcome::Failed { category, detail },
        }
    }

    /// Write to stderr with every viewer suspended.
    fn emit(&mut self, tracker: &Tracker, text: &str, styled: bool) {
        let stderr = &mut self.stderr;
        let mut written = Ok(());
        tracker.suspend(&mut || {
            written = if styled {
                writeln!(stderr, "{}", console::style(text).red().for_stderr())
            } else {
                writeln!(stderr, "{}", text)
            };
        });
        if let Err(e) = written {
            warn!(error = %e, "Could not write to stderr");
        }
    }
}

/// Debug rendering of an unclassified failure, including its cause chain
/// and any captured backtrace.
fn trace_of(err: &IngestError) -> String {
    match err {
        IngestError::Unexpected(inner) => format!("{:?}", inner),
        other => format!("{:?}", other),
    }
}

/// Pretty JSON with keys sorted at every level and two-space indentation.
pub fn dump_sorted(value: &Value) -> String {
    fn sorted(value: &Value) -> Value {
        match value {
            Value::Object(map) => {
                let ordered: BTreeMap<&String, Value> =
                    map.iter().map(|(k, v)| (k, sorted(v))).collect();
                Value::Object(ordered.into_iter().map(|(k, v)| (k.clone(), v)).collect())
            }
            Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
            other => other.clone(),
        }
    }

    let value = sorted(value);
    serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_dump_sorted_orders_keys_and_indents_two_spaces() {
        let dump = dump_sorted(&json!({"b": 1, "a": {"d": [1], "c": null}}));
        assert_eq!(
            dump,
            "{\n  \"a\": {\n    \"c\": null,\n    \"d\": [\n      1\n    ]\n  },\n  \"b\": 1\n}"
        );
    }

    #[test]
    fn test_batch_report_counts() {
        let report = BatchReport {
            pairs: vec![
                PairReport {
                    school: "jhu".into(),
                    data_type: DataType::Courses,
                    outcome: PairOutcome::Completed,
                },
                PairReport {
                    school: "umd".into(),
                    data_type: DataType::Courses,
                    outcome: PairOutcome::Warning {
                        reason: "skipped".into(),
                    },
                },
                PairReport {
                    school: "uoft".into(),
                    data_type: DataType::Courses,
                    outcome: PairOutcome::Failed {
                        category: FailureCategory::Validation,
                        detail: "bad".into(),
                    },
                },
            ],
            errors: Vec::new(),
        };
        assert_eq!(report.completed(), 1);
        assert_eq!(report.failed(), 1);
    }
}
