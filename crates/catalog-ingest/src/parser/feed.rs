//! JSON feed parser
//!
//! Reads catalog records that a school (or an upstream scraper) publishes as
//! JSON. The pair's config selects the feed:
//!
//! ```json
//! { "source": "https://registrar.example.edu/catalog.json" }
//! { "source": "data/raw/jhu-courses.json" }
//! { "records": [ { "code": "AS.110.108", "name": "Calculus I" } ] }
//! { "enabled": false }
//! ```
//!
//! A feed document is either an array of records or an object holding the
//! array under the data type's name (`"courses"`, `"evals"`, `"textbooks"`).

use super::{Ingestor, ParserFactory, ParserSettings, SchoolParser, StartRequest};
use crate::error::{IngestError, Result};
use crate::options::YearsAndTerms;
use crate::tracker::{RecordContext, Tracker};
use crate::types::DataType;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

pub struct FeedParser {
    settings: ParserSettings,
    ingestor: Ingestor,
    /// Set once the feed has been read; nothing is written before that
    loaded: bool,
}

impl FeedParser {
    pub fn new(settings: ParserSettings) -> Self {
        let ingestor = Ingestor::new(&settings);
        Self {
            settings,
            ingestor,
            loaded: false,
        }
    }

    pub fn factory() -> ParserFactory {
        Arc::new(|settings| Box::new(FeedParser::new(settings)) as Box<dyn SchoolParser>)
    }

    async fn load_records(&self) -> Result<Vec<Value>> {
        let config = &self.settings.config;

        if let Some(records) = config.get("records") {
            return records.as_array().cloned().ok_or_else(|| {
                IngestError::parse(format!(
                    "inline records for {} must be an array",
                    self.settings.school
                ))
            });
        }

        let Some(source) = config.get("source").and_then(Value::as_str) else {
            return Err(IngestError::pipeline(format!(
                "Config for {} {} names neither `records` nor `source`",
                self.settings.school, self.settings.data_type
            )));
        };

        let body = if source.starts_with("http://") || source.starts_with("https://") {
            fetch(source).await?
        } else {
            tokio::fs::read_to_string(source).await.map_err(|e| {
                IngestError::pipeline(format!("Could not read feed {}: {}", source, e))
            })?
        };

        let document: Value = serde_json::from_str(&body)
            .map_err(|e| IngestError::parse(format!("feed {} is not valid JSON: {}", source, e)))?;
        extract_records(document, self.settings.data_type)
            .ok_or_else(|| IngestError::parse(format!("feed {} holds no record array", source)))
    }
}

#[async_trait]
impl SchoolParser for FeedParser {
    async fn start(&mut self, tracker: &mut Tracker, request: &StartRequest) -> Result<()> {
        if self.settings.config.get("enabled") == Some(&Value::Bool(false)) {
            return Err(IngestError::ParseJump(format!(
                "{} feed for {} is disabled in config",
                self.settings.data_type, self.settings.school
            )));
        }

        debug!(
            school = %self.settings.school,
            textbooks = request.textbooks,
            verbosity = request.verbosity,
            "Starting feed parser"
        );
        let records = self.load_records().await?;
        self.loaded = true;
        let data_type = self.settings.data_type;

        for (index, record) in records.into_iter().enumerate() {
            if !record.is_object() {
                return Err(IngestError::course_parse(format!(
                    "record {} is not a JSON object: {}",
                    index, record
                )));
            }
            let Some(record) = apply_filters(record, data_type, request) else {
                continue;
            };
            tracker.set_context(context_of(&record));
            self.ingestor.ingest(tracker, record)?;
        }

        info!(
            school = %self.settings.school,
            data_type = %data_type,
            accepted = self.ingestor.records().len(),
            "Feed parsed"
        );
        Ok(())
    }

    async fn end(&mut self, _tracker: &mut Tracker) -> Result<()> {
        if !self.loaded {
            debug!(
                school = %self.settings.school,
                data_type = %self.settings.data_type,
                "Feed never loaded; keeping previous output"
            );
            return Ok(());
        }
        self.ingestor.finish()
    }

    fn ingestor(&self) -> Value {
        self.ingestor.snapshot()
    }
}

async fn fetch(url: &str) -> Result<String> {
    let response = reqwest::get(url)
        .await
        .map_err(|e| IngestError::pipeline(format!("Failed to fetch {}: {}", url, e)))?;

    if !response.status().is_success() {
        return Err(IngestError::pipeline(format!(
            "Failed to fetch {}: {}",
            url,
            response.status()
        )));
    }

    response
        .text()
        .await
        .map_err(|e| IngestError::pipeline(format!("Failed to read body of {}: {}", url, e)))
}

fn extract_records(document: Value, data_type: DataType) -> Option<Vec<Value>> {
    match document {
        Value::Array(records) => Some(records),
        Value::Object(mut object) => match object.remove(data_type.as_str()) {
            Some(Value::Array(records)) => Some(records),
            _ => None,
        },
        _ => None,
    }
}

/// Apply the department and years/terms filters. `None` drops the record.
fn apply_filters(
    mut record: Value,
    data_type: DataType,
    request: &StartRequest,
) -> Option<Value> {
    if let (Some(departments), Some(department)) = (
        &request.departments_filter,
        record.get("department").and_then(Value::as_str),
    ) {
        if !departments.iter().any(|d| d == department) {
            return None;
        }
    }

    let filter = &request.years_and_terms_filter;
    if filter.is_empty() {
        return Some(record);
    }

    if data_type == DataType::Courses {
        let Some(Value::Array(sections)) = record.get_mut("sections") else {
            return Some(record);
        };
        let had_sections = !sections.is_empty();
        sections.retain(|section| in_terms(section, filter) != Some(false));
        if had_sections && sections.is_empty() {
            return None;
        }
        Some(record)
    } else if in_terms(&record, filter) == Some(false) {
        None
    } else {
        Some(record)
    }
}

/// `Some(true/false)` when `value` carries a year and term, `None` otherwise.
fn in_terms(value: &Value, filter: &YearsAndTerms) -> Option<bool> {
    let year = i32::try_from(value.get("year")?.as_i64()?).ok()?;
    let term = value.get("term")?.as_str()?;
    Some(
        filter
            .get(&year)
            .is_some_and(|terms| terms.iter().any(|t| t == term)),
    )
}

fn context_of(record: &Value) -> RecordContext {
    let first_section = record
        .get("sections")
        .and_then(Value::as_array)
        .and_then(|sections| sections.first());
    let source = first_section.unwrap_or(record);

    RecordContext {
        year: source
            .get("year")
            .and_then(Value::as_i64)
            .and_then(|y| i32::try_from(y).ok()),
        term: source.get("term").and_then(Value::as_str).map(str::to_string),
        department: record
            .get("department")
            .and_then(Value::as_str)
            .map(str::to_string),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureCategory;
    use serde_json::json;
    use std::path::Path;

    fn settings(dir: &Path, config: Value, data_type: DataType) -> ParserSettings {
        ParserSettings {
            school: "umd".into(),
            data_type,
            granularity: 5,
            config,
            output_path: dir.join("out.json"),
            output_error_path: dir.join("errors.json"),
            break_on_error: false,
            break_on_warning: false,
            display_progress_bar: false,
            validate: true,
        }
    }

    fn fall_2020() -> YearsAndTerms {
        [(2020, vec!["fall".to_string()])].into_iter().collect()
    }

    fn course(code: &str, department: &str, terms: &[(i32, &str)]) -> Value {
        let sections: Vec<Value> = terms
            .iter()
            .enumerate()
            .map(|(i, (year, term))| {
                json!({"section": format!("0{}", i + 1), "year": year, "term": term})
            })
            .collect();
        json!({"code": code, "name": code, "department": department, "sections": sections})
    }

    #[test]
    fn test_filters_drop_courses_outside_terms_and_departments() {
        let request = StartRequest {
            departments_filter: Some(vec!["CMSC".into()]),
            years_and_terms_filter: fall_2020(),
            ..Default::default()
        };

        let kept = apply_filters(
            course("CMSC131", "CMSC", &[(2020, "fall"), (2020, "spring")]),
            DataType::Courses,
            &request,
        )
        .unwrap();
        assert_eq!(kept["sections"].as_array().unwrap().len(), 1);

        assert!(apply_filters(
            course("CMSC132", "CMSC", &[(2021, "fall")]),
            DataType::Courses,
            &request
        )
        .is_none());
        assert!(apply_filters(
            course("MATH140", "MATH", &[(2020, "fall")]),
            DataType::Courses,
            &request
        )
        .is_none());
    }

    #[test]
    fn test_eval_filter_uses_record_year_and_term() {
        let request = StartRequest {
            years_and_terms_filter: fall_2020(),
            ..Default::default()
        };
        let eval = json!({"course_code": "CMSC131", "year": 2019, "term": "fall", "score": 4});
        assert!(apply_filters(eval, DataType::Evals, &request).is_none());
    }

    #[test]
    fn test_extract_records_accepts_array_or_keyed_object() {
        assert_eq!(
            extract_records(json!([{"a": 1}]), DataType::Courses).map(|r| r.len()),
            Some(1)
        );
        assert_eq!(
            extract_records(json!({"textbooks": [{}, {}]}), DataType::Textbooks).map(|r| r.len()),
            Some(2)
        );
        assert!(extract_records(json!({"courses": []}), DataType::Evals).is_none());
    }

    #[tokio::test]
    async fn test_inline_records_are_ingested_and_written() {
        let dir = tempfile::tempdir().unwrap();
        let config = json!({"records": [
            course("CMSC131", "CMSC", &[(2020, "fall")]),
            {"code": "BROKEN"}
        ]});
        let mut parser = FeedParser::new(settings(dir.path(), config, DataType::Courses));
        let mut tracker = Tracker::new();
        tracker.set_school("umd");

        parser.start(&mut tracker, &StartRequest::default()).await.unwrap();
        parser.end(&mut tracker).await.unwrap();

        let counts = tracker.state().counts("umd");
        assert_eq!((counts.valid, counts.total), (1, 2));
        assert!(dir.path().join("out.json").exists());
        assert!(dir.path().join("errors.json").exists());
        assert_eq!(tracker.state().context.department.as_deref(), None);
    }

    #[tokio::test]
    async fn test_non_object_record_is_a_course_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = json!({"records": [42]});
        let mut parser = FeedParser::new(settings(dir.path(), config, DataType::Courses));
        let mut tracker = Tracker::new();

        let err = parser
            .start(&mut tracker, &StartRequest::default())
            .await
            .unwrap_err();
        assert_eq!(err.category(), FailureCategory::CourseParse);
    }

    #[tokio::test]
    async fn test_disabled_feed_jumps() {
        let dir = tempfile::tempdir().unwrap();
        let mut parser = FeedParser::new(settings(
            dir.path(),
            json!({"enabled": false}),
            DataType::Evals,
        ));
        let err = parser
            .start(&mut Tracker::new(), &StartRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::ParseJump(_)));
    }

    #[tokio::test]
    async fn test_end_after_jump_keeps_existing_output() {
        let dir = tempfile::tempdir().unwrap();
        let previous = r#"{"records": [{"code": "KEEP"}]}"#;
        std::fs::write(dir.path().join("out.json"), previous).unwrap();
        let mut parser = FeedParser::new(settings(
            dir.path(),
            json!({"enabled": false}),
            DataType::Courses,
        ));
        let mut tracker = Tracker::new();

        assert!(parser.start(&mut tracker, &StartRequest::default()).await.is_err());
        parser.end(&mut tracker).await.unwrap();

        let kept = std::fs::read_to_string(dir.path().join("out.json")).unwrap();
        assert!(kept.contains("KEEP"));
        assert!(!dir.path().join("errors.json").exists());
    }

    #[tokio::test]
    async fn test_malformed_local_feed_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let feed = dir.path().join("feed.json");
        std::fs::write(&feed, "{ nope").unwrap();
        let config = json!({"source": feed.display().to_string()});
        let mut parser = FeedParser::new(settings(dir.path(), config, DataType::Courses));

        let err = parser
            .start(&mut Tracker::new(), &StartRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Parse(_)));
    }
}
