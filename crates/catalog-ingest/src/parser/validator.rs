//! Record shape validation
//!
//! Structural problems are reported as `JsonValidation` errors; a meeting
//! time that is not a multiple of the school's granularity is only a
//! `JsonValidationWarning`.

use crate::error::IngestError;
use crate::types::DataType;
use serde_json::{Map, Value};

const DAYS: [&str; 7] = ["M", "T", "W", "R", "F", "S", "U"];

#[derive(Debug, Clone)]
pub struct Validator {
    data_type: DataType,
    granularity: u32,
}

impl Validator {
    pub fn new(data_type: DataType, granularity: u32) -> Self {
        Self {
            data_type,
            granularity: granularity.max(1),
        }
    }

    /// Every issue found in `record`, errors and warnings mixed.
    pub fn validate(&self, record: &Value) -> Vec<IngestError> {
        let Some(object) = record.as_object() else {
            return vec![IngestError::validation(
                format!("{} record must be a JSON object", self.data_type.record_kind()),
                record,
            )];
        };

        let mut issues = Vec::new();
        let mut check = Check {
            record,
            issues: &mut issues,
        };
        match self.data_type {
            DataType::Courses => self.validate_course(object, &mut check),
            DataType::Evals => validate_eval(object, &mut check),
            DataType::Textbooks => validate_textbook(object, &mut check),
        }
        issues
    }

    /// Identity used for duplicate detection, when the record carries one.
    pub fn record_key(&self, record: &Value) -> Option<String> {
        let field = |name: &str| record.get(name).map(value_text);
        match self.data_type {
            DataType::Courses => field("code"),
            DataType::Evals => Some(format!(
                "{} {} {} {}",
                field("course_code")?,
                field("year")?,
                field("term")?,
                field("professor").unwrap_or_default()
            )),
            DataType::Textbooks => Some(format!("{} {}", field("course_code")?, field("isbn")?)),
        }
    }

    fn validate_course(&self, course: &Map<String, Value>, check: &mut Check<'_>) {
        check.non_empty_str(course, "code", "course");
        check.non_empty_str(course, "name", "course");
        if let Some(department) = course.get("department") {
            if !department.is_string() {
                check.error("course department must be a string");
            }
        }

        let Some(sections) = course.get("sections") else {
            return;
        };
        let Some(sections) = sections.as_array() else {
            check.error("course sections must be an array");
            return;
        };
        for section in sections {
            let Some(section) = section.as_object() else {
                check.error("section must be an object");
                continue;
            };
            check.non_empty_str(section, "section", "section");
            check.non_empty_str(section, "term", "section");
            check.integer(section, "year", "section");

            match section.get("meetings") {
                None => {}
                Some(Value::Array(meetings)) => {
                    for meeting in meetings {
                        self.validate_meeting(meeting, check);
                    }
                }
                Some(_) => check.error("section meetings must be an array"),
            }
        }
    }

    fn validate_meeting(&self, meeting: &Value, check: &mut Check<'_>) {
        let Some(meeting) = meeting.as_object() else {
            check.error("meeting must be an object");
            return;
        };

        match meeting.get("day").and_then(Value::as_str) {
            Some(day) if DAYS.contains(&day) => {}
            _ => check.error(format!("meeting day must be one of {}", DAYS.join(""))),
        }

        let start = meeting.get("time_start").and_then(Value::as_str).and_then(minutes);
        let end = meeting.get("time_end").and_then(Value::as_str).and_then(minutes);
        let (Some(start), Some(end)) = (start, end) else {
            check.error("meeting time_start and time_end must be HH:MM");
            return;
        };
        if start >= end {
            check.error("meeting time_start must be before time_end");
        }
        if start % self.granularity != 0 || end % self.granularity != 0 {
            check.warning(format!(
                "meeting time is not aligned to {} minute granularity",
                self.granularity
            ));
        }
    }
}

fn validate_eval(eval: &Map<String, Value>, check: &mut Check<'_>) {
    check.non_empty_str(eval, "course_code", "eval");
    check.non_empty_str(eval, "term", "eval");
    check.integer(eval, "year", "eval");
    match eval.get("score").and_then(Value::as_f64) {
        Some(score) if (0.0..=5.0).contains(&score) => {}
        Some(_) => check.error("eval score must be between 0 and 5"),
        None => check.error("eval score must be a number"),
    }
}

fn validate_textbook(textbook: &Map<String, Value>, check: &mut Check<'_>) {
    check.non_empty_str(textbook, "course_code", "textbook");
    let Some(isbn) = textbook.get("isbn").and_then(Value::as_str) else {
        check.error("textbook isbn must be a string");
        return;
    };
    let digits: String = isbn.chars().filter(|c| *c != '-').collect();
    let well_formed = matches!(digits.len(), 10 | 13)
        && digits
            .chars()
            .enumerate()
            .all(|(i, c)| c.is_ascii_digit() || (i == 9 && digits.len() == 10 && c == 'X'));
    if !well_formed {
        check.error(format!("textbook isbn '{}' must have 10 or 13 digits", isbn));
    }
}

/// `"HH:MM"` -> minutes since midnight
fn minutes(time: &str) -> Option<u32> {
    let (hours, mins) = time.split_once(':')?;
    let hours: u32 = hours.trim().parse().ok()?;
    let mins: u32 = mins.trim().parse().ok()?;
    (hours < 24 && mins < 60).then_some(hours * 60 + mins)
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

struct Check<'a> {
    record: &'a Value,
    issues: &'a mut Vec<IngestError>,
}

impl Check<'_> {
    fn error(&mut self, message: impl Into<String>) {
        self.issues.push(IngestError::validation(message, self.record));
    }

    fn warning(&mut self, message: impl Into<String>) {
        self.issues
            .push(IngestError::validation_warning(message, self.record));
    }

    fn non_empty_str(&mut self, object: &Map<String, Value>, field: &str, what: &str) {
        match object.get(field).and_then(Value::as_str) {
            Some(s) if !s.trim().is_empty() => {}
            _ => self.error(format!("{} {} must be a non-empty string", what, field)),
        }
    }

    fn integer(&mut self, object: &Map<String, Value>, field: &str, what: &str) {
        if object.get(field).and_then(Value::as_i64).is_none() {
            self.error(format!("{} {} must be an integer", what, field));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn course_with_meeting(start: &str, end: &str, day: &str) -> Value {
        json!({
            "code": "EN.601.226",
            "name": "Data Structures",
            "sections": [{
                "section": "01",
                "year": 2020,
                "term": "fall",
                "meetings": [{"day": day, "time_start": start, "time_end": end}]
            }]
        })
    }

    #[test]
    fn test_valid_course_has_no_issues() {
        let validator = Validator::new(DataType::Courses, 5);
        assert!(validator
            .validate(&course_with_meeting("9:00", "10:15", "M"))
            .is_empty());
    }

    #[test]
    fn test_meeting_errors() {
        let validator = Validator::new(DataType::Courses, 5);
        let issues = validator.validate(&course_with_meeting("11:00", "10:00", "X"));
        assert_eq!(issues.len(), 2);
        assert!(issues.iter().all(|i| !i.is_warning()));
    }

    #[test]
    fn test_granularity_misalignment_is_a_warning() {
        let validator = Validator::new(DataType::Courses, 30);
        let issues = validator.validate(&course_with_meeting("9:00", "10:15", "T"));
        assert_eq!(issues.len(), 1);
        assert!(matches!(issues[0], IngestError::JsonValidationWarning { .. }));
    }

    #[test]
    fn test_eval_score_range() {
        let validator = Validator::new(DataType::Evals, 5);
        let ok = json!({"course_code": "AS.110.108", "year": 2019, "term": "spring", "score": 4.2});
        let bad = json!({"course_code": "AS.110.108", "year": 2019, "term": "spring", "score": 7});
        assert!(validator.validate(&ok).is_empty());
        assert_eq!(validator.validate(&bad).len(), 1);
    }

    #[test]
    fn test_textbook_isbn() {
        let validator = Validator::new(DataType::Textbooks, 5);
        let ok = json!({"course_code": "CSC108", "isbn": "978-0-13-468599-1"});
        let ten = json!({"course_code": "CSC108", "isbn": "0-306-40615-X"});
        let bad = json!({"course_code": "CSC108", "isbn": "12345"});
        assert!(validator.validate(&ok).is_empty());
        assert!(validator.validate(&ten).is_empty());
        assert_eq!(validator.validate(&bad).len(), 1);
    }

    #[test]
    fn test_record_keys() {
        let courses = Validator::new(DataType::Courses, 5);
        assert_eq!(
            courses.record_key(&json!({"code": "CSC108"})).as_deref(),
            Some("CSC108")
        );
        assert_eq!(courses.record_key(&json!({"name": "x"})), None);

        let textbooks = Validator::new(DataType::Textbooks, 5);
        assert_eq!(
            textbooks
                .record_key(&json!({"course_code": "CSC108", "isbn": "0306406152"}))
                .as_deref(),
            Some("CSC108 0306406152")
        );
    }

    #[test]
    fn test_minutes() {
        assert_eq!(minutes("09:30"), Some(570));
        assert_eq!(minutes("24:00"), None);
        assert_eq!(minutes("noon"), None);
    }
}
