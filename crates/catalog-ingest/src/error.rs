//! Failure taxonomy for ingestion runs
//!
//! Every failure a parser can produce is an [`IngestError`]. The driver never
//! matches on individual variants; it asks for the [`FailureCategory`] and
//! dispatches on that, so adding a variant only requires placing it in a
//! category.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for ingestion operations
pub type Result<T> = std::result::Result<T, IngestError>;

#[derive(Error, Debug)]
pub enum IngestError {
    /// Hard failure that only invalidates the current pair
    #[error("{0}")]
    Pipeline(String),

    /// The source document could not be read as the expected format
    #[error("Parse error: {0}")]
    Parse(String),

    /// A parser method was called out of lifecycle order
    #[error("Parser lifecycle violation: cannot {action} while {state}")]
    Lifecycle { action: &'static str, state: String },

    #[error("{0}")]
    PipelineWarning(String),

    #[error("Parse warning: {0}")]
    ParseWarning(String),

    /// Control-flow signal used by parsers to skip the rest of a source
    #[error("Parse jump: {0}")]
    ParseJump(String),

    /// A record could not be interpreted as a course, eval or textbook
    #[error("{0}")]
    CourseParse(String),

    #[error("{message}\n{record}")]
    JsonValidation { message: String, record: String },

    #[error("{message}\n{record}")]
    JsonValidationWarning { message: String, record: String },

    #[error("{0}")]
    IngestorWarning(String),

    /// Anything a parser did not anticipate
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

/// How the driver treats a failure.
///
/// `PipelineError` and `PipelineWarning` are reported on stderr only; the
/// other categories are also recorded on the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    PipelineError,
    PipelineWarning,
    CourseParse,
    Validation,
    Unclassified,
}

impl FailureCategory {
    /// Whether the driver records failures of this category on the tracker.
    pub fn is_recorded(self) -> bool {
        !matches!(
            self,
            FailureCategory::PipelineError | FailureCategory::PipelineWarning
        )
    }
}

impl std::fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FailureCategory::PipelineError => "pipeline_error",
            FailureCategory::PipelineWarning => "pipeline_warning",
            FailureCategory::CourseParse => "course_parse",
            FailureCategory::Validation => "validation",
            FailureCategory::Unclassified => "unclassified",
        };
        f.write_str(name)
    }
}

impl IngestError {
    pub fn category(&self) -> FailureCategory {
        match self {
            IngestError::Pipeline(_) | IngestError::Parse(_) | IngestError::Lifecycle { .. } => {
                FailureCategory::PipelineError
            }
            IngestError::PipelineWarning(_)
            | IngestError::ParseWarning(_)
            | IngestError::ParseJump(_) => FailureCategory::PipelineWarning,
            IngestError::CourseParse(_) => FailureCategory::CourseParse,
            IngestError::JsonValidation { .. }
            | IngestError::JsonValidationWarning { .. }
            | IngestError::IngestorWarning(_) => FailureCategory::Validation,
            IngestError::Unexpected(_) => FailureCategory::Unclassified,
        }
    }

    /// Create a pipeline error
    pub fn pipeline(msg: impl Into<String>) -> Self {
        Self::Pipeline(msg.into())
    }

    /// Create a parse error
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    /// Create a course parse error
    pub fn course_parse(msg: impl Into<String>) -> Self {
        Self::CourseParse(msg.into())
    }

    /// Create a validation error for `record`
    pub fn validation(msg: impl Into<String>, record: &serde_json::Value) -> Self {
        Self::JsonValidation {
            message: msg.into(),
            record: record.to_string(),
        }
    }

    /// Create a validation warning for `record`
    pub fn validation_warning(msg: impl Into<String>, record: &serde_json::Value) -> Self {
        Self::JsonValidationWarning {
            message: msg.into(),
            record: record.to_string(),
        }
    }

    /// Create an ingestor warning
    pub fn ingestor_warning(msg: impl Into<String>) -> Self {
        Self::IngestorWarning(msg.into())
    }

    /// True for failures that are soft by nature (warnings, jumps).
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            IngestError::PipelineWarning(_)
                | IngestError::ParseWarning(_)
                | IngestError::ParseJump(_)
                | IngestError::JsonValidationWarning { .. }
                | IngestError::IngestorWarning(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_categories() {
        assert_eq!(
            IngestError::parse("bad json").category(),
            FailureCategory::PipelineError
        );
        assert_eq!(
            IngestError::ParseJump("skip".into()).category(),
            FailureCategory::PipelineWarning
        );
        assert_eq!(
            IngestError::course_parse("not an object").category(),
            FailureCategory::CourseParse
        );
        assert_eq!(
            IngestError::ingestor_warning("duplicate").category(),
            FailureCategory::Validation
        );
        assert_eq!(
            IngestError::from(anyhow::anyhow!("boom")).category(),
            FailureCategory::Unclassified
        );
    }

    #[test]
    fn test_print_only_categories_are_not_recorded() {
        assert!(!FailureCategory::PipelineError.is_recorded());
        assert!(!FailureCategory::PipelineWarning.is_recorded());
        assert!(FailureCategory::CourseParse.is_recorded());
        assert!(FailureCategory::Validation.is_recorded());
        assert!(FailureCategory::Unclassified.is_recorded());
    }

    #[test]
    fn test_validation_message_includes_record() {
        let err = IngestError::validation("missing name", &json!({"code": "AS.110.108"}));
        let text = err.to_string();
        assert!(text.starts_with("missing name\n"));
        assert!(text.contains("AS.110.108"));
        assert!(!err.is_warning());
        assert!(IngestError::validation_warning("x", &json!({})).is_warning());
    }
}
