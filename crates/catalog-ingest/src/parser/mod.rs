//! Parser contract
//!
//! A parser is built once per (school, data type) pair from
//! [`ParserSettings`] and driven through [`ParserHandle`], which enforces the
//! `Constructed -> Started -> Ended` lifecycle and turns panics into
//! unclassified failures.

mod feed;
mod ingestor;
mod validator;

pub use feed::FeedParser;
pub use ingestor::{ErrorRecord, Ingestor, Severity};
pub use validator::Validator;

use crate::error::{FailureCategory, IngestError, Result};
use crate::options::YearsAndTerms;
use crate::tracker::Tracker;
use crate::types::DataType;
use async_trait::async_trait;
use futures::FutureExt;
use serde_json::Value;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;

/// Everything a parser is constructed with
#[derive(Debug, Clone)]
pub struct ParserSettings {
    pub school: String,
    pub data_type: DataType,
    /// Minimum time resolution of the school's schedule, in minutes
    pub granularity: u32,
    pub config: Value,
    pub output_path: PathBuf,
    pub output_error_path: PathBuf,
    pub break_on_error: bool,
    pub break_on_warning: bool,
    pub display_progress_bar: bool,
    pub validate: bool,
}

/// Arguments to [`SchoolParser::start`]
#[derive(Debug, Clone, Default)]
pub struct StartRequest {
    pub verbosity: u8,
    pub textbooks: bool,
    pub departments_filter: Option<Vec<String>>,
    pub years_and_terms_filter: YearsAndTerms,
}

#[async_trait]
pub trait SchoolParser: Send {
    /// Fetch, parse and validate; accepted records go to the ingestor.
    async fn start(&mut self, tracker: &mut Tracker, request: &StartRequest) -> Result<()>;

    /// Flush outputs and release resources.
    async fn end(&mut self, tracker: &mut Tracker) -> Result<()>;

    /// Snapshot of everything accumulated so far, for diagnostics.
    fn ingestor(&self) -> Value;
}

pub type ParserFactory = Arc<dyn Fn(ParserSettings) -> Box<dyn SchoolParser> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Constructed,
    Started,
    /// `start` failed; `recoverable` is true for pipeline warnings
    Failed { recoverable: bool },
    Ended,
}

impl std::fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Lifecycle::Constructed => f.write_str("constructed"),
            Lifecycle::Started => f.write_str("started"),
            Lifecycle::Failed { recoverable: true } => f.write_str("stopped by a warning"),
            Lifecycle::Failed { recoverable: false } => f.write_str("failed"),
            Lifecycle::Ended => f.write_str("ended"),
        }
    }
}

pub struct ParserHandle {
    parser: Box<dyn SchoolParser>,
    state: Lifecycle,
}

impl ParserHandle {
    pub fn new(parser: Box<dyn SchoolParser>) -> Self {
        Self {
            parser,
            state: Lifecycle::Constructed,
        }
    }

    pub fn state(&self) -> Lifecycle {
        self.state
    }

    /// Whether `end` is currently a legal transition.
    pub fn can_end(&self) -> bool {
        matches!(
            self.state,
            Lifecycle::Started | Lifecycle::Failed { recoverable: true }
        )
    }

    pub async fn start(&mut self, tracker: &mut Tracker, request: &StartRequest) -> Result<()> {
        if self.state != Lifecycle::Constructed {
            return Err(IngestError::Lifecycle {
                action: "start",
                state: self.state.to_string(),
            });
        }

        let outcome = AssertUnwindSafe(self.parser.start(tracker, request))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(panicked("start", panic)));

        self.state = match &outcome {
            Ok(()) => Lifecycle::Started,
            Err(err) => Lifecycle::Failed {
                recoverable: err.category() == FailureCategory::PipelineWarning,
            },
        };
        outcome
    }

    pub async fn end(&mut self, tracker: &mut Tracker) -> Result<()> {
        if !self.can_end() {
            return Err(IngestError::Lifecycle {
                action: "end",
                state: self.state.to_string(),
            });
        }

        let outcome = AssertUnwindSafe(self.parser.end(tracker))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(panicked("end", panic)));
        self.state = Lifecycle::Ended;
        outcome
    }

    pub fn ingestor(&self) -> Value {
        self.parser.ingestor()
    }
}

fn panicked(stage: &str, payload: Box<dyn Any + Send>) -> IngestError {
    let message = if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    };
    IngestError::Unexpected(anyhow::anyhow!("parser panicked during {}: {}", stage, message))
}
