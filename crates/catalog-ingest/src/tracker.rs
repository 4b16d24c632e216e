//! Run-scoped progress and error aggregation
//!
//! A [`Tracker`] is created once per invocation and passed by `&mut` to the
//! driver and to the parser that is currently running. Every mutation is
//! pushed synchronously to the registered [`Viewer`]s, in registration order,
//! before the mutating call returns.
//!
//! Viewers only ever see a shared [`TrackerState`]; they cannot write back.

use crate::error::FailureCategory;
use crate::options::IngestOptions;
use crate::types::DataType;
use crate::viewer::Viewer;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackerMode {
    #[default]
    Idle,
    Ingesting,
}

impl std::fmt::Display for TrackerMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackerMode::Idle => f.write_str("idle"),
            TrackerMode::Ingesting => f.write_str("ingesting"),
        }
    }
}

/// Valid/total record counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Counts {
    pub valid: u64,
    pub total: u64,
}

impl std::ops::AddAssign for Counts {
    fn add_assign(&mut self, rhs: Self) {
        self.valid += rhs.valid;
        self.total += rhs.total;
    }
}

/// Position inside the source a parser is currently reading
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecordContext {
    pub year: Option<i32>,
    pub term: Option<String>,
    pub department: Option<String>,
}

/// One error seen during the batch. Never removed once appended.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorEvent {
    pub kind: FailureCategory,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    pub school: Option<String>,
    pub data_type: Option<DataType>,
    pub seen_at: DateTime<Utc>,
}

/// Notifications pushed to viewers
#[derive(Debug, Clone, Copy)]
pub enum TrackerEvent<'a> {
    Started,
    ModeChanged,
    SchoolChanged,
    DataTypeChanged,
    ContextChanged,
    Stats { kind: &'a str },
    Error(&'a ErrorEvent),
    Ended,
}

/// Everything a viewer may read
#[derive(Debug, Clone, Serialize)]
pub struct TrackerState {
    pub run_id: Uuid,
    pub mode: TrackerMode,
    pub school: Option<String>,
    pub data_type: Option<DataType>,
    pub context: RecordContext,
    /// school -> record kind -> counters
    pub stats: BTreeMap<String, BTreeMap<String, Counts>>,
    pub errors: Vec<ErrorEvent>,
    pub cmd_options: Option<IngestOptions>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl TrackerState {
    fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            mode: TrackerMode::Idle,
            school: None,
            data_type: None,
            context: RecordContext::default(),
            stats: BTreeMap::new(),
            errors: Vec::new(),
            cmd_options: None,
            started_at: None,
            ended_at: None,
        }
    }

    /// Counters summed over every record kind of `school`.
    pub fn counts(&self, school: &str) -> Counts {
        let mut sum = Counts::default();
        if let Some(kinds) = self.stats.get(school) {
            for counts in kinds.values() {
                sum += *counts;
            }
        }
        sum
    }

    /// Counters for the current school, or zero outside a pair.
    pub fn current_counts(&self) -> Counts {
        self.school
            .as_deref()
            .map(|school| self.counts(school))
            .unwrap_or_default()
    }

    /// Counters of the current pair: the current school, restricted to the
    /// record kind of the current data type when one is set.
    pub fn pair_counts(&self) -> Counts {
        let Some(school) = self.school.as_deref() else {
            return Counts::default();
        };
        match self.data_type {
            Some(data_type) => self
                .stats
                .get(school)
                .and_then(|kinds| kinds.get(data_type.record_kind()))
                .copied()
                .unwrap_or_default(),
            None => self.counts(school),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Running,
    Ended,
}

pub struct Tracker {
    state: TrackerState,
    viewers: Vec<Box<dyn Viewer>>,
    phase: Phase,
}

impl Default for Tracker {
    fn default() -> Self {
        Self::new()
    }
}

impl Tracker {
    pub fn new() -> Self {
        Self {
            state: TrackerState::new(),
            viewers: Vec::new(),
            phase: Phase::Idle,
        }
    }

    pub fn state(&self) -> &TrackerState {
        &self.state
    }

    pub fn errors(&self) -> &[ErrorEvent] {
        &self.state.errors
    }

    pub fn counts(&self, school: &str) -> Counts {
        self.state.counts(school)
    }

    /// Counters for the current school.
    pub fn totals(&self) -> Counts {
        self.state.current_counts()
    }

    pub fn viewer_count(&self) -> usize {
        self.viewers.len()
    }

    /// Run `f` with every viewer off the terminal, for writing to stderr
    /// without tearing an in-place progress line.
    pub fn suspend(&self, f: &mut dyn FnMut()) {
        suspend_all(&self.viewers, f);
    }

    pub fn set_cmd_options(&mut self, options: IngestOptions) {
        self.state.cmd_options = Some(options);
    }

    pub fn add_viewer(&mut self, viewer: Box<dyn Viewer>) {
        debug!(viewer = viewer.name(), "Registered viewer");
        self.viewers.push(viewer);
    }

    /// Open the batch. Viewers acquire their output resources here.
    pub fn start(&mut self) {
        if self.phase != Phase::Idle {
            warn!("Tracker started twice; ignoring");
            return;
        }
        self.phase = Phase::Running;
        self.state.started_at = Some(Utc::now());
        self.broadcast(TrackerEvent::Started);
    }

    /// Close the batch. Idempotent; viewers release their resources here.
    pub fn end(&mut self) {
        if self.phase != Phase::Running {
            return;
        }
        self.phase = Phase::Ended;
        self.state.ended_at = Some(Utc::now());
        self.broadcast(TrackerEvent::Ended);
    }

    pub fn set_mode(&mut self, mode: TrackerMode) {
        self.state.mode = mode;
        self.broadcast(TrackerEvent::ModeChanged);
    }

    pub fn set_school(&mut self, school: impl Into<String>) {
        self.state.school = Some(school.into());
        self.state.context = RecordContext::default();
        self.broadcast(TrackerEvent::SchoolChanged);
    }

    pub fn set_data_type(&mut self, data_type: DataType) {
        self.state.data_type = Some(data_type);
        self.broadcast(TrackerEvent::DataTypeChanged);
    }

    pub fn set_context(&mut self, context: RecordContext) {
        self.state.context = context;
        self.broadcast(TrackerEvent::ContextChanged);
    }

    pub fn record_total(&mut self, kind: &str) {
        self.bump(kind, |counts| counts.total += 1);
    }

    pub fn record_valid(&mut self, kind: &str) {
        self.bump(kind, |counts| counts.valid += 1);
    }

    /// Record an unclassified error carrying only a message.
    pub fn see_error(&mut self, message: impl Into<String>) {
        self.see_error_event(FailureCategory::Unclassified, message, None);
    }

    pub fn see_error_event(
        &mut self,
        kind: FailureCategory,
        message: impl Into<String>,
        payload: Option<Value>,
    ) {
        self.state.errors.push(ErrorEvent {
            kind,
            message: message.into(),
            payload,
            school: self.state.school.clone(),
            data_type: self.state.data_type,
            seen_at: Utc::now(),
        });

        let Self { state, viewers, .. } = self;
        if let Some(event) = state.errors.last() {
            notify(viewers, state, TrackerEvent::Error(event));
        }
    }

    fn bump(&mut self, kind: &str, apply: impl FnOnce(&mut Counts)) {
        let school = self.state.school.clone().unwrap_or_default();
        let counts = self
            .state
            .stats
            .entry(school)
            .or_default()
            .entry(kind.to_string())
            .or_default();
        apply(counts);
        self.broadcast(TrackerEvent::Stats { kind });
    }

    fn broadcast(&mut self, event: TrackerEvent<'_>) {
        notify(&mut self.viewers, &self.state, event);
    }
}

impl Drop for Tracker {
    fn drop(&mut self) {
        self.end();
    }
}

fn notify(viewers: &mut [Box<dyn Viewer>], state: &TrackerState, event: TrackerEvent<'_>) {
    for viewer in viewers.iter_mut() {
        if let Err(e) = viewer.receive(state, &event) {
            warn!(viewer = viewer.name(), error = %e, "Viewer failed to render tracker event");
        }
    }
}

fn suspend_all(viewers: &[Box<dyn Viewer>], f: &mut dyn FnMut()) {
    match viewers.split_first() {
        Some((first, rest)) => first.suspend(&mut || suspend_all(rest, f)),
        None => f(),
    }
}
