//! Course Catalog Ingest Library
//!
//! Drives per-school parsers over a batch of (data type, school) pairs,
//! isolating failures so one broken school never stops the batch.
//!
//! # Components
//!
//! - **Tracker**: run state and the event stream viewers subscribe to
//! - **Viewers**: the master log ([`viewer::LogFormatted`]) and the live
//!   counter ([`viewer::ProgressBar`])
//! - **Parsers**: the [`parser::SchoolParser`] lifecycle contract and the
//!   built-in JSON feed parser
//! - **Driver**: [`driver::IngestDriver`], which classifies every failure
//!
//! # Example
//!
//! ```no_run
//! use catalog_ingest::{IngestDriver, IngestOptions, SchoolRegistry};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let registry = SchoolRegistry::builtin();
//!     let options = IngestOptions {
//!         schools: vec!["jhu".to_string()],
//!         ..Default::default()
//!     };
//!     let report = IngestDriver::new(&registry, std::io::stderr())
//!         .handle(&options)
//!         .await?;
//!     println!("{} pairs completed", report.completed());
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod driver;
pub mod error;
pub mod options;
pub mod parser;
pub mod registry;
pub mod tracker;
pub mod types;
pub mod viewer;

pub use cli::Cli;
pub use driver::{BatchReport, IngestDriver, PairOutcome, PairReport};
pub use error::{FailureCategory, IngestError, Result};
pub use options::{ConfigSource, IngestOptions};
pub use registry::{RegistryError, SchoolInfo, SchoolRegistry};
pub use tracker::{Tracker, TrackerEvent, TrackerState};
pub use types::{DataType, IterationOrder};
