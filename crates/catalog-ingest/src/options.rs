//! Run configuration
//!
//! [`IngestOptions`] is built once from the command line and is read-only
//! for the rest of the batch. Path-like options are templates expanded per
//! pair with `{school}` and `{type}`.

use crate::error::{IngestError, Result};
use crate::types::{DataType, IterationOrder};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::debug;

/// Year -> terms to ingest
pub type YearsAndTerms = BTreeMap<i32, Vec<String>>;

pub const DEFAULT_CONFIG_TEMPLATE: &str = "data/schools/{school}/config.json";
pub const DEFAULT_OUTPUT_TEMPLATE: &str = "data/schools/{school}/{type}.json";
pub const DEFAULT_OUTPUT_ERROR_TEMPLATE: &str = "data/schools/{school}/logs/error_{type}.json";
pub const DEFAULT_MASTER_LOG: &str = "data/logs/master.log";

/// Where a pair's parser configuration comes from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigSource {
    /// Path template, loaded fresh for every pair
    Template(String),
    /// Configuration object shared by every pair
    Inline(Value),
}

impl ConfigSource {
    /// Interpret a command-line value: a JSON object literal is inline,
    /// anything else is a path template.
    pub fn from_arg(raw: &str) -> std::result::Result<Self, String> {
        if raw.trim_start().starts_with('{') {
            let value: Value =
                serde_json::from_str(raw).map_err(|e| format!("invalid inline config: {}", e))?;
            Ok(ConfigSource::Inline(value))
        } else {
            Ok(ConfigSource::Template(raw.to_string()))
        }
    }

    /// Resolve the configuration object for one pair.
    pub fn load(&self, school: &str, data_type: DataType) -> Result<Value> {
        let value = match self {
            ConfigSource::Inline(value) => value.clone(),
            ConfigSource::Template(template) => {
                let path = format_template(template, school, data_type)?;
                debug!(path = %path, school, %data_type, "Loading parser config");
                let raw = std::fs::read_to_string(&path).map_err(|e| {
                    IngestError::pipeline(format!("Could not read config {}: {}", path, e))
                })?;
                serde_json::from_str(&raw).map_err(|e| {
                    IngestError::pipeline(format!("Config {} is not valid JSON: {}", path, e))
                })?
            }
        };

        if !value.is_object() {
            return Err(IngestError::pipeline(format!(
                "Config for {} {} must be a JSON object",
                school, data_type
            )));
        }
        Ok(value)
    }
}

/// Options for one ingestion batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestOptions {
    pub schools: Vec<String>,
    pub types: Vec<DataType>,
    pub config: ConfigSource,
    pub output: String,
    pub output_error: String,
    pub break_on_error: bool,
    pub break_on_warning: bool,
    pub display_progress_bar: bool,
    pub validate: bool,
    pub verbosity: u8,
    pub years: Vec<i32>,
    pub terms: Vec<String>,
    pub years_and_terms: Option<YearsAndTerms>,
    pub departments: Option<Vec<String>>,
    pub master_log: PathBuf,
    pub order: IterationOrder,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            schools: Vec::new(),
            types: vec![DataType::Courses],
            config: ConfigSource::Template(DEFAULT_CONFIG_TEMPLATE.to_string()),
            output: DEFAULT_OUTPUT_TEMPLATE.to_string(),
            output_error: DEFAULT_OUTPUT_ERROR_TEMPLATE.to_string(),
            break_on_error: false,
            break_on_warning: false,
            display_progress_bar: false,
            validate: true,
            verbosity: 0,
            years: Vec::new(),
            terms: Vec::new(),
            years_and_terms: None,
            departments: None,
            master_log: PathBuf::from(DEFAULT_MASTER_LOG),
            order: IterationOrder::TypesFirst,
        }
    }
}

impl IngestOptions {
    /// Years/terms filter handed to parsers.
    ///
    /// An explicit mapping wins verbatim. Otherwise every configured year
    /// gets the full list of configured terms.
    pub fn resolve_years_and_terms(&self) -> YearsAndTerms {
        if let Some(explicit) = &self.years_and_terms {
            return explicit.clone();
        }

        let mut resolved = YearsAndTerms::new();
        for year in &self.years {
            resolved
                .entry(*year)
                .or_default()
                .extend(self.terms.iter().cloned());
        }
        resolved
    }

    pub fn output_path(&self, school: &str, data_type: DataType) -> Result<PathBuf> {
        format_template(&self.output, school, data_type).map(PathBuf::from)
    }

    pub fn output_error_path(&self, school: &str, data_type: DataType) -> Result<PathBuf> {
        format_template(&self.output_error, school, data_type).map(PathBuf::from)
    }

    /// Every (data type, school) pair in processing order.
    pub fn pairs(&self) -> Vec<(DataType, String)> {
        let mut pairs = Vec::with_capacity(self.types.len() * self.schools.len());
        match self.order {
            IterationOrder::TypesFirst => {
                for data_type in &self.types {
                    for school in &self.schools {
                        pairs.push((*data_type, school.clone()));
                    }
                }
            }
            IterationOrder::SchoolsFirst => {
                for school in &self.schools {
                    for data_type in &self.types {
                        pairs.push((*data_type, school.clone()));
                    }
                }
            }
        }
        pairs
    }
}

/// Expand `{school}` and `{type}` in `template`. `{{` and `}}` are literal
/// braces; any other placeholder is an error.
pub fn format_template(template: &str, school: &str, data_type: DataType) -> Result<String> {
    let mut out = String::with_capacity(template.len() + school.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut key = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(k) => key.push(k),
                        None => {
                            return Err(IngestError::pipeline(format!(
                                "Unterminated placeholder in template '{}'",
                                template
                            )))
                        }
                    }
                }
                match key.as_str() {
                    "school" => out.push_str(school),
                    "type" => out.push_str(data_type.as_str()),
                    other => {
                        return Err(IngestError::pipeline(format!(
                            "Unknown placeholder '{{{}}}' in template '{}'",
                            other, template
                        )))
                    }
                }
            }
            other => out.push(other),
        }
    }

    Ok(out)
}
