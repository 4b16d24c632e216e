//! Static school registry
//!
//! Maps school codes to their display name, schedule granularity and the
//! parser constructor for each supported data type. The driver validates a
//! whole batch against the registry before running any pair.

use crate::options::IngestOptions;
use crate::parser::{FeedParser, ParserFactory};
use crate::types::DataType;
use std::collections::BTreeMap;
use thiserror::Error;

/// Granularity assumed for schools that do not declare one
pub const DEFAULT_GRANULARITY: u32 = 5;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Unknown school '{0}'. Registered schools: {1}")]
    UnknownSchool(String, String),

    #[error("School '{school}' has no {data_type} parser")]
    UnsupportedDataType { school: String, data_type: DataType },

    #[error("No schools requested and none registered")]
    Empty,
}

#[derive(Clone)]
pub struct SchoolInfo {
    pub code: String,
    pub name: String,
    /// Smallest number of minutes needed to describe start/end times
    pub granularity: u32,
    parsers: BTreeMap<DataType, ParserFactory>,
}

impl SchoolInfo {
    pub fn new(code: impl Into<String>, name: impl Into<String>, granularity: u32) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            granularity,
            parsers: BTreeMap::new(),
        }
    }

    pub fn with_parser(mut self, data_type: DataType, factory: ParserFactory) -> Self {
        self.parsers.insert(data_type, factory);
        self
    }

    pub fn parser(&self, data_type: DataType) -> Option<&ParserFactory> {
        self.parsers.get(&data_type)
    }

    pub fn data_types(&self) -> impl Iterator<Item = DataType> + '_ {
        self.parsers.keys().copied()
    }
}

impl std::fmt::Debug for SchoolInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchoolInfo")
            .field("code", &self.code)
            .field("name", &self.name)
            .field("granularity", &self.granularity)
            .field("parsers", &self.parsers.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[derive(Debug, Clone, Default)]
pub struct SchoolRegistry {
    schools: BTreeMap<String, SchoolInfo>,
}

impl SchoolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schools shipped with the ingestion tool, all served by the JSON feed
    /// parser.
    pub fn builtin() -> Self {
        let schools = [
            ("jhu", "Johns Hopkins University", 5),
            ("uoft", "University of Toronto", 30),
            ("umd", "University of Maryland", 5),
            ("rutgers", "Rutgers University", 5),
            ("uo", "University of Ottawa", DEFAULT_GRANULARITY),
        ];

        let mut registry = Self::new();
        for (code, name, granularity) in schools {
            let mut info = SchoolInfo::new(code, name, granularity);
            for data_type in DataType::ALL {
                info = info.with_parser(data_type, FeedParser::factory());
            }
            registry.register(info);
        }
        registry
    }

    pub fn register(&mut self, info: SchoolInfo) {
        self.schools.insert(info.code.clone(), info);
    }

    pub fn get(&self, school: &str) -> Option<&SchoolInfo> {
        self.schools.get(school)
    }

    pub fn codes(&self) -> Vec<String> {
        self.schools.keys().cloned().collect()
    }

    pub fn granularity(&self, school: &str) -> u32 {
        self.get(school)
            .map(|info| info.granularity)
            .unwrap_or(DEFAULT_GRANULARITY)
    }

    pub fn parser(&self, school: &str, data_type: DataType) -> Option<&ParserFactory> {
        self.get(school).and_then(|info| info.parser(data_type))
    }

    /// Check every requested pair before any work starts.
    pub fn validate(&self, options: &IngestOptions) -> Result<(), RegistryError> {
        if options.schools.is_empty() {
            return Err(RegistryError::Empty);
        }
        for school in &options.schools {
            let Some(info) = self.get(school) else {
                return Err(RegistryError::UnknownSchool(
                    school.clone(),
                    self.codes().join(", "),
                ));
            };
            for data_type in &options.types {
                if info.parser(*data_type).is_none() {
                    return Err(RegistryError::UnsupportedDataType {
                        school: school.clone(),
                        data_type: *data_type,
                    });
                }
            }
        }
        Ok(())
    }

    /// Requested schools, de-duplicated in order, or every registered school
    /// when none were requested.
    pub fn resolve_schools(&self, requested: &[String]) -> Vec<String> {
        if requested.is_empty() {
            return self.codes();
        }
        let mut resolved: Vec<String> = Vec::with_capacity(requested.len());
        for school in requested {
            if !resolved.contains(school) {
                resolved.push(school.clone());
            }
        }
        resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_schools() {
        let registry = SchoolRegistry::builtin();
        assert_eq!(registry.codes(), vec!["jhu", "rutgers", "umd", "uo", "uoft"]);
        assert_eq!(registry.granularity("uoft"), 30);
        assert_eq!(registry.granularity("jhu"), 5);
        assert!(registry.parser("umd", DataType::Textbooks).is_some());
    }

    #[test]
    fn test_validate_rejects_unknown_school() {
        let registry = SchoolRegistry::builtin();
        let options = IngestOptions {
            schools: vec!["jhu".into(), "mit".into()],
            ..Default::default()
        };
        let err = registry.validate(&options).unwrap_err();
        assert!(matches!(err, RegistryError::UnknownSchool(ref s, _) if s == "mit"));
    }

    #[test]
    fn test_validate_rejects_missing_parser() {
        let mut registry = SchoolRegistry::new();
        registry.register(
            SchoolInfo::new("vandy", "Vanderbilt University", 5)
                .with_parser(DataType::Courses, FeedParser::factory()),
        );
        let options = IngestOptions {
            schools: vec!["vandy".into()],
            types: vec![DataType::Courses, DataType::Evals],
            ..Default::default()
        };
        assert_eq!(
            registry.validate(&options),
            Err(RegistryError::UnsupportedDataType {
                school: "vandy".into(),
                data_type: DataType::Evals
            })
        );
    }

    #[test]
    fn test_resolve_schools() {
        let registry = SchoolRegistry::builtin();
        assert_eq!(registry.resolve_schools(&[]).len(), 5);
        assert_eq!(
            registry.resolve_schools(&["umd".into(), "jhu".into(), "umd".into()]),
            vec!["umd", "jhu"]
        );
    }
}
