//! Small shared enums

use serde::{Deserialize, Serialize};

/// Kind of catalog data a parser produces
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Courses,
    Evals,
    Textbooks,
}

impl DataType {
    pub const ALL: [DataType; 3] = [DataType::Courses, DataType::Evals, DataType::Textbooks];

    pub fn as_str(self) -> &'static str {
        match self {
            DataType::Courses => "courses",
            DataType::Evals => "evals",
            DataType::Textbooks => "textbooks",
        }
    }

    /// Record kind counted on the tracker for this data type.
    pub fn record_kind(self) -> &'static str {
        match self {
            DataType::Courses => "course",
            DataType::Evals => "eval",
            DataType::Textbooks => "textbook",
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DataType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "courses" | "course" => Ok(DataType::Courses),
            "evals" | "eval" => Ok(DataType::Evals),
            "textbooks" | "textbook" => Ok(DataType::Textbooks),
            other => Err(format!("unknown data type: {}", other)),
        }
    }
}

/// Which dimension of the (data type x school) product is the outer loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum IterationOrder {
    #[default]
    TypesFirst,
    SchoolsFirst,
}
