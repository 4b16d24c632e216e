//! Command-line surface of `catalog-ingest`

use crate::options::{
    ConfigSource, IngestOptions, YearsAndTerms, DEFAULT_CONFIG_TEMPLATE, DEFAULT_MASTER_LOG,
    DEFAULT_OUTPUT_ERROR_TEMPLATE, DEFAULT_OUTPUT_TEMPLATE,
};
use crate::types::{DataType, IterationOrder};
use clap::{ArgAction, Parser};
use std::path::PathBuf;

/// Ingest course catalog data for one or more schools
#[derive(Parser, Debug)]
#[command(name = "catalog-ingest")]
#[command(author, version, about = "Course catalog ingestion driver", long_about = None)]
pub struct Cli {
    /// School to ingest; repeat for several (defaults to every registered school)
    #[arg(short, long = "school", value_name = "SCHOOL")]
    pub schools: Vec<String>,

    /// Data type to ingest; repeat for several
    #[arg(short, long = "type", value_name = "TYPE", value_enum, default_values_t = [DataType::Courses])]
    pub types: Vec<DataType>,

    /// Parser config: a path template using {school} and {type}, or an inline JSON object
    #[arg(long, env = "CATALOG_CONFIG", default_value = DEFAULT_CONFIG_TEMPLATE, value_parser = ConfigSource::from_arg)]
    pub config: ConfigSource,

    /// Output path template for accepted records
    #[arg(short, long, env = "CATALOG_OUTPUT", default_value = DEFAULT_OUTPUT_TEMPLATE)]
    pub output: String,

    /// Output path template for rejected-record reports
    #[arg(long, env = "CATALOG_OUTPUT_ERROR", default_value = DEFAULT_OUTPUT_ERROR_TEMPLATE)]
    pub output_error: String,

    /// Abort a school's run on its first validation error
    #[arg(long)]
    pub break_on_error: bool,

    /// Abort a school's run on its first warning
    #[arg(long)]
    pub break_on_warning: bool,

    /// Show a live {valid}/{total} counter on stderr
    #[arg(long)]
    pub display_progress_bar: bool,

    /// Accept records without validating them
    #[arg(long)]
    pub no_validate: bool,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Years to ingest, comma separated
    #[arg(long, value_delimiter = ',')]
    pub years: Vec<i32>,

    /// Terms to ingest for every year, comma separated
    #[arg(long, value_delimiter = ',')]
    pub terms: Vec<String>,

    /// Explicit year -> terms mapping as JSON, e.g. '{"2019": ["winter"]}'; overrides --years/--terms
    #[arg(long, value_parser = parse_years_and_terms)]
    pub years_and_terms: Option<YearsAndTerms>,

    /// Only ingest these departments, comma separated
    #[arg(long, value_delimiter = ',')]
    pub departments: Option<Vec<String>>,

    /// Master log file shared by every run
    #[arg(long, env = "CATALOG_MASTER_LOG", default_value = DEFAULT_MASTER_LOG)]
    pub master_log: PathBuf,

    /// Which dimension to iterate first
    #[arg(long, value_enum, default_value_t = IterationOrder::TypesFirst)]
    pub order: IterationOrder,
}

impl Cli {
    pub fn into_options(self) -> IngestOptions {
        let mut types: Vec<DataType> = Vec::with_capacity(self.types.len());
        for data_type in self.types {
            if !types.contains(&data_type) {
                types.push(data_type);
            }
        }

        IngestOptions {
            schools: self.schools,
            types,
            config: self.config,
            output: self.output,
            output_error: self.output_error,
            break_on_error: self.break_on_error,
            break_on_warning: self.break_on_warning,
            display_progress_bar: self.display_progress_bar,
            validate: !self.no_validate,
            verbosity: self.verbose,
            years: self.years,
            terms: self.terms,
            years_and_terms: self.years_and_terms,
            departments: self.departments,
            master_log: self.master_log,
            order: self.order,
        }
    }
}

fn parse_years_and_terms(raw: &str) -> Result<YearsAndTerms, String> {
    serde_json::from_str(raw).map_err(|e| format!("expected a JSON object of year -> [terms]: {}", e))
}
