//! Build automation tasks for the catalog workspace
//!
//! - Generating the CLI reference from the `catalog-ingest` argument definitions

use clap::Parser;
use std::fs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Build automation tasks for the catalog workspace", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Parser)]
enum Command {
    /// Generate the catalog-ingest CLI reference in Markdown
    GenerateCliDocs {
        /// Output directory for generated documentation
        #[arg(short, long, default_value = "docs")]
        output_dir: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::GenerateCliDocs { output_dir } => generate_cli_docs(&output_dir)?,
    }

    Ok(())
}

fn generate_cli_docs(output_dir: &str) -> anyhow::Result<()> {
    println!("Generating CLI documentation...");

    let markdown = clap_markdown::help_markdown::<catalog_ingest::Cli>();

    let content = format!(
        r#"# catalog-ingest CLI Reference

Generated from the argument definitions on {}.

## Quick Start

```bash
# Ingest courses for every registered school
catalog-ingest

# Evaluations and textbooks for two schools, fall 2020 only
catalog-ingest -s jhu -s umd -t evals -t textbooks --years 2020 --terms fall

# Feed inline records instead of a per-school config file
catalog-ingest -s uoft --config '{{"records": []}}'
```

Each (data type, school) pair reads its parser config from the `--config`
template (`{{school}}` and `{{type}}` are expanded per pair), writes accepted
records to `--output` and rejected records to `--output-error`. Every error
recorded during the batch is appended to `--master-log`.

A failing school never stops the batch; the process exits non-zero only
when the request itself is invalid (unknown school, unsupported type).

## Commands

{}

## Environment Variables

- `CATALOG_CONFIG`, `CATALOG_OUTPUT`, `CATALOG_OUTPUT_ERROR`, `CATALOG_MASTER_LOG` - defaults for the matching flags
- `CATALOG_LOG_LEVEL` - `trace`, `debug`, `info`, `warn`, `error` (overrides `-v`)
- `CATALOG_LOG_OUTPUT` - `console`, `file`, `both`
- `CATALOG_LOG_FORMAT` - `text`, `json`
- `CATALOG_LOG_DIR`, `CATALOG_LOG_FILE_PREFIX` - rolling log file location
- `CATALOG_LOG_FILTER` - extra filter directives, e.g. `reqwest=warn`
- `RUST_LOG` - standard tracing filter

A `.env` file in the working directory is loaded before arguments are parsed.

---

*To update, run `cargo run -p xtask -- generate-cli-docs`.*
"#,
        chrono::Utc::now().format("%Y-%m-%d"),
        markdown
    );

    let output_path = PathBuf::from(output_dir);
    fs::create_dir_all(&output_path)?;

    let file_path = output_path.join("cli-reference.md");
    fs::write(&file_path, content)?;

    println!("Generated CLI documentation at: {}", file_path.display());
    Ok(())
}
