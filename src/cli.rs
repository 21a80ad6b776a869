use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::registry::KeyConflictPolicy;

#[derive(Debug, Clone, Parser)]
#[command(name = "class-registrar")]
#[command(about = "Discover annotated component classes on a JVM class path and register them by type key")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Class path entries, separated like the platform's CLASSPATH.
    #[arg(long, short = 'c', value_name = "PATHS")]
    pub classpath: Option<String>,

    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    Scan {
        /// Base packages; defaults come from the config or the entry point.
        #[arg(value_name = "PACKAGE")]
        packages: Vec<String>,

        #[arg(long, value_name = "ANNOTATION")]
        marker: Option<String>,

        #[arg(long, value_name = "CLASS")]
        entry_point: Option<String>,

        #[arg(long, value_enum)]
        on_key_conflict: Option<ConflictArg>,

        #[arg(short = 'f', long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
    },
    Inspect {
        class_name: String,

        #[arg(short = 'f', long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
    },
}

#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Text,
}

#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum ConflictArg {
    Reject,
    Overwrite,
}

impl From<ConflictArg> for KeyConflictPolicy {
    fn from(value: ConflictArg) -> Self {
        match value {
            ConflictArg::Reject => KeyConflictPolicy::Reject,
            ConflictArg::Overwrite => KeyConflictPolicy::Overwrite,
        }
    }
}
