use crate::search::Backend;
use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use std::fmt;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Find feature flag references in source trees", long_about = None)]
pub struct Cli {
    #[clap(long, global = true, value_parser, default_value_t = false)]
    pub verbose: bool,

    /// Write logs to this file instead of stderr.
    #[clap(long, global = true, value_parser)]
    pub log: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scan a directory for flag references.
    Scan(ScanArgs),
    /// Print shell completions.
    Completions {
        #[clap(value_enum)]
        shell: Shell,
    },
}

#[derive(clap::Args, Debug)]
pub struct ScanArgs {
    /// Root of the tree to scan.
    #[clap(short, long, value_parser, default_value = ".")]
    pub dir: PathBuf,

    /// Only scan this path, relative to --dir.
    #[clap(long, value_parser)]
    pub subdir: Option<PathBuf>,

    /// Config file; defaults to <dir>/.coderefs.toml then the user config.
    #[clap(short, long, value_parser)]
    pub config: Option<PathBuf>,

    /// Project key for flags given with --flag.
    #[clap(short, long, value_parser, default_value = "default")]
    pub project_key: String,

    /// Flag key to search for; repeatable.
    #[clap(short, long = "flag", value_parser)]
    pub flags: Vec<String>,

    /// JSON object mapping project keys to flag key arrays.
    #[clap(long, value_parser)]
    pub flags_file: Option<PathBuf>,

    /// Lines of context around each reference, -1 for none at all.
    #[clap(short = 'C', long, value_parser, allow_negative_numbers = true)]
    pub context_lines: Option<i32>,

    /// Extra single-character delimiters around flag keys.
    #[clap(long, value_parser)]
    pub delimiters: Option<String>,

    #[clap(long, value_parser, default_value_t = false)]
    pub no_default_delimiters: bool,

    #[clap(long, value_enum)]
    pub backend: Option<Backend>,

    #[clap(long, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,

    /// Write the report here instead of stdout.
    #[clap(short, long, value_parser)]
    pub output: Option<PathBuf>,
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Json,
    Csv,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Csv => write!(f, "csv"),
        }
    }
}
