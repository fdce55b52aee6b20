use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodeRefsError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Walk error: {0}")]
    Walk(#[from] ignore::Error),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to parse config file: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    /// Pagination ran out of budget before the search tool accepted a pattern.
    #[error("no valid search pattern for project '{project}': the configured flag keys exceed the search tool's pattern limits")]
    NoValidSearchPattern { project: String },

    #[error("Search tool error: {0}")]
    SearchTool(#[from] SearchToolError),

    /// A structural assumption of the hunk builder did not hold.
    #[error("internal invariant violated: {0}")]
    InvariantViolation(String),

    #[error("Alias command '{command}' failed: {reason}")]
    AliasCommand { command: String, reason: String },

    #[error("An unexpected error occurred: {0}")]
    Other(String),
}

impl CodeRefsError {
    /// Errors that invalidate a single project's scan without poisoning the others.
    pub fn is_project_fatal(&self) -> bool {
        matches!(self, CodeRefsError::NoValidSearchPattern { .. })
    }
}

/// Failures reported by an external line-oriented search tool.
#[derive(Error, Debug)]
pub enum SearchToolError {
    #[error("generated search pattern is too large")]
    PatternTooLarge,

    #[error("search tool exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("failed to run search tool '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("unreadable search tool output: {0}")]
    Output(String),
}

pub type Result<T> = std::result::Result<T, CodeRefsError>;
