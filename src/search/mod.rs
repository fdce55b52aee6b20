//! Reference search: report types, limits and the pluggable search backends
pub mod coordinator;
pub mod hunks;
pub mod paginate;
pub mod ripgrep;

use crate::cancel::CancelToken;
use crate::error::Result;
use crate::matcher::Matcher;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

pub use coordinator::NativeFinder;
pub use hunks::{Hunk, LineSource, build_hunks_for_flag, candidate_lines, merge_hunks};
pub use paginate::{SearchPage, SearchTool, ToolLine, paginated_search};
pub use ripgrep::{RipgrepFinder, RipgrepTool};

/// Stop recording files once this many files with references are kept.
pub const MAX_FILE_COUNT: usize = 10_000;

/// Stop recording files once the kept hunks exceed this many.
pub const MAX_HUNK_COUNT: usize = 25_000;

/// One merged region of references to a flag in a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HunkRep {
    pub starting_line_number: usize,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub lines: String,
    pub proj_key: String,
    pub flag_key: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

/// All hunks found in one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceHunksRep {
    pub path: String,
    pub hunks: Vec<HunkRep>,
}

/// Which soft cap cut the result short.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitReached {
    FileCount(usize),
    HunkCount(usize),
}

impl fmt::Display for LimitReached {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LimitReached::FileCount(max) => {
                write!(f, "found more than {max} files with references")
            }
            LimitReached::HunkCount(max) => write!(f, "found more than {max} hunks"),
        }
    }
}

/// Soft caps applied while aggregating per-file results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchLimits {
    pub max_file_count: usize,
    pub max_hunk_count: usize,
}

impl Default for SearchLimits {
    fn default() -> Self {
        Self {
            max_file_count: MAX_FILE_COUNT,
            max_hunk_count: MAX_HUNK_COUNT,
        }
    }
}

/// Outcome of a scan: path-sorted references plus any limit that was hit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub references: Vec<ReferenceHunksRep>,
    pub limit_reached: Option<LimitReached>,
    /// Projects skipped because no search pattern for them was accepted.
    pub failed_projects: Vec<String>,
}

impl ScanReport {
    pub fn hunk_count(&self) -> usize {
        self.references.iter().map(|r| r.hunks.len()).sum()
    }
}

/// A search backend able to find every flag reference under a directory.
pub trait ReferenceFinder {
    fn find_references(
        &self,
        root: &Path,
        matcher: &Matcher,
        cancel: &CancelToken,
    ) -> Result<ScanReport>;
}

/// Which search engine scans the tree.
#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// In-process walker and matcher.
    #[default]
    Native,
    /// Paginated `rg --json` invocations.
    Ripgrep,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Native => write!(f, "native"),
            Backend::Ripgrep => write!(f, "ripgrep"),
        }
    }
}

/// Settings shared by both backends.
#[derive(Debug, Clone)]
pub struct FinderOptions {
    pub subdir: Option<PathBuf>,
    pub limits: SearchLimits,
    /// Only used by [`Backend::Ripgrep`].
    pub max_pattern_length: usize,
}

impl Default for FinderOptions {
    fn default() -> Self {
        Self {
            subdir: None,
            limits: SearchLimits::default(),
            max_pattern_length: paginate::DEFAULT_MAX_PATTERN_LENGTH,
        }
    }
}

impl Backend {
    pub fn finder(self, options: FinderOptions) -> Box<dyn ReferenceFinder> {
        match self {
            Backend::Native => Box::new(
                NativeFinder::new()
                    .subdir(options.subdir)
                    .limits(options.limits),
            ),
            Backend::Ripgrep => Box::new(
                RipgrepFinder::new()
                    .subdir(options.subdir)
                    .limits(options.limits)
                    .max_pattern_length(options.max_pattern_length),
            ),
        }
    }
}

/// Sort per-file results by path and apply the soft caps in that order.
///
/// Entries for the same path (one per project, for instance) are combined
/// first. The file that pushes the hunk total past the cap is still kept;
/// everything after it is dropped.
pub fn aggregate_references(
    mut references: Vec<ReferenceHunksRep>,
    limits: SearchLimits,
) -> ScanReport {
    references.sort_by(|a, b| a.path.cmp(&b.path));
    references.dedup_by(|later, earlier| {
        if later.path == earlier.path {
            earlier.hunks.append(&mut later.hunks);
            true
        } else {
            false
        }
    });

    let mut kept = Vec::with_capacity(references.len().min(limits.max_file_count));
    let mut limit_reached = None;
    let mut total_hunks = 0;
    let total_files = references.len();

    for reference in references {
        if kept.len() >= limits.max_file_count {
            limit_reached = Some(LimitReached::FileCount(limits.max_file_count));
            break;
        }
        total_hunks += reference.hunks.len();
        kept.push(reference);
        if total_hunks > limits.max_hunk_count {
            if kept.len() < total_files {
                limit_reached = Some(LimitReached::HunkCount(limits.max_hunk_count));
            }
            break;
        }
    }

    ScanReport {
        references: kept,
        limit_reached,
        failed_projects: Vec::new(),
    }
}
