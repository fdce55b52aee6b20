//! External backend: paginated `rg --json` searches turned into hunks
use crate::cancel::CancelToken;
use crate::error::{Result, SearchToolError};
use crate::matcher::{ElementMatcher, Matcher};
use crate::search::hunks::{LineSource, build_hunks_for_flag, candidate_lines};
use crate::search::paginate::{
    DEFAULT_MAX_PATTERN_LENGTH, SearchPage, SearchTool, ToolLine, paginated_search,
};
use crate::search::{
    ReferenceFinder, ReferenceHunksRep, ScanReport, SearchLimits, aggregate_references,
};
use crate::walker::CUSTOM_IGNORE_FILENAME;
use log::{debug, warn};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Fragments of ripgrep's stderr that mean the pattern was rejected for size.
const PATTERN_TOO_LARGE_MESSAGES: &[&str] = &["exceeds size limit", "too big"];

/// Invokes ripgrep with JSON output in one directory.
#[derive(Debug, Clone)]
pub struct RipgrepTool {
    program: String,
    search_dir: PathBuf,
}

impl RipgrepTool {
    pub fn new(program: impl Into<String>, search_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            search_dir: search_dir.into(),
        }
    }

    fn command(&self, page: &SearchPage) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.current_dir(&self.search_dir)
            .args(["--json", "--no-config", "--no-require-git"]);
        if page.ctx_lines > 0 {
            cmd.arg("--context").arg(page.ctx_lines.to_string());
        }
        if self.search_dir.join(CUSTOM_IGNORE_FILENAME).is_file() {
            cmd.arg("--ignore-file").arg(CUSTOM_IGNORE_FILENAME);
        }
        cmd.arg("--regexp").arg(page.pattern()).arg(".");
        cmd
    }
}

impl SearchTool for RipgrepTool {
    fn search(&self, page: &SearchPage) -> std::result::Result<Vec<ToolLine>, SearchToolError> {
        let output = match self.command(page).output() {
            Ok(output) => output,
            Err(e) if is_argument_list_too_long(&e) => {
                return Err(SearchToolError::PatternTooLarge);
            }
            Err(source) => {
                return Err(SearchToolError::Spawn {
                    program: self.program.clone(),
                    source,
                });
            }
        };

        // 0: matches, 1: no matches, anything else is a failure.
        match output.status.code() {
            Some(0) | Some(1) => {}
            _ => {
                let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
                if PATTERN_TOO_LARGE_MESSAGES.iter().any(|m| stderr.contains(m)) {
                    return Err(SearchToolError::PatternTooLarge);
                }
                return Err(SearchToolError::Failed {
                    status: output.status.to_string(),
                    stderr,
                });
            }
        }

        parse_json_output(&String::from_utf8_lossy(&output.stdout))
    }
}

#[cfg(unix)]
fn is_argument_list_too_long(e: &std::io::Error) -> bool {
    e.raw_os_error() == Some(libc::E2BIG)
}

#[cfg(not(unix))]
fn is_argument_list_too_long(_e: &std::io::Error) -> bool {
    false
}

#[derive(Debug, Deserialize)]
struct RgMessage {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct RgLine {
    path: RgText,
    lines: RgText,
    line_number: Option<usize>,
}

/// ripgrep emits `text` for UTF-8 data and `bytes` otherwise.
#[derive(Debug, Deserialize)]
struct RgText {
    text: Option<String>,
}

/// Parse `rg --json` output into match and context lines. Entries with
/// non-UTF-8 paths or content are dropped.
pub fn parse_json_output(stdout: &str) -> std::result::Result<Vec<ToolLine>, SearchToolError> {
    let mut lines = Vec::new();
    for raw in stdout.lines().filter(|l| !l.trim().is_empty()) {
        let message: RgMessage = serde_json::from_str(raw)
            .map_err(|e| SearchToolError::Output(format!("{e}: {raw}")))?;
        let is_match = match message.kind.as_str() {
            "match" => true,
            "context" => false,
            _ => continue,
        };
        let line: RgLine = serde_json::from_value(message.data)
            .map_err(|e| SearchToolError::Output(e.to_string()))?;
        let (Some(path), Some(text), Some(line_number)) =
            (line.path.text, line.lines.text, line.line_number)
        else {
            continue;
        };
        lines.push(ToolLine {
            path: normalize_tool_path(&path),
            line_number,
            text: text.trim_end_matches(['\n', '\r']).to_string(),
            is_match,
        });
    }
    Ok(lines)
}

fn normalize_tool_path(path: &str) -> String {
    let path = path.replace('\\', "/");
    path.strip_prefix("./").unwrap_or(&path).to_string()
}

/// The lines of a file that a search tool printed, keyed by 0-based index.
#[derive(Debug, Default)]
pub struct SparseLines {
    lines: BTreeMap<usize, String>,
}

impl SparseLines {
    pub fn insert(&mut self, index: usize, text: String) {
        self.lines.insert(index, text);
    }
}

impl LineSource for SparseLines {
    /// One past the last printed line: the tool prints context up to the
    /// end of the file, so windows never need anything further.
    fn line_count(&self) -> usize {
        self.lines.keys().next_back().map_or(0, |last| last + 1)
    }

    fn line(&self, index: usize) -> Option<&str> {
        self.lines.get(&index).map(String::as_str)
    }
}

/// Turn one project's tool output into per-file hunks.
pub fn references_from_tool_lines(
    matcher: &ElementMatcher,
    tool_lines: Vec<ToolLine>,
    ctx_lines: i32,
) -> Result<Vec<ReferenceHunksRep>> {
    let mut files: BTreeMap<String, (SparseLines, BTreeSet<usize>)> = BTreeMap::new();
    for line in tool_lines {
        if line.line_number == 0 || !matcher.applies_to(&line.path) {
            continue;
        }
        let (source, matched) = files.entry(line.path).or_default();
        let index = line.line_number - 1;
        if line.is_match {
            matched.insert(index);
        }
        source.insert(index, line.text);
    }

    let mut references = Vec::new();
    for (path, (source, matched)) in files {
        let mut hunks = Vec::new();
        for (element, matching) in candidate_lines(&source, matched, matcher) {
            let flag_key = &matcher.elements[element];
            let flag_hunks = build_hunks_for_flag(&source, &matching, matcher, flag_key, ctx_lines)?;
            hunks.extend(
                flag_hunks
                    .into_iter()
                    .map(|h| h.into_rep(&matcher.proj_key, flag_key)),
            );
        }
        if !hunks.is_empty() {
            references.push(ReferenceHunksRep { path, hunks });
        }
    }
    Ok(references)
}

/// Delegates the search to ripgrep, one paginated run per project.
#[derive(Debug, Clone)]
pub struct RipgrepFinder {
    program: String,
    subdir: Option<PathBuf>,
    limits: SearchLimits,
    max_pattern_length: usize,
}

impl Default for RipgrepFinder {
    fn default() -> Self {
        Self {
            program: "rg".to_string(),
            subdir: None,
            limits: SearchLimits::default(),
            max_pattern_length: DEFAULT_MAX_PATTERN_LENGTH,
        }
    }
}

impl RipgrepFinder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn subdir(mut self, subdir: Option<PathBuf>) -> Self {
        self.subdir = subdir;
        self
    }

    pub fn limits(mut self, limits: SearchLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn max_pattern_length(mut self, max_pattern_length: usize) -> Self {
        self.max_pattern_length = max_pattern_length;
        self
    }

    /// Search each project with `tool`, skipping projects whose keys cannot
    /// form a valid pattern.
    pub fn find_with_tool(
        &self,
        tool: &dyn SearchTool,
        matcher: &Matcher,
        cancel: &CancelToken,
    ) -> Result<ScanReport> {
        let mut references = Vec::new();
        let mut failed_projects = Vec::new();
        for element_matcher in &matcher.elements {
            if cancel.is_cancelled() {
                debug!("Search cancelled before project {}", element_matcher.proj_key);
                break;
            }
            let tool_lines = match paginated_search(
                tool,
                element_matcher,
                matcher.ctx_lines,
                self.max_pattern_length,
            ) {
                Ok(lines) => lines,
                Err(e) if e.is_project_fatal() => {
                    warn!("Skipping project {}: {e}", element_matcher.proj_key);
                    failed_projects.push(element_matcher.proj_key.clone());
                    continue;
                }
                Err(e) => return Err(e),
            };
            references.extend(references_from_tool_lines(
                element_matcher,
                tool_lines,
                matcher.ctx_lines,
            )?);
        }

        let mut report = aggregate_references(references, self.limits);
        report.failed_projects = failed_projects;
        Ok(report)
    }
}

impl ReferenceFinder for RipgrepFinder {
    fn find_references(
        &self,
        root: &Path,
        matcher: &Matcher,
        cancel: &CancelToken,
    ) -> Result<ScanReport> {
        let search_dir = match &self.subdir {
            Some(subdir) => root.join(subdir),
            None => root.to_path_buf(),
        };
        let tool = RipgrepTool::new(self.program.clone(), search_dir);
        self.find_with_tool(&tool, matcher, cancel)
    }
}
