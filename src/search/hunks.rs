//! Hunk construction: context windows around matching lines, merged per flag
use crate::error::{CodeRefsError, Result};
use crate::matcher::ElementMatcher;
use crate::processor::truncate_line;
use crate::search::HunkRep;
use std::collections::{BTreeMap, BTreeSet};

/// Random access to a file's lines by 0-based index.
///
/// Implemented for plain line slices and for the sparse line maps produced by
/// external search tools, which only know the lines they printed.
pub trait LineSource {
    fn line_count(&self) -> usize;
    fn line(&self, index: usize) -> Option<&str>;
}

impl LineSource for [String] {
    fn line_count(&self) -> usize {
        self.len()
    }

    fn line(&self, index: usize) -> Option<&str> {
        self.get(index).map(String::as_str)
    }
}

/// A contiguous, 1-based, inclusive line range for one flag.
///
/// `lines` is `None` for location-only hunks (negative context).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hunk {
    start: usize,
    end: usize,
    lines: Option<Vec<String>>,
    aliases: BTreeSet<String>,
}

impl Hunk {
    /// A hunk starting at `start` (1-based) covering `lines`.
    pub fn new(start: usize, lines: Vec<String>, aliases: BTreeSet<String>) -> Self {
        let end = start + lines.len().max(1) - 1;
        Self {
            start,
            end,
            lines: Some(lines),
            aliases,
        }
    }

    /// A single-line hunk that carries no source text.
    pub fn location(line_number: usize, aliases: BTreeSet<String>) -> Self {
        Self {
            start: line_number,
            end: line_number,
            lines: None,
            aliases,
        }
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn end(&self) -> usize {
        self.end
    }

    /// Number of lines covered, including location-only hunks.
    pub fn line_span(&self) -> usize {
        self.end - self.start + 1
    }

    pub fn lines(&self) -> Option<&[String]> {
        self.lines.as_deref()
    }

    pub fn aliases(&self) -> &BTreeSet<String> {
        &self.aliases
    }

    /// Overlapping or directly adjacent ranges.
    pub fn overlaps(&self, other: &Hunk) -> bool {
        let (first, second) = if (self.start, self.end) <= (other.start, other.end) {
            (self, other)
        } else {
            (other, self)
        };
        first.end + 1 >= second.start
    }

    pub fn into_rep(self, proj_key: &str, flag_key: &str) -> HunkRep {
        HunkRep {
            starting_line_number: self.start,
            lines: self.lines.map(|l| l.join("\n")).unwrap_or_default(),
            proj_key: proj_key.to_string(),
            flag_key: flag_key.to_string(),
            aliases: self.aliases.into_iter().collect(),
        }
    }
}

/// Combine two hunks of the same flag and file if they overlap or touch,
/// otherwise hand both back ordered by start line.
fn try_merge(a: Hunk, b: Hunk) -> std::result::Result<Hunk, (Hunk, Hunk)> {
    let (mut first, second) = if (a.start, a.end) <= (b.start, b.end) {
        (a, b)
    } else {
        (b, a)
    };
    if first.end + 1 < second.start {
        return Err((first, second));
    }

    first.aliases.extend(second.aliases);
    if second.end <= first.end {
        return Ok(first);
    }

    let overlap = first.end + 1 - second.start;
    first.lines = match (first.lines, second.lines) {
        (Some(mut head), Some(tail)) => {
            head.extend(tail.into_iter().skip(overlap));
            Some(head)
        }
        _ => None,
    };
    first.end = second.end;
    Ok(first)
}

/// Merge two hunks. Returns one hunk when they overlap or are adjacent,
/// else both in increasing start order. The result does not depend on the
/// argument order.
pub fn merge_hunks(a: Hunk, b: Hunk) -> Vec<Hunk> {
    match try_merge(a, b) {
        Ok(merged) => vec![merged],
        Err((first, second)) => vec![first, second],
    }
}

/// Group lines of `source` by the elements of `matcher` that occur in them.
///
/// `indices` are the 0-based lines to inspect, ascending; pass every line for
/// a fully read file or only the reported lines for sparse sources. The
/// result maps an element index to its matching lines.
pub fn candidate_lines<S, I>(
    source: &S,
    indices: I,
    matcher: &ElementMatcher,
) -> BTreeMap<usize, Vec<usize>>
where
    S: LineSource + ?Sized,
    I: IntoIterator<Item = usize>,
{
    let mut by_element: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for index in indices {
        let Some(line) = source.line(index) else {
            continue;
        };
        for element in matcher.matching_element_indices(line) {
            by_element.entry(element).or_default().push(index);
        }
    }
    by_element
}

/// Build the merged hunks of one flag from its matching line indices.
///
/// `matching` must be strictly increasing 0-based indices into `source`.
/// Each match is widened by `ctx_lines` on both sides, clipped to the file,
/// with every line truncated; windows that overlap or touch the previous
/// hunk are folded into it. A negative `ctx_lines` produces location-only
/// hunks.
pub fn build_hunks_for_flag<S>(
    source: &S,
    matching: &[usize],
    matcher: &ElementMatcher,
    flag_key: &str,
    ctx_lines: i32,
) -> Result<Vec<Hunk>>
where
    S: LineSource + ?Sized,
{
    let line_count = source.line_count();
    let mut hunks: Vec<Hunk> = Vec::new();
    let mut previous: Option<usize> = None;

    for &index in matching {
        if previous.is_some_and(|p| index <= p) {
            return Err(CodeRefsError::InvariantViolation(format!(
                "line {} for flag '{flag_key}' arrived after line {}",
                index + 1,
                previous.map_or(0, |p| p + 1)
            )));
        }
        previous = Some(index);
        if index >= line_count {
            return Err(CodeRefsError::InvariantViolation(format!(
                "line {} for flag '{flag_key}' is past the end of a {line_count}-line file",
                index + 1
            )));
        }

        let candidate = if ctx_lines < 0 {
            let line = require_line(source, index, flag_key)?;
            Hunk::location(index + 1, collect_aliases(matcher, flag_key, [line]))
        } else {
            let ctx = ctx_lines as usize;
            let first = index.saturating_sub(ctx);
            let last = index.saturating_add(ctx).min(line_count - 1);
            let mut window = Vec::with_capacity(last - first + 1);
            for i in first..=last {
                window.push(require_line(source, i, flag_key)?);
            }
            let aliases = collect_aliases(matcher, flag_key, window.iter().copied());
            Hunk::new(
                first + 1,
                window.into_iter().map(truncate_line).collect(),
                aliases,
            )
        };

        match hunks.pop() {
            None => hunks.push(candidate),
            Some(last) => match try_merge(last, candidate) {
                Ok(merged) => hunks.push(merged),
                Err((first, second)) => {
                    hunks.push(first);
                    hunks.push(second);
                }
            },
        }
    }

    Ok(hunks)
}

fn require_line<'a, S>(source: &'a S, index: usize, flag_key: &str) -> Result<&'a str>
where
    S: LineSource + ?Sized,
{
    source.line(index).ok_or_else(|| {
        CodeRefsError::InvariantViolation(format!(
            "line {} needed for a hunk of flag '{flag_key}' is not available",
            index + 1
        ))
    })
}

fn collect_aliases<'a>(
    matcher: &ElementMatcher,
    flag_key: &str,
    lines: impl IntoIterator<Item = &'a str>,
) -> BTreeSet<String> {
    lines
        .into_iter()
        .flat_map(|line| matcher.find_aliases(line, flag_key))
        .map(str::to_string)
        .collect()
}
