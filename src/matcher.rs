//! Multi-pattern matching over flag keys, their delimiters and their aliases
use crate::error::{CodeRefsError, Result};
use aho_corasick::AhoCorasick;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Quote characters that bound a flag key unless configured otherwise.
pub const DEFAULT_DELIMITERS: &str = "\"'`";

/// Compiled patterns for a single flag key.
#[derive(Debug)]
struct ElementPatterns {
    delimited: AhoCorasick,
    aliases: Option<AliasPatterns>,
}

#[derive(Debug)]
struct AliasPatterns {
    automaton: AhoCorasick,
    aliases: Vec<String>,
}

/// Per-project matcher for a set of flag keys.
///
/// Holds one automaton per key over its delimited forms, one per key over its
/// aliases, and one combined automaton over every pattern of every key. The
/// combined automaton is what the hunk builder runs on each line; the per-key
/// automatons answer narrower questions once a key is known to be present.
#[derive(Debug)]
pub struct ElementMatcher {
    pub proj_key: String,
    /// Optional sub-directory (relative, forward slashes) the project is scoped to.
    pub dir: Option<String>,
    pub elements: Vec<String>,
    delimiters: String,
    aliases: HashMap<String, Vec<String>>,
    index: HashMap<String, usize>,
    patterns: Vec<ElementPatterns>,
    combined: AhoCorasick,
    /// Owners of each combined pattern, by element index.
    owners: Vec<Vec<usize>>,
}

impl ElementMatcher {
    /// Build the matcher. Empty inputs produce a matcher that matches nothing.
    ///
    /// Flag keys are expected to be unique and at least three characters
    /// long; filtering short keys is the caller's job.
    pub fn new(
        proj_key: impl Into<String>,
        dir: Option<String>,
        elements: Vec<String>,
        delimiters: &str,
        aliases: &HashMap<String, Vec<String>>,
    ) -> Result<Self> {
        let mut index = HashMap::with_capacity(elements.len());
        let mut patterns = Vec::with_capacity(elements.len());
        let mut kept_aliases = HashMap::new();
        let mut owners_by_pattern: BTreeMap<String, BTreeSet<usize>> = BTreeMap::new();

        for (i, element) in elements.iter().enumerate() {
            index.insert(element.clone(), i);

            let delimited = delimited_patterns(element, delimiters);
            for pattern in &delimited {
                owners_by_pattern
                    .entry(pattern.clone())
                    .or_default()
                    .insert(i);
            }

            let element_aliases = dedupe(
                aliases
                    .get(element)
                    .into_iter()
                    .flatten()
                    .filter(|alias| !alias.is_empty())
                    .cloned(),
            );
            for alias in &element_aliases {
                owners_by_pattern.entry(alias.clone()).or_default().insert(i);
            }

            let alias_patterns = if element_aliases.is_empty() {
                None
            } else {
                Some(AliasPatterns {
                    automaton: build_automaton(&element_aliases)?,
                    aliases: element_aliases.clone(),
                })
            };
            if !element_aliases.is_empty() {
                kept_aliases.insert(element.clone(), element_aliases);
            }

            patterns.push(ElementPatterns {
                delimited: build_automaton(&delimited)?,
                aliases: alias_patterns,
            });
        }

        let (all_patterns, owners): (Vec<String>, Vec<Vec<usize>>) = owners_by_pattern
            .into_iter()
            .map(|(pattern, owners)| (pattern, owners.into_iter().collect()))
            .unzip();

        Ok(Self {
            proj_key: proj_key.into(),
            dir: dir.map(|d| normalize_dir(&d)).filter(|d| !d.is_empty()),
            elements,
            delimiters: delimiters.to_string(),
            aliases: kept_aliases,
            index,
            patterns,
            combined: build_automaton(&all_patterns)?,
            owners,
        })
    }

    pub fn delimiters(&self) -> &str {
        &self.delimiters
    }

    /// Aliases registered for `element`, after dropping empties and duplicates.
    pub fn aliases_for(&self, element: &str) -> &[String] {
        self.aliases.get(element).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether a file at `path` (relative to the scan root) belongs to this project.
    pub fn applies_to(&self, path: &str) -> bool {
        match &self.dir {
            None => true,
            Some(dir) => {
                path == dir
                    || path
                        .strip_prefix(dir.as_str())
                        .is_some_and(|rest| rest.starts_with('/'))
            }
        }
    }

    /// Indices of every element with a delimited key or alias in `line`.
    ///
    /// Uses overlapping search so that a key hidden inside another key's alias
    /// is still reported. Results are deduplicated and ascending.
    pub fn matching_element_indices(&self, line: &str) -> BTreeSet<usize> {
        let mut found = BTreeSet::new();
        for m in self.combined.find_overlapping_iter(line) {
            found.extend(self.owners[m.pattern().as_usize()].iter().copied());
        }
        found
    }

    /// Flag keys with a delimited key or alias occurrence in `line`.
    pub fn find_matching_elements(&self, line: &str) -> Vec<&str> {
        self.matching_element_indices(line)
            .into_iter()
            .map(|i| self.elements[i].as_str())
            .collect()
    }

    /// Whether the delimited form of `element` occurs in `line`.
    pub fn matches_element(&self, line: &str, element: &str) -> bool {
        self.index
            .get(element)
            .is_some_and(|&i| self.patterns[i].delimited.is_match(line))
    }

    /// The aliases of `element` occurring in `line`, deduplicated.
    pub fn find_aliases(&self, line: &str, element: &str) -> Vec<&str> {
        let Some(alias_patterns) = self
            .index
            .get(element)
            .and_then(|&i| self.patterns[i].aliases.as_ref())
        else {
            return Vec::new();
        };
        let found: BTreeSet<usize> = alias_patterns
            .automaton
            .find_overlapping_iter(line)
            .map(|m| m.pattern().as_usize())
            .collect();
        found
            .into_iter()
            .map(|i| alias_patterns.aliases[i].as_str())
            .collect()
    }
}

/// All projects' matchers plus the context window shared by the scan.
#[derive(Debug)]
pub struct Matcher {
    pub elements: Vec<ElementMatcher>,
    /// Lines of context around each reference; negative means locations only.
    pub ctx_lines: i32,
}

impl Matcher {
    pub fn new(elements: Vec<ElementMatcher>, ctx_lines: i32) -> Self {
        Self {
            elements,
            ctx_lines,
        }
    }

    pub fn flag_count(&self) -> usize {
        self.elements.iter().map(|e| e.elements.len()).sum()
    }
}

/// Every `left + key + right` bracketing for the delimiter set, or the bare
/// key when no delimiters are configured.
pub fn delimited_patterns(key: &str, delimiters: &str) -> Vec<String> {
    if delimiters.is_empty() {
        return vec![key.to_string()];
    }
    let mut patterns = Vec::new();
    for left in delimiters.chars() {
        for right in delimiters.chars() {
            patterns.push(format!("{left}{key}{right}"));
        }
    }
    patterns
}

fn build_automaton(patterns: &[String]) -> Result<AhoCorasick> {
    AhoCorasick::new(patterns)
        .map_err(|e| CodeRefsError::Other(format!("Aho-Corasick error: {e}")))
}

fn normalize_dir(dir: &str) -> String {
    dir.replace('\\', "/")
        .trim_start_matches("./")
        .trim_matches('/')
        .to_string()
}

/// Order-preserving dedupe.
pub(crate) fn dedupe(items: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}
