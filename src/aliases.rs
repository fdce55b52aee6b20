//! Alias generation: alternative spellings under which a flag key may appear
use crate::error::{CodeRefsError, Result};
use crate::matcher::dedupe;
use ignore::WalkBuilder;
use ignore::overrides::OverrideBuilder;
use log::debug;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Placeholder in file-pattern regexes replaced by the escaped flag key.
pub const FLAG_KEY_PLACEHOLDER: &str = "FLAG_KEY";

/// One configured alias strategy, tagged by `type` in the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum AliasConfig {
    CamelCase,
    PascalCase,
    SnakeCase,
    UpperSnakeCase,
    KebabCase,
    DotCase,
    /// Fixed aliases per flag key.
    Literal {
        flags: HashMap<String, Vec<String>>,
    },
    /// Aliases captured from files: every match of a pattern contributes its
    /// first capture group.
    FilePattern {
        paths: Vec<String>,
        patterns: Vec<String>,
    },
    /// A shell command receiving the key on stdin and printing a JSON array.
    Command { command: String },
}

/// Per-scan memo of glob expansions and file contents used by
/// [`AliasConfig::FilePattern`].
#[derive(Debug)]
pub struct AliasCache {
    root: PathBuf,
    globs: HashMap<String, Vec<PathBuf>>,
    contents: HashMap<PathBuf, String>,
}

impl AliasCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            globs: HashMap::new(),
            contents: HashMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn glob(&mut self, glob: &str) -> Result<Vec<PathBuf>> {
        if let Some(paths) = self.globs.get(glob) {
            return Ok(paths.clone());
        }

        let mut overrides = OverrideBuilder::new(&self.root);
        overrides.add(glob)?;
        let walker = WalkBuilder::new(&self.root)
            .standard_filters(false)
            .overrides(overrides.build()?)
            .build();

        let mut paths = Vec::new();
        for entry in walker {
            let entry = entry?;
            if entry.file_type().is_some_and(|ft| ft.is_file()) {
                paths.push(entry.into_path());
            }
        }
        paths.sort();
        debug!("Alias glob {glob} matched {} files", paths.len());
        self.globs.insert(glob.to_string(), paths.clone());
        Ok(paths)
    }

    fn contents(&mut self, path: &Path) -> Result<&str> {
        if !self.contents.contains_key(path) {
            let text = fs::read_to_string(path).map_err(|source| CodeRefsError::FileRead {
                path: path.to_path_buf(),
                source,
            })?;
            self.contents.insert(path.to_path_buf(), text);
        }
        Ok(self.contents.get(path).map(String::as_str).unwrap_or_default())
    }
}

impl AliasConfig {
    /// Aliases for each of `keys`. Keys without aliases may be absent.
    pub fn generate(
        &self,
        keys: &[String],
        cache: &mut AliasCache,
    ) -> Result<HashMap<String, Vec<String>>> {
        match self {
            AliasConfig::CamelCase => Ok(convert_each(keys, to_camel_case)),
            AliasConfig::PascalCase => Ok(convert_each(keys, to_pascal_case)),
            AliasConfig::SnakeCase => Ok(convert_each(keys, to_snake_case)),
            AliasConfig::UpperSnakeCase => Ok(convert_each(keys, to_upper_snake_case)),
            AliasConfig::KebabCase => Ok(convert_each(keys, to_kebab_case)),
            AliasConfig::DotCase => Ok(convert_each(keys, to_dot_case)),
            AliasConfig::Literal { flags } => Ok(literal_aliases(keys, flags)),
            AliasConfig::FilePattern { paths, patterns } => {
                file_pattern_aliases(keys, paths, patterns, cache)
            }
            AliasConfig::Command { command } => command_aliases(keys, command, cache.root()),
        }
    }
}

/// Run every strategy and concatenate their results per key, dropping
/// duplicates while keeping first occurrences.
pub fn generate_aliases(
    configs: &[AliasConfig],
    keys: &[String],
    cache: &mut AliasCache,
) -> Result<HashMap<String, Vec<String>>> {
    let mut combined: HashMap<String, Vec<String>> = HashMap::new();
    for config in configs {
        let generated = config.generate(keys, cache)?;
        for key in keys {
            if let Some(aliases) = generated.get(key) {
                combined
                    .entry(key.clone())
                    .or_default()
                    .extend(aliases.iter().cloned());
            }
        }
    }
    for aliases in combined.values_mut() {
        *aliases = dedupe(std::mem::take(aliases));
    }
    combined.retain(|_, aliases| !aliases.is_empty());
    Ok(combined)
}

fn convert_each(keys: &[String], convert: fn(&str) -> String) -> HashMap<String, Vec<String>> {
    keys.iter()
        .filter_map(|key| {
            let alias = convert(key);
            // A conversion that reproduces the key adds nothing.
            (!alias.is_empty() && alias != *key).then(|| (key.clone(), vec![alias]))
        })
        .collect()
}

/// Split an identifier into lowercase words on separators and case changes.
///
/// `HTTPServer_url-v2` becomes `["http", "server", "url", "v2"]`.
pub fn split_words(key: &str) -> Vec<String> {
    let chars: Vec<char> = key.chars().collect();
    let mut words = Vec::new();
    let mut current = String::new();

    for (i, &c) in chars.iter().enumerate() {
        if c == '_' || c == '-' || c == '.' || c.is_whitespace() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            continue;
        }
        if c.is_uppercase() && !current.is_empty() {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            if prev.is_lowercase() || prev.is_numeric() || (prev.is_uppercase() && next_is_lower) {
                words.push(std::mem::take(&mut current));
            }
        }
        current.push(c);
    }
    if !current.is_empty() {
        words.push(current);
    }
    words.into_iter().map(|w| w.to_lowercase()).collect()
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub fn to_camel_case(key: &str) -> String {
    let words = split_words(key);
    let mut out = String::with_capacity(key.len());
    for (i, word) in words.iter().enumerate() {
        if i == 0 {
            out.push_str(word);
        } else {
            out.push_str(&capitalize(word));
        }
    }
    out
}

pub fn to_pascal_case(key: &str) -> String {
    split_words(key).iter().map(|w| capitalize(w)).collect()
}

pub fn to_snake_case(key: &str) -> String {
    split_words(key).join("_")
}

pub fn to_upper_snake_case(key: &str) -> String {
    to_snake_case(key).to_uppercase()
}

pub fn to_kebab_case(key: &str) -> String {
    split_words(key).join("-")
}

pub fn to_dot_case(key: &str) -> String {
    split_words(key).join(".")
}

fn literal_aliases(
    keys: &[String],
    flags: &HashMap<String, Vec<String>>,
) -> HashMap<String, Vec<String>> {
    keys.iter()
        .filter_map(|key| flags.get(key).map(|aliases| (key.clone(), aliases.clone())))
        .collect()
}

fn file_pattern_aliases(
    keys: &[String],
    paths: &[String],
    patterns: &[String],
    cache: &mut AliasCache,
) -> Result<HashMap<String, Vec<String>>> {
    if let Some(pattern) = patterns.iter().find(|p| !p.contains(FLAG_KEY_PLACEHOLDER)) {
        return Err(CodeRefsError::Config(format!(
            "file pattern alias '{pattern}' does not contain {FLAG_KEY_PLACEHOLDER}"
        )));
    }

    let mut files = Vec::new();
    for glob in paths {
        files.extend(cache.glob(glob)?);
    }
    files.sort();
    files.dedup();

    let mut result = HashMap::new();
    for key in keys {
        let regexes = patterns
            .iter()
            .map(|p| Regex::new(&p.replace(FLAG_KEY_PLACEHOLDER, &regex::escape(key))))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut aliases = Vec::new();
        for file in &files {
            let text = cache.contents(file)?;
            for re in &regexes {
                aliases.extend(
                    re.captures_iter(text)
                        .filter_map(|caps| caps.get(1))
                        .map(|m| m.as_str().to_string()),
                );
            }
        }
        if !aliases.is_empty() {
            result.insert(key.clone(), dedupe(aliases));
        }
    }
    Ok(result)
}

fn shell_command(command: &str) -> Command {
    if cfg!(windows) {
        let mut cmd = Command::new("cmd");
        cmd.args(["/C", command]);
        cmd
    } else {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", command]);
        cmd
    }
}

fn command_aliases(
    keys: &[String],
    command: &str,
    root: &Path,
) -> Result<HashMap<String, Vec<String>>> {
    let failure = |reason: String| CodeRefsError::AliasCommand {
        command: command.to_string(),
        reason,
    };

    let mut result = HashMap::new();
    for key in keys {
        let mut child = shell_command(command)
            .current_dir(root)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| failure(e.to_string()))?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(key.as_bytes())
                .map_err(|e| failure(e.to_string()))?;
        }
        let output = child.wait_with_output().map_err(|e| failure(e.to_string()))?;
        if !output.status.success() {
            return Err(failure(format!(
                "{}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        let aliases: Vec<String> = serde_json::from_slice(&output.stdout)
            .map_err(|e| failure(format!("expected a JSON array of strings: {e}")))?;
        debug!("Alias command produced {} aliases for {key}", aliases.len());
        result.insert(key.clone(), aliases);
    }
    Ok(result)
}
