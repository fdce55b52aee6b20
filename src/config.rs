use crate::aliases::AliasConfig;
use crate::error::{CodeRefsError, Result};
use crate::matcher::DEFAULT_DELIMITERS;
use crate::search::Backend;
use crate::search::paginate::DEFAULT_MAX_PATTERN_LENGTH;
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

/// Config file looked up in the scanned directory.
pub const PROJECT_CONFIG_FILE: &str = ".coderefs.toml";

/// Allowed values for `context_lines`; `-1` disables line contents.
pub const CONTEXT_LINES_RANGE: RangeInclusive<i32> = -1..=5;

/// Flag keys shorter than this are too noisy to search for.
pub const MIN_FLAG_KEY_LENGTH: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub context_lines: i32,
    pub delimiters: DelimiterConfig,
    pub backend: Backend,
    pub max_pattern_length: usize,
    pub projects: Vec<ProjectConfig>,
    pub aliases: Vec<AliasConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DelimiterConfig {
    pub disable_defaults: bool,
    pub additional: Vec<String>,
}

/// A project: a set of flags scoped to an optional directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub key: String,
    #[serde(default)]
    pub dir: Option<String>,
    #[serde(default)]
    pub flags: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            context_lines: 2,
            delimiters: DelimiterConfig::default(),
            backend: Backend::default(),
            max_pattern_length: DEFAULT_MAX_PATTERN_LENGTH,
            projects: Vec::new(),
            aliases: Vec::new(),
        }
    }
}

impl Config {
    /// Load from `explicit` if given, else the first config file found for
    /// `dir`, else defaults.
    pub fn load(explicit: Option<&Path>, dir: &Path) -> Result<Self> {
        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => Self::find_config_path(dir),
        };
        match path {
            Some(path) => {
                debug!("Loading config from {}", path.display());
                let content = fs::read_to_string(&path).map_err(|source| {
                    CodeRefsError::FileRead {
                        path: path.clone(),
                        source,
                    }
                })?;
                Self::from_toml_str(&content)
            }
            None => Ok(Self::default()),
        }
    }

    fn find_config_path(dir: &Path) -> Option<PathBuf> {
        let project_path = dir.join(PROJECT_CONFIG_FILE);
        if project_path.is_file() {
            return Some(project_path);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_path = config_dir.join("coderefs/config.toml");
            if user_path.is_file() {
                return Some(user_path);
            }
        }

        None
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        validate_context_lines(self.context_lines)?;
        for delimiter in &self.delimiters.additional {
            if delimiter.chars().count() != 1 {
                return Err(CodeRefsError::Config(format!(
                    "delimiter '{delimiter}' must be exactly one character"
                )));
            }
        }
        if self.max_pattern_length == 0 {
            return Err(CodeRefsError::Config(
                "max_pattern_length must be positive".to_string(),
            ));
        }
        for project in &self.projects {
            if project.key.is_empty() {
                return Err(CodeRefsError::Config(
                    "every project needs a non-empty key".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// The delimiter set to match flag keys with.
    pub fn resolved_delimiters(&self) -> String {
        resolve_delimiters(&self.delimiters)
    }
}

pub fn validate_context_lines(context_lines: i32) -> Result<()> {
    if CONTEXT_LINES_RANGE.contains(&context_lines) {
        Ok(())
    } else {
        Err(CodeRefsError::Config(format!(
            "context_lines must be between {} and {}, got {context_lines}",
            CONTEXT_LINES_RANGE.start(),
            CONTEXT_LINES_RANGE.end()
        )))
    }
}

/// Defaults first (unless disabled), then the additional delimiters, each
/// character once.
pub fn resolve_delimiters(config: &DelimiterConfig) -> String {
    let defaults = if config.disable_defaults {
        ""
    } else {
        DEFAULT_DELIMITERS
    };
    let mut resolved = String::new();
    for c in defaults
        .chars()
        .chain(config.additional.iter().flat_map(|d| d.chars()))
    {
        if !resolved.contains(c) {
            resolved.push(c);
        }
    }
    resolved
}

/// Split flag keys into those long enough to search and those dropped.
pub fn filter_short_flag_keys(keys: Vec<String>) -> (Vec<String>, Vec<String>) {
    keys.into_iter()
        .partition(|key| key.chars().count() >= MIN_FLAG_KEY_LENGTH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.context_lines, 2);
        assert_eq!(config.backend, Backend::Native);
        assert_eq!(config.max_pattern_length, DEFAULT_MAX_PATTERN_LENGTH);
        assert_eq!(config.resolved_delimiters(), "\"'`");
    }

    #[test]
    fn parses_full_file() {
        let config = Config::from_toml_str(
            r#"
            context_lines = -1
            backend = "ripgrep"
            max_pattern_length = 1000

            [delimiters]
            disable_defaults = true
            additional = ["<", ">", "<"]

            [[projects]]
            key = "web"
            dir = "frontend"
            flags = ["new-checkout", "dark-mode"]

            [[aliases]]
            type = "camelCase"
            "#,
        )
        .unwrap();
        assert_eq!(config.context_lines, -1);
        assert_eq!(config.backend, Backend::Ripgrep);
        assert_eq!(config.resolved_delimiters(), "<>");
        assert_eq!(config.projects[0].dir.as_deref(), Some("frontend"));
        assert_eq!(config.projects[0].flags.len(), 2);
        assert_eq!(config.aliases, vec![AliasConfig::CamelCase]);
    }

    #[test]
    fn rejects_out_of_range_context_lines() {
        for bad in ["context_lines = 6", "context_lines = -2"] {
            assert!(matches!(
                Config::from_toml_str(bad),
                Err(CodeRefsError::Config(_))
            ));
        }
        assert!(Config::from_toml_str("context_lines = 5").is_ok());
    }

    #[test]
    fn rejects_multi_char_delimiters() {
        let err = Config::from_toml_str("[delimiters]\nadditional = [\"ab\"]").unwrap_err();
        assert!(matches!(err, CodeRefsError::Config(_)));
    }

    #[test]
    fn malformed_toml_is_an_error() {
        assert!(matches!(
            Config::from_toml_str("context_lines = "),
            Err(CodeRefsError::Toml(_))
        ));
    }

    #[test]
    fn additional_delimiters_follow_defaults() {
        let resolved = resolve_delimiters(&DelimiterConfig {
            disable_defaults: false,
            additional: vec!["'".to_string(), "|".to_string()],
        });
        assert_eq!(resolved, "\"'`|");
    }

    #[test]
    fn project_file_is_found_in_scan_dir() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(PROJECT_CONFIG_FILE), "context_lines = 0\n").unwrap();
        let config = Config::load(None, dir.path()).unwrap();
        assert_eq!(config.context_lines, 0);
    }

    #[test]
    fn explicit_path_wins_and_must_exist() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(PROJECT_CONFIG_FILE), "context_lines = 0\n").unwrap();
        let explicit = dir.path().join("other.toml");
        fs::write(&explicit, "context_lines = 4\n").unwrap();
        assert_eq!(
            Config::load(Some(&explicit), dir.path()).unwrap().context_lines,
            4
        );

        let missing = dir.path().join("missing.toml");
        assert!(matches!(
            Config::load(Some(&missing), dir.path()),
            Err(CodeRefsError::FileRead { .. })
        ));
    }

    #[test]
    fn short_keys_are_dropped() {
        let keys = vec!["ab".to_string(), "abc".to_string(), "x".to_string()];
        let (kept, dropped) = filter_short_flag_keys(keys);
        assert_eq!(kept, vec!["abc"]);
        assert_eq!(dropped, vec!["ab", "x"]);
    }
}
