use crate::cancel::CancelToken;
use crate::error::Result;
use crate::processor::read_text_lines;
use ignore::WalkBuilder;
use log::debug;
use std::path::{Component, Path, PathBuf};

/// Per-directory ignore file honoured in addition to `.gitignore` and `.ignore`.
pub const CUSTOM_IGNORE_FILENAME: &str = ".ldignore";

/// A text file read by the walker: root-relative path and its lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: String,
    pub lines: Vec<String>,
}

/// Walks a directory tree once, emitting every text file that survives the
/// ignore rules.
#[derive(Debug, Clone)]
pub struct FileWalker {
    root: PathBuf,
    subdir: Option<PathBuf>,
}

impl FileWalker {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            subdir: None,
        }
    }

    /// Restrict the walk to `subdir` (relative to the root). Emitted paths are
    /// then relative to the sub-directory.
    pub fn subdir(mut self, subdir: Option<PathBuf>) -> Self {
        self.subdir = subdir.filter(|s| !s.as_os_str().is_empty());
        self
    }

    pub fn search_root(&self) -> PathBuf {
        match &self.subdir {
            Some(subdir) => self.root.join(subdir),
            None => self.root.clone(),
        }
    }

    fn builder(&self) -> WalkBuilder {
        let mut builder = WalkBuilder::new(self.search_root());
        builder
            .hidden(true)
            .parents(true)
            .ignore(true)
            .git_ignore(true)
            .git_global(false)
            .git_exclude(false)
            .require_git(false)
            .follow_links(false)
            .add_custom_ignore_filename(CUSTOM_IGNORE_FILENAME);
        builder
    }

    /// Walk the tree, handing each text file to `sink` as soon as it is read.
    ///
    /// The walk stops early when `cancel` fires or `sink` returns `false`.
    /// Walk errors and unreadable files abort the walk.
    pub fn walk<F>(&self, cancel: &CancelToken, mut sink: F) -> Result<()>
    where
        F: FnMut(SourceFile) -> bool,
    {
        let search_root = self.search_root();
        for entry in self.builder().build() {
            if cancel.is_cancelled() {
                debug!("Walk cancelled under {}", search_root.display());
                break;
            }
            let entry = entry?;
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }
            let path = entry.path();
            let Some(lines) = read_text_lines(path)? else {
                debug!("Skipping binary file: {}", path.display());
                continue;
            };
            let file = SourceFile {
                path: relative_slash_path(&search_root, path),
                lines,
            };
            if !sink(file) {
                break;
            }
        }
        Ok(())
    }

    /// Convenience wrapper collecting every file. Mostly useful in tests.
    pub fn collect(&self, cancel: &CancelToken) -> Result<Vec<SourceFile>> {
        let mut files = Vec::new();
        self.walk(cancel, |file| {
            files.push(file);
            true
        })?;
        Ok(files)
    }
}

/// `path` relative to `base`, joined with `/` on every platform.
pub fn relative_slash_path(base: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(base).unwrap_or(path);
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
