pub mod aliases;
pub mod cancel;
pub mod cli;
pub mod config;
pub mod error;
pub mod matcher;
pub mod output;
pub mod processor;
pub mod search;
pub mod walker;

pub use crate::aliases::{AliasCache, AliasConfig, generate_aliases};
pub use crate::cancel::CancelToken;
pub use crate::config::{Config, ProjectConfig, filter_short_flag_keys};
pub use crate::error::{CodeRefsError, Result};
pub use crate::matcher::{ElementMatcher, Matcher};
pub use crate::search::{
    Backend, FinderOptions, HunkRep, LimitReached, ReferenceFinder, ReferenceHunksRep,
    ScanReport, SearchLimits,
};
use log::debug;
use std::path::Path;

/// Build the matcher for every project, generating aliases relative to `root`.
pub fn build_matcher(
    projects: &[ProjectConfig],
    delimiters: &str,
    alias_configs: &[AliasConfig],
    root: &Path,
    ctx_lines: i32,
) -> Result<Matcher> {
    config::validate_context_lines(ctx_lines)?;
    let mut cache = AliasCache::new(root);
    let mut elements = Vec::with_capacity(projects.len());
    for project in projects {
        let aliases = generate_aliases(alias_configs, &project.flags, &mut cache)?;
        debug!(
            "Project {}: {} flags, {} with aliases",
            project.key,
            project.flags.len(),
            aliases.len()
        );
        elements.push(ElementMatcher::new(
            project.key.clone(),
            project.dir.clone(),
            project.flags.clone(),
            delimiters,
            &aliases,
        )?);
    }
    Ok(Matcher::new(elements, ctx_lines))
}

/// Scan `root` with the chosen backend.
pub fn scan(
    root: &Path,
    matcher: &Matcher,
    backend: Backend,
    options: FinderOptions,
    cancel: &CancelToken,
) -> Result<ScanReport> {
    backend.finder(options).find_references(root, matcher, cancel)
}
