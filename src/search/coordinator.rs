//! Native backend: ignore-aware walker feeding a pool of hunk workers
use crate::cancel::CancelToken;
use crate::error::{CodeRefsError, Result};
use crate::matcher::Matcher;
use crate::search::hunks::{build_hunks_for_flag, candidate_lines};
use crate::search::{
    ReferenceFinder, ReferenceHunksRep, ScanReport, SearchLimits, aggregate_references,
};
use crate::walker::{FileWalker, SourceFile};
use crossbeam_channel::Receiver;
use log::{debug, trace};
use std::path::{Path, PathBuf};
use std::thread;

/// Files buffered between the walker and the workers, per worker thread.
const QUEUE_DEPTH_PER_THREAD: usize = 4;

/// Compute the hunks of every flag in scope for one file.
///
/// Returns `None` when the file holds no references.
pub fn file_hunks(file: &SourceFile, matcher: &Matcher) -> Result<Option<ReferenceHunksRep>> {
    let mut hunks = Vec::new();
    for element_matcher in matcher
        .elements
        .iter()
        .filter(|e| e.applies_to(&file.path))
    {
        let lines = file.lines.as_slice();
        let candidates = candidate_lines(lines, 0..lines.len(), element_matcher);
        for (element, matching) in candidates {
            let flag_key = &element_matcher.elements[element];
            let flag_hunks = build_hunks_for_flag(
                lines,
                &matching,
                element_matcher,
                flag_key,
                matcher.ctx_lines,
            )?;
            hunks.extend(
                flag_hunks
                    .into_iter()
                    .map(|h| h.into_rep(&element_matcher.proj_key, flag_key)),
            );
        }
    }

    if hunks.is_empty() {
        return Ok(None);
    }
    Ok(Some(ReferenceHunksRep {
        path: file.path.clone(),
        hunks,
    }))
}

/// Walks the tree on one thread and builds hunks for each file on a rayon
/// pool as files arrive.
///
/// Every file with references is held in memory until the walk ends, since
/// the caps apply to the path-sorted result. Peak memory therefore grows with
/// the number of matching files, not with [`SearchLimits`].
#[derive(Debug, Clone)]
pub struct NativeFinder {
    subdir: Option<PathBuf>,
    limits: SearchLimits,
    threads: usize,
}

impl Default for NativeFinder {
    fn default() -> Self {
        Self {
            subdir: None,
            limits: SearchLimits::default(),
            threads: num_cpus::get().max(1),
        }
    }
}

impl NativeFinder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subdir(mut self, subdir: Option<PathBuf>) -> Self {
        self.subdir = subdir;
        self
    }

    pub fn limits(mut self, limits: SearchLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }

    fn collect_references(
        &self,
        root: &Path,
        matcher: &Matcher,
        cancel: &CancelToken,
    ) -> Result<Vec<ReferenceHunksRep>> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.threads)
            .thread_name(|i| format!("coderefs-worker-{i}"))
            .build()
            .map_err(|e| CodeRefsError::Other(format!("failed to start worker pool: {e}")))?;
        let walker = FileWalker::new(root).subdir(self.subdir.clone());
        let (file_tx, file_rx) =
            crossbeam_channel::bounded::<SourceFile>(self.threads * QUEUE_DEPTH_PER_THREAD);
        let (result_tx, result_rx) =
            crossbeam_channel::unbounded::<Result<Option<ReferenceHunksRep>>>();
        // Raised when a worker fails so the walker and dispatcher wind down.
        let abort = CancelToken::new();

        thread::scope(|scope| {
            let walker = &walker;
            let abort_walk = &abort;
            let walk = scope.spawn(move || {
                walker.walk(cancel, |file| {
                    !abort_walk.is_cancelled() && file_tx.send(file).is_ok()
                })
            });

            let pool = &pool;
            let abort_dispatch = &abort;
            let _dispatch = scope.spawn(move || {
                pool.in_place_scope(|s| {
                    for file in file_rx.iter() {
                        if cancel.is_cancelled() || abort_dispatch.is_cancelled() {
                            debug!("Dispatch stopped before {}", file.path);
                            break;
                        }
                        trace!("Dispatching {}", file.path);
                        let tx = result_tx.clone();
                        s.spawn(move |_| {
                            let _ = tx.send(file_hunks(&file, matcher));
                        });
                    }
                });
            });

            let drained = drain_results(&result_rx, &abort);

            let walked = walk
                .join()
                .map_err(|_| CodeRefsError::Other("file walker panicked".to_string()))?;
            walked?;
            drained
        })
    }
}

/// Collect worker results until every sender is gone.
///
/// The first error raises `abort` and wins; results gathered before or after
/// it are discarded.
fn drain_results(
    results: &Receiver<Result<Option<ReferenceHunksRep>>>,
    abort: &CancelToken,
) -> Result<Vec<ReferenceHunksRep>> {
    let mut references = Vec::new();
    let mut failure = None;
    for result in results.iter() {
        match result {
            Ok(Some(reference)) => references.push(reference),
            Ok(None) => {}
            Err(e) => {
                abort.cancel();
                failure.get_or_insert(e);
            }
        }
    }
    match failure {
        Some(e) => Err(e),
        None => Ok(references),
    }
}

impl ReferenceFinder for NativeFinder {
    fn find_references(
        &self,
        root: &Path,
        matcher: &Matcher,
        cancel: &CancelToken,
    ) -> Result<ScanReport> {
        let references = self.collect_references(root, matcher, cancel)?;
        debug!(
            "Found references in {} files under {}",
            references.len(),
            root.display()
        );
        Ok(aggregate_references(references, self.limits))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::ElementMatcher;
    use std::collections::HashMap;

    fn source(path: &str, lines: &[&str]) -> SourceFile {
        SourceFile {
            path: path.to_string(),
            lines: lines.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn reference(path: &str) -> ReferenceHunksRep {
        ReferenceHunksRep {
            path: path.to_string(),
            hunks: vec![],
        }
    }

    #[test]
    fn missing_root_fails_the_scan() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let em = ElementMatcher::new("p", None, vec!["flag-a".into()], "", &HashMap::new()).unwrap();
        let result = NativeFinder::new().find_references(
            &temp_dir.path().join("nope"),
            &Matcher::new(vec![em], 0),
            &CancelToken::new(),
        );
        assert!(matches!(result, Err(CodeRefsError::Walk(_))));
    }

    #[test]
    fn missing_subdir_fails_the_scan() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("a.txt"), "flag-a\n").unwrap();
        let em = ElementMatcher::new("p", None, vec!["flag-a".into()], "", &HashMap::new()).unwrap();
        let matcher = Matcher::new(vec![em], 0);

        let result = NativeFinder::new()
            .subdir(Some(PathBuf::from("missing")))
            .find_references(temp_dir.path(), &matcher, &CancelToken::new());
        assert!(result.is_err());
    }

    #[test]
    fn worker_failure_fails_the_scan_and_aborts() {
        let (tx, rx) = crossbeam_channel::unbounded();
        tx.send(Ok(Some(reference("a.rs")))).unwrap();
        tx.send(Err(CodeRefsError::InvariantViolation("first".to_string())))
            .unwrap();
        tx.send(Ok(Some(reference("b.rs")))).unwrap();
        tx.send(Err(CodeRefsError::InvariantViolation("second".to_string())))
            .unwrap();
        drop(tx);

        let abort = CancelToken::new();
        match drain_results(&rx, &abort) {
            Err(CodeRefsError::InvariantViolation(msg)) => assert_eq!(msg, "first"),
            other => panic!("expected the first invariant violation, got {other:?}"),
        }
        assert!(abort.is_cancelled());
    }

    #[test]
    fn results_without_errors_are_all_kept() {
        let (tx, rx) = crossbeam_channel::unbounded();
        tx.send(Ok(Some(reference("a.rs")))).unwrap();
        tx.send(Ok(None)).unwrap();
        tx.send(Ok(Some(reference("b.rs")))).unwrap();
        drop(tx);

        let abort = CancelToken::new();
        assert_eq!(drain_results(&rx, &abort).unwrap().len(), 2);
        assert!(!abort.is_cancelled());
    }

    #[test]
    fn files_without_references_produce_nothing() {
        let em = ElementMatcher::new("p", None, vec!["flag-a".into()], "", &HashMap::new()).unwrap();
        let matcher = Matcher::new(vec![em], 1);
        assert_eq!(file_hunks(&source("a.rs", &["nothing here"]), &matcher).unwrap(), None);
    }

    #[test]
    fn projects_are_scoped_by_directory() {
        let web = ElementMatcher::new(
            "web",
            Some("web".to_string()),
            vec!["shared-flag".into()],
            "",
            &HashMap::new(),
        )
        .unwrap();
        let api = ElementMatcher::new(
            "api",
            Some("api".to_string()),
            vec!["shared-flag".into()],
            "",
            &HashMap::new(),
        )
        .unwrap();
        let matcher = Matcher::new(vec![web, api], 0);

        let refs = file_hunks(&source("web/app.ts", &["shared-flag"]), &matcher)
            .unwrap()
            .unwrap();
        assert_eq!(refs.hunks.len(), 1);
        assert_eq!(refs.hunks[0].proj_key, "web");
        assert_eq!(file_hunks(&source("docs/readme", &["shared-flag"]), &matcher).unwrap(), None);
    }
}
