use coderefs::search::{NativeFinder, RipgrepFinder};
use coderefs::{
    AliasConfig, Backend, CancelToken, ElementMatcher, FinderOptions, LimitReached, Matcher,
    ProjectConfig, ReferenceFinder, SearchLimits, build_matcher, scan,
};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn scenario_matcher(ctx_lines: i32) -> Matcher {
    let aliases = HashMap::from([
        (
            "someFlag".to_string(),
            vec!["some-flag".to_string(), "some.flag".to_string()],
        ),
        (
            "anotherFlag".to_string(),
            vec!["another-flag".to_string(), "another.flag".to_string()],
        ),
    ]);
    let em = ElementMatcher::new(
        "default",
        None,
        vec!["someFlag".to_string(), "anotherFlag".to_string()],
        "",
        &aliases,
    )
    .unwrap();
    Matcher::new(vec![em], ctx_lines)
}

const SCENARIO: &str = "someFlag\nanotherFlag\nsomeFlaganotherFlag\nsome-flag\nanother-flag\n";

fn hunk_summary(finder: &dyn ReferenceFinder, root: &Path) -> Vec<(String, usize, String, Vec<String>)> {
    let report = finder
        .find_references(root, &scenario_matcher(0), &CancelToken::new())
        .unwrap();
    assert_eq!(report.references.len(), 1);
    report.references[0]
        .hunks
        .iter()
        .map(|h| {
            (
                h.flag_key.clone(),
                h.starting_line_number,
                h.lines.clone(),
                h.aliases.clone(),
            )
        })
        .collect()
}

fn expected_scenario() -> Vec<(String, usize, String, Vec<String>)> {
    vec![
        ("someFlag".into(), 1, "someFlag".into(), vec![]),
        (
            "someFlag".into(),
            3,
            "someFlaganotherFlag\nsome-flag".into(),
            vec!["some-flag".into()],
        ),
        (
            "anotherFlag".into(),
            2,
            "anotherFlag\nsomeFlaganotherFlag".into(),
            vec![],
        ),
        (
            "anotherFlag".into(),
            5,
            "another-flag".into(),
            vec!["another-flag".into()],
        ),
    ]
}

#[test]
fn aliases_and_combined_occurrences_produce_four_hunks() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "flags.txt", SCENARIO);

    let summary = hunk_summary(&NativeFinder::new(), dir.path());
    assert_eq!(summary, expected_scenario());
}

#[test]
fn ripgrep_backend_agrees_with_native() {
    if std::process::Command::new("rg").arg("--version").output().is_err() {
        eprintln!("rg not installed; skipping");
        return;
    }
    let dir = TempDir::new().unwrap();
    write(dir.path(), "flags.txt", SCENARIO);

    let summary = hunk_summary(&RipgrepFinder::new(), dir.path());
    assert_eq!(summary, expected_scenario());
}

#[test]
fn reference_on_first_line_spans_one_plus_context() {
    let dir = TempDir::new().unwrap();
    let body: String = std::iter::once("use('flag-one')".to_string())
        .chain((2..=10).map(|i| format!("line {i}")))
        .collect::<Vec<_>>()
        .join("\n");
    write(dir.path(), "a.js", &body);

    let em = ElementMatcher::new("p", None, vec!["flag-one".into()], "'", &HashMap::new()).unwrap();
    let report = NativeFinder::new()
        .find_references(dir.path(), &Matcher::new(vec![em], 3), &CancelToken::new())
        .unwrap();
    let hunk = &report.references[0].hunks[0];
    assert_eq!(hunk.starting_line_number, 1);
    assert_eq!(hunk.lines.lines().count(), 4);
}

#[test]
fn file_limit_truncates_in_path_order() {
    let dir = TempDir::new().unwrap();
    for i in 0..12 {
        write(dir.path(), &format!("src/file{i:02}.rs"), "let x = \"big-flag\";\n");
    }
    let em = ElementMatcher::new("p", None, vec!["big-flag".into()], "\"", &HashMap::new()).unwrap();
    let limits = SearchLimits {
        max_file_count: 5,
        max_hunk_count: 1_000,
    };

    let report = NativeFinder::new()
        .limits(limits)
        .threads(3)
        .find_references(dir.path(), &Matcher::new(vec![em], 0), &CancelToken::new())
        .unwrap();
    let paths: Vec<_> = report.references.iter().map(|r| r.path.as_str()).collect();
    assert_eq!(
        paths,
        vec![
            "src/file00.rs",
            "src/file01.rs",
            "src/file02.rs",
            "src/file03.rs",
            "src/file04.rs"
        ]
    );
    assert_eq!(report.limit_reached, Some(LimitReached::FileCount(5)));
}

#[test]
fn ignored_and_hidden_files_are_not_scanned() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), ".gitignore", "build/\n");
    write(dir.path(), ".ldignore", "vendor/\n");
    write(dir.path(), "build/out.js", "'my-flag'\n");
    write(dir.path(), "vendor/lib.js", "'my-flag'\n");
    write(dir.path(), ".hidden/cfg.js", "'my-flag'\n");
    write(dir.path(), "src/app.js", "'my-flag'\n");

    let em = ElementMatcher::new("p", None, vec!["my-flag".into()], "'", &HashMap::new()).unwrap();
    let report = NativeFinder::new()
        .find_references(dir.path(), &Matcher::new(vec![em], 0), &CancelToken::new())
        .unwrap();
    let paths: Vec<_> = report.references.iter().map(|r| r.path.as_str()).collect();
    assert_eq!(paths, vec!["src/app.js"]);
}

#[test]
fn cancelled_scan_returns_no_references() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "a.txt", "someFlag\n");
    let cancel = CancelToken::new();
    cancel.cancel();
    let report = NativeFinder::new()
        .find_references(dir.path(), &scenario_matcher(0), &cancel)
        .unwrap();
    assert!(report.references.is_empty());
}

#[test]
fn configured_aliases_flow_through_build_matcher() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "web/checkout.ts",
        "if (flags.newCheckout) {\n  render();\n}\n",
    );
    write(dir.path(), "api/handler.go", "if flags.newCheckout {\n}\n");

    let projects = vec![ProjectConfig {
        key: "web".to_string(),
        dir: Some("web".to_string()),
        flags: vec!["new-checkout".to_string()],
    }];
    let matcher = build_matcher(
        &projects,
        "\"'`",
        &[AliasConfig::CamelCase],
        dir.path(),
        1,
    )
    .unwrap();
    let report = scan(
        dir.path(),
        &matcher,
        Backend::Native,
        FinderOptions::default(),
        &CancelToken::new(),
    )
    .unwrap();

    assert_eq!(report.references.len(), 1);
    let reference = &report.references[0];
    assert_eq!(reference.path, "web/checkout.ts");
    assert_eq!(reference.hunks[0].flag_key, "new-checkout");
    assert_eq!(reference.hunks[0].aliases, vec!["newCheckout"]);
    assert_eq!(
        reference.hunks[0].lines,
        "if (flags.newCheckout) {\n  render();"
    );
}
