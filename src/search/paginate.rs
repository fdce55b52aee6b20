//! Splitting flag keys across bounded external search invocations
use crate::error::{CodeRefsError, Result, SearchToolError};
use crate::matcher::ElementMatcher;
use log::debug;

/// Default budget for the summed cost of keys in one search invocation.
pub const DEFAULT_MAX_PATTERN_LENGTH: usize = 30_000;

/// One invocation's worth of search terms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchPage {
    pub keys: Vec<String>,
    pub aliases: Vec<String>,
    pub delimiters: String,
    pub ctx_lines: i32,
}

impl SearchPage {
    fn for_keys(matcher: &ElementMatcher, keys: &[String], ctx_lines: i32) -> Self {
        let aliases = keys
            .iter()
            .flat_map(|key| matcher.aliases_for(key).iter().cloned())
            .collect();
        Self {
            keys: keys.to_vec(),
            aliases,
            delimiters: matcher.delimiters().to_string(),
            ctx_lines,
        }
    }

    /// Regex matching any key bounded by the delimiters, or any alias.
    pub fn pattern(&self) -> String {
        let keys = self
            .keys
            .iter()
            .map(|k| regex::escape(k))
            .collect::<Vec<_>>()
            .join("|");
        let mut alternatives = Vec::with_capacity(1 + self.aliases.len());
        if self.delimiters.is_empty() {
            alternatives.push(keys);
        } else {
            let class: String = self
                .delimiters
                .chars()
                .map(|c| regex::escape(&c.to_string()))
                .collect();
            alternatives.push(format!("[{class}](?:{keys})[{class}]"));
        }
        alternatives.extend(self.aliases.iter().map(|a| regex::escape(a)));
        format!("(?:{})", alternatives.join("|"))
    }
}

/// A line printed by an external search tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolLine {
    /// Path relative to the searched directory, forward slashes.
    pub path: String,
    /// 1-based.
    pub line_number: usize,
    pub text: String,
    /// `false` for context lines printed around a match.
    pub is_match: bool,
}

/// An external line-oriented search command.
#[cfg_attr(test, mockall::automock)]
pub trait SearchTool {
    fn search(&self, page: &SearchPage) -> std::result::Result<Vec<ToolLine>, SearchToolError>;
}

/// Cost of a key or alias in the generated pattern: `.` is escaped, so it
/// counts twice.
pub fn term_cost(term: &str) -> usize {
    term.len() + term.matches('.').count()
}

fn entry_cost(matcher: &ElementMatcher, key: &str) -> usize {
    term_cost(key)
        + matcher
            .aliases_for(key)
            .iter()
            .map(|a| term_cost(a))
            .sum::<usize>()
}

/// Search every flag key of `matcher`, a page at a time.
///
/// Keys are packed into pages while their summed cost plus the delimiter
/// cost stays within `max_pattern_length`. When the tool rejects a page as
/// too large, the remaining keys are paginated again with half the budget;
/// a budget of zero fails with [`CodeRefsError::NoValidSearchPattern`].
pub fn paginated_search(
    tool: &dyn SearchTool,
    matcher: &ElementMatcher,
    ctx_lines: i32,
    max_pattern_length: usize,
) -> Result<Vec<ToolLine>> {
    let mut results = Vec::new();
    paginate(
        tool,
        matcher,
        &matcher.elements,
        ctx_lines,
        max_pattern_length,
        &mut results,
    )?;
    Ok(results)
}

fn paginate(
    tool: &dyn SearchTool,
    matcher: &ElementMatcher,
    keys: &[String],
    ctx_lines: i32,
    max_pattern_length: usize,
    results: &mut Vec<ToolLine>,
) -> Result<()> {
    if keys.is_empty() {
        return Ok(());
    }
    if max_pattern_length == 0 {
        return Err(CodeRefsError::NoValidSearchPattern {
            project: matcher.proj_key.clone(),
        });
    }

    let delimiter_cost = matcher.delimiters().chars().count() * 2;
    let mut page_start = 0;
    let mut page_cost = 0;

    for (i, key) in keys.iter().enumerate() {
        page_cost += entry_cost(matcher, key);
        let page_full = keys.get(i + 1).map_or(true, |next| {
            page_cost + entry_cost(matcher, next) + delimiter_cost > max_pattern_length
        });
        if !page_full {
            continue;
        }

        let page = SearchPage::for_keys(matcher, &keys[page_start..=i], ctx_lines);
        match tool.search(&page) {
            Ok(lines) => results.extend(lines),
            Err(SearchToolError::PatternTooLarge) => {
                debug!(
                    "Search pattern for {} keys was too large; retrying with a budget of {}",
                    page.keys.len(),
                    max_pattern_length / 2
                );
                return paginate(
                    tool,
                    matcher,
                    &keys[page_start..],
                    ctx_lines,
                    max_pattern_length / 2,
                    results,
                );
            }
            Err(e) => return Err(e.into()),
        }
        page_start = i + 1;
        page_cost = 0;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::Sequence;
    use std::collections::HashMap;

    fn matcher(keys: &[&str], delimiters: &str) -> ElementMatcher {
        ElementMatcher::new(
            "default",
            None,
            keys.iter().map(|k| k.to_string()).collect(),
            delimiters,
            &HashMap::new(),
        )
        .unwrap()
    }

    fn keys(page: &SearchPage) -> Vec<&str> {
        page.keys.iter().map(String::as_str).collect()
    }

    #[test]
    fn both_keys_fit_in_one_page() {
        let mut tool = MockSearchTool::new();
        tool.expect_search()
            .withf(|page| keys(page) == ["flag1", "flag2"])
            .times(1)
            .returning(|_| Ok(vec![]));

        paginated_search(&tool, &matcher(&["flag1", "flag2"], "\""), 0, 12).unwrap();
    }

    #[test]
    fn smaller_budget_splits_pages_in_key_order() {
        let mut tool = MockSearchTool::new();
        let mut seq = Sequence::new();
        tool.expect_search()
            .withf(|page| keys(page) == ["flag1"])
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| {
                Ok(vec![ToolLine {
                    path: "a.txt".to_string(),
                    line_number: 1,
                    text: "\"flag1\"".to_string(),
                    is_match: true,
                }])
            });
        tool.expect_search()
            .withf(|page| keys(page) == ["flag2"])
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| {
                Ok(vec![ToolLine {
                    path: "b.txt".to_string(),
                    line_number: 2,
                    text: "\"flag2\"".to_string(),
                    is_match: true,
                }])
            });

        let lines = paginated_search(&tool, &matcher(&["flag1", "flag2"], "\""), 0, 7).unwrap();
        let paths: Vec<_> = lines.iter().map(|l| l.path.as_str()).collect();
        assert_eq!(paths, vec!["a.txt", "b.txt"]);
    }

    #[test]
    fn dots_count_twice() {
        assert_eq!(term_cost("a.b.c"), 7);
        let mut tool = MockSearchTool::new();
        let mut seq = Sequence::new();
        tool.expect_search()
            .withf(|page| keys(page) == ["a.b.c"])
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(vec![]));
        tool.expect_search()
            .withf(|page| keys(page) == ["xyz"])
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(vec![]));
        // 7 + 3 exceeds 9; without the dot surcharge 5 + 3 would fit.
        paginated_search(&tool, &matcher(&["a.b.c", "xyz"], ""), 0, 9).unwrap();
    }

    #[test]
    fn exhausted_budget_fails_after_bounded_retries() {
        let mut tool = MockSearchTool::new();
        tool.expect_search()
            .times(3)
            .returning(|_| Err(SearchToolError::PatternTooLarge));

        let err = paginated_search(&tool, &matcher(&["flag1", "flag2"], "\""), 0, 7).unwrap_err();
        assert!(matches!(err, CodeRefsError::NoValidSearchPattern { .. }));
        assert!(err.is_project_fatal());
    }

    #[test]
    fn retry_keeps_earlier_pages_and_resumes_from_failed_page() {
        let mut tool = MockSearchTool::new();
        let mut seq = Sequence::new();
        tool.expect_search()
            .withf(|page| keys(page) == ["flag1", "flag2"])
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| {
                Ok(vec![ToolLine {
                    path: "first".to_string(),
                    line_number: 1,
                    text: String::new(),
                    is_match: true,
                }])
            });
        tool.expect_search()
            .withf(|page| keys(page) == ["flag3", "flag4"])
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(SearchToolError::PatternTooLarge));
        tool.expect_search()
            .withf(|page| keys(page) == ["flag3"])
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(vec![]));
        tool.expect_search()
            .withf(|page| keys(page) == ["flag4"])
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(vec![]));

        let m = matcher(&["flag1", "flag2", "flag3", "flag4"], "");
        let lines = paginated_search(&tool, &m, 0, 10).unwrap();
        assert_eq!(lines.len(), 1);
    }

    #[test]
    fn other_tool_errors_propagate() {
        let mut tool = MockSearchTool::new();
        tool.expect_search().times(1).returning(|_| {
            Err(SearchToolError::Failed {
                status: "exit status: 2".to_string(),
                stderr: "boom".to_string(),
            })
        });
        let err = paginated_search(&tool, &matcher(&["flag1"], ""), 0, 100).unwrap_err();
        assert!(matches!(err, CodeRefsError::SearchTool(_)));
        assert!(!err.is_project_fatal());
    }

    #[test]
    fn no_keys_means_no_calls() {
        let tool = MockSearchTool::new();
        assert!(paginated_search(&tool, &matcher(&[], "\""), 0, 0).unwrap().is_empty());
    }

    #[test]
    fn page_pattern_escapes_terms() {
        let aliases = HashMap::from([("my.flag".to_string(), vec!["MY_FLAG".to_string()])]);
        let m = ElementMatcher::new("p", None, vec!["my.flag".to_string()], "\"'", &aliases).unwrap();
        let page = SearchPage::for_keys(&m, &m.elements, 0);
        assert_eq!(page.pattern(), r#"(?:["'](?:my\.flag)["']|MY_FLAG)"#);

        let re = regex::Regex::new(&page.pattern()).unwrap();
        assert!(re.is_match(r#"get("my.flag")"#));
        assert!(re.is_match("MY_FLAG"));
        assert!(!re.is_match(r#"get("myxflag")"#));

        let bare = SearchPage::for_keys(&matcher(&["a-b"], ""), &["a-b".to_string()], 0);
        assert_eq!(bare.pattern(), r"(?:a\-b)");
    }
}
