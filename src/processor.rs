use crate::error::{CodeRefsError, Result};
use std::fs;
use std::path::Path;

const BINARY_CHECK_SIZE: usize = 8000;
const CONTROL_BYTE_RATIO: f64 = 0.3;

/// Longest line, in characters, that is reported verbatim.
pub const MAX_LINE_CHAR_COUNT: usize = 500;

/// Appended to lines cut at [`MAX_LINE_CHAR_COUNT`].
pub const TRUNCATION_MARKER: &str = "…";

/// Byte-content heuristic: NUL bytes or a high share of control bytes in
/// the leading block mean the content is not text.
pub fn is_binary(content: &[u8]) -> bool {
    let head = &content[..content.len().min(BINARY_CHECK_SIZE)];
    if head.is_empty() {
        return false;
    }
    if memchr::memchr(0, head).is_some() {
        return true;
    }
    let control = head
        .iter()
        .filter(|&&b| b < 0x20 && !matches!(b, b'\t' | b'\n' | b'\r' | 0x0c | 0x1b))
        .count();
    (control as f64 / head.len() as f64) > CONTROL_BYTE_RATIO
}

/// Read `path` as text lines. Returns `Ok(None)` for content that fails the
/// text heuristic or is not valid UTF-8; read failures are errors.
pub fn read_text_lines(path: &Path) -> Result<Option<Vec<String>>> {
    let bytes = fs::read(path).map_err(|source| CodeRefsError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;
    if is_binary(&bytes) {
        return Ok(None);
    }
    match String::from_utf8(bytes) {
        Ok(content) => Ok(Some(split_lines(&content))),
        Err(_) => Ok(None),
    }
}

/// Split on `\n`, dropping a trailing `\r` from each line.
pub fn split_lines(content: &str) -> Vec<String> {
    content.lines().map(str::to_string).collect()
}

/// Cut `line` to [`MAX_LINE_CHAR_COUNT`] characters plus the marker.
pub fn truncate_line(line: &str) -> String {
    match line.char_indices().nth(MAX_LINE_CHAR_COUNT) {
        Some((cut, _)) => format!("{}{TRUNCATION_MARKER}", &line[..cut]),
        None => line.to_string(),
    }
}
