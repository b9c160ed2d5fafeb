//! Pulls the candidate query out of free-form model output.
//!
//! The model is asked to answer with a single fenced code block. Anything
//! outside the first block (commentary, explanations, trailing prose) is
//! ignored, and the block body is returned verbatim apart from surrounding
//! whitespace.

use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtractError {
    #[error("no fenced code block containing a query was found in the model response")]
    NoCodeBlock,
}

fn fenced_block() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| Regex::new(r"(?s)```(.*?)```").expect("static regex is valid"))
}

const INLINE_TAGS: &[&str] = &["sql", "query", "sqlite", "duckdb"];

/// ```` ```sql SELECT 1``` ```` carries its tag on the same line as the query.
fn strip_inline_tag(inner: &str) -> &str {
    let trimmed = inner.trim_start();
    let word_end = trimmed.find(char::is_whitespace).unwrap_or(trimmed.len());
    let (word, rest) = trimmed.split_at(word_end);
    if INLINE_TAGS.iter().any(|tag| tag.eq_ignore_ascii_case(word)) {
        rest
    } else {
        inner
    }
}

/// Returns the body of the first triple-backtick block in `raw`.
///
/// When the block spans several lines, the text on the opening fence line is
/// an info string (`sql`, `query`, ...) and is dropped. A single-line block
/// loses a leading tag word and is otherwise taken whole.
pub fn extract_query(raw: &str) -> Result<String, ExtractError> {
    let inner = fenced_block()
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .ok_or(ExtractError::NoCodeBlock)?;

    let body = match inner.split_once('\n') {
        Some((_info, rest)) => rest,
        None => strip_inline_tag(inner),
    };

    let query = body.trim();
    if query.is_empty() {
        return Err(ExtractError::NoCodeBlock);
    }
    Ok(query.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_line_block_drops_its_tag() {
        assert_eq!(extract_query("```sql SELECT 1```").unwrap(), "SELECT 1");
        assert_eq!(extract_query("Try ```SQL  SELECT id FROM t``` now").unwrap(), "SELECT id FROM t");
        assert_eq!(extract_query("```SELECT 1```").unwrap(), "SELECT 1");
        assert_eq!(extract_query("```sql```"), Err(ExtractError::NoCodeBlock));
    }

    #[test]
    fn strips_language_tag_and_commentary() {
        let raw = "Here you go:\n```sql\nSELECT * FROM table1 ORDER BY created_at DESC LIMIT 5;\n```\nThis lists the newest rows.";
        assert_eq!(
            extract_query(raw).unwrap(),
            "SELECT * FROM table1 ORDER BY created_at DESC LIMIT 5;"
        );
    }

    #[test]
    fn accepts_query_tag_and_untagged_blocks() {
        assert_eq!(extract_query("```query\nSELECT 1\n```").unwrap(), "SELECT 1");
        assert_eq!(extract_query("```\n  SELECT 2  \n```").unwrap(), "SELECT 2");
    }

    #[test]
    fn keeps_body_verbatim() {
        let raw = "```sql\nSELECT status,\n       COUNT(*) AS n\nFROM table1\nGROUP BY status;\n```";
        assert_eq!(
            extract_query(raw).unwrap(),
            "SELECT status,\n       COUNT(*) AS n\nFROM table1\nGROUP BY status;"
        );
    }

    #[test]
    fn only_first_block_is_used() {
        let raw = "```sql\nSELECT 1;\n```\nor maybe\n```sql\nSELECT 2;\n```";
        assert_eq!(extract_query(raw).unwrap(), "SELECT 1;");
    }

    #[test]
    fn plain_text_has_no_query() {
        assert_eq!(
            extract_query("SELECT * FROM table1"),
            Err(ExtractError::NoCodeBlock)
        );
        assert_eq!(extract_query(""), Err(ExtractError::NoCodeBlock));
    }

    #[test]
    fn unterminated_or_empty_block_has_no_query() {
        assert_eq!(
            extract_query("```sql\nSELECT 1"),
            Err(ExtractError::NoCodeBlock)
        );
        assert_eq!(
            extract_query("```sql\n   \n```"),
            Err(ExtractError::NoCodeBlock)
        );
    }
}
