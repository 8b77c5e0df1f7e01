//! Response parsing for LLM outputs.
//!
//! Extracts SQL from LLM responses that may contain markdown code blocks,
//! a `SQLQuery:` marker, or just the bare statement.

/// Marker some models emit in front of the statement.
const SQL_QUERY_MARKER: &str = "SQLQuery:";

/// Labels that end a statement introduced by [`SQL_QUERY_MARKER`].
const TRAILING_LABELS: [&str; 2] = ["SQLResult:", "Answer:"];

/// Keywords a bare reply must start with to be taken as SQL.
const STATEMENT_KEYWORDS: [&str; 15] = [
    "SELECT", "WITH", "VALUES", "EXPLAIN", "SHOW", "PRAGMA", "INSERT", "UPDATE", "DELETE",
    "MERGE", "CREATE", "ALTER", "DROP", "TRUNCATE", "REPLACE",
];

/// Body of the first fenced block, preferring ```sql fences over bare ones.
///
/// Blocks tagged with another language are ignored.
pub fn fenced_sql(response: &str) -> Option<String> {
    extract_code_block(response, "sql")
        .or_else(|| extract_code_block(response, ""))
        .map(|sql| sql.trim().to_string())
}

/// Extracts the single SQL statement from a model reply.
///
/// Tries, in order: a fenced block, a `SQLQuery:` marker, then the bare reply
/// when it starts with a statement keyword. Returns `None` when nothing usable is found.
pub fn extract_sql(response: &str) -> Option<String> {
    let sql = fenced_sql(response)
        .or_else(|| extract_after_marker(response))
        .or_else(|| bare_statement(response))?;

    let sql = sql.trim();
    (!sql.is_empty()).then(|| sql.to_string())
}

/// Text after `SQLQuery:`, up to the next `SQLResult:` or `Answer:` label.
fn extract_after_marker(response: &str) -> Option<String> {
    let start = response.find(SQL_QUERY_MARKER)? + SQL_QUERY_MARKER.len();
    let after_marker = &response[start..];

    let end = TRAILING_LABELS
        .iter()
        .filter_map(|label| after_marker.find(label))
        .min()
        .unwrap_or(after_marker.len());

    let sql = after_marker[..end].trim().trim_matches('"').trim_matches('`');
    Some(sql.trim().to_string())
}

/// The whole reply, when it reads as a statement rather than prose.
fn bare_statement(response: &str) -> Option<String> {
    let trimmed = response.trim();
    let first_word = trimmed
        .split(|c: char| c.is_whitespace() || c == '(')
        .next()?
        .to_uppercase();

    STATEMENT_KEYWORDS
        .contains(&first_word.as_str())
        .then(|| trimmed.to_string())
}

/// Extracts content from a markdown code block with the specified language.
///
/// Pass an empty string for `lang` to match blocks without a language specifier.
fn extract_code_block(text: &str, lang: &str) -> Option<String> {
    let start_pattern = format!("```{}", lang);

    let start_idx = text.find(&start_pattern)?;

    // Find the newline after the opening fence
    let content_start = text[start_idx + start_pattern.len()..]
        .find('\n')
        .map(|i| start_idx + start_pattern.len() + i + 1)?;

    // For generic blocks, make sure it's not actually a language-specific block
    if lang.is_empty() {
        let after_fence = &text[start_idx + 3..content_start - 1];
        if !after_fence.trim().is_empty() {
            return None;
        }
    }

    let end_idx = text[content_start..].find("```")?;

    Some(text[content_start..content_start + end_idx].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_sql_code_block() {
        let response = r#"Here's the query:

```sql
SELECT * FROM medicines;
```

This will return every medicine."#;

        let sql = fenced_sql(response);

        assert_eq!(sql, Some("SELECT * FROM medicines;".to_string()));
    }

    #[test]
    fn test_extract_generic_code_block() {
        let response = "```\nSELECT COUNT(*) FROM medicines;\n```";

        let sql = fenced_sql(response);

        assert_eq!(
            sql,
            Some("SELECT COUNT(*) FROM medicines;".to_string())
        );
    }

    #[test]
    fn test_no_code_block() {
        let response = "I don't understand that question. Could you please clarify?";

        let sql = fenced_sql(response);

        assert_eq!(sql, None);
    }

    #[test]
    fn test_multiple_code_blocks_uses_first() {
        let response = r#"First query:

```sql
SELECT * FROM medicines;
```

Alternative:

```sql
SELECT id, name FROM medicines;
```"#;

        let sql = fenced_sql(response);

        assert_eq!(sql, Some("SELECT * FROM medicines;".to_string()));
    }

    #[test]
    fn test_sql_block_preferred_over_generic() {
        let response = r#"```
This is not SQL
```

```sql
SELECT * FROM medicines;
```"#;

        let sql = fenced_sql(response);

        assert_eq!(sql, Some("SELECT * FROM medicines;".to_string()));
    }

    #[test]
    fn test_code_block_with_other_language() {
        let response = "```python\nprint(\"hello\")\n```";

        let sql = fenced_sql(response);

        assert_eq!(sql, None);
    }

    #[test]
    fn test_whitespace_handling() {
        let response = "  \n  ```sql\n  SELECT 1;  \n```  \n  ";

        assert_eq!(extract_sql(response), Some("SELECT 1;".to_string()));
    }

    #[test]
    fn test_extract_sql_with_marker() {
        let response = "SQLQuery: SELECT name FROM medicines WHERE store_id = 3\nSQLResult: ...";
        assert_eq!(
            extract_sql(response),
            Some("SELECT name FROM medicines WHERE store_id = 3".to_string())
        );
    }

    #[test]
    fn test_extract_sql_marker_stops_at_answer() {
        let response = "SQLQuery: \"SELECT COUNT(*) FROM medicines\"\nAnswer: There are 12";
        assert_eq!(
            extract_sql(response),
            Some("SELECT COUNT(*) FROM medicines".to_string())
        );
    }

    #[test]
    fn test_extract_sql_bare_statement() {
        let response = "  select name from medicines limit 5  ";
        assert_eq!(
            extract_sql(response),
            Some("select name from medicines limit 5".to_string())
        );
    }

    #[test]
    fn test_extract_sql_rejects_prose() {
        assert_eq!(
            extract_sql("I don't understand that question. Could you please rephrase it?"),
            None
        );
    }

    #[test]
    fn test_extract_sql_rejects_empty() {
        assert_eq!(extract_sql(""), None);
        assert_eq!(extract_sql("   \n "), None);
        assert_eq!(extract_sql("```sql\n\n```"), None);
        assert_eq!(extract_sql("SQLQuery:   "), None);
    }
}
