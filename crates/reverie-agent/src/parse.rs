//! Helpers for reading model replies.

use serde::de::DeserializeOwned;
use tracing::warn;

/// Strip markdown code fences from LLM output.
pub fn strip_code_fences(s: &str) -> &str {
    let s = s.trim();

    if let Some(rest) = s.strip_prefix("```json")
        && let Some(inner) = rest.strip_suffix("```")
    {
        return inner.trim();
    }
    if let Some(rest) = s.strip_prefix("```")
        && let Some(inner) = rest.strip_suffix("```")
    {
        return inner.trim();
    }

    s
}

/// Strip one layer of matching quotes around the whole reply.
pub fn strip_wrapping_quotes(s: &str) -> &str {
    let s = s.trim();
    for quote in ['"', '\'', '`'] {
        if s.len() >= 2
            && let Some(inner) = s.strip_prefix(quote).and_then(|r| r.strip_suffix(quote))
        {
            return inner.trim();
        }
    }
    s
}

/// Try to find a top-level JSON object `{...}` in the text.
fn extract_json_object(s: &str) -> Option<&str> {
    let start = s.find('{')?;
    let end = s.rfind('}')?;
    (end > start).then(|| &s[start..=end])
}

/// Parse a JSON object reply, tolerating fences and surrounding prose.
///
/// Returns `None` (and logs) when nothing parseable is found.
pub fn parse_json_reply<T: DeserializeOwned>(raw: &str, what: &str) -> Option<T> {
    let cleaned = strip_code_fences(raw);

    if let Ok(value) = serde_json::from_str::<T>(cleaned) {
        return Some(value);
    }
    if let Some(object) = extract_json_object(cleaned)
        && let Ok(value) = serde_json::from_str::<T>(object)
    {
        return Some(value);
    }

    warn!(reply = what, "Failed to parse JSON reply");
    None
}

/// Trim, drop blanks and drop case-insensitive duplicates, keeping order.
pub fn clean_items(items: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    items
        .into_iter()
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .filter(|item| seen.insert(item.to_lowercase()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Reply {
        compressed: Vec<String>,
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```json\n{}\n```"), "{}");
        assert_eq!(strip_code_fences("```\nplain\n```"), "plain");
        assert_eq!(strip_code_fences("  no fences "), "no fences");
    }

    #[test]
    fn test_strip_wrapping_quotes() {
        assert_eq!(strip_wrapping_quotes("\"Likes tea.\""), "Likes tea.");
        assert_eq!(strip_wrapping_quotes("'x'"), "x");
        assert_eq!(strip_wrapping_quotes("\"unbalanced"), "\"unbalanced");
        assert_eq!(strip_wrapping_quotes("\""), "\"");
    }

    #[test]
    fn test_parse_json_reply_variants() {
        let direct: Reply = parse_json_reply(r#"{"compressed": ["a"]}"#, "test").unwrap();
        assert_eq!(direct.compressed, vec!["a"]);

        let fenced: Reply =
            parse_json_reply("```json\n{\"compressed\": [\"b\"]}\n```", "test").unwrap();
        assert_eq!(fenced.compressed, vec!["b"]);

        let prose: Reply =
            parse_json_reply("Sure! {\"compressed\": [\"c\"]} Hope that helps.", "test").unwrap();
        assert_eq!(prose.compressed, vec!["c"]);

        assert!(parse_json_reply::<Reply>("not json at all", "test").is_none());
        assert!(parse_json_reply::<Reply>(r#"{"other": 1}"#, "test").is_none());
    }

    #[test]
    fn test_clean_items() {
        let items = vec![
            " Likes tea ".to_string(),
            "".to_string(),
            "likes tea".to_string(),
            "Exam on Friday".to_string(),
        ];
        assert_eq!(clean_items(items), vec!["Likes tea", "Exam on Friday"]);
    }
}
