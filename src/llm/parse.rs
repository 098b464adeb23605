//! Lenient extraction of JSON arrays from model output

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

fn fenced_block() -> Option<&'static Regex> {
    static FENCE: OnceLock<Option<Regex>> = OnceLock::new();
    FENCE
        .get_or_init(|| Regex::new(r"```(?:json)?\s*\n?([\s\S]*?)```").ok())
        .as_ref()
}

/// Pull a JSON array out of a chat completion.
///
/// Tries, in order: the whole text, the first fenced code block, and the
/// span from the first `[` to the last `]`. Anything else yields an empty
/// list. Malformed output is never an error.
pub fn extract_json_array(content: &str) -> Vec<Value> {
    let content = content.trim();

    // valid JSON that is not an array means the model answered something else
    if let Ok(value) = serde_json::from_str::<Value>(content) {
        return match value {
            Value::Array(items) => items,
            _ => Vec::new(),
        };
    }

    if let Some(block) = fenced_block()
        .and_then(|re| re.captures(content))
        .and_then(|caps| caps.get(1))
    {
        if let Some(items) = parse_array(block.as_str().trim()) {
            return items;
        }
    }

    if let (Some(start), Some(end)) = (content.find('['), content.rfind(']')) {
        if end > start {
            if let Some(items) = parse_array(&content[start..=end]) {
                return items;
            }
        }
    }

    Vec::new()
}

fn parse_array(text: &str) -> Option<Vec<Value>> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Array(items)) => Some(items),
        _ => None,
    }
}
