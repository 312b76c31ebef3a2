use once_cell::sync::Lazy;
use regex::Regex;

static RE_THINK_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<think>.*?</think>").unwrap());
static RE_FENCED_JSON: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)```(?:json)?\s*(\{.*?\})\s*```").unwrap());

/// Strips `<think>...</think>` reasoning blocks some local models prepend to
/// their answer, matching every agent's `_safe_parse_json` preprocessing
/// step in `original_source/app/agents/*.py`.
pub fn strip_think_blocks(text: &str) -> String {
    RE_THINK_BLOCK.replace_all(text, "").to_string()
}

/// Finds the first balanced `{...}` object in free text, scanning brace
/// depth and respecting string literals (so a `}` inside a quoted value
/// doesn't end the object early). Python's `parameter_agent.py` and
/// `planning_agent.py` rely on the third-party `regex` module's recursive
/// `(?1)` group for this; Rust's `regex` crate has no recursion, so this is
/// an explicit re-architecture of the same intent rather than a port — see
/// DESIGN.md.
pub fn extract_first_json_object(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let start = text.find('{')?;
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;
    let mut i = start;
    while i < bytes.len() {
        let c = bytes[i] as char;
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
        } else {
            match c {
                '"' => in_string = true,
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(&text[start..=i]);
                    }
                },
                _ => {},
            }
        }
        i += 1;
    }
    None
}

/// Tries, in order: a fenced ```json block, then the first balanced object
/// anywhere in the (think-stripped) text. Returns the parsed value, or
/// `None` if nothing in the text parses as JSON.
pub fn extract_json_value(raw: &str) -> Option<serde_json::Value> {
    let cleaned = strip_think_blocks(raw);
    if let Some(caps) = RE_FENCED_JSON.captures(&cleaned) {
        if let Ok(value) = serde_json::from_str(&caps[1]) {
            return Some(value);
        }
    }
    let candidate = extract_first_json_object(&cleaned)?;
    serde_json::from_str(candidate).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_fenced_json_block() {
        let raw = "here you go:\n```json\n{\"a\": 1}\n```\nthanks";
        assert_eq!(extract_json_value(raw), Some(serde_json::json!({"a": 1})));
    }

    #[test]
    fn extracts_balanced_object_with_nested_braces_and_strings() {
        let raw = r#"sure: {"a": {"b": 2}, "s": "has a } in it"} done"#;
        let value = extract_json_value(raw).unwrap();
        assert_eq!(value["a"]["b"], 2);
        assert_eq!(value["s"], "has a } in it");
    }

    #[test]
    fn strips_think_block_before_extraction() {
        let raw = "<think>well let me reason about {bogus}</think>{\"ok\": true}";
        assert_eq!(extract_json_value(raw), Some(serde_json::json!({"ok": true})));
    }

    #[test]
    fn returns_none_for_non_json_text() {
        assert_eq!(extract_json_value("no json here at all"), None);
    }
}
