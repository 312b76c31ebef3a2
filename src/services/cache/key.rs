use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use sha2::{Digest, Sha256};

/// A single chat message as sent to an LLM provider, the unit the cache
/// gateway hashes over.
#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

static RE_GENERATED_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?mi)^\s*generated:\s*.*?$").unwrap());
static RE_ANALYSIS_COMPLETED_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?mi)^\s*analysis completed:\s*.*?$").unwrap());
static RE_TIMESTAMP_FIELD_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?mi)^\s*timestamp:\s*.*?$").unwrap());

/// Normalizes CRLF to LF and trims each message. For `cache_type ==
/// "relevance_analysis"`, additionally strips injected `Generated:` /
/// `Analysis completed:` / `Timestamp:` lines before hashing, so two calls
/// that differ only by wall-clock-stamped report text still hit the same
/// cache key. Grounded on `llm_gateway/gateway.py::canonicalize_messages`.
pub fn canonicalize_messages(messages: &[Message], cache_type: &str) -> Vec<Message> {
    messages
        .iter()
        .map(|m| {
            let mut content = m.content.replace("\r\n", "\n");
            if cache_type == "relevance_analysis" {
                content = RE_GENERATED_LINE.replace_all(&content, "").to_string();
                content = RE_ANALYSIS_COMPLETED_LINE.replace_all(&content, "").to_string();
                content = RE_TIMESTAMP_FIELD_LINE.replace_all(&content, "").to_string();
            }
            Message { role: m.role.clone(), content: content.trim().to_string() }
        })
        .collect()
}

/// Drops `timeout` from the options map before hashing, since it governs
/// client behavior only and never the computed value.
pub fn filter_generation_options(
    options: &serde_json::Map<String, serde_json::Value>,
) -> serde_json::Map<String, serde_json::Value> {
    options.iter().filter(|(k, _)| k.as_str() != "timeout").map(|(k, v)| (k.clone(), v.clone())).collect()
}

#[derive(Serialize)]
struct KeyPayload<'a> {
    cache_type: &'a str,
    namespace: Option<&'a str>,
    model: &'a str,
    messages: Vec<Message>,
    options: serde_json::Map<String, serde_json::Value>,
    gateway_version: &'a str,
    prompt_version: &'a str,
}

/// Builds `"llm:{cache_type}:{sha256_hex(canonical_json(payload))}"`.
/// Grounded on `llm_gateway/gateway.py::make_cache_key`.
#[allow(clippy::too_many_arguments)]
pub fn make_cache_key(
    cache_type: &str,
    namespace: Option<&str>,
    model: &str,
    messages: &[Message],
    options: &serde_json::Map<String, serde_json::Value>,
    gateway_version: &str,
    prompt_version: &str,
) -> String {
    let canonical_messages = canonicalize_messages(messages, cache_type);
    let filtered_options = filter_generation_options(options);
    let payload = KeyPayload {
        cache_type,
        namespace,
        model,
        messages: canonical_messages,
        options: filtered_options,
        gateway_version,
        prompt_version,
    };
    // serde_json preserves insertion order for maps built from BTreeMap only;
    // the options map is re-sorted here so the digest is stable regardless
    // of caller-supplied key order.
    let sorted = canonical_json(&serde_json::to_value(&payload).expect("payload always serializes"));
    let digest = Sha256::digest(sorted.as_bytes());
    format!("llm:{cache_type}:{digest:x}")
}

/// Re-serializes a `Value` with all object keys sorted, so semantically
/// identical payloads always hash identically.
fn canonical_json(value: &serde_json::Value) -> String {
    fn sort(value: &serde_json::Value) -> serde_json::Value {
        match value {
            serde_json::Value::Object(map) => {
                let mut entries: Vec<_> = map.iter().collect();
                entries.sort_by(|a, b| a.0.cmp(b.0));
                let mut out = serde_json::Map::new();
                for (k, v) in entries {
                    out.insert(k.clone(), sort(v));
                }
                serde_json::Value::Object(out)
            },
            serde_json::Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(sort).collect())
            },
            other => other.clone(),
        }
    }
    serde_json::to_string(&sort(value)).expect("sorted value always serializes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_deterministic_across_option_order() {
        let messages = vec![Message { role: "user".into(), content: "hi".into() }];
        let mut opts_a = serde_json::Map::new();
        opts_a.insert("temperature".into(), serde_json::json!(0.1));
        opts_a.insert("max_tokens".into(), serde_json::json!(128));
        let mut opts_b = serde_json::Map::new();
        opts_b.insert("max_tokens".into(), serde_json::json!(128));
        opts_b.insert("temperature".into(), serde_json::json!(0.1));

        let key_a = make_cache_key("trace_analysis", None, "m", &messages, &opts_a, "v1", "p1");
        let key_b = make_cache_key("trace_analysis", None, "m", &messages, &opts_b, "v1", "p1");
        assert_eq!(key_a, key_b);
    }

    #[test]
    fn timeout_option_is_excluded_from_key() {
        let messages = vec![Message { role: "user".into(), content: "hi".into() }];
        let mut opts_a = serde_json::Map::new();
        opts_a.insert("timeout".into(), serde_json::json!(30));
        let opts_b = serde_json::Map::new();

        let key_a = make_cache_key("trace_analysis", None, "m", &messages, &opts_a, "v1", "p1");
        let key_b = make_cache_key("trace_analysis", None, "m", &messages, &opts_b, "v1", "p1");
        assert_eq!(key_a, key_b);
    }

    #[test]
    fn relevance_analysis_strips_injected_timestamp_lines() {
        let a = vec![Message {
            role: "user".into(),
            content: "Report\nGenerated: 2026-01-01 10:00\nbody".into(),
        }];
        let b = vec![Message {
            role: "user".into(),
            content: "Report\nGenerated: 2099-12-31 23:59\nbody".into(),
        }];
        let opts = serde_json::Map::new();
        let key_a = make_cache_key("relevance_analysis", None, "m", &a, &opts, "v1", "p1");
        let key_b = make_cache_key("relevance_analysis", None, "m", &b, &opts, "v1", "p1");
        assert_eq!(key_a, key_b);
    }

    #[test]
    fn non_relevance_cache_type_keeps_timestamp_lines_significant() {
        let a = vec![Message { role: "user".into(), content: "Generated: 2026-01-01".into() }];
        let b = vec![Message { role: "user".into(), content: "Generated: 2099-12-31".into() }];
        let opts = serde_json::Map::new();
        let key_a = make_cache_key("trace_analysis", None, "m", &a, &opts, "v1", "p1");
        let key_b = make_cache_key("trace_analysis", None, "m", &b, &opts, "v1", "p1");
        assert_ne!(key_a, key_b);
    }
}
