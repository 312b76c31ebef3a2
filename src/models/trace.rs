use chrono::{DateTime, Utc};

use super::log_entry::LogEntry;
use serde::{Deserialize, Serialize};

/// One timeline projection of a `LogEntry`: a thin, human-scannable summary
/// rather than the full record. Grounded on
/// `original_source/tools/full_log_finder.py::_create_timeline`'s
/// `{sequence, timestamp, level, operation}` shape, with `source_file`
/// folded in under `source` (spec.md §4.5/§3).
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct TimelineEvent {
    pub seq: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    pub level: String,
    pub operation_summary: String,
    pub source: String,
}

/// All log entries for one distributed trace id, compiled across every
/// source file that mentioned it and ordered chronologically.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct TraceBundle {
    pub trace_id: String,
    pub log_entries: Vec<LogEntry>,
    pub timeline: Vec<TimelineEvent>,
    pub source_files: Vec<String>,
}

impl TraceBundle {
    pub fn new(trace_id: impl Into<String>) -> Self {
        Self {
            trace_id: trace_id.into(),
            log_entries: Vec::new(),
            timeline: Vec::new(),
            source_files: Vec::new(),
        }
    }

    pub fn total_entries(&self) -> usize {
        self.log_entries.len()
    }

    pub fn push(&mut self, entry: LogEntry) {
        if !self.source_files.iter().any(|f| f == &entry.source_file) {
            self.source_files.push(entry.source_file.clone());
        }
        self.log_entries.push(entry);
    }

    /// Stable sort by timestamp, entries without a timestamp first, matching
    /// `TraceBundle`'s "null-first" ordering invariant (spec.md §3).
    pub fn sort_chronologically(&mut self) {
        self.log_entries.sort_by(|a, b| match (a.timestamp, b.timestamp) {
            (None, None) => std::cmp::Ordering::Equal,
            (None, Some(_)) => std::cmp::Ordering::Less,
            (Some(_), None) => std::cmp::Ordering::Greater,
            (Some(x), Some(y)) => x.cmp(&y),
        });
    }

    /// Rebuilds `timeline` from `log_entries` in their current order. Call
    /// after `sort_chronologically` so `seq` reflects chronological order.
    pub fn rebuild_timeline(&mut self) {
        self.timeline = self
            .log_entries
            .iter()
            .enumerate()
            .map(|(i, e)| TimelineEvent {
                seq: i + 1,
                timestamp: e.timestamp,
                level: extract_level(&e.content),
                operation_summary: extract_operation_summary(&e.content),
                source: e.source_file.clone(),
            })
            .collect();
    }

    /// Flattened timeline text, oldest first, one record per line-group.
    /// Used to feed the LLM-facing prompts (`analyze_agent`,
    /// `relevance_analyzer`) a compact rendering of `timeline`.
    pub fn timeline_text(&self) -> String {
        self.timeline
            .iter()
            .map(|e| {
                format!(
                    "{}. {} | {:5} | {} | {}",
                    e.seq,
                    e.timestamp.map(|t| t.to_rfc3339()).unwrap_or_else(|| "N/A".to_string()),
                    e.level,
                    e.operation_summary,
                    e.source,
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

static RE_LEVEL_TAG: once_cell::sync::Lazy<regex::Regex> =
    once_cell::sync::Lazy::new(|| regex::Regex::new(r"(?is)<log-level>\s*(\w+)\s*</log-level>").unwrap());
static RE_LEVEL_WORD: once_cell::sync::Lazy<regex::Regex> =
    once_cell::sync::Lazy::new(|| regex::Regex::new(r"(?i)\b(ERROR|WARN(?:ING)?|INFO|DEBUG|TRACE|FATAL|CRITICAL)\b").unwrap());

/// Heuristic severity lift: an XML `<log-level>` tag if present, else the
/// first recognizable level keyword in the text, else `"INFO"`. Grounded on
/// `full_log_finder.py`'s `log_level` field parsed from `<log-level>`, with
/// the JSON-stream (Loki) case needing the keyword-scan fallback since it
/// carries no such tag.
fn extract_level(content: &str) -> String {
    if let Some(c) = RE_LEVEL_TAG.captures(content) {
        return c[1].to_ascii_uppercase();
    }
    if let Some(c) = RE_LEVEL_WORD.captures(content) {
        return c[1].to_ascii_uppercase();
    }
    "INFO".to_string()
}

static RE_OP_SERVICE_METHOD: once_cell::sync::Lazy<regex::Regex> = once_cell::sync::Lazy::new(|| {
    regex::Regex::new(r"(?is)Invoking Service.*?Method:\s*(\w+)").unwrap()
});
static RE_OP_VERB: once_cell::sync::Lazy<regex::Regex> =
    once_cell::sync::Lazy::new(|| regex::Regex::new(r"(?i)(Starting|Ending|Processing|Executing)\s+(\w+)").unwrap());
static RE_OP_CLASS: once_cell::sync::Lazy<regex::Regex> =
    once_cell::sync::Lazy::new(|| regex::Regex::new(r"(?i)Class:\s*.*?\.(\w+)").unwrap());
static RE_LOG_MESSAGE: once_cell::sync::Lazy<regex::Regex> =
    once_cell::sync::Lazy::new(|| regex::Regex::new(r"(?is)<log-message>\s*(.*?)\s*</log-message>").unwrap());

/// Heuristically extracts the operation a log entry describes: a service
/// method name, an operation verb + noun, a class name, or (failing all of
/// those) the message's first three words. Grounded verbatim on
/// `full_log_finder.py::_extract_operation`.
fn extract_operation_summary(content: &str) -> String {
    let message = RE_LOG_MESSAGE.captures(content).map(|c| c[1].to_string()).unwrap_or_else(|| content.to_string());

    if let Some(c) = RE_OP_SERVICE_METHOD.captures(&message) {
        return c[1].to_string();
    }
    if let Some(c) = RE_OP_VERB.captures(&message) {
        return format!("{} {}", &c[1], &c[2]);
    }
    if let Some(c) = RE_OP_CLASS.captures(&message) {
        return c[1].to_string();
    }
    let words: Vec<&str> = message.split_whitespace().take(3).collect();
    if words.is_empty() {
        "Unknown".to_string()
    } else {
        words.join(" ")
    }
}
