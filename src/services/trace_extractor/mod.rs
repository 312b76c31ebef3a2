use once_cell::sync::Lazy;
use regex::Regex;

use crate::services::loki::LokiResponse;

/// One extracted XML-framed record: the enclosing `<log-row>` block's byte
/// span, its full text (tags included), and the `<request-id>` it names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlRecord {
    pub start: usize,
    pub end: usize,
    pub full_log_row: String,
    pub trace_id: String,
}

static RE_LOG_ROW: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<log-row>(.*?)</log-row>").unwrap());
static RE_REQUEST_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<request-id>\s*([^<\s]+)\s*</request-id>").unwrap());

/// Finds every well-formed `<log-row>...</log-row>` block in `text`.
/// Grounded exactly on
/// `original_source/app/tools/trace_id_extractor.py::_find_log_row_blocks`:
/// the non-greedy `(?s).*?` naturally skips any row missing its closing tag,
/// since there is then no matching close for the regex engine to pair with.
fn find_log_row_blocks(text: &str) -> Vec<(usize, usize, &str)> {
    RE_LOG_ROW.find_iter(text).map(|m| (m.start(), m.end(), m.as_str())).collect()
}

fn extract_request_id(content: &str) -> Option<String> {
    RE_REQUEST_ID.captures(content).map(|c| c[1].to_string())
}

/// Extracts every `<log-row>` block's trace id from `text`. Grounded on
/// `trace_id_extractor.py::extract_all_from_content`.
pub fn extract_all_xml_records(text: &str) -> Vec<XmlRecord> {
    find_log_row_blocks(text)
        .into_iter()
        .filter_map(|(start, end, full)| {
            extract_request_id(full)
                .map(|trace_id| XmlRecord { start, end, full_log_row: full.to_string(), trace_id })
        })
        .collect()
}

/// Returns the trace id of the `<log-row>` block enclosing byte offset
/// `position`; if no block encloses it, falls back to the first record's
/// trace id (spec.md §4.4), or `None` if there are no records at all.
pub fn extract_trace_id_at(text: &str, position: usize) -> Option<String> {
    let blocks = find_log_row_blocks(text);
    blocks
        .iter()
        .find(|(start, end, _)| *start <= position && position <= *end)
        .or_else(|| blocks.first())
        .and_then(|(_, _, full)| extract_request_id(full))
}

/// Unique trace ids across all XML-framed records, in first-seen order.
pub fn unique_xml_trace_ids(text: &str) -> Vec<String> {
    let mut seen = Vec::new();
    for record in extract_all_xml_records(text) {
        if !seen.contains(&record.trace_id) {
            seen.push(record.trace_id);
        }
    }
    seen
}

/// Extracts trace ids from a Loki JSON-stream response:
/// `data.result[].stream.trace_id`. Grounded on
/// `loki_trace_id_extractor.py::extract_trace_ids`. Returns a sorted,
/// deduplicated list, matching the original's `sorted(set(...))`.
pub fn extract_trace_ids_from_loki(response: &LokiResponse) -> Vec<String> {
    let mut ids: Vec<String> = response
        .data
        .result
        .iter()
        .filter_map(|r| r.stream.get("trace_id"))
        .filter_map(|v| v.as_str())
        .map(|s| s.to_string())
        .collect();
    ids.sort();
    ids.dedup();
    ids
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_trace_id_from_well_formed_row() {
        let text = "<log-row>hi <request-id>abc-123</request-id></log-row>";
        let ids = unique_xml_trace_ids(text);
        assert_eq!(ids, vec!["abc-123".to_string()]);
    }

    #[test]
    fn malformed_row_missing_closing_tag_is_skipped() {
        let text = "<log-row><request-id>abc</request-id> no closing tag here";
        assert!(unique_xml_trace_ids(text).is_empty());
    }

    #[test]
    fn position_lookup_returns_enclosing_record() {
        let text = "<log-row><request-id>first</request-id></log-row><log-row><request-id>second</request-id></log-row>";
        let second_pos = text.rfind("second").unwrap();
        assert_eq!(extract_trace_id_at(text, second_pos).as_deref(), Some("second"));
    }

    #[test]
    fn duplicate_trace_ids_are_deduplicated_in_first_seen_order() {
        let text = "<log-row><request-id>a</request-id></log-row><log-row><request-id>b</request-id></log-row><log-row><request-id>a</request-id></log-row>";
        assert_eq!(unique_xml_trace_ids(text), vec!["a".to_string(), "b".to_string()]);
    }
}
