use chrono::{DateTime, NaiveDateTime, Utc};

use crate::models::log_entry::LogEntry;
use crate::models::trace::TraceBundle;
use crate::services::trace_extractor::extract_all_xml_records;

/// Assembles per-trace `TraceBundle`s across every source file that
/// mentioned a given trace id, sorted chronologically. Grounded on
/// `orchestrator.py`'s `full_log_finder.find_all_logs_for_trace` usage
/// (file-based path) and `gather_logs_for_trace_ids` (Loki path): both walk
/// every candidate file/response once per trace id and merge results keyed
/// by trace id, which is the invariant `compile_trace_bundles` preserves
/// (spec.md §3 "Trace grouping invariant").
pub fn compile_trace_bundles(
    trace_ids: &[String],
    sources: &[(String, String)],
) -> Vec<TraceBundle> {
    let mut bundles: Vec<TraceBundle> = trace_ids.iter().map(|id| TraceBundle::new(id.clone())).collect();

    for (source_file, content) in sources {
        for record in extract_all_xml_records(content) {
            if let Some(bundle) = bundles.iter_mut().find(|b| b.trace_id == record.trace_id) {
                let timestamp = lift_timestamp(&record.full_log_row);
                bundle.push(LogEntry {
                    trace_id: record.trace_id.clone(),
                    content: record.full_log_row,
                    timestamp,
                    source_file: source_file.clone(),
                });
            }
        }
    }

    for bundle in &mut bundles {
        bundle.sort_chronologically();
        bundle.rebuild_timeline();
    }
    bundles
}

/// Assembles trace bundles from Loki JSON-stream values
/// (`[[nanos_as_string, message], ...]`) rather than XML-framed records.
pub fn compile_trace_bundles_from_loki(
    trace_id: &str,
    source_file: &str,
    values: &[(String, String)],
) -> TraceBundle {
    let mut bundle = TraceBundle::new(trace_id.to_string());
    for (nanos, message) in values {
        let timestamp = nanos.parse::<i64>().ok().and_then(nanos_to_datetime);
        bundle.push(LogEntry {
            trace_id: trace_id.to_string(),
            content: message.clone(),
            timestamp,
            source_file: source_file.to_string(),
        });
    }
    bundle.sort_chronologically();
    bundle.rebuild_timeline();
    bundle
}

fn nanos_to_datetime(nanos: i64) -> Option<DateTime<Utc>> {
    let secs = nanos / 1_000_000_000;
    let subsec_nanos = (nanos % 1_000_000_000) as u32;
    DateTime::from_timestamp(secs, subsec_nanos)
}

/// Best-effort timestamp lift from free-form log text: tries a fixed list
/// of explicit formats, dayfirst-first, since `chrono` has no fuzzy/dayfirst
/// parser equivalent to `dateutil.parser.parse(dayfirst=True, fuzzy=True)`.
/// Returns `None` (not an error) when nothing in the text matches, which is
/// the documented null-sorts-first case.
pub fn lift_timestamp(text: &str) -> Option<DateTime<Utc>> {
    const FORMATS: &[(&str, usize)] = &[
        ("%Y-%m-%dT%H:%M:%SZ", 20),
        ("%Y-%m-%d %H:%M:%S", 19),
        ("%d.%m.%Y %H:%M:%S", 19),
        ("%d/%m/%Y %H:%M:%S", 19),
    ];
    for word_start in 0..text.len() {
        if !text.is_char_boundary(word_start) {
            continue;
        }
        let slice = &text[word_start..];
        for (fmt, width) in FORMATS {
            if slice.len() < *width || !slice.is_char_boundary(*width) {
                continue;
            }
            let probe = &slice[..*width];
            if let Ok(naive) = NaiveDateTime::parse_from_str(probe, fmt) {
                return Some(DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc));
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_bundle_across_multiple_files() {
        let trace_ids = vec!["t1".to_string()];
        let sources = vec![
            (
                "a.log".to_string(),
                "<log-row>2026-01-01 10:00:00 first <request-id>t1</request-id></log-row>".to_string(),
            ),
            (
                "b.log".to_string(),
                "<log-row>2026-01-01 09:00:00 second <request-id>t1</request-id></log-row>".to_string(),
            ),
        ];
        let bundles = compile_trace_bundles(&trace_ids, &sources);
        assert_eq!(bundles.len(), 1);
        assert_eq!(bundles[0].source_files.len(), 2);
        assert!(bundles[0].log_entries[0].content.contains("second"));
    }

    #[test]
    fn entries_without_timestamp_sort_first() {
        let trace_ids = vec!["t1".to_string()];
        let sources = vec![(
            "a.log".to_string(),
            "<log-row>no timestamp here <request-id>t1</request-id></log-row><log-row>2026-01-01 09:00:00 dated <request-id>t1</request-id></log-row>".to_string(),
        )];
        let bundles = compile_trace_bundles(&trace_ids, &sources);
        assert!(bundles[0].log_entries[0].timestamp.is_none());
    }
}
