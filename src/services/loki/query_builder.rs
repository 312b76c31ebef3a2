use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, NaiveDateTime, Utc};
use std::collections::BTreeMap;

/// A resolved Loki query, ready to be sent as a `query_range` request.
/// Grounded precisely on
/// `original_source/app/tools/loki/loki_query_builder.py::build_curl_args`,
/// with the subprocess/curl invocation replaced by a direct HTTP GET per
/// spec.md's Design Notes.
#[derive(Debug, Clone)]
pub struct ResolvedQuery {
    pub selector: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct QueryBuilderInput {
    pub filters: BTreeMap<String, String>,
    /// Pipeline stages already formatted (`!= "term"`, `|= "term"`, etc.),
    /// applied in order after the base selector.
    pub pipeline: Vec<String>,
    pub search: Vec<String>,
    pub trace_id: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
    pub end_date: Option<String>,
    pub end_time: Option<String>,
}

/// Builds the LogQL selector string: `{k="v",...}` plus pipeline stages,
/// followed by a `trace_id="..."` stage if one was supplied, followed by
/// search-term stages. Stage stitching matches the original exactly: a raw
/// stage starting with `!=`/`!~` is appended with no leading `|`, every
/// other stage gets `" | {raw}"`.
pub fn build_selector(input: &QueryBuilderInput) -> String {
    let mut selector = String::from("{");
    selector.push_str(
        &input.filters.iter().map(|(k, v)| format!("{k}=\"{v}\"")).collect::<Vec<_>>().join(","),
    );
    selector.push('}');

    for raw in &input.pipeline {
        if raw.starts_with("!=") || raw.starts_with("!~") {
            selector.push_str(raw);
        } else {
            selector.push_str(" | ");
            selector.push_str(raw);
        }
    }

    if let Some(trace_id) = &input.trace_id {
        selector.push_str(&format!(" | trace_id=\"{trace_id}\""));
    }

    match input.search.len() {
        0 => {},
        1 => {
            let escaped = input.search[0].replace('"', "\\\"");
            selector.push_str(&format!(" |= \"{escaped}\""));
        },
        _ => {
            let joined = input
                .search
                .iter()
                .map(|s| format!("\"{}\"", s.replace('"', "\\\"")))
                .collect::<Vec<_>>()
                .join(" or ");
            selector.push_str(&format!(" |= {joined}"));
        },
    }

    selector
}

/// Resolves the `[start, end)` time window. When `date` is given, `end`
/// defaults to `start + 1h` if a time-of-day was also given, else
/// `start + 1 day`; an explicit `end_date`/`end_time` overrides that
/// default. With no `date` at all, the window is `[now - 1 day, now)`.
pub fn resolve_window(input: &QueryBuilderInput) -> Result<(DateTime<Utc>, DateTime<Utc>), String> {
    match &input.date {
        Some(date_str) => {
            let start = parse_single_datetime(date_str, input.time.as_deref())?;
            let end = match &input.end_date {
                Some(end_date_str) => parse_single_datetime(end_date_str, input.end_time.as_deref())?,
                None => {
                    if input.time.is_some() {
                        start + ChronoDuration::hours(1)
                    } else {
                        start + ChronoDuration::days(1)
                    }
                },
            };
            Ok((start, end))
        },
        None => {
            let end = Utc::now();
            Ok((end - ChronoDuration::days(1), end))
        },
    }
}

fn parse_single_datetime(date_str: &str, time_str: Option<&str>) -> Result<DateTime<Utc>, String> {
    let date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(date_str, "%Y/%m/%d"))
        .map_err(|_| format!("unparsable date: {date_str}"))?;

    let naive = match time_str {
        Some(t) => {
            let time = chrono::NaiveTime::parse_from_str(t, "%H:%M:%S")
                .or_else(|_| chrono::NaiveTime::parse_from_str(t, "%H:%M"))
                .map_err(|_| format!("unparsable time: {t}"))?;
            NaiveDateTime::new(date, time)
        },
        None => date.and_hms_opt(0, 0, 0).expect("midnight is always valid"),
    };
    Ok(DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc))
}

pub fn resolve(input: &QueryBuilderInput) -> Result<ResolvedQuery, String> {
    let (start, end) = resolve_window(input)?;
    Ok(ResolvedQuery { selector: build_selector(input), start, end })
}

/// Deterministic cache key for one Loki query, built the same way as
/// `loki_query_builder.py::_get_loki_cache_key`: JSON-serialize the query
/// parameters with sorted keys, then take the first 20 hex chars of the
/// SHA-256 digest.
pub fn cache_key(input: &QueryBuilderInput) -> String {
    use sha2::{Digest, Sha256};
    let params = serde_json::json!({
        "filters": input.filters,
        "pipeline": input.pipeline,
        "search": input.search,
        "trace_id": input.trace_id,
        "date": input.date,
        "time": input.time,
        "end_date": input.end_date,
        "end_time": input.end_time,
    });
    let canonical = serde_json::to_string(&params).expect("query params always serialize");
    let digest = Sha256::digest(canonical.as_bytes());
    format!("{digest:x}").chars().take(20).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_selector_with_filters_and_search() {
        let mut filters = BTreeMap::new();
        filters.insert("service_namespace".to_string(), "payments".to_string());
        let input = QueryBuilderInput {
            filters,
            pipeline: vec!["!= \"HEARTBEAT\"".to_string()],
            search: vec!["merchant-123".to_string()],
            ..Default::default()
        };
        let selector = build_selector(&input);
        assert_eq!(selector, "{service_namespace=\"payments\"}!= \"HEARTBEAT\" |= \"merchant-123\"");
    }

    #[test]
    fn multi_term_search_is_or_joined() {
        let input = QueryBuilderInput {
            search: vec!["a".to_string(), "b".to_string()],
            ..Default::default()
        };
        assert_eq!(build_selector(&input), "{} |= \"a\" or \"b\"");
    }

    #[test]
    fn trace_id_stage_is_appended_after_pipeline() {
        let input = QueryBuilderInput { trace_id: Some("abc123".to_string()), ..Default::default() };
        assert_eq!(build_selector(&input), "{} | trace_id=\"abc123\"");
    }

    #[test]
    fn default_window_is_one_day_ending_now() {
        let input = QueryBuilderInput::default();
        let (start, end) = resolve_window(&input).unwrap();
        assert!(end - start >= ChronoDuration::hours(23));
    }
}
