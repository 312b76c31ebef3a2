use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single log record lifted from a source file, with its distributed
/// trace id and best-effort timestamp attached.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct LogEntry {
    pub trace_id: String,
    /// Raw record text (full `<log-row>` block, or a single JSON-stream
    /// `values[]` line), unmodified.
    pub content: String,
    /// Parsed timestamp, if one could be lifted from the record. Entries
    /// without a parseable timestamp sort before entries that have one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Path of the file this entry was read from.
    pub source_file: String,
}
