use std::io::Read;
use std::path::Path;

use crate::utils::error::ApiError;

/// Reads local log files, transparently decompressing by extension. Covers
/// the compression formats `original_source/agents/file_searcher.py` reads
/// with Python's stdlib `lzma`/`gzip` modules, plus `.zip` archives. None of
/// the teacher's or pack repos read compressed log archives, so these
/// crates (`flate2`, `xz2`, `zip`) are new additions rather than reuse of an
/// existing pattern — see DESIGN.md.
///
/// This intentionally does not reproduce `file_searcher.py`'s filename
/// pattern search or LLM-based file verification: spec.md's C3 scope is
/// read + regex search only.
pub struct FileLogReader;

impl FileLogReader {
    /// Reads the full decompressed text content of one log file.
    pub fn read_full_content(path: &Path) -> Result<String, ApiError> {
        let raw = std::fs::read(path)
            .map_err(|e| ApiError::acquisition(format!("failed to read {}: {e}", path.display())))?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("").to_ascii_lowercase();
        let bytes = match ext.as_str() {
            "xz" => decompress_xz(&raw)?,
            "gz" => decompress_gzip(&raw)?,
            "zip" => decompress_zip(&raw, path)?,
            _ => raw,
        };

        String::from_utf8(bytes)
            .map_err(|e| ApiError::framing(format!("{} is not valid UTF-8: {e}", path.display())))
    }

    /// Line-oriented substring search with `context` lines of padding
    /// before/after each hit, returning the matched windows joined by file.
    pub fn search(path: &Path, pattern: &str, context: usize) -> Result<Vec<String>, ApiError> {
        let content = Self::read_full_content(path)?;
        let lines: Vec<&str> = content.lines().collect();
        let mut matches = Vec::new();
        for (i, line) in lines.iter().enumerate() {
            if line.to_lowercase().contains(&pattern.to_lowercase()) {
                let start = i.saturating_sub(context);
                let end = (i + context + 1).min(lines.len());
                matches.push(lines[start..end].join("\n"));
            }
        }
        Ok(matches)
    }

    /// Like `search`, but additionally extracts the distributed trace id
    /// enclosing each match (delegates framing to
    /// `services::trace_extractor`), returning the unique trace ids seen in
    /// first-match order — the order the orchestrator preserves when
    /// collecting ids across multiple source files.
    pub fn search_with_trace_ids(
        path: &Path,
        patterns: &[String],
        extract_trace_id: impl Fn(&str, usize) -> Option<String>,
    ) -> Result<Vec<String>, ApiError> {
        let content = Self::read_full_content(path)?;
        let mut seen = Vec::new();
        for pattern in patterns {
            let mut search_from = 0usize;
            while let Some(rel_pos) = content[search_from..].to_lowercase().find(&pattern.to_lowercase())
            {
                let pos = search_from + rel_pos;
                if let Some(trace_id) = extract_trace_id(&content, pos) {
                    if !seen.contains(&trace_id) {
                        seen.push(trace_id);
                    }
                }
                search_from = pos + pattern.len().max(1);
            }
        }
        Ok(seen)
    }
}

fn decompress_xz(raw: &[u8]) -> Result<Vec<u8>, ApiError> {
    let mut decoder = xz2::read::XzDecoder::new(raw);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out).map_err(|e| ApiError::acquisition(format!("lzma decode failed: {e}")))?;
    Ok(out)
}

fn decompress_gzip(raw: &[u8]) -> Result<Vec<u8>, ApiError> {
    let mut decoder = flate2::read::GzDecoder::new(raw);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out).map_err(|e| ApiError::acquisition(format!("gzip decode failed: {e}")))?;
    Ok(out)
}

fn decompress_zip(raw: &[u8], path: &Path) -> Result<Vec<u8>, ApiError> {
    let cursor = std::io::Cursor::new(raw);
    let mut archive = zip::ZipArchive::new(cursor)
        .map_err(|e| ApiError::acquisition(format!("zip open failed for {}: {e}", path.display())))?;
    if archive.is_empty() {
        return Err(ApiError::acquisition(format!("{} is an empty zip archive", path.display())));
    }
    let mut file = archive
        .by_index(0)
        .map_err(|e| ApiError::acquisition(format!("zip read failed for {}: {e}", path.display())))?;
    let mut out = Vec::new();
    file.read_to_end(&mut out).map_err(|e| ApiError::acquisition(format!("zip decode failed: {e}")))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_returns_context_window_around_each_hit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.log");
        std::fs::write(&path, "l0\nl1\nNEEDLE here\nl3\nl4").unwrap();
        let matches = FileLogReader::search(&path, "needle", 1).unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0], "l1\nNEEDLE here\nl3");
    }

    #[test]
    fn plain_text_with_unknown_extension_reads_as_is() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, "hello").unwrap();
        assert_eq!(FileLogReader::read_full_content(&path).unwrap(), "hello");
    }
}
