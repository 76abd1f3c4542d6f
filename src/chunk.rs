//! Line-window text chunker.
//!
//! Splits file content into fixed windows of `lines_per_chunk` lines. Each
//! chunk carries a source id of the form `<path>#<start>-<end>` (1-based,
//! inclusive) and `{ filePath, startLine, endLine }` metadata so results can
//! link back to the exact lines.

use serde_json::json;

/// A chunk of file content, ready to be embedded.
#[derive(Debug, Clone, PartialEq)]
pub struct LineChunk {
    pub source_id: String,
    pub text: String,
    pub start_line: usize,
    pub end_line: usize,
}

impl LineChunk {
    pub fn metadata(&self, path: &str) -> serde_json::Value {
        json!({
            "filePath": path,
            "startLine": self.start_line,
            "endLine": self.end_line,
        })
    }
}

/// Split `content` into windows of `lines_per_chunk` lines.
/// Windows that contain only whitespace are skipped.
pub fn chunk_lines(path: &str, content: &str, lines_per_chunk: usize) -> Vec<LineChunk> {
    let lines: Vec<&str> = content.lines().collect();
    let window = lines_per_chunk.max(1);

    lines
        .chunks(window)
        .enumerate()
        .filter_map(|(i, slice)| {
            let text = slice.join("\n");
            if text.trim().is_empty() {
                return None;
            }
            let start_line = i * window + 1;
            let end_line = start_line + slice.len() - 1;
            Some(LineChunk {
                source_id: format!("{}#{}-{}", path, start_line, end_line),
                text,
                start_line,
                end_line,
            })
        })
        .collect()
}
