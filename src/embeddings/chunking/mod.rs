
use std::path::{Path, PathBuf};
use tracing::debug;

pub const DEFAULT_CHUNK_SIZE: usize = 500;

/// A contiguous run of lines from one source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// The lines of the window joined with `\n`; the last chunk keeps the
    /// file's trailing newline
    pub text: String,
    /// Zero-based index of the first line
    pub start_line: usize,
    /// Zero-based index of the last line, inclusive
    pub end_line: usize,
    pub source_filename: String,
    pub source_path: PathBuf,
}

impl Chunk {
    #[inline]
    pub fn line_count(&self) -> usize {
        self.end_line - self.start_line + 1
    }
}

/// Split `text` into windows of `chunk_size` lines.
///
/// Lines are separated on `\n` only, so joining the chunk texts with `\n`
/// gives back the input unchanged. A trailing `\n` ends the last line rather
/// than starting a new one. Blank input produces no chunks. A `chunk_size` of
/// zero behaves like one.
#[inline]
pub fn chunk_text(text: &str, chunk_size: usize, filename: &str, filepath: &Path) -> Vec<Chunk> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let chunk_size = chunk_size.max(1);
    let (body, trailing_newline) = match text.strip_suffix('\n') {
        Some(body) => (body, true),
        None => (text, false),
    };
    let lines: Vec<&str> = body.split('\n').collect();

    let mut chunks: Vec<Chunk> = lines
        .chunks(chunk_size)
        .enumerate()
        .map(|(index, window)| {
            let start_line = index * chunk_size;
            Chunk {
                text: window.join("\n"),
                start_line,
                end_line: start_line + window.len() - 1,
                source_filename: filename.to_string(),
                source_path: filepath.to_path_buf(),
            }
        })
        .collect();

    if trailing_newline {
        if let Some(last) = chunks.last_mut() {
            last.text.push('\n');
        }
    }

    debug!(
        "Split {} ({} lines) into {} chunks",
        filename,
        lines.len(),
        chunks.len()
    );
    chunks
}
