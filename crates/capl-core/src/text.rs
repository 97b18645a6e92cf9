//! Text addressing helpers.
//!
//! LSP positions are (line, UTF-16 code unit) pairs while Rust strings are
//! indexed by UTF-8 byte offsets. Everything that crosses that boundary goes
//! through this module.

use tower_lsp_server::ls_types::Position;

/// Pre-computed line start byte offsets for O(log n) position lookups.
///
/// Lines are separated by `\n`, `\r\n` or a lone `\r`, as in LSP. The line
/// break never belongs to the line content.
#[derive(Debug, Clone)]
pub struct LineOffsetTable {
    line_starts: Vec<usize>,
}

impl LineOffsetTable {
    pub fn new(content: &str) -> Self {
        let bytes = content.as_bytes();
        let mut line_starts = vec![0];
        for (i, &b) in bytes.iter().enumerate() {
            if is_line_break(b, bytes.get(i + 1).copied()) {
                line_starts.push(i + 1);
            }
        }
        Self { line_starts }
    }

    /// Number of lines, counting the (possibly empty) line after a trailing break.
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Converts byte offset to LSP Position (line, UTF-16 character).
    ///
    /// Offsets past the end of `content` are clamped to the end.
    pub fn byte_offset_to_position(&self, content: &str, offset: usize) -> Position {
        let offset = offset.min(content.len());
        let line = self
            .line_starts
            .partition_point(|&start| start <= offset)
            .saturating_sub(1);
        let line_start = self.line_starts[line];

        let character = content
            .get(line_start..offset)
            .map(|s| s.chars().map(|c| c.len_utf16() as u32).sum())
            .unwrap_or(0);

        Position::new(line as u32, character)
    }

    /// Converts an LSP Position to a byte offset, clamping out-of-range values.
    ///
    /// A line past the last line maps to the end of the document; a character
    /// past the end of its line maps to the end of that line (before the line
    /// break). Offsets inside a surrogate pair round up to the next character.
    pub fn position_to_byte_offset(&self, content: &str, position: Position) -> usize {
        let line = position.line as usize;
        let Some(&line_start) = self.line_starts.get(line) else {
            return content.len();
        };

        let line_end = self.line_content_end(content, line);
        let line_text = &content[line_start..line_end];

        line_start
            + utf16_to_byte_offset(line_text, position.character).unwrap_or(line_text.len())
    }

    /// Byte offset where the content of `line` ends, excluding its line break.
    fn line_content_end(&self, content: &str, line: usize) -> usize {
        let Some(&next_start) = self.line_starts.get(line + 1) else {
            return content.len();
        };
        let bytes = content.as_bytes();
        let mut end = next_start - 1;
        if bytes[end] == b'\n' && end > self.line_starts[line] && bytes[end - 1] == b'\r' {
            end -= 1;
        }
        end
    }
}

/// `\n`, or a `\r` not followed by `\n`.
pub(crate) fn is_line_break(byte: u8, next: Option<u8>) -> bool {
    byte == b'\n' || (byte == b'\r' && next != Some(b'\n'))
}

/// Converts UTF-16 offset to byte offset in a string.
///
/// Returns `None` if the UTF-16 offset is past the end of `s`.
///
/// # Examples
///
/// ```
/// # use capl_core::text::utf16_to_byte_offset;
/// assert_eq!(utf16_to_byte_offset("hello", 2), Some(2));
///
/// // "日本語" - each char is 3 bytes but 1 UTF-16 code unit
/// assert_eq!(utf16_to_byte_offset("日本語", 1), Some(3));
///
/// // "😀" is 4 bytes but 2 UTF-16 code units (surrogate pair)
/// assert_eq!(utf16_to_byte_offset("😀test", 2), Some(4));
/// assert_eq!(utf16_to_byte_offset("abc", 4), None);
/// ```
pub fn utf16_to_byte_offset(s: &str, utf16_offset: u32) -> Option<usize> {
    let mut utf16_count = 0u32;
    for (byte_idx, ch) in s.char_indices() {
        if utf16_count >= utf16_offset {
            return Some(byte_idx);
        }
        utf16_count += ch.len_utf16() as u32;
    }
    if utf16_count >= utf16_offset {
        return Some(s.len());
    }
    None
}

/// Position just past the last character of `content`.
pub fn end_position(content: &str) -> Position {
    LineOffsetTable::new(content).byte_offset_to_position(content, content.len())
}
