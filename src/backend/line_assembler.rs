//! Byte stream to line assembly
//!
//! The rig terminates lines with `\r\n`, `\n`, or a bare `\r` depending on
//! firmware build. [`LineAssembler`] buffers raw bytes across reads and
//! emits every complete, non-blank line in arrival order.

/// Most bytes held while waiting for a terminator
///
/// The longest protocol line is well under 200 bytes; anything beyond this
/// is noise or a baud-rate mismatch.
pub const MAX_PENDING_BYTES: usize = 4096;

/// Accumulates link bytes and splits them into text lines
#[derive(Debug, Default)]
pub struct LineAssembler {
    buffer: Vec<u8>,
}

impl LineAssembler {
    /// Create an empty assembler
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of bytes and collect the lines it completes
    ///
    /// A trailing partial line stays buffered for the next call, unless it
    /// grows past [`MAX_PENDING_BYTES`], in which case it is discarded. A `\r` at
    /// the very end of the buffer completes its line immediately; if the
    /// matching `\n` arrives in the next chunk it yields a blank line, which
    /// is discarded.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);

        let mut lines = Vec::new();
        let mut start = 0;
        let mut i = 0;
        while i < self.buffer.len() {
            let terminator_len = match self.buffer[i] {
                b'\r' if self.buffer.get(i + 1) == Some(&b'\n') => 2,
                b'\r' | b'\n' => 1,
                _ => {
                    i += 1;
                    continue;
                }
            };

            if let Some(line) = decode_line(&self.buffer[start..i]) {
                lines.push(line);
            }
            i += terminator_len;
            start = i;
        }

        self.buffer.drain(..start);
        if self.buffer.len() > MAX_PENDING_BYTES {
            tracing::warn!(
                "Discarding {} bytes without a line terminator",
                self.buffer.len()
            );
            self.buffer.clear();
        }
        lines
    }

    /// Bytes waiting for a terminator
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Discard any buffered partial line
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

/// Decode one line, dropping invalid UTF-8 and surrounding whitespace
fn decode_line(bytes: &[u8]) -> Option<String> {
    let text: String = String::from_utf8_lossy(bytes)
        .chars()
        .filter(|&c| c != char::REPLACEMENT_CHARACTER)
        .collect();
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
