use crate::error::WatchError;

/// Reassembles complete lines out of arbitrarily split byte chunks.
///
/// Splitting happens on raw bytes, so a multi-byte character broken across
/// a chunk boundary is never mis-decoded; only complete lines are decoded
/// as UTF-8. The unterminated tail is carried until a later chunk supplies
/// its line terminator.
#[derive(Debug, Default)]
pub(crate) struct LineAssembler {
    partial: Vec<u8>,
}

impl LineAssembler {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Feeds one chunk and returns the completed lines, in source order.
    /// Trailing `\r` is stripped and pure-whitespace lines are skipped.
    pub(crate) fn push(&mut self, chunk: &[u8]) -> Vec<Result<String, WatchError>> {
        self.partial.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut consumed = 0;
        while let Some(offset) = self.partial[consumed..].iter().position(|byte| *byte == b'\n') {
            let raw = &self.partial[consumed..consumed + offset];
            consumed += offset + 1;
            match std::str::from_utf8(raw) {
                Ok(text) => {
                    let text = text.strip_suffix('\r').unwrap_or(text);
                    if !text.chars().all(char::is_whitespace) {
                        lines.push(Ok(text.to_string()));
                    }
                }
                Err(_) => lines.push(Err(WatchError::InvalidUtf8)),
            }
        }
        self.partial.drain(..consumed);
        lines
    }
}
