//! SSE line re-assembly
//!
//! Upstream bytes arrive in chunks that rarely align with line
//! boundaries. The buffer holds the trailing partial line between chunks
//! and hands back only complete lines, newline stripped, empty separator
//! lines dropped.

/// Buffer for accumulating incomplete SSE lines across chunk boundaries
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    incomplete: String,
}

impl SseLineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes and collect the complete lines they close out.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        self.incomplete.push_str(&String::from_utf8_lossy(bytes));

        let mut lines = Vec::new();
        while let Some(pos) = self.incomplete.find('\n') {
            let mut line: String = self.incomplete.drain(..=pos).collect();
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
            if !line.is_empty() {
                lines.push(line);
            }
        }
        lines
    }

    /// Hand back whatever trailing data never saw its newline.
    ///
    /// Called once at end of stream; some upstream error pages are not
    /// newline terminated.
    pub fn take_remaining(&mut self) -> String {
        std::mem::take(&mut self.incomplete)
    }
}
