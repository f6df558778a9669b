//! Incremental `text/event-stream` decoder.
//!
//! Bytes are pushed in whatever chunks the network delivers. Only complete
//! lines are interpreted, so a chunk boundary may fall anywhere, including
//! inside a multi-byte UTF-8 sequence or between `\r` and `\n`. A message is
//! dispatched when its block is closed by a blank line.

/// One dispatched SSE message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseMessage {
    /// `event:` field, when present.
    pub event: Option<String>,
    /// `data:` lines joined with `\n`.
    pub data: String,
    /// `id:` field, when present.
    pub id: Option<String>,
}

#[derive(Debug, Default)]
struct PendingBlock {
    event: Option<String>,
    data: Vec<String>,
    id: Option<String>,
    /// Any line (field or comment) has been seen since the last blank line.
    touched: bool,
}

impl PendingBlock {
    fn apply(&mut self, line: &str) {
        self.touched = true;
        if line.starts_with(':') {
            return;
        }
        let (name, value) = match line.split_once(':') {
            Some((name, value)) => (name, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match name {
            "data" => self.data.push(value.to_string()),
            "event" => self.event = Some(value.to_string()),
            "id" => self.id = Some(value.to_string()),
            _ => {}
        }
    }

    /// Close the block. Blocks without `data` dispatch nothing.
    fn take(&mut self) -> Option<SseMessage> {
        let block = std::mem::take(self);
        if block.data.is_empty() {
            return None;
        }
        Some(SseMessage {
            event: block.event,
            data: block.data.join("\n"),
            id: block.id,
        })
    }
}

/// Rolling decode buffer for one stream.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    block: PendingBlock,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed `chunk` and return every message it completes, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseMessage> {
        self.buffer.extend_from_slice(chunk);

        let mut messages = Vec::new();
        let mut consumed = 0;
        while let Some(offset) = self.buffer[consumed..].iter().position(|b| *b == b'\n') {
            let end = consumed + offset;
            let mut line = &self.buffer[consumed..end];
            if let Some(stripped) = line.strip_suffix(b"\r") {
                line = stripped;
            }

            if line.is_empty() {
                if let Some(message) = self.block.take() {
                    messages.push(message);
                }
            } else {
                let text = String::from_utf8_lossy(line);
                self.block.apply(&text);
            }
            consumed = end + 1;
        }
        self.buffer.drain(..consumed);
        messages
    }

    /// Bytes held that do not yet form a complete line.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Whether a partial block is pending.
    pub fn has_partial(&self) -> bool {
        !self.buffer.is_empty() || self.block.touched
    }

    /// End of stream: drop any unterminated block. Returns whether one was dropped.
    pub fn finish(&mut self) -> bool {
        let dropped = self.has_partial();
        self.buffer.clear();
        self.block = PendingBlock::default();
        dropped
    }
}
