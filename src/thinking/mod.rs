//! Incremental separation of reasoning spans from visible text.
//!
//! Models that reason inline wrap their deliberation in a marker pair such as
//! `<think>...</think>` at the very start of the response. [`ThinkingParser`]
//! consumes the raw token stream chunk by chunk and yields `Thinking` and
//! `Token` events as soon as they can be classified, holding back only the
//! bytes that could still belong to a marker.

use crate::types::StreamEvent;

/// Default opening marker.
pub const DEFAULT_OPEN_MARKER: &str = "<think>";
/// Default closing marker.
pub const DEFAULT_CLOSE_MARKER: &str = "</think>";
/// Bytes buffered while detecting before giving up and treating the response
/// as plain content.
pub const MAX_DETECT_BYTES: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserState {
    /// Start of the response; not yet known whether it opens with a marker.
    Detecting,
    InThinking,
    InContent,
}

/// Streaming reasoning/content splitter. One instance per model call.
#[derive(Debug, Clone)]
pub struct ThinkingParser {
    open: String,
    close: String,
    state: ParserState,
    buffer: String,
    visible: String,
}

impl Default for ThinkingParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ThinkingParser {
    pub fn new() -> Self {
        Self::with_markers(DEFAULT_OPEN_MARKER, DEFAULT_CLOSE_MARKER)
    }

    /// Parser with custom markers. An empty open marker disables detection.
    pub fn with_markers(open: impl Into<String>, close: impl Into<String>) -> Self {
        let open = open.into();
        let close = close.into();
        let state = if open.is_empty() || close.is_empty() {
            ParserState::InContent
        } else {
            ParserState::Detecting
        };
        Self {
            open,
            close,
            state,
            buffer: String::new(),
            visible: String::new(),
        }
    }

    pub fn state(&self) -> ParserState {
        self.state
    }

    /// Consume the next chunk of raw model output.
    pub fn feed(&mut self, chunk: &str) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if chunk.is_empty() {
            return events;
        }
        match self.state {
            ParserState::Detecting => {
                self.buffer.push_str(chunk);
                self.detect(&mut events);
            }
            ParserState::InThinking => {
                self.buffer.push_str(chunk);
                self.scan_thinking(&mut events);
            }
            ParserState::InContent => self.push_token(chunk.to_string(), &mut events),
        }
        events
    }

    /// Emit whatever is still buffered. Call once the model stream ends.
    pub fn flush(&mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        let residual = std::mem::take(&mut self.buffer);
        match self.state {
            ParserState::Detecting | ParserState::InContent => self.push_token(residual, &mut events),
            ParserState::InThinking => push_thinking(residual, &mut events),
        }
        events
    }

    /// Visible text seen so far, trimmed.
    pub fn clean_text(&self) -> String {
        self.visible.trim().to_string()
    }

    fn detect(&mut self, events: &mut Vec<StreamEvent>) {
        let trimmed = self.buffer.trim_start();
        if let Some(rest) = trimmed.strip_prefix(self.open.as_str()) {
            let leading = self.buffer.len() - trimmed.len();
            let remainder = format!("{}{}", &self.buffer[..leading], rest);
            self.buffer = remainder;
            self.state = ParserState::InThinking;
            self.scan_thinking(events);
        } else if self.open.starts_with(trimmed) {
            if self.buffer.len() > MAX_DETECT_BYTES {
                tracing::warn!(
                    buffered = self.buffer.len(),
                    "reasoning marker detection did not resolve; treating as content"
                );
                self.fail_open(events);
            }
        } else {
            self.fail_open(events);
        }
    }

    fn fail_open(&mut self, events: &mut Vec<StreamEvent>) {
        self.state = ParserState::InContent;
        let buffered = std::mem::take(&mut self.buffer);
        self.push_token(buffered, events);
    }

    fn scan_thinking(&mut self, events: &mut Vec<StreamEvent>) {
        if let Some(idx) = self.buffer.find(self.close.as_str()) {
            let after = self.buffer[idx + self.close.len()..].to_string();
            self.buffer.truncate(idx);
            push_thinking(std::mem::take(&mut self.buffer), events);
            self.state = ParserState::InContent;
            self.push_token(after, events);
            return;
        }

        let hold = self.held_back_len();
        let split = self.buffer.len() - hold;
        let tail = self.buffer.split_off(split);
        push_thinking(std::mem::replace(&mut self.buffer, tail), events);
    }

    /// Longest buffer suffix that is a proper prefix of the close marker.
    fn held_back_len(&self) -> usize {
        let max = self.buffer.len().min(self.close.len().saturating_sub(1));
        (1..=max)
            .rev()
            .find(|&k| {
                let start = self.buffer.len() - k;
                self.buffer.is_char_boundary(start) && self.close.starts_with(&self.buffer[start..])
            })
            .unwrap_or(0)
    }

    fn push_token(&mut self, text: String, events: &mut Vec<StreamEvent>) {
        if text.is_empty() {
            return;
        }
        self.visible.push_str(&text);
        events.push(StreamEvent::Token { text });
    }
}

fn push_thinking(text: String, events: &mut Vec<StreamEvent>) {
    if !text.is_empty() {
        events.push(StreamEvent::Thinking { text });
    }
}
