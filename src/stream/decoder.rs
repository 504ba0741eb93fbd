use std::sync::Arc;

use serde_json::Value;

use super::ProtocolEvent;
use super::diagnostics::{Diagnostic, DiagnosticSink, TracingSink};

const REPLACEMENT: char = '\u{FFFD}';
const BOM: char = '\u{FEFF}';

/// Incremental decoder for newline-delimited JSON response bodies.
///
/// Bytes are fed in whatever pieces the network delivers. A multi-byte
/// character split across two chunks is held back until it is complete,
/// and a line is only parsed once its terminating `\n` has arrived (or the
/// stream is finished). One decoder serves exactly one response.
pub struct StreamDecoder {
    carry: Vec<u8>,
    buffer: String,
    seen_text: bool,
    sink: Arc<dyn DiagnosticSink>,
}

impl Default for StreamDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::with_sink(Arc::new(TracingSink))
    }

    pub fn with_sink(sink: Arc<dyn DiagnosticSink>) -> Self {
        Self {
            carry: Vec::new(),
            buffer: String::new(),
            seen_text: false,
            sink,
        }
    }

    /// Feed one chunk and return the events completed by it, in stream order.
    ///
    /// Pass `is_final = true` on the last call (the chunk may be empty) to
    /// flush any unterminated last line.
    pub fn decode(&mut self, chunk: &[u8], is_final: bool) -> Vec<ProtocolEvent> {
        self.push_bytes(chunk);
        if is_final {
            self.flush_carry();
        }

        let mut events = Vec::new();
        while let Some(newline) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=newline).collect();
            self.handle_line(&line, &mut events);
        }

        if is_final {
            let rest = std::mem::take(&mut self.buffer);
            self.handle_line(&rest, &mut events);
        }

        events
    }

    /// Text received but not yet terminated by a newline.
    pub fn buffered(&self) -> &str {
        &self.buffer
    }

    /// Bytes of an incomplete UTF-8 sequence waiting for the next chunk.
    pub fn pending_bytes(&self) -> usize {
        self.carry.len()
    }

    fn push_bytes(&mut self, chunk: &[u8]) {
        if chunk.is_empty() {
            return;
        }
        self.carry.extend_from_slice(chunk);

        let mut start = 0;
        while start < self.carry.len() {
            match std::str::from_utf8(&self.carry[start..]) {
                Ok(text) => {
                    self.buffer.push_str(text);
                    start = self.carry.len();
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    let prefix = &self.carry[start..start + valid];
                    self.buffer.push_str(&String::from_utf8_lossy(prefix));
                    match e.error_len() {
                        Some(len) => {
                            self.buffer.push(REPLACEMENT);
                            start += valid + len;
                        }
                        // Incomplete sequence at the end: wait for more bytes.
                        None => {
                            start += valid;
                            break;
                        }
                    }
                }
            }
        }

        self.carry.drain(..start);

        // A byte order mark is only meaningful at the very start of the body.
        if !self.seen_text && !self.buffer.is_empty() {
            self.seen_text = true;
            if self.buffer.starts_with(BOM) {
                self.buffer.drain(..BOM.len_utf8());
            }
        }
    }

    fn flush_carry(&mut self) {
        if !self.carry.is_empty() {
            self.carry.clear();
            self.buffer.push(REPLACEMENT);
        }
    }

    fn handle_line(&self, line: &str, events: &mut Vec<ProtocolEvent>) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        if let Some(event) = self.parse_line(line) {
            events.push(event);
        }
    }

    fn parse_line(&self, line: &str) -> Option<ProtocolEvent> {
        let json: Value = match serde_json::from_str(line) {
            Ok(json) => json,
            Err(e) => {
                self.sink.report(Diagnostic::MalformedLine {
                    raw: line.to_string(),
                    error: e.to_string(),
                });
                return None;
            }
        };

        let kind = json.get("type").and_then(|v| v.as_str());
        let value = json
            .get("value")
            .and_then(|v| v.as_str())
            .map(str::to_string);

        let event = match (kind, value) {
            (Some("user_address"), Some(address)) => ProtocolEvent::UserAddress { address },
            (Some("assistant_address"), Some(address)) => {
                ProtocolEvent::AssistantAddress { address }
            }
            (Some("message"), Some(text)) => ProtocolEvent::MessageDelta { text },
            (Some("final"), Some(html)) => ProtocolEvent::Final { html },
            (Some(kind @ ("user_address" | "assistant_address" | "message" | "final")), None) => {
                self.sink.report(Diagnostic::InvalidValue {
                    kind: kind.to_string(),
                    raw: line.to_string(),
                });
                ProtocolEvent::Unknown {
                    raw: line.to_string(),
                }
            }
            (kind, _) => {
                self.sink.report(Diagnostic::UnknownEventKind {
                    kind: kind.map(str::to_string),
                    raw: line.to_string(),
                });
                ProtocolEvent::Unknown {
                    raw: line.to_string(),
                }
            }
        };

        Some(event)
    }
}
