pub mod decoder;
pub mod diagnostics;
pub mod reader;

pub use decoder::StreamDecoder;
pub use diagnostics::{Diagnostic, DiagnosticSink, TracingSink};

/// One decoded record of a chat response stream.
///
/// Records arrive as newline-delimited JSON objects of the form
/// `{"type": "...", "value": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolEvent {
    UserAddress { address: String },
    AssistantAddress { address: String },
    MessageDelta { text: String },
    Final { html: String },
    Unknown { raw: String },
}

impl ProtocolEvent {
    /// Wire name of the record type, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            ProtocolEvent::UserAddress { .. } => "user_address",
            ProtocolEvent::AssistantAddress { .. } => "assistant_address",
            ProtocolEvent::MessageDelta { .. } => "message",
            ProtocolEvent::Final { .. } => "final",
            ProtocolEvent::Unknown { .. } => "unknown",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_matches_wire_names() {
        let cases = [
            (ProtocolEvent::UserAddress { address: "0".into() }, "user_address"),
            (ProtocolEvent::AssistantAddress { address: "00".into() }, "assistant_address"),
            (ProtocolEvent::MessageDelta { text: "hi".into() }, "message"),
            (ProtocolEvent::Final { html: "<p>hi</p>".into() }, "final"),
            (ProtocolEvent::Unknown { raw: "{}".into() }, "unknown"),
        ];
        for (event, kind) in cases {
            assert_eq!(event.kind(), kind);
        }
    }
}
