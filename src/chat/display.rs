use crate::stream::ProtocolEvent;

/// What the assistant bubble of the current turn shows.
///
/// Deltas are appended as plain text until the `final` record arrives,
/// which replaces everything with the server-rendered HTML.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageDisplay {
    content: String,
    rendered: bool,
    user_address: Option<String>,
    assistant_address: Option<String>,
}

impl MessageDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` for events that change nothing on screen.
    pub fn apply(&mut self, event: &ProtocolEvent) -> bool {
        match event {
            ProtocolEvent::MessageDelta { text } => {
                self.content.push_str(text);
                true
            }
            ProtocolEvent::Final { html } => {
                self.content.clone_from(html);
                self.rendered = true;
                true
            }
            ProtocolEvent::UserAddress { address } => {
                self.user_address = Some(address.clone());
                true
            }
            ProtocolEvent::AssistantAddress { address } => {
                self.assistant_address = Some(address.clone());
                true
            }
            ProtocolEvent::Unknown { .. } => false,
        }
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Whether the content is the final HTML rather than raw deltas.
    pub fn is_rendered(&self) -> bool {
        self.rendered
    }

    pub fn user_address(&self) -> Option<&str> {
        self.user_address.as_deref()
    }

    pub fn assistant_address(&self) -> Option<&str> {
        self.assistant_address.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deltas_then_final() {
        let mut display = MessageDisplay::new();
        display.apply(&ProtocolEvent::UserAddress { address: "0".into() });
        display.apply(&ProtocolEvent::MessageDelta { text: "Hel".into() });
        assert_eq!(display.content(), "Hel");
        display.apply(&ProtocolEvent::MessageDelta { text: "lo".into() });
        assert_eq!(display.content(), "Hello");
        assert!(!display.is_rendered());

        display.apply(&ProtocolEvent::Final { html: "<p>Hello</p>".into() });
        assert_eq!(display.content(), "<p>Hello</p>");
        assert!(display.is_rendered());

        // Address arriving after final still lands.
        display.apply(&ProtocolEvent::AssistantAddress { address: "00".into() });
        assert_eq!(display.user_address(), Some("0"));
        assert_eq!(display.assistant_address(), Some("00"));
    }

    #[test]
    fn test_unknown_changes_nothing() {
        let mut display = MessageDisplay::new();
        assert!(!display.apply(&ProtocolEvent::Unknown { raw: "{}".into() }));
        assert_eq!(display, MessageDisplay::new());
    }
}
