use serde::{Deserialize, Serialize};

/// Problems locating a message by its address.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("empty message address")]
    Empty,

    #[error("invalid message address '{address}': expected a digit, got '{found}'")]
    NotADigit { address: String, found: char },

    #[error("invalid message address '{address}': index {index} at depth {depth}, only {available} messages there")]
    OutOfRange {
        address: String,
        depth: usize,
        index: usize,
        available: usize,
    },
}

/// Zero-based child indices from the root level down, one digit per level.
pub fn parse_address(address: &str) -> Result<Vec<usize>, AddressError> {
    if address.is_empty() {
        return Err(AddressError::Empty);
    }
    address
        .chars()
        .map(|c| {
            c.to_digit(10)
                .map(|d| d as usize)
                .ok_or_else(|| AddressError::NotADigit {
                    address: address.to_string(),
                    found: c,
                })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageNode {
    pub role: String,
    pub text: String,
    #[serde(default)]
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<MessageNode>,
}

/// A stored chat as returned by `/load_chat/{id}`: a forest of messages
/// where each child is a reply to (or an edited branch of) its parent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    #[serde(default)]
    pub messages: Vec<MessageNode>,
}

impl Conversation {
    pub fn get(&self, address: &str) -> Result<&MessageNode, AddressError> {
        self.path_to(address)?
            .pop()
            .ok_or(AddressError::Empty)
    }

    /// Messages from the root down to the one at `address`, inclusive.
    pub fn path_to(&self, address: &str) -> Result<Vec<&MessageNode>, AddressError> {
        let indices = parse_address(address)?;
        let mut path = Vec::with_capacity(indices.len());
        let mut level = &self.messages;

        for (depth, index) in indices.into_iter().enumerate() {
            let node = level.get(index).ok_or_else(|| AddressError::OutOfRange {
                address: address.to_string(),
                depth,
                index,
                available: level.len(),
            })?;
            path.push(node);
            level = &node.children;
        }

        Ok(path)
    }

    /// Every message in pre-order, the order the chat view appends them.
    pub fn flatten(&self) -> Vec<&MessageNode> {
        fn walk<'a>(nodes: &'a [MessageNode], out: &mut Vec<&'a MessageNode>) {
            for node in nodes {
                out.push(node);
                walk(&node.children, out);
            }
        }

        let mut out = Vec::new();
        walk(&self.messages, &mut out);
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptEntry {
    pub role: String,
    pub text: String,
    pub address: Option<String>,
}

/// The messages currently on screen, top to bottom.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_conversation(conversation: &Conversation) -> Self {
        Self {
            entries: conversation
                .flatten()
                .into_iter()
                .map(|m| TranscriptEntry {
                    role: m.role.clone(),
                    text: m.text.clone(),
                    address: Some(m.address.clone()).filter(|a| !a.is_empty()),
                })
                .collect(),
        }
    }

    pub fn push(&mut self, role: impl Into<String>, text: impl Into<String>, address: Option<String>) {
        self.entries.push(TranscriptEntry {
            role: role.into(),
            text: text.into(),
            address,
        });
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last_mut(&mut self) -> Option<&mut TranscriptEntry> {
        self.entries.last_mut()
    }

    /// Prepare the view for re-sending the message at `address` with `text`.
    ///
    /// Keeps the first `address.len()` entries, drops the rest, and puts
    /// `text` into the last kept entry (the one being edited).
    pub fn truncate_for_edit(&mut self, address: &str, text: &str) -> Result<(), AddressError> {
        let depth = parse_address(address)?.len();
        if depth > self.entries.len() {
            return Err(AddressError::OutOfRange {
                address: address.to_string(),
                depth: depth - 1,
                index: depth - 1,
                available: self.entries.len(),
            });
        }

        self.entries.truncate(depth);
        if let Some(edited) = self.entries.last_mut() {
            edited.text = text.to_string();
        }
        Ok(())
    }
}
