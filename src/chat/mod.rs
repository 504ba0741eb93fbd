pub mod display;
pub mod error;
pub mod session;
pub mod tree;

pub use display::MessageDisplay;
pub use error::ChatError;
pub use session::{CancelHandle, ChatController, TurnOutcome};
pub use tree::{AddressError, Conversation, MessageNode, Transcript, TranscriptEntry, parse_address};
