pub mod client;
pub mod error;

pub use client::{ArchivistApi, ByteStream, ChatSummary, HttpArchivistClient};
pub use error::ApiError;
