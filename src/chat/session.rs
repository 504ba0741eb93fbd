use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::{Mutex, watch};

use super::display::MessageDisplay;
use super::error::ChatError;
use super::tree::parse_address;
use crate::api::ArchivistApi;
use crate::stream::reader::events;
use crate::stream::{DiagnosticSink, ProtocolEvent, StreamDecoder, TracingSink};

/// Stops a chat turn from applying any further events.
///
/// Clones share the same flag. Cancelling is sticky.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

/// Result of one streamed turn.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TurnOutcome {
    pub display: MessageDisplay,
    /// Events applied to `display`, unknown records included.
    pub events: usize,
    pub cancelled: bool,
}

impl TurnOutcome {
    pub fn user_address(&self) -> Option<&str> {
        self.display.user_address()
    }

    pub fn assistant_address(&self) -> Option<&str> {
        self.display.assistant_address()
    }
}

enum TurnRequest<'a> {
    Send { text: &'a str },
    Edit { address: &'a str, text: &'a str },
}

/// Drives chat turns against the backend, one at a time.
pub struct ChatController {
    api: Arc<dyn ArchivistApi>,
    sink: Arc<dyn DiagnosticSink>,
    in_flight: Mutex<()>,
}

impl ChatController {
    pub fn new(api: Arc<dyn ArchivistApi>) -> Self {
        Self::with_sink(api, Arc::new(TracingSink))
    }

    pub fn with_sink(api: Arc<dyn ArchivistApi>, sink: Arc<dyn DiagnosticSink>) -> Self {
        Self {
            api,
            sink,
            in_flight: Mutex::new(()),
        }
    }

    /// Send a new user message and stream the reply.
    ///
    /// `observer` sees every event after it has been applied to the display.
    pub async fn send<F>(&self, text: &str, cancel: &CancelHandle, observer: F) -> Result<TurnOutcome, ChatError>
    where
        F: FnMut(&ProtocolEvent, &MessageDisplay) + Send,
    {
        self.run_turn(TurnRequest::Send { text }, cancel, observer).await
    }

    /// Replace the message at `address` with `text` and stream the new reply.
    pub async fn edit<F>(
        &self,
        address: &str,
        text: &str,
        cancel: &CancelHandle,
        observer: F,
    ) -> Result<TurnOutcome, ChatError>
    where
        F: FnMut(&ProtocolEvent, &MessageDisplay) + Send,
    {
        parse_address(address)?;
        self.run_turn(TurnRequest::Edit { address, text }, cancel, observer).await
    }

    async fn run_turn<F>(
        &self,
        request: TurnRequest<'_>,
        cancel: &CancelHandle,
        mut observer: F,
    ) -> Result<TurnOutcome, ChatError>
    where
        F: FnMut(&ProtocolEvent, &MessageDisplay) + Send,
    {
        let _turn = self.in_flight.lock().await;

        let mut cancelled = cancel.subscribe();
        let mut outcome = TurnOutcome::default();
        if cancel.is_cancelled() {
            outcome.cancelled = true;
            return Ok(outcome);
        }

        let open = async {
            match request {
                TurnRequest::Send { text } => self.api.stream_message(text).await,
                TurnRequest::Edit { address, text } => {
                    tracing::info!(address, "Streaming edited message");
                    self.api.stream_edit(text, address).await
                }
            }
        };
        let chunks = tokio::select! {
            biased;
            Ok(()) = cancelled.changed() => {
                tracing::info!("Chat turn cancelled before the reply started");
                outcome.cancelled = true;
                return Ok(outcome);
            }
            opened = open => opened?,
        };

        let decoder = StreamDecoder::with_sink(self.sink.clone());
        let events = events(chunks, decoder);
        futures::pin_mut!(events);

        loop {
            tokio::select! {
                biased;
                // The flag only ever goes from false to true.
                Ok(()) = cancelled.changed() => {
                    outcome.cancelled = true;
                    break;
                }
                next = events.next() => match next {
                    Some(Ok(event)) => {
                        outcome.display.apply(&event);
                        outcome.events += 1;
                        observer(&event, &outcome.display);
                    }
                    Some(Err(e)) => return Err(e.into()),
                    None => break,
                },
            }
        }

        tracing::info!(
            events = outcome.events,
            cancelled = outcome.cancelled,
            assistant_address = outcome.assistant_address().unwrap_or_default(),
            "Chat turn finished"
        );
        Ok(outcome)
    }
}
