use futures::stream::{Stream, StreamExt};

use super::{ProtocolEvent, StreamDecoder};

/// Turn a stream of body chunks into a stream of protocol events.
///
/// The decoder is flushed once the chunk stream ends. A chunk error is
/// passed through and ends the event stream; whatever the decoder still
/// buffers at that point is dropped.
pub fn events<S, E>(chunks: S, mut decoder: StreamDecoder) -> impl Stream<Item = Result<ProtocolEvent, E>>
where
    S: Stream<Item = Result<Vec<u8>, E>>,
{
    async_stream::stream! {
        futures::pin_mut!(chunks);
        while let Some(chunk) = chunks.next().await {
            match chunk {
                Ok(bytes) => {
                    for event in decoder.decode(&bytes, false) {
                        yield Ok(event);
                    }
                }
                Err(e) => {
                    yield Err(e);
                    return;
                }
            }
        }
        for event in decoder.decode(&[], true) {
            yield Ok(event);
        }
    }
}
