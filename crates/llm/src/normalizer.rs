use config::ServiceKind;
use futures::{
    StreamExt,
    future::{self, BoxFuture},
    stream,
};

use crate::{
    backend::DeltaStream,
    event::{EventStream, NormalizedEvent},
};

enum State {
    Opening(BoxFuture<'static, crate::Result<DeltaStream>>),
    Streaming(DeltaStream),
    Done,
}

/// Wraps a backend stream into the normalized event sequence.
///
/// Emits one `start`, a `content` event per non-empty delta, then exactly one of
/// `complete` or `error`. Failures while opening or reading the stream never escape as
/// values, they become the terminal `error` event labelled with the backend kind.
pub(crate) fn normalize(
    kind: ServiceKind,
    model: String,
    opening: BoxFuture<'static, crate::Result<DeltaStream>>,
) -> EventStream {
    let start = stream::once(future::ready(NormalizedEvent::start(model)));

    let rest = stream::unfold(State::Opening(opening), move |state| async move {
        match state {
            State::Opening(opening) => match opening.await {
                Ok(deltas) => next_event(kind, deltas).await,
                Err(e) => {
                    log::error!("Failed to open {kind} stream: {e}");
                    Some((NormalizedEvent::error(e.stream_message(Some(kind))), State::Done))
                }
            },
            State::Streaming(deltas) => next_event(kind, deltas).await,
            State::Done => None,
        }
    });

    Box::pin(start.chain(rest))
}

async fn next_event(kind: ServiceKind, mut deltas: DeltaStream) -> Option<(NormalizedEvent, State)> {
    loop {
        match deltas.next().await {
            Some(Ok(delta)) if delta.is_empty() => continue,
            Some(Ok(delta)) => return Some((NormalizedEvent::content(delta), State::Streaming(deltas))),
            Some(Err(e)) => {
                log::warn!("{kind} stream failed: {e}");
                return Some((NormalizedEvent::error(e.stream_message(Some(kind))), State::Done));
            }
            None => return Some((NormalizedEvent::complete(), State::Done)),
        }
    }
}
