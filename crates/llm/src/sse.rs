use std::convert::Infallible;

use axum::response::{
    Sse,
    sse::{Event, KeepAlive},
};
use futures::{Stream, StreamExt};

use crate::event::EventStream;

/// Frames normalized events as server-sent events, one JSON object per `data:` line.
pub(crate) fn into_sse(events: EventStream) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let frames = events.map(|event| {
        let json = sonic_rs::to_string(&event).unwrap_or_else(|e| {
            log::error!("Failed to serialize stream event: {e}");
            r#"{"type":"error","message":"serialization failed"}"#.to_string()
        });

        Ok::<_, Infallible>(Event::default().data(json))
    });

    Sse::new(frames).keep_alive(KeepAlive::default())
}
