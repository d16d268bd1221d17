use std::pin::Pin;

use futures::{Stream, StreamExt, stream};

use crate::error::LlmError;

type LineStream = Pin<Box<dyn Stream<Item = crate::Result<String>> + Send>>;

/// Splits a byte stream of newline-delimited JSON into complete lines.
///
/// Chunks may end anywhere, including inside a multi-byte character, so bytes are
/// buffered and only decoded once a full line is available. Blank lines are skipped
/// and a trailing line without a newline is flushed when the stream ends.
pub(super) fn lines<S, B, E>(stream: S) -> LineStream
where
    S: Stream<Item = Result<B, E>> + Send + Unpin + 'static,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    let parsed = stream::unfold(
        (Some(stream), Vec::<u8>::new()),
        |(stream, mut buffer)| async move {
            let mut stream = stream?;

            let Some(chunk) = stream.next().await else {
                let rest = decode(std::mem::take(&mut buffer));
                let lines = rest.into_iter().collect::<Vec<_>>();

                return Some((lines, (None, buffer)));
            };

            match chunk {
                Ok(bytes) => {
                    buffer.extend_from_slice(bytes.as_ref());

                    let mut lines = Vec::new();

                    while let Some(newline_pos) = buffer.iter().position(|b| *b == b'\n') {
                        let line = buffer.drain(..=newline_pos).collect::<Vec<_>>();
                        lines.extend(decode(line));
                    }

                    Some((lines, (Some(stream), buffer)))
                }
                Err(e) => {
                    log::error!("Stream read error: {e}");

                    let error = LlmError::ConnectionError(format!("Stream error: {e}"));

                    Some((vec![Err(error)], (None, buffer)))
                }
            }
        },
    );

    Box::pin(parsed.flat_map(stream::iter))
}

fn decode(line: Vec<u8>) -> Option<crate::Result<String>> {
    match String::from_utf8(line) {
        Ok(line) => {
            let line = line.trim();
            (!line.is_empty()).then(|| Ok(line.to_string()))
        }
        Err(e) => {
            log::error!("Invalid UTF-8 in stream: {e}");
            Some(Err(LlmError::MalformedResponse(format!("Invalid UTF-8 in stream: {e}"))))
        }
    }
}
