//! Upstream event-stream relay.
//!
//! The completion API answers with a `text/event-stream` body whose `data:`
//! lines carry JSON chunks. [`relay`] turns the raw byte stream into
//! [`RelayEvent`]s; [`framing`] turns those into the outbound body.

pub mod framing;

use std::fmt::Display;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::UpstreamError;

/// Data payload the upstream sends once generation is complete
pub const DONE_SENTINEL: &str = "[DONE]";

/// One incremental fragment of generated output, exactly as the upstream
/// sent it in `choices[0].delta`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Delta(serde_json::Map<String, serde_json::Value>);

impl Delta {
    /// Generated text carried by this delta, if any
    pub fn content(&self) -> Option<&str> {
        self.0.get("content").and_then(serde_json::Value::as_str)
    }
}

/// Events produced by [`relay`]. A relay stream always ends with exactly one
/// `Done` or `Error`.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayEvent {
    Delta(Delta),
    Done,
    Error(String),
}

/// Meaning of a single upstream line
#[derive(Debug, PartialEq)]
pub enum LineEvent {
    Delta(Delta),
    Done,
    Error(String),
}

/// Splits a byte stream into lines.
///
/// Incomplete trailing bytes stay buffered until the next push, so lines and
/// multi-byte characters split across network chunks are reassembled.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buffer: Vec<u8>,
}

impl LineDecoder {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            lines.push(decode_line(&line[..line.len() - 1]));
        }
        lines
    }

    /// Return whatever is left once the upstream has ended.
    pub fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buffer);
        Some(decode_line(&rest))
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

#[derive(Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    error: Option<ChunkError>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Option<Delta>,
}

#[derive(Deserialize)]
struct ChunkError {
    #[serde(default)]
    message: Option<String>,
}

/// Interpret one line of the upstream event stream.
///
/// Only `data:` lines matter; comments, `event:` lines and blank separators
/// yield `None`, as do chunks without a delta and malformed JSON.
pub fn parse_line(line: &str) -> Option<LineEvent> {
    let payload = line.strip_prefix("data:")?.trim();

    if payload == DONE_SENTINEL {
        return Some(LineEvent::Done);
    }
    if payload.is_empty() {
        return None;
    }

    match serde_json::from_str::<CompletionChunk>(payload) {
        Ok(CompletionChunk {
            error: Some(error), ..
        }) => Some(LineEvent::Error(
            error
                .message
                .unwrap_or_else(|| "upstream reported an error".to_string()),
        )),
        Ok(chunk) => chunk
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta)
            .map(LineEvent::Delta),
        Err(e) => {
            let preview: String = payload.chars().take(200).collect();
            warn!(error = %e, payload = %preview, "Skipping malformed completion chunk");
            None
        }
    }
}

/// Relay an upstream event-stream body as [`RelayEvent`]s.
///
/// Deltas are emitted in arrival order. The stream then ends with exactly one
/// terminal event: `Done` on the sentinel or on a clean end of the upstream
/// (the buffered tail line is processed first), `Error` when the upstream
/// fails or reports an error. Nothing is read or emitted after that.
pub fn relay<S, E>(upstream: S) -> impl Stream<Item = RelayEvent> + Send + 'static
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    async_stream::stream! {
        let mut upstream = Box::pin(upstream);
        let mut decoder = LineDecoder::default();
        let mut deltas = 0usize;

        loop {
            let (lines, ended) = match upstream.next().await {
                Some(Ok(chunk)) => (decoder.push(&chunk), false),
                Some(Err(e)) => {
                    let message = UpstreamError::Stream(e.to_string()).to_string();
                    warn!(error = %message, deltas, "Upstream stream failed");
                    metrics::counter!("relay_streams_completed_total", "outcome" => "error")
                        .increment(1);
                    yield RelayEvent::Error(message);
                    return;
                }
                None => (decoder.finish().into_iter().collect::<Vec<_>>(), true),
            };

            for line in lines {
                match parse_line(&line) {
                    Some(LineEvent::Delta(delta)) => {
                        deltas += 1;
                        yield RelayEvent::Delta(delta);
                    }
                    Some(LineEvent::Done) => {
                        debug!(deltas, "Upstream sent end sentinel");
                        metrics::counter!("relay_streams_completed_total", "outcome" => "done")
                            .increment(1);
                        yield RelayEvent::Done;
                        return;
                    }
                    Some(LineEvent::Error(message)) => {
                        warn!(error = %message, deltas, "Upstream reported an error mid-stream");
                        metrics::counter!("relay_streams_completed_total", "outcome" => "error")
                            .increment(1);
                        yield RelayEvent::Error(message);
                        return;
                    }
                    None => {}
                }
            }

            if ended {
                debug!(deltas, "Upstream ended without sentinel");
                metrics::counter!("relay_streams_completed_total", "outcome" => "eof")
                    .increment(1);
                yield RelayEvent::Done;
                return;
            }
        }
    }
}
