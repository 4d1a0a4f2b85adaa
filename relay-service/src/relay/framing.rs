//! Outbound framing of a relay stream.

use std::convert::Infallible;

use axum::{
    body::{Body, Bytes},
    http::header,
    response::{
        IntoResponse, Response,
        sse::{Event, Sse},
    },
};
use futures::{Stream, StreamExt};
use tracing::warn;

use super::{DONE_SENTINEL, RelayEvent};

/// How a relay stream is written to the browser
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// `text/event-stream`: delta JSON per event, then `[DONE]`
    EventStream,
    /// Bare delta text, body ends with the stream
    PlainText,
}

impl OutputFormat {
    pub fn into_response<S>(self, events: S) -> Response
    where
        S: Stream<Item = RelayEvent> + Send + 'static,
    {
        match self {
            OutputFormat::EventStream => event_stream_response(events),
            OutputFormat::PlainText => plain_text_response(events),
        }
    }
}

fn to_sse_event(event: RelayEvent) -> Event {
    match event {
        RelayEvent::Delta(delta) => match serde_json::to_string(&delta) {
            Ok(json) => Event::default().data(json),
            Err(e) => {
                warn!(error = %e, "Failed to serialize delta");
                Event::default().event("error").data(e.to_string())
            }
        },
        RelayEvent::Done => Event::default().data(DONE_SENTINEL),
        RelayEvent::Error(message) => Event::default().event("error").data(message),
    }
}

pub fn event_stream_response<S>(events: S) -> Response
where
    S: Stream<Item = RelayEvent> + Send + 'static,
{
    let stream = events.map(|event| Ok::<_, Infallible>(to_sse_event(event)));
    Sse::new(stream).into_response()
}

pub fn plain_text_response<S>(events: S) -> Response
where
    S: Stream<Item = RelayEvent> + Send + 'static,
{
    let stream = events.filter_map(|event| async move {
        match event {
            RelayEvent::Delta(delta) => delta
                .content()
                .filter(|content| !content.is_empty())
                .map(|content| Ok::<_, Infallible>(Bytes::from(content.to_owned()))),
            _ => None,
        }
    });

    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        Body::from_stream(stream),
    )
        .into_response()
}
