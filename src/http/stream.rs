//! Streaming responder.
//!
//! # Responsibilities
//! - Open a chunked or event-stream response
//! - Deliver each write to the transport as its own frame, in call order
//! - Report a closed peer on the next write
//!
//! # Design Decisions
//! - Single-slot channel: a write completes once the previous frame was
//!   handed to the body, so nothing piles up in memory
//! - No backpressure signal beyond write failure

use std::convert::Infallible;

use axum::body::Body;
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use axum::http::HeaderValue;
use axum::response::Response;
use bytes::{Bytes, BytesMut};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::observability::metrics;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StreamError {
    /// The peer went away; stop producing.
    #[error("client closed the connection")]
    ConnectionClosed,

    #[error("stream write failed: {0}")]
    WriteFailure(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Chunked,
    EventStream,
}

impl StreamKind {
    pub fn content_type(self) -> &'static str {
        match self {
            StreamKind::Chunked => "text/plain; charset=utf-8",
            StreamKind::EventStream => "text/event-stream",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StreamKind::Chunked => "chunked",
            StreamKind::EventStream => "event-stream",
        }
    }
}

/// A server-sent event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Event {
    pub event: Option<String>,
    pub id: Option<String>,
    pub data: String,
}

impl Event {
    pub fn new(data: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            ..Self::default()
        }
    }

    pub fn event(mut self, name: impl Into<String>) -> Self {
        self.event = Some(name.into());
        self
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    fn encode(&self) -> Bytes {
        let mut frame = BytesMut::new();
        if let Some(event) = &self.event {
            frame.extend_from_slice(format!("event: {}\n", single_line(event)).as_bytes());
        }
        if let Some(id) = &self.id {
            frame.extend_from_slice(format!("id: {}\n", single_line(id)).as_bytes());
        }
        push_data(&mut frame, self.data.as_bytes());
        frame.freeze()
    }
}

fn single_line(value: &str) -> String {
    value.replace(['\r', '\n'], " ")
}

/// One `data:` line per payload line, then the blank line that ends the event.
fn push_data(frame: &mut BytesMut, payload: &[u8]) {
    let text = String::from_utf8_lossy(payload);
    let mut lines = text.split('\n').peekable();
    if lines.peek().is_none() {
        frame.extend_from_slice(b"data: \n");
    }
    for line in lines {
        frame.extend_from_slice(b"data: ");
        frame.extend_from_slice(line.trim_end_matches('\r').as_bytes());
        frame.extend_from_slice(b"\n");
    }
    frame.extend_from_slice(b"\n");
}

/// Writer half of an open streaming response.
#[derive(Debug)]
pub struct StreamHandle {
    kind: StreamKind,
    tx: Option<mpsc::Sender<Bytes>>,
}

/// Open a streaming response. Return the [`Response`] from the handler and
/// keep writing through the handle, typically from a spawned task.
pub fn open_stream(kind: StreamKind) -> (StreamHandle, Response) {
    let (tx, rx) = mpsc::channel::<Bytes>(1);

    let frames = futures_util::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|frame| (Ok::<_, Infallible>(frame), rx))
    });

    let mut response = Response::new(Body::from_stream(frames));
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(kind.content_type()));
    if kind == StreamKind::EventStream {
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    }

    (StreamHandle { kind, tx: Some(tx) }, response)
}

impl StreamHandle {
    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    /// Write one chunk. Event streams wrap it as a `data:` event.
    pub async fn write(&mut self, chunk: impl Into<Bytes>) -> Result<(), StreamError> {
        let chunk = chunk.into();
        let frame = match self.kind {
            StreamKind::Chunked => chunk,
            StreamKind::EventStream => {
                let mut frame = BytesMut::with_capacity(chunk.len() + 8);
                push_data(&mut frame, &chunk);
                frame.freeze()
            }
        };
        self.send(frame).await
    }

    pub async fn send_event(&mut self, event: &Event) -> Result<(), StreamError> {
        if self.kind != StreamKind::EventStream {
            return Err(StreamError::WriteFailure(
                "events need an event-stream response".to_string(),
            ));
        }
        self.send(event.encode()).await
    }

    /// End the response. Later writes fail.
    pub fn finish(&mut self) {
        self.tx = None;
    }

    /// True once the peer is gone or the stream was finished.
    pub fn is_closed(&self) -> bool {
        self.tx.as_ref().map_or(true, mpsc::Sender::is_closed)
    }

    async fn send(&mut self, frame: Bytes) -> Result<(), StreamError> {
        let kind = self.kind.as_str();
        let Some(tx) = self.tx.as_ref() else {
            metrics::record_stream_write(kind, "finished");
            return Err(StreamError::WriteFailure("stream already finished".to_string()));
        };
        match tx.send(frame).await {
            Ok(()) => {
                metrics::record_stream_write(kind, "ok");
                Ok(())
            }
            Err(_) => {
                metrics::record_stream_write(kind, "closed");
                self.tx = None;
                Err(StreamError::ConnectionClosed)
            }
        }
    }
}
