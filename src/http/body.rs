//! Response body — a chunk sequence that supports push-style enumeration.
//!
//! A [`Body`] is either fully known at construction time ([`Body::Full`]) or
//! produced incrementally by a [`Streamer`](crate::stream::Streamer)
//! ([`Body::Streaming`]). Consumers drive it with [`next_chunk`](Body::next_chunk)
//! or hand a sink to [`for_each`](Body::for_each); the whole body never has to
//! exist in memory at once.

use std::collections::VecDeque;
use std::fmt;

use bytes::Bytes;
use tokio::sync::mpsc;

/// An enumerable sequence of body chunks.
///
/// Streaming bodies are backed by an unbounded single-consumer channel:
/// chunks sent before the consumer starts enumerating are buffered and
/// replayed in emission order, and enumeration completes when the producer
/// ends the stream.
pub enum Body {
    /// All chunks known up front; the total length is known.
    Full(VecDeque<Bytes>),
    /// Chunks arrive over time; channel close signals completion.
    Streaming(mpsc::UnboundedReceiver<Bytes>),
}

impl Body {
    /// Creates an empty body.
    pub fn empty() -> Self {
        Body::Full(VecDeque::new())
    }

    /// Creates a single-chunk body.
    pub fn full(chunk: impl Into<Bytes>) -> Self {
        Body::Full(VecDeque::from([chunk.into()]))
    }

    /// Creates a body from a sequence of pre-computed chunks.
    pub fn from_chunks<I, C>(chunks: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Bytes>,
    {
        Body::Full(chunks.into_iter().map(Into::into).collect())
    }

    /// Returns `true` if this body is produced incrementally.
    pub fn is_streaming(&self) -> bool {
        matches!(self, Body::Streaming(_))
    }

    /// Returns the total body length in bytes, or `None` when the body is
    /// streamed and the length is unknown.
    pub fn content_length(&self) -> Option<usize> {
        match self {
            Body::Full(chunks) => Some(chunks.iter().map(Bytes::len).sum()),
            Body::Streaming(_) => None,
        }
    }

    /// Yields the next chunk, or `None` once the body is exhausted.
    ///
    /// For a streaming body this suspends until the producer sends a chunk
    /// or ends the stream.
    pub async fn next_chunk(&mut self) -> Option<Bytes> {
        match self {
            Body::Full(chunks) => chunks.pop_front(),
            Body::Streaming(rx) => rx.recv().await,
        }
    }

    /// Pushes every chunk into `sink`, in order, until the body completes.
    pub async fn for_each<F>(mut self, mut sink: F)
    where
        F: FnMut(Bytes),
    {
        while let Some(chunk) = self.next_chunk().await {
            sink(chunk);
        }
    }

    /// Drains the body into a single buffer.
    pub async fn collect(mut self) -> Bytes {
        let mut out = Vec::new();
        while let Some(chunk) = self.next_chunk().await {
            out.extend_from_slice(&chunk);
        }
        Bytes::from(out)
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Full(chunks) => f
                .debug_struct("Body::Full")
                .field("chunks", &chunks.len())
                .finish(),
            Body::Streaming(_) => f.debug_struct("Body::Streaming").finish_non_exhaustive(),
        }
    }
}

impl From<&str> for Body {
    fn from(s: &str) -> Self {
        Body::full(s.to_owned())
    }
}

impl From<String> for Body {
    fn from(s: String) -> Self {
        Body::full(s)
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Body::full(bytes)
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Body::full(bytes)
    }
}
