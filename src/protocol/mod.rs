//! Request/response event types exchanged between the adapter and a handler.
//!
//! The handler pulls [`ReceiveEvent`]s from a [`Receive`] and produces a
//! stream of [`SendEvent`]s:
//!
//! ```text
//! handler ──► ResponseStart ─► ResponseBody(more) ─► … ─► ResponseBody(last)
//! handler ◄── Request(body) ─► Pending … ─► Disconnect ─► Disconnect …
//! ```

use bytes::Bytes;

use crate::http::Headers;

mod receive;

pub use receive::{Receive, ResponseSent};

/// An event delivered to the handler by [`Receive`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiveEvent {
    /// The request body. Delivered exactly once, first, with `more_body == false`.
    Request { body: Bytes, more_body: bool },
    /// Nothing new yet: the response has not been written.
    Pending,
    /// The exchange is over. Repeats on every later pull.
    Disconnect,
}

impl ReceiveEvent {
    /// Returns the body bytes of a [`ReceiveEvent::Request`], or `None`.
    pub fn into_body(self) -> Option<Bytes> {
        match self {
            Self::Request { body, .. } => Some(body),
            _ => None,
        }
    }
}

/// An event produced by the handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendEvent {
    /// Starts the response. Must be the first event.
    ResponseStart {
        status: u16,
        headers: Headers,
        /// Trailers are not supported; `true` is rejected.
        trailers: bool,
    },
    /// A piece of the response body. `more_body == false` ends the response.
    ResponseBody { body: Bytes, more_body: bool },
    /// An event kind the adapter does not implement, such as
    /// `http.response.trailers` relayed from a foreign application server.
    Other { kind: String },
}

impl SendEvent {
    /// Shorthand for a `ResponseStart` without trailers.
    pub fn start(status: u16, headers: impl Into<Headers>) -> Self {
        Self::ResponseStart {
            status,
            headers: headers.into(),
            trailers: false,
        }
    }

    /// Shorthand for the final body chunk.
    pub fn body(body: impl Into<Bytes>) -> Self {
        Self::ResponseBody {
            body: body.into(),
            more_body: false,
        }
    }

    /// Shorthand for an intermediate body chunk.
    pub fn chunk(body: impl Into<Bytes>) -> Self {
        Self::ResponseBody {
            body: body.into(),
            more_body: true,
        }
    }

    /// Returns the wire name of this event kind (`"http.response.start"` …).
    pub fn kind(&self) -> &str {
        match self {
            Self::ResponseStart { .. } => "http.response.start",
            Self::ResponseBody { .. } => "http.response.body",
            Self::Other { kind } => kind,
        }
    }
}
