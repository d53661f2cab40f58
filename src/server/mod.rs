//! Protocol adapter: runs one request/response exchange end to end.
//!
//! The adapter builds the [`Scope`], reads the request body, hands the
//! handler its [`Receive`] side and drives the handler's event stream:
//!
//! ```text
//! AwaitingStart ──start──► Streaming ──body(last)──► Completed
//!       │                     │  ▲
//!       │                     └──┘ body(more)
//!       └──────────┬──────────┘
//!                  ▼
//!               Failed ── 500, nothing else written
//! ```
//!
//! The whole response body is buffered and written in a single call once the
//! final body event arrives. Only then is the response-sent signal raised, so
//! a handler observing [`ReceiveEvent::Disconnect`](crate::protocol::ReceiveEvent::Disconnect)
//! knows its output reached the transport.

use std::pin::{Pin, pin};
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures_core::Stream;
use futures_util::StreamExt;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{Level, debug, trace, warn};

use crate::config::Config;
use crate::http::{Headers, InvalidStatusCode, ResponseHead, StatusCode};
use crate::context::Context;
use crate::protocol::{Receive, ResponseSent, SendEvent};
use crate::scope::{Environ, Scope, ScopeError};

pub mod transport;

pub use transport::{CgiTransport, Transport};

/// Errors that end an exchange before any response is written.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("cannot build request scope: {0}")]
    Scope(#[from] ScopeError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid content-length `{value}`")]
    InvalidContentLength { value: String },

    #[error("request body truncated: expected {expected} bytes, received {received}")]
    TruncatedBody { expected: usize, received: usize },
}

/// Ways a handler can break the response protocol.
///
/// The client only ever sees a generic `500`; the details are logged and
/// returned in [`Outcome::Failed`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("http.response.body sent before http.response.start")]
    BodyBeforeStart,

    #[error("http.response.start sent twice")]
    DuplicateStart,

    #[error("unrecognized event `{kind}`")]
    UnrecognizedEvent { kind: String },

    #[error(transparent)]
    InvalidStatus(#[from] InvalidStatusCode),

    #[error("invalid response header `{name}`")]
    InvalidHeader { name: String },

    #[error("response trailers are not supported")]
    TrailersUnsupported,

    #[error("handler finished without starting a response")]
    MissingStart,

    #[error("handler did not finish its response within {0:?}")]
    Timeout(Duration),
}

/// How an exchange ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The handler's response was written.
    Completed { status: StatusCode, body_len: usize },
    /// The handler broke the protocol; a `500` was written instead.
    Failed(ProtocolError),
    /// The request was refused before the handler ran.
    Rejected { status: StatusCode },
}

/// Runs exchanges according to a [`Config`].
#[derive(Debug, Clone, Default)]
pub struct Adapter {
    config: Config,
}

impl Adapter {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Runs one exchange: `env` describes the request, `transport` carries
    /// the body in and the response out.
    ///
    /// The handler receives the shared [`Scope`], its [`Receive`] side and a
    /// copy of the configured [`Context`], and returns the stream of
    /// [`SendEvent`]s making up the response. It is driven on the caller's
    /// task; nothing is spawned.
    ///
    /// # Errors
    ///
    /// Returns an [`AdapterError`] when the request cannot be read; nothing
    /// has been written to the transport in that case, except for I/O
    /// failures that happen while writing. Handler misbehaviour is not an
    /// error: it yields [`Outcome::Failed`].
    pub async fn run<T, H, S>(
        &self,
        env: &Environ,
        transport: &mut T,
        handler: H,
    ) -> Result<Outcome, AdapterError>
    where
        T: Transport,
        H: FnOnce(Arc<Scope>, Receive, Context) -> S,
        S: Stream<Item = SendEvent>,
    {
        let scope = Arc::new(Scope::from_environ(env, self.config.auth())?);
        debug!(
            method = %scope.method(),
            path = scope.path(),
            version = %scope.http_version(),
            "dispatching request"
        );
        if tracing::enabled!(Level::TRACE) {
            if let Ok(json) = scope.to_json() {
                trace!(scope = %json, "request scope");
            }
        }

        let Some(body) = self.read_body(&scope, transport).await? else {
            return reject(transport, StatusCode::PAYLOAD_TOO_LARGE).await;
        };

        let sent = ResponseSent::new();
        let receive = Receive::new(body, &sent);
        let events = handler(
            Arc::clone(&scope),
            receive,
            self.config.handler_context().clone(),
        );
        let mut events = pin!(events);
        let deadline = self.config.timeout().map(Deadline::after);

        let (head, body) = match drain_response(&mut events, deadline).await {
            Ok(response) => response,
            Err(violation) => {
                warn!(
                    method = %scope.method(),
                    path = scope.path(),
                    error = %violation,
                    "handler broke the response protocol — sending 500"
                );
                transport.set_status(StatusCode::INTERNAL_SERVER_ERROR);
                transport.finish().await?;
                return Ok(Outcome::Failed(violation));
            }
        };

        transport.set_status(head.status());
        for (name, value) in head.headers().iter() {
            transport.write_header(name, value);
        }
        transport.write_body(&body).await?;
        transport.finish().await?;
        sent.mark();

        debug!(status = %head.status(), bytes = body.len(), "response sent");

        let drain = Deadline::after(self.config.drain_limit());
        let drain = match deadline {
            Some(handler) if handler.at < drain.at => handler,
            _ => drain,
        };
        drain_remaining(&mut events, drain).await;

        Ok(Outcome::Completed {
            status: head.status(),
            body_len: body.len(),
        })
    }

    /// Reads the announced request body. `None` means it is over the limit.
    async fn read_body<T: Transport>(
        &self,
        scope: &Scope,
        transport: &mut T,
    ) -> Result<Option<Bytes>, AdapterError> {
        let expected = match scope.content_length() {
            None => return Ok(Some(Bytes::new())),
            Some(Ok(len)) => len,
            Some(Err(_)) => {
                let value = scope.headers().get("content-length").unwrap_or_default();
                return Err(AdapterError::InvalidContentLength {
                    value: value.to_owned(),
                });
            }
        };

        if expected > self.config.max_body() {
            warn!(
                content_length = expected,
                limit = self.config.max_body(),
                "request body too large — sending 413"
            );
            return Ok(None);
        }

        let body = transport.read_body(expected).await?;
        if body.len() < expected {
            return Err(AdapterError::TruncatedBody {
                expected,
                received: body.len(),
            });
        }
        Ok(Some(body))
    }
}

/// Runs one exchange with the default [`Config`] over the process
/// environment, stdin and stdout.
///
/// Returns once the handler's stream ends or the post-response drain limit
/// ([`Config::drain_timeout`]) expires, whichever comes first.
///
/// # Examples
///
/// ```rust,no_run
/// use futures_util::stream;
/// use cgi_bridge::SendEvent;
///
/// #[tokio::main(flavor = "current_thread")]
/// async fn main() -> Result<(), cgi_bridge::AdapterError> {
///     cgi_bridge::serve(|_scope, _receive, _ctx| {
///         stream::iter([
///             SendEvent::start(200, [("content-type", "text/plain")]),
///             SendEvent::body("Hello!"),
///         ])
///     })
///     .await?;
///     Ok(())
/// }
/// ```
pub async fn serve<H, S>(handler: H) -> Result<Outcome, AdapterError>
where
    H: FnOnce(Arc<Scope>, Receive, Context) -> S,
    S: Stream<Item = SendEvent>,
{
    serve_with(Config::default(), handler).await
}

/// Like [`serve`], with an explicit [`Config`].
pub async fn serve_with<H, S>(config: Config, handler: H) -> Result<Outcome, AdapterError>
where
    H: FnOnce(Arc<Scope>, Receive, Context) -> S,
    S: Stream<Item = SendEvent>,
{
    let env = Environ::from_process();
    let mut transport = CgiTransport::stdio();
    Adapter::new(config).run(&env, &mut transport, handler).await
}

async fn reject<T: Transport>(
    transport: &mut T,
    status: StatusCode,
) -> Result<Outcome, AdapterError> {
    transport.set_status(status);
    transport.finish().await?;
    Ok(Outcome::Rejected { status })
}

#[derive(Debug, Clone, Copy)]
struct Deadline {
    at: Instant,
    limit: Duration,
}

impl Deadline {
    fn after(limit: Duration) -> Self {
        Self {
            at: Instant::now() + limit,
            limit,
        }
    }
}

async fn next_event<S>(
    events: &mut Pin<&mut S>,
    deadline: Option<Deadline>,
) -> Result<Option<SendEvent>, ProtocolError>
where
    S: Stream<Item = SendEvent>,
{
    match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline.at, events.next())
            .await
            .map_err(|_| ProtocolError::Timeout(deadline.limit)),
        None => Ok(events.next().await),
    }
}

/// Pulls events until the response is complete.
async fn drain_response<S>(
    events: &mut Pin<&mut S>,
    deadline: Option<Deadline>,
) -> Result<(ResponseHead, Bytes), ProtocolError>
where
    S: Stream<Item = SendEvent>,
{
    let mut exchange = Exchange::AwaitingStart;
    loop {
        let Some(event) = next_event(events, deadline).await? else {
            if matches!(exchange, Exchange::Streaming { .. }) {
                warn!("send stream ended without a final body event — flushing buffered response");
            }
            break;
        };
        if exchange.apply(event)? == Step::Complete {
            break;
        }
    }
    exchange.into_response().ok_or(ProtocolError::MissingStart)
}

/// Lets the handler run to its end after the response is out, but no longer
/// than `deadline`. Events it still produces are discarded.
async fn drain_remaining<S>(events: &mut Pin<&mut S>, deadline: Deadline)
where
    S: Stream<Item = SendEvent>,
{
    loop {
        match next_event(events, Some(deadline)).await {
            Ok(Some(event)) => {
                warn!(kind = event.kind(), "ignoring event after the response was sent");
            }
            Ok(None) => break,
            Err(_) => {
                warn!(
                    limit = ?deadline.limit,
                    "abandoning handler still running after the response was sent"
                );
                break;
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Continue,
    Complete,
}

/// Response state between the handler's first and final event.
#[derive(Debug)]
enum Exchange {
    AwaitingStart,
    Streaming { head: ResponseHead, body: BytesMut },
}

impl Exchange {
    fn apply(&mut self, event: SendEvent) -> Result<Step, ProtocolError> {
        match event {
            SendEvent::ResponseStart {
                status,
                headers,
                trailers,
            } => {
                if matches!(self, Self::Streaming { .. }) {
                    return Err(ProtocolError::DuplicateStart);
                }
                *self = Self::Streaming {
                    head: response_head(status, &headers, trailers)?,
                    body: BytesMut::new(),
                };
                Ok(Step::Continue)
            }
            SendEvent::ResponseBody {
                body: chunk,
                more_body,
            } => match self {
                Self::AwaitingStart => Err(ProtocolError::BodyBeforeStart),
                Self::Streaming { body, .. } => {
                    body.extend_from_slice(&chunk);
                    Ok(if more_body {
                        Step::Continue
                    } else {
                        Step::Complete
                    })
                }
            },
            SendEvent::Other { kind } => Err(ProtocolError::UnrecognizedEvent { kind }),
        }
    }

    fn into_response(self) -> Option<(ResponseHead, Bytes)> {
        match self {
            Self::AwaitingStart => None,
            Self::Streaming { head, body } => Some((head, body.freeze())),
        }
    }
}

fn response_head(
    status: u16,
    headers: &Headers,
    trailers: bool,
) -> Result<ResponseHead, ProtocolError> {
    if trailers {
        return Err(ProtocolError::TrailersUnsupported);
    }
    let mut head = ResponseHead::new(StatusCode::from_u16(status)?);
    for (name, value) in headers.iter() {
        if !is_valid_header(name, value) {
            return Err(ProtocolError::InvalidHeader {
                name: name.to_owned(),
            });
        }
        head.add_header(name, value);
    }
    Ok(head)
}

/// Field names must be tokens other than `Status`, which the CGI head
/// reserves; values must not break the line structure.
fn is_valid_header(name: &str, value: &str) -> bool {
    !name.is_empty()
        && !name.eq_ignore_ascii_case("status")
        && name.bytes().all(|b| b.is_ascii_graphic() && b != b':')
        && !value.bytes().any(|b| matches!(b, b'\r' | b'\n' | b'\0'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn streaming(exchange: &Exchange) -> Option<(&ResponseHead, &[u8])> {
        match exchange {
            Exchange::Streaming { head, body } => Some((head, &body[..])),
            Exchange::AwaitingStart => None,
        }
    }

    #[test]
    fn start_then_chunks() {
        let mut exchange = Exchange::AwaitingStart;
        let start = SendEvent::start(201, [("content-type", "text/plain")]);
        assert_eq!(exchange.apply(start), Ok(Step::Continue));
        assert_eq!(exchange.apply(SendEvent::chunk("A")), Ok(Step::Continue));
        assert_eq!(exchange.apply(SendEvent::body("B")), Ok(Step::Complete));

        let (head, body) = streaming(&exchange).unwrap();
        assert_eq!(head.status(), StatusCode::CREATED);
        assert_eq!(body, b"AB");

        let (head, body) = exchange.into_response().unwrap();
        assert_eq!(head.headers().get("content-type"), Some("text/plain"));
        assert_eq!(body, "AB");
    }

    #[test]
    fn body_before_start() {
        let mut exchange = Exchange::AwaitingStart;
        assert_eq!(
            exchange.apply(SendEvent::body("leak")),
            Err(ProtocolError::BodyBeforeStart)
        );
        assert!(exchange.into_response().is_none());
    }

    #[test]
    fn second_start_is_rejected() {
        let mut exchange = Exchange::AwaitingStart;
        exchange.apply(SendEvent::start(200, Headers::new())).unwrap();
        assert_eq!(
            exchange.apply(SendEvent::start(404, Headers::new())),
            Err(ProtocolError::DuplicateStart)
        );
    }

    #[test]
    fn unknown_event_in_either_state() {
        let other = || SendEvent::Other {
            kind: "http.response.trailers".into(),
        };
        let expected = Err(ProtocolError::UnrecognizedEvent {
            kind: "http.response.trailers".into(),
        });

        let mut exchange = Exchange::AwaitingStart;
        assert_eq!(exchange.apply(other()), expected);

        exchange.apply(SendEvent::start(200, Headers::new())).unwrap();
        assert_eq!(exchange.apply(other()), expected);
    }

    #[test]
    fn start_is_validated() {
        let mut exchange = Exchange::AwaitingStart;
        assert_eq!(
            exchange.apply(SendEvent::start(42, Headers::new())),
            Err(ProtocolError::InvalidStatus(InvalidStatusCode(42)))
        );
        assert_eq!(
            exchange.apply(SendEvent::ResponseStart {
                status: 200,
                headers: Headers::new(),
                trailers: true,
            }),
            Err(ProtocolError::TrailersUnsupported)
        );
        assert!(streaming(&exchange).is_none());
    }

    #[test]
    fn header_validation() {
        assert!(is_valid_header("content-type", "text/plain"));
        assert!(is_valid_header("x-empty", ""));
        assert!(!is_valid_header("", "v"));
        assert!(!is_valid_header("bad name", "v"));
        assert!(!is_valid_header("x:y", "v"));
        assert!(!is_valid_header("Status", "200 OK"));
        assert!(!is_valid_header("x-inject", "a\r\nset-cookie: evil=1"));
    }
}
