//! # cgi-bridge
//!
//! Runs event-stream HTTP handlers (scope / receive / send) behind a
//! one-process-per-request CGI server.
//!
//! The web server describes the request in environment variables and pipes
//! the body to stdin; the handler sees an immutable [`Scope`], pulls the body
//! from a [`Receive`] and yields [`SendEvent`]s, which the adapter turns into
//! a CGI response on stdout.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use futures_util::stream;
//! use cgi_bridge::SendEvent;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), cgi_bridge::AdapterError> {
//!     cgi_bridge::serve(|scope, _receive, _ctx| {
//!         let greeting = format!("Hello from {}!", scope.path());
//!         stream::iter([
//!             SendEvent::start(200, [("content-type", "text/plain")]),
//!             SendEvent::body(greeting),
//!         ])
//!     })
//!     .await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod context;
pub mod http;
pub mod protocol;
pub mod scope;
pub mod server;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use config::Config;
pub use context::Context;
pub use http::{Headers, Method, StatusCode};
pub use protocol::{Receive, ReceiveEvent, SendEvent};
pub use scope::{Environ, Scope, ScopeError};
pub use server::{Adapter, AdapterError, Outcome, ProtocolError, serve, serve_with};
