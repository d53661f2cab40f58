//! Echo CGI program: answers with the request line followed by the request body.
//!
//! Build with `cargo build --release --example echo` and install the binary as
//! a CGI script, e.g. `ScriptAlias /echo /usr/lib/cgi-bin/echo` for Apache.
//! Logs go to stderr; set `RUST_LOG=cgi_bridge=debug` for per-request detail.

use std::process::ExitCode;

use cgi_bridge::{Outcome, ReceiveEvent, SendEvent};
use futures_util::{StreamExt, stream};
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // stdout carries the response, so logs must not go there.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let result = cgi_bridge::serve(|scope, mut receive, _ctx| {
        let body = receive.body();

        let mut line = format!("{} {}", scope.method(), scope.path());
        if !scope.query_string().is_empty() {
            line.push('?');
            line.push_str(scope.query_string());
        }
        line.push('\n');

        let response = stream::iter([
            SendEvent::start(200, [("content-type", "text/plain; charset=utf-8")]),
            SendEvent::chunk(line),
            SendEvent::body(body),
        ]);

        // Runs once the response has been written out.
        let after = stream::once(async move {
            if matches!(receive.recv().await, ReceiveEvent::Disconnect) {
                debug!("response delivered");
            }
        })
        .filter_map(|()| async { None::<SendEvent> });

        response.chain(after)
    })
    .await;

    match result {
        Ok(Outcome::Completed { .. } | Outcome::Rejected { .. }) => ExitCode::SUCCESS,
        Ok(Outcome::Failed(violation)) => {
            error!(error = %violation, "echo handler failed");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!(error = %e, "cannot serve request");
            ExitCode::FAILURE
        }
    }
}
