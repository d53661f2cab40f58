//! Adapter configuration.
//!
//! Everything has a sensible default; [`Config::default`] is what
//! [`serve`](crate::server::serve) uses.

use std::time::Duration;

use crate::context::Context;

/// Maximum request body the adapter will read into memory (8 MiB).
pub const DEFAULT_MAX_BODY_SIZE: usize = 8 * 1024 * 1024;

/// How long the handler may keep running once its response is out (5 s).
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Names of the meta-variables consulted when reconstructing the
/// `authorization` header.
///
/// Some servers strip `Authorization` from the `HTTP_*` set and hand the
/// decoded credentials over in dedicated variables instead. The defaults
/// match the variables IIS exposes plus the Apache rewrite workaround
/// (`RewriteRule ^ - [E=HTTP_AUTHORIZATION:%{HTTP:Authorization}]`), whose
/// value shows up under a `REDIRECT_` prefix after an internal redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthVariables {
    /// Basic-auth user name.
    pub user: String,
    /// Basic-auth password; an absent password is encoded as empty.
    pub password: String,
    /// Raw digest credentials, passed through unchanged.
    pub digest: String,
    /// Raw `Authorization` values, checked in order.
    pub forwarded: Vec<String>,
}

impl Default for AuthVariables {
    fn default() -> Self {
        Self {
            user: "AUTH_USER".to_owned(),
            password: "AUTH_PASSWORD".to_owned(),
            digest: "AUTH_DIGEST".to_owned(),
            forwarded: vec![
                "HTTP_AUTHORIZATION".to_owned(),
                "REDIRECT_HTTP_AUTHORIZATION".to_owned(),
            ],
        }
    }
}

/// Settings for a single request/response exchange.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use cgi_bridge::config::Config;
///
/// let config = Config::new()
///     .max_body_size(1024)
///     .handler_timeout(Duration::from_secs(30));
/// assert_eq!(config.max_body(), 1024);
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    max_body_size: usize,
    handler_timeout: Option<Duration>,
    drain_timeout: Duration,
    auth: AuthVariables,
    context: Context,
}

impl Config {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the largest request body accepted; larger requests get a `413`.
    #[must_use]
    pub fn max_body_size(mut self, bytes: usize) -> Self {
        self.max_body_size = bytes;
        self
    }

    /// Bounds the time the handler may take to finish its response.
    #[must_use]
    pub fn handler_timeout(mut self, timeout: Duration) -> Self {
        self.handler_timeout = Some(timeout);
        self
    }

    /// Bounds the time the handler may keep running after its response has
    /// been written, e.g. to observe the disconnect. The process exits, and
    /// stdout closes, only once this phase ends.
    #[must_use]
    pub fn drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    /// Overrides the meta-variables used to rebuild `authorization`.
    #[must_use]
    pub fn auth_variables(mut self, auth: AuthVariables) -> Self {
        self.auth = auth;
        self
    }

    /// Sets the process-wide context handed to every handler.
    #[must_use]
    pub fn context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }

    pub fn max_body(&self) -> usize {
        self.max_body_size
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.handler_timeout
    }

    pub fn drain_limit(&self) -> Duration {
        self.drain_timeout
    }

    pub fn auth(&self) -> &AuthVariables {
        &self.auth
    }

    pub fn handler_context(&self) -> &Context {
        &self.context
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            handler_timeout: None,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
            auth: AuthVariables::default(),
            context: Context::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.max_body(), DEFAULT_MAX_BODY_SIZE);
        assert_eq!(config.timeout(), None);
        assert_eq!(config.drain_limit(), DEFAULT_DRAIN_TIMEOUT);
        assert_eq!(config.auth().forwarded.len(), 2);
        assert_eq!(config.handler_context(), &Context::default());
    }

    #[test]
    fn builder_overrides() {
        let auth = AuthVariables {
            user: "REMOTE_USER".into(),
            ..AuthVariables::default()
        };
        let config = Config::new()
            .max_body_size(10)
            .handler_timeout(Duration::from_millis(5))
            .drain_timeout(Duration::from_millis(7))
            .auth_variables(auth)
            .context(Context::new().version("2.0"));
        assert_eq!(config.max_body(), 10);
        assert_eq!(config.timeout(), Some(Duration::from_millis(5)));
        assert_eq!(config.drain_limit(), Duration::from_millis(7));
        assert_eq!(config.auth().user, "REMOTE_USER");
        assert_eq!(config.handler_context().interface_version(), Some("2.0"));
    }
}
