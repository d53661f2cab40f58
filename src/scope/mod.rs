//! Request scope extraction from CGI meta-variables.
//!
//! A [`Scope`] is the immutable description of one HTTP request: method,
//! path, query string, headers and connection endpoints. It is built once per
//! request by [`Scope::from_environ`] and shared read-only with the handler.
//!
//! | Field          | Source                                                     |
//! |----------------|------------------------------------------------------------|
//! | `http_version` | `SERVER_PROTOCOL`                                          |
//! | `method`       | `REQUEST_METHOD`                                           |
//! | `scheme`       | `HTTPS`, then `REQUEST_SCHEME`                             |
//! | `path`         | `REQUEST_URI` up to the first `?`                          |
//! | `raw_path`     | `ORIG_PATH_INFO`, else `SCRIPT_NAME` + `PATH_INFO`         |
//! | `query_string` | `QUERY_STRING` (never derived from the URI)                |
//! | `root_path`    | `DOCUMENT_ROOT`                                            |
//! | `headers`      | `HTTP_*`, `CONTENT_TYPE`, `CONTENT_LENGTH`, `CONTENT_MD5`  |
//! | `client`       | `REMOTE_ADDR`, `REMOTE_PORT`                               |
//! | `server`       | `SERVER_ADDR` (or `SERVER_NAME`), `SERVER_PORT`            |

use serde::{Serialize, Serializer};
use thiserror::Error;
use tracing::debug;

use crate::config::AuthVariables;
use crate::http::{Headers, HttpVersion, InvalidVersion, Method};

mod auth;
pub mod environ;

pub use environ::Environ;

/// Prefix of meta-variables that carry request header fields.
const HEADER_PREFIX: &str = "HTTP_";

/// Body-related fields some servers report outside the `HTTP_*` namespace.
const PROMOTED_HEADERS: [&str; 3] = ["CONTENT_TYPE", "CONTENT_LENGTH", "CONTENT_MD5"];

/// Errors raised while building a [`Scope`].
#[derive(Debug, Error)]
pub enum ScopeError {
    #[error("required meta-variable {name} is not set")]
    MissingVariable { name: &'static str },

    #[error("required meta-variable {name} is empty")]
    EmptyVariable { name: &'static str },

    #[error(transparent)]
    InvalidProtocol(#[from] InvalidVersion),
}

/// The kind of exchange a scope describes. Only HTTP is implemented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeKind {
    Http,
}

/// A connection endpoint: host address and, when known, port.
///
/// Serializes as `[host, port]` with `port` possibly `null`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: Option<u16>,
}

impl Endpoint {
    fn from_environ(env: &Environ, host_vars: &[&str], port_var: &str) -> Option<Self> {
        let host = host_vars.iter().find_map(|name| env.get(name))?;
        let port = env.get(port_var).and_then(|raw| match raw.parse::<u16>() {
            Ok(port) => Some(port),
            Err(_) => {
                debug!(variable = port_var, value = raw, "ignoring non-numeric port");
                None
            }
        });
        Some(Self {
            host: host.to_owned(),
            port,
        })
    }
}

impl Serialize for Endpoint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        (&self.host, self.port).serialize(serializer)
    }
}

/// Immutable description of a single HTTP request.
///
/// # Examples
///
/// ```
/// use cgi_bridge::config::AuthVariables;
/// use cgi_bridge::scope::{Environ, Scope};
///
/// let env: Environ = [
///     ("SERVER_PROTOCOL", "HTTP/1.1"),
///     ("REQUEST_METHOD", "GET"),
///     ("REQUEST_URI", "/hello?name=world"),
///     ("QUERY_STRING", "name=world"),
///     ("SCRIPT_NAME", "/hello"),
///     ("HTTP_ACCEPT_LANGUAGE", "en"),
/// ]
/// .into_iter()
/// .collect();
///
/// let scope = Scope::from_environ(&env, &AuthVariables::default()).unwrap();
/// assert_eq!(scope.path(), "/hello");
/// assert_eq!(scope.query_string(), "name=world");
/// assert_eq!(scope.headers().get("accept-language"), Some("en"));
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct Scope {
    #[serde(rename = "type")]
    kind: ScopeKind,
    http_version: HttpVersion,
    method: Method,
    scheme: String,
    path: String,
    raw_path: String,
    query_string: String,
    root_path: String,
    headers: Headers,
    client: Option<Endpoint>,
    server: Option<Endpoint>,
}

impl Scope {
    /// Builds the scope for the request described by `env`.
    ///
    /// # Errors
    ///
    /// - [`ScopeError::MissingVariable`] — a required meta-variable is absent.
    /// - [`ScopeError::EmptyVariable`] — `REQUEST_METHOD`, `REQUEST_URI` or the
    ///   raw path variables are empty.
    /// - [`ScopeError::InvalidProtocol`] — `SERVER_PROTOCOL` is not `HTTP/<version>`.
    pub fn from_environ(env: &Environ, auth: &AuthVariables) -> Result<Self, ScopeError> {
        let http_version: HttpVersion = env.require("SERVER_PROTOCOL")?.parse()?;

        let method: Method = env
            .require_non_empty("REQUEST_METHOD")?
            .parse()
            .unwrap_or_else(|never: std::convert::Infallible| match never {});

        let uri = env.require_non_empty("REQUEST_URI")?;
        let path = match uri.split_once('?') {
            Some((path, _)) => path,
            None => uri,
        };
        if path.is_empty() {
            return Err(ScopeError::EmptyVariable {
                name: "REQUEST_URI",
            });
        }

        Ok(Self {
            kind: ScopeKind::Http,
            http_version,
            method,
            scheme: scheme(env).to_owned(),
            path: path.to_owned(),
            raw_path: raw_path(env)?,
            query_string: env.require("QUERY_STRING")?.to_owned(),
            root_path: env.get("DOCUMENT_ROOT").unwrap_or_default().to_owned(),
            headers: headers(env, auth),
            client: Endpoint::from_environ(env, &["REMOTE_ADDR"], "REMOTE_PORT"),
            server: Endpoint::from_environ(env, &["SERVER_ADDR", "SERVER_NAME"], "SERVER_PORT"),
        })
    }

    pub fn kind(&self) -> ScopeKind {
        self.kind
    }

    pub fn http_version(&self) -> HttpVersion {
        self.http_version
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns `"https"` or `"http"`.
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Returns the request path without the query string.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn raw_path(&self) -> &str {
        &self.raw_path
    }

    /// Returns the query string exactly as the server reported it.
    pub fn query_string(&self) -> &str {
        &self.query_string
    }

    /// Returns the server's document root; advisory, possibly empty.
    pub fn root_path(&self) -> &str {
        &self.root_path
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn client(&self) -> Option<&Endpoint> {
        self.client.as_ref()
    }

    pub fn server(&self) -> Option<&Endpoint> {
        self.server.as_ref()
    }

    /// Returns the declared request body length.
    ///
    /// `None` if no `content-length` was sent or it is blank (servers such as
    /// nginx pass `CONTENT_LENGTH=""` for body-less requests); `Some(Err(_))`
    /// if it is not a decimal number.
    pub fn content_length(&self) -> Option<Result<usize, std::num::ParseIntError>> {
        self.headers
            .get("content-length")
            .map(str::trim)
            .filter(|raw| !raw.is_empty())
            .map(str::parse)
    }

    /// Renders the scope as a JSON object.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

fn scheme(env: &Environ) -> &'static str {
    match env.get("HTTPS") {
        Some(flag) if !flag.is_empty() && !flag.eq_ignore_ascii_case("off") => "https",
        _ => match env.get("REQUEST_SCHEME") {
            Some(s) if s.eq_ignore_ascii_case("https") => "https",
            _ => "http",
        },
    }
}

fn raw_path(env: &Environ) -> Result<String, ScopeError> {
    if let Some(orig) = env.get("ORIG_PATH_INFO").filter(|v| !v.is_empty()) {
        return Ok(orig.to_owned());
    }
    let script = env.require("SCRIPT_NAME")?;
    let raw = format!("{script}{}", env.get("PATH_INFO").unwrap_or_default());
    if raw.is_empty() {
        return Err(ScopeError::EmptyVariable {
            name: "SCRIPT_NAME",
        });
    }
    Ok(raw)
}

/// `HTTP_ACCEPT_LANGUAGE` → `accept-language`.
fn header_name(variable: &str) -> String {
    variable.replace('_', "-").to_ascii_lowercase()
}

fn headers(env: &Environ, auth: &AuthVariables) -> Headers {
    let mut headers = Headers::with_capacity(env.len());
    for (name, value) in env.iter() {
        if let Some(field) = name.strip_prefix(HEADER_PREFIX) {
            if field.is_empty() {
                continue;
            }
            headers.insert(header_name(field), value);
        } else if PROMOTED_HEADERS.contains(&name) {
            headers.insert(header_name(name), value);
        }
    }

    if !headers.contains("authorization") {
        if let Some(value) = auth::reconstruct(env, auth) {
            debug!("reconstructed authorization header");
            headers.insert("authorization", value);
        }
    }

    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Vec<(&'static str, &'static str)> {
        vec![
            ("SERVER_PROTOCOL", "HTTP/1.1"),
            ("REQUEST_METHOD", "GET"),
            ("REQUEST_URI", "/a/b?x=1"),
            ("QUERY_STRING", "y=2"),
            ("SCRIPT_NAME", "/index.cgi"),
        ]
    }

    fn scope_with(extra: &[(&'static str, &'static str)]) -> Result<Scope, ScopeError> {
        let env: Environ = base().into_iter().chain(extra.iter().copied()).collect();
        Scope::from_environ(&env, &AuthVariables::default())
    }

    fn scope_without(missing: &str) -> Result<Scope, ScopeError> {
        let env: Environ = base().into_iter().filter(|(k, _)| *k != missing).collect();
        Scope::from_environ(&env, &AuthVariables::default())
    }

    #[test]
    fn path_and_query_are_sourced_independently() {
        let scope = scope_with(&[]).unwrap();
        assert_eq!(scope.path(), "/a/b");
        assert_eq!(scope.query_string(), "y=2");
    }

    #[test]
    fn header_names_are_normalized() {
        let scope = scope_with(&[
            ("HTTP_HOST", "example.com"),
            ("HTTP_X_FORWARDED_FOR", "10.0.0.1"),
            ("CONTENT_TYPE", "application/json"),
            ("CONTENT_LENGTH", "2"),
            ("CONTENT_MD5", "Q2hlY2s="),
            ("PATH", "/usr/bin"),
        ])
        .unwrap();
        let pairs: Vec<_> = scope.headers().iter().collect();
        assert_eq!(
            pairs,
            vec![
                ("host", "example.com"),
                ("x-forwarded-for", "10.0.0.1"),
                ("content-type", "application/json"),
                ("content-length", "2"),
                ("content-md5", "Q2hlY2s="),
            ]
        );
        assert!(
            scope
                .headers()
                .iter()
                .all(|(name, _)| !name.contains('_') && name == name.to_ascii_lowercase())
        );
    }

    #[test]
    fn duplicate_header_variables_are_kept() {
        let scope = scope_with(&[("HTTP_X_TAG", "a"), ("HTTP_X_TAG", "b")]).unwrap();
        let tags: Vec<_> = scope.headers().get_all("x-tag").collect();
        assert_eq!(tags, vec!["a", "b"]);
    }

    #[test]
    fn generic_authorization_is_not_duplicated() {
        let scope = scope_with(&[
            ("HTTP_AUTHORIZATION", "Bearer direct"),
            ("AUTH_USER", "alice"),
        ])
        .unwrap();
        let values: Vec<_> = scope.headers().get_all("authorization").collect();
        assert_eq!(values, vec!["Bearer direct"]);
    }

    #[test]
    fn authorization_reconstructed_when_withheld() {
        let scope = scope_with(&[("REDIRECT_HTTP_AUTHORIZATION", "Bearer t0k3n")]).unwrap();
        assert_eq!(scope.headers().get("authorization"), Some("Bearer t0k3n"));

        let scope = scope_with(&[]).unwrap();
        assert!(!scope.headers().contains("authorization"));
    }

    #[test]
    fn version_is_parsed_structurally() {
        let scope = scope_with(&[]).unwrap();
        assert_eq!(scope.http_version(), HttpVersion::Http11);

        let env: Environ = base()
            .into_iter()
            .map(|(k, v)| if k == "SERVER_PROTOCOL" { (k, "INCLUDED") } else { (k, v) })
            .collect();
        let err = Scope::from_environ(&env, &AuthVariables::default()).unwrap_err();
        assert!(matches!(err, ScopeError::InvalidProtocol(_)));
        assert!(err.to_string().contains("INCLUDED"));
    }

    #[test]
    fn missing_required_variables() {
        for name in [
            "SERVER_PROTOCOL",
            "REQUEST_METHOD",
            "REQUEST_URI",
            "QUERY_STRING",
            "SCRIPT_NAME",
        ] {
            match scope_without(name) {
                Err(ScopeError::MissingVariable { name: missing }) => assert_eq!(missing, name),
                other => panic!("expected missing {name}, got {other:?}"),
            }
        }
    }

    #[test]
    fn empty_method_is_rejected() {
        let env: Environ = base()
            .into_iter()
            .map(|(k, v)| if k == "REQUEST_METHOD" { (k, "") } else { (k, v) })
            .collect();
        assert!(matches!(
            Scope::from_environ(&env, &AuthVariables::default()),
            Err(ScopeError::EmptyVariable {
                name: "REQUEST_METHOD"
            })
        ));
    }

    #[test]
    fn raw_path_prefers_orig_path_info() {
        let scope = scope_with(&[("PATH_INFO", "/x")]).unwrap();
        assert_eq!(scope.raw_path(), "/index.cgi/x");

        let scope = scope_with(&[("ORIG_PATH_INFO", "/orig"), ("PATH_INFO", "/x")]).unwrap();
        assert_eq!(scope.raw_path(), "/orig");
    }

    #[test]
    fn scheme_detection() {
        assert_eq!(scope_with(&[]).unwrap().scheme(), "http");
        assert_eq!(scope_with(&[("HTTPS", "on")]).unwrap().scheme(), "https");
        assert_eq!(scope_with(&[("HTTPS", "off")]).unwrap().scheme(), "http");
        assert_eq!(scope_with(&[("HTTPS", "")]).unwrap().scheme(), "http");
        assert_eq!(
            scope_with(&[("REQUEST_SCHEME", "https")]).unwrap().scheme(),
            "https"
        );
    }

    #[test]
    fn endpoints() {
        let scope = scope_with(&[
            ("REMOTE_ADDR", "192.0.2.7"),
            ("REMOTE_PORT", "51234"),
            ("SERVER_NAME", "example.com"),
            ("SERVER_PORT", "not-a-port"),
        ])
        .unwrap();
        assert_eq!(
            scope.client(),
            Some(&Endpoint {
                host: "192.0.2.7".into(),
                port: Some(51234)
            })
        );
        assert_eq!(
            scope.server(),
            Some(&Endpoint {
                host: "example.com".into(),
                port: None
            })
        );
        assert_eq!(scope_with(&[]).unwrap().client(), None);
    }

    #[test]
    fn json_shape() {
        let scope = scope_with(&[
            ("HTTP_HOST", "example.com"),
            ("REMOTE_ADDR", "127.0.0.1"),
            ("REMOTE_PORT", "4000"),
            ("DOCUMENT_ROOT", "/srv/www"),
        ])
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&scope.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "type": "http",
                "http_version": "1.1",
                "method": "GET",
                "scheme": "http",
                "path": "/a/b",
                "raw_path": "/index.cgi",
                "query_string": "y=2",
                "root_path": "/srv/www",
                "headers": [["host", "example.com"]],
                "client": ["127.0.0.1", 4000],
                "server": null,
            })
        );
    }

    #[test]
    fn content_length() {
        assert!(scope_with(&[]).unwrap().content_length().is_none());
        let scope = scope_with(&[("CONTENT_LENGTH", "12")]).unwrap();
        assert_eq!(scope.content_length(), Some(Ok(12)));
        let scope = scope_with(&[("CONTENT_LENGTH", "twelve")]).unwrap();
        assert!(matches!(scope.content_length(), Some(Err(_))));
    }

    #[test]
    fn blank_content_length_means_no_body() {
        for blank in ["", "  "] {
            let scope = scope_with(&[("CONTENT_LENGTH", blank)]).unwrap();
            assert_eq!(scope.content_length(), None);
        }
    }

    #[test]
    fn bare_header_prefix_is_skipped() {
        let scope = scope_with(&[("HTTP_", "orphan"), ("HTTP_HOST", "example.com")]).unwrap();
        let pairs: Vec<_> = scope.headers().iter().collect();
        assert_eq!(pairs, vec![("host", "example.com")]);
    }
}
