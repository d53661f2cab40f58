//! The ambient request metadata handed over by the web server.

use tracing::warn;

use super::ScopeError;

/// An ordered snapshot of CGI meta-variables.
///
/// Order matters: request headers are emitted in the order the server
/// enumerated their `HTTP_*` variables.
///
/// # Examples
///
/// ```
/// use cgi_bridge::scope::Environ;
///
/// let env: Environ = [("REQUEST_METHOD", "GET"), ("QUERY_STRING", "")]
///     .into_iter()
///     .collect();
/// assert_eq!(env.get("REQUEST_METHOD"), Some("GET"));
/// assert_eq!(env.get("QUERY_STRING"), Some(""));
/// assert_eq!(env.get("PATH_INFO"), None);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Environ {
    vars: Vec<(String, String)>,
}

impl Environ {
    /// Snapshots the current process environment.
    ///
    /// Variables whose name or value is not valid UTF-8 are skipped.
    pub fn from_process() -> Self {
        std::env::vars_os()
            .filter_map(|(name, value)| match (name.into_string(), value.into_string()) {
                (Ok(name), Ok(value)) => Some((name, value)),
                (name, _) => {
                    warn!(
                        variable = %name.unwrap_or_else(|raw| raw.to_string_lossy().into_owned()),
                        "skipping non UTF-8 environment variable"
                    );
                    None
                }
            })
            .collect()
    }

    /// Returns the value of the first variable with exactly this name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Returns the value of a variable that must be present.
    pub fn require(&self, name: &'static str) -> Result<&str, ScopeError> {
        self.get(name).ok_or(ScopeError::MissingVariable { name })
    }

    /// Returns the value of a variable that must be present and non-empty.
    pub fn require_non_empty(&self, name: &'static str) -> Result<&str, ScopeError> {
        match self.require(name)? {
            "" => Err(ScopeError::EmptyVariable { name }),
            value => Ok(value),
        }
    }

    /// Iterates over all `(name, value)` pairs in enumeration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

impl<N, V> FromIterator<(N, V)> for Environ
where
    N: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        Self {
            vars: iter
                .into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        }
    }
}
