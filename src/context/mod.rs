//! Process-wide handler context.
//!
//! The context is the request-independent half of what a handler receives:
//! the same value is handed to every exchange the process runs. It currently
//! carries nothing but the reserved protocol version identifiers, which stay
//! unset until version negotiation is implemented.

use serde::Serialize;

/// Static, request-independent configuration shared with every handler.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Context {
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    spec_version: Option<String>,
}

impl Context {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the interface version identifier.
    #[must_use]
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Sets the protocol specification version identifier.
    #[must_use]
    pub fn spec_version(mut self, spec_version: impl Into<String>) -> Self {
        self.spec_version = Some(spec_version.into());
        self
    }

    pub fn interface_version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn protocol_spec_version(&self) -> Option<&str> {
        self.spec_version.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_context_is_empty() {
        let json = serde_json::to_string(&Context::default()).unwrap();
        assert_eq!(json, "{}");
    }

    #[test]
    fn versions_are_exposed() {
        let ctx = Context::new().version("2.0").spec_version("2.3");
        assert_eq!(ctx.interface_version(), Some("2.0"));
        assert_eq!(ctx.protocol_spec_version(), Some("2.3"));
        let json = serde_json::to_string(&ctx).unwrap();
        assert_eq!(json, r#"{"version":"2.0","spec_version":"2.3"}"#);
    }
}
