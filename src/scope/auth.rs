//! Reconstruction of the `authorization` header.
//!
//! Servers commonly keep `Authorization` out of the `HTTP_*` variables when
//! running CGI programs. Depending on the setup the credentials then arrive as
//! decoded basic-auth variables, as raw digest credentials, or as a value an
//! operator forwarded through a rewrite rule.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use super::Environ;
use crate::config::AuthVariables;

/// Returns the `authorization` value to synthesize, if any.
///
/// Precedence, first match wins:
/// 1. basic-auth user (password defaults to empty) as `Basic <base64>`;
/// 2. raw digest credentials;
/// 3. the first forwarded raw value present.
pub(crate) fn reconstruct(env: &Environ, vars: &AuthVariables) -> Option<String> {
    if let Some(user) = env.get(&vars.user) {
        let password = env.get(&vars.password).unwrap_or("");
        let credentials = STANDARD.encode(format!("{user}:{password}"));
        return Some(format!("Basic {credentials}"));
    }

    if let Some(digest) = env.get(&vars.digest) {
        return Some(digest.to_owned());
    }

    vars.forwarded
        .iter()
        .find_map(|name| env.get(name))
        .map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reconstruct_from(pairs: &[(&str, &str)]) -> Option<String> {
        let env: Environ = pairs.iter().copied().collect();
        reconstruct(&env, &AuthVariables::default())
    }

    #[test]
    fn basic_credentials() {
        assert_eq!(
            reconstruct_from(&[("AUTH_USER", "alice"), ("AUTH_PASSWORD", "secret")]),
            Some("Basic YWxpY2U6c2VjcmV0".to_owned())
        );
    }

    #[test]
    fn basic_password_defaults_to_empty() {
        // base64("bob:")
        assert_eq!(
            reconstruct_from(&[("AUTH_USER", "bob")]),
            Some("Basic Ym9iOg==".to_owned())
        );
    }

    #[test]
    fn digest_passes_through() {
        let digest = r#"Digest username="alice", realm="x", nonce="abc""#;
        assert_eq!(
            reconstruct_from(&[("AUTH_DIGEST", digest)]),
            Some(digest.to_owned())
        );
    }

    #[test]
    fn basic_beats_digest_and_forwarded() {
        let value = reconstruct_from(&[
            ("REDIRECT_HTTP_AUTHORIZATION", "Bearer forwarded"),
            ("AUTH_DIGEST", "Digest x"),
            ("AUTH_USER", "alice"),
        ]);
        assert_eq!(value, Some("Basic YWxpY2U6".to_owned()));
    }

    #[test]
    fn digest_beats_forwarded() {
        let value = reconstruct_from(&[
            ("REDIRECT_HTTP_AUTHORIZATION", "Bearer forwarded"),
            ("AUTH_DIGEST", "Digest x"),
        ]);
        assert_eq!(value, Some("Digest x".to_owned()));
    }

    #[test]
    fn forwarded_primary_before_redirect() {
        let value = reconstruct_from(&[
            ("REDIRECT_HTTP_AUTHORIZATION", "Bearer second"),
            ("HTTP_AUTHORIZATION", "Bearer first"),
        ]);
        assert_eq!(value, Some("Bearer first".to_owned()));
        assert_eq!(
            reconstruct_from(&[("REDIRECT_HTTP_AUTHORIZATION", "Bearer second")]),
            Some("Bearer second".to_owned())
        );
    }

    #[test]
    fn nothing_to_reconstruct() {
        assert_eq!(reconstruct_from(&[("AUTH_PASSWORD", "orphan")]), None);
    }
}
