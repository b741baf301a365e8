//! Token verification boundary.
//!
//! Grounded on `examples/original_source/app/auth/middleware.py`: the shape
//! of `TokenInfo` (group membership) and the invalid/missing-token error
//! split survive, but no JWT parsing or signature verification lives here —
//! per SPEC_FULL.md §3, that is delegated to a `TokenVerifier` the operator
//! supplies, keeping this crate free of a crypto/JWKS dependency.

use serde_json::{json, Value};

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid or expired token")]
    InvalidToken { reason: String },
    #[error("permission denied: {message}")]
    PermissionDenied { message: String },
}

impl AuthError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidToken { .. } => "AUTH_ERROR",
            Self::PermissionDenied { .. } => "PERMISSION_DENIED",
        }
    }

    pub fn details(&self) -> Value {
        match self {
            Self::InvalidToken { reason } => json!({ "reason": reason }),
            Self::PermissionDenied { message } => json!({ "message": message }),
        }
    }
}

/// Group membership resolved from a bearer token.
#[derive(Debug, Clone, Default)]
pub struct TokenInfo {
    pub groups: Vec<String>,
}

impl TokenInfo {
    /// First element of `groups`, or `None` for an anonymous/groupless token.
    pub fn primary_group(&self) -> Option<&str> {
        self.groups.first().map(String::as_str)
    }
}

/// The JWT boundary. Production deployments supply their own implementation
/// backed by whatever JWKS/secret store the operator already runs; this
/// crate ships only test/dev implementations below.
pub trait TokenVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<TokenInfo, AuthError>;
}

/// Fixed group membership regardless of the token value. Useful for local
/// runs and tests where a real identity provider isn't available.
pub struct StaticTokenVerifier {
    groups: Vec<String>,
}

impl StaticTokenVerifier {
    pub fn new(groups: Vec<String>) -> Self {
        Self { groups }
    }
}

impl TokenVerifier for StaticTokenVerifier {
    fn verify(&self, _token: &str) -> Result<TokenInfo, AuthError> {
        Ok(TokenInfo {
            groups: self.groups.clone(),
        })
    }
}

/// Treats every caller as anonymous (group-null), regardless of token.
/// This is how the crate realizes "auth disabled process-wide" (§4.J).
pub struct NullTokenVerifier;

impl TokenVerifier for NullTokenVerifier {
    fn verify(&self, _token: &str) -> Result<TokenInfo, AuthError> {
        Ok(TokenInfo { groups: Vec::new() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_verifier_returns_fixed_groups() {
        let verifier = StaticTokenVerifier::new(vec!["apac".to_string(), "emea".to_string()]);
        let info = verifier.verify("anything").unwrap();
        assert_eq!(info.primary_group(), Some("apac"));
    }

    #[test]
    fn null_verifier_is_anonymous() {
        let info = NullTokenVerifier.verify("whatever").unwrap();
        assert_eq!(info.primary_group(), None);
    }

    #[test]
    fn empty_groups_has_no_primary_group() {
        let info = TokenInfo::default();
        assert_eq!(info.primary_group(), None);
    }
}
