//! Bearer-token verification at upgrade time.
//!
//! The auth/session provider is an external collaborator: it mints
//! short-lived bearer tokens and this seam validates them. Verification
//! runs inside the synchronous upgrade callback, so implementations must
//! be local CPU work (signature checks), not network calls.

use huddle_core::UserId;

/// The identity a valid token resolves to.
#[derive(Debug, Clone)]
pub struct AuthedUser {
    /// Authenticated user id.
    pub user_id: UserId,
    /// Display name.
    pub user_name: String,
}

/// Token verification failures.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// No token was supplied; the upgrade fails with 401.
    #[error("missing access token")]
    Missing,

    /// The token did not validate; the upgrade fails with 403.
    #[error("invalid access token")]
    Invalid,
}

/// Validates a bearer token and resolves the caller's identity.
pub trait TokenVerifier: Send + Sync {
    /// Verify `token`, returning the authenticated identity.
    fn verify(&self, token: &str) -> Result<AuthedUser, AuthError>;
}

/// Development verifier accepting `<user-uuid>:<display-name>` tokens.
///
/// For dev and test deployments only; production wires the platform's
/// token verifier through the same trait.
#[derive(Debug, Default, Clone)]
pub struct DevTokenVerifier;

impl TokenVerifier for DevTokenVerifier {
    fn verify(&self, token: &str) -> Result<AuthedUser, AuthError> {
        let (id, name) = token.split_once(':').ok_or(AuthError::Invalid)?;
        let user_id: UserId = id.parse().map_err(|_| AuthError::Invalid)?;
        if name.is_empty() {
            return Err(AuthError::Invalid);
        }
        Ok(AuthedUser { user_id, user_name: name.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dev_token_round_trip() {
        let user = UserId::new();
        let verified = DevTokenVerifier.verify(&format!("{user}:Ada")).unwrap();
        assert_eq!(verified.user_id, user);
        assert_eq!(verified.user_name, "Ada");
    }

    #[test]
    fn dev_token_rejects_garbage() {
        assert!(DevTokenVerifier.verify("nope").is_err());
        assert!(DevTokenVerifier.verify("not-a-uuid:Ada").is_err());
        assert!(DevTokenVerifier.verify(&format!("{}:", UserId::new())).is_err());
    }
}
