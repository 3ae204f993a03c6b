//! Login token validation.
//!
//! Stagehand doesn't validate credentials itself; the login server that
//! issued the token does. The [`Authenticator`] trait is the seam: the
//! connection handler calls it with the token from the `Login` request and
//! gets back the character the connection acts as.

use stagehand_protocol::CharId;

use crate::SessionError;

/// Resolves a login token to a character.
///
/// `Send + Sync + 'static` because one authenticator is shared by every
/// connection task for the life of the server.
pub trait Authenticator: Send + Sync + 'static {
    /// Validates `token` and returns the character it logs in as.
    ///
    /// # Errors
    /// [`SessionError::AuthFailed`] if the token is rejected.
    fn authenticate(
        &self,
        token: &str,
    ) -> impl std::future::Future<Output = Result<CharId, SessionError>> + Send;
}

/// Accepts any token that parses as a decimal character ID.
///
/// For local runs and tests only; it trusts the client completely.
#[derive(Debug, Clone, Copy, Default)]
pub struct DevAuthenticator;

impl Authenticator for DevAuthenticator {
    async fn authenticate(&self, token: &str) -> Result<CharId, SessionError> {
        token
            .trim()
            .parse::<u32>()
            .map(CharId)
            .map_err(|_| SessionError::AuthFailed(format!("token {token:?} is not a character id")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dev_authenticator_numeric_token_returns_char_id() {
        let id = DevAuthenticator.authenticate("1042").await.unwrap();
        assert_eq!(id, CharId(1042));
    }

    #[tokio::test]
    async fn test_dev_authenticator_garbage_token_fails() {
        let result = DevAuthenticator.authenticate("not-a-number").await;
        assert!(matches!(result, Err(SessionError::AuthFailed(_))));
    }
}
