// Shared-secret bearer authentication for the reminder trigger endpoints

use crate::errors::AuthError;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;
use tracing::{debug, instrument, warn};

type HmacSha256 = Hmac<Sha256>;

/// Verifies `Authorization: Bearer <token>` against the configured cron secret
///
/// The token and the secret are both passed through HMAC-SHA256 keyed with the
/// secret, and the two tags are compared with `verify_slice`. The comparison
/// therefore runs in constant time and does not leak the secret's length.
#[derive(Clone)]
pub struct CronAuth {
    secret: String,
}

impl fmt::Debug for CronAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CronAuth").field("secret", &"<redacted>").finish()
    }
}

impl CronAuth {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Constant-time comparison of a presented token with the secret
    pub fn token_matches(&self, token: &str) -> bool {
        if self.secret.is_empty() {
            return false;
        }

        let key = self.secret.as_bytes();
        let (Ok(mut expected), Ok(mut presented)) = (
            HmacSha256::new_from_slice(key),
            HmacSha256::new_from_slice(key),
        ) else {
            return false;
        };

        expected.update(key);
        let expected = expected.finalize().into_bytes();

        presented.update(token.as_bytes());
        presented.verify_slice(&expected).is_ok()
    }

    /// Validate a raw `Authorization` header value
    #[instrument(skip_all)]
    pub fn verify_header(&self, header: Option<&str>) -> Result<(), AuthError> {
        let header = header.ok_or_else(|| {
            debug!("Missing Authorization header");
            AuthError::MissingToken
        })?;

        let token = header.strip_prefix("Bearer ").ok_or_else(|| {
            warn!("Invalid Authorization header format");
            AuthError::MalformedHeader
        })?;

        if self.token_matches(token) {
            Ok(())
        } else {
            warn!("Rejected cron request with wrong bearer token");
            Err(AuthError::InvalidToken)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_matching_bearer_is_accepted() {
        let auth = CronAuth::new("s3cret");
        assert!(auth.verify_header(Some("Bearer s3cret")).is_ok());
    }

    #[test]
    fn test_missing_header_is_rejected() {
        let auth = CronAuth::new("s3cret");
        assert!(matches!(auth.verify_header(None), Err(AuthError::MissingToken)));
    }

    #[test]
    fn test_non_bearer_scheme_is_rejected() {
        let auth = CronAuth::new("s3cret");
        assert!(matches!(
            auth.verify_header(Some("Basic s3cret")),
            Err(AuthError::MalformedHeader)
        ));
    }

    #[test]
    fn test_wrong_token_is_rejected() {
        let auth = CronAuth::new("s3cret");
        assert!(matches!(
            auth.verify_header(Some("Bearer s3cre")),
            Err(AuthError::InvalidToken)
        ));
        assert!(matches!(
            auth.verify_header(Some("Bearer s3cret-and-more")),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn test_padded_token_is_rejected() {
        let auth = CronAuth::new("s3cret");
        for header in ["Bearer  s3cret", "Bearer s3cret ", "Bearer  s3cret  ", "Bearer s3cret\t"] {
            assert!(
                matches!(auth.verify_header(Some(header)), Err(AuthError::InvalidToken)),
                "accepted {:?}",
                header
            );
        }
    }

    #[test]
    fn test_empty_secret_accepts_nothing() {
        let auth = CronAuth::new("");
        assert!(!auth.token_matches(""));
        assert!(auth.verify_header(Some("Bearer ")).is_err());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let auth = CronAuth::new("s3cret");
        assert!(!format!("{:?}", auth).contains("s3cret"));
    }

    proptest! {
        #[test]
        fn prop_only_the_secret_matches(secret in "[a-zA-Z0-9]{1,40}", token in "[a-zA-Z0-9]{0,40}") {
            let auth = CronAuth::new(secret.clone());
            prop_assert_eq!(auth.token_matches(&token), token == secret);
            prop_assert!(auth.token_matches(&secret));
        }
    }
}
