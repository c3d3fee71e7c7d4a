//! Shared-secret verification

use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::warn;

use crate::errors::AuthError;

/// Proof that a request passed verification.
///
/// Only [`SecretVerifier::authorize`] can construct one, so anything that
/// requires it cannot run before the secret check.
#[derive(Debug)]
pub struct Authorized {
    _private: (),
}

/// Verifies inbound secrets against the configured one
pub struct SecretVerifier {
    expected: Option<SecretString>,
}

impl SecretVerifier {
    pub fn new(expected: Option<SecretString>) -> Self {
        let expected = expected.filter(|s| !s.expose_secret().is_empty());
        if expected.is_none() {
            warn!("No shared secret configured, every request will be rejected");
        }
        Self { expected }
    }

    /// Check a provided secret. Fails closed.
    pub fn verify(&self, provided: Option<&str>) -> bool {
        self.authorize(provided).is_ok()
    }

    /// Check a provided secret and hand out the proof token on success
    pub fn authorize(&self, provided: Option<&str>) -> Result<Authorized, AuthError> {
        let expected = self.expected.as_ref().ok_or(AuthError::NotConfigured)?;
        let provided = provided.ok_or(AuthError::Missing)?;

        // Hashing first makes the comparison length-independent
        let expected_digest = Sha256::digest(expected.expose_secret().as_bytes());
        let provided_digest = Sha256::digest(provided.as_bytes());

        if bool::from(expected_digest.as_slice().ct_eq(provided_digest.as_slice())) {
            Ok(Authorized { _private: () })
        } else {
            Err(AuthError::Mismatch)
        }
    }
}

impl std::fmt::Debug for SecretVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretVerifier")
            .field("configured", &self.expected.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verifier(secret: &str) -> SecretVerifier {
        SecretVerifier::new(Some(SecretString::from(secret.to_string())))
    }

    #[test]
    fn test_matching_secret() {
        assert!(verifier("s3cret").verify(Some("s3cret")));
    }

    #[test]
    fn test_mismatch_and_missing() {
        let v = verifier("s3cret");
        assert!(!v.verify(Some("s3cres")));
        assert!(!v.verify(Some("s3cret-longer")));
        assert!(!v.verify(Some("")));
        assert_eq!(v.authorize(None).unwrap_err(), AuthError::Missing);
        assert_eq!(v.authorize(Some("nope")).unwrap_err(), AuthError::Mismatch);
    }

    #[test]
    fn test_fails_closed_without_configured_secret() {
        let v = SecretVerifier::new(None);
        assert_eq!(v.authorize(Some("")).unwrap_err(), AuthError::NotConfigured);

        let v = SecretVerifier::new(Some(SecretString::from(String::new())));
        assert!(!v.verify(Some("")));
    }

    #[test]
    fn test_debug_does_not_leak() {
        let rendered = format!("{:?}", verifier("hunter2"));
        assert!(!rendered.contains("hunter2"));
    }
}
