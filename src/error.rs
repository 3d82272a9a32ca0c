//! Key and token error types.
//!
//! This module defines errors that can occur while fetching, caching and
//! using rotatable key pairs, and while signing or verifying tokens with
//! them.
//!
//! All variants are `Clone`: the cache records a failed fetch and yields the
//! same rejection reason to every caller until the retry gate opens, so the
//! stored error must be re-emittable verbatim.

use thiserror::Error;

/// Errors produced by the key caches and the token sign/verify binding.
///
/// # Non-exhaustive
///
/// This enum is marked `#[non_exhaustive]` — new variants may be added in
/// future minor releases without a semver-breaking change. Downstream match
/// expressions must include a wildcard arm (`_ =>`).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum KeyError {
    /// The backing store has no record for the requested key.
    #[error("key not found: {name}")]
    KeyNotFound {
        /// Name (or name/version identifier) that was not found.
        name: String,
    },

    /// The backing store could not be reached or failed transiently.
    ///
    /// Retryable: the cache records this failure and retries the fetch once
    /// the backoff gate opens.
    #[error("key store unavailable: {0}")]
    StoreUnavailable(String),

    /// The key material's validity window has already elapsed.
    ///
    /// Synthesized by the cache engine when a fetched value arrives already
    /// expired, and by the public key cache for versions whose (immutable)
    /// expiry has passed. For a public key version this condition is
    /// permanent — request a newer version instead of retrying.
    #[error("key expired: {0}")]
    KeyExpired(String),

    /// The token's declared key name differs from the requested name.
    ///
    /// Guards against cross-key confusion; raised before any store fetch.
    #[error("token declares key '{declared}', expected '{expected}'")]
    KeyMismatch {
        /// Key name embedded in the token's key identifier.
        declared: String,
        /// Key name the caller asked to verify against.
        expected: String,
    },

    /// Malformed token — cannot be decoded.
    #[error("invalid token format: {0}")]
    InvalidTokenFormat(String),

    /// Token has expired (per its own payload claims).
    #[error("token expired")]
    TokenExpired,

    /// Token not yet valid (`nbf` claim in the future).
    #[error("token not yet valid")]
    TokenNotYetValid,

    /// Signature verification failed.
    #[error("invalid signature")]
    InvalidSignature,

    /// Algorithm not supported for signing or verification.
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Key material could not be parsed (bad PEM, wrong key type).
    #[error("invalid key material: {0}")]
    InvalidKeyMaterial(String),

    /// Key version string is not usable as a key identifier component.
    #[error("invalid key version: {0}")]
    InvalidKeyVersion(String),

    /// Token signing failed.
    #[error("signing failed: {0}")]
    SigningFailed(String),

    /// Key pair generation failed.
    #[error("key generation failed: {0}")]
    GenerationFailed(String),
}

impl KeyError {
    /// Creates a [`KeyError::KeyNotFound`].
    pub fn key_not_found(name: impl Into<String>) -> Self {
        Self::KeyNotFound { name: name.into() }
    }

    /// Creates a [`KeyError::StoreUnavailable`].
    pub fn store_unavailable(message: impl Into<String>) -> Self {
        Self::StoreUnavailable(message.into())
    }

    /// Creates a [`KeyError::KeyExpired`].
    pub fn key_expired(name: impl Into<String>) -> Self {
        Self::KeyExpired(name.into())
    }

    /// Creates a [`KeyError::KeyMismatch`].
    pub fn key_mismatch(declared: impl Into<String>, expected: impl Into<String>) -> Self {
        Self::KeyMismatch { declared: declared.into(), expected: expected.into() }
    }

    /// Creates a [`KeyError::InvalidTokenFormat`].
    pub fn invalid_token_format(message: impl Into<String>) -> Self {
        Self::InvalidTokenFormat(message.into())
    }

    /// Creates a [`KeyError::InvalidKeyMaterial`].
    pub fn invalid_key_material(message: impl Into<String>) -> Self {
        Self::InvalidKeyMaterial(message.into())
    }

    /// Creates a [`KeyError::InvalidKeyVersion`].
    pub fn invalid_key_version(message: impl Into<String>) -> Self {
        Self::InvalidKeyVersion(message.into())
    }

    /// Creates a [`KeyError::SigningFailed`].
    pub fn signing_failed(message: impl Into<String>) -> Self {
        Self::SigningFailed(message.into())
    }

    /// Creates a [`KeyError::GenerationFailed`].
    pub fn generation_failed(message: impl Into<String>) -> Self {
        Self::GenerationFailed(message.into())
    }
}

impl From<jsonwebtoken::errors::Error> for KeyError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::InvalidToken => KeyError::InvalidTokenFormat("invalid JWT structure".into()),
            ErrorKind::InvalidSignature => KeyError::InvalidSignature,
            ErrorKind::ExpiredSignature => KeyError::TokenExpired,
            ErrorKind::ImmatureSignature => KeyError::TokenNotYetValid,
            ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => {
                KeyError::UnsupportedAlgorithm("algorithm not supported".into())
            },
            ErrorKind::InvalidEcdsaKey | ErrorKind::InvalidRsaKey(_) | ErrorKind::InvalidKeyFormat => {
                KeyError::InvalidKeyMaterial(format!("JWT key error: {}", err))
            },
            _ => KeyError::InvalidTokenFormat(format!("JWT error: {}", err)),
        }
    }
}

/// Result type alias for key and token operations.
pub type Result<T> = std::result::Result<T, KeyError>;
