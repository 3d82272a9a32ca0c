//! JWT signing and verification bound to the key caches.
//!
//! [`sign_with_key_pair_cache`] resolves the latest pair for a key name
//! from a [`KeyPairCache`] and signs with it, embedding a `name/version`
//! key identifier in the token's `kid` header. [`verify_with_public_key_cache`]
//! reads that identifier back (unverified), resolves the exact public key
//! version from a [`PublicKeyCache`], and verifies the token — so a token
//! signed before a rotation keeps verifying as long as its version's
//! grace-extended public record is still valid.
//!
//! Token payload schema is the caller's business: claims are any
//! `Serialize`/`DeserializeOwned` type, and the pair's rotation deadline is
//! deliberately not mapped onto the token's `exp` claim — callers set token
//! lifetimes themselves.
//!
//! # Security
//!
//! Verification rejects any algorithm other than the asymmetric ones this
//! crate generates keys for (per RFC 8725, validators must reject
//! algorithms they do not fully implement), and fails closed with
//! [`KeyError::KeyMismatch`] — before any store fetch — when a token
//! declares a different key name than the caller asked for.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, decode_header, encode};
use serde::{Serialize, de::DeserializeOwned};

use crate::{
    error::{KeyError, Result},
    keypair::KeyId,
    keypair_cache::KeyPairCache,
    public_key_cache::PublicKeyCache,
};

/// Signs `claims` with the latest pair for `key_name`, using a default
/// header.
///
/// See [`sign_with_header`] for the header handling.
///
/// # Errors
///
/// Propagates the cache's failure reason, or [`KeyError::SigningFailed`] if
/// encoding itself fails.
pub async fn sign_with_key_pair_cache<T: Serialize>(
    cache: &KeyPairCache,
    claims: &T,
    key_name: &str,
) -> Result<String> {
    sign_with_header(cache, claims, key_name, Header::new(Algorithm::EdDSA)).await
}

/// Signs `claims` with the latest pair for `key_name` and a caller-supplied
/// header.
///
/// The header's `alg` is forced to the resolved pair's algorithm and its
/// `kid` to the pair's `name/version` identifier, overriding any
/// caller-supplied values — verification relies on the identifier to locate
/// the exact version used.
///
/// # Errors
///
/// Propagates the cache's failure reason, [`KeyError::InvalidKeyMaterial`]
/// if the pair's private PEM cannot be parsed, or
/// [`KeyError::SigningFailed`] if encoding fails.
#[tracing::instrument(skip(cache, claims, header))]
pub async fn sign_with_header<T: Serialize>(
    cache: &KeyPairCache,
    claims: &T,
    key_name: &str,
    mut header: Header,
) -> Result<String> {
    let pair = cache.get_key_pair(key_name).await?;
    header.alg = pair.algorithm.jwt_algorithm();
    header.kid = Some(pair.key_id().to_string());

    let encoding_key = EncodingKey::from_ed_pem(pair.private_key_pem.as_bytes())
        .map_err(|e| KeyError::invalid_key_material(format!("private key: {e}")))?;
    encode(&header, claims, &encoding_key).map_err(|e| KeyError::signing_failed(e.to_string()))
}

/// Verifies `token` against `key_name` with default validation
/// (signature, `exp`, `nbf`; no audience check).
///
/// # Errors
///
/// See [`verify_with_options`].
pub async fn verify_with_public_key_cache<T: DeserializeOwned>(
    cache: &PublicKeyCache,
    token: &str,
    key_name: &str,
) -> Result<T> {
    let mut validation = Validation::new(Algorithm::EdDSA);
    validation.validate_aud = false;
    verify_with_options(cache, token, key_name, &validation).await
}

/// Verifies `token` against `key_name` with caller-supplied validation
/// options, returning the decoded claims.
///
/// The token's unverified `kid` header supplies the exact key version:
/// it is split into declared name and version on the first `/` only. A
/// declared name differing from `key_name` fails immediately with
/// [`KeyError::KeyMismatch`], before any public-key fetch — this guards
/// against cross-key confusion.
///
/// # Errors
///
/// - [`KeyError::InvalidTokenFormat`] — undecodable token or malformed/missing `kid`
/// - [`KeyError::UnsupportedAlgorithm`] — header algorithm is not one this crate signs with
/// - [`KeyError::KeyMismatch`] — declared key name differs from `key_name`
/// - cache resolution failures, including permanent [`KeyError::KeyExpired`]
/// - [`KeyError::InvalidSignature`] / [`KeyError::TokenExpired`] /
///   [`KeyError::TokenNotYetValid`] — verification rejected the token
#[tracing::instrument(skip(cache, token))]
pub async fn verify_with_options<T: DeserializeOwned>(
    cache: &PublicKeyCache,
    token: &str,
    key_name: &str,
    validation: &Validation,
) -> Result<T> {
    let header = decode_header(token)?;
    if header.alg != Algorithm::EdDSA {
        return Err(KeyError::UnsupportedAlgorithm(format!("{:?}", header.alg)));
    }
    let kid = header
        .kid
        .ok_or_else(|| KeyError::invalid_token_format("missing kid header"))?;
    let declared = KeyId::parse(&kid)?;
    if declared.name != key_name {
        return Err(KeyError::key_mismatch(declared.name, key_name));
    }

    let public_key_pem = cache.get_public_key(&declared.name, &declared.version).await?;
    let decoding_key = DecodingKey::from_ed_pem(public_key_pem.as_bytes())
        .map_err(|e| KeyError::invalid_key_material(format!("public key: {e}")))?;
    let data = decode::<T>(token, &decoding_key, validation)?;
    Ok(data.claims)
}
