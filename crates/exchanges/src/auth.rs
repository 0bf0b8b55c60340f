//! Request signing strategies.
//!
//! One strategy per authentication scheme in the venue registry. Signing
//! is deterministic over the exact byte sequence the server receives;
//! secrets are held in [`SecretString`] and never logged.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{Duration, Local};
use hmac::{Hmac, Mac};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::pss::SigningKey;
use rsa::signature::{RandomizedSigner, SignatureEncoding};
use rsa::RsaPrivateKey;
use sha2::Sha256;
use secrecy::{ExposeSecret, SecretString};
use spot_arb_core::{VenueError, VenueResult};
use std::collections::BTreeMap;

type HmacSha256 = Hmac<Sha256>;

// =============================================================================
// Bearer Token
// =============================================================================

/// Static bearer token in the `Authorization` header (Nobitex).
pub struct BearerTokenAuth {
    token: SecretString,
}

impl BearerTokenAuth {
    /// Creates the strategy from a pre-issued token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: SecretString::new(token.into()),
        }
    }

    /// The `Authorization` header value.
    #[must_use]
    pub fn header_value(&self) -> String {
        format!("Token {}", self.token.expose_secret())
    }
}

impl std::fmt::Debug for BearerTokenAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BearerTokenAuth")
            .field("token", &"[REDACTED]")
            .finish()
    }
}

// =============================================================================
// HMAC-SHA256
// =============================================================================

/// HMAC-SHA256 over the canonical (sorted) query string, hex-encoded
/// (Wallex, Tabdeal).
pub struct HmacSha256Auth {
    api_key: String,
    secret: SecretString,
}

impl HmacSha256Auth {
    /// Creates the strategy from an API key and secret.
    #[must_use]
    pub fn new(api_key: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            secret: SecretString::new(secret.into()),
        }
    }

    /// Returns the API key id.
    #[must_use]
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Builds the canonical query string: keys sorted, `k=v` joined
    /// with `&`.
    #[must_use]
    pub fn canonical_query(params: &BTreeMap<String, String>) -> String {
        params
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&")
    }

    /// Signs a canonical query string, returning the hex signature.
    ///
    /// # Errors
    /// Returns [`VenueError::Signing`] if the key is unusable.
    pub fn sign(&self, query_string: &str) -> VenueResult<String> {
        let mut mac = HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes())
            .map_err(|e| VenueError::Signing(format!("bad HMAC key: {e}")))?;
        mac.update(query_string.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

impl std::fmt::Debug for HmacSha256Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HmacSha256Auth")
            .field("api_key", &self.api_key)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

// =============================================================================
// RSA-PSS (SHA-256)
// =============================================================================

/// RSA-PSS body signing (Invex).
///
/// The payload is serialized as canonical JSON with sorted keys and an
/// `expire_at` timestamp in the venue's local-time convention, signed,
/// and the hex signature is injected into the body as a new `signature`
/// key before transmission.
pub struct RsaPssAuth {
    api_key: String,
    private_key: RsaPrivateKey,
}

impl RsaPssAuth {
    /// Creates the strategy from an API key and a hex-encoded DER
    /// private key.
    ///
    /// # Errors
    /// Returns [`VenueError::Signing`] if the key does not decode.
    pub fn from_hex_der(api_key: impl Into<String>, hex_secret: &str) -> VenueResult<Self> {
        let der = hex::decode(hex_secret.trim())
            .map_err(|e| VenueError::Signing(format!("secret is not hex: {e}")))?;
        let private_key = RsaPrivateKey::from_pkcs8_der(&der)
            .or_else(|_| RsaPrivateKey::from_pkcs1_der(&der))
            .map_err(|e| VenueError::Signing(format!("failed to parse private key: {e}")))?;
        Ok(Self {
            api_key: api_key.into(),
            private_key,
        })
    }

    /// Creates the strategy from an already-parsed key. Used by tests.
    #[must_use]
    pub fn from_key(api_key: impl Into<String>, private_key: RsaPrivateKey) -> Self {
        Self {
            api_key: api_key.into(),
            private_key,
        }
    }

    /// Returns the API key id.
    #[must_use]
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Expiry timestamp in the venue's local-time convention.
    #[must_use]
    pub fn make_expire_at(minutes: i64) -> String {
        (Local::now() + Duration::minutes(minutes))
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
    }

    /// Signs raw bytes with RSA-PSS (SHA-256), returning hex.
    ///
    /// # Errors
    /// Returns [`VenueError::Signing`] if signing fails.
    pub fn sign_bytes(&self, message: &[u8]) -> VenueResult<String> {
        let signing_key = SigningKey::<Sha256>::new(self.private_key.clone());
        let signature = signing_key.sign_with_rng(&mut rand::rngs::OsRng, message);
        Ok(hex::encode(signature.to_bytes()))
    }

    /// Serializes `fields` as canonical JSON (sorted keys), signs it, and
    /// returns the augmented map with the `signature` key inserted.
    ///
    /// The canonical form is what gets signed; the augmented map is what
    /// gets transmitted.
    ///
    /// # Errors
    /// Returns [`VenueError::Signing`] if signing fails.
    pub fn sign_payload(
        &self,
        fields: serde_json::Map<String, serde_json::Value>,
    ) -> VenueResult<serde_json::Map<String, serde_json::Value>> {
        // serde_json maps iterate in sorted key order, so this is the
        // canonical sorted-key serialization.
        let canonical = serde_json::Value::Object(fields).to_string();
        let signature = self.sign_bytes(canonical.as_bytes())?;
        let mut augmented: serde_json::Map<String, serde_json::Value> =
            serde_json::from_str(&canonical)
                .map_err(|e| VenueError::Signing(format!("canonical body not an object: {e}")))?;
        augmented.insert("signature".to_string(), serde_json::Value::String(signature));
        Ok(augmented)
    }
}

impl std::fmt::Debug for RsaPssAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RsaPssAuth")
            .field("api_key", &self.api_key)
            .field("private_key", &"[REDACTED]")
            .finish()
    }
}

// =============================================================================
// Passphrase HMAC
// =============================================================================

/// Signed headers for one passphrase-HMAC request.
#[derive(Debug, Clone)]
pub struct PassphraseHeaders {
    /// `KC-API-KEY`.
    pub api_key: String,
    /// `KC-API-SIGN`, base64.
    pub signature: String,
    /// `KC-API-TIMESTAMP`, unix milliseconds.
    pub timestamp: String,
    /// `KC-API-PASSPHRASE`, base64 HMAC of the passphrase.
    pub passphrase: String,
}

/// KuCoin-style HMAC-SHA256 with a signed passphrase header.
///
/// Signs `timestamp + method + path + body`, base64-encoded; the
/// passphrase itself is HMAC-signed with the same secret.
pub struct PassphraseHmacAuth {
    api_key: String,
    secret: SecretString,
    passphrase: SecretString,
}

impl PassphraseHmacAuth {
    /// Creates the strategy.
    #[must_use]
    pub fn new(
        api_key: impl Into<String>,
        secret: impl Into<String>,
        passphrase: impl Into<String>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            secret: SecretString::new(secret.into()),
            passphrase: SecretString::new(passphrase.into()),
        }
    }

    fn hmac_base64(&self, message: &[u8]) -> VenueResult<String> {
        let mut mac = HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes())
            .map_err(|e| VenueError::Signing(format!("bad HMAC key: {e}")))?;
        mac.update(message);
        Ok(BASE64.encode(mac.finalize().into_bytes()))
    }

    /// Signs one request with a specific timestamp (milliseconds).
    ///
    /// # Errors
    /// Returns [`VenueError::Signing`] if signing fails.
    pub fn sign_with_timestamp(
        &self,
        timestamp_ms: u64,
        method: &str,
        path: &str,
        body: &str,
    ) -> VenueResult<PassphraseHeaders> {
        let timestamp = timestamp_ms.to_string();
        let message = format!("{timestamp}{method}{path}{body}");
        let signature = self.hmac_base64(message.as_bytes())?;
        let passphrase = self.hmac_base64(self.passphrase.expose_secret().as_bytes())?;
        Ok(PassphraseHeaders {
            api_key: self.api_key.clone(),
            signature,
            timestamp,
            passphrase,
        })
    }

    /// Signs one request with the current timestamp.
    ///
    /// # Errors
    /// Returns [`VenueError::Signing`] if signing fails.
    pub fn sign(&self, method: &str, path: &str, body: &str) -> VenueResult<PassphraseHeaders> {
        let now_ms = chrono::Utc::now().timestamp_millis().max(0) as u64;
        self.sign_with_timestamp(now_ms, method, path, body)
    }
}

impl std::fmt::Debug for PassphraseHmacAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PassphraseHmacAuth")
            .field("api_key", &self.api_key)
            .field("secret", &"[REDACTED]")
            .field("passphrase", &"[REDACTED]")
            .finish()
    }
}
