use chrono::{DateTime, Duration, Utc};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Number of random bytes behind every token.
pub const TOKEN_BYTES_LENGTH: usize = 18;

/// Length of the hex plaintext handed to users.
pub const TOKEN_PLAINTEXT_LENGTH: usize = TOKEN_BYTES_LENGTH * 2;

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("Entropy source failure: {0}")]
    Entropy(#[from] rand::Error),
    #[error("Token is not valid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),
    #[error("Token must decode to 18 bytes, got {0}")]
    InvalidLength(usize),
    #[error("Unknown token scope: {0}")]
    UnknownScope(String),
}

/// Partitions tokens by purpose. Lookups and invalidation are always scoped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenScope {
    Activation,
}

impl TokenScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenScope::Activation => "activation",
        }
    }
}

impl fmt::Display for TokenScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TokenScope {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "activation" => Ok(TokenScope::Activation),
            other => Err(TokenError::UnknownScope(other.to_string())),
        }
    }
}

/// Stored form of a token. Only the SHA-256 of the raw bytes is kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub user_id: i64,
    pub scope: TokenScope,
    pub hash: Vec<u8>,
    pub expires_at: DateTime<Utc>,
}

impl Token {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}

/// A freshly issued token: the plaintext for the user and the record to store.
#[derive(Debug, Clone)]
pub struct GeneratedToken {
    pub plaintext: String,
    pub token: Token,
}

pub fn generate_token(
    scope: TokenScope,
    ttl: Duration,
    user_id: i64,
) -> Result<GeneratedToken, TokenError> {
    let mut bytes = [0u8; TOKEN_BYTES_LENGTH];
    OsRng.try_fill_bytes(&mut bytes)?;

    Ok(GeneratedToken {
        plaintext: hex::encode(bytes),
        token: Token {
            user_id,
            scope,
            hash: Sha256::digest(bytes).to_vec(),
            expires_at: Utc::now() + ttl,
        },
    })
}

pub fn generate_activation_token(ttl: Duration, user_id: i64) -> Result<GeneratedToken, TokenError> {
    generate_token(TokenScope::Activation, ttl, user_id)
}

/// Decodes a submitted plaintext token and returns the hash it is stored under.
pub fn hash_plaintext(plaintext: &str) -> Result<Vec<u8>, TokenError> {
    let bytes = hex::decode(plaintext)?;
    if bytes.len() != TOKEN_BYTES_LENGTH {
        return Err(TokenError::InvalidLength(bytes.len()));
    }
    Ok(Sha256::digest(&bytes).to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plaintext_has_fixed_length() {
        let generated = generate_activation_token(Duration::hours(2), 1).unwrap();
        assert_eq!(generated.plaintext.len(), TOKEN_PLAINTEXT_LENGTH);
        assert!(generated.plaintext.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_stored_hash_matches_plaintext() {
        let generated = generate_activation_token(Duration::hours(2), 7).unwrap();

        let raw = hex::decode(&generated.plaintext).unwrap();
        let expected = Sha256::digest(&raw).to_vec();

        assert_eq!(generated.token.hash, expected);
        assert_eq!(hash_plaintext(&generated.plaintext).unwrap(), expected);
        // The hex string itself is never what gets hashed
        assert_ne!(
            generated.token.hash,
            Sha256::digest(generated.plaintext.as_bytes()).to_vec()
        );
    }

    #[test]
    fn test_record_carries_owner_scope_and_expiry() {
        let before = Utc::now();
        let generated = generate_activation_token(Duration::hours(2), 42).unwrap();
        let after = Utc::now();

        assert_eq!(generated.token.user_id, 42);
        assert_eq!(generated.token.scope, TokenScope::Activation);
        assert!(generated.token.expires_at >= before + Duration::hours(2));
        assert!(generated.token.expires_at <= after + Duration::hours(2));
    }

    #[test]
    fn test_tokens_are_unique() {
        let a = generate_activation_token(Duration::hours(1), 1).unwrap();
        let b = generate_activation_token(Duration::hours(1), 1).unwrap();
        assert_ne!(a.plaintext, b.plaintext);
        assert_ne!(a.token.hash, b.token.hash);
    }

    #[test]
    fn test_expiry_boundary() {
        let generated = generate_activation_token(Duration::hours(2), 1).unwrap();
        let token = generated.token;

        assert!(!token.is_expired_at(token.expires_at - Duration::hours(1)));
        assert!(!token.is_expired_at(token.expires_at));
        assert!(token.is_expired_at(token.expires_at + Duration::seconds(1)));
    }

    #[test]
    fn test_hash_plaintext_rejects_malformed_input() {
        assert!(matches!(
            hash_plaintext("zz".repeat(TOKEN_BYTES_LENGTH).as_str()),
            Err(TokenError::InvalidHex(_))
        ));
        assert!(matches!(hash_plaintext("abc"), Err(TokenError::InvalidHex(_))));
        assert!(matches!(
            hash_plaintext("abcd"),
            Err(TokenError::InvalidLength(2))
        ));
    }

    #[test]
    fn test_scope_round_trips_through_str() {
        assert_eq!("activation".parse::<TokenScope>().unwrap(), TokenScope::Activation);
        assert_eq!(TokenScope::Activation.to_string(), "activation");
        assert!(matches!(
            "password-reset".parse::<TokenScope>(),
            Err(TokenError::UnknownScope(_))
        ));
    }
}
