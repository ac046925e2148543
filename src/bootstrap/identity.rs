//! Host and cluster identity: ed25519 keypairs encoded as typed text keys.
//!
//! Text forms:
//! ```text
//! public key   <P><64 hex: verifying key>                       65 chars
//! seed         S<P><64 hex: signing key seed><4 hex: checksum>  70 chars
//! ```
//! `<P>` is the [`KeyKind`] prefix (`N` server, `C` cluster). The checksum is
//! the first two bytes of `SHA256(P || seed_bytes)`.
//!
//! [`resolve`] is total: a missing or malformed seed yields a freshly
//! generated keypair, never an error.

use std::fmt;

use ed25519_dalek::{SigningKey, VerifyingKey};
use rand_core::OsRng;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, error};

pub const PUBLIC_KEY_LEN: usize = 65;
pub const SEED_LEN: usize = 70;

/// Which role a key plays. Determines the text prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyKind {
    Server,
    Cluster,
}

impl KeyKind {
    pub fn prefix(self) -> u8 {
        match self {
            KeyKind::Server => b'N',
            KeyKind::Cluster => b'C',
        }
    }

    fn from_prefix(prefix: u8) -> Option<Self> {
        match prefix {
            b'N' => Some(KeyKind::Server),
            b'C' => Some(KeyKind::Cluster),
            _ => None,
        }
    }
}

impl fmt::Display for KeyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyKind::Server => f.write_str("server"),
            KeyKind::Cluster => f.write_str("cluster"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("expected {expected} characters, got {actual}")]
    Length { expected: usize, actual: usize },

    #[error("seed must start with 'S'")]
    NotASeed,

    #[error("expected a {expected} key, found prefix '{found}'")]
    KindMismatch { expected: KeyKind, found: char },

    #[error("unknown key prefix '{0}'")]
    UnknownPrefix(char),

    #[error("invalid hex encoding: {0}")]
    Encoding(String),

    #[error("seed checksum mismatch")]
    Checksum,

    #[error("not a valid ed25519 public key")]
    InvalidPoint,
}

// ── PublicKey ────────────────────────────────────────────────────────────────

/// Text-encoded ed25519 verifying key. Always syntactically valid.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PublicKey(String);

impl PublicKey {
    /// Validate a public key of any known kind.
    pub fn parse(text: &str) -> Result<Self, KeyError> {
        if !text.is_ascii() || text.len() != PUBLIC_KEY_LEN {
            return Err(KeyError::Length { expected: PUBLIC_KEY_LEN, actual: text.chars().count() });
        }
        let prefix = text.as_bytes()[0];
        KeyKind::from_prefix(prefix).ok_or(KeyError::UnknownPrefix(prefix as char))?;

        let mut vk = [0u8; 32];
        hex::decode_to_slice(&text[1..], &mut vk).map_err(|e| KeyError::Encoding(e.to_string()))?;
        VerifyingKey::from_bytes(&vk).map_err(|_| KeyError::InvalidPoint)?;
        Ok(Self(text.to_ascii_uppercase()))
    }

    fn encode(kind: KeyKind, vk: &VerifyingKey) -> Self {
        let mut text = String::with_capacity(PUBLIC_KEY_LEN);
        text.push(kind.prefix() as char);
        text.push_str(&hex::encode_upper(vk.to_bytes()));
        Self(text)
    }

    pub fn kind(&self) -> KeyKind {
        // Constructed only through `parse`/`encode`, so the prefix is known.
        KeyKind::from_prefix(self.0.as_bytes()[0]).unwrap_or(KeyKind::Server)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── Seed ─────────────────────────────────────────────────────────────────────

/// Text-encoded signing key seed. Always well-formed.
#[derive(Clone, PartialEq, Eq)]
pub struct Seed(String);

impl Seed {
    fn encode(kind: KeyKind, secret: &[u8; 32]) -> Self {
        let mut text = String::with_capacity(SEED_LEN);
        text.push('S');
        text.push(kind.prefix() as char);
        text.push_str(&hex::encode_upper(secret));
        text.push_str(&hex::encode_upper(checksum(kind, secret)));
        Self(text)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Debug for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Seed({}…)", &self.0[..2])
    }
}

// ── KeyPair ──────────────────────────────────────────────────────────────────

/// A public key together with the seed it derives from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPair {
    pub public_key: PublicKey,
    pub seed: Seed,
}

/// Host identity. Created once at boot.
pub type HostIdentity = KeyPair;

/// Generate a fresh keypair of `kind`.
pub fn generate(kind: KeyKind) -> KeyPair {
    let signing_key = SigningKey::generate(&mut OsRng);
    KeyPair {
        public_key: PublicKey::encode(kind, &signing_key.verifying_key()),
        seed: Seed::encode(kind, &signing_key.to_bytes()),
    }
}

/// Decode a text seed of `kind` into a keypair. The seed text is kept as given.
pub fn from_seed(seed: &str, kind: KeyKind) -> Result<KeyPair, KeyError> {
    let secret = decode_seed(seed, kind)?;
    let signing_key = SigningKey::from_bytes(&secret);
    Ok(KeyPair {
        public_key: PublicKey::encode(kind, &signing_key.verifying_key()),
        seed: Seed(seed.to_string()),
    })
}

/// Derive the public key for a text seed of `kind`.
pub fn derive_public_key(seed: &str, kind: KeyKind) -> Result<PublicKey, KeyError> {
    from_seed(seed, kind).map(|kp| kp.public_key)
}

/// Resolve an identity from an optional operator seed.
///
/// A valid seed is returned unchanged with its derived public key. A missing
/// seed, or one that fails to decode, produces a freshly generated keypair.
pub fn resolve(seed: Option<&str>, kind: KeyKind) -> KeyPair {
    let Some(seed) = seed else {
        debug!(%kind, "no seed supplied, generating keypair");
        return generate(kind);
    };

    match from_seed(seed, kind) {
        Ok(kp) => kp,
        Err(e) => {
            error!(%kind, %seed, error = %e, "invalid seed, generating a new keypair");
            generate(kind)
        }
    }
}

// ── internals ────────────────────────────────────────────────────────────────

fn checksum(kind: KeyKind, secret: &[u8; 32]) -> [u8; 2] {
    let mut hasher = Sha256::new();
    hasher.update([kind.prefix()]);
    hasher.update(secret);
    let digest = hasher.finalize();
    [digest[0], digest[1]]
}

fn decode_seed(seed: &str, kind: KeyKind) -> Result<[u8; 32], KeyError> {
    if !seed.is_ascii() || seed.len() != SEED_LEN {
        return Err(KeyError::Length { expected: SEED_LEN, actual: seed.chars().count() });
    }
    let bytes = seed.as_bytes();
    if bytes[0] != b'S' {
        return Err(KeyError::NotASeed);
    }
    if bytes[1] != kind.prefix() {
        return Err(KeyError::KindMismatch { expected: kind, found: bytes[1] as char });
    }

    let mut secret = [0u8; 32];
    hex::decode_to_slice(&seed[2..66], &mut secret).map_err(|e| KeyError::Encoding(e.to_string()))?;
    let mut sum = [0u8; 2];
    hex::decode_to_slice(&seed[66..], &mut sum).map_err(|e| KeyError::Encoding(e.to_string()))?;

    if sum != checksum(kind, &secret) {
        return Err(KeyError::Checksum);
    }
    Ok(secret)
}

// ── tests ─────────────────────────────────────────────────────────────────────
