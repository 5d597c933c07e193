//! Cryptographic primitives: SHA-256 digests, PBKDF2 key derivation,
//! AES-256-GCM authenticated encryption, and OS randomness.
//!
//! Everything above this module talks in hex strings and byte slices; the
//! RustCrypto types stay in here.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};

use sealbook_contracts::error::{SealError, SealResult};

pub const KEY_LEN: usize = 32;
pub const IV_LEN: usize = 12;
pub const SALT_LEN: usize = 16;

/// Default PBKDF2 work factor for backup keys.
pub const DEFAULT_PBKDF2_ITERATIONS: u32 = 600_000;

pub const CIPHER_NAME: &str = "AES-256-GCM";
pub const KDF_NAME: &str = "PBKDF2-HMAC-SHA256";

/// Lowercase hex SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Incremental SHA-256 over a sequence of fields.
///
/// Each field is written as its length (8-byte little-endian) followed by
/// its bytes, so `("ab", "c")` and `("a", "bc")` hash differently.
#[derive(Default)]
pub struct FieldHasher {
    inner: Sha256,
}

impl FieldHasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, bytes: impl AsRef<[u8]>) -> Self {
        let bytes = bytes.as_ref();
        self.inner.update((bytes.len() as u64).to_le_bytes());
        self.inner.update(bytes);
        self
    }

    /// Lowercase 64-character hex digest.
    pub fn finish(self) -> String {
        hex::encode(self.inner.finalize())
    }
}

/// `len` bytes from the operating system CSPRNG.
pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    OsRng.fill_bytes(&mut buf);
    buf
}

/// A 256-bit symmetric key derived from a password.
pub struct DerivedKey([u8; KEY_LEN]);

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DerivedKey(..)")
    }
}

/// PBKDF2-HMAC-SHA256 over `password` and `salt`.
pub fn derive_key(password: &str, salt: &[u8], iterations: u32) -> SealResult<DerivedKey> {
    if iterations == 0 {
        return Err(SealError::Crypto {
            reason: "PBKDF2 iteration count must be positive".to_string(),
        });
    }
    if salt.len() < SALT_LEN {
        return Err(SealError::Crypto {
            reason: format!("salt must be at least {SALT_LEN} bytes, got {}", salt.len()),
        });
    }
    let mut key = [0u8; KEY_LEN];
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut key);
    Ok(DerivedKey(key))
}

fn cipher(key: &DerivedKey) -> SealResult<Aes256Gcm> {
    Aes256Gcm::new_from_slice(&key.0).map_err(|e| SealError::Crypto {
        reason: format!("invalid AES key: {e}"),
    })
}

fn check_iv(iv: &[u8]) -> SealResult<()> {
    if iv.len() != IV_LEN {
        return Err(SealError::Crypto {
            reason: format!("IV must be {IV_LEN} bytes, got {}", iv.len()),
        });
    }
    Ok(())
}

/// AES-256-GCM encrypt.  `aad` is authenticated but not encrypted.
pub fn encrypt(key: &DerivedKey, iv: &[u8], plaintext: &[u8], aad: &[u8]) -> SealResult<Vec<u8>> {
    check_iv(iv)?;
    cipher(key)?
        .encrypt(Nonce::from_slice(iv), Payload { msg: plaintext, aad })
        .map_err(|_| SealError::Crypto {
            reason: "AES-GCM encryption failed".to_string(),
        })
}

/// AES-256-GCM decrypt.  Any authentication failure (wrong key, modified
/// ciphertext, modified `aad`) is reported as `AuthenticationFailed`.
pub fn decrypt(key: &DerivedKey, iv: &[u8], ciphertext: &[u8], aad: &[u8]) -> SealResult<Vec<u8>> {
    check_iv(iv)?;
    cipher(key)?
        .decrypt(Nonce::from_slice(iv), Payload { msg: ciphertext, aad })
        .map_err(|_| SealError::AuthenticationFailed)
}
