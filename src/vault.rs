//! Credential vault: authenticated encryption for the CA key-pair archive.
//!
//! The vault is a pure byte transformer. `seal` turns a plaintext archive into
//! an encrypted blob plus a freshly generated symmetric key; `open` reverses
//! it given the same key. AES-256-GCM is used so that a wrong key or a
//! tampered blob is always detected as a [`NurseryError::Decryption`] failure
//! rather than yielding corrupted plaintext. Disk persistence of the blob and
//! removal of any transient plaintext copy are the caller's responsibility —
//! this module never touches the filesystem.

use crate::error::{NurseryError, Result};
use openssl::symm::Cipher;
use secrecy::{ExposeSecret, SecretBox};
use std::fmt;
use zeroize::Zeroize;

/// Size of AES-256 key (256 bits = 32 bytes)
pub const VAULT_KEY_SIZE: usize = 32;
/// Size of AES-GCM nonce (96 bits = 12 bytes)
pub const VAULT_NONCE_SIZE: usize = 12;
/// Size of AES-GCM authentication tag (128 bits = 16 bytes)
pub const VAULT_TAG_SIZE: usize = 16;
/// Size of the ciphertext length field in the serialized blob (u32 = 4 bytes)
pub const DATA_LEN_SIZE: usize = 4;
/// Format marker at the start of every serialized vault blob
pub const VAULT_MAGIC: &[u8; 8] = b"NNVAULT1";

/// The symmetric vault key, held behind `SecretBox` so it is zeroized on drop
/// and never appears in debug output. The operator is the sole durable holder
/// of this value; the tool shows it exactly once, in hex.
pub struct VaultKey {
    key: SecretBox<[u8; VAULT_KEY_SIZE]>,
}

impl VaultKey {
    /// Generate a fresh random key.
    pub fn generate() -> Result<Self> {
        let mut bytes = [0u8; VAULT_KEY_SIZE];
        openssl::rand::rand_bytes(&mut bytes)
            .map_err(|e| NurseryError::Crypto(format!("failed to generate vault key: {e}")))?;
        Ok(Self {
            key: SecretBox::new(Box::new(bytes)),
        })
    }

    /// Parse a key from the hex form shown to the operator.
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        let mut decoded = hex::decode(hex_str.trim())
            .map_err(|_| NurseryError::Validation("vault key must be hex".to_string()))?;
        if decoded.len() != VAULT_KEY_SIZE {
            decoded.zeroize();
            return Err(NurseryError::Validation(format!(
                "vault key must be {} hex characters",
                VAULT_KEY_SIZE * 2
            )));
        }
        let mut bytes = [0u8; VAULT_KEY_SIZE];
        bytes.copy_from_slice(&decoded);
        decoded.zeroize();
        Ok(Self {
            key: SecretBox::new(Box::new(bytes)),
        })
    }

    /// Hex rendering for the one-time operator display.
    pub fn to_hex(&self) -> String {
        hex::encode(self.key.expose_secret())
    }

    /// Check an operator-transcribed candidate against this key. Used as the
    /// round-trip confirmation gate before the vault is trusted to the key:
    /// on mismatch the caller must abort without writing the blob to disk.
    pub fn verify(&self, candidate: &str) -> bool {
        let Ok(mut decoded) = hex::decode(candidate.trim()) else {
            return false;
        };
        if decoded.len() != VAULT_KEY_SIZE {
            decoded.zeroize();
            return false;
        }
        let matched = openssl::memcmp::eq(self.key.expose_secret(), &decoded);
        decoded.zeroize();
        matched
    }

    fn expose(&self) -> &[u8; VAULT_KEY_SIZE] {
        self.key.expose_secret()
    }
}

impl fmt::Debug for VaultKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VaultKey")
            .field("key", &"<redacted>")
            .finish()
    }
}

/// Encrypt a plaintext archive under a freshly generated key.
///
/// Returns the serialized blob and the key. The caller displays the key to
/// the operator, obtains a confirmation copy, and only persists the blob
/// after [`VaultKey::verify`] succeeds.
pub fn seal(plaintext: &[u8]) -> Result<(Vec<u8>, VaultKey)> {
    let key = VaultKey::generate()?;

    let mut nonce = [0u8; VAULT_NONCE_SIZE];
    openssl::rand::rand_bytes(&mut nonce)
        .map_err(|e| NurseryError::Crypto(format!("failed to generate nonce: {e}")))?;

    let cipher = Cipher::aes_256_gcm();
    let mut tag = [0u8; VAULT_TAG_SIZE];

    let ciphertext = openssl::symm::encrypt_aead(
        cipher,
        key.expose(),
        Some(&nonce),
        VAULT_MAGIC,
        plaintext,
        &mut tag,
    )
    .map_err(|e| NurseryError::Crypto(format!("AES-GCM encryption failed: {e}")))?;

    let mut blob = Vec::with_capacity(
        VAULT_MAGIC.len() + VAULT_NONCE_SIZE + VAULT_TAG_SIZE + DATA_LEN_SIZE + ciphertext.len(),
    );
    blob.extend_from_slice(VAULT_MAGIC);
    blob.extend_from_slice(&nonce);
    blob.extend_from_slice(&tag);
    let data_len = ciphertext.len() as u32;
    blob.extend_from_slice(&data_len.to_le_bytes());
    blob.extend_from_slice(&ciphertext);

    Ok((blob, key))
}

/// Decrypt a serialized vault blob.
///
/// Any key mismatch, truncation, or bit flip fails the GCM tag check and is
/// surfaced as [`NurseryError::Decryption`]; garbage plaintext is never
/// returned.
pub fn open(blob: &[u8], key: &VaultKey) -> Result<Vec<u8>> {
    let mut offset = 0;

    if blob.len() < VAULT_MAGIC.len() || &blob[..VAULT_MAGIC.len()] != VAULT_MAGIC {
        return Err(NurseryError::Decryption(
            "not a vault file (bad magic)".to_string(),
        ));
    }
    offset += VAULT_MAGIC.len();

    if blob.len() < offset + VAULT_NONCE_SIZE + VAULT_TAG_SIZE + DATA_LEN_SIZE {
        return Err(NurseryError::Decryption(
            "vault blob too short to contain nonce, tag, and length".to_string(),
        ));
    }

    let nonce = &blob[offset..offset + VAULT_NONCE_SIZE];
    offset += VAULT_NONCE_SIZE;

    let tag = &blob[offset..offset + VAULT_TAG_SIZE];
    offset += VAULT_TAG_SIZE;

    let data_len = u32::from_le_bytes(
        blob[offset..offset + DATA_LEN_SIZE]
            .try_into()
            .expect("slice length checked above"),
    ) as usize;
    offset += DATA_LEN_SIZE;

    if blob.len() != offset + data_len {
        return Err(NurseryError::Decryption(
            "vault blob length does not match its header".to_string(),
        ));
    }

    let ciphertext = &blob[offset..];

    openssl::symm::decrypt_aead(
        Cipher::aes_256_gcm(),
        key.expose(),
        Some(nonce),
        VAULT_MAGIC,
        ciphertext,
        tag,
    )
    .map_err(|_| NurseryError::Decryption("wrong key or corrupted vault".to_string()))
}
