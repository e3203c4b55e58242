//! Authenticated encryption of vitals records (AES-128-GCM).
//!
//! # Security
//!
//! - Every authentication problem (wrong key, modified ciphertext, nonce or
//!   tag, bad nonce/tag length) maps to the same `DecryptionFailed` error
//! - Nothing is returned unless the tag verifies
//! - A fresh random 96-bit nonce is drawn for every encryption

use aes_gcm::{
    aead::{AeadCore, AeadInPlace, OsRng},
    Aes128Gcm, Nonce, Tag,
};
use thiserror::Error;

use super::kdf::VitalsKey;
use super::package::EncryptedPackage;
use super::vitals::VitalsRecord;

/// Nonce length in bytes (96 bits).
pub const NONCE_LEN: usize = 12;

/// Authentication tag length in bytes (128 bits).
pub const TAG_LEN: usize = 16;

/// Errors from sealing or opening a package.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CipherError {
    /// Deliberately carries no cause.
    #[error("Decryption failed: wrong key or package integrity violated")]
    DecryptionFailed,

    #[error("Decrypted payload is not a valid vitals record: {0}")]
    MalformedPayload(String),

    #[error("Encryption failed: {0}")]
    Encryption(String),
}

/// Open a package and parse the vitals record it carries.
///
/// # Errors
/// Returns `CipherError::DecryptionFailed` if authentication fails for any
/// reason, or `CipherError::MalformedPayload` if the authentic plaintext is
/// not a vitals record.
pub fn decrypt(key: &VitalsKey, package: &EncryptedPackage) -> Result<VitalsRecord, CipherError> {
    if package.nonce.len() != NONCE_LEN || package.auth_tag.len() != TAG_LEN {
        return Err(CipherError::DecryptionFailed);
    }

    let nonce = Nonce::from_slice(&package.nonce);
    let tag = Tag::from_slice(&package.auth_tag);

    let mut buffer = package.ciphertext.clone();
    key.cipher()
        .decrypt_in_place_detached(nonce, b"", &mut buffer, tag)
        .map_err(|_| CipherError::DecryptionFailed)?;

    // serde_json error text may quote the payload; keep only its category.
    serde_json::from_slice(&buffer).map_err(|e| {
        CipherError::MalformedPayload(format!(
            "{:?} error at line {} column {}",
            e.classify(),
            e.line(),
            e.column()
        ))
    })
}

/// Seal a vitals record under `key` with a fresh random nonce.
///
/// # Errors
/// Returns `CipherError::Encryption` if the record cannot be serialized or sealed.
pub fn encrypt(key: &VitalsKey, record: &VitalsRecord) -> Result<EncryptedPackage, CipherError> {
    let mut buffer =
        serde_json::to_vec(record).map_err(|e| CipherError::Encryption(e.to_string()))?;

    let nonce = Aes128Gcm::generate_nonce(&mut OsRng);
    let tag = key
        .cipher()
        .encrypt_in_place_detached(&nonce, b"", &mut buffer)
        .map_err(|e| CipherError::Encryption(e.to_string()))?;

    Ok(EncryptedPackage {
        ciphertext: buffer,
        nonce: nonce.to_vec(),
        auth_tag: tag.to_vec(),
    })
}
