//! Passphrase-based key derivation for the vitals channel.
//!
//! The ambulance and hospital sides never exchange a key. Both stretch the
//! same operator passphrase with PBKDF2-HMAC-SHA256 over a salt and iteration
//! count that are fixed system-wide, and arrive at the same AES-128 key.
//!
//! # Security
//!
//! - Iteration count is at least 1,000,000 (slow by intent; run derivation off
//!   the notification path, see `application::KeySetupWorker`)
//! - Key bytes never leave this crate and are zeroized on drop
//! - `Debug` shows a SHA-256 fingerprint, never the key

use aes_gcm::{Aes128Gcm, Key, KeyInit};
use pbkdf2::pbkdf2_hmac;
use sha2::{Digest, Sha256};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Key length in bytes (AES-128).
pub const KEY_LEN: usize = 16;

/// Salt length in bytes.
pub const SALT_LEN: usize = 16;

/// Minimum accepted passphrase length, in characters.
pub const MIN_PASSPHRASE_CHARS: usize = 8;

/// Lowest iteration count accepted for production parameters.
pub const MIN_ITERATIONS: u32 = 1_000_000;

/// Shared salt used by every deployed producer and viewer.
///
/// Changing it breaks decryption for all peers still using the old value.
pub const DEFAULT_SALT: [u8; SALT_LEN] = [
    0xaa, 0xfe, 0x23, 0x45, 0x67, 0x89, 0xde, 0xad, 0xbe, 0xef, 0x12, 0x34, 0x56, 0x78, 0x90, 0xab,
];

/// Errors during key derivation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KdfError {
    #[error("Passphrase must be at least {MIN_PASSPHRASE_CHARS} characters")]
    WeakPassphrase,

    #[error("Iteration count {0} is below the minimum of {MIN_ITERATIONS}")]
    IterationsTooLow(u32),

    #[error("Invalid salt: {0}")]
    InvalidSalt(String),
}

/// Salt and work factor for PBKDF2.
///
/// Both values are wire-compatibility contracts between producer and viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    salt: [u8; SALT_LEN],
    iterations: u32,
}

impl KdfParams {
    /// Build parameters with a provisioned salt.
    ///
    /// # Errors
    /// Returns `KdfError::IterationsTooLow` below `MIN_ITERATIONS`.
    pub fn new(salt: [u8; SALT_LEN], iterations: u32) -> Result<Self, KdfError> {
        if iterations < MIN_ITERATIONS {
            return Err(KdfError::IterationsTooLow(iterations));
        }
        Ok(Self { salt, iterations })
    }

    /// Parse a salt given as 32 hex characters.
    ///
    /// # Errors
    /// Returns `KdfError::InvalidSalt` if the string is not 16 hex-encoded bytes.
    pub fn parse_salt(hex: &str) -> Result<[u8; SALT_LEN], KdfError> {
        let hex = hex.trim();
        if hex.len() != SALT_LEN * 2 {
            return Err(KdfError::InvalidSalt(format!(
                "expected {} hex characters, got {}",
                SALT_LEN * 2,
                hex.len()
            )));
        }
        // from_str_radix alone would accept a leading sign
        if let Some(bad) = hex.chars().find(|c| !c.is_ascii_hexdigit()) {
            return Err(KdfError::InvalidSalt(format!("not a hex digit: {bad:?}")));
        }

        let mut salt = [0u8; SALT_LEN];
        for (i, byte) in salt.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16)
                .map_err(|e| KdfError::InvalidSalt(e.to_string()))?;
        }
        Ok(salt)
    }

    /// Cheap parameters for unit tests only.
    #[cfg(test)]
    pub(crate) fn for_tests() -> Self {
        Self {
            salt: DEFAULT_SALT,
            iterations: 1_000,
        }
    }

    #[must_use]
    pub fn salt(&self) -> &[u8; SALT_LEN] {
        &self.salt
    }

    #[must_use]
    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    /// Whether these parameters use the shared, publicly known salt.
    #[must_use]
    pub fn uses_shared_salt(&self) -> bool {
        self.salt == DEFAULT_SALT
    }
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            salt: DEFAULT_SALT,
            iterations: MIN_ITERATIONS,
        }
    }
}

/// Symmetric key for the vitals channel.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct VitalsKey {
    bytes: [u8; KEY_LEN],

    /// Key fingerprint for identification (NOT secret)
    #[zeroize(skip)]
    fingerprint: String,
}

impl VitalsKey {
    fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        let fingerprint = compute_fingerprint(&bytes);
        Self { bytes, fingerprint }
    }

    /// Short identifier for comparing keys across peers without revealing them.
    #[must_use]
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub(crate) fn cipher(&self) -> Aes128Gcm {
        Aes128Gcm::new(Key::<Aes128Gcm>::from_slice(&self.bytes))
    }
}

impl std::fmt::Debug for VitalsKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VitalsKey")
            .field("fingerprint", &self.fingerprint)
            .finish_non_exhaustive()
    }
}

// Constant-time over the key bytes.
impl PartialEq for VitalsKey {
    fn eq(&self, other: &Self) -> bool {
        self.bytes
            .iter()
            .zip(other.bytes.iter())
            .fold(0u8, |acc, (x, y)| acc | (x ^ y))
            == 0
    }
}

impl Eq for VitalsKey {}

/// Stretches operator passphrases into `VitalsKey`s.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyDeriver {
    params: KdfParams,
}

impl KeyDeriver {
    #[must_use]
    pub fn new(params: KdfParams) -> Self {
        Self { params }
    }

    #[must_use]
    pub fn params(&self) -> &KdfParams {
        &self.params
    }

    /// Derive the channel key from a passphrase.
    ///
    /// Takes a perceptible amount of wall-clock time at production parameters.
    ///
    /// # Errors
    /// Returns `KdfError::WeakPassphrase` if the passphrase is shorter than
    /// `MIN_PASSPHRASE_CHARS` characters.
    pub fn derive(&self, passphrase: &str) -> Result<VitalsKey, KdfError> {
        if passphrase.chars().count() < MIN_PASSPHRASE_CHARS {
            return Err(KdfError::WeakPassphrase);
        }

        let mut bytes = [0u8; KEY_LEN];
        pbkdf2_hmac::<Sha256>(
            passphrase.as_bytes(),
            &self.params.salt,
            self.params.iterations,
            &mut bytes,
        );

        let key = VitalsKey::from_bytes(bytes);
        bytes.zeroize();

        tracing::debug!(fingerprint = %key.fingerprint(), "Derived channel key");
        Ok(key)
    }
}

/// SHA-256 of the key, first 8 bytes as hex.
fn compute_fingerprint(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest[..8].iter().map(|b| format!("{b:02x}")).collect()
}
