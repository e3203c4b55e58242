//! Wire framing for encrypted vitals packages.
//!
//! A package travels as a JSON object with three standard-base64 fields:
//!
//! ```json
//! { "ciphertext": "<base64>", "nonce": "<base64>", "auth_tag": "<base64>" }
//! ```
//!
//! This is framing only. Field lengths are checked by the decryptor, so a
//! short nonce decodes fine here and fails authentication later.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use thiserror::Error;

/// Errors while parsing the wire representation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("Malformed package: {0}")]
    MalformedPackage(&'static str),
}

/// Encrypted vitals package (binary form).
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptedPackage {
    pub ciphertext: Vec<u8>,
    pub nonce: Vec<u8>,
    pub auth_tag: Vec<u8>,
}

impl std::fmt::Debug for EncryptedPackage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedPackage")
            .field("ciphertext_len", &self.ciphertext.len())
            .field("nonce_len", &self.nonce.len())
            .field("auth_tag_len", &self.auth_tag.len())
            .finish()
    }
}

#[derive(Deserialize)]
struct WirePackage {
    ciphertext: Option<serde_json::Value>,
    nonce: Option<serde_json::Value>,
    auth_tag: Option<serde_json::Value>,
}

/// Parse a wire package.
///
/// # Errors
/// Returns `CodecError::MalformedPackage` if the input is not a JSON object,
/// or any field is absent, not a string, or not valid base64.
pub fn decode(wire: &str) -> Result<EncryptedPackage, CodecError> {
    let raw: WirePackage = serde_json::from_str(wire)
        .map_err(|_| CodecError::MalformedPackage("not a package object"))?;

    Ok(EncryptedPackage {
        ciphertext: decode_field(raw.ciphertext, "ciphertext")?,
        nonce: decode_field(raw.nonce, "nonce")?,
        auth_tag: decode_field(raw.auth_tag, "auth_tag")?,
    })
}

/// Produce the wire representation of a package.
#[must_use]
pub fn encode(package: &EncryptedPackage) -> String {
    serde_json::json!({
        "ciphertext": STANDARD.encode(&package.ciphertext),
        "nonce": STANDARD.encode(&package.nonce),
        "auth_tag": STANDARD.encode(&package.auth_tag),
    })
    .to_string()
}

fn decode_field(
    value: Option<serde_json::Value>,
    name: &'static str,
) -> Result<Vec<u8>, CodecError> {
    match value {
        Some(serde_json::Value::String(text)) => STANDARD
            .decode(text.trim())
            .map_err(|_| CodecError::MalformedPackage(name)),
        _ => Err(CodecError::MalformedPackage(name)),
    }
}
