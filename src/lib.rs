//! # Vitalguard
//!
//! Encrypted remote patient monitoring: ambulance units stream vital signs
//! as AES-GCM packages, hospital viewers decrypt them, track the heart-rate
//! trend and raise a triage alarm.
//!
//! This crate provides:
//! - Passphrase-derived channel keys (PBKDF2-HMAC-SHA256)
//! - Authenticated decryption with tamper detection
//! - Rolling trend estimation and severity classification
//! - A background consumer loop over any notification source
//!
//! ## Architecture
//!
//! The crate follows Hexagonal Architecture:
//! - `domain`: Core types and pure logic (keys, packages, vitals, triage)
//! - `ports`: Trait definitions for the notification channel
//! - `adapters`: Concrete sources (line streams, in-process channels) and log sanitization
//! - `application`: Session context, workers and the ambulance simulator
//! - `config`: Environment configuration and secret sourcing
//! - `logging`: Sanitized tracing setup for the binaries

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod logging;
pub mod ports;

pub use application::{MonitorSession, MonitorWorker, RecordUpdate};
pub use domain::{Classification, SeverityLevel, VitalsKey, VitalsRecord};

/// Result type for Vitalguard operations
pub type Result<T> = std::result::Result<T, VitalguardError>;

/// Main error type for Vitalguard
#[derive(Debug, thiserror::Error)]
pub enum VitalguardError {
    #[error("Key derivation failed: {0}")]
    Kdf(#[from] domain::KdfError),

    #[error("Key setup failed: {0}")]
    KeySetup(#[from] application::KeySetupError),

    #[error("Package rejected: {0}")]
    Pipeline(#[from] application::PipelineError),

    #[error("Encryption failed: {0}")]
    Cipher(#[from] domain::CipherError),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
