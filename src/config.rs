//! Runtime configuration for the monitor and the simulator.
//!
//! Everything comes from the environment, with CLI flags layered on top by
//! the binaries. Secrets are read from files so they stay out of the process
//! environment in release builds.

use std::path::{Path, PathBuf};

use thiserror::Error;
use zeroize::Zeroizing;

use crate::domain::kdf::{KdfError, KdfParams, DEFAULT_SALT, MIN_ITERATIONS};

/// Passphrase sources, highest precedence first:
/// - an explicit path (CLI `--passphrase-file`)
/// - `VITALGUARD_PASSPHRASE_FILE`
/// - `/run/secrets/vitalguard_passphrase` (Docker/Compose secret default)
/// - `VITALGUARD_PASSPHRASE` (debug builds only)
pub const PASSPHRASE_FILE_ENV: &str = "VITALGUARD_PASSPHRASE_FILE";
pub const PASSPHRASE_DOCKER_SECRET_PATH: &str = "/run/secrets/vitalguard_passphrase";
pub const PASSPHRASE_ENV_DEV: &str = "VITALGUARD_PASSPHRASE";

pub const KDF_SALT_ENV: &str = "VITALGUARD_KDF_SALT";
pub const KDF_ITERATIONS_ENV: &str = "VITALGUARD_KDF_ITERATIONS";
pub const INPUT_ENV: &str = "VITALGUARD_INPUT";

/// Errors while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(
        "Missing passphrase: provide --passphrase-file, {PASSPHRASE_FILE_ENV} (or mount {PASSPHRASE_DOCKER_SECRET_PATH})"
    )]
    MissingPassphrase,

    #[error("Passphrase source {0} is empty")]
    EmptyPassphrase(PathBuf),

    #[error("Cannot read {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid {name}: {reason}")]
    InvalidValue { name: &'static str, reason: String },

    #[error(transparent)]
    Kdf(#[from] KdfError),
}

/// Settings shared by both binaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    pub kdf: KdfParams,
    /// Notification file; `None` reads stdin.
    pub input: Option<PathBuf>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            kdf: KdfParams::default(),
            input: None,
        }
    }
}

impl MonitorConfig {
    /// Load from the process environment.
    ///
    /// # Errors
    /// Returns `ConfigError` if a variable is set but invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load through an arbitrary variable lookup.
    ///
    /// # Errors
    /// Returns `ConfigError` if a variable is set but invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let salt = match lookup(KDF_SALT_ENV) {
            Some(hex) => KdfParams::parse_salt(&hex)?,
            None => DEFAULT_SALT,
        };

        let iterations = match lookup(KDF_ITERATIONS_ENV) {
            Some(raw) => raw
                .trim()
                .parse::<u32>()
                .map_err(|e| ConfigError::InvalidValue {
                    name: KDF_ITERATIONS_ENV,
                    reason: e.to_string(),
                })?,
            None => MIN_ITERATIONS,
        };

        let input = lookup(INPUT_ENV)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty() && v != "-")
            .map(PathBuf::from);

        Ok(Self {
            kdf: KdfParams::new(salt, iterations)?,
            input,
        })
    }
}

/// Read the channel passphrase from the first available source.
///
/// # Errors
/// Returns `ConfigError::MissingPassphrase` if no source is configured, or
/// an error for a source that exists but is unreadable or empty.
pub fn load_passphrase(explicit: Option<&Path>) -> Result<Zeroizing<String>, ConfigError> {
    load_passphrase_with(
        explicit,
        |name| std::env::var(name).ok(),
        Path::new(PASSPHRASE_DOCKER_SECRET_PATH),
    )
}

fn load_passphrase_with<F>(
    explicit: Option<&Path>,
    lookup: F,
    docker_secret: &Path,
) -> Result<Zeroizing<String>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(path) = explicit {
        return read_secret_file(path);
    }

    if let Some(path) = lookup(PASSPHRASE_FILE_ENV) {
        return read_secret_file(Path::new(path.trim()));
    }

    if docker_secret.exists() {
        return read_secret_file(docker_secret);
    }

    // Refused in release builds.
    if cfg!(debug_assertions) {
        if let Some(value) = lookup(PASSPHRASE_ENV_DEV) {
            let value = Zeroizing::new(value);
            let secret = value.trim_end_matches(['\n', '\r']);
            if secret.is_empty() {
                return Err(ConfigError::MissingPassphrase);
            }
            return Ok(Zeroizing::new(secret.to_string()));
        }
    }

    Err(ConfigError::MissingPassphrase)
}

fn read_secret_file(path: &Path) -> Result<Zeroizing<String>, ConfigError> {
    let content = Zeroizing::new(std::fs::read_to_string(path).map_err(|source| {
        ConfigError::Unreadable {
            path: path.to_path_buf(),
            source,
        }
    })?);

    let secret = content.trim_end_matches(['\n', '\r']);
    if secret.is_empty() {
        return Err(ConfigError::EmptyPassphrase(path.to_path_buf()));
    }
    Ok(Zeroizing::new(secret.to_string()))
}
