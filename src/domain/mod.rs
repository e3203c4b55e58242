//! Domain layer: Core telemetry types and logic.
//!
//! Pure functions and value types with no I/O. Everything the pipeline
//! decides (key, authenticity, trend, severity) is decided here.

pub mod cipher;
pub mod kdf;
pub mod package;
mod severity;
mod trend;
mod vitals;

pub use cipher::{CipherError, NONCE_LEN, TAG_LEN};
pub use kdf::{KdfError, KdfParams, KeyDeriver, VitalsKey};
pub use package::{CodecError, EncryptedPackage};
pub use severity::{classify, Alarm, Classification, SeverityLevel, VitalField};
pub use trend::{TrendDirection, TrendEstimator, TREND_WINDOW};
pub use vitals::{Mode, Vitals, VitalsRecord};
