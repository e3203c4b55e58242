//! Vitals record carried inside an encrypted package.
//!
//! Only trusted once the surrounding package has been authenticated.

use serde::{Deserialize, Deserializer, Serialize};

/// Dispatch mode reported by the ambulance unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Normal,
    /// Emitted by simulator units in place of `normal`
    Stable,
    Urgent,
    Critical,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Normal => write!(f, "NORMAL"),
            Self::Stable => write!(f, "STABLE"),
            Self::Urgent => write!(f, "URGENT"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Point-in-time vital signs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vitals {
    /// Beats per minute
    pub heart_rate: f64,

    /// Peripheral oxygen saturation, percent
    #[serde(rename = "spO2")]
    pub spo2: f64,

    /// Body temperature, degrees Celsius (display only)
    pub temperature: f64,
}

impl Vitals {
    #[must_use]
    pub fn new(heart_rate: f64, spo2: f64, temperature: f64) -> Self {
        Self {
            heart_rate,
            spo2,
            temperature,
        }
    }
}

/// Decrypted package payload.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct VitalsRecord {
    pub ambulance_id: String,

    pub patient_name: String,

    pub mode: Mode,

    /// Unix seconds
    #[serde(deserialize_with = "unix_seconds")]
    pub timestamp: i64,

    pub vitals: Vitals,
}

impl VitalsRecord {
    /// Record timestamp as a UTC datetime, if representable.
    #[must_use]
    pub fn recorded_at(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        chrono::DateTime::from_timestamp(self.timestamp, 0)
    }
}

// Patient names stay out of Debug output (and therefore out of logs).
impl std::fmt::Debug for VitalsRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VitalsRecord")
            .field("ambulance_id", &self.ambulance_id)
            .field("patient_name", &"[REDACTED]")
            .field("mode", &self.mode)
            .field("timestamp", &self.timestamp)
            .field("vitals", &self.vitals)
            .finish()
    }
}

/// Accepts integer or fractional seconds; fractions are truncated.
fn unix_seconds<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Seconds {
        Int(i64),
        Float(f64),
    }

    match Seconds::deserialize(deserializer)? {
        Seconds::Int(s) => Ok(s),
        Seconds::Float(s) if s.is_finite() && s >= i64::MIN as f64 && s <= i64::MAX as f64 => {
            Ok(s.trunc() as i64)
        }
        Seconds::Float(s) => Err(serde::de::Error::custom(format!(
            "timestamp {s} is not a valid unix time"
        ))),
    }
}
