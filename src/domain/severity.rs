//! Triage severity classification and alarm state.
//!
//! Classification is a pure function of heart rate and SpO2. Temperature is
//! carried for display and does not affect the level.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::vitals::Vitals;

pub const CRITICAL_HR_HIGH: f64 = 120.0;
pub const CRITICAL_HR_LOW: f64 = 50.0;
pub const CRITICAL_SPO2: f64 = 90.0;
pub const URGENT_HR_HIGH: f64 = 100.0;
pub const URGENT_SPO2: f64 = 94.0;

pub const REASON_LOW_OXYGEN: &str = "Low Blood Oxygen";
pub const REASON_CRITICAL_HR: &str = "Critical Heart Rate";
pub const REASON_HIGH_HR: &str = "High Heart Rate";
pub const REASON_STABLE: &str = "Vitals Stable";

/// Triage severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeverityLevel {
    /// Standard care
    Stable,
    /// Concerning vitals, not immediately life-threatening
    Urgent,
    /// Life-threatening vitals, alarm sounds
    Critical,
}

impl std::fmt::Display for SeverityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stable => write!(f, "STABLE"),
            Self::Urgent => write!(f, "URGENT"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Vital sign fields that a classification can flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum VitalField {
    #[serde(rename = "heart_rate")]
    HeartRate,
    #[serde(rename = "spO2")]
    SpO2,
}

impl VitalField {
    /// Wire name of the field.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HeartRate => "heart_rate",
            Self::SpO2 => "spO2",
        }
    }
}

/// Result of classifying one vitals snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub level: SeverityLevel,
    pub reason: &'static str,
    pub affected_fields: BTreeSet<VitalField>,
}

impl Classification {
    fn flagged(level: SeverityLevel, reason: &'static str) -> Self {
        Self {
            level,
            reason,
            affected_fields: [VitalField::HeartRate, VitalField::SpO2].into_iter().collect(),
        }
    }

    fn stable() -> Self {
        Self {
            level: SeverityLevel::Stable,
            reason: REASON_STABLE,
            affected_fields: BTreeSet::new(),
        }
    }

    /// Banner text shown to the viewer.
    #[must_use]
    pub fn banner(&self) -> String {
        match self.level {
            SeverityLevel::Stable => "STABLE - STANDARD CARE".to_string(),
            level => format!("{level} - {}", self.reason),
        }
    }

    #[must_use]
    pub fn alarm(&self) -> Alarm {
        Alarm::for_level(self.level)
    }
}

/// Classify a vitals snapshot. First matching tier wins.
///
/// Within a tier the SpO2 reason takes precedence over the heart-rate reason.
#[must_use]
pub fn classify(vitals: &Vitals) -> Classification {
    let hr = vitals.heart_rate;
    let spo2 = vitals.spo2;

    if hr > CRITICAL_HR_HIGH || hr < CRITICAL_HR_LOW || spo2 < CRITICAL_SPO2 {
        let reason = if spo2 < CRITICAL_SPO2 {
            REASON_LOW_OXYGEN
        } else {
            REASON_CRITICAL_HR
        };
        return Classification::flagged(SeverityLevel::Critical, reason);
    }

    if hr > URGENT_HR_HIGH || spo2 < URGENT_SPO2 {
        let reason = if spo2 < URGENT_SPO2 {
            REASON_LOW_OXYGEN
        } else {
            REASON_HIGH_HR
        };
        return Classification::flagged(SeverityLevel::Urgent, reason);
    }

    Classification::stable()
}

/// Audible alarm state.
///
/// Level-triggered: it follows the latest classification and is recomputed
/// on every record, independent of what the previous level was.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Alarm {
    Sounding,
    #[default]
    Silent,
}

impl Alarm {
    #[must_use]
    pub fn for_level(level: SeverityLevel) -> Self {
        match level {
            SeverityLevel::Critical => Self::Sounding,
            SeverityLevel::Urgent | SeverityLevel::Stable => Self::Silent,
        }
    }

    #[must_use]
    pub fn is_sounding(&self) -> bool {
        matches!(self, Self::Sounding)
    }
}

impl std::fmt::Display for Alarm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sounding => write!(f, "ALARM ON"),
            Self::Silent => write!(f, "alarm off"),
        }
    }
}
