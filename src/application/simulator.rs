//! Ambulance-side producer: synthetic vitals sealed for the channel.
//!
//! Used by the `ambulance_sim` binary and by tests that need realistic
//! traffic. Vitals are drawn uniformly from per-scenario ranges.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

use crate::domain::{cipher, package, CipherError, Mode, Vitals, VitalsKey, VitalsRecord};
use crate::ports::Notification;

/// Patient condition to simulate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scenario {
    Stable,
    Urgent,
    Critical,
}

/// Unknown scenario name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown scenario '{0}' (expected stable, urgent or critical)")]
pub struct UnknownScenario(pub String);

impl Scenario {
    #[must_use]
    pub fn mode(&self) -> Mode {
        match self {
            Self::Stable => Mode::Stable,
            Self::Urgent => Mode::Urgent,
            Self::Critical => Mode::Critical,
        }
    }
}

impl std::str::FromStr for Scenario {
    type Err = UnknownScenario;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stable" | "normal" => Ok(Self::Stable),
            "urgent" => Ok(Self::Urgent),
            "critical" => Ok(Self::Critical),
            _ => Err(UnknownScenario(s.to_string())),
        }
    }
}

impl std::fmt::Display for Scenario {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stable => write!(f, "stable"),
            Self::Urgent => write!(f, "urgent"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

struct Ranges {
    heart_rate: (u32, u32),
    spo2: (u32, u32),
    temperature: (f64, f64),
}

fn ranges(scenario: Scenario) -> Ranges {
    match scenario {
        Scenario::Stable => Ranges {
            heart_rate: (70, 95),
            spo2: (96, 99),
            temperature: (36.1, 37.2),
        },
        Scenario::Urgent => Ranges {
            heart_rate: (100, 119),
            spo2: (91, 94),
            temperature: (37.5, 38.5),
        },
        // Tachycardia, hypoxemia, high fever
        Scenario::Critical => Ranges {
            heart_rate: (120, 160),
            spo2: (80, 89),
            temperature: (38.6, 40.0),
        },
    }
}

/// Patient names handed out by the simulator.
pub const PATIENT_NAMES: &[&str] = &[
    "Jane Roe",
    "John Doe",
    "Maria Garcia",
    "Wei Zhang",
    "Amara Okafor",
    "Lars Nielsen",
    "Priya Raman",
    "Tomas Novak",
];

/// Random vitals source.
pub struct VitalsGenerator {
    rng: ChaCha20Rng,
}

impl VitalsGenerator {
    /// Generator seeded from OS entropy.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rng: ChaCha20Rng::from_entropy(),
        }
    }

    /// Reproducible generator.
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: ChaCha20Rng::seed_from_u64(seed),
        }
    }

    /// Draw one vitals snapshot. Temperature has one decimal.
    pub fn sample(&mut self, scenario: Scenario) -> Vitals {
        let r = ranges(scenario);
        let heart_rate = self.rng.gen_range(r.heart_rate.0..=r.heart_rate.1);
        let spo2 = self.rng.gen_range(r.spo2.0..=r.spo2.1);
        let temperature = self.rng.gen_range(r.temperature.0..=r.temperature.1);

        Vitals::new(
            f64::from(heart_rate),
            f64::from(spo2),
            (temperature * 10.0).round() / 10.0,
        )
    }

    /// Pick an ambulance id of the form `AMB-nnn`.
    pub fn ambulance_id(&mut self) -> String {
        format!("AMB-{}", self.rng.gen_range(100..=999))
    }

    /// Pick a patient name.
    pub fn patient_name(&mut self) -> &'static str {
        PATIENT_NAMES[self.rng.gen_range(0..PATIENT_NAMES.len())]
    }

    /// Delay before the next update, in whole seconds (2 to 4).
    pub fn interval_secs(&mut self) -> u64 {
        self.rng.gen_range(2..=4)
    }
}

impl Default for VitalsGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// One ambulance unit streaming a single patient.
pub struct AmbulanceSimulator {
    key: VitalsKey,
    ambulance_id: String,
    patient_name: String,
    scenario: Scenario,
    generator: VitalsGenerator,
    path: String,
}

impl AmbulanceSimulator {
    #[must_use]
    pub fn new(
        key: VitalsKey,
        ambulance_id: impl Into<String>,
        patient_name: impl Into<String>,
        scenario: Scenario,
        generator: VitalsGenerator,
    ) -> Self {
        Self {
            key,
            ambulance_id: ambulance_id.into(),
            patient_name: patient_name.into(),
            scenario,
            generator,
            path: crate::adapters::lines::DEFAULT_PATH.to_string(),
        }
    }

    /// Publish under a different store path.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    #[must_use]
    pub fn ambulance_id(&self) -> &str {
        &self.ambulance_id
    }

    #[must_use]
    pub fn scenario(&self) -> Scenario {
        self.scenario
    }

    /// Build the next plaintext record.
    pub fn next_record(&mut self, timestamp: i64) -> VitalsRecord {
        VitalsRecord {
            ambulance_id: self.ambulance_id.clone(),
            patient_name: self.patient_name.clone(),
            mode: self.scenario.mode(),
            timestamp,
            vitals: self.generator.sample(self.scenario),
        }
    }

    /// Build, seal and frame the next record.
    ///
    /// # Errors
    /// Returns `CipherError::Encryption` if sealing fails.
    pub fn next_notification(
        &mut self,
        timestamp: i64,
    ) -> Result<(VitalsRecord, Notification), CipherError> {
        let record = self.next_record(timestamp);
        let sealed = cipher::encrypt(&self.key, &record)?;
        tracing::debug!(
            ambulance = %self.ambulance_id,
            scenario = %self.scenario,
            "Sealed vitals record"
        );
        Ok((record, Notification::new(self.path.clone(), package::encode(&sealed))))
    }

    /// Delay before the next update, in whole seconds.
    pub fn interval_secs(&mut self) -> u64 {
        self.generator.interval_secs()
    }
}
