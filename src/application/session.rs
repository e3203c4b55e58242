//! Per-session pipeline context.
//!
//! A `MonitorSession` owns everything one viewer needs to turn notifications
//! into updates: the channel key, a trend window and last classification per
//! ambulance, and the connection status shown to the operator.
//!
//! # Security
//!
//! - A package is only trusted after authentication; rejected packages never
//!   touch per-ambulance state
//! - `close()` drops the key (zeroized) and every window

use std::collections::HashMap;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::domain::{
    cipher, classify, package, Alarm, CipherError, Classification, CodecError, EncryptedPackage,
    SeverityLevel, TrendDirection, TrendEstimator, Vitals, VitalsKey, VitalsRecord,
};
use crate::ports::Notification;

/// Why a notification produced no update.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Package(#[from] CodecError),

    #[error(transparent)]
    Cipher(#[from] CipherError),

    /// Same record delivered twice.
    #[error("Duplicate delivery of an already processed record")]
    Duplicate,

    #[error("Session is closed")]
    SessionClosed,
}

/// Connection status line shown to the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connecting,
    AwaitingData,
    Receiving,
    /// Authentication failed: wrong key or tampered package
    IntegrityFailure,
    /// Authentic payload in an unexpected shape
    ProtocolMismatch,
    MalformedPackage,
    ChannelError(String),
    Closed,
}

impl ConnectionStatus {
    /// Whether the status reports a problem.
    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Self::IntegrityFailure
                | Self::ProtocolMismatch
                | Self::MalformedPackage
                | Self::ChannelError(_)
        )
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connecting => write!(f, "Connecting..."),
            Self::AwaitingData => write!(f, "Connected. Waiting for data..."),
            Self::Receiving => write!(f, "Receiving live data"),
            Self::IntegrityFailure => write!(f, "Error: Decryption Failed. Check Key/Integrity!"),
            Self::ProtocolMismatch => write!(f, "Error: Unexpected data format from ambulance"),
            Self::MalformedPackage => write!(f, "Error: Malformed package received"),
            Self::ChannelError(msg) => write!(f, "Error: Channel failure ({msg})"),
            Self::Closed => write!(f, "Disconnected"),
        }
    }
}

/// Latest known state of one ambulance.
#[derive(Debug, Clone)]
pub struct AmbulanceState {
    trend: TrendEstimator,
    last_record: VitalsRecord,
    classification: Classification,
    /// Nonce of the last accepted package; a redelivery repeats it
    last_nonce: Vec<u8>,
}

impl AmbulanceState {
    /// Most recent accepted record.
    #[must_use]
    pub fn last_record(&self) -> &VitalsRecord {
        &self.last_record
    }

    #[must_use]
    pub fn classification(&self) -> &Classification {
        &self.classification
    }

    #[must_use]
    pub fn trend(&self) -> TrendDirection {
        self.trend.direction()
    }

    /// Heart-rate window, oldest first.
    pub fn heart_rates(&self) -> impl Iterator<Item = f64> + '_ {
        self.trend.values()
    }

    #[must_use]
    pub fn alarm(&self) -> Alarm {
        self.classification.alarm()
    }

    fn is_redelivery_of(&self, package: &EncryptedPackage) -> bool {
        self.last_nonce == package.nonce
    }
}

/// Everything a presenter needs for one accepted record.
#[derive(Debug, Clone)]
pub struct RecordUpdate {
    pub path: String,
    pub record: VitalsRecord,
    pub trend: TrendDirection,
    pub classification: Classification,
    /// Alarm for this ambulance after the record
    pub alarm: Alarm,
}

impl RecordUpdate {
    #[must_use]
    pub fn vitals(&self) -> &Vitals {
        &self.record.vitals
    }
}

/// Pipeline context for one viewer session.
pub struct MonitorSession {
    key: Option<VitalsKey>,
    ambulances: HashMap<String, AmbulanceState>,
    status: ConnectionStatus,
}

impl std::fmt::Debug for MonitorSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorSession")
            .field("key", &self.key.as_ref().map(VitalsKey::fingerprint))
            .field("ambulances", &self.ambulances.len())
            .field("status", &self.status)
            .finish()
    }
}

impl MonitorSession {
    /// Start a session with a derived key.
    #[must_use]
    pub fn new(key: VitalsKey) -> Self {
        info!(fingerprint = key.fingerprint(), "Monitor session opened");
        Self {
            key: Some(key),
            ambulances: HashMap::new(),
            status: ConnectionStatus::Connecting,
        }
    }

    #[must_use]
    pub fn status(&self) -> &ConnectionStatus {
        &self.status
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.key.is_none()
    }

    /// Fingerprint of the session key, `None` once closed.
    #[must_use]
    pub fn key_fingerprint(&self) -> Option<&str> {
        self.key.as_ref().map(VitalsKey::fingerprint)
    }

    /// The channel subscription is live.
    pub fn mark_connected(&mut self) -> &ConnectionStatus {
        if !self.is_closed() {
            self.status = if self.ambulances.is_empty() {
                ConnectionStatus::AwaitingData
            } else {
                ConnectionStatus::Receiving
            };
        }
        &self.status
    }

    /// The channel reported a failure. Per-ambulance state is kept.
    pub fn mark_channel_error(&mut self, message: impl Into<String>) -> &ConnectionStatus {
        if !self.is_closed() {
            let message = message.into();
            warn!(error = %message, "Notification channel error");
            self.status = ConnectionStatus::ChannelError(message);
        }
        &self.status
    }

    /// Run one notification through decode, decrypt, trend and classify.
    ///
    /// # Errors
    /// Returns `PipelineError` if the notification is rejected. The status is
    /// updated and no per-ambulance state changes.
    pub fn process(&mut self, notification: &Notification) -> Result<RecordUpdate, PipelineError> {
        let Some(key) = self.key.as_ref() else {
            return Err(PipelineError::SessionClosed);
        };

        let opened = package::decode(&notification.payload)
            .map_err(PipelineError::from)
            .and_then(|pkg| {
                let record = cipher::decrypt(key, &pkg)?;
                Ok((pkg, record))
            });
        let (pkg, record) = match opened {
            Ok(opened) => opened,
            Err(e) => {
                self.status = match &e {
                    PipelineError::Cipher(CipherError::MalformedPayload(_)) => {
                        ConnectionStatus::ProtocolMismatch
                    }
                    PipelineError::Package(_) => ConnectionStatus::MalformedPackage,
                    _ => ConnectionStatus::IntegrityFailure,
                };
                warn!(path = %notification.path, error = %e, "Rejected notification");
                return Err(e);
            }
        };

        if self
            .ambulances
            .get(&record.ambulance_id)
            .is_some_and(|state| state.is_redelivery_of(&pkg))
        {
            debug!(ambulance = %record.ambulance_id, "Skipping duplicate delivery");
            self.status = ConnectionStatus::Receiving;
            return Err(PipelineError::Duplicate);
        }

        let classification = classify(&record.vitals);
        let state = self
            .ambulances
            .entry(record.ambulance_id.clone())
            .or_insert_with(|| AmbulanceState {
                trend: TrendEstimator::new(),
                last_record: record.clone(),
                classification: classification.clone(),
                last_nonce: Vec::new(),
            });

        let trend = state.trend.observe(record.vitals.heart_rate);
        state.last_record = record.clone();
        state.classification = classification.clone();
        state.last_nonce = pkg.nonce;
        self.status = ConnectionStatus::Receiving;

        debug!(
            ambulance = %record.ambulance_id,
            level = %classification.level,
            trend = trend.label(),
            "Processed vitals record"
        );

        Ok(RecordUpdate {
            path: notification.path.clone(),
            alarm: classification.alarm(),
            record,
            trend,
            classification,
        })
    }

    /// Session-wide alarm: sounding while any ambulance is critical.
    #[must_use]
    pub fn alarm(&self) -> Alarm {
        let critical = self
            .ambulances
            .values()
            .any(|s| s.classification.level == SeverityLevel::Critical);
        Alarm::for_level(if critical {
            SeverityLevel::Critical
        } else {
            SeverityLevel::Stable
        })
    }

    #[must_use]
    pub fn ambulance(&self, ambulance_id: &str) -> Option<&AmbulanceState> {
        self.ambulances.get(ambulance_id)
    }

    /// Known ambulance ids, sorted.
    #[must_use]
    pub fn ambulance_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.ambulances.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Discard the key and every window. Later calls to `process` fail.
    pub fn close(&mut self) {
        if self.key.take().is_some() {
            info!("Monitor session closed");
        }
        self.ambulances.clear();
        self.status = ConnectionStatus::Closed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{KdfParams, KeyDeriver, Mode};

    fn key(passphrase: &str) -> VitalsKey {
        KeyDeriver::new(KdfParams::for_tests())
            .derive(passphrase)
            .expect("derive")
    }

    fn record(ambulance: &str, ts: i64, hr: f64, spo2: f64) -> VitalsRecord {
        VitalsRecord {
            ambulance_id: ambulance.to_string(),
            patient_name: "Jane Roe".to_string(),
            mode: Mode::Critical,
            timestamp: ts,
            vitals: Vitals::new(hr, spo2, 39.1),
        }
    }

    fn sealed(key: &VitalsKey, record: &VitalsRecord) -> Notification {
        let pkg = cipher::encrypt(key, record).expect("encrypt");
        Notification::new("encrypted_vitals", package::encode(&pkg))
    }

    #[test]
    fn test_new_session_is_connecting() {
        let mut session = MonitorSession::new(key("correct-horse"));
        assert_eq!(session.status(), &ConnectionStatus::Connecting);
        assert_eq!(session.mark_connected(), &ConnectionStatus::AwaitingData);
        assert_eq!(session.alarm(), Alarm::Silent);
    }

    #[test]
    fn test_critical_record_end_to_end() {
        let producer = key("correct-horse");
        let mut session = MonitorSession::new(key("correct-horse"));

        let update = session
            .process(&sealed(&producer, &record("AMB-417", 1_760_000_000, 130.0, 92.0)))
            .expect("Should accept");

        assert_eq!(update.record.ambulance_id, "AMB-417");
        assert_eq!(update.classification.level, SeverityLevel::Critical);
        assert_eq!(update.classification.banner(), "CRITICAL - Critical Heart Rate");
        assert_eq!(update.trend, TrendDirection::Insufficient);
        assert_eq!(update.alarm, Alarm::Sounding);
        assert_eq!(session.alarm(), Alarm::Sounding);
        assert_eq!(session.status(), &ConnectionStatus::Receiving);
    }

    #[test]
    fn test_wrong_key_leaves_state_untouched() {
        let producer = key("correct-horse");
        let mut session = MonitorSession::new(key("correct-horse"));
        session
            .process(&sealed(&producer, &record("AMB-417", 1, 80.0, 98.0)))
            .expect("accept");

        let intruder = key("wrong-horse");
        let err = session
            .process(&sealed(&intruder, &record("AMB-417", 2, 150.0, 82.0)))
            .unwrap_err();

        assert_eq!(err, PipelineError::Cipher(CipherError::DecryptionFailed));
        assert_eq!(session.status(), &ConnectionStatus::IntegrityFailure);
        assert_eq!(session.alarm(), Alarm::Silent);

        let state = session.ambulance("AMB-417").expect("known ambulance");
        assert_eq!(state.heart_rates().collect::<Vec<_>>(), vec![80.0]);
        assert_eq!(state.last_record().timestamp, 1);
    }

    #[test]
    fn test_session_recovers_after_rejection() {
        let producer = key("correct-horse");
        let mut session = MonitorSession::new(key("correct-horse"));

        let err = session
            .process(&Notification::new("encrypted_vitals", "not json"))
            .unwrap_err();
        assert!(matches!(err, PipelineError::Package(_)));
        assert_eq!(session.status(), &ConnectionStatus::MalformedPackage);

        session
            .process(&sealed(&producer, &record("AMB-1", 1, 80.0, 98.0)))
            .expect("accept after rejection");
        assert_eq!(session.status(), &ConnectionStatus::Receiving);
    }

    #[test]
    fn test_trend_builds_per_ambulance() {
        let producer = key("correct-horse");
        let mut session = MonitorSession::new(key("correct-horse"));

        let mut last = TrendDirection::Insufficient;
        for (i, hr) in [60.0, 60.0, 60.0, 80.0, 80.0].into_iter().enumerate() {
            last = session
                .process(&sealed(&producer, &record("AMB-1", i as i64, hr, 98.0)))
                .expect("accept")
                .trend;
            // interleaved traffic from another unit
            session
                .process(&sealed(&producer, &record("AMB-2", i as i64, 75.0, 98.0)))
                .expect("accept");
        }

        assert_eq!(last, TrendDirection::Rising);
        assert_eq!(session.ambulance("AMB-2").expect("AMB-2").trend(), TrendDirection::Stable);
        assert_eq!(session.ambulance_ids(), vec!["AMB-1", "AMB-2"]);
    }

    #[test]
    fn test_redelivered_notification_ignored() {
        let producer = key("correct-horse");
        let mut session = MonitorSession::new(key("correct-horse"));
        let note = sealed(&producer, &record("AMB-1", 10, 80.0, 98.0));

        session.process(&note).expect("accept");
        // At-least-once delivery repeats the exact same package.
        let err = session.process(&note).unwrap_err();
        assert_eq!(err, PipelineError::Duplicate);

        let state = session.ambulance("AMB-1").expect("known");
        assert_eq!(state.heart_rates().count(), 1);
    }

    #[test]
    fn test_distinct_records_in_same_second_both_accepted() {
        let producer = key("correct-horse");
        let mut session = MonitorSession::new(key("correct-horse"));

        // Fractional timestamps from the producer truncate to the same second.
        for ts in ["1760000000.2", "1760000000.9"] {
            let plaintext = format!(
                r#"{{"ambulance_id": "AMB-1", "patient_name": "Jane Roe", "mode": "stable", "timestamp": {ts}, "vitals": {{"heart_rate": 80, "spO2": 98, "temperature": 36.8}}}}"#
            );
            let record: VitalsRecord = serde_json::from_str(&plaintext).expect("parse");
            session
                .process(&sealed(&producer, &record))
                .expect("Distinct record should be accepted");
        }

        let state = session.ambulance("AMB-1").expect("known");
        assert_eq!(state.heart_rates().count(), 2);
    }

    #[test]
    fn test_repeated_vitals_are_new_samples() {
        let producer = key("correct-horse");
        let mut session = MonitorSession::new(key("correct-horse"));
        let same = record("AMB-1", 10, 80.0, 98.0);

        session.process(&sealed(&producer, &same)).expect("accept");
        session.process(&sealed(&producer, &same)).expect("accept");
        assert_eq!(session.ambulance("AMB-1").expect("known").heart_rates().count(), 2);
    }

    #[test]
    fn test_alarm_clears_when_vitals_recover() {
        let producer = key("correct-horse");
        let mut session = MonitorSession::new(key("correct-horse"));

        session
            .process(&sealed(&producer, &record("AMB-1", 1, 40.0, 98.0)))
            .expect("accept");
        assert!(session.alarm().is_sounding());

        let update = session
            .process(&sealed(&producer, &record("AMB-1", 2, 80.0, 98.0)))
            .expect("accept");
        assert_eq!(update.alarm, Alarm::Silent);
        assert!(!session.alarm().is_sounding());
    }

    #[test]
    fn test_alarm_sounds_while_any_ambulance_critical() {
        let producer = key("correct-horse");
        let mut session = MonitorSession::new(key("correct-horse"));

        session
            .process(&sealed(&producer, &record("AMB-1", 1, 130.0, 85.0)))
            .expect("accept");
        let update = session
            .process(&sealed(&producer, &record("AMB-2", 1, 80.0, 98.0)))
            .expect("accept");

        assert_eq!(update.alarm, Alarm::Silent);
        assert_eq!(session.alarm(), Alarm::Sounding);
    }

    #[test]
    fn test_channel_error_keeps_state() {
        let producer = key("correct-horse");
        let mut session = MonitorSession::new(key("correct-horse"));
        session
            .process(&sealed(&producer, &record("AMB-1", 1, 130.0, 85.0)))
            .expect("accept");

        let status = session.mark_channel_error("store unreachable").clone();
        assert!(status.is_error());
        assert!(session.alarm().is_sounding());
        assert_eq!(session.mark_connected(), &ConnectionStatus::Receiving);
    }

    #[test]
    fn test_close_discards_everything() {
        let producer = key("correct-horse");
        let mut session = MonitorSession::new(key("correct-horse"));
        let note = sealed(&producer, &record("AMB-1", 1, 130.0, 85.0));
        session.process(&note).expect("accept");

        session.close();
        assert!(session.is_closed());
        assert!(session.key_fingerprint().is_none());
        assert!(session.ambulance("AMB-1").is_none());
        assert_eq!(session.alarm(), Alarm::Silent);
        assert_eq!(session.status(), &ConnectionStatus::Closed);
        assert_eq!(session.process(&note).unwrap_err(), PipelineError::SessionClosed);
        assert_eq!(session.mark_connected(), &ConnectionStatus::Closed);
    }

    #[test]
    fn test_debug_hides_patient_and_key() {
        let producer = key("correct-horse");
        let mut session = MonitorSession::new(key("correct-horse"));
        let update = session
            .process(&sealed(&producer, &record("AMB-1", 1, 80.0, 98.0)))
            .expect("accept");

        assert!(!format!("{update:?}").contains("Jane Roe"));
        let debug_output = format!("{session:?}");
        assert!(debug_output.contains(session.key_fingerprint().expect("open")));
    }

    #[test]
    fn test_status_lines() {
        assert_eq!(
            ConnectionStatus::IntegrityFailure.to_string(),
            "Error: Decryption Failed. Check Key/Integrity!"
        );
        assert_eq!(
            ConnectionStatus::AwaitingData.to_string(),
            "Connected. Waiting for data..."
        );
        assert!(!ConnectionStatus::Receiving.is_error());
    }
}
