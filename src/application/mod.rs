//! Application layer: Use cases and services.
//!
//! Ties the domain pipeline to a notification source: key setup, the
//! per-session context, the consumer loop and the ambulance-side producer.

mod key_setup;
mod monitor;
mod session;
mod simulator;

pub use key_setup::{KeySetupError, KeySetupHandle, KeySetupProgress, KeySetupWorker};
pub use monitor::{MonitorEvent, MonitorHandle, MonitorWorker};
pub use session::{AmbulanceState, ConnectionStatus, MonitorSession, PipelineError, RecordUpdate};
pub use simulator::{AmbulanceSimulator, Scenario, UnknownScenario, VitalsGenerator, PATIENT_NAMES};
