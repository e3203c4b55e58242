//! Ambulance unit simulator.
//!
//! Streams synthetic vitals for one patient as encrypted packages, one per
//! line on stdout, ready to pipe into `vitalguard`.
//!
//! # Usage
//!
//! ```bash
//! ambulance_sim --scenario critical --count 20 --passphrase-file ./secret | vitalguard
//! ```
//!
//! # Security
//!
//! - The passphrase is sourced the same way as the monitor's
//! - Every package uses a fresh random nonce

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueHint};

use vitalguard::application::{AmbulanceSimulator, KeySetupWorker, Scenario, VitalsGenerator};
use vitalguard::config::{load_passphrase, MonitorConfig};
use vitalguard::domain::KeyDeriver;

#[derive(Parser, Debug)]
#[command(name = "ambulance_sim", version, about = "Emit encrypted ambulance vitals")]
struct Opts {
    /// Patient condition: stable, urgent or critical
    #[arg(short, long, default_value = "stable")]
    scenario: Scenario,

    /// Ambulance id (random AMB-nnn if omitted)
    #[arg(short, long)]
    ambulance_id: Option<String>,

    /// Patient name (picked from a built-in list if omitted)
    #[arg(long)]
    patient: Option<String>,

    /// Number of packages to emit; 0 runs until interrupted
    #[arg(short = 'n', long, default_value_t = 10)]
    count: u64,

    /// Seed for reproducible vitals
    #[arg(long)]
    seed: Option<u64>,

    /// Seconds between packages (random 2 to 4 if omitted)
    #[arg(long, value_name = "SECS")]
    interval: Option<u64>,

    /// Prefix each line with "<path><TAB>"
    #[arg(long)]
    path: Option<String>,

    /// File holding the channel passphrase
    #[arg(short, long, value_hint = ValueHint::FilePath)]
    passphrase_file: Option<PathBuf>,
}

fn main() -> Result<()> {
    let opts = Opts::parse();
    let _guard = vitalguard::logging::init().context("Cannot initialize logging")?;

    let config = MonitorConfig::from_env()?;
    let passphrase = load_passphrase(opts.passphrase_file.as_deref())?;
    eprintln!("Deriving channel key...");
    let key = KeySetupWorker::spawn(KeyDeriver::new(config.kdf), passphrase)
        .wait()
        .context("Key setup failed")?;

    let mut generator = opts
        .seed
        .map_or_else(VitalsGenerator::new, VitalsGenerator::seeded);
    let ambulance_id = opts.ambulance_id.unwrap_or_else(|| generator.ambulance_id());
    let patient = opts
        .patient
        .unwrap_or_else(|| generator.patient_name().to_string());

    eprintln!("--- Starting Simulation ---");
    eprintln!("Ambulance: {ambulance_id}");
    eprintln!("Mode: {}", opts.scenario.to_string().to_uppercase());
    eprintln!("Key fingerprint: {}", key.fingerprint());

    let mut sim = AmbulanceSimulator::new(key, ambulance_id, patient, opts.scenario, generator);
    if let Some(path) = &opts.path {
        sim = sim.with_path(path.clone());
    }

    let stdout = std::io::stdout();
    let mut sent: u64 = 0;
    while opts.count == 0 || sent < opts.count {
        if sent > 0 {
            let secs = opts.interval.unwrap_or_else(|| sim.interval_secs());
            std::thread::sleep(Duration::from_secs(secs));
        }

        let (record, notification) = sim
            .next_notification(chrono::Utc::now().timestamp())
            .context("Failed to encrypt vitals")?;
        sent += 1;

        let mut out = stdout.lock();
        if opts.path.is_some() {
            writeln!(out, "{}\t{}", notification.path, notification.payload)?;
        } else {
            writeln!(out, "{}", notification.payload)?;
        }
        out.flush()?;

        eprintln!(
            "[OK] Update #{sent} ({}) | HR: {:.0} | SpO2: {:.0}%",
            record.mode, record.vitals.heart_rate, record.vitals.spo2
        );
        tracing::debug!(
            ambulance = %sim.ambulance_id(),
            scenario = %sim.scenario(),
            count = sent,
            "Package emitted"
        );
    }

    Ok(())
}
