//! Vitalguard: hospital-side monitor.
//!
//! Reads encrypted vitals packages (one per line) from a file or stdin,
//! decrypts them with the channel key and prints triage updates.

use std::fs::File;
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, ValueHint};

use vitalguard::adapters::lines::DEFAULT_PATH;
use vitalguard::adapters::LineSource;
use vitalguard::application::{
    KeySetupWorker, MonitorEvent, MonitorHandle, MonitorSession, MonitorWorker, RecordUpdate,
};
use vitalguard::config::{load_passphrase, MonitorConfig};
use vitalguard::domain::{KeyDeriver, VitalsKey};

#[derive(Parser, Debug)]
#[command(name = "vitalguard", version, about = "Decrypt and triage live ambulance vitals")]
struct Opts {
    /// Notification file, one package per line ("-" for stdin)
    #[arg(short, long, value_hint = ValueHint::FilePath)]
    input: Option<PathBuf>,

    /// File holding the channel passphrase
    #[arg(short, long, value_hint = ValueHint::FilePath)]
    passphrase_file: Option<PathBuf>,

    /// Store path reported for lines without a "path<TAB>" prefix
    #[arg(long, default_value = DEFAULT_PATH)]
    path: String,

    /// Print updates as JSON lines
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    let opts = Opts::parse();
    let _guard = vitalguard::logging::init().context("Cannot initialize logging")?;

    let mut config = MonitorConfig::from_env()?;
    if let Some(input) = opts.input {
        config.input = (input != Path::new("-")).then_some(input);
    }

    tracing::info!("Starting Vitalguard...");
    let key = derive_key(&config, opts.passphrase_file.as_deref())?;
    let session = MonitorSession::new(key);

    let handle = match &config.input {
        Some(file) => {
            let reader = File::open(file)
                .with_context(|| format!("Cannot open input {}", file.display()))?;
            MonitorWorker::spawn(
                session,
                LineSource::with_default_path(BufReader::new(reader), opts.path),
            )
        }
        None => MonitorWorker::spawn(
            session,
            LineSource::with_default_path(BufReader::new(std::io::stdin()), opts.path),
        ),
    };

    print_events(handle, opts.json)?;

    tracing::info!("Vitalguard shutdown complete.");
    Ok(())
}

fn derive_key(
    config: &MonitorConfig,
    passphrase_file: Option<&Path>,
) -> vitalguard::Result<VitalsKey> {
    if config.kdf.uses_shared_salt() {
        tracing::warn!(
            "Using the shared default KDF salt; set VITALGUARD_KDF_SALT to a provisioned value"
        );
    }

    let passphrase = load_passphrase(passphrase_file)?;
    eprintln!("Deriving channel key...");
    let key = KeySetupWorker::spawn(KeyDeriver::new(config.kdf), passphrase).wait()?;
    eprintln!("Channel key ready (fingerprint {})", key.fingerprint());
    Ok(key)
}

fn print_events(handle: MonitorHandle, json: bool) -> Result<()> {
    let stdout = std::io::stdout();
    for event in handle {
        let mut out = stdout.lock();
        match event {
            MonitorEvent::Update(update) if json => {
                writeln!(out, "{}", update_json(&update))?;
            }
            MonitorEvent::Update(update) => {
                writeln!(out, "{}", update_line(&update))?;
            }
            MonitorEvent::Rejected { path, error } => {
                eprintln!("[{path}] rejected: {error}");
            }
            MonitorEvent::Status(status) => {
                eprintln!("-- {status}");
            }
            MonitorEvent::Stopped => break,
        }
        out.flush()?;
    }
    Ok(())
}

fn update_line(update: &RecordUpdate) -> String {
    let record = &update.record;
    let time = record
        .recorded_at()
        .map_or_else(|| "--:--:--".to_string(), |t| t.format("%H:%M:%S").to_string());
    format!(
        "[{time}] {} {} ({}) | HR {:.0} bpm | SpO2 {:.0}% | Temp {:.1} C | {} | {} | {}",
        record.ambulance_id,
        record.patient_name,
        record.mode,
        record.vitals.heart_rate,
        record.vitals.spo2,
        record.vitals.temperature,
        update.trend,
        update.classification.banner(),
        update.alarm,
    )
}

fn update_json(update: &RecordUpdate) -> serde_json::Value {
    serde_json::json!({
        "path": update.path,
        "record": update.record,
        "trend": update.trend.label(),
        "classification": update.classification,
        "alarm": update.alarm.is_sounding(),
    })
}
