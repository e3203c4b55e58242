//! Background key derivation.
//!
//! PBKDF2 at production cost takes on the order of a second. Derivation runs
//! on its own thread so the caller stays responsive and can give up.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use thiserror::Error;
use zeroize::Zeroizing;

use crate::domain::{KdfError, KeyDeriver, VitalsKey};

/// Progress updates from the key setup worker.
#[derive(Debug, Clone)]
pub enum KeySetupProgress {
    /// Derivation started
    Deriving,
    /// Key is ready
    Ready(VitalsKey),
    /// Derivation rejected the passphrase or failed
    Failed(KdfError),
}

/// Why `KeySetupHandle::wait` returned no key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeySetupError {
    #[error(transparent)]
    Kdf(#[from] KdfError),

    #[error("Key setup was cancelled")]
    Cancelled,

    #[error("Key setup worker exited without a result")]
    WorkerLost,
}

/// Handle to a running key derivation.
pub struct KeySetupHandle {
    progress_rx: Receiver<KeySetupProgress>,
    cancelled: Arc<AtomicBool>,
    _handle: JoinHandle<()>,
}

impl KeySetupHandle {
    /// Try to receive the next progress update (non-blocking).
    ///
    /// Never yields `Ready` after `cancel`.
    #[must_use]
    pub fn try_recv(&self) -> Option<KeySetupProgress> {
        let progress = self.progress_rx.try_recv().ok()?;
        self.filter(progress)
    }

    /// Block until the worker finishes.
    ///
    /// # Errors
    /// Returns `KeySetupError` if derivation failed or was cancelled.
    pub fn wait(self) -> Result<VitalsKey, KeySetupError> {
        while let Ok(progress) = self.progress_rx.recv() {
            match self.filter(progress) {
                Some(KeySetupProgress::Ready(key)) => return Ok(key),
                Some(KeySetupProgress::Failed(e)) => return Err(e.into()),
                Some(KeySetupProgress::Deriving) => {}
                None => return Err(KeySetupError::Cancelled),
            }
        }

        if self.is_cancelled() {
            Err(KeySetupError::Cancelled)
        } else {
            Err(KeySetupError::WorkerLost)
        }
    }

    /// Abandon the setup. A key derived afterwards is dropped unused.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn filter(&self, progress: KeySetupProgress) -> Option<KeySetupProgress> {
        match progress {
            KeySetupProgress::Ready(_) if self.is_cancelled() => None,
            other => Some(other),
        }
    }
}

/// Worker that derives the channel key in the background.
pub struct KeySetupWorker;

impl KeySetupWorker {
    /// Spawn a background derivation.
    ///
    /// The passphrase is moved into the worker and zeroized when it finishes.
    #[must_use]
    pub fn spawn(deriver: KeyDeriver, passphrase: Zeroizing<String>) -> KeySetupHandle {
        let (tx, rx) = mpsc::channel();
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);

        let handle = thread::spawn(move || {
            Self::run_derivation(&deriver, &passphrase, &flag, &tx);
        });

        KeySetupHandle {
            progress_rx: rx,
            cancelled,
            _handle: handle,
        }
    }

    fn run_derivation(
        deriver: &KeyDeriver,
        passphrase: &str,
        cancelled: &AtomicBool,
        tx: &Sender<KeySetupProgress>,
    ) {
        if cancelled.load(Ordering::SeqCst) {
            return;
        }
        let _ = tx.send(KeySetupProgress::Deriving);

        // PBKDF2 has no interruption point; cancellation is honored once it returns.
        let result = deriver.derive(passphrase);

        if cancelled.load(Ordering::SeqCst) {
            tracing::debug!("Key setup cancelled, discarding derived key");
            return;
        }

        let progress = match result {
            Ok(key) => {
                tracing::info!(fingerprint = key.fingerprint(), "Channel key ready");
                KeySetupProgress::Ready(key)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Key setup failed");
                KeySetupProgress::Failed(e)
            }
        };
        let _ = tx.send(progress);
    }
}
