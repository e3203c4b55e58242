//! Consumer loop for inbound notifications.
//!
//! One dedicated thread owns the `MonitorSession` and reports what happened
//! over a channel. Updates for an ambulance are therefore applied strictly in
//! delivery order. A separate reader thread drains the `NotificationSource`
//! so a source blocked waiting for data never holds the session open after
//! `shutdown()`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::ports::{Notification, NotificationSource};

use super::session::{ConnectionStatus, MonitorSession, PipelineError, RecordUpdate};

/// Events published by the monitor loop.
#[derive(Debug, Clone)]
pub enum MonitorEvent {
    /// A record was accepted
    Update(RecordUpdate),
    /// A notification was rejected; `path` is the store path it came from
    Rejected { path: String, error: PipelineError },
    /// Connection status changed
    Status(ConnectionStatus),
    /// The loop has exited and the session is closed
    Stopped,
}

/// What the session thread waits on.
enum Inbound {
    Notification(Result<Notification, String>),
    EndOfStream,
    Stop,
}

/// Handle to a running monitor loop.
///
/// Dropping the handle shuts the loop down.
pub struct MonitorHandle {
    events_rx: Receiver<MonitorEvent>,
    inbox: Sender<Inbound>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl MonitorHandle {
    /// Try to receive the next event (non-blocking).
    #[must_use]
    pub fn try_recv(&self) -> Option<MonitorEvent> {
        self.events_rx.try_recv().ok()
    }

    /// Block until the next event. `None` once the loop is gone.
    #[must_use]
    pub fn recv(&self) -> Option<MonitorEvent> {
        self.events_rx.recv().ok()
    }

    /// Block for at most `timeout`.
    #[must_use]
    pub fn recv_timeout(&self, timeout: Duration) -> Option<MonitorEvent> {
        self.events_rx.recv_timeout(timeout).ok()
    }

    /// Stop the loop and close the session.
    ///
    /// Takes effect even while the source is blocked. Notifications not yet
    /// processed are discarded.
    pub fn shutdown(&self) {
        self.stop.store(true, Ordering::SeqCst);
        let _ = self.inbox.send(Inbound::Stop);
    }

    /// Wait for the loop thread to exit.
    pub fn join(mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("Monitor thread panicked");
            }
        }
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Iterator for MonitorHandle {
    type Item = MonitorEvent;

    fn next(&mut self) -> Option<Self::Item> {
        self.recv()
    }
}

/// Monitor worker that runs the notification pipeline in background.
pub struct MonitorWorker;

impl MonitorWorker {
    /// Spawn the consumer loop. The session moves onto the worker thread.
    #[must_use]
    pub fn spawn<S>(session: MonitorSession, source: S) -> MonitorHandle
    where
        S: NotificationSource + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let (inbox, inbound) = mpsc::channel();
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);

        // Detached: it may stay blocked in the source after the loop is gone.
        let reader_inbox = inbox.clone();
        thread::spawn(move || Self::read_source(source, &reader_inbox));

        let handle = thread::spawn(move || {
            Self::run_loop(session, &inbound, &flag, &tx);
        });

        MonitorHandle {
            events_rx: rx,
            inbox,
            stop,
            handle: Some(handle),
        }
    }

    fn read_source<S>(mut source: S, inbox: &Sender<Inbound>)
    where
        S: NotificationSource,
    {
        loop {
            let inbound = match source.next_notification() {
                Some(next) => Inbound::Notification(next.map_err(|e| e.to_string())),
                None => Inbound::EndOfStream,
            };
            let done = matches!(inbound, Inbound::EndOfStream);
            if inbox.send(inbound).is_err() || done {
                break;
            }
        }
    }

    fn run_loop(
        mut session: MonitorSession,
        inbound: &Receiver<Inbound>,
        stop: &AtomicBool,
        tx: &Sender<MonitorEvent>,
    ) {
        tracing::info!("Monitor loop started");
        let mut last_status = session.mark_connected().clone();
        let mut consumer_alive = tx.send(MonitorEvent::Status(last_status.clone())).is_ok();

        while consumer_alive {
            let Ok(next) = inbound.recv() else {
                break;
            };
            if stop.load(Ordering::SeqCst) {
                break;
            }
            let next = match next {
                Inbound::Notification(next) => next,
                Inbound::EndOfStream => {
                    tracing::info!("Notification source closed");
                    break;
                }
                Inbound::Stop => break,
            };

            let event = match next {
                Ok(notification) => match session.process(&notification) {
                    Ok(update) => Some(MonitorEvent::Update(update)),
                    Err(PipelineError::Duplicate) => None,
                    Err(error) => Some(MonitorEvent::Rejected {
                        path: notification.path,
                        error,
                    }),
                },
                Err(message) => {
                    session.mark_channel_error(message);
                    None
                }
            };

            if session.status() != &last_status {
                last_status = session.status().clone();
                consumer_alive &= tx.send(MonitorEvent::Status(last_status.clone())).is_ok();
            }
            if let Some(event) = event {
                consumer_alive &= tx.send(event).is_ok();
            }
        }

        session.close();
        let _ = tx.send(MonitorEvent::Status(ConnectionStatus::Closed));
        let _ = tx.send(MonitorEvent::Stopped);
        tracing::info!("Monitor loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{channel, LineSource};
    use crate::domain::{
        cipher, package, Alarm, KdfParams, KeyDeriver, Mode, SeverityLevel, Vitals, VitalsKey,
        VitalsRecord,
    };
    use crate::ports::Notification;

    fn key(passphrase: &str) -> VitalsKey {
        KeyDeriver::new(KdfParams::for_tests())
            .derive(passphrase)
            .expect("derive")
    }

    fn wire(key: &VitalsKey, ts: i64, hr: f64, spo2: f64) -> String {
        let record = VitalsRecord {
            ambulance_id: "AMB-417".to_string(),
            patient_name: "Jane Roe".to_string(),
            mode: Mode::Urgent,
            timestamp: ts,
            vitals: Vitals::new(hr, spo2, 38.0),
        };
        package::encode(&cipher::encrypt(key, &record).expect("encrypt"))
    }

    fn collect(handle: MonitorHandle) -> Vec<MonitorEvent> {
        handle.collect()
    }

    #[test]
    fn test_processes_line_stream() {
        let producer = key("correct-horse");
        let input = format!(
            "{}\n{}\ngarbage\n{}\n",
            wire(&producer, 1, 80.0, 98.0),
            wire(&producer, 2, 130.0, 85.0),
            wire(&key("wrong-horse"), 3, 70.0, 99.0),
        );

        let session = MonitorSession::new(key("correct-horse"));
        let source = LineSource::new(std::io::Cursor::new(input));
        let events = collect(MonitorWorker::spawn(session, source));

        let updates: Vec<&RecordUpdate> = events
            .iter()
            .filter_map(|e| match e {
                MonitorEvent::Update(u) => Some(u),
                _ => None,
            })
            .collect();
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[1].classification.level, SeverityLevel::Critical);
        assert_eq!(updates[1].alarm, Alarm::Sounding);

        let rejected: Vec<&PipelineError> = events
            .iter()
            .filter_map(|e| match e {
                MonitorEvent::Rejected { error, .. } => Some(error),
                _ => None,
            })
            .collect();
        assert_eq!(rejected.len(), 2);
        assert!(matches!(rejected[0], PipelineError::Package(_)));
        assert!(matches!(rejected[1], PipelineError::Cipher(_)));

        let statuses: Vec<&ConnectionStatus> = events
            .iter()
            .filter_map(|e| match e {
                MonitorEvent::Status(s) => Some(s),
                _ => None,
            })
            .collect();
        assert_eq!(
            statuses,
            vec![
                &ConnectionStatus::AwaitingData,
                &ConnectionStatus::Receiving,
                &ConnectionStatus::MalformedPackage,
                &ConnectionStatus::IntegrityFailure,
                &ConnectionStatus::Closed,
            ]
        );
        assert!(matches!(events.last(), Some(MonitorEvent::Stopped)));
    }

    #[test]
    fn test_channel_errors_do_not_stop_the_loop() {
        let producer = key("correct-horse");
        let (publisher, source) = channel();
        let handle = MonitorWorker::spawn(MonitorSession::new(key("correct-horse")), source);

        publisher.report_error("store unreachable");
        publisher.publish(Notification::new("encrypted_vitals", wire(&producer, 1, 80.0, 98.0)));
        drop(publisher);

        let events = collect(handle);
        assert!(events.iter().any(|e| matches!(
            e,
            MonitorEvent::Status(ConnectionStatus::ChannelError(msg)) if msg.contains("store unreachable")
        )));
        assert!(events.iter().any(|e| matches!(e, MonitorEvent::Update(_))));
    }

    #[test]
    fn test_duplicates_are_silent() {
        let producer = key("correct-horse");
        let payload = wire(&producer, 5, 80.0, 98.0);
        let input = format!("{payload}\n{payload}\n");

        let session = MonitorSession::new(key("correct-horse"));
        let events = collect(MonitorWorker::spawn(
            session,
            LineSource::new(std::io::Cursor::new(input)),
        ));

        let updates = events.iter().filter(|e| matches!(e, MonitorEvent::Update(_))).count();
        let rejected = events.iter().filter(|e| matches!(e, MonitorEvent::Rejected { .. })).count();
        assert_eq!(updates, 1);
        assert_eq!(rejected, 0);
    }

    #[test]
    fn test_shutdown_stops_before_next_notification() {
        let producer = key("correct-horse");
        let (publisher, source) = channel();
        let handle = MonitorWorker::spawn(MonitorSession::new(key("correct-horse")), source);

        publisher.publish(Notification::new("encrypted_vitals", wire(&producer, 1, 80.0, 98.0)));
        loop {
            match handle.recv_timeout(Duration::from_secs(10)) {
                Some(MonitorEvent::Update(_)) => break,
                Some(_) => {}
                None => panic!("no update received"),
            }
        }

        handle.shutdown();
        // Arrives after shutdown and must not be processed.
        publisher.publish(Notification::new("encrypted_vitals", wire(&producer, 2, 80.0, 98.0)));

        let rest = collect(handle);
        assert!(!rest.iter().any(|e| matches!(e, MonitorEvent::Update(_))));
        assert!(matches!(rest.last(), Some(MonitorEvent::Stopped)));
        drop(publisher);
    }

    #[test]
    fn test_shutdown_while_source_blocked() {
        let (publisher, source) = channel();
        let handle = MonitorWorker::spawn(MonitorSession::new(key("correct-horse")), source);

        assert!(matches!(
            handle.recv_timeout(Duration::from_secs(10)),
            Some(MonitorEvent::Status(ConnectionStatus::AwaitingData))
        ));

        // The publisher stays alive, so the source never returns on its own.
        handle.shutdown();

        let mut rest = Vec::new();
        while let Some(event) = handle.recv_timeout(Duration::from_secs(5)) {
            let stopped = matches!(event, MonitorEvent::Stopped);
            rest.push(event);
            if stopped {
                break;
            }
        }
        assert!(rest
            .iter()
            .any(|e| matches!(e, MonitorEvent::Status(ConnectionStatus::Closed))));
        assert!(matches!(rest.last(), Some(MonitorEvent::Stopped)));

        handle.join();
        drop(publisher);
    }
}
