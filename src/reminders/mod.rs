//! Timed reminders with a background due-date poll loop.
//!
//! `reminders.json` is a flat JSON array:
//! ```json
//! [
//!   {
//!     "id": "1735689600000",
//!     "title": "Call mom",
//!     "due_date": "2030-01-01 09:00",
//!     "note": "",
//!     "completed": false
//!   }
//! ]
//! ```
//! Each reminder moves `PENDING -> FIRED` (terminal) exactly once, when a
//! scan observes `due_date <= now`. Firing marks the reminder completed and
//! persists *before* the event leaves this module, so a crash mid-delivery
//! can at most double-fire once after restart.
//!
//! The poll task talks to the foreground only through an mpsc channel of
//! [`ReminderEvent`]s; a single consumer speaks them. Adding a reminder
//! while the task runs needs no restart — every cycle re-scans the full
//! list, so new entries are picked up on the next tick.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Fixed due-date format.
pub const DUE_FORMAT: &str = "%Y-%m-%d %H:%M";

/// How often the background task scans for due reminders.
pub const POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Bounded wait for the poll task to observe a stop signal.
const STOP_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reminder {
    pub id: String,
    pub title: String,
    /// `YYYY-MM-DD HH:MM`. Entries that stop parsing (e.g. after manual
    /// edits) are skipped by the scan, never an error.
    pub due_date: String,
    #[serde(default)]
    pub note: String,
    #[serde(default)]
    pub completed: bool,
}

/// A due reminder, emitted by the poll task after it has been marked fired.
#[derive(Debug, Clone)]
pub struct ReminderEvent {
    pub id: String,
    pub message: String,
}

struct Worker {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

pub struct ReminderSystem {
    path: PathBuf,
    state: Mutex<Vec<Reminder>>,
    worker: Mutex<Option<Worker>>,
    poll_interval: Duration,
}

impl ReminderSystem {
    /// Open the reminder list at `path`. Missing or corrupt files degrade
    /// to an empty list.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self::with_poll_interval(path, POLL_INTERVAL)
    }

    /// Open with a custom poll cadence (the production cadence is
    /// [`POLL_INTERVAL`]).
    pub fn with_poll_interval(path: impl Into<PathBuf>, poll_interval: Duration) -> Self {
        let path = path.into();
        let reminders = match std::fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                warn!("Corrupt reminders file {}: {}", path.display(), e);
                Vec::new()
            }),
            Err(_) => Vec::new(),
        };
        Self {
            path,
            state: Mutex::new(reminders),
            worker: Mutex::new(None),
            poll_interval,
        }
    }

    /// Add a reminder due at `due_str` (`YYYY-MM-DD HH:MM`). An unparseable
    /// due date is an error and leaves the list untouched. Returns the new
    /// reminder's id.
    pub fn add(&self, title: &str, due_str: &str, note: &str) -> anyhow::Result<String> {
        NaiveDateTime::parse_from_str(due_str, DUE_FORMAT).map_err(|e| {
            anyhow::anyhow!("Invalid due date {:?} (expected YYYY-MM-DD HH:MM): {}", due_str, e)
        })?;

        let mut reminders = self.state.lock().unwrap();
        let id = next_id(&reminders);
        reminders.push(Reminder {
            id: id.clone(),
            title: title.to_string(),
            due_date: due_str.to_string(),
            note: note.to_string(),
            completed: false,
        });
        self.persist(&reminders)?;
        info!(id = %id, due = %due_str, "Reminder added");
        Ok(id)
    }

    /// Remove a reminder by id. Returns whether anything was removed.
    pub fn remove(&self, id: &str) -> anyhow::Result<bool> {
        let mut reminders = self.state.lock().unwrap();
        let before = reminders.len();
        reminders.retain(|r| r.id != id);
        let removed = reminders.len() != before;
        if removed {
            self.persist(&reminders)?;
        }
        Ok(removed)
    }

    /// Mark a reminder as fired. Idempotent: completing an already-fired
    /// reminder is a no-op success.
    pub fn complete(&self, id: &str) -> anyhow::Result<()> {
        let mut reminders = self.state.lock().unwrap();
        let Some(reminder) = reminders.iter_mut().find(|r| r.id == id) else {
            anyhow::bail!("No reminder with id {}", id);
        };
        if reminder.completed {
            return Ok(());
        }
        reminder.completed = true;
        self.persist(&reminders)
    }

    /// All reminders in insertion order, optionally including fired ones.
    /// Callers needing chronological order must sort.
    pub fn list(&self, include_fired: bool) -> Vec<Reminder> {
        let reminders = self.state.lock().unwrap();
        reminders
            .iter()
            .filter(|r| include_fired || !r.completed)
            .cloned()
            .collect()
    }

    /// Fire every pending reminder whose due date is at or before `now`.
    /// Each fired reminder is marked completed and persisted before its
    /// event is returned to the caller for delivery.
    pub fn fire_due(&self, now: NaiveDateTime) -> Vec<ReminderEvent> {
        let mut reminders = self.state.lock().unwrap();
        let mut events = Vec::new();
        let mut dirty = false;

        for reminder in reminders.iter_mut() {
            if reminder.completed {
                continue;
            }
            let due = match NaiveDateTime::parse_from_str(&reminder.due_date, DUE_FORMAT) {
                Ok(due) => due,
                Err(_) => {
                    debug!(id = %reminder.id, "Skipping reminder with unparseable due date");
                    continue;
                }
            };
            if due <= now {
                reminder.completed = true;
                dirty = true;
                let mut message = format!("Reminder: {}", reminder.title);
                if !reminder.note.is_empty() {
                    message.push_str(&format!(" - {}", reminder.note));
                }
                events.push(ReminderEvent {
                    id: reminder.id.clone(),
                    message,
                });
            }
        }

        if dirty {
            if let Err(e) = self.persist(&reminders) {
                warn!("Failed to persist fired reminders: {}", e);
            }
        }
        events
    }

    /// Start the background poll task, delivering due reminders on
    /// `events`. Idempotent while a task is already running.
    pub fn start(self: &Arc<Self>, events: mpsc::UnboundedSender<ReminderEvent>) {
        let mut worker = self.worker.lock().unwrap();
        if let Some(w) = worker.as_ref() {
            if !w.handle.is_finished() {
                debug!("Reminder poll task already running");
                return;
            }
        }

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let system = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(system.poll_interval);
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        debug!("Reminder poll task stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        for event in system.fire_due(Local::now().naive_local()) {
                            info!(id = %event.id, "Reminder due");
                            if events.send(event).is_err() {
                                // Consumer gone — nothing left to deliver to.
                                return;
                            }
                        }
                    }
                }
            }
        });

        *worker = Some(Worker {
            shutdown: shutdown_tx,
            handle,
        });
        info!("Reminder poll task started");
    }

    /// Signal the poll task to exit and wait briefly for it to observe the
    /// signal.
    pub async fn stop(&self) {
        let worker = self.worker.lock().unwrap().take();
        if let Some(w) = worker {
            let _ = w.shutdown.send(true);
            if tokio::time::timeout(STOP_JOIN_TIMEOUT, w.handle).await.is_err() {
                warn!("Reminder poll task did not stop in time");
            }
        }
    }

    /// Atomic write: temp file in the same directory, then rename.
    fn persist(&self, reminders: &[Reminder]) -> anyhow::Result<()> {
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)?;
        let tmp = dir.join(format!(".reminders.{}.tmp", std::process::id()));
        let json = serde_json::to_string_pretty(reminders)?;
        std::fs::write(&tmp, &json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// Time-derived unique id: epoch milliseconds, bumped past collisions.
fn next_id(existing: &[Reminder]) -> String {
    let mut candidate = Local::now().timestamp_millis();
    loop {
        let id = candidate.to_string();
        if !existing.iter().any(|r| r.id == id) {
            return id;
        }
        candidate += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_temp() -> (tempfile::TempDir, Arc<ReminderSystem>) {
        let dir = tempfile::tempdir().unwrap();
        let system = Arc::new(ReminderSystem::open(dir.path().join("reminders.json")));
        (dir, system)
    }

    fn parse(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, DUE_FORMAT).unwrap()
    }

    #[test]
    fn added_reminder_is_listed_pending() {
        let (_dir, system) = open_temp();
        system.add("Call mom", "2030-01-01 09:00", "").unwrap();
        let pending = system.list(false);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].title, "Call mom");
        assert!(!pending[0].completed);
    }

    #[test]
    fn bad_due_date_is_rejected_without_mutation() {
        let (_dir, system) = open_temp();
        assert!(system.add("x", "not-a-date", "").is_err());
        assert!(system.list(true).is_empty());
    }

    #[test]
    fn due_reminder_fires_exactly_once() {
        let (_dir, system) = open_temp();
        let id = system.add("Call mom", "2030-01-01 09:00", "").unwrap();

        // Not due yet.
        assert!(system.fire_due(parse("2029-12-31 23:59")).is_empty());

        // Simulated time advance past the due date: fires once.
        let events = system.fire_due(parse("2030-01-01 09:00"));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, id);
        assert_eq!(events[0].message, "Reminder: Call mom");

        // Fired state is terminal; a second scan fires nothing.
        assert!(system.fire_due(parse("2030-01-01 10:00")).is_empty());
        assert!(system.list(false).is_empty());
        assert!(system.list(true)[0].completed);
    }

    #[test]
    fn fired_event_includes_note() {
        let (_dir, system) = open_temp();
        system.add("Standup", "2030-01-01 09:00", "bring notes").unwrap();
        let events = system.fire_due(parse("2030-01-02 00:00"));
        assert_eq!(events[0].message, "Reminder: Standup - bring notes");
    }

    #[test]
    fn unparseable_stored_due_date_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reminders.json");
        std::fs::write(
            &path,
            r#"[
                {"id": "1", "title": "broken", "due_date": "someday", "note": "", "completed": false},
                {"id": "2", "title": "ok", "due_date": "2020-01-01 09:00", "note": "", "completed": false}
            ]"#,
        )
        .unwrap();
        let system = ReminderSystem::open(&path);
        let events = system.fire_due(parse("2030-01-01 00:00"));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, "2");
        // The broken entry stays pending and never crashes the scan.
        assert_eq!(system.list(false).len(), 1);
    }

    #[test]
    fn complete_is_idempotent() {
        let (_dir, system) = open_temp();
        let id = system.add("x", "2030-01-01 09:00", "").unwrap();
        system.complete(&id).unwrap();
        system.complete(&id).unwrap();
        assert!(system.list(true)[0].completed);
        assert!(system.complete("missing").is_err());
    }

    #[test]
    fn remove_deletes_by_id() {
        let (_dir, system) = open_temp();
        let id = system.add("x", "2030-01-01 09:00", "").unwrap();
        assert!(system.remove(&id).unwrap());
        assert!(!system.remove(&id).unwrap());
        assert!(system.list(true).is_empty());
    }

    #[test]
    fn reminders_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reminders.json");
        let id = {
            let system = ReminderSystem::open(&path);
            system.add("persisted", "2030-01-01 09:00", "").unwrap()
        };
        let system = ReminderSystem::open(&path);
        let all = system.list(true);
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, id);
    }

    #[tokio::test]
    async fn picks_up_reminder_added_while_running() {
        let dir = tempfile::tempdir().unwrap();
        let system = Arc::new(ReminderSystem::with_poll_interval(
            dir.path().join("reminders.json"),
            Duration::from_millis(20),
        ));
        let (tx, mut rx) = mpsc::unbounded_channel();
        system.start(tx);

        // Added after the task started; the next scan must pick it up
        // without any restart.
        system.add("while running", "2020-01-01 09:00", "").unwrap();

        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("poll task never fired the reminder")
            .expect("event channel closed");
        assert_eq!(event.message, "Reminder: while running");

        system.stop().await;
    }

    #[tokio::test]
    async fn start_is_idempotent_and_stop_joins() {
        let dir = tempfile::tempdir().unwrap();
        let system = Arc::new(ReminderSystem::with_poll_interval(
            dir.path().join("reminders.json"),
            Duration::from_millis(20),
        ));
        let (tx, _rx) = mpsc::unbounded_channel();
        system.start(tx.clone());
        system.start(tx); // no-op while running
        system.stop().await;
        // Stopping again is harmless.
        system.stop().await;
    }
}
