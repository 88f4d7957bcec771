//! Session loop: the outer listen/dispatch cycle and its mode state.
//!
//! Two mutually exclusive modes. Dictation is a tight listen -> dispatch
//! loop; wake-word mode probes with a short timeout and runs one
//! dictation-style turn per positive probe. Switching dictation ->
//! wake-word is performed by the dictation loop itself: it clears its own
//! loop condition, spawns the probe loop as a separate task and exits.
//! The brief overlap window is harmless because all shared state sits
//! behind the store/reminder locks.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, Timelike};
use tracing::{debug, info};

use crate::actions::SystemActions;
use crate::config::AssistantConfig;
use crate::fetch::WebFetch;
use crate::intent::{ControlFlow, Dispatcher};
use crate::mailer::Mailer;
use crate::reminders::ReminderSystem;
use crate::speech::{ListenError, SpeechIo};

/// Sleep between wake-word probes to bound CPU usage.
const IDLE_PROBE_DELAY: Duration = Duration::from_millis(100);

/// Session lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Mode {
    Stopped = 0,
    Dictation = 1,
    WakeWord = 2,
}

impl Mode {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Dictation,
            2 => Self::WakeWord,
            _ => Self::Stopped,
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stopped => write!(f, "stopped"),
            Self::Dictation => write!(f, "dictation"),
            Self::WakeWord => write!(f, "wake_word"),
        }
    }
}

/// Thread-safe session mode, shareable via `Arc`. Both loops key their
/// `while` condition off this; the dispatcher only ever requests
/// transitions through [`ControlFlow`], never touches it directly.
#[derive(Debug)]
pub struct SessionState {
    mode: AtomicU8,
}

impl SessionState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            mode: AtomicU8::new(Mode::Stopped as u8),
        })
    }

    pub fn current_mode(&self) -> Mode {
        Mode::from_u8(self.mode.load(Ordering::Acquire))
    }

    pub fn enter_dictation(&self) {
        self.mode.store(Mode::Dictation as u8, Ordering::Release);
    }

    /// Transition Dictation -> WakeWord. Returns `false` if the session
    /// was not in dictation mode (already probing, or stopped) — the
    /// caller must not spawn a second probe loop then.
    pub fn enter_wake_word(&self) -> bool {
        self.mode
            .compare_exchange(
                Mode::Dictation as u8,
                Mode::WakeWord as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    pub fn shutdown(&self) {
        self.mode.store(Mode::Stopped as u8, Ordering::Release);
    }

    pub fn is_dictating(&self) -> bool {
        self.current_mode() == Mode::Dictation
    }

    pub fn is_probing(&self) -> bool {
        self.current_mode() == Mode::WakeWord
    }
}

pub struct Session<S, W, M, A> {
    speech: Arc<S>,
    dispatcher: Dispatcher<S, W, M, A>,
    reminders: Arc<ReminderSystem>,
    state: Arc<SessionState>,
    config: AssistantConfig,
}

impl<S, W, M, A> Session<S, W, M, A>
where
    S: SpeechIo + 'static,
    W: WebFetch + 'static,
    M: Mailer + 'static,
    A: SystemActions + 'static,
{
    pub fn new(
        speech: Arc<S>,
        dispatcher: Dispatcher<S, W, M, A>,
        reminders: Arc<ReminderSystem>,
        state: Arc<SessionState>,
        config: AssistantConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            speech,
            dispatcher,
            reminders,
            state,
            config,
        })
    }

    pub fn state(&self) -> &Arc<SessionState> {
        &self.state
    }

    /// Greet the user by time of day.
    pub async fn greet(&self) {
        self.speech
            .speak(&format!(
                "{} I am {}, your personal voice assistant.",
                greeting_for_hour(Local::now().hour()),
                self.config.assistant_name
            ))
            .await;
        self.speech.speak("How may I help you today?").await;
    }

    /// Free dictation mode: listen -> dispatch until the mode changes.
    /// Timeouts are silent (natural pauses); other listen failures get a
    /// retry prompt.
    pub async fn run_dictation(self: Arc<Self>) {
        self.state.enter_dictation();
        info!("Dictation loop started");
        while self.state.is_dictating() {
            match self.speech.listen(self.listen_timeout()).await {
                Ok(utterance) => match self.turn(&utterance).await {
                    ControlFlow::Continue => {}
                    ControlFlow::EnterWakeWordMode => {
                        // Clear this loop's condition first, then start the
                        // probe loop on its own task. The compare-exchange
                        // guard keeps a second probe loop from ever being
                        // spawned.
                        if self.state.enter_wake_word() {
                            tokio::spawn(Arc::clone(&self).run_wake_word());
                        }
                        break;
                    }
                    ControlFlow::Terminate => break,
                },
                Err(ListenError::Timeout) => {
                    // Silent: no prompt during natural pauses.
                }
                Err(reason) => {
                    debug!(%reason, "Listen failed");
                    self.speech
                        .speak("I couldn't understand. Please try again.")
                        .await;
                }
            }
        }
        info!("Dictation loop exited");
    }

    /// Wake-word mode: short probes, one dictation-style turn per match,
    /// small idle sleep between probes.
    pub async fn run_wake_word(self: Arc<Self>) {
        self.speech
            .speak(&format!(
                "I'm ready. Say '{}' to activate me.",
                self.config.wake_word
            ))
            .await;
        info!("Wake-word loop started");
        while self.state.is_probing() {
            if self.speech.listen_for_wake_word().await {
                self.speech.speak("I'm listening.").await;
                match self.speech.listen(self.listen_timeout()).await {
                    Ok(utterance) => match self.turn(&utterance).await {
                        // Already probing: a repeated wake-word request
                        // changes nothing.
                        ControlFlow::Continue | ControlFlow::EnterWakeWordMode => {}
                        ControlFlow::Terminate => break,
                    },
                    Err(ListenError::Timeout) => {}
                    Err(reason) => {
                        debug!(%reason, "Listen failed after wake word");
                        self.speech
                            .speak("I couldn't understand. Please try again.")
                            .await;
                    }
                }
            }
            tokio::time::sleep(IDLE_PROBE_DELAY).await;
        }
        info!("Wake-word loop exited");
    }

    /// One conversation turn. The loops interpret the returned control
    /// value; terminate side effects happen here so both loops share them.
    async fn turn(&self, utterance: &str) -> ControlFlow {
        let outcome = self.dispatcher.dispatch(utterance).await;
        if outcome.control == ControlFlow::Terminate {
            // Stop the background scheduler before ending the session so
            // no orphaned poll task outlives the process lifetime.
            self.reminders.stop().await;
            self.state.shutdown();
        }
        outcome.control
    }

    fn listen_timeout(&self) -> Duration {
        Duration::from_secs(self.config.listen_timeout_secs)
    }
}

/// Appropriate greeting for the local hour.
pub fn greeting_for_hour(hour: u32) -> &'static str {
    match hour {
        0..=11 => "Good Morning!",
        12..=17 => "Good Afternoon!",
        _ => "Good Evening!",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::testing::FakeActions;
    use crate::fetch::testing::FakeFetch;
    use crate::mailer::testing::FakeMailer;
    use crate::speech::testing::ScriptedSpeech;
    use crate::speech::ListenResult;
    use crate::store::MemoryStore;

    type TestSession = Session<ScriptedSpeech, FakeFetch, FakeMailer, FakeActions>;

    struct Harness {
        _dir: tempfile::TempDir,
        speech: Arc<ScriptedSpeech>,
        reminders: Arc<ReminderSystem>,
        session: Arc<TestSession>,
    }

    fn harness(listens: Vec<ListenResult>, probes: Vec<bool>) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let speech = Arc::new(ScriptedSpeech::new(listens).with_wake_probes(probes));
        let store = Arc::new(MemoryStore::open(dir.path().join("memory.json")));
        let reminders = Arc::new(ReminderSystem::open(dir.path().join("reminders.json")));
        let config = AssistantConfig::default();
        let dispatcher = Dispatcher::new(
            Arc::clone(&speech),
            FakeFetch::default(),
            FakeMailer::default(),
            FakeActions::default(),
            store,
            Arc::clone(&reminders),
            config.clone(),
        );
        let session = Session::new(
            Arc::clone(&speech),
            dispatcher,
            Arc::clone(&reminders),
            SessionState::new(),
            config,
        );
        Harness {
            _dir: dir,
            speech,
            reminders,
            session,
        }
    }

    #[tokio::test]
    async fn terminate_ends_dictation_and_stops_scheduler() {
        let h = harness(vec![Ok("goodbye".to_string())], vec![]);
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        h.reminders.start(tx);

        Arc::clone(&h.session).run_dictation().await;

        assert_eq!(h.session.state().current_mode(), Mode::Stopped);
        assert!(h
            .speech
            .spoken_lines()
            .contains(&"Goodbye! Have a great day!".to_string()));
        // Stopping again after the terminate path is a no-op.
        h.reminders.stop().await;
    }

    #[tokio::test]
    async fn dictation_loop_runs_on_a_spawned_task() {
        let h = harness(vec![Ok("goodbye".to_string())], vec![]);

        // The whole loop must be spawnable, exactly like the probe loop
        // the mode switch starts.
        let handle = tokio::spawn(Arc::clone(&h.session).run_dictation());
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("dictation task never finished")
            .expect("dictation task panicked");

        assert_eq!(h.session.state().current_mode(), Mode::Stopped);
    }

    #[tokio::test]
    async fn timeouts_are_silent_but_other_failures_prompt() {
        let h = harness(
            vec![
                Err(ListenError::Timeout),
                Err(ListenError::Unintelligible),
                Ok("goodbye".to_string()),
            ],
            vec![],
        );

        Arc::clone(&h.session).run_dictation().await;

        let prompts = h
            .speech
            .spoken_lines()
            .iter()
            .filter(|line| *line == "I couldn't understand. Please try again.")
            .count();
        // One prompt for the unintelligible failure, none for the timeout.
        assert_eq!(prompts, 1);
    }

    #[tokio::test]
    async fn mode_switch_leaves_no_utterance_processed_twice() {
        let h = harness(
            vec![
                Ok("use wake word".to_string()),
                Ok("what is the time".to_string()),
            ],
            vec![], // every probe misses
        );

        Arc::clone(&h.session).run_dictation().await;

        // The dictation loop exited on the mode switch without consuming
        // the next utterance, and the probe loop only listens after a
        // positive wake-word match.
        assert_eq!(h.session.state().current_mode(), Mode::WakeWord);
        assert_eq!(h.speech.remaining_listens(), 1);

        h.session.state().shutdown();
    }

    #[tokio::test]
    async fn positive_probe_runs_one_turn() {
        let h = harness(vec![Ok("goodbye".to_string())], vec![false, true]);
        h.session.state().enter_dictation();
        assert!(h.session.state().enter_wake_word());

        Arc::clone(&h.session).run_wake_word().await;

        let spoken = h.speech.spoken_lines();
        assert!(spoken.iter().any(|l| l.starts_with("I'm ready.")));
        assert!(spoken.contains(&"I'm listening.".to_string()));
        assert_eq!(h.session.state().current_mode(), Mode::Stopped);
    }

    #[tokio::test]
    async fn wake_word_switch_from_probe_mode_spawns_nothing() {
        let h = harness(vec![Ok("use wake word".to_string())], vec![true]);
        h.session.state().enter_dictation();
        assert!(h.session.state().enter_wake_word());
        // Second transition attempt fails: already probing.
        assert!(!h.session.state().enter_wake_word());
    }

    #[test]
    fn greeting_matches_time_of_day() {
        assert_eq!(greeting_for_hour(0), "Good Morning!");
        assert_eq!(greeting_for_hour(11), "Good Morning!");
        assert_eq!(greeting_for_hour(12), "Good Afternoon!");
        assert_eq!(greeting_for_hour(17), "Good Afternoon!");
        assert_eq!(greeting_for_hour(18), "Good Evening!");
        assert_eq!(greeting_for_hour(23), "Good Evening!");
    }
}
