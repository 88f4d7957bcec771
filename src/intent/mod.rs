//! Intent dispatch and multi-turn slot filling.
//!
//! The dispatcher is the central control unit: one call to
//! [`Dispatcher::dispatch`] handles one conversation turn — classify the
//! utterance against the ordered rule list, run the matching handler
//! (including any follow-up prompt/listen round-trips), perform side effects
//! through the injected collaborators, and log the exchange.
//!
//! Slot-filling contract: a required slot whose listen fails aborts the
//! whole intent — an apology is spoken, no partial side effect happens, and
//! the failure response is what gets logged. Optional slots (reminder note,
//! memory category) fall back to their defaults instead of aborting.
//!
//! Logging contract, deliberately: a failed turn is a logged turn. Aborted
//! slot filling records its failure response in the conversation log like
//! any completed exchange; the terminate intent is the only turn that skips
//! the log, since it returns before the trailing log call.

pub mod rules;

use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use tracing::{debug, warn};

use crate::actions::{DesktopActions, SystemActions};
use crate::config::AssistantConfig;
use crate::fetch::WebFetch;
use crate::mailer::Mailer;
use crate::reminders::ReminderSystem;
use crate::speech::SpeechIo;
use crate::store::MemoryStore;

pub use rules::{classify, Intent};

/// What the session loop should do after a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlFlow {
    Continue,
    /// Leave dictation mode and start wake-word probing.
    EnterWakeWordMode,
    /// Stop the scheduler and end the session.
    Terminate,
}

/// Result of one dispatched turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub response: String,
    pub control: ControlFlow,
}

pub struct Dispatcher<S, W, M, A> {
    speech: Arc<S>,
    fetch: W,
    mailer: M,
    actions: A,
    store: Arc<MemoryStore>,
    reminders: Arc<ReminderSystem>,
    config: AssistantConfig,
}

impl<S, W, M, A> Dispatcher<S, W, M, A>
where
    S: SpeechIo,
    W: WebFetch,
    M: Mailer,
    A: SystemActions,
{
    pub fn new(
        speech: Arc<S>,
        fetch: W,
        mailer: M,
        actions: A,
        store: Arc<MemoryStore>,
        reminders: Arc<ReminderSystem>,
        config: AssistantConfig,
    ) -> Self {
        Self {
            speech,
            fetch,
            mailer,
            actions,
            store,
            reminders,
            config,
        }
    }

    fn listen_timeout(&self) -> Duration {
        Duration::from_secs(self.config.listen_timeout_secs)
    }

    /// Process one utterance: classify, handle, log.
    ///
    /// The conversation entry is appended whenever both the utterance and
    /// the response are non-empty — including turns whose side effect
    /// failed (the response text records the failure). The terminate intent
    /// is the one exception: it returns before the log call.
    pub async fn dispatch(&self, raw_utterance: &str) -> TurnOutcome {
        let utterance = raw_utterance.trim().to_lowercase();
        let intent = classify(&utterance, &self.store);
        debug!(?intent, "Dispatching utterance");

        let outcome = self.handle(intent, &utterance).await;

        if outcome.control != ControlFlow::Terminate
            && !utterance.is_empty()
            && !outcome.response.is_empty()
        {
            if let Err(e) = self.store.log_conversation(&utterance, &outcome.response) {
                warn!("Failed to persist conversation entry: {}", e);
            }
        }
        outcome
    }

    async fn handle(&self, intent: Intent, utterance: &str) -> TurnOutcome {
        let response = match intent {
            Intent::Custom { phrase, action } => {
                self.speech
                    .speak(&format!("Executing custom command: {}", phrase))
                    .await;
                format!("Executed custom command: {}", action)
            }

            Intent::Wikipedia { topic } => {
                self.speech.speak("Searching Wikipedia...").await;
                match self.fetch.wiki_summary(&topic).await {
                    Ok(summary) => {
                        self.speech.speak("According to Wikipedia").await;
                        self.speech.speak(&summary).await;
                        summary
                    }
                    Err(e) => {
                        let response = format!("Error searching Wikipedia: {}", e);
                        self.speech.speak(&response).await;
                        response
                    }
                }
            }

            Intent::OpenSite(site) => {
                self.speech.speak(&format!("Opening {}", site.name)).await;
                match self.actions.open_url(site.url) {
                    Ok(()) => format!("Opened {}", site.name),
                    Err(e) => {
                        warn!("Failed to open {}: {}", site.name, e);
                        format!("Failed to open {}", site.name)
                    }
                }
            }

            Intent::CurrentTime => {
                let time_str = Local::now().format("%H:%M").to_string();
                self.speech
                    .speak(&format!("The current time is {}", time_str))
                    .await;
                format!("Current time: {}", time_str)
            }

            Intent::CurrentDate => {
                let date_str = Local::now().format("%A, %B %d %Y").to_string();
                self.speech.speak(&format!("Today is {}", date_str)).await;
                format!("Current date: {}", date_str)
            }

            Intent::LaunchEditor => match &self.config.editor_path {
                Some(path) => {
                    self.speech.speak("Opening your code editor").await;
                    match self.actions.launch(path) {
                        Ok(()) => "Opened code editor".to_string(),
                        Err(e) => {
                            warn!("Editor launch failed: {}", e);
                            "Failed to open code editor".to_string()
                        }
                    }
                }
                None => {
                    let response = "Editor path not configured".to_string();
                    self.speech.speak(&response).await;
                    response
                }
            },

            Intent::PlayMusic { song } => self.handle_play_music(song).await,

            Intent::SendEmail => self.handle_send_email().await,

            Intent::Weather { city } => {
                let city = city.unwrap_or_else(|| self.config.default_city.clone());
                self.speech
                    .speak(&format!("Getting weather for {}", city))
                    .await;
                match self.fetch.weather(&city).await {
                    Ok(info) => {
                        self.speech.speak(&info).await;
                        info
                    }
                    Err(e) => {
                        let response = format!("Error fetching weather data: {}", e);
                        self.speech.speak(&response).await;
                        response
                    }
                }
            }

            Intent::News { category } => {
                self.speech
                    .speak(&format!("Getting {} news", category))
                    .await;
                match self.fetch.news(category, 5).await {
                    Ok(headlines) => {
                        self.speech.speak(&headlines).await;
                        headlines
                    }
                    Err(e) => {
                        let response = format!("Error fetching news data: {}", e);
                        self.speech.speak(&response).await;
                        response
                    }
                }
            }

            Intent::Joke => {
                self.speech.speak("Here's a joke for you").await;
                match self.fetch.joke().await {
                    Ok(joke) => {
                        self.speech.speak(&joke).await;
                        joke
                    }
                    Err(e) => {
                        let response = format!("Error fetching joke: {}", e);
                        self.speech.speak(&response).await;
                        response
                    }
                }
            }

            Intent::SetReminder => self.handle_set_reminder().await,

            Intent::ListReminders => self.handle_list_reminders().await,

            // Reminder keyword without a recognized sub-command: swallowed,
            // empty response, no log entry.
            Intent::ReminderUnrecognized => String::new(),

            Intent::RememberThis => self.handle_remember_this().await,

            Intent::Recall { category } => {
                let remembered = self
                    .store
                    .get_preference(&category)
                    .map(|v| match v.as_str() {
                        Some(s) => s.to_string(),
                        None => v.to_string(),
                    });
                match remembered {
                    Some(text) => {
                        self.speech
                            .speak(&format!("I remember that {}: {}", category, text))
                            .await;
                        format!("Retrieved memory: {}: {}", category, text)
                    }
                    None => {
                        self.speech
                            .speak(&format!("I don't have any memory about {}", category))
                            .await;
                        format!("No memory found for: {}", category)
                    }
                }
            }

            Intent::ChangeVoice => {
                let current = self
                    .store
                    .get_preference("voice_id")
                    .and_then(|v| v.as_i64())
                    .unwrap_or(0);
                let new_voice = if current == 0 { 1 } else { 0 };
                self.speech.set_voice(new_voice);
                if let Err(e) = self.store.set_preference("voice_id", new_voice) {
                    warn!("Failed to persist voice preference: {}", e);
                }
                self.speech
                    .speak("I've changed my voice. How does this sound?")
                    .await;
                format!("Changed voice to ID: {}", new_voice)
            }

            Intent::EnableWakeWord => {
                self.speech
                    .speak(&format!(
                        "Enabling hot word activation. Say '{}' to activate me.",
                        self.config.wake_word
                    ))
                    .await;
                return TurnOutcome {
                    response: "Enabled hot word activation".to_string(),
                    control: ControlFlow::EnterWakeWordMode,
                };
            }

            Intent::Terminate => {
                self.speech.speak("Goodbye! Have a great day!").await;
                return TurnOutcome {
                    response: "Terminated voice assistant".to_string(),
                    control: ControlFlow::Terminate,
                };
            }

            Intent::Ask => {
                self.speech.speak("Let me think about that...").await;
                match self.fetch.ask_llm(utterance).await {
                    Ok(answer) => {
                        self.speech.speak(&answer).await;
                        answer
                    }
                    Err(e) => {
                        debug!("LLM fallback failed: {}", e);
                        self.speech
                            .speak("I'm sorry, I couldn't find an answer to that.")
                            .await;
                        "Failed to get response from the language model".to_string()
                    }
                }
            }
        };

        TurnOutcome {
            response,
            control: ControlFlow::Continue,
        }
    }

    // -- multi-turn handlers --

    async fn handle_play_music(&self, song: Option<String>) -> String {
        match song {
            Some(song) => {
                self.speech
                    .speak(&format!("Playing {} on YouTube", song))
                    .await;
                let url = DesktopActions::youtube_search_url(&song);
                match self.actions.open_url(&url) {
                    Ok(()) => format!("Playing {} on YouTube", song),
                    Err(e) => {
                        let response = format!("Error playing music: {}", e);
                        self.speech.speak(&response).await;
                        response
                    }
                }
            }
            None => {
                let Some(music_dir) = self.config.music_dir.as_deref() else {
                    let response = "Music directory not found".to_string();
                    self.speech.speak(&response).await;
                    return response;
                };
                match self.actions.play_first_song(music_dir) {
                    Ok(name) => {
                        let response = format!("Playing {}", name);
                        self.speech.speak(&response).await;
                        response
                    }
                    Err(e) => {
                        let response = e.to_string();
                        self.speech.speak(&response).await;
                        response
                    }
                }
            }
        }
    }

    async fn handle_send_email(&self) -> String {
        let Some(recipient) = self
            .collect_slot(
                "Who would you like to send the email to?",
                "Sorry, I couldn't understand the recipient.",
            )
            .await
        else {
            return "Failed to get email recipient".to_string();
        };

        // A known contact's address is not re-asked.
        let known = self.store.get_contact(&recipient);
        let is_new_contact = known.is_none();
        let address = match known {
            Some(address) => address,
            None => {
                let prompt = format!(
                    "I don't have {}'s email address. Please provide it.",
                    recipient
                );
                match self
                    .collect_slot(&prompt, "Sorry, I couldn't understand the email address.")
                    .await
                {
                    Some(address) => address,
                    None => return "Failed to get email address".to_string(),
                }
            }
        };

        let Some(subject) = self
            .collect_slot(
                "What should be the subject of the email?",
                "Sorry, I couldn't understand the subject.",
            )
            .await
        else {
            return "Failed to get email subject".to_string();
        };

        let Some(content) = self
            .collect_slot(
                "What should I say in the email?",
                "Sorry, I couldn't understand the content.",
            )
            .await
        else {
            return "Failed to get email content".to_string();
        };

        match self.mailer.send(&address, &subject, &content).await {
            Ok(status) => {
                // Durable bookkeeping only after the send succeeded.
                if is_new_contact {
                    if let Err(e) = self.store.add_contact(&recipient, &address) {
                        warn!("Failed to save new contact: {}", e);
                    }
                }
                self.speech.speak(&status).await;
                status
            }
            Err(e) => {
                let response = e.to_string();
                self.speech.speak(&response).await;
                response
            }
        }
    }

    async fn handle_set_reminder(&self) -> String {
        let Some(title) = self
            .collect_slot(
                "What should I remind you about?",
                "Sorry, I couldn't understand the reminder title.",
            )
            .await
        else {
            return "Failed to get reminder title".to_string();
        };

        let Some(due_str) = self
            .collect_slot(
                "When should I remind you? Please specify the date and time \
                 in YYYY-MM-DD HH:MM format.",
                "Sorry, I couldn't understand the date and time.",
            )
            .await
        else {
            return "Failed to get reminder date/time".to_string();
        };

        // The note is optional: a failed listen defaults to an empty note.
        let note = self
            .collect_optional_slot("Any additional notes for this reminder?")
            .await
            .unwrap_or_default();

        match self.reminders.add(&title, &due_str, &note) {
            Ok(_) => {
                let response = format!("Reminder set for {}: {}", due_str, title);
                self.speech.speak(&response).await;
                response
            }
            Err(e) => {
                debug!("Reminder rejected: {}", e);
                self.speech
                    .speak(
                        "Failed to set reminder. Please provide date and time \
                         in YYYY-MM-DD HH:MM format.",
                    )
                    .await;
                "Failed to set reminder".to_string()
            }
        }
    }

    async fn handle_list_reminders(&self) -> String {
        let pending = self.reminders.list(false);
        if pending.is_empty() {
            self.speech
                .speak("You don't have any active reminders.")
                .await;
            return "No active reminders".to_string();
        }
        self.speech
            .speak(&format!("You have {} reminders:", pending.len()))
            .await;
        for (i, reminder) in pending.iter().enumerate() {
            self.speech
                .speak(&format!(
                    "{}. {} at {}",
                    i + 1,
                    reminder.title,
                    reminder.due_date
                ))
                .await;
        }
        format!("Listed {} reminders", pending.len())
    }

    async fn handle_remember_this(&self) -> String {
        let Some(memory_text) = self
            .collect_slot(
                "What would you like me to remember?",
                "Sorry, I couldn't understand what to remember.",
            )
            .await
        else {
            return "Failed to store memory".to_string();
        };

        // Category is optional: a failed listen defaults to "general".
        let category = self
            .collect_optional_slot("How should I categorize this memory?")
            .await
            .unwrap_or_else(|| "general".to_string());

        if let Err(e) = self.store.set_preference(&category, memory_text.clone()) {
            warn!("Failed to persist memory: {}", e);
        }
        self.speech
            .speak(&format!("I'll remember that {}: {}", category, memory_text))
            .await;
        format!("Stored memory: {}: {}", category, memory_text)
    }

    // -- slot filling --

    /// Collect one required slot: speak the prompt, listen once. On failure
    /// the apology is spoken and `None` is returned — the caller aborts the
    /// intent with no partial side effect.
    async fn collect_slot(&self, prompt: &str, apology: &str) -> Option<String> {
        self.speech.speak(prompt).await;
        match self.speech.listen(self.listen_timeout()).await {
            Ok(text) => Some(text),
            Err(reason) => {
                debug!(%reason, "Slot collection failed");
                self.speech.speak(apology).await;
                None
            }
        }
    }

    /// Collect one optional slot: no apology, the caller substitutes a
    /// default on failure.
    async fn collect_optional_slot(&self, prompt: &str) -> Option<String> {
        self.speech.speak(prompt).await;
        self.speech.listen(self.listen_timeout()).await.ok()
    }
}
