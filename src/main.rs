//! Buddy — a terminal voice assistant.
//!
//! Wires the speech frontend, the intent dispatcher and the background
//! reminder scheduler together, then runs the session loop until the user
//! says goodbye. `--wake-word` starts in wake-word mode instead of free
//! dictation.

mod actions;
mod config;
mod fetch;
mod intent;
mod mailer;
mod reminders;
mod session;
mod speech;
mod store;

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use actions::DesktopActions;
use config::AssistantConfig;
use fetch::HttpFetch;
use intent::Dispatcher;
use mailer::HttpMailer;
use reminders::ReminderSystem;
use session::{Mode, Session, SessionState};
use speech::{SpeechIo, TerminalSpeech};
use store::MemoryStore;

#[tokio::main]
async fn main() {
    // Initialize tracing (respects RUST_LOG env, defaults to info).
    // Logs go to stderr; stdout belongs to the conversation.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let data_dir = config::get_data_dir();
    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        warn!(
            "Failed to create data directory {}: {}",
            data_dir.display(),
            e
        );
    }

    let config = AssistantConfig::load();
    info!(assistant = %config.assistant_name, "Configuration loaded");

    let speech = Arc::new(TerminalSpeech::new(&config.wake_word));
    let store = Arc::new(MemoryStore::open(config::get_memory_path()));
    let reminders = Arc::new(ReminderSystem::open(config::get_reminders_path()));

    // Fired reminders are spoken as they arrive, whatever mode the
    // session is in.
    let (reminder_tx, mut reminder_rx) = tokio::sync::mpsc::unbounded_channel();
    reminders.start(reminder_tx);
    {
        let speech = Arc::clone(&speech);
        tokio::spawn(async move {
            while let Some(event) = reminder_rx.recv().await {
                speech.speak(&event.message).await;
            }
        });
    }

    let fetch = HttpFetch::new(
        config.weather_api_key.clone(),
        config.news_api_key.clone(),
        config.llm_api_key.clone(),
        config.llm_model.clone(),
        config.llm_system_prompt.clone(),
    );
    let mailer = HttpMailer::new(
        config.mail_endpoint.clone(),
        config.mail_api_key.clone(),
        config.mail_from.clone(),
    );

    let state = SessionState::new();
    let dispatcher = Dispatcher::new(
        Arc::clone(&speech),
        fetch,
        mailer,
        DesktopActions,
        Arc::clone(&store),
        Arc::clone(&reminders),
        config.clone(),
    );
    let session = Session::new(
        Arc::clone(&speech),
        dispatcher,
        Arc::clone(&reminders),
        Arc::clone(&state),
        config,
    );

    session.greet().await;

    if std::env::args().any(|arg| arg == "--wake-word") {
        // enter_wake_word only transitions out of dictation.
        state.enter_dictation();
        state.enter_wake_word();
        Arc::clone(&session).run_wake_word().await;
    } else {
        Arc::clone(&session).run_dictation().await;
    }

    // The dictation loop returns early when it hands off to a spawned
    // wake-word loop; stay alive until the session is actually over.
    while state.current_mode() != Mode::Stopped {
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    info!("Session ended");
}
