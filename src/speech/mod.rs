//! Speech I/O boundary.
//!
//! The dispatcher and session loop only ever see the [`SpeechIo`] trait; the
//! actual transducer is a collaborator. The default adapter shipped here is
//! [`TerminalSpeech`], which reads utterances as lines from stdin (via a
//! blocking reader thread bridged to an async channel) and "speaks" by
//! printing. A real microphone/TTS engine slots in behind the same trait.

use std::future::Future;
use std::io::{self, BufRead, Write};
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info};

/// How long a wake-word probe waits before giving up. Much shorter than a
/// normal listen so the probe loop stays responsive.
pub const WAKE_WORD_PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// Why a listen cycle produced no usable text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenError {
    /// Nothing was heard before the timeout elapsed.
    Timeout,
    /// Audio was captured but could not be recognized.
    Unintelligible,
    /// The recognizer could not be reached (or input was closed).
    Network,
}

impl std::fmt::Display for ListenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout => write!(f, "Timeout"),
            Self::Unintelligible => write!(f, "Could not understand audio"),
            Self::Network => {
                write!(f, "Could not request results; check your network connection")
            }
        }
    }
}

/// Result of one listen cycle: lowercased transcript or a failure reason.
pub type ListenResult = Result<String, ListenError>;

/// Speech transducer boundary: listen, speak, wake-word probe.
///
/// Methods return `Send` futures so the session loops can run on spawned
/// tasks; implementations just write `async fn`.
pub trait SpeechIo: Send + Sync {
    /// Listen for one utterance. The returned text is case-normalized.
    /// Implementations retry at most once internally on a recognition
    /// failure before surfacing [`ListenError::Unintelligible`].
    fn listen(&self, timeout: Duration) -> impl Future<Output = ListenResult> + Send;

    /// Speak a response. Fire-and-forget from the caller's perspective, but
    /// the spoken text is logged for auditability.
    fn speak(&self, text: &str) -> impl Future<Output = ()> + Send;

    /// Short probe for the wake word. No retry.
    fn listen_for_wake_word(&self) -> impl Future<Output = bool> + Send;

    /// Switch to another synthesizer voice. Adapters without multiple
    /// voices may ignore this.
    fn set_voice(&self, voice_id: i64);
}

/// Terminal-backed speech adapter: stdin lines in, stdout lines out.
pub struct TerminalSpeech {
    lines: Mutex<mpsc::UnboundedReceiver<String>>,
    wake_word: String,
}

impl TerminalSpeech {
    /// Spawn the blocking stdin reader thread and wrap its channel.
    pub fn new(wake_word: &str) -> Self {
        Self {
            lines: Mutex::new(spawn_stdin_reader()),
            wake_word: wake_word.to_lowercase(),
        }
    }
}

impl SpeechIo for TerminalSpeech {
    async fn listen(&self, timeout: Duration) -> ListenResult {
        debug!("Listening...");
        let mut attempts = 0;
        loop {
            attempts += 1;
            let mut rx = self.lines.lock().await;
            let received = tokio::time::timeout(timeout, rx.recv()).await;
            drop(rx);
            match received {
                Err(_) => return Err(ListenError::Timeout),
                Ok(None) => return Err(ListenError::Network),
                Ok(Some(line)) => {
                    let text = line.trim().to_lowercase();
                    if text.is_empty() {
                        // One internal retry on a recognition failure.
                        if attempts < 2 {
                            continue;
                        }
                        return Err(ListenError::Unintelligible);
                    }
                    debug!(text = %text, "Heard utterance");
                    return Ok(text);
                }
            }
        }
    }

    async fn speak(&self, text: &str) {
        info!("Assistant: {}", text);
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        // Ignore write/flush errors — pipe may be closed.
        let _ = writeln!(handle, "{}", text);
        let _ = handle.flush();
    }

    async fn listen_for_wake_word(&self) -> bool {
        let mut rx = self.lines.lock().await;
        match tokio::time::timeout(WAKE_WORD_PROBE_TIMEOUT, rx.recv()).await {
            Ok(Some(line)) => {
                let heard = line.trim().to_lowercase();
                debug!(heard = %heard, "Wake word probe");
                heard.contains(&self.wake_word)
            }
            _ => false,
        }
    }

    fn set_voice(&self, voice_id: i64) {
        debug!(voice_id, "Voice change requested (terminal adapter has one voice)");
    }
}

/// Spawn a blocking thread that reads lines from stdin and forwards them
/// through the returned channel. The thread exits when stdin is closed.
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();

    std::thread::spawn(move || {
        let stdin = io::stdin();
        let reader = stdin.lock();
        for line in reader.lines() {
            match line {
                Ok(text) => {
                    if tx.send(text).is_err() {
                        break; // Receiver dropped — main task is gone.
                    }
                }
                Err(_) => break, // stdin closed
            }
        }
        debug!("stdin reader thread exiting");
    });

    rx
}
