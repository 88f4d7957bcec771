//! Ordered intent matching rules.
//!
//! A literal first-match-wins ladder of case-insensitive substring tests,
//! evaluated top to bottom. Custom commands stored by the user are checked
//! before every built-in rule; the LLM fallback is last. Deliberately not a
//! classifier — the rule order *is* the contract.

use crate::store::MemoryStore;

/// Built-in web destinations for the fixed "open <site>" intents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Site {
    pub name: &'static str,
    pub url: &'static str,
}

pub const YOUTUBE: Site = Site { name: "YouTube", url: "youtube.com" };
pub const GOOGLE: Site = Site { name: "Google", url: "google.com" };
pub const STACK_OVERFLOW: Site = Site { name: "Stack Overflow", url: "stackoverflow.com" };

/// One recognized category of user request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    /// User-defined phrase, highest priority.
    Custom { phrase: String, action: String },
    Wikipedia { topic: String },
    OpenSite(Site),
    CurrentTime,
    CurrentDate,
    LaunchEditor,
    /// `song` is present for "play music <song>" (network video site),
    /// absent for bare "play music" (local directory playback).
    PlayMusic { song: Option<String> },
    SendEmail,
    Weather { city: Option<String> },
    News { category: &'static str },
    Joke,
    SetReminder,
    ListReminders,
    /// "reminder" keyword without a recognized sub-command; swallowed with
    /// an empty response.
    ReminderUnrecognized,
    RememberThis,
    Recall { category: String },
    ChangeVoice,
    EnableWakeWord,
    Terminate,
    /// Fallback: forward the whole utterance to the language model.
    Ask,
}

/// Match a normalized (lowercased) utterance against the ordered rule list.
pub fn classify(utterance: &str, store: &MemoryStore) -> Intent {
    // 1. Custom commands beat everything, including keyword overlaps.
    if let Some((phrase, action)) = store.find_custom_command(utterance) {
        return Intent::Custom { phrase, action };
    }

    // 2. Knowledge lookup.
    if utterance.contains("wikipedia") {
        let topic = utterance.replace("wikipedia", "").trim().to_string();
        return Intent::Wikipedia { topic };
    }

    // 3. Fixed destinations.
    if utterance.contains("open youtube") {
        return Intent::OpenSite(YOUTUBE);
    }
    if utterance.contains("open google") {
        return Intent::OpenSite(GOOGLE);
    }
    if utterance.contains("open stackoverflow") || utterance.contains("open stack overflow") {
        return Intent::OpenSite(STACK_OVERFLOW);
    }

    // 4. Time and date.
    if utterance.contains("the time") {
        return Intent::CurrentTime;
    }
    if utterance.contains("the date") || utterance.contains("today's date") {
        return Intent::CurrentDate;
    }

    // 5. Application launch.
    if utterance.contains("open code") || utterance.contains("open visual studio code") {
        return Intent::LaunchEditor;
    }

    // 6. Music.
    if utterance.contains("play music") || utterance.contains("play a song") {
        let song = if utterance.contains("play music") {
            let rest = utterance.replace("play music", "");
            let rest = rest.trim();
            if rest.is_empty() {
                None
            } else {
                Some(rest.to_string())
            }
        } else {
            None
        };
        return Intent::PlayMusic { song };
    }

    // 7. Email (multi-turn).
    if utterance.contains("send email") || utterance.contains("send an email") {
        return Intent::SendEmail;
    }

    // 8. Weather / news / joke.
    if utterance.contains("weather") {
        return Intent::Weather { city: city_after_in(utterance) };
    }
    if utterance.contains("news") {
        return Intent::News { category: news_category(utterance) };
    }
    if utterance.contains("joke") {
        return Intent::Joke;
    }

    // 9. Reminders, with a secondary keyword match inside the branch.
    if utterance.contains("reminder") || utterance.contains("remind me") {
        if utterance.contains("set a reminder") || utterance.contains("remind me") {
            return Intent::SetReminder;
        }
        if utterance.contains("list reminders")
            || utterance.contains("show reminders")
            || utterance.contains("my reminders")
        {
            return Intent::ListReminders;
        }
        return Intent::ReminderUnrecognized;
    }

    // 10. Memory.
    if utterance.contains("remember this") {
        return Intent::RememberThis;
    }
    if utterance.contains("what do you remember about") || utterance.contains("recall") {
        let category = utterance
            .replace("what do you remember about", "")
            .replace("recall", "")
            .trim()
            .to_string();
        return Intent::Recall { category };
    }

    // 11. Voice / wake word / termination.
    if utterance.contains("change voice") {
        return Intent::ChangeVoice;
    }
    if utterance.contains("enable hot word") || utterance.contains("use wake word") {
        return Intent::EnableWakeWord;
    }
    if utterance.contains("terminate")
        || utterance.contains("exit")
        || utterance.contains("quit")
        || utterance.contains("goodbye")
    {
        return Intent::Terminate;
    }

    // 12. Everything else goes to the language model.
    Intent::Ask
}

/// Free-text city extraction: everything after the whole word "in".
fn city_after_in(utterance: &str) -> Option<String> {
    let tokens: Vec<&str> = utterance.split_whitespace().collect();
    let pos = tokens.iter().position(|&t| t == "in")?;
    let city = tokens[pos + 1..].join(" ");
    if city.is_empty() {
        None
    } else {
        Some(city)
    }
}

/// News category by keyword, defaulting to "general".
fn news_category(utterance: &str) -> &'static str {
    for category in [
        "business",
        "technology",
        "entertainment",
        "sports",
        "science",
        "health",
    ] {
        if utterance.contains(category) {
            return category;
        }
    }
    "general"
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_store() -> (tempfile::TempDir, MemoryStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::open(dir.path().join("memory.json"));
        (dir, store)
    }

    #[test]
    fn custom_command_beats_keyword_overlap() {
        let (_dir, store) = empty_store();
        store
            .add_custom_command("weather station", "open-dashboard")
            .unwrap();
        // "weather" would match rule 8, but the stored phrase wins.
        let intent = classify("check the weather station please", &store);
        assert_eq!(
            intent,
            Intent::Custom {
                phrase: "weather station".to_string(),
                action: "open-dashboard".to_string()
            }
        );
    }

    #[test]
    fn wikipedia_topic_is_stripped_of_keyword() {
        let (_dir, store) = empty_store();
        assert_eq!(
            classify("wikipedia alan turing", &store),
            Intent::Wikipedia { topic: "alan turing".to_string() }
        );
    }

    #[test]
    fn fixed_sites_match_by_keyword() {
        let (_dir, store) = empty_store();
        assert_eq!(classify("open youtube", &store), Intent::OpenSite(YOUTUBE));
        assert_eq!(classify("please open google", &store), Intent::OpenSite(GOOGLE));
        assert_eq!(
            classify("open stackoverflow", &store),
            Intent::OpenSite(STACK_OVERFLOW)
        );
    }

    #[test]
    fn time_and_date_queries() {
        let (_dir, store) = empty_store();
        assert_eq!(classify("what is the time", &store), Intent::CurrentTime);
        assert_eq!(classify("tell me the date", &store), Intent::CurrentDate);
        assert_eq!(classify("what is today's date", &store), Intent::CurrentDate);
    }

    #[test]
    fn music_with_and_without_song() {
        let (_dir, store) = empty_store();
        assert_eq!(
            classify("play music bohemian rhapsody", &store),
            Intent::PlayMusic { song: Some("bohemian rhapsody".to_string()) }
        );
        assert_eq!(classify("play music", &store), Intent::PlayMusic { song: None });
        assert_eq!(classify("play a song", &store), Intent::PlayMusic { song: None });
    }

    #[test]
    fn weather_city_follows_the_token_in() {
        let (_dir, store) = empty_store();
        assert_eq!(
            classify("what's the weather in san francisco", &store),
            Intent::Weather { city: Some("san francisco".to_string()) }
        );
        // "in" inside a word must not split the city out.
        assert_eq!(
            classify("weather this morning", &store),
            Intent::Weather { city: None }
        );
    }

    #[test]
    fn news_category_keywords() {
        let (_dir, store) = empty_store();
        assert_eq!(
            classify("give me technology news", &store),
            Intent::News { category: "technology" }
        );
        assert_eq!(classify("any news", &store), Intent::News { category: "general" });
    }

    #[test]
    fn reminder_branch_secondary_keywords() {
        let (_dir, store) = empty_store();
        assert_eq!(classify("remind me to stretch", &store), Intent::SetReminder);
        assert_eq!(classify("set a reminder", &store), Intent::SetReminder);
        assert_eq!(classify("show reminders", &store), Intent::ListReminders);
        assert_eq!(classify("list reminders please", &store), Intent::ListReminders);
        // Inside the reminder branch but no recognized sub-command.
        assert_eq!(
            classify("delete reminder please", &store),
            Intent::ReminderUnrecognized
        );
    }

    #[test]
    fn memory_intents() {
        let (_dir, store) = empty_store();
        assert_eq!(classify("remember this for me", &store), Intent::RememberThis);
        assert_eq!(
            classify("what do you remember about my birthday", &store),
            Intent::Recall { category: "my birthday".to_string() }
        );
        assert_eq!(
            classify("recall coffee order", &store),
            Intent::Recall { category: "coffee order".to_string() }
        );
    }

    #[test]
    fn control_intents_and_fallback() {
        let (_dir, store) = empty_store();
        assert_eq!(classify("change voice", &store), Intent::ChangeVoice);
        assert_eq!(classify("use wake word", &store), Intent::EnableWakeWord);
        assert_eq!(classify("goodbye", &store), Intent::Terminate);
        assert_eq!(classify("terminate now", &store), Intent::Terminate);
        assert_eq!(classify("how tall is mount everest", &store), Intent::Ask);
    }

    #[test]
    fn email_intent_matches_both_phrasings() {
        let (_dir, store) = empty_store();
        assert_eq!(classify("send email", &store), Intent::SendEmail);
        assert_eq!(classify("please send an email", &store), Intent::SendEmail);
    }
}
