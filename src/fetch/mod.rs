//! Outbound HTTP providers: weather, news, jokes, Wikipedia summaries and
//! the hosted LLM used for free-form question answering.
//!
//! The dispatcher depends on the [`WebFetch`] trait; [`HttpFetch`] is the
//! reqwest-backed implementation. Missing API keys surface as ordinary
//! provider errors ("... not configured") that the dispatcher speaks back,
//! so an unconfigured install degrades per-intent instead of failing to
//! start.

use std::future::Future;

use serde_json::json;
use tracing::debug;

/// Answers longer than this are truncated for speech.
const MAX_SPOKEN_ANSWER_CHARS: usize = 500;

/// Network lookup boundary consumed by the dispatcher. Futures are `Send`
/// so dispatch can run on spawned tasks.
pub trait WebFetch: Send + Sync {
    /// Current weather for a city, as a speakable sentence.
    fn weather(&self, city: &str) -> impl Future<Output = anyhow::Result<String>> + Send;

    /// Top `count` news headlines for a category.
    fn news(
        &self,
        category: &str,
        count: usize,
    ) -> impl Future<Output = anyhow::Result<String>> + Send;

    /// A random joke.
    fn joke(&self) -> impl Future<Output = anyhow::Result<String>> + Send;

    /// Short encyclopedia summary for a topic.
    fn wiki_summary(&self, topic: &str) -> impl Future<Output = anyhow::Result<String>> + Send;

    /// Free-form question answering via the hosted language model.
    fn ask_llm(&self, query: &str) -> impl Future<Output = anyhow::Result<String>> + Send;
}

/// Reqwest-backed provider set.
pub struct HttpFetch {
    client: reqwest::Client,
    weather_api_key: Option<String>,
    news_api_key: Option<String>,
    llm_api_key: Option<String>,
    llm_model: String,
    llm_system_prompt: String,
}

impl HttpFetch {
    pub fn new(
        weather_api_key: Option<String>,
        news_api_key: Option<String>,
        llm_api_key: Option<String>,
        llm_model: String,
        llm_system_prompt: String,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            weather_api_key,
            news_api_key,
            llm_api_key,
            llm_model,
            llm_system_prompt,
        }
    }
}

impl WebFetch for HttpFetch {
    async fn weather(&self, city: &str) -> anyhow::Result<String> {
        let key = self
            .weather_api_key
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("Weather API key not configured"))?;

        debug!(city = %city, "Fetching weather");
        let resp = self
            .client
            .get("https://api.openweathermap.org/data/2.5/weather")
            .query(&[("q", city), ("appid", key), ("units", "metric")])
            .send()
            .await?;

        let status = resp.status();
        let data: serde_json::Value = resp.json().await?;
        if !status.is_success() {
            let message = data["message"].as_str().unwrap_or("Unknown error");
            anyhow::bail!("Weather API error {}: {}", status, message);
        }

        let description = data["weather"][0]["description"]
            .as_str()
            .unwrap_or("unknown conditions");
        let temp = data["main"]["temp"].as_f64().unwrap_or(0.0);
        let humidity = data["main"]["humidity"].as_f64().unwrap_or(0.0);
        let wind_speed = data["wind"]["speed"].as_f64().unwrap_or(0.0);

        Ok(format!(
            "The weather in {} is {}. Temperature is {:.0} degrees Celsius, \
             humidity is {:.0} percent, and wind speed is {} meters per second.",
            city, description, temp, humidity, wind_speed
        ))
    }

    async fn news(&self, category: &str, count: usize) -> anyhow::Result<String> {
        let key = self
            .news_api_key
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("News API key not configured"))?;

        debug!(category = %category, "Fetching news headlines");
        let resp = self
            .client
            .get("https://newsapi.org/v2/top-headlines")
            .query(&[("country", "us"), ("category", category), ("apiKey", key)])
            .send()
            .await?;

        let status = resp.status();
        let data: serde_json::Value = resp.json().await?;
        if !status.is_success() || data["status"].as_str() != Some("ok") {
            let message = data["message"].as_str().unwrap_or("Unknown error");
            anyhow::bail!("News API error {}: {}", status, message);
        }

        let articles = data["articles"].as_array().cloned().unwrap_or_default();
        if articles.is_empty() {
            anyhow::bail!("No news found for category: {}", category);
        }

        let shown = count.min(articles.len());
        let mut text = format!("Here are the top {} {} news headlines:\n", shown, category);
        for (i, article) in articles.iter().take(shown).enumerate() {
            let title = article["title"].as_str().unwrap_or("(untitled)");
            text.push_str(&format!("{}. {}\n", i + 1, title));
        }
        Ok(text)
    }

    async fn joke(&self) -> anyhow::Result<String> {
        let resp = self
            .client
            .get("https://official-joke-api.appspot.com/random_joke")
            .send()
            .await?;

        if !resp.status().is_success() {
            anyhow::bail!("Joke API error {}", resp.status());
        }
        let data: serde_json::Value = resp.json().await?;
        let setup = data["setup"].as_str().unwrap_or("");
        let punchline = data["punchline"].as_str().unwrap_or("");
        if setup.is_empty() || punchline.is_empty() {
            anyhow::bail!("Invalid joke format received");
        }
        Ok(format!("{} ... {}", setup, punchline))
    }

    async fn wiki_summary(&self, topic: &str) -> anyhow::Result<String> {
        let title = topic.trim().replace(' ', "_");
        debug!(title = %title, "Fetching Wikipedia summary");
        let resp = self
            .client
            .get(format!(
                "https://en.wikipedia.org/api/rest_v1/page/summary/{}",
                title
            ))
            .send()
            .await?;

        if !resp.status().is_success() {
            anyhow::bail!("No Wikipedia article found for {:?}", topic);
        }
        let data: serde_json::Value = resp.json().await?;
        let extract = data["extract"].as_str().unwrap_or("");
        if extract.is_empty() {
            anyhow::bail!("Wikipedia article for {:?} has no summary", topic);
        }
        Ok(truncate_for_speech(extract))
    }

    async fn ask_llm(&self, query: &str) -> anyhow::Result<String> {
        let key = self
            .llm_api_key
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("LLM API key not configured"))?;

        debug!("Forwarding question to the language model");
        let body = json!({
            "model": self.llm_model,
            "messages": [
                { "role": "system", "content": self.llm_system_prompt },
                { "role": "user", "content": query }
            ],
            "temperature": 0.7,
            "max_tokens": 1024,
        });

        let resp = self
            .client
            .post("https://api.together.xyz/v1/chat/completions")
            .bearer_auth(key)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("LLM API error {}: {}", status, text);
        }

        let data: serde_json::Value = resp.json().await?;
        let answer = data["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or("")
            .trim()
            .to_string();
        if answer.is_empty() {
            anyhow::bail!("Empty response from language model");
        }
        Ok(truncate_for_speech(&answer))
    }
}

/// Keep spoken answers under [`MAX_SPOKEN_ANSWER_CHARS`] characters.
fn truncate_for_speech(text: &str) -> String {
    if text.chars().count() <= MAX_SPOKEN_ANSWER_CHARS {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(MAX_SPOKEN_ANSWER_CHARS - 3).collect();
    truncated.push_str("...");
    truncated
}

#[cfg(test)]
pub(crate) mod testing {
    //! Canned provider double for dispatcher tests.

    use std::sync::{Arc, Mutex};

    use super::WebFetch;

    #[derive(Clone, Default)]
    pub struct FakeFetch {
        pub weather_reply: Option<String>,
        pub news_reply: Option<String>,
        pub joke_reply: Option<String>,
        pub wiki_reply: Option<String>,
        pub llm_reply: Option<String>,
        /// (method, argument) pairs in call order.
        pub calls: Arc<Mutex<Vec<(String, String)>>>,
    }

    impl FakeFetch {
        fn canned(&self, reply: &Option<String>, what: &str) -> anyhow::Result<String> {
            reply
                .clone()
                .ok_or_else(|| anyhow::anyhow!("{} unavailable", what))
        }

        pub fn recorded_calls(&self) -> Vec<(String, String)> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl WebFetch for FakeFetch {
        async fn weather(&self, city: &str) -> anyhow::Result<String> {
            self.calls
                .lock()
                .unwrap()
                .push(("weather".into(), city.into()));
            self.canned(&self.weather_reply, "weather")
        }

        async fn news(&self, category: &str, count: usize) -> anyhow::Result<String> {
            self.calls
                .lock()
                .unwrap()
                .push(("news".into(), format!("{}:{}", category, count)));
            self.canned(&self.news_reply, "news")
        }

        async fn joke(&self) -> anyhow::Result<String> {
            self.calls.lock().unwrap().push(("joke".into(), String::new()));
            self.canned(&self.joke_reply, "joke")
        }

        async fn wiki_summary(&self, topic: &str) -> anyhow::Result<String> {
            self.calls
                .lock()
                .unwrap()
                .push(("wiki".into(), topic.into()));
            self.canned(&self.wiki_reply, "wiki")
        }

        async fn ask_llm(&self, query: &str) -> anyhow::Result<String> {
            self.calls
                .lock()
                .unwrap()
                .push(("llm".into(), query.into()));
            self.canned(&self.llm_reply, "llm")
        }
    }
}
