//! Email transport boundary.
//!
//! [`HttpMailer`] delivers through a JSON mail API endpoint (POST
//! `{from, to, subject, text}` with a bearer token) — the transport itself
//! stays swappable behind the [`Mailer`] trait.

use std::future::Future;

use serde_json::json;
use tracing::debug;

/// Email send boundary consumed by the dispatcher. The future is `Send` so
/// dispatch can run on spawned tasks.
pub trait Mailer: Send + Sync {
    /// Send an email. `Ok` carries a speakable status line; `Err` carries
    /// the underlying reason.
    fn send(
        &self,
        to: &str,
        subject: &str,
        body: &str,
    ) -> impl Future<Output = anyhow::Result<String>> + Send;
}

/// Reqwest-backed mail API client.
pub struct HttpMailer {
    client: reqwest::Client,
    endpoint: Option<String>,
    api_key: Option<String>,
    from: Option<String>,
}

impl HttpMailer {
    pub fn new(endpoint: Option<String>, api_key: Option<String>, from: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            api_key,
            from,
        }
    }
}

impl Mailer for HttpMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<String> {
        let (Some(endpoint), Some(from)) = (self.endpoint.as_deref(), self.from.as_deref())
        else {
            anyhow::bail!(
                "Email credentials not configured. Please set MAIL_ENDPOINT and MAIL_FROM."
            );
        };

        debug!(to = %to, "Sending email");
        let mut req = self.client.post(endpoint).json(&json!({
            "from": from,
            "to": to,
            "subject": subject,
            "text": body,
        }));
        if let Some(key) = self.api_key.as_deref() {
            req = req.bearer_auth(key);
        }

        let resp = req.send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("Failed to send email: {} {}", status, text);
        }

        Ok(format!("Email sent successfully to {}", to))
    }
}
