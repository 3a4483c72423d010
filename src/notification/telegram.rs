//! A client for the Telegram Bot API.

use crate::core::Transport;
use crate::error::RelayError;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, error, instrument};

/// The envelope every Bot API method replies with.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

/// An incoming update. Only plain messages are of interest.
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub chat: Chat,
    pub from: Option<User>,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub first_name: String,
    pub last_name: Option<String>,
}

impl User {
    pub fn full_name(&self) -> String {
        match &self.last_name {
            Some(last) => format!("{} {}", self.first_name, last),
            None => self.first_name.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct BotCommand<'a> {
    command: &'a str,
    description: &'a str,
}

/// A thin Bot API client. The token is embedded in the method URLs and is
/// never logged.
#[derive(Clone)]
pub struct TelegramClient {
    http: reqwest::Client,
    api_url: String,
    token: String,
    send_timeout: Duration,
}

impl TelegramClient {
    pub fn new(api_url: impl Into<String>, token: impl Into<String>, send_timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            send_timeout,
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_url, self.token, method)
    }

    /// Calls a Bot API method and unwraps the response envelope.
    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: &Value,
        timeout: Duration,
    ) -> anyhow::Result<T> {
        let response = self
            .http
            .post(self.method_url(method))
            .timeout(timeout)
            .json(body)
            .send()
            .await
            // Strip the URL so the token cannot leak into logs.
            .map_err(|e| e.without_url())?;

        let status = response.status();
        let envelope: ApiResponse<T> = match response.json().await {
            Ok(envelope) => envelope,
            Err(e) => {
                anyhow::bail!("{} returned status {} with an unreadable body: {}", method, status, e.without_url())
            }
        };

        if !status.is_success() || !envelope.ok {
            anyhow::bail!(
                "{} failed with status {}: {}",
                method,
                status,
                envelope.description.unwrap_or_default()
            );
        }
        envelope
            .result
            .ok_or_else(|| anyhow::anyhow!("{} returned no result", method))
    }

    pub async fn send_message(&self, chat_id: &str, text: &str) -> anyhow::Result<()> {
        let body = json!({ "chat_id": chat_id, "text": text });
        let _: Value = self.call("sendMessage", &body, self.send_timeout).await?;
        Ok(())
    }

    /// Long-polls for updates newer than `offset`.
    pub async fn get_updates(&self, offset: i64, poll_timeout: Duration) -> anyhow::Result<Vec<Update>> {
        let body = json!({
            "offset": offset,
            "timeout": poll_timeout.as_secs(),
            "allowed_updates": ["message"],
        });
        // The HTTP timeout has to outlast the server-side long poll.
        self.call("getUpdates", &body, poll_timeout + Duration::from_secs(10))
            .await
    }

    /// Registers the command menu shown by chat clients.
    pub async fn set_my_commands(&self, commands: &[(String, String)]) -> anyhow::Result<()> {
        let commands: Vec<BotCommand<'_>> = commands
            .iter()
            .map(|(command, description)| BotCommand {
                command: command.as_str(),
                description: description.as_str(),
            })
            .collect();
        let _: bool = self
            .call("setMyCommands", &json!({ "commands": commands }), self.send_timeout)
            .await?;
        Ok(())
    }
}

/// Delivers notifications as Telegram chat messages.
pub struct TelegramTransport {
    client: TelegramClient,
}

impl TelegramTransport {
    pub fn new(client: TelegramClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for TelegramTransport {
    fn name(&self) -> &str {
        "telegram"
    }

    #[instrument(skip(self, text), fields(len = text.len()))]
    async fn send(&self, subscriber_id: &str, text: &str) -> Result<(), RelayError> {
        match self.client.send_message(subscriber_id, text).await {
            Ok(()) => {
                debug!("Delivered notification");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Telegram delivery failed");
                Err(RelayError::TransportFailure {
                    subscriber: subscriber_id.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }
}
