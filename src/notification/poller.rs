//! The command poller is a long-running actor that pulls inbound chat
//! messages, applies subscription commands and replies.

use crate::commands::CommandHandler;
use crate::notification::telegram::{TelegramClient, Update};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info, warn};

/// The inbound side of a chat service.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Waits up to `timeout` for updates with an id of at least `offset`.
    async fn get_updates(&self, offset: i64, timeout: Duration) -> anyhow::Result<Vec<Update>>;

    async fn send_message(&self, chat_id: &str, text: &str) -> anyhow::Result<()>;
}

#[async_trait]
impl ChatClient for TelegramClient {
    async fn get_updates(&self, offset: i64, timeout: Duration) -> anyhow::Result<Vec<Update>> {
        TelegramClient::get_updates(self, offset, timeout).await
    }

    async fn send_message(&self, chat_id: &str, text: &str) -> anyhow::Result<()> {
        TelegramClient::send_message(self, chat_id, text).await
    }
}

/// The `CommandPoller` actor.
pub struct CommandPoller<C: ChatClient> {
    client: Arc<C>,
    handler: CommandHandler,
    poll_timeout: Duration,
    retry_backoff: Duration,
    offset: i64,
}

impl<C: ChatClient> CommandPoller<C> {
    pub fn new(client: Arc<C>, handler: CommandHandler, poll_timeout: Duration) -> Self {
        Self {
            client,
            handler,
            poll_timeout,
            retry_backoff: Duration::from_secs(5),
            offset: 0,
        }
    }

    /// Overrides the pause after a failed poll.
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Runs the poll loop until shutdown. Poll failures are retried after the
    /// back-off and never end the loop.
    pub async fn run(mut self, mut shutdown_rx: watch::Receiver<bool>) {
        info!("Command poller started.");
        loop {
            let result = tokio::select! {
                biased;
                _ = shutdown_rx.changed() => {
                    info!("Command poller received shutdown signal.");
                    break;
                }
                result = self.client.get_updates(self.offset, self.poll_timeout) => result,
            };

            match result {
                Ok(updates) => {
                    for update in updates {
                        self.offset = self.offset.max(update.update_id + 1);
                        self.process(update).await;
                    }
                }
                Err(e) => {
                    warn!(error = %e, backoff_ms = self.retry_backoff.as_millis() as u64, "Polling for commands failed");
                    tokio::select! {
                        biased;
                        _ = shutdown_rx.changed() => break,
                        _ = sleep(self.retry_backoff) => {}
                    }
                }
            }
        }
        info!("Command poller finished.");
    }

    async fn process(&self, update: Update) {
        let Some(message) = update.message else {
            return;
        };
        let Some(text) = message.text.as_deref() else {
            return;
        };
        let chat_id = message.chat.id.to_string();
        let name = message.from.as_ref().map(|u| u.full_name());

        match self.handler.handle(&chat_id, name.as_deref(), text).await {
            Ok(Some(reply)) => {
                if let Err(e) = self.client.send_message(&chat_id, &reply).await {
                    warn!(chat_id, error = %e, "Failed to send command reply");
                }
            }
            Ok(None) => debug!(chat_id, "Ignoring non-command message"),
            Err(e) => error!(chat_id, error = %e, "Failed to apply command"),
        }
    }
}
