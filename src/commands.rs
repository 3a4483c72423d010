//! The chat command surface that manages subscriptions.
//!
//! Commands arrive as raw message text from the transport's inbound side.
//! `/start` subscribes, `/stop` unsubscribes, and `/<level>` (one command per
//! recognised severity) changes the threshold.

use crate::core::SubscriberDirectory;
use crate::error::RelayError;
use crate::severity::{Severity, SeverityModel};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// A parsed subscriber command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    SetThreshold(Severity),
    Stop,
    Help,
    Unknown(String),
}

#[derive(Error, Debug)]
pub enum CommandError {
    #[error(transparent)]
    Directory(#[from] RelayError),
}

/// Parses message text into a command.
///
/// Returns `None` for text that is not a command. The command word is
/// case-insensitive, an `@botname` suffix is ignored and so are any trailing
/// arguments.
pub fn parse_command(text: &str, severity: &SeverityModel) -> Option<Command> {
    let word = text.split_whitespace().next()?;
    let name = word.strip_prefix('/')?;
    let name = name.split('@').next().unwrap_or(name).to_lowercase();

    let command = match name.as_str() {
        "start" => Command::Start,
        "stop" => Command::Stop,
        "help" => Command::Help,
        other => match severity.parse_loose(other) {
            Ok(level) => Command::SetThreshold(level),
            Err(_) => Command::Unknown(other.to_string()),
        },
    };
    Some(command)
}

/// The menu entries advertised to the chat client.
pub fn command_menu(severity: &SeverityModel) -> Vec<(String, String)> {
    let mut menu = vec![("start".to_string(), "Subscribe to log notifications".to_string())];
    for (level, _) in severity.levels() {
        menu.push((
            level.as_str().to_lowercase(),
            format!("Set log level to {}", level),
        ));
    }
    menu.push(("stop".to_string(), "Unsubscribe from log notifications".to_string()));
    menu
}

const NOT_SUBSCRIBED: &str = "You aren't subscribed to notifications";

/// Applies commands to the subscriber directory and produces text replies.
pub struct CommandHandler {
    directory: Arc<dyn SubscriberDirectory>,
    severity: Arc<SeverityModel>,
    default_threshold: Severity,
}

impl CommandHandler {
    pub fn new(
        directory: Arc<dyn SubscriberDirectory>,
        severity: Arc<SeverityModel>,
        default_threshold: Severity,
    ) -> Self {
        Self {
            directory,
            severity,
            default_threshold,
        }
    }

    /// Handles one inbound message.
    ///
    /// # Returns
    /// * `Ok(Some(reply))` for commands
    /// * `Ok(None)` for plain text, which gets no reply
    pub async fn handle(
        &self,
        subscriber_id: &str,
        display_name: Option<&str>,
        text: &str,
    ) -> Result<Option<String>, CommandError> {
        let Some(command) = parse_command(text, &self.severity) else {
            return Ok(None);
        };
        debug!(subscriber_id, ?command, "Handling command");

        let reply = match command {
            Command::Start => {
                // Re-subscribing resets the threshold to the default.
                self.directory
                    .upsert(subscriber_id, self.default_threshold.as_str())
                    .await?;
                info!(subscriber_id, threshold = %self.default_threshold, "Subscriber added");
                self.greeting(display_name)
            }
            Command::SetThreshold(level) => {
                if self.directory.set_threshold(subscriber_id, level.as_str()).await? {
                    info!(subscriber_id, threshold = %level, "Subscriber threshold changed");
                    format!("Log level set to {}", level)
                } else {
                    NOT_SUBSCRIBED.to_string()
                }
            }
            Command::Stop => {
                if self.directory.remove(subscriber_id).await? {
                    info!(subscriber_id, "Subscriber removed");
                    "Sending logs is stopped".to_string()
                } else {
                    NOT_SUBSCRIBED.to_string()
                }
            }
            Command::Help | Command::Unknown(_) => self.help(),
        };
        Ok(Some(reply))
    }

    fn greeting(&self, display_name: Option<&str>) -> String {
        let hello = match display_name {
            Some(name) => format!("Hello, {}! ", name),
            None => "Hello! ".to_string(),
        };
        format!(
            "{}I'll send you all {} messages from logs.\n{}",
            hello,
            self.default_threshold,
            self.help()
        )
    }

    fn help(&self) -> String {
        let mut lines = vec!["Commands:".to_string()];
        for (level, _) in self.severity.levels() {
            lines.push(format!(
                "/{} - set log level to {}",
                level.as_str().to_lowercase(),
                level
            ));
        }
        lines.push("/stop - stop sending logs".to_string());
        lines.join("\n")
    }
}
