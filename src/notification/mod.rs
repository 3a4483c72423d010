//! Chat-service plumbing: outbound delivery and the inbound command loop.
//!
//! The dispatch engine only sees the `Transport` trait; the Telegram client
//! here is one implementation of it and also feeds subscriber commands to the
//! `CommandHandler`.
pub mod poller;
pub mod telegram;
