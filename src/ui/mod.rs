//! # UI Module
//!
//! Everything the bot shows in a text channel: the chat surface the playback
//! session posts its live "now playing" line to, the control buttons under
//! it, reply texts and embeds for slash commands.

pub mod buttons;
pub mod chat;
pub mod embeds;
pub mod messages;
