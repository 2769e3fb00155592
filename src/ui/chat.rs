use anyhow::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use serenity::{
    all::{ActivityData, ShardMessenger},
    builder::{CreateMessage, EditMessage},
    http::Http,
    model::id::{ChannelId, MessageId},
};
use std::sync::Arc;
use tracing::debug;

use super::buttons;

/// Which control row accompanies a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackControls {
    Playing,
    Paused,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub content: String,
    pub controls: Option<PlaybackControls>,
}

impl OutgoingMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            controls: None,
        }
    }

    pub fn with_controls(content: impl Into<String>, controls: PlaybackControls) -> Self {
        Self {
            content: content.into(),
            controls: Some(controls),
        }
    }
}

/// Reference to a message the bot posted and may edit or delete later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHandle {
    pub channel_id: ChannelId,
    pub message_id: MessageId,
}

/// Text channel the now-playing display lives in, plus the bot's presence.
#[async_trait]
pub trait ChatSurface: Send + Sync {
    async fn send(&self, channel_id: ChannelId, message: OutgoingMessage) -> Result<MessageHandle>;

    async fn edit(&self, handle: &MessageHandle, message: OutgoingMessage) -> Result<()>;

    async fn delete(&self, handle: &MessageHandle) -> Result<()>;

    /// "Listening to {title}", or no activity for `None`.
    async fn set_listening(&self, title: Option<String>);
}

pub struct SerenityChat {
    http: Arc<Http>,
    shard: RwLock<Option<ShardMessenger>>,
}

impl SerenityChat {
    pub fn new(http: Arc<Http>) -> Self {
        Self {
            http,
            shard: RwLock::new(None),
        }
    }

    /// Presence updates go through the gateway, so they need the shard the
    /// bot is connected on. Called from `ready`.
    pub fn attach_shard(&self, shard: ShardMessenger) {
        *self.shard.write() = Some(shard);
    }
}

#[async_trait]
impl ChatSurface for SerenityChat {
    async fn send(&self, channel_id: ChannelId, message: OutgoingMessage) -> Result<MessageHandle> {
        let mut builder = CreateMessage::new().content(message.content);
        if let Some(controls) = message.controls {
            builder = builder.components(buttons::playback_controls(controls));
        }

        let posted = channel_id.send_message(&self.http, builder).await?;
        Ok(MessageHandle {
            channel_id,
            message_id: posted.id,
        })
    }

    async fn edit(&self, handle: &MessageHandle, message: OutgoingMessage) -> Result<()> {
        let components = message
            .controls
            .map(buttons::playback_controls)
            .unwrap_or_default();
        let builder = EditMessage::new()
            .content(message.content)
            .components(components);

        handle
            .channel_id
            .edit_message(&self.http, handle.message_id, builder)
            .await?;
        Ok(())
    }

    async fn delete(&self, handle: &MessageHandle) -> Result<()> {
        handle
            .channel_id
            .delete_message(&self.http, handle.message_id)
            .await?;
        Ok(())
    }

    async fn set_listening(&self, title: Option<String>) {
        let shard = self.shard.read().clone();
        match shard {
            Some(shard) => shard.set_activity(title.map(ActivityData::listening)),
            None => debug!("Sin shard todavía, presencia no actualizada"),
        }
    }
}
