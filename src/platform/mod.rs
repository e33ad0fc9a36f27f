//! The narrow seam between poll logic and the chat platform.

#[cfg(test)]
pub(crate) mod mock;

use async_trait::async_trait;
use serenity::builder::CreateEmbed;
use serenity::http::Http;
use serenity::model::channel::ReactionType;
use serenity::model::id::{ChannelId, MessageId};
use std::sync::Arc;

use crate::error::{PollError, Result};
use crate::models::{ChannelRef, MessageRef, Voter};
use crate::render::EmbedSpec;

/// Calls the poll manager makes against the chat platform.
#[async_trait]
pub trait PollPlatform: Send + Sync {
    /// Post a new message carrying `embed` and return where it landed.
    async fn send_embed(&self, channel: &ChannelRef, embed: &EmbedSpec) -> Result<MessageRef>;

    async fn add_reaction(&self, message: &MessageRef, glyph: &str) -> Result<()>;

    /// Replace the embed of an existing message.
    async fn edit_embed(&self, message: &MessageRef, embed: &EmbedSpec) -> Result<()>;

    /// Look up the user behind a reaction. `Ok(None)` when they cannot be found.
    async fn resolve_voter(&self, message: &MessageRef, user_id: &str) -> Result<Option<Voter>>;
}

/// Discord through serenity's HTTP client.
#[derive(Clone)]
pub struct SerenityPlatform {
    http: Arc<Http>,
}

impl SerenityPlatform {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

fn parse_id(raw: &str, what: &str) -> Result<u64> {
    raw.parse::<u64>()
        .map_err(|_| PollError::Platform(format!("invalid {} id: {:?}", what, raw)))
}

fn to_create_embed(spec: &EmbedSpec) -> CreateEmbed {
    let mut embed = CreateEmbed::default();
    if let Some(title) = &spec.title {
        embed.title(title);
    }
    if let Some(description) = &spec.description {
        embed.description(description);
    }
    for field in &spec.fields {
        embed.field(&field.name, &field.value, field.inline);
    }
    if let Some(color) = spec.color {
        embed.color(color);
    }
    if let Some(footer) = &spec.footer {
        embed.footer(|f| f.text(footer));
    }
    embed
}

#[async_trait]
impl PollPlatform for SerenityPlatform {
    async fn send_embed(&self, channel: &ChannelRef, embed: &EmbedSpec) -> Result<MessageRef> {
        let channel_id = ChannelId(parse_id(&channel.channel_id, "channel")?);
        let embed = to_create_embed(embed);

        let message = channel_id
            .send_message(&self.http, |m| m.set_embed(embed))
            .await?;

        Ok(MessageRef {
            guild_id: message
                .guild_id
                .map(|id| id.0.to_string())
                .or_else(|| channel.guild_id.clone()),
            channel_id: message.channel_id.0.to_string(),
            message_id: message.id.0.to_string(),
        })
    }

    async fn add_reaction(&self, message: &MessageRef, glyph: &str) -> Result<()> {
        let channel_id = ChannelId(parse_id(&message.channel_id, "channel")?);
        let message_id = MessageId(parse_id(&message.message_id, "message")?);

        channel_id
            .create_reaction(&self.http, message_id, ReactionType::Unicode(glyph.to_string()))
            .await?;
        Ok(())
    }

    async fn edit_embed(&self, message: &MessageRef, embed: &EmbedSpec) -> Result<()> {
        let channel_id = ChannelId(parse_id(&message.channel_id, "channel")?);
        let message_id = MessageId(parse_id(&message.message_id, "message")?);
        let embed = to_create_embed(embed);

        channel_id
            .edit_message(&self.http, message_id, |m| m.set_embed(embed))
            .await?;
        Ok(())
    }

    async fn resolve_voter(&self, message: &MessageRef, user_id: &str) -> Result<Option<Voter>> {
        let user = parse_id(user_id, "user")?;

        match &message.guild_id {
            Some(guild_id) => {
                let guild = parse_id(guild_id, "guild")?;
                let member = self.http.get_member(guild, user).await?;
                Ok(Some(Voter {
                    id: member.user.id.0.to_string(),
                    display_name: member.nick.clone().unwrap_or_else(|| member.user.name.clone()),
                    bot: member.user.bot,
                }))
            }
            // Polls only count guild members
            None => Ok(None),
        }
    }
}

/// Glyph carried by a reaction: the unicode emoji itself, or a custom emoji's name.
pub fn reaction_glyph(reaction: &ReactionType) -> Option<String> {
    match reaction {
        ReactionType::Unicode(emoji) => Some(emoji.clone()),
        ReactionType::Custom { name, .. } => name.clone(),
        _ => None,
    }
}
