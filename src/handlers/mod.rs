use log::{error, info, warn};
use serenity::async_trait;
use serenity::model::application::interaction::Interaction;
use serenity::model::channel::Reaction;
use serenity::model::gateway::Ready;
use serenity::model::guild::{Member, PartialMember};
use serenity::prelude::*;
use std::sync::Arc;

use crate::commands;
use crate::manager::{PollManager, ReactionEvent, ReactionKind};
use crate::models::Voter;
use crate::platform::reaction_glyph;

/// Gateway event handler wiring Discord events into a `PollManager`.
pub struct PollHandler {
    manager: Arc<PollManager>,
    register_commands: bool,
}

impl PollHandler {
    pub fn new(manager: Arc<PollManager>) -> Self {
        Self {
            manager,
            register_commands: true,
        }
    }

    /// Leave slash command registration to the host application.
    pub fn without_commands(mut self) -> Self {
        self.register_commands = false;
        self
    }
}

/// Platform-neutral view of a gateway reaction. `None` when no user is attached
/// or the emoji carries no usable glyph.
pub fn reaction_event(kind: ReactionKind, reaction: &Reaction) -> Option<ReactionEvent> {
    Some(ReactionEvent {
        kind,
        message_id: reaction.message_id.0.to_string(),
        user_id: reaction.user_id?.0.to_string(),
        glyph: reaction_glyph(&reaction.emoji)?,
        voter: reaction.member.as_ref().and_then(partial_member_voter),
    })
}

fn partial_member_voter(member: &PartialMember) -> Option<Voter> {
    let user = member.user.as_ref()?;
    Some(Voter {
        id: user.id.0.to_string(),
        display_name: member.nick.clone().unwrap_or_else(|| user.name.clone()),
        bot: user.bot,
    })
}

fn member_voter(member: &Member) -> Voter {
    Voter {
        id: member.user.id.0.to_string(),
        display_name: member.nick.clone().unwrap_or_else(|| member.user.name.clone()),
        bot: member.user.bot,
    }
}

impl PollHandler {
    // Gateway payload first, then the member cache; the manager falls back to HTTP.
    async fn dispatch(&self, ctx: &Context, kind: ReactionKind, reaction: &Reaction) {
        let Some(mut event) = reaction_event(kind, reaction) else {
            return;
        };
        if event.voter.is_none() {
            if let (Some(guild_id), Some(user_id)) = (reaction.guild_id, reaction.user_id) {
                event.voter = ctx.cache.member(guild_id, user_id).as_ref().map(member_voter);
            }
        }
        self.manager.dispatch_reaction(event).await;
    }
}

#[async_trait]
impl EventHandler for PollHandler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("{} is connected!", ready.user.name);

        // Load stored polls before commands can create new ones
        let restored = self.manager.bootstrap().await;
        if restored > 0 {
            info!("Tracking {} restored poll(s)", restored);
        }

        if self.register_commands {
            if let Err(why) = commands::register_commands(&ctx).await {
                error!("Failed to register slash commands: {:?}", why);
            }
        }
    }

    async fn reaction_add(&self, ctx: Context, add_reaction: Reaction) {
        self.dispatch(&ctx, ReactionKind::Add, &add_reaction).await;
    }

    async fn reaction_remove(&self, ctx: Context, removed_reaction: Reaction) {
        self.dispatch(&ctx, ReactionKind::Remove, &removed_reaction).await;
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        let manager = Arc::clone(&self.manager);

        // Spawn a task to handle the interaction concurrently
        tokio::spawn(async move {
            let result = match interaction {
                Interaction::ApplicationCommand(command) => {
                    commands::handle_command(&manager, &ctx, &command).await
                }
                other => {
                    warn!("Unhandled interaction type: {:?}", other.kind());
                    Ok(())
                }
            };

            if let Err(why) = result {
                error!("Interaction handler error: {:?}", why);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn reaction(value: serde_json::Value) -> Reaction {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn unicode_reaction_becomes_event() {
        let reaction = reaction(json!({
            "channel_id": "200",
            "message_id": "300",
            "user_id": "7",
            "guild_id": "100",
            "emoji": { "id": null, "name": "✅" }
        }));

        let event = reaction_event(ReactionKind::Add, &reaction).unwrap();
        assert_eq!(event.kind, ReactionKind::Add);
        assert_eq!(event.message_id, "300");
        assert_eq!(event.user_id, "7");
        assert_eq!(event.glyph, "✅");
        assert_eq!(event.voter, None);
    }

    #[test]
    fn custom_emoji_uses_its_name() {
        let reaction = reaction(json!({
            "channel_id": "200",
            "message_id": "300",
            "user_id": "7",
            "emoji": { "id": "42", "name": "party", "animated": false }
        }));

        let event = reaction_event(ReactionKind::Remove, &reaction).unwrap();
        assert_eq!(event.kind, ReactionKind::Remove);
        assert_eq!(event.glyph, "party");
    }

    #[test]
    fn reaction_without_user_is_dropped() {
        let reaction = reaction(json!({
            "channel_id": "200",
            "message_id": "300",
            "emoji": { "id": null, "name": "✅" }
        }));

        assert!(reaction.user_id.is_none());
        assert_eq!(reaction_event(ReactionKind::Add, &reaction), None);
    }

    #[test]
    fn member_payload_fills_voter() {
        let reaction = reaction(json!({
            "channel_id": "200",
            "message_id": "300",
            "user_id": "3",
            "guild_id": "100",
            "emoji": { "id": null, "name": "❌" },
            "member": {
                "user": {
                    "id": "3",
                    "username": "helper",
                    "discriminator": "0001",
                    "avatar": null,
                    "bot": true
                },
                "nick": null,
                "roles": [],
                "joined_at": "2022-01-01T00:00:00+00:00",
                "deaf": false,
                "mute": false
            }
        }));

        let event = reaction_event(ReactionKind::Add, &reaction).unwrap();
        assert_eq!(
            event.voter,
            Some(Voter {
                id: "3".to_string(),
                display_name: "helper".to_string(),
                bot: true,
            })
        );
    }
}
