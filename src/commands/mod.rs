pub mod poll;

use log::info;
use serenity::model::application::command::Command;
use serenity::model::application::interaction::application_command::ApplicationCommandInteraction;
use serenity::model::application::interaction::InteractionResponseType;
use serenity::prelude::*;

use crate::manager::PollManager;

/// Register the bot's slash commands globally.
pub async fn register_commands(ctx: &Context) -> Result<(), serenity::Error> {
    let commands = Command::set_global_application_commands(&ctx.http, |commands_builder| {
        commands_builder.create_application_command(|command| poll::create_poll_command(command))
    })
    .await?;
    info!("Registered {} global slash command(s)", commands.len());
    Ok(())
}

pub async fn handle_command(
    manager: &PollManager,
    ctx: &Context,
    command: &ApplicationCommandInteraction,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    info!("Received command: {}", command.data.name);
    match command.data.name.as_str() {
        "poll" => poll::handle_poll_command(manager, ctx, command).await?,
        _ => {
            command
                .create_interaction_response(&ctx.http, |response| {
                    response
                        .kind(InteractionResponseType::ChannelMessageWithSource)
                        .interaction_response_data(|message| message.content("Unknown command").ephemeral(true))
                })
                .await?;
        }
    }

    Ok(())
}
