use chrono::Duration;
use log::{error, info};
use serenity::builder::CreateApplicationCommand;
use serenity::model::application::command::CommandOptionType;
use serenity::model::application::interaction::application_command::{
    ApplicationCommandInteraction, CommandDataOption,
};
use serenity::model::application::interaction::InteractionResponseType;
use serenity::prelude::*;

use crate::error::PollError;
use crate::manager::{PollManager, MAX_ANSWERS};
use crate::models::{AnswerSpec, ChannelRef, PollOptions};

const MAX_DURATION_MINUTES: i64 = 60 * 24 * 30;

pub fn create_poll_command(command: &mut CreateApplicationCommand) -> &mut CreateApplicationCommand {
    command
        .name("poll")
        .description("Create and manage reaction polls")
        .create_option(|option| {
            option
                .name("create")
                .description("Create a new poll")
                .kind(CommandOptionType::SubCommand)
                .create_sub_option(|sub_option| {
                    sub_option
                        .name("question")
                        .description("The poll question")
                        .kind(CommandOptionType::String)
                        .required(true)
                })
                .create_sub_option(|sub_option| {
                    sub_option
                        .name("duration")
                        .description("How long the poll stays open, in minutes")
                        .kind(CommandOptionType::Integer)
                        .required(true)
                })
                .create_sub_option(|sub_option| {
                    sub_option
                        .name("answers")
                        .description("Comma-separated answers, each starting with its emoji (default: ✅ Yes, ❌ No)")
                        .kind(CommandOptionType::String)
                        .required(false)
                })
        })
        .create_option(|option| {
            option
                .name("end")
                .description("End an active poll now")
                .kind(CommandOptionType::SubCommand)
                .create_sub_option(|sub_option| {
                    sub_option
                        .name("poll_id")
                        .description("Message ID of the poll")
                        .kind(CommandOptionType::String)
                        .required(true)
                })
        })
        .create_option(|option| {
            option
                .name("delete")
                .description("Stop tracking a poll")
                .kind(CommandOptionType::SubCommand)
                .create_sub_option(|sub_option| {
                    sub_option
                        .name("poll_id")
                        .description("Message ID of the poll")
                        .kind(CommandOptionType::String)
                        .required(true)
                })
        })
}

fn string_option<'a>(options: &'a [CommandDataOption], name: &str) -> Option<&'a str> {
    options
        .iter()
        .find(|o| o.name == name)
        .and_then(|o| o.value.as_ref())
        .and_then(|v| v.as_str())
}

fn integer_option(options: &[CommandDataOption], name: &str) -> Option<i64> {
    options
        .iter()
        .find(|o| o.name == name)
        .and_then(|o| o.value.as_ref())
        .and_then(|v| v.as_i64())
}

/// Parse `"✅ Yes, ❌ No"` into answers: the first word of each entry is its emoji.
pub fn parse_answers(raw: &str) -> Result<Vec<AnswerSpec>, String> {
    let mut answers = Vec::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (emoji, name) = match entry.split_once(char::is_whitespace) {
            Some((emoji, name)) if !name.trim().is_empty() => (emoji, name.trim()),
            _ => return Err(format!("Answer \"{}\" needs an emoji followed by a label", entry)),
        };
        answers.push(AnswerSpec::new(name, emoji));
    }

    if answers.is_empty() {
        return Err("Provide at least one answer".to_string());
    }
    if answers.len() > MAX_ANSWERS {
        return Err(format!("A poll can have at most {} answers", MAX_ANSWERS));
    }
    Ok(answers)
}

/// Turn the `create` sub-options into poll options, or a message for the user.
pub fn build_poll_options(
    question: Option<&str>,
    duration_minutes: Option<i64>,
    answers: Option<&str>,
) -> Result<PollOptions, String> {
    let question = question.map(str::trim).unwrap_or_default();
    if question.is_empty() {
        return Err("The poll needs a question".to_string());
    }

    let minutes = duration_minutes.unwrap_or(0);
    if minutes <= 0 || minutes > MAX_DURATION_MINUTES {
        return Err(format!("Duration must be between 1 and {} minutes", MAX_DURATION_MINUTES));
    }

    let mut options = PollOptions::new(question, Duration::minutes(minutes));
    if let Some(raw) = answers {
        options = options.answers(parse_answers(raw)?);
    }
    Ok(options)
}

pub async fn handle_poll_command(
    manager: &PollManager,
    ctx: &Context,
    command: &ApplicationCommandInteraction,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let subcommand = match command.data.options.first() {
        Some(option) => option,
        None => {
            send_ephemeral(ctx, command, "No subcommand provided").await?;
            return Ok(());
        }
    };

    match subcommand.name.as_str() {
        "create" => handle_create_poll(manager, ctx, command, &subcommand.options).await?,
        "end" => handle_end_poll(manager, ctx, command, &subcommand.options).await?,
        "delete" => handle_delete_poll(manager, ctx, command, &subcommand.options).await?,
        _ => {
            send_ephemeral(ctx, command, "Unknown subcommand").await?;
        }
    }

    Ok(())
}

async fn handle_create_poll(
    manager: &PollManager,
    ctx: &Context,
    command: &ApplicationCommandInteraction,
    options: &[CommandDataOption],
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let poll_options = match build_poll_options(
        string_option(options, "question"),
        integer_option(options, "duration"),
        string_option(options, "answers"),
    ) {
        Ok(poll_options) => poll_options,
        Err(message) => {
            send_ephemeral(ctx, command, &message).await?;
            return Ok(());
        }
    };

    // Posting the poll and its reactions can outlast the interaction deadline
    command
        .create_interaction_response(&ctx.http, |response| {
            response
                .kind(InteractionResponseType::DeferredChannelMessageWithSource)
                .interaction_response_data(|message| message.ephemeral(true))
        })
        .await?;

    let channel = ChannelRef::new(
        command.guild_id.map(|id| id.0.to_string()),
        command.channel_id.0.to_string(),
    );
    let reply = match manager.create_poll(&channel, poll_options).await {
        Ok(poll) => {
            info!("User {} created poll {}", command.user.id, poll.id());
            format!("Poll created (ID `{}`).", poll.id())
        }
        Err(PollError::Validation(reason)) => format!("Could not create the poll: {}", reason),
        Err(e) => {
            error!("Failed to create poll: {}", e);
            "Something went wrong while posting the poll.".to_string()
        }
    };

    command
        .edit_original_interaction_response(&ctx.http, |response| response.content(reply))
        .await?;
    Ok(())
}

async fn handle_end_poll(
    manager: &PollManager,
    ctx: &Context,
    command: &ApplicationCommandInteraction,
    options: &[CommandDataOption],
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let Some(poll_id) = string_option(options, "poll_id").map(str::trim) else {
        send_ephemeral(ctx, command, "Missing poll ID").await?;
        return Ok(());
    };

    let reply = match manager.end_poll(poll_id).await {
        Ok(true) => format!("Poll `{}` has been ended.", poll_id),
        Ok(false) => format!("Poll `{}` had already ended.", poll_id),
        Err(PollError::UnknownPoll(_)) => format!("No poll found with ID `{}`.", poll_id),
        Err(e) => {
            error!("Failed to end poll {}: {}", poll_id, e);
            "Something went wrong while ending the poll.".to_string()
        }
    };
    send_ephemeral(ctx, command, &reply).await?;
    Ok(())
}

async fn handle_delete_poll(
    manager: &PollManager,
    ctx: &Context,
    command: &ApplicationCommandInteraction,
    options: &[CommandDataOption],
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let Some(poll_id) = string_option(options, "poll_id").map(str::trim) else {
        send_ephemeral(ctx, command, "Missing poll ID").await?;
        return Ok(());
    };

    let reply = match manager.delete_poll(poll_id).await {
        Ok(poll) => format!("Stopped tracking poll \"{}\".", poll.name),
        Err(PollError::UnknownPoll(_)) => format!("No poll found with ID `{}`.", poll_id),
        Err(e) => {
            error!("Failed to delete poll {}: {}", poll_id, e);
            "Something went wrong while deleting the poll.".to_string()
        }
    };
    send_ephemeral(ctx, command, &reply).await?;
    Ok(())
}

async fn send_ephemeral(
    ctx: &Context,
    command: &ApplicationCommandInteraction,
    content: &str,
) -> Result<(), serenity::Error> {
    command
        .create_interaction_response(&ctx.http, |response| {
            response
                .kind(InteractionResponseType::ChannelMessageWithSource)
                .interaction_response_data(|message| message.content(content).ephemeral(true))
        })
        .await
}
