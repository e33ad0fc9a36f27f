use log::{error, info};
use react_poll::{ManagerConfig, PollHandler, PollManager, RenderRegistry, SerenityPlatform};
use serenity::http::Http;
use serenity::prelude::*;
use std::env;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    // Initialize logging
    dotenvy::dotenv().ok();
    env_logger::init();

    // Load token from environment variable
    let token = env::var("DISCORD_TOKEN").expect("Expected a token in the environment");

    let config = ManagerConfig::from_env();
    info!(
        "Storing polls in {} and refreshing every {:?}",
        config.storage.display(),
        config.update_every
    );

    let platform = SerenityPlatform::new(Arc::new(Http::new(&token)));
    let manager = Arc::new(PollManager::new(config, platform, RenderRegistry::new()));

    // Reactions must be delivered for votes to count
    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::GUILD_MESSAGE_REACTIONS;

    let mut client = Client::builder(&token, intents)
        .event_handler(PollHandler::new(Arc::clone(&manager)))
        .await
        .expect("Err creating client");

    if let Err(why) = client.start().await {
        error!("Client error: {:?}", why);
    }

    manager.shutdown();
}
