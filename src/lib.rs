//! Timed, reaction-driven polls for Discord bots.
//!
//! A [`PollManager`] posts poll messages, counts reactions as votes, keeps the
//! tally message fresh and closes each poll at its deadline. Every tracked poll
//! is written to a single JSON file so polls survive restarts.

pub mod commands;
pub mod config;
pub mod error;
pub mod events;
pub mod handlers;
pub mod manager;
pub mod models;
pub mod platform;
pub mod render;
pub mod store;
pub mod tasks;

pub use config::ManagerConfig;
pub use error::{PollError, Result};
pub use events::{PollEvent, PollNotifier};
pub use handlers::PollHandler;
pub use manager::{PollManager, ReactionEvent, ReactionKind};
pub use models::{AnswerOption, AnswerSpec, ChannelRef, MessageRef, Poll, PollOptions, Voter};
pub use platform::{PollPlatform, SerenityPlatform};
pub use render::{EmbedSpec, RenderKind, RenderRegistry, RenderSelector};
pub use store::PollStore;
