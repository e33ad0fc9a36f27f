use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use super::PollPlatform;
use crate::error::{PollError, Result};
use crate::models::{ChannelRef, MessageRef, Voter};
use crate::render::EmbedSpec;

#[derive(Default)]
pub(crate) struct MockState {
    pub next_message_id: u64,
    pub sent: Vec<(ChannelRef, EmbedSpec)>,
    pub reactions: Vec<(String, String)>,
    pub edits: Vec<(String, EmbedSpec)>,
    pub bots: HashSet<String>,
    pub strangers: HashSet<String>,
    pub failing_edits: HashSet<String>,
    pub lookups: usize,
    pub edit_gate: Option<Arc<Notify>>,
}

/// Records every platform call; member lookups succeed unless configured otherwise.
#[derive(Default)]
pub(crate) struct MockPlatform {
    pub state: Mutex<MockState>,
}

impl MockPlatform {
    pub fn with_bot(self, user_id: &str) -> Self {
        self.state.lock().unwrap().bots.insert(user_id.to_string());
        self
    }

    pub fn with_stranger(self, user_id: &str) -> Self {
        self.state.lock().unwrap().strangers.insert(user_id.to_string());
        self
    }

    pub fn fail_edits_for(&self, message_id: &str) {
        self.state.lock().unwrap().failing_edits.insert(message_id.to_string());
    }

    /// The next edit waits until the returned gate is notified.
    pub fn hold_next_edit(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.state.lock().unwrap().edit_gate = Some(gate.clone());
        gate
    }

    pub fn lookups(&self) -> usize {
        self.state.lock().unwrap().lookups
    }

    pub fn edits_for(&self, message_id: &str) -> Vec<EmbedSpec> {
        self.state
            .lock()
            .unwrap()
            .edits
            .iter()
            .filter(|(id, _)| id == message_id)
            .map(|(_, embed)| embed.clone())
            .collect()
    }

    pub fn sent_count(&self) -> usize {
        self.state.lock().unwrap().sent.len()
    }

    pub fn reactions(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().reactions.clone()
    }
}

#[async_trait]
impl PollPlatform for MockPlatform {
    async fn send_embed(&self, channel: &ChannelRef, embed: &EmbedSpec) -> Result<MessageRef> {
        let mut state = self.state.lock().unwrap();
        state.next_message_id += 1;
        state.sent.push((channel.clone(), embed.clone()));
        Ok(MessageRef {
            guild_id: channel.guild_id.clone(),
            channel_id: channel.channel_id.clone(),
            message_id: format!("m{}", state.next_message_id),
        })
    }

    async fn add_reaction(&self, message: &MessageRef, glyph: &str) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .reactions
            .push((message.message_id.clone(), glyph.to_string()));
        Ok(())
    }

    async fn edit_embed(&self, message: &MessageRef, embed: &EmbedSpec) -> Result<()> {
        let gate = self.state.lock().unwrap().edit_gate.take();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        let mut state = self.state.lock().unwrap();
        if state.failing_edits.contains(&message.message_id) {
            return Err(PollError::Platform("Unknown Message".to_string()));
        }
        state.edits.push((message.message_id.clone(), embed.clone()));
        Ok(())
    }

    async fn resolve_voter(&self, _message: &MessageRef, user_id: &str) -> Result<Option<Voter>> {
        let mut state = self.state.lock().unwrap();
        state.lookups += 1;
        if state.strangers.contains(user_id) {
            return Ok(None);
        }
        Ok(Some(Voter {
            id: user_id.to_string(),
            display_name: format!("user-{}", user_id),
            bot: state.bots.contains(user_id),
        }))
    }
}
