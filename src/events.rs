use log::debug;
use tokio::sync::broadcast;

use crate::models::{AnswerOption, Poll, Voter};

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub enum PollEvent {
    Created(Poll),
    Ended(Poll),
    VoteAdded {
        poll: Poll,
        option: AnswerOption,
        voter: Voter,
    },
    VoteRemoved {
        poll: Poll,
        option: AnswerOption,
        voter: Voter,
    },
}

/// Fan-out of poll lifecycle events to any number of subscribers.
#[derive(Debug, Clone)]
pub struct PollNotifier {
    sender: broadcast::Sender<PollEvent>,
}

impl Default for PollNotifier {
    fn default() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }
}

impl PollNotifier {
    pub fn subscribe(&self) -> broadcast::Receiver<PollEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: PollEvent) {
        // Err only means nobody is listening
        if self.sender.send(event).is_err() {
            debug!("Poll event dropped, no subscribers");
        }
    }
}
