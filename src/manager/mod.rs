use chrono::{DateTime, Duration, Utc};
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};

use crate::config::ManagerConfig;
use crate::error::{PollError, Result};
use crate::events::{PollEvent, PollNotifier};
use crate::models::{default_answers, AnswerSpec, ChannelRef, Poll, PollOptions, Voter};
use crate::platform::PollPlatform;
use crate::render::{RenderKind, RenderRegistry, RenderSelector};
use crate::store::PollStore;
use crate::tasks::reconciler::ReconcileTask;

/// Discord refuses more distinct reactions than this on one message.
pub const MAX_ANSWERS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactionKind {
    Add,
    Remove,
}

/// A reaction added to or removed from some message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReactionEvent {
    pub kind: ReactionKind,
    pub message_id: String,
    pub user_id: String,
    pub glyph: String,
    /// Member details delivered with the event, if any. Looked up when absent.
    pub voter: Option<Voter>,
}

/// Owns the tracked polls and their storage, routes reactions to them and
/// runs the periodic reconciliation.
pub struct PollManager {
    config: ManagerConfig,
    store: PollStore,
    platform: Arc<dyn PollPlatform>,
    renderers: RenderRegistry,
    polls: Mutex<Vec<Poll>>,
    notifier: PollNotifier,
    // Message edits for tracked polls go through here one at a time
    edits: Mutex<()>,
    // Set once stored polls have been merged into `polls`; read under that lock
    loaded: AtomicBool,
    reconciler: std::sync::Mutex<Option<ReconcileTask>>,
    bootstrapped: AtomicBool,
}

impl PollManager {
    pub fn new<P>(config: ManagerConfig, platform: P, renderers: RenderRegistry) -> Self
    where
        P: PollPlatform + 'static,
    {
        Self::with_platform(config, Arc::new(platform), renderers)
    }

    pub fn with_platform(
        config: ManagerConfig,
        platform: Arc<dyn PollPlatform>,
        renderers: RenderRegistry,
    ) -> Self {
        let store = PollStore::new(config.storage.clone());
        Self {
            config,
            store,
            platform,
            renderers,
            polls: Mutex::new(Vec::new()),
            notifier: PollNotifier::default(),
            edits: Mutex::new(()),
            loaded: AtomicBool::new(false),
            reconciler: std::sync::Mutex::new(None),
            bootstrapped: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PollEvent> {
        self.notifier.subscribe()
    }

    /// Snapshot of every tracked poll, ended ones included.
    pub async fn polls(&self) -> Vec<Poll> {
        self.polls.lock().await.clone()
    }

    pub async fn poll(&self, poll_id: &str) -> Option<Poll> {
        self.polls.lock().await.iter().find(|p| p.id() == poll_id).cloned()
    }

    /// Load stored polls and start reconciling. Returns how many polls are
    /// tracked. Later calls are no-ops returning 0, since the gateway reports
    /// `ready` again after every reconnect.
    pub async fn bootstrap(self: &Arc<Self>) -> usize {
        if self.bootstrapped.swap(true, Ordering::SeqCst) {
            debug!("Poll manager already bootstrapped");
            return 0;
        }

        let tracked = {
            let mut polls = self.polls.lock().await;
            self.load_stored(&mut polls).await;
            polls.len()
        };

        self.start_reconciler();
        tracked
    }

    /// Merge the stored polls into `polls` the first time it is called. Must run
    /// under the `polls` lock before anything writes the store, or the write
    /// would replace polls that were never read.
    async fn load_stored(&self, polls: &mut Vec<Poll>) {
        if self.loaded.load(Ordering::SeqCst) {
            return;
        }

        let stored = self.store.load_all().await;
        let restored = stored.len();
        let created_meanwhile = std::mem::take(polls);
        for mut poll in stored {
            poll.main_embed = self.renderers.resolve(&poll.main_embed, RenderKind::Main);
            poll.end_embed = self.renderers.resolve(&poll.end_embed, RenderKind::End);
            polls.push(poll);
        }
        for poll in created_meanwhile {
            if !polls.iter().any(|p| p.id() == poll.id()) {
                polls.push(poll);
            }
        }
        self.loaded.store(true, Ordering::SeqCst);

        info!(
            "Restored {} poll(s) from {}",
            restored,
            self.store.path().display()
        );
    }

    pub fn start_reconciler(self: &Arc<Self>) {
        let mut slot = match self.reconciler.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        if slot.as_ref().is_some_and(|task| task.is_running()) {
            return;
        }
        *slot = Some(ReconcileTask::start(Arc::downgrade(self), self.config.update_every));
    }

    /// Stop the reconciliation task. Polls stay tracked and keep counting votes.
    pub fn shutdown(&self) {
        let task = match self.reconciler.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(task) = task {
            task.stop();
            info!("Poll reconciliation stopped");
        }
    }

    pub fn is_reconciling(&self) -> bool {
        match self.reconciler.lock() {
            Ok(slot) => slot.as_ref().is_some_and(|task| task.is_running()),
            Err(poisoned) => poisoned.into_inner().as_ref().is_some_and(|task| task.is_running()),
        }
    }

    fn validate(
        &self,
        options: &PollOptions,
        start_at: DateTime<Utc>,
    ) -> Result<(Vec<AnswerSpec>, RenderSelector, RenderSelector)> {
        if options.name.trim().is_empty() {
            return Err(PollError::Validation("name is required".to_string()));
        }
        if options.duration <= Duration::zero() {
            return Err(PollError::Validation("duration must be positive".to_string()));
        }
        if start_at.checked_add_signed(options.duration).is_none() {
            return Err(PollError::Validation(format!(
                "duration of {} ms puts the deadline out of range",
                options.duration.num_milliseconds()
            )));
        }

        let answers = options.answers.clone().unwrap_or_else(default_answers);
        if answers.is_empty() {
            return Err(PollError::Validation("at least one answer is required".to_string()));
        }
        if answers.len() > MAX_ANSWERS {
            return Err(PollError::Validation(format!(
                "at most {} answers are allowed, got {}",
                MAX_ANSWERS,
                answers.len()
            )));
        }
        if let Some(blank) = answers.iter().find(|a| a.emoji.trim().is_empty()) {
            return Err(PollError::Validation(format!("answer '{}' has no emoji", blank.name)));
        }

        let main = options.main_embed.clone().unwrap_or_else(RenderSelector::default_main);
        let end = options.end_embed.clone().unwrap_or_else(RenderSelector::default_end);
        for selector in [&main, &end] {
            if !self.renderers.contains(selector) {
                return Err(PollError::Validation(format!(
                    "no render function registered as '{}'",
                    selector
                )));
            }
        }

        Ok((answers, main, end))
    }

    /// Post a new poll to `channel` and start tracking it.
    pub async fn create_poll(&self, channel: &ChannelRef, options: PollOptions) -> Result<Poll> {
        let start_at = Utc::now();
        let (answers, main_embed, end_embed) = self.validate(&options, start_at)?;

        let mut poll = Poll::new(
            options.name.trim().to_string(),
            answers,
            start_at,
            options.duration,
            main_embed,
            end_embed,
        );

        let embed = self.renderers.render(&poll, RenderKind::Main);
        poll.message = self.platform.send_embed(channel, &embed).await?;

        for answer in &poll.answers {
            if let Err(e) = self.platform.add_reaction(&poll.message, &answer.emoji).await {
                warn!(
                    "Failed to add reaction {} to poll {}: {}",
                    answer.emoji,
                    poll.id(),
                    e
                );
            }
        }

        {
            let mut polls = self.polls.lock().await;
            self.load_stored(&mut polls).await;
            polls.push(poll.clone());
            self.persist(&polls).await;
        }

        info!("Created poll {} '{}' ending at {}", poll.id(), poll.name, poll.end_at.to_rfc3339());
        self.notifier.publish(PollEvent::Created(poll.clone()));
        Ok(poll)
    }

    /// Apply a reaction to the poll it targets. Returns whether a tally changed.
    pub async fn dispatch_reaction(&self, event: ReactionEvent) -> bool {
        let message = {
            let polls = self.polls.lock().await;
            match polls.iter().find(|p| p.id() == event.message_id) {
                Some(poll) if !poll.ended && poll.has_glyph(&event.glyph) => poll.message.clone(),
                _ => return false,
            }
        };

        let resolved = match event.voter.clone() {
            Some(voter) => Ok(Some(voter)),
            None => self.platform.resolve_voter(&message, &event.user_id).await,
        };
        let voter = match resolved {
            Ok(Some(voter)) if !voter.bot => voter,
            Ok(_) => return false,
            Err(e) => {
                debug!("Could not resolve voter {} on poll {}: {}", event.user_id, event.message_id, e);
                return false;
            }
        };

        let (poll, option) = {
            let mut polls = self.polls.lock().await;
            let Some(poll) = polls.iter_mut().find(|p| p.id() == event.message_id) else {
                return false;
            };
            let option = match event.kind {
                ReactionKind::Add => poll.add_vote(&event.glyph),
                ReactionKind::Remove => poll.remove_vote(&event.glyph),
            };
            let Some(option) = option else {
                return false;
            };
            let poll = poll.clone();
            self.persist(&polls).await;
            (poll, option)
        };

        debug!(
            "{:?} vote '{}' by {} on poll {} (now {})",
            event.kind, option.name, voter.id, poll.id(), option.votes
        );
        let event = match event.kind {
            ReactionKind::Add => PollEvent::VoteAdded { poll, option, voter },
            ReactionKind::Remove => PollEvent::VoteRemoved { poll, option, voter },
        };
        self.notifier.publish(event);
        true
    }

    /// One reconciliation pass: close expired polls, refresh the rest.
    pub async fn reconcile(&self) {
        self.reconcile_at(Utc::now()).await
    }

    pub(crate) async fn reconcile_at(&self, now: DateTime<Utc>) {
        let mut closed = Vec::new();
        let mut refreshes = Vec::new();
        {
            let mut polls = self.polls.lock().await;
            for poll in polls.iter_mut().filter(|p| !p.ended) {
                if poll.is_expired_at(now) {
                    if poll.close() {
                        closed.push(poll.clone());
                    }
                } else {
                    refreshes.push(poll.id().to_string());
                }
            }
            if !closed.is_empty() {
                self.persist(&polls).await;
            }
        }

        {
            let _edits = self.edits.lock().await;
            for poll_id in refreshes {
                // Re-read under the edit lock: a poll closed since the scan must
                // not have its end embed overwritten by a stale tally
                let refresh = {
                    let polls = self.polls.lock().await;
                    polls
                        .iter()
                        .find(|p| p.id() == poll_id && !p.ended)
                        .map(|p| (p.message.clone(), self.renderers.render(p, RenderKind::Main)))
                };
                let Some((message, embed)) = refresh else {
                    continue;
                };
                if let Err(e) = self.platform.edit_embed(&message, &embed).await {
                    warn!("Failed to refresh poll {}: {}", message.message_id, e);
                }
            }
        }

        for poll in closed {
            self.announce_end(poll).await;
        }
    }

    /// Close a poll ahead of its deadline. `Ok(false)` if it had already ended.
    pub async fn end_poll(&self, poll_id: &str) -> Result<bool> {
        let poll = {
            let mut polls = self.polls.lock().await;
            let poll = polls
                .iter_mut()
                .find(|p| p.id() == poll_id)
                .ok_or_else(|| PollError::UnknownPoll(poll_id.to_string()))?;
            if !poll.close() {
                return Ok(false);
            }
            let poll = poll.clone();
            self.persist(&polls).await;
            poll
        };

        self.announce_end(poll).await;
        Ok(true)
    }

    /// Stop tracking a poll and drop it from storage. The posted message is left alone.
    pub async fn delete_poll(&self, poll_id: &str) -> Result<Poll> {
        let mut polls = self.polls.lock().await;
        let index = polls
            .iter()
            .position(|p| p.id() == poll_id)
            .ok_or_else(|| PollError::UnknownPoll(poll_id.to_string()))?;
        let removed = polls.remove(index);
        self.persist(&polls).await;
        info!("Deleted poll {} '{}'", removed.id(), removed.name);
        Ok(removed)
    }

    async fn announce_end(&self, poll: Poll) {
        let embed = self.renderers.render(&poll, RenderKind::End);
        {
            let _edits = self.edits.lock().await;
            if let Err(e) = self.platform.edit_embed(&poll.message, &embed).await {
                error!("Failed to publish results of poll {}: {}", poll.id(), e);
            }
        }
        info!("Poll {} '{}' ended with {} vote(s)", poll.id(), poll.name, poll.total_votes());
        self.notifier.publish(PollEvent::Ended(poll));
    }

    // Whole-collection rewrite; storage failures are logged, never surfaced.
    async fn persist(&self, polls: &[Poll]) {
        if let Err(e) = self.store.save_all(polls).await {
            error!("Failed to save polls to {}: {}", self.store.path().display(), e);
        }
    }
}
