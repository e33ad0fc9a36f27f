use chrono::{DateTime, Duration, Utc};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::render::{self, RenderSelector};

/// One selectable choice of a poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerOption {
    pub name: String,
    pub emoji: String,
    #[serde(default)]
    pub votes: u32,
}

impl AnswerOption {
    pub fn new(name: impl Into<String>, emoji: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            emoji: emoji.into(),
            votes: 0,
        }
    }
}

/// Where a poll message lives on the platform. The message id doubles as the poll id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRef {
    #[serde(default)]
    pub guild_id: Option<String>,
    pub channel_id: String,
    pub message_id: String,
}

/// Target channel for a new poll message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRef {
    pub guild_id: Option<String>,
    pub channel_id: String,
}

impl ChannelRef {
    pub fn new(guild_id: Option<String>, channel_id: impl Into<String>) -> Self {
        Self {
            guild_id,
            channel_id: channel_id.into(),
        }
    }
}

/// A resolved member who reacted to a poll message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Voter {
    pub id: String,
    pub display_name: String,
    pub bot: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerSpec {
    pub name: String,
    pub emoji: String,
}

impl AnswerSpec {
    pub fn new(name: impl Into<String>, emoji: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            emoji: emoji.into(),
        }
    }
}

/// Yes/No, used when a poll is created without explicit answers.
pub fn default_answers() -> Vec<AnswerSpec> {
    vec![AnswerSpec::new("Yes", "✅"), AnswerSpec::new("No", "❌")]
}

/// Input to `PollManager::create_poll`.
#[derive(Debug, Clone)]
pub struct PollOptions {
    pub name: String,
    pub duration: Duration,
    pub answers: Option<Vec<AnswerSpec>>,
    pub main_embed: Option<RenderSelector>,
    pub end_embed: Option<RenderSelector>,
}

impl PollOptions {
    pub fn new(name: impl Into<String>, duration: Duration) -> Self {
        Self {
            name: name.into(),
            duration,
            answers: None,
            main_embed: None,
            end_embed: None,
        }
    }

    pub fn answers(mut self, answers: Vec<AnswerSpec>) -> Self {
        self.answers = Some(answers);
        self
    }

    pub fn main_embed(mut self, selector: RenderSelector) -> Self {
        self.main_embed = Some(selector);
        self
    }

    pub fn end_embed(mut self, selector: RenderSelector) -> Self {
        self.end_embed = Some(selector);
        self
    }
}

/// A timed reaction poll. This is also the record written to the poll store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Poll {
    pub name: String,
    pub answers: Vec<AnswerOption>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub start_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub end_at: DateTime<Utc>,
    pub message: MessageRef,
    #[serde(default)]
    pub ended: bool,
    #[serde(default)]
    pub results: Vec<AnswerOption>,
    #[serde(default = "RenderSelector::default_main", deserialize_with = "render::lenient_selector")]
    pub main_embed: RenderSelector,
    #[serde(default = "RenderSelector::default_end", deserialize_with = "render::lenient_selector")]
    pub end_embed: RenderSelector,
}

impl Poll {
    pub fn new(
        name: String,
        answers: Vec<AnswerSpec>,
        start_at: DateTime<Utc>,
        duration: Duration,
        main_embed: RenderSelector,
        end_embed: RenderSelector,
    ) -> Self {
        let answers = answers
            .into_iter()
            .map(|spec| AnswerOption::new(spec.name, spec.emoji))
            .collect();

        Self {
            name,
            answers,
            start_at,
            // Callers validate the range; saturate rather than panic if they did not
            end_at: start_at
                .checked_add_signed(duration)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
            message: MessageRef::default(),
            ended: false,
            results: Vec::new(),
            main_embed,
            end_embed,
        }
    }

    pub fn id(&self) -> &str {
        &self.message.message_id
    }

    pub fn duration(&self) -> Duration {
        self.end_at - self.start_at
    }

    /// Negative once the deadline has passed but the poll is not closed yet.
    pub fn remaining_time(&self) -> Duration {
        self.remaining_time_at(Utc::now())
    }

    pub fn remaining_time_at(&self, now: DateTime<Utc>) -> Duration {
        self.end_at - now
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.end_at <= now
    }

    pub fn has_glyph(&self, glyph: &str) -> bool {
        self.answers.iter().any(|a| a.emoji == glyph)
    }

    pub fn total_votes(&self) -> u32 {
        self.answers.iter().map(|a| a.votes).sum()
    }

    /// Count one vote for the answer behind `glyph`. Returns the updated answer,
    /// or `None` when the glyph is unknown or the poll has ended.
    pub fn add_vote(&mut self, glyph: &str) -> Option<AnswerOption> {
        if self.ended {
            return None;
        }
        let answer = self.answers.iter_mut().find(|a| a.emoji == glyph)?;
        answer.votes = answer.votes.saturating_add(1);
        Some(answer.clone())
    }

    /// Withdraw one vote for the answer behind `glyph`, never going below zero.
    /// Returns `None` when nothing changed.
    pub fn remove_vote(&mut self, glyph: &str) -> Option<AnswerOption> {
        if self.ended {
            return None;
        }
        let answer = self.answers.iter_mut().find(|a| a.emoji == glyph)?;
        if answer.votes == 0 {
            // Removal delivered before the matching add; keep the counter at zero.
            warn!(
                "Vote removal for '{}' on poll {} with no recorded votes",
                answer.name, self.message.message_id
            );
            return None;
        }
        answer.votes -= 1;
        Some(answer.clone())
    }

    /// Move the poll to the ended state. Returns `false` if it was already ended.
    pub fn close(&mut self) -> bool {
        if self.ended {
            return false;
        }
        self.ended = true;

        let mut results = self.answers.clone();
        // sort_by is stable: ties keep the original answer order
        results.sort_by(|a, b| b.votes.cmp(&a.votes));
        self.results = results;
        true
    }

    /// Answers sharing the highest vote count in the frozen results.
    pub fn winners(&self) -> Vec<&AnswerOption> {
        let top = match self.results.first() {
            Some(first) if first.votes > 0 => first.votes,
            _ => return Vec::new(),
        };
        self.results.iter().take_while(|a| a.votes == top).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_poll() -> Poll {
        let mut poll = Poll::new(
            "Lunch?".to_string(),
            vec![
                AnswerSpec::new("Pizza", "🍕"),
                AnswerSpec::new("Sushi", "🍣"),
                AnswerSpec::new("Salad", "🥗"),
            ],
            Utc::now(),
            Duration::milliseconds(10_000),
            RenderSelector::default_main(),
            RenderSelector::default_end(),
        );
        poll.message = MessageRef {
            guild_id: Some("1".to_string()),
            channel_id: "2".to_string(),
            message_id: "3".to_string(),
        };
        poll
    }

    fn votes(poll: &Poll) -> Vec<u32> {
        poll.answers.iter().map(|a| a.votes).collect()
    }

    #[test]
    fn duration_is_fixed_and_remaining_counts_down() {
        let poll = sample_poll();
        assert_eq!(poll.duration(), Duration::milliseconds(10_000));

        let later = poll.start_at + Duration::milliseconds(4_000);
        assert_eq!(poll.remaining_time_at(later), Duration::milliseconds(6_000));

        let past = poll.end_at + Duration::milliseconds(1);
        assert!(poll.remaining_time_at(past) < Duration::zero());
        assert!(poll.is_expired_at(poll.end_at));
        assert!(!poll.is_expired_at(later));
    }

    #[test]
    fn out_of_range_duration_saturates_deadline() {
        let poll = Poll::new(
            "Forever".to_string(),
            vec![AnswerSpec::new("Yes", "✅")],
            Utc::now(),
            Duration::milliseconds(i64::MAX / 2),
            RenderSelector::default_main(),
            RenderSelector::default_end(),
        );
        assert_eq!(poll.end_at, DateTime::<Utc>::MAX_UTC);
        assert!(!poll.is_expired_at(Utc::now()));
    }

    #[test]
    fn add_vote_ignores_unknown_glyph() {
        let mut poll = sample_poll();
        assert!(poll.add_vote("🌮").is_none());
        assert_eq!(votes(&poll), vec![0, 0, 0]);

        let updated = poll.add_vote("🍣").unwrap();
        assert_eq!(updated.name, "Sushi");
        assert_eq!(updated.votes, 1);
        assert_eq!(votes(&poll), vec![0, 1, 0]);
    }

    #[test]
    fn remove_vote_clamps_at_zero() {
        let mut poll = sample_poll();
        assert!(poll.remove_vote("🍕").is_none());

        poll.add_vote("🍕");
        assert_eq!(poll.remove_vote("🍕").unwrap().votes, 0);
        assert!(poll.remove_vote("🍕").is_none());
        assert_eq!(votes(&poll), vec![0, 0, 0]);
    }

    #[test]
    fn tally_does_not_depend_on_interleaving_across_options() {
        let events = [
            ("🍕", true),
            ("🍣", true),
            ("🍕", true),
            ("🍣", false),
            ("🥗", false),
            ("🍕", false),
            ("🥗", true),
        ];

        let mut forward = sample_poll();
        for (glyph, add) in events {
            if add { forward.add_vote(glyph); } else { forward.remove_vote(glyph); }
        }

        // Same per-option order, options visited one after another
        let mut grouped = sample_poll();
        for glyph in ["🥗", "🍣", "🍕"] {
            for (g, add) in events.iter().filter(|(g, _)| *g == glyph) {
                if *add { grouped.add_vote(g); } else { grouped.remove_vote(g); }
            }
        }

        assert_eq!(votes(&forward), vec![1, 0, 1]);
        assert_eq!(votes(&forward), votes(&grouped));
    }

    #[test]
    fn close_sorts_results_stably_and_only_once() {
        let mut poll = sample_poll();
        poll.add_vote("🥗");
        poll.add_vote("🥗");
        poll.add_vote("🍕");
        poll.add_vote("🍣");

        assert!(poll.close());
        let order: Vec<&str> = poll.results.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(order, vec!["Salad", "Pizza", "Sushi"]);
        assert_eq!(poll.winners().len(), 1);

        assert!(!poll.close());
        assert!(poll.add_vote("🍕").is_none());
        assert!(poll.remove_vote("🥗").is_none());
        assert_eq!(poll.results[0].votes, 2);
    }

    #[test]
    fn winners_empty_without_votes() {
        let mut poll = sample_poll();
        poll.close();
        assert!(poll.winners().is_empty());
    }

    #[test]
    fn record_uses_camel_case_and_millisecond_timestamps() {
        let poll = sample_poll();
        let value = serde_json::to_value(&poll).unwrap();

        assert_eq!(value["startAt"], poll.start_at.timestamp_millis());
        assert_eq!(value["endAt"], poll.end_at.timestamp_millis());
        assert_eq!(value["message"]["messageId"], "3");
        assert_eq!(value["mainEmbed"], "default-main");

        let back: Poll = serde_json::from_value(value).unwrap();
        assert_eq!(back.name, poll.name);
        assert_eq!(back.end_at.timestamp_millis(), poll.end_at.timestamp_millis());
    }
}
