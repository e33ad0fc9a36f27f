use lazy_static::lazy_static;
use log::warn;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{PollError, Result};
use crate::models::Poll;

pub const DEFAULT_MAIN: &str = "default-main";
pub const DEFAULT_END: &str = "default-end";

const OPEN_COLOR: u32 = 0x5865F2;
const ENDED_COLOR: u32 = 0x57F287;

lazy_static! {
    static ref SELECTOR_RE: Regex = Regex::new(r"^[A-Za-z0-9_.\-]{1,64}$").unwrap();
}

pub fn is_safe_identifier(raw: &str) -> bool {
    SELECTOR_RE.is_match(raw)
}

/// Name of a registered render function. Stored in place of the function itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct RenderSelector(String);

impl RenderSelector {
    pub fn new(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        if is_safe_identifier(&raw) {
            Ok(Self(raw))
        } else {
            Err(PollError::Validation(format!(
                "render selector {:?} must match [A-Za-z0-9_.-]{{1,64}}",
                raw
            )))
        }
    }

    pub fn default_main() -> Self {
        Self(DEFAULT_MAIN.to_string())
    }

    pub fn default_end() -> Self {
        Self(DEFAULT_END.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn unset() -> Self {
        Self(String::new())
    }
}

impl fmt::Display for RenderSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Accepts whatever a stored record holds for a render hook and keeps it only
/// when it is a plain identifier. Anything else (code, objects) is dropped.
pub(crate) fn lenient_selector<'de, D>(deserializer: D) -> std::result::Result<RenderSelector, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    match value {
        serde_json::Value::String(raw) if is_safe_identifier(&raw) => Ok(RenderSelector(raw)),
        other => {
            warn!("Discarding stored render hook that is not a selector: {}", truncate(&other.to_string(), 40));
            Ok(RenderSelector::unset())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderKind {
    Main,
    End,
}

impl RenderKind {
    pub fn default_selector(self) -> RenderSelector {
        match self {
            RenderKind::Main => RenderSelector::default_main(),
            RenderKind::End => RenderSelector::default_end(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

/// Platform-neutral description of an embed; the platform layer turns it into
/// a concrete message embed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmbedSpec {
    pub title: Option<String>,
    pub description: Option<String>,
    pub fields: Vec<EmbedField>,
    pub color: Option<u32>,
    pub footer: Option<String>,
}

impl EmbedSpec {
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>, inline: bool) -> Self {
        self.fields.push(EmbedField {
            name: name.into(),
            value: value.into(),
            inline,
        });
        self
    }

    pub fn color(mut self, color: u32) -> Self {
        self.color = Some(color);
        self
    }

    pub fn footer(mut self, footer: impl Into<String>) -> Self {
        self.footer = Some(footer.into());
        self
    }
}

pub type RenderFn = Arc<dyn Fn(&Poll) -> EmbedSpec + Send + Sync>;

/// Lookup table from selector to render function. Starts with the two defaults.
#[derive(Clone)]
pub struct RenderRegistry {
    renderers: HashMap<String, RenderFn>,
}

impl Default for RenderRegistry {
    fn default() -> Self {
        let mut renderers: HashMap<String, RenderFn> = HashMap::new();
        renderers.insert(DEFAULT_MAIN.to_string(), Arc::new(default_main_embed));
        renderers.insert(DEFAULT_END.to_string(), Arc::new(default_end_embed));
        Self { renderers }
    }
}

impl fmt::Debug for RenderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.renderers.keys().collect();
        names.sort();
        f.debug_struct("RenderRegistry").field("renderers", &names).finish()
    }
}

impl RenderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a render function under `name`.
    pub fn register<F>(&mut self, name: &str, render: F) -> Result<RenderSelector>
    where
        F: Fn(&Poll) -> EmbedSpec + Send + Sync + 'static,
    {
        let selector = RenderSelector::new(name)?;
        self.renderers.insert(selector.0.clone(), Arc::new(render));
        Ok(selector)
    }

    pub fn contains(&self, selector: &RenderSelector) -> bool {
        self.renderers.contains_key(selector.as_str())
    }

    /// Keep `selector` if it names a registered function, otherwise fall back
    /// to the default for `kind`.
    pub fn resolve(&self, selector: &RenderSelector, kind: RenderKind) -> RenderSelector {
        if self.contains(selector) {
            selector.clone()
        } else {
            if !selector.as_str().is_empty() {
                warn!("Unknown render selector '{}', using {}", selector, kind.default_selector());
            }
            kind.default_selector()
        }
    }

    pub fn render(&self, poll: &Poll, kind: RenderKind) -> EmbedSpec {
        let selector = match kind {
            RenderKind::Main => &poll.main_embed,
            RenderKind::End => &poll.end_embed,
        };
        let render = self
            .renderers
            .get(selector.as_str())
            .or_else(|| self.renderers.get(kind.default_selector().as_str()));

        match render {
            Some(render) => render(poll),
            None => match kind {
                RenderKind::Main => default_main_embed(poll),
                RenderKind::End => default_end_embed(poll),
            },
        }
    }
}

fn percent(votes: u32, total: u32) -> u32 {
    if total == 0 {
        0
    } else {
        ((votes as f64 * 100.0) / total as f64).round() as u32
    }
}

fn plural(votes: u32) -> &'static str {
    if votes == 1 { "vote" } else { "votes" }
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let cut: String = text.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", cut)
    } else {
        text.to_string()
    }
}

/// Running tally with a relative countdown.
pub fn default_main_embed(poll: &Poll) -> EmbedSpec {
    let total = poll.total_votes();
    let mut tally = String::new();
    for answer in &poll.answers {
        tally.push_str(&format!(
            "{} **{}**: {} {} ({}%)\n",
            answer.emoji,
            answer.name,
            answer.votes,
            plural(answer.votes),
            percent(answer.votes, total)
        ));
    }

    EmbedSpec::default()
        .title(truncate(&poll.name, 256))
        .description(tally)
        .field("Ends", format!("<t:{}:R>", poll.end_at.timestamp()), true)
        .field("Total votes", total.to_string(), true)
        .color(OPEN_COLOR)
        .footer("React with an option below to vote")
}

/// Final standings, winner highlighted.
pub fn default_end_embed(poll: &Poll) -> EmbedSpec {
    let total: u32 = poll.results.iter().map(|a| a.votes).sum();
    let winners = poll.winners();

    let embed = EmbedSpec::default()
        .title(truncate(&format!("Poll ended: {}", poll.name), 256))
        .color(ENDED_COLOR);

    if winners.is_empty() {
        return embed.description("No votes were cast in this poll.");
    }

    let mut summary = String::new();
    for answer in &poll.results {
        let line = if winners.iter().any(|w| w.emoji == answer.emoji) {
            format!("{} **{}**: {} {} ({}%)", answer.emoji, answer.name, answer.votes, plural(answer.votes), percent(answer.votes, total))
        } else {
            format!("{} {}: {} {} ({}%)", answer.emoji, answer.name, answer.votes, plural(answer.votes), percent(answer.votes, total))
        };
        summary.push_str(&line);
        summary.push('\n');
    }
    summary.push_str(&format!("\n{} votes were cast.", total));

    let winner_names = winners
        .iter()
        .map(|w| format!("{} {}", w.emoji, w.name))
        .collect::<Vec<_>>()
        .join(", ");
    let heading = if winners.len() > 1 { "Tied" } else { "Winner" };

    embed.description(summary).field(heading, winner_names, false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AnswerSpec;
    use chrono::{Duration, Utc};

    fn poll() -> Poll {
        Poll::new(
            "Best editor?".to_string(),
            vec![AnswerSpec::new("Vim", "🅰️"), AnswerSpec::new("Emacs", "🅱️")],
            Utc::now(),
            Duration::minutes(5),
            RenderSelector::default_main(),
            RenderSelector::default_end(),
        )
    }

    #[test]
    fn selector_accepts_identifiers_only() {
        assert!(RenderSelector::new("fancy-main_v2.1").is_ok());
        assert!(RenderSelector::new("").is_err());
        assert!(RenderSelector::new("function anonymous(poll) { return {} }").is_err());
        assert!(RenderSelector::new("a".repeat(65)).is_err());
    }

    #[test]
    fn stored_code_is_discarded_on_load() {
        #[derive(Deserialize)]
        struct Holder {
            #[serde(deserialize_with = "lenient_selector")]
            hook: RenderSelector,
        }

        let kept: Holder = serde_json::from_str(r#"{"hook":"custom"}"#).unwrap();
        assert_eq!(kept.hook.as_str(), "custom");

        let code: Holder = serde_json::from_str(r#"{"hook":"(poll) => { return eval(x) }"}"#).unwrap();
        assert_eq!(code.hook.as_str(), "");

        let object: Holder = serde_json::from_str(r#"{"hook":{"title":"x"}}"#).unwrap();
        assert_eq!(object.hook.as_str(), "");
    }

    #[test]
    fn unknown_selector_resolves_to_default() {
        let registry = RenderRegistry::new();
        let unknown = RenderSelector::new("missing").unwrap();
        assert_eq!(registry.resolve(&unknown, RenderKind::Main), RenderSelector::default_main());
        assert_eq!(registry.resolve(&RenderSelector::unset(), RenderKind::End), RenderSelector::default_end());
    }

    #[test]
    fn registered_renderer_is_used() {
        let mut registry = RenderRegistry::new();
        let selector = registry
            .register("short", |p: &Poll| EmbedSpec::default().title(format!("Q: {}", p.name)))
            .unwrap();

        let mut poll = poll();
        poll.main_embed = selector;
        assert_eq!(registry.render(&poll, RenderKind::Main).title.as_deref(), Some("Q: Best editor?"));
    }

    #[test]
    fn default_main_embed_lists_tally() {
        let registry = RenderRegistry::new();
        let mut poll = poll();
        poll.add_vote("🅰️");
        poll.add_vote("🅰️");
        poll.add_vote("🅱️");

        let embed = registry.render(&poll, RenderKind::Main);
        let description = embed.description.unwrap();
        assert!(description.contains("🅰️ **Vim**: 2 votes (67%)"));
        assert!(description.contains("🅱️ **Emacs**: 1 vote (33%)"));
        assert_eq!(embed.fields[0].value, format!("<t:{}:R>", poll.end_at.timestamp()));
    }

    #[test]
    fn default_end_embed_names_winner_or_no_votes() {
        let registry = RenderRegistry::new();

        let mut empty = poll();
        empty.close();
        let embed = registry.render(&empty, RenderKind::End);
        assert_eq!(embed.description.as_deref(), Some("No votes were cast in this poll."));

        let mut decided = poll();
        decided.add_vote("🅱️");
        decided.close();
        let embed = registry.render(&decided, RenderKind::End);
        assert_eq!(embed.fields[0].name, "Winner");
        assert_eq!(embed.fields[0].value, "🅱️ Emacs");
    }
}
