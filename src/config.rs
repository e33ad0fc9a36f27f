use log::warn;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_STORAGE: &str = "./Poll.json";
pub const DEFAULT_UPDATE_EVERY_MS: u64 = 5000;

/// Settings fixed at manager construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerConfig {
    /// Path of the JSON document holding every tracked poll.
    pub storage: PathBuf,
    /// Interval between reconciliation ticks.
    pub update_every: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            storage: PathBuf::from(DEFAULT_STORAGE),
            update_every: Duration::from_millis(DEFAULT_UPDATE_EVERY_MS),
        }
    }
}

impl ManagerConfig {
    pub fn new(storage: impl Into<PathBuf>, update_every: Duration) -> Self {
        Self {
            storage: storage.into(),
            update_every,
        }
    }

    /// Defaults overridden by `POLL_STORAGE` and `POLL_UPDATE_EVERY_MS`.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(path) = env::var("POLL_STORAGE") {
            if !path.trim().is_empty() {
                config.storage = PathBuf::from(path);
            }
        }

        if let Ok(raw) = env::var("POLL_UPDATE_EVERY_MS") {
            match parse_update_every(&raw) {
                Some(every) => config.update_every = every,
                None => warn!(
                    "Ignoring POLL_UPDATE_EVERY_MS={:?}, expected a positive number of milliseconds",
                    raw
                ),
            }
        }

        config
    }
}

fn parse_update_every(raw: &str) -> Option<Duration> {
    raw.trim()
        .parse::<u64>()
        .ok()
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis)
}
