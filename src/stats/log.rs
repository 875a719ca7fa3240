//! Cumulative playback statistics.
//!
//! Counters are updated by the playback worker and can be persisted between
//! sessions so the `status` command reports lifetime totals.

use crate::playback::listener::{PlaybackOutcome, PlaybackReport};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Playback counters for the current session.
#[derive(Debug)]
pub struct PlaybackStats {
    runs_started: AtomicU64,
    runs_completed: AtomicU64,
    runs_stopped: AtomicU64,
    repeats_completed: AtomicU64,
    /// Actions the scheduler dispatched, including markers
    actions_dispatched: AtomicU64,
    /// Raw events re-injected one by one
    raw_events_replayed: AtomicU64,
    /// Clicks, multi-clicks and drags issued as single high-level calls
    high_level_actions: AtomicU64,
    /// Wait-color and wait-sound conditions polled
    condition_waits: AtomicU64,
    prudent_retries: AtomicU64,
    nested_calls: AtomicU64,
    session_start: DateTime<Utc>,
    persist_path: Option<PathBuf>,
}

impl PlaybackStats {
    pub fn new() -> Self {
        Self {
            runs_started: AtomicU64::new(0),
            runs_completed: AtomicU64::new(0),
            runs_stopped: AtomicU64::new(0),
            repeats_completed: AtomicU64::new(0),
            actions_dispatched: AtomicU64::new(0),
            raw_events_replayed: AtomicU64::new(0),
            high_level_actions: AtomicU64::new(0),
            condition_waits: AtomicU64::new(0),
            prudent_retries: AtomicU64::new(0),
            nested_calls: AtomicU64::new(0),
            session_start: Utc::now(),
            persist_path: None,
        }
    }

    /// Create statistics backed by a JSON file, loading earlier totals.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut stats = Self::new();
        stats.persist_path = Some(path);

        if let Err(e) = stats.load() {
            warn!("Could not load previous playback stats: {e}");
        }

        stats
    }

    pub fn record_run_started(&self) {
        self.runs_started.fetch_add(1, Ordering::Relaxed);
    }

    /// Fold a finished run into the totals.
    pub fn record_run_finished(&self, report: &PlaybackReport) {
        match report.outcome {
            PlaybackOutcome::Completed => self.runs_completed.fetch_add(1, Ordering::Relaxed),
            PlaybackOutcome::Stopped(_) => self.runs_stopped.fetch_add(1, Ordering::Relaxed),
        };
        self.repeats_completed
            .fetch_add(u64::from(report.repeats_completed), Ordering::Relaxed);
    }

    pub fn record_action_dispatched(&self) {
        self.actions_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_raw_event(&self) {
        self.raw_events_replayed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_high_level_action(&self) {
        self.high_level_actions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_condition_wait(&self) {
        self.condition_waits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_prudent_retry(&self) {
        self.prudent_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_nested_call(&self) {
        self.nested_calls.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot of the counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            runs_started: self.runs_started.load(Ordering::Relaxed),
            runs_completed: self.runs_completed.load(Ordering::Relaxed),
            runs_stopped: self.runs_stopped.load(Ordering::Relaxed),
            repeats_completed: self.repeats_completed.load(Ordering::Relaxed),
            actions_dispatched: self.actions_dispatched.load(Ordering::Relaxed),
            raw_events_replayed: self.raw_events_replayed.load(Ordering::Relaxed),
            high_level_actions: self.high_level_actions.load(Ordering::Relaxed),
            condition_waits: self.condition_waits.load(Ordering::Relaxed),
            prudent_retries: self.prudent_retries.load(Ordering::Relaxed),
            nested_calls: self.nested_calls.load(Ordering::Relaxed),
            session_start: self.session_start,
            session_duration_secs: (Utc::now() - self.session_start).num_seconds().max(0) as u64,
        }
    }

    /// Summary for display.
    pub fn summary(&self) -> String {
        let s = self.snapshot();
        format!(
            "Playback Statistics:\n\
             - Runs started: {}\n\
             - Runs completed: {}\n\
             - Runs stopped early: {}\n\
             - Repeats completed: {}\n\
             - Actions dispatched: {}\n\
             - Raw events replayed: {}\n\
             - High-level clicks and drags: {}\n\
             - Condition waits: {}\n\
             - Prudent retries: {}\n\
             - Nested macro calls: {}",
            s.runs_started,
            s.runs_completed,
            s.runs_stopped,
            s.repeats_completed,
            s.actions_dispatched,
            s.raw_events_replayed,
            s.high_level_actions,
            s.condition_waits,
            s.prudent_retries,
            s.nested_calls,
        )
    }

    /// Save the counters to disk, if persistence is configured.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let s = self.snapshot();
            let persisted = PersistedStats {
                runs_started: s.runs_started,
                runs_completed: s.runs_completed,
                runs_stopped: s.runs_stopped,
                repeats_completed: s.repeats_completed,
                actions_dispatched: s.actions_dispatched,
                raw_events_replayed: s.raw_events_replayed,
                high_level_actions: s.high_level_actions,
                condition_waits: s.condition_waits,
                prudent_retries: s.prudent_retries,
                nested_calls: s.nested_calls,
                last_updated: Utc::now(),
            };

            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;
            std::fs::write(path, json)?;
        }
        Ok(())
    }

    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let p: PersistedStats =
                    serde_json::from_str(&content).map_err(std::io::Error::other)?;

                self.runs_started.store(p.runs_started, Ordering::Relaxed);
                self.runs_completed.store(p.runs_completed, Ordering::Relaxed);
                self.runs_stopped.store(p.runs_stopped, Ordering::Relaxed);
                self.repeats_completed
                    .store(p.repeats_completed, Ordering::Relaxed);
                self.actions_dispatched
                    .store(p.actions_dispatched, Ordering::Relaxed);
                self.raw_events_replayed
                    .store(p.raw_events_replayed, Ordering::Relaxed);
                self.high_level_actions
                    .store(p.high_level_actions, Ordering::Relaxed);
                self.condition_waits.store(p.condition_waits, Ordering::Relaxed);
                self.prudent_retries.store(p.prudent_retries, Ordering::Relaxed);
                self.nested_calls.store(p.nested_calls, Ordering::Relaxed);
            }
        }
        Ok(())
    }

    pub fn reset(&self) {
        for counter in [
            &self.runs_started,
            &self.runs_completed,
            &self.runs_stopped,
            &self.repeats_completed,
            &self.actions_dispatched,
            &self.raw_events_replayed,
            &self.high_level_actions,
            &self.condition_waits,
            &self.prudent_retries,
            &self.nested_calls,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl Default for PlaybackStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub runs_started: u64,
    pub runs_completed: u64,
    pub runs_stopped: u64,
    pub repeats_completed: u64,
    pub actions_dispatched: u64,
    pub raw_events_replayed: u64,
    pub high_level_actions: u64,
    pub condition_waits: u64,
    pub prudent_retries: u64,
    pub nested_calls: u64,
    pub session_start: DateTime<Utc>,
    pub session_duration_secs: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedStats {
    runs_started: u64,
    runs_completed: u64,
    runs_stopped: u64,
    #[serde(default)]
    repeats_completed: u64,
    actions_dispatched: u64,
    raw_events_replayed: u64,
    high_level_actions: u64,
    condition_waits: u64,
    prudent_retries: u64,
    #[serde(default)]
    nested_calls: u64,
    last_updated: DateTime<Utc>,
}

/// Thread-safe shared statistics.
pub type SharedPlaybackStats = Arc<PlaybackStats>;

pub fn create_shared_stats() -> SharedPlaybackStats {
    Arc::new(PlaybackStats::new())
}

pub fn create_shared_stats_with_persistence(path: PathBuf) -> SharedPlaybackStats {
    Arc::new(PlaybackStats::with_persistence(path))
}
