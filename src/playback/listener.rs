//! Host-facing callbacks for a playback run.

use crate::playback::signal::StopReason;
use chrono::{DateTime, Utc};
use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How a playback run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaybackOutcome {
    Completed,
    Stopped(StopReason),
}

/// Final account of a playback run, delivered to `on_finish`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcome: PlaybackOutcome,
    /// Repeats that ran to the end of the timeline
    pub repeats_completed: u32,
    pub actions_dispatched: u64,
}

impl PlaybackReport {
    pub fn completed(&self) -> bool {
        self.outcome == PlaybackOutcome::Completed
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        match self.outcome {
            PlaybackOutcome::Stopped(reason) => Some(reason),
            PlaybackOutcome::Completed => None,
        }
    }
}

/// Receives progress from the playback worker thread.
///
/// Callbacks run on the worker; implementations must not block for long.
pub trait PlaybackListener: Send + Sync {
    /// A user-facing progress or diagnostic message.
    fn on_log(&self, _message: &str) {}

    /// The action at this index is about to run; `None` clears the highlight.
    fn on_action_highlight(&self, _index: Option<usize>) {}

    /// Called exactly once per run, after cleanup.
    fn on_finish(&self, _report: &PlaybackReport) {}
}

/// Listener that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullListener;

impl PlaybackListener for NullListener {}

/// A playback callback forwarded over a channel.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    Log(String),
    Highlight(Option<usize>),
    Finished(PlaybackReport),
}

/// Listener that publishes callbacks to a channel, for hosts that poll.
#[derive(Debug, Clone)]
pub struct ChannelListener {
    sender: Sender<PlaybackEvent>,
}

impl ChannelListener {
    pub fn new() -> (Self, Receiver<PlaybackEvent>) {
        let (sender, receiver) = unbounded();
        (Self { sender }, receiver)
    }

    fn send(&self, event: PlaybackEvent) {
        // A host that dropped its receiver is no longer interested.
        let _ = self.sender.send(event);
    }
}

impl PlaybackListener for ChannelListener {
    fn on_log(&self, message: &str) {
        self.send(PlaybackEvent::Log(message.to_string()));
    }

    fn on_action_highlight(&self, index: Option<usize>) {
        self.send(PlaybackEvent::Highlight(index));
    }

    fn on_finish(&self, report: &PlaybackReport) {
        self.send(PlaybackEvent::Finished(report.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_listener_forwards() {
        let (listener, receiver) = ChannelListener::new();
        listener.on_log("hello");
        listener.on_action_highlight(Some(2));
        listener.on_action_highlight(None);

        let events: Vec<PlaybackEvent> = receiver.try_iter().collect();
        assert_eq!(
            events,
            vec![
                PlaybackEvent::Log("hello".to_string()),
                PlaybackEvent::Highlight(Some(2)),
                PlaybackEvent::Highlight(None),
            ]
        );
    }

    #[test]
    fn test_report_reason() {
        let now = Utc::now();
        let report = PlaybackReport {
            run_id: Uuid::new_v4(),
            started_at: now,
            finished_at: now,
            outcome: PlaybackOutcome::Stopped(StopReason::SoundTrigger),
            repeats_completed: 0,
            actions_dispatched: 4,
        };
        assert!(!report.completed());
        assert_eq!(report.stop_reason(), Some(StopReason::SoundTrigger));
    }

    #[test]
    fn test_dropped_receiver_is_harmless() {
        let (listener, receiver) = ChannelListener::new();
        drop(receiver);
        listener.on_log("nobody listens");
    }
}
