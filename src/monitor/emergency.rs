//! Emergency stop: a burst of presses of one key halts playback.

use crate::event::{EventPayload, RawEvent};
use crate::playback::signal::{SharedStopSignal, StopReason};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

const RECV_TIMEOUT: Duration = Duration::from_millis(50);

/// Detects `presses` key-downs of `key` within `window` seconds.
#[derive(Debug, Clone)]
pub struct EmergencyStopDetector {
    key: String,
    presses: usize,
    window: f64,
    recent: VecDeque<f64>,
}

impl EmergencyStopDetector {
    pub fn new(key: &str, presses: usize, window: Duration) -> Self {
        Self {
            key: canonical_key(key),
            presses: presses.max(1),
            window: window.as_secs_f64(),
            recent: VecDeque::new(),
        }
    }

    /// Feed one live event; returns `true` when the pattern completes.
    pub fn observe(&mut self, event: &RawEvent) -> bool {
        match &event.payload {
            EventPayload::KeyDown { key } if canonical_key(key) == self.key => {
                self.record_press(event.time)
            }
            _ => false,
        }
    }

    /// Record a press at `time` (seconds).
    pub fn record_press(&mut self, time: f64) -> bool {
        self.recent.push_back(time);
        while let Some(&oldest) = self.recent.front() {
            if time - oldest > self.window {
                self.recent.pop_front();
            } else {
                break;
            }
        }
        if self.recent.len() >= self.presses {
            self.recent.clear();
            return true;
        }
        false
    }

    pub fn reset(&mut self) {
        self.recent.clear();
    }
}

fn canonical_key(key: &str) -> String {
    match key.trim().to_lowercase().as_str() {
        "escape" => "esc".to_string(),
        other => other.to_string(),
    }
}

/// Background thread watching a live input feed for the emergency pattern.
pub struct EmergencyStopListener {
    running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
}

impl EmergencyStopListener {
    /// Start watching `feed`. Events queued before the start are discarded.
    pub fn start(
        feed: Receiver<RawEvent>,
        mut detector: EmergencyStopDetector,
        stop: SharedStopSignal,
    ) -> Self {
        while feed.try_recv().is_ok() {}

        let running = Arc::new(AtomicBool::new(true));
        let running_clone = running.clone();

        let thread_handle = thread::spawn(move || {
            debug!("Emergency stop listener started");
            while running_clone.load(Ordering::SeqCst) {
                match feed.recv_timeout(RECV_TIMEOUT) {
                    Ok(event) => {
                        if detector.observe(&event) {
                            warn!("Emergency stop pattern detected");
                            stop.request(StopReason::EmergencyStop);
                            break;
                        }
                    }
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            debug!("Emergency stop listener stopped");
        });

        Self {
            running,
            thread_handle: Some(thread_handle),
        }
    }

    /// Stop the listener and wait for its thread.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }

    pub fn is_running(&self) -> bool {
        self.thread_handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for EmergencyStopListener {
    fn drop(&mut self) {
        self.stop();
    }
}
