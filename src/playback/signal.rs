//! Cooperative cancellation shared by the playback worker and its monitors.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Longest uninterrupted sleep slice; bounds stop latency during waits.
pub const SLEEP_SLICE: Duration = Duration::from_millis(20);

/// Why playback stopped before completing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum StopReason {
    /// The host asked for a stop
    UserRequested = 1,
    /// The emergency key pattern was seen
    EmergencyStop = 2,
    /// Audio amplitude crossed the stop threshold
    SoundTrigger = 3,
    /// A wait condition timed out
    WaitTimeout = 4,
    /// Prudent mode found the click target changed
    PrudentMismatch = 5,
    /// A backend call failed or the worker panicked
    Fault = 6,
}

impl StopReason {
    fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(StopReason::UserRequested),
            2 => Some(StopReason::EmergencyStop),
            3 => Some(StopReason::SoundTrigger),
            4 => Some(StopReason::WaitTimeout),
            5 => Some(StopReason::PrudentMismatch),
            6 => Some(StopReason::Fault),
            _ => None,
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            StopReason::UserRequested => "stopped by user",
            StopReason::EmergencyStop => "emergency stop",
            StopReason::SoundTrigger => "sound trigger",
            StopReason::WaitTimeout => "wait condition timed out",
            StopReason::PrudentMismatch => "click target changed",
            StopReason::Fault => "playback fault",
        };
        f.write_str(text)
    }
}

/// Stop flag carrying the first reason that was raised.
#[derive(Debug, Default)]
pub struct StopSignal {
    state: AtomicU8,
}

/// Shared handle to a stop signal.
pub type SharedStopSignal = Arc<StopSignal>;

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedStopSignal {
        Arc::new(Self::new())
    }

    /// Raise the signal. Returns `false` if it was already raised; the
    /// original reason is kept.
    pub fn request(&self, reason: StopReason) -> bool {
        self.state
            .compare_exchange(0, reason as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn is_stopped(&self) -> bool {
        self.state.load(Ordering::SeqCst) != 0
    }

    pub fn reason(&self) -> Option<StopReason> {
        StopReason::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Sleep for `duration` in short slices. Returns `false` if the signal was
    /// raised before the time elapsed.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_stopped() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep((deadline - now).min(SLEEP_SLICE));
        }
    }
}
