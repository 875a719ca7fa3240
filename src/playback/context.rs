//! Options for a playback run and the transient state the worker keeps.

use crate::config::duration_serde;
use crate::event::{Point, Rgb};
use crate::playback::signal::SharedStopSignal;
use crate::timeline::CoordinateMode;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Tunables shared by all runs; stored in the configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackSettings {
    /// Pause between repeats
    #[serde(with = "duration_serde")]
    pub repeat_pause: Duration,
    /// Sampling interval of wait conditions
    #[serde(with = "duration_serde")]
    pub poll_interval: Duration,
    /// Extra samples prudent mode takes before giving up on a changed target
    pub prudent_retries: u32,
    #[serde(with = "duration_serde")]
    pub prudent_backoff: Duration,
    /// Amplitude above which the sound monitor stops playback
    pub sound_stop_threshold: f32,
    /// Key that triggers an emergency stop when pressed repeatedly
    pub emergency_key: String,
    pub emergency_presses: usize,
    #[serde(with = "duration_serde")]
    pub emergency_window: Duration,
    /// Gap between the double click and the final click of a triple click
    #[serde(with = "duration_serde")]
    pub triple_click_gap: Duration,
    /// Deepest chain of nested macro calls
    pub max_call_depth: usize,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            repeat_pause: Duration::from_millis(500),
            poll_interval: Duration::from_millis(100),
            prudent_retries: 3,
            prudent_backoff: Duration::from_millis(500),
            sound_stop_threshold: 0.1,
            emergency_key: "esc".to_string(),
            emergency_presses: 3,
            emergency_window: Duration::from_millis(500),
            triple_click_gap: Duration::from_millis(50),
            max_call_depth: 8,
        }
    }
}

/// Per-run options.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackOptions {
    pub repeat_count: u32,
    pub speed_multiplier: f64,
    pub stop_on_sound: bool,
    /// Verify click targets against colors learned on the first repeat
    pub prudent_mode: bool,
    pub settings: PlaybackSettings,
}

impl Default for PlaybackOptions {
    fn default() -> Self {
        Self {
            repeat_count: 1,
            speed_multiplier: 1.0,
            stop_on_sound: false,
            prudent_mode: false,
            settings: PlaybackSettings::default(),
        }
    }
}

impl PlaybackOptions {
    pub fn with_repeat(mut self, repeat_count: u32) -> Self {
        self.repeat_count = repeat_count;
        self
    }

    pub fn with_speed(mut self, speed_multiplier: f64) -> Self {
        self.speed_multiplier = speed_multiplier;
        self
    }

    pub fn with_prudent_mode(mut self, prudent_mode: bool) -> Self {
        self.prudent_mode = prudent_mode;
        self
    }

    pub fn with_stop_on_sound(mut self, stop_on_sound: bool) -> Self {
        self.stop_on_sound = stop_on_sound;
        self
    }

    pub fn with_settings(mut self, settings: PlaybackSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Check the options; returns a description of the first problem.
    pub fn validate(&self) -> Result<(), String> {
        if self.repeat_count == 0 {
            return Err("repeat count must be at least 1".to_string());
        }
        if !self.speed_multiplier.is_finite() || self.speed_multiplier <= 0.0 {
            return Err(format!(
                "speed multiplier must be a positive number, got {}",
                self.speed_multiplier
            ));
        }
        if self.settings.poll_interval.is_zero() {
            return Err("poll interval must be positive".to_string());
        }
        Ok(())
    }
}

/// An open loop: where it started and how often its body has run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopFrame {
    pub start_index: usize,
    /// 0 repeats until stopped
    pub target_count: u32,
    pub current_count: u32,
}

/// Mutable state owned by the playback worker for one timeline.
#[derive(Debug)]
pub struct PlaybackContext {
    pub repeat_count: u32,
    pub speed_multiplier: f64,
    pub prudent_mode: bool,
    /// Seconds of real time spent in waits and nested calls, excluded from pacing
    pub time_offset: f64,
    /// Recorded-time correction accumulated by jumps
    pub schedule_shift: f64,
    /// Color under each click target, learned on the first repeat
    pub learned_colors: HashMap<usize, Rgb>,
    pub loop_stack: Vec<LoopFrame>,
    pub stop: SharedStopSignal,
    /// Zero-based repeat currently running
    pub iteration: u32,
    pub iteration_start: Instant,
    /// Pointer position captured at the start of the repeat
    pub pointer_origin: Point,
    /// Nesting level of macro calls; 0 for the top-level timeline
    pub depth: usize,
}

impl PlaybackContext {
    pub fn new(options: &PlaybackOptions, stop: SharedStopSignal) -> Self {
        Self {
            repeat_count: options.repeat_count,
            speed_multiplier: options.speed_multiplier,
            prudent_mode: options.prudent_mode,
            time_offset: 0.0,
            schedule_shift: 0.0,
            learned_colors: HashMap::new(),
            loop_stack: Vec::new(),
            stop,
            iteration: 0,
            iteration_start: Instant::now(),
            pointer_origin: (0, 0),
            depth: 0,
        }
    }

    /// Context for a nested macro call: one repeat, no prudent checks.
    pub fn nested(&self, pointer_origin: Point) -> Self {
        Self {
            repeat_count: 1,
            speed_multiplier: self.speed_multiplier,
            prudent_mode: false,
            time_offset: 0.0,
            schedule_shift: 0.0,
            learned_colors: HashMap::new(),
            loop_stack: Vec::new(),
            stop: self.stop.clone(),
            iteration: 0,
            iteration_start: Instant::now(),
            pointer_origin,
            depth: self.depth + 1,
        }
    }

    /// Reset pacing for a new repeat. Learned colors survive.
    pub fn begin_iteration(&mut self, iteration: u32, pointer_origin: Point) {
        self.iteration = iteration;
        self.iteration_start = Instant::now();
        self.pointer_origin = pointer_origin;
        self.time_offset = 0.0;
        self.schedule_shift = 0.0;
        self.loop_stack.clear();
    }

    /// Whether click targets are verified on this context.
    pub fn prudent_active(&self) -> bool {
        self.prudent_mode && self.repeat_count > 1 && self.depth == 0
    }

    /// Recorded time reached so far in this repeat, in seconds.
    pub fn elapsed_recording(&self) -> f64 {
        (self.iteration_start.elapsed().as_secs_f64() - self.time_offset) * self.speed_multiplier
    }

    /// Real time to wait before something recorded at `time` is due.
    pub fn delay_until(&self, time: f64) -> Duration {
        let wait = (time + self.schedule_shift) - self.elapsed_recording();
        if wait > 0.0 {
            Duration::from_secs_f64(wait / self.speed_multiplier)
        } else {
            Duration::ZERO
        }
    }

    /// Exclude real time spent outside the recorded schedule.
    pub fn add_offset(&mut self, spent: Duration) {
        self.time_offset += spent.as_secs_f64();
    }

    /// Account for a jump from recorded time `from` to recorded time `to`.
    pub fn rebase(&mut self, from: f64, to: f64) {
        self.schedule_shift += from - to;
    }

    /// Screen position for a recorded point under the given coordinate mode.
    pub fn project(&self, point: Point, mode: CoordinateMode) -> Point {
        mode.project(point, self.pointer_origin)
    }
}
