//! Playback worker: replays a timeline on a background thread.
//!
//! Actions are paced against their recorded start times, scaled by the speed
//! multiplier. Real time spent in waits, retries and nested calls is moved
//! into `time_offset` so it does not push the rest of the schedule late, and
//! every jump (loop-back, skipped branch) rebases the schedule so the target
//! action keeps its recorded spacing.

use crate::event::{EventPayload, Point, RawEvent, Rgb};
use crate::grouping::{ActionKind, GroupedAction};
use crate::monitor::{EmergencyStopDetector, EmergencyStopListener, SoundTriggerMonitor};
use crate::playback::backend::{Actuator, BackendError, DocumentLoader, MacroLoader, Sensor};
use crate::playback::context::{LoopFrame, PlaybackContext, PlaybackOptions};
use crate::playback::listener::{NullListener, PlaybackListener, PlaybackOutcome, PlaybackReport};
use crate::playback::signal::{SharedStopSignal, StopReason, StopSignal};
use crate::stats::{create_shared_stats, SharedPlaybackStats};
use crate::timeline::{ActionTimeline, CoordinateMode, Jump};
use chrono::Utc;
use crossbeam_channel::Receiver;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Upper bound for any single wait, in seconds.
const MAX_WAIT_SECS: f64 = 86_400.0;

/// Errors returned synchronously when starting playback.
#[derive(Debug, thiserror::Error)]
pub enum PlaybackError {
    #[error("a playback is already running")]
    AlreadyPlaying,
    #[error("invalid playback options: {0}")]
    InvalidOptions(String),
    #[error("failed to start playback thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Starts playback runs against a set of collaborators. At most one run is
/// active per player.
pub struct Player {
    actuator: Arc<dyn Actuator>,
    sensor: Arc<dyn Sensor>,
    loader: Arc<dyn MacroLoader>,
    listener: Arc<dyn PlaybackListener>,
    input_feed: Option<Receiver<RawEvent>>,
    stats: SharedPlaybackStats,
    playing: Arc<AtomicBool>,
}

impl Player {
    pub fn new(actuator: Arc<dyn Actuator>, sensor: Arc<dyn Sensor>) -> Self {
        Self {
            actuator,
            sensor,
            loader: Arc::new(DocumentLoader::default()),
            listener: Arc::new(NullListener),
            input_feed: None,
            stats: create_shared_stats(),
            playing: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_listener(mut self, listener: Arc<dyn PlaybackListener>) -> Self {
        self.listener = listener;
        self
    }

    pub fn with_loader(mut self, loader: Arc<dyn MacroLoader>) -> Self {
        self.loader = loader;
        self
    }

    /// Live input events watched for the emergency stop pattern.
    pub fn with_input_feed(mut self, feed: Receiver<RawEvent>) -> Self {
        self.input_feed = Some(feed);
        self
    }

    pub fn with_stats(mut self, stats: SharedPlaybackStats) -> Self {
        self.stats = stats;
        self
    }

    pub fn stats(&self) -> &SharedPlaybackStats {
        &self.stats
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    /// Start playing `timeline` on a background thread.
    ///
    /// The timeline must not change while the run is active; sharing it
    /// through `Arc` keeps it read-only for the worker.
    pub fn play(
        &self,
        timeline: Arc<ActionTimeline>,
        options: PlaybackOptions,
    ) -> Result<PlaybackHandle, PlaybackError> {
        options.validate().map_err(PlaybackError::InvalidOptions)?;
        if self
            .playing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(PlaybackError::AlreadyPlaying);
        }

        let run_id = Uuid::new_v4();
        let stop = StopSignal::shared();
        let worker = Worker {
            timeline,
            options,
            run_id,
            actuator: self.actuator.clone(),
            sensor: self.sensor.clone(),
            loader: self.loader.clone(),
            listener: self.listener.clone(),
            input_feed: self.input_feed.clone(),
            stats: self.stats.clone(),
            stop: stop.clone(),
            sound_suppressed: Arc::new(AtomicBool::new(false)),
            dispatched: AtomicU64::new(0),
        };
        let playing = self.playing.clone();

        let spawned = thread::Builder::new()
            .name("playback".to_string())
            .spawn(move || worker.run(playing));

        match spawned {
            Ok(thread_handle) => Ok(PlaybackHandle {
                run_id,
                stop,
                thread_handle: Some(thread_handle),
            }),
            Err(e) => {
                self.playing.store(false, Ordering::SeqCst);
                Err(PlaybackError::Spawn(e))
            }
        }
    }
}

/// Control handle for a running playback. Dropping it stops the run and
/// waits for the worker; use [`PlaybackHandle::detach`] to let it continue.
pub struct PlaybackHandle {
    run_id: Uuid,
    stop: SharedStopSignal,
    thread_handle: Option<JoinHandle<PlaybackReport>>,
}

impl PlaybackHandle {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Ask the worker to stop at the next check.
    pub fn request_stop(&self) {
        self.stop.request(StopReason::UserRequested);
    }

    /// The run's stop signal, e.g. for a Ctrl+C handler.
    pub fn stop_signal(&self) -> SharedStopSignal {
        self.stop.clone()
    }

    pub fn is_running(&self) -> bool {
        self.thread_handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Wait for the run to end. `None` if the worker thread itself died.
    pub fn join(mut self) -> Option<PlaybackReport> {
        self.thread_handle.take().and_then(|handle| handle.join().ok())
    }

    /// Let the run continue without a handle.
    pub fn detach(mut self) {
        self.thread_handle.take();
    }
}

impl Drop for PlaybackHandle {
    fn drop(&mut self) {
        if let Some(handle) = self.thread_handle.take() {
            self.stop.request(StopReason::UserRequested);
            let _ = handle.join();
        }
    }
}

/// Outcome of polling a condition.
enum Poll {
    Matched,
    TimedOut,
    Stopped,
}

/// Clears the sound-monitor suppression when dropped.
struct Suppression<'a>(&'a AtomicBool);

impl<'a> Suppression<'a> {
    fn engage(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for Suppression<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct Monitors {
    emergency: Option<EmergencyStopListener>,
    sound: Option<SoundTriggerMonitor>,
}

impl Monitors {
    fn stop(&mut self) {
        if let Some(listener) = self.emergency.as_mut() {
            listener.stop();
        }
        if let Some(monitor) = self.sound.as_mut() {
            monitor.stop();
        }
    }
}

struct Worker {
    timeline: Arc<ActionTimeline>,
    options: PlaybackOptions,
    run_id: Uuid,
    actuator: Arc<dyn Actuator>,
    sensor: Arc<dyn Sensor>,
    loader: Arc<dyn MacroLoader>,
    listener: Arc<dyn PlaybackListener>,
    input_feed: Option<Receiver<RawEvent>>,
    stats: SharedPlaybackStats,
    stop: SharedStopSignal,
    sound_suppressed: Arc<AtomicBool>,
    dispatched: AtomicU64,
}

impl Worker {
    fn run(self, playing: Arc<AtomicBool>) -> PlaybackReport {
        let started_at = Utc::now();
        info!(
            run_id = %self.run_id,
            "Playback started: {} actions, repeat {}, speed {}x",
            self.timeline.len(),
            self.options.repeat_count,
            self.options.speed_multiplier
        );
        self.stats.record_run_started();
        self.log(format!(
            "Starting playback of {} actions ({} repeat(s) at {}x)",
            self.timeline.len(),
            self.options.repeat_count,
            self.options.speed_multiplier
        ));

        let mut monitors = self.start_monitors();
        let mut ctx = PlaybackContext::new(&self.options, self.stop.clone());
        let mut repeats_completed = 0;

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            self.execute(&mut ctx, &mut repeats_completed)
        }));
        if result.is_err() {
            error!(run_id = %self.run_id, "Playback worker panicked");
            self.log("Playback aborted by an internal error".to_string());
            self.stop.request(StopReason::Fault);
        }

        monitors.stop();
        self.listener.on_action_highlight(None);

        let outcome = match self.stop.reason() {
            Some(reason) => PlaybackOutcome::Stopped(reason),
            None => PlaybackOutcome::Completed,
        };
        match outcome {
            PlaybackOutcome::Completed => self.log("Playback finished".to_string()),
            PlaybackOutcome::Stopped(reason) => self.log(format!("Playback stopped: {reason}")),
        }

        let report = PlaybackReport {
            run_id: self.run_id,
            started_at,
            finished_at: Utc::now(),
            outcome,
            repeats_completed,
            actions_dispatched: self.dispatched.load(Ordering::Relaxed),
        };
        info!(
            run_id = %self.run_id,
            "Playback ended: {:?}, {} repeat(s) completed",
            report.outcome,
            report.repeats_completed
        );

        self.stats.record_run_finished(&report);
        if let Err(e) = self.stats.save() {
            warn!("Failed to save playback stats: {e}");
        }

        playing.store(false, Ordering::SeqCst);
        self.listener.on_finish(&report);
        report
    }

    fn start_monitors(&self) -> Monitors {
        let settings = &self.options.settings;
        let mut monitors = Monitors::default();

        if let Some(feed) = &self.input_feed {
            let detector = EmergencyStopDetector::new(
                &settings.emergency_key,
                settings.emergency_presses,
                settings.emergency_window,
            );
            monitors.emergency = Some(EmergencyStopListener::start(
                feed.clone(),
                detector,
                self.stop.clone(),
            ));
        }

        if self.options.stop_on_sound {
            monitors.sound = Some(SoundTriggerMonitor::start(
                self.sensor.clone(),
                settings.sound_stop_threshold,
                settings.poll_interval,
                self.stop.clone(),
                self.sound_suppressed.clone(),
            ));
        }
        monitors
    }

    fn execute(&self, ctx: &mut PlaybackContext, repeats_completed: &mut u32) {
        let total = self.options.repeat_count;
        for iteration in 0..total {
            if self.stop.is_stopped() {
                break;
            }
            if total > 1 {
                self.log(format!("Repeat {}/{}", iteration + 1, total));
            }

            let origin = match self.pointer_origin(&self.timeline, (0, 0)) {
                Ok(origin) => origin,
                Err(e) => {
                    self.fault(&e);
                    break;
                }
            };
            ctx.begin_iteration(iteration, origin);

            if let Err(e) = self.play_timeline(&self.timeline, ctx) {
                self.fault(&e);
                break;
            }
            if self.stop.is_stopped() {
                break;
            }
            *repeats_completed += 1;

            if iteration + 1 < total && !self.stop.sleep(self.options.settings.repeat_pause) {
                break;
            }
        }
    }

    /// Pointer position a relative timeline is projected from.
    fn pointer_origin(&self, timeline: &ActionTimeline, fallback: Point) -> Result<Point, BackendError> {
        if timeline.mode().is_relative() {
            self.actuator.pointer_position()
        } else {
            Ok(fallback)
        }
    }

    fn play_timeline(&self, timeline: &ActionTimeline, ctx: &mut PlaybackContext) -> Result<(), BackendError> {
        let actions = timeline.actions();
        let flow = timeline.control_flow();
        let mode = timeline.mode();
        let mut index = 0;

        while index < actions.len() {
            if self.stop.is_stopped() {
                break;
            }
            let action = &actions[index];
            if ctx.depth == 0 {
                self.listener.on_action_highlight(Some(index));
            }
            if action.kind != ActionKind::LoopEnd && !self.wait_until(ctx, action.start_time) {
                break;
            }
            self.dispatched.fetch_add(1, Ordering::Relaxed);
            self.stats.record_action_dispatched();

            index = match &action.kind {
                ActionKind::LoopStart { count } => {
                    let already_open = ctx.loop_stack.last().map(|f| f.start_index) == Some(index);
                    if !already_open {
                        ctx.loop_stack.push(LoopFrame {
                            start_index: index,
                            target_count: *count,
                            current_count: 0,
                        });
                        debug!("Loop opened at action {index} (count {count})");
                    }
                    index + 1
                }
                ActionKind::LoopEnd => self.close_loop(ctx, actions, index),
                ActionKind::WaitColor {
                    x,
                    y,
                    target_color,
                    timeout,
                    post_delay,
                } => {
                    self.wait_color(ctx, mode, (*x, *y), *target_color, *timeout, *post_delay)?;
                    index + 1
                }
                ActionKind::WaitSound {
                    threshold,
                    timeout,
                    post_delay,
                } => {
                    self.wait_sound(ctx, *threshold, *timeout, *post_delay)?;
                    index + 1
                }
                ActionKind::IfColorMatch {
                    x, y, target_color, ..
                } => {
                    let (px, py) = ctx.project((*x, *y), mode);
                    let observed = self.sensor.pixel_color(px, py)?;
                    let matched = observed == *target_color;
                    self.log(format!(
                        "If color {target_color} at ({px}, {py}): found {observed}, {}",
                        if matched { "true" } else { "false" }
                    ));
                    if matched {
                        index + 1
                    } else {
                        self.take_jump(ctx, actions, flow.jump(index), index)
                    }
                }
                ActionKind::IfColorElse { .. } => {
                    self.take_jump(ctx, actions, flow.jump(index), index)
                }
                ActionKind::IfColorEnd => index + 1,
                ActionKind::CallMacro { path } => {
                    self.call_macro(ctx, path)?;
                    index + 1
                }
                kind if kind.click_button().is_some() => {
                    self.play_click(ctx, mode, index, action)?;
                    index + 1
                }
                _ => {
                    self.replay_raw(ctx, timeline, action)?;
                    index + 1
                }
            };
        }
        Ok(())
    }

    fn close_loop(&self, ctx: &mut PlaybackContext, actions: &[GroupedAction], index: usize) -> usize {
        let Some(frame) = ctx.loop_stack.last_mut() else {
            self.log(format!("Loop End at action {index} without a matching Loop Start"));
            return index + 1;
        };
        frame.current_count += 1;

        if frame.target_count == 0 || frame.current_count < frame.target_count {
            let start = frame.start_index;
            let pass = frame.current_count + 1;
            let target = frame.target_count;
            if target == 0 {
                self.log(format!("Loop pass {pass}"));
            } else {
                self.log(format!("Loop pass {pass}/{target}"));
            }
            ctx.rebase(actions[index].start_time, actions[start].start_time);
            start + 1
        } else {
            ctx.loop_stack.pop();
            self.log("Loop finished".to_string());
            index + 1
        }
    }

    fn take_jump(
        &self,
        ctx: &mut PlaybackContext,
        actions: &[GroupedAction],
        jump: Option<Jump>,
        index: usize,
    ) -> usize {
        let Some(jump) = jump else {
            return index + 1;
        };
        if let Some(anchor) = actions.get(jump.anchor) {
            ctx.rebase(actions[index].start_time, anchor.start_time);
        }
        jump.target
    }

    /// Sleep until recorded `time` is due. Returns `false` if stopped.
    fn wait_until(&self, ctx: &PlaybackContext, time: f64) -> bool {
        let delay = ctx.delay_until(time);
        if delay.is_zero() {
            return !self.stop.is_stopped();
        }
        self.stop.sleep(delay)
    }

    fn poll_until(
        &self,
        timeout: Duration,
        mut probe: impl FnMut() -> Result<bool, BackendError>,
    ) -> Result<Poll, BackendError> {
        let started = Instant::now();
        loop {
            if self.stop.is_stopped() {
                return Ok(Poll::Stopped);
            }
            if probe()? {
                return Ok(Poll::Matched);
            }
            if started.elapsed() >= timeout {
                return Ok(Poll::TimedOut);
            }
            if !self.stop.sleep(self.options.settings.poll_interval) {
                return Ok(Poll::Stopped);
            }
        }
    }

    fn wait_color(
        &self,
        ctx: &mut PlaybackContext,
        mode: CoordinateMode,
        point: Point,
        target: Rgb,
        timeout: f64,
        post_delay: f64,
    ) -> Result<(), BackendError> {
        let started = Instant::now();
        let (px, py) = ctx.project(point, mode);
        self.stats.record_condition_wait();
        self.log(format!(
            "Waiting for {target} at ({px}, {py}), timeout {timeout:.1}s"
        ));
        self.actuator.move_pointer(px, py)?;

        let result = self.poll_until(secs(timeout), || {
            Ok(self.sensor.pixel_color(px, py)? == target)
        });
        ctx.add_offset(started.elapsed());

        match result? {
            Poll::Matched => {
                self.log("Color matched".to_string());
                self.post_delay(ctx, post_delay);
            }
            Poll::TimedOut => {
                warn!("Wait color timed out at ({px}, {py})");
                self.log(format!(
                    "Wait Color timed out after {timeout:.1}s waiting for {target} at ({px}, {py})"
                ));
                self.stop.request(StopReason::WaitTimeout);
            }
            Poll::Stopped => {}
        }
        Ok(())
    }

    fn wait_sound(
        &self,
        ctx: &mut PlaybackContext,
        threshold: f32,
        timeout: f64,
        post_delay: f64,
    ) -> Result<(), BackendError> {
        let started = Instant::now();
        self.stats.record_condition_wait();
        self.log(format!(
            "Waiting for sound above {threshold}, timeout {timeout:.1}s"
        ));

        let result = {
            let _suppression = Suppression::engage(&self.sound_suppressed);
            self.poll_until(secs(timeout), || {
                Ok(self.sensor.audio_amplitude()? > threshold)
            })
        };
        ctx.add_offset(started.elapsed());

        match result? {
            Poll::Matched => {
                self.log("Sound detected".to_string());
                self.post_delay(ctx, post_delay);
            }
            Poll::TimedOut => {
                warn!("Wait sound timed out");
                self.log(format!(
                    "Wait Sound timed out after {timeout:.1}s (threshold {threshold})"
                ));
                self.stop.request(StopReason::WaitTimeout);
            }
            Poll::Stopped => {}
        }
        Ok(())
    }

    fn post_delay(&self, ctx: &mut PlaybackContext, post_delay: f64) {
        if post_delay > 0.0 {
            let started = Instant::now();
            self.stop.sleep(secs(post_delay));
            ctx.add_offset(started.elapsed());
        }
    }

    fn play_click(
        &self,
        ctx: &mut PlaybackContext,
        mode: CoordinateMode,
        index: usize,
        action: &GroupedAction,
    ) -> Result<(), BackendError> {
        let Some(button) = action.kind.click_button() else {
            return Ok(());
        };
        let target = action.start_position().map(|p| ctx.project(p, mode));

        if let Some(point) = target {
            if ctx.prudent_active() && !self.verify_target(ctx, index, point)? {
                return Ok(());
            }
            self.actuator.move_pointer(point.0, point.1)?;
        }

        match action.kind {
            ActionKind::MouseClick { .. } => self.actuator.click(button)?,
            ActionKind::MouseDoubleClick { .. } => self.actuator.double_click(button)?,
            ActionKind::MouseTripleClick { .. } => {
                self.actuator.double_click(button)?;
                if !self.stop.sleep(self.options.settings.triple_click_gap) {
                    return Ok(());
                }
                self.actuator.click(button)?;
            }
            ActionKind::MouseDrag { .. } => {
                let from = match target {
                    Some(point) => point,
                    None => self.actuator.pointer_position()?,
                };
                let to = action
                    .end_position()
                    .map_or(from, |p| ctx.project(p, mode));
                let duration = secs(action.duration() / ctx.speed_multiplier);
                self.actuator.drag(button, from, to, duration)?;
            }
            _ => {}
        }
        self.stats.record_high_level_action();
        Ok(())
    }

    /// Compare the color under a click target with the one learned on the
    /// first repeat. Returns `false` when playback must not click.
    fn verify_target(&self, ctx: &mut PlaybackContext, index: usize, (x, y): Point) -> Result<bool, BackendError> {
        let observed = self.sensor.pixel_color(x, y)?;
        let learned = ctx.learned_colors.get(&index).copied();
        let expected = match learned {
            Some(expected) if ctx.iteration > 0 => expected,
            _ => {
                debug!("Learned {observed} under action {index}");
                ctx.learned_colors.insert(index, observed);
                return Ok(true);
            }
        };
        if observed == expected {
            return Ok(true);
        }

        let started = Instant::now();
        let retries = self.options.settings.prudent_retries;
        let mut current = observed;
        for attempt in 1..=retries {
            self.log(format!(
                "Prudent check: action {index} expected {expected}, found {current} (retry {attempt}/{retries})"
            ));
            self.stats.record_prudent_retry();
            if !self.stop.sleep(self.options.settings.prudent_backoff) {
                ctx.add_offset(started.elapsed());
                return Ok(false);
            }
            current = self.sensor.pixel_color(x, y)?;
            if current == expected {
                ctx.add_offset(started.elapsed());
                return Ok(true);
            }
        }
        ctx.add_offset(started.elapsed());

        warn!("Prudent mode: target of action {index} changed");
        self.log(format!(
            "Prudent mode: target of action {index} changed from {expected} to {current}, stopping"
        ));
        self.stop.request(StopReason::PrudentMismatch);
        Ok(false)
    }

    fn replay_raw(
        &self,
        ctx: &mut PlaybackContext,
        timeline: &ActionTimeline,
        action: &GroupedAction,
    ) -> Result<(), BackendError> {
        let mode = timeline.mode();
        for &raw in &action.event_indices {
            if self.stop.is_stopped() {
                return Ok(());
            }
            let Some(event) = timeline.events().get(raw) else {
                continue;
            };
            if !self.wait_until(ctx, event.time) {
                return Ok(());
            }
            self.replay_event(ctx, mode, event)?;
            self.stats.record_raw_event();
        }
        Ok(())
    }

    fn replay_event(&self, ctx: &PlaybackContext, mode: CoordinateMode, event: &RawEvent) -> Result<(), BackendError> {
        let move_to_capture = || -> Result<(), BackendError> {
            if let Some(point) = event.captured_position {
                let (x, y) = ctx.project(point, mode);
                self.actuator.move_pointer(x, y)?;
            }
            Ok(())
        };

        match &event.payload {
            EventPayload::KeyDown { key } => self.actuator.press_key(key),
            EventPayload::KeyUp { key } => self.actuator.release_key(key),
            EventPayload::PointerMove { x, y } => {
                let (x, y) = ctx.project((*x, *y), mode);
                self.actuator.move_pointer(x, y)
            }
            EventPayload::ButtonDown { button } => {
                move_to_capture()?;
                self.actuator.press_button(*button)
            }
            EventPayload::ButtonUp { button } => {
                move_to_capture()?;
                self.actuator.release_button(*button)
            }
            EventPayload::ButtonDouble { button } => {
                move_to_capture()?;
                self.actuator.double_click(*button)
            }
            EventPayload::Wheel { delta } => self.actuator.scroll(*delta),
            EventPayload::Logic { .. } => Ok(()),
            EventPayload::Unrecognized { description } => {
                debug!("Skipping unrecognized event: {description}");
                Ok(())
            }
        }
    }

    fn call_macro(&self, ctx: &mut PlaybackContext, path: &Path) -> Result<(), BackendError> {
        let limit = self.options.settings.max_call_depth;
        if ctx.depth + 1 > limit {
            self.log(format!(
                "Macro call depth limit ({limit}) reached at {}, stopping",
                path.display()
            ));
            self.stop.request(StopReason::Fault);
            return Ok(());
        }

        let started = Instant::now();
        self.log(format!("Calling macro {}", path.display()));
        let nested = self.loader.load(path);
        let result = nested.and_then(|nested| {
            self.stats.record_nested_call();
            let origin = self.pointer_origin(&nested, ctx.pointer_origin)?;
            let mut nested_ctx = ctx.nested(origin);
            self.play_timeline(&nested, &mut nested_ctx)
        });
        ctx.add_offset(started.elapsed());
        result?;

        if !self.stop.is_stopped() {
            self.log(format!("Returned from {}", path.display()));
        }
        Ok(())
    }

    fn fault(&self, e: &BackendError) {
        error!(run_id = %self.run_id, "Playback fault: {e}");
        self.log(format!("Playback error: {e}"));
        self.stop.request(StopReason::Fault);
    }

    fn log(&self, message: String) {
        debug!(run_id = %self.run_id, "{message}");
        self.listener.on_log(&message);
    }
}

/// Seconds to a duration, clamping negative and non-finite values to zero.
fn secs(value: f64) -> Duration {
    if value.is_finite() && value > 0.0 {
        Duration::from_secs_f64(value.min(MAX_WAIT_SECS))
    } else {
        Duration::ZERO
    }
}
