//! Integration tests for the playback scheduler against the recording backend

use crossbeam_channel::unbounded;
use input_replay::event::{LogicEvent, MouseButton, RawEvent, Rgb};
use input_replay::playback::{
    ActuatorCall, BackendError, ChannelListener, PlaybackEvent, PlaybackOptions, PlaybackSettings,
    Player, RecordingActuator, ScriptedSensor, Sensor, StopReason,
};
use input_replay::timeline::{ActionTimeline, CoordinateMode, MacroDocument};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const BLACK: Rgb = Rgb::new(0, 0, 0);
const RED: Rgb = Rgb::new(255, 0, 0);

fn fast_settings() -> PlaybackSettings {
    PlaybackSettings {
        repeat_pause: Duration::from_millis(10),
        poll_interval: Duration::from_millis(10),
        prudent_backoff: Duration::from_millis(10),
        ..PlaybackSettings::default()
    }
}

fn click_at(time: f64, position: (i32, i32)) -> Vec<RawEvent> {
    vec![
        RawEvent::button_down(time, MouseButton::Left, position),
        RawEvent::button_up(time + 0.01, MouseButton::Left, position),
    ]
}

fn key_press(time: f64, key: &str) -> Vec<RawEvent> {
    vec![RawEvent::key_down(time, key), RawEvent::key_up(time + 0.01, key)]
}

fn timeline(events: Vec<RawEvent>) -> Arc<ActionTimeline> {
    Arc::new(ActionTimeline::from_events(events, CoordinateMode::Absolute))
}

fn player(actuator: &Arc<RecordingActuator>, sensor: ScriptedSensor) -> Player {
    Player::new(actuator.clone(), Arc::new(sensor))
}

#[test]
fn test_loop_body_runs_count_times() {
    let mut events = vec![RawEvent::logic(0.0, LogicEvent::LoopStart { count: 3 })];
    events.extend(click_at(0.0, (5, 5)));
    events.push(RawEvent::logic(0.02, LogicEvent::LoopEnd));

    let actuator = Arc::new(RecordingActuator::default());
    let report = player(&actuator, ScriptedSensor::new(BLACK))
        .play(timeline(events), PlaybackOptions::default())
        .unwrap()
        .join()
        .unwrap();

    assert!(report.completed());
    assert_eq!(actuator.click_count(), 3);
}

#[test]
fn test_speed_multiplier_scales_schedule() {
    let actuator = Arc::new(RecordingActuator::default());
    let report = player(&actuator, ScriptedSensor::new(BLACK))
        .play(
            timeline(click_at(1.0, (5, 5))),
            PlaybackOptions::default().with_speed(2.0),
        )
        .unwrap()
        .join()
        .unwrap();
    assert!(report.completed());

    let (at, _) = actuator
        .timed_calls()
        .into_iter()
        .find(|(_, call)| matches!(call, ActuatorCall::Click(_)))
        .expect("click was issued");
    assert!(at >= Duration::from_millis(400), "click fired at {at:?}");
    assert!(at < Duration::from_millis(900), "click fired at {at:?}");
}

#[test]
fn test_prudent_mode_stops_when_target_changes() {
    let actuator = Arc::new(RecordingActuator::default());
    let sensor = Arc::new(ScriptedSensor::new(BLACK).with_colors([RED]));
    let player = Player::new(actuator.clone(), sensor.clone());

    let options = PlaybackOptions::default()
        .with_repeat(2)
        .with_prudent_mode(true)
        .with_settings(fast_settings());
    let report = player
        .play(timeline(click_at(0.0, (5, 5))), options)
        .unwrap()
        .join()
        .unwrap();

    assert_eq!(report.stop_reason(), Some(StopReason::PrudentMismatch));
    assert_eq!(report.repeats_completed, 1);
    // One learning sample, one mismatching check, three retries.
    assert_eq!(sensor.color_samples(), 5);
    assert_eq!(actuator.click_count(), 1);
    assert_eq!(player.stats().snapshot().prudent_retries, 3);
}

#[test]
fn test_prudent_mode_passes_stable_target() {
    let actuator = Arc::new(RecordingActuator::default());
    let options = PlaybackOptions::default()
        .with_repeat(3)
        .with_prudent_mode(true)
        .with_settings(fast_settings());
    let report = player(&actuator, ScriptedSensor::new(RED))
        .play(timeline(click_at(0.0, (5, 5))), options)
        .unwrap()
        .join()
        .unwrap();

    assert!(report.completed());
    assert_eq!(report.repeats_completed, 3);
    assert_eq!(actuator.click_count(), 3);
}

#[test]
fn test_request_stop_interrupts_wait() {
    let actuator = Arc::new(RecordingActuator::default());
    let player = player(&actuator, ScriptedSensor::new(BLACK));
    let handle = player
        .play(timeline(vec![RawEvent::wheel(5.0, 1.0)]), PlaybackOptions::default())
        .unwrap();
    assert!(player.is_playing());

    thread::sleep(Duration::from_millis(50));
    let started = Instant::now();
    handle.request_stop();
    let report = handle.join().unwrap();

    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(report.stop_reason(), Some(StopReason::UserRequested));
    assert!(actuator.calls().is_empty());
    assert!(!player.is_playing());
}

#[test]
fn test_invalid_speed_is_rejected() {
    let actuator = Arc::new(RecordingActuator::default());
    let player = player(&actuator, ScriptedSensor::new(BLACK));
    assert!(player
        .play(timeline(click_at(0.0, (1, 1))), PlaybackOptions::default().with_speed(-1.0))
        .is_err());
    assert!(!player.is_playing());
}

#[test]
fn test_wait_color_timeout_stops_run() {
    let mut events = vec![RawEvent::logic(
        0.0,
        LogicEvent::WaitColor {
            x: 10,
            y: 10,
            target_color: RED,
            timeout: 0.2,
            post_delay: 0.0,
        },
    )];
    events.extend(click_at(0.1, (10, 10)));

    let actuator = Arc::new(RecordingActuator::default());
    let (listener, receiver) = ChannelListener::new();
    let report = player(&actuator, ScriptedSensor::new(BLACK))
        .with_listener(Arc::new(listener))
        .play(
            timeline(events),
            PlaybackOptions::default().with_settings(fast_settings()),
        )
        .unwrap()
        .join()
        .unwrap();

    assert_eq!(report.stop_reason(), Some(StopReason::WaitTimeout));
    assert_eq!(actuator.click_count(), 0);
    let logs: Vec<String> = receiver
        .try_iter()
        .filter_map(|event| match event {
            PlaybackEvent::Log(message) => Some(message),
            _ => None,
        })
        .collect();
    assert!(logs.iter().any(|line| line.contains("timed out")));
}

#[test]
fn test_wait_color_match_continues() {
    let mut events = vec![RawEvent::logic(
        0.0,
        LogicEvent::WaitColor {
            x: 10,
            y: 10,
            target_color: RED,
            timeout: 5.0,
            post_delay: 0.0,
        },
    )];
    events.extend(click_at(0.1, (10, 10)));

    let actuator = Arc::new(RecordingActuator::default());
    let sensor = ScriptedSensor::new(RED).with_colors([BLACK, BLACK]);
    let report = player(&actuator, sensor)
        .play(
            timeline(events),
            PlaybackOptions::default().with_settings(fast_settings()),
        )
        .unwrap()
        .join()
        .unwrap();

    assert!(report.completed());
    assert_eq!(actuator.click_count(), 1);
}

fn branch_timeline() -> Arc<ActionTimeline> {
    let mut events = vec![RawEvent::logic(
        0.0,
        LogicEvent::IfColorMatch {
            x: 1,
            y: 1,
            target_color: RED,
        },
    )];
    events.extend(key_press(0.05, "a"));
    events.push(RawEvent::logic(0.1, LogicEvent::IfColorElse));
    events.extend(key_press(0.15, "b"));
    events.push(RawEvent::logic(0.2, LogicEvent::IfColorEnd));
    timeline(events)
}

fn pressed_keys(actuator: &RecordingActuator) -> Vec<String> {
    actuator
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            ActuatorCall::KeyDown(key) => Some(key),
            _ => None,
        })
        .collect()
}

#[test]
fn test_if_color_takes_true_branch() {
    let actuator = Arc::new(RecordingActuator::default());
    let report = player(&actuator, ScriptedSensor::new(RED))
        .play(branch_timeline(), PlaybackOptions::default())
        .unwrap()
        .join()
        .unwrap();
    assert!(report.completed());
    assert_eq!(pressed_keys(&actuator), vec!["a".to_string()]);
}

#[test]
fn test_if_color_takes_else_branch() {
    let actuator = Arc::new(RecordingActuator::default());
    let report = player(&actuator, ScriptedSensor::new(BLACK))
        .play(branch_timeline(), PlaybackOptions::default())
        .unwrap()
        .join()
        .unwrap();
    assert!(report.completed());
    assert_eq!(pressed_keys(&actuator), vec!["b".to_string()]);
}

#[test]
fn test_emergency_keys_stop_playback() {
    let (sender, receiver) = unbounded();
    let actuator = Arc::new(RecordingActuator::default());
    let player = player(&actuator, ScriptedSensor::new(BLACK)).with_input_feed(receiver);
    let handle = player
        .play(timeline(vec![RawEvent::wheel(5.0, 1.0)]), PlaybackOptions::default())
        .unwrap();

    // Let the listener start; earlier events are discarded.
    thread::sleep(Duration::from_millis(200));
    for t in [10.0, 10.1, 10.2] {
        sender.send(RawEvent::key_down(t, "esc")).unwrap();
    }

    let report = handle.join().unwrap();
    assert_eq!(report.stop_reason(), Some(StopReason::EmergencyStop));
}

#[test]
fn test_highlight_cleared_and_finish_reported_once() {
    let mut events = click_at(0.0, (1, 1));
    events.extend(key_press(0.05, "enter"));

    let actuator = Arc::new(RecordingActuator::default());
    let (listener, receiver) = ChannelListener::new();
    let report = player(&actuator, ScriptedSensor::new(BLACK))
        .with_listener(Arc::new(listener))
        .play(timeline(events), PlaybackOptions::default())
        .unwrap()
        .join()
        .unwrap();

    let events: Vec<PlaybackEvent> = receiver.try_iter().collect();
    let highlights: Vec<Option<usize>> = events
        .iter()
        .filter_map(|event| match event {
            PlaybackEvent::Highlight(index) => Some(*index),
            _ => None,
        })
        .collect();
    assert_eq!(highlights, vec![Some(0), Some(1), None]);

    let finished: Vec<&PlaybackEvent> = events
        .iter()
        .filter(|event| matches!(event, PlaybackEvent::Finished(_)))
        .collect();
    assert_eq!(finished.len(), 1);
    assert_eq!(events.last(), Some(&PlaybackEvent::Finished(report)));
}

#[test]
fn test_relative_mode_projects_from_pointer() {
    let events = click_at(0.0, (110, 110));
    let timeline = Arc::new(ActionTimeline::from_events(
        events,
        CoordinateMode::Relative { origin: (100, 100) },
    ));

    let actuator = Arc::new(RecordingActuator::new((500, 500)));
    player(&actuator, ScriptedSensor::new(BLACK))
        .play(timeline, PlaybackOptions::default())
        .unwrap()
        .join()
        .unwrap();

    assert_eq!(
        actuator.calls(),
        vec![
            ActuatorCall::Move((510, 510)),
            ActuatorCall::Click(MouseButton::Left)
        ]
    );
}

#[test]
fn test_call_macro_plays_nested_document() {
    let dir = tempfile::tempdir().unwrap();
    let nested_path = dir.path().join("nested.json");
    let nested = ActionTimeline::from_events(click_at(0.0, (7, 7)), CoordinateMode::Absolute);
    MacroDocument::from_timeline(&nested, false)
        .save(&nested_path)
        .unwrap();

    let mut events = key_press(0.0, "a");
    events.push(RawEvent::logic(
        0.05,
        LogicEvent::CallMacro { path: nested_path },
    ));
    events.extend(key_press(0.1, "b"));

    let actuator = Arc::new(RecordingActuator::default());
    let player = player(&actuator, ScriptedSensor::new(BLACK));
    let report = player
        .play(timeline(events), PlaybackOptions::default())
        .unwrap()
        .join()
        .unwrap();

    assert!(report.completed());
    assert_eq!(actuator.click_count(), 1);
    assert_eq!(pressed_keys(&actuator), vec!["a".to_string(), "b".to_string()]);
    assert_eq!(player.stats().snapshot().nested_calls, 1);
}

#[test]
fn test_missing_nested_macro_is_a_fault() {
    let events = vec![RawEvent::logic(
        0.0,
        LogicEvent::CallMacro {
            path: "/nonexistent/input-replay/missing.json".into(),
        },
    )];

    let actuator = Arc::new(RecordingActuator::default());
    let report = player(&actuator, ScriptedSensor::new(BLACK))
        .play(timeline(events), PlaybackOptions::default())
        .unwrap()
        .join()
        .unwrap();
    assert_eq!(report.stop_reason(), Some(StopReason::Fault));
}

/// Time of the first recorded call matching `pred`.
fn first_call_at(
    actuator: &RecordingActuator,
    pred: impl Fn(&ActuatorCall) -> bool,
) -> Duration {
    actuator
        .timed_calls()
        .into_iter()
        .find(|(_, call)| pred(call))
        .map(|(at, _)| at)
        .expect("call was issued")
}

fn wait_color(x: i32, y: i32, timeout: f64, post_delay: f64) -> RawEvent {
    RawEvent::logic(
        0.0,
        LogicEvent::WaitColor {
            x,
            y,
            target_color: RED,
            timeout,
            post_delay,
        },
    )
}

fn wait_sound(timeout: f64) -> RawEvent {
    RawEvent::logic(
        0.0,
        LogicEvent::WaitSound {
            threshold: 0.1,
            timeout,
            post_delay: 0.0,
        },
    )
}

#[test]
fn test_wait_color_moves_pointer_to_target() {
    let actuator = Arc::new(RecordingActuator::default());
    let report = player(&actuator, ScriptedSensor::new(RED))
        .play(
            timeline(vec![wait_color(77, 88, 1.0, 0.0)]),
            PlaybackOptions::default().with_settings(fast_settings()),
        )
        .unwrap()
        .join()
        .unwrap();

    assert!(report.completed());
    assert_eq!(actuator.calls(), vec![ActuatorCall::Move((77, 88))]);
}

#[test]
fn test_wait_sound_match_continues() {
    let mut events = vec![wait_sound(5.0)];
    events.extend(key_press(0.05, "a"));

    let actuator = Arc::new(RecordingActuator::default());
    let sensor = ScriptedSensor::new(BLACK).with_amplitudes([0.0, 0.02, 0.5], 0.0);
    let report = player(&actuator, sensor)
        .play(
            timeline(events),
            PlaybackOptions::default().with_settings(fast_settings()),
        )
        .unwrap()
        .join()
        .unwrap();

    assert!(report.completed());
    assert_eq!(pressed_keys(&actuator), vec!["a".to_string()]);
}

#[test]
fn test_wait_sound_timeout_stops_run() {
    let mut events = vec![wait_sound(0.2)];
    events.extend(key_press(0.05, "a"));

    let actuator = Arc::new(RecordingActuator::default());
    let report = player(&actuator, ScriptedSensor::new(BLACK))
        .play(
            timeline(events),
            PlaybackOptions::default().with_settings(fast_settings()),
        )
        .unwrap()
        .join()
        .unwrap();

    assert_eq!(report.stop_reason(), Some(StopReason::WaitTimeout));
    assert!(pressed_keys(&actuator).is_empty());
}

/// Silent until `loud_after`, then loud for exactly one sample.
struct SoundPulse {
    started: Instant,
    loud_after: Duration,
    heard: AtomicBool,
}

impl Sensor for SoundPulse {
    fn pixel_color(&self, _x: i32, _y: i32) -> Result<Rgb, BackendError> {
        Ok(BLACK)
    }

    fn audio_amplitude(&self) -> Result<f32, BackendError> {
        if self.started.elapsed() >= self.loud_after && !self.heard.swap(true, Ordering::SeqCst) {
            Ok(0.9)
        } else {
            Ok(0.0)
        }
    }
}

#[test]
fn test_sound_trigger_ignores_awaited_sound() {
    let mut events = vec![wait_sound(5.0)];
    events.extend(key_press(0.05, "a"));

    let sensor = SoundPulse {
        started: Instant::now(),
        loud_after: Duration::from_millis(150),
        heard: AtomicBool::new(false),
    };
    let actuator = Arc::new(RecordingActuator::default());
    let report = Player::new(actuator.clone(), Arc::new(sensor))
        .play(
            timeline(events),
            PlaybackOptions::default()
                .with_stop_on_sound(true)
                .with_settings(fast_settings()),
        )
        .unwrap()
        .join()
        .unwrap();

    assert!(report.completed(), "stopped: {:?}", report.stop_reason());
    assert_eq!(pressed_keys(&actuator), vec!["a".to_string()]);
}

#[test]
fn test_stop_on_sound_ends_run() {
    let actuator = Arc::new(RecordingActuator::default());
    let sensor = ScriptedSensor::new(BLACK).with_amplitudes([0.0, 0.0], 0.8);
    let started = Instant::now();
    let report = player(&actuator, sensor)
        .play(
            timeline(key_press(5.0, "a")),
            PlaybackOptions::default()
                .with_stop_on_sound(true)
                .with_settings(fast_settings()),
        )
        .unwrap()
        .join()
        .unwrap();

    assert_eq!(report.stop_reason(), Some(StopReason::SoundTrigger));
    assert!(started.elapsed() < Duration::from_secs(3));
    assert!(pressed_keys(&actuator).is_empty());
}

#[test]
fn test_long_wait_keeps_later_spacing() {
    // The wait spends 0.3 s; the click and key press stay 0.4 s apart.
    let mut events = vec![wait_color(1, 1, 5.0, 0.3)];
    events.extend(click_at(0.1, (1, 1)));
    events.extend(key_press(0.5, "a"));

    let actuator = Arc::new(RecordingActuator::default());
    let report = player(&actuator, ScriptedSensor::new(RED))
        .play(
            timeline(events),
            PlaybackOptions::default().with_settings(fast_settings()),
        )
        .unwrap()
        .join()
        .unwrap();
    assert!(report.completed());

    let click = first_call_at(&actuator, |call| matches!(call, ActuatorCall::Click(_)));
    let key = first_call_at(&actuator, |call| matches!(call, ActuatorCall::KeyDown(_)));
    assert!(click >= Duration::from_millis(350), "click fired at {click:?}");
    assert!(
        key - click >= Duration::from_millis(350),
        "click at {click:?}, key at {key:?}"
    );
}

#[test]
fn test_double_and_triple_clicks_use_high_level_calls() {
    let events = vec![
        RawEvent::button_down(0.0, MouseButton::Left, (5, 5)),
        RawEvent::button_up(0.05, MouseButton::Left, (5, 5)),
        RawEvent::button_double(0.1, MouseButton::Left, (5, 5)),
        RawEvent::button_up(0.15, MouseButton::Left, (5, 5)),
        RawEvent::button_down(1.0, MouseButton::Left, (9, 9)),
        RawEvent::button_up(1.05, MouseButton::Left, (9, 9)),
        RawEvent::button_double(1.1, MouseButton::Left, (9, 9)),
        RawEvent::button_up(1.15, MouseButton::Left, (9, 9)),
        RawEvent::button_double(1.2, MouseButton::Left, (9, 9)),
        RawEvent::button_up(1.25, MouseButton::Left, (9, 9)),
    ];

    let actuator = Arc::new(RecordingActuator::default());
    let report = player(&actuator, ScriptedSensor::new(BLACK))
        .play(timeline(events), PlaybackOptions::default().with_speed(4.0))
        .unwrap()
        .join()
        .unwrap();
    assert!(report.completed());

    assert_eq!(
        actuator.calls(),
        vec![
            ActuatorCall::Move((5, 5)),
            ActuatorCall::DoubleClick(MouseButton::Left),
            ActuatorCall::Move((9, 9)),
            ActuatorCall::DoubleClick(MouseButton::Left),
            ActuatorCall::Click(MouseButton::Left),
        ]
    );

    let timed = actuator.timed_calls();
    let gap = timed[4].0 - timed[3].0;
    assert!(gap >= Duration::from_millis(45), "triple click gap {gap:?}");
}

#[test]
fn test_drag_uses_recorded_path_and_duration() {
    let events = vec![
        RawEvent::button_down(0.0, MouseButton::Left, (0, 0)),
        RawEvent::pointer_move(0.1, 50, 0),
        RawEvent::pointer_move(0.2, 100, 40),
        RawEvent::button_up(0.4, MouseButton::Left, (100, 40)),
    ];

    let actuator = Arc::new(RecordingActuator::default());
    let report = player(&actuator, ScriptedSensor::new(BLACK))
        .play(timeline(events), PlaybackOptions::default().with_speed(2.0))
        .unwrap()
        .join()
        .unwrap();
    assert!(report.completed());

    assert_eq!(
        actuator.calls(),
        vec![
            ActuatorCall::Move((0, 0)),
            ActuatorCall::Drag {
                button: MouseButton::Left,
                from: (0, 0),
                to: (100, 40),
                duration: Duration::from_secs_f64(0.2),
            },
        ]
    );
}

#[test]
fn test_modifier_held_across_click_is_released_after_it() {
    let events = vec![
        RawEvent::key_down(0.0, "ctrl"),
        RawEvent::button_down(0.1, MouseButton::Left, (5, 5)),
        RawEvent::button_up(0.15, MouseButton::Left, (5, 5)),
        RawEvent::key_up(0.25, "ctrl"),
    ];

    let actuator = Arc::new(RecordingActuator::default());
    let report = player(&actuator, ScriptedSensor::new(BLACK))
        .play(timeline(events), PlaybackOptions::default())
        .unwrap()
        .join()
        .unwrap();
    assert!(report.completed());

    assert_eq!(
        actuator.calls(),
        vec![
            ActuatorCall::KeyDown("ctrl".to_string()),
            ActuatorCall::Move((5, 5)),
            ActuatorCall::Click(MouseButton::Left),
            ActuatorCall::KeyUp("ctrl".to_string()),
        ]
    );
}
