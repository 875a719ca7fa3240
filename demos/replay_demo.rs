//! Demonstration of grouping and dry-run playback.
//!
//! This example shows how to:
//! 1. Build a recording from raw events
//! 2. Group it into actions and inspect the summary
//! 3. Wrap part of it in a loop
//! 4. Play it against the recording actuator and follow progress
//!
//! Run with: cargo run --example replay_demo

use std::sync::Arc;

use input_replay::{
    event::{MouseButton, RawEvent, Rgb},
    playback::{
        ChannelListener, PlaybackEvent, PlaybackOptions, Player, RecordingActuator,
        ScriptedSensor,
    },
    timeline::{compute_summary, ActionTimeline, CoordinateMode},
};

fn main() {
    println!("input-replay - Replay Demo");
    println!("==========================");
    println!();

    let events = vec![
        RawEvent::pointer_move(0.0, 100, 100),
        RawEvent::pointer_move(0.1, 140, 120),
        RawEvent::button_down(0.6, MouseButton::Left, (140, 120)),
        RawEvent::button_up(0.65, MouseButton::Left, (140, 120)),
        RawEvent::key_down(1.0, "h"),
        RawEvent::key_up(1.05, "h"),
        RawEvent::key_down(1.1, "i"),
        RawEvent::key_up(1.15, "i"),
        RawEvent::key_down(1.6, "ctrl"),
        RawEvent::key_down(1.65, "s"),
        RawEvent::key_up(1.7, "s"),
        RawEvent::key_up(1.75, "ctrl"),
    ];

    let mut timeline = ActionTimeline::from_events(events, CoordinateMode::Absolute);
    println!("Grouped {} raw events into {} actions:", timeline.events().len(), timeline.len());
    for (i, action) in timeline.actions().iter().enumerate() {
        println!("  {i}: {} ({:.2}s)", action.label, action.start_time);
    }
    println!();

    // Repeat the click and the typing twice.
    if let Err(e) = timeline.wrap_in_loop(1, 2, 2) {
        eprintln!("Could not add loop: {e}");
        return;
    }
    println!("{}", compute_summary(&timeline).report());
    println!();

    let actuator = Arc::new(RecordingActuator::default());
    let sensor = Arc::new(ScriptedSensor::new(Rgb::new(0, 0, 0)));
    let (listener, progress) = ChannelListener::new();
    let player = Player::new(actuator.clone(), sensor).with_listener(Arc::new(listener));

    let handle = match player.play(Arc::new(timeline), PlaybackOptions::default().with_speed(2.0)) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("Failed to start playback: {e}");
            return;
        }
    };

    for event in progress.iter() {
        match event {
            PlaybackEvent::Log(message) => println!("  [log] {message}"),
            PlaybackEvent::Highlight(Some(index)) => println!("  [run] action {index}"),
            PlaybackEvent::Highlight(None) => {}
            PlaybackEvent::Finished(report) => {
                println!();
                println!("Finished: {:?}", report.outcome);
                break;
            }
        }
    }
    let _ = handle.join();

    println!();
    println!("Recorded actuator calls:");
    for (at, call) in actuator.timed_calls() {
        println!("  {:>6}ms  {call:?}", at.as_millis());
    }
}
