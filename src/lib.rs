//! input-replay - grouping and playback of recorded input macros.
//!
//! A recording is a flat list of raw keyboard, pointer and logic events. The
//! grouping engine turns it into semantic actions (clicks, drags, shortcuts,
//! typing, control-flow markers) and the playback scheduler replays those
//! actions with their recorded timing.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         input-replay                          │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐         │
//! │  │  RawEvents  │──▶│  Grouping   │──▶│  Timeline   │         │
//! │  │ (document)  │   │  (engine)   │   │ (+ control  │         │
//! │  └─────────────┘   └─────────────┘   │    flow)    │         │
//! │                                      └──────┬──────┘         │
//! │                                             ▼                │
//! │  ┌─────────────┐   stop signal      ┌─────────────┐          │
//! │  │  Monitors   │──────────────────▶ │  Playback   │──▶ Actuator
//! │  │ (esc, sound)│                    │  (worker)   │◀── Sensor │
//! │  └─────────────┘                    └─────────────┘          │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use input_replay::event::{MouseButton, RawEvent, Rgb};
//! use input_replay::playback::{PlaybackOptions, Player, RecordingActuator, ScriptedSensor};
//! use input_replay::timeline::{ActionTimeline, CoordinateMode};
//! use std::sync::Arc;
//!
//! let timeline = ActionTimeline::from_events(
//!     vec![
//!         RawEvent::button_down(0.0, MouseButton::Left, (100, 200)),
//!         RawEvent::button_up(0.05, MouseButton::Left, (100, 200)),
//!     ],
//!     CoordinateMode::Absolute,
//! );
//!
//! let player = Player::new(
//!     Arc::new(RecordingActuator::default()),
//!     Arc::new(ScriptedSensor::new(Rgb::new(0, 0, 0))),
//! );
//! let handle = player
//!     .play(Arc::new(timeline), PlaybackOptions::default())
//!     .expect("playback should start");
//! let report = handle.join();
//! ```

pub mod config;
pub mod event;
pub mod grouping;
pub mod monitor;
pub mod playback;
pub mod stats;
pub mod timeline;

// Re-export key types at crate root for convenience
pub use config::{Config, ConfigError};
pub use event::{EventPayload, LogicEvent, MouseButton, RawEvent, Rgb};
pub use grouping::{group, ActionKind, EventGrouper, GroupedAction, GroupingConfig};
pub use playback::{
    PlaybackError, PlaybackHandle, PlaybackListener, PlaybackOptions, PlaybackReport, Player,
    StopReason,
};
pub use stats::{PlaybackStats, SharedPlaybackStats};
pub use timeline::{ActionTimeline, CoordinateMode, MacroDocument};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
