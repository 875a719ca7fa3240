//! Playback of action timelines.
//!
//! A [`Player`] runs one timeline at a time on a worker thread, driving an
//! [`Actuator`] and sampling a [`Sensor`]. Progress is reported through a
//! [`PlaybackListener`]; the run can be stopped through its handle, the
//! emergency key pattern or the sound trigger.

pub mod backend;
pub mod context;
pub mod listener;
pub mod scheduler;
pub mod signal;

pub use backend::{
    Actuator, ActuatorCall, BackendError, DocumentLoader, MacroLoader, RecordingActuator,
    ScriptedSensor, Sensor,
};
pub use context::{LoopFrame, PlaybackContext, PlaybackOptions, PlaybackSettings};
pub use listener::{
    ChannelListener, NullListener, PlaybackEvent, PlaybackListener, PlaybackOutcome,
    PlaybackReport,
};
pub use scheduler::{PlaybackError, PlaybackHandle, Player};
pub use signal::{SharedStopSignal, StopReason, StopSignal};
