//! Safety monitors that run beside playback and can stop it.

pub mod emergency;
pub mod sound;

pub use emergency::{EmergencyStopDetector, EmergencyStopListener};
pub use sound::SoundTriggerMonitor;
