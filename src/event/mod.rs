//! Raw event data model.
//!
//! Events arrive from the capture layer already cleaned of hotkey noise and
//! duplicate button-up records; this module only describes them.

pub mod logic;
pub mod types;

// Re-export commonly used types
pub use logic::LogicEvent;
pub use types::{
    is_modifier, Annotations, AutoWait, EventPayload, MouseButton, Point, RawEvent, Rgb,
    AUTO_WAIT_KEY, MODIFIER_KEYS, REMARKS_KEY,
};
