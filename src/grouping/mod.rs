//! Event grouping: raw input records become semantic actions.

pub mod action;
pub mod engine;

pub use action::{ActionKind, Details, GroupedAction};
pub use engine::{
    group, EventGrouper, GroupingConfig, GroupingOutcome, Orphan, OrphanReason,
    DOUBLE_CLICK_TIME, DRAG_THRESHOLD_SQUARED, HUMAN_PAUSE_THRESHOLD,
};
