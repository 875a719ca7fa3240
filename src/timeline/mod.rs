//! Action timeline: the raw event list, its grouped actions and the resolved
//! control flow, owned together so edits can re-group consistently.

pub mod control_flow;
pub mod document;
pub mod edit;
pub mod summary;

pub use control_flow::{ControlFlow, Jump};
pub use document::{DocumentError, MacroDocument};
pub use edit::{EditError, ImportMode};
pub use summary::{compute_summary, TimelineSummary};

use crate::event::{Point, RawEvent};
use crate::grouping::{EventGrouper, GroupedAction, GroupingConfig, Orphan};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

/// How recorded pointer coordinates are interpreted on replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum CoordinateMode {
    /// Replay at the recorded screen coordinates
    #[default]
    Absolute,
    /// Replay relative to the pointer position at the start of each repeat
    Relative { origin: Point },
}

impl CoordinateMode {
    /// Map a recorded point onto the screen given the pointer position
    /// captured when the current repeat started.
    pub fn project(&self, point: Point, pointer_origin: Point) -> Point {
        match self {
            CoordinateMode::Absolute => point,
            CoordinateMode::Relative { origin } => (
                pointer_origin.0 + (point.0 - origin.0),
                pointer_origin.1 + (point.1 - origin.1),
            ),
        }
    }

    pub fn is_relative(&self) -> bool {
        matches!(self, CoordinateMode::Relative { .. })
    }
}

/// Which raw events are covered by actions, and where coverage breaks down.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Coverage {
    pub covered: BTreeSet<usize>,
    /// Indices owned by no action
    pub uncovered: Vec<usize>,
    /// Indices claimed by more than one action
    pub overlapping: Vec<usize>,
    /// Indices that point past the end of the event list
    pub out_of_range: Vec<usize>,
}

impl Coverage {
    /// No index is shared between actions or out of range.
    pub fn is_consistent(&self) -> bool {
        self.overlapping.is_empty() && self.out_of_range.is_empty()
    }
}

/// A recording plus its grouped, control-flow-resolved action list.
///
/// The action list is derived data: every structural edit re-groups from the
/// raw events. During playback the timeline is shared read-only.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionTimeline {
    events: Vec<RawEvent>,
    actions: Vec<GroupedAction>,
    orphans: Vec<Orphan>,
    mode: CoordinateMode,
    flow: ControlFlow,
    grouping: GroupingConfig,
}

impl Default for ActionTimeline {
    fn default() -> Self {
        Self::from_events(Vec::new(), CoordinateMode::Absolute)
    }
}

impl ActionTimeline {
    /// Group `events` with the default thresholds.
    pub fn from_events(events: Vec<RawEvent>, mode: CoordinateMode) -> Self {
        Self::with_grouping(events, mode, GroupingConfig::default())
    }

    /// Group `events` with the given thresholds.
    pub fn with_grouping(events: Vec<RawEvent>, mode: CoordinateMode, grouping: GroupingConfig) -> Self {
        let mut timeline = Self {
            events,
            actions: Vec::new(),
            orphans: Vec::new(),
            mode,
            flow: ControlFlow::default(),
            grouping,
        };
        timeline.regroup();
        timeline
    }

    /// Build from an action list grouped elsewhere (e.g. loaded from disk).
    pub fn from_parts(
        events: Vec<RawEvent>,
        mut actions: Vec<GroupedAction>,
        mode: CoordinateMode,
        grouping: GroupingConfig,
    ) -> Self {
        let flow = ControlFlow::resolve(&mut actions);
        Self {
            events,
            actions,
            orphans: Vec::new(),
            mode,
            flow,
            grouping,
        }
    }

    /// Discard the action list and group the raw events again.
    pub fn regroup(&mut self) {
        let outcome = EventGrouper::new(self.grouping.clone()).group_with_report(&self.events);
        self.actions = outcome.actions;
        self.orphans = outcome.orphans;
        self.flow = ControlFlow::resolve(&mut self.actions);
        debug!(
            "Grouped {} events into {} actions ({} orphans)",
            self.events.len(),
            self.actions.len(),
            self.orphans.len()
        );
    }

    pub fn events(&self) -> &[RawEvent] {
        &self.events
    }

    pub fn actions(&self) -> &[GroupedAction] {
        &self.actions
    }

    pub fn action(&self, index: usize) -> Option<&GroupedAction> {
        self.actions.get(index)
    }

    /// Events dropped by the last grouping pass.
    pub fn orphans(&self) -> &[Orphan] {
        &self.orphans
    }

    pub fn mode(&self) -> CoordinateMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: CoordinateMode) {
        self.mode = mode;
    }

    pub fn control_flow(&self) -> &ControlFlow {
        &self.flow
    }

    pub fn grouping(&self) -> &GroupingConfig {
        &self.grouping
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Recorded span from the first to the last raw event, in seconds.
    pub fn duration(&self) -> f64 {
        match (self.events.first(), self.events.last()) {
            (Some(first), Some(last)) => (last.time - first.time).max(0.0),
            _ => 0.0,
        }
    }

    /// Check how the action list covers the raw events.
    pub fn coverage(&self) -> Coverage {
        check_coverage(&self.actions, self.events.len())
    }

    pub(crate) fn events_mut(&mut self) -> &mut Vec<RawEvent> {
        &mut self.events
    }

    pub(crate) fn replace_events(&mut self, events: Vec<RawEvent>) {
        self.events = events;
    }
}

/// Compute coverage of `event_count` raw events by `actions`.
pub fn check_coverage(actions: &[GroupedAction], event_count: usize) -> Coverage {
    let mut coverage = Coverage::default();
    for action in actions {
        for &index in &action.event_indices {
            if index >= event_count {
                coverage.out_of_range.push(index);
            } else if !coverage.covered.insert(index) {
                coverage.overlapping.push(index);
            }
        }
    }
    coverage.uncovered = (0..event_count)
        .filter(|index| !coverage.covered.contains(index))
        .collect();
    coverage
}
