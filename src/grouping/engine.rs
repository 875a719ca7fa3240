//! Streaming classifier that turns a raw event list into grouped actions.
//!
//! A single left-to-right pass drives a small state machine (idle, button held,
//! keyboard run, move/wheel sequence). Events accumulate in a buffer until the
//! state decides the unit is complete or is interrupted; the buffer is then
//! classified and finalized. An idle gap longer than the human pause threshold
//! always closes the current buffer.

use crate::event::{is_modifier, AutoWait, EventPayload, MouseButton, Point, RawEvent};
use crate::grouping::action::{ActionKind, GroupedAction};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, trace, warn};

/// Idle gap (seconds) beyond which the current buffer is force-finalized.
pub const HUMAN_PAUSE_THRESHOLD: f64 = 0.3;

/// Maximum gap (seconds) between a click and a following double event for them to merge.
pub const DOUBLE_CLICK_TIME: f64 = 0.3;

/// Squared pixel distance separating a drag from a click (10px).
pub const DRAG_THRESHOLD_SQUARED: f64 = 100.0;

/// Thresholds used by the grouping pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupingConfig {
    /// Idle gap in seconds that closes the current buffer
    pub human_pause_threshold: f64,
    /// Maximum click-to-double gap in seconds
    pub double_click_time: f64,
    /// Squared movement distance in pixels above which a press is a drag
    pub drag_threshold_squared: f64,
}

impl Default for GroupingConfig {
    fn default() -> Self {
        Self {
            human_pause_threshold: HUMAN_PAUSE_THRESHOLD,
            double_click_time: DOUBLE_CLICK_TIME,
            drag_threshold_squared: DRAG_THRESHOLD_SQUARED,
        }
    }
}

/// Why a raw event was dropped instead of becoming part of an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrphanReason {
    /// Key release with no open press
    UnmatchedKeyUp,
    /// Button release with no open press
    UnmatchedButtonUp,
    /// Button press that was never released
    UnmatchedButtonDown,
}

/// A raw event that was intentionally not materialized as an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Orphan {
    pub index: usize,
    pub reason: OrphanReason,
}

/// Actions plus the enumerable set of dropped events.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupingOutcome {
    pub actions: Vec<GroupedAction>,
    pub orphans: Vec<Orphan>,
}

/// Group events with the default thresholds.
pub fn group(events: &[RawEvent]) -> Vec<GroupedAction> {
    EventGrouper::default().group(events)
}

/// Grouping engine. Stateless between calls, so one instance can be shared freely.
#[derive(Debug, Clone, Default)]
pub struct EventGrouper {
    config: GroupingConfig,
}

impl EventGrouper {
    pub fn new(config: GroupingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GroupingConfig {
        &self.config
    }

    /// Group events into actions, sorted by the first raw index each covers.
    pub fn group(&self, events: &[RawEvent]) -> Vec<GroupedAction> {
        self.group_with_report(events).actions
    }

    /// Group events and also report which events were dropped as orphans.
    pub fn group_with_report(&self, events: &[RawEvent]) -> GroupingOutcome {
        if events.is_empty() {
            return GroupingOutcome::default();
        }
        GroupingPass::new(&self.config, events).run()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum SequenceKind {
    Move,
    Wheel { upward: bool },
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum State {
    Idle,
    MouseDown {
        button: MouseButton,
        origin: Option<Point>,
        last_position: Option<Point>,
        max_distance_sq: f64,
    },
    KeyDown,
    Sequence(SequenceKind),
}

/// A finalized action and the raw index it sorts by.
struct Entry {
    action: GroupedAction,
    sort_key: usize,
}

struct GroupingPass<'a> {
    config: &'a GroupingConfig,
    events: &'a [RawEvent],
    state: State,
    buffer: Vec<usize>,
    entries: Vec<Entry>,
    orphans: Vec<Orphan>,
    /// Keys pressed in an already finalized action whose release has not been seen
    held_keys: HashMap<String, usize>,
    /// Entries made of a single key press still waiting for its release
    lone_presses: BTreeSet<usize>,
}

impl<'a> GroupingPass<'a> {
    fn new(config: &'a GroupingConfig, events: &'a [RawEvent]) -> Self {
        Self {
            config,
            events,
            state: State::Idle,
            buffer: Vec::new(),
            entries: Vec::new(),
            orphans: Vec::new(),
            held_keys: HashMap::new(),
            lone_presses: BTreeSet::new(),
        }
    }

    fn run(mut self) -> GroupingOutcome {
        let mut index = 0;
        while index < self.events.len() {
            index = self.step(index);
        }
        self.flush();
        self.finish()
    }

    /// Process the event at `index`; returns the next index to process.
    fn step(&mut self, index: usize) -> usize {
        let events = self.events;
        let event = &events[index];

        if let Some(logic) = event.logic_event() {
            self.flush();
            let action = GroupedAction::new(ActionKind::from_logic(logic), event.time, event.time)
                .with_indices([index]);
            self.push(action, index);
            return index + 1;
        }

        if let Some(&last) = self.buffer.last() {
            let gap = event.time - events[last].time;
            if gap > self.config.human_pause_threshold {
                trace!("Pause of {gap:.3}s before event {index}, closing buffer");
                self.flush();
            }
        }

        if let EventPayload::KeyUp { key } = &event.payload {
            if !self.key_open_in_buffer(key) && self.absorb_key_up(key, index) {
                return index + 1;
            }
        }

        match self.state {
            State::Idle => self.start(index),
            State::MouseDown { .. } => self.step_mouse_down(index),
            State::KeyDown => self.step_key_down(index),
            State::Sequence(kind) => self.step_sequence(index, kind),
        }
    }

    /// Open a new unit from the idle state.
    fn start(&mut self, index: usize) -> usize {
        debug_assert!(self.buffer.is_empty());
        let events = self.events;
        let event = &events[index];

        match &event.payload {
            EventPayload::ButtonDouble { button } => return self.start_double(index, *button),
            EventPayload::ButtonDown { button } => {
                self.buffer.push(index);
                self.state = State::MouseDown {
                    button: *button,
                    origin: event.captured_position,
                    last_position: event.captured_position,
                    max_distance_sq: 0.0,
                };
            }
            EventPayload::KeyDown { .. } => {
                self.buffer.push(index);
                self.state = State::KeyDown;
            }
            EventPayload::PointerMove { .. } => {
                self.buffer.push(index);
                self.state = State::Sequence(SequenceKind::Move);
            }
            EventPayload::Wheel { delta } => {
                self.buffer.push(index);
                self.state = State::Sequence(SequenceKind::Wheel {
                    upward: *delta > 0.0,
                });
            }
            EventPayload::KeyUp { .. } => self.orphan(index, OrphanReason::UnmatchedKeyUp),
            EventPayload::ButtonUp { .. } => self.orphan(index, OrphanReason::UnmatchedButtonUp),
            EventPayload::Logic { logic } => {
                let action = GroupedAction::new(ActionKind::from_logic(logic), event.time, event.time)
                    .with_indices([index]);
                self.push(action, index);
            }
            EventPayload::Unrecognized { .. } => self.push_unprocessed(index),
        }
        index + 1
    }

    /// A double event either upgrades the preceding click in place or stands alone.
    fn start_double(&mut self, index: usize, button: MouseButton) -> usize {
        let events = self.events;
        let event = &events[index];

        let trailing_up = events.get(index + 1).and_then(|next| match next.payload {
            EventPayload::ButtonUp { button: b }
                if b == button && next.time - event.time <= self.config.human_pause_threshold =>
            {
                Some(index + 1)
            }
            _ => None,
        });
        let end_time = trailing_up.map_or(event.time, |up| events[up].time);
        let next_index = trailing_up.map_or(index + 1, |up| up + 1);

        if let Some(entry) = self.entries.last_mut() {
            let upgraded = match entry.action.kind {
                ActionKind::MouseClick { button: b } if b == button => {
                    Some(ActionKind::MouseDoubleClick { button })
                }
                ActionKind::MouseDoubleClick { button: b } if b == button => {
                    Some(ActionKind::MouseTripleClick { button })
                }
                _ => None,
            };
            if let Some(kind) = upgraded {
                if event.time - entry.action.end_time <= self.config.double_click_time {
                    debug!("Merging double event {index} into preceding {}", entry.action.label);
                    entry.action.set_kind(kind);
                    entry.action.event_indices.insert(index);
                    entry.action.event_indices.extend(trailing_up);
                    entry.action.end_time = entry.action.end_time.max(end_time);
                    if event.auto_wait().is_some() {
                        warn!("Discarding auto-wait on event {index}: merged into an earlier click");
                    }
                    return next_index;
                }
            }
        }

        self.emit_auto_wait(index);
        let mut action = GroupedAction::new(
            ActionKind::MouseDoubleClick { button },
            event.time,
            end_time,
        )
        .with_indices(std::iter::once(index).chain(trailing_up));
        if let Some((x, y)) = event.captured_position {
            action = action
                .with_detail("x", serde_json::json!(x))
                .with_detail("y", serde_json::json!(y));
        }
        self.push(action, index);
        next_index
    }

    fn step_mouse_down(&mut self, index: usize) -> usize {
        let State::MouseDown {
            button,
            origin,
            max_distance_sq,
            ..
        } = self.state
        else {
            return self.start(index);
        };
        let event = &self.events[index];

        match event.payload {
            EventPayload::PointerMove { x, y } => {
                let origin = origin.unwrap_or((x, y));
                let dx = f64::from(x - origin.0);
                let dy = f64::from(y - origin.1);
                self.buffer.push(index);
                self.state = State::MouseDown {
                    button,
                    origin: Some(origin),
                    last_position: Some((x, y)),
                    max_distance_sq: max_distance_sq.max(dx * dx + dy * dy),
                };
                index + 1
            }
            EventPayload::ButtonUp { button: b } if b == button => {
                self.buffer.push(index);
                self.flush();
                index + 1
            }
            _ => {
                self.flush();
                self.start(index)
            }
        }
    }

    fn step_key_down(&mut self, index: usize) -> usize {
        let event = &self.events[index];
        match &event.payload {
            EventPayload::KeyDown { key } => {
                // Any press after a regular key closes the unit: a second regular key
                // starts a new one, a modifier after a regular key starts a new chord.
                if self.buffer_has_regular_press() {
                    trace!("Splitting keyboard run before '{key}' at event {index}");
                    self.flush();
                    return self.start(index);
                }
                self.buffer.push(index);
                index + 1
            }
            EventPayload::KeyUp { key } => {
                if self.key_open_in_buffer(key) {
                    self.buffer.push(index);
                } else {
                    self.orphan(index, OrphanReason::UnmatchedKeyUp);
                }
                index + 1
            }
            _ => {
                self.flush();
                self.start(index)
            }
        }
    }

    fn step_sequence(&mut self, index: usize, kind: SequenceKind) -> usize {
        let event = &self.events[index];
        let continues = match (kind, &event.payload) {
            (SequenceKind::Move, EventPayload::PointerMove { .. }) => true,
            (SequenceKind::Wheel { upward }, EventPayload::Wheel { delta }) => {
                (*delta > 0.0) == upward
            }
            _ => false,
        };
        if continues {
            self.buffer.push(index);
            index + 1
        } else {
            self.flush();
            self.start(index)
        }
    }

    /// Classify and finalize whatever is buffered, returning to idle.
    fn flush(&mut self) {
        let state = std::mem::replace(&mut self.state, State::Idle);
        if self.buffer.is_empty() {
            return;
        }
        let buffer = std::mem::take(&mut self.buffer);

        match state {
            State::Idle => {
                for index in buffer {
                    self.push_unprocessed(index);
                }
            }
            State::MouseDown {
                button,
                origin,
                last_position,
                max_distance_sq,
            } => self.finish_press(&buffer, button, origin, last_position, max_distance_sq),
            State::KeyDown => self.finish_keys(&buffer),
            State::Sequence(kind) => self.finish_sequence(&buffer, kind),
        }
    }

    fn finish_press(
        &mut self,
        buffer: &[usize],
        button: MouseButton,
        origin: Option<Point>,
        last_position: Option<Point>,
        max_distance_sq: f64,
    ) {
        let events = self.events;
        let down = buffer[0];
        let released = buffer.len() > 1
            && buffer.last().is_some_and(|&last| {
                matches!(events[last].payload, EventPayload::ButtonUp { button: b } if b == button)
            });

        if !released {
            self.orphan(down, OrphanReason::UnmatchedButtonDown);
            if buffer.len() > 1 {
                self.finish_sequence(&buffer[1..], SequenceKind::Move);
            }
            return;
        }

        let up = buffer[buffer.len() - 1];
        self.emit_auto_wait(down);

        let is_drag = max_distance_sq > self.config.drag_threshold_squared;
        let kind = if is_drag {
            ActionKind::MouseDrag { button }
        } else {
            ActionKind::MouseClick { button }
        };
        let mut action = GroupedAction::new(kind, events[down].time, events[up].time)
            .with_indices(buffer.iter().copied());

        let start = events[down].captured_position.or(origin);
        if let Some((x, y)) = start {
            action = action
                .with_detail("x", serde_json::json!(x))
                .with_detail("y", serde_json::json!(y));
        }
        if is_drag {
            if let Some((x, y)) = events[up].captured_position.or(last_position) {
                action = action
                    .with_detail("end_x", serde_json::json!(x))
                    .with_detail("end_y", serde_json::json!(y));
            }
        }
        self.push(action, down);
    }

    fn finish_keys(&mut self, buffer: &[usize]) {
        let events = self.events;
        let mut modifiers: Vec<String> = Vec::new();
        let mut keys: Vec<String> = Vec::new();
        let mut open: Vec<String> = Vec::new();

        for &index in buffer {
            match &events[index].payload {
                EventPayload::KeyDown { key } => {
                    let bucket = if is_modifier(key) {
                        &mut modifiers
                    } else {
                        &mut keys
                    };
                    if !bucket.contains(key) {
                        bucket.push(key.clone());
                    }
                    open.push(key.clone());
                }
                EventPayload::KeyUp { key } => {
                    if let Some(position) = open.iter().position(|k| k == key) {
                        open.remove(position);
                    }
                }
                _ => {}
            }
        }

        let first = buffer[0];
        let last = buffer[buffer.len() - 1];
        let start_time = events[first].time;
        let end_time = events[last].time;

        let kind = match (modifiers.len(), keys.len()) {
            (0, 1) => ActionKind::KeyPress {
                key: keys[0].clone(),
            },
            (0, _) => ActionKind::Typing {
                text: keys.iter().map(|k| typed_text(k)).collect(),
            },
            (1, 0) => ActionKind::KeyPress {
                key: modifiers[0].clone(),
            },
            // A chord of modifiers alone: the last one pressed acts as the key.
            (_, 0) => {
                let keys: Vec<String> = modifiers.pop().into_iter().collect();
                ActionKind::Shortcut { modifiers, keys }
            }
            _ => ActionKind::Shortcut { modifiers, keys },
        };

        let position = match self.coalesce_typing(&kind, buffer, start_time, end_time) {
            Some(position) => position,
            None => {
                let keys_detail = match &kind {
                    ActionKind::KeyPress { key } if !is_modifier(key) => {
                        Some(serde_json::json!([key]))
                    }
                    _ => None,
                };
                let mut action =
                    GroupedAction::new(kind, start_time, end_time).with_indices(buffer.iter().copied());
                if let Some(keys) = keys_detail {
                    action = action.with_detail("keys", keys);
                }
                let position = self.push(action, first);
                if buffer.len() == 1 {
                    self.lone_presses.insert(position);
                }
                position
            }
        };

        for key in open {
            self.held_keys.insert(key, position);
        }
    }

    /// Fold a plain key press into an immediately preceding press or typing run.
    fn coalesce_typing(
        &mut self,
        kind: &ActionKind,
        buffer: &[usize],
        start_time: f64,
        end_time: f64,
    ) -> Option<usize> {
        let ActionKind::KeyPress { key } = kind else {
            return None;
        };
        if is_modifier(key) {
            return None;
        }
        let position = self.entries.len().checked_sub(1)?;
        let previous = &mut self.entries[position].action;
        if start_time - previous.end_time > self.config.human_pause_threshold {
            return None;
        }
        let mut text = match &previous.kind {
            ActionKind::KeyPress { key: prev } if !is_modifier(prev) => typed_text(prev),
            ActionKind::Typing { text } => text.clone(),
            _ => return None,
        };
        text.push_str(&typed_text(key));

        previous.set_kind(ActionKind::Typing { text });
        previous.event_indices.extend(buffer.iter().copied());
        previous.end_time = previous.end_time.max(end_time);
        if let Some(serde_json::Value::Array(list)) = previous.details.get_mut("keys") {
            list.push(serde_json::json!(key));
        }
        self.lone_presses.remove(&position);
        Some(position)
    }

    fn finish_sequence(&mut self, buffer: &[usize], kind: SequenceKind) {
        let events = self.events;
        let first = buffer[0];
        let last = buffer[buffer.len() - 1];
        let action = match kind {
            SequenceKind::Move => {
                let mut action = GroupedAction::new(
                    ActionKind::MouseMove,
                    events[first].time,
                    events[last].time,
                )
                .with_indices(buffer.iter().copied())
                .with_detail("count", serde_json::json!(buffer.len()));
                if let Some((x, y)) = events[first].position() {
                    action = action
                        .with_detail("x", serde_json::json!(x))
                        .with_detail("y", serde_json::json!(y));
                }
                if let Some((x, y)) = events[last].position() {
                    action = action
                        .with_detail("end_x", serde_json::json!(x))
                        .with_detail("end_y", serde_json::json!(y));
                }
                action
            }
            SequenceKind::Wheel { upward } => {
                let total: f64 = buffer
                    .iter()
                    .filter_map(|&i| match events[i].payload {
                        EventPayload::Wheel { delta } => Some(delta),
                        _ => None,
                    })
                    .sum();
                let direction = if upward { "Up" } else { "Down" };
                let mut action = GroupedAction::new(
                    ActionKind::MouseWheel,
                    events[first].time,
                    events[last].time,
                )
                .with_indices(buffer.iter().copied())
                .with_detail("delta", serde_json::json!(total))
                .with_detail("direction", serde_json::json!(direction.to_lowercase()));
                action.label = format!("Mouse Wheel ({direction})");
                action
            }
        };
        self.push(action, first);
    }

    /// Synthesize the pixel wait requested by an auto-wait annotation.
    fn emit_auto_wait(&mut self, index: usize) {
        let event = &self.events[index];
        let wait: AutoWait = match event.auto_wait() {
            None => return,
            Some(Ok(wait)) => wait,
            Some(Err(e)) => {
                warn!("Ignoring malformed auto-wait on event {index}: {e}");
                return;
            }
        };
        let Some((x, y)) = wait.x.zip(wait.y).or(event.captured_position) else {
            warn!("Ignoring auto-wait on event {index}: no position to watch");
            return;
        };
        let action = GroupedAction::new(
            ActionKind::WaitColor {
                x,
                y,
                target_color: wait.target_color,
                timeout: wait.timeout,
                post_delay: wait.post_delay,
            },
            event.time,
            event.time,
        )
        .with_detail("auto_wait", serde_json::json!(true));
        self.push(action, index);
    }

    /// Attach a late key release to the finalized action that pressed the key.
    ///
    /// Only the newest action may take the release. Once another action has
    /// been finalized the release stands alone as an unprocessed event, so raw
    /// replay keeps it after the actions recorded before it.
    fn absorb_key_up(&mut self, key: &str, index: usize) -> bool {
        let Some(position) = self.held_keys.remove(key) else {
            return false;
        };
        if position + 1 != self.entries.len() {
            debug!("Key up '{key}' at event {index} outlived its action, keeping it separate");
            self.push_unprocessed(index);
            return true;
        }
        let time = self.events[index].time;
        let action = &mut self.entries[position].action;
        action.event_indices.insert(index);
        action.end_time = action.end_time.max(time);
        self.lone_presses.remove(&position);
        trace!("Key up '{key}' at event {index} joins {}", action.label);
        true
    }

    fn key_open_in_buffer(&self, key: &str) -> bool {
        if self.state != State::KeyDown {
            return false;
        }
        let mut open = 0i32;
        for &index in &self.buffer {
            match &self.events[index].payload {
                EventPayload::KeyDown { key: k } if k == key => open += 1,
                EventPayload::KeyUp { key: k } if k == key => open -= 1,
                _ => {}
            }
        }
        open > 0
    }

    fn buffer_has_regular_press(&self) -> bool {
        self.buffer.iter().any(|&index| {
            matches!(&self.events[index].payload, EventPayload::KeyDown { key } if !is_modifier(key))
        })
    }

    fn push(&mut self, action: GroupedAction, sort_key: usize) -> usize {
        self.entries.push(Entry { action, sort_key });
        self.entries.len() - 1
    }

    fn push_unprocessed(&mut self, index: usize) {
        let event = &self.events[index];
        let action = GroupedAction::new(
            ActionKind::Unprocessed {
                description: event.payload.describe(),
            },
            event.time,
            event.time,
        )
        .with_indices([index]);
        self.push(action, index);
    }

    fn orphan(&mut self, index: usize, reason: OrphanReason) {
        debug!("Dropping orphaned event {index} ({reason:?})");
        self.orphans.push(Orphan { index, reason });
    }

    fn finish(mut self) -> GroupingOutcome {
        for &position in &self.lone_presses {
            let action = &mut self.entries[position].action;
            let Some(index) = action.start_index() else {
                continue;
            };
            let description = self.events[index].payload.describe();
            debug!("Key press at event {index} never released, keeping as unprocessed");
            action.set_kind(ActionKind::Unprocessed { description });
            action.details.remove("keys");
        }

        // Merges can append to earlier entries, so restore raw order. The sort is
        // stable, which keeps a synthesized wait ahead of the click it guards.
        self.entries.sort_by_key(|entry| entry.sort_key);
        self.orphans.sort_by_key(|orphan| orphan.index);

        GroupingOutcome {
            actions: self.entries.into_iter().map(|entry| entry.action).collect(),
            orphans: self.orphans,
        }
    }
}

/// Text contributed by one key to a typing run.
fn typed_text(key: &str) -> String {
    match key {
        "space" => " ".to_string(),
        k if k.chars().count() == 1 => k.to_string(),
        k => format!("[{k}]"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{LogicEvent, Rgb, AUTO_WAIT_KEY};

    fn kinds(actions: &[GroupedAction]) -> Vec<&ActionKind> {
        actions.iter().map(|a| &a.kind).collect()
    }

    #[test]
    fn test_empty_input() {
        assert!(group(&[]).is_empty());
    }

    #[test]
    fn test_click_and_drag_threshold() {
        let drag = vec![
            RawEvent::button_down(0.0, MouseButton::Left, (0, 0)),
            RawEvent::pointer_move(0.05, 11, 0),
            RawEvent::button_up(0.1, MouseButton::Left, (11, 0)),
        ];
        let actions = group(&drag);
        assert_eq!(actions.len(), 1);
        assert_eq!(
            actions[0].kind,
            ActionKind::MouseDrag {
                button: MouseButton::Left
            }
        );
        assert_eq!(actions[0].end_position(), Some((11, 0)));

        let click = vec![
            RawEvent::button_down(0.0, MouseButton::Left, (0, 0)),
            RawEvent::pointer_move(0.05, 5, 0),
            RawEvent::button_up(0.1, MouseButton::Left, (5, 0)),
        ];
        let actions = group(&click);
        assert_eq!(actions.len(), 1);
        assert_eq!(
            actions[0].kind,
            ActionKind::MouseClick {
                button: MouseButton::Left
            }
        );
        assert_eq!(actions[0].event_indices.len(), 3);
        assert_eq!(actions[0].start_position(), Some((0, 0)));
    }

    #[test]
    fn test_double_merges_into_click() {
        let events = vec![
            RawEvent::button_down(0.0, MouseButton::Left, (5, 5)),
            RawEvent::button_up(0.05, MouseButton::Left, (5, 5)),
            RawEvent::button_double(0.2, MouseButton::Left, (5, 5)),
            RawEvent::button_up(0.25, MouseButton::Left, (5, 5)),
        ];
        let actions = group(&events);
        assert_eq!(actions.len(), 1);
        assert_eq!(
            actions[0].kind,
            ActionKind::MouseDoubleClick {
                button: MouseButton::Left
            }
        );
        assert_eq!(
            actions[0].event_indices.iter().copied().collect::<Vec<_>>(),
            vec![0, 1, 2, 3]
        );
        assert!((actions[0].end_time - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_second_double_makes_triple_click() {
        let events = vec![
            RawEvent::button_down(0.0, MouseButton::Left, (5, 5)),
            RawEvent::button_up(0.05, MouseButton::Left, (5, 5)),
            RawEvent::button_double(0.15, MouseButton::Left, (5, 5)),
            RawEvent::button_up(0.2, MouseButton::Left, (5, 5)),
            RawEvent::button_double(0.3, MouseButton::Left, (5, 5)),
        ];
        let actions = group(&events);
        assert_eq!(actions.len(), 1);
        assert_eq!(
            actions[0].kind,
            ActionKind::MouseTripleClick {
                button: MouseButton::Left
            }
        );
        assert_eq!(actions[0].event_indices.len(), 5);
    }

    #[test]
    fn test_double_of_other_button_stands_alone() {
        let events = vec![
            RawEvent::button_down(0.0, MouseButton::Left, (5, 5)),
            RawEvent::button_up(0.05, MouseButton::Left, (5, 5)),
            RawEvent::button_double(0.1, MouseButton::Right, (5, 5)),
        ];
        let actions = group(&events);
        assert_eq!(actions.len(), 2);
        assert_eq!(
            actions[1].kind,
            ActionKind::MouseDoubleClick {
                button: MouseButton::Right
            }
        );
    }

    #[test]
    fn test_late_double_does_not_merge() {
        let events = vec![
            RawEvent::button_down(0.0, MouseButton::Left, (5, 5)),
            RawEvent::button_up(0.05, MouseButton::Left, (5, 5)),
            RawEvent::button_double(0.6, MouseButton::Left, (5, 5)),
        ];
        let actions = group(&events);
        assert_eq!(actions.len(), 2);
        assert!(matches!(actions[0].kind, ActionKind::MouseClick { .. }));
        assert!(matches!(actions[1].kind, ActionKind::MouseDoubleClick { .. }));
    }

    #[test]
    fn test_shortcut_split_on_second_regular_key() {
        let events = vec![
            RawEvent::key_down(0.0, "ctrl"),
            RawEvent::key_down(0.01, "c"),
            RawEvent::key_down(0.02, "v"),
        ];
        let actions = group(&events);
        assert_eq!(actions.len(), 2);
        assert_eq!(
            actions[0].kind,
            ActionKind::Shortcut {
                modifiers: vec!["ctrl".to_string()],
                keys: vec!["c".to_string()],
            }
        );
        assert_eq!(actions[1].start_index(), Some(2));
    }

    #[test]
    fn test_full_shortcut_with_releases() {
        let events = vec![
            RawEvent::key_down(0.0, "ctrl"),
            RawEvent::key_down(0.05, "s"),
            RawEvent::key_up(0.1, "s"),
            RawEvent::key_up(0.15, "ctrl"),
        ];
        let actions = group(&events);
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].label, "Shortcut: Ctrl + S");
        assert_eq!(actions[0].event_indices.len(), 4);
    }

    #[test]
    fn test_typing_run_coalesces() {
        let events = vec![
            RawEvent::key_down(0.0, "h"),
            RawEvent::key_up(0.05, "h"),
            RawEvent::key_down(0.1, "i"),
            RawEvent::key_up(0.15, "i"),
            RawEvent::key_down(0.2, "space"),
            RawEvent::key_up(0.25, "space"),
        ];
        let actions = group(&events);
        assert_eq!(actions.len(), 1);
        assert_eq!(
            actions[0].kind,
            ActionKind::Typing {
                text: "hi ".to_string()
            }
        );
        assert_eq!(actions[0].event_indices.len(), 6);
    }

    #[test]
    fn test_rollover_release_is_absorbed() {
        let events = vec![
            RawEvent::key_down(0.0, "a"),
            RawEvent::key_down(0.05, "b"),
            RawEvent::key_up(0.08, "a"),
            RawEvent::key_up(0.12, "b"),
        ];
        let outcome = EventGrouper::default().group_with_report(&events);
        assert!(outcome.orphans.is_empty());
        assert_eq!(outcome.actions.len(), 1);
        assert_eq!(
            outcome.actions[0].kind,
            ActionKind::Typing {
                text: "ab".to_string()
            }
        );
        assert_eq!(outcome.actions[0].event_indices.len(), 4);
    }

    #[test]
    fn test_release_after_later_action_stays_separate() {
        let events = vec![
            RawEvent::key_down(0.0, "ctrl"),
            RawEvent::button_down(0.1, MouseButton::Left, (5, 5)),
            RawEvent::button_up(0.15, MouseButton::Left, (5, 5)),
            RawEvent::key_up(0.25, "ctrl"),
        ];
        let outcome = EventGrouper::default().group_with_report(&events);
        assert!(outcome.orphans.is_empty());

        let owners: Vec<Vec<usize>> = outcome
            .actions
            .iter()
            .map(|a| a.event_indices.iter().copied().collect())
            .collect();
        assert_eq!(owners, vec![vec![0], vec![1, 2], vec![3]]);
        assert_eq!(outcome.actions[2].label, "Event: Key Up: ctrl");
    }

    #[test]
    fn test_modifier_only_chord() {
        let events = vec![
            RawEvent::key_down(0.0, "ctrl"),
            RawEvent::key_down(0.05, "shift"),
            RawEvent::key_up(0.1, "shift"),
            RawEvent::key_up(0.15, "ctrl"),
        ];
        let actions = group(&events);
        assert_eq!(actions.len(), 1);
        assert_eq!(
            actions[0].kind,
            ActionKind::Shortcut {
                modifiers: vec!["ctrl".to_string()],
                keys: vec!["shift".to_string()],
            }
        );
        assert_eq!(actions[0].label, "Shortcut: Ctrl + Shift");
    }

    #[test]
    fn test_single_key_press() {
        let events = vec![
            RawEvent::key_down(0.0, "enter"),
            RawEvent::key_up(0.05, "enter"),
        ];
        let actions = group(&events);
        assert_eq!(
            kinds(&actions),
            vec![&ActionKind::KeyPress {
                key: "enter".to_string()
            }]
        );
    }

    #[test]
    fn test_lone_key_down_is_unprocessed() {
        let events = vec![RawEvent::key_down(0.0, "x")];
        let actions = group(&events);
        assert_eq!(actions.len(), 1);
        assert!(matches!(actions[0].kind, ActionKind::Unprocessed { .. }));
        assert_eq!(actions[0].label, "Event: Key Down: x");
    }

    #[test]
    fn test_pause_splits_move_sequence() {
        let events = vec![
            RawEvent::pointer_move(0.0, 0, 0),
            RawEvent::pointer_move(0.4, 10, 10),
        ];
        let actions = group(&events);
        assert_eq!(actions.len(), 2);
        assert!(actions.iter().all(|a| a.kind == ActionKind::MouseMove));
    }

    #[test]
    fn test_wheel_direction_change_splits() {
        let events = vec![
            RawEvent::wheel(0.0, 1.0),
            RawEvent::wheel(0.05, 1.0),
            RawEvent::wheel(0.1, -1.0),
        ];
        let actions = group(&events);
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0].label, "Mouse Wheel (Up)");
        assert_eq!(actions[0].details["delta"], serde_json::json!(2.0));
        assert_eq!(actions[1].label, "Mouse Wheel (Down)");
    }

    #[test]
    fn test_logic_event_flushes_buffer() {
        let events = vec![
            RawEvent::pointer_move(0.0, 0, 0),
            RawEvent::logic(0.05, LogicEvent::LoopStart { count: 0 }),
            RawEvent::pointer_move(0.1, 5, 5),
        ];
        let actions = group(&events);
        assert_eq!(actions.len(), 3);
        assert_eq!(actions[1].label, "Loop Start (Count: Infinite)");
        assert_eq!(actions[1].event_indices.len(), 1);
    }

    #[test]
    fn test_orphans_are_reported() {
        let events = vec![
            RawEvent::key_up(0.0, "q"),
            RawEvent::button_up(0.1, MouseButton::Left, (0, 0)),
            RawEvent::button_down(0.2, MouseButton::Right, (0, 0)),
            RawEvent::pointer_move(0.25, 3, 3),
            RawEvent::key_down(0.3, "z"),
            RawEvent::key_up(0.35, "z"),
        ];
        let outcome = EventGrouper::default().group_with_report(&events);
        let reasons: Vec<_> = outcome.orphans.iter().map(|o| (o.index, o.reason)).collect();
        assert_eq!(
            reasons,
            vec![
                (0, OrphanReason::UnmatchedKeyUp),
                (1, OrphanReason::UnmatchedButtonUp),
                (2, OrphanReason::UnmatchedButtonDown),
            ]
        );
        assert_eq!(outcome.actions.len(), 2);
        assert_eq!(outcome.actions[0].kind, ActionKind::MouseMove);
    }

    #[test]
    fn test_auto_wait_precedes_click() {
        let events = vec![
            RawEvent::button_down(1.0, MouseButton::Left, (40, 50)).with_annotation(
                AUTO_WAIT_KEY,
                serde_json::json!({"target_hex": "#102030", "timeout": 3.0}),
            ),
            RawEvent::button_up(1.05, MouseButton::Left, (40, 50)),
        ];
        let actions = group(&events);
        assert_eq!(actions.len(), 2);
        assert_eq!(
            actions[0].kind,
            ActionKind::WaitColor {
                x: 40,
                y: 50,
                target_color: Rgb::new(0x10, 0x20, 0x30),
                timeout: 3.0,
                post_delay: 0.0,
            }
        );
        assert!(actions[0].event_indices.is_empty());
        assert_eq!(actions[0].start_time, actions[1].start_time);
        assert!(matches!(actions[1].kind, ActionKind::MouseClick { .. }));
    }

    #[test]
    fn test_unrecognized_payload_degrades() {
        let events = vec![RawEvent::new(
            0.0,
            EventPayload::Unrecognized {
                description: "joystick".to_string(),
            },
        )];
        let actions = group(&events);
        assert_eq!(
            actions[0].kind,
            ActionKind::Unprocessed {
                description: "joystick".to_string()
            }
        );
    }

    #[test]
    fn test_interrupted_press_keeps_moves() {
        let events = vec![
            RawEvent::button_down(0.0, MouseButton::Left, (0, 0)),
            RawEvent::pointer_move(0.05, 20, 0),
            RawEvent::key_down(0.1, "a"),
            RawEvent::key_up(0.15, "a"),
        ];
        let outcome = EventGrouper::default().group_with_report(&events);
        assert_eq!(outcome.orphans.len(), 1);
        assert_eq!(
            kinds(&outcome.actions),
            vec![
                &ActionKind::MouseMove,
                &ActionKind::KeyPress {
                    key: "a".to_string()
                }
            ]
        );
    }
}
