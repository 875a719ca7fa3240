//! Semantic actions produced by the grouping engine.

use crate::event::logic::{count_text, LogicEvent};
use crate::event::{MouseButton, Point, Rgb};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

/// Free-form action metadata (positions, deltas, key lists).
pub type Details = BTreeMap<String, serde_json::Value>;

/// What an action means.
///
/// Serialized with a `type` tag; variant fields land next to it, which is how
/// they are merged into an action record's `details` when persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionKind {
    MouseClick {
        button: MouseButton,
    },
    MouseDoubleClick {
        button: MouseButton,
    },
    MouseTripleClick {
        button: MouseButton,
    },
    MouseDrag {
        button: MouseButton,
    },
    MouseMove,
    MouseWheel,
    KeyPress {
        key: String,
    },
    Shortcut {
        modifiers: Vec<String>,
        keys: Vec<String>,
    },
    Typing {
        text: String,
    },
    LoopStart {
        #[serde(default)]
        count: u32,
    },
    LoopEnd,
    WaitColor {
        x: i32,
        y: i32,
        #[serde(rename = "target_hex")]
        target_color: Rgb,
        timeout: f64,
        #[serde(default)]
        post_delay: f64,
    },
    WaitSound {
        threshold: f32,
        timeout: f64,
        #[serde(default)]
        post_delay: f64,
    },
    IfColorMatch {
        x: i32,
        y: i32,
        #[serde(rename = "target_hex")]
        target_color: Rgb,
        /// Index of the paired `IfColorElse` or `IfColorEnd` action
        #[serde(default)]
        else_jump: Option<usize>,
    },
    IfColorElse {
        /// Index of the paired `IfColorEnd` action
        #[serde(default)]
        end_jump: Option<usize>,
    },
    IfColorEnd,
    CallMacro {
        path: PathBuf,
    },
    #[serde(alias = "raw")]
    Unprocessed {
        description: String,
    },
}

impl ActionKind {
    /// Convert a logic marker into its action kind. Jump targets are resolved later.
    pub fn from_logic(logic: &LogicEvent) -> Self {
        match logic.clone() {
            LogicEvent::LoopStart { count } => ActionKind::LoopStart { count },
            LogicEvent::LoopEnd => ActionKind::LoopEnd,
            LogicEvent::WaitColor {
                x,
                y,
                target_color,
                timeout,
                post_delay,
            } => ActionKind::WaitColor {
                x,
                y,
                target_color,
                timeout,
                post_delay,
            },
            LogicEvent::WaitSound {
                threshold,
                timeout,
                post_delay,
            } => ActionKind::WaitSound {
                threshold,
                timeout,
                post_delay,
            },
            LogicEvent::IfColorMatch {
                x,
                y,
                target_color,
            } => ActionKind::IfColorMatch {
                x,
                y,
                target_color,
                else_jump: None,
            },
            LogicEvent::IfColorElse => ActionKind::IfColorElse { end_jump: None },
            LogicEvent::IfColorEnd => ActionKind::IfColorEnd,
            LogicEvent::CallMacro { path } => ActionKind::CallMacro { path },
        }
    }

    /// The persisted `type` tag.
    pub fn type_name(&self) -> &'static str {
        match self {
            ActionKind::MouseClick { .. } => "mouse_click",
            ActionKind::MouseDoubleClick { .. } => "mouse_double_click",
            ActionKind::MouseTripleClick { .. } => "mouse_triple_click",
            ActionKind::MouseDrag { .. } => "mouse_drag",
            ActionKind::MouseMove => "mouse_move",
            ActionKind::MouseWheel => "mouse_wheel",
            ActionKind::KeyPress { .. } => "key_press",
            ActionKind::Shortcut { .. } => "shortcut",
            ActionKind::Typing { .. } => "typing",
            ActionKind::LoopStart { .. } => "loop_start",
            ActionKind::LoopEnd => "loop_end",
            ActionKind::WaitColor { .. } => "wait_color",
            ActionKind::WaitSound { .. } => "wait_sound",
            ActionKind::IfColorMatch { .. } => "if_color_match",
            ActionKind::IfColorElse { .. } => "if_color_else",
            ActionKind::IfColorEnd => "if_color_end",
            ActionKind::CallMacro { .. } => "call_macro",
            ActionKind::Unprocessed { .. } => "unprocessed",
        }
    }

    /// Default display label.
    pub fn label(&self) -> String {
        match self {
            ActionKind::MouseClick { button } => format!("Mouse Click ({button})"),
            ActionKind::MouseDoubleClick { button } => format!("Mouse Double Click ({button})"),
            ActionKind::MouseTripleClick { button } => format!("Mouse Triple Click ({button})"),
            ActionKind::MouseDrag { button } => format!("Mouse Drag ({button})"),
            ActionKind::MouseMove => "Mouse Move".to_string(),
            ActionKind::MouseWheel => "Mouse Wheel".to_string(),
            ActionKind::KeyPress { key } => format!("Key Press: {}", capitalize(key)),
            ActionKind::Shortcut { modifiers, keys } => {
                let parts: Vec<String> = modifiers
                    .iter()
                    .chain(keys.iter())
                    .map(|k| capitalize(k))
                    .collect();
                format!("Shortcut: {}", parts.join(" + "))
            }
            ActionKind::Typing { text } => format!("Typing: {text}"),
            ActionKind::LoopStart { count } => format!("Loop Start (Count: {})", count_text(*count)),
            ActionKind::LoopEnd => "Loop End".to_string(),
            ActionKind::WaitColor {
                x, y, target_color, ..
            } => format!("Wait Color ({target_color} at {x},{y})"),
            ActionKind::WaitSound { threshold, .. } => {
                format!("Wait Sound (Threshold: {threshold})")
            }
            ActionKind::IfColorMatch {
                x, y, target_color, ..
            } => format!("If Color ({target_color} at {x},{y})"),
            ActionKind::IfColorElse { .. } => "Else".to_string(),
            ActionKind::IfColorEnd => "End If".to_string(),
            ActionKind::CallMacro { path } => format!("Call Macro ({})", path.display()),
            ActionKind::Unprocessed { description } => format!("Event: {description}"),
        }
    }

    /// The button for click, multi-click and drag actions.
    pub fn click_button(&self) -> Option<MouseButton> {
        match self {
            ActionKind::MouseClick { button }
            | ActionKind::MouseDoubleClick { button }
            | ActionKind::MouseTripleClick { button }
            | ActionKind::MouseDrag { button } => Some(*button),
            _ => None,
        }
    }

    /// Control-flow and condition markers.
    pub fn is_logic(&self) -> bool {
        matches!(
            self,
            ActionKind::LoopStart { .. }
                | ActionKind::LoopEnd
                | ActionKind::WaitColor { .. }
                | ActionKind::WaitSound { .. }
                | ActionKind::IfColorMatch { .. }
                | ActionKind::IfColorElse { .. }
                | ActionKind::IfColorEnd
                | ActionKind::CallMacro { .. }
        )
    }
}

/// A semantic unit derived from one or more raw events.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupedAction {
    pub kind: ActionKind,
    pub label: String,
    pub start_time: f64,
    pub end_time: f64,
    /// Positions in the raw event list owned by this action
    pub event_indices: BTreeSet<usize>,
    pub details: Details,
}

impl GroupedAction {
    pub fn new(kind: ActionKind, start_time: f64, end_time: f64) -> Self {
        Self {
            label: kind.label(),
            kind,
            start_time,
            end_time,
            event_indices: BTreeSet::new(),
            details: Details::new(),
        }
    }

    pub fn with_indices(mut self, indices: impl IntoIterator<Item = usize>) -> Self {
        self.event_indices.extend(indices);
        self
    }

    pub fn with_detail(mut self, key: &str, value: serde_json::Value) -> Self {
        self.details.insert(key.to_string(), value);
        self
    }

    /// Replace the kind and refresh the label.
    pub fn set_kind(&mut self, kind: ActionKind) {
        self.label = kind.label();
        self.kind = kind;
    }

    pub fn start_index(&self) -> Option<usize> {
        self.event_indices.first().copied()
    }

    pub fn end_index(&self) -> Option<usize> {
        self.event_indices.last().copied()
    }

    pub fn duration(&self) -> f64 {
        (self.end_time - self.start_time).max(0.0)
    }

    /// Recorded start position (`x`, `y` details).
    pub fn start_position(&self) -> Option<Point> {
        point_detail(&self.details, "x", "y")
    }

    /// Recorded end position of a drag (`end_x`, `end_y` details).
    pub fn end_position(&self) -> Option<Point> {
        point_detail(&self.details, "end_x", "end_y")
    }
}

fn point_detail(details: &Details, x_key: &str, y_key: &str) -> Option<Point> {
    let x = details.get(x_key)?.as_i64()?;
    let y = details.get(y_key)?.as_i64()?;
    Some((i32::try_from(x).ok()?, i32::try_from(y).ok()?))
}

fn capitalize(key: &str) -> String {
    let mut chars = key.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
