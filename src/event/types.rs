//! Raw input event types consumed by the grouping engine.
//!
//! A [`RawEvent`] is one OS-level input record, already cleaned by the capture layer,
//! stamped with its offset from the start of the recording.

use crate::event::logic::LogicEvent;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Screen position in pixels.
pub type Point = (i32, i32);

/// Out-of-band metadata attached to an event at capture or edit time.
pub type Annotations = BTreeMap<String, serde_json::Value>;

/// Annotation key for free-text remarks.
pub const REMARKS_KEY: &str = "remarks";

/// Annotation key for the auto-wait hint on a button-down event.
pub const AUTO_WAIT_KEY: &str = "auto_wait";

/// Key identifiers treated as modifiers when classifying keyboard runs.
pub const MODIFIER_KEYS: &[&str] = &[
    "ctrl",
    "alt",
    "shift",
    "cmd",
    "win",
    "windows",
    "alt gr",
    "left ctrl",
    "right ctrl",
    "left shift",
    "right shift",
    "left alt",
    "right alt",
    "left windows",
    "right windows",
];

/// Whether a key identifier names a modifier key.
pub fn is_modifier(key: &str) -> bool {
    let key = key.to_lowercase();
    MODIFIER_KEYS.contains(&key.as_str())
}

/// Mouse button identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    X,
    X2,
}

impl MouseButton {
    pub fn as_str(&self) -> &'static str {
        match self {
            MouseButton::Left => "left",
            MouseButton::Right => "right",
            MouseButton::Middle => "middle",
            MouseButton::X => "x",
            MouseButton::X2 => "x2",
        }
    }

    /// Parse a button name as written by the capture layer.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "left" => Some(MouseButton::Left),
            "right" => Some(MouseButton::Right),
            "middle" => Some(MouseButton::Middle),
            "x" | "x1" => Some(MouseButton::X),
            "x2" => Some(MouseButton::X2),
            _ => None,
        }
    }
}

impl fmt::Display for MouseButton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An RGB color sample, serialized as `#rrggbb`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse `#rrggbb` (the leading `#` is optional, case-insensitive).
    pub fn from_hex(hex: &str) -> Option<Self> {
        let digits = hex.trim().trim_start_matches('#');
        if digits.len() != 6 || !digits.is_ascii() {
            return None;
        }
        let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&digits[range], 16).ok();
        Some(Self {
            r: channel(0..2)?,
            g: channel(2..4)?,
            b: channel(4..6)?,
        })
    }

    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl TryFrom<String> for Rgb {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Rgb::from_hex(&value).ok_or_else(|| format!("invalid color '{value}', expected #rrggbb"))
    }
}

impl From<Rgb> for String {
    fn from(value: Rgb) -> Self {
        value.to_hex()
    }
}

/// What happened in a single raw event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventPayload {
    KeyDown { key: String },
    KeyUp { key: String },
    PointerMove { x: i32, y: i32 },
    ButtonDown { button: MouseButton },
    ButtonUp { button: MouseButton },
    ButtonDouble { button: MouseButton },
    Wheel { delta: f64 },
    /// A control-flow or condition marker inserted by the editor.
    Logic { logic: LogicEvent },
    /// A record whose shape could not be interpreted.
    Unrecognized { description: String },
}

impl EventPayload {
    /// Short human-readable description used for `Unprocessed` labels and logs.
    pub fn describe(&self) -> String {
        match self {
            EventPayload::KeyDown { key } => format!("Key Down: {key}"),
            EventPayload::KeyUp { key } => format!("Key Up: {key}"),
            EventPayload::PointerMove { x, y } => format!("Move to ({x}, {y})"),
            EventPayload::ButtonDown { button } => format!("Button Down: {button}"),
            EventPayload::ButtonUp { button } => format!("Button Up: {button}"),
            EventPayload::ButtonDouble { button } => format!("Button Double: {button}"),
            EventPayload::Wheel { delta } => format!("Wheel: {delta}"),
            EventPayload::Logic { logic } => logic.label(),
            EventPayload::Unrecognized { description } => description.clone(),
        }
    }
}

/// One timestamped input record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    /// Seconds since recording start
    pub time: f64,
    pub payload: EventPayload,
    /// Pointer position sampled when the event was captured (button events)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captured_position: Option<Point>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: Annotations,
}

impl RawEvent {
    pub fn new(time: f64, payload: EventPayload) -> Self {
        Self {
            time,
            payload,
            captured_position: None,
            annotations: Annotations::new(),
        }
    }

    pub fn key_down(time: f64, key: impl Into<String>) -> Self {
        Self::new(time, EventPayload::KeyDown { key: normalize_key(key) })
    }

    pub fn key_up(time: f64, key: impl Into<String>) -> Self {
        Self::new(time, EventPayload::KeyUp { key: normalize_key(key) })
    }

    pub fn pointer_move(time: f64, x: i32, y: i32) -> Self {
        Self::new(time, EventPayload::PointerMove { x, y })
    }

    pub fn button_down(time: f64, button: MouseButton, position: Point) -> Self {
        Self::new(time, EventPayload::ButtonDown { button }).at(position)
    }

    pub fn button_up(time: f64, button: MouseButton, position: Point) -> Self {
        Self::new(time, EventPayload::ButtonUp { button }).at(position)
    }

    pub fn button_double(time: f64, button: MouseButton, position: Point) -> Self {
        Self::new(time, EventPayload::ButtonDouble { button }).at(position)
    }

    pub fn wheel(time: f64, delta: f64) -> Self {
        Self::new(time, EventPayload::Wheel { delta })
    }

    pub fn logic(time: f64, logic: LogicEvent) -> Self {
        Self::new(time, EventPayload::Logic { logic })
    }

    /// Attach the captured pointer position.
    pub fn at(mut self, position: Point) -> Self {
        self.captured_position = Some(position);
        self
    }

    /// Attach an annotation.
    pub fn with_annotation(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.annotations.insert(key.into(), value);
        self
    }

    pub fn is_keyboard(&self) -> bool {
        matches!(
            self.payload,
            EventPayload::KeyDown { .. } | EventPayload::KeyUp { .. }
        )
    }

    /// The logic marker carried by this event, if any.
    pub fn logic_event(&self) -> Option<&LogicEvent> {
        match &self.payload {
            EventPayload::Logic { logic } => Some(logic),
            _ => None,
        }
    }

    /// Position to use for pointer-related replay: the captured position, or the
    /// coordinates of a move event.
    pub fn position(&self) -> Option<Point> {
        match self.payload {
            EventPayload::PointerMove { x, y } => Some((x, y)),
            _ => self.captured_position,
        }
    }

    pub fn remarks(&self) -> Option<&str> {
        self.annotations.get(REMARKS_KEY).and_then(|v| v.as_str())
    }

    /// The auto-wait hint, if one is attached and well-formed.
    pub fn auto_wait(&self) -> Option<Result<AutoWait, serde_json::Error>> {
        self.annotations
            .get(AUTO_WAIT_KEY)
            .map(|value| serde_json::from_value(value.clone()))
    }
}

/// Recorded hint that a click must be preceded by a pixel wait on replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoWait {
    #[serde(rename = "target_hex", alias = "color")]
    pub target_color: Rgb,
    #[serde(default = "default_wait_timeout")]
    pub timeout: f64,
    #[serde(default)]
    pub post_delay: f64,
    /// Pixel to watch; defaults to the click position
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<i32>,
}

pub(crate) fn default_wait_timeout() -> f64 {
    10.0
}

fn normalize_key(key: impl Into<String>) -> String {
    key.into().trim().to_lowercase()
}
