//! Logic markers: control-flow and condition events inserted into a recording.

use crate::event::types::{default_wait_timeout, Rgb};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A logic marker stored in the raw event list.
///
/// Serialized with a `logic_type` tag so it matches the persisted macro format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "logic_type", rename_all = "snake_case")]
pub enum LogicEvent {
    /// Start of a repeated block; `count == 0` repeats until stopped.
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
        #[serde(default = "default_wait_timeout")]
        timeout: f64,
        #[serde(default)]
        post_delay: f64,
    },
    WaitSound {
        #[serde(default = "default_sound_threshold")]
        threshold: f32,
        #[serde(default = "default_wait_timeout")]
        timeout: f64,
        #[serde(default)]
        post_delay: f64,
    },
    IfColorMatch {
        x: i32,
        y: i32,
        #[serde(rename = "target_hex")]
        target_color: Rgb,
    },
    IfColorElse,
    IfColorEnd,
    CallMacro {
        path: PathBuf,
    },
}

fn default_sound_threshold() -> f32 {
    0.1
}

impl LogicEvent {
    /// The `logic_type` tag.
    pub fn type_name(&self) -> &'static str {
        match self {
            LogicEvent::LoopStart { .. } => "loop_start",
            LogicEvent::LoopEnd => "loop_end",
            LogicEvent::WaitColor { .. } => "wait_color",
            LogicEvent::WaitSound { .. } => "wait_sound",
            LogicEvent::IfColorMatch { .. } => "if_color_match",
            LogicEvent::IfColorElse => "if_color_else",
            LogicEvent::IfColorEnd => "if_color_end",
            LogicEvent::CallMacro { .. } => "call_macro",
        }
    }

    /// Display label shown in the action list.
    pub fn label(&self) -> String {
        match self {
            LogicEvent::LoopStart { count } => format!("Loop Start (Count: {})", count_text(*count)),
            LogicEvent::LoopEnd => "Loop End".to_string(),
            LogicEvent::WaitColor {
                x, y, target_color, ..
            } => format!("Wait Color ({target_color} at {x},{y})"),
            LogicEvent::WaitSound { threshold, .. } => {
                format!("Wait Sound (Threshold: {threshold})")
            }
            LogicEvent::IfColorMatch {
                x, y, target_color, ..
            } => format!("If Color ({target_color} at {x},{y})"),
            LogicEvent::IfColorElse => "Else".to_string(),
            LogicEvent::IfColorEnd => "End If".to_string(),
            LogicEvent::CallMacro { path } => format!("Call Macro ({})", path.display()),
        }
    }
}

/// Loop counts of zero mean "infinite".
pub(crate) fn count_text(count: u32) -> String {
    if count == 0 {
        "Infinite".to_string()
    } else {
        count.to_string()
    }
}
