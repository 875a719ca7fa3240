//! Descriptive statistics for a timeline.
//!
//! Used by the `inspect` command; computed from action kinds and timing only.

use crate::grouping::{ActionKind, GroupedAction};
use crate::timeline::ActionTimeline;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Gap (seconds) between actions counted as a deliberate pause.
const PAUSE_THRESHOLD_SECS: f64 = 1.0;

/// Aggregate figures for one timeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimelineSummary {
    pub action_count: usize,
    pub raw_event_count: usize,
    pub orphan_count: usize,
    /// Seconds from first to last raw event
    pub duration_secs: f64,
    /// Actions per kind tag
    pub kinds: BTreeMap<String, usize>,
    /// Single, double and triple clicks
    pub click_count: usize,
    pub drag_count: usize,
    /// Characters produced by typing actions
    pub typed_chars: usize,
    /// Characters per second while typing
    pub typing_rate: f64,
    /// Loop, wait, conditional and call markers
    pub logic_markers: usize,
    pub unprocessed_count: usize,
    /// Number of gaps between actions above one second
    pub pause_count: u32,
    /// Mean gap between consecutive actions in milliseconds
    pub mean_gap_ms: f64,
    /// Standard deviation of the gaps in milliseconds
    pub gap_variability_ms: f64,
    /// Whether every loop and conditional marker is paired
    pub control_flow_balanced: bool,
}

/// Compute the summary for a timeline.
pub fn compute_summary(timeline: &ActionTimeline) -> TimelineSummary {
    let actions = timeline.actions();
    let mut summary = TimelineSummary {
        action_count: actions.len(),
        raw_event_count: timeline.events().len(),
        orphan_count: timeline.orphans().len(),
        duration_secs: timeline.duration(),
        control_flow_balanced: timeline.control_flow().is_balanced(),
        ..Default::default()
    };

    let mut typing_secs = 0.0;
    for action in actions {
        *summary
            .kinds
            .entry(action.kind.type_name().to_string())
            .or_insert(0) += 1;

        match &action.kind {
            ActionKind::MouseClick { .. } => summary.click_count += 1,
            ActionKind::MouseDoubleClick { .. } => summary.click_count += 2,
            ActionKind::MouseTripleClick { .. } => summary.click_count += 3,
            ActionKind::MouseDrag { .. } => summary.drag_count += 1,
            ActionKind::Typing { text } => {
                summary.typed_chars += text.chars().count();
                typing_secs += action.duration();
            }
            ActionKind::Unprocessed { .. } => summary.unprocessed_count += 1,
            kind if kind.is_logic() => summary.logic_markers += 1,
            _ => {}
        }
    }

    if typing_secs > 0.0 {
        summary.typing_rate = summary.typed_chars as f64 / typing_secs;
    }

    let gaps = action_gaps(actions);
    summary.pause_count = gaps.iter().filter(|&&g| g > PAUSE_THRESHOLD_SECS).count() as u32;
    if !gaps.is_empty() {
        summary.mean_gap_ms = gaps.iter().sum::<f64>() / gaps.len() as f64 * 1000.0;
    }
    summary.gap_variability_ms = std_dev(&gaps) * 1000.0;
    summary
}

/// Gaps between consecutive input actions; markers are skipped.
fn action_gaps(actions: &[GroupedAction]) -> Vec<f64> {
    let inputs: Vec<&GroupedAction> = actions.iter().filter(|a| !a.kind.is_logic()).collect();
    inputs
        .windows(2)
        .map(|pair| (pair[1].start_time - pair[0].end_time).max(0.0))
        .collect()
}

fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }

    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance = values.iter().map(|&v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

impl TimelineSummary {
    /// Human-readable multi-line report.
    pub fn report(&self) -> String {
        let mut out = format!(
            "Actions: {} ({} raw events, {} dropped)\n\
             Duration: {:.2}s\n\
             Clicks: {}, drags: {}\n\
             Typed characters: {} ({:.1}/s)\n\
             Logic markers: {}{}\n\
             Unprocessed: {}\n\
             Pauses over {:.0}s: {} (mean gap {:.0}ms, sd {:.0}ms)\n",
            self.action_count,
            self.raw_event_count,
            self.orphan_count,
            self.duration_secs,
            self.click_count,
            self.drag_count,
            self.typed_chars,
            self.typing_rate,
            self.logic_markers,
            if self.control_flow_balanced {
                ""
            } else {
                " (unbalanced)"
            },
            self.unprocessed_count,
            PAUSE_THRESHOLD_SECS,
            self.pause_count,
            self.mean_gap_ms,
            self.gap_variability_ms,
        );
        for (kind, count) in &self.kinds {
            out.push_str(&format!("  {kind}: {count}\n"));
        }
        out
    }
}
