//! Persisted macro documents.
//!
//! A document is a JSON object holding the coordinate mode, the raw event
//! records and, optionally, a previously computed action list. Event records
//! are loosely typed: any key the loader does not interpret is carried along
//! as an annotation so editor metadata survives a load/save cycle.

use crate::event::{Annotations, EventPayload, LogicEvent, MouseButton, Point, RawEvent};
use crate::grouping::{ActionKind, GroupedAction, GroupingConfig};
use crate::timeline::{check_coverage, ActionTimeline, CoordinateMode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Errors raised while reading or writing macro documents.
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid event record {index}: {reason}")]
    InvalidEvent { index: usize, reason: String },
}

/// Coordinate mode as written in a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModeName {
    #[default]
    Absolute,
    Relative,
}

/// On-disk form of a recording.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MacroDocument {
    #[serde(default)]
    pub mode: ModeName,
    /// Pointer position when a relative recording started
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<Point>,
    #[serde(default)]
    pub events: Vec<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grouped_actions: Option<Vec<ActionRecord>>,
}

/// On-disk form of a grouped action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub display_text: String,
    pub start_time: f64,
    pub end_time: f64,
    #[serde(default)]
    pub start_index: Option<usize>,
    #[serde(default)]
    pub end_index: Option<usize>,
    #[serde(default)]
    pub indices: Vec<usize>,
    #[serde(default)]
    pub details: Map<String, Value>,
}

impl MacroDocument {
    /// Read a document from disk.
    pub fn load(path: &Path) -> Result<Self, DocumentError> {
        let content = std::fs::read_to_string(path).map_err(|source| DocumentError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let document = Self::from_json(&content)?;
        debug!(
            "Loaded {} with {} event records",
            path.display(),
            document.events.len()
        );
        Ok(document)
    }

    /// Write the document as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<(), DocumentError> {
        let content = self.to_json()?;
        std::fs::write(path, content).map_err(|source| DocumentError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Saved macro to {}", path.display());
        Ok(())
    }

    pub fn from_json(content: &str) -> Result<Self, DocumentError> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn to_json(&self) -> Result<String, DocumentError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Snapshot a timeline. `include_actions` also stores the grouped actions.
    pub fn from_timeline(timeline: &ActionTimeline, include_actions: bool) -> Self {
        let (mode, origin) = match timeline.mode() {
            CoordinateMode::Absolute => (ModeName::Absolute, None),
            CoordinateMode::Relative { origin } => (ModeName::Relative, Some(origin)),
        };
        Self {
            mode,
            origin,
            events: timeline.events().iter().map(event_to_record).collect(),
            grouped_actions: include_actions
                .then(|| timeline.actions().iter().map(action_to_record).collect()),
        }
    }

    /// Decode the records into a timeline.
    ///
    /// Stored actions are reused when they are consistent with the event list;
    /// otherwise the events are grouped again.
    pub fn into_timeline(self, grouping: GroupingConfig) -> Result<ActionTimeline, DocumentError> {
        let mode = match self.mode {
            ModeName::Absolute => CoordinateMode::Absolute,
            ModeName::Relative => CoordinateMode::Relative {
                origin: self.origin.unwrap_or((0, 0)),
            },
        };
        let events = self
            .events
            .iter()
            .enumerate()
            .map(|(index, record)| event_from_record(index, record))
            .collect::<Result<Vec<_>, _>>()?;

        if let Some(records) = self.grouped_actions {
            let actions: Vec<GroupedAction> = records.iter().map(action_from_record).collect();
            let coverage = check_coverage(&actions, events.len());
            if coverage.is_consistent() {
                debug!("Using {} stored actions", actions.len());
                return Ok(ActionTimeline::from_parts(events, actions, mode, grouping));
            }
            warn!(
                "Stored actions do not match the event list ({} overlapping, {} out of range), regrouping",
                coverage.overlapping.len(),
                coverage.out_of_range.len()
            );
        }
        Ok(ActionTimeline::with_grouping(events, mode, grouping))
    }
}

/// Load a document from disk and turn it into a timeline.
pub fn load_timeline(path: &Path, grouping: GroupingConfig) -> Result<ActionTimeline, DocumentError> {
    MacroDocument::load(path)?.into_timeline(grouping)
}

/// Decode one event record.
pub fn event_from_record(index: usize, record: &Map<String, Value>) -> Result<RawEvent, DocumentError> {
    let time = record
        .get("time")
        .and_then(Value::as_f64)
        .ok_or_else(|| DocumentError::InvalidEvent {
            index,
            reason: "missing numeric 'time'".to_string(),
        })?;

    if let Some(logic_type) = record.get("logic_type") {
        return Ok(logic_from_record(time, logic_type, record));
    }

    let record_type = record.get("type").and_then(Value::as_str).unwrap_or_default();
    let event_type = record.get("event_type").and_then(Value::as_str).unwrap_or_default();

    let decoded: Option<(RawEvent, &[&str])> = match record_type {
        "keyboard" => {
            let name = record.get("name").and_then(Value::as_str).unwrap_or_default();
            let event = match event_type {
                "down" => Some(RawEvent::key_down(time, name)),
                "up" => Some(RawEvent::key_up(time, name)),
                _ => None,
            };
            event.map(|e| (e, &["type", "event_type", "name"][..]))
        }
        "mouse_move" => {
            let x = int_field(record, "x");
            let y = int_field(record, "y");
            x.zip(y)
                .map(|(x, y)| (RawEvent::pointer_move(time, x, y), &["type", "x", "y"][..]))
        }
        "mouse_button" => {
            let button = record
                .get("button")
                .and_then(Value::as_str)
                .and_then(MouseButton::parse);
            let payload = button.and_then(|button| match event_type {
                "down" => Some(EventPayload::ButtonDown { button }),
                "up" => Some(EventPayload::ButtonUp { button }),
                "double" => Some(EventPayload::ButtonDouble { button }),
                _ => None,
            });
            payload.map(|payload| {
                let mut event = RawEvent::new(time, payload);
                event.captured_position = record.get("pos").and_then(point_value);
                (event, &["type", "event_type", "button", "pos"][..])
            })
        }
        "mouse_wheel" => record
            .get("delta")
            .and_then(Value::as_f64)
            .map(|delta| (RawEvent::wheel(time, delta), &["type", "delta"][..])),
        _ => None,
    };

    let (mut event, consumed) = decoded.unwrap_or_else(|| {
        let description = if event_type.is_empty() {
            format!("Unrecognized record '{record_type}'")
        } else {
            format!("Unrecognized record '{record_type}' ({event_type})")
        };
        debug!("Event {index}: {description}");
        (
            RawEvent::new(time, EventPayload::Unrecognized { description }),
            &[][..],
        )
    });
    event.annotations = leftover(record, consumed);
    Ok(event)
}

fn logic_from_record(time: f64, logic_type: &Value, record: &Map<String, Value>) -> RawEvent {
    match serde_json::from_value::<LogicEvent>(Value::Object(record.clone())) {
        Ok(logic) => {
            let consumed: Vec<String> = match serde_json::to_value(&logic) {
                Ok(Value::Object(fields)) => fields.keys().cloned().collect(),
                _ => vec!["logic_type".to_string()],
            };
            let consumed: Vec<&str> = consumed.iter().map(String::as_str).collect();
            let mut event = RawEvent::logic(time, logic);
            event.annotations = leftover(record, &consumed);
            event
        }
        Err(e) => {
            warn!("Unreadable logic record {logic_type}: {e}");
            let mut event = RawEvent::new(
                time,
                EventPayload::Unrecognized {
                    description: format!("Unknown logic {logic_type}"),
                },
            );
            event.annotations = leftover(record, &[]);
            event
        }
    }
}

/// Encode one event as a record.
pub fn event_to_record(event: &RawEvent) -> Map<String, Value> {
    let mut record = Map::new();
    record.insert("time".to_string(), json!(event.time));

    match &event.payload {
        EventPayload::KeyDown { key } | EventPayload::KeyUp { key } => {
            let event_type = if matches!(event.payload, EventPayload::KeyDown { .. }) {
                "down"
            } else {
                "up"
            };
            record.insert("type".to_string(), json!("keyboard"));
            record.insert("event_type".to_string(), json!(event_type));
            record.insert("name".to_string(), json!(key));
        }
        EventPayload::PointerMove { x, y } => {
            record.insert("type".to_string(), json!("mouse_move"));
            record.insert("x".to_string(), json!(x));
            record.insert("y".to_string(), json!(y));
        }
        EventPayload::ButtonDown { button }
        | EventPayload::ButtonUp { button }
        | EventPayload::ButtonDouble { button } => {
            let event_type = match event.payload {
                EventPayload::ButtonDown { .. } => "down",
                EventPayload::ButtonUp { .. } => "up",
                _ => "double",
            };
            record.insert("type".to_string(), json!("mouse_button"));
            record.insert("event_type".to_string(), json!(event_type));
            record.insert("button".to_string(), json!(button));
            if let Some((x, y)) = event.captured_position {
                record.insert("pos".to_string(), json!([x, y]));
            }
        }
        EventPayload::Wheel { delta } => {
            record.insert("type".to_string(), json!("mouse_wheel"));
            record.insert("delta".to_string(), json!(delta));
        }
        EventPayload::Logic { logic } => match serde_json::to_value(logic) {
            Ok(Value::Object(fields)) => record.extend(fields),
            _ => warn!("Could not encode {} marker", logic.type_name()),
        },
        // The original record's keys were kept as annotations.
        EventPayload::Unrecognized { .. } => {}
    }

    for (key, value) in &event.annotations {
        record.entry(key.clone()).or_insert_with(|| value.clone());
    }
    record
}

/// Encode one action as a record; kind fields are merged into `details`.
pub fn action_to_record(action: &GroupedAction) -> ActionRecord {
    let mut details: Map<String, Value> = action
        .details
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    if let Ok(Value::Object(fields)) = serde_json::to_value(&action.kind) {
        details.extend(fields.into_iter().filter(|(k, _)| k != "type"));
    }
    ActionRecord {
        kind: action.kind.type_name().to_string(),
        display_text: action.label.clone(),
        start_time: action.start_time,
        end_time: action.end_time,
        start_index: action.start_index(),
        end_index: action.end_index(),
        indices: action.event_indices.iter().copied().collect(),
        details,
    }
}

/// Decode one action record. Kinds that cannot be decoded degrade to
/// `Unprocessed`, which replays the owned raw events.
pub fn action_from_record(record: &ActionRecord) -> GroupedAction {
    let mut tagged = record.details.clone();
    tagged.insert("type".to_string(), json!(record.kind));
    let kind = serde_json::from_value::<ActionKind>(Value::Object(tagged)).unwrap_or_else(|e| {
        debug!("Action '{}' kept as unprocessed: {e}", record.kind);
        ActionKind::Unprocessed {
            description: record.display_text.clone(),
        }
    });

    let kind_keys: Vec<String> = match serde_json::to_value(&kind) {
        Ok(Value::Object(fields)) => fields.keys().cloned().collect(),
        _ => Vec::new(),
    };
    let indices: Vec<usize> = if !record.indices.is_empty() {
        record.indices.clone()
    } else {
        match (record.start_index, record.end_index) {
            (Some(start), Some(end)) if start <= end => (start..=end).collect(),
            _ => Vec::new(),
        }
    };

    let mut action = GroupedAction::new(kind, record.start_time, record.end_time).with_indices(indices);
    if !record.display_text.is_empty() {
        action.label = record.display_text.clone();
    }
    action.details = record
        .details
        .iter()
        .filter(|(k, _)| !kind_keys.contains(k))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    action
}

fn leftover(record: &Map<String, Value>, consumed: &[&str]) -> Annotations {
    record
        .iter()
        .filter(|(key, _)| key.as_str() != "time" && !consumed.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

fn int_field(record: &Map<String, Value>, key: &str) -> Option<i32> {
    record
        .get(key)
        .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f.round() as i64)))
        .and_then(|v| i32::try_from(v).ok())
}

fn point_value(value: &Value) -> Option<Point> {
    let pair = value.as_array()?;
    if pair.len() != 2 {
        return None;
    }
    let coord = |v: &Value| {
        v.as_i64()
            .or_else(|| v.as_f64().map(|f| f.round() as i64))
            .and_then(|v| i32::try_from(v).ok())
    };
    Some((coord(&pair[0])?, coord(&pair[1])?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Rgb, REMARKS_KEY};

    fn record(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_keyboard_record_keeps_extra_keys() {
        let rec = record(json!({
            "type": "keyboard", "event_type": "down", "name": "A",
            "scan_code": 30, "time": 0.5, "remarks": "first key"
        }));
        let event = event_from_record(0, &rec).unwrap();
        assert_eq!(event.payload, EventPayload::KeyDown { key: "a".to_string() });
        assert_eq!(event.annotations["scan_code"], json!(30));
        assert_eq!(event.remarks(), Some("first key"));

        let back = event_to_record(&event);
        assert_eq!(back["scan_code"], json!(30));
        assert_eq!(back["event_type"], json!("down"));
        assert_eq!(back[REMARKS_KEY], json!("first key"));
    }

    #[test]
    fn test_button_record_position() {
        let rec = record(json!({
            "type": "mouse_button", "event_type": "double", "button": "right",
            "pos": [12, 34], "time": 1.0
        }));
        let event = event_from_record(3, &rec).unwrap();
        assert_eq!(
            event.payload,
            EventPayload::ButtonDouble {
                button: MouseButton::Right
            }
        );
        assert_eq!(event.captured_position, Some((12, 34)));
        assert!(event.annotations.is_empty());
    }

    #[test]
    fn test_logic_record() {
        let rec = record(json!({
            "logic_type": "if_color_match", "x": 5, "y": 6,
            "target_hex": "#abcdef", "time": 2.0, "remarks": "check"
        }));
        let event = event_from_record(0, &rec).unwrap();
        assert_eq!(
            event.logic_event(),
            Some(&LogicEvent::IfColorMatch {
                x: 5,
                y: 6,
                target_color: Rgb::new(0xab, 0xcd, 0xef)
            })
        );
        assert_eq!(event.annotations.len(), 1);
        assert_eq!(event.remarks(), Some("check"));
    }

    #[test]
    fn test_unknown_record_degrades_and_round_trips() {
        let rec = record(json!({"type": "gamepad", "axis": 2, "time": 0.1}));
        let event = event_from_record(0, &rec).unwrap();
        assert!(matches!(event.payload, EventPayload::Unrecognized { .. }));
        assert_eq!(event_to_record(&event), rec);
    }

    #[test]
    fn test_missing_time_is_an_error() {
        let rec = record(json!({"type": "mouse_move", "x": 1, "y": 1}));
        let err = event_from_record(7, &rec).unwrap_err();
        assert!(matches!(err, DocumentError::InvalidEvent { index: 7, .. }));
    }

    #[test]
    fn test_action_record_merges_kind_fields() {
        let action = GroupedAction::new(
            ActionKind::MouseClick {
                button: MouseButton::Left,
            },
            0.0,
            0.1,
        )
        .with_indices([0, 1])
        .with_detail("x", json!(3))
        .with_detail("y", json!(4));

        let rec = action_to_record(&action);
        assert_eq!(rec.kind, "mouse_click");
        assert_eq!(rec.details["button"], json!("left"));
        assert_eq!(rec.start_index, Some(0));
        assert_eq!(rec.end_index, Some(1));

        let decoded = action_from_record(&rec);
        assert_eq!(decoded, action);
    }

    #[test]
    fn test_unknown_action_type_is_unprocessed() {
        let rec = ActionRecord {
            kind: "hover".to_string(),
            display_text: "Hover".to_string(),
            start_time: 0.0,
            end_time: 0.0,
            start_index: Some(2),
            end_index: Some(4),
            indices: Vec::new(),
            details: Map::new(),
        };
        let action = action_from_record(&rec);
        assert_eq!(
            action.kind,
            ActionKind::Unprocessed {
                description: "Hover".to_string()
            }
        );
        assert_eq!(action.event_indices.len(), 3);
    }
}
