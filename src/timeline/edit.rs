//! Structural edits on a timeline.
//!
//! Edits operate on the raw event list, then the whole list is grouped again.

use crate::event::{LogicEvent, RawEvent, REMARKS_KEY};
use crate::timeline::ActionTimeline;
use tracing::info;

/// Gap in seconds placed around an imported block.
pub const IMPORT_GAP_SECS: f64 = 1.0;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EditError {
    #[error("action index {index} out of range (timeline has {len} actions)")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("invalid action range {first}..={last}")]
    InvalidRange { first: usize, last: usize },
    #[error("invalid value: {0}")]
    InvalidValue(String),
}

/// Where an imported recording is placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportMode {
    /// Discard the current recording
    Replace,
    Append,
    Prepend,
    /// Insert before the given action
    InsertAt(usize),
}

impl ActionTimeline {
    /// Insert a logic marker before action `before` (`before == len` appends).
    pub fn insert_logic(&mut self, before: usize, logic: LogicEvent) -> Result<(), EditError> {
        if before > self.len() {
            return Err(EditError::IndexOutOfRange {
                index: before,
                len: self.len(),
            });
        }
        let (raw, time) = match self.actions().get(before) {
            Some(action) => (self.raw_insert_point(before), action.start_time),
            None => (
                self.events().len(),
                self.events().last().map_or(0.0, |e| e.time),
            ),
        };
        info!("Inserting {} before action {before}", logic.type_name());
        self.events_mut().insert(raw, RawEvent::logic(time, logic));
        self.regroup();
        Ok(())
    }

    /// Surround actions `first..=last` with a loop repeating `count` times (0 = forever).
    pub fn wrap_in_loop(&mut self, first: usize, last: usize, count: u32) -> Result<(), EditError> {
        self.check_range(first, last)?;
        let start_time = self.actions()[first].start_time;
        let end_time = self.actions()[last].end_time;
        let start_raw = self.raw_insert_point(first);
        let end_raw = self.raw_end_point(last);

        let events = self.events_mut();
        events.insert(end_raw, RawEvent::logic(end_time, LogicEvent::LoopEnd));
        events.insert(start_raw, RawEvent::logic(start_time, LogicEvent::LoopStart { count }));
        info!("Wrapped actions {first}..={last} in a loop");
        self.regroup();
        Ok(())
    }

    /// Remove actions `first..=last` together with the raw events they own.
    /// Returns the number of raw events removed.
    pub fn delete_actions(&mut self, first: usize, last: usize) -> Result<usize, EditError> {
        self.check_range(first, last)?;
        let mut doomed: Vec<usize> = self.actions()[first..=last]
            .iter()
            .flat_map(|action| action.event_indices.iter().copied())
            .collect();
        doomed.sort_unstable();
        doomed.dedup();

        let events = self.events_mut();
        for &index in doomed.iter().rev() {
            events.remove(index);
        }
        info!("Deleted {} events for actions {first}..={last}", doomed.len());
        self.regroup();
        Ok(doomed.len())
    }

    /// Set the gap before action `index` (measured from the previous action's
    /// end, or from the recording start) by shifting it and everything after it.
    pub fn set_action_delay(&mut self, index: usize, delay: f64) -> Result<(), EditError> {
        self.check_index(index)?;
        check_interval(delay)?;
        let current = match index {
            0 => self.actions()[0].start_time,
            _ => self.actions()[index].start_time - self.actions()[index - 1].end_time,
        };
        let shift = delay - current;
        let from = self.raw_insert_point(index);

        for event in &mut self.events_mut()[from..] {
            event.time += shift;
        }
        self.normalize_order();
        self.regroup();
        Ok(())
    }

    /// Rewrite the gaps between consecutive actions in `first..=last` to
    /// `interval`, keeping each action's internal timing. Later actions move
    /// along with the last one.
    pub fn bulk_set_interval(&mut self, first: usize, last: usize, interval: f64) -> Result<(), EditError> {
        self.check_range(first, last)?;
        check_interval(interval)?;

        let chain: Vec<usize> = (first..=last)
            .filter(|&i| !self.actions()[i].event_indices.is_empty())
            .collect();
        let Some(&head) = chain.first() else {
            return Ok(());
        };

        let mut owner_shift: Vec<Option<f64>> = vec![None; self.events().len()];
        let mut shift = 0.0;
        let mut previous_end: Option<f64> = None;
        for &i in &chain {
            let action = &self.actions()[i];
            if let Some(end) = previous_end {
                shift = end + interval - action.start_time;
            }
            previous_end = Some(action.end_time + shift);
            for &raw in &action.event_indices {
                owner_shift[raw] = Some(shift);
            }
        }

        let from = self.raw_insert_point(head);
        let mut carry = 0.0;
        for (index, event) in self.events_mut().iter_mut().enumerate().skip(from) {
            if let Some(own) = owner_shift[index] {
                carry = own;
            }
            event.time += owner_shift[index].unwrap_or(carry);
        }
        self.normalize_order();
        self.regroup();
        Ok(())
    }

    /// Merge another recording into this one.
    ///
    /// Imported timestamps are renormalized so the block starts one second after
    /// the event preceding it, and whatever follows starts one second after the
    /// block.
    pub fn import(&mut self, other: ActionTimeline, mode: ImportMode) -> Result<(), EditError> {
        let incoming = other.events().to_vec();
        if mode == ImportMode::Replace {
            self.replace_events(incoming);
            self.set_mode(other.mode());
            self.regroup();
            return Ok(());
        }
        if incoming.is_empty() {
            return Ok(());
        }

        let raw = match mode {
            ImportMode::Append | ImportMode::Replace => self.events().len(),
            ImportMode::Prepend => 0,
            ImportMode::InsertAt(before) => {
                if before > self.len() {
                    return Err(EditError::IndexOutOfRange {
                        index: before,
                        len: self.len(),
                    });
                }
                if before == self.len() {
                    self.events().len()
                } else {
                    self.raw_insert_point(before)
                }
            }
        };

        let mut events = std::mem::take(self.events_mut());
        let tail = events.split_off(raw);
        let block_start = match (mode, events.last()) {
            (ImportMode::Prepend, _) => 0.0,
            (_, Some(previous)) => previous.time + IMPORT_GAP_SECS,
            (_, None) => IMPORT_GAP_SECS,
        };

        let mut block = incoming;
        let first_time = block[0].time;
        shift_times(&mut block, block_start - first_time);
        let block_end = block.last().map_or(block_start, |e| e.time);

        let mut tail = tail;
        if let Some(first_tail) = tail.first() {
            let offset = block_end + IMPORT_GAP_SECS - first_tail.time;
            shift_times(&mut tail, offset);
        }

        info!(
            "Imported {} events at raw position {raw} ({mode:?})",
            block.len()
        );
        events.extend(block);
        events.extend(tail);
        self.replace_events(events);
        self.regroup();
        Ok(())
    }

    /// Set or clear the remarks of an action. They are stored on its first raw event.
    pub fn set_remarks(&mut self, index: usize, remarks: Option<&str>) -> Result<(), EditError> {
        self.check_index(index)?;
        let raw = self.actions()[index].start_index().ok_or_else(|| {
            EditError::InvalidValue(format!("action {index} owns no raw event"))
        })?;
        let annotations = &mut self.events_mut()[raw].annotations;
        match remarks.map(str::trim).filter(|text| !text.is_empty()) {
            Some(text) => {
                annotations.insert(REMARKS_KEY.to_string(), serde_json::json!(text));
            }
            None => {
                annotations.remove(REMARKS_KEY);
            }
        }
        Ok(())
    }

    /// Remarks attached to an action.
    pub fn remarks(&self, index: usize) -> Option<&str> {
        let raw = self.action(index)?.start_index()?;
        self.events().get(raw)?.remarks()
    }

    fn check_index(&self, index: usize) -> Result<(), EditError> {
        if index < self.len() {
            Ok(())
        } else {
            Err(EditError::IndexOutOfRange {
                index,
                len: self.len(),
            })
        }
    }

    fn check_range(&self, first: usize, last: usize) -> Result<(), EditError> {
        if first > last {
            return Err(EditError::InvalidRange { first, last });
        }
        self.check_index(last)
    }

    /// Raw position for events inserted before action `index`.
    fn raw_insert_point(&self, index: usize) -> usize {
        self.actions()[index..]
            .iter()
            .find_map(|action| action.start_index())
            .unwrap_or(self.events().len())
    }

    /// Raw position just past action `index`.
    fn raw_end_point(&self, index: usize) -> usize {
        self.actions()[index..]
            .iter()
            .find_map(|action| action.end_index())
            .map_or(self.events().len(), |end| end + 1)
    }

    fn normalize_order(&mut self) {
        self.events_mut().sort_by(|a, b| a.time.total_cmp(&b.time));
    }
}

fn check_interval(value: f64) -> Result<(), EditError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(EditError::InvalidValue(format!(
            "delay must be a non-negative number of seconds, got {value}"
        )))
    }
}

fn shift_times(events: &mut [RawEvent], offset: f64) {
    for event in events {
        event.time += offset;
    }
}
