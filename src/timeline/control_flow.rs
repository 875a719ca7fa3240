//! Loop and conditional pairing for a grouped action list.
//!
//! Pairing is resolved once when a timeline is built so the scheduler never
//! scans for matching markers during playback.

use crate::grouping::{ActionKind, GroupedAction};
use tracing::warn;

/// Where execution continues when a marker transfers control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Jump {
    /// Action index to continue from (may equal the action count, meaning "done")
    pub target: usize,
    /// Action whose recorded start time the schedule is rebased onto
    pub anchor: usize,
}

/// Resolved control-flow links, indexed by action position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControlFlow {
    jumps: Vec<Option<Jump>>,
    partners: Vec<Option<usize>>,
    issues: Vec<String>,
}

#[derive(Debug)]
struct IfFrame {
    start: usize,
    else_index: Option<usize>,
}

impl ControlFlow {
    /// Pair loop and conditional markers and write the jump fields back into
    /// the `IfColorMatch` / `IfColorElse` kinds.
    pub fn resolve(actions: &mut [GroupedAction]) -> Self {
        let len = actions.len();
        let mut flow = Self {
            jumps: vec![None; len],
            partners: vec![None; len],
            issues: Vec::new(),
        };
        let mut loops: Vec<usize> = Vec::new();
        let mut ifs: Vec<IfFrame> = Vec::new();

        for (index, action) in actions.iter().enumerate() {
            match action.kind {
                ActionKind::LoopStart { .. } => loops.push(index),
                ActionKind::LoopEnd => match loops.pop() {
                    Some(start) => {
                        flow.partners[start] = Some(index);
                        flow.partners[index] = Some(start);
                        flow.jumps[index] = Some(Jump {
                            target: start + 1,
                            anchor: start,
                        });
                    }
                    None => flow.issue(format!("Loop End at action {index} has no Loop Start")),
                },
                ActionKind::IfColorMatch { .. } => ifs.push(IfFrame {
                    start: index,
                    else_index: None,
                }),
                ActionKind::IfColorElse { .. } => match ifs.last_mut() {
                    Some(frame) if frame.else_index.is_none() => {
                        frame.else_index = Some(index);
                        flow.partners[frame.start] = Some(index);
                    }
                    Some(frame) => {
                        let start = frame.start;
                        flow.issue(format!("Extra Else at action {index} for If at {start}"));
                    }
                    None => flow.issue(format!("Else at action {index} has no If")),
                },
                ActionKind::IfColorEnd => match ifs.pop() {
                    Some(frame) => {
                        flow.close_if(&frame, index);
                    }
                    None => flow.issue(format!("End If at action {index} has no If")),
                },
                _ => {}
            }
        }

        for start in loops {
            flow.issue(format!("Loop Start at action {start} is never closed"));
        }
        for frame in ifs {
            flow.issue(format!("If at action {} is never closed", frame.start));
            // Unterminated conditionals run to the end of the timeline.
            flow.jumps[frame.start] = Some(match frame.else_index {
                Some(else_index) => Jump {
                    target: else_index + 1,
                    anchor: else_index,
                },
                None => Jump {
                    target: len,
                    anchor: frame.start,
                },
            });
            if let Some(else_index) = frame.else_index {
                flow.jumps[else_index] = Some(Jump {
                    target: len,
                    anchor: else_index,
                });
            }
        }

        flow.write_back(actions);
        flow
    }

    fn close_if(&mut self, frame: &IfFrame, end: usize) {
        self.partners[end] = Some(frame.start);
        match frame.else_index {
            Some(else_index) => {
                self.jumps[frame.start] = Some(Jump {
                    target: else_index + 1,
                    anchor: else_index,
                });
                self.partners[else_index] = Some(end);
                self.jumps[else_index] = Some(Jump {
                    target: end,
                    anchor: end,
                });
            }
            None => {
                self.partners[frame.start] = Some(end);
                self.jumps[frame.start] = Some(Jump {
                    target: end,
                    anchor: end,
                });
            }
        }
    }

    fn write_back(&self, actions: &mut [GroupedAction]) {
        for (index, action) in actions.iter_mut().enumerate() {
            match &mut action.kind {
                ActionKind::IfColorMatch { else_jump, .. } => *else_jump = self.partners[index],
                ActionKind::IfColorElse { end_jump } => *end_jump = self.partners[index],
                _ => {}
            }
        }
    }

    fn issue(&mut self, message: String) {
        warn!("{message}");
        self.issues.push(message);
    }

    /// Jump taken at `index`: the failure branch of an `IfColorMatch`, the skip
    /// past a false branch at `IfColorElse`, or the loop-back of a `LoopEnd`.
    pub fn jump(&self, index: usize) -> Option<Jump> {
        self.jumps.get(index).copied().flatten()
    }

    /// Paired marker index (loop start/end, if/else/end).
    pub fn partner(&self, index: usize) -> Option<usize> {
        self.partners.get(index).copied().flatten()
    }

    /// Unbalanced or misplaced markers found while resolving.
    pub fn issues(&self) -> &[String] {
        &self.issues
    }

    pub fn is_balanced(&self) -> bool {
        self.issues.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Rgb;

    fn marker(kind: ActionKind) -> GroupedAction {
        GroupedAction::new(kind, 0.0, 0.0)
    }

    fn if_match() -> GroupedAction {
        marker(ActionKind::IfColorMatch {
            x: 0,
            y: 0,
            target_color: Rgb::new(0, 0, 0),
            else_jump: None,
        })
    }

    #[test]
    fn test_loop_pairing() {
        let mut actions = vec![
            marker(ActionKind::LoopStart { count: 2 }),
            marker(ActionKind::MouseMove),
            marker(ActionKind::LoopEnd),
        ];
        let flow = ControlFlow::resolve(&mut actions);
        assert!(flow.is_balanced());
        assert_eq!(flow.partner(0), Some(2));
        assert_eq!(flow.jump(2), Some(Jump { target: 1, anchor: 0 }));
    }

    #[test]
    fn test_if_else_end() {
        let mut actions = vec![
            if_match(),
            marker(ActionKind::MouseMove),
            marker(ActionKind::IfColorElse { end_jump: None }),
            marker(ActionKind::MouseMove),
            marker(ActionKind::IfColorEnd),
        ];
        let flow = ControlFlow::resolve(&mut actions);
        assert_eq!(flow.jump(0), Some(Jump { target: 3, anchor: 2 }));
        assert_eq!(flow.jump(2), Some(Jump { target: 4, anchor: 4 }));
        assert!(matches!(
            actions[0].kind,
            ActionKind::IfColorMatch {
                else_jump: Some(2),
                ..
            }
        ));
        assert_eq!(actions[2].kind, ActionKind::IfColorElse { end_jump: Some(4) });
    }

    #[test]
    fn test_if_without_else() {
        let mut actions = vec![
            if_match(),
            marker(ActionKind::MouseMove),
            marker(ActionKind::IfColorEnd),
        ];
        let flow = ControlFlow::resolve(&mut actions);
        assert_eq!(flow.jump(0), Some(Jump { target: 2, anchor: 2 }));
    }

    #[test]
    fn test_unterminated_if_runs_to_end() {
        let mut actions = vec![if_match(), marker(ActionKind::MouseMove)];
        let flow = ControlFlow::resolve(&mut actions);
        assert!(!flow.is_balanced());
        assert_eq!(flow.jump(0), Some(Jump { target: 2, anchor: 0 }));
    }

    #[test]
    fn test_stray_markers_are_reported() {
        let mut actions = vec![
            marker(ActionKind::LoopEnd),
            marker(ActionKind::IfColorEnd),
            marker(ActionKind::LoopStart { count: 0 }),
        ];
        let flow = ControlFlow::resolve(&mut actions);
        assert_eq!(flow.issues().len(), 3);
        assert_eq!(flow.jump(0), None);
    }
}
