//! Collaborator interfaces the scheduler drives: input actuation, screen and
//! audio sensing, and loading of nested macros.
//!
//! OS-level implementations live outside this crate. The recording actuator
//! and scripted sensor here back dry runs and tests.

use crate::event::{MouseButton, Point, Rgb};
use crate::grouping::GroupingConfig;
use crate::timeline::document::{load_timeline, DocumentError};
use crate::timeline::ActionTimeline;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Errors raised by actuation or sensing backends.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("{0} is not available")]
    Unavailable(String),
    #[error("{0}")]
    Failed(String),
    #[error("cannot load macro {path}: {source}")]
    Macro {
        path: PathBuf,
        #[source]
        source: DocumentError,
    },
}

/// Synthesizes pointer and keyboard input.
pub trait Actuator: Send + Sync {
    fn move_pointer(&self, x: i32, y: i32) -> Result<(), BackendError>;
    fn pointer_position(&self) -> Result<Point, BackendError>;
    fn press_button(&self, button: MouseButton) -> Result<(), BackendError>;
    fn release_button(&self, button: MouseButton) -> Result<(), BackendError>;
    fn click(&self, button: MouseButton) -> Result<(), BackendError>;
    fn double_click(&self, button: MouseButton) -> Result<(), BackendError>;
    /// Press at `from`, move to `to` over `duration`, release.
    fn drag(&self, button: MouseButton, from: Point, to: Point, duration: Duration) -> Result<(), BackendError>;
    fn press_key(&self, key: &str) -> Result<(), BackendError>;
    fn release_key(&self, key: &str) -> Result<(), BackendError>;
    fn scroll(&self, delta: f64) -> Result<(), BackendError>;
}

/// Samples the screen and the audio output.
pub trait Sensor: Send + Sync {
    fn pixel_color(&self, x: i32, y: i32) -> Result<Rgb, BackendError>;
    /// Peak amplitude of the current audio block, 0.0..=1.0
    fn audio_amplitude(&self) -> Result<f32, BackendError>;
}

/// Resolves the path of a `CallMacro` action to a timeline.
pub trait MacroLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<ActionTimeline, BackendError>;
}

/// Loads nested macros from documents on disk.
#[derive(Debug, Clone, Default)]
pub struct DocumentLoader {
    /// Directory relative paths are resolved against
    base_dir: Option<PathBuf>,
    grouping: GroupingConfig,
}

impl DocumentLoader {
    pub fn new(grouping: GroupingConfig) -> Self {
        Self {
            base_dir: None,
            grouping,
        }
    }

    /// Resolve relative paths against the directory of the calling document.
    pub fn relative_to(mut self, document: &Path) -> Self {
        self.base_dir = document.parent().map(Path::to_path_buf);
        self
    }

    pub fn resolve(&self, path: &Path) -> PathBuf {
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }
}

impl MacroLoader for DocumentLoader {
    fn load(&self, path: &Path) -> Result<ActionTimeline, BackendError> {
        let resolved = self.resolve(path);
        load_timeline(&resolved, self.grouping.clone()).map_err(|source| BackendError::Macro {
            path: resolved,
            source,
        })
    }
}

/// One call made on a [`RecordingActuator`].
#[derive(Debug, Clone, PartialEq)]
pub enum ActuatorCall {
    Move(Point),
    Press(MouseButton),
    Release(MouseButton),
    Click(MouseButton),
    DoubleClick(MouseButton),
    Drag {
        button: MouseButton,
        from: Point,
        to: Point,
        duration: Duration,
    },
    KeyDown(String),
    KeyUp(String),
    Scroll(f64),
}

impl ActuatorCall {
    /// Number of button clicks this call produces.
    pub fn clicks(&self) -> usize {
        match self {
            ActuatorCall::Click(_) => 1,
            ActuatorCall::DoubleClick(_) => 2,
            _ => 0,
        }
    }
}

/// Actuator that performs nothing and records every call with its time offset.
#[derive(Debug)]
pub struct RecordingActuator {
    created: Instant,
    position: Mutex<Point>,
    calls: Mutex<Vec<(Duration, ActuatorCall)>>,
}

impl Default for RecordingActuator {
    fn default() -> Self {
        Self::new((0, 0))
    }
}

impl RecordingActuator {
    /// Create an actuator whose simulated pointer starts at `position`.
    pub fn new(position: Point) -> Self {
        Self {
            created: Instant::now(),
            position: Mutex::new(position),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<ActuatorCall> {
        lock(&self.calls).iter().map(|(_, call)| call.clone()).collect()
    }

    /// Calls paired with the time since the actuator was created.
    pub fn timed_calls(&self) -> Vec<(Duration, ActuatorCall)> {
        lock(&self.calls).clone()
    }

    pub fn click_count(&self) -> usize {
        lock(&self.calls).iter().map(|(_, call)| call.clicks()).sum()
    }

    pub fn clear(&self) {
        lock(&self.calls).clear();
    }

    fn record(&self, call: ActuatorCall) {
        let at = self.created.elapsed();
        match &call {
            ActuatorCall::Move(point) => *lock(&self.position) = *point,
            ActuatorCall::Drag { to, .. } => *lock(&self.position) = *to,
            _ => {}
        }
        lock(&self.calls).push((at, call));
    }
}

impl Actuator for RecordingActuator {
    fn move_pointer(&self, x: i32, y: i32) -> Result<(), BackendError> {
        self.record(ActuatorCall::Move((x, y)));
        Ok(())
    }

    fn pointer_position(&self) -> Result<Point, BackendError> {
        Ok(*lock(&self.position))
    }

    fn press_button(&self, button: MouseButton) -> Result<(), BackendError> {
        self.record(ActuatorCall::Press(button));
        Ok(())
    }

    fn release_button(&self, button: MouseButton) -> Result<(), BackendError> {
        self.record(ActuatorCall::Release(button));
        Ok(())
    }

    fn click(&self, button: MouseButton) -> Result<(), BackendError> {
        self.record(ActuatorCall::Click(button));
        Ok(())
    }

    fn double_click(&self, button: MouseButton) -> Result<(), BackendError> {
        self.record(ActuatorCall::DoubleClick(button));
        Ok(())
    }

    fn drag(&self, button: MouseButton, from: Point, to: Point, duration: Duration) -> Result<(), BackendError> {
        self.record(ActuatorCall::Drag {
            button,
            from,
            to,
            duration,
        });
        Ok(())
    }

    fn press_key(&self, key: &str) -> Result<(), BackendError> {
        self.record(ActuatorCall::KeyDown(key.to_string()));
        Ok(())
    }

    fn release_key(&self, key: &str) -> Result<(), BackendError> {
        self.record(ActuatorCall::KeyUp(key.to_string()));
        Ok(())
    }

    fn scroll(&self, delta: f64) -> Result<(), BackendError> {
        self.record(ActuatorCall::Scroll(delta));
        Ok(())
    }
}

/// Sensor that replays queued samples, then repeats a fallback value.
#[derive(Debug)]
pub struct ScriptedSensor {
    colors: Mutex<VecDeque<Rgb>>,
    fallback_color: Rgb,
    amplitudes: Mutex<VecDeque<f32>>,
    fallback_amplitude: f32,
    color_samples: AtomicUsize,
}

impl ScriptedSensor {
    /// Always report `color` and silence.
    pub fn new(color: Rgb) -> Self {
        Self {
            colors: Mutex::new(VecDeque::new()),
            fallback_color: color,
            amplitudes: Mutex::new(VecDeque::new()),
            fallback_amplitude: 0.0,
            color_samples: AtomicUsize::new(0),
        }
    }

    /// Report these colors first, one per sample.
    pub fn with_colors(self, colors: impl IntoIterator<Item = Rgb>) -> Self {
        lock(&self.colors).extend(colors);
        self
    }

    /// Report these amplitudes first, then `fallback`.
    pub fn with_amplitudes(mut self, amplitudes: impl IntoIterator<Item = f32>, fallback: f32) -> Self {
        lock(&self.amplitudes).extend(amplitudes);
        self.fallback_amplitude = fallback;
        self
    }

    /// Number of pixel samples taken so far.
    pub fn color_samples(&self) -> usize {
        self.color_samples.load(Ordering::SeqCst)
    }
}

impl Sensor for ScriptedSensor {
    fn pixel_color(&self, _x: i32, _y: i32) -> Result<Rgb, BackendError> {
        self.color_samples.fetch_add(1, Ordering::SeqCst);
        Ok(lock(&self.colors).pop_front().unwrap_or(self.fallback_color))
    }

    fn audio_amplitude(&self) -> Result<f32, BackendError> {
        Ok(lock(&self.amplitudes)
            .pop_front()
            .unwrap_or(self.fallback_amplitude))
    }
}

/// Lock a mutex, recovering the data if a panicking thread poisoned it.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_actuator_tracks_pointer() {
        let actuator = RecordingActuator::new((5, 5));
        assert_eq!(actuator.pointer_position().unwrap(), (5, 5));
        actuator.move_pointer(10, 20).unwrap();
        actuator.click(MouseButton::Left).unwrap();
        actuator.double_click(MouseButton::Left).unwrap();
        assert_eq!(actuator.pointer_position().unwrap(), (10, 20));
        assert_eq!(actuator.click_count(), 3);
        assert_eq!(actuator.calls()[0], ActuatorCall::Move((10, 20)));
    }

    #[test]
    fn test_scripted_sensor_falls_back() {
        let sensor = ScriptedSensor::new(Rgb::new(1, 1, 1)).with_colors([Rgb::new(9, 9, 9)]);
        assert_eq!(sensor.pixel_color(0, 0).unwrap(), Rgb::new(9, 9, 9));
        assert_eq!(sensor.pixel_color(0, 0).unwrap(), Rgb::new(1, 1, 1));
        assert_eq!(sensor.color_samples(), 2);
        assert_eq!(sensor.audio_amplitude().unwrap(), 0.0);
    }

    #[test]
    fn test_loader_resolves_relative_paths() {
        let loader = DocumentLoader::default().relative_to(Path::new("/macros/main.json"));
        assert_eq!(
            loader.resolve(Path::new("sub.json")),
            PathBuf::from("/macros/sub.json")
        );
        assert_eq!(
            loader.resolve(Path::new("/abs/other.json")),
            PathBuf::from("/abs/other.json")
        );
    }

    #[test]
    fn test_loader_reports_missing_file() {
        let loader = DocumentLoader::default();
        let err = loader.load(Path::new("/nonexistent/macro.json")).unwrap_err();
        assert!(matches!(err, BackendError::Macro { .. }));
    }
}
