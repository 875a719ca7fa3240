//! Sound trigger: stop playback when the audio output gets loud.

use crate::playback::backend::Sensor;
use crate::playback::signal::{SharedStopSignal, StopReason};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

/// Background thread sampling audio amplitude.
///
/// Sampling pauses while `suppressed` is set, so a `WaitSound` action can
/// listen for the same sound without stopping the run.
pub struct SoundTriggerMonitor {
    running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
}

impl SoundTriggerMonitor {
    pub fn start(
        sensor: Arc<dyn Sensor>,
        threshold: f32,
        poll_interval: Duration,
        stop: SharedStopSignal,
        suppressed: Arc<AtomicBool>,
    ) -> Self {
        let running = Arc::new(AtomicBool::new(true));
        let running_clone = running.clone();

        let thread_handle = thread::spawn(move || {
            debug!("Sound trigger armed at amplitude {threshold}");
            let mut reported_error = false;
            while running_clone.load(Ordering::SeqCst) && !stop.is_stopped() {
                if !suppressed.load(Ordering::SeqCst) {
                    match sensor.audio_amplitude() {
                        Ok(amplitude) if amplitude > threshold => {
                            warn!("Sound trigger: amplitude {amplitude:.3} above {threshold}");
                            stop.request(StopReason::SoundTrigger);
                            break;
                        }
                        Ok(_) => {}
                        Err(e) if !reported_error => {
                            warn!("Sound trigger cannot sample audio: {e}");
                            reported_error = true;
                        }
                        Err(_) => {}
                    }
                }
                stop.sleep(poll_interval);
            }
            debug!("Sound trigger disarmed");
        });

        Self {
            running,
            thread_handle: Some(thread_handle),
        }
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SoundTriggerMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}
