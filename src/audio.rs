//! Audio device monitoring.
//!
//! The audio collaborator is polled, not pushed: a small owned background
//! thread asks for the current device on an interval and publishes changes
//! through a change-filtered observable. Its lifecycle is tied to the
//! player - started at construction, stopped at teardown - rather than
//! living as process-wide state.

use crate::observe::Observable;
use crate::source::{AudioDevice, DeviceInfo};
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// Owned device-polling task publishing the current output device.
pub struct AudioMonitor {
    device_info: Observable<Option<DeviceInfo>>,
    running: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl AudioMonitor {
    /// Start polling `device`. The first poll happens before this returns,
    /// so `observe_device` has a real value immediately.
    pub fn start(device: Arc<dyn AudioDevice>) -> Self {
        let initial = device.current_device();
        if initial.is_none() {
            warn!("No usable audio device; continuing video-only with audio muted");
        } else {
            info!("Audio device: {:?}", initial.as_ref().map(|d| d.name.as_str()));
        }
        let device_info = Observable::new(initial);

        let running = Arc::new(AtomicBool::new(true));
        let handle = {
            let device_info = device_info.clone();
            let running = Arc::clone(&running);
            thread::Builder::new()
                .name("playhead-audio".to_string())
                .spawn(move || {
                    debug!("Audio monitor started");
                    while running.load(Ordering::Relaxed) {
                        thread::sleep(POLL_INTERVAL);
                        if !running.load(Ordering::Relaxed) {
                            break;
                        }
                        let current = device.current_device();
                        if device_info.set(current.clone()) {
                            match current {
                                Some(info) => info!("Audio device changed: {}", info.name),
                                None => warn!("Audio device lost; muting audio"),
                            }
                        }
                    }
                    debug!("Audio monitor stopped");
                })
                .ok()
        };

        Self {
            device_info,
            running,
            handle,
        }
    }

    /// The current device, None while unavailable.
    pub fn observe_device(&self) -> Observable<Option<DeviceInfo>> {
        self.device_info.clone()
    }

    pub fn device_available(&self) -> bool {
        self.device_info.get().is_some()
    }
}

impl Drop for AudioMonitor {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            // Poll interval bounds the join wait
            let _ = handle.join();
        }
    }
}
