//! In-memory device driver
//!
//! Behaves like the APC mini driver without any MIDI ports: it keeps the
//! last-sent light table, fader ground truth and a log of every light write
//! that would have gone out on the wire. Used for `--dry-run` and in tests.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, trace, warn};

use super::{DeviceDriver, DeviceEventHandler};
use crate::button::{ButtonArea, ButtonId, ButtonState, N_FADERS, N_LIGHTS};
use crate::error::DeviceError;

/// One light write as the hardware would receive it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LightWrite {
    pub index: u8,
    pub state: ButtonState,
}

impl LightWrite {
    pub fn new(index: u8, state: ButtonState) -> Self {
        Self { index, state }
    }
}

struct MemoryState {
    lights: [ButtonState; N_LIGHTS],
    faders: [Option<f32>; N_FADERS],
    writes: Vec<LightWrite>,
}

pub struct MemoryDevice {
    state: Mutex<MemoryState>,
    subscriber: Mutex<Option<Arc<dyn DeviceEventHandler>>>,
    events_enabled: AtomicBool,
}

impl MemoryDevice {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState {
                lights: [ButtonState::Off; N_LIGHTS],
                faders: [None; N_FADERS],
                writes: Vec::new(),
            }),
            subscriber: Mutex::new(None),
            events_enabled: AtomicBool::new(true),
        }
    }

    /// Every write so far, in order
    pub fn writes(&self) -> Vec<LightWrite> {
        self.state.lock().writes.clone()
    }

    /// Drain the write log
    pub fn take_writes(&self) -> Vec<LightWrite> {
        std::mem::take(&mut self.state.lock().writes)
    }

    pub fn has_subscriber(&self) -> bool {
        self.subscriber.lock().is_some()
    }

    /// Simulate pressing a button
    pub fn press(&self, button: ButtonId) {
        if let Some(handler) = self.deliverable() {
            handler.on_button_press(button);
        }
    }

    /// Simulate releasing a button
    pub fn release(&self, button: ButtonId) {
        if let Some(handler) = self.deliverable() {
            handler.on_button_release(button);
        }
    }

    /// Simulate moving a fader (`value` in [0, 1])
    pub fn move_fader(&self, index: usize, value: f32) {
        {
            let mut state = self.state.lock();
            match state.faders.get_mut(index) {
                Some(slot) => *slot = Some(value),
                None => {
                    warn!("Ignoring move of unknown fader {}", index);
                    return;
                }
            }
        }
        if let Some(handler) = self.deliverable() {
            handler.on_fader_change(index, value);
        }
    }

    /// Subscriber to deliver to, `None` while events are disabled
    fn deliverable(&self) -> Option<Arc<dyn DeviceEventHandler>> {
        if !self.events_enabled() {
            trace!("Event dropped: delivery disabled");
            return None;
        }
        self.subscriber.lock().clone()
    }
}

impl Default for MemoryDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceDriver for MemoryDevice {
    fn set_light(&self, index: u8, state: ButtonState, force: bool) {
        let mut inner = self.state.lock();
        let Some(slot) = inner.lights.get_mut(index as usize) else {
            warn!("Ignoring write to unmapped light {}", index);
            return;
        };
        if !force && *slot == state {
            return;
        }
        *slot = state;
        inner.writes.push(LightWrite::new(index, state));
    }

    fn light(&self, index: u8) -> ButtonState {
        self.state
            .lock()
            .lights
            .get(index as usize)
            .copied()
            .unwrap_or_default()
    }

    fn fader(&self, index: usize) -> Option<f32> {
        self.state.lock().faders.get(index).copied().flatten()
    }

    fn subscribe(&self, handler: Arc<dyn DeviceEventHandler>) -> Result<(), DeviceError> {
        let mut subscriber = self.subscriber.lock();
        if subscriber.is_some() {
            return Err(DeviceError::AlreadySubscribed);
        }
        *subscriber = Some(handler);
        Ok(())
    }

    fn unsubscribe(&self) {
        self.subscriber.lock().take();
    }

    fn set_events_enabled(&self, enabled: bool) {
        debug!("Memory device events {}", if enabled { "enabled" } else { "disabled" });
        self.events_enabled.store(enabled, Ordering::SeqCst);
    }

    fn events_enabled(&self) -> bool {
        self.events_enabled.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        let batch: Vec<_> = ButtonArea::ALL
            .buttons()
            .map(|button| (button.to_index(), ButtonState::Off))
            .collect();
        self.set_lights(&batch, true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl DeviceEventHandler for Recorder {
        fn on_button_press(&self, button: ButtonId) {
            self.events.lock().push(format!("press {}", button));
        }

        fn on_button_release(&self, button: ButtonId) {
            self.events.lock().push(format!("release {}", button));
        }

        fn on_fader_change(&self, index: usize, value: f32) {
            self.events.lock().push(format!("fader {} {}", index, value));
        }
    }

    #[test]
    fn test_dedup_and_force() {
        let device = MemoryDevice::new();
        device.set_light(10, ButtonState::Green, false);
        device.set_light(10, ButtonState::Green, false);
        device.set_light(10, ButtonState::Green, true);
        device.set_light(200, ButtonState::Green, true);

        assert_eq!(device.writes().len(), 2);
        assert_eq!(device.light(10), ButtonState::Green);
        assert_eq!(device.light(200), ButtonState::Off);
    }

    #[test]
    fn test_reset_writes_every_mapped_light() {
        let device = MemoryDevice::new();
        device.reset();
        let writes = device.take_writes();
        assert_eq!(writes.len(), 81);
        assert!(writes.iter().all(|w| w.state == ButtonState::Off));
        assert!(device.writes().is_empty());
    }

    #[test]
    fn test_single_subscriber() {
        let device = MemoryDevice::new();
        device.subscribe(Arc::new(Recorder::default())).unwrap();
        assert_eq!(
            device.subscribe(Arc::new(Recorder::default())),
            Err(DeviceError::AlreadySubscribed)
        );
        device.unsubscribe();
        assert!(device.subscribe(Arc::new(Recorder::default())).is_ok());
    }

    #[test]
    fn test_injectors_honour_events_flag() {
        let device = MemoryDevice::new();
        let recorder = Arc::new(Recorder::default());
        device.subscribe(recorder.clone()).unwrap();

        device.press(ButtonId::SHIFT);
        device.set_events_enabled(false);
        device.release(ButtonId::SHIFT);
        device.move_fader(4, 0.5);
        device.set_events_enabled(true);
        device.move_fader(4, 0.25);

        assert_eq!(
            *recorder.events.lock(),
            vec!["press shift[0]".to_string(), "fader 4 0.25".to_string()]
        );
        assert_eq!(device.fader(4), Some(0.25));
        assert_eq!(device.fader(5), None);
    }

    #[test]
    fn test_fader_ground_truth_updates_while_disabled() {
        let device = MemoryDevice::new();
        device.set_events_enabled(false);
        device.move_fader(8, 1.0);
        assert_eq!(device.fader(8), Some(1.0));
        device.move_fader(9, 1.0);
        assert_eq!(device.fader(9), None);
    }
}
