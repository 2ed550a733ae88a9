//! Device driver contract
//!
//! The multiplexer consumes a [`DeviceDriver`] for everything that touches the
//! wire. Drivers are shared as `Arc<dyn DeviceDriver>`, so every method takes
//! `&self` and implementations use interior mutability.

pub mod memory;

pub use memory::{LightWrite, MemoryDevice};

use parking_lot::RwLock;
use std::sync::Arc;

use crate::button::{ButtonId, ButtonState};
use crate::error::DeviceError;

/// Receiver of inbound hardware events (exactly one per driver)
pub trait DeviceEventHandler: Send + Sync {
    fn on_button_press(&self, button: ButtonId);

    fn on_button_release(&self, button: ButtonId);

    /// `value` is normalized to [0, 1]
    fn on_fader_change(&self, index: usize, value: f32);
}

/// Wire-level access to the physical controller
pub trait DeviceDriver: Send + Sync {
    /// Set one light by flat index
    ///
    /// With `force == false` the driver skips the write when the last state it
    /// sent for `index` is already `state`; with `force == true` it always writes.
    fn set_light(&self, index: u8, state: ButtonState, force: bool);

    /// Set several lights in order
    fn set_lights(&self, batch: &[(u8, ButtonState)], force: bool) {
        for &(index, state) in batch {
            self.set_light(index, state, force);
        }
    }

    /// Last state sent for `index`
    fn light(&self, index: u8) -> ButtonState;

    /// Live fader value, `None` until the hardware reported it
    fn fader(&self, index: usize) -> Option<f32>;

    /// Install the single event subscriber
    ///
    /// Fails with [`DeviceError::AlreadySubscribed`] while another subscriber is installed.
    fn subscribe(&self, handler: Arc<dyn DeviceEventHandler>) -> Result<(), DeviceError>;

    /// Remove the current subscriber, if any
    fn unsubscribe(&self);

    /// Gate inbound event delivery (fader ground truth keeps updating)
    fn set_events_enabled(&self, enabled: bool);

    fn events_enabled(&self) -> bool;

    /// Force every light off
    fn reset(&self);
}

/// Inbound hardware event, as queued between the MIDI callback and dispatch
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DeviceEvent {
    Press(ButtonId),
    Release(ButtonId),
    Fader { index: usize, value: f32 },
}

impl DeviceEvent {
    /// Deliver this event to `handler`
    pub fn dispatch(self, handler: &dyn DeviceEventHandler) {
        match self {
            DeviceEvent::Press(button) => handler.on_button_press(button),
            DeviceEvent::Release(button) => handler.on_button_release(button),
            DeviceEvent::Fader { index, value } => handler.on_fader_change(index, value),
        }
    }
}

/// Collapse consecutive moves of the same fader into the latest value
///
/// Button events and moves of different faders act as barriers, so relative
/// order between distinct controls is preserved.
pub fn coalesce(events: Vec<DeviceEvent>) -> Vec<DeviceEvent> {
    let mut out: Vec<DeviceEvent> = Vec::with_capacity(events.len());
    for event in events {
        if let (
            Some(DeviceEvent::Fader { index: last, value: slot }),
            DeviceEvent::Fader { index, value },
        ) = (out.last_mut(), event)
        {
            if *last == index {
                *slot = value;
                continue;
            }
        }
        out.push(event);
    }
    out
}

/// Shared handle on the current driver
///
/// Proxies write through the link rather than holding the driver directly, so
/// the multiplexer can swap in a reconnected driver or blank the device without
/// touching any proxy.
pub struct DeviceLink {
    driver: RwLock<Arc<dyn DeviceDriver>>,
    /// Writes hold this for reading across check and forward, so once
    /// `set_blanked(true)` returns no earlier write can still land
    blanked: RwLock<bool>,
}

impl DeviceLink {
    pub fn new(driver: Arc<dyn DeviceDriver>) -> Self {
        Self {
            driver: RwLock::new(driver),
            blanked: RwLock::new(false),
        }
    }

    /// Current driver
    pub fn driver(&self) -> Arc<dyn DeviceDriver> {
        self.driver.read().clone()
    }

    /// Swap the driver, returning the previous one
    pub(crate) fn replace(&self, driver: Arc<dyn DeviceDriver>) -> Arc<dyn DeviceDriver> {
        std::mem::replace(&mut *self.driver.write(), driver)
    }

    pub fn is_blanked(&self) -> bool {
        *self.blanked.read()
    }

    /// Waits for writes in flight to finish
    pub(crate) fn set_blanked(&self, blanked: bool) {
        *self.blanked.write() = blanked;
    }

    /// Forward a light write unless the device is blanked
    pub fn set_light(&self, index: u8, state: ButtonState, force: bool) {
        let blanked = self.blanked.read();
        if !*blanked {
            self.driver().set_light(index, state, force);
        }
    }

    /// Forward a batch of light writes unless the device is blanked
    pub fn set_lights(&self, batch: &[(u8, ButtonState)], force: bool) {
        let blanked = self.blanked.read();
        if !*blanked && !batch.is_empty() {
            self.driver().set_lights(batch, force);
        }
    }

    pub fn fader(&self, index: usize) -> Option<f32> {
        self.driver().fader(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fader(index: usize, value: f32) -> DeviceEvent {
        DeviceEvent::Fader { index, value }
    }

    #[test]
    fn test_coalesce_merges_runs_of_one_fader() {
        let events = vec![fader(0, 0.1), fader(0, 0.2), fader(0, 0.3), fader(1, 0.5), fader(1, 0.6)];
        assert_eq!(coalesce(events), vec![fader(0, 0.3), fader(1, 0.6)]);
    }

    #[test]
    fn test_coalesce_keeps_barriers() {
        let press = DeviceEvent::Press(ButtonId::SHIFT);
        let events = vec![fader(2, 0.1), press, fader(2, 0.4), fader(3, 0.0), fader(2, 0.9)];
        assert_eq!(
            coalesce(events),
            vec![fader(2, 0.1), press, fader(2, 0.4), fader(3, 0.0), fader(2, 0.9)]
        );
        assert!(coalesce(Vec::new()).is_empty());
    }

    #[test]
    fn test_link_blanking_suppresses_writes() {
        let device = Arc::new(MemoryDevice::new());
        let link = DeviceLink::new(device.clone());

        link.set_light(3, ButtonState::Red, false);
        link.set_blanked(true);
        link.set_light(4, ButtonState::Red, false);
        link.set_lights(&[(5, ButtonState::Green)], true);
        link.set_blanked(false);

        assert_eq!(device.writes(), vec![LightWrite::new(3, ButtonState::Red)]);
    }

    #[test]
    fn test_link_replace() {
        let first = Arc::new(MemoryDevice::new());
        let second = Arc::new(MemoryDevice::new());
        let link = DeviceLink::new(first.clone());

        link.replace(second.clone());
        link.set_light(0, ButtonState::Yellow, false);

        assert!(first.writes().is_empty());
        assert_eq!(second.light(0), ButtonState::Yellow);
    }

    #[test]
    fn test_blanking_waits_for_writes_in_flight() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::thread;
        use std::time::Duration;

        let device = Arc::new(MemoryDevice::new());
        let link = Arc::new(DeviceLink::new(device.clone()));
        let stop = Arc::new(AtomicBool::new(false));

        let writer = {
            let link = link.clone();
            let stop = stop.clone();
            thread::spawn(move || {
                while !stop.load(Ordering::SeqCst) {
                    link.set_light(0, ButtonState::Red, true);
                }
            })
        };

        thread::sleep(Duration::from_millis(10));
        link.set_blanked(true);
        device.reset();
        thread::sleep(Duration::from_millis(10));
        stop.store(true, Ordering::SeqCst);
        writer.join().unwrap();

        assert_eq!(device.light(0), ButtonState::Off);
    }
}
