//! Inbound event routing
//!
//! Shift is never delivered to plugins. While it is held, pressing any other
//! button advances the rotation of that button's area instead of being
//! delivered, and the matching release is swallowed.

use std::sync::Weak;
use tracing::{trace, warn};

use super::{borrow, Multiplexer};
use crate::button::{ButtonArea, ButtonId, N_FADERS};
use crate::device::DeviceEventHandler;
use crate::error::{MuxError, Result};

/// The multiplexer's driver subscription
pub(super) struct EventSink {
    mux: Weak<Multiplexer>,
}

impl EventSink {
    pub(super) fn new(mux: Weak<Multiplexer>) -> Self {
        Self { mux }
    }
}

impl DeviceEventHandler for EventSink {
    fn on_button_press(&self, button: ButtonId) {
        if let Some(mux) = self.mux.upgrade() {
            if let Err(e) = mux.handle_press(button) {
                warn!("Press {} dropped: {}", button, e);
            }
        }
    }

    fn on_button_release(&self, button: ButtonId) {
        if let Some(mux) = self.mux.upgrade() {
            if let Err(e) = mux.handle_release(button) {
                warn!("Release {} dropped: {}", button, e);
            }
        }
    }

    fn on_fader_change(&self, index: usize, value: f32) {
        if let Some(mux) = self.mux.upgrade() {
            if let Err(e) = mux.handle_fader(index, value) {
                warn!("Fader {} change dropped: {}", index, e);
            }
        }
    }
}

impl Multiplexer {
    pub(super) fn handle_press(&self, button: ButtonId) -> Result<()> {
        let guard = self.state.lock();
        let mut state = borrow(&guard, "button press")?;

        if button.is_shift() {
            state.shift_armed = true;
            trace!("Shift armed");
            return Ok(());
        }
        if state.shift_armed {
            return self.next_scene_locked(&mut state, button.area());
        }

        match state.head(button.area()) {
            Some(head) => head.plugin.on_button_press(button),
            None => trace!("Press {} ignored: no plugin on {}", button, button.area()),
        }
        Ok(())
    }

    pub(super) fn handle_release(&self, button: ButtonId) -> Result<()> {
        let guard = self.state.lock();
        let mut state = borrow(&guard, "button release")?;

        if button.is_shift() {
            state.shift_armed = false;
            trace!("Shift disarmed");
            return Ok(());
        }
        if state.shift_armed {
            trace!("Release {} swallowed by shift gesture", button);
            return Ok(());
        }

        match state.head(button.area()) {
            Some(head) => head.plugin.on_button_release(button),
            None => trace!("Release {} ignored: no plugin on {}", button, button.area()),
        }
        Ok(())
    }

    /// Faders belong to whoever holds the horizontal area
    pub(super) fn handle_fader(&self, index: usize, value: f32) -> Result<()> {
        if index >= N_FADERS {
            return Err(MuxError::out_of_range("fader index", index as i64, "0..9"));
        }

        let guard = self.state.lock();
        let state = borrow(&guard, "fader change")?;

        match state.head(ButtonArea::HORIZONTAL) {
            Some(head) => {
                head.plugin.on_fader_change(index, value, false);
                head.proxy.update_fader(index, value)?;
            }
            None => trace!("Fader {} ignored: no plugin on horizontal", index),
        }
        Ok(())
    }
}
