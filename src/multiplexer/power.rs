//! Blanking, resync and driver reattachment

use std::sync::Arc;
use tracing::{info, warn};

use super::{borrow, MuxState, Multiplexer};
use crate::device::DeviceDriver;
use crate::error::Result;

/// Lifecycle callbacks of a power-state monitor
pub trait PowerHooks: Send + Sync {
    /// The system is about to sleep
    fn before_suspend(&self);

    /// The system woke up
    fn after_resume(&self);
}

impl PowerHooks for Multiplexer {
    fn before_suspend(&self) {
        if let Err(e) = self.blank(true) {
            warn!("Could not blank device before suspend: {}", e);
        }
    }

    fn after_resume(&self) {
        if let Err(e) = self.blank(false) {
            warn!("Could not restore device after resume: {}", e);
        }
    }
}

impl Multiplexer {
    /// Turn the device dark (`true`) or bring the foreground back (`false`)
    ///
    /// While blanked, proxies keep updating their caches but nothing reaches
    /// the device.
    pub fn blank(&self, blanked: bool) -> Result<()> {
        let guard = self.state.lock();
        let state = borrow(&guard, "blank")?;

        if blanked {
            self.link.set_blanked(true);
            self.link.driver().reset();
            info!("Device blanked");
        } else {
            self.link.set_blanked(false);
            self.replay_foreground(&state);
            info!("Device restored");
        }
        Ok(())
    }

    pub fn is_blanked(&self) -> bool {
        self.link.is_blanked()
    }

    /// Force-rewrite every foreground proxy to the device
    pub fn resync(&self) -> Result<()> {
        let guard = self.state.lock();
        let state = borrow(&guard, "resync")?;
        self.replay_foreground(&state);
        info!("Device resynced");
        Ok(())
    }

    /// Swap in a reconnected driver and resync it
    ///
    /// The new driver is subscribed before the old one is released, so a
    /// refused subscription leaves everything as it was.
    pub fn reattach(&self, driver: Arc<dyn DeviceDriver>) -> Result<()> {
        let retired = {
            let guard = self.state.lock();
            let mut state = borrow(&guard, "reattach")?;

            let current = self.link.driver();
            let retired = if Arc::ptr_eq(&current, &driver) {
                None
            } else {
                self.attach(&driver)?;
                let old = self.link.replace(driver);
                old.set_events_enabled(false);
                old.unsubscribe();
                Some(old)
            };

            // A shift held across the reconnect never sees its release
            state.shift_armed = false;
            self.replay_foreground(&state);
            info!("Device reattached");
            retired
        };

        // Released outside the lock: closing a driver may wait on its
        // dispatcher, which can be blocked on the multiplexer
        drop(retired);
        Ok(())
    }

    fn replay_foreground(&self, state: &MuxState) {
        // Proxies with nothing enabled are background everywhere and skip the replay
        for registration in &state.registrations {
            registration.proxy.replay();
        }
    }
}
