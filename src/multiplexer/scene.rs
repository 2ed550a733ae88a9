//! Scene rotation and activation

use tracing::{debug, info};

use super::{borrow, MuxState, Multiplexer, Registration};
use crate::button::ButtonArea;
use crate::error::Result;

impl Multiplexer {
    /// Advance the rotation of every area in `area` (shift is skipped)
    ///
    /// Areas with fewer than two plugins are left alone. Otherwise the current
    /// foreground is deactivated, moved to the back, and the next plugin is
    /// activated with its cached lights replayed.
    pub fn next_scene(&self, area: ButtonArea) -> Result<()> {
        let guard = self.state.lock();
        let mut state = borrow(&guard, "next_scene")?;
        self.next_scene_locked(&mut state, area)
    }

    pub(super) fn next_scene_locked(&self, state: &mut MuxState, area: ButtonArea) -> Result<()> {
        for single in area.split() {
            if single == ButtonArea::SHIFT {
                continue;
            }

            let occupants = state.rotation(single).map_or(0, |rotation| rotation.len());
            if occupants < 2 {
                debug!("Scene {} unchanged ({} plugin(s))", single, occupants);
                continue;
            }

            if let Some(current) = state.head(single) {
                self.deactivate(&current, single)?;
            }
            if let Some(rotation) = state.rotation_mut(single) {
                rotation.rotate_left(1);
            }
            if let Some(next) = state.head(single) {
                self.activate(&next, single)?;
                info!("Scene {} → '{}'", single, next.name);
            }
        }
        Ok(())
    }

    /// Make `registration` foreground on a single area
    ///
    /// Enables the area on the proxy (forced replay of its cache), calls
    /// `on_activate`, and for the horizontal area delivers one synthetic fader
    /// event per fader that moved since the plugin last saw it.
    pub(super) fn activate(&self, registration: &Registration, area: ButtonArea) -> Result<()> {
        registration.proxy.enable_areas(area)?;
        registration.plugin.on_activate(area);

        if area == ButtonArea::HORIZONTAL {
            let changed = registration.proxy.sync_faders(self.options.fader_epsilon);
            for index in changed {
                if let Some(value) = registration.proxy.fader(index)? {
                    registration.plugin.on_fader_change(index, value, true);
                }
            }
        }

        debug!(plugin = %registration.name, area = %area, "Activated");
        Ok(())
    }

    /// Take foreground on a single area away from `registration`
    pub(super) fn deactivate(&self, registration: &Registration, area: ButtonArea) -> Result<()> {
        registration.plugin.on_deactivate(area);
        registration.proxy.disable_areas(area)?;
        debug!(plugin = %registration.name, area = %area, "Deactivated");
        Ok(())
    }
}
