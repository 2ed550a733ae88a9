//! Virtual device proxy
//!
//! Each registration gets one `DeviceProxy`: a plugin-scoped view of the areas
//! the plugin registered on. The proxy always mirrors the plugin's own light
//! state, and forwards writes to the device only for areas the multiplexer has
//! enabled (the areas where the plugin is foreground). Re-enabling an area
//! replays the cached lights with forced writes, so a plugin that drew while
//! backgrounded shows up exactly as it left things.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::button::{ButtonArea, ButtonId, ButtonState, N_FADERS};
use crate::device::DeviceLink;
use crate::error::{MuxError, Result};

struct ProxyState {
    /// Areas whose writes reach the device
    enabled: ButtonArea,
    /// Plugin's own light state, one entry per button in scope
    lights: BTreeMap<ButtonId, ButtonState>,
    /// Last fader values this plugin has seen (present iff horizontal is in scope)
    faders: Option<[Option<f32>; N_FADERS]>,
}

pub struct DeviceProxy {
    plugin: String,
    areas: ButtonArea,
    link: Arc<DeviceLink>,
    inner: Mutex<ProxyState>,
}

impl DeviceProxy {
    /// Blank proxy: every light in scope off, nothing enabled
    ///
    /// The fader mirror starts from the device's current values, so only
    /// later movement is reported by [`DeviceProxy::sync_faders`].
    pub(crate) fn new(plugin: impl Into<String>, areas: ButtonArea, link: Arc<DeviceLink>) -> Self {
        let lights = areas.buttons().map(|id| (id, ButtonState::Off)).collect();
        let faders = areas
            .contains(ButtonArea::HORIZONTAL)
            .then(|| std::array::from_fn(|index| link.fader(index)));

        Self {
            plugin: plugin.into(),
            areas,
            link,
            inner: Mutex::new(ProxyState {
                enabled: ButtonArea::EMPTY,
                lights,
                faders,
            }),
        }
    }

    /// Name of the owning plugin
    pub fn plugin(&self) -> &str {
        &self.plugin
    }

    /// Areas this proxy is scoped to
    pub fn areas(&self) -> ButtonArea {
        self.areas
    }

    /// Areas currently forwarded to the device
    pub fn enabled_areas(&self) -> ButtonArea {
        self.inner.lock().enabled
    }

    pub fn is_area_enabled(&self, area: ButtonArea) -> bool {
        !area.is_empty() && self.inner.lock().enabled.contains(area)
    }

    fn check_button(&self, id: ButtonId) -> Result<()> {
        if self.areas.contains(id.area()) {
            Ok(())
        } else {
            warn!(plugin = %self.plugin, button = %id, "Write outside registered areas rejected");
            Err(MuxError::scope(&self.plugin, id.area(), Some(id)))
        }
    }

    fn check_areas(&self, subset: ButtonArea) -> Result<()> {
        if self.areas.contains(subset) {
            Ok(())
        } else {
            warn!(plugin = %self.plugin, areas = %subset, "Area request outside registered areas rejected");
            Err(MuxError::scope(&self.plugin, subset, None))
        }
    }

    /// Set a light; reaches the device only while its area is enabled
    pub fn set_button(&self, id: ButtonId, state: ButtonState) -> Result<()> {
        self.update_button(id, |_| state).map(|_| ())
    }

    /// Read-modify-write one light under the proxy lock, returning the new state
    pub fn update_button(&self, id: ButtonId, f: impl FnOnce(ButtonState) -> ButtonState) -> Result<ButtonState> {
        self.check_button(id)?;

        let mut inner = self.inner.lock();
        let current = inner.lights.get(&id).copied().unwrap_or_default();
        let state = f(current);
        inner.lights.insert(id, state);
        if inner.enabled.contains(id.area()) {
            self.link.set_light(id.to_index(), state, false);
        }
        Ok(state)
    }

    /// [`DeviceProxy::set_button`] addressed by flat hardware index
    pub fn set_button_index(&self, index: u8, state: ButtonState) -> Result<()> {
        self.set_button(ButtonId::from_index(index)?, state)
    }

    /// The plugin's own cached state for `id`
    pub fn button(&self, id: ButtonId) -> Result<ButtonState> {
        self.check_button(id)?;
        Ok(self
            .inner
            .lock()
            .lights
            .get(&id)
            .copied()
            .unwrap_or_default())
    }

    /// Cached lights of `area` (may be a combination) in flat index order
    pub fn snapshot(&self, area: ButtonArea) -> Result<Vec<(ButtonId, ButtonState)>> {
        self.check_areas(area)?;
        Ok(self
            .inner
            .lock()
            .lights
            .iter()
            .filter(|(id, _)| area.contains(id.area()))
            .map(|(id, state)| (*id, *state))
            .collect())
    }

    /// Start forwarding `subset` and push its cache to the device in one forced batch
    pub fn enable_areas(&self, subset: ButtonArea) -> Result<()> {
        self.check_areas(subset)?;

        let mut inner = self.inner.lock();
        inner.enabled |= subset;
        let batch = Self::batch(&inner, subset);
        debug!(plugin = %self.plugin, areas = %subset, lights = batch.len(), "Areas enabled");
        self.link.set_lights(&batch, true);
        Ok(())
    }

    /// Stop forwarding `subset`; no hardware writes
    pub fn disable_areas(&self, subset: ButtonArea) -> Result<()> {
        self.check_areas(subset)?;

        let mut inner = self.inner.lock();
        inner.enabled = inner.enabled - subset;
        debug!(plugin = %self.plugin, areas = %subset, "Areas disabled");
        Ok(())
    }

    /// Force-rewrite the cache of every enabled area
    pub fn replay(&self) {
        let inner = self.inner.lock();
        if inner.enabled.is_empty() {
            return;
        }
        let batch = Self::batch(&inner, inner.enabled);
        self.link.set_lights(&batch, true);
    }

    fn batch(inner: &ProxyState, areas: ButtonArea) -> Vec<(u8, ButtonState)> {
        // BTreeMap order is flat index order, which is split order
        inner
            .lights
            .iter()
            .filter(|(id, _)| areas.contains(id.area()))
            .map(|(id, state)| (id.to_index(), *state))
            .collect()
    }

    /// Pull live fader values into the mirror
    ///
    /// Returns the indices (ascending) whose known live value differs from the
    /// mirror by more than `epsilon`. Empty without a mirror.
    pub fn sync_faders(&self, epsilon: f32) -> Vec<usize> {
        let mut inner = self.inner.lock();
        let Some(mirror) = inner.faders.as_mut() else {
            return Vec::new();
        };

        let mut changed = Vec::new();
        for (index, seen) in mirror.iter_mut().enumerate() {
            let Some(live) = self.link.fader(index) else {
                continue;
            };
            let differs = match *seen {
                Some(old) => (live - old).abs() > epsilon,
                None => true,
            };
            if differs {
                *seen = Some(live);
                changed.push(index);
            }
        }
        changed
    }

    /// Record a fader value the plugin has been told about
    pub fn update_fader(&self, index: usize, value: f32) -> Result<()> {
        if index >= N_FADERS {
            return Err(MuxError::out_of_range("fader index", index as i64, "0..9"));
        }
        if let Some(mirror) = self.inner.lock().faders.as_mut() {
            mirror[index] = Some(value);
        }
        Ok(())
    }

    /// Mirrored fader value; `None` if unknown or without a mirror
    pub fn fader(&self, index: usize) -> Result<Option<f32>> {
        if index >= N_FADERS {
            return Err(MuxError::out_of_range("fader index", index as i64, "0..9"));
        }
        Ok(self.inner.lock().faders.and_then(|mirror| mirror[index]))
    }

    /// The whole fader mirror, `None` unless horizontal is in scope
    pub fn faders(&self) -> Option<[Option<f32>; N_FADERS]> {
        self.inner.lock().faders
    }
}

impl std::fmt::Debug for DeviceProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceProxy")
            .field("plugin", &self.plugin)
            .field("areas", &self.areas)
            .field("enabled", &self.enabled_areas())
            .finish()
    }
}
