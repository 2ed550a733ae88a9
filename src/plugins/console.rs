//! Console plugin - logs all events for testing and debugging
//!
//! Useful for:
//! - Checking which plugin receives which event
//! - Watching scene switches without writing a real plugin
//! - Development without a device (`--dry-run`)
//!
//! Held buttons light up green and go dark on release.

use anyhow::Result;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::Plugin;
use crate::button::{ButtonArea, ButtonId, ButtonState};
use crate::config::PluginConfig;
use crate::proxy::DeviceProxy;

pub struct ConsolePlugin {
    name: String,
    proxy: Mutex<Option<Arc<DeviceProxy>>>,
    /// Event counter for debugging
    event_count: AtomicU64,
}

impl ConsolePlugin {
    /// Create a new ConsolePlugin with a given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            proxy: Mutex::new(None),
            event_count: AtomicU64::new(0),
        }
    }

    /// Number of press, release and fader events seen
    pub fn event_count(&self) -> u64 {
        self.event_count.load(Ordering::Relaxed)
    }

    fn count(&self) -> u64 {
        self.event_count.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn light(&self, button: ButtonId, state: ButtonState) {
        if let Some(proxy) = self.proxy.lock().as_ref() {
            if let Err(e) = proxy.set_button(button, state) {
                warn!("ConsolePlugin '{}': {}", self.name, e);
            }
        }
    }
}

pub(crate) fn factory(config: &PluginConfig) -> Result<Arc<dyn Plugin>> {
    Ok(Arc::new(ConsolePlugin::new(config.name.clone())))
}

impl Plugin for ConsolePlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_register(&self, proxy: Arc<DeviceProxy>) {
        info!("🔌 ConsolePlugin '{}' registered on {}", self.name, proxy.areas());
        *self.proxy.lock() = Some(proxy);
    }

    fn on_unregister(&self) {
        self.proxy.lock().take();
        info!(
            "🛑 ConsolePlugin '{}' unregistered (saw {} events)",
            self.name,
            self.event_count()
        );
    }

    fn on_activate(&self, area: ButtonArea) {
        info!("✅ ConsolePlugin '{}' active on {}", self.name, area);
    }

    fn on_deactivate(&self, area: ButtonArea) {
        info!("💤 ConsolePlugin '{}' inactive on {}", self.name, area);
    }

    fn on_button_press(&self, button: ButtonId) {
        let n = self.count();
        info!("🎮 ConsolePlugin '{}' → press {} [event #{}]", self.name, button, n);
        debug!(plugin = %self.name, index = button.to_index(), "ConsolePlugin press");
        self.light(button, ButtonState::Green);
    }

    fn on_button_release(&self, button: ButtonId) {
        let n = self.count();
        info!("🎮 ConsolePlugin '{}' → release {} [event #{}]", self.name, button, n);
        self.light(button, ButtonState::Off);
    }

    fn on_fader_change(&self, index: usize, value: f32, synthetic: bool) {
        let n = self.count();
        info!(
            "🎚️  ConsolePlugin '{}' → fader {} = {:.3}{} [event #{}]",
            self.name,
            index,
            value,
            if synthetic { " (sync)" } else { "" },
            n
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceDriver, DeviceLink, MemoryDevice};

    #[test]
    fn test_console_plugin_lifecycle() {
        let device = Arc::new(MemoryDevice::new());
        let link = Arc::new(DeviceLink::new(device.clone()));
        let proxy = Arc::new(DeviceProxy::new("test", ButtonArea::VERTICAL, link));
        let plugin = ConsolePlugin::new("test");

        assert_eq!(plugin.name(), "test");
        plugin.on_register(proxy.clone());
        proxy.enable_areas(ButtonArea::VERTICAL).unwrap();

        let button = ButtonId::vertical(2).unwrap();
        plugin.on_button_press(button);
        assert_eq!(device.light(button.to_index()), ButtonState::Green);
        plugin.on_button_release(button);
        assert_eq!(device.light(button.to_index()), ButtonState::Off);
        plugin.on_fader_change(0, 0.5, true);

        assert_eq!(plugin.event_count(), 3);
        plugin.on_unregister();

        // Events after unregistration are still counted but draw nothing
        plugin.on_button_press(button);
        assert_eq!(proxy.button(button).unwrap(), ButtonState::Off);
    }

    #[test]
    fn test_console_plugin_out_of_scope_press() {
        let link = Arc::new(DeviceLink::new(Arc::new(MemoryDevice::new())));
        let proxy = Arc::new(DeviceProxy::new("test", ButtonArea::VERTICAL, link));
        let plugin = ConsolePlugin::new("test");
        plugin.on_register(proxy);

        // Logged as a warning, not a panic
        plugin.on_button_press(ButtonId::matrix(0, 0).unwrap());
        assert_eq!(plugin.event_count(), 1);
    }
}
