//! Plugins and the plugin registry
//!
//! A plugin believes it owns the areas it registered on. It reacts to events
//! routed by the multiplexer and draws through its [`DeviceProxy`].

use anyhow::Result;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::button::{ButtonArea, ButtonId};
use crate::config::PluginConfig;
use crate::proxy::DeviceProxy;

pub mod console;
pub mod demo;

pub use console::ConsolePlugin;
pub use demo::DemoPlugin;

/// Plugin trait - every multiplexed application implements this
///
/// Note: All methods take &self (not &mut self) to support Arc<dyn Plugin>.
/// Plugins should use interior mutability (Mutex, atomics) for mutable state.
///
/// Hooks run inside the multiplexer's critical section. They may use their
/// own proxy freely but must not call back into the multiplexer; such calls
/// are rejected with [`MuxError::Reentrant`](crate::error::MuxError::Reentrant).
pub trait Plugin: Send + Sync {
    /// Unique instance name
    fn name(&self) -> &str;

    /// Called once with the plugin's private proxy
    fn on_register(&self, _proxy: Arc<DeviceProxy>) {}

    /// Called once before the proxy is discarded
    ///
    /// Must not return before every background thread has stopped using the proxy.
    fn on_unregister(&self) {}

    /// The plugin became foreground on `area` (always a single area)
    fn on_activate(&self, _area: ButtonArea) {}

    /// The plugin lost foreground on `area`
    fn on_deactivate(&self, _area: ButtonArea) {}

    fn on_button_press(&self, _button: ButtonId) {}

    fn on_button_release(&self, _button: ButtonId) {}

    /// A fader moved; `synthetic` is true when replayed on scene switch
    fn on_fader_change(&self, _index: usize, _value: f32, _synthetic: bool) {}
}

/// Factory building a plugin from its configuration entry
pub type PluginFactory = fn(&PluginConfig) -> Result<Arc<dyn Plugin>>;

/// Maps configuration `kind` keys to plugin factories
pub struct PluginRegistry {
    factories: BTreeMap<String, PluginFactory>,
}

impl PluginRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Registry with the built-in `demo` and `console` plugins
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("demo", demo::factory);
        registry.register("console", console::factory);
        registry
    }

    /// Add or replace a factory
    pub fn register(&mut self, kind: impl Into<String>, factory: PluginFactory) {
        self.factories.insert(kind.into(), factory);
    }

    /// Known kinds, sorted
    pub fn kinds(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Instantiate the plugin described by `config`
    pub fn build(&self, config: &PluginConfig) -> Result<Arc<dyn Plugin>> {
        let factory = self.factories.get(&config.kind).ok_or_else(|| {
            anyhow::anyhow!(
                "Unknown plugin kind '{}' for plugin '{}' (known: {})",
                config.kind,
                config.name,
                self.kinds().join(", ")
            )
        })?;
        factory(config)
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(kind: &str, name: &str) -> PluginConfig {
        PluginConfig {
            kind: kind.to_string(),
            name: name.to_string(),
            areas: vec!["matrix".to_string()],
            options: serde_json::Value::Null,
        }
    }

    #[test]
    fn test_builtins_resolve() {
        let registry = PluginRegistry::with_builtins();
        assert_eq!(registry.kinds(), vec!["console", "demo"]);

        let plugin = registry.build(&entry("console", "Logger")).unwrap();
        assert_eq!(plugin.name(), "Logger");
        let plugin = registry.build(&entry("demo", "Demo")).unwrap();
        assert_eq!(plugin.name(), "Demo");
    }

    #[test]
    fn test_unknown_kind() {
        let registry = PluginRegistry::with_builtins();
        let err = registry.build(&entry("pulse", "Mixer")).err().unwrap();
        assert!(err.to_string().contains("Unknown plugin kind 'pulse'"));
    }

    #[test]
    fn test_custom_factory() {
        struct Quiet;
        impl Plugin for Quiet {
            fn name(&self) -> &str {
                "quiet"
            }
        }

        fn quiet(_: &PluginConfig) -> Result<Arc<dyn Plugin>> {
            Ok(Arc::new(Quiet))
        }

        let mut registry = PluginRegistry::new();
        registry.register("quiet", quiet);
        assert_eq!(registry.build(&entry("quiet", "ignored")).unwrap().name(), "quiet");
        assert!(registry.build(&entry("demo", "Demo")).is_err());
    }
}
