//! Configuration management for apc-mux
//!
//! Handles loading, parsing and validation of the YAML configuration file.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tokio::fs;

use crate::button::ButtonArea;
use crate::multiplexer::MuxOptions;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub multiplexer: MultiplexerConfig,
    #[serde(default)]
    pub plugins: Vec<PluginConfig>,
}

/// MIDI port selection for the APC mini
///
/// Both ports are matched by case-insensitive substring. When absent, the
/// first port whose name contains `APC MINI` is used.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DeviceConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_port: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_port: Option<String>,
}

/// Multiplexer tuning
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MultiplexerConfig {
    /// Minimum fader difference reported as a change on scene switch
    #[serde(default = "default_fader_epsilon")]
    pub fader_epsilon: f32,
}

impl Default for MultiplexerConfig {
    fn default() -> Self {
        Self {
            fader_epsilon: default_fader_epsilon(),
        }
    }
}

/// One plugin instance to register at startup
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PluginConfig {
    /// Registry key (e.g. "demo", "console")
    pub kind: String,
    /// Unique instance name
    pub name: String,
    /// Areas to register on: matrix, horizontal, vertical
    pub areas: Vec<String>,
    /// Plugin-specific options, passed to the factory
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub options: serde_json::Value,
}

impl PluginConfig {
    /// Combined area set, rejecting unknown names, shift and empty lists
    pub fn area_set(&self) -> Result<ButtonArea> {
        if self.areas.is_empty() {
            anyhow::bail!("Plugin '{}' must list at least one area", self.name);
        }

        let mut areas = ButtonArea::EMPTY;
        for name in &self.areas {
            let area: ButtonArea = name
                .parse()
                .with_context(|| format!("Invalid area in plugin '{}'", self.name))?;
            if area.intersects(ButtonArea::SHIFT) {
                anyhow::bail!("Plugin '{}' cannot register on the shift button", self.name);
            }
            areas |= area;
        }
        Ok(areas)
    }

    /// Deserialize the options block, falling back to defaults when absent
    pub fn options<T: DeserializeOwned + Default>(&self) -> Result<T> {
        if self.options.is_null() {
            return Ok(T::default());
        }
        serde_json::from_value(self.options.clone())
            .with_context(|| format!("Invalid options for plugin '{}'", self.name))
    }
}

impl AppConfig {
    /// Load configuration from file with validation
    pub async fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path))?;

        Self::parse(&contents).with_context(|| format!("Invalid config file: {}", path))
    }

    /// Parse and validate a YAML document
    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig =
            serde_yaml::from_str(contents).context("Failed to parse YAML config")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration for correctness and consistency
    pub fn validate(&self) -> Result<()> {
        let epsilon = self.multiplexer.fader_epsilon;
        if !epsilon.is_finite() || !(0.0..1.0).contains(&epsilon) {
            anyhow::bail!("multiplexer.fader_epsilon {} is invalid (must be in [0, 1))", epsilon);
        }

        if let Some(port) = &self.device.input_port {
            if port.trim().is_empty() {
                anyhow::bail!("device.input_port cannot be empty (omit it for auto-discovery)");
            }
        }
        if let Some(port) = &self.device.output_port {
            if port.trim().is_empty() {
                anyhow::bail!("device.output_port cannot be empty (omit it for auto-discovery)");
            }
        }

        let mut names = HashSet::new();
        for (idx, plugin) in self.plugins.iter().enumerate() {
            if plugin.name.trim().is_empty() {
                anyhow::bail!("Plugin {} name cannot be empty", idx);
            }
            if plugin.kind.trim().is_empty() {
                anyhow::bail!("Plugin '{}' kind cannot be empty", plugin.name);
            }
            if !names.insert(plugin.name.as_str()) {
                anyhow::bail!("Plugin name '{}' is used more than once", plugin.name);
            }
            plugin.area_set()?;
        }

        Ok(())
    }

    /// Multiplexer options derived from this configuration
    pub fn mux_options(&self) -> MuxOptions {
        MuxOptions {
            fader_epsilon: self.multiplexer.fader_epsilon,
        }
    }
}

// Default value functions
fn default_fader_epsilon() -> f32 { 0.0 }

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"
device:
  input_port: "APC MINI"
multiplexer:
  fader_epsilon: 0.01
plugins:
  - kind: demo
    name: Demo
    areas: [matrix, horizontal]
    options: { interval_ms: 500 }
  - kind: console
    name: Logger
    areas: [vertical]
"#;

    #[tokio::test]
    async fn test_load_from_file() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config_path = temp_dir.path().join("config.yaml");
        fs::write(&config_path, SAMPLE)?;

        let config = AppConfig::load(&config_path.to_string_lossy()).await?;

        assert_eq!(config.device.input_port.as_deref(), Some("APC MINI"));
        assert_eq!(config.device.output_port, None);
        assert_eq!(config.plugins.len(), 2);
        assert_eq!(
            config.plugins[0].area_set()?,
            ButtonArea::MATRIX | ButtonArea::HORIZONTAL
        );
        assert_eq!(config.plugins[0].options["interval_ms"], 500);
        assert!(config.plugins[1].options.is_null());
        assert_eq!(config.mux_options().fader_epsilon, 0.01);
        Ok(())
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nope.yaml");
        assert!(AppConfig::load(&path.to_string_lossy()).await.is_err());
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::parse("{}").unwrap();
        assert!(config.plugins.is_empty());
        assert_eq!(config.multiplexer.fader_epsilon, 0.0);
        assert!(config.device.input_port.is_none());
    }

    #[test]
    fn test_rejects_duplicate_names() {
        let yaml = r#"
plugins:
  - { kind: console, name: A, areas: [matrix] }
  - { kind: console, name: A, areas: [vertical] }
"#;
        let err = AppConfig::parse(yaml).unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn test_rejects_bad_areas() {
        for areas in ["[]", "[shift]", "[matrix, fader]", "[\"matrix|shift\"]"] {
            let yaml = format!("plugins:\n  - {{ kind: console, name: A, areas: {} }}\n", areas);
            assert!(AppConfig::parse(&yaml).is_err(), "areas {} should be rejected", areas);
        }
    }

    #[test]
    fn test_rejects_bad_epsilon() {
        assert!(AppConfig::parse("multiplexer: { fader_epsilon: 1.5 }").is_err());
        assert!(AppConfig::parse("multiplexer: { fader_epsilon: -0.1 }").is_err());
        assert!(AppConfig::parse("multiplexer: { fader_epsilon: 0.5 }").is_ok());
    }

    #[test]
    fn test_typed_options() {
        #[derive(Debug, Default, Deserialize)]
        struct Opts {
            #[serde(default)]
            interval_ms: u64,
        }

        let config = AppConfig::parse(SAMPLE).unwrap();
        let opts: Opts = config.plugins[0].options().unwrap();
        assert_eq!(opts.interval_ms, 500);
        let opts: Opts = config.plugins[1].options().unwrap();
        assert_eq!(opts.interval_ms, 0);
    }
}
