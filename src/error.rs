//! Error types for the multiplexer core
//!
//! Every variant here is a contract violation by a caller (a plugin, the wiring
//! code, or a driver implementation). They are returned, logged with enough
//! context to find the culprit, and never leave partially-applied state behind.

use thiserror::Error;

use crate::button::{ButtonArea, ButtonId};

/// Errors raised by a [`DeviceDriver`](crate::device::DeviceDriver) subscription
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    /// The driver already delivers its events to another subscriber
    #[error("device already has an event subscriber")]
    AlreadySubscribed,
}

/// Errors raised by the addressing model, proxies and the multiplexer
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MuxError {
    /// An ordinal, flat index, coordinate, velocity or fader index is outside its range
    #[error("{what} {value} out of range (valid: {valid})")]
    OutOfRange {
        what: &'static str,
        value: i64,
        valid: &'static str,
    },

    /// A plugin touched a button or area it is not registered on
    #[error("plugin '{plugin}' is not registered on area {area} (requested {button})")]
    ScopeViolation {
        plugin: String,
        area: ButtonArea,
        button: String,
    },

    /// A registration asked for no areas, or for the reserved shift area
    #[error("plugin '{plugin}' cannot register on areas '{areas}' (must be a non-empty subset of matrix|horizontal|vertical)")]
    InvalidScope { plugin: String, areas: ButtonArea },

    /// A plugin with this name is already registered
    #[error("plugin '{plugin}' is already registered")]
    DuplicateRegistration { plugin: String },

    /// No plugin with this name is registered
    #[error("plugin '{plugin}' is not registered")]
    UnknownPlugin { plugin: String },

    /// The multiplexer was re-entered from inside a plugin hook
    #[error("multiplexer re-entered from a plugin hook during '{operation}'")]
    Reentrant { operation: &'static str },

    /// The device driver refused the subscription
    #[error(transparent)]
    Device(#[from] DeviceError),
}

impl MuxError {
    pub(crate) fn out_of_range(what: &'static str, value: impl Into<i64>, valid: &'static str) -> Self {
        MuxError::OutOfRange {
            what,
            value: value.into(),
            valid,
        }
    }

    pub(crate) fn scope(plugin: &str, area: ButtonArea, button: Option<ButtonId>) -> Self {
        MuxError::ScopeViolation {
            plugin: plugin.to_string(),
            area,
            button: button
                .map(|b| b.to_string())
                .unwrap_or_else(|| "(area)".to_string()),
        }
    }

    /// Returns true if this is a scope violation
    pub fn is_scope_violation(&self) -> bool {
        matches!(self, MuxError::ScopeViolation { .. })
    }

    /// Returns true if this is an out-of-range conversion
    pub fn is_out_of_range(&self) -> bool {
        matches!(self, MuxError::OutOfRange { .. })
    }
}

/// Result type for core operations
pub type Result<T> = std::result::Result<T, MuxError>;
