//! apc-mux - share one Akai APC mini between several plugins
//!
//! The controller surface is split into areas (the 8x8 matrix, the horizontal
//! row, the vertical column and shift). Plugins register for one or more
//! areas; per area, the [`Multiplexer`] keeps a rotation of plugins and only
//! the head of that rotation talks to the hardware. Holding shift and pressing
//! a button in an area brings the next plugin of that area to the front.
//!
//! Each registration gets a [`DeviceProxy`] that mirrors its own lights while
//! in the background and replays them when its area comes back.

pub mod apc;
pub mod button;
pub mod config;
pub mod device;
pub mod error;
pub mod midi;
pub mod multiplexer;
pub mod plugins;
pub mod proxy;

pub use button::{ButtonArea, ButtonId, ButtonState};
pub use device::{DeviceDriver, DeviceEventHandler, MemoryDevice};
pub use error::{DeviceError, MuxError};
pub use multiplexer::{Multiplexer, MuxOptions, PowerHooks};
pub use plugins::{Plugin, PluginRegistry};
pub use proxy::DeviceProxy;
