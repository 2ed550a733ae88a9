//! Addressing model of the APC mini
//!
//! Pure mapping between the flat hardware index space (MIDI note numbers) and
//! structured `(area, ordinal)` button identities. No I/O.
//!
//! | area       | flat indices | ordinals |
//! |------------|--------------|----------|
//! | matrix     | 0..64        | 0..64 (`row * 8 + col`) |
//! | horizontal | 64..72       | 0..8     |
//! | vertical   | 82..90       | 0..8     |
//! | shift      | 98           | 0        |

mod area;
mod id;
mod state;

pub use area::{ButtonArea, ParseAreaError};
pub use id::{coords_to_ordinal, ordinal_to_coords, ButtonId};
pub use state::ButtonState;

pub const MATRIX_COLUMNS: u8 = 8;
pub const MATRIX_ROWS: u8 = 8;

/// Physical faders: 8 channel faders plus the master
pub const N_FADERS: usize = 9;

/// Size of a light table indexed by flat index (highest mapped index is 98)
pub const N_LIGHTS: usize = 99;
