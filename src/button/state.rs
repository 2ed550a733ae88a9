//! LED states

use std::fmt;

use crate::error::{MuxError, Result};

/// Light state of a button; the discriminant is the MIDI velocity sent to the device
///
/// Round buttons only have one color: `GREEN` means on and `GREEN_BLINK` blinking,
/// available as [`ButtonState::ON`] and [`ButtonState::BLINK`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum ButtonState {
    #[default]
    Off = 0,
    Green = 1,
    GreenBlink = 2,
    Red = 3,
    RedBlink = 4,
    Yellow = 5,
    YellowBlink = 6,
}

impl ButtonState {
    pub const ON: ButtonState = ButtonState::Green;
    pub const BLINK: ButtonState = ButtonState::GreenBlink;

    const ALL: [ButtonState; 7] = [
        ButtonState::Off,
        ButtonState::Green,
        ButtonState::GreenBlink,
        ButtonState::Red,
        ButtonState::RedBlink,
        ButtonState::Yellow,
        ButtonState::YellowBlink,
    ];

    pub fn velocity(self) -> u8 {
        self as u8
    }

    pub fn from_velocity(velocity: u8) -> Result<Self> {
        Self::ALL
            .get(velocity as usize)
            .copied()
            .ok_or_else(|| MuxError::out_of_range("velocity", velocity, "0..=6"))
    }

    pub fn is_off(self) -> bool {
        self == ButtonState::Off
    }

    pub fn is_blinking(self) -> bool {
        !self.is_off() && self.velocity() % 2 == 0
    }

    /// `Off` becomes `color`, anything else becomes `Off`
    pub fn toggle(self, color: ButtonState) -> ButtonState {
        if self.is_off() {
            color
        } else {
            ButtonState::Off
        }
    }

    /// Switch between the solid and blinking variant of the same color
    pub fn blink(self, blinking: bool) -> ButtonState {
        if self.is_off() {
            return self;
        }
        let solid = if self.is_blinking() { self.velocity() - 1 } else { self.velocity() };
        let target = if blinking { solid + 1 } else { solid };
        Self::ALL[target as usize]
    }
}

impl fmt::Display for ButtonState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ButtonState::Off => "off",
            ButtonState::Green => "green",
            ButtonState::GreenBlink => "green-blink",
            ButtonState::Red => "red",
            ButtonState::RedBlink => "red-blink",
            ButtonState::Yellow => "yellow",
            ButtonState::YellowBlink => "yellow-blink",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toggle() {
        assert_eq!(ButtonState::Off.toggle(ButtonState::Green), ButtonState::Green);
        assert_eq!(ButtonState::Green.toggle(ButtonState::Red), ButtonState::Off);
        assert_eq!(ButtonState::YellowBlink.toggle(ButtonState::Green), ButtonState::Off);
    }

    #[test]
    fn test_blink() {
        assert_eq!(ButtonState::Green.blink(true), ButtonState::GreenBlink);
        assert_eq!(ButtonState::GreenBlink.blink(false), ButtonState::Green);
        assert_eq!(ButtonState::Off.blink(true), ButtonState::Off);
        assert_eq!(ButtonState::Red.blink(true), ButtonState::RedBlink);
        assert_eq!(ButtonState::RedBlink.blink(true), ButtonState::RedBlink);
        assert_eq!(ButtonState::Yellow.blink(false), ButtonState::Yellow);
    }

    #[test]
    fn test_velocity() {
        for v in 0..=6u8 {
            assert_eq!(ButtonState::from_velocity(v).unwrap().velocity(), v);
        }
        assert!(ButtonState::from_velocity(7).unwrap_err().is_out_of_range());
        assert_eq!(ButtonState::ON, ButtonState::Green);
        assert!(ButtonState::BLINK.is_blinking());
        assert!(!ButtonState::Off.is_blinking());
    }
}
