//! MIDI utilities and message types
//!
//! The APC mini speaks a tiny subset of MIDI: notes for buttons and LEDs,
//! control changes for faders. Everything else is ignored.

use std::fmt;

/// MIDI messages exchanged with the APC mini
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiMessage {
    /// Note Off: channel (0-15), note (0-127), velocity (0-127)
    NoteOff { channel: u8, note: u8, velocity: u8 },

    /// Note On: channel (0-15), note (0-127), velocity (0-127)
    NoteOn { channel: u8, note: u8, velocity: u8 },

    /// Control Change: channel (0-15), cc (0-127), value (0-127)
    ControlChange { channel: u8, cc: u8, value: u8 },
}

impl MidiMessage {
    /// Parse a MIDI message from raw bytes
    ///
    /// Note On with velocity 0 is reported as Note Off. Running status and
    /// message types the device never sends yield `None`.
    pub fn parse(data: &[u8]) -> Option<Self> {
        let (&status, rest) = data.split_first()?;
        if !(0x80..0xF0).contains(&status) || rest.len() < 2 {
            return None;
        }

        let channel = status & 0x0F;
        let first = rest[0] & 0x7F;
        let second = rest[1] & 0x7F;

        match status & 0xF0 {
            0x80 => Some(MidiMessage::NoteOff {
                channel,
                note: first,
                velocity: second,
            }),
            0x90 if second == 0 => Some(MidiMessage::NoteOff {
                channel,
                note: first,
                velocity: 0,
            }),
            0x90 => Some(MidiMessage::NoteOn {
                channel,
                note: first,
                velocity: second,
            }),
            0xB0 => Some(MidiMessage::ControlChange {
                channel,
                cc: first,
                value: second,
            }),
            _ => None,
        }
    }

    /// Encode the message to MIDI bytes
    pub fn encode(&self) -> [u8; 3] {
        match *self {
            MidiMessage::NoteOff { channel, note, velocity } => {
                [0x80 | (channel & 0x0F), note & 0x7F, velocity & 0x7F]
            }
            MidiMessage::NoteOn { channel, note, velocity } => {
                [0x90 | (channel & 0x0F), note & 0x7F, velocity & 0x7F]
            }
            MidiMessage::ControlChange { channel, cc, value } => {
                [0xB0 | (channel & 0x0F), cc & 0x7F, value & 0x7F]
            }
        }
    }
}

impl fmt::Display for MidiMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            MidiMessage::NoteOff { channel, note, velocity } => {
                write!(f, "NoteOff ch:{} n:{} v:{}", channel + 1, note, velocity)
            }
            MidiMessage::NoteOn { channel, note, velocity } => {
                write!(f, "NoteOn ch:{} n:{} v:{}", channel + 1, note, velocity)
            }
            MidiMessage::ControlChange { channel, cc, value } => {
                write!(f, "CC ch:{} cc:{} v:{}", channel + 1, cc, value)
            }
        }
    }
}

/// 7-bit value conversions
pub mod convert {
    /// 7-bit value (0-127) to [0, 1]
    pub fn to_unit(value_7bit: u8) -> f32 {
        (value_7bit & 0x7F) as f32 / 127.0
    }
}

/// Format MIDI bytes as hex string for debugging
pub fn format_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_on_parsing() {
        let msg = MidiMessage::parse(&[0x90, 56, 127]).unwrap();
        assert_eq!(
            msg,
            MidiMessage::NoteOn {
                channel: 0,
                note: 56,
                velocity: 127,
            }
        );
    }

    #[test]
    fn test_note_on_velocity_zero() {
        let msg = MidiMessage::parse(&[0x90, 98, 0]).unwrap();
        assert_eq!(
            msg,
            MidiMessage::NoteOff {
                channel: 0,
                note: 98,
                velocity: 0,
            }
        );
    }

    #[test]
    fn test_control_change() {
        let msg = MidiMessage::parse(&[0xB0, 48, 100]).unwrap();
        assert_eq!(
            msg,
            MidiMessage::ControlChange {
                channel: 0,
                cc: 48,
                value: 100,
            }
        );
    }

    #[test]
    fn test_unsupported_and_truncated() {
        assert_eq!(MidiMessage::parse(&[]), None);
        assert_eq!(MidiMessage::parse(&[0x90, 60]), None);
        assert_eq!(MidiMessage::parse(&[0x40, 60, 1]), None);
        assert_eq!(MidiMessage::parse(&[0xE0, 0, 64]), None);
        assert_eq!(MidiMessage::parse(&[0xF8]), None);
    }

    #[test]
    fn test_encode() {
        let msg = MidiMessage::NoteOn {
            channel: 0,
            note: 82,
            velocity: 2,
        };
        assert_eq!(msg.encode(), [0x90, 82, 2]);
        assert_eq!(MidiMessage::parse(&msg.encode()), Some(msg));
    }

    #[test]
    fn test_convert() {
        assert_eq!(convert::to_unit(0), 0.0);
        assert_eq!(convert::to_unit(127), 1.0);
        assert_eq!(convert::to_unit(0xFF), 1.0);
        assert!((convert::to_unit(64) - 0.504).abs() < 0.001);
    }

    #[test]
    fn test_format_hex() {
        assert_eq!(format_hex(&[0x90, 0x3C, 0x7F]), "90 3C 7F");
        assert_eq!(format!("{}", MidiMessage::ControlChange { channel: 0, cc: 56, value: 1 }), "CC ch:1 cc:56 v:1");
    }
}
