//! MIDI utilities and message types
//!
//! Provides the raw 3-byte wire message exchanged with controllers, its
//! classification, and hex formatting for logs.

use serde::Serialize;
use std::fmt;

use crate::error::MidiMessageError;

/// Channel voice message types, derived from the status nibble
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    NoteOff,
    NoteOn,
    PolyPressure,
    ControlChange,
    ProgramChange,
    ChannelPressure,
    PitchBend,
    /// Status outside the channel voice range
    Other,
}

/// A raw MIDI message: status, data1 (note / controller number), data2 (velocity / value)
///
/// Messages coming from the outside go through [`MidiMessage::new`] or
/// [`MidiMessage::from_bytes`], which reject anything that is not a 3-byte
/// channel voice message. Bad bytes therefore never reach the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct MidiMessage {
    status: u8,
    data1: u8,
    data2: u8,
}

impl MidiMessage {
    /// Build a validated message
    pub fn new(status: u8, data1: u8, data2: u8) -> Result<Self, MidiMessageError> {
        if !(0x80..0xF0).contains(&status) {
            return Err(MidiMessageError::NotChannelStatus(status));
        }
        if data1 > 0x7F {
            return Err(MidiMessageError::DataByte {
                index: 1,
                value: data1,
            });
        }
        if data2 > 0x7F {
            return Err(MidiMessageError::DataByte {
                index: 2,
                value: data2,
            });
        }
        Ok(Self {
            status,
            data1,
            data2,
        })
    }

    /// Parse a message from raw bytes as delivered by a MIDI input port
    pub fn from_bytes(data: &[u8]) -> Result<Self, MidiMessageError> {
        match *data {
            [status, data1, data2] => Self::new(status, data1, data2),
            _ => Err(MidiMessageError::Length(data.len())),
        }
    }

    /// Build a message from bytes declared in a mapping document.
    ///
    /// The parser already restricts status to 0x80..=0xEF and note, on and
    /// off to 0..=127, so no further validation happens here.
    pub(crate) const fn from_mapping(status: u8, data1: u8, data2: u8) -> Self {
        Self {
            status,
            data1,
            data2,
        }
    }

    pub fn status(&self) -> u8 {
        self.status
    }

    pub fn data1(&self) -> u8 {
        self.data1
    }

    pub fn data2(&self) -> u8 {
        self.data2
    }

    /// MIDI channel (0-15)
    pub fn channel(&self) -> u8 {
        self.status & 0x0F
    }

    /// Message type from the status high nibble
    pub fn kind(&self) -> MessageKind {
        match self.status & 0xF0 {
            0x80 => MessageKind::NoteOff,
            0x90 => MessageKind::NoteOn,
            0xA0 => MessageKind::PolyPressure,
            0xB0 => MessageKind::ControlChange,
            0xC0 => MessageKind::ProgramChange,
            0xD0 => MessageKind::ChannelPressure,
            0xE0 => MessageKind::PitchBend,
            _ => MessageKind::Other,
        }
    }

    /// Encode to wire bytes
    pub fn to_bytes(&self) -> [u8; 3] {
        [self.status, self.data1, self.data2]
    }
}

impl TryFrom<&[u8]> for MidiMessage {
    type Error = MidiMessageError;

    fn try_from(data: &[u8]) -> Result<Self, Self::Error> {
        Self::from_bytes(data)
    }
}

impl fmt::Display for MidiMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ch = self.channel() + 1;
        match self.kind() {
            MessageKind::NoteOff => {
                write!(f, "NoteOff ch:{} n:{} v:{}", ch, self.data1, self.data2)
            },
            MessageKind::NoteOn => write!(f, "NoteOn ch:{} n:{} v:{}", ch, self.data1, self.data2),
            MessageKind::PolyPressure => {
                write!(f, "PolyPressure ch:{} n:{} p:{}", ch, self.data1, self.data2)
            },
            MessageKind::ControlChange => {
                write!(f, "CC ch:{} cc:{} v:{}", ch, self.data1, self.data2)
            },
            MessageKind::ProgramChange => write!(f, "ProgramChange ch:{} p:{}", ch, self.data1),
            MessageKind::ChannelPressure => {
                write!(f, "ChannelPressure ch:{} p:{}", ch, self.data1)
            },
            MessageKind::PitchBend => {
                let value = ((self.data2 as u16) << 7) | self.data1 as u16;
                write!(f, "PitchBend ch:{} v:{}", ch, value)
            },
            MessageKind::Other => write!(f, "{}", format_hex(&self.to_bytes())),
        }
    }
}

/// Format MIDI bytes as hex string for debugging
pub fn format_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
