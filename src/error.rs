//! Error types for mapping documents and MIDI messages
//!
//! Parsing failures are loud and abort the whole document. Lookup misses
//! during decode/encode are not errors and never show up here.

use thiserror::Error;

/// Errors raised while turning a mapping document into a `MappingDefinition`
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MappingError {
    /// The document could not be read as a well-formed element tree
    #[error("invalid mapping document: {0}")]
    Document(String),

    /// A `<control>` or `<output>` element is missing a field or has a bad value
    #[error(transparent)]
    MalformedBinding(#[from] MalformedBindingError),
}

/// A single binding element that cannot be used
#[derive(Debug, Clone, PartialEq, Error)]
#[error("malformed <{element}> #{index}: {fault}")]
pub struct MalformedBindingError {
    /// Element kind ("control" or "output")
    pub element: &'static str,
    /// 1-based position of the element inside its parent
    pub index: usize,
    pub fault: BindingFault,
}

/// What exactly is wrong with a binding element
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BindingFault {
    #[error("missing <{0}>")]
    Missing(&'static str),

    #[error("<{field}> is not a number: {value:?}")]
    NotNumeric { field: &'static str, value: String },

    #[error("<{field}> value {value} is out of range 0..={max}")]
    OutOfRange {
        field: &'static str,
        value: u64,
        max: u8,
    },

    #[error("<status> 0x{0:02X} is not a channel voice status (0x80..=0xEF)")]
    NotChannelStatus(u8),
}

/// Rejections when building a `MidiMessage` from raw bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MidiMessageError {
    #[error("expected 3 bytes, got {0}")]
    Length(usize),

    #[error("0x{0:02X} is not a channel voice status byte")]
    NotChannelStatus(u8),

    #[error("data byte {index} is 0x{value:02X}, must be <= 0x7F")]
    DataByte { index: u8, value: u8 },
}
