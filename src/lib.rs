//! midimap - declarative MIDI controller mappings
//!
//! Parses a controller mapping document into an immutable
//! [`MappingDefinition`](mapping::MappingDefinition), decodes raw controller
//! input into semantic [`Action`](decode::Action)s and encodes application
//! state into LED feedback. The host modules (`config`, `ports`, `session`)
//! wire the engine to real MIDI ports.

pub mod config;
pub mod decode;
pub mod encode;
pub mod error;
pub mod mapping;
pub mod midi;
pub mod ports;
pub mod session;

pub use decode::{
    decode, Action, ActionTag, Control, DecodeContext, Decoder, HandlerRegistry, ScriptEvaluator,
};
pub use encode::{encode, FeedbackFilter, OutputState, OutputValue};
pub use error::{BindingFault, MalformedBindingError, MappingError, MidiMessageError};
pub use mapping::{
    parse, resolve_deck, BindingKey, ControlBinding, MappingDefinition, MappingMetadata,
    OutputBinding,
};
pub use midi::MidiMessage;
