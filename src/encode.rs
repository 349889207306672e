//! Feedback encoding: application output state -> controller LED messages

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::trace;

use crate::mapping::{MappingDefinition, OutputBinding};
use crate::midi::MidiMessage;

/// data2 sent for an in-range value when the binding has no `<on>`
pub const DEFAULT_ON: u8 = 0x7F;

/// Current value of one application output
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutputValue {
    Bool(bool),
    Number(f64),
}

impl OutputValue {
    /// Numeric view used for range checks (`true` = 1.0, `false` = 0.0)
    pub fn as_f64(&self) -> f64 {
        match *self {
            OutputValue::Bool(b) => {
                if b {
                    1.0
                } else {
                    0.0
                }
            },
            OutputValue::Number(n) => n,
        }
    }
}

impl From<bool> for OutputValue {
    fn from(value: bool) -> Self {
        OutputValue::Bool(value)
    }
}

impl From<f64> for OutputValue {
    fn from(value: f64) -> Self {
        OutputValue::Number(value)
    }
}

impl From<i32> for OutputValue {
    fn from(value: i32) -> Self {
        OutputValue::Number(value.into())
    }
}

/// Application output values keyed by group, then key
///
/// Serializes as `{"[Channel1]": {"play_indicator": 1}}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutputState {
    values: HashMap<String, HashMap<String, OutputValue>>,
}

impl OutputState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON state snapshot
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn set(
        &mut self,
        group: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<OutputValue>,
    ) -> &mut Self {
        self.values
            .entry(group.into())
            .or_default()
            .insert(key.into(), value.into());
        self
    }

    pub fn get(&self, group: &str, key: &str) -> Option<OutputValue> {
        self.values.get(group)?.get(key).copied()
    }

    pub fn remove(&mut self, group: &str, key: &str) -> Option<OutputValue> {
        self.values.get_mut(group)?.remove(key)
    }

    /// Number of stored values
    pub fn len(&self) -> usize {
        self.values.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Whether a value lies in `[minimum, maximum]`
///
/// Both bounds are inclusive, a missing bound is open, NaN is never in range.
pub fn in_range(binding: &OutputBinding, value: f64) -> bool {
    if value.is_nan() {
        return false;
    }
    binding.minimum.map_or(true, |min| value >= min)
        && binding.maximum.map_or(true, |max| value <= max)
}

/// Feedback message for one binding given the current value, if any
pub fn encode_binding(binding: &OutputBinding, value: OutputValue) -> Option<MidiMessage> {
    let data2 = if in_range(binding, value.as_f64()) {
        binding.on.unwrap_or(DEFAULT_ON)
    } else {
        binding.off?
    };
    Some(MidiMessage::from_mapping(
        binding.binding.status,
        binding.binding.note,
        data2,
    ))
}

/// Encode the current output state into feedback messages
///
/// One message at most per output binding, in document order. Bindings
/// whose value is absent from `state` are skipped.
pub fn encode(definition: &MappingDefinition, state: &OutputState) -> Vec<MidiMessage> {
    definition
        .outputs()
        .iter()
        .filter_map(|binding| {
            let Some(value) = state.get(binding.group(), binding.key()) else {
                trace!("No value for {} {}", binding.group(), binding.key());
                return None;
            };
            encode_binding(binding, value)
        })
        .collect()
}

/// Drops feedback that would repeat what the controller already shows
///
/// Owned by one controller session; remembers the last data2 sent per
/// status/note pair.
#[derive(Debug, Clone, Default)]
pub struct FeedbackFilter {
    last_sent: HashMap<(u8, u8), u8>,
}

impl FeedbackFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep only messages that change an LED
    pub fn filter(&mut self, messages: Vec<MidiMessage>) -> Vec<MidiMessage> {
        messages
            .into_iter()
            .filter(|m| {
                self.last_sent.insert((m.status(), m.data1()), m.data2()) != Some(m.data2())
            })
            .collect()
    }

    /// Forget everything (e.g. after the controller reconnects)
    pub fn reset(&mut self) {
        self.last_sent.clear();
    }
}
