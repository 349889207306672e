//! Controller input decoding
//!
//! Turns a raw MIDI message into semantic actions by looking up the first
//! matching control binding and dispatching its key through a
//! [`HandlerRegistry`]. Keys without a built-in handler can be routed to an
//! injected [`ScriptEvaluator`] when the mapping carries a script.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};
use tracing::{debug, trace, warn};

use crate::mapping::{resolve_deck, ControlBinding, MappingDefinition};
use crate::midi::MidiMessage;

/// Application control an action targets
///
/// New kinds get added here as the built-in registry grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Control {
    Play,
    Cue,
    Sync,
    Pfl,
    Keylock,
    Hotcue { index: u8 },
    Volume,
    Rate,
    Crossfader,
}

/// What kind of interaction produced an action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionTag {
    /// Button pressed or released (see `down`)
    Press,
    /// Continuous control moved (see `value`)
    Change,
}

/// A decoded semantic action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub tag: ActionTag,
    pub control: Control,
    pub deck: Option<u32>,
    pub down: bool,
    /// Raw data2 of the triggering message
    pub value: u8,
}

impl Action {
    pub fn press(control: Control, ctx: &DecodeContext<'_>) -> Self {
        Self {
            tag: ActionTag::Press,
            control,
            deck: ctx.deck,
            down: ctx.down,
            value: ctx.message.data2(),
        }
    }

    pub fn change(control: Control, ctx: &DecodeContext<'_>) -> Self {
        Self {
            tag: ActionTag::Change,
            ..Self::press(control, ctx)
        }
    }
}

/// Everything a handler (built-in or scripted) gets to see for one message
#[derive(Debug, Clone, Copy)]
pub struct DecodeContext<'a> {
    pub binding: &'a ControlBinding,
    pub message: MidiMessage,
    pub deck: Option<u32>,
    pub down: bool,
}

impl DecodeContext<'_> {
    pub fn group(&self) -> &str {
        self.binding.group()
    }

    pub fn key(&self) -> &str {
        self.binding.key()
    }
}

/// Handler producing zero or more actions for a control key
pub type ControlHandler = Arc<dyn Fn(&DecodeContext<'_>) -> Vec<Action> + Send + Sync>;

/// Control key -> handler table
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, ControlHandler>,
}

impl HandlerRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in control kind
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry
            .register("play", press(Control::Play))
            .register("cue_default", press(Control::Cue))
            .register("sync_enabled", press(Control::Sync))
            .register("pfl", press(Control::Pfl))
            .register("keylock", press(Control::Keylock))
            .register("volume", change(Control::Volume))
            .register("rate", change(Control::Rate))
            .register("crossfader", change(Control::Crossfader));

        for index in 1..=8u8 {
            registry.register(
                format!("hotcue_{}_activate", index),
                press(Control::Hotcue { index }),
            );
        }

        registry
    }

    /// Add or replace the handler for a key
    pub fn register<F>(&mut self, key: impl Into<String>, handler: F) -> &mut Self
    where
        F: Fn(&DecodeContext<'_>) -> Vec<Action> + Send + Sync + 'static,
    {
        self.handlers.insert(key.into(), Arc::new(handler));
        self
    }

    pub fn get(&self, key: &str) -> Option<&ControlHandler> {
        self.handlers.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.handlers.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.handlers.keys().collect();
        keys.sort();
        f.debug_struct("HandlerRegistry").field("keys", &keys).finish()
    }
}

fn press(control: Control) -> impl Fn(&DecodeContext<'_>) -> Vec<Action> + Send + Sync + 'static {
    move |ctx| vec![Action::press(control, ctx)]
}

fn change(control: Control) -> impl Fn(&DecodeContext<'_>) -> Vec<Action> + Send + Sync + 'static {
    move |ctx| vec![Action::change(control, ctx)]
}

/// Evaluator for scripted controls
///
/// Called only for keys the registry does not know, and only when the
/// mapping carries a script source. The decoder never interprets scripts.
pub trait ScriptEvaluator: Send + Sync {
    fn evaluate(&self, source: &str, ctx: &DecodeContext<'_>) -> anyhow::Result<Vec<Action>>;
}

/// Decodes MIDI messages against a mapping definition
#[derive(Clone)]
pub struct Decoder {
    registry: Arc<HandlerRegistry>,
    evaluator: Option<Arc<dyn ScriptEvaluator>>,
}

impl Decoder {
    pub fn new(registry: HandlerRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
            evaluator: None,
        }
    }

    /// Route unknown keys of scripted mappings to an evaluator
    pub fn with_evaluator(mut self, evaluator: Arc<dyn ScriptEvaluator>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Decode one message
    ///
    /// The first binding in document order whose status/note pair matches
    /// wins; later bindings with the same pair are never consulted. A miss
    /// returns an empty list.
    pub fn decode(&self, definition: &MappingDefinition, message: &MidiMessage) -> Vec<Action> {
        let Some(binding) = definition.find_control(message.status(), message.data1()) else {
            trace!("Unmapped message: {}", message);
            return Vec::new();
        };

        let ctx = DecodeContext {
            binding,
            message: *message,
            deck: resolve_deck(binding.group()),
            down: message.data2() > 0,
        };

        if let Some(handler) = self.registry.get(binding.key()) {
            let actions = handler(&ctx);
            debug!(
                "{} {} -> {} action(s) [{}]",
                ctx.group(),
                ctx.key(),
                actions.len(),
                message
            );
            return actions;
        }

        let (Some(source), Some(evaluator)) = (definition.script_source(), &self.evaluator) else {
            trace!("No handler for {} {}", ctx.group(), ctx.key());
            return Vec::new();
        };

        match evaluator.evaluate(source, &ctx) {
            Ok(actions) => actions,
            Err(e) => {
                warn!(
                    "Script evaluation failed for {} {}: {:#}",
                    ctx.group(),
                    ctx.key(),
                    e
                );
                Vec::new()
            },
        }
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new(HandlerRegistry::builtin())
    }
}

impl fmt::Debug for Decoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Decoder")
            .field("registry", &self.registry)
            .field("evaluator", &self.evaluator.is_some())
            .finish()
    }
}

static DEFAULT_DECODER: OnceLock<Decoder> = OnceLock::new();

/// Decode with the built-in registry and no script evaluator
pub fn decode(definition: &MappingDefinition, message: &MidiMessage) -> Vec<Action> {
    DEFAULT_DECODER
        .get_or_init(Decoder::default)
        .decode(definition, message)
}

#[cfg(test)]
mod tests;
