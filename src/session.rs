//! Live controller session
//!
//! Connects to the controller's MIDI ports, decodes every incoming message
//! against the current mapping in arrival order, and sends LED feedback for
//! application state changes.

use anyhow::{Context, Result};
use midir::{MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::{MappingWatcher, MidiConfig};
use crate::decode::{Action, Decoder};
use crate::encode::{encode, FeedbackFilter, OutputState};
use crate::mapping::MappingDefinition;
use crate::midi::{format_hex, MidiMessage};
use crate::ports::find_port;

/// Port-independent part of a session: mapping, decoder, feedback filter
#[derive(Debug)]
pub struct SessionCore {
    definition: Arc<MappingDefinition>,
    decoder: Decoder,
    filter: Option<FeedbackFilter>,
}

impl SessionCore {
    pub fn new(definition: Arc<MappingDefinition>, decoder: Decoder, dedup_feedback: bool) -> Self {
        Self {
            definition,
            decoder,
            filter: dedup_feedback.then(FeedbackFilter::new),
        }
    }

    pub fn definition(&self) -> &Arc<MappingDefinition> {
        &self.definition
    }

    /// Swap in a reloaded mapping
    ///
    /// The feedback filter is reset so every LED gets refreshed once.
    pub fn replace_mapping(&mut self, definition: Arc<MappingDefinition>) {
        self.definition = definition;
        if let Some(filter) = self.filter.as_mut() {
            filter.reset();
        }
    }

    /// Decode raw bytes from the input port
    ///
    /// Bytes that do not form a 3-byte channel voice message are ignored.
    pub fn handle_input(&self, raw: &[u8]) -> Vec<Action> {
        match MidiMessage::from_bytes(raw) {
            Ok(message) => self.decoder.decode(&self.definition, &message),
            Err(e) => {
                debug!("Ignoring input {}: {}", format_hex(raw), e);
                Vec::new()
            },
        }
    }

    /// Feedback messages for a state snapshot, minus repeats when deduplicating
    pub fn feedback(&mut self, state: &OutputState) -> Vec<MidiMessage> {
        let messages = encode(&self.definition, state);
        match self.filter.as_mut() {
            Some(filter) => filter.filter(messages),
            None => messages,
        }
    }
}

/// A connected controller
pub struct ControllerSession {
    core: SessionCore,
    rx: mpsc::Receiver<Vec<u8>>,
    _input_conn: MidiInputConnection<()>,
    output_conn: Option<MidiOutputConnection>,
}

impl ControllerSession {
    /// Open the configured input (and optional output) port
    pub fn connect(midi: &MidiConfig, core: SessionCore) -> Result<Self> {
        let (tx, rx) = mpsc::channel(1000);

        let midi_in = MidiInput::new("midimap-input").context("Failed to create MIDI input")?;
        let (in_port, port_name) = find_port(&midi_in, &midi.input_port)
            .ok_or_else(|| anyhow::anyhow!("Input port '{}' not found", midi.input_port))?;

        info!("Connecting to input port: {}", port_name);

        let input_conn = midi_in
            .connect(
                &in_port,
                "midimap",
                move |_timestamp, data, _| {
                    // Never block the driver thread; a full queue drops the message
                    if tx.try_send(data.to_vec()).is_err() {
                        warn!("Input queue full, dropping {}", format_hex(data));
                    }
                },
                (),
            )
            .map_err(|e| anyhow::anyhow!("{}", e))
            .context("Failed to connect to input port")?;

        let output_conn = match &midi.output_port {
            Some(pattern) => {
                let midi_out =
                    MidiOutput::new("midimap-output").context("Failed to create MIDI output")?;
                let (out_port, port_name) = find_port(&midi_out, pattern)
                    .ok_or_else(|| anyhow::anyhow!("Output port '{}' not found", pattern))?;
                info!("Connecting to output port: {}", port_name);
                Some(
                    midi_out
                        .connect(&out_port, "midimap")
                        .map_err(|e| anyhow::anyhow!("{}", e))
                        .context("Failed to connect to output port")?,
                )
            },
            None => None,
        };

        Ok(Self {
            core,
            rx,
            _input_conn: input_conn,
            output_conn,
        })
    }

    pub fn core(&self) -> &SessionCore {
        &self.core
    }

    /// Send feedback for a state snapshot; returns the number of messages sent
    pub fn send_feedback(&mut self, state: &OutputState) -> Result<usize> {
        let messages = self.core.feedback(state);
        let Some(output) = self.output_conn.as_mut() else {
            debug!("No output port, dropping {} feedback message(s)", messages.len());
            return Ok(0);
        };

        for message in &messages {
            output
                .send(&message.to_bytes())
                .context("Failed to send MIDI message")?;
            debug!("Sent: {} | {}", format_hex(&message.to_bytes()), message);
        }
        Ok(messages.len())
    }

    /// Decode input until shutdown, handing every non-empty action list to `on_actions`
    ///
    /// Messages are processed one at a time in arrival order. When a watcher
    /// is given, reloaded mappings are swapped in between messages.
    pub async fn run<F>(
        mut self,
        mut watcher: Option<MappingWatcher>,
        mut on_actions: F,
    ) -> Result<()>
    where
        F: FnMut(&[Action]),
    {
        info!("Session running, press Ctrl+C to stop");

        loop {
            tokio::select! {
                raw = self.rx.recv() => {
                    let Some(raw) = raw else {
                        warn!("Input connection closed");
                        break;
                    };
                    let actions = self.core.handle_input(&raw);
                    if !actions.is_empty() {
                        on_actions(&actions);
                    }
                }
                reloaded = next_mapping(&mut watcher) => {
                    match reloaded {
                        Some(definition) => {
                            info!("Switching to reloaded mapping");
                            self.core.replace_mapping(definition);
                        }
                        None => {
                            warn!("Mapping watcher closed, hot reload disabled");
                            watcher = None;
                        }
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        Ok(())
    }
}

async fn next_mapping(watcher: &mut Option<MappingWatcher>) -> Option<Arc<MappingDefinition>> {
    match watcher {
        Some(watcher) => watcher.next_mapping().await,
        None => std::future::pending().await,
    }
}
