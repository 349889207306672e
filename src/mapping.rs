//! Controller mapping definitions
//!
//! Parses a mapping document into an immutable [`MappingDefinition`]: metadata,
//! ordered control bindings (controller -> application), ordered output
//! bindings (application -> controller LEDs) and an opaque script payload.

pub mod deck;
pub mod element;

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::info;

use crate::error::{BindingFault, MalformedBindingError, MappingError};
use element::{Element, ElementMap};

pub use deck::resolve_deck;

/// Descriptive information from the `<info>` block
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MappingMetadata {
    pub name: Option<String>,
    pub author: Option<String>,
    pub description: Option<String>,
}

/// Wire key and semantic identity shared by control and output bindings
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct BindingKey {
    /// Logical section, e.g. `[Channel1]` or `[Master]`
    pub group: String,
    /// Control function name, e.g. `play`
    pub key: String,
    pub status: u8,
    /// Note / controller number (0-127)
    pub note: u8,
}

impl BindingKey {
    /// Whether a message with this status and first data byte hits the binding
    pub fn matches(&self, status: u8, data1: u8) -> bool {
        self.status == status && self.note == data1
    }
}

/// An input control (button, knob, fader...)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControlBinding {
    #[serde(flatten)]
    pub binding: BindingKey,
    pub options: BTreeSet<String>,
}

impl ControlBinding {
    pub fn group(&self) -> &str {
        &self.binding.group
    }

    pub fn key(&self) -> &str {
        &self.binding.key
    }

    pub fn has_option(&self, option: &str) -> bool {
        self.options.contains(option)
    }
}

/// A feedback control (LED, meter...)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputBinding {
    #[serde(flatten)]
    pub binding: BindingKey,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
    /// data2 sent while the value is in range
    pub on: Option<u8>,
    /// data2 sent while the value is out of range
    pub off: Option<u8>,
}

impl OutputBinding {
    pub fn group(&self) -> &str {
        &self.binding.group
    }

    pub fn key(&self) -> &str {
        &self.binding.key
    }
}

/// Script file declared by the controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScriptFile {
    pub filename: String,
    pub function_prefix: Option<String>,
}

/// A parsed controller mapping
///
/// Built once per controller session and then only read. Every accessor
/// takes `&self`, so a definition can be shared behind an `Arc` by any
/// number of concurrent decode/encode calls.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MappingDefinition {
    metadata: MappingMetadata,
    controller_id: Option<String>,
    script_files: Vec<ScriptFile>,
    controls: Vec<ControlBinding>,
    outputs: Vec<OutputBinding>,
    script_source: Option<String>,
}

impl MappingDefinition {
    /// Build a definition from a document's root element
    pub fn from_element(root: &Element, script: Option<&str>) -> Result<Self, MappingError> {
        let sections = root.flatten();

        let metadata = sections
            .get("info")
            .map(|info| parse_metadata(&info.flatten()))
            .unwrap_or_default();

        let mut definition = Self {
            metadata,
            script_source: script.map(str::to_owned),
            ..Default::default()
        };

        let Some(controller) = sections.get("controller") else {
            return Ok(definition);
        };

        definition.controller_id = controller.attribute("id").map(str::to_owned);
        let parts = controller.flatten();

        if let Some(files) = parts.get("scriptfiles") {
            definition.script_files = files
                .children()
                .iter()
                .filter(|file| file.name == "file")
                .filter_map(|file| {
                    let filename = file.attribute("filename")?;
                    Some(ScriptFile {
                        filename: filename.to_owned(),
                        function_prefix: file
                            .attribute("functionprefix")
                            .filter(|p| !p.is_empty())
                            .map(str::to_owned),
                    })
                })
                .collect();
        }

        if let Some(controls) = parts.get("controls") {
            for (i, element) in controls.children().iter().enumerate() {
                let control = parse_control(element).map_err(|fault| MalformedBindingError {
                    element: "control",
                    index: i + 1,
                    fault,
                })?;
                definition.controls.push(control);
            }
        }

        if let Some(outputs) = parts.get("outputs") {
            for (i, element) in outputs.children().iter().enumerate() {
                let output = parse_output(element).map_err(|fault| MalformedBindingError {
                    element: "output",
                    index: i + 1,
                    fault,
                })?;
                definition.outputs.push(output);
            }
        }

        Ok(definition)
    }

    /// Load a mapping document (and optional script file) from disk
    pub async fn load(path: impl AsRef<Path>, script_path: Option<&Path>) -> Result<Self> {
        let path = path.as_ref();
        let document = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read mapping file: {}", path.display()))?;

        let script = match script_path {
            Some(script_path) => Some(
                tokio::fs::read_to_string(script_path)
                    .await
                    .with_context(|| {
                        format!("Failed to read script file: {}", script_path.display())
                    })?,
            ),
            None => None,
        };

        parse(&document, script.as_deref())
            .with_context(|| format!("Failed to parse mapping file: {}", path.display()))
    }

    pub fn metadata(&self) -> &MappingMetadata {
        &self.metadata
    }

    /// The `id` attribute of `<controller>`, if any
    pub fn controller_id(&self) -> Option<&str> {
        self.controller_id.as_deref()
    }

    pub fn script_files(&self) -> &[ScriptFile] {
        &self.script_files
    }

    /// Control bindings in document order
    pub fn controls(&self) -> &[ControlBinding] {
        &self.controls
    }

    /// Output bindings in document order
    pub fn outputs(&self) -> &[OutputBinding] {
        &self.outputs
    }

    /// Opaque script payload, stored verbatim
    pub fn script_source(&self) -> Option<&str> {
        self.script_source.as_deref()
    }

    /// First control binding for a status/note pair; later duplicates are shadowed
    pub fn find_control(&self, status: u8, note: u8) -> Option<&ControlBinding> {
        self.controls.iter().find(|c| c.binding.matches(status, note))
    }
}

/// Parse mapping document text plus an optional opaque script
///
/// Fails as a whole: a single malformed binding aborts the parse.
pub fn parse(document: &str, script: Option<&str>) -> Result<MappingDefinition, MappingError> {
    let root = Element::parse(document)?;
    let definition = MappingDefinition::from_element(&root, script)?;

    info!(
        "Loaded mapping '{}' with {} controls and {} outputs",
        definition.metadata.name.as_deref().unwrap_or("unnamed"),
        definition.controls.len(),
        definition.outputs.len()
    );

    Ok(definition)
}

fn parse_metadata(info: &ElementMap<'_>) -> MappingMetadata {
    let field = |name: &str| {
        info.text(name)
            .filter(|text| !text.is_empty())
            .map(str::to_owned)
    };
    MappingMetadata {
        name: field("name"),
        author: field("author"),
        description: field("description"),
    }
}

fn parse_control(element: &Element) -> Result<ControlBinding, BindingFault> {
    let fields = element.flatten();
    let binding = parse_binding_key(&fields)?;
    let options = fields
        .get("options")
        .map(|options| {
            options
                .children()
                .iter()
                .map(|flag| flag.name.clone())
                .collect()
        })
        .unwrap_or_default();

    Ok(ControlBinding { binding, options })
}

fn parse_output(element: &Element) -> Result<OutputBinding, BindingFault> {
    let fields = element.flatten();
    let binding = parse_binding_key(&fields)?;

    Ok(OutputBinding {
        binding,
        minimum: optional_number(&fields, "minimum")?,
        maximum: optional_number(&fields, "maximum")?,
        on: optional_byte(&fields, "on", 0x7F)?,
        off: optional_byte(&fields, "off", 0x7F)?,
    })
}

fn parse_binding_key(fields: &ElementMap<'_>) -> Result<BindingKey, BindingFault> {
    let group = required_text(fields, "group")?;
    let key = required_text(fields, "key")?;
    let status = parse_byte("status", required_text(fields, "status")?, 0xFF)?;
    if !(0x80..=0xEF).contains(&status) {
        return Err(BindingFault::NotChannelStatus(status));
    }
    let note = parse_byte("midino", required_text(fields, "midino")?, 0x7F)?;

    Ok(BindingKey {
        group: group.to_owned(),
        key: key.to_owned(),
        status,
        note,
    })
}

fn required_text<'a>(
    fields: &ElementMap<'a>,
    field: &'static str,
) -> Result<&'a str, BindingFault> {
    fields
        .text(field)
        .filter(|text| !text.is_empty())
        .ok_or(BindingFault::Missing(field))
}

fn optional_byte(
    fields: &ElementMap<'_>,
    field: &'static str,
    max: u8,
) -> Result<Option<u8>, BindingFault> {
    match fields.text(field).filter(|text| !text.is_empty()) {
        Some(text) => parse_byte(field, text, max).map(Some),
        None => Ok(None),
    }
}

fn optional_number(
    fields: &ElementMap<'_>,
    field: &'static str,
) -> Result<Option<f64>, BindingFault> {
    let Some(text) = fields.text(field).filter(|text| !text.is_empty()) else {
        return Ok(None);
    };
    match text.parse::<f64>() {
        Ok(value) if !value.is_nan() => Ok(Some(value)),
        _ => Err(BindingFault::NotNumeric {
            field,
            value: text.to_owned(),
        }),
    }
}

/// Base-10 integer, or `0x`-prefixed hexadecimal as most mapping files write status bytes
///
/// Only bare digits are accepted: no sign, no whitespace inside the number.
fn parse_byte(field: &'static str, text: &str, max: u8) -> Result<u8, BindingFault> {
    let (digits, radix) = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => (hex, 16),
        None => (text, 10),
    };
    let not_numeric = || BindingFault::NotNumeric {
        field,
        value: text.to_owned(),
    };
    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return Err(not_numeric());
    }
    let value = u64::from_str_radix(digits, radix).map_err(|_| not_numeric())?;

    if value > u64::from(max) {
        return Err(BindingFault::OutOfRange { field, value, max });
    }
    Ok(value as u8)
}

/// Demo mapping shipped with the crate
pub const DEMO_MAPPING: &str = include_str!("../mappings/demo.midi.xml");
