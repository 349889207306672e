//! Configuration management for midimap
//!
//! Handles loading and validating the YAML file that names the controller
//! ports and the mapping document to use.

pub mod watcher;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

pub use watcher::MappingWatcher;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub midi: MidiConfig,
    pub mapping: MappingConfig,
}

/// MIDI port configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MidiConfig {
    /// Case-insensitive substring of the controller's input port name
    pub input_port: String,
    /// Output port for LED feedback; no feedback is sent when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_port: Option<String>,
}

/// Mapping document configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MappingConfig {
    pub file: PathBuf,
    /// Script file stored alongside the mapping for scripted controls
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<PathBuf>,
    /// Reload the mapping when the file changes
    #[serde(default = "default_true")]
    pub watch: bool,
    /// Suppress feedback that would not change any LED
    #[serde(default = "default_true")]
    pub dedup_feedback: bool,
}

impl AppConfig {
    /// Load configuration from file with validation
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config = Self::from_yaml(&contents)
            .with_context(|| format!("Invalid config file: {}", path.display()))?;

        Ok(config)
    }

    /// Parse and validate a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: AppConfig =
            serde_yaml::from_str(yaml).context("Failed to parse YAML config")?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let yaml = serde_yaml::to_string(self).context("Failed to serialize config to YAML")?;

        fs::write(path, yaml)
            .await
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration for correctness
    pub fn validate(&self) -> Result<()> {
        if self.midi.input_port.trim().is_empty() {
            anyhow::bail!("MIDI input_port cannot be empty");
        }
        if let Some(output) = &self.midi.output_port {
            if output.trim().is_empty() {
                anyhow::bail!("MIDI output_port cannot be empty when set");
            }
        }
        if self.mapping.file.as_os_str().is_empty() {
            anyhow::bail!("mapping.file cannot be empty");
        }
        Ok(())
    }

    /// Resolve relative mapping/script paths against the config file's directory
    pub fn resolve_paths(&mut self, config_path: impl AsRef<Path>) {
        let Some(base) = config_path.as_ref().parent() else {
            return;
        };
        if self.mapping.file.is_relative() {
            self.mapping.file = base.join(&self.mapping.file);
        }
        if let Some(script) = self.mapping.script.as_mut() {
            if script.is_relative() {
                *script = base.join(&*script);
            }
        }
    }
}

fn default_true() -> bool {
    true
}
