//! MIDI port discovery and lookup
//!
//! Inputs and outputs are handled by the same code through midir's
//! [`MidiIO`] trait.

use anyhow::Result;
use colored::*;
use midir::{MidiIO, MidiInput, MidiOutput};
use tracing::debug;

/// Information about a MIDI port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    pub index: usize,
    pub name: String,
    pub is_virtual: bool,
}

impl PortInfo {
    fn new(index: usize, name: String) -> Self {
        Self {
            index,
            is_virtual: is_virtual(&name),
            name,
        }
    }
}

fn is_virtual(name: &str) -> bool {
    name.contains("Virtual") || name.contains("loopMIDI") || name.contains("IAC")
}

/// Ports with a readable name, tagged with their position in the backend's list
fn named_ports<T: MidiIO>(io: &T) -> Vec<(usize, T::Port, String)> {
    io.ports()
        .into_iter()
        .enumerate()
        .filter_map(|(index, port)| {
            let name = io.port_name(&port).ok()?;
            Some((index, port, name))
        })
        .collect()
}

fn describe<T: MidiIO>(io: &T) -> Vec<PortInfo> {
    named_ports(io)
        .into_iter()
        .map(|(index, _, name)| PortInfo::new(index, name))
        .collect()
}

/// Discover input ports
pub fn discover_input_ports() -> Result<Vec<PortInfo>> {
    Ok(describe(&MidiInput::new("midimap-discovery")?))
}

/// Discover output ports
pub fn discover_output_ports() -> Result<Vec<PortInfo>> {
    Ok(describe(&MidiOutput::new("midimap-discovery")?))
}

/// Case-insensitive substring match of a port name
pub fn port_matches(name: &str, pattern: &str) -> bool {
    name.to_lowercase().contains(&pattern.to_lowercase())
}

fn first_match<P>(
    ports: impl IntoIterator<Item = (P, String)>,
    pattern: &str,
) -> Option<(P, String)> {
    ports.into_iter().find(|(_, name)| port_matches(name, pattern))
}

/// Find an input or output port by substring match
pub fn find_port<T: MidiIO>(io: &T, pattern: &str) -> Option<(T::Port, String)> {
    let ports = named_ports(io)
        .into_iter()
        .map(|(_, port, name)| (port, name));
    let found = first_match(ports, pattern)?;
    debug!("Found port '{}' matching pattern '{}'", found.1, pattern);
    Some(found)
}

fn print_section(title: &str, ports: Result<Vec<PortInfo>>) {
    println!("\n{}", title.bold().cyan());
    match ports {
        Ok(ports) => {
            for port in &ports {
                let virtual_tag = if port.is_virtual { " [VIRTUAL]" } else { "" };
                println!("  {}: {}{}", port.index, port.name, virtual_tag.dimmed());
            }
        },
        Err(e) => println!("  {}", format!("unavailable: {}", e).red()),
    }
}

/// Print discovered ports
pub fn print_ports() {
    print_section("=== MIDI Input Ports ===", discover_input_ports());
    print_section("=== MIDI Output Ports ===", discover_output_ports());
    println!();
}
