//! Output formatting: table or JSON.
//!
//! Table uses `tabled`, structured formats serialize the cache entries.

use std::io::{self, Write};

use tabled::{Table, Tabled, settings::Style};

use omabus_core::{DeviceEntry, PoeState};

use crate::cli::OutputFormat;
use crate::error::CliError;

// ── Rows ─────────────────────────────────────────────────────────────

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "Key")]
    key: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Type")]
    kind: String,
    #[tabled(rename = "Model")]
    model: String,
    #[tabled(rename = "IP")]
    ip: String,
    #[tabled(rename = "MAC")]
    mac: String,
    #[tabled(rename = "Status")]
    status: &'static str,
    #[tabled(rename = "Ports")]
    ports: usize,
}

impl From<&DeviceEntry> for DeviceRow {
    fn from(entry: &DeviceEntry) -> Self {
        let d = &entry.device;
        Self {
            key: d.key.clone(),
            name: d.name.clone(),
            kind: d.device_type.to_string(),
            model: d.model.clone().unwrap_or_default(),
            ip: d.ip.clone().unwrap_or_default(),
            mac: d.mac.clone().unwrap_or_default(),
            status: if d.is_connected() { "connected" } else { "offline" },
            ports: entry.ports.len(),
        }
    }
}

#[derive(Tabled)]
struct PortRow {
    #[tabled(rename = "Device")]
    device: String,
    #[tabled(rename = "Port")]
    port: u32,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "PoE capable")]
    poe_capable: bool,
    #[tabled(rename = "Override")]
    profile_override: bool,
    #[tabled(rename = "PoE")]
    poe: &'static str,
}

fn port_rows(entries: &[DeviceEntry]) -> Vec<PortRow> {
    entries
        .iter()
        .flat_map(|entry| {
            entry.ports.values().map(|p| PortRow {
                device: entry.device.key.clone(),
                port: p.number,
                name: p.name.clone().unwrap_or_default(),
                poe_capable: p.poe_capable,
                profile_override: p.profile_override_enable,
                poe: match p.poe_state {
                    PoeState::On => "on",
                    PoeState::Off => "off",
                },
            })
        })
        .collect()
}

// ── Render dispatchers ───────────────────────────────────────────────

/// Render cached devices, or their ports when `ports` is set.
pub fn render_entries(
    format: OutputFormat,
    entries: &[DeviceEntry],
    ports: bool,
) -> Result<String, CliError> {
    match format {
        OutputFormat::Table if ports => Ok(render_table(&port_rows(entries))),
        OutputFormat::Table => {
            let rows: Vec<DeviceRow> = entries.iter().map(DeviceRow::from).collect();
            Ok(render_table(&rows))
        }
        OutputFormat::Json => Ok(serde_json::to_string_pretty(entries)?),
        OutputFormat::JsonCompact => Ok(serde_json::to_string(entries)?),
    }
}

/// Print the rendered output to stdout, respecting quiet mode.
pub fn print_output(output: &str, quiet: bool) {
    if quiet || output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
}

fn render_table<R: Tabled>(rows: &[R]) -> String {
    Table::new(rows).with(Style::rounded()).to_string()
}
