use std::fmt::Write as _;
use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct PacketOutput<'a> {
    interface: &'a str,
    size: usize,
    hex: String,
    text: Option<&'a str>,
    timestamp: String,
}

/// Print one received packet.
pub fn print_packet(interface: &str, packet: &[u8], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = PacketOutput {
                interface,
                size: packet.len(),
                hex: to_hex(packet),
                text: std::str::from_utf8(packet).ok(),
                timestamp: now_unix_seconds(),
            };
            print_json(&out);
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["INTERFACE", "SIZE", "HEX", "TEXT"])
                .add_row(vec![
                    interface.to_string(),
                    packet.len().to_string(),
                    to_hex(packet),
                    text_preview(packet),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "interface={} size={} hex={} text={}",
                interface,
                packet.len(),
                to_hex(packet),
                text_preview(packet)
            );
        }
        OutputFormat::Raw => print_raw(packet),
    }
}

#[derive(Serialize)]
struct EncodedOutput {
    payload_size: usize,
    frame_size: usize,
    frame: String,
}

/// Print a wire frame built from `payload`.
pub fn print_encoded(payload: &[u8], frame: &[u8], format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&EncodedOutput {
            payload_size: payload.len(),
            frame_size: frame.len(),
            frame: to_hex(frame),
        }),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["PAYLOAD", "FRAME SIZE", "FRAME"])
                .add_row(vec![
                    to_hex(payload),
                    frame.len().to_string(),
                    to_hex(frame),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => println!("{}", to_hex(frame)),
        OutputFormat::Raw => print_raw(frame),
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

/// Lowercase hex, bytes separated by spaces.
pub fn to_hex(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 3);
    for (i, byte) in data.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{byte:02x}");
    }
    out
}

fn text_preview(packet: &[u8]) -> String {
    match std::str::from_utf8(packet) {
        Ok(text) if !text.chars().any(char::is_control) => text.to_string(),
        _ => format!("<binary {} bytes>", packet.len()),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
