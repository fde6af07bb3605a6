use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::{Args, Subcommand};
use comif_serial::SerialConfig;
use comif_transport::{ComInterface, Endpoint};

use crate::exit::{config_error, reception_error, CliError, CliResult, INTERNAL};
use crate::output::{print_packet, OutputFormat};

pub mod encode;
pub mod serial_listen;
pub mod serial_send;
pub mod udp_listen;
pub mod udp_send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send one packet over a COBS framed serial line.
    SerialSend(SerialSendArgs),
    /// Print packets arriving on a COBS framed serial line.
    SerialListen(SerialListenArgs),
    /// Send one UDP datagram.
    UdpSend(UdpSendArgs),
    /// Print datagrams arriving on a local UDP address.
    UdpListen(UdpListenArgs),
    /// Print the COBS wire frame for a payload.
    Encode(EncodeArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::SerialSend(args) => serial_send::run(args, format),
        Command::SerialListen(args) => serial_listen::run(args, format),
        Command::UdpSend(args) => udp_send::run(args, format),
        Command::UdpListen(args) => udp_listen::run(args, format),
        Command::Encode(args) => encode::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug, Default)]
pub struct PayloadArgs {
    /// UTF-8 string payload.
    #[arg(long, conflicts_with_all = ["hex", "file"])]
    pub data: Option<String>,
    /// Hex payload, e.g. "01 02 03" or "010203".
    #[arg(long, conflicts_with_all = ["data", "file"])]
    pub hex: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with_all = ["data", "hex"])]
    pub file: Option<PathBuf>,
}

impl PayloadArgs {
    pub fn resolve(&self) -> CliResult<Vec<u8>> {
        if let Some(data) = &self.data {
            return Ok(data.as_bytes().to_vec());
        }
        if let Some(hex) = &self.hex {
            return parse_hex(hex);
        }
        if let Some(path) = &self.file {
            return std::fs::read(path).map_err(|err| {
                crate::exit::io_error(&format!("failed reading {}", path.display()), err)
            });
        }
        Ok(Vec::new())
    }
}

#[derive(Args, Debug, Default)]
pub struct SerialLineArgs {
    /// Serial device, e.g. /dev/ttyUSB0. Overrides the config file's port.
    pub port: Option<PathBuf>,
    /// JSON interface config file.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
    /// Interface identifier used in logs and output.
    #[arg(long)]
    pub id: Option<String>,
    /// Baud rate.
    #[arg(long)]
    pub baud: Option<u32>,
    /// Idle polling interval of the reception thread (e.g. 100ms).
    #[arg(long)]
    pub poll_interval: Option<String>,
    /// Bounded wait for the reception thread on close (e.g. 400ms).
    #[arg(long)]
    pub close_timeout: Option<String>,
    /// Drop frames whose encoded body exceeds this many bytes.
    #[arg(long)]
    pub max_frame_size: Option<usize>,
}

impl SerialLineArgs {
    /// Build the interface config from the optional file plus flag overrides.
    pub fn to_config(&self) -> CliResult<SerialConfig> {
        let mut config = match (&self.config, &self.port) {
            (Some(path), _) => {
                SerialConfig::from_json_file(path).map_err(|err| config_error("config", err))?
            }
            (None, Some(port)) => SerialConfig::new("comif-serial", port),
            (None, None) => {
                return Err(CliError::usage("a serial port or --config is required"));
            }
        };

        if let Some(port) = &self.port {
            config.port = port.clone();
        }
        if let Some(id) = &self.id {
            config.id = id.clone();
        }
        if let Some(baud) = self.baud {
            config.baud_rate = baud;
        }
        if let Some(interval) = &self.poll_interval {
            config.polling_interval = parse_duration(interval)?;
        }
        if let Some(timeout) = &self.close_timeout {
            config.close_timeout = Some(parse_duration(timeout)?);
        }
        if let Some(max) = self.max_frame_size {
            config.max_frame_size = Some(max);
        }

        config.validate().map_err(|err| config_error("config", err))?;
        Ok(config)
    }
}

#[derive(Args, Debug)]
pub struct SerialSendArgs {
    #[command(flatten)]
    pub line: SerialLineArgs,
    #[command(flatten)]
    pub payload: PayloadArgs,
    /// Print replies arriving within this long after the send (e.g. 2s).
    #[arg(long)]
    pub wait: Option<String>,
}

#[derive(Args, Debug)]
pub struct SerialListenArgs {
    #[command(flatten)]
    pub line: SerialLineArgs,
    /// Exit after receiving N packets.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct UdpSendArgs {
    /// Destination, host:port.
    pub target: Endpoint,
    /// Local address to bind, host:port. Ephemeral when unset.
    #[arg(long)]
    pub bind: Option<Endpoint>,
    #[command(flatten)]
    pub payload: PayloadArgs,
    /// Print datagrams arriving within this long after the send (e.g. 2s).
    #[arg(long)]
    pub wait: Option<String>,
}

#[derive(Args, Debug)]
pub struct UdpListenArgs {
    /// Local address to bind, host:port.
    pub bind: Endpoint,
    /// Exit after receiving N datagrams.
    #[arg(long)]
    pub count: Option<usize>,
    /// Delay between polls while idle (e.g. 50ms).
    #[arg(long, default_value = "50ms")]
    pub poll_interval: String,
}

#[derive(Args, Debug)]
pub struct EncodeArgs {
    #[command(flatten)]
    pub payload: PayloadArgs,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Print incoming packets while `keep_going` holds, stopping early after `limit`.
///
/// Returns the number of packets printed.
pub(crate) fn print_incoming(
    com: &mut dyn ComInterface,
    poll: Duration,
    limit: Option<usize>,
    format: OutputFormat,
    keep_going: impl Fn() -> bool,
) -> CliResult<usize> {
    let mut printed = 0usize;

    while keep_going() {
        let packets = com
            .receive()
            .map_err(|err| reception_error("receive failed", err))?;
        if packets.is_empty() {
            thread::sleep(poll);
            continue;
        }

        for packet in packets {
            print_packet(com.id(), &packet, format);
            printed = printed.saturating_add(1);
            if limit.is_some_and(|limit| printed >= limit) {
                return Ok(printed);
            }
        }
    }

    Ok(printed)
}

pub(crate) fn install_ctrlc_handler() -> CliResult<Arc<AtomicBool>> {
    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);
    ctrlc::set_handler(move || {
        flag.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))?;
    Ok(running)
}

pub(crate) fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::usage("duration must not be empty"));
    }

    let (number, millis) = match input.strip_suffix("ms") {
        Some(num) => (num, true),
        None => (input.strip_suffix('s').unwrap_or(input), false),
    };

    let value: u64 = number
        .trim()
        .parse()
        .map_err(|_| CliError::usage(format!("invalid duration value: {input}")))?;
    if value == 0 {
        return Err(CliError::usage("duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

fn parse_hex(input: &str) -> CliResult<Vec<u8>> {
    let digits: String = input
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ',')
        .collect();
    let digits = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
        .unwrap_or(&digits);

    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(CliError::usage(format!("invalid hex payload: {input}")));
    }
    if digits.len() % 2 != 0 {
        return Err(CliError::usage(format!(
            "hex payload has an odd number of digits: {input}"
        )));
    }

    (0..digits.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&digits[i..i + 2], 16)
                .map_err(|_| CliError::usage(format!("invalid hex payload: {input}")))
        })
        .collect()
}
