use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod decode;
pub mod listen;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Receive packets and print them.
    Listen(ListenArgs),
    /// Send data packets.
    Send(SendArgs),
    /// Decode a raw VRT/VRL capture file.
    Decode(DecodeArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Listen(args) => listen::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Decode(args) => decode::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Local address or multicast group to receive on.
    #[arg(env = "VITA49_HOST")]
    pub host: String,
    /// UDP port.
    #[arg(env = "VITA49_PORT")]
    pub port: u16,
    /// Network device to bind or join on.
    #[arg(long, env = "VITA49_DEVICE")]
    pub device: Option<String>,
    /// Print every packet without initial-context discovery.
    #[arg(long)]
    pub legacy: bool,
    /// Exit after printing N packets.
    #[arg(long)]
    pub count: Option<usize>,
    /// Time allowed for initial-context discovery (e.g. 60s, 500ms).
    #[arg(long, default_value = "60s")]
    pub discovery_timeout: String,
    /// Socket receive timeout (e.g. 1s, 200ms).
    #[arg(long, default_value = "1s")]
    pub read_timeout: String,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Destination address or multicast group.
    #[arg(env = "VITA49_HOST")]
    pub host: String,
    /// UDP port.
    #[arg(env = "VITA49_PORT")]
    pub port: u16,
    /// Network device to send from.
    #[arg(long, env = "VITA49_DEVICE")]
    pub device: Option<String>,
    /// Stream identifier (decimal or 0x-prefixed hex).
    #[arg(long, value_parser = parse_stream_id)]
    pub stream_id: Option<u32>,
    /// Raw string payload.
    #[arg(long, conflicts_with = "file")]
    pub data: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with = "data")]
    pub file: Option<PathBuf>,
    /// Wrap packets in VRL frames.
    #[arg(long)]
    pub frame: bool,
    /// Protect frames with a CRC.
    #[arg(long, requires = "frame")]
    pub crc: bool,
    /// Number of packets to send.
    #[arg(long, default_value = "1")]
    pub count: usize,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Capture file, or `-` for stdin.
    pub input: PathBuf,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;
    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

fn parse_stream_id(input: &str) -> Result<u32, String> {
    let parsed = match input.strip_prefix("0x").or_else(|| input.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => input.parse(),
    };
    parsed.map_err(|err| format!("invalid stream id {input:?}: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn stream_id_accepts_hex_and_decimal() {
        assert_eq!(parse_stream_id("0x10"), Ok(16));
        assert_eq!(parse_stream_id("42"), Ok(42));
        assert!(parse_stream_id("0xZZ").is_err());
    }
}
