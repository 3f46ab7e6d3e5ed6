use std::fs;

use serde::Serialize;
use vita49_frame::Packet;
use vita49_stream::{VrtWriter, WriterConfig};
use vita49_transport::TransportConfig;

use crate::cmd::SendArgs;
use crate::exit::{io_error, stream_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::OutputFormat;

const WORD: usize = 4;

#[derive(Serialize)]
struct SendSummary {
    event: &'static str,
    packets: usize,
    datagrams: usize,
    payload_size: usize,
}

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    if args.count == 0 {
        return Err(CliError::new(USAGE, "--count must be greater than zero"));
    }
    let payload = resolve_payload(&args)?;
    let config = WriterConfig {
        transport: TransportConfig {
            device: args.device.clone(),
            ..TransportConfig::new(args.host.as_str(), args.port)
        },
        ..WriterConfig::default()
    }
    .with_framing(args.frame, args.crc);

    let writer = VrtWriter::open(config).map_err(|err| stream_error("open failed", err))?;
    let packets: Vec<Packet> = (0..args.count)
        .map(|_| Packet::data(args.stream_id, payload.clone()))
        .collect();
    let datagrams = writer
        .send_packets(&packets)
        .map_err(|err| stream_error("send failed", err))?;

    let summary = SendSummary {
        event: "sent",
        packets: packets.len(),
        datagrams,
        payload_size: payload.len(),
    };
    match format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string(&summary).unwrap_or_else(|_| "{}".to_string())
        ),
        OutputFormat::Table | OutputFormat::Pretty => println!(
            "sent {} packet(s) in {} datagram(s), {} payload bytes each",
            summary.packets, summary.datagrams, summary.payload_size
        ),
    }
    Ok(SUCCESS)
}

/// Payload bytes zero-padded to whole words.
fn resolve_payload(args: &SendArgs) -> CliResult<Vec<u8>> {
    let mut payload = if let Some(data) = &args.data {
        data.as_bytes().to_vec()
    } else if let Some(path) = &args.file {
        fs::read(path).map_err(|err| io_error(&format!("failed reading {}", path.display()), err))?
    } else {
        Vec::new()
    };
    let padded = payload.len().div_ceil(WORD) * WORD;
    payload.resize(padded, 0);
    Ok(payload)
}
