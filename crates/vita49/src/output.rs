use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use vita49_frame::{ContextPacket, Packet};
use vita49_stream::InitialContext;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
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

#[derive(Serialize, Default)]
struct ContextSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    bandwidth_hz: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rf_reference_frequency_hz: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    if_reference_frequency_hz: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sample_rate_hz: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reference_level_dbm: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature_c: Option<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    linked_streams: Vec<String>,
}

impl ContextSummary {
    fn from_context(ctx: &ContextPacket) -> Self {
        Self {
            bandwidth_hz: ctx.bandwidth(),
            rf_reference_frequency_hz: ctx.rf_reference_frequency(),
            if_reference_frequency_hz: ctx.if_reference_frequency(),
            sample_rate_hz: ctx.sample_rate(),
            reference_level_dbm: ctx.reference_level(),
            temperature_c: ctx.temperature(),
            linked_streams: ctx
                .association_lists()
                .map(|lists| lists.linked_stream_ids().map(stream_hex).collect())
                .unwrap_or_default(),
        }
    }

    fn describe(&self) -> String {
        let mut parts = Vec::new();
        if let Some(v) = self.bandwidth_hz {
            parts.push(format!("bw={v}"));
        }
        if let Some(v) = self.rf_reference_frequency_hz {
            parts.push(format!("rf={v}"));
        }
        if let Some(v) = self.sample_rate_hz {
            parts.push(format!("rate={v}"));
        }
        if !self.linked_streams.is_empty() {
            parts.push(format!("links={}", self.linked_streams.join(",")));
        }
        parts.join(" ")
    }
}

#[derive(Serialize)]
struct PacketOutput {
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    class_id: Option<String>,
    packet_count: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    timestamp: Option<f64>,
    size: usize,
    payload_size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    context: Option<ContextSummary>,
}

impl PacketOutput {
    fn from_packet(packet: &Packet) -> Self {
        let context = if packet.is_context() {
            ContextPacket::new(packet.clone())
                .ok()
                .map(|ctx| ContextSummary::from_context(&ctx))
        } else {
            None
        };
        Self {
            kind: packet.packet_type.name(),
            stream_id: packet.stream_id.map(stream_hex),
            class_id: packet.class_id.map(|c| c.to_string()),
            packet_count: packet.packet_count,
            timestamp: packet.timestamp.as_secs_f64(),
            size: packet.wire_len(),
            payload_size: packet.payload.len(),
            context,
        }
    }
}

#[derive(Serialize)]
struct InitialContextOutput {
    event: &'static str,
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_id: Option<String>,
    contexts: Vec<PacketOutput>,
}

pub fn print_packet(packet: &Packet, format: OutputFormat) {
    let out = PacketOutput::from_packet(packet);
    match format {
        OutputFormat::Json => println!("{}", to_json(&out)),
        OutputFormat::Table => {
            let mut table = packet_table();
            table.add_row(packet_row(&out));
            println!("{table}");
        }
        OutputFormat::Pretty => println!("{}", pretty(&out)),
    }
}

pub fn print_packets<'a>(packets: impl IntoIterator<Item = &'a Packet>, format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            let mut table = packet_table();
            for packet in packets {
                table.add_row(packet_row(&PacketOutput::from_packet(packet)));
            }
            println!("{table}");
        }
        _ => {
            for packet in packets {
                print_packet(packet, format);
            }
        }
    }
}

pub fn print_initial_context(initial: &InitialContext, format: OutputFormat) {
    let out = InitialContextOutput {
        event: "initial-context",
        success: initial.is_success(),
        error: initial.error.as_ref().map(ToString::to_string),
        stream_id: initial.stream_id().map(stream_hex),
        contexts: initial
            .contexts
            .values()
            .map(|ctx| PacketOutput::from_packet(ctx.packet()))
            .collect(),
    };
    match format {
        OutputFormat::Json => println!("{}", to_json(&out)),
        OutputFormat::Table => {
            let mut table = packet_table();
            for ctx in &out.contexts {
                table.add_row(packet_row(ctx));
            }
            println!(
                "initial context: {}",
                out.error.as_deref().unwrap_or("found")
            );
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "initial context stream={} result={}",
                out.stream_id.as_deref().unwrap_or("-"),
                out.error.as_deref().unwrap_or("found")
            );
            for ctx in &out.contexts {
                println!("  {}", pretty(ctx));
            }
        }
    }
}

fn packet_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["KIND", "STREAM", "CLASS", "COUNT", "SIZE", "DETAIL"]);
    table
}

fn packet_row(out: &PacketOutput) -> Vec<String> {
    vec![
        out.kind.to_string(),
        out.stream_id.clone().unwrap_or_else(|| "-".to_string()),
        out.class_id.clone().unwrap_or_else(|| "-".to_string()),
        out.packet_count.to_string(),
        out.size.to_string(),
        out.context
            .as_ref()
            .map(ContextSummary::describe)
            .unwrap_or_default(),
    ]
}

fn pretty(out: &PacketOutput) -> String {
    let mut line = format!(
        "{} stream={} count={} size={}",
        out.kind,
        out.stream_id.as_deref().unwrap_or("-"),
        out.packet_count,
        out.size
    );
    if let Some(class_id) = &out.class_id {
        line.push_str(&format!(" class={class_id}"));
    }
    if let Some(ctx) = &out.context {
        let detail = ctx.describe();
        if !detail.is_empty() {
            line.push(' ');
            line.push_str(&detail);
        }
    }
    line
}

fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
}

pub fn stream_hex(id: u32) -> String {
    format!("{id:#010x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_summary_in_json() {
        let mut ctx = ContextPacket::with_stream_id(0x42);
        ctx.set_bandwidth(Some(2.0e6));
        let out = PacketOutput::from_packet(ctx.packet());
        let json = to_json(&out);
        assert!(json.contains("\"stream_id\":\"0x00000042\""));
        assert!(json.contains("\"bandwidth_hz\":2000000.0"));
        assert!(!json.contains("sample_rate_hz"));
    }

    #[test]
    fn pretty_data_line() {
        let out = PacketOutput::from_packet(&Packet::data(Some(1), vec![0u8; 8]));
        assert_eq!(pretty(&out), "DATA stream=0x00000001 count=0 size=16");
    }
}
