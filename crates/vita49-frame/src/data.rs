use std::ops::Deref;

use bytes::{BufMut, BytesMut};

use crate::error::{CodecError, Result};
use crate::packet::Packet;
use crate::payload_format::{DataItemFormat, PayloadFormat};
use crate::trailer::{StateEvent, Trailer};

/// A data-like VRT packet.
///
/// The payload format is not carried on the wire; it is attached by the
/// caller (usually from the stream's context packet) to interpret samples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPacket {
    packet: Packet,
    payload_format: Option<PayloadFormat>,
}

impl DataPacket {
    /// Wrap a packet, failing if it is not a data packet.
    pub fn new(packet: Packet) -> Result<Self> {
        if !packet.is_data() {
            return Err(CodecError::WrongPacketKind {
                expected: "data",
                actual: packet.packet_type.name(),
            });
        }
        Ok(Self {
            packet,
            payload_format: None,
        })
    }

    /// Attach the format used by [`DataPacket::samples`].
    pub fn with_payload_format(mut self, format: PayloadFormat) -> Self {
        self.payload_format = Some(format);
        self
    }

    pub fn payload_format(&self) -> Option<&PayloadFormat> {
        self.payload_format.as_ref()
    }

    pub fn set_payload_format(&mut self, format: Option<PayloadFormat>) {
        self.payload_format = format;
    }

    pub fn packet(&self) -> &Packet {
        &self.packet
    }

    pub fn into_packet(self) -> Packet {
        self.packet
    }

    /// Read a state/event indicator; `None` when absent or not enabled.
    pub fn state(&self, event: StateEvent) -> Option<bool> {
        self.packet.trailer.and_then(|t| t.get(event))
    }

    /// Write a state/event indicator, adding a trailer if needed.
    pub fn set_state(&mut self, event: StateEvent, value: Option<bool>) {
        let trailer = self.packet.trailer.get_or_insert_with(Trailer::default);
        trailer.set(event, value);
    }

    pub fn is_calibrated_time(&self) -> Option<bool> {
        self.state(StateEvent::CalibratedTime)
    }

    pub fn is_data_valid(&self) -> Option<bool> {
        self.state(StateEvent::ValidData)
    }

    pub fn is_reference_locked(&self) -> Option<bool> {
        self.state(StateEvent::ReferenceLock)
    }

    pub fn is_agc(&self) -> Option<bool> {
        self.state(StateEvent::Agc)
    }

    pub fn is_signal_detected(&self) -> Option<bool> {
        self.state(StateEvent::DetectedSignal)
    }

    pub fn is_inverted_spectrum(&self) -> Option<bool> {
        self.state(StateEvent::SpectralInversion)
    }

    pub fn is_over_range(&self) -> Option<bool> {
        self.state(StateEvent::OverRange)
    }

    /// Sample loss (discontinuity) indicator.
    pub fn is_discontinuous(&self) -> Option<bool> {
        self.state(StateEvent::SampleLoss)
    }

    /// Number of scalar components in the payload for the attached format.
    pub fn component_count(&self) -> Result<usize> {
        let format = self.require_format()?;
        let item = aligned(format)?;
        Ok(self.packet.payload.len() / item)
    }

    /// Decode the payload into scalar components (complex formats are
    /// interleaved). Only byte-aligned, tag-free formats are supported.
    pub fn samples(&self) -> Result<Vec<f64>> {
        let format = self.require_format()?;
        decode_samples(format, &self.packet.payload)
    }

    /// Replace the payload with `values` encoded per the attached format,
    /// padding with zero bytes to a whole word.
    pub fn set_samples(&mut self, values: &[f64]) -> Result<()> {
        let format = *self.require_format()?;
        self.packet.payload = encode_samples(&format, values)?.freeze();
        Ok(())
    }

    fn require_format(&self) -> Result<&PayloadFormat> {
        self.payload_format.as_ref().ok_or_else(|| {
            CodecError::InvalidField("no payload format attached to data packet".to_string())
        })
    }
}

impl Deref for DataPacket {
    type Target = Packet;

    fn deref(&self) -> &Packet {
        &self.packet
    }
}

impl TryFrom<Packet> for DataPacket {
    type Error = CodecError;

    fn try_from(packet: Packet) -> Result<Self> {
        Self::new(packet)
    }
}

impl From<DataPacket> for Packet {
    fn from(data: DataPacket) -> Self {
        data.packet
    }
}

fn aligned(format: &PayloadFormat) -> Result<usize> {
    format.aligned_item_bytes().ok_or_else(|| {
        CodecError::InvalidField(format!(
            "unsupported payload format for sample access: {format:?}"
        ))
    })
}

/// Decode byte-aligned samples.
pub fn decode_samples(format: &PayloadFormat, payload: &[u8]) -> Result<Vec<f64>> {
    let item = aligned(format)?;
    let signed = format.data_item_format.is_signed();
    let mut out = Vec::with_capacity(payload.len() / item);

    for chunk in payload.chunks_exact(item) {
        let value = match (format.data_item_format, item) {
            (DataItemFormat::Float32, 4) => {
                f64::from(f32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            }
            (DataItemFormat::Float64, 8) => f64::from_be_bytes(chunk.try_into().map_err(|_| {
                CodecError::InvalidField("short 64-bit sample".to_string())
            })?),
            (_, 1) if signed => f64::from(chunk[0] as i8),
            (_, 1) => f64::from(chunk[0]),
            (_, 2) if signed => f64::from(i16::from_be_bytes([chunk[0], chunk[1]])),
            (_, 2) => f64::from(u16::from_be_bytes([chunk[0], chunk[1]])),
            (_, 4) if signed => {
                f64::from(i32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            }
            (_, 4) => f64::from(u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]])),
            (_, 8) => {
                let raw = u64::from_be_bytes(chunk.try_into().map_err(|_| {
                    CodecError::InvalidField("short 64-bit sample".to_string())
                })?);
                if signed {
                    raw as i64 as f64
                } else {
                    raw as f64
                }
            }
            _ => {
                return Err(CodecError::InvalidField(format!(
                    "unsupported item size {item}"
                )))
            }
        };
        out.push(value);
    }
    Ok(out)
}

/// Encode byte-aligned samples, saturating integers at their bounds.
pub fn encode_samples(format: &PayloadFormat, values: &[f64]) -> Result<BytesMut> {
    let item = aligned(format)?;
    let signed = format.data_item_format.is_signed();
    let mut out = BytesMut::with_capacity((values.len() * item + 3) & !3);

    for &value in values {
        match (format.data_item_format, item) {
            (DataItemFormat::Float32, 4) => out.put_f32(value as f32),
            (DataItemFormat::Float64, 8) => out.put_f64(value),
            (_, 1) if signed => out.put_i8(value.round() as i8),
            (_, 1) => out.put_u8(value.round() as u8),
            (_, 2) if signed => out.put_i16(value.round() as i16),
            (_, 2) => out.put_u16(value.round() as u16),
            (_, 4) if signed => out.put_i32(value.round() as i32),
            (_, 4) => out.put_u32(value.round() as u32),
            (_, 8) if signed => out.put_i64(value.round() as i64),
            (_, 8) => out.put_u64(value.round() as u64),
            _ => {
                return Err(CodecError::InvalidField(format!(
                    "unsupported item size {item}"
                )))
            }
        }
    }
    while out.len() % 4 != 0 {
        out.put_u8(0);
    }
    Ok(out)
}
