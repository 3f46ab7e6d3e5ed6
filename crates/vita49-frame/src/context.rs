//! Context packet view over the CIF0 indicator word and its fields.
//!
//! The payload starts with the 32-bit context indicator; each set bit adds a
//! field, laid out from bit 30 down to bit 8. Field contents beyond the
//! framing (GPS, INS, ephemeris blocks) are returned as raw bytes.

use std::ops::{Deref, Range};

use bytes::Bytes;

use crate::assoc::ContextAssocLists;
use crate::error::{CodecError, Result};
use crate::fixed;
use crate::packet::Packet;
use crate::packet_type::PacketType;
use crate::payload_format::PayloadFormat;

/// Context indicator (CIF0) bit positions.
pub mod cif {
    pub const CHANGE_INDICATOR: u8 = 31;
    pub const REFERENCE_POINT_ID: u8 = 30;
    pub const BANDWIDTH: u8 = 29;
    pub const IF_REFERENCE_FREQUENCY: u8 = 28;
    pub const RF_REFERENCE_FREQUENCY: u8 = 27;
    pub const RF_REFERENCE_FREQUENCY_OFFSET: u8 = 26;
    pub const IF_BAND_OFFSET: u8 = 25;
    pub const REFERENCE_LEVEL: u8 = 24;
    pub const GAIN: u8 = 23;
    pub const OVER_RANGE_COUNT: u8 = 22;
    pub const SAMPLE_RATE: u8 = 21;
    pub const TIMESTAMP_ADJUSTMENT: u8 = 20;
    pub const TIMESTAMP_CALIBRATION_TIME: u8 = 19;
    pub const TEMPERATURE: u8 = 18;
    pub const DEVICE_IDENTIFIER: u8 = 17;
    pub const STATE_EVENT_INDICATORS: u8 = 16;
    pub const DATA_PAYLOAD_FORMAT: u8 = 15;
    pub const FORMATTED_GPS: u8 = 14;
    pub const FORMATTED_INS: u8 = 13;
    pub const ECEF_EPHEMERIS: u8 = 12;
    pub const RELATIVE_EPHEMERIS: u8 = 11;
    pub const EPHEMERIS_REFERENCE_ID: u8 = 10;
    pub const GPS_ASCII: u8 = 9;
    pub const CONTEXT_ASSOCIATION_LISTS: u8 = 8;

    /// Bits 7..0 are reserved in V49.0.
    pub const RESERVED_MASK: u32 = 0x0000_00FF;
}

/// Field size for fixed-width CIF0 fields; `None` for variable or absent.
fn fixed_size(bit: u8) -> Option<usize> {
    match bit {
        cif::REFERENCE_POINT_ID => Some(4),
        cif::BANDWIDTH
        | cif::IF_REFERENCE_FREQUENCY
        | cif::RF_REFERENCE_FREQUENCY
        | cif::RF_REFERENCE_FREQUENCY_OFFSET
        | cif::IF_BAND_OFFSET => Some(8),
        cif::REFERENCE_LEVEL | cif::GAIN | cif::OVER_RANGE_COUNT => Some(4),
        cif::SAMPLE_RATE | cif::TIMESTAMP_ADJUSTMENT => Some(8),
        cif::TIMESTAMP_CALIBRATION_TIME | cif::TEMPERATURE => Some(4),
        cif::DEVICE_IDENTIFIER => Some(8),
        cif::STATE_EVENT_INDICATORS => Some(4),
        cif::DATA_PAYLOAD_FORMAT => Some(PayloadFormat::SIZE),
        cif::FORMATTED_GPS | cif::FORMATTED_INS => Some(44),
        cif::ECEF_EPHEMERIS | cif::RELATIVE_EPHEMERIS => Some(52),
        cif::EPHEMERIS_REFERENCE_ID => Some(4),
        _ => None,
    }
}

/// Size of the field for `bit` starting at `buf`.
fn field_size(bit: u8, buf: &[u8]) -> Result<usize> {
    if let Some(size) = fixed_size(bit) {
        return Ok(size);
    }
    match bit {
        cif::GPS_ASCII => {
            if buf.len() < 8 {
                return Err(CodecError::Truncated {
                    needed: 8,
                    available: buf.len(),
                });
            }
            let words = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]) as usize;
            Ok(8 + words * 4)
        }
        cif::CONTEXT_ASSOCIATION_LISTS => ContextAssocLists::field_len(buf),
        other => Err(CodecError::InvalidField(format!(
            "context indicator bit {other} has no field"
        ))),
    }
}

/// Two 16-bit gain stages in dB.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Gain {
    pub stage1: f64,
    pub stage2: f64,
}

impl Gain {
    pub fn total(&self) -> f64 {
        self.stage1 + self.stage2
    }
}

/// Manufacturer OUI and device code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceIdentifier {
    pub oui: u32,
    pub device_code: u16,
}

/// A context VRT packet with a validated field layout.
///
/// Extension context packets carry a user-defined payload: it is kept
/// opaque, every field getter returns `None` and the field setters leave
/// it unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextPacket {
    packet: Packet,
}

impl ContextPacket {
    /// Wrap a packet, validating that it is a context packet whose fields
    /// exactly fill the payload. Extension context payloads are not checked.
    pub fn new(packet: Packet) -> Result<Self> {
        if !packet.is_context() {
            return Err(CodecError::WrongPacketKind {
                expected: "context",
                actual: packet.packet_type.name(),
            });
        }
        let ctx = Self { packet };
        if !ctx.is_extension() {
            ctx.check_layout()?;
        }
        Ok(ctx)
    }

    pub fn is_extension(&self) -> bool {
        self.packet.packet_type == PacketType::ExtContext
    }

    /// An empty context packet (no fields) for `stream_id`.
    pub fn with_stream_id(stream_id: u32) -> Self {
        let mut packet = Packet::new(PacketType::Context);
        packet.stream_id = Some(stream_id);
        packet.payload = Bytes::from_static(&[0, 0, 0, 0]);
        Self { packet }
    }

    pub fn packet(&self) -> &Packet {
        &self.packet
    }

    pub fn into_packet(self) -> Packet {
        self.packet
    }

    /// Mutable access to prologue fields. The payload must be changed only
    /// through the field setters.
    pub fn set_packet_count(&mut self, count: u8) {
        self.packet.packet_count = count & 0xF;
    }

    pub fn set_stream_id(&mut self, stream_id: u32) {
        self.packet.stream_id = Some(stream_id);
    }

    pub fn set_class_id(&mut self, class_id: Option<crate::ClassIdentifier>) {
        self.packet.class_id = class_id;
    }

    pub fn set_timestamp(&mut self, timestamp: crate::TimeStamp) {
        self.packet.timestamp = timestamp;
    }

    /// The CIF0 word; zero for extension context.
    pub fn indicator(&self) -> u32 {
        let p = &self.packet.payload;
        if self.is_extension() || p.len() < 4 {
            return 0;
        }
        u32::from_be_bytes([p[0], p[1], p[2], p[3]])
    }

    pub fn has_field(&self, bit: u8) -> bool {
        bit < 32 && self.indicator() & (1 << bit) != 0
    }

    fn check_layout(&self) -> Result<()> {
        let payload = &self.packet.payload;
        if payload.len() < 4 {
            return Err(CodecError::InvalidField(
                "context payload lacks indicator word".to_string(),
            ));
        }
        let indicator = self.indicator();
        if indicator & cif::RESERVED_MASK != 0 {
            return Err(CodecError::InvalidField(format!(
                "unsupported context indicator bits 0x{:02X}",
                indicator & cif::RESERVED_MASK
            )));
        }
        let end = self.fields_end()?;
        if end != payload.len() {
            return Err(CodecError::InvalidField(format!(
                "context fields occupy {end} bytes, payload has {}",
                payload.len()
            )));
        }
        Ok(())
    }

    fn fields_end(&self) -> Result<usize> {
        let payload = &self.packet.payload;
        let indicator = self.indicator();
        let mut pos = 4;
        for bit in (cif::CONTEXT_ASSOCIATION_LISTS..=cif::REFERENCE_POINT_ID).rev() {
            if indicator & (1 << bit) == 0 {
                continue;
            }
            let size = field_size(bit, &payload[pos.min(payload.len())..])?;
            if pos + size > payload.len() {
                return Err(CodecError::Truncated {
                    needed: pos + size,
                    available: payload.len(),
                });
            }
            pos += size;
        }
        Ok(pos)
    }

    /// Byte range of the field within the payload, or where it would be
    /// inserted when absent.
    fn field_span(&self, bit: u8) -> (Range<usize>, bool) {
        let payload = &self.packet.payload;
        let indicator = self.indicator();
        let mut pos = 4;
        for b in (cif::CONTEXT_ASSOCIATION_LISTS..=cif::REFERENCE_POINT_ID).rev() {
            let present = indicator & (1 << b) != 0;
            // Layout was validated on construction and by every setter.
            let size = if present {
                field_size(b, &payload[pos..]).unwrap_or(0)
            } else {
                0
            };
            if b == bit {
                return (pos..pos + size, present);
            }
            pos += size;
        }
        (pos..pos, false)
    }

    /// Raw bytes of a field, if present.
    pub fn raw_field(&self, bit: u8) -> Option<&[u8]> {
        if !self.has_field(bit) || bit == cif::CHANGE_INDICATOR {
            return None;
        }
        let (range, _) = self.field_span(bit);
        Some(&self.packet.payload[range])
    }

    /// Insert, replace or remove a field's raw bytes.
    pub fn set_raw_field(&mut self, bit: u8, value: Option<&[u8]>) -> Result<()> {
        self.require_cif_layout()?;
        if !(cif::CONTEXT_ASSOCIATION_LISTS..=cif::REFERENCE_POINT_ID).contains(&bit) {
            return Err(CodecError::InvalidField(format!(
                "context indicator bit {bit} has no field"
            )));
        }
        if let Some(bytes) = value {
            let size = field_size(bit, bytes)?;
            if size != bytes.len() {
                return Err(CodecError::InvalidField(format!(
                    "field for bit {bit} must be {size} bytes, got {}",
                    bytes.len()
                )));
            }
        }
        self.splice(bit, value);
        Ok(())
    }

    fn require_cif_layout(&self) -> Result<()> {
        if self.is_extension() {
            return Err(CodecError::WrongPacketKind {
                expected: "context",
                actual: self.packet.packet_type.name(),
            });
        }
        Ok(())
    }

    fn splice(&mut self, bit: u8, value: Option<&[u8]>) {
        if self.is_extension() {
            return;
        }
        let (range, _) = self.field_span(bit);
        let old = &self.packet.payload;
        let value_len = value.map_or(0, <[u8]>::len);
        let mut buf = Vec::with_capacity(old.len() - range.len() + value_len);
        buf.extend_from_slice(&old[..range.start]);
        buf.extend_from_slice(value.unwrap_or_default());
        buf.extend_from_slice(&old[range.end..]);
        let mut indicator = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
        if value.is_some() {
            indicator |= 1 << bit;
        } else {
            indicator &= !(1 << bit);
        }
        buf[..4].copy_from_slice(&indicator.to_be_bytes());
        self.packet.payload = Bytes::from(buf);
    }

    fn word(&self, bit: u8) -> Option<u32> {
        self.raw_field(bit)
            .map(|f| u32::from_be_bytes([f[0], f[1], f[2], f[3]]))
    }

    fn long(&self, bit: u8) -> Option<u64> {
        self.raw_field(bit).map(|f| {
            u64::from_be_bytes([f[0], f[1], f[2], f[3], f[4], f[5], f[6], f[7]])
        })
    }

    fn set_word(&mut self, bit: u8, value: Option<u32>) {
        let bytes = value.map(u32::to_be_bytes);
        self.splice(bit, bytes.as_ref().map(|b| b.as_slice()));
    }

    fn set_long(&mut self, bit: u8, value: Option<u64>) {
        let bytes = value.map(u64::to_be_bytes);
        self.splice(bit, bytes.as_ref().map(|b| b.as_slice()));
    }

    fn frequency(&self, bit: u8) -> Option<f64> {
        self.long(bit)
            .map(|raw| fixed::i64_to_f64(raw, fixed::FREQUENCY_RADIX))
    }

    fn set_frequency(&mut self, bit: u8, hz: Option<f64>) {
        self.set_long(bit, hz.map(|v| fixed::f64_to_i64(v, fixed::FREQUENCY_RADIX)));
    }

    /// Change indicator: true when some field changed since the last packet.
    pub fn change_indicator(&self) -> bool {
        self.has_field(cif::CHANGE_INDICATOR)
    }

    pub fn set_change_indicator(&mut self, changed: bool) {
        if self.is_extension() {
            return;
        }
        let mut indicator = self.indicator();
        if changed {
            indicator |= 1 << cif::CHANGE_INDICATOR;
        } else {
            indicator &= !(1 << cif::CHANGE_INDICATOR);
        }
        let mut buf = self.packet.payload.to_vec();
        buf[..4].copy_from_slice(&indicator.to_be_bytes());
        self.packet.payload = Bytes::from(buf);
    }

    pub fn reference_point_id(&self) -> Option<u32> {
        self.word(cif::REFERENCE_POINT_ID)
    }

    pub fn set_reference_point_id(&mut self, id: Option<u32>) {
        self.set_word(cif::REFERENCE_POINT_ID, id);
    }

    /// Bandwidth in Hz.
    pub fn bandwidth(&self) -> Option<f64> {
        self.frequency(cif::BANDWIDTH)
    }

    pub fn set_bandwidth(&mut self, hz: Option<f64>) {
        self.set_frequency(cif::BANDWIDTH, hz);
    }

    /// IF reference frequency in Hz.
    pub fn if_reference_frequency(&self) -> Option<f64> {
        self.frequency(cif::IF_REFERENCE_FREQUENCY)
    }

    pub fn set_if_reference_frequency(&mut self, hz: Option<f64>) {
        self.set_frequency(cif::IF_REFERENCE_FREQUENCY, hz);
    }

    /// RF reference frequency in Hz.
    pub fn rf_reference_frequency(&self) -> Option<f64> {
        self.frequency(cif::RF_REFERENCE_FREQUENCY)
    }

    pub fn set_rf_reference_frequency(&mut self, hz: Option<f64>) {
        self.set_frequency(cif::RF_REFERENCE_FREQUENCY, hz);
    }

    pub fn rf_reference_frequency_offset(&self) -> Option<f64> {
        self.frequency(cif::RF_REFERENCE_FREQUENCY_OFFSET)
    }

    pub fn set_rf_reference_frequency_offset(&mut self, hz: Option<f64>) {
        self.set_frequency(cif::RF_REFERENCE_FREQUENCY_OFFSET, hz);
    }

    pub fn if_band_offset(&self) -> Option<f64> {
        self.frequency(cif::IF_BAND_OFFSET)
    }

    pub fn set_if_band_offset(&mut self, hz: Option<f64>) {
        self.set_frequency(cif::IF_BAND_OFFSET, hz);
    }

    /// Reference level in dBm.
    pub fn reference_level(&self) -> Option<f64> {
        self.word(cif::REFERENCE_LEVEL)
            .map(|w| fixed::i16_to_f64(w as u16, fixed::GAIN_RADIX))
    }

    pub fn set_reference_level(&mut self, dbm: Option<f64>) {
        self.set_word(
            cif::REFERENCE_LEVEL,
            dbm.map(|v| u32::from(fixed::f64_to_i16(v, fixed::GAIN_RADIX))),
        );
    }

    pub fn gain(&self) -> Option<Gain> {
        self.word(cif::GAIN).map(|w| Gain {
            stage1: fixed::i16_to_f64(w as u16, fixed::GAIN_RADIX),
            stage2: fixed::i16_to_f64((w >> 16) as u16, fixed::GAIN_RADIX),
        })
    }

    pub fn set_gain(&mut self, gain: Option<Gain>) {
        self.set_word(
            cif::GAIN,
            gain.map(|g| {
                (u32::from(fixed::f64_to_i16(g.stage2, fixed::GAIN_RADIX)) << 16)
                    | u32::from(fixed::f64_to_i16(g.stage1, fixed::GAIN_RADIX))
            }),
        );
    }

    pub fn over_range_count(&self) -> Option<u32> {
        self.word(cif::OVER_RANGE_COUNT)
    }

    pub fn set_over_range_count(&mut self, count: Option<u32>) {
        self.set_word(cif::OVER_RANGE_COUNT, count);
    }

    /// Sample rate in Hz.
    pub fn sample_rate(&self) -> Option<f64> {
        self.frequency(cif::SAMPLE_RATE)
    }

    pub fn set_sample_rate(&mut self, hz: Option<f64>) {
        self.set_frequency(cif::SAMPLE_RATE, hz);
    }

    /// Timestamp adjustment in picoseconds.
    pub fn timestamp_adjustment(&self) -> Option<i64> {
        self.long(cif::TIMESTAMP_ADJUSTMENT).map(|v| v as i64)
    }

    pub fn set_timestamp_adjustment(&mut self, picoseconds: Option<i64>) {
        self.set_long(cif::TIMESTAMP_ADJUSTMENT, picoseconds.map(|v| v as u64));
    }

    pub fn timestamp_calibration_time(&self) -> Option<u32> {
        self.word(cif::TIMESTAMP_CALIBRATION_TIME)
    }

    pub fn set_timestamp_calibration_time(&mut self, seconds: Option<u32>) {
        self.set_word(cif::TIMESTAMP_CALIBRATION_TIME, seconds);
    }

    /// Temperature in degrees Celsius.
    pub fn temperature(&self) -> Option<f64> {
        self.word(cif::TEMPERATURE)
            .map(|w| fixed::i16_to_f64(w as u16, fixed::TEMPERATURE_RADIX))
    }

    pub fn set_temperature(&mut self, celsius: Option<f64>) {
        self.set_word(
            cif::TEMPERATURE,
            celsius.map(|v| u32::from(fixed::f64_to_i16(v, fixed::TEMPERATURE_RADIX))),
        );
    }

    pub fn device_identifier(&self) -> Option<DeviceIdentifier> {
        self.long(cif::DEVICE_IDENTIFIER).map(|v| DeviceIdentifier {
            oui: ((v >> 32) as u32) & 0x00FF_FFFF,
            device_code: v as u16,
        })
    }

    pub fn set_device_identifier(&mut self, id: Option<DeviceIdentifier>) {
        self.set_long(
            cif::DEVICE_IDENTIFIER,
            id.map(|d| (u64::from(d.oui & 0x00FF_FFFF) << 32) | u64::from(d.device_code)),
        );
    }

    /// Raw state/event indicator word (12 enables, 12 indicators, 8 user bits).
    pub fn state_event_indicators(&self) -> Option<u32> {
        self.word(cif::STATE_EVENT_INDICATORS)
    }

    pub fn set_state_event_indicators(&mut self, word: Option<u32>) {
        self.set_word(cif::STATE_EVENT_INDICATORS, word);
    }

    /// Payload format of the paired data stream.
    pub fn payload_format(&self) -> Result<Option<PayloadFormat>> {
        self.long(cif::DATA_PAYLOAD_FORMAT)
            .map(|v| PayloadFormat::from_words((v >> 32) as u32, v as u32))
            .transpose()
    }

    pub fn set_payload_format(&mut self, format: Option<PayloadFormat>) {
        self.set_long(
            cif::DATA_PAYLOAD_FORMAT,
            format.map(|f| {
                let (first, second) = f.to_words();
                (u64::from(first) << 32) | u64::from(second)
            }),
        );
    }

    pub fn ephemeris_reference_id(&self) -> Option<u32> {
        self.word(cif::EPHEMERIS_REFERENCE_ID)
    }

    pub fn set_ephemeris_reference_id(&mut self, id: Option<u32>) {
        self.set_word(cif::EPHEMERIS_REFERENCE_ID, id);
    }

    /// Formatted GPS geolocation block (44 bytes, decoded elsewhere).
    pub fn formatted_gps(&self) -> Option<&[u8]> {
        self.raw_field(cif::FORMATTED_GPS)
    }

    /// Formatted INS geolocation block (44 bytes, decoded elsewhere).
    pub fn formatted_ins(&self) -> Option<&[u8]> {
        self.raw_field(cif::FORMATTED_INS)
    }

    pub fn ecef_ephemeris(&self) -> Option<&[u8]> {
        self.raw_field(cif::ECEF_EPHEMERIS)
    }

    pub fn relative_ephemeris(&self) -> Option<&[u8]> {
        self.raw_field(cif::RELATIVE_EPHEMERIS)
    }

    /// GPS ASCII sentences, with the manufacturer OUI word and padding removed.
    pub fn gps_ascii(&self) -> Option<(u32, String)> {
        self.raw_field(cif::GPS_ASCII).map(|f| {
            let oui = u32::from_be_bytes([f[0], f[1], f[2], f[3]]) & 0x00FF_FFFF;
            let text = String::from_utf8_lossy(&f[8..])
                .trim_end_matches('\0')
                .to_string();
            (oui, text)
        })
    }

    pub fn set_gps_ascii(&mut self, value: Option<(u32, &str)>) {
        let bytes = value.map(|(oui, text)| {
            let words = text.len().div_ceil(4);
            let mut field = Vec::with_capacity(8 + words * 4);
            field.extend_from_slice(&(oui & 0x00FF_FFFF).to_be_bytes());
            field.extend_from_slice(&(words as u32).to_be_bytes());
            field.extend_from_slice(text.as_bytes());
            field.resize(8 + words * 4, 0);
            field
        });
        self.splice(cif::GPS_ASCII, bytes.as_deref());
    }

    pub fn association_lists(&self) -> Option<ContextAssocLists> {
        self.raw_field(cif::CONTEXT_ASSOCIATION_LISTS)
            .and_then(|f| ContextAssocLists::decode(f).ok())
    }

    pub fn set_association_lists(&mut self, lists: Option<&ContextAssocLists>) -> Result<()> {
        self.require_cif_layout()?;
        match lists {
            Some(lists) => {
                let mut buf = bytes::BytesMut::with_capacity(lists.wire_len());
                lists.encode(&mut buf)?;
                self.splice(cif::CONTEXT_ASSOCIATION_LISTS, Some(&buf[..]));
            }
            None => self.splice(cif::CONTEXT_ASSOCIATION_LISTS, None),
        }
        Ok(())
    }
}

impl Deref for ContextPacket {
    type Target = Packet;

    fn deref(&self) -> &Packet {
        &self.packet
    }
}

impl TryFrom<Packet> for ContextPacket {
    type Error = CodecError;

    fn try_from(packet: Packet) -> Result<Self> {
        Self::new(packet)
    }
}

impl From<ContextPacket> for Packet {
    fn from(ctx: ContextPacket) -> Self {
        ctx.packet
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_context_is_one_word() {
        let ctx = ContextPacket::with_stream_id(7);
        assert_eq!(ctx.indicator(), 0);
        assert_eq!(ctx.wire_len(), 12);
        let back = ContextPacket::new(Packet::decode(&ctx.to_bytes().unwrap(), true).unwrap())
            .unwrap();
        assert_eq!(back, ctx);
    }

    #[test]
    fn fields_land_in_bit_order() {
        let mut ctx = ContextPacket::with_stream_id(1);
        ctx.set_sample_rate(Some(1e6));
        ctx.set_bandwidth(Some(800e3));
        ctx.set_reference_level(Some(-10.5));

        assert_eq!(
            ctx.indicator(),
            (1 << cif::BANDWIDTH) | (1 << cif::REFERENCE_LEVEL) | (1 << cif::SAMPLE_RATE)
        );
        assert_eq!(ctx.payload.len(), 4 + 8 + 4 + 8);
        // Bandwidth directly follows the indicator.
        assert_eq!(&ctx.payload[4..12], &(800_000u64 << 20).to_be_bytes());

        assert_eq!(ctx.bandwidth(), Some(800e3));
        assert_eq!(ctx.sample_rate(), Some(1e6));
        assert_eq!(ctx.reference_level(), Some(-10.5));
    }

    #[test]
    fn remove_field_shrinks_payload() {
        let mut ctx = ContextPacket::with_stream_id(1);
        ctx.set_rf_reference_frequency(Some(2.4e9));
        ctx.set_temperature(Some(36.5));
        ctx.set_rf_reference_frequency(None);
        assert_eq!(ctx.rf_reference_frequency(), None);
        assert_eq!(ctx.temperature(), Some(36.5));
        assert_eq!(ctx.payload.len(), 8);
    }

    #[test]
    fn decode_wire_context_with_all_typed_fields() {
        let mut ctx = ContextPacket::with_stream_id(42);
        ctx.set_change_indicator(true);
        ctx.set_reference_point_id(Some(5));
        ctx.set_if_reference_frequency(Some(-1.25e6));
        ctx.set_gain(Some(Gain {
            stage1: 10.0,
            stage2: -3.5,
        }));
        ctx.set_over_range_count(Some(17));
        ctx.set_timestamp_adjustment(Some(-250));
        ctx.set_device_identifier(Some(DeviceIdentifier {
            oui: 0x00_12A2,
            device_code: 0x0042,
        }));
        ctx.set_payload_format(Some(PayloadFormat::complex_int16()));
        ctx.set_gps_ascii(Some((0x00_1234, "$GPGGA")));

        let wire = ctx.to_bytes().unwrap();
        let back = ContextPacket::new(Packet::decode(&wire, true).unwrap()).unwrap();
        assert!(back.change_indicator());
        assert_eq!(back.reference_point_id(), Some(5));
        assert_eq!(back.if_reference_frequency(), Some(-1.25e6));
        assert_eq!(back.gain().unwrap().total(), 6.5);
        assert_eq!(back.over_range_count(), Some(17));
        assert_eq!(back.timestamp_adjustment(), Some(-250));
        assert_eq!(back.device_identifier().unwrap().device_code, 0x42);
        assert_eq!(
            back.payload_format().unwrap(),
            Some(PayloadFormat::complex_int16())
        );
        assert_eq!(back.gps_ascii(), Some((0x1234, "$GPGGA".to_string())));
    }

    #[test]
    fn association_lists_after_fixed_fields() {
        let mut ctx = ContextPacket::with_stream_id(7);
        let lists = ContextAssocLists {
            source: vec![9],
            ..Default::default()
        };
        ctx.set_association_lists(Some(&lists)).unwrap();
        ctx.set_bandwidth(Some(1e6));
        assert_eq!(ctx.association_lists(), Some(lists));
        assert_eq!(ctx.bandwidth(), Some(1e6));
    }

    #[test]
    fn extension_context_payload_is_opaque() {
        let mut packet = Packet::new(PacketType::ExtContext);
        packet.stream_id = Some(9);
        packet.payload = Bytes::from_static(&[0, 0, 0, 1, 0xDE, 0xAD, 0xBE, 0xEF]);
        let wire = packet.to_bytes().unwrap();

        let mut ctx = ContextPacket::new(Packet::decode(&wire, true).unwrap()).unwrap();
        assert!(ctx.is_extension());
        assert_eq!(ctx.indicator(), 0);
        assert_eq!(ctx.bandwidth(), None);
        assert_eq!(ctx.association_lists(), None);
        assert_eq!(ctx.payload_format().unwrap(), None);

        ctx.set_bandwidth(Some(1e6));
        assert_eq!(&ctx.payload[..], &[0, 0, 0, 1, 0xDE, 0xAD, 0xBE, 0xEF]);
        assert!(ctx.set_raw_field(cif::BANDWIDTH, Some(&[0u8; 8])).is_err());

        // The same payload is rejected as a V49.0 context layout.
        packet.packet_type = PacketType::Context;
        assert!(ContextPacket::new(packet).is_err());
    }

    #[test]
    fn empty_extension_context_is_allowed() {
        let mut packet = Packet::new(PacketType::ExtContext);
        packet.stream_id = Some(3);
        let ctx = ContextPacket::new(packet).unwrap();
        assert_eq!(ctx.indicator(), 0);
        assert!(!ctx.change_indicator());
    }

    #[test]
    fn raw_geolocation_fields() {
        let mut ctx = ContextPacket::with_stream_id(7);
        ctx.set_raw_field(cif::FORMATTED_GPS, Some(&[0xAB; 44])).unwrap();
        assert_eq!(ctx.formatted_gps(), Some(&[0xAB; 44][..]));
        assert!(ctx
            .set_raw_field(cif::ECEF_EPHEMERIS, Some(&[0u8; 8]))
            .is_err());
        assert!(ctx.set_raw_field(cif::CHANGE_INDICATOR, Some(&[])).is_err());
    }

    #[test]
    fn layout_mismatch_rejected() {
        let mut packet = Packet::new(PacketType::Context);
        packet.stream_id = Some(1);
        // Bandwidth bit set but no field bytes.
        packet.payload = Bytes::from_static(&[0x20, 0x00, 0x00, 0x00]);
        assert!(matches!(
            ContextPacket::new(packet.clone()),
            Err(CodecError::Truncated { .. })
        ));

        packet.payload = Bytes::from_static(&[0, 0, 0, 0, 1, 2, 3, 4]);
        assert!(matches!(
            ContextPacket::new(packet),
            Err(CodecError::InvalidField(_))
        ));
    }

    #[test]
    fn reserved_bits_rejected() {
        let mut packet = Packet::new(PacketType::ExtContext);
        packet.payload = Bytes::from_static(&[0, 0, 0, 0x02]);
        assert!(ContextPacket::new(packet).is_err());
    }

    #[test]
    fn data_packet_is_not_context() {
        assert!(matches!(
            ContextPacket::new(Packet::data(Some(1), Vec::new())),
            Err(CodecError::WrongPacketKind { .. })
        ));
    }
}
