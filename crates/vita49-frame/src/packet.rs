use bytes::{BufMut, Bytes, BytesMut};

use crate::class_id::ClassIdentifier;
use crate::error::{CodecError, Result};
use crate::header::{PacketHeader, HEADER_WORD_SIZE, MAX_PACKET_WORDS};
use crate::packet_type::PacketType;
use crate::timestamp::{FractionalMode, IntegerMode, TimeStamp};
use crate::trailer::Trailer;

/// Largest encodable packet in bytes.
pub const MAX_PACKET_SIZE: usize = MAX_PACKET_WORDS * 4;

/// A decoded VRT packet.
///
/// The payload is kept as opaque bytes; [`crate::DataPacket`] and
/// [`crate::ContextPacket`] interpret it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub packet_type: PacketType,
    /// 4-bit modulo packet counter.
    pub packet_count: u8,
    /// Present iff the packet type carries a stream identifier.
    pub stream_id: Option<u32>,
    pub class_id: Option<ClassIdentifier>,
    pub timestamp: TimeStamp,
    /// Header bit 25 ("not a V49.0 packet").
    pub not_v49_0: bool,
    /// Header bit 24 (TSM for context, spectrum flag for data).
    pub type_specific: bool,
    /// Whole 32-bit words of payload.
    pub payload: Bytes,
    /// Data packets only.
    pub trailer: Option<Trailer>,
}

impl Packet {
    /// An empty packet of the given type. Types with a stream identifier
    /// start with stream id 0.
    pub fn new(packet_type: PacketType) -> Self {
        Self {
            packet_type,
            packet_count: 0,
            stream_id: packet_type.has_stream_id().then_some(0),
            class_id: None,
            timestamp: TimeStamp::default(),
            not_v49_0: false,
            type_specific: false,
            payload: Bytes::new(),
            trailer: None,
        }
    }

    /// A data packet carrying `payload`, identified when `stream_id` is set.
    pub fn data(stream_id: Option<u32>, payload: impl Into<Bytes>) -> Self {
        Self {
            stream_id,
            payload: payload.into(),
            ..Self::new(PacketType::data(stream_id.is_some()))
        }
    }

    /// Decode exactly one packet from `buf`.
    ///
    /// With `validate`, the declared length must equal `buf.len()`; without
    /// it, trailing bytes beyond the declared length are ignored.
    pub fn decode(buf: &[u8], validate: bool) -> Result<Self> {
        let header = PacketHeader::peek(buf)?;
        let declared = header.packet_len();

        if validate && declared != buf.len() {
            return Err(CodecError::LengthMismatch {
                declared,
                actual: buf.len(),
            });
        }
        if declared > buf.len() {
            return Err(CodecError::Truncated {
                needed: declared,
                available: buf.len(),
            });
        }

        let prologue = header.prologue_len();
        let trailer_len = header.trailer_len();
        if prologue + trailer_len > declared {
            return Err(CodecError::HeaderOverrun {
                header: prologue + trailer_len,
                declared,
            });
        }

        let mut pos = HEADER_WORD_SIZE;
        let mut word = || {
            let value = u32::from_be_bytes([buf[pos], buf[pos + 1], buf[pos + 2], buf[pos + 3]]);
            pos += 4;
            value
        };

        let stream_id = header.packet_type.has_stream_id().then(&mut word);
        let class_id = if header.has_class_id {
            let first = word();
            let second = word();
            Some(ClassIdentifier::from_words(first, second))
        } else {
            None
        };
        let seconds = if header.integer_mode != IntegerMode::None {
            word()
        } else {
            0
        };
        let fractional = if header.fractional_mode != FractionalMode::None {
            let hi = word();
            let lo = word();
            (u64::from(hi) << 32) | u64::from(lo)
        } else {
            0
        };

        let payload_end = declared - trailer_len;
        let payload = Bytes::copy_from_slice(&buf[prologue..payload_end]);
        let trailer = header.has_trailer.then(|| {
            Trailer::from_word(u32::from_be_bytes([
                buf[payload_end],
                buf[payload_end + 1],
                buf[payload_end + 2],
                buf[payload_end + 3],
            ]))
        });

        Ok(Self {
            packet_type: header.packet_type,
            packet_count: header.packet_count,
            stream_id,
            class_id,
            timestamp: TimeStamp {
                integer_mode: header.integer_mode,
                fractional_mode: header.fractional_mode,
                seconds,
                fractional,
            },
            not_v49_0: header.not_v49_0,
            type_specific: header.type_specific,
            payload,
            trailer,
        })
    }

    /// Check field consistency against the packet type.
    pub fn validate(&self) -> Result<()> {
        if self.packet_type.has_stream_id() != self.stream_id.is_some() {
            return Err(CodecError::InvalidPacket(format!(
                "{} packet {} a stream identifier",
                self.packet_type,
                if self.stream_id.is_some() {
                    "must not carry"
                } else {
                    "requires"
                }
            )));
        }
        if self.trailer.is_some() && !self.packet_type.is_data() {
            return Err(CodecError::InvalidPacket(
                "only data packets carry a trailer".to_string(),
            ));
        }
        if self.packet_count > 0xF {
            return Err(CodecError::InvalidPacket(format!(
                "packet count {} exceeds 4 bits",
                self.packet_count
            )));
        }
        if self.payload.len() % 4 != 0 {
            return Err(CodecError::InvalidPacket(format!(
                "payload of {} bytes is not a whole number of words",
                self.payload.len()
            )));
        }
        if self.wire_len() > MAX_PACKET_SIZE {
            return Err(CodecError::PayloadTooLarge {
                size: self.wire_len(),
                max: MAX_PACKET_SIZE,
            });
        }
        Ok(())
    }

    /// The header word this packet encodes to.
    pub fn header(&self) -> PacketHeader {
        PacketHeader {
            packet_type: self.packet_type,
            has_class_id: self.class_id.is_some(),
            has_trailer: self.trailer.is_some(),
            not_v49_0: self.not_v49_0,
            type_specific: self.type_specific,
            integer_mode: self.timestamp.integer_mode,
            fractional_mode: self.timestamp.fractional_mode,
            packet_count: self.packet_count,
            packet_size: (self.wire_len() / 4).min(MAX_PACKET_WORDS) as u16,
        }
    }

    /// Bytes of header word plus optional prologue sections.
    pub fn header_len(&self) -> usize {
        let mut len = HEADER_WORD_SIZE + self.timestamp.wire_len();
        if self.stream_id.is_some() {
            len += 4;
        }
        if self.class_id.is_some() {
            len += ClassIdentifier::SIZE;
        }
        len
    }

    /// Total encoded size in bytes.
    pub fn wire_len(&self) -> usize {
        let trailer = if self.trailer.is_some() {
            Trailer::SIZE
        } else {
            0
        };
        self.header_len() + self.payload.len() + trailer
    }

    /// Append the wire encoding to `dst`.
    pub fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        self.validate()?;
        dst.reserve(self.wire_len());

        dst.put_u32(self.header().to_word());
        if let Some(stream_id) = self.stream_id {
            dst.put_u32(stream_id);
        }
        if let Some(class_id) = self.class_id {
            let (first, second) = class_id.to_words();
            dst.put_u32(first);
            dst.put_u32(second);
        }
        if self.timestamp.integer_mode != IntegerMode::None {
            dst.put_u32(self.timestamp.seconds);
        }
        if self.timestamp.fractional_mode != FractionalMode::None {
            dst.put_u64(self.timestamp.fractional);
        }
        dst.put_slice(&self.payload);
        if let Some(trailer) = self.trailer {
            dst.put_u32(trailer.to_word());
        }
        Ok(())
    }

    /// Encode into a fresh buffer.
    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(self.wire_len());
        self.encode(&mut buf)?;
        Ok(buf.freeze())
    }

    /// Key for per-stream counters: packet type in the upper half, stream
    /// identifier (or 0) in the lower half.
    pub fn stream_code(&self) -> u64 {
        (u64::from(self.packet_type.code()) << 32) | u64::from(self.stream_id.unwrap_or(0))
    }

    pub fn is_data(&self) -> bool {
        self.packet_type.is_data()
    }

    pub fn is_context(&self) -> bool {
        self.packet_type.is_context()
    }
}

/// Decode a single packet (see [`Packet::decode`]).
pub fn decode_packet(buf: &[u8], validate: bool) -> Result<Packet> {
    Packet::decode(buf, validate)
}

/// Encode a single packet, appending to `dst`.
pub fn encode_packet(packet: &Packet, dst: &mut BytesMut) -> Result<()> {
    packet.encode(dst)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trailer::StateEvent;
    use proptest::prelude::*;

    fn full_packet() -> Packet {
        let mut trailer = Trailer::default();
        trailer.set(StateEvent::ValidData, Some(true));
        Packet {
            packet_type: PacketType::Data,
            packet_count: 5,
            stream_id: Some(0x1234_5678),
            class_id: Some(ClassIdentifier::new(0xFFFFFA, 1, 2)),
            timestamp: TimeStamp::utc(1_700_000_000, 123_456),
            not_v49_0: false,
            type_specific: false,
            payload: Bytes::from_static(&[1, 2, 3, 4, 5, 6, 7, 8]),
            trailer: Some(trailer),
        }
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let packet = full_packet();
        let wire = packet.to_bytes().unwrap();
        assert_eq!(wire.len(), 4 + 4 + 8 + 4 + 8 + 8 + 4);
        assert_eq!(wire.len(), packet.wire_len());

        let decoded = Packet::decode(&wire, true).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn test_minimal_packet() {
        let packet = Packet::data(None, Bytes::new());
        let wire = packet.to_bytes().unwrap();
        assert_eq!(wire.as_ref(), &[0x00, 0x00, 0x00, 0x01]);
        assert_eq!(Packet::decode(&wire, true).unwrap(), packet);
    }

    #[test]
    fn test_length_mismatch_when_validating() {
        let mut wire = BytesMut::from(full_packet().to_bytes().unwrap().as_ref());
        wire.put_u32(0);
        assert!(matches!(
            Packet::decode(&wire, true),
            Err(CodecError::LengthMismatch { .. })
        ));
        assert!(Packet::decode(&wire, false).is_ok());
    }

    #[test]
    fn test_truncated_buffer() {
        let wire = full_packet().to_bytes().unwrap();
        assert!(matches!(
            Packet::decode(&wire[..wire.len() - 4], false),
            Err(CodecError::Truncated { .. })
        ));
    }

    #[test]
    fn test_header_overrun() {
        // Data with stream id, class id, declared size of 2 words.
        let wire = [0x18, 0x00, 0x00, 0x02, 0, 0, 0, 1];
        assert!(matches!(
            Packet::decode(&wire, true),
            Err(CodecError::HeaderOverrun { .. })
        ));
    }

    #[test]
    fn test_undefined_type() {
        let wire = [0xF0, 0x00, 0x00, 0x01];
        assert!(matches!(
            Packet::decode(&wire, true),
            Err(CodecError::UnknownPacketType(15))
        ));
    }

    #[test]
    fn test_encode_rejects_inconsistent_stream_id() {
        let mut packet = Packet::new(PacketType::Context);
        packet.stream_id = None;
        assert!(matches!(
            packet.to_bytes(),
            Err(CodecError::InvalidPacket(_))
        ));
    }

    #[test]
    fn test_encode_rejects_context_trailer() {
        let mut packet = Packet::new(PacketType::Context);
        packet.trailer = Some(Trailer::default());
        assert!(packet.to_bytes().is_err());
    }

    #[test]
    fn test_encode_rejects_unaligned_payload() {
        let packet = Packet::data(Some(1), vec![1u8, 2, 3]);
        assert!(packet.to_bytes().is_err());
    }

    #[test]
    fn test_stream_code_separates_types() {
        let data = Packet::data(Some(7), Bytes::new());
        let mut ctx = Packet::new(PacketType::Context);
        ctx.stream_id = Some(7);
        assert_ne!(data.stream_code(), ctx.stream_code());
        assert_eq!(data.stream_code() & 0xFFFF_FFFF, 7);
    }

    fn arb_packet() -> impl Strategy<Value = Packet> {
        (
            0u8..=5,
            0u8..16,
            any::<u32>(),
            proptest::option::of((any::<u32>(), any::<u16>(), any::<u16>())),
            0u8..4,
            0u8..4,
            any::<u32>(),
            any::<u64>(),
            proptest::collection::vec(any::<u32>(), 0..16),
            proptest::option::of(any::<u32>()),
        )
            .prop_map(
                |(code, count, sid, cid, tsi, tsf, secs, frac, words, trailer)| {
                    let packet_type = PacketType::from_code(code).unwrap();
                    let integer_mode = IntegerMode::from_bits(tsi);
                    let fractional_mode = FractionalMode::from_bits(tsf);
                    let mut payload = BytesMut::new();
                    for w in words {
                        payload.put_u32(w);
                    }
                    Packet {
                        packet_type,
                        packet_count: count,
                        stream_id: packet_type.has_stream_id().then_some(sid),
                        class_id: cid.map(|(o, i, p)| ClassIdentifier::new(o, i, p)),
                        timestamp: TimeStamp {
                            integer_mode,
                            fractional_mode,
                            seconds: if integer_mode == IntegerMode::None { 0 } else { secs },
                            fractional: if fractional_mode == FractionalMode::None {
                                0
                            } else {
                                frac
                            },
                        },
                        not_v49_0: false,
                        type_specific: false,
                        payload: payload.freeze(),
                        trailer: trailer
                            .filter(|_| packet_type.is_data())
                            .map(Trailer::from_word),
                    }
                },
            )
    }

    proptest! {
        #[test]
        fn decode_inverts_encode(packet in arb_packet()) {
            let wire = packet.to_bytes().unwrap();
            prop_assert_eq!(Packet::decode(&wire, true).unwrap(), packet);
        }
    }
}
