use crate::class_id::ClassIdentifier;
use crate::error::{CodecError, Result};
use crate::packet_type::PacketType;
use crate::timestamp::{FractionalMode, IntegerMode};

/// Size of the fixed header word.
pub const HEADER_WORD_SIZE: usize = 4;

/// Largest packet size expressible in the 16-bit length field.
pub const MAX_PACKET_WORDS: usize = 0xFFFF;

const CLASS_ID_BIT: u32 = 1 << 27;
const TRAILER_BIT: u32 = 1 << 26;
const NOT_V49_0_BIT: u32 = 1 << 25;
const TYPE_SPECIFIC_BIT: u32 = 1 << 24;

/// The decoded first word of a VRT packet.
///
/// ```text
/// 31..28  27  26  25  24  23..22 21..20 19..16  15..0
/// type    C   T   V   S   TSI    TSF    count   size (words)
/// ```
///
/// `T` is only defined for data packets; for context packets the bit is
/// reserved and always decodes as "no trailer".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub packet_type: PacketType,
    pub has_class_id: bool,
    pub has_trailer: bool,
    pub not_v49_0: bool,
    pub type_specific: bool,
    pub integer_mode: IntegerMode,
    pub fractional_mode: FractionalMode,
    pub packet_count: u8,
    pub packet_size: u16,
}

impl PacketHeader {
    /// Parse the header word. Fails only for undefined packet types.
    pub fn parse(word: u32) -> Result<Self> {
        let packet_type = PacketType::from_code((word >> 28) as u8)?;
        Ok(Self {
            packet_type,
            has_class_id: word & CLASS_ID_BIT != 0,
            has_trailer: packet_type.is_data() && word & TRAILER_BIT != 0,
            not_v49_0: word & NOT_V49_0_BIT != 0,
            type_specific: word & TYPE_SPECIFIC_BIT != 0,
            integer_mode: IntegerMode::from_bits((word >> 22) as u8),
            fractional_mode: FractionalMode::from_bits((word >> 20) as u8),
            packet_count: ((word >> 16) & 0xF) as u8,
            packet_size: word as u16,
        })
    }

    /// Peek at the header word at the start of `buf`.
    pub fn peek(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_WORD_SIZE {
            return Err(CodecError::Truncated {
                needed: HEADER_WORD_SIZE,
                available: buf.len(),
            });
        }
        Self::parse(u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]))
    }

    /// Encode to the header word.
    pub fn to_word(&self) -> u32 {
        let mut word = u32::from(self.packet_type.code()) << 28;
        if self.has_class_id {
            word |= CLASS_ID_BIT;
        }
        if self.has_trailer && self.packet_type.is_data() {
            word |= TRAILER_BIT;
        }
        if self.not_v49_0 {
            word |= NOT_V49_0_BIT;
        }
        if self.type_specific {
            word |= TYPE_SPECIFIC_BIT;
        }
        word |= u32::from(self.integer_mode.bits()) << 22;
        word |= u32::from(self.fractional_mode.bits()) << 20;
        word |= u32::from(self.packet_count & 0xF) << 16;
        word | u32::from(self.packet_size)
    }

    /// Declared total packet length in bytes.
    pub fn packet_len(&self) -> usize {
        usize::from(self.packet_size) * 4
    }

    /// Bytes of header word plus all optional prologue sections.
    pub fn prologue_len(&self) -> usize {
        let mut len = HEADER_WORD_SIZE;
        if self.packet_type.has_stream_id() {
            len += 4;
        }
        if self.has_class_id {
            len += ClassIdentifier::SIZE;
        }
        if self.integer_mode != IntegerMode::None {
            len += 4;
        }
        if self.fractional_mode != FractionalMode::None {
            len += 8;
        }
        len
    }

    /// Bytes of trailer at the end of the packet.
    pub fn trailer_len(&self) -> usize {
        if self.has_trailer {
            4
        } else {
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_all_fields() {
        // type 1, C, T, TSI=UTC, TSF=real-time, count 9, size 7
        let word = 0x1C69_0007;
        let hdr = PacketHeader::parse(word).unwrap();
        assert_eq!(hdr.packet_type, PacketType::Data);
        assert!(hdr.has_class_id);
        assert!(hdr.has_trailer);
        assert!(!hdr.not_v49_0);
        assert_eq!(hdr.integer_mode, IntegerMode::Utc);
        assert_eq!(hdr.fractional_mode, FractionalMode::RealTime);
        assert_eq!(hdr.packet_count, 9);
        assert_eq!(hdr.packet_size, 7);
        assert_eq!(hdr.to_word(), word);
        assert_eq!(hdr.prologue_len(), 4 + 4 + 8 + 4 + 8);
    }

    #[test]
    fn context_ignores_trailer_bit() {
        let hdr = PacketHeader::parse(0x4400_0002).unwrap();
        assert_eq!(hdr.packet_type, PacketType::Context);
        assert!(!hdr.has_trailer);
        assert_eq!(hdr.trailer_len(), 0);
    }

    #[test]
    fn undefined_type_fails() {
        assert!(matches!(
            PacketHeader::parse(0x9000_0001),
            Err(CodecError::UnknownPacketType(9))
        ));
    }

    #[test]
    fn peek_short_buffer() {
        assert!(matches!(
            PacketHeader::peek(&[0x10, 0x00]),
            Err(CodecError::Truncated { needed: 4, .. })
        ));
    }
}
