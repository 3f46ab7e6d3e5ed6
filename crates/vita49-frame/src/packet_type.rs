//! VRT packet types.
//!
//! The 4-bit type code in the top of the header word. Codes 0-5 are defined;
//! everything above is rejected on decode.

use crate::error::CodecError;

/// The packet-type field of a VRT header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PacketType {
    /// IF data packet without stream identifier.
    UnidentifiedData = 0,
    /// IF data packet with stream identifier.
    Data = 1,
    /// Extension data packet without stream identifier.
    UnidentifiedExtData = 2,
    /// Extension data packet with stream identifier.
    ExtData = 3,
    /// IF context packet.
    Context = 4,
    /// Extension context packet.
    ExtContext = 5,
}

impl PacketType {
    /// Parse a 4-bit type code.
    pub fn from_code(code: u8) -> Result<Self, CodecError> {
        match code {
            0 => Ok(Self::UnidentifiedData),
            1 => Ok(Self::Data),
            2 => Ok(Self::UnidentifiedExtData),
            3 => Ok(Self::ExtData),
            4 => Ok(Self::Context),
            5 => Ok(Self::ExtContext),
            other => Err(CodecError::UnknownPacketType(other)),
        }
    }

    /// The 4-bit wire code.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Data-like packets carry samples and may carry a trailer.
    pub fn is_data(self) -> bool {
        self.code() <= 3
    }

    /// Context-like packets carry metadata fields.
    pub fn is_context(self) -> bool {
        !self.is_data()
    }

    /// Whether the header is followed by a 32-bit stream identifier.
    pub fn has_stream_id(self) -> bool {
        !matches!(self, Self::UnidentifiedData | Self::UnidentifiedExtData)
    }

    /// Human-readable name.
    pub fn name(self) -> &'static str {
        match self {
            Self::UnidentifiedData => "DATA (no stream id)",
            Self::Data => "DATA",
            Self::UnidentifiedExtData => "EXT_DATA (no stream id)",
            Self::ExtData => "EXT_DATA",
            Self::Context => "CONTEXT",
            Self::ExtContext => "EXT_CONTEXT",
        }
    }

    /// The data type matching a stream-identifier presence.
    pub fn data(with_stream_id: bool) -> Self {
        if with_stream_id {
            Self::Data
        } else {
            Self::UnidentifiedData
        }
    }
}

impl std::fmt::Display for PacketType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defined_codes_roundtrip() {
        for code in 0..=5u8 {
            assert_eq!(PacketType::from_code(code).unwrap().code(), code);
        }
    }

    #[test]
    fn undefined_codes_rejected() {
        for code in 6..=15u8 {
            assert!(matches!(
                PacketType::from_code(code),
                Err(CodecError::UnknownPacketType(c)) if c == code
            ));
        }
    }

    #[test]
    fn classification() {
        assert!(PacketType::UnidentifiedData.is_data());
        assert!(!PacketType::UnidentifiedData.has_stream_id());
        assert!(PacketType::ExtData.has_stream_id());
        assert!(PacketType::Context.is_context());
        assert!(PacketType::ExtContext.has_stream_id());
    }
}
