/// Errors that can occur during packet and frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The buffer ended before the structure it should contain.
    #[error("buffer truncated ({available} bytes, need {needed})")]
    Truncated { needed: usize, available: usize },

    /// The declared length does not match the supplied buffer.
    #[error("length mismatch (declared {declared} bytes, buffer {actual} bytes)")]
    LengthMismatch { declared: usize, actual: usize },

    /// Header plus optional sections run past the declared packet length.
    #[error("header overruns packet ({header} header bytes, packet {declared} bytes)")]
    HeaderOverrun { header: usize, declared: usize },

    /// The 4-bit packet type is not a defined VRT packet type.
    #[error("undefined packet type {0}")]
    UnknownPacketType(u8),

    /// The buffer does not start with the VRL alignment word.
    #[error("invalid VRL alignment word 0x{0:08X}")]
    InvalidAlignment(u32),

    /// The VRL trailer CRC does not match the frame contents.
    #[error("corrupt frame (CRC 0x{expected:08X}, computed 0x{computed:08X})")]
    CrcMismatch { expected: u32, computed: u32 },

    /// The encoded packet or frame exceeds the representable size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// A packet's fields are inconsistent with its packet type.
    #[error("invalid packet: {0}")]
    InvalidPacket(String),

    /// A context field could not be parsed.
    #[error("invalid context field: {0}")]
    InvalidField(String),

    /// The packet is not of the kind the caller asked for.
    #[error("expected {expected} packet, got {actual}")]
    WrongPacketKind {
        expected: &'static str,
        actual: &'static str,
    },

    /// An I/O error occurred while reading or writing a packet stream.
    #[error("packet I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream was closed before a complete packet was received.
    #[error("stream closed (incomplete packet)")]
    StreamClosed,
}

impl CodecError {
    /// True if this error reports a CRC failure rather than a malformed layout.
    pub fn is_corrupt(&self) -> bool {
        matches!(self, CodecError::CrcMismatch { .. })
    }
}

pub type Result<T> = std::result::Result<T, CodecError>;
