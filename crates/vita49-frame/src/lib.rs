//! VITA-49 packet (VRT) and frame (VRL) codec.
//!
//! Every VRT packet starts with a big-endian header word whose flag bits
//! gate the optional prologue sections:
//! - stream identifier (4 bytes, identified packet types)
//! - class identifier (8 bytes, `C` bit)
//! - integer then fractional timestamp (4 + 8 bytes, `TSI`/`TSF` codes)
//!
//! The payload follows, then an optional trailer word (data packets only).
//! VRL frames wrap one or more packets between a `VRLP` alignment word and
//! a CRC or `VEND` trailer.
//!
//! Pure transforms only; [`PacketReader`] and [`PacketWriter`] adapt the
//! codec to byte streams.

pub mod assoc;
pub mod class_id;
pub mod context;
pub mod data;
pub mod error;
pub mod fixed;
pub mod header;
pub mod packet;
pub mod packet_type;
pub mod payload_format;
pub mod reader;
pub mod timestamp;
pub mod trailer;
pub mod vrl;
pub mod writer;

pub use assoc::ContextAssocLists;
pub use class_id::ClassIdentifier;
pub use context::{cif, ContextPacket, DeviceIdentifier, Gain};
pub use data::{decode_samples, encode_samples, DataPacket};
pub use error::{CodecError, Result};
pub use header::{PacketHeader, HEADER_WORD_SIZE, MAX_PACKET_WORDS};
pub use packet::{decode_packet, encode_packet, Packet, MAX_PACKET_SIZE};
pub use packet_type::PacketType;
pub use payload_format::{DataItemFormat, PayloadFormat, RealComplex};
pub use reader::PacketReader;
pub use timestamp::{FractionalMode, IntegerMode, TimeStamp};
pub use trailer::{StateEvent, Trailer};
pub use vrl::{
    encode_frame, frame_crc, is_vrl_frame, Datagram, DatagramPackets, FramePackets, VrlFrame,
    ALIGNMENT_WORD, FRAME_COUNT_MODULUS, FRAME_OVERHEAD, MAX_FRAME_WORDS, NO_CRC_WORD,
};
pub use writer::PacketWriter;
