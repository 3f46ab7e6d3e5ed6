use bytes::{BufMut, Bytes, BytesMut};
use crc::{Algorithm, Crc};

use crate::error::{CodecError, Result};
use crate::header::PacketHeader;
use crate::packet::Packet;

/// "VRLP": first word of every VRL frame.
pub const ALIGNMENT_WORD: u32 = 0x5652_4C50;

/// "VEND": frame trailer when no CRC is carried.
pub const NO_CRC_WORD: u32 = 0x5645_4E44;

/// Alignment word + counter/size word + trailer word.
pub const FRAME_OVERHEAD: usize = 12;

/// Largest frame expressible in the 20-bit size field, in words.
pub const MAX_FRAME_WORDS: usize = 0xF_FFFF;

/// Frame counter modulus (12 bits).
pub const FRAME_COUNT_MODULUS: u16 = 4096;

/// VITA-49.1 frame CRC-32.
pub const VRL_CRC32: Algorithm<u32> = Algorithm {
    width: 32,
    poly: 0x04C1_1DB7,
    init: 0,
    refin: true,
    refout: true,
    xorout: 0,
    check: 0x2DFD_2D88,
    residue: 0,
};

const CRC: Crc<u32> = Crc::<u32>::new(&VRL_CRC32);

/// CRC over every frame byte except the trailing word.
pub fn frame_crc(frame_without_trailer: &[u8]) -> u32 {
    CRC.checksum(frame_without_trailer)
}

/// True when `buf` starts with the VRL alignment word.
pub fn is_vrl_frame(buf: &[u8]) -> bool {
    buf.len() >= 4 && buf[..4] == ALIGNMENT_WORD.to_be_bytes()
}

/// Declared frame length in bytes, from the second frame word.
///
/// Returns `Ok(None)` when `buf` is too short to tell.
pub fn peek_frame_len(buf: &[u8]) -> Result<Option<usize>> {
    if buf.len() < 4 {
        return Ok(None);
    }
    if !is_vrl_frame(buf) {
        return Err(CodecError::InvalidAlignment(u32::from_be_bytes([
            buf[0], buf[1], buf[2], buf[3],
        ])));
    }
    if buf.len() < 8 {
        return Ok(None);
    }
    let word = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);
    let len = (word as usize & MAX_FRAME_WORDS) * 4;
    if len < FRAME_OVERHEAD {
        return Err(CodecError::HeaderOverrun {
            header: FRAME_OVERHEAD,
            declared: len,
        });
    }
    Ok(Some(len))
}

/// A decoded VRL frame.
///
/// Contained packets are decoded on demand by [`VrlFrame::packets`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VrlFrame {
    frame_count: u16,
    body: Bytes,
    crc: Option<u32>,
}

impl VrlFrame {
    /// Decode a complete frame. The declared size must equal `buf.len()`;
    /// when the trailer is a CRC it must match the recomputed value.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        let declared = match peek_frame_len(buf)? {
            Some(len) => len,
            None => {
                return Err(CodecError::Truncated {
                    needed: 8,
                    available: buf.len(),
                })
            }
        };
        if declared != buf.len() {
            return Err(CodecError::LengthMismatch {
                declared,
                actual: buf.len(),
            });
        }

        let word = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);
        let end = buf.len() - 4;
        let trailer = u32::from_be_bytes([buf[end], buf[end + 1], buf[end + 2], buf[end + 3]]);
        let crc = if trailer == NO_CRC_WORD {
            None
        } else {
            let computed = frame_crc(&buf[..end]);
            if computed != trailer {
                return Err(CodecError::CrcMismatch {
                    expected: trailer,
                    computed,
                });
            }
            Some(trailer)
        };

        Ok(Self {
            frame_count: (word >> 20) as u16,
            body: Bytes::copy_from_slice(&buf[8..end]),
            crc,
        })
    }

    pub fn frame_count(&self) -> u16 {
        self.frame_count
    }

    pub fn crc(&self) -> Option<u32> {
        self.crc
    }

    /// Concatenated packet bytes.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn wire_len(&self) -> usize {
        FRAME_OVERHEAD + self.body.len()
    }

    /// Iterate the contained packets in frame order. Each call starts over.
    pub fn packets(&self) -> FramePackets {
        FramePackets {
            body: self.body.clone(),
            pos: 0,
        }
    }
}

/// Packets of a frame, decoded one at a time.
///
/// Stops after the first decode error.
#[derive(Debug, Clone)]
pub struct FramePackets {
    body: Bytes,
    pos: usize,
}

impl Iterator for FramePackets {
    type Item = Result<Packet>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.body.len() {
            return None;
        }
        let rest = &self.body[self.pos..];
        let result = PacketHeader::peek(rest)
            .and_then(|header| Packet::decode(rest, false).map(|p| (p, header.packet_len())));
        match result {
            Ok((packet, len)) => {
                self.pos += len;
                Some(Ok(packet))
            }
            Err(err) => {
                self.pos = self.body.len();
                Some(Err(err))
            }
        }
    }
}

/// Pack as many whole `packets` as fit in `max_frame_bytes` into one frame
/// appended to `dst`. Returns the number of packets packed.
///
/// The frame counter is truncated to 12 bits. A first packet that cannot fit
/// on its own is an error.
pub fn encode_frame(
    frame_count: u16,
    packets: &[Packet],
    max_frame_bytes: usize,
    with_crc: bool,
    dst: &mut BytesMut,
) -> Result<usize> {
    let budget = max_frame_bytes.min(MAX_FRAME_WORDS * 4);
    let mut len = FRAME_OVERHEAD;
    let mut packed = 0;
    for packet in packets {
        let next = len + packet.wire_len();
        if next > budget {
            break;
        }
        len = next;
        packed += 1;
    }
    if packed == 0 && !packets.is_empty() {
        return Err(CodecError::PayloadTooLarge {
            size: FRAME_OVERHEAD + packets[0].wire_len(),
            max: budget,
        });
    }

    let start = dst.len();
    dst.reserve(len);
    dst.put_u32(ALIGNMENT_WORD);
    dst.put_u32((u32::from(frame_count % FRAME_COUNT_MODULUS) << 20) | (len / 4) as u32);
    for packet in &packets[..packed] {
        if let Err(err) = packet.encode(dst) {
            dst.truncate(start);
            return Err(err);
        }
    }
    if with_crc {
        let crc = frame_crc(&dst[start..]);
        dst.put_u32(crc);
    } else {
        dst.put_u32(NO_CRC_WORD);
    }
    Ok(packed)
}

/// One received datagram: a VRL frame or a single bare packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Datagram {
    Frame(VrlFrame),
    Packet(Packet),
}

impl Datagram {
    /// Classify by the alignment word and decode. Bare packets must fill the
    /// buffer exactly.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if is_vrl_frame(buf) {
            VrlFrame::decode(buf).map(Self::Frame)
        } else {
            Packet::decode(buf, true).map(Self::Packet)
        }
    }

    pub fn frame_count(&self) -> Option<u16> {
        match self {
            Self::Frame(frame) => Some(frame.frame_count()),
            Self::Packet(_) => None,
        }
    }

    pub fn into_packets(self) -> DatagramPackets {
        match self {
            Self::Frame(frame) => DatagramPackets::Frame(frame.packets()),
            Self::Packet(packet) => DatagramPackets::Single(Some(packet)),
        }
    }
}

/// Iterator over the packets of a [`Datagram`].
#[derive(Debug, Clone)]
pub enum DatagramPackets {
    Frame(FramePackets),
    Single(Option<Packet>),
}

impl Iterator for DatagramPackets {
    type Item = Result<Packet>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            Self::Frame(packets) => packets.next(),
            Self::Single(packet) => packet.take().map(Ok),
        }
    }
}
