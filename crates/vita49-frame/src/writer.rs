use std::io::{ErrorKind, Write};

use bytes::BytesMut;

use crate::error::{CodecError, Result};
use crate::packet::Packet;
use crate::vrl::{encode_frame, MAX_FRAME_WORDS};

const INITIAL_BUFFER_CAPACITY: usize = 64 * 1024;

/// Writes encoded VRT packets and VRL frames to any `Write` stream.
pub struct PacketWriter<T> {
    inner: T,
    buf: BytesMut,
}

impl<T: Write> PacketWriter<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
        }
    }

    /// Encode and write one bare packet (blocking).
    pub fn write_packet(&mut self, packet: &Packet) -> Result<()> {
        self.buf.clear();
        packet.encode(&mut self.buf)?;
        self.write_buffered()
    }

    /// Write all `packets` in a single frame.
    pub fn write_frame(&mut self, frame_count: u16, packets: &[Packet], with_crc: bool) -> Result<()> {
        self.buf.clear();
        let packed = encode_frame(frame_count, packets, MAX_FRAME_WORDS * 4, with_crc, &mut self.buf)?;
        if packed != packets.len() {
            let size = packets.iter().map(Packet::wire_len).sum();
            return Err(CodecError::PayloadTooLarge {
                size,
                max: MAX_FRAME_WORDS * 4,
            });
        }
        self.write_buffered()
    }

    /// Write pre-encoded bytes as-is.
    pub fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.buf.clear();
        self.buf.extend_from_slice(bytes);
        self.write_buffered()
    }

    fn write_buffered(&mut self) -> Result<()> {
        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => return Err(CodecError::StreamClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(CodecError::Io(err)),
            }
        }
        self.flush()
    }

    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(CodecError::Io(err)),
            }
        }
    }

    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}
