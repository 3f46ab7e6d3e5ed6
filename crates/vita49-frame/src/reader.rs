use std::collections::VecDeque;
use std::io::{ErrorKind, Read};

use bytes::BytesMut;
use tracing::trace;

use crate::error::{CodecError, Result};
use crate::header::PacketHeader;
use crate::packet::Packet;
use crate::vrl::{is_vrl_frame, peek_frame_len, Datagram, VrlFrame};

const INITIAL_BUFFER_CAPACITY: usize = 64 * 1024;
const READ_CHUNK_SIZE: usize = 16 * 1024;

/// Reads VRT packets and VRL frames from any `Read` stream.
///
/// Handles partial reads internally. Frames are detected by their
/// alignment word; anything else must start with a VRT header.
pub struct PacketReader<T> {
    inner: T,
    buf: BytesMut,
    pending: VecDeque<Packet>,
    eof: bool,
}

impl<T: Read> PacketReader<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            pending: VecDeque::new(),
            eof: false,
        }
    }

    /// Read the next frame or bare packet (blocking).
    ///
    /// Returns `Ok(None)` on a clean end of stream and
    /// `Err(CodecError::StreamClosed)` when the stream ends mid-item.
    pub fn read_datagram(&mut self) -> Result<Option<Datagram>> {
        loop {
            if let Some(len) = self.complete_item_len()? {
                let item = self.buf.split_to(len);
                return Datagram::decode(&item).map(Some);
            }

            if self.eof {
                return if self.buf.is_empty() {
                    Ok(None)
                } else {
                    Err(CodecError::StreamClosed)
                };
            }
            self.fill()?;
        }
    }

    /// Read the next packet, unpacking frames transparently.
    pub fn read_packet(&mut self) -> Result<Option<Packet>> {
        loop {
            if let Some(packet) = self.pending.pop_front() {
                return Ok(Some(packet));
            }
            match self.read_datagram()? {
                None => return Ok(None),
                Some(Datagram::Packet(packet)) => return Ok(Some(packet)),
                Some(Datagram::Frame(frame)) => self.queue_frame(&frame)?,
            }
        }
    }

    /// True when at least `n` bytes are buffered and can be consumed without
    /// touching the underlying stream.
    pub fn is_ready(&self, n: usize) -> bool {
        self.buf.len() >= n
    }

    /// Bytes buffered but not yet returned.
    pub fn buffered(&self) -> usize {
        self.buf.len()
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

    fn queue_frame(&mut self, frame: &VrlFrame) -> Result<()> {
        let before = self.pending.len();
        for packet in frame.packets() {
            self.pending.push_back(packet?);
        }
        trace!(
            frame_count = frame.frame_count(),
            packets = self.pending.len() - before,
            "unpacked frame"
        );
        Ok(())
    }

    fn complete_item_len(&self) -> Result<Option<usize>> {
        let len = if is_vrl_frame(&self.buf) {
            peek_frame_len(&self.buf)?
        } else if self.buf.len() >= 4 {
            let header = PacketHeader::peek(&self.buf)?;
            if header.packet_size == 0 {
                return Err(CodecError::InvalidPacket(
                    "zero-length packet in stream".to_string(),
                ));
            }
            Some(header.packet_len())
        } else {
            None
        };
        Ok(len.filter(|&len| self.buf.len() >= len))
    }

    fn fill(&mut self) -> Result<()> {
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            match self.inner.read(&mut chunk) {
                Ok(0) => {
                    self.eof = true;
                    return Ok(());
                }
                Ok(n) => {
                    self.buf.extend_from_slice(&chunk[..n]);
                    return Ok(());
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(CodecError::Io(err)),
            }
        }
    }
}

impl<T: Read> Iterator for PacketReader<T> {
    type Item = Result<Packet>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_packet().transpose()
    }
}
