use std::net::SocketAddr;
use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use bytes::BytesMut;
use tracing::{debug, info, trace, warn};
use vita49_frame::{encode_frame, Packet};
use vita49_transport::DatagramTransport;

use crate::config::WriterConfig;
use crate::error::{Result, StreamError};
use crate::fanout::{Diagnostic, EventFanout, Outbound};
use crate::sequence::SequenceTracker;

const FRAME_KEY: u64 = 0;

/// Sends VRT packets, bare or wrapped in VRL frames, to one UDP destination.
///
/// Packet counters are assigned per stream and frame counters per writer.
/// "Sent" events run on a background notifier thread so slow listeners do
/// not hold up the send path.
pub struct VrtWriter {
    config: WriterConfig,
    transport: DatagramTransport,
    fanout: Arc<EventFanout<Outbound>>,
    state: Mutex<SendState>,
    notifier: Option<Notifier>,
}

struct SendState {
    packets: SequenceTracker,
    frames: SequenceTracker,
    buf: BytesMut,
}

struct Notifier {
    tx: mpsc::Sender<Vec<Packet>>,
    handle: JoinHandle<()>,
}

impl VrtWriter {
    pub fn open(config: WriterConfig) -> Result<Self> {
        let transport = DatagramTransport::sender(config.transport.clone())?;
        let fanout = Arc::new(EventFanout::new());

        let (tx, rx) = mpsc::channel::<Vec<Packet>>();
        let handle = {
            let fanout = Arc::clone(&fanout);
            thread::Builder::new()
                .name("vita49-notify".to_string())
                .spawn(move || {
                    for batch in rx {
                        for packet in &batch {
                            fanout.fire_sent(packet);
                        }
                    }
                })
                .map_err(StreamError::Spawn)?
        };

        info!(
            local = %transport.local_addr(),
            framing = config.framing,
            crc = config.crc,
            "writer opened"
        );
        Ok(Self {
            state: Mutex::new(SendState {
                packets: SequenceTracker::packets(),
                frames: SequenceTracker::frames(),
                buf: BytesMut::with_capacity(config.max_frame_bytes),
            }),
            config,
            transport,
            fanout,
            notifier: Some(Notifier { tx, handle }),
        })
    }

    pub fn config(&self) -> &WriterConfig {
        &self.config
    }

    pub fn fanout(&self) -> &Arc<EventFanout<Outbound>> {
        &self.fanout
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.transport.local_addr()
    }

    pub fn reconnect(&self) -> Result<()> {
        self.transport.reconnect()?;
        Ok(())
    }

    pub fn send_packet(&self, packet: &Packet) -> Result<usize> {
        self.send_packets(std::slice::from_ref(packet))
    }

    /// Send `packets` in order. With framing enabled, as many packets as fit
    /// share each frame. Returns the number of datagrams sent.
    ///
    /// On failure the packets already on the wire still get their "sent"
    /// event; the rest are dropped.
    pub fn send_packets(&self, packets: &[Packet]) -> Result<usize> {
        if packets.is_empty() {
            return Ok(0);
        }
        let mut guard = lock(&self.state);
        let state = &mut *guard;

        let mut outgoing = Vec::with_capacity(packets.len());
        for packet in packets {
            let mut packet = packet.clone();
            packet.packet_count = state.packets.assign(packet.stream_code()) as u8;
            outgoing.push(packet);
        }

        let mut done = Transmitted::default();
        let result = self.transmit(state, &outgoing, &mut done);
        drop(guard);

        outgoing.truncate(done.packets);
        if let (Some(notifier), false) = (&self.notifier, outgoing.is_empty()) {
            // The notifier only stops when the writer is dropped.
            let _ = notifier.tx.send(outgoing);
        }
        if let Err(err) = result {
            warn!(sent = done.packets, error = %err, "send failed");
            self.fanout
                .fire_diagnostic(&Diagnostic::error(format!("send failed: {err}")));
            return Err(err);
        }
        Ok(done.datagrams)
    }

    fn transmit(
        &self,
        state: &mut SendState,
        packets: &[Packet],
        done: &mut Transmitted,
    ) -> Result<()> {
        if self.config.framing {
            let mut rest = packets;
            while !rest.is_empty() {
                state.buf.clear();
                let frame_count = state.frames.assign(FRAME_KEY);
                let packed = encode_frame(
                    frame_count,
                    rest,
                    self.config.max_frame_bytes,
                    self.config.crc,
                    &mut state.buf,
                )?;
                self.transport.send(&state.buf)?;
                trace!(frame_count, packed, len = state.buf.len(), "frame sent");
                rest = &rest[packed..];
                done.datagrams += 1;
                done.packets += packed;
            }
        } else {
            for packet in packets {
                state.buf.clear();
                packet.encode(&mut state.buf)?;
                self.transport.send(&state.buf)?;
                trace!(stream_id = packet.stream_id, len = state.buf.len(), "packet sent");
                done.datagrams += 1;
                done.packets += 1;
            }
        }
        Ok(())
    }
}

/// Progress of one `send_packets` call.
#[derive(Debug, Default)]
struct Transmitted {
    datagrams: usize,
    packets: usize,
}

impl Drop for VrtWriter {
    fn drop(&mut self) {
        if let Some(Notifier { tx, handle }) = self.notifier.take() {
            drop(tx);
            let _ = handle.join();
        }
        debug!("writer closed");
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
