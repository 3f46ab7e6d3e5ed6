use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use tracing::{debug, info, trace, warn};
use vita49_frame::{Datagram, Packet};
use vita49_transport::{DatagramTransport, Received};

use crate::config::ReaderConfig;
use crate::error::{Result, StreamError};
use crate::fanout::{ContextAware, Diagnostic, EventFanout, Legacy};
use crate::mode::DispatchMode;
use crate::queue::IngestQueue;
use crate::sequence::SequenceTracker;

/// Frame counters are tracked per connection, not per stream.
const FRAME_KEY: u64 = 0;

/// Receives VRT packets on a UDP socket and dispatches them to listeners.
///
/// [`start`](Self::start) spawns two threads: a socket thread that only
/// receives and enqueues raw datagrams, and a worker thread that decodes,
/// checks counters and dispatches through the mode `M`.
pub struct VrtReader<M: DispatchMode> {
    config: ReaderConfig,
    transport: Arc<DatagramTransport>,
    fanout: Arc<EventFanout<M>>,
    queue: Arc<IngestQueue>,
    /// Worker state while stopped; moved into the worker thread on start.
    parked: Mutex<Option<Worker<M>>>,
    running: Mutex<Option<Running<M>>>,
    /// Each reader thread adds itself before touching a listener.
    threads: Arc<Mutex<Vec<ThreadId>>>,
    /// Packets decoded by `receive_packet` but not yet returned.
    pending: Mutex<VecDeque<Packet>>,
}

/// Reader delivering every packet through `on_received`.
pub type LegacyReader = VrtReader<Legacy>;

/// Reader that runs initial-context discovery first.
pub type ContextReader = VrtReader<ContextAware>;

struct Running<M: DispatchMode> {
    stop: Arc<AtomicBool>,
    socket: JoinHandle<()>,
    worker: JoinHandle<Worker<M>>,
}

impl<M: DispatchMode> VrtReader<M> {
    /// Bind the receive socket. Bind and group-join failures surface here.
    pub fn open(config: ReaderConfig) -> Result<Self> {
        let transport = DatagramTransport::receiver(config.transport.clone())?;
        info!(
            addr = %transport.local_addr(),
            mode = M::NAME,
            "reader opened"
        );
        Ok(Self {
            queue: Arc::new(IngestQueue::new(
                config.max_queue_items,
                config.max_queue_bytes,
            )),
            parked: Mutex::new(Some(Worker::new(&config))),
            config,
            transport: Arc::new(transport),
            fanout: Arc::new(EventFanout::new()),
            running: Mutex::new(None),
            threads: Arc::new(Mutex::new(Vec::new())),
            pending: Mutex::new(VecDeque::new()),
        })
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    /// Listener registration for this reader.
    pub fn fanout(&self) -> &Arc<EventFanout<M>> {
        &self.fanout
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.transport.local_addr()
    }

    /// Identity of the current socket; changes on every reconnect.
    pub fn generation(&self) -> u64 {
        self.transport.generation()
    }

    pub fn is_running(&self) -> bool {
        lock(&self.running).is_some()
    }

    /// Datagrams received but not yet decoded.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Spawn the socket and worker threads.
    pub fn start(&self) -> Result<()> {
        let mut running = lock(&self.running);
        if running.is_some() {
            return Err(StreamError::AlreadyStarted);
        }
        let mut worker = lock(&self.parked)
            .take()
            .unwrap_or_else(|| Worker::new(&self.config));
        let stop = Arc::new(AtomicBool::new(false));

        let socket = {
            let transport = Arc::clone(&self.transport);
            let queue = Arc::clone(&self.queue);
            let fanout = Arc::clone(&self.fanout);
            let stop = Arc::clone(&stop);
            let threads = Arc::clone(&self.threads);
            thread::Builder::new()
                .name("vita49-socket".to_string())
                .spawn(move || {
                    register(&threads);
                    socket_loop(&transport, &queue, &fanout, &stop)
                })
                .map_err(StreamError::Spawn)?
        };

        let spawned = {
            let queue = Arc::clone(&self.queue);
            let fanout = Arc::clone(&self.fanout);
            let stop = Arc::clone(&stop);
            let poll_interval = self.config.poll_interval;
            let threads = Arc::clone(&self.threads);
            thread::Builder::new()
                .name("vita49-worker".to_string())
                .spawn(move || {
                    register(&threads);
                    worker.run(&queue, &fanout, &stop, poll_interval);
                    worker
                })
        };
        let worker = match spawned {
            Ok(handle) => handle,
            Err(err) => {
                stop.store(true, Ordering::Release);
                let _ = socket.join();
                lock(&self.threads).clear();
                return Err(StreamError::Spawn(err));
            }
        };

        *running = Some(Running {
            stop,
            socket,
            worker,
        });
        debug!(mode = M::NAME, "reader threads started");
        Ok(())
    }

    /// Stop both threads and wait for them to exit. Queued datagrams stay
    /// queued for the next start.
    ///
    /// Fails with [`StreamError::StopFromReaderThread`] when called from a
    /// listener running on one of the reader's threads.
    pub fn stop(&self) -> Result<()> {
        if self.on_reader_thread() {
            return Err(StreamError::StopFromReaderThread);
        }
        let Some(running) = lock(&self.running).take() else {
            return Ok(());
        };
        running.stop.store(true, Ordering::Release);
        if running.socket.join().is_err() {
            warn!("socket thread panicked");
        }
        match running.worker.join() {
            Ok(worker) => *lock(&self.parked) = Some(worker),
            Err(_) => warn!("worker thread panicked, stream state reset"),
        }
        lock(&self.threads).clear();
        debug!("reader threads stopped");
        Ok(())
    }

    /// Stop, then release the socket and drop undelivered datagrams.
    pub fn close(self) -> Result<()> {
        self.stop()?;
        let dropped = self.queue.clear();
        info!(dropped, "reader closed");
        Ok(())
    }

    /// Close and reopen the socket, keeping every other piece of state.
    pub fn reconnect(&self) -> Result<()> {
        self.transport.reconnect()?;
        Ok(())
    }

    /// Receive the next packet on the calling thread, without dispatch.
    ///
    /// Only allowed while the reader threads are stopped. The deadline is
    /// checked between socket timeouts, so the wait may exceed `timeout` by
    /// up to one read timeout.
    pub fn receive_packet(&self, timeout: Duration) -> Result<Packet> {
        if self.is_running() {
            return Err(StreamError::Running);
        }
        let deadline = Instant::now() + timeout;
        let mut buf = vec![0u8; self.config.transport.max_datagram_size];
        loop {
            if let Some(packet) = lock(&self.pending).pop_front() {
                return Ok(packet);
            }
            if Instant::now() >= deadline {
                return Err(StreamError::Timeout(timeout));
            }
            if let Received::Datagram { len, .. } = self.transport.receive(&mut buf)? {
                let packets = Datagram::decode(&buf[..len])?
                    .into_packets()
                    .collect::<vita49_frame::Result<Vec<_>>>()?;
                lock(&self.pending).extend(packets);
            }
        }
    }

    fn on_reader_thread(&self) -> bool {
        lock(&self.threads).contains(&thread::current().id())
    }
}

impl<M: DispatchMode> Drop for VrtReader<M> {
    fn drop(&mut self) {
        if self.on_reader_thread() {
            // Last handle dropped by a listener: signal and detach.
            if let Some(running) = lock(&self.running).take() {
                running.stop.store(true, Ordering::Release);
            }
            return;
        }
        let _ = self.stop();
    }
}

fn socket_loop<M>(
    transport: &DatagramTransport,
    queue: &IngestQueue,
    fanout: &EventFanout<M>,
    stop: &AtomicBool,
) {
    transport.receive_loop(
        stop,
        |datagram| {
            if let Err(full) = queue.push(datagram) {
                let err = StreamError::QueueFull {
                    discarded: full.discarded,
                };
                fanout.fire_diagnostic(&Diagnostic::warning(err.to_string()));
            }
        },
        |err| {
            fanout.fire_diagnostic(&Diagnostic::error(err.to_string()));
        },
    );
}

/// State owned by the worker thread.
struct Worker<M: DispatchMode> {
    state: M::State,
    frames: SequenceTracker,
    packets: SequenceTracker,
}

impl<M: DispatchMode> Worker<M> {
    fn new(config: &ReaderConfig) -> Self {
        Self {
            state: M::new_state(config),
            frames: SequenceTracker::frames(),
            packets: SequenceTracker::packets(),
        }
    }

    fn run(
        &mut self,
        queue: &IngestQueue,
        fanout: &EventFanout<M>,
        stop: &AtomicBool,
        poll_interval: Duration,
    ) {
        while !stop.load(Ordering::Acquire) {
            match queue.pop() {
                Some(datagram) => self.process(&datagram, fanout),
                None => {
                    M::idle(&mut self.state, fanout, Instant::now());
                    thread::sleep(poll_interval);
                }
            }
        }
    }

    fn process(&mut self, datagram: &[u8], fanout: &EventFanout<M>) {
        let now = Instant::now();
        M::on_datagram(&mut self.state, now);

        let datagram = match Datagram::decode(datagram) {
            Ok(datagram) => datagram,
            Err(err) => {
                let what = if err.is_corrupt() {
                    "corrupt frame"
                } else {
                    "invalid datagram"
                };
                debug!(error = %err, "{what}");
                fanout.fire_diagnostic(&Diagnostic::error(format!("{what}: {err}")));
                M::idle(&mut self.state, fanout, now);
                return;
            }
        };

        if let Some(count) = datagram.frame_count() {
            if let Some(gap) = self.frames.observe(FRAME_KEY, count) {
                warn!(%gap, "frame counter gap");
                fanout.fire_diagnostic(&Diagnostic::warning(format!("frame counter gap: {gap}")));
            }
        }

        for packet in datagram.into_packets() {
            let packet = match packet {
                Ok(packet) => packet,
                Err(err) => {
                    fanout.fire_diagnostic(&Diagnostic::error(format!("invalid packet: {err}")));
                    M::idle(&mut self.state, fanout, now);
                    break;
                }
            };
            let counter = u16::from(packet.packet_count);
            if let Some(gap) = self.packets.observe(packet.stream_code(), counter) {
                warn!(stream_id = packet.stream_id, %gap, "packet counter gap");
                fanout.fire_diagnostic(
                    &Diagnostic::warning(format!("packet counter gap: {gap}")).for_packet(&packet),
                );
            }
            trace!(
                stream_id = packet.stream_id,
                kind = packet.packet_type.name(),
                len = packet.wire_len(),
                "dispatching packet"
            );
            M::dispatch(&mut self.state, fanout, packet, now);
        }
    }
}

fn register(threads: &Mutex<Vec<ThreadId>>) {
    lock(threads).push(thread::current().id());
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use vita49_transport::TransportConfig;

    use super::*;

    fn config() -> ReaderConfig {
        ReaderConfig {
            transport: TransportConfig {
                read_timeout: Duration::from_millis(20),
                buffer_size: 256 * 1024,
                ..TransportConfig::new("127.0.0.1", 0)
            },
            ..ReaderConfig::default()
        }
    }

    #[test]
    fn start_twice_fails() {
        let reader = LegacyReader::open(config()).unwrap();
        reader.start().unwrap();
        assert!(matches!(reader.start(), Err(StreamError::AlreadyStarted)));
        reader.stop().unwrap();
        assert!(!reader.is_running());
    }

    #[test]
    fn stop_when_idle_is_noop() {
        let reader = ContextReader::open(config()).unwrap();
        reader.stop().unwrap();
        reader.stop().unwrap();
    }

    #[test]
    fn receive_packet_requires_stopped_reader() {
        let reader = LegacyReader::open(config()).unwrap();
        reader.start().unwrap();
        assert!(matches!(
            reader.receive_packet(Duration::from_millis(10)),
            Err(StreamError::Running)
        ));
        reader.stop().unwrap();
        assert!(matches!(
            reader.receive_packet(Duration::from_millis(30)),
            Err(StreamError::Timeout(_))
        ));
    }

    #[test]
    fn undecodable_datagrams_do_not_hold_discovery_open() {
        let config = config().with_discovery_timeout(Duration::from_millis(10));
        let fanout = EventFanout::<ContextAware>::new();
        let initial = Arc::new(Mutex::new(None));
        {
            let initial = Arc::clone(&initial);
            fanout.on_initial_context(None, move |ctx| {
                *initial.lock().unwrap() = Some(ctx.error.clone());
            });
        }

        let mut worker = Worker::<ContextAware>::new(&config);
        worker.process(&Packet::data(Some(7), vec![0u8; 4]).to_bytes().unwrap(), &fanout);
        thread::sleep(Duration::from_millis(20));
        worker.process(&[0xF0, 0, 0, 1], &fanout);

        assert!(fanout.initial_context_fired());
        assert_eq!(
            *initial.lock().unwrap(),
            Some(Some(crate::DiscoveryError::NoContextStream { stream_id: 7 }))
        );
    }

    #[test]
    fn restart_after_stop() {
        let reader = ContextReader::open(config()).unwrap();
        reader.start().unwrap();
        reader.stop().unwrap();
        reader.start().unwrap();
        assert!(reader.is_running());
        reader.close().unwrap();
    }
}
