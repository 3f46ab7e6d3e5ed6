use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::{debug, trace, warn};

use crate::backoff::ExponentialBackoff;
use crate::config::{Role, TransportConfig};
use crate::error::{Result, TransportError};
use crate::socket::{DatagramSocket, Received};

/// How often a waiting reconnect caller checks for completion.
const RECONNECT_POLL: Duration = Duration::from_millis(5);

/// Slice used when sleeping between retries so stop requests stay responsive.
const SLEEP_SLICE: Duration = Duration::from_millis(20);

/// A UDP socket slot that can be reopened while a receive loop is running.
///
/// The current socket lives behind a mutex held only to clone or swap the
/// `Arc`; receive and send run on the clone without the lock. The slot is
/// only empty after a receiver without address reuse released its port and
/// failed to bind it again.
pub struct DatagramTransport {
    config: TransportConfig,
    role: Role,
    slot: Mutex<Option<Arc<DatagramSocket>>>,
    bound: Mutex<SocketAddr>,
    generation: AtomicU64,
    reconnect: ReconnectState,
}

#[derive(Default)]
struct ReconnectState {
    requested: AtomicBool,
    in_flight: AtomicBool,
    loop_thread: Mutex<Option<ThreadId>>,
    outcome: Mutex<Option<Result<()>>>,
}

impl DatagramTransport {
    /// Open the socket. Bind or join failures are returned here.
    pub fn open(config: TransportConfig, role: Role) -> Result<Self> {
        let socket = DatagramSocket::open(&config, role, 1)?;
        Ok(Self {
            config,
            role,
            bound: Mutex::new(socket.local_addr()),
            slot: Mutex::new(Some(Arc::new(socket))),
            generation: AtomicU64::new(1),
            reconnect: ReconnectState::default(),
        })
    }

    /// Open a receiving socket on `host:port`.
    pub fn receiver(config: TransportConfig) -> Result<Self> {
        Self::open(config, Role::Receive)
    }

    /// Open a sending socket towards `host:port`.
    pub fn sender(config: TransportConfig) -> Result<Self> {
        Self::open(config, Role::Send)
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// The socket currently in the slot.
    pub fn current(&self) -> Result<Arc<DatagramSocket>> {
        lock(&self.slot).clone().ok_or(TransportError::Closed)
    }

    /// Identity of the current socket; changes on every successful reopen.
    /// Zero while the slot is empty.
    pub fn generation(&self) -> u64 {
        self.current().map_or(0, |socket| socket.generation())
    }

    /// Address of the most recently bound socket.
    pub fn local_addr(&self) -> SocketAddr {
        *lock(&self.bound)
    }

    /// Receive one datagram into `buf` from the current socket.
    pub fn receive(&self, buf: &mut [u8]) -> Result<Received> {
        self.current()?.recv(buf)
    }

    pub fn send(&self, bytes: &[u8]) -> Result<usize> {
        self.current()?.send(bytes)
    }

    /// Close and reopen the socket.
    ///
    /// With a receive loop running, the request is handed to the loop
    /// thread and this call waits for its result. Without one, the socket is
    /// reopened on the calling thread. A second reconnect while one is
    /// pending fails with [`TransportError::ReconnectInProgress`].
    pub fn reconnect(&self) -> Result<()> {
        let current = thread::current().id();
        if *lock(&self.reconnect.loop_thread) == Some(current) {
            return Err(TransportError::ReconnectFromLoopThread);
        }
        if self
            .reconnect
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(TransportError::ReconnectInProgress);
        }

        let result = self.await_reconnect();
        self.reconnect.in_flight.store(false, Ordering::Release);
        result
    }

    fn await_reconnect(&self) -> Result<()> {
        *lock(&self.reconnect.outcome) = None;
        self.reconnect.requested.store(true, Ordering::Release);
        loop {
            if let Some(outcome) = lock(&self.reconnect.outcome).take() {
                return outcome;
            }
            if lock(&self.reconnect.loop_thread).is_none()
                && self.reconnect.requested.swap(false, Ordering::AcqRel)
            {
                // No loop to service the request.
                return self.reopen();
            }
            thread::sleep(RECONNECT_POLL);
        }
    }

    /// Service a pending reconnect request. Called by the receive loop
    /// between receives; returns true when a reopen was attempted.
    pub fn service_reconnect(&self) -> bool {
        if !self.reconnect.requested.swap(false, Ordering::AcqRel) {
            return false;
        }
        let outcome = self.reopen();
        *lock(&self.reconnect.outcome) = Some(outcome);
        true
    }

    /// Build the replacement socket and swap it into the slot. The old
    /// socket is closed once its last user drops it.
    ///
    /// A receiver whose port cannot be shared releases the old socket
    /// first, holding the slot lock across the rebind.
    fn reopen(&self) -> Result<()> {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let mut config = self.config.clone();
        if self.role == Role::Receive && config.port == 0 {
            // Keep the port picked by the first bind.
            config.port = self.local_addr().port();
        }
        let failed = |err| TransportError::ReconnectFailed(Box::new(err));

        if self.role == Role::Receive && !config.reuse_address {
            let mut slot = lock(&self.slot);
            let released = match slot.take() {
                Some(old) if Arc::strong_count(&old) > 1 => {
                    // Still in use elsewhere, so the port stays bound.
                    *slot = Some(old);
                    None
                }
                Some(old) => Some(old.generation()),
                None => None,
            };
            let socket = DatagramSocket::open(&config, self.role, generation).map_err(|err| {
                if released.is_some() {
                    warn!(error = %err, "released socket could not be rebound");
                }
                failed(err)
            })?;
            *lock(&self.bound) = socket.local_addr();
            *slot = Some(Arc::new(socket));
            debug!(old = ?released, new = generation, "socket reopened");
            return Ok(());
        }

        let socket = DatagramSocket::open(&config, self.role, generation).map_err(failed)?;
        *lock(&self.bound) = socket.local_addr();
        let old = lock(&self.slot).replace(Arc::new(socket));
        debug!(
            old = ?old.map(|socket| socket.generation()),
            new = generation,
            "socket reopened"
        );
        Ok(())
    }

    /// Mark the calling thread as the receive loop for the guard's lifetime.
    pub fn enter_loop(&self) -> LoopGuard<'_> {
        *lock(&self.reconnect.loop_thread) = Some(thread::current().id());
        LoopGuard { transport: self }
    }

    /// Receive until `stop` is set, handing each datagram to `on_datagram`.
    ///
    /// Timeouts are retried silently. Transient errors go to `on_error` and
    /// are retried after an exponential backoff that resets on the next
    /// successful receive. Pending reconnect requests are serviced between
    /// receives.
    pub fn receive_loop<D, E>(&self, stop: &AtomicBool, mut on_datagram: D, mut on_error: E)
    where
        D: FnMut(Bytes),
        E: FnMut(TransportError),
    {
        let _guard = self.enter_loop();
        let mut buf = vec![0u8; self.config.max_datagram_size];
        let mut backoff = ExponentialBackoff::default();

        while !stop.load(Ordering::Acquire) {
            self.service_reconnect();
            match self.receive(&mut buf) {
                Ok(Received::Datagram { len, from }) => {
                    backoff.reset();
                    trace!(len, %from, "datagram received");
                    on_datagram(Bytes::copy_from_slice(&buf[..len]));
                }
                Ok(Received::Timeout) => {}
                Err(err) => {
                    let delay = backoff.next_delay();
                    warn!(error = %err, delay_ms = delay.as_millis() as u64, "receive failed");
                    on_error(err);
                    self.pause(delay, stop);
                }
            }
        }
        debug!("receive loop stopped");
    }

    fn pause(&self, delay: Duration, stop: &AtomicBool) {
        let deadline = Instant::now() + delay;
        loop {
            let now = Instant::now();
            if now >= deadline
                || stop.load(Ordering::Acquire)
                || self.reconnect.requested.load(Ordering::Acquire)
            {
                return;
            }
            thread::sleep(SLEEP_SLICE.min(deadline - now));
        }
    }
}

/// Clears the loop-thread registration on drop.
pub struct LoopGuard<'a> {
    transport: &'a DatagramTransport,
}

impl Drop for LoopGuard<'_> {
    fn drop(&mut self) {
        *lock(&self.transport.reconnect.loop_thread) = None;
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
