//! Initial-context discovery.
//!
//! After the first datagram arrives, every packet is inspected until the
//! primary data stream and all context it depends on have been collected,
//! or the discovery timeout elapses. The result is reported once as an
//! [`InitialContext`]; afterwards packets pass straight through.

use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};

use tracing::{debug, info};
use vita49_frame::{CodecError, ContextPacket, DataPacket, Packet};

/// Default time allowed for discovery.
pub const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(60);

/// Why discovery concluded without a complete initial context.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DiscoveryError {
    /// No data packet was received before the timeout.
    #[error("no data stream found")]
    NoDataStream,

    /// A data stream was found but its context never arrived.
    #[error("could not find context for stream {stream_id}")]
    NoContextStream { stream_id: u32 },

    /// The primary context arrived but some linked context did not.
    #[error("required context not found (missing streams {missing:?})")]
    RequiredContextMissing { missing: Vec<u32> },

    /// Every required context was found alongside unrelated ones.
    #[error("context packets do not follow stream ID rules (collected {collected}, required {required})")]
    StreamIdRules { collected: usize, required: usize },
}

/// The consolidated outcome of discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitialContext {
    pub error: Option<DiscoveryError>,
    /// First packet of the primary data stream.
    pub data: Option<DataPacket>,
    /// Context packet of the primary data stream.
    pub context: Option<ContextPacket>,
    /// Every context packet collected, by stream id.
    pub contexts: BTreeMap<u32, ContextPacket>,
}

impl InitialContext {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn stream_id(&self) -> Option<u32> {
        self.data.as_ref().and_then(|d| d.stream_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryState {
    AwaitingFirstDatagram,
    Discovering,
    Concluded,
}

/// What to do with an observed packet.
#[derive(Debug)]
pub enum Disposition {
    /// Consumed by discovery; reported later inside the initial context.
    Collected,
    /// Discovery just concluded.
    Concluded(InitialContext),
    /// Steady state; dispatch the packet normally.
    Deliver(Packet),
    /// A malformed context packet seen while discovering. It is not
    /// collected; the caller reports it.
    Rejected { packet: Packet, error: CodecError },
}

/// Discovery state machine.
///
/// Not thread-safe; owned by the reader's worker thread.
#[derive(Debug)]
pub struct ContextSynchronizer {
    timeout: Duration,
    state: DiscoveryState,
    started: Option<Instant>,
    data: Option<DataPacket>,
    contexts: BTreeMap<u32, ContextPacket>,
    required: BTreeSet<u32>,
}

impl ContextSynchronizer {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            state: DiscoveryState::AwaitingFirstDatagram,
            started: None,
            data: None,
            contexts: BTreeMap::new(),
            required: BTreeSet::new(),
        }
    }

    pub fn state(&self) -> DiscoveryState {
        self.state
    }

    pub fn is_concluded(&self) -> bool {
        self.state == DiscoveryState::Concluded
    }

    /// Start the discovery clock. Only the first call has an effect.
    pub fn start(&mut self, now: Instant) {
        if self.state == DiscoveryState::AwaitingFirstDatagram {
            debug!(timeout_ms = self.timeout.as_millis() as u64, "initial context discovery started");
            self.state = DiscoveryState::Discovering;
            self.started = Some(now);
        }
    }

    /// Return to the initial state, forgetting everything collected.
    pub fn reset(&mut self) {
        *self = Self::new(self.timeout);
    }

    /// Stream ids whose context is currently required.
    pub fn required(&self) -> &BTreeSet<u32> {
        &self.required
    }

    /// Feed one packet.
    pub fn observe(&mut self, packet: Packet, now: Instant) -> Disposition {
        match self.state {
            DiscoveryState::Concluded => return Disposition::Deliver(packet),
            DiscoveryState::AwaitingFirstDatagram => self.start(now),
            DiscoveryState::Discovering => {}
        }

        if packet.is_data() {
            if packet.stream_id.is_none() {
                // Unidentified streams never carry context.
                let data = DataPacket::new(packet).ok();
                self.data = data;
                return Disposition::Concluded(self.conclude(None));
            }
            if self.data.is_none() {
                self.data = DataPacket::new(packet).ok();
                self.update_required();
            }
        } else if let Some(stream_id) = packet.stream_id {
            match ContextPacket::new(packet.clone()) {
                Ok(ctx) => {
                    self.contexts.insert(stream_id, ctx);
                    self.update_required();
                }
                Err(error) => {
                    debug!(stream_id, %error, "malformed context packet during discovery");
                    return Disposition::Rejected { packet, error };
                }
            }
        }

        if let Some(result) = self.check_complete() {
            return Disposition::Concluded(self.conclude(result));
        }
        match self.poll(now) {
            Some(initial) => Disposition::Concluded(initial),
            None => Disposition::Collected,
        }
    }

    /// Conclude with a timeout outcome once the timeout has elapsed.
    pub fn poll(&mut self, now: Instant) -> Option<InitialContext> {
        if self.state != DiscoveryState::Discovering {
            return None;
        }
        let started = self.started?;
        if now.saturating_duration_since(started) < self.timeout {
            return None;
        }
        let error = match (&self.data, self.primary_context()) {
            (None, _) => DiscoveryError::NoDataStream,
            (Some(data), None) => DiscoveryError::NoContextStream {
                stream_id: data.stream_id.unwrap_or(0),
            },
            (Some(_), Some(_)) => DiscoveryError::RequiredContextMissing {
                missing: self
                    .required
                    .iter()
                    .filter(|id| !self.contexts.contains_key(id))
                    .copied()
                    .collect(),
            },
        };
        Some(self.conclude(Some(error)))
    }

    fn primary_stream(&self) -> Option<u32> {
        self.data.as_ref().and_then(|d| d.stream_id)
    }

    fn primary_context(&self) -> Option<&ContextPacket> {
        self.primary_stream().and_then(|id| self.contexts.get(&id))
    }

    /// Rebuild the required set from the primary context, following source
    /// and system association lists of every required context found.
    fn update_required(&mut self) {
        self.required.clear();
        let Some(primary) = self.primary_stream() else {
            return;
        };
        if !self.contexts.contains_key(&primary) {
            return;
        }
        self.required.insert(primary);
        let mut worklist = vec![primary];
        while let Some(id) = worklist.pop() {
            let Some(lists) = self.contexts.get(&id).and_then(ContextPacket::association_lists)
            else {
                continue;
            };
            for linked in lists.linked_stream_ids() {
                if self.required.insert(linked) {
                    worklist.push(linked);
                }
            }
        }
    }

    /// `Some(outcome)` once the primary context and every required context
    /// are present.
    fn check_complete(&self) -> Option<Option<DiscoveryError>> {
        self.primary_context()?;
        if !self.required.iter().all(|id| self.contexts.contains_key(id)) {
            return None;
        }
        if self.contexts.len() == self.required.len() {
            Some(None)
        } else {
            Some(Some(DiscoveryError::StreamIdRules {
                collected: self.contexts.len(),
                required: self.required.len(),
            }))
        }
    }

    fn conclude(&mut self, error: Option<DiscoveryError>) -> InitialContext {
        self.state = DiscoveryState::Concluded;
        let context = self.primary_context().cloned();
        let initial = InitialContext {
            error,
            data: self.data.take(),
            context,
            contexts: std::mem::take(&mut self.contexts),
        };
        self.required.clear();
        match &initial.error {
            None => info!(
                stream_id = initial.stream_id(),
                contexts = initial.contexts.len(),
                "initial context found"
            ),
            Some(err) => info!(error = %err, "initial context discovery failed"),
        }
        initial
    }
}

impl Default for ContextSynchronizer {
    fn default() -> Self {
        Self::new(DEFAULT_DISCOVERY_TIMEOUT)
    }
}

#[cfg(test)]
mod tests {
    use vita49_frame::ContextAssocLists;

    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn data(sid: Option<u32>) -> Packet {
        Packet::data(sid, vec![0u8; 4])
    }

    fn context(sid: u32, source: &[u32]) -> Packet {
        let mut ctx = ContextPacket::with_stream_id(sid);
        if !source.is_empty() {
            let lists = ContextAssocLists {
                source: source.to_vec(),
                ..Default::default()
            };
            ctx.set_association_lists(Some(&lists)).unwrap();
        }
        ctx.into_packet()
    }

    fn concluded(disposition: Disposition) -> InitialContext {
        match disposition {
            Disposition::Concluded(initial) => initial,
            other => panic!("expected conclusion, got {other:?}"),
        }
    }

    #[test]
    fn unidentified_data_concludes_without_context() {
        let mut sync = ContextSynchronizer::new(TIMEOUT);
        let now = Instant::now();
        let initial = concluded(sync.observe(data(None), now));
        assert_eq!(initial.error, None);
        assert!(initial.context.is_none());
        assert!(initial.contexts.is_empty());
        assert!(sync.is_concluded());

        // Steady state afterwards.
        assert!(matches!(
            sync.observe(data(None), now),
            Disposition::Deliver(_)
        ));
    }

    #[test]
    fn malformed_context_is_rejected_not_collected() {
        let mut sync = ContextSynchronizer::new(TIMEOUT);
        let now = Instant::now();
        sync.observe(data(Some(7)), now);

        // Bandwidth bit set with no field behind it.
        let mut bad = Packet::new(vita49_frame::PacketType::Context);
        bad.stream_id = Some(7);
        bad.payload = bytes::Bytes::from_static(&[0x20, 0, 0, 0]);
        match sync.observe(bad, now) {
            Disposition::Rejected { packet, .. } => assert_eq!(packet.stream_id, Some(7)),
            other => panic!("expected rejection, got {other:?}"),
        }
        assert_eq!(sync.state(), DiscoveryState::Discovering);

        let initial = concluded(sync.observe(context(7, &[]), now));
        assert_eq!(initial.error, None);
    }

    #[test]
    fn extension_context_can_be_primary() {
        let mut sync = ContextSynchronizer::new(TIMEOUT);
        let now = Instant::now();
        sync.observe(data(Some(7)), now);

        let mut ext = Packet::new(vita49_frame::PacketType::ExtContext);
        ext.stream_id = Some(7);
        ext.payload = bytes::Bytes::from_static(&[0, 0, 0, 1]);
        let initial = concluded(sync.observe(ext, now));
        assert_eq!(initial.error, None);
        assert!(initial.context.as_ref().is_some_and(|c| c.is_extension()));
    }

    #[test]
    fn data_then_matching_context() {
        let mut sync = ContextSynchronizer::new(TIMEOUT);
        let now = Instant::now();
        assert!(matches!(
            sync.observe(data(Some(7)), now),
            Disposition::Collected
        ));
        let initial = concluded(sync.observe(context(7, &[]), now));

        assert_eq!(initial.error, None);
        assert_eq!(initial.context.as_ref().and_then(|c| c.stream_id), Some(7));
        assert_eq!(initial.contexts.keys().copied().collect::<Vec<_>>(), vec![7]);
        assert_eq!(initial.stream_id(), Some(7));
    }

    #[test]
    fn missing_linked_context_times_out() {
        let mut sync = ContextSynchronizer::new(TIMEOUT);
        let start = Instant::now();
        sync.observe(data(Some(7)), start);
        assert!(matches!(
            sync.observe(context(7, &[9]), start),
            Disposition::Collected
        ));
        assert_eq!(sync.required().iter().copied().collect::<Vec<_>>(), vec![7, 9]);
        assert!(sync.poll(start + Duration::from_secs(1)).is_none());

        let initial = sync.poll(start + TIMEOUT).unwrap();
        assert_eq!(
            initial.error,
            Some(DiscoveryError::RequiredContextMissing { missing: vec![9] })
        );
        assert!(initial.error.as_ref().unwrap().to_string().starts_with("required context not found"));
        assert_eq!(initial.contexts.keys().copied().collect::<Vec<_>>(), vec![7]);
    }

    #[test]
    fn only_unrelated_context_is_no_data_stream() {
        let mut sync = ContextSynchronizer::new(TIMEOUT);
        let start = Instant::now();
        sync.observe(context(3, &[]), start);
        sync.observe(context(4, &[]), start);
        let initial = concluded(sync.observe(context(3, &[]), start + TIMEOUT));
        assert_eq!(initial.error, Some(DiscoveryError::NoDataStream));
        assert_eq!(initial.contexts.len(), 2);
    }

    #[test]
    fn data_without_context_names_stream() {
        let mut sync = ContextSynchronizer::new(TIMEOUT);
        let start = Instant::now();
        sync.observe(data(Some(12)), start);
        let initial = sync.poll(start + TIMEOUT).unwrap();
        assert_eq!(
            initial.error,
            Some(DiscoveryError::NoContextStream { stream_id: 12 })
        );
        assert_eq!(
            initial.error.unwrap().to_string(),
            "could not find context for stream 12"
        );
    }

    #[test]
    fn linked_chain_resolves_transitively() {
        let mut sync = ContextSynchronizer::new(TIMEOUT);
        let now = Instant::now();
        sync.observe(context(9, &[11]), now);
        sync.observe(data(Some(7)), now);
        assert!(matches!(
            sync.observe(context(7, &[9]), now),
            Disposition::Collected
        ));
        let initial = concluded(sync.observe(context(11, &[]), now));
        assert_eq!(initial.error, None);
        assert_eq!(
            initial.contexts.keys().copied().collect::<Vec<_>>(),
            vec![7, 9, 11]
        );
    }

    #[test]
    fn context_before_data_is_used() {
        let mut sync = ContextSynchronizer::new(TIMEOUT);
        let now = Instant::now();
        sync.observe(context(7, &[]), now);
        let initial = concluded(sync.observe(data(Some(7)), now));
        assert!(initial.is_success());
    }

    #[test]
    fn extra_context_violates_stream_id_rules() {
        let mut sync = ContextSynchronizer::new(TIMEOUT);
        let now = Instant::now();
        sync.observe(context(99, &[]), now);
        sync.observe(data(Some(7)), now);
        let initial = concluded(sync.observe(context(7, &[]), now));
        assert_eq!(
            initial.error,
            Some(DiscoveryError::StreamIdRules {
                collected: 2,
                required: 1
            })
        );
    }

    #[test]
    fn poll_before_start_is_idle() {
        let mut sync = ContextSynchronizer::new(Duration::ZERO);
        assert!(sync.poll(Instant::now()).is_none());
        assert_eq!(sync.state(), DiscoveryState::AwaitingFirstDatagram);
        sync.start(Instant::now());
        assert!(sync.poll(Instant::now()).is_some());
        assert!(sync.poll(Instant::now()).is_none());
    }

    #[test]
    fn reset_restarts_discovery() {
        let mut sync = ContextSynchronizer::new(TIMEOUT);
        concluded(sync.observe(data(None), Instant::now()));
        sync.reset();
        assert_eq!(sync.state(), DiscoveryState::AwaitingFirstDatagram);
    }
}
