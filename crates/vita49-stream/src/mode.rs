//! How decoded packets reach listeners.

use std::collections::HashMap;
use std::time::Instant;

use tracing::debug;
use vita49_frame::{CodecError, ContextPacket, DataPacket, Packet, PayloadFormat};

use crate::config::ReaderConfig;
use crate::discovery::{ContextSynchronizer, Disposition, InitialContext};
use crate::fanout::{ContextAware, Diagnostic, EventFanout, Legacy};

/// Dispatch strategy chosen by a reader's type parameter.
///
/// `State` is owned by the worker thread and survives stop/start cycles.
pub trait DispatchMode: Sized + Send + Sync + 'static {
    type State: Send + 'static;

    const NAME: &'static str;

    fn new_state(config: &ReaderConfig) -> Self::State;

    /// Called once per received datagram, before its packets.
    fn on_datagram(_state: &mut Self::State, _now: Instant) {}

    fn dispatch(state: &mut Self::State, fanout: &EventFanout<Self>, packet: Packet, now: Instant);

    /// Called when the ingest queue is empty or a datagram could not be
    /// decoded.
    fn idle(_state: &mut Self::State, _fanout: &EventFanout<Self>, _now: Instant) {}
}

impl DispatchMode for Legacy {
    type State = ();

    const NAME: &'static str = "legacy";

    fn new_state(_config: &ReaderConfig) -> Self::State {}

    fn dispatch(_state: &mut (), fanout: &EventFanout<Self>, packet: Packet, _now: Instant) {
        fanout.fire_received(&packet);
    }
}

/// Discovery progress plus the payload formats learned from context.
#[derive(Debug)]
pub struct ContextAwareState {
    synchronizer: ContextSynchronizer,
    formats: HashMap<u32, PayloadFormat>,
}

impl ContextAwareState {
    pub fn synchronizer(&self) -> &ContextSynchronizer {
        &self.synchronizer
    }

    fn learn(&mut self, context: &ContextPacket) {
        let Some(stream_id) = context.stream_id else {
            return;
        };
        // Malformed formats are reported when the context is delivered.
        if let Ok(Some(format)) = context.payload_format() {
            self.formats.insert(stream_id, format);
        }
    }

    fn conclude(&mut self, fanout: &EventFanout<ContextAware>, mut initial: InitialContext) {
        for context in initial.contexts.values() {
            self.learn(context);
        }
        if let Some(data) = initial.data.take() {
            initial.data = Some(self.annotate(data));
        }
        fanout.fire_initial_context(&initial);
    }

    fn annotate(&self, mut data: DataPacket) -> DataPacket {
        if data.payload_format().is_none() {
            let format = data.stream_id.and_then(|id| self.formats.get(&id)).copied();
            data.set_payload_format(format);
        }
        data
    }

    fn deliver(&mut self, fanout: &EventFanout<ContextAware>, packet: Packet) {
        if packet.is_data() {
            match DataPacket::new(packet) {
                Ok(data) => {
                    fanout.fire_data(&self.annotate(data));
                }
                Err(err) => debug!(error = %err, "data packet rejected"),
            }
            return;
        }
        match ContextPacket::new(packet.clone()) {
            Ok(context) => {
                if let Err(err) = context.payload_format() {
                    fanout.fire_diagnostic(
                        &Diagnostic::error(format!("bad payload format: {err}")).for_packet(&packet),
                    );
                }
                self.learn(&context);
                fanout.fire_context(&context);
            }
            Err(err) => reject(fanout, &packet, &err),
        }
    }
}

fn reject(fanout: &EventFanout<ContextAware>, packet: &Packet, err: &CodecError) {
    fanout.fire_diagnostic(
        &Diagnostic::error(format!("malformed context packet: {err}")).for_packet(packet),
    );
}

impl DispatchMode for ContextAware {
    type State = ContextAwareState;

    const NAME: &'static str = "context-aware";

    fn new_state(config: &ReaderConfig) -> Self::State {
        ContextAwareState {
            synchronizer: ContextSynchronizer::new(config.discovery_timeout),
            formats: HashMap::new(),
        }
    }

    fn on_datagram(state: &mut Self::State, now: Instant) {
        state.synchronizer.start(now);
    }

    fn dispatch(state: &mut Self::State, fanout: &EventFanout<Self>, packet: Packet, now: Instant) {
        match state.synchronizer.observe(packet, now) {
            Disposition::Collected => {}
            Disposition::Concluded(initial) => state.conclude(fanout, initial),
            Disposition::Deliver(packet) => state.deliver(fanout, packet),
            Disposition::Rejected { packet, error } => {
                reject(fanout, &packet, &error);
                if let Some(initial) = state.synchronizer.poll(now) {
                    state.conclude(fanout, initial);
                }
            }
        }
    }

    fn idle(state: &mut Self::State, fanout: &EventFanout<Self>, now: Instant) {
        if let Some(initial) = state.synchronizer.poll(now) {
            state.conclude(fanout, initial);
        }
    }
}
