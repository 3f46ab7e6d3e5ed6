//! Listener registration and event dispatch.
//!
//! The dispatch mode is a type parameter: an `EventFanout<Legacy>` only
//! offers generic "received" subscriptions, an `EventFanout<ContextAware>`
//! only offers data, context and initial-context subscriptions. Sent and
//! diagnostic events are common to both.

use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use vita49_frame::{ClassIdentifier, ContextPacket, DataPacket, Packet};

use crate::discovery::InitialContext;

/// Marker for readers that deliver every packet through one generic event.
#[derive(Debug, Clone, Copy, Default)]
pub struct Legacy;

/// Marker for readers that run initial-context discovery and deliver data
/// and context packets separately.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextAware;

/// Marker for writers: only sent and diagnostic events.
#[derive(Debug, Clone, Copy, Default)]
pub struct Outbound;

/// Handle returned by every `on_*` registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Warning => "warning",
            Self::Error => "error",
        })
    }
}

/// A warning or error raised while receiving or sending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    /// Stream of the offending packet, when known.
    pub stream_id: Option<u32>,
    pub class_id: Option<ClassIdentifier>,
}

impl Diagnostic {
    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Severity::Error, message)
    }

    fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            stream_id: None,
            class_id: None,
        }
    }

    /// Attach the identity of `packet`.
    pub fn for_packet(mut self, packet: &Packet) -> Self {
        self.stream_id = packet.stream_id;
        self.class_id = packet.class_id;
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.severity, self.message)?;
        if let Some(id) = self.stream_id {
            write!(f, " (stream {id:#010x})")?;
        }
        Ok(())
    }
}

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Subscriber<T: ?Sized> {
    id: SubscriptionId,
    filter: Option<ClassIdentifier>,
    callback: Callback<T>,
}

impl<T: ?Sized> Clone for Subscriber<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            filter: self.filter,
            callback: Arc::clone(&self.callback),
        }
    }
}

/// One event's subscriber list. The lock is held only to copy the list;
/// callbacks run without it so they may (un)subscribe.
struct Subscribers<T> {
    list: RwLock<Vec<Subscriber<T>>>,
}

impl<T> Subscribers<T> {
    fn new() -> Self {
        Self {
            list: RwLock::new(Vec::new()),
        }
    }

    fn add(&self, id: SubscriptionId, filter: Option<ClassIdentifier>, callback: Callback<T>) {
        let mut list = self.list.write().unwrap_or_else(|p| p.into_inner());
        list.push(Subscriber {
            id,
            filter,
            callback,
        });
    }

    fn remove(&self, id: SubscriptionId) -> bool {
        let mut list = self.list.write().unwrap_or_else(|p| p.into_inner());
        let before = list.len();
        list.retain(|s| s.id != id);
        list.len() != before
    }

    fn len(&self) -> usize {
        self.list.read().unwrap_or_else(|p| p.into_inner()).len()
    }

    /// Invoke matching subscribers in registration order.
    fn fire(&self, class_id: Option<ClassIdentifier>, event: &T) -> usize {
        self.fire_where(|s| s.filter.is_none() || s.filter == class_id, event)
    }

    /// Invoke every subscriber regardless of its filter.
    fn fire_all(&self, event: &T) -> usize {
        self.fire_where(|_| true, event)
    }

    fn fire_where(&self, keep: impl Fn(&Subscriber<T>) -> bool, event: &T) -> usize {
        let matching: Vec<Subscriber<T>> = {
            let list = self.list.read().unwrap_or_else(|p| p.into_inner());
            list.iter().filter(|&s| keep(s)).cloned().collect()
        };
        for subscriber in &matching {
            (subscriber.callback)(event);
        }
        matching.len()
    }
}

/// Event dispatch for one reader or writer.
pub struct EventFanout<M> {
    next_id: AtomicU64,
    sent: Subscribers<Packet>,
    diagnostics: Subscribers<Diagnostic>,
    received: Subscribers<Packet>,
    data: Subscribers<DataPacket>,
    context: Subscribers<ContextPacket>,
    initial_context: Subscribers<InitialContext>,
    initial_fired: AtomicBool,
    _mode: PhantomData<fn() -> M>,
}

impl<M> EventFanout<M> {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            sent: Subscribers::new(),
            diagnostics: Subscribers::new(),
            received: Subscribers::new(),
            data: Subscribers::new(),
            context: Subscribers::new(),
            initial_context: Subscribers::new(),
            initial_fired: AtomicBool::new(false),
            _mode: PhantomData,
        }
    }

    fn allocate(&self) -> SubscriptionId {
        SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Remove a subscription. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        // Ids are unique across lists, so at most one removal succeeds.
        self.sent.remove(id)
            || self.diagnostics.remove(id)
            || self.received.remove(id)
            || self.data.remove(id)
            || self.context.remove(id)
            || self.initial_context.remove(id)
    }

    /// Total registered subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.sent.len()
            + self.diagnostics.len()
            + self.received.len()
            + self.data.len()
            + self.context.len()
            + self.initial_context.len()
    }

    /// Subscribe to packets sent by a writer.
    pub fn on_sent<F>(&self, filter: Option<ClassIdentifier>, f: F) -> SubscriptionId
    where
        F: Fn(&Packet) + Send + Sync + 'static,
    {
        let id = self.allocate();
        self.sent.add(id, filter, Arc::new(f));
        id
    }

    /// Subscribe to warnings and errors. A filter matches the class
    /// identifier of the offending packet.
    pub fn on_diagnostic<F>(&self, filter: Option<ClassIdentifier>, f: F) -> SubscriptionId
    where
        F: Fn(&Diagnostic) + Send + Sync + 'static,
    {
        let id = self.allocate();
        self.diagnostics.add(id, filter, Arc::new(f));
        id
    }

    pub fn fire_sent(&self, packet: &Packet) -> usize {
        self.sent.fire(packet.class_id, packet)
    }

    pub fn fire_diagnostic(&self, diagnostic: &Diagnostic) -> usize {
        self.diagnostics.fire(diagnostic.class_id, diagnostic)
    }
}

impl<M> Default for EventFanout<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> fmt::Debug for EventFanout<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventFanout")
            .field("mode", &std::any::type_name::<M>())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl EventFanout<Legacy> {
    /// Subscribe to every received packet.
    pub fn on_received<F>(&self, filter: Option<ClassIdentifier>, f: F) -> SubscriptionId
    where
        F: Fn(&Packet) + Send + Sync + 'static,
    {
        let id = self.allocate();
        self.received.add(id, filter, Arc::new(f));
        id
    }

    pub fn fire_received(&self, packet: &Packet) -> usize {
        self.received.fire(packet.class_id, packet)
    }
}

impl EventFanout<ContextAware> {
    /// Subscribe to data packets delivered after discovery.
    pub fn on_data<F>(&self, filter: Option<ClassIdentifier>, f: F) -> SubscriptionId
    where
        F: Fn(&DataPacket) + Send + Sync + 'static,
    {
        let id = self.allocate();
        self.data.add(id, filter, Arc::new(f));
        id
    }

    /// Subscribe to context packets delivered after discovery.
    pub fn on_context<F>(&self, filter: Option<ClassIdentifier>, f: F) -> SubscriptionId
    where
        F: Fn(&ContextPacket) + Send + Sync + 'static,
    {
        let id = self.allocate();
        self.context.add(id, filter, Arc::new(f));
        id
    }

    /// Subscribe to the one-time discovery outcome. A filter matches the
    /// class identifier of the primary data packet; outcomes without one
    /// (no data stream, or data without a class identifier) reach every
    /// listener.
    pub fn on_initial_context<F>(&self, filter: Option<ClassIdentifier>, f: F) -> SubscriptionId
    where
        F: Fn(&InitialContext) + Send + Sync + 'static,
    {
        let id = self.allocate();
        self.initial_context.add(id, filter, Arc::new(f));
        id
    }

    pub fn fire_data(&self, packet: &DataPacket) -> usize {
        self.data.fire(packet.class_id, packet)
    }

    pub fn fire_context(&self, packet: &ContextPacket) -> usize {
        self.context.fire(packet.class_id, packet)
    }

    /// Deliver the discovery outcome.
    ///
    /// # Panics
    ///
    /// Panics if called more than once on the same fanout.
    pub fn fire_initial_context(&self, initial: &InitialContext) -> usize {
        assert!(
            !self.initial_fired.swap(true, Ordering::AcqRel),
            "initial context dispatched twice"
        );
        match initial.data.as_ref().and_then(|d| d.class_id) {
            Some(class_id) => self.initial_context.fire(Some(class_id), initial),
            None => self.initial_context.fire_all(initial),
        }
    }

    pub fn initial_context_fired(&self) -> bool {
        self.initial_fired.load(Ordering::Acquire)
    }
}
