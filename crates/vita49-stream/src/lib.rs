//! Threaded VITA-49 stream reader and writer.
//!
//! A [`VrtReader`] moves datagrams from a socket thread through a bounded
//! [`IngestQueue`] to a worker thread that decodes them, reports counter
//! gaps and dispatches packets through an [`EventFanout`]. In
//! [`ContextAware`] mode the worker first runs initial-context discovery
//! ([`ContextSynchronizer`]) and reports its outcome exactly once.
//!
//! [`VrtWriter`] is the sending side: counter assignment, optional VRL
//! framing and background "sent" notification.

pub mod config;
pub mod discovery;
pub mod error;
pub mod fanout;
pub mod mode;
pub mod queue;
pub mod reader;
pub mod sequence;
pub mod writer;

pub use config::{ReaderConfig, WriterConfig, DEFAULT_MAX_FRAME_BYTES, DEFAULT_POLL_INTERVAL};
pub use discovery::{
    ContextSynchronizer, DiscoveryError, DiscoveryState, Disposition, InitialContext,
    DEFAULT_DISCOVERY_TIMEOUT,
};
pub use error::{Result, StreamError};
pub use fanout::{
    ContextAware, Diagnostic, EventFanout, Legacy, Outbound, Severity, SubscriptionId,
};
pub use mode::{ContextAwareState, DispatchMode};
pub use queue::{IngestQueue, QueueFull, DEFAULT_MAX_BYTES, DEFAULT_MAX_ITEMS};
pub use reader::{ContextReader, LegacyReader, VrtReader};
pub use sequence::{GapReport, SequenceTracker, FRAME_COUNT_MODULUS, PACKET_COUNT_MODULUS};
pub use writer::VrtWriter;
