use std::time::Duration;

/// Errors that can occur in stream reader/writer operations.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// Packet or frame codec error.
    #[error("codec error: {0}")]
    Codec(#[from] vita49_frame::CodecError),

    /// Socket-level error.
    #[error("transport error: {0}")]
    Transport(#[from] vita49_transport::TransportError),

    /// The ingest queue overflowed and was emptied.
    #[error("queue full ({discarded} datagrams discarded)")]
    QueueFull { discarded: usize },

    /// `stop` or `close` was called from one of the reader's own threads.
    #[error("reader cannot be stopped from its own thread")]
    StopFromReaderThread,

    /// The reader threads are already running.
    #[error("reader already started")]
    AlreadyStarted,

    /// The operation needs the reader threads to be stopped.
    #[error("reader is running")]
    Running,

    /// A reader or notifier thread could not be spawned.
    #[error("failed to spawn thread: {0}")]
    Spawn(std::io::Error),

    /// Waiting for an event timed out.
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

pub type Result<T> = std::result::Result<T, StreamError>;
