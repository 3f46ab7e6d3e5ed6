//! VITA-49 radio transport for Rust.
//!
//! # Crate Structure
//!
//! - [`frame`]: VRT packet and VRL frame codec, context and data packet views
//! - [`transport`]: UDP/multicast sockets with in-place reconnect
//! - [`stream`]: threaded reader with initial-context discovery, and writer

/// Re-export codec types.
pub mod frame {
    pub use vita49_frame::*;
}

/// Re-export transport types.
pub mod transport {
    pub use vita49_transport::*;
}

/// Re-export stream types.
pub mod stream {
    pub use vita49_stream::*;
}
