use std::fmt;
use std::io;

use vita49_frame::CodecError;
use vita49_stream::StreamError;
use vita49_transport::TransportError;

// Exit codes shared by every subcommand.
pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::NotFound => USAGE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Bind { ref source, .. } | TransportError::Join { ref source, .. }
            if source.kind() == io::ErrorKind::PermissionDenied =>
        {
            CliError::new(PERMISSION_DENIED, format!("{context}: {err}"))
        }
        TransportError::InvalidConfig(_) | TransportError::Resolve { .. } => {
            CliError::new(USAGE, format!("{context}: {err}"))
        }
        TransportError::Io(source) => io_error(context, source),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn codec_error(context: &str, err: CodecError) -> CliError {
    match err {
        CodecError::Io(source) => io_error(context, source),
        CodecError::StreamClosed => CliError::new(FAILURE, format!("{context}: {err}")),
        other => CliError::new(DATA_INVALID, format!("{context}: {other}")),
    }
}

pub fn stream_error(context: &str, err: StreamError) -> CliError {
    match err {
        StreamError::Codec(err) => codec_error(context, err),
        StreamError::Transport(err) => transport_error(context, err),
        StreamError::Timeout(_) => CliError::new(TIMEOUT, format!("{context}: {err}")),
        StreamError::QueueFull { .. } => CliError::new(FAILURE, format!("{context}: {err}")),
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_errors_are_data_invalid() {
        let err = codec_error("decode", CodecError::UnknownPacketType(9));
        assert_eq!(err.code, DATA_INVALID);
        assert!(err.message.starts_with("decode: "));
    }

    #[test]
    fn stream_timeout_maps_to_timeout() {
        let err = stream_error(
            "receive",
            StreamError::Timeout(std::time::Duration::from_secs(1)),
        );
        assert_eq!(err.code, TIMEOUT);
    }

    #[test]
    fn nested_transport_error_maps_through_stream() {
        let err = stream_error(
            "open",
            StreamError::Transport(TransportError::InvalidConfig("zero timeout".into())),
        );
        assert_eq!(err.code, USAGE);
    }
}
