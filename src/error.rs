//! Error types for the SMB1 client and the discovery engine.
//!
//! Everything surfaces to the caller; the crate never retries on its own.
//! A Network or Protocol error on an established client closes it, and
//! later calls fail with `State`.

use std::fmt;
use std::net::Ipv4Addr;

use crate::smb1::status::NtStatus;

pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type.
#[derive(Debug)]
pub enum Error {
    /// TCP/UDP failure on a socket owned by the crate.
    Network(NetworkError),
    /// Malformed frame, unexpected command, MID mismatch, bad signature.
    Protocol(String),
    /// Well-formed error response from the server.
    SmbStatus { command: u8, status: NtStatus },
    /// Operation called in the wrong lifecycle state.
    State { expected: &'static str, actual: &'static str },
    /// Discovery could not produce an (ip, name) pair.
    Discovery(DiscoveryError),
    /// Invalid argument from the caller (bad path, empty name).
    Argument(String),
}

/// Subkinds of socket failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkError {
    Unreachable,
    Timeout,
    Reset,
    Closed,
}

/// How discovery failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryError {
    /// No ProbeMatch arrived within the multicast budget.
    NoResponders,
    /// Responders were found but none served metadata.
    MetadataUnreachable,
    /// Metadata was served but contained no usable NetBIOS name.
    NameUnresolvable,
    /// Partial result; an external shell should prompt the user.
    NeedsUserInput { ip: Option<Ipv4Addr> },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network(e) => write!(f, "network error: {:?}", e),
            Self::Protocol(msg) => write!(f, "protocol error: {}", msg),
            Self::SmbStatus { command, status } => {
                write!(f, "server returned {} for command 0x{:02X}", status, command)
            }
            Self::State { expected, actual } => {
                write!(f, "connection is {}, operation requires {}", actual, expected)
            }
            Self::Discovery(e) => write!(f, "discovery failed: {:?}", e),
            Self::Argument(msg) => write!(f, "invalid argument: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Network(io_to_network(&e))
    }
}

/// Map an `std::io::Error` to the closest network subkind.
pub fn io_to_network(e: &std::io::Error) -> NetworkError {
    use std::io::ErrorKind;
    match e.kind() {
        ErrorKind::ConnectionRefused | ErrorKind::AddrNotAvailable => NetworkError::Unreachable,
        ErrorKind::TimedOut | ErrorKind::WouldBlock => NetworkError::Timeout,
        ErrorKind::ConnectionReset
        | ErrorKind::ConnectionAborted
        | ErrorKind::BrokenPipe => NetworkError::Reset,
        ErrorKind::UnexpectedEof | ErrorKind::NotConnected => NetworkError::Closed,
        _ => NetworkError::Closed,
    }
}

impl Error {
    /// Shorthand for an SMB status error on `command`.
    pub fn smb(command: u8, status: NtStatus) -> Self {
        Error::SmbStatus { command, status }
    }

    /// True if this error means the connection is no longer usable.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Network(_) | Error::Protocol(_))
    }
}
