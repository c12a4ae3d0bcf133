use std::io;

/// Error taxonomy for the lockstep core. Only `BindFailed` is fatal; everything else
/// is recovered locally and either logged, surfaced as an `EngineEvent`, or dropped.
#[derive(Debug, Eq, PartialEq)]
pub enum Error {
    /// Malformed wire bytes: wrong length, unknown kind, truncated payload.
    BadPacket,
    /// Datagram arrived from an address not in the roster.
    UnknownPeer,
    /// A parsed command failed validation (unit not owned by sender or a teammate).
    InvalidCommand,
    /// A peer's SYNC beacon did not match the local determinism snapshot for that cycle.
    DesyncDetected(u32),
    /// A peer has not been heard from within the configured timeout.
    PeerTimeout,
    /// The datagram endpoint could not bind to any of the attempted ports.
    BindFailed,
    /// The outbound queue is full and a submission was dropped.
    PoolExhausted,
    /// Any other I/O failure surfaced by the endpoint.
    Io(io::ErrorKind),
}

pub type Result<T> = ::std::result::Result<T, Error>;

impl From<io::Error> for Error {
    #[inline]
    fn from(io_error: io::Error) -> Self {
        Error::Io(io_error.kind())
    }
}

/// Distinguishes "nothing to do this tick" from an actual failure — `WouldBlock` is
/// the normal case for a non-blocking socket, not an error worth propagating.
pub trait ErrorUtils {
    fn has_failed(&self) -> bool;
}

impl<T> ErrorUtils for Result<T> {
    fn has_failed(&self) -> bool {
        match self {
            Ok(_) => false,
            Err(Error::Io(io::ErrorKind::WouldBlock)) => false,
            _ => true,
        }
    }
}
