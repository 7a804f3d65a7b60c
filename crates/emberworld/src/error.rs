//! Session error taxonomy.
//!
//! The first four variants are sentinels the receive loop translates into
//! protocol replies; everything else ends the connection.

use emberproto::ProtoError;

use crate::repository::RepoError;

#[derive(Debug)]
pub enum SessionError {
    /// The handler intentionally replied with nothing of substance.
    Noop,
    /// Malformed, phase-inadmissible, or unknown-target request; fatal.
    InvalidRequest,
    /// The protocol path exists but this server does not implement it.
    NotImplemented,
    /// The request would break a game rule.
    NotAllowed,
    /// The read deadline expired.
    Deadline,
    /// Another login for the same account closed this session.
    Kicked,
    Io(std::io::Error),
    Other(anyhow::Error),
}

pub type SessionResult<T> = Result<T, SessionError>;

impl SessionError {
    /// Errors expected in normal operation, logged at debug.
    pub fn benign(&self) -> bool {
        match self {
            SessionError::InvalidRequest | SessionError::Deadline | SessionError::Kicked => true,
            SessionError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::UnexpectedEof
                    | std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::Noop => write!(f, "no-op"),
            SessionError::InvalidRequest => write!(f, "invalid request"),
            SessionError::NotImplemented => write!(f, "not implemented"),
            SessionError::NotAllowed => write!(f, "not allowed"),
            SessionError::Deadline => write!(f, "read deadline exceeded"),
            SessionError::Kicked => write!(f, "kicked by concurrent login"),
            SessionError::Io(e) => write!(f, "io: {e}"),
            SessionError::Other(e) => write!(f, "{e:#}"),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<std::io::Error> for SessionError {
    fn from(e: std::io::Error) -> Self {
        SessionError::Io(e)
    }
}

impl From<anyhow::Error> for SessionError {
    fn from(e: anyhow::Error) -> Self {
        SessionError::Other(e)
    }
}

impl From<RepoError> for SessionError {
    fn from(e: RepoError) -> Self {
        SessionError::Other(anyhow::Error::new(e))
    }
}

impl From<ProtoError> for SessionError {
    fn from(e: ProtoError) -> Self {
        SessionError::Other(anyhow::Error::new(e))
    }
}
