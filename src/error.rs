use std::fmt;

use crate::store::StoreError;

/// Failure of a call that crosses an external boundary.
#[derive(Debug)]
pub enum Error {
    /// The named service has no credentials; nothing was attempted.
    Unconfigured(&'static str),
    /// The provider call failed (network, auth, bad response).
    Transport(String),
    /// The outbox entry has used all of its attempts.
    Exhausted { attempts: u32 },
    Storage(StoreError),
}

impl Error {
    pub fn is_unconfigured(&self) -> bool {
        matches!(self, Error::Unconfigured(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Unconfigured(service) => write!(f, "{service} not configured"),
            Error::Transport(e) => write!(f, "{e}"),
            Error::Exhausted { attempts } => write!(f, "max attempts reached ({attempts})"),
            Error::Storage(e) => write!(f, "storage error: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Storage(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreError> for Error {
    fn from(e: StoreError) -> Self {
        Error::Storage(e)
    }
}
