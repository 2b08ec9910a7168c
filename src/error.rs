//! Error type shared by the store, the file readers and the request workers.

use std::collections::TryReserveError;
use std::io::Error as IoError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    /// Transient I/O failure while reading a file-backed track.
    Io(IoError),
    /// Failure reported by htslib (BAM/FASTA access).
    Htslib(rust_htslib::errors::Error),
    /// Failure reported by the interval store.
    Store(String),
    UnknownTrack(u32),
    /// Interval bounds violate `from <= to` or the preload nesting.
    InvalidInterval { from: i64, to: i64 },
    InvalidCigar(String),
    /// A request needed more memory than could be reserved.
    ResourceExhausted(String),
    Serialization(String),
    MismatchedLengths { left: usize, right: usize },
    /// An analysis cannot be started in its current state.
    Analysis(String),
}

impl Error {
    /// Resource exhaustion ends a sweep; everything else only costs one request.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Error::ResourceExhausted(_))
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(e) => write!(f, "IO error: {}", e),
            Error::Htslib(e) => write!(f, "htslib error: {}", e),
            Error::Store(msg) => write!(f, "Store error: {}", msg),
            Error::UnknownTrack(id) => write!(f, "Unknown track id {}", id),
            Error::InvalidInterval { from, to } => {
                write!(f, "Invalid interval {}-{}", from, to)
            }
            Error::InvalidCigar(cigar) => write!(f, "Invalid CIGAR string '{}'", cigar),
            Error::ResourceExhausted(msg) => write!(f, "Out of memory: {}", msg),
            Error::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            Error::MismatchedLengths { left, right } => {
                write!(f, "Array lengths differ ({} vs {})", left, right)
            }
            Error::Analysis(msg) => write!(f, "Analysis error: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Htslib(e) => Some(e),
            _ => None,
        }
    }
}

impl From<IoError> for Error {
    fn from(e: IoError) -> Self {
        Error::Io(e)
    }
}

impl From<rust_htslib::errors::Error> for Error {
    fn from(e: rust_htslib::errors::Error) -> Self {
        Error::Htslib(e)
    }
}

impl From<bincode::error::EncodeError> for Error {
    fn from(e: bincode::error::EncodeError) -> Self {
        Error::Serialization(format!("{e:?}"))
    }
}

impl From<bincode::error::DecodeError> for Error {
    fn from(e: bincode::error::DecodeError) -> Self {
        Error::Serialization(format!("{e:?}"))
    }
}

impl From<TryReserveError> for Error {
    fn from(e: TryReserveError) -> Self {
        Error::ResourceExhausted(e.to_string())
    }
}

impl From<Error> for IoError {
    fn from(e: Error) -> Self {
        match e {
            Error::Io(e) => e,
            other => IoError::other(other.to_string()),
        }
    }
}

/// Allocate a zeroed vector, reporting allocation failure instead of aborting.
pub(crate) fn try_zeroed(len: usize) -> Result<Vec<u32>> {
    let mut values = Vec::new();
    values.try_reserve_exact(len)?;
    values.resize(len, 0);
    Ok(values)
}
