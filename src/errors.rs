use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Prefix, suffix and directory mixed text and raw-byte components.
    #[error("can't mix bytes and non-bytes path components")]
    DomainMismatch,
    /// Every generated candidate name already existed.
    #[error("no usable temporary name found after {attempts} attempts")]
    ExhaustedAttempts { attempts: u32 },
    /// A raw-byte component cannot be represented as a path on this platform.
    #[error("path component is not representable on this platform")]
    InvalidComponent,
    /// The open mode string was malformed.
    #[error("invalid mode: {0:?}")]
    InvalidMode(String),
    /// The requested text encoding is not supported.
    #[error("unknown encoding: {0}")]
    UnknownEncoding(String),
    /// An encoding was requested for a binary stream.
    #[error("binary mode doesn't take an encoding argument")]
    BinaryEncoding,
    /// Text streams must be buffered.
    #[error("can't have unbuffered text I/O")]
    UnbufferedText,
    /// The handle was already closed.
    #[error("I/O operation on closed file")]
    Closed,
    /// An I/O error occurred.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    /// Returns the OS error code if this error originated from the operating system.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Self::Io(e) => e.raw_os_error(),
            _ => None,
        }
    }

    /// Classifies the error the way [`std::io::Error::kind`] does.
    pub fn kind(&self) -> io::ErrorKind {
        match self {
            Self::Io(e) => e.kind(),
            Self::ExhaustedAttempts { .. } => io::ErrorKind::AlreadyExists,
            Self::Closed => io::ErrorKind::Other,
            _ => io::ErrorKind::InvalidInput,
        }
    }
}

impl From<Error> for io::Error {
    fn from(e: Error) -> Self {
        match e {
            Error::Io(e) => e,
            other => io::Error::new(other.kind(), other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_keep_their_os_code() {
        let err = Error::from(io::Error::from_raw_os_error(2));
        assert_eq!(err.raw_os_error(), Some(2));
        let back: io::Error = err.into();
        assert_eq!(back.raw_os_error(), Some(2));
    }

    #[test]
    fn exhausted_attempts_reads_as_already_exists() {
        let err = Error::ExhaustedAttempts { attempts: 3 };
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert!(err.to_string().contains("3 attempts"));
    }
}
