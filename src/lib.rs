//! # scoped-tempfile
//!
//! Temporary files and directories with collision-resistant names and
//! guaranteed cleanup.
//!
//! * [`NamedTempFile`] - a file with a visible name, removed when closed or dropped.
//! * [`TempFile`] - a file with no name in the file system at all.
//! * [`TempDir`] - a directory tree, removed by [`TempDir::cleanup`], by
//!   [`TempDir::scoped`], or (with a warning) when dropped.
//!
//! Names are `prefix + 8 random characters from [a-z0-9_-] + suffix`, created
//! exclusively, and retried on collision. Prefix, suffix and directory are
//! given either all as text or all as raw bytes; see [`Domain`].
//!
//! ```
//! use scoped_tempfile::{Builder, TempDir};
//! use std::io::{Read, Seek, Write};
//!
//! # fn main() -> Result<(), scoped_tempfile::Error> {
//! let dir = TempDir::new()?;
//! dir.scoped(|root| -> Result<(), scoped_tempfile::Error> {
//!     let mut file = Builder::new().dir(root).suffix(".log").named_tempfile()?;
//!     file.write_all(b"hello")?;
//!     file.rewind()?;
//!
//!     let mut contents = String::new();
//!     file.read_to_string(&mut contents)?;
//!     assert_eq!(contents, "hello");
//!     Ok(())
//! })??;
//! assert!(!dir.path().exists());
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! * `tokio` - Adds `close_async` / `cleanup_async`, which run the blocking
//!   teardown on tokio's blocking thread pool.
//! * `async-trait` - Adds the [`AsyncClose`] trait over all three types.

// Document crate features on docs.rs.
#![cfg_attr(docsrs, feature(doc_cfg))]

mod builder;
mod closer;
mod create;
mod domain;
mod errors;
mod random_name;
mod stream;
mod tempdir;
mod tempfile;

pub use builder::Builder;
pub use closer::LEAK_TARGET;
pub use create::{temp_dir, DEFAULT_PREFIX, TMP_MAX};
pub use domain::{infer_domain, Component, Domain, TempName};
pub use errors::Error;
pub use stream::{
    Buffering, ByteLines, Encoding, Lines, Newline, OpenMode, Stream, DEFAULT_BUFFER_SIZE,
};
pub use tempdir::TempDir;
pub use tempfile::{AnonymousStrategy, NamedTempFile, TempFile};

#[cfg(feature = "async-trait")]
use async_trait::async_trait;

/// Creates a [`NamedTempFile`] in the default temporary directory.
pub fn named_tempfile() -> Result<NamedTempFile, Error> {
    NamedTempFile::new()
}

/// Creates an anonymous [`TempFile`] in the default temporary directory.
pub fn tempfile() -> Result<TempFile, Error> {
    TempFile::new()
}

/// Creates a [`TempDir`] in the default temporary directory.
pub fn tempdir() -> Result<TempDir, Error> {
    TempDir::new()
}

/// Creates a directory in the default temporary directory and returns its
/// name. The caller is responsible for removing it.
pub fn make_temp_dir() -> Result<TempName, Error> {
    Builder::new().make_dir()
}

/// Tears a temporary entry down without blocking the async runtime.
#[cfg(feature = "async-trait")]
#[cfg_attr(docsrs, doc(cfg(feature = "async-trait")))]
#[async_trait]
pub trait AsyncClose: Sized + Send {
    async fn close(self) -> Result<(), Error>;
}

#[cfg(feature = "async-trait")]
#[cfg_attr(docsrs, doc(cfg(feature = "async-trait")))]
#[async_trait]
impl AsyncClose for NamedTempFile {
    async fn close(self) -> Result<(), Error> {
        self.close_async().await
    }
}

#[cfg(feature = "async-trait")]
#[cfg_attr(docsrs, doc(cfg(feature = "async-trait")))]
#[async_trait]
impl AsyncClose for TempFile {
    async fn close(self) -> Result<(), Error> {
        self.close_async().await
    }
}

#[cfg(feature = "async-trait")]
#[cfg_attr(docsrs, doc(cfg(feature = "async-trait")))]
#[async_trait]
impl AsyncClose for TempDir {
    async fn close(self) -> Result<(), Error> {
        self.cleanup_async().await
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::io::{self, Write};
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Buffer(Arc<Mutex<Vec<u8>>>);

    impl Write for Buffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Runs `f` and returns every warning it logged.
    pub fn capture_warnings<F: FnOnce()>(f: F) -> String {
        let buffer = Buffer::default();
        let writer = buffer.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::WARN)
            .finish();
        tracing::subscriber::with_default(subscriber, f);
        let bytes = buffer.0.lock().unwrap();
        String::from_utf8_lossy(&bytes).into_owned()
    }
}
