use std::fmt::{Debug, Formatter};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

/// Target of the leak diagnostic emitted by [`Finalizer`].
pub const LEAK_TARGET: &str = "scoped_tempfile::leak";

/// What releasing a temporary entry does to the filesystem.
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub(crate) enum Release {
    /// Unlink the file at the path.
    RemoveFile,
    /// Recursively remove the directory at the path, without following symlinks.
    RemoveTree,
    /// Leave the filesystem alone; either the entry is kept or the
    /// operating system removes it by itself.
    Keep,
}

/// Releases a temporary entry exactly once, however many times it is asked to.
///
/// Dropping the closer releases the entry if that has not happened yet.
pub(crate) struct Closer {
    path: Option<PathBuf>,
    release: Release,
    close_called: AtomicBool,
}

impl Closer {
    pub fn new(path: Option<PathBuf>, release: Release) -> Self {
        Self {
            path,
            release,
            close_called: AtomicBool::new(false),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.close_called.load(Ordering::Acquire)
    }

    /// Runs the release action unless an earlier call already did.
    ///
    /// Returns `Ok(true)` if this call performed the release.
    pub fn close(&self) -> io::Result<bool> {
        if self.close_called.swap(true, Ordering::AcqRel) {
            return Ok(false);
        }
        let Some(path) = self.path.as_deref() else {
            return Ok(true);
        };
        match self.release {
            Release::RemoveFile => std::fs::remove_file(path)?,
            Release::RemoveTree => std::fs::remove_dir_all(path)?,
            Release::Keep => {}
        }
        Ok(true)
    }
}

impl Drop for Closer {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(path = ?self.path, error = %e, "failed to remove temporary entry");
        }
    }
}

impl Debug for Closer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.path)
    }
}

/// A [`Closer`] that complains when it is dropped before being detached.
///
/// Dropping an attached finalizer still releases the entry, then emits a
/// warning on [`LEAK_TARGET`]. Owners call [`Finalizer::detach_and_release`]
/// on their explicit cleanup path.
pub(crate) struct Finalizer {
    closer: Closer,
    warn_message: String,
}

impl Finalizer {
    pub fn new(path: PathBuf, release: Release, warn_message: String) -> Self {
        Self {
            closer: Closer::new(Some(path), release),
            warn_message,
        }
    }

    pub fn is_alive(&self) -> bool {
        !self.closer.is_closed()
    }

    /// Cancels the finalizer and releases the entry in its place.
    ///
    /// Returns `Ok(false)` if it had already been detached.
    pub fn detach_and_release(&self) -> io::Result<bool> {
        self.closer.close()
    }

    /// Runs the finalizer as if its owner had become unreachable.
    fn fire(&self) {
        match self.closer.close() {
            Ok(false) => {}
            Ok(true) => tracing::warn!(target: LEAK_TARGET, "{}", self.warn_message),
            Err(e) => tracing::warn!(target: LEAK_TARGET, error = %e, "{}", self.warn_message),
        }
    }
}

impl Drop for Finalizer {
    fn drop(&mut self) {
        self.fire();
    }
}

impl Debug for Finalizer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.closer)
    }
}
