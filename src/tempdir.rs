use crate::closer::{Finalizer, Release};
use crate::create::create_exclusive_dir;
use crate::random_name::RandomNames;
use crate::{Builder, Component, Error, TempName};
use std::borrow::Borrow;
use std::fmt::{Debug, Formatter};
use std::ops::Deref;
use std::path::Path;

/// A named temporary directory that is removed, with everything in it,
/// when it is cleaned up or dropped.
///
/// Dropping a directory that was never cleaned up still removes it, but
/// also logs an "Implicitly cleaning up" warning: relying on drop for this
/// usually means a missing [`TempDir::cleanup`] or [`TempDir::scoped`].
///
/// A directory whose `TempDir` is never dropped stays on disk. That covers
/// one kept in a `static`, one passed to [`std::mem::forget`], and one still
/// alive when the process calls [`std::process::exit`]. Call
/// [`TempDir::cleanup`] before exiting in those cases.
pub struct TempDir {
    name: TempName,

    /// Removes the tree exactly once; warns if that happens on drop.
    finalizer: Finalizer,
}

impl TempDir {
    /// Creates a new temporary directory in the default location.
    ///
    /// ## Example
    ///
    /// ```
    /// # use scoped_tempfile::{TempDir, Error};
    /// let dir = TempDir::new()?;
    ///
    /// // The directory exists.
    /// let dir_path = dir.path().to_path_buf();
    /// assert!(dir_path.is_dir());
    ///
    /// // Deletes the directory.
    /// dir.cleanup()?;
    ///
    /// // The directory was removed.
    /// assert!(!dir_path.exists());
    /// # Ok::<(), Error>(())
    /// ```
    pub fn new() -> Result<Self, Error> {
        Builder::new().tempdir()
    }

    /// Creates a new temporary directory inside `root_dir`.
    ///
    /// ## Arguments
    ///
    /// * `root_dir` - The directory to create the directory in. It must exist;
    ///   otherwise the operating system's not-found error is returned as is.
    pub fn new_in<C: Into<Component>>(root_dir: C) -> Result<Self, Error> {
        Builder::new().dir(root_dir).tempdir()
    }

    pub(crate) fn create(builder: &Builder) -> Result<Self, Error> {
        let naming = builder.naming()?;
        let attempts = builder.attempts_budget();
        let ((), name) = naming.create_with(RandomNames::new(), attempts, create_exclusive_dir)?;

        let warn_message = format!("Implicitly cleaning up TempDir({name:?})");
        let finalizer =
            Finalizer::new(name.path().to_path_buf(), Release::RemoveTree, warn_message);
        Ok(Self { name, finalizer })
    }

    /// The name the directory was created under, in the domain it was requested in.
    pub fn name(&self) -> &TempName {
        &self.name
    }

    /// Returns the path of the underlying temporary directory.
    pub fn path(&self) -> &Path {
        self.name.path()
    }

    /// Whether [`TempDir::cleanup`] has already run.
    pub fn is_cleaned_up(&self) -> bool {
        !self.finalizer.is_alive()
    }

    /// Removes the directory and everything in it. Symbolic links inside are
    /// removed as links; whatever they point to is left alone.
    ///
    /// Only the first call does anything; later calls return `Ok(())`.
    pub fn cleanup(&self) -> Result<(), Error> {
        self.finalizer.detach_and_release()?;
        Ok(())
    }

    /// Runs `f` with the directory's path, then cleans up, whether `f`
    /// returned normally, returned an error, or panicked.
    ///
    /// ```
    /// # use scoped_tempfile::{TempDir, Error};
    /// let dir = TempDir::new()?;
    /// let written = dir.scoped(|path| std::fs::write(path.join("a.txt"), b"hi"))?;
    /// assert!(written.is_ok());
    /// assert!(!dir.path().exists());
    /// # Ok::<(), Error>(())
    /// ```
    pub fn scoped<R, F: FnOnce(&Path) -> R>(&self, f: F) -> Result<R, Error> {
        let guard = CleanupOnExit(self);
        let out = f(guard.0.path());
        guard.0.cleanup()?;
        Ok(out)
    }

    /// Removes the directory on a blocking thread.
    #[cfg(feature = "tokio")]
    #[cfg_attr(docsrs, doc(cfg(feature = "tokio")))]
    pub async fn cleanup_async(self) -> Result<(), Error> {
        tokio::task::spawn_blocking(move || self.cleanup())
            .await
            .map_err(|e| Error::Io(std::io::Error::other(e)))?
    }
}

struct CleanupOnExit<'a>(&'a TempDir);

impl Drop for CleanupOnExit<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.0.cleanup() {
            tracing::warn!(
                path = ?self.0.path(),
                error = %e,
                "failed to clean up temporary directory"
            );
        }
    }
}

impl Debug for TempDir {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "TempDir({:?})", self.name)
    }
}

/// Allows implicit treatment of TempDir as a Path.
impl Deref for TempDir {
    type Target = Path;

    fn deref(&self) -> &Self::Target {
        self.path()
    }
}

impl Borrow<Path> for TempDir {
    fn borrow(&self) -> &Path {
        self.path()
    }
}

impl AsRef<Path> for TempDir {
    fn as_ref(&self) -> &Path {
        self.path()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::capture_warnings;
    use std::fs;

    #[test]
    fn test_new() -> Result<(), Error> {
        let dir = TempDir::new()?;

        // The directory exists.
        let dir_path = dir.path().to_path_buf();
        assert!(fs::metadata(&dir_path).is_ok());

        dir.cleanup()?;

        assert!(fs::metadata(dir_path).is_err());
        Ok(())
    }

    #[test]
    fn debug_names_the_path() {
        let dir = TempDir::new().unwrap();
        assert_eq!(format!("{dir:?}"), format!("TempDir({:?})", dir.path()));
        dir.cleanup().unwrap();
    }

    #[test]
    fn cleanup_failure_is_reported_once() {
        let dir = TempDir::new().unwrap();
        fs::remove_dir(dir.path()).unwrap();
        assert_eq!(dir.cleanup().unwrap_err().kind(), std::io::ErrorKind::NotFound);
        assert!(dir.cleanup().is_ok());
    }

    #[test]
    fn drop_after_cleanup_is_silent() {
        let dir = TempDir::new().unwrap();
        dir.cleanup().unwrap();
        let logs = capture_warnings(|| drop(dir));
        assert!(logs.is_empty(), "{logs}");
    }

    #[test]
    fn forgotten_dir_is_left_behind() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().to_path_buf();
        std::mem::forget(dir);

        assert!(path.is_dir());
        fs::remove_dir(path).unwrap();
    }

    #[test]
    fn panicking_scope_still_cleans_up_quietly() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().to_path_buf();
        let logs = capture_warnings(|| {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                dir.scoped(|_| panic!("boom")).ok();
            }));
            assert!(result.is_err());
            drop(dir);
        });
        assert!(!path.exists());
        assert!(!logs.contains("Implicitly cleaning up"), "{logs}");
    }
}
