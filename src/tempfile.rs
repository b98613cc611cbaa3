use crate::closer::{Closer, Release};
#[cfg(windows)]
use crate::create::create_deleting_file;
use crate::create::{create_exclusive_file, Naming};
use crate::random_name::RandomNames;
use crate::stream::{ByteLines, Lines, Stream};
use crate::{Builder, Component, Error, TempName};
use std::fmt::{Debug, Formatter};
use std::io::{self, IoSlice, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A named temporary file that is removed when it is closed,
/// or after the last handle to it is dropped.
pub struct NamedTempFile {
    /// The stream of this handle. `None` once closed.
    stream: Option<Stream>,

    /// Shared with every handle from [`NamedTempFile::try_clone`].
    /// Removes the file exactly once.
    core: Arc<Closer>,

    name: TempName,
    delete: bool,
}

impl NamedTempFile {
    /// Creates a new temporary file in the default location.
    /// When the instance goes out of scope, the file will be deleted.
    ///
    /// ## Example
    ///
    /// ```
    /// # use scoped_tempfile::{NamedTempFile, Error};
    /// let file = NamedTempFile::new()?;
    ///
    /// // The file exists.
    /// let file_path = file.path().to_path_buf();
    /// assert!(file_path.is_file());
    ///
    /// // Deletes the file.
    /// drop(file);
    ///
    /// // The file was removed.
    /// assert!(!file_path.exists());
    /// # Ok::<(), Error>(())
    /// ```
    pub fn new() -> Result<Self, Error> {
        Builder::new().named_tempfile()
    }

    /// Creates a new temporary file in the specified directory.
    /// When the instance goes out of scope, the file will be deleted.
    ///
    /// ## Arguments
    ///
    /// * `dir` - The directory to create the file in.
    pub fn new_in<C: Into<Component>>(dir: C) -> Result<Self, Error> {
        Builder::new().dir(dir).named_tempfile()
    }

    pub(crate) fn create(builder: &Builder) -> Result<Self, Error> {
        let options = builder.stream_options()?;
        let naming = builder.naming()?;
        let delete = builder.deletes();

        let (file, name) =
            naming.create_with(RandomNames::new(), builder.attempts_budget(), |path| {
                open_named(path, delete)
            })?;

        let stream = match Stream::new(file, &options) {
            Ok(stream) => stream,
            Err(e) => {
                // The descriptor is already closed; the entry must not outlive the failure.
                discard_entry(name.path());
                return Err(e);
            }
        };

        let release = if !delete || os_deletes_on_close() {
            Release::Keep
        } else {
            Release::RemoveFile
        };
        Ok(Self {
            stream: Some(stream),
            core: Arc::new(Closer::new(Some(name.path().to_path_buf()), release)),
            name,
            delete,
        })
    }

    /// The name the file was created under, in the domain it was requested in.
    pub fn name(&self) -> &TempName {
        &self.name
    }

    /// Returns the path of the underlying temporary file.
    pub fn path(&self) -> &Path {
        self.name.path()
    }

    /// Whether closing removes the file.
    pub fn delete(&self) -> bool {
        self.delete
    }

    pub fn is_closed(&self) -> bool {
        self.stream.is_none()
    }

    /// Flushes and closes this handle's stream, then removes the file if
    /// requested. Closing again does nothing.
    ///
    /// ```
    /// # use scoped_tempfile::{NamedTempFile, Error};
    /// let mut file = NamedTempFile::new()?;
    /// file.close()?;
    /// assert!(!file.path().exists());
    /// file.close()?;
    /// # Ok::<(), Error>(())
    /// ```
    pub fn close(&mut self) -> Result<(), Error> {
        let flushed = match self.stream.take() {
            Some(stream) => stream.into_file().map(drop),
            None => Ok(()),
        };
        let removed = self.core.close();
        flushed?;
        removed?;
        Ok(())
    }

    /// Creates a new handle that shares the descriptor and file position of
    /// this one. The file stays in place until every handle is dropped or
    /// one of them is closed.
    pub fn try_clone(&mut self) -> Result<NamedTempFile, Error> {
        Ok(NamedTempFile {
            stream: Some(self.stream_mut()?.try_clone()?),
            core: self.core.clone(),
            name: self.name.clone(),
            delete: self.delete,
        })
    }

    /// Runs `f` with this file, then closes it whether `f` returned or panicked.
    ///
    /// Fails with [`Error::Closed`] if the file was already closed.
    ///
    /// ```
    /// # use scoped_tempfile::{NamedTempFile, Error};
    /// # use std::io::Write;
    /// let mut file = NamedTempFile::new()?;
    /// let path = file.path().to_path_buf();
    /// file.scoped(|f| f.write_all(b"scratch"))??;
    /// assert!(!path.exists());
    /// assert!(matches!(file.scoped(|_| ()), Err(Error::Closed)));
    /// # Ok::<(), Error>(())
    /// ```
    pub fn scoped<R, F: FnOnce(&mut Self) -> R>(&mut self, f: F) -> Result<R, Error> {
        if self.is_closed() {
            return Err(Error::Closed);
        }
        let mut guard = CloseOnExit(self);
        let out = f(&mut *guard.0);
        guard.0.close()?;
        Ok(out)
    }

    /// The stream of this handle.
    pub fn stream_mut(&mut self) -> Result<&mut Stream, Error> {
        self.stream.as_mut().ok_or(Error::Closed)
    }

    /// See [`Stream::write_text`].
    pub fn write_text(&mut self, s: &str) -> Result<(), Error> {
        Ok(self.stream_mut()?.write_text(s)?)
    }

    /// See [`Stream::read_text`].
    pub fn read_text(&mut self) -> Result<String, Error> {
        Ok(self.stream_mut()?.read_text()?)
    }

    /// Iterates over the remaining decoded lines of a text-mode file.
    /// Iterating does not close the file.
    pub fn lines(&mut self) -> Result<Lines<'_>, Error> {
        Ok(self.stream_mut()?.lines()?)
    }

    /// Iterates over the remaining raw lines of a binary-mode file.
    pub fn byte_lines(&mut self) -> Result<ByteLines<'_>, Error> {
        Ok(self.stream_mut()?.byte_lines()?)
    }

    fn io_stream(&mut self) -> io::Result<&mut Stream> {
        self.stream.as_mut().ok_or_else(|| Error::Closed.into())
    }

    /// Closes the file on a blocking thread.
    #[cfg(feature = "tokio")]
    #[cfg_attr(docsrs, doc(cfg(feature = "tokio")))]
    pub async fn close_async(mut self) -> Result<(), Error> {
        tokio::task::spawn_blocking(move || self.close())
            .await
            .map_err(|e| Error::Io(io::Error::other(e)))?
    }
}

/// Removes a file whose stream could not be built. `NotFound` is expected
/// where the operating system already deleted it on close.
fn discard_entry(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != io::ErrorKind::NotFound {
            tracing::warn!(path = ?path, error = %e, "failed to remove temporary file");
        }
    }
}

#[cfg(unix)]
fn open_named(path: &Path, _delete: bool) -> io::Result<std::fs::File> {
    create_exclusive_file(path)
}

#[cfg(windows)]
fn open_named(path: &Path, delete: bool) -> io::Result<std::fs::File> {
    if delete {
        create_deleting_file(path)
    } else {
        create_exclusive_file(path)
    }
}

#[cfg(not(any(unix, windows)))]
fn open_named(path: &Path, _delete: bool) -> io::Result<std::fs::File> {
    create_exclusive_file(path)
}

#[inline(always)]
fn os_deletes_on_close() -> bool {
    cfg!(windows)
}

struct CloseOnExit<'a>(&'a mut NamedTempFile);

impl Drop for CloseOnExit<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.0.close() {
            tracing::warn!(path = ?self.0.path(), error = %e, "failed to close temporary file");
        }
    }
}

/// Ensures the stream is closed before the core reference is freed.
/// If the core were freed while the handle is still open, the file
/// might not be deletable.
impl Drop for NamedTempFile {
    fn drop(&mut self) {
        drop(self.stream.take());
    }
}

impl Debug for NamedTempFile {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "NamedTempFile({:?})", self.name)
    }
}

impl AsRef<Path> for NamedTempFile {
    fn as_ref(&self) -> &Path {
        self.path()
    }
}

impl Read for NamedTempFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.io_stream()?.read(buf)
    }
}

impl Write for NamedTempFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.io_stream()?.write(buf)
    }

    fn write_vectored(&mut self, bufs: &[IoSlice<'_>]) -> io::Result<usize> {
        self.io_stream()?.write_vectored(bufs)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.io_stream()?.flush()
    }
}

impl Seek for NamedTempFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.io_stream()?.seek(pos)
    }
}

/// How [`TempFile`] keeps its file out of the way of directory listings.
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum AnonymousStrategy {
    /// The operating system removes the named file once its handle closes.
    DeleteOnClose,
    /// The file is created without a name via `O_TMPFILE`.
    Tmpfile,
    /// The file is created under a random name, which is unlinked right away.
    UnlinkAfterOpen,
}

// Cleared for the rest of the process once O_TMPFILE turns out to be unusable.
static TMPFILE_WORKS: AtomicBool = AtomicBool::new(true);

impl AnonymousStrategy {
    /// The strategy [`TempFile`] currently uses on this platform.
    pub fn current() -> Self {
        if cfg!(windows) {
            Self::DeleteOnClose
        } else if cfg!(any(target_os = "linux", target_os = "android"))
            && TMPFILE_WORKS.load(Ordering::Relaxed)
        {
            Self::Tmpfile
        } else {
            Self::UnlinkAfterOpen
        }
    }
}

/// A temporary file with no stable name.
///
/// The file never shows up in a way that blocks removing its directory, and
/// its storage is reclaimed when the handle is closed or dropped.
pub struct TempFile {
    stream: Option<Stream>,
    /// The transient name, on platforms where the file has one until it is closed.
    path: Option<TempName>,
}

impl TempFile {
    /// Creates a new anonymous temporary file in the default location.
    ///
    /// ```
    /// # use scoped_tempfile::{TempFile, Error};
    /// # use std::io::{Read, Seek, Write};
    /// let mut file = TempFile::new()?;
    /// file.write_all(b"spill")?;
    /// file.rewind()?;
    /// let mut buf = String::new();
    /// file.read_to_string(&mut buf)?;
    /// assert_eq!(buf, "spill");
    /// # Ok::<(), Error>(())
    /// ```
    pub fn new() -> Result<Self, Error> {
        Builder::new().tempfile()
    }

    /// Creates a new anonymous temporary file in the specified directory.
    pub fn new_in<C: Into<Component>>(dir: C) -> Result<Self, Error> {
        Builder::new().dir(dir).tempfile()
    }

    pub(crate) fn create(builder: &Builder) -> Result<Self, Error> {
        let options = builder.stream_options()?;
        let naming = builder.naming()?;

        let attempts = builder.attempts_budget();
        let (file, path) = match AnonymousStrategy::current() {
            AnonymousStrategy::Tmpfile => match open_tmpfile(&naming)? {
                Some(file) => (file, None),
                None => unlink_after_open(&naming, attempts)?,
            },
            AnonymousStrategy::DeleteOnClose => delete_on_close(&naming, attempts)?,
            AnonymousStrategy::UnlinkAfterOpen => unlink_after_open(&naming, attempts)?,
        };

        Ok(Self {
            stream: Some(Stream::new(file, &options)?),
            path,
        })
    }

    /// The transient name of the file, if the platform gives it one.
    pub fn name(&self) -> Option<&TempName> {
        self.path.as_ref()
    }

    pub fn is_closed(&self) -> bool {
        self.stream.is_none()
    }

    /// Flushes and closes the file. Closing again does nothing.
    pub fn close(&mut self) -> Result<(), Error> {
        match self.stream.take() {
            Some(stream) => Ok(stream.into_file().map(drop)?),
            None => Ok(()),
        }
    }

    /// Runs `f` with this file, then closes it whether `f` returned or panicked.
    ///
    /// Fails with [`Error::Closed`] if the file was already closed.
    pub fn scoped<R, F: FnOnce(&mut Self) -> R>(&mut self, f: F) -> Result<R, Error> {
        if self.is_closed() {
            return Err(Error::Closed);
        }
        let mut guard = CloseAnonymousOnExit(self);
        let out = f(&mut *guard.0);
        guard.0.close()?;
        Ok(out)
    }

    /// The stream of this handle.
    pub fn stream_mut(&mut self) -> Result<&mut Stream, Error> {
        self.stream.as_mut().ok_or(Error::Closed)
    }

    /// Gives up the wrapper and returns the bare stream.
    pub fn into_stream(mut self) -> Result<Stream, Error> {
        self.stream.take().ok_or(Error::Closed)
    }

    /// See [`Stream::write_text`].
    pub fn write_text(&mut self, s: &str) -> Result<(), Error> {
        Ok(self.stream_mut()?.write_text(s)?)
    }

    /// See [`Stream::read_text`].
    pub fn read_text(&mut self) -> Result<String, Error> {
        Ok(self.stream_mut()?.read_text()?)
    }

    /// See [`Stream::lines`].
    pub fn lines(&mut self) -> Result<Lines<'_>, Error> {
        Ok(self.stream_mut()?.lines()?)
    }

    /// See [`Stream::byte_lines`].
    pub fn byte_lines(&mut self) -> Result<ByteLines<'_>, Error> {
        Ok(self.stream_mut()?.byte_lines()?)
    }

    fn io_stream(&mut self) -> io::Result<&mut Stream> {
        self.stream.as_mut().ok_or_else(|| Error::Closed.into())
    }

    /// Closes the file on a blocking thread.
    #[cfg(feature = "tokio")]
    #[cfg_attr(docsrs, doc(cfg(feature = "tokio")))]
    pub async fn close_async(mut self) -> Result<(), Error> {
        tokio::task::spawn_blocking(move || self.close())
            .await
            .map_err(|e| Error::Io(io::Error::other(e)))?
    }
}

struct CloseAnonymousOnExit<'a>(&'a mut TempFile);

impl Drop for CloseAnonymousOnExit<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.0.close() {
            tracing::warn!(error = %e, "failed to close temporary file");
        }
    }
}

/// Opens a nameless file directly in the target directory.
///
/// Returns `Ok(None)` when the caller should fall back to [`unlink_after_open`].
#[cfg(any(target_os = "linux", target_os = "android"))]
fn open_tmpfile(naming: &Naming) -> Result<Option<std::fs::File>, Error> {
    use rustix::fs::{open, Mode, OFlags};

    match open(
        naming.dir(),
        OFlags::RDWR | OFlags::TMPFILE | OFlags::CLOEXEC,
        Mode::RUSR | Mode::WUSR,
    ) {
        Ok(fd) => Ok(Some(std::fs::File::from(fd))),
        Err(e) if disables_tmpfile(e) => {
            TMPFILE_WORKS.store(false, Ordering::Relaxed);
            tracing::debug!(error = %e, "O_TMPFILE unavailable, unlinking named files instead");
            Ok(None)
        }
        // Anything else (a missing directory, say) is reported by the fallback.
        Err(e) => {
            tracing::trace!(error = %e, dir = ?naming.dir(), "O_TMPFILE failed");
            Ok(None)
        }
    }
}

/// Whether an `O_TMPFILE` failure means it will never work in this process.
#[cfg(any(target_os = "linux", target_os = "android"))]
fn disables_tmpfile(e: rustix::io::Errno) -> bool {
    use rustix::io::Errno;

    // EISDIR: the kernel predates O_TMPFILE and saw a plain O_DIRECTORY.
    // EOPNOTSUPP: the file system does not implement it.
    e == Errno::ISDIR || e == Errno::OPNOTSUPP
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn open_tmpfile(_naming: &Naming) -> Result<Option<std::fs::File>, Error> {
    Ok(None)
}

type Opened = (std::fs::File, Option<TempName>);

fn unlink_after_open(naming: &Naming, attempts: u32) -> Result<Opened, Error> {
    let (file, name) = naming.create_with(RandomNames::new(), attempts, create_exclusive_file)?;
    // On failure `file` is dropped, closing the descriptor.
    std::fs::remove_file(name.path())?;
    Ok((file, None))
}

#[cfg(windows)]
fn delete_on_close(naming: &Naming, attempts: u32) -> Result<Opened, Error> {
    let (file, name) = naming.create_with(RandomNames::new(), attempts, create_deleting_file)?;
    Ok((file, Some(name)))
}

#[cfg(not(windows))]
fn delete_on_close(naming: &Naming, attempts: u32) -> Result<Opened, Error> {
    unlink_after_open(naming, attempts)
}

impl Drop for TempFile {
    fn drop(&mut self) {
        drop(self.stream.take());
    }
}

impl Debug for TempFile {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.path {
            Some(name) => write!(f, "TempFile({name:?})"),
            None => write!(f, "TempFile(<anonymous>)"),
        }
    }
}

impl Read for TempFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.io_stream()?.read(buf)
    }
}

impl Write for TempFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.io_stream()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.io_stream()?.flush()
    }
}

impl Seek for TempFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.io_stream()?.seek(pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_matches_the_platform() {
        let strategy = AnonymousStrategy::current();
        if cfg!(windows) {
            assert_eq!(strategy, AnonymousStrategy::DeleteOnClose);
        } else if cfg!(not(any(target_os = "linux", target_os = "android"))) {
            assert_eq!(strategy, AnonymousStrategy::UnlinkAfterOpen);
        }
    }

    #[test]
    fn unlink_after_open_leaves_no_entry() {
        let root = crate::tempdir().unwrap();
        let naming = Builder::new().dir(root.path()).naming().unwrap();
        let (mut file, name) = unlink_after_open(&naming, 10).unwrap();
        assert!(name.is_none());
        file.write_all(b"x").unwrap();
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[cfg(any(target_os = "linux", target_os = "android"))]
    #[test]
    fn only_capability_errors_disable_tmpfile() {
        use rustix::io::Errno;

        assert!(disables_tmpfile(Errno::ISDIR));
        assert!(disables_tmpfile(Errno::OPNOTSUPP));
        assert!(!disables_tmpfile(Errno::NOENT));
        assert!(!disables_tmpfile(Errno::ACCESS));
        assert!(!disables_tmpfile(Errno::NOSPC));
    }

    #[cfg(any(target_os = "linux", target_os = "android"))]
    #[test]
    fn disabled_tmpfile_falls_back_to_unlinking() {
        let was = TMPFILE_WORKS.swap(false, Ordering::Relaxed);
        assert_eq!(AnonymousStrategy::current(), AnonymousStrategy::UnlinkAfterOpen);

        let root = crate::tempdir().unwrap();
        let mut file = TempFile::new_in(root.path()).unwrap();
        file.write_all(b"x").unwrap();
        assert!(file.name().is_none());
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);

        TMPFILE_WORKS.store(was, Ordering::Relaxed);
        if was {
            assert_eq!(AnonymousStrategy::current(), AnonymousStrategy::Tmpfile);
        }
    }

    #[test]
    fn discarding_an_entry_only_warns_on_real_failures() {
        let root = crate::tempdir().unwrap();
        let logs = crate::test_support::capture_warnings(|| {
            discard_entry(&root.path().join("already-gone"));
        });
        assert!(logs.is_empty(), "{logs}");

        // A directory can't be removed as a file.
        let logs = crate::test_support::capture_warnings(|| discard_entry(root.path()));
        assert!(logs.contains("failed to remove temporary file"), "{logs}");
        assert!(root.path().is_dir());
    }

    #[cfg(any(target_os = "linux", target_os = "android"))]
    #[test]
    fn tmpfile_into_a_missing_dir_defers_to_the_fallback() {
        let root = crate::tempdir().unwrap();
        let naming = Builder::new().dir(root.path().join("missing")).naming().unwrap();
        assert!(open_tmpfile(&naming).unwrap().is_none());
    }

    #[test]
    fn failed_stream_construction_removes_the_entry() {
        let root = crate::tempdir().unwrap();
        let result = Builder::new()
            .dir(root.path())
            .mode("w+")
            .buffering(crate::Buffering::Unbuffered)
            .named_tempfile();
        assert!(matches!(result, Err(Error::UnbufferedText)));
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);

        let result = Builder::new()
            .dir(root.path())
            .delete(false)
            .encoding("utf-8")
            .named_tempfile();
        assert!(matches!(result, Err(Error::BinaryEncoding)));
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);

        let result = Builder::new()
            .dir(root.path())
            .mode("w+")
            .buffering(crate::Buffering::Unbuffered)
            .tempfile();
        assert!(matches!(result, Err(Error::UnbufferedText)));
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[test]
    fn closed_handles_refuse_io() {
        let mut file = NamedTempFile::new().unwrap();
        file.close().unwrap();
        let err = file.write(b"x").unwrap_err();
        assert!(err.to_string().contains("closed file"));
        assert!(matches!(file.read_text(), Err(Error::Closed)));
        assert!(matches!(file.try_clone(), Err(Error::Closed)));
    }

    #[cfg(unix)]
    #[test]
    fn clones_share_the_file_position() {
        let mut file = NamedTempFile::new().unwrap();
        let mut other = file.try_clone().unwrap();
        file.write_all(b"abc").unwrap();
        file.flush().unwrap();
        assert_eq!(other.stream_position().unwrap(), 3);
        other.write_all(b"def").unwrap();
        other.rewind().unwrap();
        let mut contents = String::new();
        other.read_to_string(&mut contents).unwrap();
        assert_eq!(contents, "abcdef");
    }
}
