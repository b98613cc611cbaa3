//! Candidate name generation and exclusive creation.

use crate::domain::{Component, Domain, TempName};
use crate::Error;
use std::ffi::OsString;
use std::fs::{DirBuilder, File};
use std::io;
use std::path::{Path, PathBuf};

/// Prefix used when a request does not name one.
pub const DEFAULT_PREFIX: &str = "tmp";

/// Default number of candidate names tried before giving up.
///
/// This is glibc's `TMP_MAX`.
pub const TMP_MAX: u32 = 238_328;

/// Gets the default temporary directory, honouring `TMPDIR` and its platform equivalents.
#[inline(always)]
pub fn temp_dir() -> PathBuf {
    std::env::temp_dir()
}

/// A naming request with its domain inferred and its defaults filled in.
#[derive(Debug, Clone)]
pub(crate) struct Naming {
    dir: PathBuf,
    prefix: OsString,
    suffix: OsString,
    domain: Domain,
}

impl Naming {
    pub fn resolve(
        prefix: Option<&Component>,
        suffix: Option<&Component>,
        dir: Option<&Component>,
    ) -> Result<Self, Error> {
        let domain = crate::infer_domain(&[prefix, suffix, dir])?;

        let prefix = match prefix {
            Some(p) => p.to_os_string()?,
            None => OsString::from(DEFAULT_PREFIX),
        };
        let suffix = match suffix {
            Some(s) => s.to_os_string()?,
            None => OsString::new(),
        };
        let dir = match dir {
            Some(d) => PathBuf::from(d.to_os_string()?),
            None => temp_dir(),
        };

        let dir = if dir.is_absolute() {
            dir
        } else {
            std::env::current_dir()?.join(dir)
        };

        Ok(Self {
            dir,
            prefix,
            suffix,
            domain,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[cfg(test)]
    pub fn domain(&self) -> Domain {
        self.domain
    }

    fn candidate(&self, token: &str) -> PathBuf {
        let mut name = self.prefix.clone();
        name.push(token);
        name.push(&self.suffix);
        self.dir.join(name)
    }

    /// Tries candidate names until `create` succeeds on one of them.
    ///
    /// Only a collision with an existing entry moves on to the next candidate;
    /// any other failure is returned as is.
    pub fn create_with<T, N, F>(
        &self,
        names: N,
        attempts: u32,
        mut create: F,
    ) -> Result<(T, TempName), Error>
    where
        N: IntoIterator<Item = String>,
        F: FnMut(&Path) -> io::Result<T>,
    {
        for token in names.into_iter().take(attempts as usize) {
            let path = self.candidate(&token);
            match create(&path) {
                Ok(created) => return Ok((created, TempName::new(path, self.domain))),
                Err(e) if self.is_collision(&e) => {
                    tracing::trace!(path = ?path, "temporary name already taken, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(Error::ExhaustedAttempts { attempts })
    }

    #[cfg(not(windows))]
    fn is_collision(&self, e: &io::Error) -> bool {
        e.kind() == io::ErrorKind::AlreadyExists
    }

    // Windows reports an existing directory under the candidate name as a
    // permission error.
    #[cfg(windows)]
    fn is_collision(&self, e: &io::Error) -> bool {
        match e.kind() {
            io::ErrorKind::AlreadyExists => true,
            io::ErrorKind::PermissionDenied => std::fs::metadata(&self.dir)
                .map(|m| m.is_dir() && !m.permissions().readonly())
                .unwrap_or(false),
            _ => false,
        }
    }
}

/// Exclusively creates a read-write file that only the current user can access.
#[cfg(unix)]
pub(crate) fn create_exclusive_file(path: &Path) -> io::Result<File> {
    use rustix::fs::{open, Mode, OFlags};

    let fd = open(
        path,
        OFlags::RDWR | OFlags::CREATE | OFlags::EXCL | OFlags::NOFOLLOW | OFlags::CLOEXEC,
        Mode::RUSR | Mode::WUSR,
    )?;
    Ok(File::from(fd))
}

#[cfg(not(unix))]
pub(crate) fn create_exclusive_file(path: &Path) -> io::Result<File> {
    options().open(path)
}

/// Exclusively creates a file the operating system removes once its last handle closes.
#[cfg(windows)]
pub(crate) fn create_deleting_file(path: &Path) -> io::Result<File> {
    use std::os::windows::fs::OpenOptionsExt;

    const FILE_FLAG_DELETE_ON_CLOSE: u32 = 0x0400_0000;
    options().custom_flags(FILE_FLAG_DELETE_ON_CLOSE).open(path)
}

#[cfg(not(unix))]
fn options() -> std::fs::OpenOptions {
    let mut options = std::fs::OpenOptions::new();
    options.read(true).write(true).create_new(true);
    #[cfg(windows)]
    {
        use std::os::windows::fs::OpenOptionsExt;

        // FILE_SHARE_READ | FILE_SHARE_WRITE | FILE_SHARE_DELETE
        options.share_mode(0x1 | 0x2 | 0x4);
    }
    options
}

/// Exclusively creates a directory that only the current user can access.
pub(crate) fn create_exclusive_dir(path: &Path) -> io::Result<()> {
    let mut builder = DirBuilder::new();
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder.create(path)
}
