use crate::create::{create_exclusive_dir, create_exclusive_file, Naming, TMP_MAX};
use crate::random_name::RandomNames;
use crate::stream::{Buffering, Newline, OpenMode, StreamOptions};
use crate::{Component, Error, NamedTempFile, TempDir, TempFile, TempName};
use std::fs::File;

/// Configures how temporary files and directories are named and opened.
///
/// Every setting has a documented default, so `Builder::new()` on its own
/// behaves like the free functions at the crate root.
///
/// ## Example
///
/// ```
/// # use scoped_tempfile::{Builder, Error};
/// let dir = Builder::new().prefix("build-").suffix(".d").tempdir()?;
/// let name = dir.name().file_name().to_str().unwrap();
/// assert!(name.starts_with("build-") && name.ends_with(".d"));
///
/// let file = Builder::new().dir(dir.path()).delete(false).named_tempfile()?;
/// assert_eq!(file.path().parent(), Some(dir.path()));
/// # Ok::<(), Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct Builder {
    prefix: Option<Component>,
    suffix: Option<Component>,
    dir: Option<Component>,
    mode: String,
    encoding: Option<String>,
    newline: Newline,
    buffering: Buffering,
    delete: bool,
    attempts: u32,
}

impl Default for Builder {
    fn default() -> Self {
        Self {
            prefix: None,
            suffix: None,
            dir: None,
            mode: String::from("w+b"),
            encoding: None,
            newline: Newline::default(),
            buffering: Buffering::default(),
            delete: true,
            attempts: TMP_MAX,
        }
    }
}

impl Builder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Text before the random token. Defaults to [`DEFAULT_PREFIX`](crate::DEFAULT_PREFIX).
    pub fn prefix<C: Into<Component>>(&mut self, prefix: C) -> &mut Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Text after the random token. Defaults to nothing.
    pub fn suffix<C: Into<Component>>(&mut self, suffix: C) -> &mut Self {
        self.suffix = Some(suffix.into());
        self
    }

    /// The directory to create entries in. Defaults to [`temp_dir`](crate::temp_dir).
    pub fn dir<C: Into<Component>>(&mut self, dir: C) -> &mut Self {
        self.dir = Some(dir.into());
        self
    }

    /// The stream mode, e.g. `"w+b"` (the default) or `"w+"` for text.
    pub fn mode<S: Into<String>>(&mut self, mode: S) -> &mut Self {
        self.mode = mode.into();
        self
    }

    /// The text encoding for text modes: `utf-8`, `utf-16`, `utf-16-le` or `utf-16-be`.
    pub fn encoding<S: Into<String>>(&mut self, encoding: S) -> &mut Self {
        self.encoding = Some(encoding.into());
        self
    }

    pub fn newline(&mut self, newline: Newline) -> &mut Self {
        self.newline = newline;
        self
    }

    pub fn buffering(&mut self, buffering: Buffering) -> &mut Self {
        self.buffering = buffering;
        self
    }

    /// Whether a [`NamedTempFile`] removes its entry when closed. Defaults to `true`.
    pub fn delete(&mut self, delete: bool) -> &mut Self {
        self.delete = delete;
        self
    }

    /// How many candidate names to try before giving up. Defaults to [`TMP_MAX`].
    pub fn attempts(&mut self, attempts: u32) -> &mut Self {
        self.attempts = attempts;
        self
    }

    /// Creates a named temporary file that is removed when closed or dropped.
    pub fn named_tempfile(&self) -> Result<NamedTempFile, Error> {
        NamedTempFile::create(self)
    }

    /// Creates a temporary file with no name in the file system.
    pub fn tempfile(&self) -> Result<TempFile, Error> {
        TempFile::create(self)
    }

    /// Creates a temporary directory that is removed when cleaned up or dropped.
    pub fn tempdir(&self) -> Result<TempDir, Error> {
        TempDir::create(self)
    }

    /// Creates a directory and hands it to the caller; nothing removes it.
    pub fn make_dir(&self) -> Result<TempName, Error> {
        let naming = self.naming()?;
        let ((), name) =
            naming.create_with(RandomNames::new(), self.attempts, create_exclusive_dir)?;
        Ok(name)
    }

    /// Creates a read-write file and hands it to the caller; nothing removes it.
    pub fn make_file(&self) -> Result<(File, TempName), Error> {
        let naming = self.naming()?;
        naming.create_with(RandomNames::new(), self.attempts, create_exclusive_file)
    }

    pub(crate) fn naming(&self) -> Result<Naming, Error> {
        Naming::resolve(self.prefix.as_ref(), self.suffix.as_ref(), self.dir.as_ref())
    }

    /// Parses the stream settings; nothing touches the file system if this fails.
    pub(crate) fn stream_options(&self) -> Result<StreamOptions, Error> {
        let mode: OpenMode = self.mode.parse()?;
        let encoding = self.encoding.as_deref().map(str::parse).transpose()?;
        Ok(StreamOptions {
            mode,
            encoding,
            newline: self.newline,
            buffering: self.buffering,
        })
    }

    pub(crate) fn attempts_budget(&self) -> u32 {
        self.attempts
    }

    pub(crate) fn deletes(&self) -> bool {
        self.delete
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Domain;

    #[test]
    fn defaults() {
        let b = Builder::new();
        assert!(b.deletes());
        assert_eq!(b.attempts_budget(), TMP_MAX);
        let options = b.stream_options().unwrap();
        assert_eq!(options.mode, OpenMode::default());
        assert_eq!(options.encoding, None);
    }

    #[test]
    fn bad_settings_fail_before_creating_anything() {
        let root = crate::tempdir().unwrap();
        let result = Builder::new().dir(root.path()).mode("wr").named_tempfile();
        assert!(matches!(result, Err(Error::InvalidMode(_))));
        let result = Builder::new().dir(root.path()).mode("w+").encoding("ebcdic").tempfile();
        assert!(matches!(result, Err(Error::UnknownEncoding(_))));
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[test]
    fn byte_components_produce_byte_names() {
        let root = crate::tempdir().unwrap();
        let name = Builder::new()
            .dir(root.path().as_os_str().as_encoded_bytes())
            .prefix(b"raw")
            .make_dir()
            .unwrap();
        assert_eq!(name.domain(), Domain::Bytes);
        assert_eq!(name.to_text(), None);
        assert!(name.file_name().as_encoded_bytes().starts_with(b"raw"));
        assert!(name.path().is_dir());
    }

    #[test]
    fn mixing_domains_fails_for_every_pairing() {
        let root = crate::tempdir().unwrap();
        let dir = root.path().to_str().unwrap();
        let dir_bytes = dir.as_bytes();

        let cases: [Builder; 6] = [
            Builder::new().prefix("a").suffix(b"b").clone(),
            Builder::new().prefix(b"a").suffix("b").clone(),
            Builder::new().prefix("a").dir(dir_bytes).clone(),
            Builder::new().prefix(b"a").dir(dir).clone(),
            Builder::new().suffix("b").dir(dir_bytes).clone(),
            Builder::new().suffix(b"b").dir(dir).clone(),
        ];
        for builder in cases {
            assert!(matches!(builder.make_dir(), Err(Error::DomainMismatch)));
            assert!(matches!(builder.make_file(), Err(Error::DomainMismatch)));
            assert!(matches!(builder.named_tempfile(), Err(Error::DomainMismatch)));
            assert!(matches!(builder.tempdir(), Err(Error::DomainMismatch)));
        }
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[test]
    fn make_file_leaves_the_entry_to_the_caller() {
        let root = crate::tempdir().unwrap();
        let (file, name) = Builder::new().dir(root.path()).make_file().unwrap();
        drop(file);
        assert!(name.path().is_file());
    }
}
