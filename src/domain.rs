//! Text and raw-byte naming domains.
//!
//! A request names its prefix, suffix and directory either all as text or all
//! as raw bytes. The domain is inferred from whichever components were given
//! and then fixes how the missing ones are defaulted and how the created name
//! is reported back.

use crate::Error;
use std::ffi::{OsStr, OsString};
use std::fmt::{Debug, Formatter};
use std::path::{Path, PathBuf};

/// Whether path components are handled as text or as raw bytes.
#[derive(Debug, Eq, PartialEq, Copy, Clone, Default)]
pub enum Domain {
    /// Components are UTF-8 strings.
    #[default]
    Text,
    /// Components are raw byte sequences.
    Bytes,
}

/// A prefix, suffix or directory in one of the two domains.
#[derive(Clone, Eq, PartialEq)]
pub enum Component {
    Text(String),
    Bytes(Vec<u8>),
}

impl Component {
    /// The domain this component belongs to.
    pub fn domain(&self) -> Domain {
        match self {
            Self::Text(_) => Domain::Text,
            Self::Bytes(_) => Domain::Bytes,
        }
    }

    pub(crate) fn to_os_string(&self) -> Result<OsString, Error> {
        match self {
            Self::Text(s) => Ok(OsString::from(s)),
            Self::Bytes(b) => bytes_to_os_string(b.clone()),
        }
    }
}

#[cfg(unix)]
fn bytes_to_os_string(bytes: Vec<u8>) -> Result<OsString, Error> {
    use std::os::unix::ffi::OsStringExt;
    Ok(OsString::from_vec(bytes))
}

#[cfg(not(unix))]
fn bytes_to_os_string(bytes: Vec<u8>) -> Result<OsString, Error> {
    String::from_utf8(bytes)
        .map(OsString::from)
        .map_err(|_| Error::InvalidComponent)
}

impl Debug for Component {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(s) => write!(f, "{s:?}"),
            Self::Bytes(b) => write!(f, "b{:?}", String::from_utf8_lossy(b)),
        }
    }
}

impl From<&str> for Component {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

impl From<String> for Component {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&String> for Component {
    fn from(s: &String) -> Self {
        Self::Text(s.clone())
    }
}

impl From<&[u8]> for Component {
    fn from(b: &[u8]) -> Self {
        Self::Bytes(b.to_vec())
    }
}

impl<const N: usize> From<&[u8; N]> for Component {
    fn from(b: &[u8; N]) -> Self {
        Self::Bytes(b.to_vec())
    }
}

impl From<Vec<u8>> for Component {
    fn from(b: Vec<u8>) -> Self {
        Self::Bytes(b)
    }
}

/// Paths are text when they are valid UTF-8 and raw bytes otherwise.
impl From<&Path> for Component {
    fn from(p: &Path) -> Self {
        match p.to_str() {
            Some(s) => Self::Text(s.to_owned()),
            None => Self::Bytes(p.as_os_str().as_encoded_bytes().to_vec()),
        }
    }
}

impl From<&PathBuf> for Component {
    fn from(p: &PathBuf) -> Self {
        Self::from(p.as_path())
    }
}

impl From<PathBuf> for Component {
    fn from(p: PathBuf) -> Self {
        Self::from(p.as_path())
    }
}

/// Infers the domain of a request from the components that were supplied.
///
/// Absent components are ignored; if none is present the domain is text.
///
/// ```
/// # use scoped_tempfile::{infer_domain, Component, Domain, Error};
/// let pre = Component::from("pre");
/// let dir = Component::from(&b"/tmp"[..]);
/// assert_eq!(infer_domain(&[Some(&pre), None]).unwrap(), Domain::Text);
/// assert!(matches!(infer_domain(&[Some(&pre), Some(&dir)]), Err(Error::DomainMismatch)));
/// ```
pub fn infer_domain(components: &[Option<&Component>]) -> Result<Domain, Error> {
    let mut inferred = None;
    for component in components.iter().flatten() {
        let domain = component.domain();
        match inferred {
            None => inferred = Some(domain),
            Some(seen) if seen != domain => return Err(Error::DomainMismatch),
            Some(_) => {}
        }
    }
    Ok(inferred.unwrap_or_default())
}

/// A created temporary path, tagged with the domain it was requested in.
#[derive(Clone, Eq, PartialEq)]
pub struct TempName {
    path: PathBuf,
    domain: Domain,
}

impl TempName {
    pub(crate) fn new(path: PathBuf, domain: Domain) -> Self {
        Self { path, domain }
    }

    /// The absolute path of the entry.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The domain the name was requested in.
    pub fn domain(&self) -> Domain {
        self.domain
    }

    /// The name as text. `None` for byte-domain names or non UTF-8 paths.
    pub fn to_text(&self) -> Option<&str> {
        match self.domain {
            Domain::Text => self.path.to_str(),
            Domain::Bytes => None,
        }
    }

    /// The name as raw bytes, in the platform's path encoding.
    pub fn as_bytes(&self) -> &[u8] {
        self.path.as_os_str().as_encoded_bytes()
    }

    /// The final path segment (prefix, random token and suffix).
    pub fn file_name(&self) -> &OsStr {
        self.path.file_name().unwrap_or_default()
    }

    pub fn into_path_buf(self) -> PathBuf {
        self.path
    }
}

impl Debug for TempName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.domain {
            Domain::Text => write!(f, "{:?}", self.path),
            Domain::Bytes => write!(f, "b{:?}", self.path),
        }
    }
}

impl AsRef<Path> for TempName {
    fn as_ref(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text() -> Component {
        Component::from("")
    }

    fn bytes() -> Component {
        Component::from(&b""[..])
    }

    #[test]
    fn singles() {
        assert_eq!(infer_domain(&[Some(&text())]).unwrap(), Domain::Text);
        assert_eq!(infer_domain(&[Some(&bytes())]).unwrap(), Domain::Bytes);
        assert_eq!(infer_domain(&[None]).unwrap(), Domain::Text);
        assert_eq!(infer_domain(&[]).unwrap(), Domain::Text);
    }

    #[test]
    fn multiples() {
        let (t, b) = (text(), bytes());
        assert_eq!(infer_domain(&[Some(&t), Some(&t)]).unwrap(), Domain::Text);
        assert_eq!(infer_domain(&[Some(&b), Some(&b)]).unwrap(), Domain::Bytes);
        assert!(matches!(
            infer_domain(&[Some(&t), Some(&b)]),
            Err(Error::DomainMismatch)
        ));
        assert!(matches!(
            infer_domain(&[Some(&b), Some(&t)]),
            Err(Error::DomainMismatch)
        ));
    }

    #[test]
    fn multiples_and_none() {
        let (t, b) = (text(), bytes());
        assert_eq!(infer_domain(&[None, Some(&t)]).unwrap(), Domain::Text);
        assert_eq!(infer_domain(&[Some(&t), None]).unwrap(), Domain::Text);
        assert_eq!(infer_domain(&[None, None]).unwrap(), Domain::Text);
        assert_eq!(infer_domain(&[Some(&b), None]).unwrap(), Domain::Bytes);
        assert_eq!(infer_domain(&[None, Some(&b)]).unwrap(), Domain::Bytes);
        assert!(matches!(
            infer_domain(&[Some(&t), None, Some(&b)]),
            Err(Error::DomainMismatch)
        ));
        assert!(matches!(
            infer_domain(&[Some(&b), None, Some(&t)]),
            Err(Error::DomainMismatch)
        ));
    }

    #[test]
    fn byte_names_have_no_text_view() {
        let name = TempName::new(PathBuf::from("/tmp/x"), Domain::Bytes);
        assert_eq!(name.to_text(), None);
        assert_eq!(name.as_bytes(), b"/tmp/x");
        assert_eq!(name.file_name(), "x");
    }
}
