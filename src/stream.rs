//! Buffered streams over a freshly created temporary file.

use crate::Error;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::str::FromStr;

/// Buffer size used unless [`Buffering::Capacity`] says otherwise.
pub const DEFAULT_BUFFER_SIZE: usize = 8 * 1024;

const UTF16_LE_BOM: [u8; 2] = [0xFF, 0xFE];

/// How a temporary file's stream may be used, parsed from strings such as `"w+b"`.
///
/// Exactly one of `r`, `w`, `x` or `a` must be present, optionally followed by
/// `+` for read-write access and `b` (binary) or `t` (text).
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub struct OpenMode {
    access: Access,
    update: bool,
    binary: bool,
}

#[derive(Debug, Eq, PartialEq, Copy, Clone)]
enum Access {
    Read,
    Write,
    Exclusive,
    Append,
}

impl OpenMode {
    pub fn is_readable(&self) -> bool {
        self.access == Access::Read || self.update
    }

    pub fn is_writable(&self) -> bool {
        self.access != Access::Read || self.update
    }

    pub fn is_binary(&self) -> bool {
        self.binary
    }

    pub fn is_append(&self) -> bool {
        self.access == Access::Append
    }
}

impl Default for OpenMode {
    /// `"w+b"`
    fn default() -> Self {
        Self {
            access: Access::Write,
            update: true,
            binary: true,
        }
    }
}

impl FromStr for OpenMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        let invalid = || Error::InvalidMode(s.to_owned());

        let mut access = None;
        let mut update = false;
        let (mut binary, mut text) = (false, false);
        for (i, c) in s.char_indices() {
            if s[..i].contains(c) {
                return Err(invalid());
            }
            let next = match c {
                'r' => Access::Read,
                'w' => Access::Write,
                'x' => Access::Exclusive,
                'a' => Access::Append,
                '+' => {
                    update = true;
                    continue;
                }
                'b' => {
                    binary = true;
                    continue;
                }
                't' => {
                    text = true;
                    continue;
                }
                _ => return Err(invalid()),
            };
            if access.replace(next).is_some() {
                return Err(invalid());
            }
        }

        match access {
            Some(access) if !(binary && text) => Ok(Self {
                access,
                update,
                binary,
            }),
            _ => Err(invalid()),
        }
    }
}

/// Text encodings understood by text-mode streams.
#[derive(Debug, Eq, PartialEq, Copy, Clone, Default)]
pub enum Encoding {
    #[default]
    Utf8,
    /// Little endian, with a byte order mark at the start of the file.
    Utf16,
    Utf16Le,
    Utf16Be,
}

impl FromStr for Encoding {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match normalized.as_str() {
            "utf8" => Ok(Self::Utf8),
            "utf16" => Ok(Self::Utf16),
            "utf16le" => Ok(Self::Utf16Le),
            "utf16be" => Ok(Self::Utf16Be),
            _ => Err(Error::UnknownEncoding(s.to_owned())),
        }
    }
}

impl Encoding {
    /// Bytes per code unit.
    fn unit_len(&self) -> usize {
        match self {
            Self::Utf8 => 1,
            Self::Utf16 | Self::Utf16Le | Self::Utf16Be => 2,
        }
    }

    /// Whether `unit` encodes the ASCII character `c`.
    fn is_ascii(&self, unit: &[u8], c: u8) -> bool {
        match self {
            Self::Utf8 => unit == [c],
            Self::Utf16 | Self::Utf16Le => unit == [c, 0],
            Self::Utf16Be => unit == [0, c],
        }
    }

    fn encode(&self, s: &str) -> Vec<u8> {
        match self {
            Self::Utf8 => s.as_bytes().to_vec(),
            Self::Utf16 | Self::Utf16Le => s.encode_utf16().flat_map(u16::to_le_bytes).collect(),
            Self::Utf16Be => s.encode_utf16().flat_map(u16::to_be_bytes).collect(),
        }
    }

    fn decode(&self, bytes: &[u8]) -> io::Result<String> {
        let invalid = |e: String| io::Error::new(io::ErrorKind::InvalidData, e);
        let units = |bytes: &[u8], f: fn([u8; 2]) -> u16| -> io::Result<Vec<u16>> {
            if bytes.len() % 2 != 0 {
                return Err(invalid("truncated UTF-16 data".into()));
            }
            Ok(bytes.chunks_exact(2).map(|c| f([c[0], c[1]])).collect())
        };
        match self {
            Self::Utf8 => String::from_utf8(bytes.to_vec()).map_err(|e| invalid(e.to_string())),
            Self::Utf16 | Self::Utf16Le => String::from_utf16(&units(bytes, u16::from_le_bytes)?)
                .map_err(|e| invalid(e.to_string())),
            Self::Utf16Be => String::from_utf16(&units(bytes, u16::from_be_bytes)?)
                .map_err(|e| invalid(e.to_string())),
        }
    }
}

/// Line ending handling for text-mode streams.
#[derive(Debug, Eq, PartialEq, Copy, Clone, Default)]
pub enum Newline {
    /// Write `\n` as the platform line separator; read `\r\n` and `\r` as `\n`.
    #[default]
    Universal,
    /// No translation in either direction.
    Untranslated,
    /// Write `\n` as `\n`.
    Lf,
    /// Write `\n` as `\r\n`.
    CrLf,
    /// Write `\n` as `\r`.
    Cr,
}

impl Newline {
    fn translate_out<'a>(&self, s: &'a str) -> std::borrow::Cow<'a, str> {
        let sep = match self {
            Self::Universal if cfg!(windows) => "\r\n",
            Self::CrLf => "\r\n",
            Self::Cr => "\r",
            _ => return s.into(),
        };
        s.replace('\n', sep).into()
    }

    fn translate_in(&self, s: String) -> String {
        match self {
            Self::Universal => s.replace("\r\n", "\n").replace('\r', "\n"),
            _ => s,
        }
    }
}

/// Write buffering of a stream.
#[derive(Debug, Eq, PartialEq, Copy, Clone, Default)]
pub enum Buffering {
    /// [`DEFAULT_BUFFER_SIZE`] bytes.
    #[default]
    Default,
    /// Every write goes straight to the file. Binary mode only.
    Unbuffered,
    /// Flush after each text write containing a newline. Text mode only.
    Line,
    /// A buffer of the given size.
    Capacity(usize),
}

/// Everything needed to turn a raw file into a [`Stream`].
#[derive(Debug, Clone, Default)]
pub(crate) struct StreamOptions {
    pub mode: OpenMode,
    pub encoding: Option<Encoding>,
    pub newline: Newline,
    pub buffering: Buffering,
}

/// A buffered, mode-checked stream over a temporary file.
///
/// Writes are buffered; reads and seeks flush pending writes first. The text
/// helpers apply the stream's encoding and newline translation.
pub struct Stream {
    inner: BufWriter<File>,
    options: StreamOptions,
    line_buffered: bool,
    bom_written: bool,
}

impl Stream {
    /// Wraps `file`. On failure the file is dropped, closing its descriptor.
    pub(crate) fn new(file: File, options: &StreamOptions) -> Result<Self, Error> {
        let mut stream = Self::wrap(file, options)?;
        if options.mode.is_append() {
            stream.inner.seek(SeekFrom::End(0))?;
        }
        Ok(stream)
    }

    /// Validates `options` and builds the buffer, leaving the file position alone.
    fn wrap(file: File, options: &StreamOptions) -> Result<Self, Error> {
        let binary = options.mode.is_binary();
        if binary && options.encoding.is_some() {
            return Err(Error::BinaryEncoding);
        }

        let (capacity, line_buffered) = match options.buffering {
            Buffering::Default => (DEFAULT_BUFFER_SIZE, false),
            Buffering::Unbuffered | Buffering::Capacity(0) if binary => (0, false),
            Buffering::Unbuffered | Buffering::Capacity(0) => return Err(Error::UnbufferedText),
            Buffering::Line if binary => {
                tracing::warn!(
                    "line buffering isn't supported in binary mode, using the default buffer size"
                );
                (DEFAULT_BUFFER_SIZE, false)
            }
            Buffering::Line => (DEFAULT_BUFFER_SIZE, true),
            Buffering::Capacity(n) => (n, false),
        };

        Ok(Self {
            inner: BufWriter::with_capacity(capacity, file),
            options: options.clone(),
            line_buffered,
            bom_written: false,
        })
    }

    pub fn mode(&self) -> OpenMode {
        self.options.mode
    }

    /// The text encoding; `None` for binary streams.
    pub fn encoding(&self) -> Option<Encoding> {
        if self.options.mode.is_binary() {
            None
        } else {
            Some(self.options.encoding.unwrap_or_default())
        }
    }

    /// The underlying file. Pending writes are not flushed.
    pub fn get_ref(&self) -> &File {
        self.inner.get_ref()
    }

    /// Opens another stream sharing this one's descriptor and file position.
    pub(crate) fn try_clone(&mut self) -> Result<Self, Error> {
        self.inner.flush()?;
        let file = self.inner.get_ref().try_clone()?;
        // The descriptors share one offset; an append-mode seek here would move ours too.
        let mut clone = Self::wrap(file, &self.options)?;
        clone.bom_written = self.bom_written;
        Ok(clone)
    }

    /// Flushes pending writes and gives back the file.
    pub(crate) fn into_file(self) -> io::Result<File> {
        self.inner.into_inner().map_err(io::IntoInnerError::into_error)
    }

    fn check_readable(&self) -> io::Result<()> {
        if self.options.mode.is_readable() {
            Ok(())
        } else {
            Err(io::Error::new(io::ErrorKind::Unsupported, "not readable"))
        }
    }

    fn check_writable(&self) -> io::Result<()> {
        if self.options.mode.is_writable() {
            Ok(())
        } else {
            Err(io::Error::new(io::ErrorKind::Unsupported, "not writable"))
        }
    }

    fn text_encoding(&self) -> io::Result<Encoding> {
        self.encoding().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "text I/O on a binary stream")
        })
    }

    /// Writes `s` using the stream's encoding and newline translation.
    pub fn write_text(&mut self, s: &str) -> io::Result<()> {
        self.check_writable()?;
        let encoding = self.text_encoding()?;
        if encoding == Encoding::Utf16 && !self.bom_written {
            if self.inner.stream_position()? == 0 {
                self.inner.write_all(&UTF16_LE_BOM)?;
            }
            self.bom_written = true;
        }
        let translated = self.options.newline.translate_out(s);
        self.inner.write_all(&encoding.encode(&translated))?;
        if self.line_buffered && s.contains('\n') {
            self.inner.flush()?;
        }
        Ok(())
    }

    /// Reads and decodes everything from the current position to the end.
    pub fn read_text(&mut self) -> io::Result<String> {
        let encoding = self.text_encoding()?;
        let at_start = self.stream_position()? == 0;
        let mut bytes = Vec::new();
        self.read_to_end(&mut bytes)?;
        let body = match encoding {
            Encoding::Utf16 if at_start && bytes.starts_with(&UTF16_LE_BOM) => &bytes[2..],
            _ => &bytes[..],
        };
        Ok(self.options.newline.translate_in(encoding.decode(body)?))
    }

    /// Iterates over the remaining lines of a text stream, decoded and with
    /// newlines translated. Each line keeps its terminator.
    ///
    /// Fails with [`io::ErrorKind::InvalidInput`] on binary streams; use
    /// [`Stream::byte_lines`] there.
    pub fn lines(&mut self) -> io::Result<Lines<'_>> {
        let encoding = self.text_encoding()?;
        let skip_bom = encoding == Encoding::Utf16 && self.stream_position()? == 0;
        let newline = self.options.newline;
        Ok(Lines {
            reader: BufReader::new(self),
            encoding,
            newline,
            skip_bom,
            done: false,
        })
    }

    /// Iterates over the remaining `\n`-terminated lines of a binary stream.
    pub fn byte_lines(&mut self) -> io::Result<ByteLines<'_>> {
        if self.encoding().is_some() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "byte lines on a text stream",
            ));
        }
        Ok(ByteLines {
            reader: BufReader::new(self),
            done: false,
        })
    }
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.check_readable()?;
        self.inner.flush()?;
        self.inner.get_mut().read(buf)
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.check_writable()?;
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl Seek for Stream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}

impl std::fmt::Debug for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream")
            .field("mode", &self.options.mode)
            .field("file", self.inner.get_ref())
            .finish()
    }
}

/// Text line iterator returned by [`Stream::lines`].
///
/// Dropping it moves the stream position back to just after the last line
/// handed out. Iterating never closes the stream.
pub struct Lines<'a> {
    reader: BufReader<&'a mut Stream>,
    encoding: Encoding,
    newline: Newline,
    skip_bom: bool,
    done: bool,
}

impl Lines<'_> {
    /// Reads one code unit, or fewer bytes at the end of the file.
    fn read_unit(&mut self, unit: &mut Vec<u8>) -> io::Result<usize> {
        unit.clear();
        let len = self.encoding.unit_len();
        while unit.len() < len {
            let buf = self.reader.fill_buf()?;
            if buf.is_empty() {
                break;
            }
            let take = buf.len().min(len - unit.len());
            unit.extend_from_slice(&buf[..take]);
            self.reader.consume(take);
        }
        Ok(unit.len())
    }

    /// Reads the encoded bytes of one line, terminator included.
    fn read_raw_line(&mut self) -> io::Result<Vec<u8>> {
        let len = self.encoding.unit_len();
        let mut line = Vec::new();
        let mut unit = Vec::with_capacity(len);
        loop {
            let n = self.read_unit(&mut unit)?;
            if n == 0 {
                break;
            }
            if std::mem::take(&mut self.skip_bom) && unit == UTF16_LE_BOM {
                continue;
            }
            line.extend_from_slice(&unit);
            if n < len || self.encoding.is_ascii(&unit, b'\n') {
                break;
            }
            if self.newline == Newline::Universal && self.encoding.is_ascii(&unit, b'\r') {
                // A lone `\r` ends the line too; `\r\n` counts once.
                let n = self.read_unit(&mut unit)?;
                if n == len && self.encoding.is_ascii(&unit, b'\n') {
                    line.extend_from_slice(&unit);
                } else if n > 0 {
                    self.reader.seek_relative(-(n as i64))?;
                }
                break;
            }
        }
        Ok(line)
    }
}

impl Iterator for Lines<'_> {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let line = match self.read_raw_line() {
            Ok(line) if line.is_empty() => {
                self.done = true;
                return None;
            }
            Ok(line) => line,
            Err(e) => {
                self.done = true;
                return Some(Err(e));
            }
        };
        let decoded = self.encoding.decode(&line);
        self.done = decoded.is_err();
        Some(decoded.map(|s| self.newline.translate_in(s)))
    }
}

impl Drop for Lines<'_> {
    fn drop(&mut self) {
        // Hands read-ahead back to the stream.
        let _ = self.reader.seek(SeekFrom::Current(0));
    }
}

/// Byte line iterator returned by [`Stream::byte_lines`].
pub struct ByteLines<'a> {
    reader: BufReader<&'a mut Stream>,
    done: bool,
}

impl Iterator for ByteLines<'_> {
    type Item = io::Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let mut line = Vec::new();
        match self.reader.read_until(b'\n', &mut line) {
            Ok(0) => {
                self.done = true;
                None
            }
            Ok(_) => Some(Ok(line)),
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

impl Drop for ByteLines<'_> {
    fn drop(&mut self) {
        let _ = self.reader.seek(SeekFrom::Current(0));
    }
}
