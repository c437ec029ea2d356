//! The file header and the `Source` that owns a dump's bytes (spec §3, §4.3).

use std::fs::File;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use log::debug;

use crate::byte_window::ByteWindow;
use crate::error::{Error, Result};
use crate::record::Records;

/// The width of object/class/string ids in a particular hprof file.
///
/// Hprof ids can be 32 or 64 bit, depending on the system and JVM that the
/// hprof was captured on. This controls how ids are parsed and otherwise
/// can generally be ignored.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[repr(usize)]
pub enum IdSize {
    U32 = 0,
    U64 = 1,
}

impl IdSize {
    pub(crate) fn size_in_bytes(&self) -> usize {
        match self {
            IdSize::U32 => 4,
            IdSize::U64 => 8,
        }
    }

    fn from_header_value(n: u32) -> Result<IdSize> {
        match n {
            4 => Ok(IdSize::U32),
            8 => Ok(IdSize::U64),
            other => Err(Error::Format(format!(
                "idsize must be 4 or 8, got {other}"
            ))),
        }
    }
}

enum Storage {
    Owned(Vec<u8>),
    Mmap(memmap2::Mmap),
}

impl Storage {
    fn as_slice(&self) -> &[u8] {
        match self {
            Storage::Owned(v) => v,
            Storage::Mmap(m) => m,
        }
    }
}

/// The expected hprof magic prefix. The trailing byte is a version digit,
/// checked separately since it varies (`.1`, `.2`, `.3` have all been seen
/// in the wild).
const MAGIC_PREFIX: &[u8] = b"JAVA PROFILE 1.0.";
/// Versions actually emitted by JVMs in the wild; anything else is rejected
/// rather than silently assumed compatible.
const KNOWN_VERSION_DIGITS: &[u8] = b"123";

/// An open hprof dump: an immutable byte window plus the header-derived
/// constants (`idsize`, `starttime`) that every record decode needs.
///
/// Equality and sharing: a `Source` is read-only after construction, so it's
/// freely shareable across concurrent readers (spec §5). Dropping a `Source`
/// (or calling [`Source::close`]) invalidates any further reads through it —
/// [`Source::close`] makes that explicit and observable, rather than relying
/// on the borrow checker to prevent use-after-free, since façades only need
/// a `&Source` to stay alive, not the underlying mapping.
pub struct Source {
    storage: Storage,
    closed: AtomicBool,
    id_size: IdSize,
    starttime_millis: u64,
    header_len: u64,
}

impl std::fmt::Debug for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Source")
            .field("id_size", &self.id_size)
            .field("starttime_millis", &self.starttime_millis)
            .field("len", &self.len())
            .finish()
    }
}

impl Source {
    /// Open a file and memory-map it. The map is read-only; the OS handles
    /// paging it in as records are read.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Source> {
        let file = File::open(path.as_ref())?;
        // SAFETY: this crate never writes through the map, but mmap's
        // immutability guarantee ultimately depends on no other process
        // truncating or mutating the file concurrently, which is outside
        // what Rust's type system can enforce.
        let mmap = unsafe { memmap2::Mmap::map(&file)? };
        debug!("opened {} ({} bytes, mmap)", path.as_ref().display(), mmap.len());
        Source::new(Storage::Mmap(mmap))
    }

    /// Wrap an in-memory byte blob the caller already owns.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Source> {
        debug!("opened {} bytes from memory", bytes.len());
        Source::new(Storage::Owned(bytes))
    }

    /// Wrap a borrowed byte slice by copying it. Convenient for tests and
    /// small dumps; prefer [`Source::open`] for anything large enough that
    /// a copy would matter.
    pub fn from_slice(bytes: &[u8]) -> Result<Source> {
        Source::from_bytes(bytes.to_vec())
    }

    fn new(storage: Storage) -> Result<Source> {
        let window = ByteWindow::new(storage.as_slice());
        let (id_size, starttime_millis, header_len) = parse_header(&window)?;
        Ok(Source {
            storage,
            closed: AtomicBool::new(false),
            id_size,
            starttime_millis,
            header_len,
        })
    }

    /// The `idsize` this file's ids were recorded with.
    pub fn id_size(&self) -> IdSize {
        self.id_size
    }

    /// The instant (millisecond precision) at which the dump began, as
    /// milliseconds since the Unix epoch.
    pub fn starttime_millis(&self) -> u64 {
        self.starttime_millis
    }

    /// Make further reads through this source (and any façade derived from
    /// it) fail with [`Error::Unsupported`] instead of reading stale or
    /// (for a dropped mmap) nonexistent data.
    pub fn close(&self) {
        debug!("closing source");
        self.closed.store(true, Ordering::Release);
    }

    fn window(&self) -> Result<ByteWindow<'_>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Unsupported("source is closed".to_string()));
        }
        Ok(ByteWindow::new(self.storage.as_slice()))
    }

    pub fn byte(&self, addr: i64) -> Result<u8> {
        self.window()?.byte(addr)
    }

    pub fn bytes(&self, addr: i64, n: i64) -> Result<Vec<u8>> {
        self.window()?.bytes(addr, n).map(|s| s.to_vec())
    }

    pub fn uint32(&self, addr: i64) -> Result<u32> {
        self.window()?.uint32(addr)
    }

    pub fn int32(&self, addr: i64) -> Result<i32> {
        self.window()?.int32(addr)
    }

    pub fn ushort(&self, addr: i64) -> Result<u16> {
        self.window()?.ushort(addr)
    }

    pub fn id(&self, addr: i64) -> Result<u64> {
        self.window()?.id(addr, self.id_size)
    }

    pub fn ascii(&self, addr: i64, n: i64) -> Result<String> {
        self.window()?.ascii(addr, n)
    }

    pub fn ascii_terminated(&self, addr: i64) -> Result<String> {
        self.window()?.ascii_terminated(addr)
    }

    pub fn utf8(&self, addr: i64, n: i64) -> Result<String> {
        self.window()?.utf8(addr, n)
    }

    /// The total length of the backing byte range.
    pub fn len(&self) -> u64 {
        self.storage.as_slice().len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate over the top-level [`crate::record::Record`]s that follow the header.
    pub fn records(&self) -> Records<'_> {
        Records::new(self, self.header_len)
    }
}

/// Parse the fixed header: ASCII magic, `idsize`, and a millisecond epoch timestamp.
fn parse_header(window: &ByteWindow) -> Result<(IdSize, u64, u64)> {
    // Find the NUL that ends the magic string. We can't use
    // `ascii_terminated` directly because a bad/truncated header must
    // distinguish "bad header" from plain EOF.
    let len = window.len() as i64;
    let mut nul_at = None;
    for addr in 0..len {
        if window.byte(addr)? == 0 {
            nul_at = Some(addr);
            break;
        }
    }
    let nul_at = nul_at.ok_or_else(|| Error::Format("bad header: no terminator found".to_string()))?;

    if (nul_at as usize) < MAGIC_PREFIX.len()
        || window.ascii(0, MAGIC_PREFIX.len() as i64)? != std::str::from_utf8(MAGIC_PREFIX).unwrap()
    {
        return Err(Error::Format("bad header".to_string()));
    }
    let version_digit = window.byte(MAGIC_PREFIX.len() as i64)?;
    if !KNOWN_VERSION_DIGITS.contains(&version_digit) || nul_at as usize != MAGIC_PREFIX.len() + 1 {
        return Err(Error::Format("bad version".to_string()));
    }

    let idsize_addr = nul_at + 1;
    let idsize_num = window.uint32(idsize_addr)?;
    let id_size = IdSize::from_header_value(idsize_num)?;

    let hi = window.uint32(idsize_addr + 4)?;
    let lo = window.uint32(idsize_addr + 8)?;
    let starttime_millis = ((hi as u64) << 32) | (lo as u64);

    let header_len = (idsize_addr + 12) as u64;
    Ok((id_size, starttime_millis, header_len))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_bytes(version: u8, idsize: u32) -> Vec<u8> {
        let mut v = b"JAVA PROFILE 1.0.".to_vec();
        v.push(version);
        v.push(0);
        v.extend_from_slice(&idsize.to_be_bytes());
        v.extend_from_slice(&0x168E143F263u64.to_be_bytes());
        v
    }

    #[test]
    fn opens_from_bytes() {
        let bytes = header_bytes(b'3', 4);
        let src = Source::from_bytes(bytes).unwrap();
        assert_eq!(src.id_size(), IdSize::U32);
        assert_eq!(src.starttime_millis(), 0x168E143F263);
    }

    #[test]
    fn rejects_bad_idsize() {
        let bytes = header_bytes(b'3', 5);
        assert!(matches!(Source::from_bytes(bytes), Err(Error::Format(_))));
    }

    #[test]
    fn rejects_bad_header() {
        let mut bytes = header_bytes(b'3', 4);
        bytes[0] = b'X';
        let err = Source::from_bytes(bytes).unwrap_err();
        assert!(err.to_string().contains("bad header"));
    }

    #[test]
    fn rejects_bad_version() {
        let bytes = header_bytes(b'9', 4);
        let err = Source::from_bytes(bytes).unwrap_err();
        assert!(err.to_string().contains("bad version"));
    }

    #[test]
    fn close_invalidates_reads() {
        let bytes = header_bytes(b'3', 4);
        let src = Source::from_bytes(bytes).unwrap();
        assert!(src.byte(0).is_ok());
        src.close();
        assert!(matches!(src.byte(0), Err(Error::Unsupported(_))));
    }

    #[test]
    fn open_reads_a_real_file() {
        use std::io::Write;
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(&header_bytes(b'1', 8)).unwrap();
        let src = Source::open(f.path()).unwrap();
        assert_eq!(src.id_size(), IdSize::U64);
    }

    #[test]
    fn empty_dump_body_yields_no_records() {
        let bytes = header_bytes(b'3', 4);
        let src = Source::from_bytes(bytes).unwrap();
        assert_eq!(src.records().count(), 0);
    }
}
