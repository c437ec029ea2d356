//! An immutable, bounds-checked, big-endian primitive reader over a byte range (spec §4.1).

use byteorder::{BigEndian, ByteOrder};

use crate::error::{Error, Result};
use crate::source::IdSize;

/// A read-only view over a contiguous byte range.
///
/// All multi-byte reads are big-endian, matching HPROF's on-disk layout. Every
/// read is bounds-checked against the window's length; there is no way to
/// read outside `[0, len)` without getting an [`Error::Eof`].
#[derive(Copy, Clone)]
pub struct ByteWindow<'a> {
    bytes: &'a [u8],
}

impl<'a> ByteWindow<'a> {
    pub fn new(bytes: &'a [u8]) -> ByteWindow<'a> {
        ByteWindow { bytes }
    }

    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Validate `[addr, addr+n)` against the window, returning the range as `usize`s.
    fn check(&self, addr: i64, n: i64) -> Result<(usize, usize)> {
        if n < 0 {
            return Err(Error::InvalidArgument(format!(
                "negative length {n}"
            )));
        }
        let len = self.bytes.len() as i64;
        let end = addr.checked_add(n).filter(|&e| e <= len);
        match end {
            Some(end) if addr >= 0 => Ok((addr as usize, end as usize)),
            _ => {
                let end = addr.saturating_add(n);
                Err(Error::eof(addr..end, self.bytes.len() as u64))
            }
        }
    }

    pub fn byte(&self, addr: i64) -> Result<u8> {
        let (start, _) = self.check(addr, 1)?;
        Ok(self.bytes[start])
    }

    pub fn bytes(&self, addr: i64, n: i64) -> Result<&'a [u8]> {
        let (start, end) = self.check(addr, n)?;
        Ok(&self.bytes[start..end])
    }

    pub fn uint32(&self, addr: i64) -> Result<u32> {
        let (start, end) = self.check(addr, 4)?;
        Ok(BigEndian::read_u32(&self.bytes[start..end]))
    }

    pub fn int32(&self, addr: i64) -> Result<i32> {
        let (start, end) = self.check(addr, 4)?;
        Ok(BigEndian::read_i32(&self.bytes[start..end]))
    }

    pub fn ushort(&self, addr: i64) -> Result<u16> {
        let (start, end) = self.check(addr, 2)?;
        Ok(BigEndian::read_u16(&self.bytes[start..end]))
    }

    /// Read an `idsize`-wide id, zero-extended to `u64`.
    pub fn id(&self, addr: i64, idsize: IdSize) -> Result<u64> {
        match idsize {
            IdSize::U32 => self.uint32(addr).map(u64::from),
            IdSize::U64 => {
                let (start, end) = self.check(addr, 8)?;
                Ok(BigEndian::read_u64(&self.bytes[start..end]))
            }
        }
    }

    /// Read exactly `n` bytes, requiring all of them to be 7-bit ASCII.
    pub fn ascii(&self, addr: i64, n: i64) -> Result<String> {
        let (start, end) = self.check(addr, n)?;
        let slice = &self.bytes[start..end];
        if let Some(bad) = slice.iter().position(|&b| b >= 0x80) {
            return Err(Error::Encoding(format!(
                "non-ascii byte 0x{:02x} at offset {}",
                slice[bad],
                addr + bad as i64
            )));
        }
        // every byte is < 0x80, so this is always valid utf8
        Ok(String::from_utf8(slice.to_vec()).expect("ascii is valid utf8"))
    }

    /// Scan forward from `addr` for a NUL terminator and return the bytes before it as ASCII.
    pub fn ascii_terminated(&self, addr: i64) -> Result<String> {
        if addr < 0 {
            return Err(Error::eof(addr..addr, self.bytes.len() as u64));
        }
        let start = addr as usize;
        if start > self.bytes.len() {
            return Err(Error::eof(addr..addr, self.bytes.len() as u64));
        }
        match self.bytes[start..].iter().position(|&b| b == 0) {
            Some(offset) => self.ascii(addr, offset as i64),
            None => Err(Error::eof_reason(
                addr..self.bytes.len() as i64,
                self.bytes.len() as u64,
                "terminator not found",
            )),
        }
    }

    /// Validate exactly `n` bytes as UTF-8.
    pub fn utf8(&self, addr: i64, n: i64) -> Result<String> {
        let (start, end) = self.check(addr, n)?;
        std::str::from_utf8(&self.bytes[start..end])
            .map(|s| s.to_string())
            .map_err(|e| Error::Encoding(format!("invalid utf8 at offset {addr}: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window() -> Vec<u8> {
        // "ABCD\0\0\0\0\xc3\xb6F\0\xaaFGHI" placed at offset 40, per spec §8 scenario 3.
        let mut v = vec![0u8; 40];
        v.extend_from_slice(b"ABCD\0\0\0\0\xc3\xb6F\0\xaaFGHI");
        v
    }

    #[test]
    fn primitive_reads() {
        let data = window();
        let w = ByteWindow::new(&data);
        assert_eq!(w.ascii(40, 4).unwrap(), "ABCD");
        assert_eq!(w.utf8(48, 3).unwrap(), "öF");
        assert_eq!(w.uint32(40).unwrap(), 0x41424344);
        assert_eq!(w.int32(48).unwrap(), -0x3C49BA00);
        assert!(matches!(w.utf8(49, 2), Err(Error::Encoding(_))));
    }

    #[test]
    fn bytes_roundtrip_against_byte() {
        let data = window();
        let w = ByteWindow::new(&data);
        let via_bytes = w.bytes(40, 8).unwrap().to_vec();
        let via_byte: Vec<u8> = (40..48).map(|a| w.byte(a).unwrap()).collect();
        assert_eq!(via_bytes, via_byte);
    }

    #[test]
    fn zero_length_at_boundary() {
        let data = window();
        let w = ByteWindow::new(&data);
        let len = data.len() as i64;
        assert_eq!(w.bytes(len, 0).unwrap(), &[] as &[u8]);
        assert!(w.bytes(len + 1, 0).is_err());
    }

    #[test]
    fn negative_address_mentions_value() {
        let data = window();
        let w = ByteWindow::new(&data);
        let err = w.byte(-1).unwrap_err();
        assert!(err.to_string().contains("-1"));
    }

    #[test]
    fn out_of_bounds_reports_range_and_len() {
        let data = window();
        let w = ByteWindow::new(&data);
        let len = data.len();
        let err = w.byte(len as i64).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains(&format!("{}:{}", len, len + 1)));
        assert!(msg.contains(&format!("len {len}")));
    }

    #[test]
    fn ascii_terminated_matches_ascii_of_same_length() {
        let data = window();
        let w = ByteWindow::new(&data);
        assert_eq!(w.ascii_terminated(40).unwrap(), w.ascii(40, 4).unwrap());
    }

    #[test]
    fn ascii_terminated_without_nul_is_eof() {
        let data = b"no terminator here".to_vec();
        let w = ByteWindow::new(&data);
        let err = w.ascii_terminated(0).unwrap_err();
        assert!(err.to_string().contains("terminator not found"));
    }

    #[test]
    fn negative_length_is_invalid_argument_not_eof() {
        let data = window();
        let w = ByteWindow::new(&data);
        assert!(matches!(w.bytes(40, -1), Err(Error::InvalidArgument(_))));
    }
}
