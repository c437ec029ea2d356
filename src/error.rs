//! The error taxonomy (spec §7): EOF, Format, Encoding, InvalidArgument, Unsupported,
//! plus Io for the failures `Source::open` can hit before there's any window to read from.

use std::ops::Range;
use thiserror::Error;

/// Errors surfaced by this crate.
///
/// Messages carry the offending range and window length where spec.md's test
/// scenarios assert on exact substrings (`read A:B`, `len L`, `bad header`, `bad version`).
#[derive(Error, Debug)]
pub enum Error {
    /// A read whose range lies partly or wholly outside the source window,
    /// or an ascii-terminated read that ran off the end looking for a NUL.
    #[error("read {start}:{end} is out of bounds, len {len}{reason}",
        start = .range.start, end = .range.end,
        reason = .reason.map(|r| format!(" ({r})")).unwrap_or_default())]
    Eof {
        range: Range<i64>,
        len: u64,
        reason: Option<&'static str>,
    },

    /// A declared record/subrecord length inconsistent with its container,
    /// an unknown heap subrecord tag, a bad `idsize`, or a bad header.
    #[error("format error: {0}")]
    Format(String),

    /// Invalid UTF-8, or non-ASCII bytes where ASCII was required.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// A negative `n` passed to a read that takes a length.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Reading a field a variant doesn't have, or reading from a closed source.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Failure opening or mapping a file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn eof(range: Range<i64>, len: u64) -> Error {
        Error::Eof {
            range,
            len,
            reason: None,
        }
    }

    pub(crate) fn eof_reason(range: Range<i64>, len: u64, reason: &'static str) -> Error {
        Error::Eof {
            range,
            len,
            reason: Some(reason),
        }
    }
}
