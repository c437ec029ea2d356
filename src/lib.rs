//! A library for lazily reading hprof heap dumps.
//!
//! See [`Source::open`] to get started.
//!
//! # Examples
//!
//! Counting how many of each top-level record type a dump contains:
//!
//! ```no_run
//! use std::collections;
//! use hprof_reader::{EnumIterable, RecordTag, Source};
//!
//! fn count_records(path: &str) {
//!     let source = Source::open(path).unwrap();
//!
//!     let mut counts = RecordTag::iter()
//!         .map(|t| (t, 0_u64))
//!         .collect::<collections::HashMap<RecordTag, u64>>();
//!
//!     for record in source.records() {
//!         let tag = record.unwrap().tag().unwrap();
//!         counts.entry(tag).and_modify(|c| *c += 1).or_insert(1);
//!     }
//!
//!     for (tag, count) in counts {
//!         println!("{:?}: {}", tag, count);
//!     }
//! }
//! ```

pub mod byte_window;
pub mod error;
pub mod heap_dump;
pub mod layout;
pub mod record;
pub mod source;

pub use error::{Error, Result};
pub use record::{LineNum, LoadClass, Record, RecordTag, RecordView, Records, StackFrame, StackTrace, Utf8};
pub use source::{IdSize, Source};

/// Extension allowing `T::iter()` over a closed enum's variants, without
/// naming `strum`'s `IntoEnumIterator` at every call site.
pub trait EnumIterable {
    type Iterator: Iterator<Item = Self>;

    fn iter() -> Self::Iterator;
}

impl<T: strum::IntoEnumIterator> EnumIterable for T {
    type Iterator = T::Iterator;

    fn iter() -> Self::Iterator {
        T::iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_bytes(idsize: u32) -> Vec<u8> {
        let mut v = b"JAVA PROFILE 1.0.".to_vec();
        v.push(b'2');
        v.push(0);
        v.extend_from_slice(&idsize.to_be_bytes());
        v.extend_from_slice(&0x0177_BC2A_1234_u64.to_be_bytes());
        v
    }

    fn utf8_record(name_id: u32, text: &str) -> Vec<u8> {
        let mut body = name_id.to_be_bytes().to_vec();
        body.extend_from_slice(text.as_bytes());
        let mut rec = vec![0x01u8];
        rec.extend_from_slice(&0u32.to_be_bytes());
        rec.extend_from_slice(&(body.len() as u32).to_be_bytes());
        rec.extend_from_slice(&body);
        rec
    }

    #[test]
    fn reads_a_utf8_record_end_to_end() {
        let mut bytes = header_bytes(4);
        bytes.extend_from_slice(&utf8_record(7, "hello"));
        let source = Source::from_bytes(bytes).unwrap();

        let records: Vec<_> = source.records().collect::<Result<Vec<_>>>().unwrap();
        assert_eq!(records.len(), 1);

        let utf8 = records[0].as_utf8().unwrap().unwrap();
        assert_eq!(utf8.name_id().unwrap(), 7);
        assert_eq!(utf8.text_as_str().unwrap(), "hello");
        assert_eq!(records[0].id().unwrap(), 7);
    }

    #[test]
    fn tag_counts_cover_every_known_tag() {
        assert_eq!(RecordTag::iter().count(), 15);
    }

    #[test]
    fn unhandled_record_id_is_an_error() {
        let mut bytes = header_bytes(4);
        let mut rec = vec![0xABu8];
        rec.extend_from_slice(&0u32.to_be_bytes());
        rec.extend_from_slice(&0u32.to_be_bytes());
        bytes.extend_from_slice(&rec);
        let source = Source::from_bytes(bytes).unwrap();
        let record = source.records().next().unwrap().unwrap();
        assert_eq!(record.tag().unwrap(), RecordTag::Unhandled);
        let err = record.id().unwrap_err().to_string();
        assert!(err.contains("id"));
    }
}
