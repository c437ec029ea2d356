//! `INSTANCE DUMP` subrecords (spec §4.5, tag `0x21`).
//!
//! Grounded on the teacher's `ObjectRecord` in
//! `examples/sudssf-jvm-hprof-rs/src/heap_dump/object.rs`, generalized to
//! address-based reads.

use crate::error::Result;
use crate::heap_dump::SubRecord;
use crate::layout::{Layout, Width};
use crate::source::Source;

static LAYOUT: Layout = Layout::new(&[
    ("TAG", Width::Fixed(1)),
    ("OBJID", Width::Id),
    ("STACKTRACE_SERIAL", Width::Fixed(4)),
    ("CLASS_OBJID", Width::Id),
    ("NUM_BYTES", Width::Fixed(4)),
    ("DATA", Width::Fixed(0)),
]);

pub(crate) fn length(source: &Source, address: u64) -> Result<u64> {
    let layout = LAYOUT.resolve(source.id_size());
    let num_bytes = source.uint32(address as i64 + layout.offset("NUM_BYTES") as i64)? as u64;
    Ok(layout.offset("DATA") + num_bytes)
}

/// One instance's field data, as an opaque blob — decoding it requires the
/// owning class's field layout, which this crate does not reconstruct.
#[derive(Copy, Clone)]
pub struct ObjectRecord<'s> {
    sub: SubRecord<'s>,
}

impl<'s> ObjectRecord<'s> {
    pub(crate) fn new(sub: SubRecord<'s>) -> Result<ObjectRecord<'s>> {
        Ok(ObjectRecord { sub })
    }

    fn source(&self) -> &'s Source {
        self.sub.source_handle()
    }

    fn layout(&self) -> &'static crate::layout::ResolvedLayout {
        LAYOUT.resolve(self.source().id_size())
    }

    pub fn obj_id(&self) -> Result<u64> {
        self.source()
            .id(self.sub.address() as i64 + self.layout().offset("OBJID") as i64)
    }

    pub fn stacktrace_serial(&self) -> Result<u32> {
        self.source()
            .uint32(self.sub.address() as i64 + self.layout().offset("STACKTRACE_SERIAL") as i64)
    }

    pub fn class_obj_id(&self) -> Result<u64> {
        self.source()
            .id(self.sub.address() as i64 + self.layout().offset("CLASS_OBJID") as i64)
    }

    pub fn num_bytes(&self) -> Result<u32> {
        self.source()
            .uint32(self.sub.address() as i64 + self.layout().offset("NUM_BYTES") as i64)
    }

    /// The raw field bytes, undecoded.
    pub fn data(&self) -> Result<Vec<u8>> {
        let n = self.num_bytes()? as i64;
        self.source()
            .bytes(self.sub.address() as i64 + self.layout().offset("DATA") as i64, n)
    }

    pub fn render(&self) -> Result<String> {
        Ok(format!(
            "Object(objid=0x{:x}, class=0x{:x})",
            self.obj_id()?,
            self.class_obj_id()?
        ))
    }
}
