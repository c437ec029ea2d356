//! `OBJECT ARRAY DUMP` subrecords (spec §4.5, tag `0x22`).
//!
//! Grounded on the teacher's `ObjectArray` in
//! `examples/sudssf-jvm-hprof-rs/src/heap_dump/object_array.rs`, generalized
//! to address-based reads.

use crate::error::Result;
use crate::heap_dump::SubRecord;
use crate::layout::{Layout, Width};
use crate::source::Source;

static LAYOUT: Layout = Layout::new(&[
    ("TAG", Width::Fixed(1)),
    ("OBJID", Width::Id),
    ("STACKTRACE_SERIAL", Width::Fixed(4)),
    ("NUM_ELEMENTS", Width::Fixed(4)),
    ("ELEM_CLASS_OBJID", Width::Id),
    ("ELEMENTS", Width::Fixed(0)),
]);

pub(crate) fn length(source: &Source, address: u64) -> Result<u64> {
    let layout = LAYOUT.resolve(source.id_size());
    let idsz = source.id_size().size_in_bytes() as u64;
    let count = source.uint32(address as i64 + layout.offset("NUM_ELEMENTS") as i64)? as u64;
    Ok(layout.offset("ELEMENTS") + count * idsz)
}

/// An array of object references.
#[derive(Copy, Clone)]
pub struct ObjectArray<'s> {
    sub: SubRecord<'s>,
}

impl<'s> ObjectArray<'s> {
    pub(crate) fn new(sub: SubRecord<'s>) -> Result<ObjectArray<'s>> {
        Ok(ObjectArray { sub })
    }

    fn source(&self) -> &'s Source {
        self.sub.source_handle()
    }

    fn layout(&self) -> &'static crate::layout::ResolvedLayout {
        LAYOUT.resolve(self.source().id_size())
    }

    fn idsz(&self) -> i64 {
        self.source().id_size().size_in_bytes() as i64
    }

    pub fn obj_id(&self) -> Result<u64> {
        self.source()
            .id(self.sub.address() as i64 + self.layout().offset("OBJID") as i64)
    }

    pub fn stacktrace_serial(&self) -> Result<u32> {
        self.source()
            .uint32(self.sub.address() as i64 + self.layout().offset("STACKTRACE_SERIAL") as i64)
    }

    pub fn num_elements(&self) -> Result<u32> {
        self.source()
            .uint32(self.sub.address() as i64 + self.layout().offset("NUM_ELEMENTS") as i64)
    }

    pub fn elem_class_obj_id(&self) -> Result<u64> {
        self.source()
            .id(self.sub.address() as i64 + self.layout().offset("ELEM_CLASS_OBJID") as i64)
    }

    /// Iterate over the element object ids, in array order.
    pub fn elements(&self) -> Result<ObjectArrayElements<'s>> {
        Ok(ObjectArrayElements {
            source: self.source(),
            next_addr: self.sub.address() as i64 + self.layout().offset("ELEMENTS") as i64,
            remaining: self.num_elements()? as u64,
            idsz: self.idsz(),
        })
    }

    pub fn render(&self) -> Result<String> {
        Ok(format!(
            "ObjectArray(objid=0x{:x}, elem_class=0x{:x}, length={})",
            self.obj_id()?,
            self.elem_class_obj_id()?,
            self.num_elements()?
        ))
    }
}

/// Lazily decodes an [`ObjectArray`]'s element ids.
pub struct ObjectArrayElements<'s> {
    source: &'s Source,
    next_addr: i64,
    remaining: u64,
    idsz: i64,
}

impl<'s> Iterator for ObjectArrayElements<'s> {
    type Item = Result<u64>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let addr = self.next_addr;
        self.next_addr += self.idsz;
        Some(self.source.id(addr))
    }
}
