//! `HEAP DUMP INFO` subrecords (spec §4.5, tag `0xFE`): labels a heap segment
//! with a name looked up via a prior [`crate::record::Utf8`] record.

use crate::error::Result;
use crate::heap_dump::SubRecord;
use crate::layout::{Layout, Width};
use crate::source::Source;

static LAYOUT: Layout = Layout::new(&[
    ("TAG", Width::Fixed(1)),
    ("HEAP_TYPE", Width::Fixed(4)),
    ("NAME_ID", Width::Id),
]);

#[derive(Copy, Clone)]
pub struct HeapDumpInfo<'s> {
    sub: SubRecord<'s>,
}

impl<'s> HeapDumpInfo<'s> {
    pub(crate) fn new(sub: SubRecord<'s>) -> Result<HeapDumpInfo<'s>> {
        Ok(HeapDumpInfo { sub })
    }

    fn source(&self) -> &'s Source {
        self.sub.source_handle()
    }

    fn layout(&self) -> &'static crate::layout::ResolvedLayout {
        LAYOUT.resolve(self.source().id_size())
    }

    /// A heap identifier (JVM-defined; commonly used to separate generations).
    pub fn heap_type(&self) -> Result<u32> {
        self.source()
            .uint32(self.sub.address() as i64 + self.layout().offset("HEAP_TYPE") as i64)
    }

    /// The id of the [`crate::record::Utf8`] record naming this heap.
    pub fn name_id(&self) -> Result<u64> {
        self.source()
            .id(self.sub.address() as i64 + self.layout().offset("NAME_ID") as i64)
    }

    pub fn render(&self) -> Result<String> {
        Ok(format!(
            "HeapDumpInfo(type={}, name_id=0x{:x})",
            self.heap_type()?,
            self.name_id()?
        ))
    }
}
