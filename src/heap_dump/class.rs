//! `CLASS DUMP` subrecords (spec §4.5, tag `0x20`): a class's identity plus
//! its constant pool, static fields, and instance field descriptors.
//!
//! Grounded on the teacher's `ClassRecord` in
//! `examples/sudssf-jvm-hprof-rs/src/heap_dump/class.rs`, generalized to
//! address-based reads, and on `examples/original_source/hprof/record/_heapdump.py`
//! (`ClassDump`) for the three variable-length table layouts (spec's
//! supplemental feature 1).

use crate::error::Result;
use crate::heap_dump::{field_width, SubRecord};
use crate::layout::{Layout, Width};
use crate::source::Source;

static LAYOUT: Layout = Layout::new(&[
    ("TAG", Width::Fixed(1)),
    ("OBJID", Width::Id),
    ("STACKTRACE_SERIAL", Width::Fixed(4)),
    ("SUPER_OBJID", Width::Id),
    ("LOADER_OBJID", Width::Id),
    ("SIGNERS_OBJID", Width::Id),
    ("PROTECTION_DOMAIN_OBJID", Width::Id),
    ("RESERVED1", Width::Id),
    ("RESERVED2", Width::Id),
    ("INSTANCE_SIZE", Width::Fixed(4)),
    ("CP_COUNT", Width::Fixed(2)),
    ("CP_ENTRIES", Width::Fixed(0)),
]);

/// Walks past the three variable tables to compute this subrecord's total
/// length, since nothing before them says how long they are.
pub(crate) fn length(source: &Source, address: u64) -> Result<u64> {
    let idsz = source.id_size().size_in_bytes() as i64;
    let layout = LAYOUT.resolve(source.id_size());
    let base = address as i64;

    let mut addr = base + layout.offset("CP_ENTRIES") as i64;
    let cp_count = source.ushort(base + layout.offset("CP_COUNT") as i64)?;
    for _ in 0..cp_count {
        // pool_index:u16, type:u8, value
        let type_code = source.byte(addr + 2)?;
        addr += 3 + field_width(type_code, idsz as u64)? as i64;
    }

    let static_count = source.ushort(addr)?;
    addr += 2;
    for _ in 0..static_count {
        // name_id:ID, type:u8, value
        let type_code = source.byte(addr + idsz)?;
        addr += idsz + 1 + field_width(type_code, idsz as u64)? as i64;
    }

    let instance_count = source.ushort(addr)?;
    addr += 2;
    // name_id:ID, type:u8 each, no value
    addr += instance_count as i64 * (idsz + 1);

    Ok((addr - base) as u64)
}

/// One constant pool entry: `pool_index:u16, type:u8, value`.
#[derive(Copy, Clone)]
pub struct ConstantPoolEntry<'s> {
    source: &'s Source,
    address: i64,
}

impl<'s> ConstantPoolEntry<'s> {
    pub fn pool_index(&self) -> Result<u16> {
        self.source.ushort(self.address)
    }

    pub fn type_code(&self) -> Result<u8> {
        self.source.byte(self.address + 2)
    }

    fn width(&self, idsz: i64) -> Result<i64> {
        Ok(field_width(self.type_code()?, idsz as u64)? as i64)
    }
}

/// One static field entry: `name_id:ID, type:u8, value`.
#[derive(Copy, Clone)]
pub struct StaticField<'s> {
    source: &'s Source,
    address: i64,
    idsz: i64,
}

impl<'s> StaticField<'s> {
    pub fn name_id(&self) -> Result<u64> {
        self.source.id(self.address)
    }

    pub fn type_code(&self) -> Result<u8> {
        self.source.byte(self.address + self.idsz)
    }
}

/// One instance field descriptor: `name_id:ID, type:u8`. No value — the
/// value lives in each instance's `INSTANCE DUMP`, not here.
#[derive(Copy, Clone)]
pub struct InstanceFieldDescriptor<'s> {
    source: &'s Source,
    address: i64,
    idsz: i64,
}

impl<'s> InstanceFieldDescriptor<'s> {
    pub fn name_id(&self) -> Result<u64> {
        self.source.id(self.address)
    }

    pub fn type_code(&self) -> Result<u8> {
        self.source.byte(self.address + self.idsz)
    }
}

/// Iterates a [`ClassRecord`]'s constant pool.
pub struct ConstantPoolEntries<'s> {
    source: &'s Source,
    next_addr: i64,
    remaining: u16,
    idsz: i64,
}

impl<'s> Iterator for ConstantPoolEntries<'s> {
    type Item = Result<ConstantPoolEntry<'s>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let entry = ConstantPoolEntry {
            source: self.source,
            address: self.next_addr,
        };
        match entry.width(self.idsz) {
            Ok(w) => {
                self.remaining -= 1;
                self.next_addr += 3 + w;
                Some(Ok(entry))
            }
            Err(e) => {
                self.remaining = 0;
                Some(Err(e))
            }
        }
    }
}

/// Iterates a [`ClassRecord`]'s static fields.
pub struct StaticFields<'s> {
    source: &'s Source,
    next_addr: i64,
    remaining: u16,
    idsz: i64,
}

impl<'s> Iterator for StaticFields<'s> {
    type Item = Result<StaticField<'s>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let entry = StaticField {
            source: self.source,
            address: self.next_addr,
            idsz: self.idsz,
        };
        match entry.type_code().and_then(|t| field_width(t, self.idsz as u64)) {
            Ok(w) => {
                self.remaining -= 1;
                self.next_addr += self.idsz + 1 + w as i64;
                Some(Ok(entry))
            }
            Err(e) => {
                self.remaining = 0;
                Some(Err(e))
            }
        }
    }
}

/// Iterates a [`ClassRecord`]'s instance field descriptors.
pub struct InstanceFieldDescriptors<'s> {
    source: &'s Source,
    next_addr: i64,
    remaining: u16,
    idsz: i64,
}

impl<'s> Iterator for InstanceFieldDescriptors<'s> {
    type Item = Result<InstanceFieldDescriptor<'s>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let entry = InstanceFieldDescriptor {
            source: self.source,
            address: self.next_addr,
            idsz: self.idsz,
        };
        self.remaining -= 1;
        self.next_addr += self.idsz + 1;
        Some(Ok(entry))
    }
}

/// A class's identity, plus its constant pool, static fields, and instance
/// field layout (spec's supplemental feature 1).
#[derive(Copy, Clone)]
pub struct ClassRecord<'s> {
    sub: SubRecord<'s>,
}

impl<'s> ClassRecord<'s> {
    pub(crate) fn new(sub: SubRecord<'s>) -> Result<ClassRecord<'s>> {
        Ok(ClassRecord { sub })
    }

    fn source(&self) -> &'s Source {
        self.sub.source_handle()
    }

    fn idsz(&self) -> i64 {
        self.source().id_size().size_in_bytes() as i64
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

    pub fn super_class_obj_id(&self) -> Result<u64> {
        self.source()
            .id(self.sub.address() as i64 + self.layout().offset("SUPER_OBJID") as i64)
    }

    pub fn class_loader_obj_id(&self) -> Result<u64> {
        self.source()
            .id(self.sub.address() as i64 + self.layout().offset("LOADER_OBJID") as i64)
    }

    pub fn signers_obj_id(&self) -> Result<u64> {
        self.source()
            .id(self.sub.address() as i64 + self.layout().offset("SIGNERS_OBJID") as i64)
    }

    pub fn protection_domain_obj_id(&self) -> Result<u64> {
        self.source().id(
            self.sub.address() as i64 + self.layout().offset("PROTECTION_DOMAIN_OBJID") as i64,
        )
    }

    pub fn instance_size(&self) -> Result<u32> {
        self.source()
            .uint32(self.sub.address() as i64 + self.layout().offset("INSTANCE_SIZE") as i64)
    }

    pub fn render(&self) -> Result<String> {
        Ok(format!("Class(objid=0x{:x})", self.obj_id()?))
    }

    fn cp_count(&self) -> Result<u16> {
        self.source()
            .ushort(self.sub.address() as i64 + self.layout().offset("CP_COUNT") as i64)
    }

    pub fn constant_pool_entries(&self) -> Result<ConstantPoolEntries<'s>> {
        Ok(ConstantPoolEntries {
            source: self.source(),
            next_addr: self.sub.address() as i64 + self.layout().offset("CP_ENTRIES") as i64,
            remaining: self.cp_count()?,
            idsz: self.idsz(),
        })
    }

    fn after_cp(&self) -> Result<i64> {
        let idsz = self.idsz();
        let mut cursor = self.sub.address() as i64 + self.layout().offset("CP_ENTRIES") as i64;
        for _ in 0..self.cp_count()? {
            let type_code = self.source().byte(cursor + 2)?;
            cursor += 3 + field_width(type_code, idsz as u64)? as i64;
        }
        Ok(cursor)
    }

    pub fn static_fields(&self) -> Result<StaticFields<'s>> {
        let idsz = self.idsz();
        let addr = self.after_cp()?;
        let count = self.source().ushort(addr)?;
        Ok(StaticFields {
            source: self.source(),
            next_addr: addr + 2,
            remaining: count,
            idsz,
        })
    }

    fn after_static(&self) -> Result<i64> {
        let idsz = self.idsz();
        let mut cursor = self.after_cp()?;
        let static_count = self.source().ushort(cursor)?;
        cursor += 2;
        for _ in 0..static_count {
            let type_code = self.source().byte(cursor + idsz)?;
            cursor += idsz + 1 + field_width(type_code, idsz as u64)? as i64;
        }
        Ok(cursor)
    }

    pub fn instance_field_descriptors(&self) -> Result<InstanceFieldDescriptors<'s>> {
        let idsz = self.idsz();
        let addr = self.after_static()?;
        let count = self.source().ushort(addr)?;
        Ok(InstanceFieldDescriptors {
            source: self.source(),
            next_addr: addr + 2,
            remaining: count,
            idsz,
        })
    }
}
