//! `PRIMITIVE ARRAY DUMP` subrecords (spec §4.5, tag `0x23`).
//!
//! Grounded on the teacher's `iterator_method!`/`iter_struct!` macro pair in
//! `examples/sudssf-jvm-hprof-rs/src/heap_dump/primitive_array.rs`, adapted
//! from nom-slice consumption to address-based reads.

use crate::error::{Error, Result};
use crate::heap_dump::{primitive_type_name, primitive_width, SubRecord};
use crate::layout::{Layout, Width};
use crate::source::Source;

static LAYOUT: Layout = Layout::new(&[
    ("TAG", Width::Fixed(1)),
    ("OBJID", Width::Id),
    ("STACKTRACE_SERIAL", Width::Fixed(4)),
    ("NUM_ELEMENTS", Width::Fixed(4)),
    ("ELEM_TYPE", Width::Fixed(1)),
    ("ELEMENTS", Width::Fixed(0)),
]);

pub(crate) fn length(source: &Source, address: u64) -> Result<u64> {
    let layout = LAYOUT.resolve(source.id_size());
    let count = source.uint32(address as i64 + layout.offset("NUM_ELEMENTS") as i64)? as u64;
    let elem_type = source.byte(address as i64 + layout.offset("ELEM_TYPE") as i64)?;
    let width = primitive_width(elem_type)?;
    Ok(layout.offset("ELEMENTS") + count * width)
}

fn read_bool(s: &Source, a: i64) -> Result<bool> {
    Ok(s.byte(a)? != 0)
}
fn read_char(s: &Source, a: i64) -> Result<u16> {
    s.ushort(a)
}
fn read_float(s: &Source, a: i64) -> Result<f32> {
    Ok(f32::from_bits(s.uint32(a)?))
}
fn read_double(s: &Source, a: i64) -> Result<f64> {
    let hi = s.uint32(a)? as u64;
    let lo = s.uint32(a + 4)? as u64;
    Ok(f64::from_bits((hi << 32) | lo))
}
fn read_byte(s: &Source, a: i64) -> Result<i8> {
    Ok(s.byte(a)? as i8)
}
fn read_short(s: &Source, a: i64) -> Result<i16> {
    Ok(s.ushort(a)? as i16)
}
fn read_int(s: &Source, a: i64) -> Result<i32> {
    s.int32(a)
}
fn read_long(s: &Source, a: i64) -> Result<i64> {
    let hi = s.uint32(a)? as u64;
    let lo = s.uint32(a + 4)? as u64;
    Ok(((hi << 32) | lo) as i64)
}

/// Lazily decodes one [`PrimitiveArray`]'s elements as `T`.
pub struct PrimitiveElements<'s, T> {
    source: &'s Source,
    next_addr: i64,
    remaining: u64,
    width: i64,
    read: fn(&Source, i64) -> Result<T>,
}

impl<'s, T> Iterator for PrimitiveElements<'s, T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let addr = self.next_addr;
        self.next_addr += self.width;
        Some((self.read)(self.source, addr))
    }
}

/// A homogeneous array of a single Java primitive type.
#[derive(Copy, Clone)]
pub struct PrimitiveArray<'s> {
    sub: SubRecord<'s>,
}

macro_rules! typed_iter {
    ($method:ident, $type_code:expr, $ty:ty, $read:expr) => {
        /// Iterate the elements, erroring if this array doesn't hold this type.
        pub fn $method(&self) -> Result<PrimitiveElements<'s, $ty>> {
            self.check_type($type_code)?;
            Ok(PrimitiveElements {
                source: self.source(),
                next_addr: self.elements_addr(),
                remaining: self.num_elements()? as u64,
                width: primitive_width($type_code)? as i64,
                read: $read,
            })
        }
    };
}

impl<'s> PrimitiveArray<'s> {
    pub(crate) fn new(sub: SubRecord<'s>) -> Result<PrimitiveArray<'s>> {
        Ok(PrimitiveArray { sub })
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

    pub fn num_elements(&self) -> Result<u32> {
        self.source()
            .uint32(self.sub.address() as i64 + self.layout().offset("NUM_ELEMENTS") as i64)
    }

    pub fn elem_type_code(&self) -> Result<u8> {
        self.source()
            .byte(self.sub.address() as i64 + self.layout().offset("ELEM_TYPE") as i64)
    }

    fn elements_addr(&self) -> i64 {
        self.sub.address() as i64 + self.layout().offset("ELEMENTS") as i64
    }

    fn check_type(&self, want: u8) -> Result<()> {
        let got = self.elem_type_code()?;
        if got != want {
            return Err(Error::InvalidArgument(format!(
                "array holds type code {got:#04x}, not {want:#04x}"
            )));
        }
        Ok(())
    }

    typed_iter!(booleans, 0x04, bool, read_bool);
    typed_iter!(chars, 0x05, u16, read_char);
    typed_iter!(floats, 0x06, f32, read_float);
    typed_iter!(doubles, 0x07, f64, read_double);
    typed_iter!(bytes, 0x08, i8, read_byte);
    typed_iter!(shorts, 0x09, i16, read_short);
    typed_iter!(ints, 0x0A, i32, read_int);
    typed_iter!(longs, 0x0B, i64, read_long);

    pub fn render(&self) -> Result<String> {
        Ok(format!(
            "{}[{}](objid=0x{:x})",
            primitive_type_name(self.elem_type_code()?)?,
            self.num_elements()?,
            self.obj_id()?
        ))
    }
}
