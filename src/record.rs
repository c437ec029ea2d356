//! Top-level records: tag dispatch, the lazy [`Records`] stream, and per-variant
//! façades (spec §4.3, §4.4).

use log::warn;
use strum_macros::EnumIter;

use crate::error::{Error, Result};
use crate::layout::{Layout, Width};
use crate::source::Source;

/// What kind of data a [`Record`] holds. Closed set, plus [`RecordTag::Unhandled`]
/// for any tag byte this crate doesn't otherwise name (spec §4.4).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, EnumIter)]
pub enum RecordTag {
    Utf8,
    LoadClass,
    UnloadClass,
    StackFrame,
    StackTrace,
    AllocSites,
    HeapSummary,
    StartThread,
    EndThread,
    HeapDump,
    CpuSamples,
    ControlSettings,
    HeapDumpSegment,
    HeapDumpEnd,
    /// A tag byte not in the closed set above. Still a valid record: tag,
    /// length, timestamp, and raw body are all available.
    Unhandled,
}

impl RecordTag {
    fn from_tag_byte(b: u8) -> RecordTag {
        match b {
            0x01 => RecordTag::Utf8,
            0x02 => RecordTag::LoadClass,
            0x03 => RecordTag::UnloadClass,
            0x04 => RecordTag::StackFrame,
            0x05 => RecordTag::StackTrace,
            0x06 => RecordTag::AllocSites,
            0x07 => RecordTag::HeapSummary,
            0x0A => RecordTag::StartThread,
            0x0B => RecordTag::EndThread,
            0x0C => RecordTag::HeapDump,
            0x0D => RecordTag::CpuSamples,
            0x0E => RecordTag::ControlSettings,
            0x1C => RecordTag::HeapDumpSegment,
            0x2C => RecordTag::HeapDumpEnd,
            _ => RecordTag::Unhandled,
        }
    }
}

/// A top-level record: a `(source, address)` handle. Every field is computed
/// on demand from `source`; nothing is decoded or cached at construction time.
#[derive(Copy, Clone)]
pub struct Record<'s> {
    source: &'s Source,
    address: u64,
}

impl<'s> PartialEq for Record<'s> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.source, other.source) && self.address == other.address
    }
}
impl<'s> Eq for Record<'s> {}

impl<'s> std::hash::Hash for Record<'s> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        (self.source as *const Source as usize).hash(state);
        self.address.hash(state);
    }
}

impl<'s> Record<'s> {
    pub(crate) fn new(source: &'s Source, address: u64) -> Record<'s> {
        Record { source, address }
    }

    pub fn address(&self) -> u64 {
        self.address
    }

    pub(crate) fn source_handle(&self) -> &'s Source {
        self.source
    }

    pub fn tag(&self) -> Result<RecordTag> {
        self.tag_byte().map(RecordTag::from_tag_byte)
    }

    fn tag_byte(&self) -> Result<u8> {
        self.source.byte(self.address as i64)
    }

    /// The id this record's variant is keyed by, if it has one (spec §3).
    /// Errors for variants that carry no id, rather than guessing.
    pub fn id(&self) -> Result<u64> {
        match self.view()? {
            RecordView::Utf8(u) => u.name_id(),
            RecordView::LoadClass(l) => l.class_obj_id(),
            RecordView::StackFrame(f) => f.id(),
            RecordView::StackTrace(_) => Err(Error::Unsupported(
                "StackTrace records have no id".to_string(),
            )),
            RecordView::HeapDumpSegment(_) => Err(Error::Unsupported(
                "HeapDumpSegment records have no id".to_string(),
            )),
            RecordView::Unhandled(_) => Err(Error::Unsupported(
                "this record variant has no id".to_string(),
            )),
        }
    }

    /// Microseconds since [`Source::starttime_millis`].
    pub fn relative_timestamp_micros(&self) -> Result<u32> {
        self.source.uint32(self.address as i64 + 1)
    }

    /// This record's absolute timestamp, at millisecond precision.
    pub fn timestamp_millis(&self) -> Result<u64> {
        let micros = self.relative_timestamp_micros()?;
        Ok(self.source.starttime_millis() + (micros as u64) / 1000)
    }

    /// `9 + body_len`: the prelude (tag, timestamp, length) plus the body.
    pub fn length(&self) -> Result<u64> {
        let body_len = self.source.uint32(self.address as i64 + 5)?;
        Ok(9 + body_len as u64)
    }

    fn body_addr(&self) -> i64 {
        self.address as i64 + 9
    }

    pub fn body(&self) -> Result<Vec<u8>> {
        let len = self.length()? as i64 - 9;
        self.source.bytes(self.body_addr(), len)
    }

    /// `Some` iff [`Record::tag`] is [`RecordTag::Utf8`].
    pub fn as_utf8(&self) -> Option<Result<Utf8<'s>>> {
        self.if_tag(RecordTag::Utf8, Utf8::new)
    }

    /// `Some` iff [`Record::tag`] is [`RecordTag::LoadClass`].
    pub fn as_load_class(&self) -> Option<Result<LoadClass<'s>>> {
        self.if_tag(RecordTag::LoadClass, LoadClass::new)
    }

    /// `Some` iff [`Record::tag`] is [`RecordTag::StackFrame`].
    pub fn as_stack_frame(&self) -> Option<Result<StackFrame<'s>>> {
        self.if_tag(RecordTag::StackFrame, StackFrame::new)
    }

    /// `Some` iff [`Record::tag`] is [`RecordTag::StackTrace`].
    pub fn as_stack_trace(&self) -> Option<Result<StackTrace<'s>>> {
        self.if_tag(RecordTag::StackTrace, StackTrace::new)
    }

    /// `Some` iff [`Record::tag`] is [`RecordTag::HeapDump`] or [`RecordTag::HeapDumpSegment`].
    pub fn as_heap_dump_segment(&self) -> Option<Result<crate::heap_dump::HeapDumpSegment<'s>>> {
        match self.tag() {
            Ok(RecordTag::HeapDump) | Ok(RecordTag::HeapDumpSegment) => {
                Some(crate::heap_dump::HeapDumpSegment::new(*self))
            }
            Ok(_) => None,
            Err(e) => Some(Err(e)),
        }
    }

    fn if_tag<T>(&self, want: RecordTag, build: impl FnOnce(Record<'s>) -> Result<T>) -> Option<Result<T>> {
        match self.tag() {
            Ok(t) if t == want => Some(build(*self)),
            Ok(_) => None,
            Err(e) => Some(Err(e)),
        }
    }

    /// A closed sum-type view of this record's variant, built from the same
    /// dispatch as [`Record::tag`]. Unknown tags become [`RecordView::Unhandled`].
    pub fn view(&self) -> Result<RecordView<'s>> {
        Ok(match self.tag()? {
            RecordTag::Utf8 => RecordView::Utf8(Utf8::new(*self)?),
            RecordTag::LoadClass => RecordView::LoadClass(LoadClass::new(*self)?),
            RecordTag::StackFrame => RecordView::StackFrame(StackFrame::new(*self)?),
            RecordTag::StackTrace => RecordView::StackTrace(StackTrace::new(*self)?),
            RecordTag::HeapDump | RecordTag::HeapDumpSegment => {
                RecordView::HeapDumpSegment(crate::heap_dump::HeapDumpSegment::new(*self)?)
            }
            _ => RecordView::Unhandled(*self),
        })
    }

    /// `TypeName( hex hex hex … )`, the first 32 body bytes grouped in 4-byte
    /// words, with an ellipsis if the body is longer (spec §4.4).
    pub fn render(&self, type_name: &str) -> Result<String> {
        render_hex_dump(type_name, &self.body()?)
    }
}

pub(crate) fn render_hex_dump(type_name: &str, body: &[u8]) -> Result<String> {
    let shown = &body[..body.len().min(32)];
    let words: Vec<String> = shown.chunks(4).map(hex::encode).collect();
    let mut s = format!("{type_name}( {}", words.join(" "));
    if body.len() > 32 {
        s.push_str(" ...");
    }
    s.push_str(" )");
    Ok(s)
}

mod hex {
    pub fn encode(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }
}

/// A closed sum type over every top-level record variant (spec §9's
/// "tagged variants" redesign flag).
pub enum RecordView<'s> {
    Utf8(Utf8<'s>),
    LoadClass(LoadClass<'s>),
    StackFrame(StackFrame<'s>),
    StackTrace(StackTrace<'s>),
    HeapDumpSegment(crate::heap_dump::HeapDumpSegment<'s>),
    Unhandled(Record<'s>),
}

/// Lazily walks the top-level record stream following the header.
pub struct Records<'s> {
    source: &'s Source,
    next_addr: u64,
    end: u64,
    done: bool,
}

impl<'s> Records<'s> {
    pub(crate) fn new(source: &'s Source, start: u64) -> Records<'s> {
        Records {
            source,
            next_addr: start,
            end: source.len(),
            done: false,
        }
    }
}

impl<'s> Iterator for Records<'s> {
    type Item = Result<Record<'s>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.next_addr >= self.end {
            return None;
        }

        let record = Record::new(self.source, self.next_addr);
        let len = match record.length() {
            Ok(len) => len,
            Err(e) => {
                self.done = true;
                return Some(Err(e));
            }
        };
        let new_addr = self.next_addr + len;
        if new_addr > self.end {
            self.done = true;
            warn!(
                "record at {} declares length {} past end of records ({})",
                self.next_addr, len, self.end
            );
            return Some(Err(Error::Format(format!(
                "record at {} has length {} which extends past the end of the file (len {})",
                self.next_addr, len, self.end
            ))));
        }
        self.next_addr = new_addr;
        Some(Ok(record))
    }
}

static UTF8_LAYOUT: Layout = Layout::new(&[("NAME_ID", Width::Id), ("TEXT", Width::Fixed(0))]);

/// A UTF-8 blob record: `name_id:ID, text:rest`.
#[derive(Copy, Clone)]
pub struct Utf8<'s> {
    record: Record<'s>,
}

impl<'s> Utf8<'s> {
    fn new(record: Record<'s>) -> Result<Utf8<'s>> {
        Ok(Utf8 { record })
    }

    fn layout(&self) -> &'static crate::layout::ResolvedLayout {
        UTF8_LAYOUT.resolve(self.record.source.id_size())
    }

    pub fn name_id(&self) -> Result<u64> {
        self.record
            .source
            .id(self.record.body_addr() + self.layout().offset("NAME_ID") as i64)
    }

    fn text_addr(&self) -> i64 {
        self.record.body_addr() + self.layout().offset("TEXT") as i64
    }

    fn text_len(&self) -> Result<i64> {
        Ok(self.record.length()? as i64 - 9 - self.layout().offset("TEXT") as i64)
    }

    /// Note that in practice, there are non-empty `Utf8` records with invalid UTF-8 bytes.
    pub fn text_as_str(&self) -> Result<String> {
        self.record.source.utf8(self.text_addr(), self.text_len()?)
    }

    pub fn text_bytes(&self) -> Result<Vec<u8>> {
        self.record.source.bytes(self.text_addr(), self.text_len()?)
    }
}

static LOAD_CLASS_LAYOUT: Layout = Layout::new(&[
    ("CLASS_SERIAL", Width::Fixed(4)),
    ("CLASS_OBJID", Width::Id),
    ("STACK_TRACE_SERIAL", Width::Fixed(4)),
    ("CLASS_NAME_ID", Width::Id),
]);

/// `class_serial:u32, class_obj_id:ID, stack_trace_serial:u32, class_name_id:ID`.
#[derive(Copy, Clone)]
pub struct LoadClass<'s> {
    record: Record<'s>,
}

impl<'s> LoadClass<'s> {
    fn new(record: Record<'s>) -> Result<LoadClass<'s>> {
        Ok(LoadClass { record })
    }

    fn layout(&self) -> &'static crate::layout::ResolvedLayout {
        LOAD_CLASS_LAYOUT.resolve(self.record.source.id_size())
    }

    pub fn class_serial(&self) -> Result<u32> {
        self.record
            .source
            .uint32(self.record.body_addr() + self.layout().offset("CLASS_SERIAL") as i64)
    }

    pub fn class_obj_id(&self) -> Result<u64> {
        self.record
            .source
            .id(self.record.body_addr() + self.layout().offset("CLASS_OBJID") as i64)
    }

    pub fn stack_trace_serial(&self) -> Result<u32> {
        self.record
            .source
            .uint32(self.record.body_addr() + self.layout().offset("STACK_TRACE_SERIAL") as i64)
    }

    pub fn class_name_id(&self) -> Result<u64> {
        self.record
            .source
            .id(self.record.body_addr() + self.layout().offset("CLASS_NAME_ID") as i64)
    }
}

/// A line referenced from a [`StackFrame`].
#[derive(Copy, Clone, Debug)]
pub enum LineNum {
    Normal(u32),
    Unknown,
    CompiledMethod,
    NativeMethod,
}

impl LineNum {
    fn from_raw(num: i32) -> Result<LineNum> {
        Ok(match num {
            n if n > 0 => LineNum::Normal(n as u32),
            -1 => LineNum::Unknown,
            -2 => LineNum::CompiledMethod,
            -3 => LineNum::NativeMethod,
            other => return Err(Error::Format(format!("invalid line number {other}"))),
        })
    }
}

impl std::fmt::Display for LineNum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LineNum::Normal(n) => write!(f, "{n}"),
            LineNum::Unknown => write!(f, "Unknown"),
            LineNum::CompiledMethod => write!(f, "CompiledMethod"),
            LineNum::NativeMethod => write!(f, "NativeMethod"),
        }
    }
}

static STACK_FRAME_LAYOUT: Layout = Layout::new(&[
    ("ID", Width::Id),
    ("METHOD_NAME_ID", Width::Id),
    ("METHOD_SIGNATURE_ID", Width::Id),
    ("SOURCE_FILE_NAME_ID", Width::Id),
    ("CLASS_SERIAL", Width::Fixed(4)),
    ("LINE_NUM", Width::Fixed(4)),
]);

/// `id:ID, method_name_id:ID, method_signature_id:ID, source_file_name_id:ID,
/// class_serial:u32, line_num:i32`.
#[derive(Copy, Clone)]
pub struct StackFrame<'s> {
    record: Record<'s>,
}

impl<'s> StackFrame<'s> {
    fn new(record: Record<'s>) -> Result<StackFrame<'s>> {
        Ok(StackFrame { record })
    }

    fn layout(&self) -> &'static crate::layout::ResolvedLayout {
        STACK_FRAME_LAYOUT.resolve(self.record.source.id_size())
    }

    pub fn id(&self) -> Result<u64> {
        self.record
            .source
            .id(self.record.body_addr() + self.layout().offset("ID") as i64)
    }

    pub fn method_name_id(&self) -> Result<u64> {
        self.record
            .source
            .id(self.record.body_addr() + self.layout().offset("METHOD_NAME_ID") as i64)
    }

    pub fn method_signature_id(&self) -> Result<u64> {
        self.record
            .source
            .id(self.record.body_addr() + self.layout().offset("METHOD_SIGNATURE_ID") as i64)
    }

    pub fn source_file_name_id(&self) -> Result<u64> {
        self.record
            .source
            .id(self.record.body_addr() + self.layout().offset("SOURCE_FILE_NAME_ID") as i64)
    }

    pub fn class_serial(&self) -> Result<u32> {
        self.record
            .source
            .uint32(self.record.body_addr() + self.layout().offset("CLASS_SERIAL") as i64)
    }

    pub fn line_num(&self) -> Result<LineNum> {
        let raw = self
            .record
            .source
            .int32(self.record.body_addr() + self.layout().offset("LINE_NUM") as i64)?;
        LineNum::from_raw(raw)
    }
}

static STACK_TRACE_LAYOUT: Layout = Layout::new(&[
    ("STACK_TRACE_SERIAL", Width::Fixed(4)),
    ("THREAD_SERIAL", Width::Fixed(4)),
    ("NUM_FRAME_IDS", Width::Fixed(4)),
    ("FRAME_IDS", Width::Fixed(0)),
]);

/// `stack_trace_serial:u32, thread_serial:u32, num_frame_ids:u32, frame_ids:[ID; num_frame_ids]`.
#[derive(Copy, Clone)]
pub struct StackTrace<'s> {
    record: Record<'s>,
}

impl<'s> StackTrace<'s> {
    fn new(record: Record<'s>) -> Result<StackTrace<'s>> {
        Ok(StackTrace { record })
    }

    fn layout(&self) -> &'static crate::layout::ResolvedLayout {
        STACK_TRACE_LAYOUT.resolve(self.record.source.id_size())
    }

    pub fn stack_trace_serial(&self) -> Result<u32> {
        self.record
            .source
            .uint32(self.record.body_addr() + self.layout().offset("STACK_TRACE_SERIAL") as i64)
    }

    pub fn thread_serial(&self) -> Result<u32> {
        self.record
            .source
            .uint32(self.record.body_addr() + self.layout().offset("THREAD_SERIAL") as i64)
    }

    pub fn num_frame_ids(&self) -> Result<u32> {
        self.record
            .source
            .uint32(self.record.body_addr() + self.layout().offset("NUM_FRAME_IDS") as i64)
    }

    /// Lazily decode the trailing `ID` array.
    pub fn frame_ids(&self) -> Result<FrameIds<'s>> {
        Ok(FrameIds {
            source: self.record.source,
            next_addr: self.record.body_addr() + self.layout().offset("FRAME_IDS") as i64,
            remaining: self.num_frame_ids()?,
        })
    }
}

/// Iterator over a [`StackTrace`]'s frame ids.
pub struct FrameIds<'s> {
    source: &'s Source,
    next_addr: i64,
    remaining: u32,
}

impl<'s> Iterator for FrameIds<'s> {
    type Item = Result<u64>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let id = self.source.id(self.next_addr);
        self.next_addr += self.source.id_size().size_in_bytes() as i64;
        self.remaining -= 1;
        Some(id)
    }
}
