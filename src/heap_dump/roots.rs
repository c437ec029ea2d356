//! GC root subrecords (spec §4.5 rows tagged `0xFF,0x01..0x05,0x08,0x89,0x8D`).
//!
//! Grounded on `examples/original_source/tests/test_roots.py` for the byte
//! layouts and `Display` strings, and on the teacher's dead `HeapDumpRecord`
//! enum in `examples/sudssf-jvm-hprof-rs/src/heap_dump.rs` for variant naming.

use crate::error::Result;
use crate::heap_dump::{SubRecord, SubRecordTag};
use crate::layout::{Layout, Width};

static OBJID_ONLY: Layout = Layout::new(&[("TAG", Width::Fixed(1)), ("OBJID", Width::Id)]);

fn obj_id(sub: &SubRecord) -> Result<u64> {
    let layout = OBJID_ONLY.resolve(sub.source_handle().id_size());
    sub.source_handle()
        .id(sub.address() as i64 + layout.offset("OBJID") as i64)
}

macro_rules! simple_root {
    ($name:ident, $display:expr) => {
        #[doc = "An objid-only GC root."]
        #[derive(Copy, Clone)]
        pub struct $name<'s> {
            sub: SubRecord<'s>,
        }

        impl<'s> $name<'s> {
            fn new(sub: SubRecord<'s>) -> Result<$name<'s>> {
                Ok($name { sub })
            }

            /// The object this root keeps alive.
            pub fn obj_id(&self) -> Result<u64> {
                obj_id(&self.sub)
            }

            pub fn render(&self) -> Result<String> {
                Ok(format!("{}(objid=0x{:x})", $display, self.obj_id()?))
            }
        }
    };
}

simple_root!(UnknownRoot, "UnknownRoot");
simple_root!(StickyClassRoot, "StickyClassRoot");
simple_root!(InternedStringRoot, "InternedStringRoot");
simple_root!(VmInternalRoot, "VmInternalRoot");

static GLOBAL_JNI_LAYOUT: Layout = Layout::new(&[
    ("TAG", Width::Fixed(1)),
    ("OBJID", Width::Id),
    ("GREFID", Width::Id),
]);

/// `objid:ID, grefid:ID`. Unlike the other roots, this one has a second id:
/// [`GlobalJniRoot::grefid`] is a distinct accessor rather than overloading
/// the generic `id` (spec §9, open question ii).
#[derive(Copy, Clone)]
pub struct GlobalJniRoot<'s> {
    sub: SubRecord<'s>,
}

impl<'s> GlobalJniRoot<'s> {
    fn new(sub: SubRecord<'s>) -> Result<GlobalJniRoot<'s>> {
        Ok(GlobalJniRoot { sub })
    }

    pub fn obj_id(&self) -> Result<u64> {
        obj_id(&self.sub)
    }

    /// The global JNI reference id, distinct from `obj_id`.
    pub fn grefid(&self) -> Result<u64> {
        let layout = GLOBAL_JNI_LAYOUT.resolve(self.sub.source_handle().id_size());
        self.sub
            .source_handle()
            .id(self.sub.address() as i64 + layout.offset("GREFID") as i64)
    }

    pub fn render(&self) -> Result<String> {
        Ok(format!(
            "GlobalJniRoot(objid=0x{:x}, grefid=0x{:x})",
            self.obj_id()?,
            self.grefid()?
        ))
    }
}

static JNI_FRAME_LAYOUT: Layout = Layout::new(&[
    ("TAG", Width::Fixed(1)),
    ("OBJID", Width::Id),
    ("THREAD_SERIAL", Width::Fixed(4)),
    ("FRAME_INDEX", Width::Fixed(4)),
]);

/// `objid:ID, thread_serial:u32, frame_index:u32`.
#[derive(Copy, Clone)]
pub struct LocalJniRoot<'s> {
    sub: SubRecord<'s>,
}

impl<'s> LocalJniRoot<'s> {
    fn new(sub: SubRecord<'s>) -> Result<LocalJniRoot<'s>> {
        Ok(LocalJniRoot { sub })
    }

    pub fn obj_id(&self) -> Result<u64> {
        obj_id(&self.sub)
    }

    pub fn thread_serial(&self) -> Result<u32> {
        let layout = JNI_FRAME_LAYOUT.resolve(self.sub.source_handle().id_size());
        self.sub
            .source_handle()
            .uint32(self.sub.address() as i64 + layout.offset("THREAD_SERIAL") as i64)
    }

    pub fn frame_index(&self) -> Result<u32> {
        let layout = JNI_FRAME_LAYOUT.resolve(self.sub.source_handle().id_size());
        self.sub
            .source_handle()
            .uint32(self.sub.address() as i64 + layout.offset("FRAME_INDEX") as i64)
    }

    pub fn render(&self) -> Result<String> {
        Ok(format!("LocalJniRoot(objid=0x{:x}) in <func>", self.obj_id()?))
    }
}

/// `objid:ID, thread_serial:u32, frame_index:u32`. Binary twin of
/// [`LocalJniRoot`], different tag and meaning.
#[derive(Copy, Clone)]
pub struct JavaStackRoot<'s> {
    sub: SubRecord<'s>,
}

impl<'s> JavaStackRoot<'s> {
    fn new(sub: SubRecord<'s>) -> Result<JavaStackRoot<'s>> {
        Ok(JavaStackRoot { sub })
    }

    pub fn obj_id(&self) -> Result<u64> {
        obj_id(&self.sub)
    }

    pub fn thread_serial(&self) -> Result<u32> {
        let layout = JNI_FRAME_LAYOUT.resolve(self.sub.source_handle().id_size());
        self.sub
            .source_handle()
            .uint32(self.sub.address() as i64 + layout.offset("THREAD_SERIAL") as i64)
    }

    pub fn frame_index(&self) -> Result<u32> {
        let layout = JNI_FRAME_LAYOUT.resolve(self.sub.source_handle().id_size());
        self.sub
            .source_handle()
            .uint32(self.sub.address() as i64 + layout.offset("FRAME_INDEX") as i64)
    }

    pub fn render(&self) -> Result<String> {
        Ok(format!("JavaStackRoot(objid=0x{:x}) in <func>", self.obj_id()?))
    }
}

static NATIVE_STACK_LAYOUT: Layout = Layout::new(&[
    ("TAG", Width::Fixed(1)),
    ("OBJID", Width::Id),
    ("THREAD_SERIAL", Width::Fixed(4)),
]);

/// `objid:ID, thread_serial:u32`.
#[derive(Copy, Clone)]
pub struct NativeStackRoot<'s> {
    sub: SubRecord<'s>,
}

impl<'s> NativeStackRoot<'s> {
    fn new(sub: SubRecord<'s>) -> Result<NativeStackRoot<'s>> {
        Ok(NativeStackRoot { sub })
    }

    pub fn obj_id(&self) -> Result<u64> {
        obj_id(&self.sub)
    }

    pub fn thread_serial(&self) -> Result<u32> {
        let layout = NATIVE_STACK_LAYOUT.resolve(self.sub.source_handle().id_size());
        self.sub
            .source_handle()
            .uint32(self.sub.address() as i64 + layout.offset("THREAD_SERIAL") as i64)
    }

    pub fn render(&self) -> Result<String> {
        Ok(format!(
            "NativeStackRoot(objid=0x{:x}) from thread ???",
            self.obj_id()?
        ))
    }
}

static THREAD_ROOT_LAYOUT: Layout = Layout::new(&[
    ("TAG", Width::Fixed(1)),
    ("OBJID", Width::Id),
    ("THREAD_SERIAL", Width::Fixed(4)),
    ("STACKTRACE_SERIAL", Width::Fixed(4)),
]);

/// `objid:ID, thread_serial:u32, stacktrace_serial:u32`.
#[derive(Copy, Clone)]
pub struct ThreadRoot<'s> {
    sub: SubRecord<'s>,
}

impl<'s> ThreadRoot<'s> {
    fn new(sub: SubRecord<'s>) -> Result<ThreadRoot<'s>> {
        Ok(ThreadRoot { sub })
    }

    pub fn obj_id(&self) -> Result<u64> {
        obj_id(&self.sub)
    }

    pub fn thread_serial(&self) -> Result<u32> {
        let layout = THREAD_ROOT_LAYOUT.resolve(self.sub.source_handle().id_size());
        self.sub
            .source_handle()
            .uint32(self.sub.address() as i64 + layout.offset("THREAD_SERIAL") as i64)
    }

    pub fn stacktrace_serial(&self) -> Result<u32> {
        let layout = THREAD_ROOT_LAYOUT.resolve(self.sub.source_handle().id_size());
        self.sub
            .source_handle()
            .uint32(self.sub.address() as i64 + layout.offset("STACKTRACE_SERIAL") as i64)
    }

    pub fn render(&self) -> Result<String> {
        Ok(format!(
            "ThreadRoot(objid=0x{:x}) from thread ???",
            self.obj_id()?
        ))
    }
}

/// A closed sum type over the nine GC root subrecord variants.
pub enum Root<'s> {
    Unknown(UnknownRoot<'s>),
    GlobalJni(GlobalJniRoot<'s>),
    LocalJni(LocalJniRoot<'s>),
    JavaStack(JavaStackRoot<'s>),
    NativeStack(NativeStackRoot<'s>),
    StickyClass(StickyClassRoot<'s>),
    Thread(ThreadRoot<'s>),
    InternedString(InternedStringRoot<'s>),
    VmInternal(VmInternalRoot<'s>),
}

impl<'s> Root<'s> {
    pub(crate) fn new(sub: SubRecord<'s>) -> Result<Root<'s>> {
        Ok(match sub.tag()? {
            SubRecordTag::UnknownRoot => Root::Unknown(UnknownRoot::new(sub)?),
            SubRecordTag::GlobalJniRoot => Root::GlobalJni(GlobalJniRoot::new(sub)?),
            SubRecordTag::LocalJniRoot => Root::LocalJni(LocalJniRoot::new(sub)?),
            SubRecordTag::JavaStackRoot => Root::JavaStack(JavaStackRoot::new(sub)?),
            SubRecordTag::NativeStackRoot => Root::NativeStack(NativeStackRoot::new(sub)?),
            SubRecordTag::StickyClassRoot => Root::StickyClass(StickyClassRoot::new(sub)?),
            SubRecordTag::ThreadRoot => Root::Thread(ThreadRoot::new(sub)?),
            SubRecordTag::InternedStringRoot => Root::InternedString(InternedStringRoot::new(sub)?),
            SubRecordTag::VmInternalRoot => Root::VmInternal(VmInternalRoot::new(sub)?),
            other => {
                return Err(crate::error::Error::Unsupported(format!(
                    "{other:?} is not a root variant"
                )))
            }
        })
    }

    /// The object this root keeps alive.
    pub fn obj_id(&self) -> Result<u64> {
        match self {
            Root::Unknown(r) => r.obj_id(),
            Root::GlobalJni(r) => r.obj_id(),
            Root::LocalJni(r) => r.obj_id(),
            Root::JavaStack(r) => r.obj_id(),
            Root::NativeStack(r) => r.obj_id(),
            Root::StickyClass(r) => r.obj_id(),
            Root::Thread(r) => r.obj_id(),
            Root::InternedString(r) => r.obj_id(),
            Root::VmInternal(r) => r.obj_id(),
        }
    }

    pub fn render(&self) -> Result<String> {
        match self {
            Root::Unknown(r) => r.render(),
            Root::GlobalJni(r) => r.render(),
            Root::LocalJni(r) => r.render(),
            Root::JavaStack(r) => r.render(),
            Root::NativeStack(r) => r.render(),
            Root::StickyClass(r) => r.render(),
            Root::Thread(r) => r.render(),
            Root::InternedString(r) => r.render(),
            Root::VmInternal(r) => r.render(),
        }
    }

    /// The generic `id` accessor (spec §3/§9 open question ii): only
    /// `GlobalJniRoot` has one, and it names its `grefid`, not its `obj_id`
    /// (ground truth: `examples/original_source/tests/test_roots.py::test_root_id`).
    /// Every other root variant errors, mentioning `id` in the message.
    pub fn id(&self) -> Result<u64> {
        match self {
            Root::GlobalJni(r) => r.grefid(),
            other => Err(crate::error::Error::Unsupported(format!(
                "{} roots have no id",
                other.variant_name()
            ))),
        }
    }

    fn variant_name(&self) -> &'static str {
        match self {
            Root::Unknown(_) => "UnknownRoot",
            Root::GlobalJni(_) => "GlobalJniRoot",
            Root::LocalJni(_) => "LocalJniRoot",
            Root::JavaStack(_) => "JavaStackRoot",
            Root::NativeStack(_) => "NativeStackRoot",
            Root::StickyClass(_) => "StickyClassRoot",
            Root::Thread(_) => "ThreadRoot",
            Root::InternedString(_) => "InternedStringRoot",
            Root::VmInternal(_) => "VmInternalRoot",
        }
    }
}
