//! Declarative record-body layouts (spec §4.2): a named, ordered sequence of
//! slots whose widths are either a fixed byte count or `ID` (resolved against
//! the file's `idsize`). Grounded on the `AutoOffsets`/`idoffset` calls in
//! `examples/original_source/hprof/heap/_objectrecord.py` and
//! `examples/original_source/hprof/heaprecord/heapdumpinfo.py` (the module
//! that defines `AutoOffsets` itself isn't among the kept `original_source/`
//! files, but both call sites show the same named-slot, `idoffset`-as-ID
//! shape this type reimplements as a Rust value memoized per `IdSize`).

use once_cell::sync::OnceCell;

use crate::source::IdSize;

/// The width of a single layout slot.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Width {
    Fixed(u64),
    Id,
}

impl Width {
    fn resolve(self, idsize: IdSize) -> u64 {
        match self {
            Width::Fixed(n) => n,
            Width::Id => idsize.size_in_bytes() as u64,
        }
    }
}

/// A named sequence of slots. `idsize`-independent; call [`Layout::resolve`]
/// to get absolute offsets for a particular file.
pub struct Layout {
    slots: &'static [(&'static str, Width)],
    cache: [OnceCell<ResolvedLayout>; 2],
}

impl Layout {
    pub const fn new(slots: &'static [(&'static str, Width)]) -> Layout {
        Layout {
            slots,
            cache: [OnceCell::new(), OnceCell::new()],
        }
    }

    /// Resolve this layout's slots into absolute offsets for the given `idsize`.
    /// Memoized: resolving the same layout against the same `idsize` twice
    /// does the arithmetic once.
    pub fn resolve(&self, idsize: IdSize) -> &ResolvedLayout {
        self.cache[idsize as usize].get_or_init(|| {
            let mut offsets = Vec::with_capacity(self.slots.len());
            let mut total = 0u64;
            for &(name, width) in self.slots {
                offsets.push((name, total));
                total += width.resolve(idsize);
            }
            ResolvedLayout { offsets, total }
        })
    }
}

/// Offsets for every named slot in a [`Layout`], plus the layout's total size,
/// for one particular `idsize`.
pub struct ResolvedLayout {
    offsets: Vec<(&'static str, u64)>,
    total: u64,
}

impl ResolvedLayout {
    /// The offset of a named slot, relative to the layout's base address.
    ///
    /// Panics if `name` isn't a slot in this layout — that's a programming
    /// error in this crate, not a malformed-input error a caller can hit.
    pub fn offset(&self, name: &str) -> u64 {
        self.offsets
            .iter()
            .find(|&&(n, _)| n == name)
            .unwrap_or_else(|| panic!("no such layout slot: {name}"))
            .1
    }

    /// The total size of the layout (sum of all slot widths).
    pub fn total(&self) -> u64 {
        self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static OBJ_ROOT: Layout = Layout::new(&[("OBJID", Width::Id)]);

    static GLOBAL_JNI_ROOT: Layout =
        Layout::new(&[("OBJID", Width::Id), ("GREFID", Width::Id)]);

    #[test]
    fn resolves_offsets_for_both_idsizes() {
        let r32 = OBJ_ROOT.resolve(IdSize::U32);
        assert_eq!(r32.offset("OBJID"), 0);
        assert_eq!(r32.total(), 4);

        let r64 = GLOBAL_JNI_ROOT.resolve(IdSize::U64);
        assert_eq!(r64.offset("OBJID"), 0);
        assert_eq!(r64.offset("GREFID"), 8);
        assert_eq!(r64.total(), 16);
    }

    #[test]
    fn resolution_is_memoized() {
        let a = OBJ_ROOT.resolve(IdSize::U32) as *const _;
        let b = OBJ_ROOT.resolve(IdSize::U32) as *const _;
        assert_eq!(a, b);
    }
}
