//! Object-stream packing and the cross-reference stream.
//!
//! Full-compression output packs non-stream indirect objects into `ObjStm`
//! containers: a pair table of `number offset` entries followed by the object
//! bodies, the whole payload going through the normal stream pipeline. The
//! cross-reference table is then itself a stream with fixed-width binary
//! fields.

use crate::names::Name;
use crate::objects::{Array, Dictionary, Object, Stream};
use std::collections::BTreeMap;

/// Objects per container; a full container is flushed and a new one started.
pub const OBJECT_STREAM_CAPACITY: usize = 200;

/// Accumulates objects for one `ObjStm` container.
pub(crate) struct ObjectStreamBuilder {
    entries: Vec<(u32, Vec<u8>)>,
}

impl ObjectStreamBuilder {
    pub(crate) fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn is_full(&self) -> bool {
        self.entries.len() >= OBJECT_STREAM_CAPACITY
    }

    /// Adds a serialized object body; returns its index within the
    /// container.
    pub(crate) fn push(&mut self, number: u32, body: Vec<u8>) -> u32 {
        self.entries.push((number, body));
        (self.entries.len() - 1) as u32
    }

    /// Assembles the container stream: the `number offset` pair table, then
    /// the bodies at their stated offsets.
    pub(crate) fn build(self) -> Stream {
        let mut table = Vec::new();
        let mut bodies = Vec::new();
        for (number, body) in &self.entries {
            table.extend_from_slice(format!("{number} {} ", bodies.len()).as_bytes());
            bodies.extend_from_slice(body);
            bodies.push(b'\n');
        }

        let mut dict = Dictionary::new();
        dict.set("Type", Name::new("ObjStm"));
        dict.set("N", self.entries.len() as i64);
        dict.set("First", table.len() as i64);

        let mut data = table;
        data.extend_from_slice(&bodies);
        Stream::with_dictionary(dict, data)
    }
}

/// One cross-reference entry, in xref-stream field terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum XrefEntry {
    /// Type 0: not in use.
    Free,
    /// Type 1: written inline at `offset`.
    InUse { offset: u64, generation: u16 },
    /// Type 2: packed into object stream `container` at `index`.
    Compressed { container: u32, index: u32 },
}

/// Collects entries keyed by object number for either layout.
pub(crate) struct XrefBuilder {
    entries: BTreeMap<u32, XrefEntry>,
}

impl XrefBuilder {
    pub(crate) fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    pub(crate) fn set(&mut self, number: u32, entry: XrefEntry) {
        self.entries.insert(number, entry);
    }

    pub(crate) fn get(&self, number: u32) -> Option<XrefEntry> {
        self.entries.get(&number).copied()
    }

    pub(crate) fn max_number(&self) -> u32 {
        self.entries.keys().next_back().copied().unwrap_or(0)
    }

    /// Classic `xref` section body: one subsection from 0 to the highest
    /// number, gaps emitted as free entries.
    pub(crate) fn classic_section(&self) -> Vec<u8> {
        let max = self.max_number();
        let mut out = Vec::new();
        out.extend_from_slice(b"xref\n");
        out.extend_from_slice(format!("0 {}\n", max + 1).as_bytes());
        out.extend_from_slice(b"0000000000 65535 f \n");
        for number in 1..=max {
            match self.entries.get(&number) {
                Some(XrefEntry::InUse { offset, generation }) => {
                    out.extend_from_slice(format!("{offset:010} {generation:05} n \n").as_bytes());
                }
                // Compressed entries cannot be expressed in the classic
                // table; callers only build one per layout.
                _ => out.extend_from_slice(b"0000000000 00000 f \n"),
            }
        }
        out
    }

    /// Cross-reference stream payload with field widths `[1, 8, 2]`,
    /// big-endian, one row per object number from 0 to `size - 1`. The
    /// eight-byte middle field carries full 64-bit offsets, so outputs past
    /// 4 GiB keep exact positions.
    pub(crate) fn to_stream(&self, size: u32, root: Object) -> Stream {
        let mut data = Vec::with_capacity(size as usize * 11);
        for number in 0..size {
            let entry = if number == 0 {
                XrefEntry::Free
            } else {
                self.entries
                    .get(&number)
                    .copied()
                    .unwrap_or(XrefEntry::Free)
            };
            match entry {
                XrefEntry::Free => {
                    data.push(0);
                    data.extend_from_slice(&0u64.to_be_bytes());
                    data.extend_from_slice(&0xffffu16.to_be_bytes());
                }
                XrefEntry::InUse { offset, generation } => {
                    data.push(1);
                    data.extend_from_slice(&offset.to_be_bytes());
                    data.extend_from_slice(&generation.to_be_bytes());
                }
                XrefEntry::Compressed { container, index } => {
                    data.push(2);
                    data.extend_from_slice(&u64::from(container).to_be_bytes());
                    data.extend_from_slice(&(index as u16).to_be_bytes());
                }
            }
        }

        let mut dict = Dictionary::new();
        dict.set("Type", Name::new("XRef"));
        dict.set("Size", size as i64);
        let mut widths = Array::with_capacity(3);
        widths.push(1i64);
        widths.push(8i64);
        widths.push(2i64);
        dict.set("W", widths);
        let mut index = Array::with_capacity(2);
        index.push(0i64);
        index.push(size as i64);
        dict.set("Index", index);
        dict.set("Root", root);

        Stream::with_dictionary(dict, data)
    }
}
