//! Document context: the object arena and the indirect-object lifecycle.
//!
//! A [`Document`] owns every object that has been promoted to indirect. The
//! rest of the crate holds [`Reference`] handles into the arena, never the
//! objects themselves, so parent/child back-links cannot form ownership
//! cycles. Lifecycle state (flushed, read-only, ...) lives on the arena entry
//! and is a plain flag set, not per-variant behavior.

use crate::error::{PdfError, Result};
use crate::names::Name;
use crate::objects::{Dictionary, Object, ObjectId, Reference};
use bitflags::bitflags;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_DOCUMENT_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one document instance within the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocumentId(u64);

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "doc#{}", self.0)
    }
}

bitflags! {
    /// Lifecycle state of an arena entry.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ObjectFlags: u8 {
        /// The object must be written as an indirect object, never inlined.
        const MUST_BE_INDIRECT = 1 << 0;
        /// Serialized to the output; content has been released.
        const FLUSHED = 1 << 1;
        /// Structural singleton (e.g. the catalog); release is forbidden.
        const READ_ONLY = 1 << 2;
        /// Mutated since creation or load.
        const MODIFIED = 1 << 3;
        /// Reachable from a flushed object; the closure pass must write it.
        const MUST_FLUSH = 1 << 4;
    }
}

#[derive(Debug)]
pub(crate) struct ObjectEntry {
    pub(crate) generation: u16,
    pub(crate) object: Object,
    pub(crate) flags: ObjectFlags,
}

/// Per-copy-operation bookkeeping for cross-document copies.
///
/// Maps `(source document, object number)` to the reference already created
/// in the target, so shared sub-graphs are copied once and reference cycles
/// terminate. One context spans as many copy calls as the caller wants
/// deduplicated against each other.
#[derive(Debug, Default)]
pub struct CopyContext {
    copied: HashMap<(DocumentId, u32), Reference>,
}

impl CopyContext {
    pub fn new() -> Self {
        Self::default()
    }
}

/// The object arena plus object-number allocation and the catalog singleton.
pub struct Document {
    id: DocumentId,
    entries: BTreeMap<u32, ObjectEntry>,
    next_number: u32,
    catalog_number: u32,
}

impl Document {
    pub fn new() -> Self {
        let id = DocumentId(NEXT_DOCUMENT_ID.fetch_add(1, Ordering::Relaxed));
        let mut doc = Self {
            id,
            entries: BTreeMap::new(),
            next_number: 1,
            catalog_number: 0,
        };

        let mut catalog = Dictionary::new();
        catalog.set("Type", Name::new("Catalog"));
        let catalog_ref = doc.add_object(Object::Dictionary(catalog));
        doc.catalog_number = catalog_ref.number();
        doc.set_flags(catalog_ref.number(), ObjectFlags::READ_ONLY);
        doc
    }

    pub fn id(&self) -> DocumentId {
        self.id
    }

    pub fn catalog_ref(&self) -> Reference {
        // The catalog is created in new() and never removed.
        Reference::new(ObjectId::new(self.catalog_number, 0), self.id)
    }

    pub fn catalog(&self) -> Result<&Dictionary> {
        match self.entries.get(&self.catalog_number).map(|e| &e.object) {
            Some(Object::Dictionary(dict)) => Ok(dict),
            _ => Err(PdfError::Structure("catalog missing from object table".to_string())),
        }
    }

    pub fn catalog_mut(&mut self) -> Result<&mut Dictionary> {
        match self
            .entries
            .get_mut(&self.catalog_number)
            .map(|e| &mut e.object)
        {
            Some(Object::Dictionary(dict)) => Ok(dict),
            _ => Err(PdfError::Structure("catalog missing from object table".to_string())),
        }
    }

    pub fn is_catalog(&self, reference: Reference) -> bool {
        reference.document() == self.id && reference.number() == self.catalog_number
    }

    fn allocate(&mut self) -> u32 {
        let number = self.next_number;
        self.next_number += 1;
        number
    }

    /// Registers `object` in the arena and returns its reference.
    pub fn add_object(&mut self, object: Object) -> Reference {
        let number = self.allocate();
        self.entries.insert(
            number,
            ObjectEntry {
                generation: 0,
                object,
                flags: ObjectFlags::MODIFIED,
            },
        );
        Reference::new(ObjectId::new(number, 0), self.id)
    }

    /// Registers an object under a caller-chosen id, as a reader layer does
    /// when materializing an externally authored document.
    pub fn insert_object_with_id(&mut self, id: ObjectId, object: Object) -> Result<Reference> {
        if self.entries.contains_key(&id.number()) {
            return Err(PdfError::Structure(format!(
                "object number {} already in use",
                id.number()
            )));
        }
        self.entries.insert(
            id.number(),
            ObjectEntry {
                generation: id.generation(),
                object,
                flags: ObjectFlags::empty(),
            },
        );
        self.next_number = self.next_number.max(id.number() + 1);
        Ok(Reference::new(id, self.id))
    }

    /// Promotes an object to indirect under this document.
    ///
    /// A reference that already belongs to this document is returned as-is;
    /// a reference owned by a different document is an error. Container-like
    /// variants additionally get the must-be-indirect marker so the writer
    /// never inlines them.
    pub fn make_indirect(&mut self, object: Object) -> Result<Reference> {
        if let Object::Reference(reference) = object {
            return if reference.document() == self.id {
                Ok(reference)
            } else {
                Err(PdfError::ForeignReference(reference.id()))
            };
        }
        let pin = object.can_be_forced_indirect();
        let reference = self.add_object(object);
        if pin {
            self.set_flags(reference.number(), ObjectFlags::MUST_BE_INDIRECT);
        }
        Ok(reference)
    }

    /// Looks up the object a reference points at.
    ///
    /// A flushed entry resolves to `Null`: flushing releases content and
    /// there is nothing left to read.
    pub fn get(&self, reference: Reference) -> Result<&Object> {
        if reference.document() != self.id {
            return Err(PdfError::ForeignReference(reference.id()));
        }
        self.entries
            .get(&reference.number())
            .map(|entry| &entry.object)
            .ok_or_else(|| {
                PdfError::Structure(format!("no object registered as {}", reference.id()))
            })
    }

    pub fn get_mut(&mut self, reference: Reference) -> Result<&mut Object> {
        if reference.document() != self.id {
            return Err(PdfError::ForeignReference(reference.id()));
        }
        let entry = self.entries.get_mut(&reference.number()).ok_or_else(|| {
            PdfError::Structure(format!("no object registered as {}", reference.id()))
        })?;
        if entry.flags.contains(ObjectFlags::FLUSHED) {
            return Err(PdfError::Lifecycle(format!(
                "object {} was flushed and its content released",
                reference.id()
            )));
        }
        entry.flags |= ObjectFlags::MODIFIED;
        Ok(&mut entry.object)
    }

    /// Follows references until a direct object is reached.
    pub fn resolve<'a>(&'a self, object: &'a Object) -> Result<&'a Object> {
        let mut current = object;
        // A reference chain longer than the arena is necessarily a loop.
        for _ in 0..=self.entries.len() {
            match current {
                Object::Reference(r) => current = self.get(*r)?,
                direct => return Ok(direct),
            }
        }
        Err(PdfError::Structure("reference chain does not terminate".to_string()))
    }

    /// Releases an object's in-memory content without writing it.
    pub fn release(&mut self, reference: Reference) -> Result<()> {
        if reference.document() != self.id {
            return Err(PdfError::ForeignReference(reference.id()));
        }
        let entry = self.entries.get_mut(&reference.number()).ok_or_else(|| {
            PdfError::Structure(format!("no object registered as {}", reference.id()))
        })?;
        if entry.flags.contains(ObjectFlags::READ_ONLY) {
            return Err(PdfError::Lifecycle(format!(
                "object {} is read-only and cannot be released",
                reference.id()
            )));
        }
        entry.object = Object::Null;
        Ok(())
    }

    /// Deep-copies an indirect object within this document, returning a new
    /// reference. Nested references stay shared; only the top-level content
    /// is duplicated. Used to break self-referential resource chains.
    pub fn clone_object(&mut self, reference: Reference) -> Result<Reference> {
        let object = self.get(reference)?.clone();
        Ok(self.add_object(object))
    }

    /// Copies `object` out of `source` into this document.
    ///
    /// `context` records what has already been copied, keyed by
    /// `(source document, object number)`; with `allow_duplicating` false a
    /// recorded copy is reused instead of duplicated. Within a single call
    /// the recursion always reuses in-flight copies, which is what makes
    /// reference cycles terminate. A catalog-typed dictionary is the one
    /// thing that never crosses documents: passing one directly is an error,
    /// and one reached through recursion copies as `Null`.
    pub fn import_object(
        &mut self,
        source: &Document,
        object: &Object,
        allow_duplicating: bool,
        context: &mut CopyContext,
    ) -> Result<Object> {
        if source.id == self.id {
            return Err(PdfError::Lifecycle(
                "import source and target are the same document".to_string(),
            ));
        }
        if let Object::Dictionary(dict) = object {
            if dict.type_name() == Some("Catalog") {
                return Err(PdfError::CatalogNotCopyable);
            }
        }
        if let Object::Reference(r) = object {
            if r.document() == source.id && source.is_catalog(*r) {
                return Err(PdfError::CatalogNotCopyable);
            }
        }
        let mut in_flight = HashMap::new();
        self.import_inner(source, object, allow_duplicating, context, &mut in_flight)
    }

    fn import_inner(
        &mut self,
        source: &Document,
        object: &Object,
        allow_duplicating: bool,
        context: &mut CopyContext,
        in_flight: &mut HashMap<(DocumentId, u32), Reference>,
    ) -> Result<Object> {
        match object {
            Object::Null => Ok(Object::Null),
            Object::Boolean(b) => Ok(Object::Boolean(*b)),
            Object::Integer(i) => Ok(Object::Integer(*i)),
            Object::Real(f) => Ok(Object::Real(*f)),
            Object::Name(n) => Ok(Object::Name(n.clone())),
            Object::String(s) => Ok(Object::String(s.clone())),
            Object::Array(arr) => {
                let mut copied = crate::objects::Array::with_capacity(arr.len());
                for item in arr.iter() {
                    copied.push(self.import_inner(
                        source,
                        item,
                        allow_duplicating,
                        context,
                        in_flight,
                    )?);
                }
                Ok(Object::Array(copied))
            }
            Object::Dictionary(dict) => {
                if dict.type_name() == Some("Catalog") {
                    tracing::warn!("catalog dictionary reached during copy; replaced with null");
                    return Ok(Object::Null);
                }
                let mut copied = Dictionary::new();
                for (key, value) in dict.iter() {
                    let value = self.import_inner(
                        source,
                        value,
                        allow_duplicating,
                        context,
                        in_flight,
                    )?;
                    copied.set(key.clone(), value);
                }
                Ok(Object::Dictionary(copied))
            }
            Object::Stream(stream) => {
                let dict = self.import_inner(
                    source,
                    &Object::Dictionary(stream.dictionary().clone()),
                    allow_duplicating,
                    context,
                    in_flight,
                )?;
                let dict = match dict {
                    Object::Dictionary(d) => d,
                    _ => Dictionary::new(),
                };
                Ok(Object::Stream(crate::objects::Stream::with_dictionary(
                    dict,
                    stream.data().to_vec(),
                )))
            }
            Object::Reference(r) => {
                if r.document() == self.id {
                    return Ok(Object::Reference(*r));
                }
                if r.document() != source.id {
                    return Err(PdfError::ForeignReference(r.id()));
                }
                if source.is_catalog(*r) {
                    tracing::warn!("catalog reference reached during copy; replaced with null");
                    return Ok(Object::Null);
                }

                let key = (r.document(), r.number());
                if let Some(existing) = in_flight.get(&key) {
                    return Ok(Object::Reference(*existing));
                }
                if !allow_duplicating {
                    if let Some(existing) = context.copied.get(&key) {
                        return Ok(Object::Reference(*existing));
                    }
                }

                let referenced = source.get(*r)?.clone();

                // Reserve the target slot before descending so a cycle back
                // to this object resolves to the reservation instead of
                // recursing forever.
                let number = self.allocate();
                let target = Reference::new(ObjectId::new(number, 0), self.id);
                in_flight.insert(key, target);
                if !allow_duplicating {
                    context.copied.insert(key, target);
                }

                let copied = self.import_inner(
                    source,
                    &referenced,
                    allow_duplicating,
                    context,
                    in_flight,
                )?;
                self.entries.insert(
                    number,
                    ObjectEntry {
                        generation: 0,
                        object: copied,
                        flags: ObjectFlags::MODIFIED,
                    },
                );
                Ok(Object::Reference(target))
            }
        }
    }

    pub fn reference(&self, number: u32) -> Option<Reference> {
        self.entries
            .get(&number)
            .map(|entry| Reference::new(ObjectId::new(number, entry.generation), self.id))
    }

    pub fn object_numbers(&self) -> Vec<u32> {
        self.entries.keys().copied().collect()
    }

    pub fn object_count(&self) -> usize {
        self.entries.len()
    }

    pub fn highest_object_number(&self) -> u32 {
        self.next_number.saturating_sub(1)
    }

    pub fn flags(&self, number: u32) -> ObjectFlags {
        self.entries
            .get(&number)
            .map(|entry| entry.flags)
            .unwrap_or(ObjectFlags::empty())
    }

    pub fn is_flushed(&self, reference: Reference) -> bool {
        self.flags(reference.number()).contains(ObjectFlags::FLUSHED)
    }

    pub(crate) fn set_flags(&mut self, number: u32, flags: ObjectFlags) {
        if let Some(entry) = self.entries.get_mut(&number) {
            entry.flags |= flags;
        }
    }

    pub(crate) fn entry(&self, number: u32) -> Option<&ObjectEntry> {
        self.entries.get(&number)
    }

    /// Marks an entry flushed and releases its content. One-way.
    pub(crate) fn mark_flushed(&mut self, number: u32) {
        if let Some(entry) = self.entries.get_mut(&number) {
            entry.flags |= ObjectFlags::FLUSHED;
            entry.flags -= ObjectFlags::MUST_FLUSH;
            entry.object = Object::Null;
        }
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}
