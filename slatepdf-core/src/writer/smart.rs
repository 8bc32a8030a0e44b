//! Smart-mode deduplication.
//!
//! Before writing a candidate object, its reachable sub-graph is serialized
//! into a canonical byte form (sorted dictionary keys, no dependence on
//! insertion order or object numbering) and hashed. A candidate whose
//! canonical bytes exactly match an already-written object is not written
//! again; its references are redirected to the earlier object instead.

use crate::document::Document;
use crate::error::Result;
use crate::objects::{Object, ObjectId, StringFormat};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};

/// Recursion ceiling for canonical serialization. The visited set already
/// terminates cycles; the ceiling is a backstop for extremely deep acyclic
/// graphs, and hitting it truncates silently rather than failing the write.
const MAX_CANONICAL_DEPTH: usize = 100;

/// Hash-indexed record of already-written canonical forms.
pub(crate) struct SmartCache {
    written: HashMap<[u8; 32], (Vec<u8>, ObjectId)>,
}

impl SmartCache {
    pub(crate) fn new() -> Self {
        Self {
            written: HashMap::new(),
        }
    }

    /// The id previously written for exactly these canonical bytes.
    ///
    /// A hash hit with different bytes is a collision and is treated as a
    /// miss; equality is decided on the bytes, never the hash alone.
    pub(crate) fn lookup(&self, canonical: &[u8]) -> Option<ObjectId> {
        let digest: [u8; 32] = Sha256::digest(canonical).into();
        match self.written.get(&digest) {
            Some((bytes, id)) if bytes == canonical => Some(*id),
            _ => None,
        }
    }

    pub(crate) fn record(&mut self, canonical: Vec<u8>, id: ObjectId) {
        let digest: [u8; 32] = Sha256::digest(&canonical).into();
        self.written.entry(digest).or_insert((canonical, id));
    }
}

/// Whether an object takes part in deduplication. Pages carry structural
/// position and are never folded together even when byte-identical.
pub(crate) fn is_dedup_candidate(object: &Object) -> bool {
    match object {
        Object::Dictionary(dict) => !matches!(dict.type_name(), Some("Page") | Some("Pages")),
        Object::Stream(stream) => {
            !matches!(stream.dictionary().type_name(), Some("Page") | Some("Pages"))
        }
        _ => false,
    }
}

/// Canonical byte form of `object`'s reachable sub-graph.
pub(crate) fn canonical_bytes(doc: &Document, object: &Object) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut visited = HashSet::new();
    serialize(doc, object, &mut out, 0, &mut visited)?;
    Ok(out)
}

fn serialize(
    doc: &Document,
    object: &Object,
    out: &mut Vec<u8>,
    depth: usize,
    visited: &mut HashSet<u32>,
) -> Result<()> {
    if depth >= MAX_CANONICAL_DEPTH {
        return Ok(());
    }
    match object {
        Object::Null => out.extend_from_slice(b"null"),
        Object::Boolean(b) => out.extend_from_slice(if *b { b"true" } else { b"false" }),
        Object::Integer(i) => out.extend_from_slice(format!("i{i}").as_bytes()),
        Object::Real(f) => out.extend_from_slice(format!("r{}", f.to_bits()).as_bytes()),
        Object::Name(n) => n.write_escaped(out),
        Object::String(s) => {
            out.push(match s.format() {
                StringFormat::Literal => b'(',
                StringFormat::Hexadecimal => b'<',
            });
            out.extend_from_slice(s.as_bytes());
            out.push(b')');
        }
        Object::Array(arr) => {
            out.push(b'[');
            for item in arr.iter() {
                serialize(doc, item, out, depth + 1, visited)?;
                out.push(b' ');
            }
            out.push(b']');
        }
        Object::Dictionary(dict) => serialize_dict(doc, dict, out, depth, visited)?,
        Object::Stream(stream) => {
            serialize_dict(doc, stream.dictionary(), out, depth, visited)?;
            out.extend_from_slice(b"$stream:");
            out.extend_from_slice(stream.data());
        }
        Object::Reference(r) => {
            if r.document() != doc.id() {
                // Foreign reference: identity token, never content.
                out.extend_from_slice(format!("F{}:{}", r.document(), r.number()).as_bytes());
                return Ok(());
            }
            if doc.is_flushed(*r) {
                // The referent's content is already released; its on-disk
                // identity stands in so holders of different flushed objects
                // never collapse into one form.
                out.extend_from_slice(format!("W{}", r.number()).as_bytes());
                return Ok(());
            }
            if !visited.insert(r.number()) {
                // Back on the current path; a cycle token keeps the form
                // finite and still distinguishes self-loops from leaves.
                out.extend_from_slice(format!("C{}", r.number()).as_bytes());
                return Ok(());
            }
            let target = doc.get(*r)?;
            serialize(doc, target, out, depth + 1, visited)?;
            visited.remove(&r.number());
        }
    }
    Ok(())
}

fn serialize_dict(
    doc: &Document,
    dict: &crate::objects::Dictionary,
    out: &mut Vec<u8>,
    depth: usize,
    visited: &mut HashSet<u32>,
) -> Result<()> {
    out.extend_from_slice(b"<<");
    for (key, value) in dict.iter() {
        // Structural back-links recurse into the surrounding tree; skipping
        // them keeps the form finite and scoped to the sub-graph itself.
        if key.as_str() == "Parent" {
            continue;
        }
        if points_at_page(doc, value) {
            continue;
        }
        key.write_escaped(out);
        out.push(b' ');
        serialize(doc, value, out, depth + 1, visited)?;
        out.push(b' ');
    }
    out.extend_from_slice(b">>");
    Ok(())
}

fn points_at_page(doc: &Document, value: &Object) -> bool {
    let Object::Reference(r) = value else {
        return false;
    };
    if r.document() != doc.id() {
        return false;
    }
    match doc.get(*r) {
        Ok(Object::Dictionary(dict)) => {
            matches!(dict.type_name(), Some("Page") | Some("Pages"))
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::names::Name;
    use crate::objects::{Dictionary, Stream};

    #[test]
    fn test_equal_dictionaries_have_equal_canonical_bytes() {
        let doc = Document::new();
        let mut a = Dictionary::new();
        a.set("Beta", 2i64);
        a.set("Alpha", 1i64);
        let mut b = Dictionary::new();
        b.set("Alpha", 1i64);
        b.set("Beta", 2i64);

        let a = canonical_bytes(&doc, &Object::Dictionary(a)).unwrap();
        let b = canonical_bytes(&doc, &Object::Dictionary(b)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_changed_value_changes_canonical_bytes() {
        let doc = Document::new();
        let mut a = Dictionary::new();
        a.set("Alpha", 1i64);
        let mut b = Dictionary::new();
        b.set("Alpha", 2i64);

        let a = canonical_bytes(&doc, &Object::Dictionary(a)).unwrap();
        let b = canonical_bytes(&doc, &Object::Dictionary(b)).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_references_compare_by_content() {
        let mut doc = Document::new();
        let x = doc.add_object(Object::Integer(5));
        let y = doc.add_object(Object::Integer(5));

        let mut a = Dictionary::new();
        a.set("V", Object::Reference(x));
        let mut b = Dictionary::new();
        b.set("V", Object::Reference(y));

        let a = canonical_bytes(&doc, &Object::Dictionary(a)).unwrap();
        let b = canonical_bytes(&doc, &Object::Dictionary(b)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_flushed_referents_keep_holders_distinct() {
        let mut doc = Document::new();
        let x = doc.add_object(Object::Integer(42));
        let y = doc.add_object(Object::Integer(43));
        doc.mark_flushed(x.number());
        doc.mark_flushed(y.number());

        let mut a = Dictionary::new();
        a.set("V", Object::Reference(x));
        let mut b = Dictionary::new();
        b.set("V", Object::Reference(y));

        let a = canonical_bytes(&doc, &Object::Dictionary(a)).unwrap();
        let b = canonical_bytes(&doc, &Object::Dictionary(b)).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_parent_key_is_skipped() {
        let mut doc = Document::new();
        let somewhere = doc.add_object(Object::Integer(1));

        let mut a = Dictionary::new();
        a.set("K", 3i64);
        let mut b = a.clone();
        b.set("Parent", Object::Reference(somewhere));

        let a = canonical_bytes(&doc, &Object::Dictionary(a)).unwrap();
        let b = canonical_bytes(&doc, &Object::Dictionary(b)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_page_references_are_skipped() {
        let mut doc = Document::new();
        let mut page = Dictionary::new();
        page.set("Type", Name::new("Page"));
        let page = doc.add_object(Object::Dictionary(page));

        let mut a = Dictionary::new();
        a.set("K", 3i64);
        let mut b = a.clone();
        b.set("Dest", Object::Reference(page));

        let a = canonical_bytes(&doc, &Object::Dictionary(a)).unwrap();
        let b = canonical_bytes(&doc, &Object::Dictionary(b)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_self_loop_terminates() {
        let mut doc = Document::new();
        let holder = doc.add_object(Object::Null);
        let mut dict = Dictionary::new();
        dict.set("Self", Object::Reference(holder));
        *doc.get_mut(holder).unwrap() = Object::Dictionary(dict);

        let object = doc.get(holder).unwrap().clone();
        let bytes = canonical_bytes(&doc, &object).unwrap();
        assert!(!bytes.is_empty());
    }

    #[test]
    fn test_deep_chain_truncates_silently() {
        let mut doc = Document::new();
        let mut current = doc.add_object(Object::Integer(0));
        for _ in 0..300 {
            let mut dict = Dictionary::new();
            dict.set("Next", Object::Reference(current));
            current = doc.add_object(Object::Dictionary(dict));
        }

        let object = doc.get(current).unwrap().clone();
        assert!(canonical_bytes(&doc, &object).is_ok());
    }

    #[test]
    fn test_candidate_filter() {
        let mut page = Dictionary::new();
        page.set("Type", Name::new("Page"));
        assert!(!is_dedup_candidate(&Object::Dictionary(page)));

        assert!(is_dedup_candidate(&Object::Dictionary(Dictionary::new())));
        assert!(is_dedup_candidate(&Object::Stream(Stream::new(vec![1]))));
        assert!(!is_dedup_candidate(&Object::Integer(3)));
    }

    #[test]
    fn test_cache_confirms_exact_bytes() {
        let mut cache = SmartCache::new();
        cache.record(b"abc".to_vec(), ObjectId::new(1, 0));

        assert_eq!(cache.lookup(b"abc"), Some(ObjectId::new(1, 0)));
        assert_eq!(cache.lookup(b"abd"), None);
    }

    #[test]
    fn test_string_mode_affects_canonical_form() {
        let doc = Document::new();
        let literal = Object::String(crate::objects::PdfString::literal(b"x".to_vec()));
        let hex = Object::String(crate::objects::PdfString::hexadecimal(b"x".to_vec()));

        let a = canonical_bytes(&doc, &literal).unwrap();
        let b = canonical_bytes(&doc, &hex).unwrap();
        assert_ne!(a, b);
    }
}
