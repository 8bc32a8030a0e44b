//! Sorted key-to-object index (named destinations, embedded files, ...).
//!
//! The on-disk shape is a tree of `Kids`/`Names` dictionaries with `Limits`
//! annotations. In memory the tree is a flat sorted map, read lazily from an
//! existing root on first access and rebuilt into balanced form when the
//! document is written.

use crate::document::Document;
use crate::error::{PdfError, Result};
use crate::objects::{Array, Dictionary, Object, PdfString, Reference};
use std::collections::BTreeMap;

/// Maximum entries per leaf and kids per internal node.
pub const NAME_TREE_NODE_SIZE: usize = 40;

pub struct NameTree {
    /// Root node in the document, when loaded from or built into one.
    backing: Option<Reference>,
    /// Materialized key order mapping; `None` until first access.
    entries: Option<BTreeMap<String, Object>>,
}

impl NameTree {
    pub fn new() -> Self {
        Self {
            backing: None,
            entries: Some(BTreeMap::new()),
        }
    }

    /// Wraps an existing root node without reading it; the mapping is
    /// materialized on first access.
    pub fn from_root(backing: Reference) -> Self {
        Self {
            backing: Some(backing),
            entries: None,
        }
    }

    pub fn root(&self) -> Option<Reference> {
        self.backing
    }

    /// Adds a key-value pair. Existing keys are never silently overwritten.
    pub fn add_entry(
        &mut self,
        doc: &Document,
        key: impl Into<String>,
        value: Object,
    ) -> Result<()> {
        let key = key.into();
        let entries = self.ensure_loaded(doc)?;
        if entries.contains_key(&key) {
            return Err(PdfError::DuplicateNameEntry(key));
        }
        entries.insert(key, value);
        Ok(())
    }

    /// The fully materialized mapping, reading the nested structure on first
    /// call and caching it.
    pub fn get_names(&mut self, doc: &Document) -> Result<&BTreeMap<String, Object>> {
        Ok(self.ensure_loaded(doc)?)
    }

    pub fn len(&mut self, doc: &Document) -> Result<usize> {
        Ok(self.ensure_loaded(doc)?.len())
    }

    pub fn is_empty(&mut self, doc: &Document) -> Result<bool> {
        Ok(self.ensure_loaded(doc)?.is_empty())
    }

    fn ensure_loaded(&mut self, doc: &Document) -> Result<&mut BTreeMap<String, Object>> {
        if self.entries.is_none() {
            let mut map = BTreeMap::new();
            if let Some(backing) = self.backing {
                let root = node_dict(doc, &Object::Reference(backing))?;
                let mut pending = None;
                collect_names(doc, &root, &mut map, &mut pending)?;
                if let Some(key) = pending {
                    return Err(PdfError::Structure(format!(
                        "name tree ends with key {key:?} missing its value"
                    )));
                }
            }
            self.entries = Some(map);
        }
        // Loaded immediately above when absent.
        self.entries
            .as_mut()
            .ok_or_else(|| PdfError::Structure("name tree failed to materialize".to_string()))
    }

    /// Rebuilds the tree into balanced on-disk form and returns the new root.
    ///
    /// Up to [`NAME_TREE_NODE_SIZE`] entries fit a single leaf; beyond that,
    /// fixed-capacity leaves annotated with `[first, last]` limits are folded
    /// level by level until the kids fit one root.
    pub fn build_tree(&mut self, doc: &mut Document) -> Result<Reference> {
        self.ensure_loaded(doc)?;
        let entries = self
            .entries
            .as_ref()
            .ok_or_else(|| PdfError::Structure("name tree failed to materialize".to_string()))?;
        let pairs: Vec<(&String, &Object)> = entries.iter().collect();

        let root = if pairs.len() <= NAME_TREE_NODE_SIZE {
            let mut dict = Dictionary::new();
            dict.set("Names", names_array(&pairs));
            doc.add_object(Object::Dictionary(dict))
        } else {
            // (node, first key, last key) per level.
            let mut level: Vec<(Reference, String, String)> = Vec::new();
            for chunk in pairs.chunks(NAME_TREE_NODE_SIZE) {
                let first = chunk[0].0.clone();
                let last = chunk[chunk.len() - 1].0.clone();
                let mut dict = Dictionary::new();
                dict.set("Names", names_array(chunk));
                dict.set("Limits", limits_array(&first, &last));
                let leaf = doc.add_object(Object::Dictionary(dict));
                level.push((leaf, first, last));
            }

            while level.len() > NAME_TREE_NODE_SIZE {
                let mut next = Vec::new();
                for chunk in level.chunks(NAME_TREE_NODE_SIZE) {
                    let first = chunk[0].1.clone();
                    let last = chunk[chunk.len() - 1].2.clone();
                    let mut dict = Dictionary::new();
                    dict.set("Kids", kids_array(chunk));
                    dict.set("Limits", limits_array(&first, &last));
                    let node = doc.add_object(Object::Dictionary(dict));
                    next.push((node, first, last));
                }
                level = next;
            }

            let mut dict = Dictionary::new();
            dict.set("Kids", kids_array(&level));
            doc.add_object(Object::Dictionary(dict))
        };

        self.backing = Some(root);
        Ok(root)
    }
}

impl Default for NameTree {
    fn default() -> Self {
        Self::new()
    }
}

fn names_array(pairs: &[(&String, &Object)]) -> Array {
    let mut array = Array::with_capacity(pairs.len() * 2);
    for (key, value) in pairs {
        array.push(Object::String(PdfString::literal(key.as_bytes().to_vec())));
        array.push((*value).clone());
    }
    array
}

fn kids_array(nodes: &[(Reference, String, String)]) -> Array {
    let mut array = Array::with_capacity(nodes.len());
    for (node, _, _) in nodes {
        array.push(Object::Reference(*node));
    }
    array
}

fn limits_array(first: &str, last: &str) -> Array {
    let mut array = Array::with_capacity(2);
    array.push(Object::String(PdfString::literal(first.as_bytes().to_vec())));
    array.push(Object::String(PdfString::literal(last.as_bytes().to_vec())));
    array
}

fn node_dict(doc: &Document, object: &Object) -> Result<Dictionary> {
    match doc.resolve(object)? {
        Object::Dictionary(dict) => Ok(dict.clone()),
        other => Err(PdfError::Structure(format!(
            "name tree node is not a dictionary, found {other:?}"
        ))),
    }
}

/// Recursive left-to-right walk over `Kids`/`Names`.
///
/// A leaf's `Names` array may end mid key-value pair when the source split a
/// pair across array boundaries; `pending` carries the key awaiting its value
/// into the next sibling.
fn collect_names(
    doc: &Document,
    node: &Dictionary,
    map: &mut BTreeMap<String, Object>,
    pending: &mut Option<String>,
) -> Result<()> {
    if let Some(kids) = node.get("Kids") {
        let kids = match doc.resolve(kids)? {
            Object::Array(kids) => kids.clone(),
            other => {
                return Err(PdfError::Structure(format!(
                    "name tree Kids is not an array, found {other:?}"
                )))
            }
        };
        for kid in kids.iter() {
            let kid = node_dict(doc, kid)?;
            collect_names(doc, &kid, map, pending)?;
        }
    }

    if let Some(names) = node.get("Names") {
        let names = match doc.resolve(names)? {
            Object::Array(names) => names.clone(),
            other => {
                return Err(PdfError::Structure(format!(
                    "name tree Names is not an array, found {other:?}"
                )))
            }
        };
        for item in names.iter() {
            match pending.take() {
                None => match doc.resolve(item)? {
                    Object::String(s) => {
                        // Lossy decoding could collapse distinct byte keys
                        // into one replacement-character string.
                        let key = String::from_utf8(s.as_bytes().to_vec()).map_err(|_| {
                            PdfError::Structure(
                                "name tree key is not valid UTF-8".to_string(),
                            )
                        })?;
                        *pending = Some(key);
                    }
                    other => {
                        return Err(PdfError::Structure(format!(
                            "name tree key is not a string, found {other:?}"
                        )))
                    }
                },
                Some(key) => {
                    map.insert(key, item.clone());
                }
            }
        }
    }

    Ok(())
}
