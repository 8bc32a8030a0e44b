//! Balanced, count-indexed page tree.
//!
//! The on-disk shape is a hierarchy of `Pages` nodes whose `Kids` hold either
//! page dictionaries or further sub-trees, each node carrying the `Count` of
//! pages below it. In memory the hierarchy is mirrored by an arena of nodes
//! annotated with the absolute index of the first page they cover (`from`),
//! so locating page `n` is a binary search over sibling ranges instead of a
//! linear walk. Sub-trees of an externally authored document are expanded
//! lazily, one node at a time, on first access.

use crate::document::Document;
use crate::error::{PdfError, Result};
use crate::names::Name;
use crate::objects::{Array, Dictionary, Object, Reference};

/// Target kids per node when building a balanced tree.
pub const PAGE_TREE_LEAF_SIZE: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kid {
    /// A page directly under this node.
    Page(Reference),
    /// A child sub-tree, by node index.
    Node(usize),
}

#[derive(Debug)]
struct Node {
    parent: Option<usize>,
    /// Absolute index (0-based) of the first page this node covers.
    from: usize,
    /// Number of pages this node covers; always the sum over descendants.
    count: usize,
    kids: Vec<Kid>,
    /// `Pages` dictionary in the document, when this node mirrors one.
    backing: Option<Reference>,
    expanded: bool,
}

pub struct PageTree {
    nodes: Vec<Node>,
}

const ROOT: usize = 0;

impl PageTree {
    /// An empty tree for a brand-new document.
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                parent: None,
                from: 0,
                count: 0,
                kids: Vec::new(),
                backing: None,
                expanded: true,
            }],
        }
    }

    /// Wraps the `Pages` root of an existing document. Only the top node is
    /// parsed; children expand on first access.
    pub fn from_root(doc: &Document, root: Reference) -> Result<Self> {
        let root_obj = Object::Reference(root);
        let dict = match doc.resolve(&root_obj)? {
            Object::Dictionary(dict) => dict,
            other => {
                return Err(PdfError::Structure(format!(
                    "Pages root {} is not a dictionary, found {other:?}",
                    root.id()
                )))
            }
        };
        let count = dict.get_integer("Count").ok_or_else(|| {
            PdfError::Structure(format!("Pages root {} has no Count", root.id()))
        })?;
        if count < 0 {
            return Err(PdfError::Structure(format!(
                "Pages root {} has negative Count", root.id()
            )));
        }
        Ok(Self {
            nodes: vec![Node {
                parent: None,
                from: 0,
                count: count as usize,
                kids: Vec::new(),
                backing: Some(root),
                expanded: false,
            }],
        })
    }

    pub fn page_count(&self) -> usize {
        self.nodes[ROOT].count
    }

    /// Returns page `n` (1-based), expanding only the sub-trees on the path
    /// to it.
    pub fn get_page(&mut self, doc: &Document, n: usize) -> Result<Reference> {
        if n == 0 || n > self.page_count() {
            return Err(PdfError::InvalidPageNumber(n));
        }
        let target = n - 1;

        let mut idx = ROOT;
        loop {
            self.expand(doc, idx)?;
            let node = &self.nodes[idx];
            if node.kids.iter().all(|kid| matches!(kid, Kid::Page(_))) {
                match node.kids.get(target - node.from) {
                    Some(Kid::Page(page)) => return Ok(*page),
                    _ => {
                        return Err(PdfError::Structure(format!(
                            "page tree node covering page {} is inconsistent",
                            node.from + 1
                        )))
                    }
                }
            }
            idx = self.child_covering(idx, target)?;
        }
    }

    /// 1-based index of a loaded page, if the tree knows it.
    pub fn get_page_number(&self, page: Reference) -> Option<usize> {
        for node in &self.nodes {
            for (offset, kid) in node.kids.iter().enumerate() {
                if *kid == Kid::Page(page) {
                    return Some(node.from + offset + 1);
                }
            }
        }
        None
    }

    /// Appends a page.
    pub fn add_page(&mut self, doc: &mut Document, page: Reference) -> Result<()> {
        let n = self.page_count() + 1;
        self.insert_page(doc, n, page)
    }

    /// Inserts a page so it becomes page `n` (1-based); `n` may be one past
    /// the current count to append.
    pub fn insert_page(&mut self, doc: &mut Document, n: usize, page: Reference) -> Result<()> {
        if n == 0 || n > self.page_count() + 1 {
            return Err(PdfError::InvalidPageNumber(n));
        }
        let target = n - 1;

        let leaf = self.leaf_for(doc, target.min(self.page_count().saturating_sub(1)))?;
        let offset = target - self.nodes[leaf].from;
        self.nodes[leaf].kids.insert(offset, Kid::Page(page));
        self.shift_later_siblings(leaf, offset + 1, 1);
        self.correct_from(doc, leaf, 1)?;
        self.sync_kids(doc, leaf)?;
        let parent = self.backed_ancestor(leaf).map(|(_, backing)| backing);
        self.set_parent_link(doc, page, parent)?;
        Ok(())
    }

    /// Removes page `n` (1-based) and returns its reference.
    ///
    /// Removing a page that was already flushed is permitted; nothing can be
    /// recovered for it, so it is only logged.
    pub fn remove_page(&mut self, doc: &mut Document, n: usize) -> Result<Reference> {
        if n == 0 || n > self.page_count() {
            return Err(PdfError::InvalidPageNumber(n));
        }
        let target = n - 1;

        let leaf = self.leaf_for(doc, target)?;
        let offset = target - self.nodes[leaf].from;
        let removed = match self.nodes[leaf].kids.remove(offset) {
            Kid::Page(page) => page,
            Kid::Node(_) => {
                return Err(PdfError::Structure(format!(
                    "page tree node covering page {n} is inconsistent"
                )))
            }
        };
        if doc.is_flushed(removed) {
            tracing::warn!("removing page {n} ({}) after it was flushed", removed.id());
        }
        self.shift_later_siblings(leaf, offset, -1);
        self.correct_from(doc, leaf, -1)?;
        self.sync_kids(doc, leaf)?;
        Ok(removed)
    }

    /// Descends to the expanded leaf whose range covers `target` (0-based).
    fn leaf_for(&mut self, doc: &Document, target: usize) -> Result<usize> {
        let mut idx = ROOT;
        loop {
            self.expand(doc, idx)?;
            let node = &self.nodes[idx];
            if node.kids.iter().all(|kid| matches!(kid, Kid::Page(_))) {
                return Ok(idx);
            }
            idx = self.child_covering(idx, target.min((node.from + node.count).saturating_sub(1)))?;
        }
    }

    /// Binary search over the child ranges of `idx` for the one covering
    /// `target`. Ranges are contiguous and non-overlapping, so the first
    /// child ending past the target is the covering one.
    fn child_covering(&self, idx: usize, target: usize) -> Result<usize> {
        let node = &self.nodes[idx];
        let children: Vec<usize> = node
            .kids
            .iter()
            .filter_map(|kid| match kid {
                Kid::Node(child) => Some(*child),
                Kid::Page(_) => None,
            })
            .collect();
        let position = children.partition_point(|&child| {
            let child = &self.nodes[child];
            child.from + child.count <= target
        });
        children.get(position).copied().ok_or_else(|| {
            PdfError::Structure(format!(
                "page tree node covering page {} is inconsistent",
                node.from + 1
            ))
        })
    }

    /// Expands a node's children from its backing dictionary.
    ///
    /// Children that mix direct pages and sub-trees are normalized first:
    /// each run of consecutive direct pages is grouped under a synthetic
    /// child node, after which every node is homogeneous. Descent re-invokes
    /// expansion per level, so the normalization is effectively recursive.
    fn expand(&mut self, doc: &Document, idx: usize) -> Result<()> {
        if self.nodes[idx].expanded {
            return Ok(());
        }
        let backing = match self.nodes[idx].backing {
            Some(backing) => backing,
            None => {
                self.nodes[idx].expanded = true;
                return Ok(());
            }
        };
        let first_page = self.nodes[idx].from + 1;

        let dict = match doc.resolve(&Object::Reference(backing))? {
            Object::Dictionary(dict) => dict.clone(),
            _ => {
                return Err(PdfError::Structure(format!(
                    "page tree node covering page {first_page} is not a dictionary"
                )))
            }
        };
        let kids = match dict.get("Kids").map(|kids| doc.resolve(kids)).transpose()? {
            Some(Object::Array(kids)) => kids.clone(),
            Some(_) => {
                return Err(PdfError::Structure(format!(
                    "page tree node covering page {first_page} has a non-array Kids entry"
                )))
            }
            None => {
                return Err(PdfError::Structure(format!(
                    "page tree node covering page {first_page} has no Kids entry"
                )))
            }
        };

        enum RawKid {
            Page(Reference),
            Tree(Reference, usize),
        }

        let mut raw = Vec::with_capacity(kids.len());
        for kid in kids.iter() {
            let reference = match kid {
                Object::Reference(r) => *r,
                Object::Null => {
                    return Err(PdfError::Structure(format!(
                        "page tree node covering page {first_page} has a null kid"
                    )))
                }
                _ => {
                    return Err(PdfError::Structure(format!(
                        "page tree node covering page {first_page} has a non-reference kid"
                    )))
                }
            };
            let kid_dict = match doc.resolve(kid)? {
                Object::Dictionary(kid_dict) => kid_dict,
                Object::Null => {
                    return Err(PdfError::Structure(format!(
                        "page tree node covering page {first_page} has a null kid"
                    )))
                }
                _ => {
                    return Err(PdfError::Structure(format!(
                        "page tree node covering page {first_page} has a malformed kid"
                    )))
                }
            };
            if kid_dict.contains_key("Kids") || kid_dict.type_name() == Some("Pages") {
                let count = kid_dict.get_integer("Count").unwrap_or(0);
                if count < 0 {
                    return Err(PdfError::Structure(format!(
                        "page tree node covering page {first_page} has negative Count"
                    )));
                }
                raw.push(RawKid::Tree(reference, count as usize));
            } else {
                raw.push(RawKid::Page(reference));
            }
        }

        let mixed = raw.iter().any(|kid| matches!(kid, RawKid::Page(_)))
            && raw.iter().any(|kid| matches!(kid, RawKid::Tree(..)));

        let mut cursor = self.nodes[idx].from;
        let mut kids = Vec::with_capacity(raw.len());
        let mut run: Vec<Kid> = Vec::new();
        for kid in raw {
            match kid {
                RawKid::Page(page) if mixed => run.push(Kid::Page(page)),
                RawKid::Page(page) => {
                    kids.push(Kid::Page(page));
                    cursor += 1;
                }
                RawKid::Tree(reference, count) => {
                    if !run.is_empty() {
                        let group = std::mem::take(&mut run);
                        let child = self.add_synthetic_group(idx, cursor, group);
                        cursor += self.nodes[child].count;
                        kids.push(Kid::Node(child));
                    }
                    let child = self.nodes.len();
                    self.nodes.push(Node {
                        parent: Some(idx),
                        from: cursor,
                        count,
                        kids: Vec::new(),
                        backing: Some(reference),
                        expanded: false,
                    });
                    cursor += count;
                    kids.push(Kid::Node(child));
                }
            }
        }
        if !run.is_empty() {
            let group = std::mem::take(&mut run);
            let child = self.add_synthetic_group(idx, cursor, group);
            cursor += self.nodes[child].count;
            kids.push(Kid::Node(child));
        }

        let node = &mut self.nodes[idx];
        if cursor - node.from != node.count {
            return Err(PdfError::Structure(format!(
                "page tree node covering page {first_page} claims {} pages but its kids cover {}",
                node.count,
                cursor - node.from
            )));
        }
        node.kids = kids;
        node.expanded = true;
        Ok(())
    }

    /// Synthetic sub-tree grouping a run of consecutive direct pages so a
    /// mixed node becomes homogeneous.
    fn add_synthetic_group(&mut self, parent: usize, from: usize, pages: Vec<Kid>) -> usize {
        let child = self.nodes.len();
        self.nodes.push(Node {
            parent: Some(parent),
            from,
            count: pages.len(),
            kids: pages,
            backing: None,
            expanded: true,
        });
        child
    }

    /// Walks from `leaf` to the root adjusting `count` by `delta`, and shifts
    /// the `from` offset of every later sibling sub-tree at each level so
    /// ranges stay contiguous after the index shift.
    fn correct_from(&mut self, doc: &mut Document, leaf: usize, delta: i64) -> Result<()> {
        let mut idx = leaf;
        loop {
            let node = &mut self.nodes[idx];
            node.count = (node.count as i64 + delta) as usize;
            let (count, backing, parent) = (node.count, node.backing, node.parent);
            if let Some(backing) = backing {
                if let Object::Dictionary(dict) = doc.get_mut(backing)? {
                    dict.set("Count", count as i64);
                }
            }
            let Some(parent) = parent else {
                return Ok(());
            };

            let position = self.nodes[parent]
                .kids
                .iter()
                .position(|kid| *kid == Kid::Node(idx));
            if let Some(position) = position {
                self.shift_later_siblings(parent, position + 1, delta);
            }
            idx = parent;
        }
    }

    /// Shifts `from` by `delta` for every kid of `idx` at position
    /// `start` onward, recursively through loaded sub-trees.
    fn shift_later_siblings(&mut self, idx: usize, start: usize, delta: i64) {
        let later: Vec<usize> = self.nodes[idx].kids[start..]
            .iter()
            .filter_map(|kid| match kid {
                Kid::Node(child) => Some(*child),
                Kid::Page(_) => None,
            })
            .collect();
        for child in later {
            self.shift_from(child, delta);
        }
    }

    fn shift_from(&mut self, idx: usize, delta: i64) {
        self.nodes[idx].from = (self.nodes[idx].from as i64 + delta) as usize;
        let children: Vec<usize> = self.nodes[idx]
            .kids
            .iter()
            .filter_map(|kid| match kid {
                Kid::Node(child) => Some(*child),
                Kid::Page(_) => None,
            })
            .collect();
        for child in children {
            self.shift_from(child, delta);
        }
    }

    /// Nearest node at or above `idx` that mirrors a `Pages` dictionary.
    fn backed_ancestor(&self, idx: usize) -> Option<(usize, Reference)> {
        let mut idx = idx;
        loop {
            if let Some(backing) = self.nodes[idx].backing {
                return Some((idx, backing));
            }
            idx = self.nodes[idx].parent?;
        }
    }

    /// Rewrites the `Kids` array behind an edited leaf.
    ///
    /// A synthetic normalization node has no dictionary of its own; its pages
    /// live spliced into the nearest backed ancestor's `Kids`, so the edit is
    /// propagated there, flattening synthetic children back into the mix.
    fn sync_kids(&mut self, doc: &mut Document, idx: usize) -> Result<()> {
        let Some((backed, backing)) = self.backed_ancestor(idx) else {
            return Ok(());
        };
        let mut kids = Array::with_capacity(self.nodes[backed].kids.len());
        self.flatten_kids(backed, &mut kids);
        if let Object::Dictionary(dict) = doc.get_mut(backing)? {
            dict.set("Kids", kids);
        }
        Ok(())
    }

    fn flatten_kids(&self, idx: usize, out: &mut Array) {
        for kid in &self.nodes[idx].kids {
            match kid {
                Kid::Page(page) => out.push(Object::Reference(*page)),
                Kid::Node(child) => match self.nodes[*child].backing {
                    Some(child_backing) => out.push(Object::Reference(child_backing)),
                    None => self.flatten_kids(*child, out),
                },
            }
        }
    }

    fn set_parent_link(
        &self,
        doc: &mut Document,
        page: Reference,
        parent: Option<Reference>,
    ) -> Result<()> {
        let Some(parent) = parent else {
            return Ok(());
        };
        if let Ok(Object::Dictionary(dict)) = doc.get_mut(page) {
            dict.set("Parent", Object::Reference(parent));
        }
        Ok(())
    }

    /// Builds the balanced on-disk tree for a brand-new document and returns
    /// the root `Pages` node.
    ///
    /// Pages are batched into leaves of [`PAGE_TREE_LEAF_SIZE`], then leaves
    /// fold into parents one level at a time until one root remains. A
    /// trailing group of one is merged into the previous group instead of
    /// becoming a singleton node.
    pub fn build_tree(&mut self, doc: &mut Document) -> Result<Reference> {
        let pages: Vec<Reference> = self.nodes[ROOT]
            .kids
            .iter()
            .map(|kid| match kid {
                Kid::Page(page) => Ok(*page),
                Kid::Node(_) => Err(PdfError::Structure(
                    "page tree was loaded from a document and cannot be rebuilt".to_string(),
                )),
            })
            .collect::<Result<_>>()?;

        if pages.len() <= PAGE_TREE_LEAF_SIZE {
            let root = self.emit_node(doc, &pages)?;
            self.attach(doc, root)?;
            return Ok(root);
        }

        let mut level: Vec<(Reference, usize)> = Vec::new();
        for group in widened_groups(pages.len()) {
            let chunk = &pages[group.clone()];
            let node = self.emit_node(doc, chunk)?;
            level.push((node, chunk.len()));
        }

        while level.len() > 1 {
            let mut next = Vec::new();
            for group in widened_groups(level.len()) {
                let chunk = &level[group];
                let count: usize = chunk.iter().map(|(_, count)| count).sum();
                let node = self.emit_parent(doc, chunk)?;
                next.push((node, count));
            }
            level = next;
        }

        let root = level[0].0;
        self.attach(doc, root)?;
        Ok(root)
    }

    fn emit_node(&self, doc: &mut Document, pages: &[Reference]) -> Result<Reference> {
        let mut dict = Dictionary::new();
        dict.set("Type", Name::new("Pages"));
        dict.set("Count", pages.len() as i64);
        let mut kids = Array::with_capacity(pages.len());
        for page in pages {
            kids.push(Object::Reference(*page));
        }
        dict.set("Kids", kids);
        let node = doc.add_object(Object::Dictionary(dict));
        for page in pages {
            self.set_parent_link(doc, *page, Some(node))?;
        }
        Ok(node)
    }

    fn emit_parent(&self, doc: &mut Document, children: &[(Reference, usize)]) -> Result<Reference> {
        let mut dict = Dictionary::new();
        dict.set("Type", Name::new("Pages"));
        dict.set(
            "Count",
            children.iter().map(|(_, count)| *count as i64).sum::<i64>(),
        );
        let mut kids = Array::with_capacity(children.len());
        for (child, _) in children {
            kids.push(Object::Reference(*child));
        }
        dict.set("Kids", kids);
        let node = doc.add_object(Object::Dictionary(dict));
        for (child, _) in children {
            if let Object::Dictionary(child_dict) = doc.get_mut(*child)? {
                child_dict.set("Parent", Object::Reference(node));
            }
        }
        Ok(node)
    }

    /// Re-roots the in-memory tree on the freshly built node and wires the
    /// catalog's `Pages` entry.
    fn attach(&mut self, doc: &mut Document, root: Reference) -> Result<()> {
        let count = self.page_count();
        doc.catalog_mut()?.set("Pages", Object::Reference(root));
        self.nodes = vec![Node {
            parent: None,
            from: 0,
            count,
            kids: Vec::new(),
            backing: Some(root),
            expanded: false,
        }];
        Ok(())
    }

    /// The count invariant: every loaded node's count equals the sum over its
    /// kids. Unexpanded sub-trees vouch for their own claimed counts.
    pub fn check_counts(&self) -> bool {
        self.nodes.iter().all(|node| {
            if !node.expanded {
                return true;
            }
            let sum: usize = node
                .kids
                .iter()
                .map(|kid| match kid {
                    Kid::Page(_) => 1,
                    Kid::Node(child) => self.nodes[*child].count,
                })
                .sum();
            sum == node.count
        })
    }
}

impl Default for PageTree {
    fn default() -> Self {
        Self::new()
    }
}

/// Splits `len` items into groups of [`PAGE_TREE_LEAF_SIZE`], widening the
/// last group to absorb a would-be singleton.
fn widened_groups(len: usize) -> Vec<std::ops::Range<usize>> {
    let mut groups = Vec::new();
    let mut start = 0;
    while start < len {
        let mut end = (start + PAGE_TREE_LEAF_SIZE).min(len);
        if len - end == 1 {
            end = len;
        }
        groups.push(start..end);
        start = end;
    }
    groups
}
