//! # slatepdf
//!
//! An object model and incremental serializer for PDF-style documents, in pure Rust.
//!
//! ## Features
//!
//! - **Object Model**: A closed set of object variants with indirect-reference
//!   lifecycle tracking (free, indirect, flushed, released)
//! - **Cross-Document Copy**: Deep copies between documents with reference-cycle
//!   safety and shared-subgraph deduplication
//! - **Incremental Writer**: Classic cross-reference tables or compressed
//!   object-stream output, with compression and encryption hooks
//! - **Smart Mode**: Content-hash deduplication of structurally identical
//!   dictionaries and streams
//! - **Balanced Page Tree**: Lazy loading of existing trees, 1-based page
//!   access, balanced rebuilds for new documents
//! - **Name Trees**: Sorted, limit-annotated name tree reading and building
//! - **Resource Tables**: Deterministic unique resource naming with
//!   self-reference cycle breaking
//!
//! ## Quick Start
//!
//! ```rust
//! use slatepdf::{Document, Object, PageTree, Result};
//!
//! # fn main() -> Result<()> {
//! let mut doc = Document::new();
//!
//! let mut pages = PageTree::new();
//! let page = doc.add_object(Object::Dictionary(slatepdf::Dictionary::new()));
//! pages.add_page(&mut doc, page)?;
//! pages.build_tree(&mut doc)?;
//!
//! doc.save_to_writer(Vec::new())?;
//! # Ok(())
//! # }
//! ```

pub mod document;
pub mod error;
pub mod name_tree;
pub mod names;
pub mod objects;
pub mod pages;
pub mod resources;
pub mod writer;

pub use document::{CopyContext, Document, DocumentId, ObjectFlags};
pub use error::{PdfError, Result};
pub use name_tree::{NameTree, NAME_TREE_NODE_SIZE};
pub use names::Name;
pub use objects::{
    Array, Dictionary, Object, ObjectId, PdfString, Reference, Stream, StringFormat,
};
pub use pages::{PageTree, PAGE_TREE_LEAF_SIZE};
pub use resources::ResourceTable;
pub use writer::{Encryptor, PdfWriter, WriterConfig};
