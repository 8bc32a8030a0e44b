use crate::objects::ObjectId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PdfError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid document structure: {0}")]
    Structure(String),

    #[error("Object lifecycle violation: {0}")]
    Lifecycle(String),

    #[error("Reference {0} belongs to a different document")]
    ForeignReference(ObjectId),

    #[error("The catalog is owned by its document and cannot be copied or flushed directly")]
    CatalogNotCopyable,

    #[error("Name tree entry already exists: {0}")]
    DuplicateNameEntry(String),

    #[error("Invalid filter entry: {0}")]
    InvalidFilter(String),

    #[error("Invalid page number: {0}")]
    InvalidPageNumber(usize),

    #[error("Compression error: {0}")]
    Compression(String),
}

pub type Result<T> = std::result::Result<T, PdfError>;
