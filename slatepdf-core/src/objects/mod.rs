mod array;
mod dictionary;
mod primitive;
mod stream;

pub use array::Array;
pub use dictionary::Dictionary;
pub use primitive::{Object, ObjectId, PdfString, Reference, StringFormat};
pub use stream::Stream;
