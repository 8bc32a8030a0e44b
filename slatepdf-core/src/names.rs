//! Interned name tokens.
//!
//! Names are short symbolic tokens (`/Type`, `/Pages`, ...) that appear in
//! virtually every dictionary. The well-known ones are interned once into a
//! process-wide registry so repeated construction is an allocation-free table
//! lookup; the registry is built eagerly on first use and never mutated
//! afterwards, which makes concurrent reads safe without locking.

use lazy_static::lazy_static;
use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Tokens that get an interned entry in the registry. Anything not listed
/// here still works as a `Name`, it just allocates on construction.
const WELL_KNOWN: &[&str] = &[
    "Type", "Subtype", "Catalog", "Pages", "Page", "Kids", "Count", "Parent",
    "Names", "Limits", "Dests", "EmbeddedFiles", "Length", "Filter",
    "DecodeParms", "FlateDecode", "Resources", "Font", "XObject", "ExtGState",
    "ColorSpace", "Pattern", "Shading", "Properties", "Contents", "MediaBox",
    "Metadata", "ObjStm", "XRef", "N", "First", "W", "Index", "Size", "Root",
    "Prev", "Null", "Info",
];

lazy_static! {
    static ref REGISTRY: HashMap<&'static str, Name> = {
        let mut table = HashMap::with_capacity(WELL_KNOWN.len());
        for token in WELL_KNOWN {
            table.insert(*token, Name(Arc::from(*token)));
        }
        table
    };
}

/// A canonical, cheaply clonable name token.
///
/// Comparison and ordering are by token text, so two names constructed
/// independently from the same text are equal whether or not they were
/// interned.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Name(Arc<str>);

impl Name {
    pub fn new(token: impl AsRef<str>) -> Self {
        let token = token.as_ref();
        if let Some(interned) = REGISTRY.get(token) {
            return interned.clone();
        }
        Name(Arc::from(token))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Appends the serialized form (`/Token` with `#xx` escapes) to `out`.
    ///
    /// Delimiters, whitespace and `#` itself must be escaped so the token
    /// survives re-tokenization; everything else is written verbatim.
    pub fn write_escaped(&self, out: &mut Vec<u8>) {
        out.push(b'/');
        for &byte in self.0.as_bytes() {
            if needs_escape(byte) {
                out.push(b'#');
                out.extend_from_slice(format!("{byte:02X}").as_bytes());
            } else {
                out.push(byte);
            }
        }
    }
}

fn needs_escape(byte: u8) -> bool {
    matches!(
        byte,
        b' ' | b'%' | b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'#'
    ) || byte < 0x21
        || byte > 0x7e
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.0)
    }
}

impl From<&str> for Name {
    fn from(token: &str) -> Self {
        Name::new(token)
    }
}

impl From<String> for Name {
    fn from(token: String) -> Self {
        Name::new(token)
    }
}

impl Borrow<str> for Name {
    fn borrow(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interned_names_share_storage() {
        let a = Name::new("Pages");
        let b = Name::new("Pages");
        assert!(Arc::ptr_eq(&a.0, &b.0));
    }

    #[test]
    fn test_interned_and_ad_hoc_names_compare_equal() {
        let interned = Name::new("Type");
        let ad_hoc = Name(Arc::from("Type"));
        assert_eq!(interned, ad_hoc);
    }

    #[test]
    fn test_ordering_is_textual() {
        let mut names = vec![Name::new("Kids"), Name::new("Count"), Name::new("Type")];
        names.sort();
        let tokens: Vec<&str> = names.iter().map(Name::as_str).collect();
        assert_eq!(tokens, vec!["Count", "Kids", "Type"]);
    }

    #[test]
    fn test_escaping_plain_token() {
        let mut out = Vec::new();
        Name::new("FlateDecode").write_escaped(&mut out);
        assert_eq!(out, b"/FlateDecode");
    }

    #[test]
    fn test_escaping_reserved_bytes() {
        let mut out = Vec::new();
        Name::new("A B#C/D").write_escaped(&mut out);
        assert_eq!(out, b"/A#20B#23C#2FD");
    }

    #[test]
    fn test_escaping_parens_and_brackets() {
        let mut out = Vec::new();
        Name::new("x(y)[z]").write_escaped(&mut out);
        assert_eq!(out, b"/x#28y#29#5Bz#5D");
    }

    #[test]
    fn test_display() {
        assert_eq!(Name::new("Catalog").to_string(), "/Catalog");
    }
}
