use crate::error::{PdfError, Result};
use crate::names::Name;
use crate::objects::{Array, Dictionary, Object};

/// A stream object: a dictionary plus a byte payload.
///
/// The payload held here is the *stored* form. Whether it is raw or already
/// encoded is described by the dictionary's `/Filter` chain; the writer only
/// adds compression to streams that do not declare any filter yet.
#[derive(Debug, Clone, PartialEq)]
pub struct Stream {
    dictionary: Dictionary,
    data: Vec<u8>,
}

impl Stream {
    pub fn new(data: Vec<u8>) -> Self {
        let mut dictionary = Dictionary::new();
        dictionary.set("Length", data.len() as i64);
        Self { dictionary, data }
    }

    pub fn with_dictionary(mut dictionary: Dictionary, data: Vec<u8>) -> Self {
        dictionary.set("Length", data.len() as i64);
        Self { dictionary, data }
    }

    pub fn dictionary(&self) -> &Dictionary {
        &self.dictionary
    }

    pub fn dictionary_mut(&mut self) -> &mut Dictionary {
        &mut self.dictionary
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn set_data(&mut self, data: Vec<u8>) {
        self.dictionary.set("Length", data.len() as i64);
        self.data = data;
    }

    /// Whether the stream already declares a filter chain.
    pub fn has_filters(&self) -> bool {
        self.dictionary.contains_key("Filter")
    }

    /// Metadata streams are written uncompressed so external tooling can read
    /// them without running the filter chain.
    pub fn is_metadata(&self) -> bool {
        self.dictionary.type_name() == Some("Metadata")
    }

    /// Prepends `filter` to the filter chain.
    ///
    /// `/Filter` and `/DecodeParms` are either a bare entry or a parallel
    /// pair of arrays; when decode parameters exist, a `null` placeholder is
    /// prepended alongside the new filter so the two arrays stay
    /// index-aligned.
    pub fn prepend_filter(&mut self, filter: Name) -> Result<()> {
        let chained = match self.dictionary.remove("Filter") {
            None => Object::Name(filter),
            Some(Object::Name(existing)) => {
                let mut filters = Array::new();
                filters.push(Object::Name(filter));
                filters.push(Object::Name(existing));
                Object::Array(filters)
            }
            Some(Object::Array(existing)) => {
                let mut filters = Array::with_capacity(existing.len() + 1);
                filters.push(Object::Name(filter));
                for entry in existing {
                    filters.push(entry);
                }
                Object::Array(filters)
            }
            Some(other) => {
                return Err(PdfError::InvalidFilter(format!(
                    "Filter entry must be a name or an array, found {other:?}"
                )))
            }
        };
        self.dictionary.set("Filter", chained);

        match self.dictionary.remove("DecodeParms") {
            None => {}
            Some(Object::Array(existing)) => {
                let mut parms = Array::with_capacity(existing.len() + 1);
                parms.push(Object::Null);
                for entry in existing {
                    parms.push(entry);
                }
                self.dictionary.set("DecodeParms", parms);
            }
            Some(single) => {
                let mut parms = Array::with_capacity(2);
                parms.push(Object::Null);
                parms.push(single);
                self.dictionary.set("DecodeParms", parms);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_sets_length() {
        let stream = Stream::new(vec![1, 2, 3, 4, 5]);
        assert_eq!(stream.dictionary().get_integer("Length"), Some(5));
        assert_eq!(stream.data(), &[1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_set_data_updates_length() {
        let mut stream = Stream::new(vec![1, 2, 3]);
        stream.set_data(vec![9; 10]);
        assert_eq!(stream.dictionary().get_integer("Length"), Some(10));
    }

    #[test]
    fn test_prepend_filter_to_bare_stream() {
        let mut stream = Stream::new(vec![0]);
        assert!(!stream.has_filters());

        stream.prepend_filter(Name::new("FlateDecode")).unwrap();
        assert!(stream.has_filters());
        assert_eq!(
            stream.dictionary().get_name("Filter").map(Name::as_str),
            Some("FlateDecode")
        );
    }

    #[test]
    fn test_prepend_filter_to_single_existing_filter() {
        let mut stream = Stream::new(vec![0]);
        stream
            .dictionary_mut()
            .set("Filter", Object::Name(Name::new("ASCIIHexDecode")));

        stream.prepend_filter(Name::new("FlateDecode")).unwrap();
        let filters = stream.dictionary().get_array("Filter").unwrap();
        assert_eq!(filters.len(), 2);
        assert_eq!(
            filters.get(0).and_then(Object::as_name).map(Name::as_str),
            Some("FlateDecode")
        );
        assert_eq!(
            filters.get(1).and_then(Object::as_name).map(Name::as_str),
            Some("ASCIIHexDecode")
        );
    }

    #[test]
    fn test_prepend_filter_keeps_decode_parms_aligned() {
        let mut stream = Stream::new(vec![0]);
        stream
            .dictionary_mut()
            .set("Filter", Object::Name(Name::new("LZWDecode")));
        let mut parms = Dictionary::new();
        parms.set("Predictor", 12i64);
        stream.dictionary_mut().set("DecodeParms", parms);

        stream.prepend_filter(Name::new("FlateDecode")).unwrap();

        let filters = stream.dictionary().get_array("Filter").unwrap();
        let parms = stream.dictionary().get_array("DecodeParms").unwrap();
        assert_eq!(filters.len(), parms.len());
        assert_eq!(parms.get(0), Some(&Object::Null));
        assert!(parms.get(1).and_then(Object::as_dict).is_some());
    }

    #[test]
    fn test_prepend_filter_rejects_bad_filter_value() {
        let mut stream = Stream::new(vec![0]);
        stream.dictionary_mut().set("Filter", Object::Integer(9));

        let err = stream.prepend_filter(Name::new("FlateDecode")).unwrap_err();
        assert!(matches!(err, PdfError::InvalidFilter(_)));
    }

    #[test]
    fn test_metadata_detection() {
        let mut dict = Dictionary::new();
        dict.set("Type", Name::new("Metadata"));
        let stream = Stream::with_dictionary(dict, vec![]);
        assert!(stream.is_metadata());
        assert!(!Stream::new(vec![]).is_metadata());
    }
}
