use crate::names::Name;
use crate::objects::{Array, Object, Reference};
use std::collections::BTreeMap;

/// Mapping of names to objects.
///
/// Backed by a `BTreeMap` so iteration order is the key order, not insertion
/// order. The canonical serialization used for content hashing depends on
/// this: two dictionaries built in different orders must produce identical
/// bytes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Dictionary {
    entries: BTreeMap<Name, Object>,
}

impl Dictionary {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    pub fn set(&mut self, key: impl Into<Name>, value: impl Into<Object>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Object> {
        self.entries.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Object> {
        self.entries.get_mut(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Object> {
        self.entries.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn keys(&self) -> impl Iterator<Item = &Name> {
        self.entries.keys()
    }

    /// Entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&Name, &Object)> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&Name, &mut Object)> {
        self.entries.iter_mut()
    }

    pub fn get_name(&self, key: &str) -> Option<&Name> {
        self.get(key).and_then(Object::as_name)
    }

    pub fn get_integer(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(Object::as_integer)
    }

    pub fn get_dict(&self, key: &str) -> Option<&Dictionary> {
        self.get(key).and_then(Object::as_dict)
    }

    pub fn get_array(&self, key: &str) -> Option<&Array> {
        self.get(key).and_then(Object::as_array)
    }

    pub fn get_reference(&self, key: &str) -> Option<Reference> {
        self.get(key).and_then(Object::as_reference)
    }

    /// Value of the `/Type` entry, if present and a name.
    pub fn type_name(&self) -> Option<&str> {
        self.get_name("Type").map(Name::as_str)
    }
}

impl FromIterator<(Name, Object)> for Dictionary {
    fn from_iter<T: IntoIterator<Item = (Name, Object)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_get() {
        let mut dict = Dictionary::new();
        dict.set("Count", 3i64);
        dict.set("Type", Name::new("Pages"));

        assert_eq!(dict.get_integer("Count"), Some(3));
        assert_eq!(dict.type_name(), Some("Pages"));
        assert!(dict.get("Missing").is_none());
    }

    #[test]
    fn test_set_overwrites() {
        let mut dict = Dictionary::new();
        dict.set("Count", 1i64);
        dict.set("Count", 2i64);
        assert_eq!(dict.len(), 1);
        assert_eq!(dict.get_integer("Count"), Some(2));
    }

    #[test]
    fn test_iteration_is_key_ordered() {
        let mut dict = Dictionary::new();
        dict.set("Zoo", Object::Null);
        dict.set("Alpha", Object::Null);
        dict.set("Mid", Object::Null);

        let keys: Vec<&str> = dict.keys().map(Name::as_str).collect();
        assert_eq!(keys, vec!["Alpha", "Mid", "Zoo"]);
    }

    #[test]
    fn test_equality_ignores_insertion_order() {
        let mut a = Dictionary::new();
        a.set("X", 1i64);
        a.set("Y", 2i64);

        let mut b = Dictionary::new();
        b.set("Y", 2i64);
        b.set("X", 1i64);

        assert_eq!(a, b);
    }

    #[test]
    fn test_typed_getters() {
        let mut dict = Dictionary::new();
        dict.set("Kids", Array::from(vec![Object::Null]));
        let mut inner = Dictionary::new();
        inner.set("A", 1i64);
        dict.set("Inner", inner);

        assert_eq!(dict.get_array("Kids").map(Array::len), Some(1));
        assert!(dict.get_dict("Inner").is_some());
        assert!(dict.get_dict("Kids").is_none());
    }

    #[test]
    fn test_remove() {
        let mut dict = Dictionary::new();
        dict.set("A", 1i64);
        assert_eq!(dict.remove("A"), Some(Object::Integer(1)));
        assert!(dict.is_empty());
    }
}
