//! Per-content-stream resource table.
//!
//! Maps category names (`/Font`, `/XObject`, ...) to sub-dictionaries of
//! generated unique names. Registration is idempotent by object identity and
//! name generation tolerates externally loaded tables that already carry
//! names in the counter's namespace.

use crate::document::Document;
use crate::error::{PdfError, Result};
use crate::names::Name;
use crate::objects::{Dictionary, Object, Reference};
use std::collections::{BTreeMap, HashMap};

fn category_prefix(category: &Name) -> &'static str {
    match category.as_str() {
        "Font" => "F",
        "XObject" => "X",
        "ExtGState" => "GS",
        "ColorSpace" => "CS",
        "Pattern" => "P",
        "Shading" => "Sh",
        "Properties" => "Pr",
        _ => "R",
    }
}

pub struct ResourceTable {
    /// Indirect dictionary this table materializes into, when it has one.
    backing: Option<Reference>,
    categories: BTreeMap<Name, BTreeMap<Name, Reference>>,
    /// Identity map: (category, object number) -> assigned name.
    registered: HashMap<(Name, u32), Name>,
    counters: HashMap<Name, u32>,
}

impl ResourceTable {
    pub fn new() -> Self {
        Self {
            backing: None,
            categories: BTreeMap::new(),
            registered: HashMap::new(),
            counters: HashMap::new(),
        }
    }

    /// Loads an existing table so newly generated names skip the ones the
    /// external author already used.
    pub fn from_dictionary(doc: &Document, backing: Reference) -> Result<Self> {
        let mut table = Self::new();
        table.backing = Some(backing);

        let dict = match doc.get(backing)? {
            Object::Dictionary(dict) => dict.clone(),
            other => {
                return Err(PdfError::Structure(format!(
                    "resource table {} is not a dictionary, found {other:?}",
                    backing.id()
                )))
            }
        };
        for (category, value) in dict.iter() {
            let sub = match doc.resolve(value)? {
                Object::Dictionary(sub) => sub,
                _ => continue,
            };
            for (name, entry) in sub.iter() {
                if let Object::Reference(r) = entry {
                    table
                        .categories
                        .entry(category.clone())
                        .or_default()
                        .insert(name.clone(), *r);
                    table
                        .registered
                        .insert((category.clone(), r.number()), name.clone());
                }
            }
        }
        Ok(table)
    }

    pub fn backing(&self) -> Option<Reference> {
        self.backing
    }

    pub fn set_backing(&mut self, backing: Reference) {
        self.backing = Some(backing);
    }

    /// Registers `resource` under `category` and returns its name.
    ///
    /// Re-adding the same object returns the name assigned the first time.
    /// A resource whose own `Resources` entry points back at this table is a
    /// self-referential chain; the table it points to is cloned at its
    /// current state and the resource re-targeted at the clone, which breaks
    /// the cycle without losing the sharing elsewhere.
    pub fn add_resource(
        &mut self,
        doc: &mut Document,
        category: Name,
        resource: Reference,
    ) -> Result<Name> {
        if resource.document() != doc.id() {
            return Err(PdfError::ForeignReference(resource.id()));
        }
        if let Some(name) = self.registered.get(&(category.clone(), resource.number())) {
            return Ok(name.clone());
        }

        self.break_self_reference(doc, resource)?;

        let name = self.generate_name(&category);
        self.categories
            .entry(category.clone())
            .or_default()
            .insert(name.clone(), resource);
        self.registered
            .insert((category, resource.number()), name.clone());
        Ok(name)
    }

    /// Name assigned to an already-registered resource, if any.
    pub fn name_for(&self, category: &Name, resource: Reference) -> Option<&Name> {
        self.registered.get(&(category.clone(), resource.number()))
    }

    pub fn get(&self, category: &str, name: &str) -> Option<Reference> {
        self.categories.get(category)?.get(name).copied()
    }

    fn break_self_reference(&self, doc: &mut Document, resource: Reference) -> Result<()> {
        let Some(backing) = self.backing else {
            return Ok(());
        };
        let points_back = match doc.get(resource)? {
            Object::Dictionary(dict) => dict.get_reference("Resources") == Some(backing),
            Object::Stream(stream) => {
                stream.dictionary().get_reference("Resources") == Some(backing)
            }
            _ => false,
        };
        if !points_back {
            return Ok(());
        }

        let snapshot = doc.clone_object(backing)?;
        match doc.get_mut(resource)? {
            Object::Dictionary(dict) => dict.set("Resources", Object::Reference(snapshot)),
            Object::Stream(stream) => stream
                .dictionary_mut()
                .set("Resources", Object::Reference(snapshot)),
            _ => {}
        }
        Ok(())
    }

    fn generate_name(&mut self, category: &Name) -> Name {
        let prefix = category_prefix(category);
        let existing = self.categories.get(category);
        loop {
            let counter = self.counters.entry(category.clone()).or_insert(0);
            *counter += 1;
            let candidate = Name::new(format!("{prefix}{counter}"));
            let taken = existing.is_some_and(|names| names.contains_key(candidate.as_str()));
            if !taken {
                return candidate;
            }
        }
    }

    /// Materializes the table as a dictionary of per-category
    /// sub-dictionaries.
    pub fn to_dictionary(&self) -> Dictionary {
        let mut dict = Dictionary::new();
        for (category, names) in &self.categories {
            let mut sub = Dictionary::new();
            for (name, reference) in names {
                sub.set(name.clone(), Object::Reference(*reference));
            }
            dict.set(category.clone(), sub);
        }
        dict
    }

    /// Writes the materialized table back into its backing object.
    pub fn store(&self, doc: &mut Document) -> Result<()> {
        let Some(backing) = self.backing else {
            return Ok(());
        };
        *doc.get_mut(backing)? = Object::Dictionary(self.to_dictionary());
        Ok(())
    }
}

impl Default for ResourceTable {
    fn default() -> Self {
        Self::new()
    }
}
