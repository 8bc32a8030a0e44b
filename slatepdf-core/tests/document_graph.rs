//! Cross-document copies, name trees, and resource tables
//!
//! Exercises the reference graph across document boundaries and the two
//! index structures end to end through the public API.

use slatepdf::{
    CopyContext, Dictionary, Document, Name, NameTree, Object, PdfError, PdfString, Reference,
    ResourceTable, NAME_TREE_NODE_SIZE,
};

fn dict_of(doc: &Document, reference: Reference) -> Dictionary {
    match doc.get(reference).unwrap() {
        Object::Dictionary(dict) => dict.clone(),
        other => panic!("expected a dictionary, found {other:?}"),
    }
}

#[test]
fn test_shared_subgraph_is_copied_once() {
    let mut source = Document::new();
    let mut leaf = Dictionary::new();
    leaf.set("V", 1i64);
    let leaf = source.add_object(Object::Dictionary(leaf));

    let mut first = Dictionary::new();
    first.set("Leaf", leaf);
    let first = source.add_object(Object::Dictionary(first));
    let mut second = Dictionary::new();
    second.set("Leaf", leaf);
    let second = source.add_object(Object::Dictionary(second));

    let mut target = Document::new();
    let mut context = CopyContext::new();
    let copied_first = target
        .import_object(&source, &Object::Reference(first), false, &mut context)
        .unwrap();
    let copied_second = target
        .import_object(&source, &Object::Reference(second), false, &mut context)
        .unwrap();

    let first_leaf = dict_of(&target, copied_first.as_reference().unwrap())
        .get_reference("Leaf")
        .unwrap();
    let second_leaf = dict_of(&target, copied_second.as_reference().unwrap())
        .get_reference("Leaf")
        .unwrap();
    assert_eq!(first_leaf, second_leaf);
    assert_eq!(
        dict_of(&target, first_leaf).get_integer("V"),
        Some(1)
    );
}

#[test]
fn test_reference_cycle_copies_and_terminates() {
    let mut source = Document::new();
    let node = source.add_object(Object::Dictionary(Dictionary::new()));
    match source.get_mut(node).unwrap() {
        Object::Dictionary(dict) => dict.set("Self", node),
        other => panic!("expected a dictionary, found {other:?}"),
    }

    for allow_duplicating in [false, true] {
        let mut target = Document::new();
        let mut context = CopyContext::new();
        let copied = target
            .import_object(
                &source,
                &Object::Reference(node),
                allow_duplicating,
                &mut context,
            )
            .unwrap();
        let copied = copied.as_reference().unwrap();
        let inner = dict_of(&target, copied).get_reference("Self").unwrap();
        assert_eq!(inner, copied);
    }
}

#[test]
fn test_catalog_never_crosses_documents() {
    let source = Document::new();
    let catalog = source.catalog_ref();

    let mut target = Document::new();
    let mut context = CopyContext::new();
    let err = target
        .import_object(&source, &Object::Reference(catalog), false, &mut context)
        .unwrap_err();
    assert!(matches!(err, PdfError::CatalogNotCopyable));

    // Reached through recursion it degrades to null instead of failing the
    // whole copy.
    let mut source = Document::new();
    let catalog = source.catalog_ref();
    let mut holder = Dictionary::new();
    holder.set("Owner", catalog);
    holder.set("Kept", 7i64);
    let holder = source.add_object(Object::Dictionary(holder));

    let mut context = CopyContext::new();
    let copied = target
        .import_object(&source, &Object::Reference(holder), false, &mut context)
        .unwrap();
    let copied = dict_of(&target, copied.as_reference().unwrap());
    assert!(matches!(copied.get("Owner"), Some(Object::Null)));
    assert_eq!(copied.get_integer("Kept"), Some(7));
}

#[test]
fn test_catalog_release_is_refused() {
    let mut doc = Document::new();
    let catalog = doc.catalog_ref();
    let err = doc.release(catalog).unwrap_err();
    assert!(matches!(err, PdfError::Lifecycle(_)));
}

#[test]
fn test_name_tree_round_trip_keeps_order_and_limits() {
    let entry_count = NAME_TREE_NODE_SIZE + 35;
    let mut doc = Document::new();
    let mut tree = NameTree::new();
    // Insert out of order; the tree keeps keys sorted.
    for i in (0..entry_count).rev() {
        let key = format!("name{i:03}");
        tree.add_entry(&doc, key, Object::String(PdfString::literal(format!("v{i}"))))
            .unwrap();
    }
    let root = tree.build_tree(&mut doc).unwrap();

    let root_dict = dict_of(&doc, root);
    let kids = root_dict.get_array("Kids").unwrap().clone();
    assert!(kids.len() >= 2);
    assert!(!root_dict.contains_key("Limits"));
    let first_leaf = dict_of(&doc, kids.get(0).unwrap().as_reference().unwrap());
    let limits = first_leaf.get_array("Limits").unwrap();
    assert_eq!(
        limits.get(0).and_then(|o| o.as_string()).map(|s| s.as_bytes()),
        Some(&b"name000"[..])
    );

    let mut reloaded = NameTree::from_root(root);
    let names = reloaded.get_names(&doc).unwrap();
    assert_eq!(names.len(), entry_count);
    let keys: Vec<&String> = names.keys().collect();
    let mut sorted = keys.clone();
    sorted.sort();
    assert_eq!(keys, sorted);
}

#[test]
fn test_name_tree_rejects_duplicate_keys() {
    let doc = Document::new();
    let mut tree = NameTree::new();
    tree.add_entry(&doc, "dest", Object::Integer(1)).unwrap();
    let err = tree.add_entry(&doc, "dest", Object::Integer(2)).unwrap_err();
    assert!(matches!(err, PdfError::DuplicateNameEntry(key) if key == "dest"));
}

#[test]
fn test_resource_names_are_unique_and_stable() {
    let mut doc = Document::new();
    let mut table = ResourceTable::new();

    let mut forms = Vec::new();
    for i in 0..3 {
        let mut dict = Dictionary::new();
        dict.set("Subtype", Name::new("Form"));
        dict.set("Tag", i as i64);
        forms.push(doc.add_object(Object::Dictionary(dict)));
    }

    let names: Vec<Name> = forms
        .iter()
        .map(|form| {
            table
                .add_resource(&mut doc, Name::new("XObject"), *form)
                .unwrap()
        })
        .collect();
    assert_eq!(names[0].as_str(), "X1");
    assert_eq!(names[1].as_str(), "X2");
    assert_eq!(names[2].as_str(), "X3");

    // Re-adding returns the original name.
    let again = table
        .add_resource(&mut doc, Name::new("XObject"), forms[1])
        .unwrap();
    assert_eq!(again, names[1]);

    assert_eq!(table.get("XObject", "X3"), Some(forms[2]));
}

#[test]
fn test_loaded_resource_names_are_not_reused() {
    let mut doc = Document::new();
    let mut table = ResourceTable::new();
    let font = doc.add_object(Object::Dictionary(Dictionary::new()));
    let extra = doc.add_object(Object::Dictionary(Dictionary::new()));
    table.add_resource(&mut doc, Name::new("Font"), font).unwrap();
    table.add_resource(&mut doc, Name::new("Font"), extra).unwrap();

    let resources = doc.add_object(Object::Dictionary(table.to_dictionary()));
    let mut reloaded = ResourceTable::from_dictionary(&doc, resources).unwrap();

    let newcomer = doc.add_object(Object::Dictionary(Dictionary::new()));
    let name = reloaded
        .add_resource(&mut doc, Name::new("Font"), newcomer)
        .unwrap();
    assert_eq!(name.as_str(), "F3");
}
