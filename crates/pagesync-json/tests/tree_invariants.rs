//! Property tests for the document tree.

use pagesync_json::{Document, NodeId, NodeKind};
use proptest::prelude::*;
use serde_json::{Map, Value};

fn arb_scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        (-1.0e6f64..1.0e6).prop_map(Value::from),
        "[a-z]{0,8}".prop_map(Value::String),
    ]
}

fn arb_value() -> impl Strategy<Value = Value> {
    arb_scalar().prop_recursive(4, 48, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,6}", inner, 0..6)
                .prop_map(|m| Value::Object(m.into_iter().collect::<Map<String, Value>>())),
        ]
    })
}

fn arb_document() -> impl Strategy<Value = Value> {
    prop::collection::btree_map("[a-z]{1,6}", arb_value(), 0..6)
        .prop_map(|m| Value::Object(m.into_iter().collect::<Map<String, Value>>()))
}

fn all_nodes(doc: &Document) -> Vec<NodeId> {
    let mut out = Vec::new();
    let mut stack = vec![doc.root()];
    while let Some(id) = stack.pop() {
        out.push(id);
        match doc.kind(id) {
            Some(NodeKind::Object(map)) => stack.extend(map.values().copied()),
            Some(NodeKind::Array(items)) => stack.extend(items.iter().copied()),
            _ => {}
        }
    }
    out
}

proptest! {
    #[test]
    fn path_resolves_back_to_node(value in arb_document()) {
        let doc = Document::from_value(&value);
        for id in all_nodes(&doc) {
            let path = doc.path(id);
            prop_assert_eq!(doc.get(&path), Some(id), "path {} did not resolve", path);
        }
    }

    #[test]
    fn value_snapshot_round_trips(value in arb_document()) {
        let doc = Document::from_value(&value);
        prop_assert_eq!(doc.to_value(), value);
    }

    #[test]
    fn deep_clone_equals_original(value in arb_document()) {
        let mut doc = Document::from_value(&value);
        for id in all_nodes(&doc) {
            let copy = doc.deep_clone(id).unwrap();
            prop_assert_ne!(copy, id);
            prop_assert_eq!(doc.parent(copy), None);
            prop_assert!(doc.deep_equals(copy, id));
            prop_assert!(doc.deep_equals(id, copy));
        }
    }

    #[test]
    fn scalar_update_never_requires_rebind(a in arb_scalar(), b in arb_scalar()) {
        let mut doc = Document::from_value(&serde_json::json!({ "slot": a }));
        let slot = doc.get("slot").unwrap();
        prop_assert!(!doc.update_value(slot, &b));
        prop_assert_eq!(doc.get("slot"), Some(slot));
    }

    #[test]
    fn container_swap_always_requires_rebind(a in arb_scalar(), items in prop::collection::vec(arb_scalar(), 0..4)) {
        let mut doc = Document::from_value(&serde_json::json!({ "slot": a }));
        let slot = doc.get("slot").unwrap();
        prop_assert!(doc.update_value(slot, &Value::Array(items.clone())));
        let replaced = doc.get("slot").unwrap();
        prop_assert!(doc.update_value(replaced, &Value::Null));
    }
}
