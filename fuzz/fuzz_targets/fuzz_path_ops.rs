#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use pagesync_json::{Document, normalize_path};
use serde_json::json;

#[derive(Debug, Arbitrary)]
struct Input {
    lookup: String,
    write: String,
    value: i64,
}

fuzz_target!(|input: Input| {
    let mut doc = Document::from_value(&json!({
        "items": [{"name": "a"}, {"name": "b"}],
        "form": {"field": ""}
    }));

    let normalized = normalize_path(&input.lookup);
    assert!(!normalized.contains(['[', ']']));
    let _ = doc.get(&input.lookup);

    if let Ok(node) = doc.set_path(&input.write, &json!(input.value)) {
        assert!(doc.contains(node));
    }
    // The tree must stay serializable whatever was written.
    let _ = doc.to_value();
});
