#![no_main]

use libfuzzer_sys::fuzz_target;
use pagesync_binding::{BindingContext, PropertyValue};
use pagesync_json::Document;
use serde_json::json;

fuzz_target!(|data: &[u8]| {
    let Ok(template) = std::str::from_utf8(data) else {
        return;
    };
    let doc = Document::from_value(&json!({
        "title": "Home",
        "count": 3,
        "price": 12.5,
        "flags": {"on": true, "off": false},
        "items": [1, 2, 3]
    }));
    let value = PropertyValue::parse(template, &BindingContext::root(), &doc);
    let _ = value.expand(&doc);
    value.rebind(&doc);
    let _ = value.expand(&doc);
});
