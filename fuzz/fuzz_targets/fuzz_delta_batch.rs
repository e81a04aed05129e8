#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use pagesync_binding::{DeltaRecord, ValueBinding, ViewModel};
use serde_json::json;

#[derive(Debug, Arbitrary)]
enum Op {
    Object(String),
    Update(String, i32),
    Add(String, i32),
    Remove(String),
}

fuzz_target!(|ops: Vec<Op>| {
    let vm = ViewModel::new();
    vm.initialize(&json!({
        "list": [{"v": 0}, {"v": 1}, {"v": 2}],
        "form": {"a": 1, "b": 2}
    }));
    for path in ["list[0].v", "list[2].v", "form.a"] {
        let id = vm.register_value_binding(ValueBinding::new(
            vm.root_context().select(path),
            || json!(0),
        ));
        vm.refresh_binding(id);
    }

    let deltas: Vec<DeltaRecord> = ops
        .into_iter()
        .map(|op| match op {
            Op::Object(path) => DeltaRecord::object(path),
            Op::Update(path, v) => DeltaRecord::update(path, json!(v)),
            Op::Add(path, v) => DeltaRecord::add(path, json!(v)),
            Op::Remove(path) => DeltaRecord::remove(path),
        })
        .collect();
    let _ = vm.apply_server_deltas(&deltas, true);
    let _ = vm.to_value();
    let _ = vm.collect_dirty_deltas();
});
