#![no_main]

use libfuzzer_sys::fuzz_target;
use pagesync_runtime::Response;

fuzz_target!(|data: &[u8]| {
    if let Ok(response) = serde_json::from_slice::<Response>(data) {
        let encoded = serde_json::to_vec(&response).unwrap();
        let again: Response = serde_json::from_slice(&encoded).unwrap();
        assert_eq!(again, response);
    }
});
