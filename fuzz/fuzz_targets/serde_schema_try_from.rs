#![no_main]
use libfuzzer_sys::fuzz_target;
use valshape::{Schema, SerdeSchema};

fuzz_target!(|data: &[u8]| {
    if let Ok(serde_schema) = serde_json::from_slice::<SerdeSchema>(data) {
        let _ = Schema::try_from(serde_schema);
    }
});
