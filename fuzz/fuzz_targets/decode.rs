#![no_main]
use libfuzzer_sys::fuzz_target;
use serde_json::Value;
use valshape::{DecodeOptions, Decoder, Schema, SerdeSchema};

fuzz_target!(|data: &[u8]| {
    let (serde_schema, instance): (SerdeSchema, Value) = match serde_json::from_slice(data) {
        Ok(pair) => pair,
        Err(_) => return,
    };

    // Only well-formed schemas are interesting here.
    let schema = match Schema::try_from(serde_schema) {
        Ok(schema) => schema,
        Err(_) => return,
    };

    let decoder = Decoder::new(DecodeOptions::new().with_max_depth(64));
    let _ = decoder.validate(&schema, &instance);
    let _ = decoder.safe_parse(&schema, &instance);
});
