#![no_main]

use convoy_codec::frame::{decode_frame_json, encode_frame_json};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(frame) = decode_frame_json(text) {
        let _ = encode_frame_json(&frame);
    }
});
