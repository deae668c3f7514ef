#![no_main]

use keepkey_core::Chunk;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Body of POST /exchange/device
    if let Ok(text) = std::str::from_utf8(data) {
        if let Ok(chunk) = Chunk::from_hex(text) {
            let hex = chunk.to_hex();
            assert_eq!(hex.len(), chunk.len() * 2);
            assert_eq!(Chunk::from_hex(&hex).unwrap(), chunk);
        }
    }

    // Any report read back from the device encodes cleanly
    let chunk = Chunk::new(data.to_vec());
    assert_eq!(Chunk::from_hex(&chunk.to_hex()).unwrap(), chunk);
});
