#![no_main]

use blockprof::mangle::mangle;
use blockprof::NAME_MAX;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(name) = std::str::from_utf8(data) {
        // Accepted names must come out short and stay fixed under mangling
        if let Ok(short) = mangle(name) {
            assert!(short.len() < NAME_MAX);
            assert_eq!(mangle(&short).ok().as_deref(), Some(short.as_str()));
        }
    }
});
