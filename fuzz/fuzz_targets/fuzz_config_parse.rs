//! Fuzz target: TOML parsing and validation of `BoxerConfig`.
//!
//! Arbitrary text must never panic the parser or the validator; errors are
//! expected and fine.

#![no_main]

use boxer_core::BoxerConfig;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(config) = BoxerConfig::parse(text) {
        let _ = config.validate();
    }
});
