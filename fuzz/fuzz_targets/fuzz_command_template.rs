//! Fuzz target: argv construction from command templates.
//!
//! Splits the input into a template, a machine name and a snapshot name,
//! then checks that a successful build never yields an empty argument.

#![no_main]

use boxer_core::VmInfo;
use boxer_engine::build_argv;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let mut parts = text.splitn(3, '\0');
    let template = parts.next().unwrap_or_default();
    let machine = parts.next().unwrap_or_default();
    let snapshot = parts.next().unwrap_or_default();

    let info = VmInfo::new(machine, snapshot, "10.0.0.1", "linux", "fuzz");
    if let Ok(argv) = build_argv(template, &info) {
        assert!(!argv.is_empty(), "a successful build must yield a program");
        assert!(argv.iter().all(|arg| !arg.is_empty()), "arguments must be non-empty");
    }
});
