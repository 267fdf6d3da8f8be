#![no_main]

use kr_conformance::{FixtureCase, HarnessConfig, run_case};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(case) = serde_json::from_slice::<FixtureCase>(data) else {
        return;
    };
    // Load errors are fine; panics are not.
    let _ = run_case(&HarnessConfig::default_paths(), &case);
});
