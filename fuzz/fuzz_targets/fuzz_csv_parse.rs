#![no_main]

use kr_io::{read_csv_str, write_csv_string};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(dataset) = read_csv_str("fuzz", input) else {
        return;
    };

    // Every loaded cell is text or null, and writing never fails.
    assert!(dataset.records().iter().all(|record| {
        record
            .iter()
            .all(|(_, value)| matches!(value.dtype(), kr_types::DType::Utf8 | kr_types::DType::Null))
    }));
    write_csv_string(dataset.records()).expect("csv write");
});
