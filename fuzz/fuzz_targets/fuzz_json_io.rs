#![no_main]

use kr_io::{read_json_str, read_jsonl_str, write_records_json};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };

    for dataset in [read_json_str("fuzz", input), read_jsonl_str("fuzz", input)]
        .into_iter()
        .flatten()
    {
        assert!(
            dataset
                .records()
                .iter()
                .all(|record| record.len() == dataset.header().len())
        );
        let _ = write_records_json(dataset.records());
    }
});
