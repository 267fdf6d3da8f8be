#![no_main]

use kr_frame::Record;
use kr_join::reconcile;
use kr_types::Scalar;
use libfuzzer_sys::fuzz_target;

fn rows(bytes: &[u8], key: &str) -> Vec<Record> {
    bytes
        .iter()
        .enumerate()
        .map(|(idx, byte)| {
            let cell = match byte % 4 {
                0 => Scalar::null(),
                1 => Scalar::Int64(i64::from(byte >> 2)),
                2 => Scalar::Utf8((byte >> 2).to_string()),
                _ => Scalar::Float64(f64::from(byte >> 2)),
            };
            Record::from_pairs([(key, cell), ("pos", Scalar::Int64(idx as i64))])
        })
        .collect()
}

fuzz_target!(|data: &[u8]| {
    let split = data.first().map_or(0, |b| usize::from(*b)).min(data.len());
    let (left_bytes, right_bytes) = data.split_at(split);
    let left = rows(left_bytes, "a");
    let right = rows(right_bytes, "b");

    let out = reconcile(&left, "a", &right, "b").expect("non-empty keys never fail");
    assert_eq!(left.len(), out.matches.len() + out.only_in_left.len());
    assert!(out.only_in_right.len() <= right.len());
});
