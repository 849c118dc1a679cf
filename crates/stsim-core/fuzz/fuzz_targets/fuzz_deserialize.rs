#![no_main]
use libfuzzer_sys::fuzz_target;
use stsim_core::serialize::{read_snapshot_header, IterationSnapshot};

fuzz_target!(|data: &[u8]| {
    // Feed arbitrary bytes to the snapshot decoders.
    // Must not panic -- returning Err is fine.
    let _ = read_snapshot_header(data);
    let _ = IterationSnapshot::from_bytes(data);
});
