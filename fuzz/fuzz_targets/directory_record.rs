//! Fuzz target for directory record parsing
//!
//! Records are fetched from an external directory and must never crash the
//! parser.

#![no_main]

use libfuzzer_sys::fuzz_target;
use tally_discovery::{DirectoryRecord, TrustedKeySet};

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(record) = text.parse::<DirectoryRecord>() {
        // Anything accepted re-encodes to a record with the same key
        let reparsed: DirectoryRecord = record.to_string().parse().unwrap();
        assert_eq!(reparsed, record);
    }

    let records: Vec<&str> = text.lines().collect();
    let _ = TrustedKeySet::from_records("fuzz.example", &records);
});
