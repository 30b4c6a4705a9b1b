//! Fuzz target for campaign and label message decoding

#![no_main]

use libfuzzer_sys::fuzz_target;
use tally_core::{Campaign, LabelMessage, TransactionId};

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(campaign) = Campaign::from_json(text) {
        let json = campaign.to_json().unwrap();
        assert_eq!(Campaign::from_json(&json).unwrap(), campaign);
    }

    let _ = LabelMessage::from_json(text);
    let _ = TransactionId::new(text);
});
