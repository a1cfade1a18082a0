#![no_main]

use libfuzzer_sys::fuzz_target;
use sealtalk_core::Interaction;

fuzz_target!(|data: &str| {
    if let Ok(interaction) = Interaction::parse(data) {
        let encoded = interaction.encode();
        assert!(encoded.len() <= sealtalk_core::interaction::MAX_PAYLOAD_LEN);
        assert_eq!(Interaction::parse(&encoded), Ok(interaction));
    }
});
