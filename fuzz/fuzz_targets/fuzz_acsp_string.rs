//! Fuzzes untagged string decoding and the reader cursor that follows it.
//!
//! Run with:
//!   cargo +nightly fuzz run fuzz_acsp_string
#![no_main]
use libfuzzer_sys::fuzz_target;
use racing_wheel_acsp_protocol::{PacketReader, text};

fuzz_target!(|data: &[u8]| {
    let decoded = text::decode(data);
    assert!(decoded.consumed <= data.len());
    assert!(data.is_empty() || decoded.consumed >= 1);

    let mut reader = PacketReader::new(data);
    while reader.remaining() > 0 {
        let before = reader.offset();
        let _ = reader.read_string();
        assert!(reader.offset() > before);
    }
});
