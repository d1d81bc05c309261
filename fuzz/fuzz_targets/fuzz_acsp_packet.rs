//! Fuzzes the dedicated server plugin packet parser.
//!
//! Run with:
//!   cargo +nightly fuzz run fuzz_acsp_packet
#![no_main]
use libfuzzer_sys::fuzz_target;
use racing_wheel_acsp_protocol::parse_inbound_message;

fuzz_target!(|data: &[u8]| {
    // Must never panic on arbitrary bytes; decode errors are expected.
    let _ = parse_inbound_message(data);
});
