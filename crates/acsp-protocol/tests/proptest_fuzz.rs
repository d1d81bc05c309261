//! Property-based fuzz tests for the plugin protocol decoder.
//!
//! Ensures the decoder never panics on arbitrary or random input and that
//! string reads always land the cursor on a well-defined position.

use proptest::prelude::*;
use racing_wheel_acsp_protocol::{PacketReader, parse_inbound_message, text};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// Arbitrary random bytes of any length must never cause a panic.
    #[test]
    fn prop_random_bytes_no_panic(
        data in proptest::collection::vec(any::<u8>(), 0..512)
    ) {
        let _ = parse_inbound_message(&data);
    }

    /// Every known packet type followed by random payload must not panic.
    #[test]
    fn prop_known_types_random_payload(
        packet_type in prop::sample::select(vec![50u8, 51, 52, 53, 54, 55, 56, 57, 58, 73, 130]),
        payload in proptest::collection::vec(any::<u8>(), 0..256)
    ) {
        let mut data = vec![packet_type];
        data.extend_from_slice(&payload);
        let _ = parse_inbound_message(&data);
    }

    /// A string read consumes at least the length byte and never runs past
    /// the end of the buffer.
    #[test]
    fn prop_string_read_stays_in_bounds(
        data in proptest::collection::vec(any::<u8>(), 1..256)
    ) {
        let decoded = text::decode(&data);
        prop_assert!(decoded.consumed >= 1);
        prop_assert!(decoded.consumed <= data.len());

        let mut reader = PacketReader::new(&data);
        let _ = reader.read_string();
        prop_assert_eq!(reader.offset(), decoded.consumed);
    }

    /// Printable ASCII with a length prefix decodes unchanged.
    #[test]
    fn prop_ascii_round_trip(value in "[ -~]{0,128}") {
        let mut data = vec![u8::try_from(value.len()).unwrap_or(u8::MAX)];
        data.extend_from_slice(value.as_bytes());

        let mut reader = PacketReader::new(&data);
        prop_assert_eq!(reader.read_string(), value);
        prop_assert_eq!(reader.remaining(), 0);
    }
}
