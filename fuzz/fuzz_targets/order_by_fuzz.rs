//! Fuzz test for the REST order_by parser
//!
//! Run with: cargo +nightly fuzz run order_by_fuzz -- -max_total_time=60

#![no_main]

use crm_query::parse_order_by;
use crm_test_utils::fixtures::all_types_object;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        let object = all_types_object();
        if let Ok(order_by) = parse_order_by(input, &object) {
            // Every accepted term starts at a field of the object.
            for term in order_by.terms() {
                let root = term.path.first().map(String::as_str).unwrap_or_default();
                assert!(object.field(root).is_some(), "unknown field {:?}", term.path);
            }
        }
    }
});
