//! Fuzz test for the REST filter parser
//!
//! Feeds arbitrary strings to the conjunction splitter and the full filter
//! parser. Both must return `Ok` or `Err` without panicking, including on
//! unbalanced parentheses, stray quotes and multi-byte characters.
//!
//! Run with: cargo +nightly fuzz run filter_fuzz -- -max_total_time=60

#![no_main]

use crm_query::{parse_filter, parse_filter_content};
use crm_test_utils::fixtures::all_types_object;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        if let Ok(parts) = parse_filter_content(input) {
            // Splitting never invents text.
            let total: usize = parts.iter().map(String::len).sum();
            assert!(total <= input.len());
        }

        let object = all_types_object();
        let _ = parse_filter(input, &object);
    }
});
