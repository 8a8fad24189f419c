#![no_main]

//! Fuzz the full parser with arbitrary byte input.
//!
//! Parsing must never panic, and any tree it does produce must survive
//! unparse-then-reparse with identical structure.

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };

    if input.len() > 8192 {
        return;
    }

    let Ok(module) = bb_parser::parse_module(input) else {
        return;
    };

    let text = bb_parser::unparse(&module);
    let again = bb_parser::parse_module(&text)
        .expect("unparsed text of a valid tree must reparse");
    assert_eq!(module, again, "unparse must preserve structure");
});
