#![no_main]

//! Fuzz the lexer with arbitrary byte input.
//!
//! The lexer must never panic. It should gracefully handle malformed
//! Unicode, unterminated strings, bad escapes, inconsistent indentation,
//! and extremely long tokens.

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };

    if input.len() > 8192 {
        return;
    }

    // Tokenizing must never panic.
    if let Ok(tokens) = bb_parser::tokenize(input) {
        // Every token kind must be inspectable without panic.
        for token in &tokens {
            let _ = token.kind.describe();
        }
    }
});
