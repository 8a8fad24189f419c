#![no_main]

//! Fuzz the normalize/denormalize pair.
//!
//! For any unit that normalizes, denormalizing with its own overlay and
//! re-normalizing must reproduce the canonical code byte-for-byte.

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };

    if input.len() > 8192 {
        return;
    }

    let Ok(normalized) = bb_norm::normalize_source(input) else {
        return;
    };

    let overlay = normalized.overlay("");
    let restored = bb_norm::denormalize(&normalized.canonical_code, &overlay)
        .expect("own overlay must denormalize");
    let again = bb_norm::normalize_source(&restored)
        .expect("reconstruction must normalize");
    assert_eq!(
        again.canonical_code, normalized.canonical_code,
        "round trip must preserve canonical form"
    );
});
