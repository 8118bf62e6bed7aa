//! Fuzz target for token header parsing.
//!
//! Feeds arbitrary byte strings as JWT tokens to the unverified header
//! decoder and the algorithm check. Every result must be either `Ok(...)`
//! or `Err(AuthError)`; panics and hangs are bugs.

#![no_main]

use libfuzzer_sys::fuzz_target;

use casting_agency_authn::{jwt::decode_unverified_header, validate_algorithm};

fuzz_target!(|data: &[u8]| {
    // Only process valid UTF-8, JWT tokens are always UTF-8 strings
    let Ok(token) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(header) = decode_unverified_header(token) {
        if let Some(alg) = header.alg.as_deref() {
            let accepted = validate_algorithm(alg).is_ok();
            assert_eq!(accepted, alg == "RS256");
        }
    }
});
