//! Fuzz target for `Authorization` header extraction and claims decoding.
//!
//! Any extracted token must be a single whitespace-free part of the input,
//! and arbitrary JSON must never panic the claims deserializer.

#![no_main]

use libfuzzer_sys::fuzz_target;

use casting_agency_authn::{TokenClaims, header::extract_bearer_token, permissions::check_permissions};

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(token) = extract_bearer_token(Some(input)) {
        assert!(!token.is_empty());
        assert!(!token.contains(char::is_whitespace));
        assert!(input.contains(token));
    }

    if let Ok(claims) = serde_json::from_str::<TokenClaims>(input) {
        let _ = check_permissions(&claims, "get:actors");
        let _ = check_permissions(&claims, "");
        let _ = claims.parse_scopes();
        let _ = claims.expires_at();
    }
});
