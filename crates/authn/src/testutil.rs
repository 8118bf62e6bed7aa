//! Shared test utilities for authorization testing.
//!
//! Provides two fixed RSA key pairs, their JWK form, helpers to sign
//! tokens as a fake issuer, and [`craft_raw_jwt`] for building attack
//! tokens by hand. Feature-gated behind `testutil` to keep it out of
//! production builds.
//!
//! # Usage
//!
//! In integration tests, enable the feature in `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! casting-agency-authn = { path = "../authn", features = ["testutil"] }
//! ```
//!
//! Then import helpers:
//!
//! ```no_run
//! // Requires the `testutil` feature to be enabled.
//! use casting_agency_authn::testutil::{PRIMARY_KID, sign_with_primary, valid_payload};
//!
//! let token = sign_with_primary(PRIMARY_KID, &valid_payload(&["get:actors"]));
//! ```

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use std::sync::Arc;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde_json::{Value, json};

use crate::{
    authorizer::Authorizer,
    config::AuthorizerConfig,
    jwks::{Jwk, JwkSet, StaticKeySetProvider},
};

/// Key ID of the primary test key.
pub const PRIMARY_KID: &str = "test-key-primary";

/// Key ID of the secondary test key (used for rotation tests).
pub const SECONDARY_KID: &str = "test-key-secondary";

/// Issuer domain of the fake issuer.
pub const TEST_DOMAIN: &str = "casting.example.com";

/// Audience the fake issuer signs for.
pub const TEST_AUDIENCE: &str = "casting-agency";

/// `iss` claim of the fake issuer.
pub const TEST_ISSUER: &str = "https://casting.example.com/";

/// PKCS#1 PEM of the primary RSA private key.
pub const PRIMARY_PRIVATE_PEM: &str = include_str!("../testdata/primary_rsa.pem");

/// PKCS#1 PEM of the secondary RSA private key.
pub const SECONDARY_PRIVATE_PEM: &str = include_str!("../testdata/secondary_rsa.pem");

const PRIMARY_N: &str = "yJRom8nWUAfQmZtZu-hcDPHwuqNNnP7Pr7s5a0-gpgjnW0G8_AW-yf29-INsFw87g_zXx1h1PcuJZhyTg_9Pm4xOXW_TFa4M6ITdkU-fWst1_Lfbhan2SkTeGHXRHmI_ttXU93WS46HpT2JHX0ZepkND7HiVNCYPl71DZ9RiCKF92zcRJymRChS5I9MsBdNI_vk5lcIFsQLxERlI83enpLiZidyERGAhFwkhiMno-Vcq5hn4JuXNXa-g1GZKbhLMQL0B0BuH13M4FBKSeZGuNUb7xEAW9hjR8GXMNE7CDCxWT4Fhmyqdmds5t-Tngcxn4PsTQxPnEQKbM6UQDakpvw";

const SECONDARY_N: &str = "mGDozq5Tji9KccEYFoxMiw2P--CR65-JnJcqZIGSjNQddhZG0lU9Q4iO8DkYHExTeb64FRFOrssxrlOfg1QFrP2BmeAOLvkCF-dwZoXu1Y1KYYPET56jPye3CntyAsGBsu6TeyEW8JriDPZXvfP5ivsq0UXEuWrE3TJ96X9o4QP6AnyE_Vm75eHvHoKFdwrLdBxoDZ5NEPLjetDUUuhJAFci1x-xJfPubxEQIdhCvMwk9zd4bZ4A9S48ePaV0mfVMbEKOPXNixXjCfRu0BuvEPFIrkTVP_gDDY2JooZM1Cs522CP_n2ZmeLaj5FlAwdVmKeYu51eNX_WVte1u-EIIQ";

const RSA_EXPONENT: &str = "AQAB";

/// Asserts that a `Result<_, AuthError>` failed with the given variant pattern.
///
/// ```no_run
/// use casting_agency_authn::{AuthError, assert_auth_error};
///
/// let result: Result<(), AuthError> = Err(AuthError::TokenExpired);
/// assert_auth_error!(result, AuthError::TokenExpired);
/// ```
#[macro_export]
macro_rules! assert_auth_error {
    ($result:expr, $pattern:pat $(,)?) => {
        match &$result {
            Err($pattern) => {},
            other => panic!("expected Err({}), got {:?}", stringify!($pattern), other),
        }
    };
}

fn rsa_jwk(kid: &str, n: &str) -> Jwk {
    Jwk {
        kid: kid.to_string(),
        kty: "RSA".to_string(),
        key_use: Some("sig".to_string()),
        alg: Some("RS256".to_string()),
        n: n.to_string(),
        e: RSA_EXPONENT.to_string(),
    }
}

/// Public half of the primary key, published under `kid`.
pub fn primary_jwk(kid: &str) -> Jwk {
    rsa_jwk(kid, PRIMARY_N)
}

/// Public half of the secondary key, published under `kid`.
pub fn secondary_jwk(kid: &str) -> Jwk {
    rsa_jwk(kid, SECONDARY_N)
}

/// Key set publishing only the primary key under [`PRIMARY_KID`].
pub fn test_key_set() -> JwkSet {
    JwkSet { keys: vec![primary_jwk(PRIMARY_KID)] }
}

/// Current Unix time in seconds.
pub fn now_secs() -> u64 {
    Utc::now().timestamp() as u64
}

/// Claims the fake issuer signs: correct `iss` and `aud`, expiring in one
/// hour, with the given permissions.
pub fn valid_payload(permissions: &[&str]) -> Value {
    let now = now_secs();
    json!({
        "iss": TEST_ISSUER,
        "sub": "auth0|casting-test-user",
        "aud": TEST_AUDIENCE,
        "exp": now + 3600,
        "iat": now,
        "permissions": permissions,
    })
}

fn sign(pem: &str, kid: &str, payload: &Value) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(kid.to_string());

    let key = EncodingKey::from_rsa_pem(pem.as_bytes()).expect("test RSA key");
    jsonwebtoken::encode(&header, payload, &key).expect("Failed to encode test JWT")
}

/// Signs `payload` with the primary private key, announcing `kid`.
///
/// # Panics
///
/// Panics if JWT encoding fails.
pub fn sign_with_primary(kid: &str, payload: &Value) -> String {
    sign(PRIMARY_PRIVATE_PEM, kid, payload)
}

/// Signs `payload` with the secondary private key, announcing `kid`.
///
/// # Panics
///
/// Panics if JWT encoding fails.
pub fn sign_with_secondary(kid: &str, payload: &Value) -> String {
    sign(SECONDARY_PRIVATE_PEM, kid, payload)
}

/// Creates a raw JWT string from arbitrary header and payload JSON.
///
/// The resulting JWT has the structure `{header_b64}.{payload_b64}.`
/// with an empty signature. This is useful for testing rejection of
/// malformed or attack JWTs (e.g., `alg: "none"`, algorithm confusion).
///
/// # Panics
///
/// Panics if JSON serialization fails.
pub fn craft_raw_jwt(header_json: &Value, payload_json: &Value) -> String {
    let header_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(header_json).expect("header json"));
    let payload_b64 =
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(payload_json).expect("payload json"));
    format!("{header_b64}.{payload_b64}.")
}

/// Formats `token` as an `Authorization` header value.
pub fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}

/// Configuration trusting the fake issuer, without key caching.
pub fn test_config() -> AuthorizerConfig {
    AuthorizerConfig::builder()
        .issuer_domain(TEST_DOMAIN)
        .audience(TEST_AUDIENCE)
        .build()
        .expect("valid test config")
}

/// Authorizer trusting the fake issuer, serving [`test_key_set`].
pub fn test_authorizer() -> Authorizer {
    Authorizer::with_provider(test_config(), Arc::new(StaticKeySetProvider::new(test_key_set())))
        .expect("valid test authorizer")
}
