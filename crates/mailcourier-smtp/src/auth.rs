//! SASL response builders.
//!
//! Implements the client side of:
//! - PLAIN (RFC 4616)
//! - LOGIN (two base64 steps)
//! - CRAM-MD5 (RFC 2195)
//! - XOAUTH2 (Google/Microsoft bearer-token mechanism)

use crate::error::{Error, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use md5::Md5;
use std::fmt::Write as _;

type HmacMd5 = Hmac<Md5>;

/// PLAIN initial response: base64 of `\0user\0password`.
///
/// The leading NUL is the empty authorization identity.
#[must_use]
pub fn plain_initial(user: &str, password: &str) -> String {
    STANDARD.encode(format!("\0{user}\0{password}"))
}

/// LOGIN username step.
#[must_use]
pub fn login_user(user: &str) -> String {
    STANDARD.encode(user)
}

/// LOGIN password step.
#[must_use]
pub fn login_password(password: &str) -> String {
    STANDARD.encode(password)
}

/// CRAM-MD5 answer to a base64 challenge.
///
/// The response is base64 of `user SP lowercase-hex(HMAC-MD5(password,
/// challenge))`.
///
/// # Errors
///
/// Returns [`Error::Auth`] when the challenge is not valid base64.
pub fn cram_md5_answer(user: &str, password: &str, challenge_b64: &str) -> Result<String> {
    let challenge = STANDARD
        .decode(challenge_b64.trim())
        .map_err(|e| Error::Auth(format!("invalid CRAM-MD5 challenge: {e}")))?;

    let mut mac = HmacMd5::new_from_slice(password.as_bytes())
        .map_err(|e| Error::Auth(format!("invalid CRAM-MD5 key: {e}")))?;
    mac.update(&challenge);
    let digest = mac.finalize().into_bytes();

    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(hex, "{byte:02x}");
    }
    Ok(STANDARD.encode(format!("{user} {hex}")))
}

/// XOAUTH2 initial response: base64 of
/// `user=<user>\x01auth=Bearer <token>\x01\x01`.
#[must_use]
pub fn xoauth2_initial(user: &str, token: &str) -> String {
    STANDARD.encode(format!("user={user}\x01auth=Bearer {token}\x01\x01"))
}

/// Decodes the payload of a 334 continuation for error reporting.
#[must_use]
pub fn decode_server_payload(payload: &str) -> String {
    STANDARD
        .decode(payload.trim())
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .unwrap_or_else(|| payload.to_string())
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn plain_format() {
        let response = plain_initial("test", "pass");
        let decoded = STANDARD.decode(&response).unwrap();
        assert_eq!(decoded, b"\0test\0pass");
    }

    #[test]
    fn login_steps() {
        assert_eq!(login_user("user"), STANDARD.encode("user"));
        assert_eq!(login_password("pass"), STANDARD.encode("pass"));
    }

    // RFC 2195 section 2 worked example.
    #[test]
    fn cram_md5_rfc_vector() {
        let challenge = STANDARD.encode("<1896.697170952@postoffice.reston.mci.net>");
        let response = cram_md5_answer("tim", "tanstaaftanstaaf", &challenge).unwrap();
        let decoded = String::from_utf8(STANDARD.decode(&response).unwrap()).unwrap();
        assert_eq!(decoded, "tim b913a602c7eda7a495b4e6e7334d3890");
    }

    #[test]
    fn cram_md5_rejects_bad_challenge() {
        assert!(cram_md5_answer("u", "p", "!!not-base64!!").is_err());
    }

    #[test]
    fn xoauth2_format() {
        let response = xoauth2_initial("user@example.com", "token123");
        let decoded = String::from_utf8(STANDARD.decode(&response).unwrap()).unwrap();
        assert_eq!(decoded, "user=user@example.com\x01auth=Bearer token123\x01\x01");
    }

    #[test]
    fn responses_never_leak_plaintext() {
        let response = xoauth2_initial("user@example.com", "secret-token");
        assert!(!response.contains("secret-token"));
        assert!(!plain_initial("user", "hunter2").contains("hunter2"));
    }

    #[test]
    fn server_payload_decoding() {
        let encoded = STANDARD.encode(r#"{"status":"401"}"#);
        assert_eq!(decode_server_payload(&encoded), r#"{"status":"401"}"#);
        assert_eq!(decode_server_payload("not base64 at all"), "not base64 at all");
    }
}
