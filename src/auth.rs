use chrono::{DateTime, Utc};
use constant_time_eq::constant_time_eq;
use hmac::{Hmac, Mac};
use sha2::Sha256;

pub const AUTH_COOKIE: &str = "auryth_auth";
pub const SESSION_TTL_SECS: i64 = 30 * 24 * 60 * 60;

/// Issues a session token of the form `"{expiry_unix}.{hex hmac}"`, where
/// the signature covers the expiry timestamp. Self-contained: no session
/// store, the cookie carries its own expiry and proof.
pub fn issue_token(secret: &str, now: DateTime<Utc>) -> Option<String> {
    let expires = now.timestamp() + SESSION_TTL_SECS;
    let exp_str = expires.to_string();
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
        return None;
    };
    mac.update(exp_str.as_bytes());
    let sig = mac.finalize().into_bytes();
    Some(format!("{}.{}", exp_str, hex::encode(sig)))
}

/// Validates signature and expiry. Malformed, tampered, and expired tokens
/// all verify false; nothing here distinguishes why.
pub fn verify_token(secret: &str, token: &str, now: DateTime<Utc>) -> bool {
    let Some((exp_str, sig_hex)) = token.split_once('.') else {
        return false;
    };
    let Ok(expires) = exp_str.parse::<i64>() else {
        return false;
    };
    if now.timestamp() > expires {
        return false;
    }
    let Ok(given) = hex::decode(sig_hex) else {
        return false;
    };
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(exp_str.as_bytes());
    let expected = mac.finalize().into_bytes();
    expected.len() == given.len() && constant_time_eq(&expected, &given)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    const SECRET: &str = "test-session-secret";

    #[test]
    fn token_round_trips() {
        let now = Utc::now();
        let token = issue_token(SECRET, now).expect("token issued");
        assert!(verify_token(SECRET, &token, now));
        // Still valid just before expiry.
        assert!(verify_token(
            SECRET,
            &token,
            now + Duration::seconds(SESSION_TTL_SECS - 1)
        ));
    }

    #[test]
    fn expired_token_is_rejected() {
        let now = Utc::now();
        let token = issue_token(SECRET, now).expect("token issued");
        assert!(!verify_token(
            SECRET,
            &token,
            now + Duration::seconds(SESSION_TTL_SECS + 1)
        ));
    }

    #[test]
    fn tampered_expiry_is_rejected() {
        let now = Utc::now();
        let token = issue_token(SECRET, now).expect("token issued");
        let (_, sig) = token.split_once('.').expect("token has two parts");
        let forged = format!("{}.{}", i64::MAX, sig);
        assert!(!verify_token(SECRET, &forged, now));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let now = Utc::now();
        let token = issue_token(SECRET, now).expect("token issued");
        assert!(!verify_token("other-secret", &token, now));
    }

    #[test]
    fn garbage_tokens_are_rejected() {
        let now = Utc::now();
        assert!(!verify_token(SECRET, "", now));
        assert!(!verify_token(SECRET, "authenticated", now));
        assert!(!verify_token(SECRET, "123.not-hex", now));
        assert!(!verify_token(SECRET, "abc.deadbeef", now));
    }
}
