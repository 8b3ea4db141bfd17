//! Signed check-in tokens of the form `m<member_id>.<nonce>.<sig>`.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

fn mac(secret: &str, payload: &str) -> Option<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(payload.as_bytes());
    Some(mac)
}

pub fn new_nonce() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

pub fn token(secret: &str, member_id: i32, nonce: &str) -> String {
    let payload = format!("m{member_id}.{nonce}");
    let sig = mac(secret, &payload)
        .map(|m| URL_SAFE_NO_PAD.encode(m.finalize().into_bytes()))
        .unwrap_or_default();
    format!("{payload}.{sig}")
}

/// The member id from a well-formed token whose signature checks out.
pub fn verify(secret: &str, token: &str) -> Option<i32> {
    let (payload, sig) = token.trim().rsplit_once('.')?;
    let (member, nonce) = payload.split_once('.')?;
    let member_id: i32 = member.strip_prefix('m')?.parse().ok()?;
    if nonce.is_empty() || nonce.contains('.') {
        return None;
    }
    let provided = URL_SAFE_NO_PAD.decode(sig).ok()?;
    mac(secret, payload)?.verify_slice(&provided).ok()?;
    Some(member_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    #[test]
    fn signed_tokens_verify() {
        let t = token(SECRET, 42, "abc123");
        assert!(t.starts_with("m42.abc123."));
        assert_eq!(verify(SECRET, &t), Some(42));
    }

    #[test]
    fn tampering_is_rejected() {
        let t = token(SECRET, 42, "abc123");
        assert_eq!(verify("other-secret", &t), None);
        assert_eq!(verify(SECRET, &t.replace("m42", "m43")), None);
        assert_eq!(verify(SECRET, "m42.abc123"), None);
        assert_eq!(verify(SECRET, "x42.abc123.sig"), None);
        assert_eq!(verify(SECRET, ""), None);
    }

    #[test]
    fn nonces_differ() {
        assert_ne!(new_nonce(), new_nonce());
    }
}
