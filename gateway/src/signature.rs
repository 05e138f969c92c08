//! Canonical `key=value&...` signing shared by gateway operations.
//!
//! The field order is part of the provider contract, so callers pass fields
//! already ordered and values exactly as they travel on the wire.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub fn canonical<K: AsRef<str>, V: AsRef<str>>(fields: &[(K, V)]) -> String {
    fields
        .iter()
        .map(|(k, v)| format!("{}={}", k.as_ref(), v.as_ref()))
        .collect::<Vec<_>>()
        .join("&")
}

/// HMAC-SHA256 of the canonical string, lowercase hex.
pub fn sign<K: AsRef<str>, V: AsRef<str>>(fields: &[(K, V)], secret: &str) -> String {
    // hmac accepts keys of any length
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(canonical(fields).as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

pub fn verify<K: AsRef<str>, V: AsRef<str>>(
    fields: &[(K, V)],
    secret: &str,
    provided: &str,
) -> bool {
    let expected = sign(fields, secret);
    !expected.is_empty() && constant_time_eq(expected.as_bytes(), provided.as_bytes())
}

pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_keeps_order_and_empty_values() {
        let fields = [("b", "2"), ("a", ""), ("c", "x y")];
        assert_eq!(canonical(&fields), "b=2&a=&c=x y");
    }

    #[test]
    fn rfc_style_vector() {
        assert_eq!(
            sign(&[("a", "1"), ("b", "2")], "key"),
            "b3c18626e7ac81395c1d37966c7ee2258a6967a1b3fdefb4fa339bb19dc73b0e"
        );
    }

    #[test]
    fn verify_sign() {
        let fields = vec![
            ("amount".to_owned(), "1000".to_owned()),
            ("orderId".to_owned(), "A1".to_owned()),
        ];
        let sig = sign(&fields, "secret");
        assert_eq!(sig.len(), 64);
        assert!(sig.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f')));
        assert!(verify(&fields, "secret", &sig));
        assert!(!verify(&fields, "other", &sig));
        assert!(!verify(&fields, "secret", &sig.to_uppercase()));
        assert!(!verify(&fields, "secret", ""));
        assert!(!verify(&fields, "secret", "not hex at all"));
    }

    #[test]
    fn single_field_change_fails() {
        let fields = [("amount", "1000"), ("orderId", "A1")];
        let sig = sign(&fields, "secret");
        assert!(!verify(&[("amount", "1001"), ("orderId", "A1")], "secret", &sig));
        // same pairs, different order
        assert!(!verify(&[("orderId", "A1"), ("amount", "1000")], "secret", &sig));
    }
}
