use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::auth::CryptResult;

type HmacSha256 = Hmac<Sha256>;

pub fn sign_hex(key: &[u8], message: &[u8]) -> CryptResult<String> {
    let mut mac = HmacSha256::new_from_slice(key)?;
    mac.update(message);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time check of a hex encoded HMAC-SHA256 signature.
pub fn verify_hex(key: &[u8], message: &[u8], signature_hex: &str) -> bool {
    let Ok(expected) = hex::decode(signature_hex) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(key) else {
        return false;
    };
    mac.update(message);
    mac.verify_slice(&expected).is_ok()
}

/// Constant-time equality of a shared secret. Both values are MACed under `expected` first, so
/// the comparison runs over equal-length tags.
pub fn secret_matches(expected: &str, provided: &str) -> bool {
    let Ok(mut reference) = HmacSha256::new_from_slice(expected.as_bytes()) else {
        return false;
    };
    let mut candidate = reference.clone();
    reference.update(expected.as_bytes());
    candidate.update(provided.as_bytes());
    candidate.verify_slice(&reference.finalize().into_bytes()).is_ok()
}
