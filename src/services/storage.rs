//! Signed, expiring links to files under the uploads directory.

use chrono::{DateTime, Utc};
use url::form_urlencoded;

use crate::auth::{CryptResult, sign_hex, verify_hex};

/// Lifetime of a material link.
pub const MATERIAL_TTL_SECS: i64 = 15 * 60;

fn message(path: &str, expires: i64) -> Vec<u8> {
    format!("{path}:{expires}").into_bytes()
}

pub fn sign_path(key: &str, path: &str, expires: i64) -> CryptResult<String> {
    sign_hex(key.as_bytes(), &message(path, expires))
}

/// Percent-encodes one path segment. `byte_serialize` writes a space as `+`, which path
/// decoding keeps literally, so spaces go out as `%20`.
fn encode_segment(segment: &str) -> String {
    form_urlencoded::byte_serialize(segment.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

/// Builds `/api/v1/files/{path}?expires=..&signature=..` valid for [`MATERIAL_TTL_SECS`].
/// `path` is signed as given and sent with each segment percent-encoded.
pub fn signed_url(key: &str, path: &str, now: DateTime<Utc>) -> CryptResult<(String, i64)> {
    let expires = now.timestamp() + MATERIAL_TTL_SECS;
    let signature = sign_path(key, path, expires)?;
    let encoded: Vec<String> = path.split('/').map(encode_segment).collect();
    Ok((
        format!(
            "/api/v1/files/{}?expires={expires}&signature={signature}",
            encoded.join("/")
        ),
        expires,
    ))
}

pub fn verify_path(key: &str, path: &str, expires: i64, signature: &str, now: DateTime<Utc>) -> bool {
    expires >= now.timestamp() && verify_hex(key.as_bytes(), &message(path, expires), signature)
}

#[cfg(test)]
mod test {
    use chrono::TimeZone;

    use super::*;

    const KEY: &str = "storage-key";

    #[test]
    fn signed_link_verifies_until_expiry() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let (url, expires) = signed_url(KEY, "lessons/intro.pdf", now).unwrap();
        assert!(url.starts_with("/api/v1/files/lessons/intro.pdf?expires="));
        assert_eq!(expires, now.timestamp() + MATERIAL_TTL_SECS);

        let signature = url.rsplit("signature=").next().unwrap();
        assert!(verify_path(KEY, "lessons/intro.pdf", expires, signature, now));

        let late = now + chrono::Duration::seconds(MATERIAL_TTL_SECS + 1);
        assert!(!verify_path(KEY, "lessons/intro.pdf", expires, signature, late));
    }

    #[test]
    fn link_escapes_reserved_characters() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        for (path, expected) in [
            ("lessons/notes #1.pdf", "/api/v1/files/lessons/notes%20%231.pdf?"),
            ("a?b.pdf", "/api/v1/files/a%3Fb.pdf?"),
            ("100%.pdf", "/api/v1/files/100%25.pdf?"),
            ("a+b.pdf", "/api/v1/files/a%2Bb.pdf?"),
        ] {
            let (url, _) = signed_url(KEY, path, now).unwrap();
            assert!(url.starts_with(expected), "{url}");
        }
    }

    #[test]
    fn signature_is_bound_to_path_and_expiry() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let expires = now.timestamp() + 60;
        let signature = sign_path(KEY, "a.pdf", expires).unwrap();

        assert!(!verify_path(KEY, "b.pdf", expires, &signature, now));
        assert!(!verify_path(KEY, "a.pdf", expires + 1, &signature, now));
        assert!(!verify_path("other-key", "a.pdf", expires, &signature, now));
    }
}
