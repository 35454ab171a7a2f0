//! Temp-URL signing.
//!
//! # Design
//! The canonical signing string is exactly
//! `"<METHOD>\n<expires>\n<containerPath><objectPath>"` with no trailing
//! newline, and the signature is HMAC-SHA1 over it, lowercase hex. The
//! server recomputes the same string independently, so any whitespace or
//! ordering deviation invalidates every generated URL. Of the two historical
//! signing-path variants, this implementation uses the full container path
//! (the path component of the container URL as the server sees it); the
//! storage-root-relative variant is not supported.

use hmac::{Hmac, Mac};
use sha1::Sha1;
use url::Url;

use crate::error::{Result, StorageError};

type HmacSha1 = Hmac<Sha1>;

/// Compute the temp-URL signature for one object.
///
/// Deterministic: the same inputs always produce the same hex digest.
pub fn sign(
    key: &str,
    method: &str,
    container_path: &str,
    object_path: &str,
    expires: u64,
) -> String {
    let canonical = format!("{method}\n{expires}\n{container_path}{object_path}");
    let mut mac =
        HmacSha1::new_from_slice(key.as_bytes()).expect("HMAC can take key of any size");
    mac.update(canonical.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Build a complete signed GET URL for `object_path` under `container_url`.
///
/// `filename` adds the optional `filename=` query parameter (URL-encoded) to
/// override the display name the browser sees.
pub fn build_temp_url(
    container_url: &str,
    object_path: &str,
    key: &str,
    expires: u64,
    filename: Option<&str>,
) -> Result<String> {
    let parsed = Url::parse(container_url).map_err(|e| {
        StorageError::Protocol(format!("invalid container url '{container_url}': {e}"))
    })?;
    let host = parsed.host_str().ok_or_else(|| {
        StorageError::Protocol(format!("container url '{container_url}' has no host"))
    })?;
    let origin = match parsed.port() {
        Some(port) => format!("{}://{}:{}", parsed.scheme(), host, port),
        None => format!("{}://{}", parsed.scheme(), host),
    };
    let container_path = parsed.path();

    let signature = sign(key, "GET", container_path, object_path, expires);
    let mut url = format!(
        "{origin}{container_path}{object_path}?temp_url_sig={signature}&temp_url_expires={expires}"
    );
    if let Some(name) = filename {
        url.push_str("&filename=");
        url.push_str(&urlencoding::encode(name));
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Expected digests computed with an independent HMAC-SHA1
    // implementation.
    #[test]
    fn signature_matches_known_vectors() {
        assert_eq!(
            sign("mysecretkey", "GET", "/v1/SEL_1234/photos/", "cat.jpg", 1_700_000_000),
            "530792d842cc01be87eea2b4a51c6a35a3354401"
        );
        assert_eq!(
            sign("k", "GET", "/v1/acc/c/", "o", 0),
            "e1f296f35c145dea362383040a374f746f1162c0"
        );
    }

    #[test]
    fn signature_is_deterministic() {
        let a = sign("key", "GET", "/v1/a/c/", "o.txt", 1_800_000_000);
        let b = sign("key", "GET", "/v1/a/c/", "o.txt", 1_800_000_000);
        assert_eq!(a, b);
    }

    #[test]
    fn method_key_and_expiry_all_change_the_signature() {
        let base = sign("mysecretkey", "GET", "/v1/SEL_1234/photos/", "cat.jpg", 1_700_000_000);
        assert_eq!(
            sign("mysecretkey", "PUT", "/v1/SEL_1234/photos/", "cat.jpg", 1_700_000_000),
            "2549815f9d7919b61d076c17d2b000608e177322"
        );
        assert_eq!(
            sign("otherkey", "GET", "/v1/SEL_1234/photos/", "cat.jpg", 1_700_000_000),
            "7b43fe2c21a87c1cb20d0bcb33309bedf056fd4a"
        );
        assert_eq!(
            sign("mysecretkey", "GET", "/v1/SEL_1234/photos/", "cat.jpg", 1_700_000_001),
            "f97ff2b579de8f2926fc892e316c0623aecafc5e"
        );
        assert_ne!(base, "2549815f9d7919b61d076c17d2b000608e177322");
    }

    #[test]
    fn temp_url_has_signature_and_expiry_params() {
        let url = build_temp_url(
            "https://storage.example/v1/SEL_1234/photos/",
            "cat.jpg",
            "mysecretkey",
            1_700_000_000,
            None,
        )
        .unwrap();
        assert_eq!(
            url,
            "https://storage.example/v1/SEL_1234/photos/cat.jpg\
             ?temp_url_sig=530792d842cc01be87eea2b4a51c6a35a3354401\
             &temp_url_expires=1700000000"
        );
    }

    #[test]
    fn temp_url_keeps_port_and_encodes_filename() {
        let url = build_temp_url(
            "http://127.0.0.1:8080/v1/acc/c/",
            "o",
            "k",
            0,
            Some("Nice Name.txt"),
        )
        .unwrap();
        assert!(url.starts_with("http://127.0.0.1:8080/v1/acc/c/o?temp_url_sig="));
        assert!(url.ends_with("&temp_url_expires=0&filename=Nice%20Name.txt"));
    }
}
