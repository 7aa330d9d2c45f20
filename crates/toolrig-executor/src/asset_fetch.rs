//! Download + checksum verification shared by `command` and
//! `github_release` steps (§4.4): fetch to memory, SHA256-verify against a
//! declared digest (literal or extracted from a checksums-file URL), then
//! hand the bytes back for the caller to place on disk.

use regex::Regex;
use sha2::{Digest, Sha256};

#[derive(Debug, thiserror::Error)]
pub enum AssetFetchError {
    #[error("download of {url} failed: {source}")]
    Request { url: String, source: reqwest::Error },
    #[error("404 not found: {url}")]
    NotFound { url: String },
    #[error("checksum mismatch for {url}: expected {expected}, got {actual}")]
    ChecksumMismatch { url: String, expected: String, actual: String },
    #[error("checksums file at {url} has no recognizable sha256 digest")]
    NoDigestInChecksumsFile { url: String },
}

/// Download `url`'s body as bytes.
pub async fn download(client: &reqwest::Client, url: &str) -> Result<Vec<u8>, AssetFetchError> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|source| AssetFetchError::Request { url: url.to_string(), source })?;
    if response.status() == reqwest::StatusCode::NOT_FOUND {
        return Err(AssetFetchError::NotFound { url: url.to_string() });
    }
    let response = response
        .error_for_status()
        .map_err(|source| AssetFetchError::Request { url: url.to_string(), source })?;
    let bytes = response
        .bytes()
        .await
        .map_err(|source| AssetFetchError::Request { url: url.to_string(), source })?;
    Ok(bytes.to_vec())
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Pull the first 64-hex-char sha256 digest out of a fetched checksums
/// file's body. Doesn't match the digest to a filename -- recipes that need
/// that should declare the literal digest instead of a `checksum_url`.
pub fn extract_digest(body: &str) -> Option<String> {
    let pattern = Regex::new(r"\b([0-9a-fA-F]{64})\b").expect("static regex is valid");
    pattern.captures(body).map(|caps| caps[1].to_lowercase())
}

/// Verify `bytes` against a declared checksum token (`checksum=<hex>` or,
/// once resolved, the digest fetched from a `checksum_url=<url>` file).
pub fn verify(url: &str, bytes: &[u8], expected_hex: &str) -> Result<(), AssetFetchError> {
    let actual = sha256_hex(bytes);
    if actual.eq_ignore_ascii_case(expected_hex) {
        Ok(())
    } else {
        Err(AssetFetchError::ChecksumMismatch { url: url.to_string(), expected: expected_hex.to_string(), actual })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_hex_is_deterministic_and_lowercase_hex() {
        let digest = sha256_hex(b"hello world");
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(digest, sha256_hex(b"hello world"));
        assert_ne!(digest, sha256_hex(b"hello world!"));
    }

    #[test]
    fn extract_digest_finds_a_64_char_hex_token() {
        let body = "a1b2c3  bat-x86_64-unknown-linux-gnu.tar.gz\n".to_string()
            + &"a".repeat(64)
            + "  bat-x86_64-unknown-linux-gnu.tar.gz\n";
        let digest = extract_digest(&body).unwrap();
        assert_eq!(digest, "a".repeat(64));
    }

    #[test]
    fn extract_digest_returns_none_without_a_digest() {
        assert!(extract_digest("no digest here").is_none());
    }

    #[test]
    fn verify_accepts_matching_digest_case_insensitively() {
        let bytes = b"hello world";
        let expected = sha256_hex(bytes).to_uppercase();
        assert!(verify("https://example.invalid/a", bytes, &expected).is_ok());
    }

    #[test]
    fn verify_rejects_mismatched_digest() {
        let bytes = b"hello world";
        let err = verify("https://example.invalid/a", bytes, "deadbeef").unwrap_err();
        assert!(matches!(err, AssetFetchError::ChecksumMismatch { .. }));
    }
}
