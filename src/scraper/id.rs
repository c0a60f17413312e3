use sha2::{Digest, Sha256};

/// Compute the stable identifier for a URL.
///
/// The id is the lowercase hex SHA-256 digest of the raw URL bytes. It is
/// used both as the output filename stem and as the completion-set key, so
/// resumability is correct by construction as long as both sides go through
/// this function. No URL normalization is applied: two spellings of the
/// same page are two distinct units of work.
pub fn url_id(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    hex::encode(hasher.finalize())
}
