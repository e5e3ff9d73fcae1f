use sha2::{Digest, Sha256};

pub fn compute_sha256(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// First 16 hex chars of the sha256, enough to spot duplicate chunks
pub fn short_hash(text: &str) -> String {
    compute_sha256(text.as_bytes()).chars().take(16).collect()
}
