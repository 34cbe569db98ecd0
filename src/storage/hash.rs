use sha2::{Digest, Sha256};

pub fn compute_hash(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let digest = hasher.finalize();
    hex::encode(digest)
}

/// Up to 30 characters of `hint` usable in a file name, spaces turned into `_`.
pub fn slugify(hint: &str) -> String {
    let kept: String = hint
        .chars()
        .take(30)
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect();
    let slug = kept.trim().replace(' ', "_");
    if slug.is_empty() {
        "image".to_string()
    } else {
        slug
    }
}
