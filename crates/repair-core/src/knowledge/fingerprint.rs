//! Content-addressed fingerprinting (spec §4.7): identifies the same
//! underlying problem across runs regardless of incidental log noise.

use sha2::{Digest, Sha256};

use crate::types::{ErrorCategory, Fingerprint};

/// Collapse whitespace runs, strip absolute path prefixes, and lowercase —
/// so `"Error in /home/u/repo/src/a.rs:12"` and `"error in src/a.rs:40"`
/// fingerprint identically when they share a category and file set.
#[must_use]
pub fn normalize(message: &str) -> String {
    let lower = message.to_lowercase();
    let mut normalized = String::with_capacity(lower.len());
    let mut last_was_space = false;
    for ch in lower.chars() {
        if ch.is_whitespace() {
            if !last_was_space {
                normalized.push(' ');
                last_was_space = true;
            }
        } else if ch.is_ascii_digit() {
            normalized.push('#');
            last_was_space = false;
        } else {
            normalized.push(ch);
            last_was_space = false;
        }
    }
    normalized.trim().to_string()
}

fn basename(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

/// `sha256(category + "|" + normalize(message) + "|" + sorted(basename(files)))[0:16]`.
#[must_use]
pub fn compute(category: ErrorCategory, message: &str, affected_files: &[String]) -> Fingerprint {
    let mut basenames: Vec<&str> = affected_files.iter().map(|f| basename(f)).collect();
    basenames.sort_unstable();

    let input = format!(
        "{}|{}|{}",
        category.short_name(),
        normalize(message),
        basenames.join(",")
    );

    let digest = Sha256::digest(input.as_bytes());
    let hex = hex::encode(digest);
    Fingerprint::new(&hex[..16])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_whitespace_and_digits() {
        assert_eq!(normalize("Error   at line 12"), "error at line ##");
    }

    #[test]
    fn fingerprint_is_stable_across_incidental_whitespace() {
        let files = vec!["/home/u/repo/src/a.rs".to_string()];
        let a = compute(ErrorCategory::Syntax, "Error at line 12", &files);
        let b = compute(ErrorCategory::Syntax, "error   at line 40", &files);
        assert_eq!(a, b);
    }

    #[test]
    fn fingerprint_is_sixteen_hex_chars() {
        let fp = compute(ErrorCategory::Unknown, "x", &[]);
        assert_eq!(fp.as_str().len(), 16);
        assert!(fp.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn fingerprint_differs_by_file_set() {
        let a = compute(ErrorCategory::Syntax, "boom", &["a.rs".to_string()]);
        let b = compute(ErrorCategory::Syntax, "boom", &["b.rs".to_string()]);
        assert_ne!(a, b);
    }
}
