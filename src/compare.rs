//! Byte-level content comparison between sync artifacts.

use std::fs;
use std::path::Path;

/// Compare two files by full content.
///
/// Returns `false` if either side is missing or unreadable; an absent file is
/// never considered identical to anything. Artifacts here are small text
/// files, so a full read beats hashing or size shortcuts on correctness.
pub fn identical(a: &Path, b: &Path) -> bool {
    match (fs::read(a), fs::read(b)) {
        (Ok(left), Ok(right)) => left == right,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_identical_contents() {
        let temp_dir = TempDir::new().unwrap();
        let a = temp_dir.path().join("a.md");
        let b = temp_dir.path().join("b.md");
        fs::write(&a, "same content").unwrap();
        fs::write(&b, "same content").unwrap();

        assert!(identical(&a, &b));
    }

    #[test]
    fn test_different_contents() {
        let temp_dir = TempDir::new().unwrap();
        let a = temp_dir.path().join("a.md");
        let b = temp_dir.path().join("b.md");
        fs::write(&a, "one").unwrap();
        fs::write(&b, "two").unwrap();

        assert!(!identical(&a, &b));
    }

    #[test]
    fn test_missing_side_is_never_identical() {
        let temp_dir = TempDir::new().unwrap();
        let a = temp_dir.path().join("a.md");
        fs::write(&a, "content").unwrap();

        assert!(!identical(&a, &temp_dir.path().join("missing.md")));
        assert!(!identical(&temp_dir.path().join("missing.md"), &a));
        assert!(!identical(
            &temp_dir.path().join("gone.md"),
            &temp_dir.path().join("also-gone.md")
        ));
    }
}
