//! Working directory derivation.

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

const MAX_STEM_LEN: usize = 64;
const HASH_LEN: usize = 8;

/// Derives the working directory for a test from its name.
///
/// The result is `<root>/<stem>-<hash>`. The stem keeps the readable part of
/// the name, and the hash covers the full name. Two names that sanitize to
/// the same stem still get different directories.
#[must_use]
pub fn derive_working_dir(root: &Path, test_name: &str) -> PathBuf {
    root.join(format!("{}-{}", sanitize(test_name), name_hash(test_name)))
}

/// Picks the explicit directory when it is non-empty, else derives one.
#[must_use]
pub fn resolve_working_dir(explicit: Option<&Path>, root: &Path, test_name: &str) -> PathBuf {
    match explicit {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => derive_working_dir(root, test_name),
    }
}

fn sanitize(name: &str) -> String {
    let mut stem = String::with_capacity(name.len().min(MAX_STEM_LEN));
    let mut last_was_sep = false;

    for c in name.chars() {
        if c.is_ascii_alphanumeric() || c == '-' || c == '.' {
            stem.push(c);
            last_was_sep = false;
        } else if !last_was_sep {
            stem.push('_');
            last_was_sep = true;
        }
        if stem.len() >= MAX_STEM_LEN {
            break;
        }
    }

    let stem = stem.trim_matches(|c| c == '_' || c == '.');
    if stem.is_empty() {
        "test".to_string()
    } else {
        stem.to_string()
    }
}

fn name_hash(name: &str) -> String {
    let digest = Sha256::digest(name.as_bytes());
    hex::encode(&digest[..HASH_LEN])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_dir_is_stable_and_readable() {
        let root = Path::new("/tmp/runs");
        let first = derive_working_dir(root, "tests::hello_world");
        let second = derive_working_dir(root, "tests::hello_world");

        assert_eq!(first, second);
        assert_eq!(first.parent(), Some(root));
        let leaf = first.file_name().unwrap().to_str().unwrap();
        assert!(leaf.starts_with("tests_hello_world-"));
        assert_eq!(leaf.len(), "tests_hello_world-".len() + HASH_LEN * 2);
    }

    #[test]
    fn test_similar_names_do_not_collide() {
        let root = Path::new("r");
        assert_ne!(
            derive_working_dir(root, "a/b"),
            derive_working_dir(root, "a:b")
        );
        assert_ne!(
            derive_working_dir(root, "TestVpc"),
            derive_working_dir(root, "TestVpc/subnet")
        );
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("mod::tests::vpc"), "mod_tests_vpc");
        assert_eq!(sanitize("../../etc"), "etc");
        assert_eq!(sanitize("vpc test [us-east-1]"), "vpc_test_us-east-1");
        assert_eq!(sanitize("///"), "test");
        assert!(sanitize(&"x".repeat(200)).len() <= MAX_STEM_LEN);
    }

    #[test]
    fn test_resolve_prefers_explicit_non_empty() {
        let root = Path::new("root");
        assert_eq!(
            resolve_working_dir(Some(Path::new("/explicit")), root, "t"),
            PathBuf::from("/explicit")
        );
        assert_eq!(
            resolve_working_dir(Some(Path::new("")), root, "t"),
            derive_working_dir(root, "t")
        );
        assert_eq!(resolve_working_dir(None, root, "t"), derive_working_dir(root, "t"));
    }
}
