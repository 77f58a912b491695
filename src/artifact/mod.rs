//! Artifact hand-off between the build stage and the publish stages.
//!
//! The build output is stored once under a bundle name and retrieved by that
//! name by every publish stage, so nothing is rebuilt and every consumer sees
//! the same bytes.

mod local;

pub use local::LocalArtifactStore;

use crate::error::{ArtifactError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// Storage for named, immutable bundles
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Store every file under `dir` as bundle `name`
    ///
    /// Fails when `dir` holds no files or when `name` is already taken.
    async fn put(&self, name: &str, dir: &Path) -> Result<BundleHandle>;

    /// Retrieve bundle `name` exactly as stored
    async fn get(&self, name: &str) -> Result<Bundle>;
}

/// Opaque receipt for a stored bundle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleHandle {
    /// Bundle name
    pub name: String,
    /// Number of files stored
    pub file_count: usize,
    /// Sum of file sizes
    pub total_bytes: u64,
    /// SHA-256 over the ordered (path, sha256) list
    pub digest: String,
}

/// One file inside a bundle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleFile {
    /// Path relative to the bundle root, `/`-separated
    pub relative_path: String,
    /// Size in bytes
    pub size: u64,
    /// Hex SHA-256 of the content
    pub sha256: String,
}

impl BundleFile {
    /// Final path component
    pub fn file_name(&self) -> &str {
        self.relative_path
            .rsplit('/')
            .next()
            .unwrap_or(&self.relative_path)
    }
}

/// A retrieved bundle: files ordered by relative path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bundle {
    name: String,
    root: PathBuf,
    files: Vec<BundleFile>,
    digest: String,
}

impl Bundle {
    pub(crate) fn new(name: String, root: PathBuf, files: Vec<BundleFile>, digest: String) -> Self {
        Self {
            name,
            root,
            files,
            digest,
        }
    }

    /// Bundle name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Directory holding the files
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Files in bundle order
    pub fn files(&self) -> &[BundleFile] {
        &self.files
    }

    /// Content digest, equal to the handle digest returned by `put`
    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// Absolute path of a bundle file
    pub fn path_of(&self, file: &BundleFile) -> PathBuf {
        file.relative_path
            .split('/')
            .fold(self.root.clone(), |path, part| path.join(part))
    }

    /// Files whose file name matches any of the patterns, in bundle order
    pub fn select(&self, patterns: &[glob::Pattern]) -> Vec<&BundleFile> {
        self.files
            .iter()
            .filter(|file| patterns.iter().any(|p| p.matches(file.file_name())))
            .collect()
    }
}

static BUNDLE_NAME_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9._-]*$").expect("bundle name regex is valid")
});

/// Check that a bundle name is usable as a single directory name
pub fn validate_bundle_name(name: &str) -> std::result::Result<(), ArtifactError> {
    if BUNDLE_NAME_RE.is_match(name) {
        Ok(())
    } else {
        Err(ArtifactError::InvalidName {
            name: name.to_string(),
            reason: "use letters, digits, '.', '_' or '-', not starting with '.' or '-'"
                .to_string(),
        })
    }
}

/// Digest over an ordered file list
pub(crate) fn bundle_digest(files: &[BundleFile]) -> String {
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    for file in files {
        hasher.update(file.relative_path.as_bytes());
        hasher.update([0u8]);
        hasher.update(file.sha256.as_bytes());
        hasher.update([b'\n']);
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(path: &str) -> BundleFile {
        BundleFile {
            relative_path: path.to_string(),
            size: 1,
            sha256: "00".to_string(),
        }
    }

    #[test]
    fn test_bundle_name_validation() {
        assert!(validate_bundle_name("distfiles").is_ok());
        assert!(validate_bundle_name("dist_files-1.0").is_ok());
        assert!(validate_bundle_name("").is_err());
        assert!(validate_bundle_name(".hidden").is_err());
        assert!(validate_bundle_name("a/b").is_err());
        assert!(validate_bundle_name("..").is_err());
    }

    #[test]
    fn test_select_matches_file_names() {
        let bundle = Bundle::new(
            "distfiles".to_string(),
            PathBuf::from("/tmp/x"),
            vec![
                file("project-1.2.3-py3-none-any.whl"),
                file("project-1.2.3.tar.gz"),
                file("project-1.2.3.tar.gz.sig"),
                file("nested/other-0.1.tar.gz"),
            ],
            "d".to_string(),
        );
        let patterns = vec![
            glob::Pattern::new("*.tar.gz").expect("pattern"),
            glob::Pattern::new("*.whl").expect("pattern"),
        ];

        let selected: Vec<&str> = bundle
            .select(&patterns)
            .into_iter()
            .map(|f| f.relative_path.as_str())
            .collect();
        assert_eq!(
            selected,
            vec![
                "project-1.2.3-py3-none-any.whl",
                "project-1.2.3.tar.gz",
                "nested/other-0.1.tar.gz"
            ]
        );
    }

    #[test]
    fn test_digest_depends_on_order_and_content() {
        let a = vec![file("a"), file("b")];
        let b = vec![file("b"), file("a")];
        assert_ne!(bundle_digest(&a), bundle_digest(&b));

        let mut changed = a.clone();
        changed[1].sha256 = "ff".to_string();
        assert_ne!(bundle_digest(&a), bundle_digest(&changed));
        assert_eq!(bundle_digest(&a), bundle_digest(&a.clone()));
    }
}
