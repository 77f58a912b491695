//! Filesystem-backed artifact store.
//!
//! Layout under the store root:
//!
//! ```text
//! <root>/<name>/manifest.json
//! <root>/<name>/files/<relative paths...>
//! ```
//!
//! A bundle is assembled in a staging directory and renamed into place, so a
//! reader never observes a half-written bundle.

use super::{ArtifactStore, Bundle, BundleFile, BundleHandle, bundle_digest, validate_bundle_name};
use crate::error::{ArtifactError, CliError, ReleaseError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

const MANIFEST_FILE: &str = "manifest.json";
const FILES_DIR: &str = "files";

#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
    name: String,
    created_at: chrono::DateTime<chrono::Utc>,
    digest: String,
    files: Vec<BundleFile>,
}

/// Artifact store rooted at a local directory
#[derive(Debug, Clone)]
pub struct LocalArtifactStore {
    root: PathBuf,
}

impl LocalArtifactStore {
    /// Create a store rooted at `root` (created lazily on first `put`)
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    /// Store root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Delete bundle `name` left by an earlier run
    ///
    /// Returns whether a bundle was removed. Not part of [`ArtifactStore`]:
    /// within a run, bundles are never replaced.
    pub fn discard(&self, name: &str) -> Result<bool> {
        validate_bundle_name(name)?;
        let target = self.root.join(name);
        if !target.exists() {
            return Ok(false);
        }
        for entry in walkdir::WalkDir::new(&target).into_iter().flatten() {
            if entry.file_type().is_file() {
                let mut permissions = fs::metadata(entry.path())?.permissions();
                permissions.set_readonly(false);
                fs::set_permissions(entry.path(), permissions)?;
            }
        }
        fs::remove_dir_all(&target)?;
        Ok(true)
    }
}

#[async_trait]
impl ArtifactStore for LocalArtifactStore {
    async fn put(&self, name: &str, dir: &Path) -> Result<BundleHandle> {
        validate_bundle_name(name)?;
        let root = self.root.clone();
        let name = name.to_string();
        let dir = dir.to_path_buf();

        tokio::task::spawn_blocking(move || put_blocking(&root, &name, &dir))
            .await
            .map_err(|e| join_error("artifact_put", e))?
    }

    async fn get(&self, name: &str) -> Result<Bundle> {
        validate_bundle_name(name)?;
        let root = self.root.clone();
        let name = name.to_string();

        tokio::task::spawn_blocking(move || get_blocking(&root, &name))
            .await
            .map_err(|e| join_error("artifact_get", e))?
    }
}

fn join_error(command: &str, e: tokio::task::JoinError) -> ReleaseError {
    ReleaseError::Cli(CliError::ExecutionFailed {
        command: command.to_string(),
        reason: format!("blocking task failed: {}", e),
    })
}

fn put_blocking(root: &Path, name: &str, dir: &Path) -> Result<BundleHandle> {
    let relative_paths = collect_files(dir)?;
    if relative_paths.is_empty() {
        return Err(ArtifactError::NoFilesFound {
            path: dir.to_path_buf(),
        }
        .into());
    }

    let target = root.join(name);
    if target.exists() {
        return Err(ArtifactError::AlreadyExists {
            name: name.to_string(),
        }
        .into());
    }

    write_bundle(root, name, dir, &relative_paths)
}

/// Copy `relative_paths` from `dir` into a staging directory and move it to
/// `root/name`; the staging directory never outlives a failure
fn write_bundle(
    root: &Path,
    name: &str,
    dir: &Path,
    relative_paths: &[String],
) -> Result<BundleHandle> {
    fs::create_dir_all(root)?;
    let staging = root.join(format!(".{}.staging-{}", name, std::process::id()));
    if staging.exists() {
        fs::remove_dir_all(&staging)?;
    }

    let manifest = match fill_staging(&staging, name, dir, relative_paths) {
        Ok(manifest) => manifest,
        Err(e) => {
            let _ = fs::remove_dir_all(&staging);
            return Err(e);
        }
    };

    let target = root.join(name);
    if let Err(e) = fs::rename(&staging, &target) {
        let _ = fs::remove_dir_all(&staging);
        if target.exists() {
            return Err(ArtifactError::AlreadyExists {
                name: name.to_string(),
            }
            .into());
        }
        return Err(e.into());
    }

    let total_bytes: u64 = manifest.files.iter().map(|f| f.size).sum();
    log::info!(
        "Stored bundle '{}' ({} file(s), {} bytes)",
        name,
        manifest.files.len(),
        total_bytes
    );

    Ok(BundleHandle {
        name: name.to_string(),
        file_count: manifest.files.len(),
        total_bytes,
        digest: manifest.digest,
    })
}

fn fill_staging(
    staging: &Path,
    name: &str,
    dir: &Path,
    relative_paths: &[String],
) -> Result<Manifest> {
    let staging_files = staging.join(FILES_DIR);
    let mut files = Vec::with_capacity(relative_paths.len());
    for relative in relative_paths {
        let destination = join_relative(&staging_files, relative);
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(join_relative(dir, relative), &destination)?;

        let (sha256, size) = hash_file(&destination)?;
        set_read_only(&destination)?;
        files.push(BundleFile {
            relative_path: relative.clone(),
            size,
            sha256,
        });
    }

    let manifest = Manifest {
        name: name.to_string(),
        created_at: chrono::Utc::now(),
        digest: bundle_digest(&files),
        files,
    };
    fs::write(
        staging.join(MANIFEST_FILE),
        serde_json::to_string_pretty(&manifest)?,
    )?;
    Ok(manifest)
}

fn get_blocking(root: &Path, name: &str) -> Result<Bundle> {
    let bundle_dir = root.join(name);
    let manifest_path = bundle_dir.join(MANIFEST_FILE);
    if !manifest_path.is_file() {
        return Err(ArtifactError::NotFound {
            name: name.to_string(),
        }
        .into());
    }

    let corrupt = |reason: String| ArtifactError::CorruptManifest {
        name: name.to_string(),
        reason,
    };

    let text = fs::read_to_string(&manifest_path)?;
    let manifest: Manifest = serde_json::from_str(&text).map_err(|e| corrupt(e.to_string()))?;

    if manifest.name != name {
        return Err(corrupt(format!("manifest names bundle '{}'", manifest.name)).into());
    }
    if bundle_digest(&manifest.files) != manifest.digest {
        return Err(corrupt("digest does not match file list".to_string()).into());
    }

    let files_dir = bundle_dir.join(FILES_DIR);
    for file in &manifest.files {
        let path = join_relative(&files_dir, &file.relative_path);
        let actual = if path.is_file() {
            hash_file(&path)?.0
        } else {
            "missing".to_string()
        };
        if actual != file.sha256 {
            return Err(ArtifactError::IntegrityMismatch {
                name: name.to_string(),
                file: file.relative_path.clone(),
                expected: file.sha256.clone(),
                actual,
            }
            .into());
        }
    }

    let on_disk = collect_files(&files_dir)?;
    if on_disk.len() != manifest.files.len() {
        return Err(corrupt(format!(
            "{} file(s) on disk, {} in manifest",
            on_disk.len(),
            manifest.files.len()
        ))
        .into());
    }

    Ok(Bundle::new(
        manifest.name,
        files_dir,
        manifest.files,
        manifest.digest,
    ))
}

/// Regular files under `dir`, as sorted `/`-separated relative paths
///
/// A missing directory yields an empty list.
fn collect_files(dir: &Path) -> Result<Vec<String>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in walkdir::WalkDir::new(dir).follow_links(true) {
        let entry = entry.map_err(|e| std::io::Error::other(e.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(dir)
            .map_err(|e| std::io::Error::other(e.to_string()))?;

        let mut parts = Vec::new();
        for component in relative.components() {
            let part = component.as_os_str().to_str().ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("non UTF-8 file name: {}", entry.path().display()),
                )
            })?;
            parts.push(part.to_string());
        }
        files.push(parts.join("/"));
    }

    files.sort();
    Ok(files)
}

fn join_relative(base: &Path, relative: &str) -> PathBuf {
    relative
        .split('/')
        .fold(base.to_path_buf(), |path, part| path.join(part))
}

/// Hex SHA-256 and size of a file
pub(crate) fn hash_file(path: &Path) -> Result<(String, u64)> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let size = std::io::copy(&mut file, &mut hasher)?;
    Ok((hex::encode(hasher.finalize()), size))
}

fn set_read_only(path: &Path) -> Result<()> {
    let mut permissions = fs::metadata(path)?.permissions();
    permissions.set_readonly(true);
    fs::set_permissions(path, permissions)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, relative: &str, content: &[u8]) {
        let path = join_relative(dir, relative);
        fs::create_dir_all(path.parent().expect("parent")).expect("create dirs");
        fs::write(path, content).expect("write file");
    }

    #[tokio::test]
    async fn test_put_then_get_returns_same_files() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let dist = tmp.path().join("dist");
        write(&dist, "project-1.2.3.tar.gz", b"sdist bytes");
        write(&dist, "project-1.2.3-py3-none-any.whl", b"wheel bytes");

        let store = LocalArtifactStore::new(tmp.path().join("store"));
        let handle = store.put("distfiles", &dist).await.expect("put");
        assert_eq!(handle.file_count, 2);
        assert_eq!(handle.total_bytes, 22);

        let bundle = store.get("distfiles").await.expect("get");
        assert_eq!(bundle.digest(), handle.digest);
        let names: Vec<&str> = bundle.files().iter().map(|f| f.file_name()).collect();
        assert_eq!(
            names,
            vec!["project-1.2.3-py3-none-any.whl", "project-1.2.3.tar.gz"]
        );
        for file in bundle.files() {
            let content = fs::read(bundle.path_of(file)).expect("read stored");
            let original = fs::read(dist.join(&file.relative_path)).expect("read original");
            assert_eq!(content, original);
        }
    }

    #[tokio::test]
    async fn test_put_empty_directory_fails() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let dist = tmp.path().join("dist");
        fs::create_dir_all(&dist).expect("mkdir");

        let store = LocalArtifactStore::new(tmp.path().join("store"));
        let err = store.put("distfiles", &dist).await.unwrap_err();
        assert!(matches!(
            err,
            ReleaseError::Artifact(ArtifactError::NoFilesFound { .. })
        ));
        assert!(err.to_string().contains("No files were found"));
        assert!(matches!(
            store.get("distfiles").await.unwrap_err(),
            ReleaseError::Artifact(ArtifactError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_put_missing_directory_fails() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store = LocalArtifactStore::new(tmp.path().join("store"));
        let err = store
            .put("distfiles", &tmp.path().join("nope"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ReleaseError::Artifact(ArtifactError::NoFilesFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_bundle_is_immutable() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let dist = tmp.path().join("dist");
        write(&dist, "a.whl", b"a");

        let store = LocalArtifactStore::new(tmp.path().join("store"));
        store.put("distfiles", &dist).await.expect("first put");

        write(&dist, "b.whl", b"b");
        let err = store.put("distfiles", &dist).await.unwrap_err();
        assert!(matches!(
            err,
            ReleaseError::Artifact(ArtifactError::AlreadyExists { .. })
        ));
        assert_eq!(store.get("distfiles").await.expect("get").files().len(), 1);
    }

    #[tokio::test]
    async fn test_get_detects_tampering() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let dist = tmp.path().join("dist");
        write(&dist, "a.whl", b"original");

        let store = LocalArtifactStore::new(tmp.path().join("store"));
        store.put("distfiles", &dist).await.expect("put");

        let stored = tmp.path().join("store/distfiles/files/a.whl");
        let mut permissions = fs::metadata(&stored).expect("metadata").permissions();
        permissions.set_readonly(false);
        fs::set_permissions(&stored, permissions).expect("chmod");
        fs::write(&stored, b"tampered").expect("overwrite");

        let err = store.get("distfiles").await.unwrap_err();
        assert!(matches!(
            err,
            ReleaseError::Artifact(ArtifactError::IntegrityMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_discard_allows_new_bundle() {
        let source = tempfile::tempdir().expect("tempdir");
        let store_dir = tempfile::tempdir().expect("tempdir");
        write(source.path(), "pkg-1.0.tar.gz", b"sdist");

        let store = LocalArtifactStore::new(store_dir.path());
        store.put("distfiles", source.path()).await.expect("first put");
        assert!(store.discard("distfiles").expect("discard"));
        assert!(!store.discard("distfiles").expect("second discard"));
        store.put("distfiles", source.path()).await.expect("put after discard");
    }

    #[tokio::test]
    async fn test_nested_paths_are_kept() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let dist = tmp.path().join("dist");
        write(&dist, "sub/inner.tar.gz", b"x");
        write(&dist, "top.whl", b"y");

        let store = LocalArtifactStore::new(tmp.path().join("store"));
        store.put("distfiles", &dist).await.expect("put");
        let bundle = store.get("distfiles").await.expect("get");

        let paths: Vec<&str> = bundle
            .files()
            .iter()
            .map(|f| f.relative_path.as_str())
            .collect();
        assert_eq!(paths, vec!["sub/inner.tar.gz", "top.whl"]);
        assert!(bundle.path_of(&bundle.files()[0]).is_file());
    }

    #[test]
    fn test_failed_copy_leaves_no_staging_directory() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let dist = tmp.path().join("dist");
        write(&dist, "pkg-1.0-py3-none-any.whl", b"wheel");
        let root = tmp.path().join("store");

        // The second file vanished after the directory was listed
        let listed = vec![
            "pkg-1.0-py3-none-any.whl".to_string(),
            "pkg-1.0.tar.gz".to_string(),
        ];
        assert!(write_bundle(&root, "distfiles", &dist, &listed).is_err());

        let leftovers: Vec<_> = fs::read_dir(&root)
            .expect("read store")
            .map(|entry| entry.expect("entry").file_name())
            .collect();
        assert!(leftovers.is_empty(), "left behind: {leftovers:?}");
    }
}
