//! Core metadata extraction from built distributions
//!
//! Wheels carry `*.dist-info/METADATA`, source distributions carry
//! `<name>-<version>/PKG-INFO`. Both are RFC 822 style header blocks with an
//! optional description body after the first blank line.

use crate::error::{PublishError, ReleaseError, Result};
use flate2::read::GzDecoder;
use std::io::Read;
use std::path::Path;

/// Kind of distribution, as the legacy upload API names it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DistributionKind {
    /// Built wheel with its python tag
    Wheel {
        /// Python tag, e.g. `py3`
        pyversion: String,
    },
    /// Source distribution
    Sdist,
}

impl DistributionKind {
    /// Classify by file name; `None` for anything that is not a distribution
    pub fn from_filename(filename: &str) -> Option<Self> {
        let lower = filename.to_ascii_lowercase();
        if let Some(stem) = lower.strip_suffix(".whl") {
            // name-version(-build)?-python-abi-platform
            let parts: Vec<&str> = stem.split('-').collect();
            if parts.len() < 5 {
                return None;
            }
            let original_stem = &filename[..stem.len()];
            let pyversion = original_stem.rsplit('-').nth(2)?;
            return Some(Self::Wheel {
                pyversion: pyversion.to_string(),
            });
        }
        if lower.ends_with(".tar.gz") || lower.ends_with(".zip") {
            return Some(Self::Sdist);
        }
        None
    }

    /// `filetype` form value
    pub fn filetype(&self) -> &'static str {
        match self {
            Self::Wheel { .. } => "bdist_wheel",
            Self::Sdist => "sdist",
        }
    }

    /// `pyversion` form value
    pub fn pyversion(&self) -> &str {
        match self {
            Self::Wheel { pyversion } => pyversion,
            Self::Sdist => "source",
        }
    }
}

/// Parsed core metadata
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoreMetadata {
    headers: Vec<(String, String)>,
    description: Option<String>,
}

impl CoreMetadata {
    /// Parse a METADATA / PKG-INFO document
    pub fn parse(text: &str) -> Self {
        let mut headers: Vec<(String, String)> = Vec::new();
        let mut lines = text.lines();
        let mut body_start = false;

        for line in lines.by_ref() {
            if line.is_empty() {
                body_start = true;
                break;
            }
            if line.starts_with([' ', '\t']) {
                // Continuation of the previous header
                if let Some((_, value)) = headers.last_mut() {
                    let continued = line.trim_start();
                    let continued = continued.strip_prefix('|').unwrap_or(continued);
                    value.push('\n');
                    value.push_str(continued);
                }
                continue;
            }
            if let Some((key, value)) = line.split_once(':') {
                headers.push((key.trim().to_string(), value.trim().to_string()));
            }
        }

        let mut description = None;
        if body_start {
            let body = lines.collect::<Vec<_>>().join("\n");
            if !body.trim().is_empty() {
                description = Some(body);
            }
        }
        if description.is_none()
            && let Some(index) = headers
                .iter()
                .position(|(k, _)| k.eq_ignore_ascii_case("Description"))
        {
            description = Some(headers.remove(index).1);
        }

        Self {
            headers,
            description,
        }
    }

    /// First value of a header (case-insensitive)
    pub fn get(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Every value of a repeatable header
    pub fn get_all(&self, key: &str) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Long description, from the body or the `Description` header
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Project name
    pub fn name(&self) -> Option<&str> {
        self.get("Name")
    }

    /// Project version
    pub fn version(&self) -> Option<&str> {
        self.get("Version")
    }

    /// Check the fields every upload needs
    pub fn require_core_fields(&self, filename: &str) -> Result<()> {
        for key in ["Metadata-Version", "Name", "Version"] {
            if self.get(key).is_none_or(str::is_empty) {
                return Err(invalid(filename, format!("metadata has no {} field", key)));
            }
        }
        Ok(())
    }

    /// Form fields for the legacy upload API, in header order
    pub fn form_fields(&self) -> Vec<(String, String)> {
        let mut fields: Vec<(String, String)> = self
            .headers
            .iter()
            .map(|(key, value)| (form_field_name(key), value.clone()))
            .collect();
        if let Some(description) = &self.description {
            fields.push(("description".to_string(), description.clone()));
        }
        fields
    }
}

/// Legacy upload form name for a metadata header
pub fn form_field_name(header: &str) -> String {
    match header.to_ascii_lowercase().as_str() {
        "classifier" => "classifiers".to_string(),
        "project-url" => "project_urls".to_string(),
        "platform" => "platform".to_string(),
        "supported-platform" => "supported_platform".to_string(),
        "requires-dist" => "requires_dist".to_string(),
        "provides-dist" => "provides_dist".to_string(),
        "obsoletes-dist" => "obsoletes_dist".to_string(),
        "requires-external" => "requires_external".to_string(),
        "provides-extra" => "provides_extra".to_string(),
        "license-file" => "license_files".to_string(),
        "dynamic" => "dynamic".to_string(),
        other => other.replace('-', "_"),
    }
}

/// Read core metadata from a distribution file
pub fn read_metadata(path: &Path, kind: &DistributionKind) -> Result<CoreMetadata> {
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let text = match kind {
        DistributionKind::Wheel { .. } => read_zip_member(path, &filename, |name| {
            let mut parts = name.split('/');
            matches!(
                (parts.next(), parts.next(), parts.next()),
                (Some(dir), Some("METADATA"), None) if dir.ends_with(".dist-info")
            )
        })?,
        DistributionKind::Sdist if filename.to_ascii_lowercase().ends_with(".zip") => {
            read_zip_member(path, &filename, is_top_level_pkg_info)?
        }
        DistributionKind::Sdist => read_tar_gz_pkg_info(path, &filename)?,
    };

    let metadata = CoreMetadata::parse(&text);
    metadata.require_core_fields(&filename)?;
    Ok(metadata)
}

fn is_top_level_pkg_info(name: &str) -> bool {
    let mut parts = name.split('/');
    matches!(
        (parts.next(), parts.next(), parts.next()),
        (Some(_), Some("PKG-INFO"), None)
    )
}

fn read_zip_member(path: &Path, filename: &str, wanted: impl Fn(&str) -> bool) -> Result<String> {
    let file = std::fs::File::open(path)?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| invalid(filename, e))?;

    let member = archive
        .file_names()
        .find(|name| wanted(name))
        .map(str::to_string)
        .ok_or_else(|| invalid(filename, "no metadata file in archive"))?;

    let mut entry = archive.by_name(&member).map_err(|e| invalid(filename, e))?;
    let mut text = String::new();
    entry
        .read_to_string(&mut text)
        .map_err(|e| invalid(filename, e))?;
    Ok(text)
}

fn read_tar_gz_pkg_info(path: &Path, filename: &str) -> Result<String> {
    let file = std::fs::File::open(path)?;
    let mut archive = tar::Archive::new(GzDecoder::new(file));

    for entry in archive.entries().map_err(|e| invalid(filename, e))? {
        let mut entry = entry.map_err(|e| invalid(filename, e))?;
        let name = entry
            .path()
            .map_err(|e| invalid(filename, e))?
            .to_string_lossy()
            .replace('\\', "/");
        if is_top_level_pkg_info(name.trim_start_matches("./")) {
            let mut text = String::new();
            entry
                .read_to_string(&mut text)
                .map_err(|e| invalid(filename, e))?;
            return Ok(text);
        }
    }
    Err(invalid(filename, "no PKG-INFO in archive"))
}

fn invalid(filename: &str, reason: impl std::fmt::Display) -> ReleaseError {
    PublishError::InvalidDistribution {
        filename: filename.to_string(),
        reason: reason.to_string(),
    }
    .into()
}
