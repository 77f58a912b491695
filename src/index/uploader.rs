//! Multipart upload of distributions to a package index

use super::metadata::{CoreMetadata, DistributionKind, read_metadata};
use crate::artifact::{Bundle, BundleFile};
use crate::credentials::{IndexTokenProvider, Secret};
use crate::error::{PublishError, ReleaseError, Result};
use crate::event::ReleaseEvent;
use crate::pipeline::{PublishReceipt, PublishedFile, Publisher, StageKind};
use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::multipart::{Form, Part};
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::sync::Arc;

const TARGET: &str = "package index";

/// A distribution read and hashed, ready to send
#[derive(Debug)]
struct PreparedUpload {
    filename: String,
    kind: DistributionKind,
    metadata: CoreMetadata,
    content: Vec<u8>,
    sha256: String,
    md5: String,
}

impl PreparedUpload {
    fn read(path: PathBuf, filename: String, kind: DistributionKind) -> Result<Self> {
        let metadata = read_metadata(&path, &kind)?;
        let content = std::fs::read(&path)?;
        let sha256 = hex::encode(Sha256::digest(&content));
        let md5 = format!("{:x}", md5::compute(&content));
        Ok(Self {
            filename,
            kind,
            metadata,
            content,
            sha256,
            md5,
        })
    }

    fn receipt_entry(&self) -> PublishedFile {
        PublishedFile {
            name: self.filename.clone(),
            size: self.content.len() as u64,
            sha256: self.sha256.clone(),
            md5: Some(self.md5.clone()),
            url: None,
        }
    }

    fn into_form(self) -> Result<Form> {
        let mut form = Form::new()
            .text(":action", "file_upload")
            .text("protocol_version", "1");
        for (name, value) in self.metadata.form_fields() {
            form = form.text(name, value);
        }
        form = form
            .text("filetype", self.kind.filetype())
            .text("pyversion", self.kind.pyversion().to_string())
            .text("md5_digest", self.md5)
            .text("sha256_digest", self.sha256);

        let part = Part::bytes(self.content)
            .file_name(self.filename)
            .mime_str("application/octet-stream")?;
        Ok(form.part("content", part))
    }
}

/// Publisher pushing wheels and sdists to a package index
pub struct IndexPublisher {
    client: reqwest::Client,
    repository_url: String,
    tokens: Arc<dyn IndexTokenProvider>,
    print_hash: bool,
    dry_run: bool,
}

impl IndexPublisher {
    /// Create a publisher for the legacy upload endpoint `repository_url`
    pub fn new(
        client: reqwest::Client,
        repository_url: impl Into<String>,
        tokens: Arc<dyn IndexTokenProvider>,
        print_hash: bool,
        dry_run: bool,
    ) -> Self {
        Self {
            client,
            repository_url: repository_url.into(),
            tokens,
            print_hash,
            dry_run,
        }
    }

    async fn prepare(
        &self,
        bundle: &Bundle,
        files: &[&BundleFile],
    ) -> Result<Vec<PreparedUpload>> {
        let mut prepared = Vec::with_capacity(files.len());
        for file in files {
            let filename = file.file_name().to_string();
            let kind = DistributionKind::from_filename(&filename).ok_or_else(|| {
                PublishError::InvalidDistribution {
                    filename: filename.clone(),
                    reason: "not a wheel or source distribution".to_string(),
                }
            })?;
            let path = bundle.path_of(file);
            let upload =
                tokio::task::spawn_blocking(move || PreparedUpload::read(path, filename, kind))
                    .await
                    .map_err(|e| std::io::Error::other(e.to_string()))??;

            if upload.sha256 != file.sha256 {
                return Err(crate::error::ArtifactError::IntegrityMismatch {
                    name: bundle.name().to_string(),
                    file: upload.filename,
                    expected: file.sha256.clone(),
                    actual: upload.sha256,
                }
                .into());
            }
            prepared.push(upload);
        }
        Ok(prepared)
    }

    async fn upload(&self, token: &Secret, upload: PreparedUpload) -> Result<PublishedFile> {
        let entry = upload.receipt_entry();
        log::info!("Uploading {} to {}", entry.name, self.repository_url);

        let form = upload.into_form()?;
        let response = self
            .client
            .post(&self.repository_url)
            .basic_auth("__token__", Some(token.expose()))
            .multipart(form)
            .send()
            .await
            .map_err(network)?;

        let status = response.status();
        if status.is_success() {
            return Ok(entry);
        }
        let body = response.text().await.unwrap_or_default();
        Err(classify_failure(status, &body, &entry.name))
    }
}

#[async_trait]
impl Publisher for IndexPublisher {
    fn stage(&self) -> StageKind {
        StageKind::IndexUpload
    }

    async fn publish(&self, bundle: &Bundle, _event: &ReleaseEvent) -> Result<PublishReceipt> {
        // Every bundled file must be a distribution; anything else fails the stage.
        let files: Vec<&BundleFile> = bundle.files().iter().collect();
        let prepared = self.prepare(bundle, &files).await?;

        if self.print_hash {
            log::debug!("Showing hash values of files to be uploaded:");
            for upload in &prepared {
                log::debug!("{}", upload.filename);
                log::debug!("  SHA256: {}", upload.sha256);
                log::debug!("  MD5:    {}", upload.md5);
            }
        }

        if self.dry_run {
            log::info!(
                "[dry-run] Would upload {} file(s) to {}",
                prepared.len(),
                self.repository_url
            );
            return Ok(PublishReceipt {
                destination: self.repository_url.clone(),
                dry_run: true,
                show_hashes: self.print_hash,
                files: prepared.iter().map(PreparedUpload::receipt_entry).collect(),
            });
        }

        let token = self.tokens.upload_token().await?;

        let mut published = Vec::with_capacity(prepared.len());
        for upload in prepared {
            published.push(self.upload(&token, upload).await?);
        }

        Ok(PublishReceipt {
            destination: self.repository_url.clone(),
            dry_run: false,
            show_hashes: self.print_hash,
            files: published,
        })
    }
}

fn network(e: reqwest::Error) -> ReleaseError {
    PublishError::NetworkError {
        target: TARGET.to_string(),
        reason: e.to_string(),
    }
    .into()
}

fn classify_failure(status: StatusCode, body: &str, filename: &str) -> ReleaseError {
    if status == StatusCode::BAD_REQUEST && body.contains("File already exists") {
        return PublishError::FileAlreadyExists {
            filename: filename.to_string(),
        }
        .into();
    }
    if status == StatusCode::FORBIDDEN || status == StatusCode::UNAUTHORIZED {
        return PublishError::AuthenticationError {
            target: TARGET.to_string(),
            reason: format!("upload of {} rejected ({})", filename, status),
        }
        .into();
    }
    PublishError::Api {
        target: TARGET.to_string(),
        status: status.as_u16(),
        message: first_line(body),
    }
    .into()
}

fn first_line(body: &str) -> String {
    body.lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or_default()
        .to_string()
}
