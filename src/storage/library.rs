use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::fs;
use tracing::info;

use crate::error::PersistenceError;
use crate::generator::Artifact;
use crate::storage::{ImageMetadata, LocalFileStorage, MetadataStore, compute_hash, slugify};

/// Describes the prompts behind a batch of artifacts.
#[derive(Debug, Clone)]
pub struct ImageContext<'a> {
    /// Source of the readable part of file names.
    pub naming_hint: &'a str,
    pub original_prompt: &'a str,
    pub improved_prompt: &'a str,
    pub style_name: &'a str,
    pub full_prompt: &'a str,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GalleryEntry {
    pub filename: String,
    pub url: String,
    pub original_prompt: Option<String>,
    pub improved_prompt: Option<String>,
    pub style: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// PNG files in one directory plus their sidecar metadata.
#[derive(Debug, Clone)]
pub struct ImageLibrary {
    storage: LocalFileStorage,
    metadata: Arc<MetadataStore>,
}

pub fn image_file_name(context: &ImageContext<'_>, index: usize) -> String {
    let hash = compute_hash(context.full_prompt);
    format!("{}_{}_{}.png", slugify(context.naming_hint), &hash[..12], index + 1)
}

impl ImageLibrary {
    pub fn new(storage: LocalFileStorage) -> Self {
        let metadata = Arc::new(MetadataStore::new(storage.clone()));
        Self { storage, metadata }
    }

    pub fn storage(&self) -> &LocalFileStorage {
        &self.storage
    }

    /// Decodes and writes every artifact, then records them in the sidecar.
    /// Returns the public reference of each written file, in artifact order.
    pub async fn save(
        &self,
        artifacts: &[Artifact],
        context: &ImageContext<'_>,
    ) -> Result<Vec<String>, PersistenceError> {
        let created_at = Utc::now();
        let mut references = Vec::with_capacity(artifacts.len());
        let mut entries = Vec::with_capacity(artifacts.len());

        for (index, artifact) in artifacts.iter().enumerate() {
            let bytes = STANDARD
                .decode(artifact.base64.as_bytes())
                .map_err(|source| PersistenceError::Decode { index, source })?;
            let file_name = image_file_name(context, index);
            self.storage.put(&file_name, &bytes).await?;
            info!(file = %file_name, bytes = bytes.len(), "image saved");

            references.push(self.storage.get_public_url(&file_name));
            entries.push((
                file_name,
                ImageMetadata {
                    original_prompt: context.original_prompt.to_string(),
                    improved_prompt: context.improved_prompt.to_string(),
                    style: context.style_name.to_string(),
                    full_prompt: context.full_prompt.to_string(),
                    created_at,
                },
            ));
        }

        self.metadata.record(entries).await?;
        Ok(references)
    }

    /// Newest-first listing of the PNG files joined with their metadata.
    pub async fn list_images(&self, limit: usize) -> Result<Vec<GalleryEntry>, PersistenceError> {
        let mut dir = match fs::read_dir(self.storage.base_dir()).await {
            Ok(dir) => dir,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        let metadata = self.metadata.load().await?;

        let mut entries = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("png") {
                continue;
            }
            let Some(filename) = path.file_name().and_then(|name| name.to_str()) else {
                continue;
            };
            let filename = filename.to_string();
            let record = metadata.get(&filename);
            let created_at = match record {
                Some(record) => record.created_at,
                None => entry
                    .metadata()
                    .await?
                    .modified()
                    .map(DateTime::<Utc>::from)
                    .unwrap_or_default(),
            };
            entries.push(GalleryEntry {
                url: self.storage.get_public_url(&filename),
                original_prompt: record.map(|r| r.original_prompt.clone()),
                improved_prompt: record.map(|r| r.improved_prompt.clone()),
                style: record.map(|r| r.style.clone()),
                filename,
                created_at,
            });
        }

        entries.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.filename.cmp(&a.filename))
        });
        entries.truncate(limit);
        Ok(entries)
    }
}
