use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::warn;

use crate::error::PersistenceError;
use crate::storage::LocalFileStorage;

pub const METADATA_FILE: &str = "metadata.json";

/// Sidecar record for one generated image file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageMetadata {
    pub original_prompt: String,
    pub improved_prompt: String,
    pub style: String,
    pub full_prompt: String,
    pub created_at: DateTime<Utc>,
}

pub type MetadataMap = BTreeMap<String, ImageMetadata>;

/// `metadata.json` keyed by image file name. Every update rewrites the whole file.
#[derive(Debug)]
pub struct MetadataStore {
    storage: LocalFileStorage,
    write_lock: Mutex<()>,
}

impl MetadataStore {
    pub fn new(storage: LocalFileStorage) -> Self {
        Self {
            storage,
            write_lock: Mutex::new(()),
        }
    }

    pub async fn load(&self) -> Result<MetadataMap, PersistenceError> {
        match self.storage.get(METADATA_FILE).await? {
            Some(bytes) => match serde_json::from_slice(&bytes) {
                Ok(map) => Ok(map),
                Err(err) => {
                    warn!(error = %err, "metadata file is unreadable, starting a new one");
                    Ok(MetadataMap::new())
                }
            },
            None => Ok(MetadataMap::new()),
        }
    }

    pub async fn record<I>(&self, entries: I) -> Result<(), PersistenceError>
    where
        I: IntoIterator<Item = (String, ImageMetadata)>,
    {
        let _guard = self.write_lock.lock().await;
        let mut map = self.load().await?;
        map.extend(entries);
        let payload = serde_json::to_vec_pretty(&map)?;
        self.storage.put(METADATA_FILE, &payload).await?;
        Ok(())
    }
}
