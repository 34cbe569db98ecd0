use std::path::{Path, PathBuf};

use tokio::fs;

/// A directory of files addressed by relative keys, each with a public reference.
#[derive(Clone, Debug)]
pub struct LocalFileStorage {
    base_dir: PathBuf,
    base_url: String,
}

impl LocalFileStorage {
    /// `base_url` prefixes the references handed to clients: a URL path such as
    /// `/images` for the web server, or the directory itself for the CLI.
    pub fn new(base_dir: PathBuf, base_url: String) -> Self {
        Self { base_dir, base_url }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub async fn get(&self, key: &str) -> std::io::Result<Option<Vec<u8>>> {
        let path = self.resolve_path(key);
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    pub async fn put(&self, key: &str, data: &[u8]) -> std::io::Result<()> {
        let path = self.resolve_path(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(path, data).await
    }

    pub fn get_public_url(&self, key: &str) -> String {
        let trimmed = self.base_url.trim_end_matches('/');
        let key = key.trim_start_matches('/');
        format!("{trimmed}/{key}")
    }

    pub fn resolve_path(&self, key: &str) -> PathBuf {
        let normalized = key.trim_start_matches('/');
        self.base_dir.join(Path::new(normalized))
    }
}
