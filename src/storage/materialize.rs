use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::error::PersistenceError;
use crate::generator::Artifact;
use crate::storage::{ImageContext, ImageLibrary};

/// Where finished artifacts end up; chosen once per deployment.
#[derive(Debug, Clone)]
pub enum Delivery {
    Inline,
    Files(ImageLibrary),
}

impl Delivery {
    pub fn library(&self) -> Option<&ImageLibrary> {
        match self {
            Self::Inline => None,
            Self::Files(library) => Some(library),
        }
    }

    /// Turns artifacts into references a client can consume, preserving order.
    pub async fn materialize(
        &self,
        artifacts: &[Artifact],
        context: &ImageContext<'_>,
    ) -> Result<Vec<String>, PersistenceError> {
        if artifacts.is_empty() {
            return Err(PersistenceError::Empty);
        }
        match self {
            Self::Inline => encode_inline(artifacts),
            Self::Files(library) => library.save(artifacts, context).await,
        }
    }
}

fn encode_inline(artifacts: &[Artifact]) -> Result<Vec<String>, PersistenceError> {
    artifacts
        .iter()
        .enumerate()
        .map(|(index, artifact)| {
            let bytes = STANDARD
                .decode(artifact.base64.as_bytes())
                .map_err(|source| PersistenceError::Decode { index, source })?;
            Ok(format!("data:image/png;base64,{}", STANDARD.encode(bytes)))
        })
        .collect()
}
