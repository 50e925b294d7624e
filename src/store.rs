use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::encode::Encoder;
use crate::error::PriceError;
use crate::regress::{LinearModel, Metrics};
use crate::vocab::CategoryVocabulary;

const DEFAULT_MODEL_PATH: &str = "data/model.json";

/// The unit of persistence: everything needed to reproduce training-time
/// behavior at inference time in one self-describing file. Data only — no
/// behavior is serialized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub vocabulary: CategoryVocabulary,
    pub encoder: Encoder,
    pub model: LinearModel,
    /// Feature column order frozen at fit time; the target column `price` is
    /// always last in the dataset and is not part of this list.
    pub columns: Vec<String>,
    pub trained_rows: usize,
    pub metrics: Metrics,
    pub trained_at: DateTime<Utc>,
}

impl ModelArtifact {
    /// The non-empty-features invariant checked both before save and after
    /// load. A half-trained artifact must never be persisted or served.
    pub fn is_valid(&self) -> bool {
        !self.columns.is_empty()
            && !self.encoder.is_empty()
            && self.model.coefficients.len() == self.encoder.width()
    }
}

/// File-backed artifact store. The location is injected at construction so
/// tests can redirect it to an ephemeral directory.
pub struct ModelStore {
    path: PathBuf,
}

impl ModelStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn default_location() -> Self {
        Self::new(DEFAULT_MODEL_PATH)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persist a trained artifact, overwriting any previous one. Refuses an
    /// artifact with a missing or empty feature set: this is the primary
    /// corruption-prevention gate.
    pub fn save(&self, artifact: &ModelArtifact) -> Result<()> {
        if !artifact.is_valid() {
            return Err(PriceError::DataEmpty("empty feature set".into()).into());
        }
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(artifact)?;
        fs::write(&self.path, json)
            .with_context(|| format!("writing {}", self.path.display()))?;
        info!("saved model artifact to {}", self.path.display());
        Ok(())
    }

    /// Load the persisted artifact, or `None` when there is none. Any
    /// unreadable, truncated, or structurally invalid file is deleted and
    /// reported as absent — "must retrain" is an acceptable degraded state,
    /// serving predictions from a corrupt model is not.
    pub fn load(&self) -> Option<ModelArtifact> {
        let bytes = match fs::read_to_string(&self.path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("unreadable model artifact {}: {}", self.path.display(), e);
                self.discard();
                return None;
            }
        };

        let artifact: ModelArtifact = match serde_json::from_str(&bytes) {
            Ok(a) => a,
            Err(e) => {
                warn!("corrupt model artifact {}: {}", self.path.display(), e);
                self.discard();
                return None;
            }
        };

        if !artifact.is_valid() {
            warn!(
                "model artifact {} failed the feature-set check",
                self.path.display()
            );
            self.discard();
            return None;
        }

        Some(artifact)
    }

    fn discard(&self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("failed to delete bad artifact {}: {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::Encoder;
    use crate::vocab::ATTRIBUTES;

    fn sample_artifact() -> ModelArtifact {
        let rows = vec![
            vec![
                "Intel i5".to_string(),
                "SSD".to_string(),
                "8 GB".to_string(),
                "Windows 10".to_string(),
                "Bardzo dobry".to_string(),
                "NVIDIA GTX".to_string(),
            ],
            vec![
                "AMD Ryzen 5".to_string(),
                "NVMe SSD".to_string(),
                "16 GB".to_string(),
                "Windows 11".to_string(),
                "Nowy".to_string(),
                "NVIDIA RTX".to_string(),
            ],
        ];
        let encoder = Encoder::fit(&ATTRIBUTES, &rows);
        let x = encoder.transform(&rows);
        let model = LinearModel::fit(&x, &[800.0, 1500.0]).unwrap();
        let metrics = model.evaluate(&x, &[800.0, 1500.0]);
        ModelArtifact {
            vocabulary: CategoryVocabulary::builtin(),
            encoder,
            model,
            columns: ATTRIBUTES.iter().map(|a| a.to_string()).collect(),
            trained_rows: 2,
            metrics,
            trained_at: Utc::now(),
        }
    }

    #[test]
    fn round_trip_preserves_predictions() {
        let dir = tempfile::tempdir().unwrap();
        let store = ModelStore::new(dir.path().join("model.json"));
        let artifact = sample_artifact();

        let probe = vec![
            "Intel i5".to_string(),
            "SSD".to_string(),
            "8 GB".to_string(),
            "Windows 10".to_string(),
            "Bardzo dobry".to_string(),
            "NVIDIA GTX".to_string(),
        ];
        let before = artifact.model.predict_row(&artifact.encoder.transform_row(&probe));

        store.save(&artifact).unwrap();
        let reloaded = store.load().expect("artifact should load back");
        let after = reloaded.model.predict_row(&reloaded.encoder.transform_row(&probe));

        assert_eq!(before.to_bits(), after.to_bits());
        assert_eq!(reloaded.columns, artifact.columns);
        assert_eq!(reloaded.vocabulary, artifact.vocabulary);
    }

    #[test]
    fn save_refuses_empty_feature_set() {
        let dir = tempfile::tempdir().unwrap();
        let store = ModelStore::new(dir.path().join("model.json"));
        let mut artifact = sample_artifact();
        artifact.encoder = Encoder::fit(&[], &[]);
        artifact.model.coefficients.clear();
        assert!(store.save(&artifact).is_err());
        assert!(!store.path().exists());
    }

    #[test]
    fn garbage_file_loads_as_absent_and_is_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        fs::write(&path, "{\"vocabulary\": trunca").unwrap();
        let store = ModelStore::new(&path);
        assert!(store.load().is_none());
        assert!(!path.exists());
    }

    #[test]
    fn structurally_valid_but_featureless_artifact_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        let mut artifact = sample_artifact();
        artifact.encoder = Encoder::fit(&[], &[]);
        artifact.model.coefficients.clear();
        artifact.columns.clear();
        fs::write(&path, serde_json::to_string(&artifact).unwrap()).unwrap();

        let store = ModelStore::new(&path);
        assert!(store.load().is_none());
        assert!(!path.exists());
    }

    #[test]
    fn missing_file_is_a_normal_first_run() {
        let dir = tempfile::tempdir().unwrap();
        let store = ModelStore::new(dir.path().join("never-written.json"));
        assert!(store.load().is_none());
    }
}
