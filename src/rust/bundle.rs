use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::catalog::{CatalogError, ConnectorCatalog};
use crate::classifier::{ClassifierError, PreprocessConfig};
use crate::labels::LabelTable;

pub const MODEL_FILE: &str = "model.onnx";
pub const CHECKSUM_FILE: &str = "model.sha256";
pub const LABELS_JSON_FILE: &str = "labels.json";
pub const LABELS_TEXT_FILE: &str = "labels.txt";
pub const PREPROCESS_FILE: &str = "preprocess.json";
pub const CATALOG_FILE: &str = "info.json";

#[derive(Debug, thiserror::Error)]
pub enum BundleError {
    #[error("Model not found at {0}")]
    NotFound(PathBuf),
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
    #[error("Hash mismatch: expected {expected}, got {actual} for {path}")]
    HashMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },
    #[error("Invalid {file}: {message}")]
    Invalid { file: String, message: String },
}

/// A directory holding a model artifact and the files co-versioned with it.
///
/// Only `model.onnx` is required. When `model.sha256` is present the model is
/// verified against it before it is handed to the runtime.
#[derive(Debug, Clone)]
pub struct ModelBundle {
    root: PathBuf,
}

impl ModelBundle {
    /// Opens the bundle at the default location.
    pub fn new_default() -> Self {
        Self::new(Self::get_default_bundle_dir())
    }

    /// Returns the default bundle directory path
    pub fn get_default_bundle_dir() -> PathBuf {
        // 1. Check environment variable
        if let Ok(path) = env::var("PLUGSCAN_BUNDLE") {
            return PathBuf::from(path);
        }

        // 2. Use platform-specific data directory
        if let Some(data_dir) = dirs::data_dir() {
            return data_dir.join("plugscan").join("bundle");
        }

        // 3. Fallback to user's home directory
        if let Some(home_dir) = dirs::home_dir() {
            return home_dir.join(".local").join("share").join("plugscan").join("bundle");
        }

        // 4. If all else fails, use system temp directory
        env::temp_dir().join("plugscan").join("bundle")
    }

    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn model_path(&self) -> PathBuf {
        self.root.join(MODEL_FILE)
    }

    pub fn checksum_path(&self) -> PathBuf {
        self.root.join(CHECKSUM_FILE)
    }

    pub fn preprocess_path(&self) -> PathBuf {
        self.root.join(PREPROCESS_FILE)
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.root.join(CATALOG_FILE)
    }

    /// `labels.json` wins over `labels.txt` when both exist.
    pub fn labels_path(&self) -> Option<PathBuf> {
        [LABELS_JSON_FILE, LABELS_TEXT_FILE]
            .iter()
            .map(|name| self.root.join(name))
            .find(|path| path.exists())
    }

    pub fn has_model(&self) -> bool {
        let model_path = self.model_path();
        log::debug!("Model path: {:?} (exists: {})", model_path, model_path.exists());
        model_path.exists()
    }

    fn hash_bytes(bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        format!("{:x}", hasher.finalize())
    }

    fn expected_hash(&self) -> Result<Option<String>, BundleError> {
        let path = self.checksum_path();
        if !path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(&path)?;
        // Accept both a bare digest and `sha256sum` output
        let digest = text.split_whitespace().next().unwrap_or_default().to_lowercase();
        if digest.len() != 64 || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(BundleError::Invalid {
                file: CHECKSUM_FILE.to_string(),
                message: "expected a 64-character hex SHA-256 digest".to_string(),
            });
        }
        Ok(Some(digest))
    }

    /// Checks the model against `model.sha256`.
    ///
    /// Returns `Ok(None)` when the bundle carries no checksum.
    pub fn verify_model(&self) -> Result<Option<bool>, BundleError> {
        let Some(expected) = self.expected_hash()? else {
            return Ok(None);
        };
        let model_path = self.model_path();
        if !model_path.exists() {
            return Err(BundleError::NotFound(model_path));
        }
        let actual = Self::hash_bytes(&fs::read(&model_path)?);
        log::info!("Calculated hash: {}", actual);
        log::info!("Expected hash:   {}", expected);
        Ok(Some(actual == expected))
    }

    /// Reads the model artifact, verifying it when a checksum is present.
    pub fn read_model(&self) -> Result<Vec<u8>, BundleError> {
        let model_path = self.model_path();
        if !model_path.exists() {
            return Err(BundleError::NotFound(model_path));
        }
        let bytes = fs::read(&model_path)?;
        log::info!("Read {} bytes from {:?}", bytes.len(), model_path);

        match self.expected_hash()? {
            Some(expected) => {
                let actual = Self::hash_bytes(&bytes);
                if actual != expected {
                    log::error!("Model hash mismatch: expected {}, got {}", expected, actual);
                    return Err(BundleError::HashMismatch {
                        path: model_path,
                        expected,
                        actual,
                    });
                }
                log::info!("Model checksum verified");
            }
            None => log::warn!("Bundle has no {}, skipping model verification", CHECKSUM_FILE),
        }
        Ok(bytes)
    }

    /// The bundle's label table, or `None` if it ships without one.
    pub fn load_labels(&self) -> Result<Option<LabelTable>, ClassifierError> {
        self.labels_path().map(LabelTable::from_file).transpose()
    }

    /// The bundle's preprocessing parameters, defaults when the file is absent.
    pub fn load_preprocess(&self) -> Result<PreprocessConfig, BundleError> {
        let path = self.preprocess_path();
        if !path.exists() {
            return Ok(PreprocessConfig::default());
        }
        let text = fs::read_to_string(&path)?;
        serde_json::from_str(&text).map_err(|e| BundleError::Invalid {
            file: PREPROCESS_FILE.to_string(),
            message: e.to_string(),
        })
    }

    /// The technical-info catalog; empty when the bundle has none.
    pub fn load_catalog(&self) -> Result<ConnectorCatalog, CatalogError> {
        let path = self.catalog_path();
        if !path.exists() {
            return Ok(ConnectorCatalog::default());
        }
        ConnectorCatalog::from_file(path)
    }
}
