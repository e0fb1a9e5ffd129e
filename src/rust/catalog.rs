use std::collections::HashMap;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
    #[error("Invalid catalog: {0}")]
    ParseError(#[from] serde_json::Error),
}

/// Display-only technical details for one connector type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectorInfo {
    pub compatibility: String,
    pub speed: String,
    pub power: String,
    pub uses: String,
}

/// Label → technical info lookup, consulted after a result is produced.
///
/// A label without an entry is normal and yields `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectorCatalog {
    entries: HashMap<String, ConnectorInfo>,
}

impl ConnectorCatalog {
    /// Parses a JSON object keyed by label.
    pub fn from_json(text: &str) -> Result<Self, CatalogError> {
        let entries = serde_json::from_str(text)?;
        Ok(Self { entries })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn lookup(&self, label: &str) -> Option<&ConnectorInfo> {
        self.entries.get(label)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, ConnectorInfo)> for ConnectorCatalog {
    fn from_iter<I: IntoIterator<Item = (String, ConnectorInfo)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "Conector HDMI": {
            "compatibility": "TVs, monitors, consoles",
            "speed": "Up to 48 Gbps (HDMI 2.1)",
            "power": "5 V / 55 mA",
            "uses": "Digital audio and video"
        }
    }"#;

    #[test]
    fn test_lookup() {
        let catalog = ConnectorCatalog::from_json(SAMPLE).unwrap();
        assert_eq!(catalog.len(), 1);
        let info = catalog.lookup("Conector HDMI").unwrap();
        assert_eq!(info.uses, "Digital audio and video");
        assert!(catalog.lookup("Conector VGA").is_none());
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            ConnectorCatalog::from_json("[1, 2]"),
            Err(CatalogError::ParseError(_))
        ));
    }
}
