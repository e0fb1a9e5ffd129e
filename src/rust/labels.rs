use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use crate::classifier::ClassifierError;

/// Class names of the reference connector model, in output order.
pub const REFERENCE_LABELS: [&str; 20] = [
    "Conector Lightning (Apple)",
    "Cable Audio Óptico",
    "Clavija US (Americana)",
    "Clavija US (Americana) 3 pines",
    "Cable Coaxial",
    "Adaptador de corriente 6 salidas",
    "Adaptador de corriente (clavija redonda)",
    "Conector DisplayPort",
    "Conector HDMI",
    "Adaptador jack de audio de 3.5mm",
    "Cargador magnetico",
    "Conector Micro HDMI",
    "Conector Micro-USB",
    "Adaptador de corriente multicontacto",
    "Conector RCA",
    "Conector RJ-45 (Ethernet)",
    "Adaptador multipuerto USB hub",
    "Conector USB tipo A",
    "Conector USB tipo C",
    "Conector VGA",
];

/// Immutable, ordered label table. Position `i` names output `i` of the model.
///
/// Cloning is cheap; all clones share the same storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelTable {
    labels: Arc<[String]>,
}

impl LabelTable {
    /// Builds a table, rejecting empty tables, empty labels and duplicates.
    pub fn new<I, S>(labels: I) -> Result<Self, ClassifierError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let labels: Vec<String> = labels.into_iter().map(Into::into).collect();
        if labels.is_empty() {
            return Err(ClassifierError::Configuration("Label table cannot be empty".into()));
        }
        if let Some(pos) = labels.iter().position(|l| l.trim().is_empty()) {
            return Err(ClassifierError::Configuration(format!("Label {} cannot be empty", pos)));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = labels.iter().find(|l| !seen.insert(l.as_str())) {
            return Err(ClassifierError::Configuration(format!("Duplicate label '{}'", dup)));
        }
        Ok(Self {
            labels: labels.into(),
        })
    }

    /// The table matching the reference model.
    pub fn reference() -> Self {
        Self {
            labels: REFERENCE_LABELS.iter().map(|l| l.to_string()).collect(),
        }
    }

    /// Parses one label per line; blank lines and `#` comments are skipped.
    pub fn from_lines(text: &str) -> Result<Self, ClassifierError> {
        Self::new(
            text.lines()
                .map(str::trim)
                .filter(|l| !l.is_empty() && !l.starts_with('#')),
        )
    }

    /// Parses a JSON array of strings.
    pub fn from_json(text: &str) -> Result<Self, ClassifierError> {
        let labels: Vec<String> = serde_json::from_str(text)
            .map_err(|e| ClassifierError::Configuration(format!("Invalid label table: {}", e)))?;
        Self::new(labels)
    }

    /// Loads `.json` files as arrays and anything else as line-delimited text.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ClassifierError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            ClassifierError::Configuration(format!("Failed to read label table {}: {}", path.display(), e))
        })?;
        if path.extension().is_some_and(|ext| ext == "json") {
            Self::from_json(&text)
        } else {
            Self::from_lines(&text)
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn position(&self, label: &str) -> Option<usize> {
        self.labels.iter().position(|l| l == label)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_table() {
        let table = LabelTable::reference();
        assert_eq!(table.len(), 20);
        assert_eq!(table.get(8), Some("Conector HDMI"));
        assert_eq!(table.position("Conector VGA"), Some(19));
        assert!(LabelTable::new(REFERENCE_LABELS).is_ok());
    }

    #[test]
    fn test_validation() {
        assert!(LabelTable::new(Vec::<String>::new()).is_err());
        assert!(LabelTable::new(["a", ""]).is_err());
        assert!(matches!(
            LabelTable::new(["a", "b", "a"]),
            Err(ClassifierError::Configuration(_))
        ));
    }

    #[test]
    fn test_parsing() {
        let table = LabelTable::from_lines("# header\nhdmi\n\n  vga  \n").unwrap();
        assert_eq!(table.iter().collect::<Vec<_>>(), vec!["hdmi", "vga"]);

        let table = LabelTable::from_json(r#"["usb-a", "usb-c"]"#).unwrap();
        assert_eq!(table.get(1), Some("usb-c"));
        assert!(LabelTable::from_json("{}").is_err());
    }
}
