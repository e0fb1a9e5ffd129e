use serde::Serialize;

use super::engine::ProbabilityVector;
use super::error::ClassifierError;
use crate::labels::LabelTable;

/// Top-1 classification of one image.
///
/// `confidence` is the raw model score at `index`, not re-normalized.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationResult {
    pub label: String,
    pub index: usize,
    pub confidence: f32,
    pub distribution: ProbabilityVector,
}

impl ClassificationResult {
    /// The `k` best `(label, score)` pairs, highest first. Ties keep label order.
    pub fn ranked<'a>(&self, labels: &'a LabelTable, k: usize) -> Vec<(&'a str, f32)> {
        let mut ranked: Vec<(&str, f32)> = labels.iter().zip(self.distribution.iter()).collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked.truncate(k);
        ranked
    }
}

/// Index and value of the first maximum in a left-to-right scan.
pub fn argmax(scores: &[f32]) -> Option<(usize, f32)> {
    let (first, rest) = scores.split_first()?;
    let mut best = (0, *first);
    for (i, &score) in rest.iter().enumerate() {
        if score > best.1 {
            best = (i + 1, score);
        }
    }
    Some(best)
}

/// Reduces a score vector to its top label.
///
/// # Errors
/// - `Configuration` if the vector is empty or its length differs from the label
///   table: the model and label bundle do not belong together
pub fn select(scores: &ProbabilityVector, labels: &LabelTable) -> Result<ClassificationResult, ClassifierError> {
    if scores.len() != labels.len() {
        return Err(ClassifierError::Configuration(format!(
            "Model produced {} scores but the label table has {} entries",
            scores.len(),
            labels.len()
        )));
    }
    let (index, confidence) = argmax(scores.as_slice())
        .ok_or_else(|| ClassifierError::Configuration("Score vector is empty".into()))?;
    let label = labels
        .get(index)
        .ok_or_else(|| ClassifierError::Configuration(format!("No label at index {}", index)))?;

    Ok(ClassificationResult {
        label: label.to_string(),
        index,
        confidence,
        distribution: scores.clone(),
    })
}
