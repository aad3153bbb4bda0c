use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::{CatMoodError, Result};

/// Built-in label order and captions. Index `i` is output `i` of the model.
pub const DEFAULT_MOODS: [(&str, &str); 6] = [
    ("Angry", "今天我气得不想理你！离我远一点。"),
    ("Fear", "我感到害怕，希望你能陪在我身边。"),
    ("Happy", "我今天很开心，满脸笑容！"),
    ("Interest", "我对今天的事情很感兴趣，想要了解更多。"),
    ("Joy", "我今天特别开心，想要和你分享！"),
    ("Neutrality", "今天我感觉平静，不急不躁。"),
];

/// Moods that flag the cat as needing attention.
pub fn requires_attention(label: &str) -> bool {
    label == "Fear" || label == "Angry"
}

/// On-disk form of a mood table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoodTableFile {
    pub labels: Vec<String>,
    pub captions: HashMap<String, String>,
}

/// Ordered label set with a caption for every label.
///
/// Only constructed through validation, so lookups by a resolved index can
/// never miss.
#[derive(Debug, Clone)]
pub struct MoodTable {
    labels: Vec<String>,
    captions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MoodResult {
    pub label: String,
    pub caption: String,
    pub confidence: f32,
    pub requires_attention: bool,
}

impl Default for MoodTable {
    fn default() -> Self {
        Self {
            labels: DEFAULT_MOODS.iter().map(|(l, _)| l.to_string()).collect(),
            captions: DEFAULT_MOODS.iter().map(|(_, c)| c.to_string()).collect(),
        }
    }
}

impl MoodTable {
    pub fn new(labels: Vec<String>, captions: HashMap<String, String>) -> Result<Self> {
        if labels.is_empty() {
            return Err(CatMoodError::validation("labels", "must not be empty"));
        }

        let mut seen = HashSet::new();
        let mut ordered = Vec::with_capacity(labels.len());
        for label in &labels {
            if label.trim().is_empty() {
                return Err(CatMoodError::validation("labels", "contains a blank label"));
            }
            if !seen.insert(label.as_str()) {
                return Err(CatMoodError::validation(
                    "labels",
                    format!("duplicate label {label:?}"),
                ));
            }
            let caption = captions.get(label).ok_or_else(|| {
                CatMoodError::validation("captions", format!("no caption for label {label:?}"))
            })?;
            if !caption.chars().any(char::is_alphanumeric) {
                return Err(CatMoodError::validation(
                    "captions",
                    format!("placeholder caption {caption:?} for label {label:?}"),
                ));
            }
            ordered.push(caption.clone());
        }
        drop(seen);

        Ok(Self {
            labels,
            captions: ordered,
        })
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| CatMoodError::FileSystem {
            path: path.to_path_buf(),
            operation: "read mood table".to_string(),
            source: e,
        })?;
        let file: MoodTableFile = serde_json::from_str(&content)?;
        Self::new(file.labels, file.captions)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn caption(&self, label: &str) -> Option<&str> {
        self.labels
            .iter()
            .position(|l| l == label)
            .map(|i| self.captions[i].as_str())
    }

    /// Check the label set against the number of classes the model emits.
    pub fn ensure_output_len(&self, classes: usize) -> Result<()> {
        if classes != self.labels.len() {
            return Err(CatMoodError::config(format!(
                "model produces {classes} classes but the mood table has {} labels",
                self.labels.len()
            )));
        }
        Ok(())
    }

    /// Map a score vector to the label with the highest score.
    ///
    /// Ties go to the lowest index.
    pub fn resolve(&self, scores: &[f32]) -> Result<MoodResult> {
        if scores.len() != self.labels.len() {
            return Err(CatMoodError::inference(format!(
                "score vector has {} entries, expected {}",
                scores.len(),
                self.labels.len()
            )));
        }
        if scores.iter().any(|s| s.is_nan()) {
            return Err(CatMoodError::inference("score vector contains NaN"));
        }

        let mut best = 0;
        for (i, &score) in scores.iter().enumerate().skip(1) {
            if score > scores[best] {
                best = i;
            }
        }

        let label = self.labels[best].clone();
        Ok(MoodResult {
            requires_attention: requires_attention(&label),
            caption: self.captions[best].clone(),
            confidence: scores[best],
            label,
        })
    }
}
