use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::DatasetError;

/// Maps group labels to contiguous class indices in sorted label order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelEncoder {
    classes: Vec<String>,
}

impl LabelEncoder {
    pub fn fit<S: AsRef<str>>(labels: &[S]) -> Self {
        let classes: BTreeSet<&str> = labels.iter().map(AsRef::as_ref).collect();
        Self {
            classes: classes.into_iter().map(str::to_string).collect(),
        }
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn n_classes(&self) -> usize {
        self.classes.len()
    }

    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.classes
            .binary_search_by(|class| class.as_str().cmp(label))
            .ok()
    }

    pub fn encode<S: AsRef<str>>(&self, labels: &[S]) -> Result<Vec<usize>, DatasetError> {
        labels
            .iter()
            .map(|label| {
                let label = label.as_ref();
                self.index_of(label)
                    .ok_or_else(|| DatasetError::UnknownLabel(label.to_string()))
            })
            .collect()
    }

    pub fn decode(&self, index: usize) -> Option<&str> {
        self.classes.get(index).map(String::as_str)
    }
}
