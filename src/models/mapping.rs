use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Where a mapped value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueSource {
    /// Direct record lookup via heuristic classification.
    Heuristic,
    /// Supplied by the AI advisory oracle.
    Ai,
    /// Computed (name split/join, generated password, copied confirm).
    Derived,
}

/// What gets written into a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum AssignedValue {
    Text(String),
    /// Value attribute of the option to select.
    Option(String),
    Checked(bool),
    /// Local path for file inputs.
    File(String),
}

impl AssignedValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            AssignedValue::Text(s) | AssignedValue::Option(s) => Some(s),
            _ => None,
        }
    }
}

/// A value assigned to one field, tagged with provenance and confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappedValue {
    pub value: AssignedValue,
    pub source: ValueSource,
    pub confidence: f64,
}

impl MappedValue {
    pub fn new(value: AssignedValue, source: ValueSource, confidence: f64) -> Self {
        Self {
            value,
            source,
            confidence,
        }
    }
}

/// Field id → assigned value for one detected form.
///
/// Iteration order is deterministic (BTreeMap) so identical inputs always
/// serialize identically.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldMapping {
    entries: BTreeMap<String, MappedValue>,
}

impl FieldMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field_id: impl Into<String>, value: MappedValue) {
        self.entries.insert(field_id.into(), value);
    }

    pub fn get(&self, field_id: &str) -> Option<&MappedValue> {
        self.entries.get(field_id)
    }

    pub fn contains(&self, field_id: &str) -> bool {
        self.entries.contains_key(field_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &MappedValue)> {
        self.entries.iter()
    }

    /// Mean confidence across entries; 0.0 when empty.
    pub fn mean_confidence(&self) -> f64 {
        if self.entries.is_empty() {
            return 0.0;
        }
        self.entries.values().map(|v| v.confidence).sum::<f64>() / self.entries.len() as f64
    }
}
