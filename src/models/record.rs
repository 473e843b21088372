use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single value supplied for a record key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum RecordValue {
    /// Plain scalar (text typed into a field or matched against options).
    Scalar(String),
    /// Path to a local file for upload fields.
    FileRef(String),
}

impl RecordValue {
    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            RecordValue::Scalar(s) => Some(s),
            RecordValue::FileRef(_) => None,
        }
    }
}

/// Structured user data supplied by the parsing service.
///
/// Keys are normalized: lower-case, underscore-separated. Insertion order is
/// irrelevant; a BTreeMap keeps serialization and hashing deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDataRecord {
    #[serde(flatten)]
    values: BTreeMap<String, RecordValue>,
}

impl UserDataRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a scalar value under a normalized key.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values
            .insert(normalize_key(&key.into()), RecordValue::Scalar(value.into()));
    }

    /// Insert a file reference under a normalized key.
    pub fn set_file(&mut self, key: impl Into<String>, path: impl Into<String>) {
        self.values
            .insert(normalize_key(&key.into()), RecordValue::FileRef(path.into()));
    }

    /// Exact lookup by normalized key.
    pub fn get(&self, key: &str) -> Option<&RecordValue> {
        self.values.get(key)
    }

    /// Lookup ignoring case and underscores ("firstName", "first_name" and
    /// "FIRSTNAME" all resolve the same entry).
    pub fn get_fuzzy(&self, key: &str) -> Option<&RecordValue> {
        if let Some(v) = self.values.get(&normalize_key(key)) {
            return Some(v);
        }
        let wanted = fold_key(key);
        self.values
            .iter()
            .find(|(k, _)| fold_key(k) == wanted)
            .map(|(_, v)| v)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &RecordValue)> {
        self.values.iter()
    }

    /// Derive name keys once so downstream mapping sees a consistent record:
    /// first + last fill a missing full_name, and full_name alone is split
    /// into first token / remaining tokens.
    pub fn enhance(mut self) -> Self {
        let first = self.scalar("first_name");
        let last = self.scalar("last_name");
        let full = self.scalar("full_name");

        match (first, last, full) {
            (Some(first), Some(last), None) => {
                let joined = format!("{} {}", first, last);
                self.values
                    .insert("full_name".to_string(), RecordValue::Scalar(joined));
            }
            (None, None, Some(full)) => {
                let mut tokens = full.split_whitespace();
                if let Some(first) = tokens.next() {
                    let rest = tokens.collect::<Vec<_>>().join(" ");
                    self.values
                        .insert("first_name".to_string(), RecordValue::Scalar(first.to_string()));
                    if !rest.is_empty() {
                        self.values
                            .insert("last_name".to_string(), RecordValue::Scalar(rest));
                    }
                }
            }
            _ => {}
        }
        self
    }

    fn scalar(&self, key: &str) -> Option<String> {
        self.values
            .get(key)
            .and_then(|v| v.as_scalar())
            .map(|s| s.to_string())
    }
}

impl FromIterator<(String, String)> for UserDataRecord {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        let mut record = Self::new();
        for (k, v) in iter {
            record.set(k, v);
        }
        record
    }
}

/// Lower-case, whitespace and dashes to underscores.
pub fn normalize_key(key: &str) -> String {
    key.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_whitespace() || c == '-' { '_' } else { c })
        .collect()
}

/// Collapse a key to letters and digits only, for fuzzy comparison.
fn fold_key(key: &str) -> String {
    key.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enhance_joins_first_and_last() {
        let mut record = UserDataRecord::new();
        record.set("first_name", "John");
        record.set("last_name", "Doe");
        let record = record.enhance();
        assert_eq!(
            record.get("full_name").and_then(|v| v.as_scalar()),
            Some("John Doe")
        );
    }

    #[test]
    fn enhance_splits_full_name() {
        let mut record = UserDataRecord::new();
        record.set("full_name", "John Doe");
        let record = record.enhance();
        assert_eq!(
            record.get("first_name").and_then(|v| v.as_scalar()),
            Some("John")
        );
        assert_eq!(
            record.get("last_name").and_then(|v| v.as_scalar()),
            Some("Doe")
        );
    }

    #[test]
    fn enhance_splits_multi_token_last_name() {
        let mut record = UserDataRecord::new();
        record.set("full_name", "Ana Maria da Silva");
        let record = record.enhance();
        assert_eq!(
            record.get("first_name").and_then(|v| v.as_scalar()),
            Some("Ana")
        );
        assert_eq!(
            record.get("last_name").and_then(|v| v.as_scalar()),
            Some("Maria da Silva")
        );
    }

    #[test]
    fn enhance_keeps_existing_values() {
        let mut record = UserDataRecord::new();
        record.set("first_name", "John");
        record.set("last_name", "Doe");
        record.set("full_name", "Johnny D");
        let record = record.enhance();
        assert_eq!(
            record.get("full_name").and_then(|v| v.as_scalar()),
            Some("Johnny D")
        );
    }

    #[test]
    fn fuzzy_lookup_ignores_case_and_underscores() {
        let mut record = UserDataRecord::new();
        record.set("first_name", "John");
        assert!(record.get_fuzzy("firstName").is_some());
        assert!(record.get_fuzzy("FIRSTNAME").is_some());
        assert!(record.get_fuzzy("first-name").is_some());
    }

    #[test]
    fn keys_are_normalized_on_insert() {
        let mut record = UserDataRecord::new();
        record.set("First Name", "John");
        assert_eq!(
            record.get("first_name").and_then(|v| v.as_scalar()),
            Some("John")
        );
    }
}
