use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::hash::{Hash, Hasher};

use crate::models::{
    AssignedValue, FieldMapping, FieldPurpose, FormField, MappedValue, RecordValue, UserDataRecord,
    ValueSource,
};

/// Minimum length for generated passwords.
const GENERATED_PASSWORD_LEN: usize = 16;

const LOWER: &[u8] = b"abcdefghijkmnopqrstuvwxyz";
const UPPER: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ";
const DIGITS: &[u8] = b"23456789";
const SYMBOLS: &[u8] = b"!@#$%^&*";

/// Maps a user data record onto a detected form's fields.
///
/// `map` is a pure function: identical `(record, fields)` inputs always
/// produce a byte-identical mapping, including the generated password, so
/// re-running a step never types different values.
#[derive(Debug, Default, Clone, Copy)]
pub struct DataMapper;

impl DataMapper {
    pub fn new() -> Self {
        Self
    }

    pub fn map(&self, record: &UserDataRecord, fields: &[FormField]) -> FieldMapping {
        let mut mapping = FieldMapping::new();

        // Confirm-password fields copy the form's own password mapping, so
        // everything else resolves first.
        for field in fields {
            if field.purpose == FieldPurpose::ConfirmPassword {
                continue;
            }
            if let Some(value) = self.resolve(record, field) {
                mapping.insert(field.id.clone(), value);
            }
        }

        let password_entry = fields
            .iter()
            .find(|f| f.purpose == FieldPurpose::Password)
            .and_then(|f| mapping.get(&f.id).cloned());

        for field in fields {
            if field.purpose != FieldPurpose::ConfirmPassword {
                continue;
            }
            let value = match &password_entry {
                Some(password) => MappedValue::new(
                    password.value.clone(),
                    ValueSource::Derived,
                    password.confidence,
                ),
                // No password field in this form: resolve the confirm field
                // as if it were the password itself.
                None => match self.resolve_text_purpose(record, field, FieldPurpose::Password) {
                    Some(v) => v,
                    None => continue,
                },
            };
            mapping.insert(field.id.clone(), value);
        }

        mapping
    }

    fn resolve(&self, record: &UserDataRecord, field: &FormField) -> Option<MappedValue> {
        match field.purpose {
            // Never guess for unclassified fields.
            FieldPurpose::Unknown => None,
            FieldPurpose::Checkbox => self.resolve_checkbox(record, field),
            FieldPurpose::Radio => self.resolve_radio(record, field),
            FieldPurpose::Dropdown => self.resolve_dropdown(record, field),
            FieldPurpose::FileUpload => self.resolve_file(record, field),
            FieldPurpose::Textarea => self
                .lookup_by_field_identity(record, field)
                .and_then(|v| v.as_scalar().map(str::to_string))
                .map(|text| {
                    MappedValue::new(
                        AssignedValue::Text(text),
                        ValueSource::Heuristic,
                        field.classification_confidence,
                    )
                }),
            purpose => {
                // Semantic select fields (country, state dropdowns) still
                // need their value matched against the option list.
                if !field.options.is_empty() {
                    let (wanted, source) = self.lookup_text(record, purpose)?;
                    return self.match_option(field, &wanted, source);
                }
                self.resolve_text_purpose(record, field, purpose)
            }
        }
    }

    /// Record lookup for text-bearing purposes, in resolution order:
    /// fuzzy normalized lookup, exact key, derived name value, then the
    /// purpose default (generated password).
    fn resolve_text_purpose(
        &self,
        record: &UserDataRecord,
        field: &FormField,
        purpose: FieldPurpose,
    ) -> Option<MappedValue> {
        if let Some((text, source)) = self.lookup_text(record, purpose) {
            return Some(MappedValue::new(
                AssignedValue::Text(text),
                source,
                field.classification_confidence,
            ));
        }
        if purpose == FieldPurpose::Password {
            return Some(MappedValue::new(
                AssignedValue::Text(generate_password(record)),
                ValueSource::Derived,
                field.classification_confidence,
            ));
        }
        None
    }

    fn lookup_text(
        &self,
        record: &UserDataRecord,
        purpose: FieldPurpose,
    ) -> Option<(String, ValueSource)> {
        let key = purpose.record_key()?;
        if let Some(value) = record.get_fuzzy(key).or_else(|| record.get(key)) {
            if let Some(text) = value.as_scalar() {
                return Some((text.to_string(), ValueSource::Heuristic));
            }
        }
        derive_name_value(record, purpose).map(|text| (text, ValueSource::Derived))
    }

    fn resolve_checkbox(&self, record: &UserDataRecord, field: &FormField) -> Option<MappedValue> {
        if let Some(value) = self.lookup_by_field_identity(record, field) {
            if let Some(text) = value.as_scalar() {
                return Some(MappedValue::new(
                    AssignedValue::Checked(is_truthy(text)),
                    ValueSource::Heuristic,
                    field.classification_confidence,
                ));
            }
        }
        // Required consent boxes (terms, privacy) default to checked so a
        // best-effort submission can proceed.
        if field.required {
            return Some(MappedValue::new(
                AssignedValue::Checked(true),
                ValueSource::Derived,
                0.6,
            ));
        }
        None
    }

    fn resolve_radio(&self, record: &UserDataRecord, field: &FormField) -> Option<MappedValue> {
        let group = field.group_key.as_deref().or(field.name.as_deref())?;
        let wanted = record.get_fuzzy(group)?.as_scalar()?;
        let matches = [field.label.as_deref(), field.dom_id.as_deref()]
            .into_iter()
            .flatten()
            .any(|candidate| candidate.eq_ignore_ascii_case(wanted));
        if matches {
            Some(MappedValue::new(
                AssignedValue::Checked(true),
                ValueSource::Heuristic,
                field.classification_confidence,
            ))
        } else {
            None
        }
    }

    fn resolve_dropdown(&self, record: &UserDataRecord, field: &FormField) -> Option<MappedValue> {
        let wanted = self
            .lookup_by_field_identity(record, field)?
            .as_scalar()?
            .to_string();
        self.match_option(field, &wanted, ValueSource::Heuristic)
    }

    /// Match a desired value against the option list by value then label,
    /// case-insensitively. No match means the field stays unmapped.
    fn match_option(
        &self,
        field: &FormField,
        wanted: &str,
        source: ValueSource,
    ) -> Option<MappedValue> {
        let option = field
            .options
            .iter()
            .find(|opt| opt.value.eq_ignore_ascii_case(wanted))
            .or_else(|| {
                field
                    .options
                    .iter()
                    .find(|opt| opt.label.eq_ignore_ascii_case(wanted))
            })?;
        Some(MappedValue::new(
            AssignedValue::Option(option.value.clone()),
            source,
            field.classification_confidence,
        ))
    }

    fn resolve_file(&self, record: &UserDataRecord, field: &FormField) -> Option<MappedValue> {
        let value = self.lookup_by_field_identity(record, field)?;
        let path = match value {
            RecordValue::FileRef(path) => path.clone(),
            RecordValue::Scalar(_) => return None,
        };
        Some(MappedValue::new(
            AssignedValue::File(path),
            ValueSource::Heuristic,
            field.classification_confidence,
        ))
    }

    /// Look up the record by what the field calls itself: name, dom id, then
    /// label, all via the fuzzy normalized lookup.
    fn lookup_by_field_identity<'r>(
        &self,
        record: &'r UserDataRecord,
        field: &FormField,
    ) -> Option<&'r RecordValue> {
        [
            field.name.as_deref(),
            field.dom_id.as_deref(),
            field.label.as_deref(),
        ]
        .into_iter()
        .flatten()
        .find_map(|key| record.get_fuzzy(key))
    }
}

/// Name derivation fallback for records that were not enhanced: join first
/// and last into a full name, or split a full name.
fn derive_name_value(record: &UserDataRecord, purpose: FieldPurpose) -> Option<String> {
    let scalar = |key: &str| {
        record
            .get_fuzzy(key)
            .and_then(|v| v.as_scalar())
            .map(str::to_string)
    };
    match purpose {
        FieldPurpose::FullName => {
            let first = scalar("first_name")?;
            let last = scalar("last_name")?;
            Some(format!("{} {}", first, last))
        }
        FieldPurpose::FirstName => {
            let full = scalar("full_name")?;
            full.split_whitespace().next().map(str::to_string)
        }
        FieldPurpose::LastName => {
            let full = scalar("full_name")?;
            let rest = full.split_whitespace().skip(1).collect::<Vec<_>>().join(" ");
            (!rest.is_empty()).then_some(rest)
        }
        _ => None,
    }
}

fn is_truthy(text: &str) -> bool {
    matches!(
        text.trim().to_lowercase().as_str(),
        "true" | "yes" | "1" | "on" | "checked"
    )
}

/// Generate a policy-compliant password (length >= 12 with upper, lower,
/// digit and symbol), seeded from the record so mapping stays pure.
pub fn generate_password(record: &UserDataRecord) -> String {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    "formpilot.password.v1".hash(&mut hasher);
    for (key, value) in record.iter() {
        key.hash(&mut hasher);
        match value {
            RecordValue::Scalar(s) => s.hash(&mut hasher),
            RecordValue::FileRef(p) => p.hash(&mut hasher),
        }
    }
    let mut rng = StdRng::seed_from_u64(hasher.finish());

    let mut chars: Vec<u8> = vec![
        LOWER[rng.gen_range(0..LOWER.len())],
        UPPER[rng.gen_range(0..UPPER.len())],
        DIGITS[rng.gen_range(0..DIGITS.len())],
        SYMBOLS[rng.gen_range(0..SYMBOLS.len())],
    ];
    let all: Vec<u8> = [LOWER, UPPER, DIGITS, SYMBOLS].concat();
    while chars.len() < GENERATED_PASSWORD_LEN {
        chars.push(all[rng.gen_range(0..all.len())]);
    }
    chars.shuffle(&mut rng);
    String::from_utf8(chars).expect("password charset is ascii")
}
