pub mod snapshot;

pub use snapshot::{
    parse_snapshot, PageSnapshot, RawClickable, RawElement, RawForm, RawOption, SNAPSHOT_SCRIPT,
};

use crate::classifier::{FieldClassifier, FieldSignals};
use crate::models::{DetectedForm, FieldOption, FieldPurpose, FormField, FormOrigin, TagKind};

/// Synthetic id for the single orphan form per page.
pub const ORPHAN_FORM_ID: &str = "__orphan__";

/// Maximum length for a preceding-sibling text node to count as a label.
const MAX_SIBLING_LABEL_LEN: usize = 50;

/// Groups a page snapshot's interactive elements into detected forms and
/// classifies every field.
#[derive(Debug, Default, Clone, Copy)]
pub struct FormDetector {
    classifier: FieldClassifier,
}

impl FormDetector {
    pub fn new() -> Self {
        Self {
            classifier: FieldClassifier::new(),
        }
    }

    /// Partition the snapshot's fields by enclosing form. Orphan elements are
    /// collected into exactly one synthetic form. Forms that end up with zero
    /// usable fields are dropped, never surfaced.
    pub fn detect(&self, snapshot: &PageSnapshot) -> Vec<DetectedForm> {
        let mut forms: Vec<DetectedForm> = snapshot
            .forms
            .iter()
            .map(|raw| DetectedForm {
                id: raw.selector.clone(),
                fields: Vec::new(),
                action_url: raw.action.clone(),
                method: raw
                    .method
                    .as_deref()
                    .unwrap_or("get")
                    .to_lowercase(),
                origin: FormOrigin::Regular,
            })
            .collect();

        let mut orphan = DetectedForm {
            id: ORPHAN_FORM_ID.to_string(),
            fields: Vec::new(),
            action_url: None,
            method: "get".to_string(),
            origin: FormOrigin::Orphan,
        };

        for element in &snapshot.elements {
            let Some(field) = self.build_field(element) else {
                tracing::debug!(selector = %element.selector, "skipping unusable element");
                continue;
            };
            match element.form_index {
                Some(i) if i < forms.len() => forms[i].fields.push(field),
                // Form index out of range means the snapshot is inconsistent;
                // treat the element as an orphan rather than dropping it.
                _ => orphan.fields.push(field),
            }
        }

        forms.push(orphan);
        forms.retain(|form| !form.fields.is_empty());
        forms
    }

    /// Build a classified field from a raw element. Returns None for elements
    /// the engine cannot interact with; the caller logs and moves on.
    fn build_field(&self, element: &RawElement) -> Option<FormField> {
        if !element.visible {
            return None;
        }
        if element.input_type.as_deref() == Some("hidden") {
            return None;
        }
        let tag_kind = TagKind::from_tag(&element.tag)?;

        // Resolve the label first so classification sees the same text the
        // field ends up carrying, preceding-sibling labels included.
        let label = resolve_label(element);
        let signals = FieldSignals {
            tag: &element.tag,
            raw_type: element.input_type.as_deref(),
            name: element.name.as_deref(),
            dom_id: element.dom_id.as_deref(),
            label: label.as_deref(),
            placeholder: element.placeholder.as_deref(),
            aria_label: element.aria_label.as_deref(),
            css_classes: element.css_classes.as_deref(),
            max_length: element.max_length,
        };
        let (purpose, confidence) = self.classifier.classify(&signals);

        let options = element
            .options
            .iter()
            .filter_map(|opt| {
                opt.value.as_ref().map(|value| FieldOption {
                    value: value.clone(),
                    label: opt.text.clone(),
                })
            })
            .collect();

        let group_key = if purpose == FieldPurpose::Radio {
            element.name.clone()
        } else {
            None
        };

        Some(FormField {
            id: element.selector.clone(),
            tag_kind,
            raw_type: element.input_type.clone(),
            name: element.name.clone(),
            dom_id: element.dom_id.clone(),
            label,
            placeholder: element.placeholder.clone(),
            aria_label: element.aria_label.clone(),
            required: element.required,
            max_length: element.max_length,
            options,
            purpose,
            classification_confidence: confidence,
            visible: element.visible,
            group_key,
        })
    }
}

/// Label priority chain: label[for] match, then a wrapping ancestor label,
/// then a short preceding sibling text node, then aria-label. First non-empty
/// wins; an unresolved label is None, not an error.
fn resolve_label(element: &RawElement) -> Option<String> {
    if let Some(text) = non_empty(&element.label_for_text) {
        return Some(text);
    }
    if let Some(text) = non_empty(&element.wrapping_label_text) {
        return Some(text);
    }
    if let Some(text) = non_empty(&element.preceding_text) {
        if text.chars().count() < MAX_SIBLING_LABEL_LEN {
            return Some(text);
        }
    }
    non_empty(&element.aria_label)
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_input(selector: &str, name: &str, form_index: Option<usize>) -> RawElement {
        RawElement {
            tag: "input".to_string(),
            selector: selector.to_string(),
            input_type: Some("text".to_string()),
            name: Some(name.to_string()),
            visible: true,
            form_index,
            ..Default::default()
        }
    }

    fn snapshot_with(elements: Vec<RawElement>, forms: Vec<RawForm>) -> PageSnapshot {
        PageSnapshot {
            url: "https://example.test/signup".to_string(),
            title: "Sign up".to_string(),
            forms,
            elements,
            ..Default::default()
        }
    }

    fn one_form() -> Vec<RawForm> {
        vec![RawForm {
            selector: "#signup".to_string(),
            action: Some("/register".to_string()),
            method: Some("POST".to_string()),
        }]
    }

    #[test]
    fn groups_fields_by_enclosing_form() {
        let snapshot = snapshot_with(
            vec![
                text_input("input[name=\"email\"]", "email", Some(0)),
                text_input("input[name=\"first_name\"]", "first_name", Some(0)),
            ],
            one_form(),
        );
        let forms = FormDetector::new().detect(&snapshot);
        assert_eq!(forms.len(), 1);
        assert_eq!(forms[0].id, "#signup");
        assert_eq!(forms[0].method, "post");
        assert_eq!(forms[0].origin, FormOrigin::Regular);
        assert_eq!(forms[0].fields.len(), 2);
        assert_eq!(forms[0].fields[0].purpose, FieldPurpose::Email);
    }

    #[test]
    fn orphans_collapse_into_single_synthetic_form() {
        let snapshot = snapshot_with(
            vec![
                text_input("input[name=\"email\"]", "email", None),
                text_input("input[name=\"phone\"]", "phone", None),
            ],
            vec![],
        );
        let forms = FormDetector::new().detect(&snapshot);
        assert_eq!(forms.len(), 1);
        assert_eq!(forms[0].id, ORPHAN_FORM_ID);
        assert_eq!(forms[0].origin, FormOrigin::Orphan);
        assert_eq!(forms[0].fields.len(), 2);
    }

    #[test]
    fn empty_forms_are_dropped() {
        let snapshot = snapshot_with(vec![], one_form());
        assert!(FormDetector::new().detect(&snapshot).is_empty());
    }

    #[test]
    fn invisible_and_hidden_fields_are_excluded() {
        let mut hidden = text_input("input[name=\"csrf\"]", "csrf", Some(0));
        hidden.input_type = Some("hidden".to_string());
        let mut invisible = text_input("input[name=\"email\"]", "email", Some(0));
        invisible.visible = false;

        let snapshot = snapshot_with(vec![hidden, invisible], one_form());
        assert!(FormDetector::new().detect(&snapshot).is_empty());
    }

    #[test]
    fn label_priority_chain() {
        let mut el = text_input("input[name=\"email\"]", "email", None);
        el.label_for_text = Some("Email address".to_string());
        el.wrapping_label_text = Some("wrapped".to_string());
        el.preceding_text = Some("preceding".to_string());
        el.aria_label = Some("aria".to_string());
        assert_eq!(resolve_label(&el).as_deref(), Some("Email address"));

        el.label_for_text = None;
        assert_eq!(resolve_label(&el).as_deref(), Some("wrapped"));

        el.wrapping_label_text = None;
        assert_eq!(resolve_label(&el).as_deref(), Some("preceding"));

        el.preceding_text = Some("x".repeat(60));
        assert_eq!(resolve_label(&el).as_deref(), Some("aria"));

        el.aria_label = None;
        assert_eq!(resolve_label(&el), None);
    }

    #[test]
    fn preceding_text_label_feeds_classification() {
        // Table-layout forms: the only human-readable indicator is a text
        // node before the input.
        let mut el = text_input("td input:nth-of-type(1)", "f17", None);
        el.preceding_text = Some("Email address".to_string());

        let forms = FormDetector::new().detect(&snapshot_with(vec![el], vec![]));
        let field = &forms[0].fields[0];
        assert_eq!(field.label.as_deref(), Some("Email address"));
        assert_eq!(field.purpose, FieldPurpose::Email);
        assert!(field.classification_confidence > 0.5);
    }

    #[test]
    fn dropdown_options_skip_valueless_entries() {
        let el = RawElement {
            tag: "select".to_string(),
            selector: "select[name=\"country\"]".to_string(),
            name: Some("country".to_string()),
            visible: true,
            form_index: None,
            options: vec![
                RawOption {
                    value: None,
                    text: "-- choose --".to_string(),
                },
                RawOption {
                    value: Some("us".to_string()),
                    text: "United States".to_string(),
                },
            ],
            ..Default::default()
        };
        let snapshot = snapshot_with(vec![el], vec![]);
        let forms = FormDetector::new().detect(&snapshot);
        let field = &forms[0].fields[0];
        assert_eq!(field.purpose, FieldPurpose::Country);
        assert_eq!(field.options.len(), 1);
        assert_eq!(field.options[0].value, "us");
    }

    #[test]
    fn radio_inputs_share_group_key() {
        let mut a = text_input("input#size-s", "size", None);
        a.input_type = Some("radio".to_string());
        let mut b = text_input("input#size-m", "size", None);
        b.input_type = Some("radio".to_string());

        let snapshot = snapshot_with(vec![a, b], vec![]);
        let forms = FormDetector::new().detect(&snapshot);
        let fields = &forms[0].fields;
        assert_eq!(fields[0].purpose, FieldPurpose::Radio);
        assert_eq!(fields[0].group_key.as_deref(), Some("size"));
        assert_eq!(fields[0].group_key, fields[1].group_key);
    }

    #[test]
    fn out_of_range_form_index_falls_back_to_orphan() {
        let snapshot = snapshot_with(vec![text_input("input[name=\"email\"]", "email", Some(7))], vec![]);
        let forms = FormDetector::new().detect(&snapshot);
        assert_eq!(forms.len(), 1);
        assert_eq!(forms[0].origin, FormOrigin::Orphan);
    }
}
