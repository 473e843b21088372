use regex::Regex;
use std::sync::LazyLock;

use crate::models::FieldPurpose;

/// Raw textual signals about one field, already pulled off the DOM by the
/// detector. The classifier never touches the page itself.
#[derive(Debug, Clone, Default)]
pub struct FieldSignals<'a> {
    pub tag: &'a str,
    pub raw_type: Option<&'a str>,
    pub name: Option<&'a str>,
    pub dom_id: Option<&'a str>,
    pub label: Option<&'a str>,
    pub placeholder: Option<&'a str>,
    pub aria_label: Option<&'a str>,
    pub css_classes: Option<&'a str>,
    pub max_length: Option<u32>,
}

impl<'a> FieldSignals<'a> {
    /// All textual indicators joined into one lower-cased haystack.
    fn indicators(&self) -> String {
        [
            self.name,
            self.dom_id,
            self.placeholder,
            self.label,
            self.aria_label,
            self.css_classes,
        ]
        .iter()
        .flatten()
        .map(|s| s.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
    }
}

/// Ordered purpose → pattern table. First match wins; the declaration order
/// here is the tie-break order callers may rely on for reproducibility.
/// Synonyms cover the common non-English form labels seen in the wild.
static PURPOSE_PATTERNS: LazyLock<Vec<(FieldPurpose, Regex)>> = LazyLock::new(|| {
    let table: &[(FieldPurpose, &str)] = &[
        (
            FieldPurpose::Email,
            r"e[-_]?mail|correo|courriel|posta elettronica",
        ),
        (
            FieldPurpose::ConfirmPassword,
            r"(confirm|retype|verify|repeat|re[-_]?enter)[a-z_ -]{0,20}(password|pass\b|pwd)|(password|pass\b|pwd)[a-z_ -]{0,20}(confirm|confirmation|again)",
        ),
        (
            FieldPurpose::Password,
            r"password|passwd|pwd|contrase.a|mot[-_ ]?de[-_ ]?passe|passwort",
        ),
        (
            FieldPurpose::FirstName,
            r"first[-_ ]?name|fname|given[-_ ]?name|forename|\bnombre\b|pr.nom|vorname",
        ),
        (
            FieldPurpose::LastName,
            r"last[-_ ]?name|lname|surname|family[-_ ]?name|apellido|nachname|\bnom\b",
        ),
        (
            FieldPurpose::Phone,
            r"phone|mobile|cell|\btel\b|telefono|tel.fono|t.l.phone|telefon",
        ),
        (
            FieldPurpose::DateOfBirth,
            r"birth|\bdob\b|birthday|nacimiento|naissance|geburt",
        ),
        (
            FieldPurpose::Zip,
            r"\bzip\b|postal|post[-_ ]?code|postcode|\bplz\b|c.digo[-_ ]?postal",
        ),
        (
            FieldPurpose::Country,
            r"country|pa.s\b|pays|\bland\b",
        ),
        (
            FieldPurpose::State,
            r"\bstate\b|province|\bregion\b|estado|provincia|r.gion|bundesland",
        ),
        (
            FieldPurpose::City,
            r"\bcity\b|\btown\b|ciudad|ville|stadt",
        ),
        (
            FieldPurpose::Address,
            r"address|street|\baddr\b|direcci.n|adresse|stra.e|strasse",
        ),
        (
            FieldPurpose::Company,
            r"company|organi[sz]ation|employer|empresa|entreprise|firma",
        ),
        (
            FieldPurpose::JobTitle,
            r"job[-_ ]?title|position|occupation|\brole\b|puesto|cargo|poste|beruf",
        ),
        (
            FieldPurpose::FullName,
            r"full[-_ ]?name|fullname|complete[-_ ]?name|nombre[-_ ]?completo|\bname\b",
        ),
    ];
    table
        .iter()
        .map(|(purpose, pattern)| {
            let re = Regex::new(pattern).expect("purpose pattern must compile");
            (*purpose, re)
        })
        .collect()
});

static CONFIRM_TOKENS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"confirm|retype|verify|repeat|re[-_]?enter").unwrap());

static PHONE_HINTS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"phone|tel|mobile|cell|fax|number").unwrap());

static ADDRESS_HINTS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"address|street|location|addr").unwrap());

/// Heuristic field purpose classifier.
///
/// Stateless; never fails. Worst case is `(Unknown, 0.5)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct FieldClassifier;

impl FieldClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn classify(&self, signals: &FieldSignals<'_>) -> (FieldPurpose, f64) {
        let indicators = signals.indicators();

        let mut direct_type = false;
        let purpose = self
            .classify_direct(signals, &indicators, &mut direct_type)
            .or_else(|| pattern_match(&indicators))
            .or_else(|| self.classify_secondary(signals, &indicators))
            .or_else(|| self.classify_structural(signals))
            .unwrap_or(FieldPurpose::Unknown);

        if purpose == FieldPurpose::Unknown {
            return (FieldPurpose::Unknown, 0.5);
        }

        let mut confidence: f64 = 0.5;
        if direct_type {
            confidence += 0.3;
        }
        if signals.label.is_some() {
            confidence += 0.1;
        }
        if signals.placeholder.is_some() {
            confidence += 0.1;
        }
        if self.name_alone_resolves(signals) {
            confidence += 0.1;
        }
        (purpose, confidence.clamp(0.0, 1.0))
    }

    /// Raw input types that directly imply a purpose, overriding patterns.
    fn classify_direct(
        &self,
        signals: &FieldSignals<'_>,
        indicators: &str,
        direct_type: &mut bool,
    ) -> Option<FieldPurpose> {
        let raw_type = signals.raw_type?;
        let purpose = match raw_type {
            "email" => FieldPurpose::Email,
            "tel" => FieldPurpose::Phone,
            "password" => {
                if CONFIRM_TOKENS.is_match(indicators) {
                    FieldPurpose::ConfirmPassword
                } else {
                    FieldPurpose::Password
                }
            }
            _ => return None,
        };
        *direct_type = true;
        Some(purpose)
    }

    /// Weak signals used only when no pattern matched: phone-sized inputs
    /// and long free-text fields with address-flavored indicators.
    fn classify_secondary(
        &self,
        signals: &FieldSignals<'_>,
        indicators: &str,
    ) -> Option<FieldPurpose> {
        if let Some(max_length) = signals.max_length {
            if matches!(max_length, 10 | 11 | 14 | 15) && PHONE_HINTS.is_match(indicators) {
                return Some(FieldPurpose::Phone);
            }
            if max_length > 50 && ADDRESS_HINTS.is_match(indicators) {
                return Some(FieldPurpose::Address);
            }
        }
        if signals.tag == "textarea" && ADDRESS_HINTS.is_match(indicators) {
            return Some(FieldPurpose::Address);
        }
        None
    }

    /// Purposes implied purely by the element's shape.
    fn classify_structural(&self, signals: &FieldSignals<'_>) -> Option<FieldPurpose> {
        match (signals.tag, signals.raw_type) {
            (_, Some("checkbox")) => Some(FieldPurpose::Checkbox),
            (_, Some("radio")) => Some(FieldPurpose::Radio),
            (_, Some("file")) => Some(FieldPurpose::FileUpload),
            ("select", _) => Some(FieldPurpose::Dropdown),
            ("textarea", _) => Some(FieldPurpose::Textarea),
            _ => None,
        }
    }

    fn name_alone_resolves(&self, signals: &FieldSignals<'_>) -> bool {
        signals
            .name
            .map(|name| pattern_match(&name.to_lowercase()).is_some())
            .unwrap_or(false)
    }
}

fn pattern_match(indicators: &str) -> Option<FieldPurpose> {
    if indicators.trim().is_empty() {
        return None;
    }
    PURPOSE_PATTERNS
        .iter()
        .find(|(_, re)| re.is_match(indicators))
        .map(|(purpose, _)| *purpose)
}
