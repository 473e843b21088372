use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Semantic purpose of a form field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldPurpose {
    Email,
    FirstName,
    LastName,
    FullName,
    Phone,
    Address,
    City,
    State,
    Zip,
    Country,
    DateOfBirth,
    Company,
    JobTitle,
    Password,
    ConfirmPassword,
    Checkbox,
    Radio,
    Dropdown,
    FileUpload,
    Textarea,
    #[default]
    Unknown,
}

impl FieldPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldPurpose::Email => "email",
            FieldPurpose::FirstName => "first_name",
            FieldPurpose::LastName => "last_name",
            FieldPurpose::FullName => "full_name",
            FieldPurpose::Phone => "phone",
            FieldPurpose::Address => "address",
            FieldPurpose::City => "city",
            FieldPurpose::State => "state",
            FieldPurpose::Zip => "zip",
            FieldPurpose::Country => "country",
            FieldPurpose::DateOfBirth => "date_of_birth",
            FieldPurpose::Company => "company",
            FieldPurpose::JobTitle => "job_title",
            FieldPurpose::Password => "password",
            FieldPurpose::ConfirmPassword => "confirm_password",
            FieldPurpose::Checkbox => "checkbox",
            FieldPurpose::Radio => "radio",
            FieldPurpose::Dropdown => "dropdown",
            FieldPurpose::FileUpload => "file_upload",
            FieldPurpose::Textarea => "textarea",
            FieldPurpose::Unknown => "unknown",
        }
    }

    /// The record key this purpose reads from, if it maps to user data.
    pub fn record_key(&self) -> Option<&'static str> {
        match self {
            FieldPurpose::Email => Some("email"),
            FieldPurpose::FirstName => Some("first_name"),
            FieldPurpose::LastName => Some("last_name"),
            FieldPurpose::FullName => Some("full_name"),
            FieldPurpose::Phone => Some("phone"),
            FieldPurpose::Address => Some("address"),
            FieldPurpose::City => Some("city"),
            FieldPurpose::State => Some("state"),
            FieldPurpose::Zip => Some("zip"),
            FieldPurpose::Country => Some("country"),
            FieldPurpose::DateOfBirth => Some("date_of_birth"),
            FieldPurpose::Company => Some("company"),
            FieldPurpose::JobTitle => Some("job_title"),
            FieldPurpose::Password => Some("password"),
            _ => None,
        }
    }
}

impl FromStr for FieldPurpose {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(FieldPurpose::Email),
            "first_name" => Ok(FieldPurpose::FirstName),
            "last_name" => Ok(FieldPurpose::LastName),
            "full_name" => Ok(FieldPurpose::FullName),
            "phone" => Ok(FieldPurpose::Phone),
            "address" => Ok(FieldPurpose::Address),
            "city" => Ok(FieldPurpose::City),
            "state" => Ok(FieldPurpose::State),
            "zip" => Ok(FieldPurpose::Zip),
            "country" => Ok(FieldPurpose::Country),
            "date_of_birth" => Ok(FieldPurpose::DateOfBirth),
            "company" => Ok(FieldPurpose::Company),
            "job_title" => Ok(FieldPurpose::JobTitle),
            "password" => Ok(FieldPurpose::Password),
            "confirm_password" => Ok(FieldPurpose::ConfirmPassword),
            "checkbox" => Ok(FieldPurpose::Checkbox),
            "radio" => Ok(FieldPurpose::Radio),
            "dropdown" => Ok(FieldPurpose::Dropdown),
            "file_upload" => Ok(FieldPurpose::FileUpload),
            "textarea" => Ok(FieldPurpose::Textarea),
            "unknown" => Ok(FieldPurpose::Unknown),
            _ => Err(()),
        }
    }
}

/// Element kind of a form field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagKind {
    Input,
    Select,
    Textarea,
}

impl TagKind {
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "input" => Some(TagKind::Input),
            "select" => Some(TagKind::Select),
            "textarea" => Some(TagKind::Textarea),
            _ => None,
        }
    }
}

/// Option in a select dropdown or radio group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldOption {
    pub value: String,
    pub label: String,
}

/// A classified interactive form field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormField {
    /// Stable identifier within a run (the element's resolved CSS selector).
    pub id: String,
    pub tag_kind: TagKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dom_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aria_label: Option<String>,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<FieldOption>,
    pub purpose: FieldPurpose,
    pub classification_confidence: f64,
    pub visible: bool,
    /// Radio group name; radios sharing a name share a group key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_key: Option<String>,
}

/// How a detected form was assembled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormOrigin {
    /// Fields enclosed by a real `<form>` element.
    Regular,
    /// Fields with no enclosing form, grouped into one synthetic form.
    Orphan,
}

/// A group of fields discovered on one page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectedForm {
    pub id: String,
    pub fields: Vec<FormField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_url: Option<String>,
    pub method: String,
    pub origin: FormOrigin,
}

impl DetectedForm {
    /// Selector scope for DOM-level submit fallback. Orphan forms have no
    /// form element to submit.
    pub fn form_selector(&self) -> Option<&str> {
        match self.origin {
            FormOrigin::Regular => Some(self.id.as_str()),
            FormOrigin::Orphan => None,
        }
    }

    pub fn field(&self, field_id: &str) -> Option<&FormField> {
        self.fields.iter().find(|f| f.id == field_id)
    }
}
