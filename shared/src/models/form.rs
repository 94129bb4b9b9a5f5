//! Form Builder Model
//!
//! A template owns an ordered list of fields. Positions are 0-based and
//! contiguous; every structural change (add, remove, move) renumbers them.
//! Submissions are JSON objects keyed by field key and are checked against
//! the template's fields.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use validator::{Validate, ValidateEmail};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "db", derive(sqlx::Type))]
#[cfg_attr(feature = "db", sqlx(rename_all = "snake_case"))]
pub enum FieldKind {
    Text,
    Textarea,
    Number,
    Email,
    Phone,
    Date,
    Select,
    Radio,
    Checkbox,
    MultiSelect,
    /// Section heading, carries no answer
    Heading,
}

impl FieldKind {
    /// Answer must be one (or several) of `options`
    pub fn is_choice(&self) -> bool {
        matches!(self, Self::Select | Self::Radio | Self::MultiSelect)
    }

    /// Honours `min` / `max`
    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Number)
    }

    /// Honours `max_length`
    pub fn is_text(&self) -> bool {
        matches!(self, Self::Text | Self::Textarea | Self::Email | Self::Phone)
    }

    pub fn takes_answer(&self) -> bool {
        !matches!(self, Self::Heading)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct FormTemplate {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    /// Bumped on every field change
    pub version: i64,
    pub created_by: i64,
    pub created_at: i64,
    pub updated_at: i64,
    #[cfg_attr(feature = "db", sqlx(skip))]
    #[serde(default)]
    pub fields: Vec<FormField>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct FormField {
    pub id: i64,
    pub template_id: i64,
    pub key: String,
    pub label: String,
    pub kind: FieldKind,
    pub required: bool,
    pub placeholder: Option<String>,
    pub help_text: Option<String>,
    #[cfg_attr(feature = "db", sqlx(json))]
    #[serde(default)]
    pub options: Vec<String>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub max_length: Option<i64>,
    pub position: i64,
}

/// Field definition as sent by the builder
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct FormFieldInput {
    #[validate(length(min = 1, max = 64))]
    pub key: String,
    #[validate(length(min = 1, max = 200))]
    pub label: String,
    pub kind: FieldKind,
    #[serde(default)]
    pub required: bool,
    #[validate(length(max = 200))]
    pub placeholder: Option<String>,
    #[validate(length(max = 1000))]
    pub help_text: Option<String>,
    #[serde(default)]
    pub options: Vec<String>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub max_length: Option<i64>,
}

impl FormFieldInput {
    /// Cross-field rules for a field definition
    pub fn check(&self) -> Result<(), String> {
        if !is_valid_field_key(&self.key) {
            return Err(format!(
                "field key '{}' must start with a lowercase letter and contain only a-z, 0-9, _",
                self.key
            ));
        }
        if self.kind.is_choice() {
            if self.options.is_empty() {
                return Err(format!("field '{}' needs at least one option", self.key));
            }
            let mut seen = HashSet::new();
            for option in &self.options {
                if option.trim().is_empty() {
                    return Err(format!("field '{}' has an empty option", self.key));
                }
                if !seen.insert(option.as_str()) {
                    return Err(format!("field '{}' has duplicate option '{option}'", self.key));
                }
            }
        } else if !self.options.is_empty() {
            return Err(format!("field '{}' does not take options", self.key));
        }
        if !self.kind.is_numeric() && (self.min.is_some() || self.max.is_some()) {
            return Err(format!("field '{}' does not take min/max", self.key));
        }
        if let (Some(min), Some(max)) = (self.min, self.max)
            && min > max
        {
            return Err(format!("field '{}': min must not exceed max", self.key));
        }
        match self.max_length {
            Some(_) if !self.kind.is_text() => {
                return Err(format!("field '{}' does not take max_length", self.key));
            }
            Some(n) if n <= 0 => {
                return Err(format!("field '{}': max_length must be positive", self.key));
            }
            _ => {}
        }
        if self.kind == FieldKind::Heading && self.required {
            return Err(format!("heading '{}' cannot be required", self.key));
        }
        Ok(())
    }

    /// Materialize into a field row
    pub fn into_field(self, id: i64, template_id: i64, position: i64) -> FormField {
        FormField {
            id,
            template_id,
            key: self.key,
            label: self.label,
            kind: self.kind,
            required: self.required,
            placeholder: self.placeholder,
            help_text: self.help_text,
            options: self.options,
            min: self.min,
            max: self.max,
            max_length: self.max_length,
            position,
        }
    }
}

impl From<&FormField> for FormFieldInput {
    fn from(field: &FormField) -> Self {
        Self {
            key: field.key.clone(),
            label: field.label.clone(),
            kind: field.kind,
            required: field.required,
            placeholder: field.placeholder.clone(),
            help_text: field.help_text.clone(),
            options: field.options.clone(),
            min: field.min,
            max: field.max,
            max_length: field.max_length,
        }
    }
}

/// Present-but-null becomes `Some(None)`; an absent key stays `None`
fn nullable<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Partial field update; the merged result is re-checked.
///
/// Bounds take `null` to clear them; `placeholder` and `help_text` are
/// cleared with an empty string. Changing `kind` drops the settings the new
/// kind does not accept unless the same update sets them again.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct FormFieldUpdate {
    #[validate(length(min = 1, max = 64))]
    pub key: Option<String>,
    #[validate(length(min = 1, max = 200))]
    pub label: Option<String>,
    pub kind: Option<FieldKind>,
    pub required: Option<bool>,
    #[validate(length(max = 200))]
    pub placeholder: Option<String>,
    #[validate(length(max = 1000))]
    pub help_text: Option<String>,
    pub options: Option<Vec<String>>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub min: Option<Option<f64>>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub max: Option<Option<f64>>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub max_length: Option<Option<i64>>,
}

fn non_blank(value: String) -> Option<String> {
    if value.trim().is_empty() { None } else { Some(value) }
}

impl FormFieldUpdate {
    /// Apply on top of an existing definition
    pub fn merge_into(self, mut input: FormFieldInput) -> FormFieldInput {
        if let Some(v) = self.key {
            input.key = v;
        }
        if let Some(v) = self.label {
            input.label = v;
        }
        if let Some(kind) = self.kind
            && kind != input.kind
        {
            input.kind = kind;
            if !kind.is_choice() {
                input.options.clear();
            }
            if !kind.is_numeric() {
                input.min = None;
                input.max = None;
            }
            if !kind.is_text() {
                input.max_length = None;
            }
            if kind == FieldKind::Heading {
                input.required = false;
            }
        }
        if let Some(v) = self.required {
            input.required = v;
        }
        if let Some(v) = self.placeholder {
            input.placeholder = non_blank(v);
        }
        if let Some(v) = self.help_text {
            input.help_text = non_blank(v);
        }
        if let Some(v) = self.options {
            input.options = v;
        }
        if let Some(v) = self.min {
            input.min = v;
        }
        if let Some(v) = self.max {
            input.max = v;
        }
        if let Some(v) = self.max_length {
            input.max_length = v;
        }
        input
    }
}

/// Add a field: appended, or inserted at `position`
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct FormFieldCreate {
    #[serde(flatten)]
    #[validate(nested)]
    pub field: FormFieldInput,
    pub position: Option<i64>,
}

/// Reorder: remove at `from`, insert at `to`
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MoveField {
    pub from: i64,
    pub to: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct FormTemplateCreate {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[serde(default)]
    #[validate(nested)]
    pub fields: Vec<FormFieldInput>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct FormTemplateUpdate {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct FormDuplicate {
    /// Defaults to "<name> (copy)"
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct FormSubmission {
    pub id: i64,
    pub template_id: i64,
    /// Template version the answers were checked against
    pub template_version: i64,
    pub patient_id: Option<i64>,
    #[cfg_attr(feature = "db", sqlx(json))]
    pub answers: Map<String, Value>,
    pub submitted_by: i64,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionCreate {
    pub patient_id: Option<i64>,
    pub answers: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubmissionFilter {
    pub template_id: Option<i64>,
    pub patient_id: Option<i64>,
}

/// `[a-z][a-z0-9_]*`
pub fn is_valid_field_key(key: &str) -> bool {
    let mut chars = key.chars();
    chars.next().is_some_and(|c| c.is_ascii_lowercase())
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// Check a set of field definitions as a whole (unique keys, per-field rules)
pub fn check_fields(fields: &[FormFieldInput]) -> Result<(), String> {
    let mut keys = HashSet::new();
    for field in fields {
        field.check()?;
        if !keys.insert(field.key.as_str()) {
            return Err(format!("duplicate field key '{}'", field.key));
        }
    }
    Ok(())
}

// ── Field ordering ──────────────────────────────────────────────────

/// Reassign positions 0..n in list order
pub fn renumber(fields: &mut [FormField]) {
    for (i, field) in fields.iter_mut().enumerate() {
        field.position = i as i64;
    }
}

/// Insert at `at` (clamped to the end), or append when `None`
pub fn insert_field(fields: &mut Vec<FormField>, field: FormField, at: Option<i64>) {
    let index = at
        .map(|i| i.clamp(0, fields.len() as i64) as usize)
        .unwrap_or(fields.len());
    fields.insert(index, field);
    renumber(fields);
}

/// Remove the field with `field_id`, compacting positions
pub fn remove_field(fields: &mut Vec<FormField>, field_id: i64) -> Option<FormField> {
    let index = fields.iter().position(|f| f.id == field_id)?;
    let removed = fields.remove(index);
    renumber(fields);
    Some(removed)
}

/// Remove-then-insert reorder. Both indices must be in range.
pub fn move_field(fields: &mut Vec<FormField>, from: i64, to: i64) -> Result<(), String> {
    let len = fields.len() as i64;
    if !(0..len).contains(&from) {
        return Err(format!("from index {from} out of range (0..{len})"));
    }
    if !(0..len).contains(&to) {
        return Err(format!("to index {to} out of range (0..{len})"));
    }
    let field = fields.remove(from as usize);
    fields.insert(to as usize, field);
    renumber(fields);
    Ok(())
}

// ── Submission validation ───────────────────────────────────────────

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(a) => a.is_empty(),
        _ => false,
    }
}

fn is_phone(value: &str) -> bool {
    let digits = value.chars().filter(|c| c.is_ascii_digit()).count();
    (7..=15).contains(&digits)
        && value
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | ' ' | '(' | ')' | '.'))
}

fn check_answer(field: &FormField, value: &Value) -> Result<(), String> {
    match field.kind {
        FieldKind::Heading => Err("heading fields take no answer".into()),
        FieldKind::Text | FieldKind::Textarea | FieldKind::Email | FieldKind::Phone => {
            let Some(text) = value.as_str() else {
                return Err("must be a string".into());
            };
            if let Some(max) = field.max_length
                && text.chars().count() as i64 > max
            {
                return Err(format!("must be at most {max} characters"));
            }
            match field.kind {
                FieldKind::Email if !text.validate_email() => Err("must be a valid email".into()),
                FieldKind::Phone if !is_phone(text) => Err("must be a valid phone number".into()),
                _ => Ok(()),
            }
        }
        FieldKind::Number => {
            let Some(n) = value.as_f64() else {
                return Err("must be a number".into());
            };
            if let Some(min) = field.min
                && n < min
            {
                return Err(format!("must be at least {min}"));
            }
            if let Some(max) = field.max
                && n > max
            {
                return Err(format!("must be at most {max}"));
            }
            Ok(())
        }
        FieldKind::Date => match value.as_str().and_then(crate::util::parse_date) {
            Some(_) => Ok(()),
            None => Err("must be a date (YYYY-MM-DD)".into()),
        },
        FieldKind::Select | FieldKind::Radio => match value.as_str() {
            Some(choice) if field.options.iter().any(|o| o == choice) => Ok(()),
            Some(choice) => Err(format!("'{choice}' is not one of the options")),
            None => Err("must be a string".into()),
        },
        FieldKind::MultiSelect => {
            let Some(items) = value.as_array() else {
                return Err("must be a list".into());
            };
            let mut seen = HashSet::new();
            for item in items {
                let Some(choice) = item.as_str() else {
                    return Err("must be a list of strings".into());
                };
                if !field.options.iter().any(|o| o == choice) {
                    return Err(format!("'{choice}' is not one of the options"));
                }
                if !seen.insert(choice) {
                    return Err(format!("'{choice}' selected twice"));
                }
            }
            Ok(())
        }
        FieldKind::Checkbox => {
            if value.is_boolean() {
                Ok(())
            } else {
                Err("must be true or false".into())
            }
        }
    }
}

/// Check answers against fields; errors are keyed by field key
pub fn validate_answers(
    fields: &[FormField],
    answers: &Map<String, Value>,
) -> Result<(), BTreeMap<String, String>> {
    let mut errors = BTreeMap::new();

    for key in answers.keys() {
        if !fields.iter().any(|f| &f.key == key) {
            errors.insert(key.clone(), "unknown field".to_string());
        }
    }

    for field in fields {
        let value = answers.get(&field.key);
        if !field.kind.takes_answer() {
            if value.is_some_and(|v| !v.is_null()) {
                errors.insert(field.key.clone(), "heading fields take no answer".into());
            }
            continue;
        }
        match value {
            None => {
                if field.required {
                    errors.insert(field.key.clone(), "is required".into());
                }
            }
            Some(v) if is_blank(v) => {
                if field.required {
                    errors.insert(field.key.clone(), "is required".into());
                }
            }
            Some(v) => {
                if field.required && field.kind == FieldKind::Checkbox && v == &Value::Bool(false) {
                    errors.insert(field.key.clone(), "must be checked".into());
                } else if let Err(msg) = check_answer(field, v) {
                    errors.insert(field.key.clone(), msg);
                }
            }
        }
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}
