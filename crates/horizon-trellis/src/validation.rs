//! Schema validation contract and built-in datatype checks.
//!
//! Schema validation internals are out of scope for the engine: a
//! [`SchemaValidator`] collaborator loads whatever schemas the model
//! declares and judges whole instances. The engine only drives it from the
//! revalidation phase and folds the verdict into instance validity.
//!
//! Type binds, on the other hand, use the small built-in lexical checks in
//! [`DataType`] — no schema machinery involved.

use crate::definition::ModelDefinition;
use crate::instance::Instance;

/// A schema loading failure. Surfaced as a non-fatal link error; the model
/// continues without schema validation.
#[derive(Debug, Clone, thiserror::Error)]
#[error("Failed to load schema '{url}': {message}")]
pub struct SchemaError {
    /// The schema resource that failed to load.
    pub url: String,
    /// Failure description.
    pub message: String,
}

impl SchemaError {
    /// Create a schema error.
    pub fn new(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            message: message.into(),
        }
    }
}

/// The schema validation service consumed by the revalidation phase.
pub trait SchemaValidator {
    /// Load the schemas declared by the model definition.
    fn load_schemas(&mut self, definition: &ModelDefinition) -> Result<(), SchemaError>;

    /// Whether any schema was loaded.
    fn has_schema(&self) -> bool;

    /// Validate one instance against the loaded schemas. Returns whether
    /// the instance is valid.
    fn validate_instance(&mut self, instance: &Instance) -> bool;
}

/// A [`SchemaValidator`] for models without schemas: loads nothing and
/// accepts everything.
#[derive(Debug, Default)]
pub struct NoSchema;

impl SchemaValidator for NoSchema {
    fn load_schemas(&mut self, _definition: &ModelDefinition) -> Result<(), SchemaError> {
        Ok(())
    }

    fn has_schema(&self) -> bool {
        false
    }

    fn validate_instance(&mut self, _instance: &Instance) -> bool {
        true
    }
}

/// Built-in datatypes usable on binds.
///
/// Validation is lexical: a value is valid when its text form parses as the
/// type. Empty values are valid for every type — requiredness is a separate
/// rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    /// Any text.
    String,
    /// `true`, `false`, `1`, or `0`.
    Boolean,
    /// An optionally signed whole number.
    Integer,
    /// An optionally signed decimal number.
    Decimal,
    /// A `YYYY-MM-DD` calendar date.
    Date,
}

impl DataType {
    /// Look up a datatype by name, e.g. `"integer"`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "string" => Some(Self::String),
            "boolean" => Some(Self::Boolean),
            "integer" => Some(Self::Integer),
            "decimal" => Some(Self::Decimal),
            "date" => Some(Self::Date),
            _ => None,
        }
    }

    /// The name of this datatype.
    pub fn name(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Boolean => "boolean",
            Self::Integer => "integer",
            Self::Decimal => "decimal",
            Self::Date => "date",
        }
    }

    /// Whether the value's text form is valid for this type.
    pub fn is_valid_lexical(&self, value: &str) -> bool {
        if value.is_empty() {
            return true;
        }
        match self {
            Self::String => true,
            Self::Boolean => matches!(value, "true" | "false" | "1" | "0"),
            Self::Integer => {
                let digits = value.strip_prefix(['+', '-']).unwrap_or(value);
                !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
            }
            Self::Decimal => {
                let digits = value.strip_prefix(['+', '-']).unwrap_or(value);
                let mut seen_digit = false;
                let mut seen_dot = false;
                for b in digits.bytes() {
                    match b {
                        b'0'..=b'9' => seen_digit = true,
                        b'.' if !seen_dot => seen_dot = true,
                        _ => return false,
                    }
                }
                seen_digit
            }
            Self::Date => {
                let mut parts = value.split('-');
                let (Some(year), Some(month), Some(day), None) =
                    (parts.next(), parts.next(), parts.next(), parts.next())
                else {
                    return false;
                };
                let all_digits =
                    |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
                if year.len() != 4 || month.len() != 2 || day.len() != 2 {
                    return false;
                }
                if !all_digits(year) || !all_digits(month) || !all_digits(day) {
                    return false;
                }
                let month: u32 = month.parse().unwrap_or(0);
                let day: u32 = day.parse().unwrap_or(0);
                (1..=12).contains(&month) && (1..=31).contains(&day)
            }
        }
    }
}
