//! Submission form definition.
//!
//! The service only describes the form; rendering it is left to the client.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use jobgate_core::{DomainError, DomainResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Text,
    Textarea,
    Checkbox,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormField {
    /// Key under which the submitted value is stored in the job's value map
    pub name: String,
    pub label: String,
    pub kind: FieldKind,
}

impl FormField {
    pub fn new(name: impl Into<String>, label: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            kind,
        }
    }

    pub fn text(name: impl Into<String>, label: impl Into<String>) -> Self {
        Self::new(name, label, FieldKind::Text)
    }

    pub fn textarea(name: impl Into<String>, label: impl Into<String>) -> Self {
        Self::new(name, label, FieldKind::Textarea)
    }

    pub fn checkbox(name: impl Into<String>, label: impl Into<String>) -> Self {
        Self::new(name, label, FieldKind::Checkbox)
    }
}

/// Ordered list of form fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormSpec {
    pub fields: Vec<FormField>,
}

impl FormSpec {
    pub fn new(fields: Vec<FormField>) -> Self {
        Self { fields }
    }

    pub fn field(mut self, field: FormField) -> Self {
        self.fields.push(field);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// A usable form has at least one field and unique, non-empty names.
    pub fn validate(&self) -> DomainResult<()> {
        if self.fields.is_empty() {
            return Err(DomainError::validation("form has no fields"));
        }

        let mut seen = HashSet::new();
        for field in &self.fields {
            if field.name.trim().is_empty() {
                return Err(DomainError::validation("form field name must not be empty"));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(DomainError::validation(format!(
                    "duplicate form field: {}",
                    field.name
                )));
            }
        }
        Ok(())
    }
}
