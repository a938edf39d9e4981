//! Exact key-set validation of JSON payloads.

use std::collections::BTreeSet;

use serde_json::{Map, Value};
use thiserror::Error;

/// A JSON object accepted from the backend.
pub type ParsedPayload = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("response is not valid JSON: {0}")]
    Parse(String),
    #[error("response is JSON but not an object (found {0})")]
    NotAnObject(&'static str),
    #[error("response keys {actual:?} do not match expected keys {expected:?}")]
    KeyMismatch {
        actual: BTreeSet<String>,
        expected: BTreeSet<String>,
    },
}

/// Accepts a payload only if its key set equals the expected key set:
/// no key missing, no key extra.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaValidator {
    expected: BTreeSet<String>,
}

impl SchemaValidator {
    pub fn new<I, T>(expected_keys: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            expected: expected_keys.into_iter().map(Into::into).collect(),
        }
    }

    pub fn expected_keys(&self) -> &BTreeSet<String> {
        &self.expected
    }

    /// Parse text as a JSON object.
    pub fn parse(&self, text: &str) -> Result<ParsedPayload, ValidationError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| ValidationError::Parse(e.to_string()))?;
        match value {
            Value::Object(map) => Ok(map),
            other => Err(ValidationError::NotAnObject(json_type_name(&other))),
        }
    }

    /// Check the key set of an already-parsed object.
    pub fn check_keys(&self, payload: &ParsedPayload) -> Result<(), ValidationError> {
        let actual: BTreeSet<String> = payload.keys().cloned().collect();
        if actual == self.expected {
            Ok(())
        } else {
            Err(ValidationError::KeyMismatch {
                actual,
                expected: self.expected.clone(),
            })
        }
    }

    /// Parse and check in one step.
    pub fn validate(&self, text: &str) -> Result<ParsedPayload, ValidationError> {
        let payload = self.parse(text)?;
        self.check_keys(&payload)?;
        Ok(payload)
    }
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn accepts_exact_key_set() {
        let validator = SchemaValidator::new(["answer", "source"]);
        let payload = validator
            .validate(r#"{"source": "doc 3", "answer": "yes"}"#)
            .unwrap();
        assert_eq!(payload.get("answer"), Some(&json!("yes")));
    }

    #[test]
    fn rejects_extra_key() {
        let validator = SchemaValidator::new(["a"]);
        let err = validator.validate(r#"{"a": 1, "b": 2}"#).unwrap_err();
        match err {
            ValidationError::KeyMismatch { actual, expected } => {
                assert_eq!(actual, BTreeSet::from(["a".to_string(), "b".to_string()]));
                assert_eq!(expected, BTreeSet::from(["a".to_string()]));
            }
            other => panic!("expected key mismatch, got {:?}", other),
        }
    }

    #[test]
    fn rejects_missing_key() {
        let validator = SchemaValidator::new(["a", "b"]);
        assert!(matches!(
            validator.validate(r#"{"a": 1}"#),
            Err(ValidationError::KeyMismatch { .. })
        ));
    }

    #[test]
    fn empty_expected_accepts_empty_object() {
        let validator = SchemaValidator::new(Vec::<String>::new());
        assert_eq!(validator.validate("{}").unwrap(), ParsedPayload::new());
        assert!(validator.validate(r#"{"a": 1}"#).is_err());
    }

    #[test]
    fn single_key_payload_is_returned() {
        let validator = SchemaValidator::new(["only"]);
        let payload = validator.validate(r#"{"only": null}"#).unwrap();
        assert_eq!(payload.len(), 1);
    }

    #[test]
    fn malformed_json_is_parse_error() {
        let validator = SchemaValidator::new(["a"]);
        assert!(matches!(
            validator.validate(r#"{"a": 1"#),
            Err(ValidationError::Parse(_))
        ));
    }

    #[test]
    fn non_object_json_is_reported() {
        let validator = SchemaValidator::new(["a"]);
        assert_eq!(
            validator.validate("[1, 2]"),
            Err(ValidationError::NotAnObject("array"))
        );
    }

    #[test]
    fn mismatch_message_lists_both_key_sets() {
        let validator = SchemaValidator::new(["answer"]);
        let message = validator
            .validate(r#"{"reply": "x"}"#)
            .unwrap_err()
            .to_string();
        assert!(message.contains("\"reply\""), "{}", message);
        assert!(message.contains("\"answer\""), "{}", message);
    }
}
