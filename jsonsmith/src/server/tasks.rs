//! Task endpoint table
//!
//! Each task pairs an HTTP route with a prompt template, the exact request
//! fields it accepts, the key set the model must answer with, and how the
//! validated answer is shaped into the response `data`.

use serde_json::Value;

use crate::inference::{ParsedPayload, SchemaValidator};
use crate::prompt::builtin::{DOCUMENT_PLACEHOLDER, INPUT_PLACEHOLDER};
use crate::prompt::Substitutions;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestField {
    pub name: &'static str,
    /// Template placeholder this field fills
    pub placeholder: &'static str,
    /// `null` is accepted and renders as an empty string
    pub nullable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    /// `answer` followed by the supporting `source` passage, as one string
    FaqAnswer,
    /// The validated object as-is
    Object,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskSpec {
    pub route: &'static str,
    pub template: &'static str,
    /// Substitutions are applied in this order; the document goes first so
    /// placeholder text inside a question is never expanded.
    pub fields: &'static [RequestField],
    pub output_keys: &'static [&'static str],
    pub shape: ResponseShape,
}

pub const FAQ_ANSWER_SOURCE_SEPARATOR: &str = "\n\nThe answer is based on the following:\n";

pub const FAQ_ANSWER: TaskSpec = TaskSpec {
    route: "/faq_answer_model",
    template: "faq_answer",
    fields: &[
        RequestField {
            name: "context",
            placeholder: DOCUMENT_PLACEHOLDER,
            nullable: false,
        },
        RequestField {
            name: "question",
            placeholder: INPUT_PLACEHOLDER,
            nullable: false,
        },
    ],
    output_keys: &["answer", "source"],
    shape: ResponseShape::FaqAnswer,
};

pub const INTENT: TaskSpec = TaskSpec {
    route: "/intent",
    template: "intent",
    fields: &[
        RequestField {
            name: "context",
            placeholder: DOCUMENT_PLACEHOLDER,
            nullable: true,
        },
        RequestField {
            name: "query",
            placeholder: INPUT_PLACEHOLDER,
            nullable: false,
        },
    ],
    output_keys: &["classification"],
    shape: ResponseShape::Object,
};

pub const EASY: TaskSpec = TaskSpec {
    route: "/easy",
    template: "easy",
    fields: &[RequestField {
        name: "query",
        placeholder: INPUT_PLACEHOLDER,
        nullable: false,
    }],
    output_keys: &["sentence"],
    shape: ResponseShape::Object,
};

pub const KEYWORD: TaskSpec = TaskSpec {
    route: "/keyword",
    template: "keyword",
    fields: &[RequestField {
        name: "query",
        placeholder: INPUT_PLACEHOLDER,
        nullable: false,
    }],
    output_keys: &["keyword"],
    shape: ResponseShape::Object,
};

pub const SUMMARIZATION: TaskSpec = TaskSpec {
    route: "/summarization",
    template: "summarization",
    fields: &[RequestField {
        name: "context",
        placeholder: INPUT_PLACEHOLDER,
        nullable: false,
    }],
    output_keys: &["summary"],
    shape: ResponseShape::Object,
};

pub const TASKS: [TaskSpec; 5] = [FAQ_ANSWER, INTENT, EASY, KEYWORD, SUMMARIZATION];

impl TaskSpec {
    /// Validator for the incoming request body's key set.
    pub fn request_validator(&self) -> SchemaValidator {
        SchemaValidator::new(self.fields.iter().map(|f| f.name))
    }

    /// Build template substitutions from a key-checked request body.
    pub fn substitutions(&self, body: &ParsedPayload) -> Result<Substitutions, String> {
        let mut substitutions = Substitutions::new();
        for field in self.fields {
            let value = match body.get(field.name) {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Null) | None if field.nullable => String::new(),
                _ => {
                    return Err(format!(
                        "Error request data type({} must be a string)",
                        field.name
                    ))
                }
            };
            substitutions.insert(field.placeholder.to_string(), value);
        }
        Ok(substitutions)
    }

    /// Turn a validated model answer into response `data`.
    pub fn shape(&self, data: ParsedPayload) -> Value {
        match self.shape {
            ResponseShape::Object => Value::Object(data),
            ResponseShape::FaqAnswer => {
                let answer = display_value(data.get("answer"));
                let source = display_value(data.get("source"));
                Value::String(format!("{}{}{}", answer, FAQ_ANSWER_SOURCE_SEPARATOR, source))
            }
        }
    }
}

/// Strings verbatim, anything else as compact JSON.
fn display_value(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}
