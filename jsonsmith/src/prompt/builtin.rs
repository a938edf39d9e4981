//! Built-in task prompts.

use super::{PromptError, PromptStore, PromptTemplate};

pub const INPUT_PLACEHOLDER: &str = "<input_text>";
pub const DOCUMENT_PLACEHOLDER: &str = "<document_text>";

pub const FAQ_ANSWER_PROMPT: &str = r#"Answer the question below using only the document, and output the result strictly as JSON.
"answer" holds the answer; "source" quotes the part of the document the answer is based on.
Output example:
{
  "answer": "answer text",
  "source": "supporting passage from the document"
}

# Question
<input_text>

# Document
<document_text>"#;

pub const INTENT_PROMPT: &str = r#"Classify whether the question below is related to the document and can be answered by referring to it, and output the result strictly as JSON.
# Output example for an answerable question
{
  "classification": true
}

# Output example for an unanswerable question
{
  "classification": false
}

# Question
<input_text>

# Document
<document_text>"#;

pub const EASY_PROMPT: &str = r#"Rewrite the sentence below as a natural sentence without changing its meaning, and output the result strictly as JSON.
Output example:
{
  "sentence": "rewritten sentence"
}

Sentence: <input_text>"#;

pub const KEYWORD_PROMPT: &str = r#"Extract at most 10 key keywords from the sentence below, and output the result strictly as JSON.
Output example:
{
  "keyword": ["keyword_1", "keyword_2"]
}

Sentence: <input_text>"#;

pub const SUMMARIZATION_PROMPT: &str = r#"Summarize the document below so that its main points are preserved, and output the result strictly as JSON.
Output example:
{
  "summary": "summary text"
}

Document: <input_text>"#;

/// Names of every built-in template.
pub const BUILTIN_TEMPLATE_NAMES: [&str; 5] =
    ["faq_answer", "intent", "easy", "keyword", "summarization"];

#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinPromptStore;

impl PromptStore for BuiltinPromptStore {
    fn get_template(&self, name: &str) -> Result<PromptTemplate, PromptError> {
        let text = match name {
            "faq_answer" => FAQ_ANSWER_PROMPT,
            "intent" => INTENT_PROMPT,
            "easy" => EASY_PROMPT,
            "keyword" => KEYWORD_PROMPT,
            "summarization" => SUMMARIZATION_PROMPT,
            other => return Err(PromptError::UnknownTemplate(other.to_string())),
        };
        Ok(PromptTemplate::new(name, text))
    }
}
