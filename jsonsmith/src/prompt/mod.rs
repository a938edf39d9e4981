//! Prompt templating
//!
//! Templates are plain text with literal placeholders such as `<input_text>`.
//! Rendering replaces every occurrence of each placeholder, in the insertion
//! order of the substitution map. Placeholders with no substitution are left
//! as they are.

pub mod builtin;

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use thiserror::Error;
use tracing::debug;

pub use builtin::BuiltinPromptStore;

use builtin::BUILTIN_TEMPLATE_NAMES;

/// Placeholder -> replacement, applied in insertion order.
pub type Substitutions = IndexMap<String, String>;

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("unknown prompt template: {0}")]
    UnknownTemplate(String),
    #[error("failed to read prompt template {name} from {path}: {source}")]
    Io {
        name: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Replace every literal occurrence of each placeholder with its value.
///
/// Replacement is textual (no escaping, no regex) and sequential, so a value
/// inserted by an earlier placeholder can be matched by a later one. Empty
/// placeholders are ignored.
pub fn render_template(template: &str, substitutions: &Substitutions) -> String {
    let mut rendered = template.to_string();
    for (placeholder, value) in substitutions {
        if placeholder.is_empty() {
            continue;
        }
        rendered = rendered.replace(placeholder.as_str(), value);
    }
    rendered
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    pub name: String,
    pub text: String,
}

impl PromptTemplate {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
        }
    }

    pub fn render(&self, substitutions: &Substitutions) -> String {
        render_template(&self.text, substitutions)
    }
}

pub trait PromptStore: Send + Sync {
    fn get_template(&self, name: &str) -> Result<PromptTemplate, PromptError>;
}

/// Template overrides read once from `<base_dir>/<name>.txt`. Names with no
/// override file resolve to the built-in template.
#[derive(Debug, Clone)]
pub struct DirPromptStore {
    base_dir: PathBuf,
    overrides: HashMap<String, String>,
    fallback: BuiltinPromptStore,
}

impl DirPromptStore {
    /// Read every override in `base_dir` for the built-in template names.
    /// Missing files are skipped; any other read error fails the load.
    pub fn load<P: AsRef<Path>>(base_dir: P) -> Result<Self, PromptError> {
        let base_dir = base_dir.as_ref().to_path_buf();
        let mut overrides = HashMap::new();
        for name in BUILTIN_TEMPLATE_NAMES {
            let path = base_dir.join(format!("{}.txt", name));
            match fs::read_to_string(&path) {
                Ok(text) => {
                    debug!(template = name, path = %path.display(), "loaded prompt override");
                    overrides.insert(name.to_string(), text);
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(source) => {
                    return Err(PromptError::Io {
                        name: name.to_string(),
                        path,
                        source,
                    })
                }
            }
        }
        Ok(Self {
            base_dir,
            overrides,
            fallback: BuiltinPromptStore,
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Template names that have an override file.
    pub fn overridden(&self) -> impl Iterator<Item = &str> {
        self.overrides.keys().map(String::as_str)
    }
}

impl PromptStore for DirPromptStore {
    fn get_template(&self, name: &str) -> Result<PromptTemplate, PromptError> {
        match self.overrides.get(name) {
            Some(text) => Ok(PromptTemplate::new(name, text.as_str())),
            None => self.fallback.get_template(name),
        }
    }
}
