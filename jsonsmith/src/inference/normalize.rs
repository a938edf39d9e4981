//! Raw-generation cleanup before JSON parsing.
//!
//! Two narrow transforms: remove known noise markers (reasoning-trace closers,
//! answer header labels), then remove a leading ```` ```json ```` fence and a
//! trailing ```` ``` ```` fence. Nothing else about the text is interpreted.

/// Markers stripped from every generation, in this order. Longer header
/// labels come before the bare label they contain.
pub const DEFAULT_NOISE_MARKERS: [&str; 4] = ["</think>", "### 답변:", "# 답변:", "답변"];

pub const OPENING_FENCE: &str = "```json";
pub const CLOSING_FENCE: &str = "```";

#[derive(Debug, Clone)]
pub struct ResponseNormalizer {
    noise_markers: Vec<String>,
}

impl Default for ResponseNormalizer {
    fn default() -> Self {
        Self::with_markers(DEFAULT_NOISE_MARKERS)
    }
}

impl ResponseNormalizer {
    pub fn with_markers<I, T>(markers: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            noise_markers: markers
                .into_iter()
                .map(Into::into)
                .filter(|m: &String| !m.is_empty())
                .collect(),
        }
    }

    pub fn noise_markers(&self) -> &[String] {
        &self.noise_markers
    }

    /// Strip noise markers and code fences.
    ///
    /// The pass is repeated until the text stops changing, so the result never
    /// contains a marker or an outer fence and normalizing twice is a no-op.
    pub fn normalize(&self, raw: &str) -> String {
        let mut current = raw.trim().to_string();
        loop {
            let next = self.single_pass(&current);
            if next == current {
                return current;
            }
            current = next;
        }
    }

    fn single_pass(&self, text: &str) -> String {
        let mut text = text.trim().to_string();
        for marker in &self.noise_markers {
            if text.contains(marker.as_str()) {
                text = text.replace(marker.as_str(), "").trim().to_string();
            }
        }
        strip_code_fence(&text).to_string()
    }
}

/// Remove an opening ```` ```json ```` at the start and a closing ```` ``` ````
/// at the end, each only if present.
pub fn strip_code_fence(text: &str) -> &str {
    let mut cleaned = text.trim();
    if let Some(rest) = cleaned.strip_prefix(OPENING_FENCE) {
        cleaned = rest;
    }
    if let Some(rest) = cleaned.strip_suffix(CLOSING_FENCE) {
        cleaned = rest;
    }
    cleaned.trim()
}
