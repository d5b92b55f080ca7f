use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationLevel {
    Warning,
    Error,
}

/// Inline marker shown alongside the assistant text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    pub level: AnnotationLevel,
    pub message: String,
}

impl Annotation {
    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: AnnotationLevel::Warning,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: AnnotationLevel::Error,
            message: message.into(),
        }
    }
}

/// Live view of the current submission: assistant text so far plus annotations
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript {
    text: String,
    annotations: Vec<Annotation>,
}

impl Transcript {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    pub fn has_error(&self) -> bool {
        self.annotations
            .iter()
            .any(|a| a.level == AnnotationLevel::Error)
    }

    pub(crate) fn push_text(&mut self, fragment: &str) {
        self.text.push_str(fragment);
    }

    pub(crate) fn annotate(&mut self, annotation: Annotation) {
        self.annotations.push(annotation);
    }
}
