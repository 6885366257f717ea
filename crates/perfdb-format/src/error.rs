use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unknown report format '{0}'")]
    UnknownFormat(String),
    #[error("{format} syntax error at line {line}, column {column}: {message}")]
    Syntax {
        format: String,
        line: usize,
        column: usize,
        message: String,
    },
    #[error("missing required key '{0}'")]
    MissingKey(String),
    #[error("{path}: expected {expected}, found {found}")]
    TypeMismatch {
        path: String,
        expected: &'static str,
        found: String,
    },
    #[error("cannot encode report as {format}: {message}")]
    Encode { format: String, message: String },
}

impl DecodeError {
    /// Location inside the document the error points at, if any.
    pub fn field(&self) -> Option<String> {
        match self {
            DecodeError::MissingKey(path) => Some(path.clone()),
            DecodeError::TypeMismatch { path, .. } => Some(path.clone()),
            DecodeError::Syntax { line, column, .. } => Some(format!("line {line}, column {column}")),
            DecodeError::UnknownFormat(_) | DecodeError::Encode { .. } => None,
        }
    }

    pub(crate) fn mismatch(path: &str, expected: &'static str, found: impl Into<String>) -> Self {
        DecodeError::TypeMismatch {
            path: display_path(path),
            expected,
            found: found.into(),
        }
    }
}

fn display_path(path: &str) -> String {
    if path.is_empty() {
        "document".to_string()
    } else {
        path.to_string()
    }
}
