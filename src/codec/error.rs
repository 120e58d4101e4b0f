//! Per-line decode errors

use std::error::Error;

/// What went wrong with a structurally valid line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecodeErrorKind {
    /// The value text is not a decimal float
    InvalidValue,
    /// No name component could be resolved
    NameResolutionFailed,
}

impl std::fmt::Display for DecodeErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeErrorKind::InvalidValue => write!(f, "invalid value"),
            DecodeErrorKind::NameResolutionFailed => write!(f, "name resolution failed"),
        }
    }
}

/// Error for a single line that matched a grammar but could not be turned
/// into a record. Carries the offending fragment so it can be logged as-is.
#[derive(Debug)]
pub struct DecodeError {
    kind: DecodeErrorKind,
    message: String,
    raw: String,
    source: Option<Box<dyn Error + Send + Sync>>,
}

impl DecodeError {
    pub fn new(kind: DecodeErrorKind, message: impl Into<String>, raw: impl Into<String>) -> Self {
        DecodeError {
            kind,
            message: message.into(),
            raw: raw.into(),
            source: None,
        }
    }

    /// Attach the underlying cause
    pub fn with_source(mut self, source: impl Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn invalid_value(raw: impl Into<String>) -> Self {
        Self::new(DecodeErrorKind::InvalidValue, "Failed to read value", raw)
    }

    pub fn name_resolution_failed(raw: impl Into<String>) -> Self {
        Self::new(
            DecodeErrorKind::NameResolutionFailed,
            "Failed to read name/fields",
            raw,
        )
    }

    pub fn kind(&self) -> DecodeErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// The offending value or path text
    pub fn raw(&self) -> &str {
        &self.raw
    }
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}): {:?}", self.message, self.kind, self.raw)?;
        if let Some(source) = &self.source {
            write!(f, ": {}", source)?;
        }
        Ok(())
    }
}

impl Error for DecodeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn Error + 'static))
    }
}
