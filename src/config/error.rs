use std::error::Error as StdError;
use std::fmt;

use thiserror::Error;

/// Maximum number of suggestions rendered in an error message.
pub(crate) const MAX_SUGGESTIONS: usize = 5;

type BoxedCause = Box<dyn StdError + Send + Sync + 'static>;

/// The category of a configuration failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// A document could not be read from disk or fetched over the network.
    Io,
    /// A document is not syntactically valid.
    MalformedDocument,
    /// A document parsed to nothing.
    EmptyDocument,
    /// A parent reference loops back into the chain.
    CircularParentReference,
    /// A parent reference is not a usable path or URL.
    InvalidParentReference,
    /// An override path does not address a valid location.
    InvalidOverridePath,
    /// A `${name}` placeholder names no value.
    UnresolvedVariable,
    /// A field has no counterpart in the target type.
    UnrecognizedProperty,
    /// A value cannot convert to the declared field type.
    TypeMismatch,
    /// Any other binding failure.
    MalformedBinding,
    /// One or more declarative constraints failed.
    ConstraintViolation,
}

/// A 1-based position inside a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub line: usize,
    pub column: usize,
}

impl Location {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }

    /// Converts a byte offset into a line/column position within `contents`.
    pub fn from_offset(contents: &str, offset: usize) -> Self {
        let offset = offset.min(contents.len());
        let before = &contents.as_bytes()[..offset];
        let line = before.iter().filter(|&&b| b == b'\n').count() + 1;
        let line_start = before
            .iter()
            .rposition(|&b| b == b'\n')
            .map_or(0, |i| i + 1);
        Self {
            line,
            column: offset - line_start + 1,
        }
    }
}

/// A configuration failure, located as precisely as the failing stage allows.
///
/// Errors are only created through [`ConfigError::builder`]; once built they
/// are never modified.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ConfigError {
    kind: ErrorKind,
    origin: String,
    title: String,
    field_path: Option<String>,
    location: Option<Location>,
    detail: Option<String>,
    suggestions: Vec<String>,
    violations: Vec<String>,
    referenced_by: Option<String>,
    message: String,
    #[source]
    cause: Option<BoxedCause>,
}

impl ConfigError {
    /// Starts building an error of the given kind with a brief summary.
    pub fn builder(kind: ErrorKind, title: impl Into<String>) -> ConfigErrorBuilder {
        ConfigErrorBuilder {
            kind,
            title: title.into(),
            field_path: None,
            location: None,
            detail: None,
            suggestions: Vec::new(),
            suggestion_base: None,
            violations: Vec::new(),
            referenced_by: None,
            cause: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The document (or pseudo-document) the failure occurred in.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Dotted path of the offending field, if known.
    pub fn field_path(&self) -> Option<&str> {
        self.field_path.as_deref()
    }

    pub fn location(&self) -> Option<Location> {
        self.location
    }

    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }

    /// Suggested corrections, closest first.
    pub fn suggestions(&self) -> &[String] {
        &self.suggestions
    }

    /// Every constraint violation, for [`ErrorKind::ConstraintViolation`].
    pub fn violations(&self) -> &[String] {
        &self.violations
    }

    /// The document whose parent reference led to the failing one.
    pub fn referenced_by(&self) -> Option<&str> {
        self.referenced_by.as_deref()
    }

    /// Rebuilds a failure raised while loading a parent so that it names the
    /// document holding the parent reference.
    pub(crate) fn with_referrer(self, referrer: impl fmt::Display) -> Self {
        ConfigErrorBuilder {
            kind: self.kind,
            title: self.title,
            field_path: self.field_path,
            location: self.location,
            detail: self.detail,
            suggestions: self.suggestions,
            suggestion_base: None,
            violations: self.violations,
            referenced_by: Some(referrer.to_string()),
            cause: self.cause,
        }
        .build(self.origin)
    }

    fn render(&self) -> String {
        let mut out = String::from(&self.origin);

        if self.violations.is_empty() {
            out.push_str(" has an error:\n  * ");
            out.push_str(&self.summary());
        } else {
            out.push_str(" has the following errors:");
            for violation in &self.violations {
                out.push_str("\n  * ");
                out.push_str(violation);
            }
        }

        if let Some(referrer) = &self.referenced_by {
            out.push_str("\n    (parent configuration of ");
            out.push_str(referrer);
            out.push(')');
        }

        out
    }

    fn summary(&self) -> String {
        let mut out = self.title.trim().to_string();

        if let Some(path) = &self.field_path {
            out.push_str(" at: ");
            out.push_str(path);
        } else if let Some(location) = self.location {
            out.push_str(&format!(
                " at line: {}, column: {}",
                location.line, location.column
            ));
        }

        if let Some(detail) = self.detail.as_deref().map(str::trim) {
            if !detail.is_empty() {
                out.push_str("; ");
                out.push_str(detail);
            }
        }

        if !self.suggestions.is_empty() {
            out.push_str("\n    Did you mean?:");
            for suggestion in self.suggestions.iter().take(MAX_SUGGESTIONS) {
                out.push_str("\n      - ");
                out.push_str(suggestion);
            }
            let remaining = self.suggestions.len().saturating_sub(MAX_SUGGESTIONS);
            if remaining > 0 {
                out.push_str(&format!("\n        [{remaining} more]"));
            }
        }

        out
    }
}

/// Accumulates the parts of a [`ConfigError`].
#[derive(Debug)]
#[must_use = "builders do nothing until .build() is called"]
pub struct ConfigErrorBuilder {
    kind: ErrorKind,
    title: String,
    field_path: Option<String>,
    location: Option<Location>,
    detail: Option<String>,
    suggestions: Vec<String>,
    suggestion_base: Option<String>,
    violations: Vec<String>,
    referenced_by: Option<String>,
    cause: Option<BoxedCause>,
}

impl ConfigErrorBuilder {
    pub fn field_path(mut self, path: impl Into<String>) -> Self {
        let path = path.into();
        self.field_path = (!path.is_empty()).then_some(path);
        self
    }

    pub fn location(mut self, location: Option<Location>) -> Self {
        self.location = location;
        self
    }

    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn suggestions<I, S>(mut self, suggestions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.suggestions.extend(suggestions.into_iter().map(Into::into));
        self
    }

    /// Sets the misspelled name suggestions are ordered against.
    pub fn suggestion_base(mut self, base: impl Into<String>) -> Self {
        self.suggestion_base = Some(base.into());
        self
    }

    pub fn violations(mut self, violations: Vec<String>) -> Self {
        self.violations = violations;
        self
    }

    /// Names the document whose parent reference led to the failing one.
    pub fn referenced_by(mut self, referrer: impl fmt::Display) -> Self {
        self.referenced_by = Some(referrer.to_string());
        self
    }

    pub fn cause(mut self, cause: impl Into<BoxedCause>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    /// Freezes the error, attributing it to the given document origin.
    pub fn build(self, origin: impl fmt::Display) -> ConfigError {
        let mut suggestions = self.suggestions;
        if let Some(base) = self.suggestion_base.as_deref().filter(|b| !b.is_empty()) {
            suggestions.sort_by_key(|candidate| levenshtein(candidate, base));
        }

        let mut error = ConfigError {
            kind: self.kind,
            origin: origin.to_string(),
            title: self.title,
            field_path: self.field_path,
            location: self.location,
            detail: self.detail,
            suggestions,
            violations: self.violations,
            referenced_by: self.referenced_by,
            message: String::new(),
            cause: self.cause,
        };
        error.message = error.render();
        error
    }
}

/// Edit distance between two strings, counted in characters.
pub(crate) fn levenshtein(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != *cb);
            current[j + 1] = substitution.min(previous[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[b.len()]
}
