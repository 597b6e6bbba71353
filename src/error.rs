use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

/// One step into an instance: an object key or an array index.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

/// Location of a value inside the decoded instance.
///
/// Rendered with `.` between keys and `[i]` for indices, so the path of the
/// third vehicle's seat count reads `fleet[2].vehicle.seats`. The root path
/// renders as the empty string.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Path(Vec<PathSegment>);

impl Path {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }
}

impl From<Vec<PathSegment>> for Path {
    fn from(segments: Vec<PathSegment>) -> Self {
        Path(segments)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            match segment {
                PathSegment::Key(key) if i == 0 => write!(f, "{}", key)?,
                PathSegment::Key(key) => write!(f, ".{}", key)?,
                PathSegment::Index(index) => write!(f, "[{}]", index)?,
            }
        }

        Ok(())
    }
}

/// Renders an optional bound the way size violations print it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bound(pub Option<f64>);

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(bound) => write!(f, "{}", bound),
            None => f.write_str("not specified"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Error)]
pub enum ViolationKind {
    #[error("expected {expected}")]
    TypeMismatch { expected: &'static str },

    #[error("missing field")]
    MissingField,

    #[error("unknown field")]
    UnknownField,

    #[error("{subject} ({actual}) is out of bounds: min: {min}, max: {max}")]
    SizeOutOfBounds {
        subject: &'static str,
        actual: f64,
        min: Bound,
        max: Bound,
    },

    #[error("does not match the pattern {pattern}")]
    PatternMismatch { pattern: String },

    #[error("invalid {format}")]
    InvalidFormat { format: &'static str },

    #[error("expected one of {expected}")]
    InvalidLiteral { expected: String },

    #[error("{message}")]
    RefinementFailed { message: String },

    #[error("no alternative matched")]
    NoAlternativeMatched,

    #[error("ambiguous: multiple alternatives matched")]
    AmbiguousAlternatives { matched: Vec<usize> },

    #[error("{message}")]
    TransformFailed { message: String },
}

/// A single failure recorded while decoding.
#[derive(Clone, Debug, PartialEq)]
pub struct Violation {
    pub path: Path,
    pub kind: ViolationKind,
    /// The offending value, `None` when the value was absent.
    pub value: Option<Value>,
    /// Author-supplied message, used verbatim when formatting.
    pub custom_message: Option<String>,
}

impl Violation {
    pub fn message(&self) -> String {
        match &self.custom_message {
            Some(message) => message.clone(),
            None => self.kind.to_string(),
        }
    }

    /// Human-readable rendering of this violation.
    pub fn format(&self) -> String {
        if let Some(message) = &self.custom_message {
            return message.clone();
        }

        format!(
            "Invalid value \"{}\" supplied to \"{}\"",
            display_value(self.value.as_ref()),
            self.path
        )
    }
}

fn display_value(value: Option<&Value>) -> String {
    match value {
        None => "undefined".to_owned(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// External representation of a violation.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub path: String,
    pub message: String,
}

/// The non-empty, ordered, deduplicated violations of one decode call.
#[derive(Clone, Debug, PartialEq)]
pub struct ErrorList {
    violations: Vec<Violation>,
}

impl ErrorList {
    /// Drops violations repeating an earlier `(path, message)` pair.
    pub(crate) fn new(violations: Vec<Violation>) -> Self {
        let mut seen = HashSet::new();
        let violations = violations
            .into_iter()
            .filter(|v| seen.insert((v.path.clone(), v.message())))
            .collect();

        Self { violations }
    }

    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    pub fn len(&self) -> usize {
        self.violations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Violation> {
        self.violations.iter()
    }

    pub fn entries(&self) -> Vec<ErrorEntry> {
        self.violations
            .iter()
            .map(|v| ErrorEntry {
                path: v.path.to_string(),
                message: v.message(),
            })
            .collect()
    }

    /// Formatted messages, deduplicated by string equality.
    pub fn messages(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.violations
            .iter()
            .map(Violation::format)
            .filter(|message| seen.insert(message.clone()))
            .collect()
    }
}

impl fmt::Display for ErrorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.messages().join("\n"))
    }
}

impl<'a> IntoIterator for &'a ErrorList {
    type Item = &'a Violation;
    type IntoIter = std::slice::Iter<'a, Violation>;

    fn into_iter(self) -> Self::IntoIter {
        self.violations.iter()
    }
}

/// Outcome of a failed decode call.
///
/// Only `Invalid` reports a problem with the instance. The other variants
/// point at a schema that cannot be evaluated.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum Error {
    #[error("{0}")]
    Invalid(ErrorList),

    #[error("max depth exceeded")]
    MaxDepthExceeded,

    #[error("lazy schema re-entered before it made progress")]
    LazyCycle,
}

impl Error {
    pub fn errors(&self) -> Option<&ErrorList> {
        match self {
            Error::Invalid(errors) => Some(errors),
            _ => None,
        }
    }
}

/// Flattened error returned by [`parse`][crate::parse].
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ParseError {
    message: String,
}

impl ParseError {
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<Error> for ParseError {
    fn from(err: Error) -> Self {
        let message = match err {
            Error::Invalid(errors) => errors.messages().join("; "),
            other => other.to_string(),
        };

        ParseError { message }
    }
}
