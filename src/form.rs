use crate::lazy::LazySchema;
use crate::schema::Schema;
use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// The shape a [`Schema`] describes. Every schema wraps exactly one form.
#[derive(Debug)]
pub enum Form {
    Any,
    Never,
    Null,
    Boolean,
    String(StringForm),
    Number(NumberForm),
    Literal(Value),
    Enum(Vec<Value>),
    Optional(Schema),
    Nullable(Schema),
    WithDefault(Schema, Value),
    Object(ObjectShape),
    Elements(Elements),
    Values(Schema),
    Union(Vec<Schema>),
    OneOf(Vec<Schema>),
    Intersection(Vec<Schema>),
    Refinement(Refinement),
    Transform(Transform),
    Pipe(Schema, Schema),
    Lazy(LazySchema),
}

impl Form {
    pub fn kind(&self) -> &'static str {
        match self {
            Form::Any => "any",
            Form::Never => "never",
            Form::Null => "null",
            Form::Boolean => "boolean",
            Form::String(_) => "string",
            Form::Number(_) => "number",
            Form::Literal(_) => "literal",
            Form::Enum(_) => "enum",
            Form::Optional(_) => "optional",
            Form::Nullable(_) => "nullable",
            Form::WithDefault(..) => "default",
            Form::Object(_) => "object",
            Form::Elements(_) => "array",
            Form::Values(_) => "record",
            Form::Union(_) => "union",
            Form::OneOf(_) => "one_of",
            Form::Intersection(_) => "intersection",
            Form::Refinement(_) => "refinement",
            Form::Transform(_) => "transform",
            Form::Pipe(..) => "pipe",
            Form::Lazy(_) => "lazy",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StringFormat {
    /// RFC 3339 timestamp.
    Timestamp,
}

impl FromStr for StringFormat {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "timestamp" => Ok(Self::Timestamp),
            _ => Err(()),
        }
    }
}

/// Constraints on a string value. Lengths count Unicode scalar values.
#[derive(Clone, Debug, Default)]
pub struct StringForm {
    pub min_len: Option<usize>,
    pub max_len: Option<usize>,
    pub pattern: Option<Regex>,
    pub format: Option<StringFormat>,
    pub message: Option<String>,
}

impl StringForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn min_len(mut self, min_len: usize) -> Self {
        self.min_len = Some(min_len);
        self
    }

    pub fn max_len(mut self, max_len: usize) -> Self {
        self.max_len = Some(max_len);
        self
    }

    pub fn non_empty(self) -> Self {
        self.min_len(1)
    }

    pub fn pattern(mut self, pattern: Regex) -> Self {
        self.pattern = Some(pattern);
        self
    }

    pub fn timestamp(mut self) -> Self {
        self.format = Some(StringFormat::Timestamp);
        self
    }

    /// Replaces the default message of every violation this form reports.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct NumberForm {
    pub minimum: Option<f64>,
    pub exclusive_minimum: Option<f64>,
    pub maximum: Option<f64>,
    pub integer: bool,
    pub message: Option<String>,
}

impl NumberForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn min(mut self, minimum: f64) -> Self {
        self.minimum = Some(minimum);
        self
    }

    pub fn max(mut self, maximum: f64) -> Self {
        self.maximum = Some(maximum);
        self
    }

    /// Strictly greater than zero.
    pub fn positive(mut self) -> Self {
        self.exclusive_minimum = Some(0.0);
        self
    }

    pub fn non_negative(self) -> Self {
        self.min(0.0)
    }

    pub fn int(mut self) -> Self {
        self.integer = true;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub(crate) fn lower_bound(&self) -> Option<f64> {
        match (self.minimum, self.exclusive_minimum) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        }
    }

    pub(crate) fn in_range(&self, n: f64) -> bool {
        self.minimum.map_or(true, |min| n >= min)
            && self.exclusive_minimum.map_or(true, |min| n > min)
            && self.maximum.map_or(true, |max| n <= max)
    }
}

/// What an object does with keys its shape does not declare.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownFields {
    /// Drop undeclared keys from the output.
    Strip,
    /// Copy undeclared keys to the output untouched.
    Allow,
    /// Report each undeclared key as a violation.
    Reject,
}

impl Default for UnknownFields {
    fn default() -> Self {
        UnknownFields::Strip
    }
}

/// Declared fields of an object, in declaration order.
#[derive(Clone, Debug, Default)]
pub struct ObjectShape {
    fields: IndexMap<String, Schema>,
    unknown_fields: UnknownFields,
}

impl ObjectShape {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: impl Into<String>, schema: impl Into<Schema>) -> Self {
        self.fields.insert(name.into(), schema.into());
        self
    }

    /// A new shape with `fields` laid over this one's. On a name collision
    /// the new field replaces the old one in place.
    pub fn extend<K, S, I>(&self, fields: I) -> Self
    where
        K: Into<String>,
        S: Into<Schema>,
        I: IntoIterator<Item = (K, S)>,
    {
        let mut out = self.clone();
        for (name, schema) in fields {
            out.fields.insert(name.into(), schema.into());
        }
        out
    }

    /// Like [`extend`][Self::extend], taking the fields of another shape.
    /// The unknown-field policy stays the one of `self`.
    pub fn merge(&self, other: &ObjectShape) -> Self {
        self.extend(
            other
                .fields
                .iter()
                .map(|(name, schema)| (name.clone(), schema.clone())),
        )
    }

    pub fn unknown_fields(mut self, policy: UnknownFields) -> Self {
        self.unknown_fields = policy;
        self
    }

    pub fn strict(self) -> Self {
        self.unknown_fields(UnknownFields::Reject)
    }

    pub fn passthrough(self) -> Self {
        self.unknown_fields(UnknownFields::Allow)
    }

    pub fn strip(self) -> Self {
        self.unknown_fields(UnknownFields::Strip)
    }

    pub fn policy(&self) -> UnknownFields {
        self.unknown_fields
    }

    pub fn fields(&self) -> &IndexMap<String, Schema> {
        &self.fields
    }

    pub fn get(&self, name: &str) -> Option<&Schema> {
        self.fields.get(name)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }
}

/// An array whose every element matches `schema`.
#[derive(Clone, Debug)]
pub struct Elements {
    pub schema: Schema,
    pub min_items: Option<usize>,
    pub max_items: Option<usize>,
}

impl Elements {
    pub fn new(schema: impl Into<Schema>) -> Self {
        Self {
            schema: schema.into(),
            min_items: None,
            max_items: None,
        }
    }

    pub fn min_items(mut self, min_items: usize) -> Self {
        self.min_items = Some(min_items);
        self
    }

    pub fn max_items(mut self, max_items: usize) -> Self {
        self.max_items = Some(max_items);
        self
    }

    pub fn non_empty(self) -> Self {
        self.min_items(1)
    }
}

pub type Predicate = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

pub type TransformFn = Arc<dyn Fn(Value) -> Result<Value, String> + Send + Sync>;

#[derive(Clone)]
pub struct Refinement {
    pub schema: Schema,
    pub predicate: Predicate,
    pub message: String,
}

impl fmt::Debug for Refinement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Refinement")
            .field("schema", &self.schema)
            .field("message", &self.message)
            .finish()
    }
}

#[derive(Clone)]
pub struct Transform {
    pub schema: Schema,
    pub function: TransformFn,
    /// Name of the produced value's type, for introspection only.
    pub target: &'static str,
    /// Coercions belong to structural acceptance and also run under
    /// [`validate`][crate::validate]. Plain transforms only run when parsing.
    pub coercion: bool,
}

impl fmt::Debug for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transform")
            .field("schema", &self.schema)
            .field("target", &self.target)
            .field("coercion", &self.coercion)
            .finish()
    }
}
