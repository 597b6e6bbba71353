use crate::error::{Error, ParseError};
use crate::form::{Elements, Form, NumberForm, ObjectShape, Refinement, StringForm, Transform};
use crate::lazy::LazySchema;
use crate::validate;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// An immutable, cheaply cloned description of an expected value.
///
/// Schemas are built once with the functions in this module and shared
/// across any number of decode calls, including from several threads.
/// Combinators never modify their inputs; they wrap them in a new node.
#[derive(Clone)]
pub struct Schema(Arc<Form>);

impl Schema {
    pub fn new(form: Form) -> Self {
        Schema(Arc::new(form))
    }

    pub fn form(&self) -> &Form {
        &self.0
    }

    pub fn kind(&self) -> &'static str {
        self.0.kind()
    }

    pub fn as_object(&self) -> Option<&ObjectShape> {
        match self.form() {
            Form::Object(shape) => Some(shape),
            _ => None,
        }
    }

    /// The element schema of an array schema.
    pub fn element(&self) -> Option<&Schema> {
        match self.form() {
            Form::Elements(elements) => Some(&elements.schema),
            _ => None,
        }
    }

    /// Follows lazy nodes until a concrete schema is reached.
    pub fn resolve(&self) -> Result<&Schema, Error> {
        let mut seen: Vec<*const Form> = vec![];
        let mut current = self;

        while let Form::Lazy(lazy) = current.form() {
            let ptr = Arc::as_ptr(&current.0);
            if seen.contains(&ptr) {
                return Err(Error::LazyCycle);
            }
            seen.push(ptr);
            current = lazy.resolve()?;
        }

        Ok(current)
    }

    pub fn optional(self) -> Schema {
        optional(self)
    }

    pub fn nullable(self) -> Schema {
        nullable(self)
    }

    pub fn with_default(self, fallback: Value) -> Schema {
        with_default(self, fallback)
    }

    pub fn refine<P>(self, predicate: P, message: impl Into<String>) -> Schema
    where
        P: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        refine(self, predicate, message)
    }

    pub fn transform<F>(self, function: F) -> Schema
    where
        F: Fn(Value) -> Result<Value, String> + Send + Sync + 'static,
    {
        transform(self, function)
    }

    pub fn transform_to<F>(self, target: &'static str, function: F) -> Schema
    where
        F: Fn(Value) -> Result<Value, String> + Send + Sync + 'static,
    {
        transform_to(self, target, function)
    }

    pub fn coerce<F>(self, target: &'static str, function: F) -> Schema
    where
        F: Fn(Value) -> Result<Value, String> + Send + Sync + 'static,
    {
        coerce(self, target, function)
    }

    pub fn pipe(self, next: impl Into<Schema>) -> Schema {
        pipe(self, next)
    }

    pub fn validate(&self, instance: &Value) -> Result<Value, Error> {
        validate::validate(self, instance)
    }

    pub fn safe_parse(&self, instance: &Value) -> Result<Value, Error> {
        validate::safe_parse(self, instance)
    }

    pub fn parse(&self, instance: &Value) -> Result<Value, ParseError> {
        validate::parse(self, instance)
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.form(), f)
    }
}

impl From<Form> for Schema {
    fn from(form: Form) -> Self {
        Schema::new(form)
    }
}

impl From<StringForm> for Schema {
    fn from(form: StringForm) -> Self {
        Schema::new(Form::String(form))
    }
}

impl From<NumberForm> for Schema {
    fn from(form: NumberForm) -> Self {
        Schema::new(Form::Number(form))
    }
}

impl From<ObjectShape> for Schema {
    fn from(shape: ObjectShape) -> Self {
        Schema::new(Form::Object(shape))
    }
}

impl From<Elements> for Schema {
    fn from(elements: Elements) -> Self {
        Schema::new(Form::Elements(elements))
    }
}

pub fn any() -> Schema {
    Schema::new(Form::Any)
}

pub fn never() -> Schema {
    Schema::new(Form::Never)
}

pub fn null() -> Schema {
    Schema::new(Form::Null)
}

pub fn boolean() -> Schema {
    Schema::new(Form::Boolean)
}

pub fn string() -> StringForm {
    StringForm::new()
}

pub fn number() -> NumberForm {
    NumberForm::new()
}

pub fn integer() -> NumberForm {
    NumberForm::new().int()
}

pub fn literal(value: impl Into<Value>) -> Schema {
    Schema::new(Form::Literal(value.into()))
}

pub fn enum_of<V, I>(values: I) -> Schema
where
    V: Into<Value>,
    I: IntoIterator<Item = V>,
{
    Schema::new(Form::Enum(values.into_iter().map(Into::into).collect()))
}

/// An object shape with the given fields and the `strip` policy.
pub fn object<K, S, I>(fields: I) -> ObjectShape
where
    K: Into<String>,
    S: Into<Schema>,
    I: IntoIterator<Item = (K, S)>,
{
    ObjectShape::new().extend(fields)
}

pub fn array(schema: impl Into<Schema>) -> Elements {
    Elements::new(schema)
}

/// An object with arbitrary keys whose values all match `schema`.
pub fn record(schema: impl Into<Schema>) -> Schema {
    Schema::new(Form::Values(schema.into()))
}

pub fn union<S, I>(alternatives: I) -> Schema
where
    S: Into<Schema>,
    I: IntoIterator<Item = S>,
{
    Schema::new(Form::Union(
        alternatives.into_iter().map(Into::into).collect(),
    ))
}

/// A union where exactly one alternative may match.
pub fn one_of<S, I>(alternatives: I) -> Schema
where
    S: Into<Schema>,
    I: IntoIterator<Item = S>,
{
    Schema::new(Form::OneOf(
        alternatives.into_iter().map(Into::into).collect(),
    ))
}

pub fn intersection<S, I>(members: I) -> Schema
where
    S: Into<Schema>,
    I: IntoIterator<Item = S>,
{
    Schema::new(Form::Intersection(
        members.into_iter().map(Into::into).collect(),
    ))
}

pub fn optional(schema: impl Into<Schema>) -> Schema {
    Schema::new(Form::Optional(schema.into()))
}

pub fn nullable(schema: impl Into<Schema>) -> Schema {
    Schema::new(Form::Nullable(schema.into()))
}

/// Substitutes `fallback` when the value is absent.
pub fn with_default(schema: impl Into<Schema>, fallback: Value) -> Schema {
    Schema::new(Form::WithDefault(schema.into(), fallback))
}

pub fn refine<P>(schema: impl Into<Schema>, predicate: P, message: impl Into<String>) -> Schema
where
    P: Fn(&Value) -> bool + Send + Sync + 'static,
{
    Schema::new(Form::Refinement(Refinement {
        schema: schema.into(),
        predicate: Arc::new(predicate),
        message: message.into(),
    }))
}

/// Maps the accepted value. Only applied by `safe_parse` and `parse`.
///
/// An `Err` from `function`, or a panic inside it, is reported as a
/// [`TransformFailed`][crate::ViolationKind::TransformFailed] violation.
pub fn transform<F>(schema: impl Into<Schema>, function: F) -> Schema
where
    F: Fn(Value) -> Result<Value, String> + Send + Sync + 'static,
{
    transform_to(schema, "unknown", function)
}

/// Like [`transform`], naming the type of the produced value.
pub fn transform_to<F>(schema: impl Into<Schema>, target: &'static str, function: F) -> Schema
where
    F: Fn(Value) -> Result<Value, String> + Send + Sync + 'static,
{
    Schema::new(Form::Transform(Transform {
        schema: schema.into(),
        function: Arc::new(function),
        target,
        coercion: false,
    }))
}

/// Maps the accepted value as part of structural acceptance, so `validate`
/// applies it too.
pub fn coerce<F>(schema: impl Into<Schema>, target: &'static str, function: F) -> Schema
where
    F: Fn(Value) -> Result<Value, String> + Send + Sync + 'static,
{
    Schema::new(Form::Transform(Transform {
        schema: schema.into(),
        function: Arc::new(function),
        target,
        coercion: true,
    }))
}

/// Decodes with `first`, then decodes its output with `second`.
pub fn pipe(first: impl Into<Schema>, second: impl Into<Schema>) -> Schema {
    Schema::new(Form::Pipe(first.into(), second.into()))
}

/// A schema produced by `supplier` on first use.
///
/// ```
/// use once_cell::sync::Lazy;
/// use serde_json::json;
/// use valshape::{lazy, record, string, union, Schema};
///
/// static TREE: Lazy<Schema> = Lazy::new(|| {
///     lazy(|| record(union(vec![Schema::from(string()), TREE.clone()])))
/// });
///
/// assert!(TREE.validate(&json!({ "a": { "b": "c" } })).is_ok());
/// assert!(TREE.validate(&json!({ "a": { "b": 1 } })).is_err());
/// ```
pub fn lazy<F>(supplier: F) -> Schema
where
    F: Fn() -> Schema + Send + Sync + 'static,
{
    Schema::new(Form::Lazy(LazySchema::new(supplier)))
}
