use crate::error::{Bound, Error, ErrorList, ParseError, PathSegment, Violation, ViolationKind};
use crate::form::{
    Form, NumberForm, ObjectShape, Refinement, StringForm, StringFormat, Transform, UnknownFields,
};
use crate::lazy::LazySchema;
use crate::schema::Schema;
use chrono::DateTime;
use serde_json::{Map, Value};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, trace};

#[derive(Clone, Debug, Default)]
pub struct DecodeOptions {
    max_depth: usize,
    max_errors: usize,
}

impl DecodeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail with [`Error::MaxDepthExceeded`] past this many nested nodes.
    /// Zero means no limit.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Stop once this many violations were recorded. Zero means no limit.
    pub fn with_max_errors(mut self, max_errors: usize) -> Self {
        self.max_errors = max_errors;
        self
    }
}

/// Whether plain transforms run. Coercions always do.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Validate,
    Parse,
}

#[derive(Clone, Debug, Default)]
pub struct Decoder {
    options: DecodeOptions,
}

impl Decoder {
    pub fn new(options: DecodeOptions) -> Self {
        Self { options }
    }

    pub fn validate(&self, schema: &Schema, instance: &Value) -> Result<Value, Error> {
        self.decode(schema, instance, Mode::Validate)
    }

    pub fn safe_parse(&self, schema: &Schema, instance: &Value) -> Result<Value, Error> {
        self.decode(schema, instance, Mode::Parse)
    }

    pub fn parse(&self, schema: &Schema, instance: &Value) -> Result<Value, ParseError> {
        self.safe_parse(schema, instance).map_err(ParseError::from)
    }

    pub fn decode(&self, schema: &Schema, instance: &Value, mode: Mode) -> Result<Value, Error> {
        let mut vm = Vm {
            max_depth: self.options.max_depth,
            max_errors: self.options.max_errors,
            mode,
            depth: 0,
            instance_tokens: vec![],
            errors: vec![vec![]],
            lazy_entries: vec![],
        };

        let output = match vm.decode(schema, Some(instance)) {
            Ok(output) => output,
            Err(VmDecodeError::MaxErrorsReached) => None,
            Err(VmDecodeError::MaxDepthExceeded) => return Err(Error::MaxDepthExceeded),
            Err(VmDecodeError::LazyCycle) => return Err(Error::LazyCycle),
        };

        let violations = vm.errors.swap_remove(0);
        if !violations.is_empty() {
            debug!(violations = violations.len(), ?mode, "decode rejected instance");
            return Err(Error::Invalid(ErrorList::new(violations)));
        }

        Ok(output.unwrap_or(Value::Null))
    }
}

/// Checks `instance` against `schema`, applying coercions but not transforms.
pub fn validate(schema: &Schema, instance: &Value) -> Result<Value, Error> {
    Decoder::default().validate(schema, instance)
}

/// Checks `instance` against `schema` and runs the full pipeline.
pub fn safe_parse(schema: &Schema, instance: &Value) -> Result<Value, Error> {
    Decoder::default().safe_parse(schema, instance)
}

/// Like [`safe_parse`], with every message folded into one error.
pub fn parse(schema: &Schema, instance: &Value) -> Result<Value, ParseError> {
    Decoder::default().parse(schema, instance)
}

struct Vm {
    max_depth: usize,
    max_errors: usize,
    mode: Mode,
    depth: usize,
    instance_tokens: Vec<PathSegment>,
    /// One frame per pending trial; the bottom frame is the caller's.
    errors: Vec<Vec<Violation>>,
    /// Lazy nodes entered for an instance, keyed by address. Seeing the same
    /// pair twice means a cycle that never descends into the instance.
    lazy_entries: Vec<(usize, usize)>,
}

enum VmDecodeError {
    MaxErrorsReached,
    MaxDepthExceeded,
    LazyCycle,
}

type VmResult<T> = Result<T, VmDecodeError>;

impl Vm {
    /// Decodes `instance`, where `None` means the value is absent. The
    /// returned value is only meaningful if no violation was recorded.
    fn decode(&mut self, schema: &Schema, instance: Option<&Value>) -> VmResult<Option<Value>> {
        self.depth += 1;
        if self.depth == self.max_depth {
            return Err(VmDecodeError::MaxDepthExceeded);
        }

        let output = self.decode_form(schema, instance)?;
        self.depth -= 1;
        Ok(output)
    }

    fn decode_form(
        &mut self,
        schema: &Schema,
        instance: Option<&Value>,
    ) -> VmResult<Option<Value>> {
        match schema.form() {
            Form::Optional(inner) => match instance {
                None => Ok(None),
                Some(_) => self.decode(inner, instance),
            },
            Form::WithDefault(inner, fallback) => match instance {
                None => Ok(Some(fallback.clone())),
                Some(_) => self.decode(inner, instance),
            },
            Form::Nullable(inner) => match instance {
                Some(Value::Null) => Ok(Some(Value::Null)),
                _ => self.decode(inner, instance),
            },
            Form::Union(alternatives) => self.decode_union(alternatives, instance),
            Form::OneOf(alternatives) => self.decode_one_of(alternatives, instance),
            Form::Intersection(members) => self.decode_intersection(members, instance),
            Form::Refinement(_) | Form::Transform(_) => self.decode_chain(schema, instance),
            Form::Pipe(first, second) => {
                let before = self.error_count();
                let output = self.decode(first, instance)?;
                if self.error_count() != before || output.is_none() {
                    return Ok(None);
                }
                self.decode(second, output.as_ref())
            }
            Form::Lazy(lazy) => self.decode_lazy(lazy, instance),
            _ => match instance {
                Some(instance) => self.decode_present(schema.form(), instance),
                None => {
                    self.push_error(ViolationKind::MissingField, None, None)?;
                    Ok(None)
                }
            },
        }
    }

    fn decode_present(&mut self, form: &Form, instance: &Value) -> VmResult<Option<Value>> {
        match form {
            Form::Any => {}
            Form::Never => {
                self.type_mismatch("never", instance)?;
            }
            Form::Null => {
                if !instance.is_null() {
                    self.type_mismatch("null", instance)?;
                }
            }
            Form::Boolean => {
                if !instance.is_boolean() {
                    self.type_mismatch("boolean", instance)?;
                }
            }
            Form::String(string) => self.validate_string(string, instance)?,
            Form::Number(number) => self.validate_number(number, instance)?,
            Form::Literal(literal) => {
                if instance != literal {
                    self.push_error(
                        ViolationKind::InvalidLiteral {
                            expected: Value::Array(vec![literal.clone()]).to_string(),
                        },
                        Some(instance),
                        None,
                    )?;
                }
            }
            Form::Enum(values) => {
                if !values.contains(instance) {
                    self.push_error(
                        ViolationKind::InvalidLiteral {
                            expected: Value::Array(values.clone()).to_string(),
                        },
                        Some(instance),
                        None,
                    )?;
                }
            }
            Form::Object(shape) => return self.decode_object(shape, instance),
            Form::Elements(elements) => {
                let arr = match instance.as_array() {
                    Some(arr) => arr,
                    None => {
                        self.type_mismatch("array", instance)?;
                        return Ok(None);
                    }
                };

                let mut out = Vec::with_capacity(arr.len());
                for (i, sub_instance) in arr.iter().enumerate() {
                    self.push_instance_token(PathSegment::Index(i));
                    let decoded = self.decode(&elements.schema, Some(sub_instance))?;
                    self.pop_instance_token();
                    out.push(decoded.unwrap_or(Value::Null));
                }

                let len = arr.len();
                if elements.min_items.map_or(false, |min| len < min)
                    || elements.max_items.map_or(false, |max| len > max)
                {
                    self.push_error(
                        ViolationKind::SizeOutOfBounds {
                            subject: "array size",
                            actual: len as f64,
                            min: Bound(elements.min_items.map(|n| n as f64)),
                            max: Bound(elements.max_items.map(|n| n as f64)),
                        },
                        Some(instance),
                        None,
                    )?;
                }

                return Ok(Some(Value::Array(out)));
            }
            Form::Values(schema) => {
                let obj = match instance.as_object() {
                    Some(obj) => obj,
                    None => {
                        self.type_mismatch("object", instance)?;
                        return Ok(None);
                    }
                };

                let mut out = Map::new();
                for (name, sub_instance) in obj {
                    self.push_instance_token(PathSegment::Key(name.clone()));
                    let decoded = self.decode(schema, Some(sub_instance))?;
                    self.pop_instance_token();
                    if let Some(value) = decoded {
                        out.insert(name.clone(), value);
                    }
                }

                return Ok(Some(Value::Object(out)));
            }
            // Absence-aware forms are dispatched in decode_form.
            _ => {}
        }

        Ok(Some(instance.clone()))
    }

    fn validate_string(&mut self, form: &StringForm, instance: &Value) -> VmResult<()> {
        let s = match instance.as_str() {
            Some(s) => s,
            None => {
                return self.push_error(
                    ViolationKind::TypeMismatch { expected: "string" },
                    Some(instance),
                    form.message.as_deref(),
                )
            }
        };

        let len = s.chars().count();
        if form.min_len.map_or(false, |min| len < min)
            || form.max_len.map_or(false, |max| len > max)
        {
            self.push_error(
                ViolationKind::SizeOutOfBounds {
                    subject: "string length",
                    actual: len as f64,
                    min: Bound(form.min_len.map(|n| n as f64)),
                    max: Bound(form.max_len.map(|n| n as f64)),
                },
                Some(instance),
                form.message.as_deref(),
            )?;
        }

        if let Some(pattern) = &form.pattern {
            if !pattern.is_match(s) {
                self.push_error(
                    ViolationKind::PatternMismatch {
                        pattern: pattern.as_str().to_owned(),
                    },
                    Some(instance),
                    form.message.as_deref(),
                )?;
            }
        }

        if let Some(StringFormat::Timestamp) = form.format {
            if DateTime::parse_from_rfc3339(s).is_err() {
                self.push_error(
                    ViolationKind::InvalidFormat { format: "timestamp" },
                    Some(instance),
                    form.message.as_deref(),
                )?;
            }
        }

        Ok(())
    }

    fn validate_number(&mut self, form: &NumberForm, instance: &Value) -> VmResult<()> {
        let n = match instance.as_f64() {
            Some(n) => n,
            None => {
                return self.push_error(
                    ViolationKind::TypeMismatch { expected: "number" },
                    Some(instance),
                    form.message.as_deref(),
                )
            }
        };

        if form.integer && n.fract() != 0.0 {
            self.push_error(
                ViolationKind::TypeMismatch { expected: "integer" },
                Some(instance),
                form.message.as_deref(),
            )?;
        }

        if !form.in_range(n) {
            self.push_error(
                ViolationKind::SizeOutOfBounds {
                    subject: "number",
                    actual: n,
                    min: Bound(form.lower_bound()),
                    max: Bound(form.maximum),
                },
                Some(instance),
                form.message.as_deref(),
            )?;
        }

        Ok(())
    }

    fn decode_object(&mut self, shape: &ObjectShape, instance: &Value) -> VmResult<Option<Value>> {
        let obj = match instance.as_object() {
            Some(obj) => obj,
            None => {
                self.type_mismatch("object", instance)?;
                return Ok(None);
            }
        };

        let mut out = Map::new();
        for (name, sub_schema) in shape.fields() {
            self.push_instance_token(PathSegment::Key(name.clone()));
            let decoded = self.decode(sub_schema, obj.get(name))?;
            self.pop_instance_token();
            if let Some(value) = decoded {
                out.insert(name.clone(), value);
            }
        }

        for (name, sub_instance) in obj {
            if shape.get(name).is_some() {
                continue;
            }

            match shape.policy() {
                UnknownFields::Strip => {}
                UnknownFields::Allow => {
                    out.insert(name.clone(), sub_instance.clone());
                }
                UnknownFields::Reject => {
                    self.push_instance_token(PathSegment::Key(name.clone()));
                    self.push_error(ViolationKind::UnknownField, Some(sub_instance), None)?;
                    self.pop_instance_token();
                }
            }
        }

        Ok(Some(Value::Object(out)))
    }

    fn decode_union(
        &mut self,
        alternatives: &[Schema],
        instance: Option<&Value>,
    ) -> VmResult<Option<Value>> {
        let mut closest: Option<Vec<Violation>> = None;

        for (i, alternative) in alternatives.iter().enumerate() {
            let (output, violations) = self.trial(alternative, instance)?;
            if violations.is_empty() {
                trace!(alternative = i, "union alternative matched");
                return Ok(output);
            }

            if closest.as_ref().map_or(true, |best| violations.len() < best.len()) {
                closest = Some(violations);
            }
        }

        match closest {
            Some(violations) => self.push_errors(violations)?,
            None => self.push_error(ViolationKind::NoAlternativeMatched, instance, None)?,
        }

        Ok(None)
    }

    fn decode_one_of(
        &mut self,
        alternatives: &[Schema],
        instance: Option<&Value>,
    ) -> VmResult<Option<Value>> {
        let mut matched = vec![];
        let mut output = None;
        let mut closest: Option<Vec<Violation>> = None;

        for (i, alternative) in alternatives.iter().enumerate() {
            let (alternative_output, violations) = self.trial(alternative, instance)?;
            if violations.is_empty() {
                if matched.is_empty() {
                    output = alternative_output;
                }
                matched.push(i);
            } else if closest
                .as_ref()
                .map_or(true, |best| closeness(&violations) < closeness(best))
            {
                closest = Some(violations);
            }
        }

        trace!(?matched, "one_of alternatives matched");
        match matched.len() {
            1 => Ok(output),
            0 => {
                self.push_error(ViolationKind::NoAlternativeMatched, instance, None)?;
                if let Some(violations) = closest {
                    self.push_errors(violations)?;
                }
                Ok(None)
            }
            _ => {
                self.push_error(ViolationKind::AmbiguousAlternatives { matched }, instance, None)?;
                Ok(None)
            }
        }
    }

    fn decode_intersection(
        &mut self,
        members: &[Schema],
        instance: Option<&Value>,
    ) -> VmResult<Option<Value>> {
        let mut merged: Option<Value> = None;

        for member in members {
            let output = self.decode(member, instance)?;
            merged = match (merged, output) {
                (Some(Value::Object(mut left)), Some(Value::Object(right))) => {
                    left.extend(right);
                    Some(Value::Object(left))
                }
                (merged, None) => merged,
                (_, output) => output,
            };
        }

        Ok(merged)
    }

    /// Runs a stack of refinements and transforms around one structural
    /// schema: the structure first, then every refinement in the order it
    /// was attached, then the transforms, innermost first.
    fn decode_chain(
        &mut self,
        schema: &Schema,
        instance: Option<&Value>,
    ) -> VmResult<Option<Value>> {
        let mut refinements: Vec<&Refinement> = vec![];
        let mut transforms: Vec<&Transform> = vec![];
        let mut core = schema;
        loop {
            match core.form() {
                Form::Refinement(refinement) => {
                    refinements.push(refinement);
                    core = &refinement.schema;
                }
                Form::Transform(transform) => {
                    transforms.push(transform);
                    core = &transform.schema;
                }
                _ => break,
            }
        }

        let before = self.error_count();
        let output = self.decode(core, instance)?;
        if self.error_count() != before {
            return Ok(None);
        }

        let mut value = match output {
            Some(value) => value,
            None => return Ok(None),
        };

        let mut refined = true;
        for refinement in refinements.iter().rev() {
            if !(refinement.predicate)(&value) {
                refined = false;
                self.push_error(
                    ViolationKind::RefinementFailed {
                        message: refinement.message.clone(),
                    },
                    Some(&value),
                    Some(refinement.message.as_str()),
                )?;
            }
        }

        if !refined {
            return Ok(None);
        }

        for transform in transforms.iter().rev() {
            if self.mode == Mode::Validate && !transform.coercion {
                continue;
            }

            let input = value.clone();
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| (transform.function)(input)))
                .unwrap_or_else(|payload| Err(panic_message(payload.as_ref())));

            match outcome {
                Ok(transformed) => value = transformed,
                Err(message) => {
                    self.push_error(
                        ViolationKind::TransformFailed {
                            message: message.clone(),
                        },
                        Some(&value),
                        Some(message.as_str()),
                    )?;
                    return Ok(None);
                }
            }
        }

        Ok(Some(value))
    }

    fn decode_lazy(
        &mut self,
        lazy: &LazySchema,
        instance: Option<&Value>,
    ) -> VmResult<Option<Value>> {
        let resolved = lazy.resolve().map_err(|_| VmDecodeError::LazyCycle)?;

        let entry = (
            lazy as *const LazySchema as usize,
            instance.map_or(0, |value| value as *const Value as usize),
        );
        if self.lazy_entries.contains(&entry) {
            return Err(VmDecodeError::LazyCycle);
        }

        self.lazy_entries.push(entry);
        let output = self.decode(resolved, instance)?;
        self.lazy_entries.pop();
        Ok(output)
    }

    /// Decodes into a fresh error frame and hands back what it collected.
    fn trial(
        &mut self,
        schema: &Schema,
        instance: Option<&Value>,
    ) -> VmResult<(Option<Value>, Vec<Violation>)> {
        self.errors.push(vec![]);
        let output = self.decode(schema, instance)?;
        let violations = self.errors.pop().unwrap_or_default();
        Ok((output, violations))
    }

    fn error_count(&self) -> usize {
        self.errors.last().map_or(0, Vec::len)
    }

    fn push_error(
        &mut self,
        kind: ViolationKind,
        value: Option<&Value>,
        custom_message: Option<&str>,
    ) -> VmResult<()> {
        self.push_violation(Violation {
            path: self.instance_tokens.clone().into(),
            kind,
            value: value.cloned(),
            custom_message: custom_message.map(str::to_owned),
        })
    }

    fn type_mismatch(&mut self, expected: &'static str, instance: &Value) -> VmResult<()> {
        self.push_error(ViolationKind::TypeMismatch { expected }, Some(instance), None)
    }

    fn push_errors(&mut self, violations: Vec<Violation>) -> VmResult<()> {
        for violation in violations {
            self.push_violation(violation)?;
        }
        Ok(())
    }

    fn push_violation(&mut self, violation: Violation) -> VmResult<()> {
        let at_root = self.errors.len() == 1;
        let frame = match self.errors.last_mut() {
            Some(frame) => frame,
            None => return Ok(()),
        };
        frame.push(violation);

        if at_root && self.max_errors == frame.len() {
            Err(VmDecodeError::MaxErrorsReached)
        } else {
            Ok(())
        }
    }

    fn push_instance_token(&mut self, token: PathSegment) {
        self.instance_tokens.push(token);
    }

    fn pop_instance_token(&mut self) {
        self.instance_tokens.pop();
    }
}

/// Message for a transform that panicked instead of returning `Err`.
fn panic_message(payload: &(dyn Any + Send)) -> String {
    match payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
    {
        Some(message) => format!("transform panicked: {}", message),
        None => "transform panicked".to_owned(),
    }
}

/// Ranks a failed alternative for reporting: fewer missing fields first, then
/// fewer violations. An alternative whose keys are present is the one the
/// instance was aimed at.
fn closeness(violations: &[Violation]) -> (usize, usize) {
    let missing = violations
        .iter()
        .filter(|v| v.kind == ViolationKind::MissingField)
        .count();
    (missing, violations.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        any, array, boolean, coerce, intersection, lazy, literal, never, null, nullable, number,
        object, one_of, optional, pipe, record, refine, string, transform, union, with_default,
    };
    use once_cell::sync::Lazy;
    use regex::Regex;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn entries(result: Result<Value, Error>) -> Vec<(String, String)> {
        match result {
            Err(Error::Invalid(errors)) => errors
                .entries()
                .into_iter()
                .map(|entry| (entry.path, entry.message))
                .collect(),
            other => panic!("expected violations, got {:?}", other),
        }
    }

    fn entry(path: &str, message: &str) -> (String, String) {
        (path.to_owned(), message.to_owned())
    }

    fn person() -> crate::ObjectShape {
        object(vec![
            (
                "name",
                Schema::from(
                    string()
                        .min_len(3)
                        .max_len(20)
                        .pattern(Regex::new("^[a-zA-Z ]+$").unwrap()),
                ),
            ),
            ("sex", optional(crate::enum_of(vec!["M", "F", "O"]))),
            ("password", string().min_len(5).into()),
        ])
    }

    fn foo_or_bar() -> Schema {
        one_of(vec![
            object(vec![("foo", string().non_empty())]),
            object(vec![("bar", Schema::from(array(number()).non_empty()))]),
        ])
    }

    #[test]
    fn short_name_is_out_of_bounds() {
        let schema: Schema = person().into();
        let err = safe_parse(&schema, &json!({ "name": "Jo", "password": "12345" })).unwrap_err();

        let errors = err.errors().unwrap();
        assert_eq!(1, errors.len());
        assert!(matches!(
            errors.violations()[0].kind,
            ViolationKind::SizeOutOfBounds { .. }
        ));
        assert_eq!(
            vec![entry("name", "string length (2) is out of bounds: min: 3, max: 20")],
            entries(Err(err))
        );
    }

    #[test]
    fn every_invalid_field_is_reported() {
        let schema: Schema = person().into();
        assert_eq!(
            vec![
                entry("name", "does not match the pattern ^[a-zA-Z ]+$"),
                entry("sex", "expected one of [\"M\",\"F\",\"O\"]"),
                entry("password", "missing field"),
            ],
            entries(schema.safe_parse(&json!({ "name": "R2-D2", "sex": "X" })))
        );
    }

    #[test]
    fn default_messages_name_value_and_path() {
        let schema: Schema = person().into();
        let err = schema.safe_parse(&json!({ "name": 7, "password": "12345" })).unwrap_err();
        assert_eq!(
            vec!["Invalid value \"7\" supplied to \"name\"".to_owned()],
            err.errors().unwrap().messages()
        );

        let err = schema.safe_parse(&json!({ "name": "Some name" })).unwrap_err();
        assert_eq!(
            vec!["Invalid value \"undefined\" supplied to \"password\"".to_owned()],
            err.errors().unwrap().messages()
        );
    }

    #[test]
    fn discriminated_resolution_without_match() {
        assert_eq!(
            vec![
                entry("", "no alternative matched"),
                entry("bar", "array size (0) is out of bounds: min: 1, max: not specified"),
            ],
            entries(foo_or_bar().safe_parse(&json!({ "bar": [] })))
        );

        assert_eq!(
            vec![entry("", "no alternative matched"), entry("foo", "missing field")],
            entries(foo_or_bar().safe_parse(&json!({})))
        );
    }

    #[test]
    fn discriminated_resolution_with_two_matches() {
        let err = foo_or_bar()
            .safe_parse(&json!({ "foo": "x", "bar": [1] }))
            .unwrap_err();

        let errors = err.errors().unwrap();
        assert_eq!(1, errors.len());
        assert_eq!(
            ViolationKind::AmbiguousAlternatives { matched: vec![0, 1] },
            errors.violations()[0].kind
        );
        assert_eq!(
            "ambiguous: multiple alternatives matched",
            errors.violations()[0].message()
        );
    }

    #[test]
    fn discriminated_resolution_with_one_match() {
        assert_eq!(
            json!({ "foo": "x" }),
            foo_or_bar().safe_parse(&json!({ "foo": "x" })).unwrap()
        );
        assert_eq!(
            json!({ "bar": [1, 2] }),
            foo_or_bar().safe_parse(&json!({ "bar": [1, 2] })).unwrap()
        );
    }

    #[test]
    fn mutually_exclusive_keys() {
        let schema = union(vec![
            object(vec![
                ("foo", Schema::from(string().non_empty())),
                ("bar", never().optional()),
            ]),
            object(vec![
                ("foo", never().optional()),
                ("bar", Schema::from(array(number()).non_empty())),
            ]),
        ]);

        assert!(schema.safe_parse(&json!({ "foo": "x" })).is_ok());
        assert!(schema.safe_parse(&json!({ "bar": [1] })).is_ok());
        assert!(schema.safe_parse(&json!({})).is_err());
        assert!(schema.safe_parse(&json!({ "foo": "x", "bar": [1] })).is_err());
        assert_eq!(
            vec![entry("bar", "array size (0) is out of bounds: min: 1, max: not specified")],
            entries(schema.safe_parse(&json!({ "bar": [] })))
        );
    }

    #[test]
    fn unknown_field_policies() {
        let shape = object(vec![("a", string())]);
        let instance = json!({ "a": "x", "extra": 1 });

        let strip: Schema = shape.clone().strip().into();
        assert_eq!(json!({ "a": "x" }), strip.safe_parse(&instance).unwrap());

        let allow: Schema = shape.clone().passthrough().into();
        assert_eq!(instance, allow.safe_parse(&instance).unwrap());

        let reject: Schema = shape.strict().into();
        let err = reject.safe_parse(&instance).unwrap_err();
        assert_eq!(
            ViolationKind::UnknownField,
            err.errors().unwrap().violations()[0].kind
        );
        assert_eq!(vec![entry("extra", "unknown field")], entries(Err(err)));
    }

    #[test]
    fn extension_merges_fields() {
        let schema: Schema = object(vec![("a", Schema::from(string()))])
            .extend(vec![("b", number())])
            .into();
        assert_eq!(
            json!({ "a": "x", "b": 1 }),
            schema.validate(&json!({ "a": "x", "b": 1 })).unwrap()
        );

        let overridden: Schema = object(vec![("a", string())])
            .extend(vec![("a", number())])
            .into();
        assert!(overridden.validate(&json!({ "a": 1 })).is_ok());
        assert_eq!(
            vec![entry("a", "expected number")],
            entries(overridden.validate(&json!({ "a": "x" })))
        );
    }

    #[test]
    fn array_reports_elements_and_size() {
        let schema: Schema = array(number()).max_items(2).into();
        assert_eq!(
            vec![
                entry("[1]", "expected number"),
                entry("", "array size (3) is out of bounds: min: not specified, max: 2"),
            ],
            entries(schema.safe_parse(&json!([1, "x", 3])))
        );
    }

    #[test]
    fn nested_paths() {
        let fleet: Schema = array(object(vec![(
            "vehicle",
            object(vec![
                ("type", crate::enum_of(vec!["car", "bus"])),
                ("seats", Schema::from(number().int().min(1.0))),
            ]),
        )]))
        .into();

        assert_eq!(
            vec![
                entry("[1].vehicle.type", "expected one of [\"car\",\"bus\"]"),
                entry("[1].vehicle.seats", "expected integer"),
            ],
            entries(fleet.safe_parse(&json!([
                { "vehicle": { "type": "car", "seats": 4 } },
                { "vehicle": { "type": "boat", "seats": 2.5 } },
            ])))
        );
    }

    #[test]
    fn optional_default_and_nullable() {
        let schema: Schema = object(vec![
            ("nickname", optional(string())),
            ("seats", with_default(number(), json!(4))),
            ("note", with_default(string(), json!(5))),
            ("owner", nullable(string())),
        ])
        .into();

        assert_eq!(
            json!({ "seats": 4, "note": 5, "owner": null }),
            schema.safe_parse(&json!({ "owner": null })).unwrap()
        );
        assert_eq!(
            vec![
                entry("nickname", "expected string"),
                entry("seats", "expected number"),
                entry("owner", "missing field"),
            ],
            entries(schema.safe_parse(&json!({ "nickname": null, "seats": "4" })))
        );
    }

    #[test]
    fn required_any_field_must_be_present() {
        let schema: Schema = object(vec![("a", any())]).into();
        assert_eq!(
            vec![entry("a", "missing field")],
            entries(schema.safe_parse(&json!({})))
        );
        assert_eq!(
            json!({ "a": null }),
            schema.safe_parse(&json!({ "a": null })).unwrap()
        );

        let schema: Schema = object(vec![("a", optional(any()))]).into();
        assert_eq!(json!({}), schema.safe_parse(&json!({})).unwrap());
    }

    #[test]
    fn literal_and_primitives() {
        assert!(literal("car").validate(&json!("car")).is_ok());
        assert_eq!(
            vec![entry("", "expected one of [\"car\"]")],
            entries(literal("car").validate(&json!("bus")))
        );
        assert!(boolean().validate(&json!(true)).is_ok());
        assert!(null().validate(&json!(null)).is_ok());
        assert_eq!(vec![entry("", "expected null")], entries(null().validate(&json!(0))));
        assert_eq!(
            vec![entry("", "number (0) is out of bounds: min: 0, max: not specified")],
            entries(Schema::from(number().positive()).validate(&json!(0)))
        );
    }

    #[test]
    fn union_returns_first_match() {
        let schema = union(vec![
            transform(string(), |v| {
                Ok(Value::String(v.as_str().unwrap_or_default().to_uppercase()))
            }),
            string().into(),
        ]);
        assert_eq!(json!("ABC"), schema.safe_parse(&json!("abc")).unwrap());
    }

    #[test]
    fn union_reports_closest_alternative() {
        let schema = union(vec![
            object(vec![("a", string()), ("b", string())]),
            object(vec![("a", number())]),
        ]);

        assert_eq!(
            vec![entry("a", "expected number")],
            entries(schema.safe_parse(&json!({ "a": true })))
        );

        // Ties go to the first alternative.
        assert_eq!(
            vec![entry("b", "missing field")],
            entries(schema.safe_parse(&json!({ "a": "x" })))
        );
    }

    #[test]
    fn intersection_merges_outputs() {
        let schema = intersection(vec![
            object(vec![("a", Schema::from(string()))]),
            object(vec![("b", Schema::from(number()))]),
        ]);

        assert_eq!(
            json!({ "a": "x", "b": 1 }),
            schema.safe_parse(&json!({ "a": "x", "b": 1, "z": 0 })).unwrap()
        );
        assert_eq!(
            vec![entry("a", "expected string"), entry("b", "expected number")],
            entries(schema.safe_parse(&json!({ "a": 1, "b": "y" })))
        );
    }

    #[test]
    fn intersection_right_most_wins() {
        let upper = transform(string(), |v| {
            Ok(Value::String(v.as_str().unwrap_or_default().to_uppercase()))
        });
        let schema = intersection(vec![
            object(vec![("a", upper.clone())]),
            object(vec![("a", Schema::from(string()))]),
        ]);
        assert_eq!(json!({ "a": "x" }), schema.safe_parse(&json!({ "a": "x" })).unwrap());

        let schema = intersection(vec![
            object(vec![("a", Schema::from(string()))]),
            object(vec![("a", upper)]),
        ]);
        assert_eq!(json!({ "a": "X" }), schema.safe_parse(&json!({ "a": "x" })).unwrap());
    }

    #[test]
    fn duplicate_violations_are_merged() {
        let schema = intersection(vec![
            object(vec![("a", string())]),
            object(vec![("a", string())]),
        ]);
        assert_eq!(
            vec![entry("a", "expected string")],
            entries(schema.safe_parse(&json!({ "a": 1 })))
        );
    }

    #[test]
    fn refinements_run_in_attachment_order() {
        let schema = refine(string(), |v| v.as_str().map_or(false, |s| s.len() > 3), "too short")
            .refine(|v| v.as_str().map_or(false, |s| s.starts_with('a')), "must start with a");

        assert_eq!(
            vec![entry("", "too short"), entry("", "must start with a")],
            entries(schema.safe_parse(&json!("b")))
        );
        assert_eq!(
            vec!["too short".to_owned(), "must start with a".to_owned()],
            schema.safe_parse(&json!("b")).unwrap_err().errors().unwrap().messages()
        );
    }

    static PREDICATE_CALLED: AtomicBool = AtomicBool::new(false);

    #[test]
    fn refinements_skip_structural_failures() {
        let schema = refine(
            number(),
            |_| {
                PREDICATE_CALLED.store(true, Ordering::SeqCst);
                true
            },
            "unreachable",
        );

        assert_eq!(
            vec![entry("", "expected number")],
            entries(schema.safe_parse(&json!("x")))
        );
        assert!(!PREDICATE_CALLED.load(Ordering::SeqCst));
    }

    #[test]
    fn refinement_sees_pre_transform_value() {
        let length = transform(string(), |v| {
            Ok(json!(v.as_str().map_or(0, |s| s.chars().count())))
        });
        let schema = refine(length.clone(), Value::is_string, "expected the raw string");
        assert_eq!(json!(3), schema.safe_parse(&json!("abc")).unwrap());

        // Piping refines the transformed value instead.
        let schema = pipe(length, refine(number(), |v| v.as_f64() == Some(3.0), "expected 3"));
        assert_eq!(json!(3), schema.safe_parse(&json!("abc")).unwrap());
        assert_eq!(
            vec![entry("", "expected 3")],
            entries(schema.safe_parse(&json!("abcd")))
        );
    }

    #[test]
    fn validate_skips_plain_transforms() {
        let schema = transform(string(), |v| {
            Ok(Value::String(v.as_str().unwrap_or_default().to_uppercase()))
        });
        assert_eq!(json!("abc"), validate(&schema, &json!("abc")).unwrap());
        assert_eq!(json!("ABC"), safe_parse(&schema, &json!("abc")).unwrap());
    }

    #[test]
    fn transform_failure_becomes_violation() {
        let schema: Schema = object(vec![(
            "n",
            transform(string(), |_| Err("boom".to_owned())),
        )])
        .into();

        let err = schema.safe_parse(&json!({ "n": "x" })).unwrap_err();
        assert_eq!(
            ViolationKind::TransformFailed {
                message: "boom".to_owned()
            },
            err.errors().unwrap().violations()[0].kind
        );
        assert_eq!(vec![entry("n", "boom")], entries(Err(err)));

        // Validation never runs the transform.
        assert!(schema.validate(&json!({ "n": "x" })).is_ok());
    }

    #[test]
    fn pipe_checks_coerced_value() {
        let schema = pipe(coerce::number(), number().max(10.0));
        assert_eq!(json!(7.0), schema.safe_parse(&json!("7")).unwrap());
        assert_eq!(
            vec![entry("", "number (12) is out of bounds: min: not specified, max: 10")],
            entries(schema.safe_parse(&json!("12")))
        );
    }

    #[test]
    fn pipe_keeps_absent_optional_value() {
        let schema: Schema = object(vec![("a", pipe(optional(string()), number()))]).into();
        assert_eq!(json!({}), schema.safe_parse(&json!({})).unwrap());
        assert_eq!(
            vec![entry("a", "expected number")],
            entries(schema.safe_parse(&json!({ "a": "x" })))
        );
    }

    #[test]
    fn panicking_transform_becomes_violation() {
        let schema: Schema = object(vec![(
            "n",
            transform(string(), |_| panic!("boom")),
        )])
        .into();

        assert_eq!(
            vec![entry("n", "transform panicked: boom")],
            entries(schema.safe_parse(&json!({ "n": "x" })))
        );
    }

    #[test]
    fn object_level_refinement() {
        let form = Schema::from(person().extend(vec![("repeatPassword", string())])).refine(
            |v| v["password"] == v["repeatPassword"],
            "repeat password does not match",
        );

        let matching = json!({
            "name": "Some name",
            "password": "12345",
            "repeatPassword": "12345",
        });
        assert!(form.safe_parse(&matching).is_ok());
        assert_eq!(
            "repeat password does not match",
            parse(
                &form,
                &json!({ "name": "Some name", "password": "12345", "repeatPassword": "54321" })
            )
            .unwrap_err()
            .message()
        );
    }

    #[test]
    fn parse_joins_messages() {
        let schema: Schema = person().into();
        let err = schema.parse(&json!({ "name": 1 })).unwrap_err();
        assert_eq!(
            "Invalid value \"1\" supplied to \"name\"; Invalid value \"undefined\" supplied to \"password\"",
            err.to_string()
        );
    }

    #[test]
    fn safe_parse_is_idempotent() {
        let schema: Schema = person()
            .extend(vec![("dob", coerce::timestamp())])
            .into();
        let instance = json!({
            "name": "Some name",
            "dob": "1990-05-01",
            "sex": "M",
            "password": "12345",
            "extraField": "something",
        });

        let once = schema.safe_parse(&instance).unwrap();
        assert_eq!(
            json!({
                "name": "Some name",
                "sex": "M",
                "password": "12345",
                "dob": "1990-05-01T00:00:00Z",
            }),
            once
        );
        assert_eq!(once, schema.safe_parse(&once).unwrap());
    }

    static ATTRIBUTES: Lazy<Schema> = Lazy::new(|| {
        lazy(|| {
            let single = union(vec![
                Schema::from(string()),
                number().into(),
                boolean(),
                null(),
                ATTRIBUTES.clone(),
            ]);
            record(union(vec![single.clone(), array(single).into()]))
        })
    });

    #[test]
    fn recursive_schema() {
        let instance = json!({
            "a": "x",
            "b": { "c": [1, true, { "d": null }] },
        });
        assert_eq!(instance, ATTRIBUTES.safe_parse(&instance).unwrap());
        assert!(ATTRIBUTES.safe_parse(&json!({ "a": { "b": [[1]] } })).is_err());
    }

    #[test]
    fn max_depth() {
        let decoder = Decoder::new(DecodeOptions::new().with_max_depth(8));
        let deep = json!({ "a": { "a": { "a": { "a": { "a": "x" } } } } });

        assert_eq!(
            Err(Error::MaxDepthExceeded),
            decoder.safe_parse(&ATTRIBUTES, &deep)
        );
        assert!(Decoder::default().safe_parse(&ATTRIBUTES, &deep).is_ok());
    }

    #[test]
    fn max_errors() {
        let schema: Schema = array(string()).into();
        let decoder = Decoder::new(DecodeOptions::new().with_max_errors(3));
        let err = decoder
            .validate(&schema, &json!([null, null, null, null, null]))
            .unwrap_err();
        assert_eq!(3, err.errors().unwrap().len());
    }

    static SELF_REFERENCE: Lazy<Schema> = Lazy::new(|| lazy(|| SELF_REFERENCE.clone()));

    static LEFT_RECURSIVE: Lazy<Schema> =
        Lazy::new(|| lazy(|| union(vec![LEFT_RECURSIVE.clone(), string().into()])));

    #[test]
    fn lazy_cycles_fail_fast() {
        assert_eq!(
            Err(Error::LazyCycle),
            SELF_REFERENCE.validate(&json!("x"))
        );
        assert_eq!(
            Err(Error::LazyCycle),
            LEFT_RECURSIVE.validate(&json!("x"))
        );
    }

    #[test]
    fn concurrent_decodes_share_schema() {
        let schema: Schema = person().into();
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let schema = schema.clone();
                std::thread::spawn(move || {
                    let name = if i % 2 == 0 { "Some name" } else { "Jo" };
                    schema
                        .safe_parse(&json!({ "name": name, "password": "12345" }))
                        .is_ok()
                })
            })
            .collect();

        let results: Vec<bool> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(vec![true, false, true, false], results);
    }
}
