use crate::form::{Elements, ObjectShape, StringFormat, UnknownFields};
use crate::schema::{self, Schema};
use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

/// A JSON representation of the closure-free subset of schemas, compatible
/// with `serde_json`.
///
/// To convert this into a [`Schema`], see [`Schema::from_serde_schema`].
///
/// ```
/// use valshape::{Schema, SerdeSchema};
/// use serde_json::json;
///
/// let serde_schema: SerdeSchema = serde_json::from_value(json!({
///     "properties": {
///         "seats": { "type": "integer", "minimum": 1 }
///     }
/// }))
/// .unwrap();
///
/// let schema = Schema::from_serde_schema(serde_schema).unwrap();
/// assert!(schema.validate(&json!({ "seats": 4 })).is_ok());
/// assert!(schema.validate(&json!({ "seats": 0 })).is_err());
/// ```
#[derive(Clone, Serialize, Deserialize, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
#[serde(deny_unknown_fields)]
pub struct SerdeSchema {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BTreeMap<String, Value>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub enum_: Option<Vec<Value>>,

    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub const_: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<IndexMap<String, SerdeSchema>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub optional_properties: Option<IndexMap<String, SerdeSchema>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_properties: Option<UnknownFields>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub elements: Option<Box<SerdeSchema>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_items: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_items: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub values: Option<Box<SerdeSchema>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub any_of: Option<Vec<SerdeSchema>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub one_of: Option<Vec<SerdeSchema>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub all_of: Option<Vec<SerdeSchema>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub nullable: Option<bool>,

    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub default: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclusive_minimum: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
}

// Keeps an explicit `null` as `Some(Value::Null)`.
fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

#[derive(Clone, Debug, PartialEq, Error)]
pub enum SerdeConvertError {
    #[error("schema mixes forms: {0}")]
    InvalidForm(String),

    #[error("unknown type: {0}")]
    InvalidType(String),

    #[error("unknown format: {0}")]
    InvalidFormat(String),

    #[error("invalid pattern: {0}")]
    InvalidPattern(String),

    #[error("keyword {keyword} does not apply to {form}")]
    MisplacedKeyword { keyword: &'static str, form: String },

    #[error("minimum ({min}) is greater than maximum ({max})")]
    InvalidBounds { min: f64, max: f64 },

    #[error("property declared both required and optional: {0}")]
    DuplicateProperty(String),
}

impl SerdeSchema {
    fn forms(&self) -> Vec<&'static str> {
        let mut forms = vec![];
        if self.type_.is_some() {
            forms.push("type");
        }
        if self.enum_.is_some() {
            forms.push("enum");
        }
        if self.const_.is_some() {
            forms.push("const");
        }
        if self.properties.is_some() || self.optional_properties.is_some() {
            forms.push("properties");
        }
        if self.elements.is_some() {
            forms.push("elements");
        }
        if self.values.is_some() {
            forms.push("values");
        }
        if self.any_of.is_some() {
            forms.push("anyOf");
        }
        if self.one_of.is_some() {
            forms.push("oneOf");
        }
        if self.all_of.is_some() {
            forms.push("allOf");
        }
        forms
    }

    fn check_keywords(&self, form: &str) -> Result<(), SerdeConvertError> {
        let scoped = [
            ("minLength", self.min_length.is_some(), &["string"][..]),
            ("maxLength", self.max_length.is_some(), &["string"][..]),
            ("pattern", self.pattern.is_some(), &["string"][..]),
            ("format", self.format.is_some(), &["string"][..]),
            ("minimum", self.minimum.is_some(), &["number", "integer"][..]),
            ("exclusiveMinimum", self.exclusive_minimum.is_some(), &["number", "integer"][..]),
            ("maximum", self.maximum.is_some(), &["number", "integer"][..]),
            ("minItems", self.min_items.is_some(), &["elements"][..]),
            ("maxItems", self.max_items.is_some(), &["elements"][..]),
            ("additionalProperties", self.additional_properties.is_some(), &["properties"][..]),
        ];

        for &(keyword, present, forms) in scoped.iter() {
            if present && !forms.contains(&form) {
                return Err(SerdeConvertError::MisplacedKeyword {
                    keyword,
                    form: form.to_owned(),
                });
            }
        }

        Ok(())
    }
}

fn check_bounds(min: Option<f64>, max: Option<f64>) -> Result<(), SerdeConvertError> {
    match (min, max) {
        (Some(min), Some(max)) if min > max => Err(SerdeConvertError::InvalidBounds { min, max }),
        _ => Ok(()),
    }
}

fn convert_all(schemas: Vec<SerdeSchema>) -> Result<Vec<Schema>, SerdeConvertError> {
    schemas.into_iter().map(Schema::try_from).collect()
}

impl Schema {
    /// Builds a schema from its serde form, checking that the form is
    /// well-formed: one form keyword per schema, keywords only where they
    /// apply, known types and formats, compilable patterns, and consistent
    /// bounds.
    pub fn from_serde_schema(serde_schema: SerdeSchema) -> Result<Self, SerdeConvertError> {
        Self::try_from(serde_schema)
    }
}

impl TryFrom<SerdeSchema> for Schema {
    type Error = SerdeConvertError;

    fn try_from(mut s: SerdeSchema) -> Result<Self, Self::Error> {
        let forms = s.forms();
        if forms.len() > 1 {
            return Err(SerdeConvertError::InvalidForm(forms.join(", ")));
        }

        let form = match &s.type_ {
            Some(type_) => match type_.as_str() {
                "any" | "never" | "null" | "boolean" | "string" | "number" | "integer" => {
                    type_.clone()
                }
                _ => return Err(SerdeConvertError::InvalidType(type_.clone())),
            },
            None => forms.first().copied().unwrap_or("empty").to_owned(),
        };
        s.check_keywords(&form)?;

        let mut out = match form.as_str() {
            "empty" | "any" => schema::any(),
            "never" => schema::never(),
            "null" => schema::null(),
            "boolean" => schema::boolean(),
            "string" => {
                check_bounds(
                    s.min_length.map(|n| n as f64),
                    s.max_length.map(|n| n as f64),
                )?;

                let mut string = schema::string();
                string.min_len = s.min_length;
                string.max_len = s.max_length;
                if let Some(pattern) = &s.pattern {
                    let pattern = Regex::new(pattern)
                        .map_err(|err| SerdeConvertError::InvalidPattern(err.to_string()))?;
                    string = string.pattern(pattern);
                }
                if let Some(format) = &s.format {
                    string.format = Some(
                        format
                            .parse::<StringFormat>()
                            .map_err(|_| SerdeConvertError::InvalidFormat(format.clone()))?,
                    );
                }
                string.into()
            }
            "number" | "integer" => {
                check_bounds(s.minimum, s.maximum)?;
                check_bounds(s.exclusive_minimum, s.maximum)?;

                let mut number = schema::number();
                number.minimum = s.minimum;
                number.exclusive_minimum = s.exclusive_minimum;
                number.maximum = s.maximum;
                number.integer = form == "integer";
                number.into()
            }
            "enum" => schema::enum_of(s.enum_.take().unwrap_or_default()),
            "const" => schema::literal(s.const_.take().unwrap_or(Value::Null)),
            "properties" => {
                let mut shape =
                    ObjectShape::new().unknown_fields(s.additional_properties.unwrap_or_default());

                let required = s.properties.take().unwrap_or_default();
                let optional = s.optional_properties.take().unwrap_or_default();

                for (name, sub_schema) in required {
                    shape = shape.field(name, Schema::try_from(sub_schema)?);
                }

                for (name, sub_schema) in optional {
                    if shape.get(&name).is_some() {
                        return Err(SerdeConvertError::DuplicateProperty(name));
                    }

                    // A default already covers the absent case.
                    let has_default = sub_schema.default.is_some();
                    let sub_schema = Schema::try_from(sub_schema)?;
                    shape = shape.field(
                        name,
                        if has_default {
                            sub_schema
                        } else {
                            schema::optional(sub_schema)
                        },
                    );
                }

                shape.into()
            }
            "elements" => {
                check_bounds(s.min_items.map(|n| n as f64), s.max_items.map(|n| n as f64))?;

                let mut elements = match s.elements.take() {
                    Some(sub_schema) => Elements::new(Schema::try_from(*sub_schema)?),
                    None => Elements::new(schema::any()),
                };
                elements.min_items = s.min_items;
                elements.max_items = s.max_items;
                elements.into()
            }
            "values" => match s.values.take() {
                Some(sub_schema) => schema::record(Schema::try_from(*sub_schema)?),
                None => schema::record(schema::any()),
            },
            "anyOf" => schema::union(convert_all(s.any_of.take().unwrap_or_default())?),
            "oneOf" => schema::one_of(convert_all(s.one_of.take().unwrap_or_default())?),
            "allOf" => schema::intersection(convert_all(s.all_of.take().unwrap_or_default())?),
            _ => return Err(SerdeConvertError::InvalidType(form.clone())),
        };

        if s.nullable == Some(true) {
            out = schema::nullable(out);
        }

        if let Some(fallback) = s.default.take() {
            out = schema::with_default(out, fallback);
        }

        Ok(out)
    }
}
