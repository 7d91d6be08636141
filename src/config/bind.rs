//! Binding the resolved tree into a typed configuration and validating it.
//!
//! [`Node`] is a serde [`Deserializer`]. Scalars are converted leniently:
//! strings bind into boolean and numeric fields when they parse, and numbers
//! and booleans bind into string fields by their text. This lets overrides,
//! which are always strings, set typed fields.

use std::fmt;

use serde::de::value::{MapAccessDeserializer, MapDeserializer, SeqDeserializer, StringDeserializer};
use serde::de::{
    self, DeserializeOwned, DeserializeSeed, Deserializer, Expected, IntoDeserializer, MapAccess,
    Unexpected, Visitor,
};
use serde::forward_to_deserialize_any;
use thiserror::Error;
use validator::{Validate, ValidationError, ValidationErrors, ValidationErrorsKind};

use super::error::{ConfigError, ErrorKind};
use super::tree::{Map, Node, Scalar};

/// A failure raised while deserializing a [`Node`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindError {
    #[error("unknown field `{field}`, expected one of: {}", .expected.join(", "))]
    UnknownField { field: String, expected: Vec<String> },

    #[error("invalid type: {found}, expected {expected}")]
    InvalidType {
        found: String,
        found_type: &'static str,
        expected: String,
    },

    #[error("invalid value: {found}, expected {expected}")]
    InvalidValue {
        found: String,
        found_type: &'static str,
        expected: String,
    },

    #[error("{0}")]
    Custom(String),
}

impl de::Error for BindError {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        BindError::Custom(msg.to_string())
    }

    fn invalid_type(unexp: Unexpected<'_>, exp: &dyn Expected) -> Self {
        BindError::InvalidType {
            found: unexp.to_string(),
            found_type: type_name(&unexp),
            expected: exp.to_string(),
        }
    }

    fn invalid_value(unexp: Unexpected<'_>, exp: &dyn Expected) -> Self {
        BindError::InvalidValue {
            found: unexp.to_string(),
            found_type: type_name(&unexp),
            expected: exp.to_string(),
        }
    }

    fn unknown_field(field: &str, expected: &'static [&'static str]) -> Self {
        BindError::UnknownField {
            field: field.to_string(),
            expected: expected.iter().map(|s| s.to_string()).collect(),
        }
    }
}

fn type_name(unexp: &Unexpected<'_>) -> &'static str {
    match unexp {
        Unexpected::Bool(_) => "boolean",
        Unexpected::Unsigned(_) | Unexpected::Signed(_) => "integer",
        Unexpected::Float(_) => "float",
        Unexpected::Char(_) => "char",
        Unexpected::Str(_) => "string",
        Unexpected::Bytes(_) => "bytes",
        Unexpected::Unit => "null",
        Unexpected::Seq => "sequence",
        Unexpected::Map => "map",
        _ => "value",
    }
}

/// Deserializes `tree` into `T`, mapping failures to their error kinds.
pub fn bind<T: DeserializeOwned>(tree: Node, origin: &str) -> Result<T, ConfigError> {
    serde_path_to_error::deserialize(tree).map_err(|err| {
        let path = err.path().to_string();
        let path = if path == "." { String::new() } else { path };

        let inner = err.into_inner();

        let builder = match &inner {
            BindError::UnknownField { field, expected } => {
                ConfigError::builder(ErrorKind::UnrecognizedProperty, "Unrecognized field")
                    .suggestions(expected.iter().cloned())
                    .suggestion_base(field.as_str())
            }
            BindError::InvalidType {
                found_type,
                expected,
                ..
            }
            | BindError::InvalidValue {
                found_type,
                expected,
                ..
            } => ConfigError::builder(ErrorKind::TypeMismatch, "Incorrect type of value")
                .detail(format!("is of type: {found_type}, expected: {expected}")),
            BindError::Custom(message) => {
                ConfigError::builder(ErrorKind::MalformedBinding, "Failed to parse configuration")
                    .detail(message.as_str())
            }
        };

        builder.field_path(path).cause(inner).build(origin)
    })
}

/// Runs every declarative constraint on `config`, reporting all failures.
pub fn validate<T: Validate>(config: &T, origin: &str) -> Result<(), ConfigError> {
    config.validate().map_err(|errors| {
        let mut violations = Vec::new();
        collect_violations("", &errors, &mut violations);
        violations.sort();

        ConfigError::builder(ErrorKind::ConstraintViolation, "Constraint violations")
            .violations(violations)
            .cause(errors)
            .build(origin)
    })
}

fn collect_violations(prefix: &str, errors: &ValidationErrors, out: &mut Vec<String>) {
    for (field, kind) in errors.errors() {
        let path = if prefix.is_empty() {
            field.to_string()
        } else {
            format!("{prefix}.{field}")
        };
        match kind {
            ValidationErrorsKind::Field(failures) => {
                out.extend(failures.iter().map(|f| format!("{path} {}", describe(f))));
            }
            ValidationErrorsKind::Struct(nested) => collect_violations(&path, nested, out),
            ValidationErrorsKind::List(items) => {
                for (index, nested) in items {
                    collect_violations(&format!("{path}[{index}]"), nested, out);
                }
            }
        }
    }
}

fn describe(failure: &ValidationError) -> String {
    match &failure.message {
        Some(message) => message.to_string(),
        None => format!("failed `{}` validation", failure.code),
    }
}

impl Node {
    fn unexpected(&self) -> Unexpected<'_> {
        match self {
            Node::Object(_) => Unexpected::Map,
            Node::Array(_) => Unexpected::Seq,
            Node::Scalar(Scalar::Null) => Unexpected::Unit,
            Node::Scalar(Scalar::Bool(b)) => Unexpected::Bool(*b),
            Node::Scalar(Scalar::Integer(i)) => Unexpected::Signed(*i),
            Node::Scalar(Scalar::Float(f)) => Unexpected::Float(*f),
            Node::Scalar(Scalar::String(s)) => Unexpected::Str(s),
        }
    }
}

fn visit_object<'de, V: Visitor<'de>>(map: Map, visitor: V) -> Result<V::Value, BindError> {
    let mut access = MapDeserializer::new(map.into_iter());
    let value = visitor.visit_map(&mut access)?;
    access.end()?;
    Ok(value)
}

fn visit_array<'de, V: Visitor<'de>>(items: Vec<Node>, visitor: V) -> Result<V::Value, BindError> {
    let mut access = SeqDeserializer::new(items.into_iter());
    let value = visitor.visit_seq(&mut access)?;
    access.end()?;
    Ok(value)
}

/// Object access for struct targets.
///
/// A key that names none of the struct's fields fails as soon as its value is
/// requested, after the key itself has been read, so the failing key is part
/// of the reported field path.
struct StructAccess {
    entries: std::collections::btree_map::IntoIter<String, Node>,
    fields: &'static [&'static str],
    value: Option<Node>,
    unknown: Option<String>,
}

impl<'de> MapAccess<'de> for StructAccess {
    type Error = BindError;

    fn next_key_seed<K: DeserializeSeed<'de>>(
        &mut self,
        seed: K,
    ) -> Result<Option<K::Value>, BindError> {
        let Some((key, value)) = self.entries.next() else {
            return Ok(None);
        };
        if !self.fields.iter().any(|field| *field == key.as_str()) {
            self.unknown = Some(key.clone());
        }
        self.value = Some(value);

        let key: StringDeserializer<BindError> = key.into_deserializer();
        seed.deserialize(key).map(Some)
    }

    fn next_value_seed<V: DeserializeSeed<'de>>(&mut self, seed: V) -> Result<V::Value, BindError> {
        if let Some(field) = self.unknown.take() {
            return Err(de::Error::unknown_field(&field, self.fields));
        }
        match self.value.take() {
            Some(value) => seed.deserialize(value),
            None => Err(de::Error::custom("value requested before its key")),
        }
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.entries.len())
    }
}

macro_rules! deserialize_parsed {
    ($($method:ident => $visit:ident($ty:ty)),* $(,)?) => {$(
        fn $method<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, BindError> {
            if let Some(n) = self.as_str().and_then(|s| s.trim().parse::<$ty>().ok()) {
                return visitor.$visit(n);
            }
            self.deserialize_any(visitor)
        }
    )*};
}

impl<'de> Deserializer<'de> for Node {
    type Error = BindError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, BindError> {
        match self {
            Node::Object(map) => visit_object(map, visitor),
            Node::Array(items) => visit_array(items, visitor),
            Node::Scalar(Scalar::Null) => visitor.visit_unit(),
            Node::Scalar(Scalar::Bool(b)) => visitor.visit_bool(b),
            Node::Scalar(Scalar::Integer(i)) => visitor.visit_i64(i),
            Node::Scalar(Scalar::Float(f)) => visitor.visit_f64(f),
            Node::Scalar(Scalar::String(s)) => visitor.visit_string(s),
        }
    }

    fn deserialize_bool<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, BindError> {
        let parsed = self.as_str().and_then(|s| match s.trim() {
            s if s.eq_ignore_ascii_case("true") => Some(true),
            s if s.eq_ignore_ascii_case("false") => Some(false),
            _ => None,
        });
        match parsed {
            Some(b) => visitor.visit_bool(b),
            None => self.deserialize_any(visitor),
        }
    }

    deserialize_parsed! {
        deserialize_i8 => visit_i8(i8),
        deserialize_i16 => visit_i16(i16),
        deserialize_i32 => visit_i32(i32),
        deserialize_i64 => visit_i64(i64),
        deserialize_u8 => visit_u8(u8),
        deserialize_u16 => visit_u16(u16),
        deserialize_u32 => visit_u32(u32),
        deserialize_u64 => visit_u64(u64),
        deserialize_f32 => visit_f32(f32),
        deserialize_f64 => visit_f64(f64),
    }

    fn deserialize_str<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, BindError> {
        self.deserialize_string(visitor)
    }

    fn deserialize_string<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, BindError> {
        match self {
            Node::Scalar(scalar @ (Scalar::Bool(_) | Scalar::Integer(_) | Scalar::Float(_))) => {
                visitor.visit_string(scalar.to_string())
            }
            other => other.deserialize_any(visitor),
        }
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, BindError> {
        match self {
            Node::Scalar(Scalar::Null) => visitor.visit_none(),
            other => visitor.visit_some(other),
        }
    }

    fn deserialize_unit<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, BindError> {
        match self {
            Node::Scalar(Scalar::Null) => visitor.visit_unit(),
            other => Err(de::Error::invalid_type(other.unexpected(), &visitor)),
        }
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, BindError> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, BindError> {
        match self {
            Node::Object(map) => visitor.visit_map(StructAccess {
                entries: map.into_iter(),
                fields,
                value: None,
                unknown: None,
            }),
            other => other.deserialize_any(visitor),
        }
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, BindError> {
        match self {
            Node::Scalar(Scalar::String(variant)) => {
                let access: StringDeserializer<BindError> = variant.into_deserializer();
                visitor.visit_enum(access)
            }
            Node::Object(map) if map.len() == 1 => {
                visitor.visit_enum(MapAccessDeserializer::new(MapDeserializer::new(map.into_iter())))
            }
            other => Err(de::Error::invalid_type(other.unexpected(), &visitor)),
        }
    }

    forward_to_deserialize_any! {
        i128 u128 char bytes byte_buf unit_struct seq tuple
        tuple_struct map identifier ignored_any
    }
}

impl<'de> IntoDeserializer<'de, BindError> for Node {
    type Deserializer = Node;

    fn into_deserializer(self) -> Self::Deserializer {
        self
    }
}
