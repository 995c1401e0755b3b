//! Tool parameter schemas.
//!
//! Clients declare tool parameters as JSON Schema. [`translate`] turns that
//! tree into a [`ValidationSchema`], which is both rendered back out for the
//! model provider ([`ValidationSchema::to_json_schema`]) and used to check the
//! arguments of tool calls replayed in a conversation ([`ValidationSchema::validate`]).

use std::fmt;

use indexmap::IndexMap;
use regex::Regex;
use serde::{Serialize, Serializer};
use serde_json::{Map, Number, Value, json};

/// Executable schema for one node of a tool parameter tree.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationSchema {
    pub kind: SchemaKind,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SchemaKind {
    /// Accepts every value.
    Any,
    String {
        min_length: Option<u64>,
        max_length: Option<u64>,
        pattern: Option<Pattern>,
    },
    Number {
        minimum: Option<Number>,
        maximum: Option<Number>,
        integer: bool,
    },
    Boolean,
    Null,
    /// Exactly one allowed value.
    Literal(Value),
    /// A closed set of strings.
    StringSet(Vec<String>),
    Union(Vec<ValidationSchema>),
    Array {
        items: Box<ValidationSchema>,
        min_items: Option<u64>,
        max_items: Option<u64>,
    },
    /// Always carries a property map, possibly empty.
    Object {
        properties: IndexMap<String, PropertySchema>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PropertySchema {
    pub schema: ValidationSchema,
    pub optional: bool,
}

/// A compiled `pattern` constraint.
#[derive(Debug, Clone)]
pub struct Pattern(Regex);

impl Pattern {
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

/// A value that does not satisfy a [`ValidationSchema`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{path}: {reason}")]
pub struct SchemaViolation {
    /// JSON-pointer-like location of the offending value, `/` for the root.
    pub path: String,
    pub reason: String,
}

/// Translates a JSON-Schema-like description into a [`ValidationSchema`].
///
/// Never fails: anything that cannot be understood becomes an accept-anything
/// node.
pub fn translate(schema: &Value) -> ValidationSchema {
    let Some(object) = schema.as_object() else {
        return ValidationSchema::any();
    };

    let description = object.get("description").and_then(Value::as_str).map(str::to_string);

    ValidationSchema {
        kind: translate_kind(object),
        description,
    }
}

fn translate_kind(object: &Map<String, Value>) -> SchemaKind {
    if let Some(members) = object.get("enum").and_then(Value::as_array).filter(|m| !m.is_empty()) {
        return enum_kind(members);
    }

    match object.get("type") {
        Some(Value::Array(types)) => {
            let mut variants: Vec<ValidationSchema> = types
                .iter()
                .filter(|ty| ty.is_string())
                .map(|ty| {
                    let mut single = object.clone();
                    single.remove("enum");
                    single.remove("description");
                    single.insert("type".to_string(), ty.clone());

                    translate(&Value::Object(single))
                })
                .collect();

            match variants.len() {
                0 => SchemaKind::Any,
                1 => variants.remove(0).kind,
                _ => SchemaKind::Union(variants),
            }
        }
        Some(Value::String(ty)) => scalar_kind(ty, object),
        _ => SchemaKind::Any,
    }
}

fn enum_kind(members: &[Value]) -> SchemaKind {
    if let [single] = members {
        return SchemaKind::Literal(single.clone());
    }

    let strings: Option<Vec<String>> = members.iter().map(|m| m.as_str().map(str::to_string)).collect();

    match strings {
        Some(strings) => SchemaKind::StringSet(strings),
        None => SchemaKind::Union(
            members
                .iter()
                .map(|member| ValidationSchema::from(SchemaKind::Literal(member.clone())))
                .collect(),
        ),
    }
}

fn scalar_kind(ty: &str, object: &Map<String, Value>) -> SchemaKind {
    let unsigned = |key: &str| object.get(key).and_then(Value::as_u64);
    let number = |key: &str| match object.get(key) {
        Some(Value::Number(n)) => Some(n.clone()),
        _ => None,
    };

    match ty {
        "string" => SchemaKind::String {
            min_length: unsigned("minLength"),
            max_length: unsigned("maxLength"),
            pattern: object.get("pattern").and_then(Value::as_str).and_then(compile_pattern),
        },
        "number" | "integer" => SchemaKind::Number {
            minimum: number("minimum"),
            maximum: number("maximum"),
            integer: ty == "integer",
        },
        "boolean" => SchemaKind::Boolean,
        "null" => SchemaKind::Null,
        "array" => SchemaKind::Array {
            items: Box::new(object.get("items").map(translate).unwrap_or_else(ValidationSchema::any)),
            min_items: unsigned("minItems"),
            max_items: unsigned("maxItems"),
        },
        "object" => {
            let required: Vec<&str> = object
                .get("required")
                .and_then(Value::as_array)
                .map(|names| names.iter().filter_map(Value::as_str).collect())
                .unwrap_or_default();

            let properties = object
                .get("properties")
                .and_then(Value::as_object)
                .map(|properties| {
                    properties
                        .iter()
                        .map(|(name, schema)| {
                            let property = PropertySchema {
                                schema: translate(schema),
                                optional: !required.contains(&name.as_str()),
                            };

                            (name.clone(), property)
                        })
                        .collect()
                })
                .unwrap_or_default();

            SchemaKind::Object { properties }
        }
        _ => SchemaKind::Any,
    }
}

fn compile_pattern(pattern: &str) -> Option<Pattern> {
    match Regex::new(pattern) {
        Ok(regex) => Some(Pattern(regex)),
        Err(err) => {
            log::warn!("Dropping invalid schema pattern '{pattern}': {err}");
            None
        }
    }
}

impl From<SchemaKind> for ValidationSchema {
    fn from(kind: SchemaKind) -> Self {
        Self {
            kind,
            description: None,
        }
    }
}

impl ValidationSchema {
    pub fn any() -> Self {
        SchemaKind::Any.into()
    }

    /// An object schema without properties, used for argument-less tools.
    pub fn empty_object() -> Self {
        SchemaKind::Object {
            properties: IndexMap::new(),
        }
        .into()
    }

    /// Renders the schema as JSON Schema for outbound tool declarations.
    ///
    /// Every object node carries a `properties` object, even when empty.
    pub fn to_json_schema(&self) -> Value {
        let mut node = match &self.kind {
            SchemaKind::Any => Map::new(),
            SchemaKind::String {
                min_length,
                max_length,
                pattern,
            } => {
                let mut node = typed("string");
                insert_some(&mut node, "minLength", min_length.map(Value::from));
                insert_some(&mut node, "maxLength", max_length.map(Value::from));
                insert_some(&mut node, "pattern", pattern.as_ref().map(|p| Value::from(p.as_str())));
                node
            }
            SchemaKind::Number {
                minimum,
                maximum,
                integer,
            } => {
                let mut node = typed(if *integer { "integer" } else { "number" });
                insert_some(&mut node, "minimum", minimum.clone().map(Value::Number));
                insert_some(&mut node, "maximum", maximum.clone().map(Value::Number));
                node
            }
            SchemaKind::Boolean => typed("boolean"),
            SchemaKind::Null => typed("null"),
            SchemaKind::Literal(value) => {
                let mut node = typed(json_type(value));
                node.insert("enum".to_string(), json!([value]));
                node
            }
            SchemaKind::StringSet(values) => {
                let mut node = typed("string");
                node.insert("enum".to_string(), json!(values));
                node
            }
            SchemaKind::Union(variants) => {
                let variants = variants.iter().map(Self::to_json_schema).collect();

                let mut node = Map::new();
                node.insert("anyOf".to_string(), Value::Array(variants));
                node
            }
            SchemaKind::Array {
                items,
                min_items,
                max_items,
            } => {
                let mut node = typed("array");
                node.insert("items".to_string(), items.to_json_schema());
                insert_some(&mut node, "minItems", min_items.map(Value::from));
                insert_some(&mut node, "maxItems", max_items.map(Value::from));
                node
            }
            SchemaKind::Object { properties } => {
                let mut node = typed("object");

                let rendered = properties
                    .iter()
                    .map(|(name, property)| (name.clone(), property.schema.to_json_schema()))
                    .collect();

                node.insert("properties".to_string(), Value::Object(rendered));

                let required: Vec<&str> = properties
                    .iter()
                    .filter(|(_, property)| !property.optional)
                    .map(|(name, _)| name.as_str())
                    .collect();

                if !required.is_empty() {
                    node.insert("required".to_string(), json!(required));
                }

                node
            }
        };

        if let Some(description) = &self.description {
            node.insert("description".to_string(), Value::from(description.as_str()));
        }

        Value::Object(node)
    }

    /// Checks a value against the schema, reporting the first violation found.
    pub fn validate(&self, value: &Value) -> Result<(), SchemaViolation> {
        self.validate_at("/", value)
    }

    fn validate_at(&self, path: &str, value: &Value) -> Result<(), SchemaViolation> {
        let violation = |reason: String| {
            Err(SchemaViolation {
                path: path.to_string(),
                reason,
            })
        };

        match &self.kind {
            SchemaKind::Any => Ok(()),
            SchemaKind::String {
                min_length,
                max_length,
                pattern,
            } => {
                let Some(text) = value.as_str() else {
                    return violation(format!("expected string, got {}", json_type(value)));
                };

                let length = text.chars().count() as u64;

                if let Some(min) = min_length.filter(|min| length < *min) {
                    return violation(format!("string shorter than {min}"));
                }

                if let Some(max) = max_length.filter(|max| length > *max) {
                    return violation(format!("string longer than {max}"));
                }

                match pattern {
                    Some(pattern) if !pattern.0.is_match(text) => {
                        violation(format!("string does not match pattern '{}'", pattern.as_str()))
                    }
                    _ => Ok(()),
                }
            }
            SchemaKind::Number {
                minimum,
                maximum,
                integer,
            } => {
                let Some(number) = value.as_f64() else {
                    return violation(format!("expected number, got {}", json_type(value)));
                };

                if *integer && number.fract() != 0.0 {
                    return violation("expected integer".to_string());
                }

                if let Some(min) = minimum.as_ref().and_then(Number::as_f64).filter(|min| number < *min) {
                    return violation(format!("number below minimum {min}"));
                }

                if let Some(max) = maximum.as_ref().and_then(Number::as_f64).filter(|max| number > *max) {
                    return violation(format!("number above maximum {max}"));
                }

                Ok(())
            }
            SchemaKind::Boolean if value.is_boolean() => Ok(()),
            SchemaKind::Boolean => violation(format!("expected boolean, got {}", json_type(value))),
            SchemaKind::Null if value.is_null() => Ok(()),
            SchemaKind::Null => violation(format!("expected null, got {}", json_type(value))),
            SchemaKind::Literal(expected) if expected == value => Ok(()),
            SchemaKind::Literal(expected) => violation(format!("expected {expected}")),
            SchemaKind::StringSet(allowed) => match value.as_str() {
                Some(text) if allowed.iter().any(|a| a == text) => Ok(()),
                _ => violation(format!("expected one of {}", allowed.join(", "))),
            },
            SchemaKind::Union(variants) => {
                if variants.iter().any(|variant| variant.validate_at(path, value).is_ok()) {
                    Ok(())
                } else {
                    violation("value does not match any allowed schema".to_string())
                }
            }
            SchemaKind::Array {
                items,
                min_items,
                max_items,
            } => {
                let Some(elements) = value.as_array() else {
                    return violation(format!("expected array, got {}", json_type(value)));
                };

                let count = elements.len() as u64;

                if let Some(min) = min_items.filter(|min| count < *min) {
                    return violation(format!("fewer than {min} items"));
                }

                if let Some(max) = max_items.filter(|max| count > *max) {
                    return violation(format!("more than {max} items"));
                }

                elements
                    .iter()
                    .enumerate()
                    .try_for_each(|(i, element)| items.validate_at(&child_path(path, &i.to_string()), element))
            }
            SchemaKind::Object { properties } => {
                let Some(fields) = value.as_object() else {
                    return violation(format!("expected object, got {}", json_type(value)));
                };

                for (name, property) in properties {
                    let path = child_path(path, name);

                    match fields.get(name) {
                        Some(field) => property.schema.validate_at(&path, field)?,
                        None if property.optional => (),
                        None => {
                            return Err(SchemaViolation {
                                path,
                                reason: "missing required property".to_string(),
                            });
                        }
                    }
                }

                Ok(())
            }
        }
    }
}

impl Serialize for ValidationSchema {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.to_json_schema().serialize(serializer)
    }
}

impl fmt::Display for ValidationSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json_schema())
    }
}

fn typed(ty: &str) -> Map<String, Value> {
    let mut node = Map::new();
    node.insert("type".to_string(), Value::from(ty));
    node
}

fn insert_some(node: &mut Map<String, Value>, key: &str, value: Option<Value>) {
    if let Some(value) = value {
        node.insert(key.to_string(), value);
    }
}

fn child_path(parent: &str, segment: &str) -> String {
    if parent == "/" {
        format!("/{segment}")
    } else {
        format!("{parent}/{segment}")
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
