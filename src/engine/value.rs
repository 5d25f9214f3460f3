//! Schema values and the JSON schema notation
//!
//! Schemas are written as JSON documents:
//!
//! ```json
//! {
//!   "x-package": "model",
//!   "x-version": "0.2.0",
//!   "kind": "TimeSeriesChart",
//!   "spec": {
//!     "legend?": { "position": { "$oneOf": ["bottom", "right"] } },
//!     "unit": { "$type": "string", "$default": "decimal" },
//!     "thresholds": { "$listOf": { "value": { "$type": "float" } } }
//!   }
//! }
//! ```
//!
//! - scalars and `null` are concrete values
//! - `{"$type": ..}` is a typed, incomplete value (`$pattern`, `$default`)
//! - objects are closed structs unless `"$open": true`
//! - `name?` marks an optional field, `#name` a definition (never marshalled)
//! - `$oneOf`, `$allOf`, `$listOf`, `$ref` and `$if`/`$then`/`$else` compose values
//! - root-level `x-` keys are annotations; the root struct itself is open

use std::fmt;

use regex::Regex;

use super::{Scalar, ScalarKind};

/// A schema value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Unconstrained (`{"$type": "any"}`)
    Top,
    Null,
    Scalar(Scalar),
    Kind(KindConstraint),
    Struct(StructValue),
    List(ListValue),
    Disjunction(Vec<Value>),
    /// Unification deferred until references can be resolved
    Conjunction(Vec<Value>),
    Ref(String),
    Cond(Box<Conditional>),
    /// Result of a conditional without an else branch
    Absent,
}

/// A scalar type with optional constraints
#[derive(Debug, Clone, PartialEq)]
pub struct KindConstraint {
    pub kind: ScalarKind,
    pub patterns: Vec<String>,
    pub default: Option<Scalar>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub value: Value,
    pub optional: bool,
}

impl Field {
    pub fn is_definition(&self) -> bool {
        self.name.starts_with('#')
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct StructValue {
    pub fields: Vec<Field>,
    pub open: bool,
    /// Conditional field groups embedded in this struct
    pub conditionals: Vec<Conditional>,
}

impl StructValue {
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_mut(&mut self, name: &str) -> Option<&mut Field> {
        self.fields.iter_mut().find(|f| f.name == name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ListValue {
    /// Concrete elements
    Items(Vec<Value>),
    /// Any number of elements, each unified with the element schema
    Of(Box<Value>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Conditional {
    pub path: String,
    pub is: Option<Value>,
    pub then: Value,
    pub otherwise: Option<Value>,
}

impl Value {
    /// True for values that need evaluation before they can be inspected
    pub(crate) fn is_deferred(&self) -> bool {
        matches!(self, Value::Ref(_) | Value::Cond(_) | Value::Conjunction(_))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Top => f.write_str("_"),
            Value::Null => f.write_str("null"),
            Value::Scalar(s) => write!(f, "{}", s),
            Value::Kind(k) => match &k.default {
                Some(d) => write!(f, "{} (default {})", k.kind, d),
                None => write!(f, "{}", k.kind),
            },
            Value::Struct(_) => f.write_str("{...}"),
            Value::List(_) => f.write_str("[...]"),
            Value::Disjunction(alts) => {
                let parts: Vec<String> = alts.iter().map(|a| a.to_string()).collect();
                f.write_str(&parts.join(" | "))
            }
            Value::Conjunction(parts) => {
                let parts: Vec<String> = parts.iter().map(|a| a.to_string()).collect();
                f.write_str(&parts.join(" & "))
            }
            Value::Ref(path) => f.write_str(path),
            Value::Cond(_) => f.write_str("<conditional>"),
            Value::Absent => f.write_str("<absent>"),
        }
    }
}

// =============================================================================
// Data Conversion
// =============================================================================

/// Convert plain JSON data. Objects become open structs of required fields.
pub fn from_data(data: &serde_json::Value) -> Value {
    match data {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Scalar(Scalar::Bool(*b)),
        serde_json::Value::Number(n) => Value::Scalar(number_scalar(n)),
        serde_json::Value::String(s) => Value::Scalar(Scalar::String(s.clone())),
        serde_json::Value::Array(items) => {
            Value::List(ListValue::Items(items.iter().map(from_data).collect()))
        }
        serde_json::Value::Object(map) => Value::Struct(StructValue {
            fields: map
                .iter()
                .map(|(name, value)| Field {
                    name: name.clone(),
                    value: from_data(value),
                    optional: false,
                })
                .collect(),
            open: true,
            conditionals: Vec::new(),
        }),
    }
}

fn number_scalar(n: &serde_json::Number) -> Scalar {
    match n.as_i64() {
        Some(i) => Scalar::Int(i),
        None => Scalar::Float(n.as_f64().unwrap_or_default()),
    }
}

// =============================================================================
// Notation Parsing
// =============================================================================

/// Annotations found on a document root
#[derive(Debug, Default)]
pub(crate) struct Annotations {
    pub package: Option<String>,
    pub version: Option<String>,
}

/// Parse a whole document: the root must be an object; `x-` keys are annotations.
pub(crate) fn parse_document(
    doc: &serde_json::Value,
) -> Result<(Value, Annotations), String> {
    let map = doc
        .as_object()
        .ok_or_else(|| "schema document must be an object".to_string())?;

    let mut annotations = Annotations::default();
    let mut body = serde_json::Map::new();
    for (key, value) in map {
        match key.as_str() {
            "x-package" => annotations.package = value.as_str().map(str::to_string),
            "x-version" => annotations.version = value.as_str().map(str::to_string),
            k if k.starts_with("x-") => {}
            _ => {
                body.insert(key.clone(), value.clone());
            }
        }
    }

    let mut value = parse_object(&body, "")?;
    // Roots stay open so that several files of one package unify.
    if let Value::Struct(root) = &mut value {
        root.open = true;
    }
    Ok((value, annotations))
}

fn parse_node(node: &serde_json::Value, path: &str) -> Result<Value, String> {
    match node {
        serde_json::Value::Object(map) => parse_object(map, path),
        serde_json::Value::Array(items) => {
            let parsed = items
                .iter()
                .enumerate()
                .map(|(i, item)| parse_node(item, &format!("{}[{}]", path, i)))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::List(ListValue::Items(parsed)))
        }
        other => Ok(from_data(other)),
    }
}

fn parse_object(
    map: &serde_json::Map<String, serde_json::Value>,
    path: &str,
) -> Result<Value, String> {
    if let Some(kind) = map.get("$type") {
        return parse_kind(kind, map, path);
    }
    if let Some(alternatives) = map.get("$oneOf") {
        only_key(map, "$oneOf", path)?;
        let alts = expect_array(alternatives, "$oneOf", path)?
            .iter()
            .map(|alt| parse_node(alt, path))
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(match alts.len() {
            1 => alts.into_iter().next().unwrap_or(Value::Top),
            _ => Value::Disjunction(alts),
        });
    }
    if let Some(parts) = map.get("$allOf") {
        only_key(map, "$allOf", path)?;
        let parts = expect_array(parts, "$allOf", path)?
            .iter()
            .map(|part| parse_node(part, path))
            .collect::<Result<Vec<_>, _>>()?;
        let mut folded = Value::Top;
        for part in &parts {
            folded = super::unify::unify(&folded, part, path).map_err(|e| e.to_string())?;
        }
        return Ok(folded);
    }
    if let Some(element) = map.get("$listOf") {
        only_key(map, "$listOf", path)?;
        return Ok(Value::List(ListValue::Of(Box::new(parse_node(element, path)?))));
    }
    if let Some(reference) = map.get("$ref") {
        only_key(map, "$ref", path)?;
        return parse_ref(reference, path).map(Value::Ref);
    }

    let mut fields = Vec::new();
    let mut open = false;
    let mut conditionals = Vec::new();

    for (key, node) in map {
        match key.as_str() {
            "$open" => {
                open = node
                    .as_bool()
                    .ok_or_else(|| format!("{}: $open must be a boolean", path))?;
            }
            "$if" => conditionals.push(parse_conditional(map, path)?),
            "$then" | "$else" => {}
            k if k.starts_with('$') => {
                return Err(format!("{}: unknown directive {}", path, k));
            }
            _ => {
                let (name, optional) = match key.strip_suffix('?') {
                    Some(name) => (name.to_string(), true),
                    None => (key.clone(), false),
                };
                let child_path = super::join_path(path, &name);
                fields.push(Field {
                    value: parse_node(node, &child_path)?,
                    name,
                    optional,
                });
            }
        }
    }

    if conditionals.is_empty() && (map.contains_key("$then") || map.contains_key("$else")) {
        return Err(format!("{}: $then/$else without $if", path));
    }

    Ok(Value::Struct(StructValue {
        fields,
        open,
        conditionals,
    }))
}

fn parse_kind(
    kind: &serde_json::Value,
    map: &serde_json::Map<String, serde_json::Value>,
    path: &str,
) -> Result<Value, String> {
    for key in map.keys() {
        if !matches!(key.as_str(), "$type" | "$pattern" | "$default") {
            return Err(format!("{}: unexpected key {} beside $type", path, key));
        }
    }

    let kind = match kind.as_str() {
        Some("any") => return Ok(Value::Top),
        Some("string") => ScalarKind::String,
        Some("bool") => ScalarKind::Bool,
        Some("int") => ScalarKind::Int,
        Some("float") | Some("number") => ScalarKind::Float,
        _ => return Err(format!("{}: unknown $type {}", path, kind)),
    };

    let mut patterns = Vec::new();
    if let Some(pattern) = map.get("$pattern") {
        let pattern = pattern
            .as_str()
            .ok_or_else(|| format!("{}: $pattern must be a string", path))?;
        Regex::new(pattern).map_err(|e| format!("{}: invalid $pattern: {}", path, e))?;
        patterns.push(pattern.to_string());
    }

    let default = match map.get("$default") {
        None => None,
        Some(d) => match from_data(d) {
            Value::Scalar(s) if scalar_fits(kind, &s) => Some(s),
            _ => return Err(format!("{}: $default does not match type {}", path, kind)),
        },
    };

    Ok(Value::Kind(KindConstraint {
        kind,
        patterns,
        default,
    }))
}

fn parse_conditional(
    map: &serde_json::Map<String, serde_json::Value>,
    path: &str,
) -> Result<Conditional, String> {
    let condition = map
        .get("$if")
        .and_then(|c| c.as_object())
        .ok_or_else(|| format!("{}: $if must be an object", path))?;
    let reference = condition
        .get("$ref")
        .ok_or_else(|| format!("{}: $if requires $ref", path))?;
    let then = map
        .get("$then")
        .ok_or_else(|| format!("{}: $if requires $then", path))?;

    Ok(Conditional {
        path: parse_ref(reference, path)?,
        is: condition.get("$is").map(|is| parse_node(is, path)).transpose()?,
        then: parse_node(then, path)?,
        otherwise: map.get("$else").map(|e| parse_node(e, path)).transpose()?,
    })
}

fn parse_ref(reference: &serde_json::Value, path: &str) -> Result<String, String> {
    match reference.as_str() {
        Some(r) if r.starts_with('#') && r.len() > 1 => Ok(r.to_string()),
        _ => Err(format!("{}: $ref must name a definition path like #def.field", path)),
    }
}

fn only_key(
    map: &serde_json::Map<String, serde_json::Value>,
    key: &str,
    path: &str,
) -> Result<(), String> {
    if map.len() == 1 {
        Ok(())
    } else {
        Err(format!("{}: {} cannot be combined with other keys", path, key))
    }
}

fn expect_array<'a>(
    node: &'a serde_json::Value,
    key: &str,
    path: &str,
) -> Result<&'a Vec<serde_json::Value>, String> {
    match node.as_array() {
        Some(items) if !items.is_empty() => Ok(items),
        _ => Err(format!("{}: {} must be a non-empty array", path, key)),
    }
}

/// Whether a concrete scalar satisfies a scalar type
pub(crate) fn scalar_fits(kind: ScalarKind, scalar: &Scalar) -> bool {
    match (kind, scalar) {
        (ScalarKind::String, Scalar::String(_)) => true,
        (ScalarKind::Bool, Scalar::Bool(_)) => true,
        (ScalarKind::Int, Scalar::Int(_)) => true,
        (ScalarKind::Int, Scalar::Float(f)) => f.fract() == 0.0,
        (ScalarKind::Float, Scalar::Int(_) | Scalar::Float(_)) => true,
        _ => false,
    }
}
