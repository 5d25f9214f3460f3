//! Structural unification

use regex::Regex;

use super::value::{scalar_fits, Field, KindConstraint, ListValue, StructValue, Value};
use super::{join_path, EngineError, Scalar, ScalarKind};

/// Unify two values. References and conditionals are deferred into a
/// conjunction and resolved during evaluation.
pub(crate) fn unify(a: &Value, b: &Value, path: &str) -> Result<Value, EngineError> {
    match (a, b) {
        (Value::Top | Value::Absent, other) | (other, Value::Top | Value::Absent) => {
            Ok(other.clone())
        }
        (x, y) if x.is_deferred() || y.is_deferred() => {
            let mut parts = Vec::new();
            flatten_conjunction(x, &mut parts);
            flatten_conjunction(y, &mut parts);
            Ok(Value::Conjunction(parts))
        }
        (Value::Disjunction(alts), other) | (other, Value::Disjunction(alts)) => {
            unify_disjunction(alts, other, path)
        }
        (Value::Null, Value::Null) => Ok(Value::Null),
        (Value::Scalar(x), Value::Scalar(y)) => {
            if scalar_eq(x, y) {
                Ok(Value::Scalar(prefer_int(x, y)))
            } else {
                Err(conflict(path, a, b))
            }
        }
        (Value::Kind(x), Value::Kind(y)) => meet_kinds(x, y, path).map(Value::Kind),
        (Value::Kind(k), Value::Scalar(s)) | (Value::Scalar(s), Value::Kind(k)) => {
            check_scalar(k, s, path).map(Value::Scalar)
        }
        (Value::Struct(x), Value::Struct(y)) => unify_structs(x, y, path).map(Value::Struct),
        (Value::List(x), Value::List(y)) => unify_lists(x, y, path).map(Value::List),
        _ => Err(conflict(path, a, b)),
    }
}

fn flatten_conjunction(value: &Value, parts: &mut Vec<Value>) {
    match value {
        Value::Conjunction(inner) => parts.extend(inner.iter().cloned()),
        other => parts.push(other.clone()),
    }
}

fn conflict(path: &str, a: &Value, b: &Value) -> EngineError {
    EngineError::Conflict {
        path: path.to_string(),
        left: a.to_string(),
        right: b.to_string(),
    }
}

fn unify_disjunction(alts: &[Value], other: &Value, path: &str) -> Result<Value, EngineError> {
    let mut matched: Vec<Value> = Vec::new();
    let mut errors = Vec::new();

    for alt in alts {
        match unify(alt, other, path) {
            Ok(Value::Disjunction(nested)) => {
                for v in nested {
                    if !matched.contains(&v) {
                        matched.push(v);
                    }
                }
            }
            Ok(v) => {
                if !matched.contains(&v) {
                    matched.push(v);
                }
            }
            Err(e) => errors.push(e),
        }
    }

    match matched.len() {
        0 if errors.len() == 1 => Err(errors.remove(0)),
        0 => Err(EngineError::NoMatch {
            path: path.to_string(),
            reason: errors
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("; "),
        }),
        1 => Ok(matched.remove(0)),
        _ => Ok(Value::Disjunction(matched)),
    }
}

pub(crate) fn scalar_eq(a: &Scalar, b: &Scalar) -> bool {
    match (a, b) {
        (Scalar::Int(x), Scalar::Float(y)) | (Scalar::Float(y), Scalar::Int(x)) => *x as f64 == *y,
        _ => a == b,
    }
}

fn prefer_int(a: &Scalar, b: &Scalar) -> Scalar {
    match (a, b) {
        (Scalar::Float(_), Scalar::Int(_)) => b.clone(),
        _ => a.clone(),
    }
}

fn meet_kinds(
    a: &KindConstraint,
    b: &KindConstraint,
    path: &str,
) -> Result<KindConstraint, EngineError> {
    let kind = match (a.kind, b.kind) {
        (x, y) if x == y => x,
        (ScalarKind::Int, ScalarKind::Float) | (ScalarKind::Float, ScalarKind::Int) => {
            ScalarKind::Int
        }
        _ => {
            return Err(EngineError::Conflict {
                path: path.to_string(),
                left: a.kind.to_string(),
                right: b.kind.to_string(),
            })
        }
    };

    let mut patterns = a.patterns.clone();
    for p in &b.patterns {
        if !patterns.contains(p) {
            patterns.push(p.clone());
        }
    }

    let default = a
        .default
        .clone()
        .or_else(|| b.default.clone())
        .filter(|d| scalar_fits(kind, d));

    Ok(KindConstraint {
        kind,
        patterns,
        default,
    })
}

/// Check a concrete scalar against a typed constraint
pub(crate) fn check_scalar(
    kind: &KindConstraint,
    scalar: &Scalar,
    path: &str,
) -> Result<Scalar, EngineError> {
    if !scalar_fits(kind.kind, scalar) {
        return Err(EngineError::Conflict {
            path: path.to_string(),
            left: kind.kind.to_string(),
            right: scalar.to_string(),
        });
    }

    if let Scalar::String(s) = scalar {
        for pattern in &kind.patterns {
            let re = Regex::new(pattern).map_err(|e| EngineError::Constraint {
                path: path.to_string(),
                message: format!("invalid pattern {}: {}", pattern, e),
            })?;
            if !re.is_match(s) {
                return Err(EngineError::Constraint {
                    path: path.to_string(),
                    message: format!("{:?} does not match pattern {}", s, pattern),
                });
            }
        }
    }

    Ok(match (kind.kind, scalar) {
        (ScalarKind::Int, Scalar::Float(f)) => Scalar::Int(*f as i64),
        _ => scalar.clone(),
    })
}

fn unify_structs(
    a: &StructValue,
    b: &StructValue,
    path: &str,
) -> Result<StructValue, EngineError> {
    // Conditional fields are only known after evaluation.
    let a_open = a.open || !a.conditionals.is_empty();
    let b_open = b.open || !b.conditionals.is_empty();

    let mut fields = Vec::with_capacity(a.fields.len() + b.fields.len());

    for fa in &a.fields {
        let child = join_path(path, &fa.name);
        match b.field(&fa.name) {
            Some(fb) => fields.push(Field {
                name: fa.name.clone(),
                value: unify(&fa.value, &fb.value, &child)?,
                optional: fa.optional && fb.optional,
            }),
            None => {
                if let Some(field) = admit(fa, b_open, &child)? {
                    fields.push(field);
                }
            }
        }
    }

    for fb in &b.fields {
        if a.field(&fb.name).is_some() {
            continue;
        }
        let child = join_path(path, &fb.name);
        if let Some(field) = admit(fb, a_open, &child)? {
            fields.push(field);
        }
    }

    let mut conditionals = a.conditionals.clone();
    conditionals.extend(b.conditionals.iter().cloned());

    Ok(StructValue {
        fields,
        open: a.open && b.open,
        conditionals,
    })
}

/// A field declared on one side only. A closed counterpart rejects required
/// fields and drops optional ones.
fn admit(field: &Field, counterpart_open: bool, path: &str) -> Result<Option<Field>, EngineError> {
    if counterpart_open || field.is_definition() {
        Ok(Some(field.clone()))
    } else if field.optional {
        Ok(None)
    } else {
        Err(EngineError::FieldNotAllowed {
            path: path.to_string(),
        })
    }
}

fn unify_lists(a: &ListValue, b: &ListValue, path: &str) -> Result<ListValue, EngineError> {
    match (a, b) {
        (ListValue::Items(x), ListValue::Items(y)) => {
            if x.len() != y.len() {
                return Err(EngineError::Conflict {
                    path: path.to_string(),
                    left: format!("list of {} elements", x.len()),
                    right: format!("list of {} elements", y.len()),
                });
            }
            x.iter()
                .zip(y)
                .enumerate()
                .map(|(i, (l, r))| unify(l, r, &format!("{}[{}]", path, i)))
                .collect::<Result<Vec<_>, _>>()
                .map(ListValue::Items)
        }
        (ListValue::Of(element), ListValue::Items(items))
        | (ListValue::Items(items), ListValue::Of(element)) => items
            .iter()
            .enumerate()
            .map(|(i, item)| unify(element, item, &format!("{}[{}]", path, i)))
            .collect::<Result<Vec<_>, _>>()
            .map(ListValue::Items),
        (ListValue::Of(x), ListValue::Of(y)) => {
            Ok(ListValue::Of(Box::new(unify(x, y, path)?)))
        }
    }
}

/// Merge the fields of an evaluated conditional branch into a struct,
/// ignoring closedness.
pub(crate) fn embed(
    target: &mut StructValue,
    addition: Value,
    path: &str,
) -> Result<(), EngineError> {
    match addition {
        Value::Absent | Value::Top => Ok(()),
        Value::Struct(extra) => {
            for field in extra.fields {
                let child = join_path(path, &field.name);
                match target.field_mut(&field.name) {
                    Some(existing) => {
                        existing.value = unify(&existing.value, &field.value, &child)?;
                        existing.optional = existing.optional && field.optional;
                    }
                    None => target.fields.push(field),
                }
            }
            target.conditionals.extend(extra.conditionals);
            Ok(())
        }
        other => Err(EngineError::Conflict {
            path: path.to_string(),
            left: "{...}".to_string(),
            right: other.to_string(),
        }),
    }
}
