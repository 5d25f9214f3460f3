//! Reference resolution, concreteness and marshalling

use std::borrow::Cow;

use super::unify::{embed, unify};
use super::value::{Conditional, ListValue, StructValue, Value};
use super::{join_path, EngineError, Shape};

const MAX_DEPTH: usize = 64;

/// Evaluates values against the root they were unified into.
pub(crate) struct Evaluator<'a> {
    root: &'a Value,
}

impl<'a> Evaluator<'a> {
    pub fn new(root: &'a Value) -> Self {
        Self { root }
    }

    /// Resolve every reference, conditional and deferred unification.
    pub fn eval(&self, value: &Value, path: &str, depth: usize) -> Result<Value, EngineError> {
        if depth > MAX_DEPTH {
            return Err(EngineError::Cycle {
                path: path.to_string(),
            });
        }

        match value {
            Value::Ref(target) => Ok(self.resolve(target, depth + 1)?.unwrap_or(Value::Top)),
            Value::Cond(cond) => self.eval_conditional(cond, path, depth + 1),
            Value::Conjunction(parts) => {
                let mut acc = Value::Top;
                for part in parts {
                    let part = self.eval(part, path, depth + 1)?;
                    acc = unify(&acc, &part, path)?;
                }
                Ok(acc)
            }
            Value::Struct(s) => self.eval_struct(s, path, depth).map(Value::Struct),
            Value::List(ListValue::Items(items)) => {
                let mut out = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    match self.eval(item, &format!("{}[{}]", path, i), depth + 1)? {
                        Value::Absent => {}
                        v => out.push(v),
                    }
                }
                Ok(Value::List(ListValue::Items(out)))
            }
            Value::List(ListValue::Of(element)) => Ok(Value::List(ListValue::Of(Box::new(
                self.eval(element, path, depth + 1)?,
            )))),
            Value::Disjunction(alts) => {
                let mut kept: Vec<Value> = Vec::new();
                let mut first_error = None;
                for alt in alts {
                    match self.eval(alt, path, depth + 1) {
                        Ok(v) if !kept.contains(&v) => kept.push(v),
                        Ok(_) => {}
                        Err(e) => {
                            first_error.get_or_insert(e);
                        }
                    }
                }
                match (kept.len(), first_error) {
                    (0, Some(e)) => Err(e),
                    (1, _) => Ok(kept.remove(0)),
                    _ => Ok(Value::Disjunction(kept)),
                }
            }
            other => Ok(other.clone()),
        }
    }

    fn eval_struct(
        &self,
        s: &StructValue,
        path: &str,
        depth: usize,
    ) -> Result<StructValue, EngineError> {
        let mut out = StructValue {
            fields: Vec::with_capacity(s.fields.len()),
            open: s.open,
            conditionals: Vec::new(),
        };

        for field in &s.fields {
            let child = join_path(path, &field.name);
            let value = self.eval(&field.value, &child, depth + 1)?;
            if value != Value::Absent {
                out.fields.push(super::value::Field {
                    name: field.name.clone(),
                    value,
                    optional: field.optional,
                });
            }
        }

        for cond in &s.conditionals {
            let branch = self.eval_conditional(cond, path, depth + 1)?;
            embed(&mut out, branch, path)?;
        }

        Ok(out)
    }

    fn eval_conditional(
        &self,
        cond: &Conditional,
        path: &str,
        depth: usize,
    ) -> Result<Value, EngineError> {
        let holds = match self.resolve(&cond.path, depth + 1)? {
            None => false,
            Some(target) => match &cond.is {
                None => true,
                Some(expected) => {
                    finalize(&target, path).is_ok() && unify(expected, &target, path).is_ok()
                }
            },
        };

        if holds {
            self.eval(&cond.then, path, depth + 1)
        } else {
            match &cond.otherwise {
                Some(otherwise) => self.eval(otherwise, path, depth + 1),
                None => Ok(Value::Absent),
            }
        }
    }

    /// A field of a struct, looking into its conditionals when the field is
    /// not declared directly
    fn field_of(
        &self,
        s: &StructValue,
        segment: &str,
        depth: usize,
    ) -> Result<Option<Value>, EngineError> {
        match s.field(segment) {
            Some(field) => Ok(Some(field.value.clone())),
            None if !s.conditionals.is_empty() => {
                let evaluated = self.eval_struct(s, "", depth + 1)?;
                Ok(evaluated
                    .fields
                    .into_iter()
                    .find(|f| f.name == segment)
                    .map(|f| f.value))
            }
            None => Ok(None),
        }
    }

    /// Resolve a dotted path from the root. Missing fields yield `None`.
    pub fn resolve(&self, path: &str, depth: usize) -> Result<Option<Value>, EngineError> {
        if depth > MAX_DEPTH {
            return Err(EngineError::Cycle {
                path: path.to_string(),
            });
        }

        let mut current: Cow<'a, Value> = Cow::Borrowed(self.root);
        for segment in path.split('.') {
            if current.is_deferred() {
                current = Cow::Owned(self.eval(&current, "", depth + 1)?);
            }
            let next = match current {
                Cow::Borrowed(Value::Struct(s)) => match s.field(segment) {
                    Some(field) => Some(Cow::Borrowed(&field.value)),
                    None => self.field_of(s, segment, depth)?.map(Cow::Owned),
                },
                Cow::Owned(Value::Struct(s)) => self.field_of(&s, segment, depth)?.map(Cow::Owned),
                _ => None,
            };
            match next {
                Some(v) => current = v,
                None => return Ok(None),
            }
        }

        match self.eval(&current, path, depth + 1)? {
            Value::Top | Value::Absent => Ok(None),
            v => Ok(Some(v)),
        }
    }
}

/// Require an evaluated value to be concrete. Defaults fill incomplete
/// scalars; optional fields without data are dropped.
pub(crate) fn finalize(value: &Value, path: &str) -> Result<Value, EngineError> {
    match value {
        Value::Null | Value::Scalar(_) => Ok(value.clone()),
        Value::Kind(k) => match &k.default {
            Some(d) => Ok(Value::Scalar(d.clone())),
            None => Err(incomplete(path, value)),
        },
        Value::Struct(s) => {
            let mut fields = Vec::with_capacity(s.fields.len());
            for field in s.fields.iter().filter(|f| !f.is_definition()) {
                if field.optional && !has_data(&field.value) {
                    continue;
                }
                let child = join_path(path, &field.name);
                match finalize(&field.value, &child) {
                    Ok(v) => fields.push(super::value::Field {
                        name: field.name.clone(),
                        value: v,
                        optional: false,
                    }),
                    Err(e) if field.optional && e.is_incomplete() => {}
                    Err(e) => return Err(e),
                }
            }
            Ok(Value::Struct(StructValue {
                fields,
                open: s.open,
                conditionals: Vec::new(),
            }))
        }
        Value::List(ListValue::Items(items)) => items
            .iter()
            .enumerate()
            .map(|(i, item)| finalize(item, &format!("{}[{}]", path, i)))
            .collect::<Result<Vec<_>, _>>()
            .map(|items| Value::List(ListValue::Items(items))),
        Value::List(ListValue::Of(_)) => Ok(Value::List(ListValue::Items(Vec::new()))),
        Value::Disjunction(alts) => {
            let mut resolved: Vec<Value> = Vec::new();
            for alt in alts {
                if let Ok(v) = finalize(alt, path) {
                    if !resolved.contains(&v) {
                        resolved.push(v);
                    }
                }
            }
            match resolved.len() {
                1 => Ok(resolved.remove(0)),
                _ => Err(incomplete(path, value)),
            }
        }
        _ => Err(incomplete(path, value)),
    }
}

fn incomplete(path: &str, value: &Value) -> EngineError {
    EngineError::Incomplete {
        path: path.to_string(),
        value: value.to_string(),
    }
}

/// Whether a value carries anything besides types and defaults
fn has_data(value: &Value) -> bool {
    match value {
        Value::Null | Value::Scalar(_) | Value::List(ListValue::Items(_)) => true,
        Value::Struct(s) => s
            .fields
            .iter()
            .any(|f| !f.is_definition() && has_data(&f.value)),
        _ => false,
    }
}

/// Convert a finalized value to JSON; definition fields are skipped.
pub(crate) fn to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Scalar(s) => s.to_json(),
        Value::Struct(s) => serde_json::Value::Object(
            s.fields
                .iter()
                .filter(|f| !f.is_definition())
                .map(|f| (f.name.clone(), to_json(&f.value)))
                .collect(),
        ),
        Value::List(ListValue::Items(items)) => {
            serde_json::Value::Array(items.iter().map(to_json).collect())
        }
        _ => serde_json::Value::Null,
    }
}

pub(crate) fn inspect(value: &Value) -> Shape<Value> {
    match value {
        Value::Scalar(s) => Shape::Concrete(s.clone()),
        Value::Kind(k) => Shape::Incomplete(k.kind),
        Value::Struct(s) => Shape::Struct(
            s.fields
                .iter()
                .filter(|f| !f.optional && !f.is_definition())
                .map(|f| (f.name.clone(), f.value.clone()))
                .collect(),
        ),
        Value::List(_) => Shape::List,
        Value::Disjunction(alts) => {
            let scalar_kinds: Vec<_> = alts
                .iter()
                .filter_map(|alt| match alt {
                    Value::Scalar(s) => Some(s.kind()),
                    Value::Kind(k) => Some(k.kind),
                    _ => None,
                })
                .collect();
            if scalar_kinds.len() == alts.len() && scalar_kinds.windows(2).all(|w| w[0] == w[1]) {
                Shape::Incomplete(scalar_kinds[0])
            } else if alts
                .iter()
                .any(|alt| matches!(alt, Value::Struct(_) | Value::Disjunction(_) | Value::Conjunction(_)))
            {
                Shape::Disjunction(alts.clone())
            } else {
                Shape::Other
            }
        }
        Value::Conjunction(parts) => Shape::Conjunction(parts.clone()),
        _ => Shape::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::value::{from_data, parse_document};
    use crate::engine::Scalar;
    use serde_json::json;

    fn schema(doc: serde_json::Value) -> Value {
        parse_document(&doc).unwrap().0
    }

    fn concrete(v: &Value) -> Result<serde_json::Value, EngineError> {
        let evaluated = Evaluator::new(v).eval(v, "", 0)?;
        finalize(&evaluated, "").map(|f| to_json(&f))
    }

    #[test]
    fn test_missing_required_field_is_incomplete() {
        let s = schema(json!({"spec": {"x": {"$type": "string"}}}));
        let err = concrete(&s).unwrap_err();
        assert_eq!(err.path(), Some("spec.x"));
        assert!(err.is_incomplete());
    }

    #[test]
    fn test_defaults_and_optional_fields() {
        let s = schema(json!({
            "unit": {"$type": "string", "$default": "decimal"},
            "legend?": {"position": {"$type": "string", "$default": "bottom"}},
            "values": {"$listOf": {"$type": "int"}}
        }));
        assert_eq!(
            concrete(&s).unwrap(),
            json!({"unit": "decimal", "values": []})
        );
    }

    #[test]
    fn test_reference_resolves_into_definition() {
        let script = schema(json!({
            "#panel": {"$type": "any"},
            "kind": "Markdown",
            "spec": {"text": {"$ref": "#panel.options.content"}}
        }));
        let data = from_data(&json!({"#panel": {"options": {"content": "hello"}}}));
        let unified = unify(&script, &data, "").unwrap();
        assert_eq!(
            concrete(&unified).unwrap(),
            json!({"kind": "Markdown", "spec": {"text": "hello"}})
        );
    }

    #[test]
    fn test_conditional_without_else_removes_fields() {
        let script = schema(json!({
            "#panel": {"$type": "any"},
            "$if": {"$ref": "#panel.type", "$is": "text"},
            "$then": {"kind": "Markdown"}
        }));
        let text = unify(&script, &from_data(&json!({"#panel": {"type": "text"}})), "").unwrap();
        assert_eq!(concrete(&text).unwrap(), json!({"kind": "Markdown"}));

        let graph = unify(&script, &from_data(&json!({"#panel": {"type": "graph"}})), "").unwrap();
        assert_eq!(concrete(&graph).unwrap(), json!({}));
    }

    #[test]
    fn test_resolve_borrows_from_root() {
        let root = schema(json!({
            "#panel": {"options": {"content": "hello", "mode": "markdown"}},
            "kind": "Markdown"
        }));
        let evaluator = Evaluator::new(&root);
        assert_eq!(
            evaluator.resolve("#panel.options.content", 0).unwrap(),
            Some(Value::Scalar(Scalar::String("hello".into())))
        );
        assert_eq!(evaluator.resolve("#panel.options.missing", 0).unwrap(), None);
        assert_eq!(evaluator.resolve("kind.nested", 0).unwrap(), None);
    }

    #[test]
    fn test_many_references_to_one_root() {
        let mut spec = serde_json::Map::new();
        for i in 0..200 {
            spec.insert(format!("f{}", i), json!({"$ref": format!("#panel.values.v{}", i)}));
        }
        let values: serde_json::Map<_, _> =
            (0..200).map(|i| (format!("v{}", i), json!(i))).collect();

        let script = schema(json!({"#panel": {"$type": "any"}, "spec": spec}));
        let data = from_data(&json!({"#panel": {"values": values}}));
        let unified = unify(&script, &data, "").unwrap();

        let out = concrete(&unified).unwrap();
        assert_eq!(out["spec"]["f0"], json!(0));
        assert_eq!(out["spec"]["f199"], json!(199));
        assert_eq!(out["spec"].as_object().unwrap().len(), 200);
    }

    #[test]
    fn test_reference_cycle_is_detected() {
        let s = schema(json!({"#a": {"$ref": "#b"}, "#b": {"$ref": "#a"}, "x": {"$ref": "#a"}}));
        let err = concrete(&s).unwrap_err();
        assert!(matches!(err, EngineError::Cycle { .. }));
    }

    #[test]
    fn test_ambiguous_disjunction_is_incomplete() {
        let s = schema(json!({"mode": {"$oneOf": ["a", "b"]}}));
        assert!(concrete(&s).unwrap_err().is_incomplete());
    }

    #[test]
    fn test_inspect_scalar_enum_as_incomplete_string() {
        let s = schema(json!({"$oneOf": ["a", "b"]}));
        assert_eq!(inspect(&s), Shape::Incomplete(crate::engine::ScalarKind::String));
        assert_eq!(
            inspect(&Value::Scalar(Scalar::Int(1))),
            Shape::Concrete(Scalar::Int(1))
        );
    }
}
