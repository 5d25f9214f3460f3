//! Schema Tree Decoder
//!
//! Turns a compiled plugin schema into a flat, portable tree of
//! [`SchemaNode`]s without any concrete instance. Disjunctions and
//! unifications of structs are flattened into a single struct node, so
//! consumers only ever see plain fields.

use std::collections::VecDeque;

use serde::Serialize;

use crate::engine::{Scalar, ScalarKind, SchemaEngine, Shape};

/// One decoded field
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "node", rename_all = "lowercase")]
pub enum SchemaNode {
    Scalar {
        field_name: String,
        scalar_type: ScalarKind,
        /// `None` for a typed placeholder
        concrete_value: Option<Scalar>,
    },
    Struct {
        field_name: String,
        children: Vec<SchemaNode>,
    },
    List {
        field_name: String,
    },
}

impl SchemaNode {
    pub fn field_name(&self) -> &str {
        match self {
            SchemaNode::Scalar { field_name, .. }
            | SchemaNode::Struct { field_name, .. }
            | SchemaNode::List { field_name } => field_name,
        }
    }

    /// Direct child by field name
    pub fn child(&self, name: &str) -> Option<&SchemaNode> {
        match self {
            SchemaNode::Struct { children, .. } => children.iter().find(|c| c.field_name() == name),
            _ => None,
        }
    }

    /// Walk this node and its descendants depth-first
    pub fn accept<V: SchemaVisitor>(&self, visitor: &mut V) {
        match self {
            SchemaNode::Scalar {
                field_name,
                scalar_type,
                concrete_value,
            } => visitor.visit_scalar(field_name, *scalar_type, concrete_value.as_ref()),
            SchemaNode::Struct {
                field_name,
                children,
            } => {
                visitor.enter_struct(field_name);
                for child in children {
                    child.accept(visitor);
                }
                visitor.leave_struct(field_name);
            }
            SchemaNode::List { field_name } => visitor.visit_list(field_name),
        }
    }
}

/// Callbacks for [`SchemaNode::accept`]
pub trait SchemaVisitor {
    fn visit_scalar(&mut self, field_name: &str, scalar_type: ScalarKind, value: Option<&Scalar>);

    fn enter_struct(&mut self, _field_name: &str) {}

    fn leave_struct(&mut self, _field_name: &str) {}

    fn visit_list(&mut self, _field_name: &str) {}
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum DecodeError {
    #[error("schema root must be a struct, found {0}")]
    NotAStruct(String),
}

/// Node under construction: children are indices into the arena
struct Slot {
    field_name: String,
    kind: SlotKind,
    children: Vec<usize>,
}

enum SlotKind {
    Scalar(ScalarKind, Option<Scalar>),
    Struct,
    List,
}

struct WorkItem<V> {
    field_name: String,
    value: V,
    parent: usize,
}

const ROOT: usize = 0;

pub struct SchemaTreeDecoder<'e, E: SchemaEngine> {
    engine: &'e E,
}

impl<'e, E: SchemaEngine> SchemaTreeDecoder<'e, E> {
    pub fn new(engine: &'e E) -> Self {
        Self { engine }
    }

    /// Decode a schema into the children of its (synthetic) root
    pub fn decode(&self, schema: &E::Value) -> Result<Vec<SchemaNode>, DecodeError> {
        let root_fields = match self.engine.inspect(schema) {
            Shape::Struct(fields) => fields,
            shape @ (Shape::Disjunction(_) | Shape::Conjunction(_)) => {
                let fields = self.flatten(&shape);
                if fields.is_empty() {
                    return Err(DecodeError::NotAStruct(describe(&shape)));
                }
                fields
            }
            other => return Err(DecodeError::NotAStruct(describe(&other))),
        };

        let mut arena = vec![Slot {
            field_name: String::new(),
            kind: SlotKind::Struct,
            children: Vec::new(),
        }];
        let mut queue: VecDeque<WorkItem<E::Value>> = root_fields
            .into_iter()
            .map(|(field_name, value)| WorkItem {
                field_name,
                value,
                parent: ROOT,
            })
            .collect();

        while let Some(item) = queue.pop_front() {
            let shape = self.engine.inspect(&item.value);
            let (kind, fields) = match shape {
                Shape::Concrete(scalar) => (SlotKind::Scalar(scalar.kind(), Some(scalar)), Vec::new()),
                Shape::Incomplete(kind) => (SlotKind::Scalar(kind, None), Vec::new()),
                Shape::Struct(fields) => (SlotKind::Struct, fields),
                Shape::List => (SlotKind::List, Vec::new()),
                composite @ (Shape::Disjunction(_) | Shape::Conjunction(_)) => {
                    (SlotKind::Struct, self.flatten(&composite))
                }
                Shape::Other => continue,
            };

            let index = arena.len();
            arena.push(Slot {
                field_name: item.field_name,
                kind,
                children: Vec::new(),
            });
            arena[item.parent].children.push(index);

            queue.extend(fields.into_iter().map(|(field_name, value)| WorkItem {
                field_name,
                value,
                parent: index,
            }));
        }

        let root_children = arena[ROOT].children.clone();
        Ok(root_children
            .into_iter()
            .map(|i| assemble(&arena, i))
            .collect())
    }

    /// Merge the fields of every struct alternative. A later alternative
    /// overwrites an earlier field of the same name in place.
    fn flatten(&self, shape: &Shape<E::Value>) -> Vec<(String, E::Value)> {
        let mut merged: Vec<(String, E::Value)> = Vec::new();
        self.collect_fields(shape, &mut merged);
        merged
    }

    fn collect_fields(&self, shape: &Shape<E::Value>, merged: &mut Vec<(String, E::Value)>) {
        match shape {
            Shape::Struct(fields) => {
                for (name, value) in fields {
                    match merged.iter_mut().find(|(existing, _)| existing == name) {
                        Some(slot) => slot.1 = value.clone(),
                        None => merged.push((name.clone(), value.clone())),
                    }
                }
            }
            Shape::Disjunction(alternatives) | Shape::Conjunction(alternatives) => {
                for alternative in alternatives {
                    self.collect_fields(&self.engine.inspect(alternative), merged);
                }
            }
            _ => {}
        }
    }
}

fn assemble(arena: &[Slot], index: usize) -> SchemaNode {
    let slot = &arena[index];
    match &slot.kind {
        SlotKind::Scalar(kind, value) => SchemaNode::Scalar {
            field_name: slot.field_name.clone(),
            scalar_type: *kind,
            concrete_value: value.clone(),
        },
        SlotKind::Struct => SchemaNode::Struct {
            field_name: slot.field_name.clone(),
            children: slot.children.iter().map(|&c| assemble(arena, c)).collect(),
        },
        SlotKind::List => SchemaNode::List {
            field_name: slot.field_name.clone(),
        },
    }
}

fn describe<V>(shape: &Shape<V>) -> String {
    match shape {
        Shape::Concrete(scalar) => scalar.kind().to_string(),
        Shape::Incomplete(kind) => kind.to_string(),
        Shape::Struct(_) => "struct".to_string(),
        Shape::List => "list".to_string(),
        Shape::Disjunction(_) => "disjunction".to_string(),
        Shape::Conjunction(_) => "conjunction".to_string(),
        Shape::Other => "a non-struct value".to_string(),
    }
}
