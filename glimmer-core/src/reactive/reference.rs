//! References
//!
//! A reference is the uniform read/write handle the rendering layer uses for
//! every value it touches: template literals, component properties, helper
//! results and arguments.
//!
//! # Variants
//!
//! - **Constant**: never changes and never registers with the tracker.
//! - **Cell**: a root piece of mutable state with its own tag. Updatable.
//! - **Formula**: a memoized computation over other state. Updatable when
//!   constructed with a write-back function (property references are).
//! - **Readonly**: forwards reads of another reference and refuses writes.
//! - **Deeply readonly**: like readonly, and every child reference derived
//!   from it is deeply readonly too.
//!
//! Child references (`obj.key`) are created on demand and cached per parent,
//! so asking twice for the same path yields the same reference.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use super::cache::Cache;
use super::runtime::Runtime;
use super::tag::Tag;
use super::value::Value;
use crate::error::{RenderError, Result};

type Update = Rc<dyn Fn(&Runtime, Value) -> Result<()>>;

enum RefKind {
    Constant(Value),
    Cell { value: RefCell<Value>, tag: Tag },
    Formula { cache: Cache, update: Option<Update> },
    Readonly(Reference),
    DeepReadonly(Reference),
}

struct RefInner {
    kind: RefKind,
    children: RefCell<HashMap<String, Reference>>,
    label: Option<String>,
}

/// A readable (and possibly writable) handle to a value.
#[derive(Clone)]
pub struct Reference(Rc<RefInner>);

impl Reference {
    fn from_kind(kind: RefKind) -> Self {
        Self(Rc::new(RefInner {
            kind,
            children: RefCell::new(HashMap::new()),
            label: None,
        }))
    }

    pub fn constant(value: impl Into<Value>) -> Self {
        Self::from_kind(RefKind::Constant(value.into()))
    }

    pub fn undefined() -> Self {
        Self::constant(Value::Undefined)
    }

    /// A root cell of mutable state.
    pub fn cell(value: impl Into<Value>) -> Self {
        Self::from_kind(RefKind::Cell {
            value: RefCell::new(value.into()),
            tag: Tag::dirtyable(),
        })
    }

    /// A memoized, read-only derived reference.
    pub fn formula<F>(compute: F) -> Self
    where
        F: Fn(&Runtime) -> Result<Value> + 'static,
    {
        Self::from_kind(RefKind::Formula {
            cache: Cache::new(compute),
            update: None,
        })
    }

    /// A memoized derived reference that routes writes to `update`.
    pub fn formula_with_update<F, U>(compute: F, update: U) -> Self
    where
        F: Fn(&Runtime) -> Result<Value> + 'static,
        U: Fn(&Runtime, Value) -> Result<()> + 'static,
    {
        Self::from_kind(RefKind::Formula {
            cache: Cache::new(compute),
            update: Some(Rc::new(update)),
        })
    }

    pub fn readonly(inner: &Reference) -> Self {
        Self::from_kind(RefKind::Readonly(inner.clone()))
    }

    pub fn deep_readonly(inner: &Reference) -> Self {
        Self::from_kind(RefKind::DeepReadonly(inner.clone()))
    }

    /// Attach a label used in error messages and debug output.
    pub fn labeled(self, label: impl Into<String>) -> Self {
        match Rc::try_unwrap(self.0) {
            Ok(mut inner) => {
                inner.label = Some(label.into());
                Self(Rc::new(inner))
            }
            Err(shared) => Self(shared),
        }
    }

    pub fn label(&self) -> &str {
        self.0.label.as_deref().unwrap_or("reference")
    }

    /// Read the value, registering dependencies with the current frame.
    pub fn value(&self, rt: &Runtime) -> Result<Value> {
        match &self.0.kind {
            RefKind::Constant(value) => Ok(value.clone()),
            RefKind::Cell { value, tag } => {
                rt.consume_tag(tag);
                Ok(value.borrow().clone())
            }
            RefKind::Formula { cache, .. } => cache.get_value(rt),
            RefKind::Readonly(inner) | RefKind::DeepReadonly(inner) => inner.value(rt),
        }
    }

    /// Read without registering dependencies.
    pub fn value_untracked(&self, rt: &Runtime) -> Result<Value> {
        rt.untrack(|| self.value(rt))
    }

    /// Write through the reference.
    pub fn update(&self, rt: &Runtime, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        match &self.0.kind {
            RefKind::Cell { value: slot, tag } => {
                if *slot.borrow() != value {
                    *slot.borrow_mut() = value;
                    rt.dirty_tag(tag);
                }
                Ok(())
            }
            RefKind::Formula {
                update: Some(update), ..
            } => update(rt, value),
            _ => Err(RenderError::NotUpdatable(self.label().to_string())),
        }
    }

    /// Once true, stays true: constant references never register with the
    /// tracker.
    pub fn is_constant(&self) -> bool {
        match &self.0.kind {
            RefKind::Constant(_) => true,
            RefKind::Cell { .. } => false,
            RefKind::Formula { cache, .. } => cache.is_const(),
            RefKind::Readonly(inner) | RefKind::DeepReadonly(inner) => inner.is_constant(),
        }
    }

    pub fn is_updatable(&self) -> bool {
        matches!(
            &self.0.kind,
            RefKind::Cell { .. } | RefKind::Formula { update: Some(_), .. }
        )
    }

    pub fn ptr_eq(&self, other: &Reference) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// The reference for `self.key`, cached per parent.
    pub fn child(&self, key: &str) -> Reference {
        if let Some(existing) = self.0.children.borrow().get(key) {
            return existing.clone();
        }

        let child = match &self.0.kind {
            RefKind::Constant(Value::Object(_)) | RefKind::Cell { .. } | RefKind::Formula { .. } => {
                property_reference(self, key)
            }
            RefKind::Constant(value) => Reference::constant(primitive_child(value, key)),
            RefKind::Readonly(inner) => Reference::readonly(&inner.child(key)),
            RefKind::DeepReadonly(inner) => Reference::deep_readonly(&inner.child(key)),
        };
        let child = child.labeled(format!("{}.{}", self.label(), key));

        self.0
            .children
            .borrow_mut()
            .insert(key.to_string(), child.clone());
        child
    }

    /// Follow a dotted path of child references.
    pub fn child_path<S: AsRef<str>>(&self, path: &[S]) -> Reference {
        path.iter().fold(self.clone(), |r, key| r.child(key.as_ref()))
    }
}

fn primitive_child(value: &Value, key: &str) -> Value {
    match (value, key) {
        (Value::String(s), "length") => Value::from(s.chars().count() as f64),
        (Value::Array(items), "length") => Value::from(items.len() as f64),
        (Value::Array(items), index) => index
            .parse::<usize>()
            .ok()
            .and_then(|i| items.get(i).cloned())
            .unwrap_or_default(),
        _ => Value::Undefined,
    }
}

fn property_reference(parent: &Reference, key: &str) -> Reference {
    let read_parent = parent.clone();
    let read_key = key.to_string();
    let write_parent = parent.clone();
    let write_key = key.to_string();

    Reference::formula_with_update(
        move |rt| {
            let value = read_parent.value(rt)?;
            Ok(match &value {
                Value::Object(obj) => {
                    if read_key == "[]" {
                        rt.consume_tag(&obj.collection_tag());
                        value.clone()
                    } else {
                        obj.get(rt, &read_key)
                    }
                }
                Value::Cell(cell) => cell.reference().child(&read_key).value(rt)?,
                other => primitive_child(other, &read_key),
            })
        },
        move |rt, value| match write_parent.value_untracked(rt)? {
            Value::Object(obj) => {
                obj.set(rt, &write_key, value);
                Ok(())
            }
            _ => Err(RenderError::NotUpdatable(format!(
                "{}.{}",
                write_parent.label(),
                write_key
            ))),
        },
    )
}

impl fmt::Debug for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.0.kind {
            RefKind::Constant(_) => "constant",
            RefKind::Cell { .. } => "cell",
            RefKind::Formula { .. } => "formula",
            RefKind::Readonly(_) => "readonly",
            RefKind::DeepReadonly(_) => "deep-readonly",
        };
        write!(f, "Reference({kind}, {})", self.label())
    }
}

/// Read a reference, registering its tags with the current frame.
pub fn unwrap_reactive(rt: &Runtime, reference: &Reference) -> Result<Value> {
    reference.value(rt)
}

/// Write through an updatable reference.
pub fn update_ref(rt: &Runtime, reference: &Reference, value: impl Into<Value>) -> Result<()> {
    reference.update(rt, value)
}

pub fn is_constant(reference: &Reference) -> bool {
    reference.is_constant()
}

pub fn is_updatable_ref(reference: &Reference) -> bool {
    reference.is_updatable()
}

/// A two-way bound argument handed to classic components: it carries the
/// value seen at capture time and can write back into the caller's state.
pub struct MutableCell {
    reference: Reference,
    value: Value,
}

impl MutableCell {
    pub fn new(reference: Reference, value: Value) -> Self {
        Self { reference, value }
    }

    pub fn value(&self) -> Value {
        self.value.clone()
    }

    pub fn reference(&self) -> &Reference {
        &self.reference
    }

    /// Write `value` into the reference this cell was captured from.
    pub fn update(&self, rt: &Runtime, value: impl Into<Value>) -> Result<()> {
        self.reference.update(rt, value)
    }
}

impl fmt::Debug for MutableCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutableCell")
            .field("reference", &self.reference)
            .field("value", &self.value)
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::TrackedObject;
    use std::cell::Cell as StdCell;

    #[test]
    fn constants_never_track() {
        let rt = Runtime::new();
        let r = Reference::constant("x");
        let (value, tag) = rt.track(|| r.value(&rt).unwrap());
        assert_eq!(value, Value::from("x"));
        assert!(tag.is_constant());
        assert!(is_constant(&r));
        assert!(!is_updatable_ref(&r));
    }

    #[test]
    fn writing_a_readonly_reference_fails() {
        let rt = Runtime::new();
        let cell = Reference::cell(1);
        let ro = Reference::readonly(&cell);

        assert!(matches!(update_ref(&rt, &ro, 2), Err(RenderError::NotUpdatable(_))));
        assert!(matches!(
            update_ref(&rt, &Reference::constant(1), 2),
            Err(RenderError::NotUpdatable(_))
        ));
        assert_eq!(unwrap_reactive(&rt, &ro).unwrap(), Value::from(1));
    }

    #[test]
    fn cell_writes_invalidate_readers() {
        let rt = Runtime::new();
        let cell = Reference::cell("A");
        let (_, tag) = rt.track(|| cell.value(&rt));
        let snapshot = tag.value();

        update_ref(&rt, &cell, "B").unwrap();
        assert!(!tag.validate(snapshot));
        assert_eq!(cell.value(&rt).unwrap(), Value::from("B"));
    }

    #[test]
    fn formula_runs_once_per_dependency_version() {
        let rt = Runtime::new();
        let cell = Reference::cell(2);
        let calls = Rc::new(StdCell::new(0));

        let source = cell.clone();
        let counter = calls.clone();
        let doubled = Reference::formula(move |rt| {
            counter.set(counter.get() + 1);
            Ok(Value::from(source.value(rt)?.as_number().unwrap_or(0.0) * 2.0))
        });

        for _ in 0..5 {
            assert_eq!(doubled.value(&rt).unwrap(), Value::from(4));
        }
        assert_eq!(calls.get(), 1);

        cell.update(&rt, 5).unwrap();
        assert_eq!(doubled.value(&rt).unwrap(), Value::from(10));
        assert_eq!(doubled.value(&rt).unwrap(), Value::from(10));
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn child_references_are_cached_and_writable() {
        let rt = Runtime::new();
        let obj = TrackedObject::with_props([("name", Value::from("Ada"))]);
        let root = Reference::constant(obj.clone());

        let a = root.child("name");
        let b = root.child("name");
        assert!(a.ptr_eq(&b));
        assert!(a.is_updatable());

        a.update(&rt, "Grace").unwrap();
        assert_eq!(obj.get_untracked("name"), Value::from("Grace"));
    }

    #[test]
    fn deep_readonly_forbids_nested_writes() {
        let rt = Runtime::new();
        let inner = TrackedObject::with_props([("n", Value::from(1))]);
        let outer = TrackedObject::with_props([("inner", Value::Object(inner))]);
        let locked = Reference::deep_readonly(&Reference::constant(outer));

        let nested = locked.child_path(&["inner", "n"]);
        assert_eq!(nested.value(&rt).unwrap(), Value::from(1));
        assert!(nested.update(&rt, 2).is_err());
    }

    #[test]
    fn mutable_cell_writes_back() {
        let rt = Runtime::new();
        let parent = Reference::cell("old");
        let cell = MutableCell::new(parent.clone(), parent.value(&rt).unwrap());

        cell.update(&rt, "X").unwrap();
        assert_eq!(parent.value(&rt).unwrap(), Value::from("X"));
        assert_eq!(cell.value(), Value::from("old"));
    }
}
