//! Dynamic values flowing through references and templates.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use super::object::ObjectRef;
use super::reference::MutableCell;
use super::runtime::Runtime;
use crate::error::Result;

/// A callable value (actions, closures passed as arguments).
#[derive(Clone)]
pub struct Function(Rc<dyn Fn(&Runtime, &[Value]) -> Result<Value>>);

impl Function {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Runtime, &[Value]) -> Result<Value> + 'static,
    {
        Self(Rc::new(f))
    }

    pub fn call(&self, rt: &Runtime, args: &[Value]) -> Result<Value> {
        (self.0)(rt, args)
    }

    pub fn ptr_eq(&self, other: &Function) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

/// A host object the template layer passes around without inspecting
/// (definitions, outlet state, engine handles).
#[derive(Clone)]
pub struct Opaque(Rc<dyn Any>);

impl Opaque {
    pub fn new<T: Any>(value: Rc<T>) -> Self {
        Self(value)
    }

    pub fn downcast<T: Any>(&self) -> Option<Rc<T>> {
        self.0.clone().downcast::<T>().ok()
    }

    pub fn is<T: Any>(&self) -> bool {
        self.0.is::<T>()
    }

    pub fn ptr_eq(&self, other: &Opaque) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

/// Every value a reference can hold.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    Array(Rc<[Value]>),
    Object(ObjectRef),
    /// A two-way bound argument as seen by classic components.
    Cell(Rc<MutableCell>),
    Function(Function),
    Opaque(Opaque),
}

impl Value {
    pub fn string(s: impl AsRef<str>) -> Self {
        Value::String(Rc::from(s.as_ref()))
    }

    pub fn array(items: impl IntoIterator<Item = Value>) -> Self {
        Value::Array(items.into_iter().collect())
    }

    pub fn opaque<T: Any>(value: Rc<T>) -> Self {
        Value::Opaque(Opaque::new(value))
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    /// Truthiness as templates see it: empty strings and empty arrays are
    /// false, objects may opt out through an `isTruthy` property.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::Array(items) => !items.is_empty(),
            Value::Object(obj) => match obj.get_untracked("isTruthy") {
                Value::Undefined => true,
                flag => flag.is_truthy(),
            },
            Value::Cell(_) | Value::Function(_) | Value::Opaque(_) => true,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&Function> {
        match self {
            Value::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_opaque(&self) -> Option<&Opaque> {
        match self {
            Value::Opaque(o) => Some(o),
            _ => None,
        }
    }

    /// Text content produced when the value is appended to the DOM.
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Undefined | Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::String(s) => s.to_string(),
            Value::Array(items) => items
                .iter()
                .map(Value::to_display_string)
                .collect::<Vec<_>>()
                .join(","),
            Value::Object(_) => "[object Object]".to_string(),
            Value::Cell(cell) => cell.value().to_display_string(),
            Value::Function(_) => "[function]".to_string(),
            Value::Opaque(_) => "[opaque]".to_string(),
        }
    }
}

fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b) || a == b,
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Cell(a), Value::Cell(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => a.ptr_eq(b),
            (Value::Opaque(a), Value::Opaque(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("undefined"),
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => f.write_str(&format_number(*n)),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Array(items) => f.debug_list().entries(items.iter()).finish(),
            Value::Object(obj) => write!(f, "Object({:p})", Rc::as_ptr(obj)),
            Value::Cell(cell) => write!(f, "MutableCell({:?})", cell.value()),
            Value::Function(_) => f.write_str("Function"),
            Value::Opaque(_) => f.write_str("Opaque"),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Rc::from(s))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<ObjectRef> for Value {
    fn from(obj: ObjectRef) -> Self {
        Value::Object(obj)
    }
}

impl From<Function> for Value {
    fn from(f: Function) -> Self {
        Value::Function(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_render_like_templates_expect() {
        assert_eq!(Value::from(3).to_display_string(), "3");
        assert_eq!(Value::from(1.5).to_display_string(), "1.5");
        assert_eq!(Value::Null.to_display_string(), "");
    }

    #[test]
    fn empty_collections_are_falsy() {
        assert!(!Value::string("").is_truthy());
        assert!(!Value::array(Vec::new()).is_truthy());
        assert!(Value::array([Value::from(1)]).is_truthy());
        assert!(!Value::Number(f64::NAN).is_truthy());
    }

    #[test]
    fn opaque_values_compare_by_identity() {
        let a = Rc::new(5u8);
        let x = Value::opaque(a.clone());
        let y = Value::opaque(a);
        let z = Value::opaque(Rc::new(5u8));
        assert_eq!(x, y);
        assert_ne!(x, z);
        assert_eq!(x.as_opaque().and_then(|o| o.downcast::<u8>()).map(|v| *v), Some(5));
    }
}
