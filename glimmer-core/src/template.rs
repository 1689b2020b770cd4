//! Compiled Templates
//!
//! Templates arrive here already compiled: a tree of [`Node`]s whose dynamic
//! parts are [`Expr`]s. Template data is immutable and shareable across
//! threads so it can live in the process-wide template registry; everything
//! stateful happens in the VM when a template is rendered.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::reactive::Value;

/// Unique identity of a compiled template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TemplateId(u64);

impl TemplateId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// A literal baked into a template.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
}

impl Literal {
    pub fn to_value(&self) -> Value {
        match self {
            Literal::Undefined => Value::Undefined,
            Literal::Null => Value::Null,
            Literal::Bool(b) => Value::Bool(*b),
            Literal::Number(n) => Value::Number(*n),
            Literal::String(s) => Value::string(s),
        }
    }
}

impl From<&str> for Literal {
    fn from(s: &str) -> Self {
        Literal::String(s.to_string())
    }
}

impl From<f64> for Literal {
    fn from(n: f64) -> Self {
        Literal::Number(n)
    }
}

impl From<bool> for Literal {
    fn from(b: bool) -> Self {
        Literal::Bool(b)
    }
}

/// A dynamic expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    /// A path on the template's `this`; an empty path is `this` itself.
    This(Vec<String>),
    /// A named argument (`@name`), optionally followed by a path.
    Arg(String, Vec<String>),
    /// A helper invocation.
    Helper(Call),
}

impl Expr {
    pub fn lit(value: impl Into<Literal>) -> Self {
        Expr::Literal(value.into())
    }

    /// `this.a.b` from `"a.b"`; `""` means `this`.
    pub fn this(path: &str) -> Self {
        Expr::This(split_path(path))
    }

    /// `@name.a.b` from `"name.a.b"`.
    pub fn arg(path: &str) -> Self {
        let mut parts = split_path(path);
        let name = if parts.is_empty() {
            String::new()
        } else {
            parts.remove(0)
        };
        Expr::Arg(name, parts)
    }

    pub fn helper(call: Call) -> Self {
        Expr::Helper(call)
    }
}

fn split_path(path: &str) -> Vec<String> {
    path.split('.')
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect()
}

/// A named invocation with positional and named arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub name: String,
    pub positional: Vec<Expr>,
    pub named: Vec<(String, Expr)>,
}

impl Call {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            positional: Vec::new(),
            named: Vec::new(),
        }
    }

    pub fn positional(mut self, expr: Expr) -> Self {
        self.positional.push(expr);
        self
    }

    pub fn named(mut self, name: impl Into<String>, expr: Expr) -> Self {
        self.named.push((name.into(), expr));
        self
    }
}

/// An element with static or bound attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementNode {
    pub tag: String,
    pub attrs: Vec<(String, Expr)>,
    pub modifiers: Vec<Call>,
    pub children: Vec<Node>,
}

impl ElementNode {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attrs: Vec::new(),
            modifiers: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn attr(mut self, name: impl Into<String>, value: Expr) -> Self {
        self.attrs.push((name.into(), value));
        self
    }

    pub fn modifier(mut self, call: Call) -> Self {
        self.modifiers.push(call);
        self
    }

    pub fn child(mut self, node: Node) -> Self {
        self.children.push(node);
        self
    }
}

/// One node of a compiled template.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Static text.
    Text(String),
    /// `{{expr}}`: a text node kept in sync with the expression.
    Append(Expr),
    Element(ElementNode),
    /// `{{name args...}}` where `name` resolves to a component.
    Invoke(Call),
    /// `{{component expr}}`: the expression yields a definition.
    DynamicComponent(Expr),
    If {
        condition: Expr,
        then: Vec<Node>,
        otherwise: Vec<Node>,
    },
    /// `{{outlet}}`.
    Outlet,
    /// `{{mount "engine" model=expr}}`.
    Mount { name: String, model: Option<Expr> },
}

impl Node {
    pub fn text(text: impl Into<String>) -> Self {
        Node::Text(text.into())
    }

    pub fn append(expr: Expr) -> Self {
        Node::Append(expr)
    }

    pub fn if_else(condition: Expr, then: Vec<Node>, otherwise: Vec<Node>) -> Self {
        Node::If {
            condition,
            then,
            otherwise,
        }
    }

    pub fn mount(name: impl Into<String>, model: Option<Expr>) -> Self {
        Node::Mount {
            name: name.into(),
            model,
        }
    }
}

impl From<ElementNode> for Node {
    fn from(element: ElementNode) -> Self {
        Node::Element(element)
    }
}

struct TemplateInner {
    id: TemplateId,
    name: String,
    body: Vec<Node>,
}

/// A compiled template. Clones share identity.
#[derive(Clone)]
pub struct Template(Arc<TemplateInner>);

impl Template {
    pub fn new(name: impl Into<String>, body: Vec<Node>) -> Self {
        Self(Arc::new(TemplateInner {
            id: TemplateId::next(),
            name: name.into(),
            body,
        }))
    }

    pub fn id(&self) -> TemplateId {
        self.0.id
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn body(&self) -> &[Node] {
        &self.0.body
    }

    /// The template as a component layout.
    pub fn as_layout(&self) -> CompiledLayout {
        CompiledLayout {
            template: self.clone(),
            wrapped: false,
        }
    }

    /// The template as a layout rendered inside the component's own element.
    pub fn as_wrapped_layout(&self) -> CompiledLayout {
        CompiledLayout {
            template: self.clone(),
            wrapped: true,
        }
    }

    pub fn ptr_eq(&self, other: &Template) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Template")
            .field("id", &self.0.id)
            .field("name", &self.0.name)
            .finish()
    }
}

/// A template prepared for use as a layout.
#[derive(Debug, Clone)]
pub struct CompiledLayout {
    pub template: Template,
    pub wrapped: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_split_on_dots() {
        assert_eq!(Expr::this("a.b"), Expr::This(vec!["a".into(), "b".into()]));
        assert_eq!(Expr::this(""), Expr::This(Vec::new()));
        assert_eq!(Expr::arg("model.name"), Expr::Arg("model".into(), vec!["name".into()]));
    }

    #[test]
    fn templates_have_distinct_identities() {
        let a = Template::new("a", vec![Node::text("x")]);
        let b = Template::new("a", vec![Node::text("x")]);
        assert_ne!(a.id(), b.id());
        assert!(a.ptr_eq(&a.clone()));
        assert!(a.as_wrapped_layout().wrapped);
    }

    #[test]
    fn templates_are_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Template>();
    }
}
