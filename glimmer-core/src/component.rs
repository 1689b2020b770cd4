//! Classic Components
//!
//! A [`ComponentClass`] describes a classic component: its layout, wrapper
//! element, bindings, positional params, actions and lifecycle hooks. A
//! [`ClassicComponent`] is one live instance. Its properties live in a
//! tracked object, so templates reading `this.foo` re-render when `foo` is
//! set, and [`ClassicComponent::rerender`] dirties a private tag that every
//! `this` read depends on.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;

use crate::dom::NodeId;
use crate::error::{RenderError, Result};
use crate::reactive::{Function, ObjectRef, Reference, Runtime, Tag, TrackedObject, Value};
use crate::template::Template;

/// How positional arguments map onto named ones.
#[derive(Debug, Clone, PartialEq)]
pub enum PositionalParams {
    /// Collect every positional argument into one array-valued argument.
    Rest(String),
    /// Map each position onto the correspondingly named argument.
    Named(Vec<String>),
}

/// Context handed to lifecycle hooks.
pub struct HookContext<'a> {
    pub rt: &'a Runtime,
    pub component: &'a ClassicComponent,
}

impl HookContext<'_> {
    pub fn get(&self, key: &str) -> Value {
        self.component.get(self.rt, key)
    }

    pub fn set(&self, key: &str, value: impl Into<Value>) -> Result<()> {
        self.component.set(self.rt, key, value)
    }
}

/// Classic lifecycle hooks. Every hook defaults to doing nothing.
#[allow(unused_variables)]
pub trait ComponentHooks {
    fn init(&self, cx: &HookContext<'_>) -> Result<()> {
        Ok(())
    }
    fn did_receive_attrs(&self, cx: &HookContext<'_>) -> Result<()> {
        Ok(())
    }
    fn did_update_attrs(&self, cx: &HookContext<'_>) -> Result<()> {
        Ok(())
    }
    fn will_render(&self, cx: &HookContext<'_>) -> Result<()> {
        Ok(())
    }
    fn will_insert_element(&self, cx: &HookContext<'_>) -> Result<()> {
        Ok(())
    }
    fn did_insert_element(&self, cx: &HookContext<'_>) -> Result<()> {
        Ok(())
    }
    fn did_render(&self, cx: &HookContext<'_>) -> Result<()> {
        Ok(())
    }
    fn will_update(&self, cx: &HookContext<'_>) -> Result<()> {
        Ok(())
    }
    fn did_update(&self, cx: &HookContext<'_>) -> Result<()> {
        Ok(())
    }
    fn will_destroy_element(&self, cx: &HookContext<'_>) -> Result<()> {
        Ok(())
    }
    fn will_clear_render(&self, cx: &HookContext<'_>) -> Result<()> {
        Ok(())
    }
    fn did_destroy_element(&self, cx: &HookContext<'_>) -> Result<()> {
        Ok(())
    }
    fn will_destroy(&self, cx: &HookContext<'_>) -> Result<()> {
        Ok(())
    }
}

/// Hooks for components that only need a template.
#[derive(Debug, Default)]
pub struct NoHooks;

impl ComponentHooks for NoHooks {}

/// An action bound to a component instance when it is created.
pub type ActionFn = Rc<dyn Fn(&Runtime, &ClassicComponent, &[Value]) -> Result<Value>>;

/// Lifecycle hook names, used for logging and hook errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hook {
    Init,
    DidReceiveAttrs,
    DidUpdateAttrs,
    WillRender,
    WillInsertElement,
    DidInsertElement,
    DidRender,
    WillUpdate,
    DidUpdate,
    WillDestroyElement,
    WillClearRender,
    DidDestroyElement,
    WillDestroy,
}

/// A classic component class.
pub struct ComponentClass {
    pub name: String,
    pub layout: Option<Template>,
    /// `None` renders a `div`; `Some("")` renders no wrapper element.
    pub tag_name: Option<String>,
    pub class_names: Vec<String>,
    /// `prop` or `prop:attr`.
    pub attribute_bindings: Vec<String>,
    pub positional_params: Option<PositionalParams>,
    pub defaults: Vec<(String, Value)>,
    pub actions: Vec<(String, ActionFn)>,
    pub hooks: Rc<dyn ComponentHooks>,
}

impl ComponentClass {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            layout: None,
            tag_name: None,
            class_names: Vec::new(),
            attribute_bindings: Vec::new(),
            positional_params: None,
            defaults: Vec::new(),
            actions: Vec::new(),
            hooks: Rc::new(NoHooks),
        }
    }

    pub fn layout(mut self, template: Template) -> Self {
        self.layout = Some(template);
        self
    }

    pub fn tag_name(mut self, tag: impl Into<String>) -> Self {
        self.tag_name = Some(tag.into());
        self
    }

    pub fn tagless(self) -> Self {
        self.tag_name("")
    }

    pub fn class_name(mut self, class: impl Into<String>) -> Self {
        self.class_names.push(class.into());
        self
    }

    pub fn attribute_binding(mut self, binding: impl Into<String>) -> Self {
        self.attribute_bindings.push(binding.into());
        self
    }

    pub fn positional_params(mut self, params: PositionalParams) -> Self {
        self.positional_params = Some(params);
        self
    }

    pub fn default_prop(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.defaults.push((key.into(), value.into()));
        self
    }

    pub fn action<F>(mut self, name: impl Into<String>, action: F) -> Self
    where
        F: Fn(&Runtime, &ClassicComponent, &[Value]) -> Result<Value> + 'static,
    {
        self.actions.push((name.into(), Rc::new(action)));
        self
    }

    pub fn hooks(mut self, hooks: impl ComponentHooks + 'static) -> Self {
        self.hooks = Rc::new(hooks);
        self
    }

    pub fn build(self) -> Rc<Self> {
        Rc::new(self)
    }

    /// Whether instances render a wrapper element.
    pub fn has_wrapper_element(&self) -> bool {
        self.tag_name.as_deref() != Some("")
    }
}

impl fmt::Debug for ComponentClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentClass")
            .field("name", &self.name)
            .field("tag_name", &self.tag_name)
            .finish_non_exhaustive()
    }
}

/// Where an instance is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    PreRender,
    HasElement,
    InDom,
    Destroying,
    Destroyed,
}

struct ComponentInner {
    class: Rc<ComponentClass>,
    props: ObjectRef,
    attrs: RefCell<IndexMap<String, Value>>,
    dirty: Tag,
    self_ref: Reference,
    element: Cell<Option<NodeId>>,
    state: Cell<LifecycleState>,
}

/// A live classic component. Clones share identity.
#[derive(Clone)]
pub struct ClassicComponent(Rc<ComponentInner>);

fn next_element_id() -> String {
    static NEXT: AtomicU64 = AtomicU64::new(0);
    format!("ember{}", NEXT.fetch_add(1, Ordering::Relaxed))
}

impl ClassicComponent {
    /// Instantiate `class` with initial properties and run `init`.
    pub fn create(rt: &Runtime, class: Rc<ComponentClass>, props: IndexMap<String, Value>) -> Result<Self> {
        Self::create_with_attrs(rt, class, props, IndexMap::new())
    }

    pub(crate) fn create_with_attrs(
        rt: &Runtime,
        class: Rc<ComponentClass>,
        props: IndexMap<String, Value>,
        attrs: IndexMap<String, Value>,
    ) -> Result<Self> {
        let object = TrackedObject::with_props(class.defaults.iter().cloned());
        for (key, value) in props {
            object.set_untracked(&key, value);
        }
        if !object.has("elementId") {
            object.set_untracked("elementId", Value::string(next_element_id()));
        }

        let dirty = Tag::dirtyable();
        let self_ref = {
            let object = object.clone();
            let dirty = dirty.clone();
            Reference::formula(move |rt| {
                rt.consume_tag(&dirty);
                Ok(Value::Object(object.clone()))
            })
            .labeled(format!("this ({})", class.name))
        };

        let component = Self(Rc::new(ComponentInner {
            class,
            props: object,
            attrs: RefCell::new(attrs),
            dirty,
            self_ref,
            element: Cell::new(None),
            state: Cell::new(LifecycleState::PreRender),
        }));
        component.install_actions();
        component.trigger(rt, Hook::Init)?;
        Ok(component)
    }

    fn install_actions(&self) {
        if self.0.class.actions.is_empty() {
            return;
        }
        let actions = TrackedObject::new();
        for (name, action) in &self.0.class.actions {
            let weak: Weak<ComponentInner> = Rc::downgrade(&self.0);
            let action = action.clone();
            let label = name.clone();
            let bound = Function::new(move |rt, args| {
                let inner = weak
                    .upgrade()
                    .ok_or_else(|| RenderError::hook(label.clone(), "component was destroyed"))?;
                action(rt, &ClassicComponent(inner), args)
            });
            actions.set_untracked(name, Value::Function(bound));
        }
        self.0.props.set_untracked("actions", Value::Object(actions));
    }

    pub fn class(&self) -> &Rc<ComponentClass> {
        &self.0.class
    }

    pub fn name(&self) -> &str {
        &self.0.class.name
    }

    pub fn props(&self) -> &ObjectRef {
        &self.0.props
    }

    /// The reference templates use as `this`.
    pub fn self_ref(&self) -> &Reference {
        &self.0.self_ref
    }

    pub fn get(&self, rt: &Runtime, key: &str) -> Value {
        self.0.props.get(rt, key)
    }

    /// Set a property. If `key` came from a two-way bound argument the
    /// write also flows back into the caller's reference.
    pub fn set(&self, rt: &Runtime, key: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        let upstream = match self.0.attrs.borrow().get(key) {
            Some(Value::Cell(cell)) => Some(cell.clone()),
            _ => None,
        };
        if let Some(cell) = upstream {
            cell.update(rt, value.clone())?;
        }
        self.0.props.set(rt, key, value);
        Ok(())
    }

    /// Set properties without writing back through two-way bindings.
    pub(crate) fn set_props(&self, rt: &Runtime, props: IndexMap<String, Value>) {
        for (key, value) in props {
            self.0.props.set(rt, &key, value);
        }
    }

    pub fn attrs(&self) -> IndexMap<String, Value> {
        self.0.attrs.borrow().clone()
    }

    pub fn attr(&self, key: &str) -> Option<Value> {
        self.0.attrs.borrow().get(key).cloned()
    }

    pub(crate) fn replace_attrs(&self, attrs: IndexMap<String, Value>) {
        *self.0.attrs.borrow_mut() = attrs;
    }

    /// Schedule a re-render of this component's layout.
    pub fn rerender(&self, rt: &Runtime) {
        rt.dirty_tag(&self.0.dirty);
    }

    pub fn element_id(&self) -> String {
        self.0.props.get_untracked("elementId").to_display_string()
    }

    pub fn element(&self) -> Option<NodeId> {
        self.0.element.get()
    }

    pub(crate) fn set_element(&self, element: Option<NodeId>) {
        self.0.element.set(element);
    }

    pub fn lifecycle_state(&self) -> LifecycleState {
        self.0.state.get()
    }

    pub(crate) fn transition_to(&self, state: LifecycleState) {
        self.0.state.set(state);
    }

    pub fn is_destroyed(&self) -> bool {
        matches!(self.0.state.get(), LifecycleState::Destroying | LifecycleState::Destroyed)
    }

    /// Invoke the action registered as `name`.
    pub fn send_action(&self, rt: &Runtime, name: &str, args: &[Value]) -> Result<Value> {
        let actions = self.0.props.get_untracked("actions");
        let action = actions
            .as_object()
            .map(|actions| actions.get_untracked(name))
            .and_then(|value| value.as_function().cloned())
            .ok_or_else(|| RenderError::assertion(format!("{} has no action named `{name}`", self.name())))?;
        action.call(rt, args)
    }

    /// Run a lifecycle hook in an untracked frame.
    pub(crate) fn trigger(&self, rt: &Runtime, hook: Hook) -> Result<()> {
        let hooks = self.0.class.hooks.clone();
        let cx = HookContext { rt, component: self };
        rt.untrack(|| match hook {
            Hook::Init => hooks.init(&cx),
            Hook::DidReceiveAttrs => hooks.did_receive_attrs(&cx),
            Hook::DidUpdateAttrs => hooks.did_update_attrs(&cx),
            Hook::WillRender => hooks.will_render(&cx),
            Hook::WillInsertElement => hooks.will_insert_element(&cx),
            Hook::DidInsertElement => hooks.did_insert_element(&cx),
            Hook::DidRender => hooks.did_render(&cx),
            Hook::WillUpdate => hooks.will_update(&cx),
            Hook::DidUpdate => hooks.did_update(&cx),
            Hook::WillDestroyElement => hooks.will_destroy_element(&cx),
            Hook::WillClearRender => hooks.will_clear_render(&cx),
            Hook::DidDestroyElement => hooks.did_destroy_element(&cx),
            Hook::WillDestroy => hooks.will_destroy(&cx),
        })
    }

    pub fn ptr_eq(&self, other: &ClassicComponent) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for ClassicComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassicComponent")
            .field("name", &self.0.class.name)
            .field("state", &self.0.state.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::MutableCell;

    struct CountInit(Rc<Cell<u32>>);

    impl ComponentHooks for CountInit {
        fn init(&self, cx: &HookContext<'_>) -> Result<()> {
            self.0.set(self.0.get() + 1);
            cx.set("initialized", true)
        }
    }

    #[test]
    fn create_applies_defaults_props_and_init() {
        let rt = Runtime::new();
        let inits = Rc::new(Cell::new(0));
        let class = ComponentClass::new("x-foo")
            .default_prop("size", "small")
            .hooks(CountInit(inits.clone()))
            .build();

        let mut props = IndexMap::new();
        props.insert("title".to_string(), Value::from("Hello"));
        let component = ClassicComponent::create(&rt, class, props).unwrap();

        assert_eq!(inits.get(), 1);
        assert_eq!(component.get(&rt, "size"), Value::from("small"));
        assert_eq!(component.get(&rt, "title"), Value::from("Hello"));
        assert_eq!(component.get(&rt, "initialized"), Value::Bool(true));
        assert!(component.element_id().starts_with("ember"));
    }

    #[test]
    fn rerender_invalidates_this() {
        let rt = Runtime::new();
        let component = ClassicComponent::create(&rt, ComponentClass::new("x").build(), IndexMap::new()).unwrap();

        let (_, tag) = rt.track(|| component.self_ref().value(&rt));
        let snapshot = tag.value();
        component.rerender(&rt);
        assert!(!tag.validate(snapshot));
    }

    #[test]
    fn set_writes_through_two_way_bindings() {
        let rt = Runtime::new();
        let upstream = Reference::cell("A");
        let mut attrs = IndexMap::new();
        attrs.insert(
            "value".to_string(),
            Value::Cell(Rc::new(MutableCell::new(upstream.clone(), Value::from("A")))),
        );
        let component = ClassicComponent::create_with_attrs(
            &rt,
            ComponentClass::new("x").build(),
            IndexMap::new(),
            attrs,
        )
        .unwrap();

        component.set(&rt, "value", "B").unwrap();
        assert_eq!(upstream.value(&rt).unwrap(), Value::from("B"));
        assert_eq!(component.get(&rt, "value"), Value::from("B"));
    }

    #[test]
    fn actions_are_bound_to_the_instance() {
        let rt = Runtime::new();
        let class = ComponentClass::new("x")
            .action("bump", |rt, component, args| {
                let by = args.first().and_then(Value::as_number).unwrap_or(1.0);
                let current = component.get(rt, "count").as_number().unwrap_or(0.0);
                component.set(rt, "count", current + by)?;
                Ok(Value::Undefined)
            })
            .build();
        let component = ClassicComponent::create(&rt, class, IndexMap::new()).unwrap();

        component.send_action(&rt, "bump", &[Value::from(2)]).unwrap();
        assert_eq!(component.get(&rt, "count"), Value::Number(2.0));
        assert!(component.send_action(&rt, "missing", &[]).is_err());
    }
}
