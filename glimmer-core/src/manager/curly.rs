//! Curly (classic) component manager.
//!
//! Classic components receive their arguments as plain properties. Every
//! argument is copied onto the instance; updatable ones are also recorded
//! as [`MutableCell`]s in `attrs` so the instance can write back into the
//! caller. Argument capture runs inside its own tracking frame and the
//! resulting tag decides whether `update` has anything to do.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::trace;

use super::{
    downcast, AttributeValue, Bucket, Capabilities, ComponentManager, CreateContext, DefinitionState,
    ElementOperations,
};
use crate::component::{ClassicComponent, ComponentClass, Hook, LifecycleState, PositionalParams};
use crate::dom::NodeId;
use crate::environment::Environment;
use crate::error::{RenderError, Result};
use crate::reactive::{Destructor, MutableCell, Reference, Revision, Runtime, Tag, TrackedObject, Value};
use crate::renderer::DynamicScope;
use crate::template::{CompiledLayout, Template};
use crate::vm::CapturedArgs;

const MANAGER: &str = "curly";

pub(crate) const CURLY_CAPABILITIES: Capabilities = Capabilities::DYNAMIC_LAYOUT
    .union(Capabilities::DYNAMIC_TAG)
    .union(Capabilities::PREPARE_ARGS)
    .union(Capabilities::CREATE_ARGS)
    .union(Capabilities::ATTRIBUTE_HOOK)
    .union(Capabilities::ELEMENT_HOOK)
    .union(Capabilities::CREATE_CALLER)
    .union(Capabilities::DYNAMIC_SCOPE)
    .union(Capabilities::UPDATE_HOOK)
    .union(Capabilities::CREATE_INSTANCE)
    .union(Capabilities::WRAPPED)
    .union(Capabilities::WILL_DESTROY);

/// Definition state for a classic component.
#[derive(Debug)]
pub struct CurlyDefinitionState {
    pub class: Rc<ComponentClass>,
    /// The class layout, or the template registered for the component.
    pub layout: Option<Template>,
}

/// A live classic component plus what the manager needs to update it.
pub struct CurlyBucket {
    pub component: ClassicComponent,
    args: Option<CapturedArgs>,
    args_tag: RefCell<Tag>,
    args_revision: Cell<Revision>,
    is_interactive: bool,
    layout: Template,
}

impl CurlyBucket {
    pub(crate) fn new(
        component: ClassicComponent,
        args: Option<CapturedArgs>,
        args_tag: Tag,
        is_interactive: bool,
        layout: Option<Template>,
    ) -> Self {
        let layout = layout.unwrap_or_else(|| Template::new(component.name(), Vec::new()));
        let args_revision = args_tag.value();
        Self {
            component,
            args,
            args_tag: RefCell::new(args_tag),
            args_revision: Cell::new(args_revision),
            is_interactive,
            layout,
        }
    }
}

struct ProcessedArgs {
    props: IndexMap<String, Value>,
    attrs: IndexMap<String, Value>,
}

/// Read every named argument, building the props bag and the legacy
/// `attrs` hash. Must run inside a tracking frame.
fn process_args(rt: &Runtime, args: &CapturedArgs) -> Result<ProcessedArgs> {
    let mut props = IndexMap::new();
    let mut attrs = IndexMap::new();
    for (name, reference) in &args.named {
        let value = reference.value(rt)?;
        let attr = if reference.is_updatable() {
            Value::Cell(Rc::new(MutableCell::new(reference.clone(), value.clone())))
        } else {
            value.clone()
        };
        attrs.insert(name.clone(), attr);
        if name == "id" {
            props.insert("elementId".to_string(), value.clone());
        }
        props.insert(name.clone(), value);
    }
    props.insert(
        "attrs".to_string(),
        Value::Object(TrackedObject::with_props(attrs.clone())),
    );
    Ok(ProcessedArgs { props, attrs })
}

/// Rewrite positional arguments into named ones per the class's
/// positional params.
pub fn apply_positional_params(class: &ComponentClass, mut args: CapturedArgs) -> Result<CapturedArgs> {
    let Some(params) = &class.positional_params else {
        return Ok(args);
    };
    if args.positional.is_empty() {
        return Ok(args);
    }

    let positional = std::mem::take(&mut args.positional);
    match params {
        PositionalParams::Rest(name) => {
            if args.has_named(name) {
                return Err(RenderError::assertion(format!(
                    "you cannot specify positional parameters and the hash argument `{name}` on {}",
                    class.name
                )));
            }
            let refs = positional;
            let collected = Reference::formula(move |rt| {
                let values = refs.iter().map(|r| r.value(rt)).collect::<Result<Vec<_>>>()?;
                Ok(Value::array(values))
            });
            args.named.insert(name.clone(), collected);
        }
        PositionalParams::Named(names) => {
            for (index, reference) in positional.into_iter().enumerate() {
                let Some(name) = names.get(index) else {
                    break;
                };
                if args.has_named(name) {
                    return Err(RenderError::assertion(format!(
                        "you cannot specify both a positional param (at position {index}) and the hash argument `{name}` on {}",
                        class.name
                    )));
                }
                args.named.insert(name.clone(), reference);
            }
        }
    }
    Ok(args)
}

/// Manager for classic components.
#[derive(Debug, Default)]
pub struct CurlyComponentManager;

impl CurlyComponentManager {
    pub fn new() -> Self {
        Self
    }

    pub(crate) fn bucket(bucket: &Bucket) -> Result<Rc<CurlyBucket>> {
        downcast::<CurlyBucket>(bucket, MANAGER, "CurlyBucket")
    }
}

impl ComponentManager for CurlyComponentManager {
    fn name(&self) -> &'static str {
        MANAGER
    }

    fn capabilities(&self, _state: &DefinitionState) -> Capabilities {
        CURLY_CAPABILITIES
    }

    fn prepare_args(&self, state: &DefinitionState, args: CapturedArgs) -> Result<CapturedArgs> {
        let state = downcast::<CurlyDefinitionState>(state, MANAGER, "CurlyDefinitionState")?;
        apply_positional_params(&state.class, args)
    }

    fn create(&self, cx: CreateContext<'_>, state: &DefinitionState) -> Result<Bucket> {
        let state = downcast::<CurlyDefinitionState>(state, MANAGER, "CurlyDefinitionState")?;
        let rt = cx.env.runtime();
        let is_interactive = cx.env.is_interactive();

        let (processed, args_tag) = rt.track(|| process_args(rt, cx.args));
        let ProcessedArgs { props, attrs } = processed?;
        rt.consume_tag(&args_tag);

        let component = ClassicComponent::create_with_attrs(rt, state.class.clone(), props, attrs)?;
        cx.dynamic_scope.view = Some(component.clone());

        component.trigger(rt, Hook::DidReceiveAttrs)?;
        if is_interactive {
            component.trigger(rt, Hook::WillRender)?;
        }
        if !state.class.has_wrapper_element() {
            component.transition_to(LifecycleState::HasElement);
            if is_interactive {
                component.trigger(rt, Hook::WillInsertElement)?;
            }
        }
        trace!(component = %state.class.name, "curly component created");

        Ok(Rc::new(CurlyBucket::new(
            component,
            Some(cx.args.clone()),
            args_tag,
            is_interactive,
            state.layout.clone(),
        )))
    }

    fn get_self(&self, bucket: &Bucket) -> Result<Reference> {
        Ok(Self::bucket(bucket)?.component.self_ref().clone())
    }

    fn get_debug_name(&self, state: &DefinitionState) -> String {
        downcast::<CurlyDefinitionState>(state, MANAGER, "CurlyDefinitionState")
            .map(|state| state.class.name.clone())
            .unwrap_or_else(|_| MANAGER.to_string())
    }

    fn get_dynamic_layout(&self, _env: &Environment, bucket: &Bucket) -> Result<Option<CompiledLayout>> {
        let bucket = Self::bucket(bucket)?;
        let layout = if bucket.component.class().has_wrapper_element() {
            bucket.layout.as_wrapped_layout()
        } else {
            bucket.layout.as_layout()
        };
        Ok(Some(layout))
    }

    fn get_tag_name(&self, bucket: &Bucket) -> Result<Option<String>> {
        let bucket = Self::bucket(bucket)?;
        let class = bucket.component.class();
        Ok(match class.tag_name.as_deref() {
            Some("") => None,
            Some(tag) => Some(tag.to_string()),
            None => Some("div".to_string()),
        })
    }

    fn did_create_element(
        &self,
        env: &Environment,
        bucket: &Bucket,
        element: NodeId,
        operations: &mut ElementOperations,
    ) -> Result<()> {
        let bucket = Self::bucket(bucket)?;
        let component = &bucket.component;
        component.set_element(Some(element));
        component.transition_to(LifecycleState::HasElement);

        operations.set_static("id", component.element_id());
        operations.add_class("ember-view");
        for class in &component.class().class_names {
            operations.add_class(class.clone());
        }
        for binding in &component.class().attribute_bindings {
            let (prop, attr) = binding.split_once(':').unwrap_or((binding.as_str(), binding.as_str()));
            operations.set_attribute(attr, AttributeValue::Dynamic(component.self_ref().child(prop)));
        }

        if bucket.is_interactive {
            component.trigger(env.runtime(), Hook::WillInsertElement)?;
        }
        Ok(())
    }

    fn did_create(&self, env: &Environment, bucket: &Bucket) -> Result<()> {
        let bucket = Self::bucket(bucket)?;
        if bucket.is_interactive {
            let rt = env.runtime();
            bucket.component.transition_to(LifecycleState::InDom);
            bucket.component.trigger(rt, Hook::DidInsertElement)?;
            bucket.component.trigger(rt, Hook::DidRender)?;
        }
        Ok(())
    }

    fn update(&self, env: &Environment, bucket: &Bucket, _dynamic_scope: &DynamicScope) -> Result<()> {
        let bucket = Self::bucket(bucket)?;
        let rt = env.runtime();

        let current = bucket.args_tag.borrow().clone();
        if current.validate(bucket.args_revision.get()) {
            rt.consume_tag(&current);
            return Ok(());
        }
        let Some(args) = &bucket.args else {
            rt.consume_tag(&current);
            return Ok(());
        };

        let (processed, args_tag) = rt.track(|| process_args(rt, args));
        let ProcessedArgs { props, attrs } = processed?;
        bucket.args_revision.set(args_tag.value());
        rt.consume_tag(&args_tag);
        *bucket.args_tag.borrow_mut() = args_tag;

        let component = &bucket.component;
        component.replace_attrs(attrs);
        component.set_props(rt, props);
        component.trigger(rt, Hook::DidUpdateAttrs)?;
        component.trigger(rt, Hook::DidReceiveAttrs)?;
        if bucket.is_interactive {
            component.trigger(rt, Hook::WillUpdate)?;
            component.trigger(rt, Hook::WillRender)?;
        }
        trace!(component = %component.name(), "curly component updated");
        Ok(())
    }

    fn did_update(&self, env: &Environment, bucket: &Bucket) -> Result<()> {
        let bucket = Self::bucket(bucket)?;
        if bucket.is_interactive {
            let rt = env.runtime();
            bucket.component.trigger(rt, Hook::DidUpdate)?;
            bucket.component.trigger(rt, Hook::DidRender)?;
        }
        Ok(())
    }

    fn get_destroyable(&self, _env: &Environment, bucket: &Bucket) -> Option<Destructor> {
        let bucket = Self::bucket(bucket).ok()?;
        Some(Box::new(move |rt| destroy_component(rt, &bucket)))
    }
}

fn destroy_component(rt: &Runtime, bucket: &CurlyBucket) -> Result<()> {
    let component = &bucket.component;
    if bucket.is_interactive {
        component.trigger(rt, Hook::WillDestroyElement)?;
        component.trigger(rt, Hook::WillClearRender)?;
    }
    component.transition_to(LifecycleState::Destroying);
    if bucket.is_interactive {
        component.trigger(rt, Hook::DidDestroyElement)?;
    }
    component.trigger(rt, Hook::WillDestroy)?;
    component.set_element(None);
    component.transition_to(LifecycleState::Destroyed);
    trace!(component = %component.name(), "curly component destroyed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::owner::Owner;

    fn class_with(params: PositionalParams) -> ComponentClass {
        ComponentClass::new("my-component").positional_params(params)
    }

    #[test]
    fn named_positional_params_map_by_position() {
        let rt = Runtime::new();
        let class = class_with(PositionalParams::Named(vec!["name".into(), "age".into()]));
        let args = CapturedArgs::new().with_positional(Reference::constant("Alice"));

        let args = apply_positional_params(&class, args).unwrap();
        assert!(args.positional.is_empty());
        assert_eq!(args.named("name").unwrap().value(&rt).unwrap(), Value::from("Alice"));
        assert!(!args.has_named("age"));
    }

    #[test]
    fn positional_param_colliding_with_named_arg_fails() {
        let class = class_with(PositionalParams::Named(vec!["name".into()]));
        let args = CapturedArgs::new()
            .with_positional(Reference::constant("Alice"))
            .with_named("name", Reference::constant("Bob"));

        assert!(matches!(
            apply_positional_params(&class, args),
            Err(RenderError::Assertion(_))
        ));
    }

    #[test]
    fn rest_positional_params_collect_into_an_array() {
        let rt = Runtime::new();
        let class = class_with(PositionalParams::Rest("items".into()));
        let second = Reference::cell("b");
        let args = CapturedArgs::new()
            .with_positional(Reference::constant("a"))
            .with_positional(second.clone());

        let args = apply_positional_params(&class, args).unwrap();
        let items = args.named("items").unwrap().clone();
        assert_eq!(
            items.value(&rt).unwrap(),
            Value::array([Value::from("a"), Value::from("b")])
        );
        second.update(&rt, "c").unwrap();
        assert_eq!(
            items.value(&rt).unwrap(),
            Value::array([Value::from("a"), Value::from("c")])
        );
    }

    #[test]
    fn update_is_a_no_op_while_args_are_fresh() {
        let env = Environment::new();
        let rt = env.runtime();
        let owner = Owner::new("app");
        let title = Reference::cell("one");
        let args = CapturedArgs::new().with_named("title", title.clone());
        let state: DefinitionState = Rc::new(CurlyDefinitionState {
            class: ComponentClass::new("x-title").build(),
            layout: None,
        });
        let manager = CurlyComponentManager::new();
        let mut scope = DynamicScope::default();
        let caller = Reference::undefined();

        let bucket = manager
            .create(
                CreateContext {
                    env: &env,
                    owner: &owner,
                    args: &args,
                    dynamic_scope: &mut scope,
                    caller: &caller,
                },
                &state,
            )
            .unwrap();
        let component = CurlyComponentManager::bucket(&bucket).unwrap().component.clone();
        assert_eq!(component.get(rt, "title"), Value::from("one"));
        assert!(matches!(component.attr("title"), Some(Value::Cell(_))));
        assert!(scope.view.is_some());

        let before = rt.current_revision();
        manager.update(&env, &bucket, &scope).unwrap();
        assert_eq!(rt.current_revision(), before);

        title.update(rt, "two").unwrap();
        manager.update(&env, &bucket, &scope).unwrap();
        assert_eq!(component.get(rt, "title"), Value::from("two"));
    }
}
