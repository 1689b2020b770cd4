//! Internal and template-only component managers.
//!
//! Internal components are framework-private (the built-in `Textarea`).
//! They validate their arguments up front, outside any tracking frame, and
//! expose a read-only `this`. Template-only components have no instance at
//! all: their layout sees only `@args`.

use std::rc::Rc;

use super::{downcast, Bucket, Capabilities, ComponentDefinition, ComponentManager, CreateContext, DefinitionState};
use crate::error::{RenderError, Result};
use crate::reactive::{ObjectRef, Reference, Runtime, TrackedObject, Value};
use crate::template::{ElementNode, Expr, Node, Template};
use crate::vm::CapturedArgs;

const INTERNAL: &str = "internal";
const TEMPLATE_ONLY: &str = "template-only";

/// Checks an internal component's arguments. Runs untracked.
pub type ArgsValidator = fn(&Runtime, &CapturedArgs) -> Result<()>;

/// Definition state for an internal component.
pub struct InternalDefinitionState {
    pub name: &'static str,
    pub validate: ArgsValidator,
}

/// An internal component instance.
pub struct InternalComponent {
    pub args: CapturedArgs,
    pub caller: Reference,
    pub instance: ObjectRef,
    self_ref: Reference,
}

#[derive(Debug, Default)]
pub struct InternalComponentManager;

impl ComponentManager for InternalComponentManager {
    fn name(&self) -> &'static str {
        INTERNAL
    }

    fn capabilities(&self, _state: &DefinitionState) -> Capabilities {
        Capabilities::CREATE_ARGS | Capabilities::CREATE_CALLER | Capabilities::CREATE_INSTANCE
    }

    fn create(&self, cx: CreateContext<'_>, state: &DefinitionState) -> Result<Bucket> {
        let state = downcast::<InternalDefinitionState>(state, INTERNAL, "InternalDefinitionState")?;
        let rt = cx.env.runtime();
        rt.untrack(|| (state.validate)(rt, cx.args))?;

        let instance = TrackedObject::with_props([("name", Value::string(state.name))]);
        let self_ref = Reference::readonly(&Reference::constant(Value::Object(instance.clone())));
        Ok(Rc::new(InternalComponent {
            args: cx.args.clone(),
            caller: cx.caller.clone(),
            instance,
            self_ref,
        }))
    }

    fn get_self(&self, bucket: &Bucket) -> Result<Reference> {
        let bucket = downcast::<InternalComponent>(bucket, INTERNAL, "InternalComponent")?;
        Ok(bucket.self_ref.clone())
    }

    fn get_debug_name(&self, state: &DefinitionState) -> String {
        downcast::<InternalDefinitionState>(state, INTERNAL, "InternalDefinitionState")
            .map(|state| state.name.to_string())
            .unwrap_or_else(|_| INTERNAL.to_string())
    }
}

fn validate_textarea(_rt: &Runtime, args: &CapturedArgs) -> Result<()> {
    if !args.positional.is_empty() {
        return Err(RenderError::assertion(
            "the `Textarea` component does not take any positional arguments",
        ));
    }
    Ok(())
}

/// The built-in `Textarea` component.
pub fn textarea_definition() -> ComponentDefinition {
    let layout = Template::new(
        "Textarea",
        vec![ElementNode::new("textarea")
            .attr("class", Expr::lit("ember-text-area"))
            .attr("placeholder", Expr::arg("placeholder"))
            .child(Node::append(Expr::arg("value")))
            .into()],
    );
    ComponentDefinition::new(
        "Textarea",
        Rc::new(InternalComponentManager),
        Rc::new(InternalDefinitionState {
            name: "Textarea",
            validate: validate_textarea,
        }),
        Some(layout),
    )
}

/// Manager for components that are nothing but a template.
#[derive(Debug, Default)]
pub struct TemplateOnlyManager;

impl ComponentManager for TemplateOnlyManager {
    fn name(&self) -> &'static str {
        TEMPLATE_ONLY
    }

    fn capabilities(&self, _state: &DefinitionState) -> Capabilities {
        Capabilities::CREATE_ARGS
    }

    fn create(&self, _cx: CreateContext<'_>, _state: &DefinitionState) -> Result<Bucket> {
        Ok(Rc::new(()))
    }

    fn get_self(&self, _bucket: &Bucket) -> Result<Reference> {
        Ok(Reference::undefined())
    }

    fn get_debug_name(&self, state: &DefinitionState) -> String {
        state
            .downcast_ref::<String>()
            .cloned()
            .unwrap_or_else(|| TEMPLATE_ONLY.to_string())
    }
}

/// A template-only definition for `template`.
pub fn template_only_definition(name: &str, template: Template) -> ComponentDefinition {
    ComponentDefinition::new(
        name,
        Rc::new(TemplateOnlyManager),
        Rc::new(name.to_string()),
        Some(template),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::Environment;
    use crate::owner::Owner;
    use crate::renderer::DynamicScope;

    #[test]
    fn internal_self_is_readonly() {
        let env = Environment::new();
        let owner = Owner::new("app");
        let definition = textarea_definition();
        let args = CapturedArgs::new().with_named("value", Reference::cell("hi"));
        let mut scope = DynamicScope::default();
        let caller = Reference::undefined();

        let bucket = definition
            .manager
            .create(
                CreateContext {
                    env: &env,
                    owner: &owner,
                    args: &args,
                    dynamic_scope: &mut scope,
                    caller: &caller,
                },
                &definition.state,
            )
            .unwrap();
        let this = definition.manager.get_self(&bucket).unwrap();
        assert!(!this.is_updatable());
        assert!(definition.capabilities.contains(Capabilities::CREATE_INSTANCE));
        assert!(!definition.capabilities.contains(Capabilities::UPDATE_HOOK));
    }

    #[test]
    fn textarea_rejects_positional_args() {
        let env = Environment::new();
        let owner = Owner::new("app");
        let definition = textarea_definition();
        let args = CapturedArgs::new().with_positional(Reference::constant("oops"));
        let mut scope = DynamicScope::default();
        let caller = Reference::undefined();

        let result = definition.manager.create(
            CreateContext {
                env: &env,
                owner: &owner,
                args: &args,
                dynamic_scope: &mut scope,
                caller: &caller,
            },
            &definition.state,
        );
        assert!(result.is_err());
        assert!(!env.runtime().is_tracking());
    }
}
