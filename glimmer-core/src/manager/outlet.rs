//! Outlets
//!
//! Routing hands the renderer a tree of [`OutletState`]s. Each `{{outlet}}`
//! renders the `main` child of the state it sees in the dynamic scope and
//! passes that child down, so nested outlets render one level deeper.

use std::rc::Rc;

use indexmap::IndexMap;

use super::{downcast, Bucket, Capabilities, ComponentDefinition, ComponentManager, CreateContext, DefinitionState};
use crate::error::Result;
use crate::owner::Owner;
use crate::reactive::{Reference, Runtime, Value};
use crate::template::{Node, Template};

const MANAGER: &str = "outlet";

/// What one outlet level renders.
#[derive(Clone)]
pub struct RenderState {
    pub name: String,
    pub owner: Owner,
    /// The template's `this`.
    pub controller: Value,
    /// Exposed to the template as `@model`.
    pub model: Value,
    pub template: Option<Template>,
}

/// One level of the outlet tree.
#[derive(Clone, Default)]
pub struct OutletState {
    pub render: Option<RenderState>,
    pub outlets: IndexMap<String, Rc<OutletState>>,
}

impl OutletState {
    pub fn new(render: RenderState) -> Self {
        Self {
            render: Some(render),
            outlets: IndexMap::new(),
        }
    }

    pub fn with_outlet(mut self, name: impl Into<String>, state: OutletState) -> Self {
        self.outlets.insert(name.into(), Rc::new(state));
        self
    }
}

/// Read an outlet state out of a reference holding one.
pub fn outlet_state_of(rt: &Runtime, reference: &Reference) -> Result<Option<Rc<OutletState>>> {
    Ok(reference
        .value(rt)?
        .as_opaque()
        .and_then(|opaque| opaque.downcast::<OutletState>()))
}

/// A reference to the `main` child of the outlet state in `parent`.
pub fn main_outlet_ref(parent: &Reference) -> Reference {
    let parent = parent.clone();
    Reference::formula(move |rt| {
        Ok(outlet_state_of(rt, &parent)?
            .and_then(|state| state.outlets.get("main").cloned())
            .map(Value::opaque)
            .unwrap_or(Value::Undefined))
    })
    .labeled("outlet:main")
}

/// Definition state for one outlet level.
pub struct OutletDefinitionState {
    pub name: String,
    /// This level's outlet state.
    pub level: Reference,
    pub template: Template,
}

pub struct OutletBucket {
    self_ref: Reference,
}

#[derive(Debug, Default)]
pub struct OutletComponentManager;

impl OutletComponentManager {
    /// A definition rendering `render` at the level held by `level`.
    pub fn definition(level: Reference, render: &RenderState) -> Option<ComponentDefinition> {
        let template = render.template.clone()?;
        Some(ComponentDefinition::new(
            render.name.clone(),
            Rc::new(Self),
            Rc::new(OutletDefinitionState {
                name: render.name.clone(),
                level,
                template: template.clone(),
            }),
            Some(template),
        ))
    }
}

/// A reference to `key` of the render state at `level`.
pub fn render_state_ref(level: &Reference, key: &'static str) -> Reference {
    let level = level.clone();
    Reference::formula(move |rt| {
        let render = outlet_state_of(rt, &level)?.and_then(|state| state.render.clone());
        Ok(match (render, key) {
            (Some(render), "controller") => render.controller,
            (Some(render), "model") => render.model,
            _ => Value::Undefined,
        })
    })
}

impl ComponentManager for OutletComponentManager {
    fn name(&self) -> &'static str {
        MANAGER
    }

    fn capabilities(&self, _state: &DefinitionState) -> Capabilities {
        Capabilities::DYNAMIC_SCOPE | Capabilities::CREATE_INSTANCE
    }

    fn create(&self, cx: CreateContext<'_>, state: &DefinitionState) -> Result<Bucket> {
        let state = downcast::<OutletDefinitionState>(state, MANAGER, "OutletDefinitionState")?;
        cx.dynamic_scope.outlet_state = state.level.clone();
        Ok(Rc::new(OutletBucket {
            self_ref: render_state_ref(&state.level, "controller"),
        }))
    }

    fn get_self(&self, bucket: &Bucket) -> Result<Reference> {
        Ok(downcast::<OutletBucket>(bucket, MANAGER, "OutletBucket")?.self_ref.clone())
    }

    fn get_debug_name(&self, state: &DefinitionState) -> String {
        downcast::<OutletDefinitionState>(state, MANAGER, "OutletDefinitionState")
            .map(|state| state.name.clone())
            .unwrap_or_else(|_| MANAGER.to_string())
    }
}

/// A top-level view rendering an outlet tree.
pub struct OutletView {
    owner: Owner,
    state: Reference,
    template: Template,
}

impl OutletView {
    pub fn new(owner: Owner) -> Self {
        Self {
            owner,
            state: Reference::cell(Value::Undefined).labeled("outlet view state"),
            template: Template::new("-outlet", vec![Node::Outlet]),
        }
    }

    pub fn owner(&self) -> &Owner {
        &self.owner
    }

    pub fn template(&self) -> &Template {
        &self.template
    }

    /// Replace the whole outlet tree.
    pub fn set_outlet_state(&self, rt: &Runtime, state: OutletState) -> Result<()> {
        self.state.update(rt, Value::opaque(Rc::new(state)))
    }

    /// The reference seen as the root outlet level: its `main` outlet is
    /// the view's current state.
    pub fn root_ref(&self) -> Reference {
        let state = self.state.clone();
        Reference::formula(move |rt| {
            let mut root = OutletState::default();
            if let Some(main) = outlet_state_of(rt, &state)? {
                root.outlets.insert("main".to_string(), main);
            }
            Ok(Value::opaque(Rc::new(root)))
        })
        .labeled("outlet view root")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::TrackedObject;

    fn render_state(name: &str, owner: &Owner) -> RenderState {
        RenderState {
            name: name.to_string(),
            owner: owner.clone(),
            controller: Value::Object(TrackedObject::with_props([("title", Value::from(name))])),
            model: Value::from(name),
            template: Some(Template::new(name, vec![Node::text(name)])),
        }
    }

    #[test]
    fn main_outlet_follows_the_view_state() {
        let rt = Runtime::new();
        let owner = Owner::new("app");
        let view = OutletView::new(owner.clone());
        let main = main_outlet_ref(&view.root_ref());

        assert!(outlet_state_of(&rt, &main).unwrap().is_none());

        view.set_outlet_state(&rt, OutletState::new(render_state("application", &owner)))
            .unwrap();
        let state = outlet_state_of(&rt, &main).unwrap().unwrap();
        assert_eq!(state.render.as_ref().unwrap().name, "application");
        assert_eq!(
            render_state_ref(&main, "model").value(&rt).unwrap(),
            Value::from("application")
        );
    }

    #[test]
    fn nested_outlets_descend_one_level() {
        let rt = Runtime::new();
        let owner = Owner::new("app");
        let view = OutletView::new(owner.clone());
        view.set_outlet_state(
            &rt,
            OutletState::new(render_state("application", &owner))
                .with_outlet("main", OutletState::new(render_state("posts", &owner))),
        )
        .unwrap();

        let first = main_outlet_ref(&view.root_ref());
        let second = main_outlet_ref(&first);
        let state = outlet_state_of(&rt, &second).unwrap().unwrap();
        assert_eq!(state.render.as_ref().unwrap().name, "posts");
        assert!(outlet_state_of(&rt, &main_outlet_ref(&second)).unwrap().is_none());
    }
}
