//! Root component manager: renders one pre-existing classic component as a
//! top-level root. It is the curly manager minus argument handling.

use std::rc::Rc;

use tracing::trace;

use super::curly::{CurlyBucket, CurlyComponentManager, CURLY_CAPABILITIES};
use super::{
    downcast, Bucket, Capabilities, ComponentDefinition, ComponentManager, CreateContext, DefinitionState,
    ElementOperations,
};
use crate::component::{ClassicComponent, Hook, LifecycleState};
use crate::dom::NodeId;
use crate::environment::Environment;
use crate::error::Result;
use crate::reactive::{Destructor, Reference, Tag};
use crate::renderer::DynamicScope;
use crate::template::{CompiledLayout, Template};

const MANAGER: &str = "root";

/// Definition state naming the component to render.
#[derive(Debug)]
pub struct RootDefinitionState {
    pub component: ClassicComponent,
    pub layout: Option<Template>,
}

/// Wraps [`CurlyComponentManager`], replacing `create`.
#[derive(Debug, Default)]
pub struct RootComponentManager {
    curly: CurlyComponentManager,
}

impl RootComponentManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// A definition rendering `component` with its class layout (or
    /// `layout` when given).
    pub fn definition(component: ClassicComponent, layout: Option<Template>) -> ComponentDefinition {
        let layout = layout.or_else(|| component.class().layout.clone());
        let name = component.name().to_string();
        ComponentDefinition::new(
            name,
            Rc::new(Self::new()),
            Rc::new(RootDefinitionState {
                component,
                layout: layout.clone(),
            }),
            layout,
        )
    }
}

impl ComponentManager for RootComponentManager {
    fn name(&self) -> &'static str {
        MANAGER
    }

    fn capabilities(&self, _state: &DefinitionState) -> Capabilities {
        CURLY_CAPABILITIES - Capabilities::PREPARE_ARGS - Capabilities::CREATE_ARGS
    }

    fn create(&self, cx: CreateContext<'_>, state: &DefinitionState) -> Result<Bucket> {
        let state = downcast::<RootDefinitionState>(state, MANAGER, "RootDefinitionState")?;
        let rt = cx.env.runtime();
        let is_interactive = cx.env.is_interactive();
        let component = state.component.clone();
        cx.dynamic_scope.view = Some(component.clone());

        if !component.class().has_wrapper_element() {
            if is_interactive {
                component.trigger(rt, Hook::WillRender)?;
            }
            component.transition_to(LifecycleState::HasElement);
            if is_interactive {
                component.trigger(rt, Hook::WillInsertElement)?;
            }
        }
        trace!(component = %component.name(), "root component created");

        Ok(Rc::new(CurlyBucket::new(
            component,
            None,
            Tag::constant(),
            is_interactive,
            state.layout.clone(),
        )))
    }

    fn get_self(&self, bucket: &Bucket) -> Result<Reference> {
        self.curly.get_self(bucket)
    }

    fn get_debug_name(&self, state: &DefinitionState) -> String {
        downcast::<RootDefinitionState>(state, MANAGER, "RootDefinitionState")
            .map(|state| state.component.name().to_string())
            .unwrap_or_else(|_| MANAGER.to_string())
    }

    fn get_dynamic_layout(&self, env: &Environment, bucket: &Bucket) -> Result<Option<CompiledLayout>> {
        self.curly.get_dynamic_layout(env, bucket)
    }

    fn get_tag_name(&self, bucket: &Bucket) -> Result<Option<String>> {
        self.curly.get_tag_name(bucket)
    }

    fn did_create_element(
        &self,
        env: &Environment,
        bucket: &Bucket,
        element: NodeId,
        operations: &mut ElementOperations,
    ) -> Result<()> {
        self.curly.did_create_element(env, bucket, element, operations)
    }

    fn did_create(&self, env: &Environment, bucket: &Bucket) -> Result<()> {
        self.curly.did_create(env, bucket)
    }

    fn update(&self, env: &Environment, bucket: &Bucket, dynamic_scope: &DynamicScope) -> Result<()> {
        self.curly.update(env, bucket, dynamic_scope)
    }

    fn did_update(&self, env: &Environment, bucket: &Bucket) -> Result<()> {
        self.curly.did_update(env, bucket)
    }

    fn get_destroyable(&self, env: &Environment, bucket: &Bucket) -> Option<Destructor> {
        self.curly.get_destroyable(env, bucket)
    }
}
