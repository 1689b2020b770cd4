//! Manager Protocol
//!
//! Managers decouple *how* an invocable construct (component, helper,
//! modifier) is created, updated and destroyed from *how* the VM walks the
//! render tree. The VM only ever talks to the traits in this module.
//!
//! # Capabilities
//!
//! Every component manager declares a [`Capabilities`] set. The VM consults
//! it before calling any optional hook, so a manager implements the full
//! trait but only the hooks its capabilities name are ever invoked.
//!
//! # State and buckets
//!
//! A definition carries manager-specific *state* and an instance is an
//! opaque *bucket*. Both are `Rc<dyn Any>`; managers downcast them and
//! report [`RenderError::ManagerMismatch`] when handed something foreign.

pub mod action;
pub mod curly;
pub mod helper;
pub mod internal;
pub mod mount;
pub mod outlet;
pub mod root;

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use bitflags::bitflags;

use crate::dom::NodeId;
use crate::environment::Environment;
use crate::error::{RenderError, Result};
use crate::owner::Owner;
use crate::reactive::{DestroyableId, Destructor, Reference};
use crate::renderer::DynamicScope;
use crate::template::{CompiledLayout, Template};
use crate::vm::CapturedArgs;

bitflags! {
    /// Optional behaviour a component manager opts into.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Capabilities: u32 {
        /// Supplies its layout at runtime through `get_dynamic_layout`.
        const DYNAMIC_LAYOUT = 1 << 0;
        /// Computes the wrapper element's tag name at runtime.
        const DYNAMIC_TAG = 1 << 1;
        /// Rewrites arguments before `create` through `prepare_args`.
        const PREPARE_ARGS = 1 << 2;
        const CREATE_ARGS = 1 << 3;
        const ATTRIBUTE_HOOK = 1 << 4;
        /// Observes the wrapper element through `did_create_element`.
        const ELEMENT_HOOK = 1 << 5;
        /// Receives the caller's `this`.
        const CREATE_CALLER = 1 << 6;
        /// Reads or writes the dynamic scope in `create`.
        const DYNAMIC_SCOPE = 1 << 7;
        const UPDATE_HOOK = 1 << 8;
        const CREATE_INSTANCE = 1 << 9;
        /// Layouts are rendered inside a wrapper element.
        const WRAPPED = 1 << 10;
        const WILL_DESTROY = 1 << 11;
        /// Instances introduce their own owner.
        const HAS_SUB_OWNER = 1 << 12;
    }
}

/// Manager-specific definition state.
pub type DefinitionState = Rc<dyn Any>;

/// A manager-specific instance.
pub type Bucket = Rc<dyn Any>;

/// Downcast a bucket or definition state, reporting the manager on failure.
pub fn downcast<T: Any>(value: &Rc<dyn Any>, manager: &'static str, expected: &'static str) -> Result<Rc<T>> {
    value
        .clone()
        .downcast::<T>()
        .map_err(|_| RenderError::ManagerMismatch { manager, expected })
}

/// An attribute value produced by a manager for the wrapper element.
#[derive(Debug, Clone)]
pub enum AttributeValue {
    Static(String),
    Dynamic(Reference),
}

/// Attribute operations collected in `did_create_element` and applied by
/// the VM. Repeated `class` values are joined with spaces.
#[derive(Debug, Default)]
pub struct ElementOperations {
    attributes: Vec<(String, AttributeValue)>,
}

impl ElementOperations {
    pub fn set_attribute(&mut self, name: impl Into<String>, value: AttributeValue) {
        self.attributes.push((name.into(), value));
    }

    pub fn set_static(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.set_attribute(name, AttributeValue::Static(value.into()));
    }

    pub fn add_class(&mut self, class: impl Into<String>) {
        self.set_static("class", class);
    }

    pub fn into_attributes(self) -> Vec<(String, AttributeValue)> {
        self.attributes
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

/// Everything `create` may need besides the definition state.
pub struct CreateContext<'a> {
    pub env: &'a Environment,
    pub owner: &'a Owner,
    pub args: &'a CapturedArgs,
    pub dynamic_scope: &'a mut DynamicScope,
    /// The caller's `this`.
    pub caller: &'a Reference,
}

/// The component manager contract.
///
/// Hooks other than `capabilities`, `create`, `get_self` and
/// `get_debug_name` have defaults so managers only implement what their
/// capabilities enable.
#[allow(unused_variables)]
pub trait ComponentManager {
    fn name(&self) -> &'static str;

    fn capabilities(&self, state: &DefinitionState) -> Capabilities;

    fn prepare_args(&self, state: &DefinitionState, args: CapturedArgs) -> Result<CapturedArgs> {
        Ok(args)
    }

    fn create(&self, cx: CreateContext<'_>, state: &DefinitionState) -> Result<Bucket>;

    fn get_self(&self, bucket: &Bucket) -> Result<Reference>;

    fn get_debug_name(&self, state: &DefinitionState) -> String;

    fn get_dynamic_layout(&self, env: &Environment, bucket: &Bucket) -> Result<Option<CompiledLayout>> {
        Ok(None)
    }

    /// The wrapper element's tag, or `None` for no wrapper.
    fn get_tag_name(&self, bucket: &Bucket) -> Result<Option<String>> {
        Ok(None)
    }

    fn get_owner(&self, bucket: &Bucket) -> Option<Owner> {
        None
    }

    fn did_create_element(
        &self,
        env: &Environment,
        bucket: &Bucket,
        element: NodeId,
        operations: &mut ElementOperations,
    ) -> Result<()> {
        Ok(())
    }

    fn did_render_layout(&self, env: &Environment, bucket: &Bucket) -> Result<()> {
        Ok(())
    }

    fn did_create(&self, env: &Environment, bucket: &Bucket) -> Result<()> {
        Ok(())
    }

    fn update(&self, env: &Environment, bucket: &Bucket, dynamic_scope: &DynamicScope) -> Result<()> {
        Ok(())
    }

    fn did_update_layout(&self, env: &Environment, bucket: &Bucket) -> Result<()> {
        Ok(())
    }

    fn did_update(&self, env: &Environment, bucket: &Bucket) -> Result<()> {
        Ok(())
    }

    /// Teardown to attach to the instance's node in the destructor graph.
    fn get_destroyable(&self, env: &Environment, bucket: &Bucket) -> Option<Destructor> {
        None
    }
}

/// The immutable (manager, state, template) triple naming an invocable
/// component.
pub struct ComponentDefinition {
    pub name: String,
    pub manager: Rc<dyn ComponentManager>,
    pub state: DefinitionState,
    pub template: Option<Template>,
    pub capabilities: Capabilities,
}

impl ComponentDefinition {
    pub fn new(
        name: impl Into<String>,
        manager: Rc<dyn ComponentManager>,
        state: DefinitionState,
        template: Option<Template>,
    ) -> Self {
        let capabilities = manager.capabilities(&state);
        Self {
            name: name.into(),
            manager,
            state,
            template,
            capabilities,
        }
    }
}

impl fmt::Debug for ComponentDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentDefinition")
            .field("name", &self.name)
            .field("manager", &self.manager.name())
            .field("capabilities", &self.capabilities)
            .finish()
    }
}

/// The helper manager contract: turn captured arguments into a reference
/// whose value is the helper's result.
pub trait HelperManager {
    fn name(&self) -> &'static str;

    /// `parent` is the destructor node of the invoking block; stateful
    /// helpers hang their instances off it.
    fn get_helper(
        &self,
        env: &Environment,
        state: &DefinitionState,
        args: CapturedArgs,
        parent: DestroyableId,
    ) -> Result<Reference>;
}

pub struct HelperDefinition {
    pub name: String,
    pub manager: Rc<dyn HelperManager>,
    pub state: DefinitionState,
}

impl fmt::Debug for HelperDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HelperDefinition")
            .field("name", &self.name)
            .field("manager", &self.manager.name())
            .finish()
    }
}

/// Everything a modifier's `create` receives.
pub struct ModifierContext<'a> {
    pub env: &'a Environment,
    pub element: NodeId,
    pub args: CapturedArgs,
    /// The invoking template's `this`.
    pub caller: &'a Reference,
}

/// The modifier manager contract. `install` and `update` run when the DOM
/// transaction commits.
#[allow(unused_variables)]
pub trait ModifierManager {
    fn name(&self) -> &'static str;

    fn create(&self, cx: ModifierContext<'_>, state: &DefinitionState) -> Result<Bucket>;

    fn install(&self, env: &Environment, bucket: &Bucket) -> Result<()>;

    fn update(&self, env: &Environment, bucket: &Bucket) -> Result<()>;

    fn get_destroyable(&self, env: &Environment, bucket: &Bucket) -> Option<Destructor> {
        None
    }
}

pub struct ModifierDefinition {
    pub name: String,
    pub manager: Rc<dyn ModifierManager>,
    pub state: DefinitionState,
}

impl fmt::Debug for ModifierDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModifierDefinition")
            .field("name", &self.name)
            .field("manager", &self.manager.name())
            .finish()
    }
}
