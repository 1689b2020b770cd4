//! Mount manager: `{{mount "engine" model=...}}`.
//!
//! Each invocation builds and boots one engine instance with its own owner,
//! renders the engine's `application` template against its application
//! controller, and pushes later `model` changes into that controller rather
//! than rebuilding the engine.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tracing::debug;

use super::{downcast, Bucket, Capabilities, ComponentDefinition, ComponentManager, CreateContext, DefinitionState};
use crate::environment::Environment;
use crate::error::{RenderError, Result};
use crate::owner::{Owner, Registration};
use crate::reactive::{Destructor, ObjectRef, Reference, Revision, Tag, TrackedObject, Value};
use crate::renderer::DynamicScope;
use crate::template::CompiledLayout;

const MANAGER: &str = "mount";

#[derive(Debug)]
pub struct MountDefinitionState {
    pub name: String,
}

pub struct MountBucket {
    pub engine: Owner,
    pub controller: ObjectRef,
    model: Option<Reference>,
    model_tag: RefCell<Tag>,
    model_revision: Cell<Revision>,
    self_ref: Reference,
}

#[derive(Debug, Default)]
pub struct MountManager;

impl MountManager {
    pub fn definition(name: &str) -> ComponentDefinition {
        ComponentDefinition::new(
            name,
            Rc::new(Self),
            Rc::new(MountDefinitionState { name: name.to_string() }),
            None,
        )
    }

    fn bucket(bucket: &Bucket) -> Result<Rc<MountBucket>> {
        downcast::<MountBucket>(bucket, MANAGER, "MountBucket")
    }
}

/// The engine's application controller, generated when the engine does not
/// register one.
fn application_controller(engine: &Owner) -> Result<ObjectRef> {
    const FULL_NAME: &str = "controller:application";
    if let Some(Value::Object(controller)) = engine.lookup(FULL_NAME) {
        return Ok(controller);
    }
    let controller = TrackedObject::new();
    engine.register(FULL_NAME, Registration::Instance(Value::Object(controller.clone())))?;
    Ok(controller)
}

impl ComponentManager for MountManager {
    fn name(&self) -> &'static str {
        MANAGER
    }

    fn capabilities(&self, _state: &DefinitionState) -> Capabilities {
        Capabilities::DYNAMIC_LAYOUT
            | Capabilities::CREATE_CALLER
            | Capabilities::DYNAMIC_SCOPE
            | Capabilities::UPDATE_HOOK
            | Capabilities::CREATE_INSTANCE
            | Capabilities::HAS_SUB_OWNER
    }

    fn create(&self, cx: CreateContext<'_>, state: &DefinitionState) -> Result<Bucket> {
        let state = downcast::<MountDefinitionState>(state, MANAGER, "MountDefinitionState")?;
        let rt = cx.env.runtime();

        let engine = cx.owner.build_child_engine_instance(&state.name)?;
        engine.boot();
        let controller = application_controller(&engine)?;
        debug!(engine = %state.name, id = engine.id(), "engine mounted");

        let model = cx.args.named("model").cloned();
        let (value, model_tag) = match &model {
            Some(model) => {
                let (value, tag) = rt.track(|| model.value(rt));
                (Some(value?), tag)
            }
            None => (None, Tag::constant()),
        };
        rt.consume_tag(&model_tag);
        if let Some(value) = value {
            controller.set_untracked("model", value);
        }

        Ok(Rc::new(MountBucket {
            engine,
            self_ref: Reference::constant(Value::Object(controller.clone())),
            controller,
            model,
            model_revision: Cell::new(model_tag.value()),
            model_tag: RefCell::new(model_tag),
        }))
    }

    fn get_self(&self, bucket: &Bucket) -> Result<Reference> {
        Ok(Self::bucket(bucket)?.self_ref.clone())
    }

    fn get_debug_name(&self, state: &DefinitionState) -> String {
        downcast::<MountDefinitionState>(state, MANAGER, "MountDefinitionState")
            .map(|state| state.name.clone())
            .unwrap_or_else(|_| MANAGER.to_string())
    }

    fn get_dynamic_layout(&self, _env: &Environment, bucket: &Bucket) -> Result<Option<CompiledLayout>> {
        let bucket = Self::bucket(bucket)?;
        let template = bucket.engine.template("application").ok_or_else(|| {
            RenderError::assertion(format!(
                "engine `{}` has no `template:application` registered",
                bucket.engine.name()
            ))
        })?;
        Ok(Some(template.as_layout()))
    }

    fn get_owner(&self, bucket: &Bucket) -> Option<Owner> {
        Self::bucket(bucket).ok().map(|bucket| bucket.engine.clone())
    }

    fn update(&self, env: &Environment, bucket: &Bucket, _dynamic_scope: &DynamicScope) -> Result<()> {
        let bucket = Self::bucket(bucket)?;
        let rt = env.runtime();
        let current = bucket.model_tag.borrow().clone();
        let Some(model) = &bucket.model else {
            return Ok(());
        };
        if current.validate(bucket.model_revision.get()) {
            rt.consume_tag(&current);
            return Ok(());
        }

        let (value, tag) = rt.track(|| model.value(rt));
        let value = value?;
        bucket.model_revision.set(tag.value());
        rt.consume_tag(&tag);
        *bucket.model_tag.borrow_mut() = tag;
        bucket.controller.set(rt, "model", value);
        Ok(())
    }

    fn get_destroyable(&self, _env: &Environment, bucket: &Bucket) -> Option<Destructor> {
        let bucket = Self::bucket(bucket).ok()?;
        Some(Box::new(move |rt| {
            bucket.engine.destroy(rt);
            Ok(())
        }))
    }
}
