//! The update tree and the revalidation walk.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use tracing::trace;

use super::render::{attribute_string, render_block, render_swapped};
use super::{CapturedArgs, Scope};
use crate::dom::{ClientBuilder, Cursor, NodeId};
use crate::environment::{CommitPhase, Environment};
use crate::error::{RenderError, Result};
use crate::manager::outlet::{outlet_state_of, OutletComponentManager};
use crate::manager::{Bucket, Capabilities, ComponentDefinition, ModifierManager};
use crate::owner::Owner;
use crate::reactive::{DestroyableId, Reference, Revision, Tag, Value};
use crate::renderer::DynamicScope;
use crate::resolver::Resolver;
use crate::template::{Node, TemplateId};

/// A rendered list of ops plus the tag covering everything they read.
pub struct Block {
    ops: Vec<UpdateOp>,
    tag: Tag,
    snapshot: Revision,
}

impl Block {
    pub(super) fn new(ops: Vec<UpdateOp>, tag: Tag) -> Self {
        let snapshot = tag.value();
        Self { ops, tag, snapshot }
    }

    /// True while nothing the block read has changed.
    pub fn is_valid(&self) -> bool {
        self.tag.validate(self.snapshot)
    }

    pub fn tag(&self) -> &Tag {
        &self.tag
    }
}

pub(super) enum UpdateOp {
    Text {
        node: NodeId,
        reference: Reference,
        last: String,
    },
    Attr {
        element: NodeId,
        name: String,
        reference: Reference,
        last: Option<String>,
    },
    Cond(Box<CondOp>),
    Component(Box<ComponentOp>),
    Swap(Box<SwapOp>),
    Modifier(ModifierOp),
}

/// `{{#if}}`: one branch rendered between two anchor comments.
pub(super) struct CondOp {
    pub(super) condition: Reference,
    pub(super) then: Vec<Node>,
    pub(super) otherwise: Vec<Node>,
    pub(super) scope: Rc<Scope>,
    pub(super) truthy: bool,
    pub(super) start: NodeId,
    pub(super) end: NodeId,
    pub(super) branch: Block,
    pub(super) destroyable: DestroyableId,
}

pub(super) struct ComponentOp {
    pub(super) definition: Rc<ComponentDefinition>,
    pub(super) bucket: Bucket,
    pub(super) dynamic_scope: DynamicScope,
    pub(super) layout: Block,
    pub(super) destroyable: DestroyableId,
}

/// Where a swappable component's definition comes from.
pub(super) enum SwapSource {
    /// `{{component expr}}`: a definition or a component name.
    Dynamic(Reference),
    /// `{{outlet}}`: the render state at one outlet level. Definitions are
    /// cached per template and owner so an unchanged route keeps its DOM.
    Outlet {
        level: Reference,
        definitions: RefCell<HashMap<(TemplateId, u64), Rc<ComponentDefinition>>>,
    },
}

impl SwapSource {
    pub(super) fn resolve(&self, env: &Environment, resolver: &Resolver, owner: &Owner) -> Result<Option<Rc<ComponentDefinition>>> {
        let rt = env.runtime();
        match self {
            SwapSource::Dynamic(reference) => match reference.value(rt)? {
                Value::Undefined | Value::Null => Ok(None),
                Value::String(name) => resolver.lookup_component(&name, owner),
                Value::Opaque(opaque) => opaque.downcast::<ComponentDefinition>().map(Some).ok_or_else(|| {
                    RenderError::assertion("the `component` helper received an object that is not a component")
                }),
                other => Err(RenderError::assertion(format!(
                    "the `component` helper cannot render {other:?}"
                ))),
            },
            SwapSource::Outlet { level, definitions } => {
                let Some(state) = outlet_state_of(rt, level)? else {
                    return Ok(None);
                };
                let Some(render) = &state.render else {
                    return Ok(None);
                };
                let Some(template) = &render.template else {
                    return Ok(None);
                };
                let key = (template.id(), render.owner.id());
                if let Some(definition) = definitions.borrow().get(&key) {
                    return Ok(Some(definition.clone()));
                }
                let definition = OutletComponentManager::definition(level.clone(), render).map(Rc::new);
                if let Some(definition) = &definition {
                    definitions.borrow_mut().insert(key, definition.clone());
                }
                Ok(definition)
            }
        }
    }
}

/// A component that can be replaced by another one.
pub(super) struct SwapOp {
    pub(super) source: SwapSource,
    pub(super) args: CapturedArgs,
    pub(super) scope: Rc<Scope>,
    pub(super) current: Option<Rc<ComponentDefinition>>,
    pub(super) start: NodeId,
    pub(super) end: NodeId,
    pub(super) inner: Block,
    pub(super) destroyable: DestroyableId,
}

pub(super) struct ModifierOp {
    pub(super) manager: Rc<dyn ModifierManager>,
    pub(super) bucket: Bucket,
    pub(super) args: CapturedArgs,
    pub(super) tag: Tag,
    pub(super) snapshot: Revision,
    pub(super) destroyable: DestroyableId,
}

/// Revalidate `block`, skipping it when its tag still validates.
pub(super) fn update_block(env: &Environment, block: &mut Block, always: bool) -> Result<()> {
    let rt = env.runtime();
    if !always && block.is_valid() {
        rt.consume_tag(&block.tag);
        return Ok(());
    }

    let (result, tag) = rt.track(|| {
        for op in block.ops.iter_mut() {
            update_op(env, op, always)?;
        }
        Ok::<(), RenderError>(())
    });
    result?;
    block.snapshot = tag.value();
    rt.consume_tag(&tag);
    block.tag = tag;
    Ok(())
}

fn update_op(env: &Environment, op: &mut UpdateOp, always: bool) -> Result<()> {
    let rt = env.runtime();
    match op {
        UpdateOp::Text { node, reference, last } => {
            let text = reference.value(rt)?.to_display_string();
            if text != *last {
                env.document_mut().set_text(*node, &text);
                *last = text;
            }
            Ok(())
        }
        UpdateOp::Attr {
            element,
            name,
            reference,
            last,
        } => {
            let value = attribute_string(&reference.value(rt)?);
            if value != *last {
                let mut doc = env.document_mut();
                match &value {
                    Some(value) => doc.set_attribute(*element, name, value),
                    None => doc.remove_attribute(*element, name),
                }
                *last = value;
            }
            Ok(())
        }
        UpdateOp::Cond(cond) => update_cond(env, cond, always),
        UpdateOp::Component(component) => update_component(env, component, always),
        UpdateOp::Swap(swap) => update_swap(env, swap, always),
        UpdateOp::Modifier(modifier) => update_modifier(env, modifier),
    }
}

/// Remove every node strictly between `start` and `end`.
fn clear_between(env: &Environment, start: NodeId, end: NodeId) {
    let mut doc = env.document_mut();
    let mut next = doc.next_sibling(start);
    while let Some(node) = next {
        if node == end {
            break;
        }
        next = doc.next_sibling(node);
        doc.remove(node);
    }
}

/// A builder inserting before `end`.
fn builder_before(env: &Environment, end: NodeId) -> Result<ClientBuilder> {
    let parent = env
        .document()
        .parent(end)
        .ok_or_else(|| RenderError::assertion("block anchor is no longer in the document"))?;
    Ok(ClientBuilder::new(Cursor {
        parent,
        next_sibling: Some(end),
    }))
}

fn update_cond(env: &Environment, op: &mut CondOp, always: bool) -> Result<()> {
    let rt = env.runtime();
    let truthy = op.condition.value(rt)?.is_truthy();
    if truthy == op.truthy {
        return update_block(env, &mut op.branch, always);
    }

    trace!(truthy, "conditional switched branch");
    rt.destroyables().destroy(rt, op.destroyable)?;
    clear_between(env, op.start, op.end);

    op.destroyable = rt.destroyables().register(Some(op.scope.destroyable));
    op.truthy = truthy;
    let scope = op.scope.with_destroyable(op.destroyable);
    let nodes = if truthy { &op.then } else { &op.otherwise };
    let mut builder = builder_before(env, op.end)?;
    op.branch = render_block(env, &mut builder, &scope, nodes)?;
    Ok(())
}

fn update_component(env: &Environment, op: &mut ComponentOp, always: bool) -> Result<()> {
    let rt = env.runtime();
    let manager = op.definition.manager.clone();
    if op.definition.capabilities.contains(Capabilities::UPDATE_HOOK) {
        manager.update(env, &op.bucket, &op.dynamic_scope)?;
    }

    if !always && op.layout.is_valid() {
        rt.consume_tag(&op.layout.tag);
        return Ok(());
    }
    update_block(env, &mut op.layout, always)?;
    manager.did_update_layout(env, &op.bucket)?;

    let bucket = op.bucket.clone();
    let destroyable = op.destroyable;
    env.schedule_commit(
        CommitPhase::Updated,
        Box::new(move |env| {
            if env.runtime().destroyables().is_destroyed(destroyable) {
                return Ok(());
            }
            manager.did_update(env, &bucket)
        }),
    )
}

fn update_swap(env: &Environment, op: &mut SwapOp, always: bool) -> Result<()> {
    let rt = env.runtime();
    let next = op.source.resolve(env, &op.scope.resolver, &op.scope.owner)?;
    let unchanged = match (&op.current, &next) {
        (Some(current), Some(next)) => Rc::ptr_eq(current, next),
        (None, None) => true,
        _ => false,
    };
    if unchanged {
        return update_block(env, &mut op.inner, always);
    }

    trace!(
        from = op.current.as_ref().map(|d| d.name.as_str()),
        to = next.as_ref().map(|d| d.name.as_str()),
        "swapping component"
    );
    rt.destroyables().destroy(rt, op.destroyable)?;
    clear_between(env, op.start, op.end);

    op.destroyable = rt.destroyables().register(Some(op.scope.destroyable));
    let scope = op.scope.with_destroyable(op.destroyable);
    let mut builder = builder_before(env, op.end)?;
    op.inner = render_swapped(env, &mut builder, &scope, next.clone(), &op.args)?;
    op.current = next;
    Ok(())
}

fn update_modifier(env: &Environment, op: &mut ModifierOp) -> Result<()> {
    let rt = env.runtime();
    if op.tag.validate(op.snapshot) {
        rt.consume_tag(&op.tag);
        return Ok(());
    }

    let (result, tag) = rt.track(|| op.args.consume(rt));
    result?;
    op.snapshot = tag.value();
    rt.consume_tag(&tag);
    op.tag = tag;

    let manager = op.manager.clone();
    let bucket = op.bucket.clone();
    let destroyable = op.destroyable;
    env.schedule_commit(
        CommitPhase::UpdateModifier,
        Box::new(move |env| {
            if env.runtime().destroyables().is_destroyed(destroyable) {
                return Ok(());
            }
            manager.update(env, &bucket)
        }),
    )
}
