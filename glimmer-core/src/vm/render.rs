//! Initial render: walks template nodes once, producing DOM through the
//! element builder and the update ops that keep it current.

use std::collections::HashMap;
use std::rc::Rc;

use tracing::{debug, trace};

use super::update::{Block, ComponentOp, CondOp, ModifierOp, SwapOp, SwapSource, UpdateOp};
use super::{CapturedArgs, Scope};
use crate::dom::{ElementBuilder, NodeId};
use crate::environment::{CommitPhase, Environment};
use crate::error::{RenderError, Result};
use crate::manager::mount::MountManager;
use crate::manager::outlet::{main_outlet_ref, render_state_ref};
use crate::manager::{AttributeValue, Bucket, Capabilities, ComponentDefinition, CreateContext, ElementOperations, ModifierContext};
use crate::reactive::{Reference, Value};
use crate::template::{Call, CompiledLayout, ElementNode, Expr, Node, Template};

/// The textual form of an attribute value, or `None` to leave it off.
pub(super) fn attribute_string(value: &Value) -> Option<String> {
    match value {
        Value::Undefined | Value::Null | Value::Bool(false) => None,
        Value::Bool(true) => Some(String::new()),
        other => Some(other.to_display_string()),
    }
}

/// Render `nodes` in a fresh tracking frame and return their block.
pub(super) fn render_block(
    env: &Environment,
    builder: &mut dyn ElementBuilder,
    scope: &Rc<Scope>,
    nodes: &[Node],
) -> Result<Block> {
    tracked_block(env, |ops| render_nodes(env, builder, scope, nodes, ops))
}

/// Run `f` in a tracking frame, collecting the ops it pushes into a block.
/// The block's tag is consumed by the enclosing frame.
pub(super) fn tracked_block(
    env: &Environment,
    f: impl FnOnce(&mut Vec<UpdateOp>) -> Result<()>,
) -> Result<Block> {
    let rt = env.runtime();
    let mut ops = Vec::new();
    let (result, tag) = rt.track(|| f(&mut ops));
    result?;
    rt.consume_tag(&tag);
    Ok(Block::new(ops, tag))
}

fn render_nodes(
    env: &Environment,
    builder: &mut dyn ElementBuilder,
    scope: &Rc<Scope>,
    nodes: &[Node],
    ops: &mut Vec<UpdateOp>,
) -> Result<()> {
    for node in nodes {
        render_node(env, builder, scope, node, ops)?;
    }
    Ok(())
}

fn render_node(
    env: &Environment,
    builder: &mut dyn ElementBuilder,
    scope: &Rc<Scope>,
    node: &Node,
    ops: &mut Vec<UpdateOp>,
) -> Result<()> {
    match node {
        Node::Text(text) => {
            builder.append_text(&mut env.document_mut(), text);
            Ok(())
        }
        Node::Append(expr) => {
            let reference = eval(env, scope, expr)?;
            append_reference(env, builder, reference, ops)
        }
        Node::Element(element) => render_element(env, builder, scope, element, ops),
        Node::Invoke(call) => render_invoke(env, builder, scope, call, ops),
        Node::DynamicComponent(expr) => {
            let reference = eval(env, scope, expr)?;
            render_swap(env, builder, scope, SwapSource::Dynamic(reference), CapturedArgs::new(), ops)
        }
        Node::If {
            condition,
            then,
            otherwise,
        } => render_if(env, builder, scope, condition, then, otherwise, ops),
        Node::Outlet => {
            let level = main_outlet_ref(&scope.dynamic_scope.outlet_state);
            let args = CapturedArgs::new().with_named("model", render_state_ref(&level, "model"));
            let source = SwapSource::Outlet {
                level,
                definitions: Default::default(),
            };
            render_swap(env, builder, scope, source, args, ops)
        }
        Node::Mount { name, model } => {
            if !scope.owner.has_registration(&format!("engine:{name}")) {
                return Err(RenderError::assertion(format!(
                    "you used `{{{{mount '{name}'}}}}`, but the engine '{name}' can not be found"
                )));
            }
            let mut args = CapturedArgs::new();
            if let Some(model) = model {
                args = args.with_named("model", eval(env, scope, model)?);
            }
            let definition = Rc::new(MountManager::definition(name));
            render_component(env, builder, scope, definition, args, ops)
        }
    }
}

fn append_reference(
    env: &Environment,
    builder: &mut dyn ElementBuilder,
    reference: Reference,
    ops: &mut Vec<UpdateOp>,
) -> Result<()> {
    let text = reference.value(env.runtime())?.to_display_string();
    let node = builder.append_text(&mut env.document_mut(), &text);
    if !reference.is_constant() {
        ops.push(UpdateOp::Text {
            node,
            reference,
            last: text,
        });
    }
    Ok(())
}

fn render_element(
    env: &Environment,
    builder: &mut dyn ElementBuilder,
    scope: &Rc<Scope>,
    element: &ElementNode,
    ops: &mut Vec<UpdateOp>,
) -> Result<()> {
    let node = builder.open_element(&mut env.document_mut(), &element.tag);
    for (name, expr) in &element.attrs {
        let reference = eval(env, scope, expr)?;
        bind_attribute(env, builder, node, name, reference, ops)?;
    }
    for call in &element.modifiers {
        install_modifier(env, scope, node, call, ops)?;
    }
    render_nodes(env, builder, scope, &element.children, ops)?;
    builder.close_element(&mut env.document_mut());
    Ok(())
}

fn bind_attribute(
    env: &Environment,
    builder: &mut dyn ElementBuilder,
    element: NodeId,
    name: &str,
    reference: Reference,
    ops: &mut Vec<UpdateOp>,
) -> Result<()> {
    let value = attribute_string(&reference.value(env.runtime())?);
    if let Some(value) = &value {
        builder.set_attribute(&mut env.document_mut(), element, name, value);
    }
    if !reference.is_constant() {
        ops.push(UpdateOp::Attr {
            element,
            name: name.to_string(),
            reference,
            last: value,
        });
    }
    Ok(())
}

fn install_modifier(
    env: &Environment,
    scope: &Rc<Scope>,
    element: NodeId,
    call: &Call,
    ops: &mut Vec<UpdateOp>,
) -> Result<()> {
    let rt = env.runtime();
    let definition = scope
        .resolver
        .lookup_modifier(&call.name, &scope.owner)?
        .ok_or_else(|| RenderError::assertion(format!("could not find a modifier named `{}`", call.name)))?;
    if !env.is_interactive() {
        return Ok(());
    }
    let args = eval_args(env, scope, call)?;

    let manager = definition.manager.clone();
    let (bucket, tag) = rt.track(|| {
        args.consume(rt)?;
        manager.create(
            ModifierContext {
                env,
                element,
                args: args.clone(),
                caller: &scope.self_ref,
            },
            &definition.state,
        )
    });
    let bucket = bucket?;
    rt.consume_tag(&tag);

    let destroyable = rt.destroyables().register(Some(scope.destroyable));
    if let Some(destructor) = manager.get_destroyable(env, &bucket) {
        rt.destroyables().register_destructor(destroyable, destructor);
    }
    {
        let manager = manager.clone();
        let bucket = bucket.clone();
        env.schedule_commit(
            CommitPhase::InstallModifier,
            Box::new(move |env| {
                if env.runtime().destroyables().is_destroyed(destroyable) {
                    return Ok(());
                }
                manager.install(env, &bucket)
            }),
        )?;
    }
    trace!(modifier = %call.name, "modifier created");

    ops.push(UpdateOp::Modifier(ModifierOp {
        manager,
        bucket,
        args,
        snapshot: tag.value(),
        tag,
        destroyable,
    }));
    Ok(())
}

fn render_invoke(
    env: &Environment,
    builder: &mut dyn ElementBuilder,
    scope: &Rc<Scope>,
    call: &Call,
    ops: &mut Vec<UpdateOp>,
) -> Result<()> {
    if let Some(definition) = scope.resolver.lookup_component(&call.name, &scope.owner)? {
        let args = eval_args(env, scope, call)?;
        return render_component(env, builder, scope, definition, args, ops);
    }
    if scope.resolver.lookup_helper(&call.name, &scope.owner)?.is_some() {
        let reference = eval(env, scope, &Expr::Helper(call.clone()))?;
        return append_reference(env, builder, reference, ops);
    }
    debug!(name = %call.name, "unresolved invocation renders nothing");
    Ok(())
}

fn render_if(
    env: &Environment,
    builder: &mut dyn ElementBuilder,
    scope: &Rc<Scope>,
    condition: &Expr,
    then: &[Node],
    otherwise: &[Node],
    ops: &mut Vec<UpdateOp>,
) -> Result<()> {
    let rt = env.runtime();
    let condition = eval(env, scope, condition)?;
    let truthy = condition.value(rt)?.is_truthy();

    let start = builder.append_comment(&mut env.document_mut(), "");
    let destroyable = rt.destroyables().register(Some(scope.destroyable));
    let branch_scope = scope.with_destroyable(destroyable);
    let nodes = if truthy { then } else { otherwise };
    let branch = render_block(env, builder, &branch_scope, nodes)?;
    let end = builder.append_comment(&mut env.document_mut(), "");

    ops.push(UpdateOp::Cond(Box::new(CondOp {
        condition,
        then: then.to_vec(),
        otherwise: otherwise.to_vec(),
        scope: scope.clone(),
        truthy,
        start,
        end,
        branch,
        destroyable,
    })));
    Ok(())
}

fn render_swap(
    env: &Environment,
    builder: &mut dyn ElementBuilder,
    scope: &Rc<Scope>,
    source: SwapSource,
    args: CapturedArgs,
    ops: &mut Vec<UpdateOp>,
) -> Result<()> {
    let rt = env.runtime();
    let current = source.resolve(env, &scope.resolver, &scope.owner)?;

    let start = builder.append_comment(&mut env.document_mut(), "");
    let destroyable = rt.destroyables().register(Some(scope.destroyable));
    let inner_scope = scope.with_destroyable(destroyable);
    let inner = render_swapped(env, builder, &inner_scope, current.clone(), &args)?;
    let end = builder.append_comment(&mut env.document_mut(), "");

    ops.push(UpdateOp::Swap(Box::new(SwapOp {
        source,
        args,
        scope: scope.clone(),
        current,
        start,
        end,
        inner,
        destroyable,
    })));
    Ok(())
}

/// The block for whatever a swap currently shows.
pub(super) fn render_swapped(
    env: &Environment,
    builder: &mut dyn ElementBuilder,
    scope: &Rc<Scope>,
    definition: Option<Rc<ComponentDefinition>>,
    args: &CapturedArgs,
) -> Result<Block> {
    tracked_block(env, |ops| match definition {
        Some(definition) => render_component(env, builder, scope, definition, args.clone(), ops),
        None => Ok(()),
    })
}

/// Invoke a component through its manager.
pub(super) fn render_component(
    env: &Environment,
    builder: &mut dyn ElementBuilder,
    scope: &Rc<Scope>,
    definition: Rc<ComponentDefinition>,
    args: CapturedArgs,
    ops: &mut Vec<UpdateOp>,
) -> Result<()> {
    let rt = env.runtime();
    let manager = definition.manager.clone();
    let capabilities = definition.capabilities;

    let args = if capabilities.contains(Capabilities::PREPARE_ARGS) {
        manager.prepare_args(&definition.state, args)?
    } else {
        args
    };

    let mut dynamic_scope = scope.dynamic_scope.clone();
    let (bucket, tag) = rt.track(|| {
        manager.create(
            CreateContext {
                env,
                owner: &scope.owner,
                args: &args,
                dynamic_scope: &mut dynamic_scope,
                caller: &scope.self_ref,
            },
            &definition.state,
        )
    });
    let bucket = bucket?;
    rt.consume_tag(&tag);

    let destroyable = rt.destroyables().register(Some(scope.destroyable));
    if let Some(destructor) = manager.get_destroyable(env, &bucket) {
        rt.destroyables().register_destructor(destroyable, destructor);
    }

    let owner = if capabilities.contains(Capabilities::HAS_SUB_OWNER) {
        manager.get_owner(&bucket).unwrap_or_else(|| scope.owner.clone())
    } else {
        scope.owner.clone()
    };
    let self_ref = manager.get_self(&bucket)?;
    let layout = if capabilities.contains(Capabilities::DYNAMIC_LAYOUT) {
        manager.get_dynamic_layout(env, &bucket)?
    } else {
        None
    };
    let layout = layout.or_else(|| definition.template.as_ref().map(Template::as_layout));

    let inner_scope = Rc::new(Scope {
        owner,
        resolver: scope.resolver.clone(),
        self_ref,
        args,
        dynamic_scope: dynamic_scope.clone(),
        destroyable,
    });

    builder.open_block(&mut env.document_mut());
    let layout_block = tracked_block(env, |ops| {
        render_layout(env, builder, &inner_scope, &definition, &bucket, layout.as_ref(), ops)
    })?;
    builder.close_block(&mut env.document_mut());

    manager.did_render_layout(env, &bucket)?;
    {
        let manager = manager.clone();
        let bucket = bucket.clone();
        env.schedule_commit(
            CommitPhase::Created,
            Box::new(move |env| {
                if env.runtime().destroyables().is_destroyed(destroyable) {
                    return Ok(());
                }
                manager.did_create(env, &bucket)
            }),
        )?;
    }
    trace!(component = %definition.name, manager = manager.name(), "component rendered");

    ops.push(UpdateOp::Component(Box::new(ComponentOp {
        definition,
        bucket,
        dynamic_scope,
        layout: layout_block,
        destroyable,
    })));
    Ok(())
}

fn render_layout(
    env: &Environment,
    builder: &mut dyn ElementBuilder,
    scope: &Rc<Scope>,
    definition: &ComponentDefinition,
    bucket: &Bucket,
    layout: Option<&CompiledLayout>,
    ops: &mut Vec<UpdateOp>,
) -> Result<()> {
    let body = layout.map(|layout| layout.template.body()).unwrap_or(&[]);
    let wrapped = layout.is_some_and(|layout| layout.wrapped);
    let tag_name = if wrapped {
        definition.manager.get_tag_name(bucket)?
    } else {
        None
    };

    let Some(tag_name) = tag_name else {
        return render_nodes(env, builder, scope, body, ops);
    };

    let element = builder.open_element(&mut env.document_mut(), &tag_name);
    let mut operations = ElementOperations::default();
    if definition.capabilities.contains(Capabilities::ELEMENT_HOOK) {
        definition
            .manager
            .did_create_element(env, bucket, element, &mut operations)?;
    }
    for (name, reference) in merge_attributes(operations) {
        bind_attribute(env, builder, element, &name, reference, ops)?;
    }
    render_nodes(env, builder, scope, body, ops)?;
    builder.close_element(&mut env.document_mut());
    Ok(())
}

/// Collapse the operations a manager recorded into one reference per
/// attribute. Repeated `class` values are joined with spaces; for any
/// other attribute the last value wins.
fn merge_attributes(operations: ElementOperations) -> Vec<(String, Reference)> {
    let mut order: Vec<String> = Vec::new();
    let mut parts: HashMap<String, Vec<AttributeValue>> = HashMap::new();
    for (name, value) in operations.into_attributes() {
        let entry = parts.entry(name.clone()).or_insert_with(|| {
            order.push(name.clone());
            Vec::new()
        });
        if name != "class" {
            entry.clear();
        }
        entry.push(value);
    }

    order
        .into_iter()
        .filter_map(|name| {
            let values = parts.remove(&name)?;
            let reference = if values.len() == 1 {
                match values.into_iter().next()? {
                    AttributeValue::Static(value) => Reference::constant(value),
                    AttributeValue::Dynamic(reference) => reference,
                }
            } else if values.iter().all(|v| matches!(v, AttributeValue::Static(_))) {
                let joined = values
                    .iter()
                    .filter_map(|v| match v {
                        AttributeValue::Static(value) => Some(value.as_str()),
                        AttributeValue::Dynamic(_) => None,
                    })
                    .collect::<Vec<_>>()
                    .join(" ");
                Reference::constant(joined)
            } else {
                Reference::formula(move |rt| {
                    let mut classes = Vec::new();
                    for value in &values {
                        let class = match value {
                            AttributeValue::Static(value) => Some(value.clone()),
                            AttributeValue::Dynamic(reference) => attribute_string(&reference.value(rt)?),
                        };
                        classes.extend(class.filter(|c| !c.is_empty()));
                    }
                    Ok(Value::string(classes.join(" ")))
                })
            };
            Some((name, reference))
        })
        .collect()
}

/// Evaluate an expression to a reference.
pub(super) fn eval(env: &Environment, scope: &Rc<Scope>, expr: &Expr) -> Result<Reference> {
    Ok(match expr {
        Expr::Literal(literal) => Reference::constant(literal.to_value()),
        Expr::This(path) => scope.self_ref.child_path(path),
        Expr::Arg(name, path) => match scope.args.named(name) {
            Some(reference) => reference.child_path(path),
            None => Reference::undefined(),
        },
        Expr::Helper(call) => {
            let definition = scope
                .resolver
                .lookup_helper(&call.name, &scope.owner)?
                .ok_or_else(|| RenderError::assertion(format!("could not find a helper named `{}`", call.name)))?;
            let args = eval_args(env, scope, call)?;
            definition
                .manager
                .get_helper(env, &definition.state, args, scope.destroyable)?
        }
    })
}

fn eval_args(env: &Environment, scope: &Rc<Scope>, call: &Call) -> Result<CapturedArgs> {
    let mut args = CapturedArgs::new();
    for expr in &call.positional {
        args = args.with_positional(eval(env, scope, expr)?);
    }
    for (name, expr) in &call.named {
        args = args.with_named(name.clone(), eval(env, scope, expr)?);
    }
    Ok(args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Runtime;

    #[test]
    fn attribute_values() {
        assert_eq!(attribute_string(&Value::Bool(true)), Some(String::new()));
        assert_eq!(attribute_string(&Value::Bool(false)), None);
        assert_eq!(attribute_string(&Value::Null), None);
        assert_eq!(attribute_string(&Value::from(3)), Some("3".to_string()));
    }

    #[test]
    fn classes_are_joined() {
        let rt = Runtime::new();
        let extra = Reference::cell("active");
        let mut operations = ElementOperations::default();
        operations.set_static("id", "ember1");
        operations.add_class("ember-view");
        operations.set_attribute("class", AttributeValue::Dynamic(extra.clone()));
        operations.set_static("title", "first");
        operations.set_static("title", "second");

        let merged = merge_attributes(operations);
        let names: Vec<_> = merged.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, ["id", "class", "title"]);
        assert_eq!(merged[1].1.value(&rt).unwrap(), Value::from("ember-view active"));
        assert_eq!(merged[2].1.value(&rt).unwrap(), Value::from("second"));

        extra.update(&rt, false).unwrap();
        assert_eq!(merged[1].1.value(&rt).unwrap(), Value::from("ember-view"));
    }
}
