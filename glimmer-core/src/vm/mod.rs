//! Template VM
//!
//! The VM renders a compiled layout into the document once, recording an
//! update tree of [`Block`]s as it goes. Every block remembers the combined
//! tag of everything read while it was rendered. A later
//! [`RenderResult::rerender`] walks the tree and skips any block whose tag
//! still validates, so unchanged subtrees cost one tag check and keep
//! their DOM nodes.
//!
//! # Blocks and ops
//!
//! A block is a list of update ops: text nodes and attributes bound to
//! references, conditionals, component invocations, swappable dynamic
//! components and element modifiers. Ops that own their own block consume
//! that block's tag into the enclosing frame, so a change anywhere below
//! invalidates every block on the way up and the walk reaches it.
//!
//! # Managers
//!
//! Components, helpers and modifiers are only reached through their
//! managers. The VM checks a definition's capabilities before calling any
//! optional hook, and schedules `did_create`, `did_update` and modifier
//! installation on the environment's DOM transaction.

mod args;
mod render;
mod update;

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tracing::{debug, trace};

pub use args::CapturedArgs;
pub use update::Block;

use crate::config::RenderMode;
use crate::dom::{ElementBuilder, NodeId};
use crate::environment::Environment;
use crate::error::{RenderError, Result};
use crate::owner::Owner;
use crate::reactive::{DestroyableId, Reference};
use crate::renderer::DynamicScope;
use crate::resolver::Resolver;
use crate::template::CompiledLayout;

/// Everything a template body sees while rendering.
#[derive(Clone)]
pub(crate) struct Scope {
    pub owner: Owner,
    /// Resolves names in this scope; shared by every scope of one render.
    pub resolver: Rc<Resolver>,
    pub self_ref: Reference,
    pub args: CapturedArgs,
    pub dynamic_scope: DynamicScope,
    /// Destructor node that instances created in this scope hang off.
    pub destroyable: DestroyableId,
}

impl Scope {
    pub fn with_destroyable(&self, destroyable: DestroyableId) -> Rc<Scope> {
        Rc::new(Scope {
            destroyable,
            ..self.clone()
        })
    }
}

/// Options for [`RenderResult::rerender`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RerenderOptions {
    /// Walk every block even if its tag still validates.
    pub always_revalidate: bool,
}

/// The live output of one [`render_main`] call.
pub struct RenderResult {
    parent: NodeId,
    nodes: Vec<NodeId>,
    root: RefCell<Block>,
    destroyable: DestroyableId,
    destroyed: Cell<bool>,
}

impl RenderResult {
    /// Bring the DOM up to date with everything the render read.
    pub fn rerender(&self, env: &Environment, options: RerenderOptions) -> Result<()> {
        if self.destroyed.get() {
            return Err(RenderError::Destroyed("rerender"));
        }
        let mut root = self.root.borrow_mut();
        update::update_block(env, &mut root, options.always_revalidate)
    }

    /// Tear down every instance and remove the rendered nodes. Idempotent.
    pub fn destroy(&self, env: &Environment) -> Result<()> {
        if self.destroyed.replace(true) {
            return Ok(());
        }
        trace!(nodes = self.nodes.len(), "destroying render result");
        let result = env.runtime().destroyables().destroy(env.runtime(), self.destroyable);
        let mut doc = env.document_mut();
        for node in &self.nodes {
            if doc.parent(*node) == Some(self.parent) {
                doc.remove(*node);
            }
        }
        result
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.get()
    }

    /// The element the result was rendered into.
    pub fn parent(&self) -> NodeId {
        self.parent
    }

    /// Top-level nodes produced by the render, in document order.
    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    pub fn first_node(&self) -> Option<NodeId> {
        self.nodes.first().copied()
    }

    pub fn last_node(&self) -> Option<NodeId> {
        self.nodes.last().copied()
    }

    pub fn destroyable(&self) -> DestroyableId {
        self.destroyable
    }
}

/// Render `layout` with `self_ref` as `this`, writing through `builder`.
/// Names in the layout resolve through `resolver`.
///
/// The result's destructor node is registered under `parent_destroyable`
/// when given. On failure everything created so far is torn down again.
pub fn render_main(
    env: &Environment,
    owner: &Owner,
    resolver: &Rc<Resolver>,
    self_ref: Reference,
    mut builder: Box<dyn ElementBuilder>,
    layout: &CompiledLayout,
    dynamic_scope: DynamicScope,
    parent_destroyable: Option<DestroyableId>,
) -> Result<RenderResult> {
    let rt = env.runtime();
    let parent = builder.cursor().parent;
    let before = env.document().children(parent).to_vec();
    let destroyable = rt.destroyables().register(parent_destroyable);
    let scope = Rc::new(Scope {
        owner: owner.clone(),
        resolver: resolver.clone(),
        self_ref,
        args: CapturedArgs::new(),
        dynamic_scope,
        destroyable,
    });

    let rendered = render::render_block(env, builder.as_mut(), &scope, layout.template.body());
    builder.finish(&mut env.document_mut());

    let after = env.document().children(parent).to_vec();
    let nodes: Vec<NodeId> = match env.options().render_mode {
        // Rehydration claims what was already there.
        RenderMode::Rehydrate => after,
        _ => after.into_iter().filter(|node| !before.contains(node)).collect(),
    };

    match rendered {
        Ok(root) => {
            debug!(template = %layout.template.name(), nodes = nodes.len(), "rendered");
            Ok(RenderResult {
                parent,
                nodes,
                root: RefCell::new(root),
                destroyable,
                destroyed: Cell::new(false),
            })
        }
        Err(err) => {
            if let Err(teardown) = rt.destroyables().destroy(rt, destroyable) {
                debug!(error = %teardown, "teardown after failed render also failed");
            }
            let mut doc = env.document_mut();
            for node in nodes {
                doc.remove(node);
            }
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::ComponentClass;
    use crate::dom::{ClientBuilder, Cursor};
    use crate::manager::helper::ClassicHelper;
    use crate::owner::Registration;
    use crate::reactive::{TrackedObject, Value};
    use crate::template::{Call, ElementNode, Expr, Node, Template};

    fn render(env: &Environment, owner: &Owner, this: Reference, template: &Template) -> (NodeId, RenderResult) {
        let parent = {
            let mut doc = env.document_mut();
            let div = doc.create_element("div");
            let body = doc.body();
            doc.append_child(body, div);
            div
        };
        let result = env
            .in_transaction(|| {
                render_main(
                    env,
                    owner,
                    &Rc::new(Resolver::new()),
                    this,
                    env.builder_for(parent, None),
                    &template.as_layout(),
                    DynamicScope::default(),
                    None,
                )
            })
            .unwrap();
        (parent, result)
    }

    fn rerender(env: &Environment, result: &RenderResult) {
        env.in_transaction(|| result.rerender(env, RerenderOptions::default()))
            .unwrap();
    }

    #[test]
    fn text_updates_keep_node_identity() {
        let env = Environment::new();
        let owner = Owner::new("app");
        let state = TrackedObject::with_props([("name", Value::from("Alice"))]);
        let template = Template::new(
            "greeting",
            vec![ElementNode::new("p")
                .child(Node::text("Hello "))
                .child(Node::append(Expr::this("name")))
                .into()],
        );
        let (parent, result) = render(&env, &owner, Reference::constant(Value::Object(state.clone())), &template);
        assert_eq!(env.document().inner_html(parent), "<p>Hello Alice</p>");
        let p = result.first_node().unwrap();

        state.set(env.runtime(), "name", Value::from("Bob"));
        rerender(&env, &result);
        assert_eq!(env.document().inner_html(parent), "<p>Hello Bob</p>");
        assert_eq!(result.first_node(), Some(p));
    }

    #[test]
    fn conditionals_swap_branches() {
        let env = Environment::new();
        let owner = Owner::new("app");
        let state = TrackedObject::with_props([("show", Value::Bool(true))]);
        let template = Template::new(
            "cond",
            vec![Node::if_else(
                Expr::this("show"),
                vec![Node::text("yes")],
                vec![Node::text("no")],
            )],
        );
        let (parent, result) = render(&env, &owner, Reference::constant(Value::Object(state.clone())), &template);
        assert_eq!(env.document().text_content(parent), "yes");

        state.set(env.runtime(), "show", Value::Bool(false));
        rerender(&env, &result);
        assert_eq!(env.document().text_content(parent), "no");

        result.destroy(&env).unwrap();
        assert_eq!(env.document().inner_html(parent), "");
        assert!(result.rerender(&env, RerenderOptions::default()).is_err());
    }

    #[test]
    fn unchanged_blocks_are_skipped() {
        let env = Environment::new();
        let owner = Owner::new("app");
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        owner
            .register(
                "helper:count",
                Registration::Helper(Rc::new(ClassicHelper::simple(
                    move |_, positional, _| {
                        counter.set(counter.get() + 1);
                        Ok(positional[0].clone())
                    },
                ))),
            )
            .unwrap();
        let state = TrackedObject::with_props([("a", Value::from(1)), ("b", Value::from(2))]);
        let template = Template::new(
            "skip",
            vec![
                Node::append(Expr::helper(Call::new("count").positional(Expr::this("a")))),
                Node::append(Expr::this("b")),
            ],
        );
        let (parent, result) = render(&env, &owner, Reference::constant(Value::Object(state.clone())), &template);
        assert_eq!(calls.get(), 1);

        rerender(&env, &result);
        assert_eq!(calls.get(), 1);

        state.set(env.runtime(), "b", Value::from(3));
        rerender(&env, &result);
        assert_eq!(env.document().text_content(parent), "13");
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn failed_renders_leave_nothing_behind() {
        let env = Environment::new();
        let owner = Owner::new("app");
        let template = Template::new(
            "broken",
            vec![Node::text("before"), Node::Invoke(Call::new("text-area"))],
        );
        let parent = env.document().body();
        let live = env.runtime().destroyables().live_count();
        let result = env.in_transaction(|| {
            render_main(
                &env,
                &owner,
                &Rc::new(Resolver::new()),
                Reference::undefined(),
                Box::new(ClientBuilder::new(Cursor::append_to(parent))),
                &template.as_layout(),
                DynamicScope::default(),
                None,
            )
        });
        assert!(matches!(result, Err(RenderError::Assertion(_))));
        assert_eq!(env.document().inner_html(parent), "");
        assert_eq!(env.runtime().destroyables().live_count(), live);
    }

    #[test]
    fn unresolved_invocations_render_nothing() {
        let env = Environment::new();
        let owner = Owner::new("app");
        let template = Template::new(
            "missing",
            vec![
                Node::text("before;"),
                Node::Invoke(Call::new("x-missing")),
                Node::text("after"),
            ],
        );
        let (parent, result) = render(&env, &owner, Reference::undefined(), &template);
        assert_eq!(env.document().text_content(parent), "before;after");

        rerender(&env, &result);
        assert_eq!(env.document().text_content(parent), "before;after");
    }

    #[test]
    fn classic_components_render_inside_their_element() {
        let env = Environment::new();
        let owner = Owner::new("app");
        owner
            .register(
                "component:x-badge",
                Registration::Component(
                    ComponentClass::new("x-badge")
                        .tag_name("span")
                        .class_name("badge")
                        .layout(Template::new("x-badge", vec![Node::append(Expr::this("label"))]))
                        .build(),
                ),
            )
            .unwrap();
        let template = Template::new(
            "outer",
            vec![Node::Invoke(Call::new("x-badge").named("label", Expr::this("label")))],
        );
        let state = TrackedObject::with_props([("label", Value::from("new"))]);
        let (parent, result) = render(&env, &owner, Reference::constant(Value::Object(state.clone())), &template);

        let html = env.document().inner_html(parent);
        assert!(html.starts_with("<span id=\"ember"), "{html}");
        assert!(html.contains("class=\"ember-view badge\""), "{html}");
        assert!(html.ends_with(">new</span>"), "{html}");

        state.set(env.runtime(), "label", Value::from("old"));
        rerender(&env, &result);
        assert!(env.document().inner_html(parent).ends_with(">old</span>"));
    }
}
