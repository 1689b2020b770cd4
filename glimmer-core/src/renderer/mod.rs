//! Renderer
//!
//! A [`Renderer`] owns an ordered list of roots, each one a render tree
//! appended to some element. It renders new roots immediately and
//! revalidates existing ones when the run loop asks it to.
//!
//! # Transactions
//!
//! Every render sweep runs inside one DOM transaction, so lifecycle hooks
//! and modifier installs run once after all roots are up to date. A sweep
//! that starts while another is running on the same renderer does nothing:
//! the outer sweep notices roots appended during its pass and renders them
//! before it returns.
//!
//! # Validity
//!
//! After a sweep the renderer records the global revision. It stays valid
//! until something dirties a tag, at which point the next run loop turn
//! revalidates it. See [`scheduler`] for how turns and renderers meet.

mod dynamic_scope;
mod root_state;
pub mod scheduler;

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, trace};

pub use dynamic_scope::DynamicScope;

use root_state::{RootObject, RootRender, RootState};

use crate::component::{ClassicComponent, Hook, LifecycleState};
use crate::dom::NodeId;
use crate::environment::Environment;
use crate::error::{RenderError, Result};
use crate::manager::outlet::OutletView;
use crate::manager::root::RootComponentManager;
use crate::owner::Owner;
use crate::reactive::{Reference, Revision, Value};
use crate::resolver::Resolver;
use crate::runloop::Queue;
use crate::template::{Expr, Node, Template};
use crate::vm::render_main;

static NEXT_RENDERER_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) struct RendererInner {
    pub(crate) id: u64,
    owner: Owner,
    /// Definition caches for every root of this renderer.
    resolver: Rc<Resolver>,
    /// `{{component this}}`: renders whatever definition `this` holds.
    root_template: Template,
    roots: RefCell<Vec<Rc<RootState>>>,
    next_root: Cell<u64>,
    in_render_transaction: Cell<bool>,
    last_revision: Cell<Revision>,
    destroyed: Cell<bool>,
}

/// Drives one or more render roots. Clones share the same renderer.
#[derive(Clone)]
pub struct Renderer(pub(crate) Rc<RendererInner>);

impl Renderer {
    pub fn new(owner: Owner) -> Self {
        let id = NEXT_RENDERER_ID.fetch_add(1, Ordering::Relaxed);
        Self(Rc::new(RendererInner {
            id,
            owner,
            resolver: Rc::new(Resolver::new()),
            root_template: Template::new("-root", vec![Node::DynamicComponent(Expr::this(""))]),
            roots: RefCell::new(Vec::new()),
            next_root: Cell::new(1),
            in_render_transaction: Cell::new(false),
            last_revision: Cell::new(0),
            destroyed: Cell::new(false),
        }))
    }

    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn owner(&self) -> &Owner {
        &self.0.owner
    }

    pub fn resolver(&self) -> &Resolver {
        &self.0.resolver
    }

    /// Render `view` as a new root appended to `target`.
    pub fn append_to(&self, env: &Environment, view: &ClassicComponent, target: NodeId) -> Result<()> {
        let definition = Rc::new(RootComponentManager::definition(view.clone(), None));
        let self_ref = Reference::constant(Value::opaque(definition)).labeled("root definition");
        let owner = self.0.owner.clone();
        let resolver = self.0.resolver.clone();
        let layout = self.0.root_template.as_layout();
        let render: RootRender = Box::new(move |env| {
            render_main(
                env,
                &owner,
                &resolver,
                self_ref.clone(),
                env.builder_for(target, None),
                &layout,
                DynamicScope::default(),
                None,
            )
        });
        trace!(renderer = self.0.id, component = %view.name(), "appending component root");
        self.append_root(env, RootObject::Component(view.clone()), render)
    }

    /// Render the outlet tree of `view` as a new root appended to `target`.
    pub fn append_outlet_view(&self, env: &Environment, view: &OutletView, target: NodeId) -> Result<()> {
        let owner = view.owner().clone();
        let resolver = self.0.resolver.clone();
        let layout = view.template().as_layout();
        let outlet_state = view.root_ref();
        let render: RootRender = Box::new(move |env| {
            render_main(
                env,
                &owner,
                &resolver,
                Reference::undefined(),
                env.builder_for(target, None),
                &layout,
                DynamicScope::new(outlet_state.clone()),
                None,
            )
        });
        trace!(renderer = self.0.id, "appending outlet root");
        self.append_root(env, RootObject::OutletView, render)
    }

    fn append_root(&self, env: &Environment, root: RootObject, render: RootRender) -> Result<()> {
        if self.0.destroyed.get() {
            return Err(RenderError::Destroyed("append a root to"));
        }
        let id = self.0.next_root.get();
        self.0.next_root.set(id + 1);
        let root = Rc::new(RootState::new(id, root, render));

        // Registered inside the turn so its start does not queue a
        // revalidation for a root that is about to render anyway.
        env.join(|env| {
            let count = {
                let mut roots = self.0.roots.borrow_mut();
                roots.push(root);
                roots.len()
            };
            if count == 1 {
                env.scheduler().register(&self.0);
            }
            self.render_roots_transaction(env)
        })
    }

    /// Tear down the root rendering `view`. A view that was never
    /// appended still gets its element teardown hook.
    pub fn remove(&self, env: &Environment, view: &ClassicComponent) -> Result<()> {
        view.transition_to(LifecycleState::Destroying);
        let result = self.cleanup_root_for(env, view);
        if env.is_interactive() && view.lifecycle_state() != LifecycleState::Destroyed {
            view.trigger(env.runtime(), Hook::DidDestroyElement)?;
        }
        result
    }

    fn cleanup_root_for(&self, env: &Environment, view: &ClassicComponent) -> Result<()> {
        if self.0.destroyed.get() {
            return Ok(());
        }
        let removed: Vec<Rc<RootState>> = {
            let mut roots = self.0.roots.borrow_mut();
            let mut removed = Vec::new();
            roots.retain(|root| {
                if root.is_for(view) {
                    removed.push(root.clone());
                    false
                } else {
                    true
                }
            });
            removed
        };
        if !removed.is_empty() && self.0.roots.borrow().is_empty() {
            env.scheduler().deregister(&self.0);
        }

        let mut first_error = None;
        for root in removed {
            if let Err(err) = root.destroy(env) {
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Queue a revalidation for the current turn.
    pub fn rerender(&self, env: &Environment) {
        let renderer = self.clone();
        env.schedule_once(
            Queue::Render,
            format!("revalidate:{}", self.0.id),
            Box::new(move |env| renderer.revalidate(env)),
        );
    }

    /// Destroy every root and leave the revalidation registry. Terminal.
    pub fn destroy(&self, env: &Environment) -> Result<()> {
        if self.0.destroyed.replace(true) {
            return Ok(());
        }
        let roots = std::mem::take(&mut *self.0.roots.borrow_mut());
        debug!(renderer = self.0.id, roots = roots.len(), "destroying renderer");
        env.scheduler().deregister(&self.0);

        let mut first_error = None;
        for root in roots {
            if let Err(err) = root.destroy(env) {
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    pub fn is_destroyed(&self) -> bool {
        self.0.destroyed.get()
    }

    /// The element a root component rendered into its wrapper.
    pub fn get_element(&self, view: &ClassicComponent) -> Option<NodeId> {
        view.element()
    }

    /// Number of live roots.
    pub fn root_count(&self) -> usize {
        self.0.roots.borrow().len()
    }

    /// True when nothing this renderer rendered can have changed.
    pub fn is_valid(&self, env: &Environment) -> bool {
        self.0.destroyed.get()
            || self.0.roots.borrow().is_empty()
            || env.runtime().validate_current(self.0.last_revision.get())
    }

    pub(crate) fn revalidate(&self, env: &Environment) -> Result<()> {
        if self.is_valid(env) {
            return Ok(());
        }
        trace!(renderer = self.0.id, "revalidating");
        self.render_roots_transaction(env)
    }

    fn render_roots_transaction(&self, env: &Environment) -> Result<()> {
        if self.0.in_render_transaction.replace(true) {
            return Ok(());
        }
        let result = env.in_transaction(|| {
            self.render_roots(env)?;
            // Recorded before commit: hooks that dirty state leave the
            // renderer invalid for the next turn.
            self.0.last_revision.set(env.runtime().current_revision());
            Ok(())
        });
        if result.is_err() {
            self.0.last_revision.set(env.runtime().current_revision());
        }
        self.0.in_render_transaction.set(false);
        result
    }

    /// Render every root, picking up roots appended while rendering, then
    /// drop the destroyed ones.
    fn render_roots(&self, env: &Environment) -> Result<()> {
        let mut removed: Vec<Rc<RootState>> = Vec::new();
        loop {
            let initial_len = self.0.roots.borrow().len();
            let mut index = 0;
            loop {
                let Some(root) = self.0.roots.borrow().get(index).cloned() else {
                    break;
                };
                index += 1;
                if root.is_destroyed() {
                    if !removed.iter().any(|r| Rc::ptr_eq(r, &root)) {
                        removed.push(root);
                    }
                    continue;
                }
                if index > initial_len {
                    continue;
                }
                root.render(env)?;
            }
            if self.0.roots.borrow().len() <= initial_len {
                break;
            }
            trace!(renderer = self.0.id, "roots appended during render, sweeping again");
        }

        let remaining = {
            let mut roots = self.0.roots.borrow_mut();
            roots.retain(|root| !removed.iter().any(|r| Rc::ptr_eq(r, root)));
            roots.len()
        };
        if remaining == 0 {
            env.scheduler().deregister(&self.0);
        }
        Ok(())
    }
}

impl std::fmt::Debug for Renderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer")
            .field("id", &self.0.id)
            .field("roots", &self.0.roots.borrow().len())
            .field("destroyed", &self.0.destroyed.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::ComponentClass;

    fn app() -> (Environment, Owner, NodeId) {
        let env = Environment::new();
        let owner = Owner::new("app");
        let target = env.document().body();
        (env, owner, target)
    }

    fn counter_class() -> Rc<ComponentClass> {
        ComponentClass::new("x-counter")
            .tagless()
            .layout(Template::new("x-counter", vec![Node::append(Expr::this("count"))]))
            .build()
    }

    #[test]
    fn appended_roots_render_and_register() {
        let (env, owner, target) = app();
        let renderer = Renderer::new(owner);
        let view = ClassicComponent::create(env.runtime(), counter_class(), Default::default()).unwrap();
        view.set(env.runtime(), "count", 1).unwrap();

        renderer.append_to(&env, &view, target).unwrap();
        assert_eq!(env.document().text_content(target), "1");
        assert_eq!(renderer.root_count(), 1);
        assert_eq!(env.scheduler().len(), 1);
        assert!(renderer.is_valid(&env));

        view.set(env.runtime(), "count", 2).unwrap();
        assert!(!renderer.is_valid(&env));
        env.flush_autorun().unwrap();
        assert_eq!(env.document().text_content(target), "2");
        assert!(renderer.is_valid(&env));
    }

    #[test]
    fn mutations_in_one_turn_coalesce() {
        let (env, owner, target) = app();
        let renderer = Renderer::new(owner);
        let view = ClassicComponent::create(env.runtime(), counter_class(), Default::default()).unwrap();
        renderer.append_to(&env, &view, target).unwrap();

        let before = env.run_loop().turns();
        env.run(|env| {
            for n in 0..5 {
                view.set(env.runtime(), "count", n)?;
            }
            Ok(())
        })
        .unwrap();
        assert_eq!(env.run_loop().turns(), before + 1);
        assert_eq!(env.document().text_content(target), "4");
    }

    #[test]
    fn removing_the_last_root_deregisters() {
        let (env, owner, target) = app();
        let renderer = Renderer::new(owner);
        let view = ClassicComponent::create(env.runtime(), counter_class(), Default::default()).unwrap();
        renderer.append_to(&env, &view, target).unwrap();

        renderer.remove(&env, &view).unwrap();
        assert_eq!(renderer.root_count(), 0);
        assert!(env.scheduler().is_empty());
        assert!(view.is_destroyed());
        assert_eq!(env.document().text_content(target), "");
    }

    #[test]
    fn destroyed_renderers_refuse_new_roots() {
        let (env, owner, target) = app();
        let renderer = Renderer::new(owner);
        let view = ClassicComponent::create(env.runtime(), counter_class(), Default::default()).unwrap();
        renderer.append_to(&env, &view, target).unwrap();

        renderer.destroy(&env).unwrap();
        renderer.destroy(&env).unwrap();
        assert!(renderer.is_destroyed());
        assert!(renderer.is_valid(&env));
        assert!(env.scheduler().is_empty());

        let other = ClassicComponent::create(env.runtime(), counter_class(), Default::default()).unwrap();
        assert!(matches!(
            renderer.append_to(&env, &other, target),
            Err(RenderError::Destroyed(_))
        ));
    }
}
