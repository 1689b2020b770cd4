//! Integration Tests for Revalidation
//!
//! These tests cover how renderers meet the run loop: settling, runaway
//! invalidation, roots appended mid-render and failing roots.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use futures_util::FutureExt;

use glimmer_core::component::{ComponentClass, ComponentHooks, HookContext};
use glimmer_core::owner::Registration;
use glimmer_core::template::{Call, Expr, Node, Template};
use glimmer_core::{
    ClassicComponent, Environment, EnvironmentOptions, Owner, RenderError, RenderSettled, Renderer, Value,
};

fn tagless(name: &str, body: Vec<Node>) -> ComponentClass {
    ComponentClass::new(name).tagless().layout(Template::new(name, body))
}

fn counter(env: &Environment, class: ComponentClass) -> ClassicComponent {
    let view = ClassicComponent::create(env.runtime(), class.build(), Default::default()).unwrap();
    view.set(env.runtime(), "count", 0).unwrap();
    view
}

fn count_of(cx: &HookContext<'_>) -> f64 {
    cx.get("count").as_number().unwrap_or(0.0)
}

/// Bumps `count` after every render until it reaches `until`.
struct BumpAfterRender {
    until: f64,
    settled: Rc<RefCell<Option<RenderSettled>>>,
    pending_seen: Rc<Cell<u32>>,
}

impl ComponentHooks for BumpAfterRender {
    fn did_render(&self, cx: &HookContext<'_>) -> Result<(), RenderError> {
        if let Some(settled) = self.settled.borrow().as_ref() {
            if settled.clone().now_or_never().is_none() {
                self.pending_seen.set(self.pending_seen.get() + 1);
            }
        }
        let count = count_of(cx);
        if count < self.until {
            cx.set("count", count + 1.0)?;
        }
        Ok(())
    }
}

/// Test that the settle latch waits for the last of several invalidating
/// passes.
#[test]
fn render_settled_waits_for_the_last_pass() {
    let env = Environment::new();
    let renderer = Renderer::new(Owner::new("app"));
    let body = env.document().body();
    let settled_slot = Rc::new(RefCell::new(None));
    let pending_seen = Rc::new(Cell::new(0));

    let view = counter(
        &env,
        tagless("x-bump", vec![Node::append(Expr::this("count"))]).hooks(BumpAfterRender {
            until: 3.0,
            settled: settled_slot.clone(),
            pending_seen: pending_seen.clone(),
        }),
    );
    renderer.append_to(&env, &view, body).unwrap();
    assert_eq!(env.document().text_content(body), "3");

    view.set(env.runtime(), "count", 0).unwrap();
    let settled = env.render_settled();
    *settled_slot.borrow_mut() = Some(settled.clone());
    assert!(settled.clone().now_or_never().is_none());

    env.flush_autorun().unwrap();

    // One rerender per bump plus the pass that finds nothing to bump.
    assert_eq!(pending_seen.get(), 4);
    assert_eq!(env.document().text_content(body), "3");
    assert!(settled.now_or_never().is_some());
}

/// Test that a renderer dirtying itself on every pass is torn down at the
/// configured limit.
#[test]
fn runaway_invalidation_destroys_the_renderer() {
    let env = Environment::with_options(EnvironmentOptions::default().with_loop_limit(3));
    let renderer = Renderer::new(Owner::new("app"));
    let body = env.document().body();
    let passes = Rc::new(Cell::new(0));

    struct Forever(Rc<Cell<u32>>);
    impl ComponentHooks for Forever {
        fn did_render(&self, cx: &HookContext<'_>) -> Result<(), RenderError> {
            self.0.set(self.0.get() + 1);
            cx.set("count", count_of(cx) + 1.0)
        }
    }

    let view = counter(
        &env,
        tagless("x-forever", vec![Node::append(Expr::this("count"))]).hooks(Forever(passes.clone())),
    );
    let result = renderer.append_to(&env, &view, body);

    assert!(matches!(result, Err(RenderError::InfiniteRevalidation { limit: 3 })));
    // The first render plus one per extra turn.
    assert_eq!(passes.get(), 4);
    assert!(renderer.is_destroyed());
    assert_eq!(renderer.root_count(), 0);
    assert_eq!(env.document().text_content(body), "");
}

/// Appends a second root from inside its own render.
struct Spawner {
    env: &'static Environment,
    renderer: Renderer,
    other: ClassicComponent,
    spawned: Cell<bool>,
}

impl ComponentHooks for Spawner {
    fn will_render(&self, _cx: &HookContext<'_>) -> Result<(), RenderError> {
        if self.spawned.replace(true) {
            return Ok(());
        }
        let target = self.env.document().body();
        self.renderer.append_to(self.env, &self.other, target)
    }
}

/// Test that a root appended during a render is rendered before the outer
/// append returns.
#[test]
fn roots_appended_mid_render_render_in_the_same_sweep() {
    let env: &'static Environment = Box::leak(Box::new(Environment::new()));
    let renderer = Renderer::new(Owner::new("app"));
    let body = env.document().body();

    let other = ClassicComponent::create(
        env.runtime(),
        tagless("x-other", vec![Node::text("second")]).build(),
        Default::default(),
    )
    .unwrap();
    let spawner = ClassicComponent::create(
        env.runtime(),
        tagless("x-spawner", vec![Node::text("first;")])
            .hooks(Spawner {
                env,
                renderer: renderer.clone(),
                other: other.clone(),
                spawned: Cell::new(false),
            })
            .build(),
        Default::default(),
    )
    .unwrap();

    let turns = env.run_loop().turns();
    renderer.append_to(env, &spawner, body).unwrap();

    assert_eq!(renderer.root_count(), 2);
    assert_eq!(env.document().text_content(body), "first;second");
    assert_eq!(env.run_loop().turns(), turns + 1);
}

struct FailOnFlag;

impl ComponentHooks for FailOnFlag {
    fn will_update(&self, cx: &HookContext<'_>) -> Result<(), RenderError> {
        if cx.get("fail").is_truthy() {
            return Err(RenderError::hook("will_update", "boom"));
        }
        Ok(())
    }
}

fn failing_root(env: &Environment) -> (Renderer, ClassicComponent) {
    let owner = Owner::new("app");
    owner
        .register(
            "component:x-fragile",
            Registration::Component(
                tagless("x-fragile", vec![Node::append(Expr::arg("count"))])
                    .hooks(FailOnFlag)
                    .build(),
            ),
        )
        .unwrap();
    let renderer = Renderer::new(owner);
    let view = counter(
        env,
        tagless(
            "x-host",
            vec![Node::Invoke(
                Call::new("x-fragile")
                    .named("count", Expr::this("count"))
                    .named("fail", Expr::this("fail")),
            )],
        ),
    );
    let body = env.document().body();
    renderer.append_to(env, &view, body).unwrap();
    (renderer, view)
}

/// Test that a failing root reports once and is then left alone.
#[test]
fn failing_roots_are_squelched_after_the_first_error() {
    let env = Environment::with_options(EnvironmentOptions {
        squelch_render_errors: true,
        ..EnvironmentOptions::default()
    });
    let body = env.document().body();
    let (renderer, view) = failing_root(&env);
    assert_eq!(env.document().text_content(body), "0");

    let result = env.run(|env| {
        view.set(env.runtime(), "fail", true)?;
        view.set(env.runtime(), "count", 1)
    });
    assert!(matches!(result, Err(RenderError::Hook { .. })));

    env.run(|env| view.set(env.runtime(), "count", 2)).unwrap();
    assert_eq!(env.document().text_content(body), "0");
    assert_eq!(renderer.root_count(), 1);
}

/// Test that without squelching a failing root is retried and recovers.
#[test]
fn unsquelched_roots_retry() {
    let env = Environment::with_options(EnvironmentOptions {
        squelch_render_errors: false,
        ..EnvironmentOptions::default()
    });
    let body = env.document().body();
    let (_renderer, view) = failing_root(&env);

    let result = env.run(|env| {
        view.set(env.runtime(), "fail", true)?;
        view.set(env.runtime(), "count", 1)
    });
    assert!(result.is_err());

    env.run(|env| {
        view.set(env.runtime(), "fail", false)?;
        view.set(env.runtime(), "count", 2)
    })
    .unwrap();
    assert_eq!(env.document().text_content(body), "2");
}

/// Test that removing a view leaves other roots rendering.
#[test]
fn removing_one_root_keeps_the_others() {
    let env = Environment::new();
    let renderer = Renderer::new(Owner::new("app"));
    let body = env.document().body();

    let first = counter(&env, tagless("x-first", vec![Node::text("a")]));
    let second = counter(&env, tagless("x-second", vec![Node::append(Expr::this("count"))]));
    renderer.append_to(&env, &first, body).unwrap();
    renderer.append_to(&env, &second, body).unwrap();
    assert_eq!(env.document().text_content(body), "a0");

    renderer.remove(&env, &first).unwrap();
    assert!(first.is_destroyed());
    assert_eq!(renderer.root_count(), 1);

    second.set(env.runtime(), "count", Value::from(7)).unwrap();
    env.flush_autorun().unwrap();
    assert_eq!(env.document().text_content(body), "7");
}
