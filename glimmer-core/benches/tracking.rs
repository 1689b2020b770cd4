//! Benchmarks for tag validation, formula reads and rerendering
//!
//! Run with: cargo bench -p glimmer-core --bench tracking

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use glimmer_core::component::ComponentClass;
use glimmer_core::template::{Expr, Node, Template};
use glimmer_core::{ClassicComponent, Environment, Owner, Reference, Renderer, Runtime, Tag, Value};

// =============================================================================
// Tags
// =============================================================================

fn bench_tag_validation(c: &mut Criterion) {
    let mut group = c.benchmark_group("tag/validate");
    let rt = Runtime::new();

    let leaves: Vec<Tag> = (0..64).map(|_| Tag::dirtyable()).collect();
    let combined = Tag::combine(leaves.iter().cloned());
    let snapshot = combined.value();

    group.bench_function("dirtyable", |b| {
        b.iter(|| black_box(leaves[0].validate(black_box(snapshot))))
    });

    group.bench_function("combined_64", |b| {
        b.iter(|| black_box(combined.validate(black_box(snapshot))))
    });

    rt.dirty_tag(&leaves[63]);
    group.bench_function("combined_64_dirty", |b| {
        b.iter(|| black_box(combined.validate(black_box(snapshot))))
    });

    group.finish();
}

// =============================================================================
// Formulas
// =============================================================================

fn bench_formula_reads(c: &mut Criterion) {
    let mut group = c.benchmark_group("formula/read");
    let rt = Runtime::new();

    let source = Reference::cell(1);
    let input = source.clone();
    let doubled = Reference::formula(move |rt| {
        let n = input.value(rt)?.as_number().unwrap_or(0.0);
        Ok(Value::from(n * 2.0))
    });

    group.bench_function("cached", |b| b.iter(|| black_box(doubled.value(&rt))));

    let mut n = 0.0;
    group.bench_function("invalidated", |b| {
        b.iter(|| {
            n += 1.0;
            let _ = source.update(&rt, n);
            black_box(doubled.value(&rt))
        })
    });

    group.finish();
}

// =============================================================================
// Rendering
// =============================================================================

fn bench_rerender(c: &mut Criterion) {
    let mut group = c.benchmark_group("renderer/rerender");

    let env = Environment::new();
    let renderer = Renderer::new(Owner::new("bench"));
    let body = env.document().body();

    let rows: Vec<Node> = (0..100)
        .flat_map(|i| [Node::text(format!("row {i}: ")), Node::append(Expr::this("value"))])
        .collect();
    let class = ComponentClass::new("x-rows")
        .tagless()
        .layout(Template::new("x-rows", rows))
        .build();
    let view = ClassicComponent::create(env.runtime(), class, Default::default())
        .expect("component is created");
    view.set(env.runtime(), "value", 0).expect("value is set");
    renderer.append_to(&env, &view, body).expect("initial render");

    group.bench_function("valid_tree", |b| {
        b.iter(|| {
            renderer.rerender(&env);
            env.flush_autorun().expect("turn completes");
        })
    });

    let mut n = 0;
    group.bench_function("one_change", |b| {
        b.iter(|| {
            n += 1;
            view.set(env.runtime(), "value", n).expect("value is set");
            env.flush_autorun().expect("turn completes");
        })
    });

    group.finish();
}

criterion_group!(benches, bench_tag_validation, bench_formula_reads, bench_rerender);
criterion_main!(benches);
