//! Glimmer Core
//!
//! This crate provides the reactive rendering core for Ember-style
//! applications. It implements:
//!
//! - Reactive primitives (tags, references, caches, destructors)
//! - The manager protocol for components, helpers and modifiers
//! - Name resolution with per-renderer definition caches
//! - The renderer, its DOM transactions and the run loop driven
//!   revalidation scheduler
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: revision clock, tags, tracking frames and references
//! - `manager`: component, helper and modifier managers
//! - `resolver`: template names to definitions
//! - `vm`: renders compiled templates and revalidates the result
//! - `renderer`: render roots, transactions and the revalidation scheduler
//! - `environment`: the per-runtime state everything above hangs off
//!
//! # Example
//!
//! ```rust,ignore
//! use glimmer_core::component::ComponentClass;
//! use glimmer_core::template::{Expr, Node, Template};
//! use glimmer_core::{ClassicComponent, Environment, Owner, Renderer};
//!
//! let env = Environment::new();
//! let owner = Owner::new("app");
//! let class = ComponentClass::new("x-greeting")
//!     .layout(Template::new("x-greeting", vec![Node::append(Expr::this("name"))]))
//!     .build();
//! let view = ClassicComponent::create(env.runtime(), class, Default::default())?;
//! view.set(env.runtime(), "name", "Tomster")?;
//!
//! let renderer = Renderer::new(owner);
//! let body = env.document().body();
//! renderer.append_to(&env, &view, body)?;
//!
//! // Mutations outside a run loop schedule a turn; flushing it rerenders.
//! view.set(env.runtime(), "name", "Zoey")?;
//! env.flush_autorun()?;
//! ```

pub mod component;
pub mod config;
pub mod dom;
pub mod environment;
pub mod error;
pub mod helpers;
pub mod manager;
pub mod owner;
pub mod reactive;
pub mod renderer;
pub mod resolver;
pub mod runloop;
pub mod template;
pub mod template_registry;
pub mod vm;

pub use component::ClassicComponent;
pub use config::{EnvironmentOptions, RenderMode};
pub use environment::{CommitPhase, Environment};
pub use error::{RenderError, Result};
pub use owner::Owner;
pub use reactive::{Reference, Runtime, Tag, Value};
pub use renderer::scheduler::RenderSettled;
pub use renderer::{DynamicScope, Renderer};
