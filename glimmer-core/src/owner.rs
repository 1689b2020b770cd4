//! Dependency-Injection Owner
//!
//! An owner is a registry of factories keyed by full name (`type:name`, for
//! example `component:my-button` or `controller:application`). Applications
//! have one; every mounted engine instance gets its own child owner built
//! from an [`EngineDefinition`].

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use tracing::debug;

use crate::component::ComponentClass;
use crate::error::{RenderError, Result};
use crate::manager::helper::ClassicHelper;
use crate::manager::ModifierDefinition;
use crate::reactive::{Runtime, Value};
use crate::template::Template;

/// Sets up a freshly built engine instance, typically by registering the
/// engine's templates, components and controllers.
pub type EngineSetup = Rc<dyn Fn(&Owner) -> Result<()>>;

/// A mountable sub-application.
pub struct EngineDefinition {
    pub name: String,
    pub setup: EngineSetup,
}

impl EngineDefinition {
    pub fn new<F>(name: impl Into<String>, setup: F) -> Rc<Self>
    where
        F: Fn(&Owner) -> Result<()> + 'static,
    {
        Rc::new(Self {
            name: name.into(),
            setup: Rc::new(setup),
        })
    }
}

/// Something registered with an owner.
#[derive(Clone)]
pub enum Registration {
    Component(Rc<ComponentClass>),
    Template(Template),
    Helper(Rc<ClassicHelper>),
    Modifier(Rc<ModifierDefinition>),
    Engine(Rc<EngineDefinition>),
    /// Instantiated on first `lookup` and cached as a singleton.
    Factory(Rc<dyn Fn(&Owner) -> Value>),
    /// A ready-made singleton.
    Instance(Value),
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Registration::Component(class) => write!(f, "Component({})", class.name),
            Registration::Template(template) => write!(f, "Template({})", template.name()),
            Registration::Helper(_) => f.write_str("Helper"),
            Registration::Modifier(definition) => write!(f, "Modifier({})", definition.name),
            Registration::Engine(engine) => write!(f, "Engine({})", engine.name),
            Registration::Factory(_) => f.write_str("Factory"),
            Registration::Instance(value) => write!(f, "Instance({value:?})"),
        }
    }
}

struct OwnerInner {
    id: u64,
    name: String,
    parent: Option<Weak<OwnerInner>>,
    registry: RefCell<IndexMap<String, Registration>>,
    singletons: RefCell<HashMap<String, Value>>,
    engines: RefCell<Vec<Owner>>,
    booted: Cell<bool>,
    destroyed: Cell<bool>,
}

/// Shared handle to an owner. Clones share identity.
#[derive(Clone)]
pub struct Owner(Rc<OwnerInner>);

fn validate_full_name(full_name: &str) -> Result<()> {
    match full_name.split_once(':') {
        Some((kind, name)) if !kind.is_empty() && !name.is_empty() => Ok(()),
        _ => Err(RenderError::assertion(format!(
            "`{full_name}` is not a valid full name, expected `type:name`"
        ))),
    }
}

impl Owner {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_parent(name.into(), None)
    }

    fn with_parent(name: String, parent: Option<&Owner>) -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(0);
        Self(Rc::new(OwnerInner {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            name,
            parent: parent.map(|p| Rc::downgrade(&p.0)),
            registry: RefCell::new(IndexMap::new()),
            singletons: RefCell::new(HashMap::new()),
            engines: RefCell::new(Vec::new()),
            booted: Cell::new(false),
            destroyed: Cell::new(false),
        }))
    }

    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn parent(&self) -> Option<Owner> {
        self.0.parent.as_ref().and_then(Weak::upgrade).map(Owner)
    }

    pub fn ptr_eq(&self, other: &Owner) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Register `registration` under `full_name`, replacing any previous
    /// registration and its cached singleton.
    pub fn register(&self, full_name: &str, registration: Registration) -> Result<()> {
        validate_full_name(full_name)?;
        self.0.singletons.borrow_mut().remove(full_name);
        self.0.registry.borrow_mut().insert(full_name.to_string(), registration);
        Ok(())
    }

    pub fn unregister(&self, full_name: &str) {
        self.0.singletons.borrow_mut().remove(full_name);
        self.0.registry.borrow_mut().shift_remove(full_name);
    }

    pub fn has_registration(&self, full_name: &str) -> bool {
        self.0.registry.borrow().contains_key(full_name)
    }

    pub fn factory_for(&self, full_name: &str) -> Option<Registration> {
        self.0.registry.borrow().get(full_name).cloned()
    }

    /// Look up a singleton. Factories are instantiated once and cached, so
    /// repeated lookups return the same value.
    pub fn lookup(&self, full_name: &str) -> Option<Value> {
        if let Some(value) = self.0.singletons.borrow().get(full_name) {
            return Some(value.clone());
        }
        let value = match self.factory_for(full_name)? {
            Registration::Instance(value) => value,
            Registration::Factory(factory) => factory(self),
            _ => return None,
        };
        self.0
            .singletons
            .borrow_mut()
            .insert(full_name.to_string(), value.clone());
        Some(value)
    }

    pub fn component_class(&self, name: &str) -> Option<Rc<ComponentClass>> {
        match self.factory_for(&format!("component:{name}"))? {
            Registration::Component(class) => Some(class),
            _ => None,
        }
    }

    pub fn template(&self, name: &str) -> Option<Template> {
        match self.factory_for(&format!("template:{name}"))? {
            Registration::Template(template) => Some(template),
            _ => None,
        }
    }

    pub fn helper(&self, name: &str) -> Option<Rc<ClassicHelper>> {
        match self.factory_for(&format!("helper:{name}"))? {
            Registration::Helper(helper) => Some(helper),
            _ => None,
        }
    }

    pub fn modifier(&self, name: &str) -> Option<Rc<ModifierDefinition>> {
        match self.factory_for(&format!("modifier:{name}"))? {
            Registration::Modifier(definition) => Some(definition),
            _ => None,
        }
    }

    pub fn engine(&self, name: &str) -> Option<Rc<EngineDefinition>> {
        match self.factory_for(&format!("engine:{name}"))? {
            Registration::Engine(engine) => Some(engine),
            _ => None,
        }
    }

    /// Build a child owner for the engine registered as `engine:{name}` and
    /// run its setup. The instance is not booted yet.
    pub fn build_child_engine_instance(&self, name: &str) -> Result<Owner> {
        let engine = self.engine(name).ok_or_else(|| {
            RenderError::assertion(format!(
                "you used `{{{{mount '{name}'}}}}`, but the engine '{name}' can not be found"
            ))
        })?;
        let child = Owner::with_parent(name.to_string(), Some(self));
        (engine.setup)(&child)?;
        self.0.engines.borrow_mut().push(child.clone());
        Ok(child)
    }

    /// Live engine instances built from this owner.
    pub fn engine_instances(&self) -> Vec<Owner> {
        self.0
            .engines
            .borrow()
            .iter()
            .filter(|engine| !engine.is_destroyed())
            .cloned()
            .collect()
    }

    pub fn boot(&self) {
        if !self.0.booted.replace(true) {
            debug!(owner = %self.0.name, id = self.0.id, "engine instance booted");
        }
    }

    pub fn is_booted(&self) -> bool {
        self.0.booted.get()
    }

    /// Tear down this owner, its engine instances and its singletons.
    /// Idempotent.
    pub fn destroy(&self, rt: &Runtime) {
        if self.0.destroyed.replace(true) {
            return;
        }
        let engines: Vec<Owner> = self.0.engines.borrow_mut().drain(..).collect();
        for engine in engines {
            engine.destroy(rt);
        }
        self.0.singletons.borrow_mut().clear();
        debug!(owner = %self.0.name, id = self.0.id, "owner destroyed");
    }

    pub fn is_destroyed(&self) -> bool {
        self.0.destroyed.get()
    }
}

impl fmt::Debug for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Owner")
            .field("id", &self.0.id)
            .field("name", &self.0.name)
            .finish()
    }
}
