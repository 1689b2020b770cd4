//! Helper managers.
//!
//! Classic helpers come in two shapes. A simple helper is a plain function
//! of its argument values and becomes a formula over them. A stateful
//! helper is an instance with `compute` and an optional teardown. It is
//! registered in the destructor graph under the invoking block and can
//! force itself to recompute through a [`RecomputeHandle`].

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::trace;

use super::{downcast, DefinitionState, HelperDefinition, HelperManager};
use crate::environment::Environment;
use crate::error::Result;
use crate::reactive::{DestroyableId, Reference, Runtime, Tag, Value};
use crate::vm::CapturedArgs;

pub type HelperFn = Rc<dyn Fn(&Runtime, &[Value], &IndexMap<String, Value>) -> Result<Value>>;

/// Builds a stateful helper instance.
pub type HelperFactory = Rc<dyn Fn(RecomputeHandle) -> Box<dyn StatefulHelper>>;

/// A helper instance that lives as long as the block invoking it.
#[allow(unused_variables)]
pub trait StatefulHelper {
    fn compute(&mut self, rt: &Runtime, positional: &[Value], named: &IndexMap<String, Value>) -> Result<Value>;

    fn will_destroy(&mut self, rt: &Runtime) {}
}

/// Lets a stateful helper invalidate its own output.
#[derive(Debug, Clone)]
pub struct RecomputeHandle(Tag);

impl RecomputeHandle {
    pub fn recompute(&self, rt: &Runtime) {
        rt.dirty_tag(&self.0);
    }
}

pub enum ClassicHelper {
    Simple(HelperFn),
    Stateful(HelperFactory),
}

impl ClassicHelper {
    pub fn simple<F>(f: F) -> Self
    where
        F: Fn(&Runtime, &[Value], &IndexMap<String, Value>) -> Result<Value> + 'static,
    {
        ClassicHelper::Simple(Rc::new(f))
    }

    pub fn stateful<F, H>(factory: F) -> Self
    where
        F: Fn(RecomputeHandle) -> H + 'static,
        H: StatefulHelper + 'static,
    {
        ClassicHelper::Stateful(Rc::new(move |handle| Box::new(factory(handle)) as Box<dyn StatefulHelper>))
    }

    /// A definition invoking this helper through [`ClassicHelperManager`].
    pub fn into_definition(self: Rc<Self>, name: impl Into<String>) -> HelperDefinition {
        HelperDefinition {
            name: name.into(),
            manager: Rc::new(ClassicHelperManager),
            state: self,
        }
    }
}

#[derive(Debug, Default)]
pub struct ClassicHelperManager;

impl HelperManager for ClassicHelperManager {
    fn name(&self) -> &'static str {
        "classic-helper"
    }

    fn get_helper(
        &self,
        env: &Environment,
        state: &DefinitionState,
        args: CapturedArgs,
        parent: DestroyableId,
    ) -> Result<Reference> {
        let helper = downcast::<ClassicHelper>(state, self.name(), "ClassicHelper")?;
        match &*helper {
            ClassicHelper::Simple(f) => {
                let f = f.clone();
                Ok(Reference::formula(move |rt| {
                    let positional = args.positional_values(rt)?;
                    let named = args.named_values(rt)?;
                    f(rt, &positional, &named)
                }))
            }
            ClassicHelper::Stateful(factory) => {
                let rt = env.runtime();
                let tag = Tag::dirtyable();
                let instance = Rc::new(RefCell::new(factory(RecomputeHandle(tag.clone()))));
                let id = rt.destroyables().register(Some(parent));
                let teardown = instance.clone();
                rt.destroyables().register_destructor(
                    id,
                    Box::new(move |rt| {
                        teardown.borrow_mut().will_destroy(rt);
                        Ok(())
                    }),
                );
                trace!(?id, "stateful helper created");

                Ok(Reference::formula(move |rt| {
                    if rt.destroyables().is_destroyed(id) {
                        return Ok(Value::Undefined);
                    }
                    rt.consume_tag(&tag);
                    let positional = args.positional_values(rt)?;
                    let named = args.named_values(rt)?;
                    instance.borrow_mut().compute(rt, &positional, &named)
                }))
            }
        }
    }
}

/// A built-in helper: maps captured argument references to a result
/// reference without going through a helper instance.
pub type BuiltinHelperFn = fn(CapturedArgs) -> Result<Reference>;

#[derive(Debug, Default)]
pub struct BuiltinHelperManager;

impl BuiltinHelperManager {
    pub fn definition(name: &str, helper: BuiltinHelperFn) -> HelperDefinition {
        HelperDefinition {
            name: name.to_string(),
            manager: Rc::new(Self),
            state: Rc::new(helper),
        }
    }
}

impl HelperManager for BuiltinHelperManager {
    fn name(&self) -> &'static str {
        "builtin-helper"
    }

    fn get_helper(
        &self,
        _env: &Environment,
        state: &DefinitionState,
        args: CapturedArgs,
        _parent: DestroyableId,
    ) -> Result<Reference> {
        let helper = downcast::<BuiltinHelperFn>(state, self.name(), "BuiltinHelperFn")?;
        helper(args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct Counter {
        computed: Rc<Cell<u32>>,
        destroyed: Rc<Cell<bool>>,
    }

    impl StatefulHelper for Counter {
        fn compute(&mut self, _rt: &Runtime, positional: &[Value], _named: &IndexMap<String, Value>) -> Result<Value> {
            self.computed.set(self.computed.get() + 1);
            Ok(positional.first().cloned().unwrap_or_default())
        }

        fn will_destroy(&mut self, _rt: &Runtime) {
            self.destroyed.set(true);
        }
    }

    #[test]
    fn simple_helpers_follow_their_arguments() {
        let env = Environment::new();
        let rt = env.runtime();
        let parent = rt.destroyables().register(None);
        let name = Reference::cell("world");
        let definition = Rc::new(ClassicHelper::simple(|_rt, positional, _named| {
            Ok(Value::string(format!("hello {}", positional[0].to_display_string())))
        }))
        .into_definition("greet");

        let result = definition
            .manager
            .get_helper(&env, &definition.state, CapturedArgs::new().with_positional(name.clone()), parent)
            .unwrap();
        assert_eq!(result.value(rt).unwrap(), Value::from("hello world"));
        name.update(rt, "there").unwrap();
        assert_eq!(result.value(rt).unwrap(), Value::from("hello there"));
    }

    #[test]
    fn stateful_helpers_recompute_and_tear_down() {
        let env = Environment::new();
        let rt = env.runtime();
        let parent = rt.destroyables().register(None);
        let computed = Rc::new(Cell::new(0));
        let destroyed = Rc::new(Cell::new(false));
        let handle = Rc::new(RefCell::new(None));

        let (c, d, h) = (computed.clone(), destroyed.clone(), handle.clone());
        let definition = Rc::new(ClassicHelper::stateful(move |recompute| {
            *h.borrow_mut() = Some(recompute);
            Counter {
                computed: c.clone(),
                destroyed: d.clone(),
            }
        }))
        .into_definition("counter");

        let result = definition
            .manager
            .get_helper(
                &env,
                &definition.state,
                CapturedArgs::new().with_positional(Reference::constant(7)),
                parent,
            )
            .unwrap();
        assert_eq!(result.value(rt).unwrap(), Value::from(7));
        result.value(rt).unwrap();
        assert_eq!(computed.get(), 1);

        handle.borrow().as_ref().unwrap().recompute(rt);
        result.value(rt).unwrap();
        assert_eq!(computed.get(), 2);

        rt.destroyables().destroy(rt, parent).unwrap();
        assert!(destroyed.get());
    }
}
