//! Name resolution for templates.
//!
//! The resolver turns a name used in a template into a definition. Built-in
//! helpers, modifiers and components come from fixed tables and win over
//! anything an owner registers. Component definitions are cached per
//! resolver by what backs them (the component class, or the template for a
//! template-only component), so repeated lookups hand back the same
//! definition. Misses are never cached: something registered later is
//! still found.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::trace;

use crate::error::{RenderError, Result};
use crate::helpers::BUILTIN_HELPERS;
use crate::manager::action::ActionModifierManager;
use crate::manager::curly::{CurlyComponentManager, CurlyDefinitionState};
use crate::manager::helper::{BuiltinHelperManager, ClassicHelper};
use crate::manager::internal::{template_only_definition, textarea_definition};
use crate::manager::{ComponentDefinition, HelperDefinition, ModifierDefinition};
use crate::owner::Owner;
use crate::template::TemplateId;
use crate::template_registry;

/// What a cached component definition is keyed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum CacheKey {
    /// Address of the registered `ComponentClass`. The cached definition
    /// holds the class, so the address stays valid.
    Factory(usize),
    Template(TemplateId),
}

pub struct Resolver {
    components: RefCell<HashMap<CacheKey, Rc<ComponentDefinition>>>,
    /// Classic helper definitions keyed by the registered helper's address.
    helpers: RefCell<HashMap<usize, (Rc<ClassicHelper>, Rc<HelperDefinition>)>>,
    builtin_helpers: IndexMap<&'static str, Rc<HelperDefinition>>,
    builtin_modifiers: IndexMap<&'static str, Rc<ModifierDefinition>>,
    builtin_components: IndexMap<&'static str, Rc<ComponentDefinition>>,
}

impl Resolver {
    pub fn new() -> Self {
        let builtin_helpers = BUILTIN_HELPERS
            .iter()
            .map(|(name, helper)| (*name, Rc::new(BuiltinHelperManager::definition(name, *helper))))
            .collect();
        let mut builtin_modifiers = IndexMap::new();
        builtin_modifiers.insert("action", Rc::new(ActionModifierManager::definition()));
        let mut builtin_components = IndexMap::new();
        builtin_components.insert("Textarea", Rc::new(textarea_definition()));

        Self {
            components: RefCell::new(HashMap::new()),
            helpers: RefCell::new(HashMap::new()),
            builtin_helpers,
            builtin_modifiers,
            builtin_components,
        }
    }

    /// Resolve a component by name.
    ///
    /// The layout is the class's own, else `template:components/{name}` on
    /// the owner, else the process-wide template registry.
    pub fn lookup_component(&self, name: &str, owner: &Owner) -> Result<Option<Rc<ComponentDefinition>>> {
        if name == "text-area" {
            return Err(RenderError::assertion(
                "could not find component `<text-area />` (did you mean `<Textarea />`?)",
            ));
        }
        if let Some(builtin) = self.builtin_components.get(name) {
            return Ok(Some(builtin.clone()));
        }

        let class = owner.component_class(name);
        let template_name = format!("components/{name}");
        let layout = class
            .as_ref()
            .and_then(|class| class.layout.clone())
            .or_else(|| owner.template(&template_name))
            .or_else(|| template_registry::get_template(&template_name));

        let key = match (&class, &layout) {
            (Some(class), _) => CacheKey::Factory(Rc::as_ptr(class) as usize),
            (None, Some(template)) => CacheKey::Template(template.id()),
            (None, None) => {
                trace!(component = %name, "component not found");
                return Ok(None);
            }
        };

        if let Some(definition) = self.components.borrow().get(&key) {
            trace!(component = %name, ?key, "component cache hit");
            return Ok(Some(definition.clone()));
        }

        let definition = Rc::new(match class {
            Some(class) => ComponentDefinition::new(
                name,
                Rc::new(CurlyComponentManager::new()),
                Rc::new(CurlyDefinitionState {
                    class,
                    layout: layout.clone(),
                }),
                layout,
            ),
            None => match layout {
                Some(template) => template_only_definition(name, template),
                None => return Ok(None),
            },
        });
        trace!(component = %name, ?key, "component cache miss");
        self.components.borrow_mut().insert(key, definition.clone());
        Ok(Some(definition))
    }

    pub fn lookup_helper(&self, name: &str, owner: &Owner) -> Result<Option<Rc<HelperDefinition>>> {
        if let Some(builtin) = self.builtin_helpers.get(name) {
            if owner.has_registration(&format!("helper:{name}")) {
                return Err(RenderError::BuiltinRedefined {
                    kind: "helper",
                    name: name.to_string(),
                });
            }
            return Ok(Some(builtin.clone()));
        }

        let Some(helper) = owner.helper(name) else {
            return Ok(None);
        };
        let key = Rc::as_ptr(&helper) as usize;
        if let Some((_, definition)) = self.helpers.borrow().get(&key) {
            return Ok(Some(definition.clone()));
        }
        let definition = Rc::new(helper.clone().into_definition(name));
        self.helpers.borrow_mut().insert(key, (helper, definition.clone()));
        Ok(Some(definition))
    }

    pub fn lookup_modifier(&self, name: &str, owner: &Owner) -> Result<Option<Rc<ModifierDefinition>>> {
        if let Some(builtin) = self.builtin_modifiers.get(name) {
            if owner.has_registration(&format!("modifier:{name}")) {
                return Err(RenderError::BuiltinRedefined {
                    kind: "modifier",
                    name: name.to_string(),
                });
            }
            return Ok(Some(builtin.clone()));
        }
        Ok(owner.modifier(name))
    }

    /// Number of cached component definitions.
    pub fn cached_components(&self) -> usize {
        self.components.borrow().len()
    }
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::ComponentClass;
    use crate::owner::Registration;
    use crate::reactive::Value;
    use crate::template::{Node, Template};

    #[test]
    fn repeated_lookups_return_the_same_definition() {
        let resolver = Resolver::new();
        let owner = Owner::new("app");
        owner
            .register(
                "component:x-foo",
                Registration::Component(ComponentClass::new("x-foo").build()),
            )
            .unwrap();
        owner
            .register(
                "template:components/x-foo",
                Registration::Template(Template::new("x-foo", vec![Node::text("foo")])),
            )
            .unwrap();

        let first = resolver.lookup_component("x-foo", &owner).unwrap().unwrap();
        let second = resolver.lookup_component("x-foo", &owner).unwrap().unwrap();
        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(first.manager.name(), "curly");
        assert!(first.template.is_some());
        assert_eq!(resolver.cached_components(), 1);
    }

    #[test]
    fn misses_are_not_cached() {
        let resolver = Resolver::new();
        let owner = Owner::new("app");
        assert!(resolver.lookup_component("x-late", &owner).unwrap().is_none());

        owner
            .register(
                "template:components/x-late",
                Registration::Template(Template::new("x-late", vec![Node::text("late")])),
            )
            .unwrap();
        let found = resolver.lookup_component("x-late", &owner).unwrap().unwrap();
        assert_eq!(found.manager.name(), "template-only");
    }

    #[test]
    fn text_area_suggests_textarea() {
        let resolver = Resolver::new();
        let owner = Owner::new("app");
        let err = resolver.lookup_component("text-area", &owner).unwrap_err();
        assert!(err.to_string().contains("Textarea"));
        assert!(resolver.lookup_component("Textarea", &owner).unwrap().is_some());
    }

    #[test]
    fn builtin_helpers_cannot_be_redefined() {
        let resolver = Resolver::new();
        let owner = Owner::new("app");
        assert!(resolver.lookup_helper("concat", &owner).unwrap().is_some());

        owner
            .register(
                "helper:concat",
                Registration::Helper(Rc::new(ClassicHelper::simple(|_, _, _| Ok(Value::Undefined)))),
            )
            .unwrap();
        assert!(matches!(
            resolver.lookup_helper("concat", &owner),
            Err(RenderError::BuiltinRedefined { kind: "helper", .. })
        ));
    }

    #[test]
    fn owner_helpers_are_cached() {
        let resolver = Resolver::new();
        let owner = Owner::new("app");
        owner
            .register(
                "helper:shout",
                Registration::Helper(Rc::new(ClassicHelper::simple(|_, positional, _| {
                    Ok(Value::string(positional[0].to_display_string().to_uppercase()))
                }))),
            )
            .unwrap();

        let first = resolver.lookup_helper("shout", &owner).unwrap().unwrap();
        let second = resolver.lookup_helper("shout", &owner).unwrap().unwrap();
        assert!(Rc::ptr_eq(&first, &second));
        assert!(resolver.lookup_helper("whisper", &owner).unwrap().is_none());
        assert!(resolver.lookup_modifier("action", &owner).unwrap().is_some());
    }
}
