//! Process-wide template registry, keyed by template name.
//!
//! This registry is separate from the per-resolver definition
//! caches: it is how applications publish top-level templates (for example
//! `application` or `components/foo`) before any owner exists.

use std::sync::OnceLock;

use dashmap::DashMap;

use crate::template::Template;

static TEMPLATES: OnceLock<DashMap<String, Template>> = OnceLock::new();

fn templates() -> &'static DashMap<String, Template> {
    TEMPLATES.get_or_init(DashMap::new)
}

pub fn has_template(name: &str) -> bool {
    templates().contains_key(name)
}

pub fn get_template(name: &str) -> Option<Template> {
    templates().get(name).map(|entry| entry.value().clone())
}

/// Register `template` under `name`, returning the template it replaced.
pub fn set_template(name: impl Into<String>, template: Template) -> Option<Template> {
    templates().insert(name.into(), template)
}

pub fn remove_template(name: &str) -> Option<Template> {
    templates().remove(name).map(|(_, template)| template)
}

/// Names currently registered, in no particular order.
pub fn template_names() -> Vec<String> {
    templates().iter().map(|entry| entry.key().clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::Node;

    #[test]
    fn set_get_has_round_trip() {
        let name = "template-registry-test/set-get";
        assert!(!has_template(name));

        let template = Template::new(name, vec![Node::text("hi")]);
        assert!(set_template(name, template.clone()).is_none());

        assert!(has_template(name));
        assert!(get_template(name).is_some_and(|t| t.ptr_eq(&template)));
        assert!(template_names().iter().any(|n| n == name));

        assert!(remove_template(name).is_some());
        assert!(!has_template(name));
    }
}
