//! Ambient state threaded through nested renders without being an explicit
//! template argument.

use crate::component::ClassicComponent;
use crate::reactive::Reference;

/// The dynamic scope seen by one component invocation. Forked (cloned) for
/// every component so writes only affect descendants.
#[derive(Debug, Clone)]
pub struct DynamicScope {
    /// The closest enclosing classic component.
    pub view: Option<ClassicComponent>,
    /// The outlet state for the current outlet level.
    pub outlet_state: Reference,
}

impl DynamicScope {
    pub fn new(outlet_state: Reference) -> Self {
        Self {
            view: None,
            outlet_state,
        }
    }
}

impl Default for DynamicScope {
    fn default() -> Self {
        Self::new(Reference::undefined())
    }
}
