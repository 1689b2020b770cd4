//! One top-level render tree attached to an insertion point.

use std::cell::{Cell, RefCell};

use tracing::{debug, warn};

use crate::component::ClassicComponent;
use crate::environment::Environment;
use crate::error::Result;
use crate::vm::{RenderResult, RerenderOptions};

/// Produces the first render of a root.
pub(crate) type RootRender = Box<dyn Fn(&Environment) -> Result<RenderResult>>;

/// What a root was appended for.
pub(crate) enum RootObject {
    Component(ClassicComponent),
    OutletView,
}

pub(crate) struct RootState {
    id: u64,
    root: RootObject,
    initial: RootRender,
    result: RefCell<Option<RenderResult>>,
    /// Set after a failed render when errors are squelched. The root
    /// then only logs when asked to render.
    squelched: Cell<bool>,
    destroyed: Cell<bool>,
}

impl RootState {
    pub(crate) fn new(id: u64, root: RootObject, initial: RootRender) -> Self {
        Self {
            id,
            root,
            initial,
            result: RefCell::new(None),
            squelched: Cell::new(false),
            destroyed: Cell::new(false),
        }
    }

    pub(crate) fn is_for(&self, view: &ClassicComponent) -> bool {
        matches!(&self.root, RootObject::Component(component) if component.ptr_eq(view))
    }

    pub(crate) fn is_destroyed(&self) -> bool {
        self.destroyed.get()
    }

    /// First call renders; later calls revalidate the existing result.
    pub(crate) fn render(&self, env: &Environment) -> Result<()> {
        debug_assert!(!self.destroyed.get(), "rendered a destroyed root");
        if self.destroyed.get() {
            return Ok(());
        }
        if self.squelched.get() {
            warn!(
                root = self.id,
                "attempted to rerender, but the application has had an unhandled error occur during a render"
            );
            return Ok(());
        }

        let outcome = if self.result.borrow().is_some() {
            let result = self.result.borrow();
            match result.as_ref() {
                Some(result) => result.rerender(env, RerenderOptions::default()),
                None => Ok(()),
            }
        } else {
            (self.initial)(env).map(|result| {
                debug!(root = self.id, nodes = result.nodes().len(), "root rendered");
                *self.result.borrow_mut() = Some(result);
            })
        };

        if let Err(err) = &outcome {
            if env.options().squelch_render_errors {
                warn!(root = self.id, error = %err, "render failed, squelching further renders of this root");
                self.squelched.set(true);
            }
        }
        outcome
    }

    /// Tear the root down. Idempotent.
    pub(crate) fn destroy(&self, env: &Environment) -> Result<()> {
        if self.destroyed.replace(true) {
            return Ok(());
        }
        debug!(root = self.id, "destroying root");
        let result = self.result.borrow_mut().take();
        match result {
            Some(result) => env.in_transaction(|| result.destroy(env)),
            None => Ok(()),
        }
    }
}
