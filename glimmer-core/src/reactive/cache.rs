//! Memoized Computations
//!
//! A cache wraps a derived computation and re-runs it only when something
//! it read last time has changed.
//!
//! # How Caches Work
//!
//! 1. On first read, the computation runs inside a fresh tracking frame. The
//!    frame's combined tag and a snapshot of its value are stored alongside
//!    the result.
//!
//! 2. On later reads, if the stored tag still validates against the
//!    snapshot, the cached result is returned without running anything.
//!
//! 3. Either way, the stored tag is consumed by the reader's frame, so
//!    whoever reads a cache depends on everything the cache depends on.
//!
//! This is pull-based: writes never trigger computation, they only make the
//! next read recompute.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use super::runtime::Runtime;
use super::tag::{Revision, Tag};
use super::value::Value;
use crate::error::{RenderError, Result};

type Compute = Rc<dyn Fn(&Runtime) -> Result<Value>>;

#[derive(Clone)]
struct Memo {
    value: Value,
    tag: Tag,
    snapshot: Revision,
}

/// A lazily evaluated, memoized computation.
pub struct Cache {
    compute: Compute,
    memo: RefCell<Option<Memo>>,
    computing: Cell<bool>,
    runs: Cell<usize>,
}

impl Cache {
    /// Create a cache. The computation does not run until first read.
    pub fn new<F>(compute: F) -> Self
    where
        F: Fn(&Runtime) -> Result<Value> + 'static,
    {
        Self {
            compute: Rc::new(compute),
            memo: RefCell::new(None),
            computing: Cell::new(false),
            runs: Cell::new(0),
        }
    }

    /// Read the cached value, recomputing if any dependency is stale.
    pub fn get_value(&self, rt: &Runtime) -> Result<Value> {
        if let Some(memo) = self.fresh_memo() {
            rt.consume_tag(&memo.tag);
            return Ok(memo.value);
        }

        if self.computing.replace(true) {
            return Err(RenderError::assertion(
                "cycle detected: a cache was read while it was computing",
            ));
        }

        let (result, tag) = rt.track(|| (self.compute)(rt));
        self.computing.set(false);
        self.runs.set(self.runs.get() + 1);

        let value = result?;
        let snapshot = tag.value();
        rt.consume_tag(&tag);
        *self.memo.borrow_mut() = Some(Memo {
            value: value.clone(),
            tag,
            snapshot,
        });
        Ok(value)
    }

    fn fresh_memo(&self) -> Option<Memo> {
        self.memo
            .borrow()
            .as_ref()
            .filter(|memo| memo.tag.validate(memo.snapshot))
            .cloned()
    }

    /// True once the cache has computed and read nothing that can change.
    pub fn is_const(&self) -> bool {
        self.memo.borrow().as_ref().is_some_and(|memo| memo.tag.is_constant())
    }

    /// The tag recorded by the last computation, if any.
    pub fn tag(&self) -> Option<Tag> {
        self.memo.borrow().as_ref().map(|memo| memo.tag.clone())
    }

    pub fn has_value(&self) -> bool {
        self.memo.borrow().is_some()
    }

    /// How many times the computation has run.
    pub fn run_count(&self) -> usize {
        self.runs.get()
    }
}

impl fmt::Debug for Cache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("has_value", &self.has_value())
            .field("runs", &self.run_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
