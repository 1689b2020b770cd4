//! Reactive Runtime
//!
//! The runtime owns the state that the rest of the reactive system shares:
//!
//! 1. The global revision clock. Its current value plays the part of a
//!    process-wide "current tag": every dirtying write advances it, so a
//!    single snapshot of it tells whether *anything* changed.
//!
//! 2. The tracking frame stack used for automatic dependency capture.
//!
//! 3. The destructor graph.
//!
//! A runtime is single-threaded. Several runtimes can coexist in one
//! process (tests rely on this), but state from one must never be written
//! through another.

use std::cell::Cell;

use tracing::trace;

use super::destroyable::DestroyableArena;
use super::tag::{Revision, Tag, INITIAL};
use super::tracking::{FrameId, TrackingStack};

/// The reactive runtime.
pub struct Runtime {
    revision: Cell<Revision>,
    tracking: TrackingStack,
    destroyables: DestroyableArena,
    in_run_loop: Cell<bool>,
    autorun_pending: Cell<bool>,
}

impl Runtime {
    pub fn new() -> Self {
        Self {
            revision: Cell::new(INITIAL),
            tracking: TrackingStack::new(),
            destroyables: DestroyableArena::new(),
            in_run_loop: Cell::new(false),
            autorun_pending: Cell::new(false),
        }
    }

    /// The value of the global clock.
    pub fn current_revision(&self) -> Revision {
        self.revision.get()
    }

    /// True when nothing was dirtied since `snapshot` was taken from
    /// [`current_revision`](Self::current_revision).
    pub fn validate_current(&self, snapshot: Revision) -> bool {
        self.revision.get() <= snapshot
    }

    /// Advance the clock and move `tag` to the new revision.
    pub fn dirty_tag(&self, tag: &Tag) {
        debug_assert!(tag.is_dirtyable(), "only dirtyable tags can be dirtied, got {tag:?}");

        let next = self.revision.get() + 1;
        self.revision.set(next);
        if tag.set_revision(next) && !self.in_run_loop.get() {
            self.autorun_pending.set(true);
        }
        trace!(revision = next, "tag dirtied");
    }

    /// Register `tag` as a dependency of the current tracking frame.
    pub fn consume_tag(&self, tag: &Tag) {
        self.tracking.consume(tag);
    }

    pub fn begin_track_frame(&self) -> FrameId {
        self.tracking.begin_track()
    }

    pub fn end_track_frame(&self, frame: FrameId) -> Tag {
        self.tracking.end_track(frame)
    }

    pub fn begin_untrack_frame(&self) -> FrameId {
        self.tracking.begin_untrack()
    }

    pub fn end_untrack_frame(&self, frame: FrameId) {
        self.tracking.end_untrack(frame)
    }

    /// Run `f` inside a fresh tracking frame and return what it read.
    pub fn track<R>(&self, f: impl FnOnce() -> R) -> (R, Tag) {
        let frame = self.begin_track_frame();
        let value = f();
        (value, self.end_track_frame(frame))
    }

    /// Run `f` with dependency capture suspended.
    pub fn untrack<R>(&self, f: impl FnOnce() -> R) -> R {
        let frame = self.begin_untrack_frame();
        let value = f();
        self.end_untrack_frame(frame);
        value
    }

    pub fn is_tracking(&self) -> bool {
        self.tracking.is_tracking()
    }

    pub fn destroyables(&self) -> &DestroyableArena {
        &self.destroyables
    }

    pub(crate) fn set_in_run_loop(&self, active: bool) {
        self.in_run_loop.set(active);
    }

    pub fn in_run_loop(&self) -> bool {
        self.in_run_loop.get()
    }

    /// Consume the "something changed outside a run loop" flag.
    pub(crate) fn take_autorun(&self) -> bool {
        self.autorun_pending.replace(false)
    }

    pub(crate) fn request_autorun(&self) {
        self.autorun_pending.set(true);
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dirtying_advances_clock_and_tag() {
        let rt = Runtime::new();
        let tag = Tag::dirtyable();
        let snapshot = rt.current_revision();

        assert!(tag.validate(snapshot));
        rt.dirty_tag(&tag);

        assert!(!tag.validate(snapshot));
        assert!(!rt.validate_current(snapshot));
        assert_eq!(tag.value(), rt.current_revision());
    }

    #[test]
    fn tag_revisions_never_decrease() {
        let rt = Runtime::new();
        let tag = Tag::dirtyable();
        let mut last = tag.value();
        for _ in 0..16 {
            rt.dirty_tag(&tag);
            assert!(tag.value() > last);
            last = tag.value();
        }
    }

    #[test]
    fn writes_outside_a_loop_request_an_autorun() {
        let rt = Runtime::new();
        rt.dirty_tag(&Tag::dirtyable());
        assert!(rt.take_autorun());
        assert!(!rt.take_autorun());

        rt.set_in_run_loop(true);
        rt.dirty_tag(&Tag::dirtyable());
        assert!(!rt.take_autorun());
    }

    #[test]
    fn track_returns_consumed_tags() {
        let rt = Runtime::new();
        let tag = Tag::dirtyable();
        let ((), tracked) = rt.track(|| rt.consume_tag(&tag));
        assert!(tracked.same_as(&tag));

        let ((), hidden) = rt.track(|| rt.untrack(|| rt.consume_tag(&tag)));
        assert!(hidden.is_constant());
    }
}
