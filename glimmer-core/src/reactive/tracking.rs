//! Tracking Frames
//!
//! A tracking frame records every tag consumed while it is on top of the
//! stack. Ending the frame yields the combination of those tags, which the
//! caller snapshots to decide later whether its work is stale.
//!
//! Untrack frames sit on the same stack and swallow consumption so that
//! lifecycle hooks can read state without creating dependencies.
//!
//! Frames must be ended in LIFO order. Every `begin_*` hands back a
//! [`FrameId`] and the matching `end_*` checks it against the top of the
//! stack; a mismatch is a programming error and trips a debug assertion.

use std::cell::{Cell, RefCell};

use smallvec::SmallVec;

use super::tag::Tag;

/// Token identifying one open frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameId(u64);

#[derive(Debug)]
enum FrameKind {
    Track(SmallVec<[Tag; 8]>),
    Untrack,
}

#[derive(Debug)]
struct Frame {
    id: FrameId,
    kind: FrameKind,
}

/// The frame stack of one runtime.
#[derive(Debug, Default)]
pub struct TrackingStack {
    frames: RefCell<Vec<Frame>>,
    next_id: Cell<u64>,
}

impl TrackingStack {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, kind: FrameKind) -> FrameId {
        let id = FrameId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.frames.borrow_mut().push(Frame { id, kind });
        id
    }

    fn pop(&self, id: FrameId, expect_track: bool) -> Option<Frame> {
        let mut frames = self.frames.borrow_mut();
        let top = frames.last();
        debug_assert!(
            top.is_some_and(|f| f.id == id),
            "tracking frame {:?} ended while {:?} is on top",
            id,
            top.map(|f| f.id)
        );
        debug_assert!(
            top.is_some_and(|f| matches!(f.kind, FrameKind::Track(_)) == expect_track),
            "tracking frame {:?} ended with the wrong kind of end call",
            id
        );
        frames.pop()
    }

    /// Open a frame that records consumed tags.
    pub fn begin_track(&self) -> FrameId {
        self.push(FrameKind::Track(SmallVec::new()))
    }

    /// Close a tracking frame and return the combined tag of what it saw.
    pub fn end_track(&self, id: FrameId) -> Tag {
        match self.pop(id, true) {
            Some(Frame {
                kind: FrameKind::Track(tags),
                ..
            }) => Tag::combine(tags),
            _ => Tag::constant(),
        }
    }

    /// Open a frame that hides consumption from every enclosing frame.
    pub fn begin_untrack(&self) -> FrameId {
        self.push(FrameKind::Untrack)
    }

    pub fn end_untrack(&self, id: FrameId) {
        self.pop(id, false);
    }

    /// Register `tag` with the frame on top of the stack, if it tracks.
    pub fn consume(&self, tag: &Tag) {
        if tag.is_constant() {
            return;
        }
        if let Some(Frame {
            kind: FrameKind::Track(tags),
            ..
        }) = self.frames.borrow_mut().last_mut()
        {
            tags.push(tag.clone());
        }
    }

    /// True when a consumed tag would be recorded somewhere.
    pub fn is_tracking(&self) -> bool {
        matches!(
            self.frames.borrow().last(),
            Some(Frame {
                kind: FrameKind::Track(_),
                ..
            })
        )
    }

    pub fn depth(&self) -> usize {
        self.frames.borrow().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_collects_consumed_tags() {
        let stack = TrackingStack::new();
        let a = Tag::dirtyable();

        let frame = stack.begin_track();
        assert!(stack.is_tracking());
        stack.consume(&a);
        let tag = stack.end_track(frame);

        assert!(tag.same_as(&a));
        assert_eq!(stack.depth(), 0);
    }

    #[test]
    fn untrack_hides_reads_from_outer_frame() {
        let stack = TrackingStack::new();
        let hidden = Tag::dirtyable();

        let outer = stack.begin_track();
        let inner = stack.begin_untrack();
        assert!(!stack.is_tracking());
        stack.consume(&hidden);
        stack.end_untrack(inner);
        let tag = stack.end_track(outer);

        assert!(tag.is_constant());
    }

    #[test]
    fn nested_frames_are_independent() {
        let stack = TrackingStack::new();
        let outer_tag = Tag::dirtyable();
        let inner_tag = Tag::dirtyable();

        let outer = stack.begin_track();
        stack.consume(&outer_tag);
        let inner = stack.begin_track();
        stack.consume(&inner_tag);
        let inner_result = stack.end_track(inner);
        let outer_result = stack.end_track(outer);

        assert!(inner_result.same_as(&inner_tag));
        assert!(outer_result.same_as(&outer_tag));
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "ended while")]
    fn ending_a_frame_out_of_order_asserts() {
        let stack = TrackingStack::new();
        let outer = stack.begin_track();
        let _inner = stack.begin_track();
        stack.end_track(outer);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "wrong kind")]
    fn ending_untrack_with_track_end_asserts() {
        let stack = TrackingStack::new();
        let frame = stack.begin_untrack();
        stack.end_track(frame);
    }
}
