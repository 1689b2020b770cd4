//! Revision Tags
//!
//! A tag answers one question: "has anything I stand for changed since
//! revision N?". Every piece of mutable state owns a dirtyable tag whose
//! revision is bumped from the runtime's global clock when the state is
//! written. Derived computations own a combinator tag over everything they
//! read, whose value is the maximum of its members.
//!
//! Revisions only ever increase, so a snapshot taken with [`Tag::value`] can
//! later be checked with [`Tag::validate`]: the tag is valid as long as its
//! value has not moved past the snapshot.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use smallvec::SmallVec;

/// A point on the runtime's revision clock.
pub type Revision = u64;

/// Revision of tags that can never change.
pub const CONSTANT: Revision = 0;

/// Revision every fresh dirtyable tag starts at.
pub const INITIAL: Revision = 1;

#[derive(Clone)]
enum TagKind {
    Constant,
    Dirtyable(Rc<Cell<Revision>>),
    Combinator(Rc<[Tag]>),
}

/// A revision tag. Cloning a tag yields a handle to the same clock.
#[derive(Clone)]
pub struct Tag(TagKind);

impl Tag {
    /// A tag that is valid forever.
    pub fn constant() -> Self {
        Self(TagKind::Constant)
    }

    /// A tag that can be dirtied through the runtime.
    pub fn dirtyable() -> Self {
        Self(TagKind::Dirtyable(Rc::new(Cell::new(INITIAL))))
    }

    /// Combine tags into one whose value is the newest of its members.
    ///
    /// Constant members are dropped; combining nothing yields a constant tag
    /// and combining a single tag yields that tag.
    pub fn combine<I>(tags: I) -> Self
    where
        I: IntoIterator<Item = Tag>,
    {
        let mut members: SmallVec<[Tag; 4]> = SmallVec::new();
        for tag in tags {
            if tag.is_constant() || members.iter().any(|m| m.same_as(&tag)) {
                continue;
            }
            members.push(tag);
        }

        match members.len() {
            0 => Self::constant(),
            1 => members.remove(0),
            _ => Self(TagKind::Combinator(members.into_iter().collect())),
        }
    }

    /// The tag's current revision.
    pub fn value(&self) -> Revision {
        match &self.0 {
            TagKind::Constant => CONSTANT,
            TagKind::Dirtyable(rev) => rev.get(),
            TagKind::Combinator(members) => members.iter().map(Tag::value).max().unwrap_or(CONSTANT),
        }
    }

    /// True when nothing behind this tag changed after `snapshot` was taken.
    pub fn validate(&self, snapshot: Revision) -> bool {
        self.value() <= snapshot
    }

    pub fn is_constant(&self) -> bool {
        matches!(self.0, TagKind::Constant)
    }

    pub fn is_dirtyable(&self) -> bool {
        matches!(self.0, TagKind::Dirtyable(_))
    }

    /// Identity comparison: do both handles share the same clock?
    pub fn same_as(&self, other: &Tag) -> bool {
        match (&self.0, &other.0) {
            (TagKind::Constant, TagKind::Constant) => true,
            (TagKind::Dirtyable(a), TagKind::Dirtyable(b)) => Rc::ptr_eq(a, b),
            (TagKind::Combinator(a), TagKind::Combinator(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Move a dirtyable tag to `revision`. Returns false for other tag kinds.
    pub(crate) fn set_revision(&self, revision: Revision) -> bool {
        match &self.0 {
            TagKind::Dirtyable(rev) => {
                debug_assert!(revision >= rev.get(), "tag revisions must not go backwards");
                rev.set(revision);
                true
            }
            _ => false,
        }
    }
}

impl Default for Tag {
    fn default() -> Self {
        Self::constant()
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            TagKind::Constant => f.write_str("Tag::Constant"),
            TagKind::Dirtyable(rev) => write!(f, "Tag::Dirtyable({})", rev.get()),
            TagKind::Combinator(members) => f.debug_tuple("Tag::Combinator").field(&members.len()).finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_tags_always_validate() {
        let tag = Tag::constant();
        assert_eq!(tag.value(), CONSTANT);
        assert!(tag.validate(CONSTANT));
    }

    #[test]
    fn combinator_tracks_newest_member() {
        let a = Tag::dirtyable();
        let b = Tag::dirtyable();
        let combined = Tag::combine([a.clone(), b.clone(), Tag::constant()]);
        let snapshot = combined.value();

        assert!(combined.validate(snapshot));
        b.set_revision(snapshot + 3);
        assert!(!combined.validate(snapshot));
        assert_eq!(combined.value(), snapshot + 3);
    }

    #[test]
    fn combine_collapses_trivial_cases() {
        assert!(Tag::combine(Vec::new()).is_constant());

        let only = Tag::dirtyable();
        let combined = Tag::combine([only.clone(), only.clone()]);
        assert!(combined.same_as(&only));
    }
}
