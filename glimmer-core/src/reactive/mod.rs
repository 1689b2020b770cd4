//! Reactive Primitives
//!
//! This module implements the revision-based reactivity the renderer is
//! built on: tags, tracking frames, memoized caches and references.
//!
//! # Concepts
//!
//! ## Tags
//!
//! A tag is a revision clock for one piece of state. Writes dirty the tag,
//! which moves it to the runtime's next global revision. Readers snapshot a
//! tag's value and later validate the snapshot to learn whether anything
//! changed, without being notified.
//!
//! ## Tracking frames
//!
//! While a frame is open, every tag consumed is recorded. Closing the frame
//! yields one combined tag covering everything read, which is how derived
//! work learns its dependencies automatically.
//!
//! ## References
//!
//! References give templates a uniform read/write contract. Reading a
//! reference consumes its tags; writing an updatable reference dirties them.
//!
//! # Implementation Notes
//!
//! Nothing here pushes notifications. Invalidation is discovered by pulling:
//! the renderer compares a snapshot of the global clock at the end of every
//! run loop turn, and each block re-validates its own tag before doing work.

mod cache;
mod destroyable;
mod object;
mod reference;
mod runtime;
mod tag;
mod tracking;
mod value;

pub use cache::Cache;
pub use destroyable::{DestroyableArena, DestroyableId, Destructor};
pub use object::{ObjectRef, TrackedObject};
pub use reference::{is_constant, is_updatable_ref, unwrap_reactive, update_ref, MutableCell, Reference};
pub use runtime::Runtime;
pub use tag::{Revision, Tag, CONSTANT, INITIAL};
pub use tracking::{FrameId, TrackingStack};
pub use value::{Function, Opaque, Value};
