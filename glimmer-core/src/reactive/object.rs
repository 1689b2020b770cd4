//! Tracked objects: property bags whose keys each own a tag.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use super::runtime::Runtime;
use super::tag::Tag;
use super::value::Value;

/// Shared handle to a [`TrackedObject`].
pub type ObjectRef = Rc<TrackedObject>;

/// A property bag with per-key tags plus a collection tag (`[]`) that is
/// dirtied whenever the key set or array-like contents change.
pub struct TrackedObject {
    values: RefCell<IndexMap<String, Value>>,
    tags: RefCell<HashMap<String, Tag>>,
    collection: Tag,
}

impl TrackedObject {
    pub fn new() -> ObjectRef {
        Rc::new(Self {
            values: RefCell::new(IndexMap::new()),
            tags: RefCell::new(HashMap::new()),
            collection: Tag::dirtyable(),
        })
    }

    /// Build an object from initial properties. No tags are dirtied.
    pub fn with_props<K, I>(props: I) -> ObjectRef
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let obj = Self::new();
        obj.values
            .borrow_mut()
            .extend(props.into_iter().map(|(k, v)| (k.into(), v)));
        obj
    }

    /// The tag guarding `key`, created on first request.
    pub fn tag_for(&self, key: &str) -> Tag {
        self.tags
            .borrow_mut()
            .entry(key.to_string())
            .or_insert_with(Tag::dirtyable)
            .clone()
    }

    /// The `[]` tag.
    pub fn collection_tag(&self) -> Tag {
        self.collection.clone()
    }

    /// Read `key`, registering its tag with the current frame.
    pub fn get(&self, rt: &Runtime, key: &str) -> Value {
        rt.consume_tag(&self.tag_for(key));
        self.get_untracked(key)
    }

    pub fn get_untracked(&self, key: &str) -> Value {
        self.values.borrow().get(key).cloned().unwrap_or_default()
    }

    pub fn has(&self, key: &str) -> bool {
        self.values.borrow().contains_key(key)
    }

    /// Write `key`. Writing an identical value is a no-op.
    ///
    /// Returns true when the value changed.
    pub fn set(&self, rt: &Runtime, key: &str, value: Value) -> bool {
        let added = {
            let mut values = self.values.borrow_mut();
            match values.get(key) {
                Some(current) if *current == value => return false,
                Some(_) => {
                    values.insert(key.to_string(), value);
                    false
                }
                None => {
                    values.insert(key.to_string(), value);
                    true
                }
            }
        };

        rt.dirty_tag(&self.tag_for(key));
        if added {
            rt.dirty_tag(&self.collection);
        }
        true
    }

    /// Write without dirtying anything. Used while an object is being
    /// initialised, before anyone could have read it.
    pub fn set_untracked(&self, key: &str, value: Value) {
        self.values.borrow_mut().insert(key.to_string(), value);
    }

    /// Dirty the `[]` tag after an in-place content change.
    pub fn notify_collection_change(&self, rt: &Runtime) {
        rt.dirty_tag(&self.collection);
    }

    /// Keys in insertion order; consumes the `[]` tag.
    pub fn keys(&self, rt: &Runtime) -> Vec<String> {
        rt.consume_tag(&self.collection);
        self.values.borrow().keys().cloned().collect()
    }
}

impl fmt::Debug for TrackedObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.values.borrow().iter()).finish()
    }
}
