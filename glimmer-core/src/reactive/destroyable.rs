//! Destructor Graph
//!
//! Every destroyable thing (a render result, a component instance, a
//! stateful helper, an engine) is a node in an arena indexed by
//! [`DestroyableId`]. Nodes record their parent and children; destroying a
//! node walks its subtree iteratively and runs destructors children-first,
//! in registration order.
//!
//! Destroying is idempotent: ids that were already torn down (or are being
//! torn down) are ignored.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use tracing::trace;

use super::runtime::Runtime;
use crate::error::Result;

/// A teardown callback.
pub type Destructor = Box<dyn FnOnce(&Runtime) -> Result<()>>;

/// Handle to a node in the destructor graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DestroyableId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Live,
    Destroying,
}

struct Entry {
    parent: Option<DestroyableId>,
    children: Vec<DestroyableId>,
    destructors: Vec<Destructor>,
    stage: Stage,
}

/// Arena of destroyables owned by a runtime.
#[derive(Default)]
pub struct DestroyableArena {
    entries: RefCell<HashMap<DestroyableId, Entry>>,
    next_id: Cell<u64>,
}

impl DestroyableArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a node, optionally as a child of `parent`.
    ///
    /// A parent that no longer exists is ignored and the node becomes a root.
    pub fn register(&self, parent: Option<DestroyableId>) -> DestroyableId {
        let id = DestroyableId(self.next_id.get());
        self.next_id.set(id.0 + 1);

        let mut entries = self.entries.borrow_mut();
        let parent = parent.filter(|p| entries.contains_key(p));
        if let Some(p) = parent.and_then(|p| entries.get_mut(&p)) {
            p.children.push(id);
        }
        entries.insert(
            id,
            Entry {
                parent,
                children: Vec::new(),
                destructors: Vec::new(),
                stage: Stage::Live,
            },
        );
        id
    }

    /// Attach a destructor to `id`. Returns false if `id` is already gone.
    pub fn register_destructor(&self, id: DestroyableId, destructor: Destructor) -> bool {
        match self.entries.borrow_mut().get_mut(&id) {
            Some(entry) if entry.stage == Stage::Live => {
                entry.destructors.push(destructor);
                true
            }
            _ => false,
        }
    }

    pub fn is_destroyed(&self, id: DestroyableId) -> bool {
        !self.entries.borrow().contains_key(&id)
    }

    pub fn is_destroying(&self, id: DestroyableId) -> bool {
        self.entries.borrow().get(&id).is_some_and(|e| e.stage == Stage::Destroying)
    }

    /// Number of nodes not yet destroyed.
    pub fn live_count(&self) -> usize {
        self.entries.borrow().len()
    }

    /// Destroy `id` and its whole subtree.
    ///
    /// All destructors run even if one fails; the first failure is returned.
    pub fn destroy(&self, rt: &Runtime, id: DestroyableId) -> Result<()> {
        let order = {
            let mut entries = self.entries.borrow_mut();
            match entries.get(&id) {
                Some(entry) if entry.stage == Stage::Live => {}
                _ => return Ok(()),
            }

            // Pre-order walk, reversed below into children-first order.
            let mut visit = vec![id];
            let mut pre_order = Vec::new();
            while let Some(next) = visit.pop() {
                if let Some(entry) = entries.get_mut(&next) {
                    if entry.stage != Stage::Live {
                        continue;
                    }
                    entry.stage = Stage::Destroying;
                    pre_order.push(next);
                    visit.extend(entry.children.iter().rev().copied());
                }
            }

            if let Some(parent) = entries.get(&id).and_then(|e| e.parent) {
                if let Some(p) = entries.get_mut(&parent) {
                    p.children.retain(|c| *c != id);
                }
            }

            let mut order = Vec::with_capacity(pre_order.len());
            for node in children_first(&entries, &pre_order) {
                let destructors = entries
                    .get_mut(&node)
                    .map(|e| std::mem::take(&mut e.destructors))
                    .unwrap_or_default();
                order.push((node, destructors));
            }
            order
        };

        trace!(root = id.0, nodes = order.len(), "destroying subtree");

        let mut first_error = None;
        for (node, destructors) in order {
            for destructor in destructors {
                if let Err(err) = destructor(rt) {
                    first_error.get_or_insert(err);
                }
            }
            self.entries.borrow_mut().remove(&node);
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Order `pre_order` so every node comes after all of its descendants while
/// siblings keep registration order.
fn children_first(entries: &HashMap<DestroyableId, Entry>, pre_order: &[DestroyableId]) -> Vec<DestroyableId> {
    let Some(&root) = pre_order.first() else {
        return Vec::new();
    };

    let mut out = Vec::with_capacity(pre_order.len());
    let mut stack = vec![(root, false)];
    while let Some((node, expanded)) = stack.pop() {
        if expanded {
            out.push(node);
            continue;
        }
        stack.push((node, true));
        if let Some(entry) = entries.get(&node) {
            for child in entry.children.iter().rev() {
                if entries.get(child).is_some_and(|e| e.stage == Stage::Destroying) {
                    stack.push((*child, false));
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    fn recorder(log: &Rc<RefCell<Vec<&'static str>>>, name: &'static str) -> Destructor {
        let log = log.clone();
        Box::new(move |_| {
            log.borrow_mut().push(name);
            Ok(())
        })
    }

    #[test]
    fn destroys_children_before_parents() {
        let rt = Runtime::new();
        let arena = rt.destroyables();
        let log = Rc::new(RefCell::new(Vec::new()));

        let root = arena.register(None);
        let a = arena.register(Some(root));
        let a1 = arena.register(Some(a));
        let b = arena.register(Some(root));
        arena.register_destructor(root, recorder(&log, "root"));
        arena.register_destructor(a, recorder(&log, "a"));
        arena.register_destructor(a1, recorder(&log, "a1"));
        arena.register_destructor(b, recorder(&log, "b"));

        arena.destroy(&rt, root).unwrap();

        assert_eq!(*log.borrow(), vec!["a1", "a", "b", "root"]);
        assert!(arena.is_destroyed(a1));
        assert_eq!(arena.live_count(), 0);
    }

    #[test]
    fn destroy_is_idempotent() {
        let rt = Runtime::new();
        let arena = rt.destroyables();
        let log = Rc::new(RefCell::new(Vec::new()));

        let node = arena.register(None);
        arena.register_destructor(node, recorder(&log, "node"));

        arena.destroy(&rt, node).unwrap();
        arena.destroy(&rt, node).unwrap();

        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn destroying_a_child_detaches_it() {
        let rt = Runtime::new();
        let arena = rt.destroyables();
        let log = Rc::new(RefCell::new(Vec::new()));

        let parent = arena.register(None);
        let child = arena.register(Some(parent));
        arena.register_destructor(child, recorder(&log, "child"));

        arena.destroy(&rt, child).unwrap();
        arena.destroy(&rt, parent).unwrap();

        assert_eq!(*log.borrow(), vec!["child"]);
    }
}
