//! Run Loop
//!
//! All rendering work happens inside run loop turns. A turn collects jobs
//! into named queues and flushes them in a fixed order when the outermost
//! `run` finishes:
//!
//! 1. `actions`: user-level work (event handlers, state changes)
//! 2. `render`: renderer revalidation
//! 3. `after_render`: work that needs the DOM settled
//! 4. `destroy`: deferred teardown
//!
//! After every job the flush restarts from the first non-empty queue, so a
//! render job that schedules an action sees that action run before the next
//! render job. The begin/end hooks that drive revalidation live on
//! [`Environment`](crate::Environment).

use std::cell::{Cell, RefCell};
use std::collections::{HashSet, VecDeque};

use tracing::trace;

use crate::environment::Environment;
use crate::error::Result;

/// A queued unit of work.
pub type Job = Box<dyn FnOnce(&Environment) -> Result<()>>;

/// Queue names, in flush order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Queue {
    Actions,
    Render,
    AfterRender,
    Destroy,
}

impl Queue {
    pub const ALL: [Queue; 4] = [Queue::Actions, Queue::Render, Queue::AfterRender, Queue::Destroy];

    fn index(self) -> usize {
        match self {
            Queue::Actions => 0,
            Queue::Render => 1,
            Queue::AfterRender => 2,
            Queue::Destroy => 3,
        }
    }
}

struct Entry {
    key: Option<String>,
    job: Job,
}

/// Queues and nesting depth for one environment.
pub struct RunLoop {
    queues: RefCell<[VecDeque<Entry>; 4]>,
    /// Keys of `schedule_once` jobs that are queued but not yet run.
    once_keys: RefCell<HashSet<(usize, String)>>,
    depth: Cell<usize>,
    turns: Cell<u64>,
}

impl RunLoop {
    pub fn new() -> Self {
        Self {
            queues: RefCell::new(Default::default()),
            once_keys: RefCell::new(HashSet::new()),
            depth: Cell::new(0),
            turns: Cell::new(0),
        }
    }

    pub fn schedule(&self, queue: Queue, job: Job) {
        self.queues.borrow_mut()[queue.index()].push_back(Entry { key: None, job });
    }

    /// Queue `job` unless a job with the same key is already waiting in
    /// `queue`. Returns whether the job was queued.
    pub fn schedule_once(&self, queue: Queue, key: impl Into<String>, job: Job) -> bool {
        let key = key.into();
        if !self.once_keys.borrow_mut().insert((queue.index(), key.clone())) {
            trace!(?queue, key = %key, "schedule_once coalesced");
            return false;
        }
        self.queues.borrow_mut()[queue.index()].push_back(Entry { key: Some(key), job });
        true
    }

    pub fn has_pending(&self) -> bool {
        self.queues.borrow().iter().any(|q| !q.is_empty())
    }

    pub fn pending(&self, queue: Queue) -> usize {
        self.queues.borrow()[queue.index()].len()
    }

    pub fn depth(&self) -> usize {
        self.depth.get()
    }

    /// Number of completed outermost turns.
    pub fn turns(&self) -> u64 {
        self.turns.get()
    }

    pub(crate) fn enter(&self) -> usize {
        let depth = self.depth.get() + 1;
        self.depth.set(depth);
        depth
    }

    pub(crate) fn exit(&self, completed_turn: bool) {
        self.depth.set(self.depth.get().saturating_sub(1));
        if completed_turn {
            self.turns.set(self.turns.get() + 1);
        }
    }

    fn next_job(&self) -> Option<Job> {
        let mut queues = self.queues.borrow_mut();
        for (index, queue) in queues.iter_mut().enumerate() {
            if let Some(entry) = queue.pop_front() {
                if let Some(key) = entry.key {
                    self.once_keys.borrow_mut().remove(&(index, key));
                }
                return Some(entry.job);
            }
        }
        None
    }

    /// Run queued jobs until every queue is empty.
    ///
    /// The queue borrow is released before each job runs, so jobs may
    /// schedule more work.
    pub(crate) fn flush(&self, env: &Environment) -> Result<()> {
        while let Some(job) = self.next_job() {
            job(env)?;
        }
        Ok(())
    }

    /// Drop everything still queued.
    pub(crate) fn clear(&self) {
        for queue in self.queues.borrow_mut().iter_mut() {
            queue.clear();
        }
        self.once_keys.borrow_mut().clear();
    }
}

impl Default for RunLoop {
    fn default() -> Self {
        Self::new()
    }
}
