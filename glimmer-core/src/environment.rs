//! The Environment
//!
//! Everything the renderer would otherwise keep in module-level globals lives
//! here: the reactive runtime (revision clock, tracking stack, destructor
//! graph), the document, the run loop and the renderer registry. Definition
//! caches belong to each renderer's resolver. An environment is single-threaded; create as
//! many as you like, but never share state between them.

use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;

use tracing::{debug, trace};

use crate::config::{EnvironmentOptions, RenderMode};
use crate::dom::{self, ClientBuilder, Cursor, Document, ElementBuilder, Event, NodeId, RehydrationBuilder, SerializeBuilder};
use crate::error::{RenderError, Result};
use crate::reactive::Runtime;
use crate::renderer::scheduler::{RenderScheduler, RenderSettled};
use crate::runloop::{Job, Queue, RunLoop};

/// Work deferred to the end of a DOM transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitPhase {
    /// Components created during the transaction (`did_create`).
    Created,
    /// Components updated during the transaction (`did_update`).
    Updated,
    InstallModifier,
    UpdateModifier,
}

impl CommitPhase {
    fn index(self) -> usize {
        match self {
            CommitPhase::Created => 0,
            CommitPhase::Updated => 1,
            CommitPhase::InstallModifier => 2,
            CommitPhase::UpdateModifier => 3,
        }
    }
}

#[derive(Default)]
struct Transaction {
    phases: [Vec<Job>; 4],
}

/// Process-wide rendering state, passed by reference to every API that
/// needs it.
pub struct Environment {
    runtime: Runtime,
    document: Rc<RefCell<Document>>,
    options: EnvironmentOptions,
    run_loop: RunLoop,
    scheduler: RenderScheduler,
    transaction: RefCell<Option<Transaction>>,
}

impl Environment {
    pub fn new() -> Self {
        Self::with_options(EnvironmentOptions::default())
    }

    pub fn with_options(options: EnvironmentOptions) -> Self {
        debug!(mode = ?options.render_mode, limit = options.rerender_loop_limit, "environment created");
        Self {
            runtime: Runtime::new(),
            document: Rc::new(RefCell::new(Document::new())),
            options,
            run_loop: RunLoop::new(),
            scheduler: RenderScheduler::new(),
            transaction: RefCell::new(None),
        }
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub fn options(&self) -> &EnvironmentOptions {
        &self.options
    }

    pub fn is_interactive(&self) -> bool {
        self.options.is_interactive
    }

    pub fn run_loop(&self) -> &RunLoop {
        &self.run_loop
    }

    pub(crate) fn scheduler(&self) -> &RenderScheduler {
        &self.scheduler
    }

    /// Borrow the document. Do not hold the borrow across calls back into
    /// the renderer.
    pub fn document(&self) -> Ref<'_, Document> {
        self.document.borrow()
    }

    pub fn document_mut(&self) -> RefMut<'_, Document> {
        self.document.borrow_mut()
    }

    /// A handle to the document for teardown that outlives this borrow.
    pub(crate) fn shared_document(&self) -> Rc<RefCell<Document>> {
        self.document.clone()
    }

    /// A builder writing into `parent` before `next_sibling`, chosen by the
    /// configured render mode.
    pub fn builder_for(&self, parent: NodeId, next_sibling: Option<NodeId>) -> Box<dyn ElementBuilder> {
        let cursor = Cursor { parent, next_sibling };
        match self.options.render_mode {
            RenderMode::Client => Box::new(ClientBuilder::new(cursor)),
            RenderMode::Serialize => Box::new(SerializeBuilder::new(cursor)),
            RenderMode::Rehydrate => Box::new(RehydrationBuilder::new(&self.document.borrow(), parent)),
        }
    }

    /// Run `f` inside a run loop turn, then flush the queues and settle the
    /// renderers. Nested calls flush the queues without ending the turn.
    ///
    /// The flush and the end of the turn happen even when `f` or the flush
    /// fails; the first error is returned.
    pub fn run<R>(&self, f: impl FnOnce(&Environment) -> Result<R>) -> Result<R> {
        let depth = self.run_loop.enter();
        let outermost = depth == 1;
        if outermost {
            self.runtime.set_in_run_loop(true);
            self.runtime.take_autorun();
            self.scheduler.loop_begin(self);
        }

        let body = f(self);
        let flushed = self.run_loop.flush(self);
        let finished = if outermost { self.finish_turn() } else { Ok(()) };
        if outermost {
            self.runtime.set_in_run_loop(false);
        }
        self.run_loop.exit(outermost);

        let value = body?;
        flushed?;
        finished?;
        Ok(value)
    }

    /// Run `f` in the current turn if there is one, otherwise start a turn.
    pub fn join<R>(&self, f: impl FnOnce(&Environment) -> Result<R>) -> Result<R> {
        if self.run_loop.depth() > 0 {
            f(self)
        } else {
            self.run(f)
        }
    }

    /// Ask every renderer whether it settled; keep turning until they have
    /// or the loop limit trips.
    fn finish_turn(&self) -> Result<()> {
        loop {
            match self.scheduler.loop_end(self) {
                Ok(true) => return Ok(()),
                Ok(false) => {
                    trace!("renderers invalid at end of turn, running another");
                    self.scheduler.loop_begin(self);
                    self.run_loop.flush(self)?;
                }
                Err(err) => {
                    self.run_loop.clear();
                    return Err(err);
                }
            }
        }
    }

    pub fn schedule(&self, queue: Queue, job: Job) {
        if self.run_loop.depth() == 0 {
            self.runtime.request_autorun();
        }
        self.run_loop.schedule(queue, job);
    }

    pub fn schedule_once(&self, queue: Queue, key: impl Into<String>, job: Job) -> bool {
        if self.run_loop.depth() == 0 {
            self.runtime.request_autorun();
        }
        self.run_loop.schedule_once(queue, key, job)
    }

    /// Run the turn that state changes made outside any loop are waiting
    /// for. Returns whether a turn ran.
    pub fn flush_autorun(&self) -> Result<bool> {
        if self.run_loop.depth() > 0 {
            return Ok(false);
        }
        if self.runtime.take_autorun() || self.run_loop.has_pending() {
            self.run(|_| Ok(()))?;
            return Ok(true);
        }
        Ok(false)
    }

    /// A future that resolves once a turn ends with every renderer valid.
    pub fn render_settled(&self) -> RenderSettled {
        self.scheduler.render_settled(self)
    }

    /// Run `f` inside a DOM transaction. Hooks scheduled with
    /// [`schedule_commit`](Self::schedule_commit) run when the outermost
    /// transaction commits, even if `f` failed.
    pub fn in_transaction<R>(&self, f: impl FnOnce() -> Result<R>) -> Result<R> {
        if self.transaction.borrow().is_some() {
            return f();
        }
        *self.transaction.borrow_mut() = Some(Transaction::default());
        let result = f();
        let committed = self.commit();
        let value = result?;
        committed?;
        Ok(value)
    }

    pub fn is_in_transaction(&self) -> bool {
        self.transaction.borrow().is_some()
    }

    pub fn schedule_commit(&self, phase: CommitPhase, job: Job) -> Result<()> {
        match self.transaction.borrow_mut().as_mut() {
            Some(transaction) => {
                transaction.phases[phase.index()].push(job);
                Ok(())
            }
            None => Err(RenderError::assertion(format!(
                "{phase:?} work scheduled outside of a DOM transaction"
            ))),
        }
    }

    fn commit(&self) -> Result<()> {
        let Some(transaction) = self.transaction.borrow_mut().take() else {
            return Ok(());
        };
        let mut first_error = None;
        for phase in transaction.phases {
            for job in phase {
                if let Err(err) = job(self) {
                    first_error.get_or_insert(err);
                }
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Dispatch a DOM event inside a run loop turn.
    pub fn dispatch_event(&self, target: NodeId, event: Event) -> Result<Event> {
        self.join(|env| dom::dispatch_event(&env.document, &env.runtime, target, event))
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Tag;
    use futures_util::FutureExt;
    use std::cell::Cell;

    #[test]
    fn join_reuses_the_current_turn() {
        let env = Environment::new();
        env.run(|env| {
            let depth = env.run_loop().depth();
            env.join(|env| {
                assert_eq!(env.run_loop().depth(), depth);
                Ok(())
            })
        })
        .unwrap();
        assert_eq!(env.run_loop().turns(), 1);
    }

    #[test]
    fn failing_turns_still_end() {
        let env = Environment::new();
        let ran = Rc::new(Cell::new(false));
        let flag = ran.clone();
        let settled = env.render_settled();

        let result: Result<()> = env.run(|env| {
            env.schedule(
                Queue::AfterRender,
                Box::new(move |_| {
                    flag.set(true);
                    Ok(())
                }),
            );
            Err(RenderError::assertion("body failed"))
        });

        assert!(matches!(result, Err(RenderError::Assertion(_))));
        assert!(ran.get());
        assert!(settled.now_or_never().is_some());
        assert_eq!(env.run_loop().depth(), 0);
        assert!(!env.runtime().in_run_loop());
    }

    #[test]
    fn the_first_error_wins() {
        let env = Environment::new();
        let result: Result<()> = env.run(|env| {
            env.schedule(Queue::Actions, Box::new(|_| Err(RenderError::hook("job", "second"))));
            Err(RenderError::assertion("first"))
        });
        assert!(matches!(result, Err(RenderError::Assertion(_))));
    }

    #[test]
    fn dirtying_outside_a_loop_requests_an_autorun() {
        let env = Environment::new();
        let tag = Tag::dirtyable();
        assert!(!env.flush_autorun().unwrap());

        env.runtime().dirty_tag(&tag);
        assert!(env.flush_autorun().unwrap());
        assert!(!env.flush_autorun().unwrap());
    }

    #[test]
    fn transaction_commits_phases_in_order() {
        let env = Environment::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        env.in_transaction(|| {
            for phase in [
                CommitPhase::UpdateModifier,
                CommitPhase::InstallModifier,
                CommitPhase::Updated,
                CommitPhase::Created,
            ] {
                let log = log.clone();
                env.schedule_commit(
                    phase,
                    Box::new(move |_| {
                        log.borrow_mut().push(phase);
                        Ok(())
                    }),
                )?;
            }
            Ok(())
        })
        .unwrap();

        assert_eq!(
            *log.borrow(),
            vec![
                CommitPhase::Created,
                CommitPhase::Updated,
                CommitPhase::InstallModifier,
                CommitPhase::UpdateModifier
            ]
        );
        assert!(env.schedule_commit(CommitPhase::Created, Box::new(|_| Ok(()))).is_err());
    }

    #[test]
    fn commit_runs_even_when_the_body_fails() {
        let env = Environment::new();
        let ran = Rc::new(Cell::new(false));
        let flag = ran.clone();

        let result: Result<()> = env.in_transaction(|| {
            env.schedule_commit(
                CommitPhase::Created,
                Box::new(move |_| {
                    flag.set(true);
                    Ok(())
                }),
            )?;
            Err(RenderError::assertion("boom"))
        });

        assert!(result.is_err());
        assert!(ran.get());
    }
}
