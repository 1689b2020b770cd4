//! Revalidation Scheduler
//!
//! Ties renderers to run loop turns. At the start of a turn every live
//! renderer gets one de-duplicated `render` job; at the end of a turn the
//! scheduler asks each renderer whether it is still valid and, if not,
//! requests another turn. A renderer that stays invalid for more than the
//! configured number of extra turns is destroyed.

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::task::{Context, Poll};

use futures_util::future::{FutureExt, Shared};
use tokio::sync::oneshot;
use tracing::{debug, error, trace};

use super::{Renderer, RendererInner};
use crate::environment::Environment;
use crate::error::{RenderError, Result};
use crate::runloop::Queue;

/// Resolves once a run loop turn ends with every renderer valid.
///
/// Clones share the same latch. Once resolved, the next call to
/// [`Environment::render_settled`] hands out a fresh one.
#[derive(Clone)]
pub struct RenderSettled(Shared<oneshot::Receiver<()>>);

impl Future for RenderSettled {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        // A dropped sender only happens when the environment goes away;
        // nothing is left to wait for then.
        self.0.poll_unpin(cx).map(|_| ())
    }
}

/// The per-environment registry of live renderers.
pub struct RenderScheduler {
    renderers: RefCell<Vec<Weak<RendererInner>>>,
    loops: Cell<u32>,
    settled: RefCell<Option<(oneshot::Sender<()>, RenderSettled)>>,
}

impl RenderScheduler {
    pub fn new() -> Self {
        Self {
            renderers: RefCell::new(Vec::new()),
            loops: Cell::new(0),
            settled: RefCell::new(None),
        }
    }

    pub(crate) fn register(&self, renderer: &Rc<RendererInner>) {
        let mut renderers = self.renderers.borrow_mut();
        let target = Rc::as_ptr(renderer);
        if renderers.iter().any(|r| r.as_ptr() == target) {
            return;
        }
        trace!(renderer = renderer.id, "renderer registered");
        renderers.push(Rc::downgrade(renderer));
    }

    pub(crate) fn deregister(&self, renderer: &RendererInner) {
        let target: *const RendererInner = renderer;
        self.renderers
            .borrow_mut()
            .retain(|r| r.strong_count() > 0 && r.as_ptr() != target);
        trace!(renderer = renderer.id, "renderer deregistered");
    }

    /// Number of registered renderers still alive.
    pub fn len(&self) -> usize {
        self.renderers.borrow().iter().filter(|r| r.strong_count() > 0).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn live(&self) -> Vec<Renderer> {
        let mut renderers = self.renderers.borrow_mut();
        renderers.retain(|r| r.strong_count() > 0);
        renderers.iter().filter_map(Weak::upgrade).map(Renderer).collect()
    }

    /// Start of a turn: queue one revalidation per renderer.
    pub(crate) fn loop_begin(&self, env: &Environment) {
        for renderer in self.live() {
            let key = format!("revalidate:{}", renderer.0.id);
            env.run_loop()
                .schedule_once(Queue::Render, key, Box::new(move |env| renderer.revalidate(env)));
        }
    }

    /// End of a turn. `Ok(true)` means every renderer is valid and the turn
    /// may end; `Ok(false)` asks for another turn.
    pub(crate) fn loop_end(&self, env: &Environment) -> Result<bool> {
        for renderer in self.live() {
            if renderer.is_valid(env) {
                continue;
            }
            let limit = env.options().rerender_loop_limit;
            if self.loops.get() >= limit {
                self.loops.set(0);
                if let Err(err) = renderer.destroy(env) {
                    debug!(error = %err, "teardown of runaway renderer failed");
                }
                error!(renderer = renderer.0.id, limit, "infinite rendering invalidation detected");
                return Err(RenderError::InfiniteRevalidation { limit });
            }
            self.loops.set(self.loops.get() + 1);
            trace!(renderer = renderer.0.id, loops = self.loops.get(), "renderer still invalid");
            return Ok(false);
        }

        self.loops.set(0);
        if let Some((sender, _)) = self.settled.borrow_mut().take() {
            trace!("render settled");
            let _ = sender.send(());
        }
        Ok(true)
    }

    /// The pending settle latch, created on first demand.
    pub(crate) fn render_settled(&self, env: &Environment) -> RenderSettled {
        if let Some((_, settled)) = self.settled.borrow().as_ref() {
            return settled.clone();
        }
        let (sender, receiver) = oneshot::channel();
        let settled = RenderSettled(receiver.shared());
        *self.settled.borrow_mut() = Some((sender, settled.clone()));
        if env.run_loop().depth() == 0 {
            env.runtime().request_autorun();
        }
        settled
    }

    /// Current count of consecutive invalid turn ends.
    pub fn loops(&self) -> u32 {
        self.loops.get()
    }
}

impl Default for RenderScheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settled_resolves_at_the_end_of_the_next_turn() {
        let env = Environment::new();
        let settled = env.render_settled();
        let again = env.render_settled();
        assert!(settled.clone().now_or_never().is_none());

        assert!(env.flush_autorun().unwrap());
        assert!(settled.now_or_never().is_some());
        assert!(again.now_or_never().is_some());

        let fresh = env.render_settled();
        assert!(fresh.clone().now_or_never().is_none());
        env.run(|_| Ok(())).unwrap();
        assert!(fresh.now_or_never().is_some());
    }

    #[test]
    fn empty_registry_is_always_valid() {
        let env = Environment::new();
        assert!(env.scheduler().is_empty());
        assert!(env.scheduler().loop_end(&env).unwrap());
        assert_eq!(env.scheduler().loops(), 0);
    }
}
