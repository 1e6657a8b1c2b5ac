//! Readiness tracking for asynchronously loaded resources.
//!
//! A [`Completion`] makes exactly one transition, to resolved or to failed.
//! Dependents either check [`Completion::is_complete`] or await
//! [`Completion::wait`]; [`wait_all`] joins several of them so a composite
//! resource flips its own flag only once every part is ready.

use std::{
    cell::{Cell, RefCell},
    fmt,
    rc::Rc,
};

use futures::{FutureExt, future::LocalBoxFuture};
use futures_intrusive::channel::shared::{OneshotSender, oneshot_channel};

#[derive(Default)]
struct CompletionState {
    complete: Cell<bool>,
    failed: Cell<bool>,
    waiters: RefCell<Vec<OneshotSender<()>>>,
}

#[derive(Clone, Default)]
pub struct Completion(Rc<CompletionState>);

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("complete", &self.0.complete.get())
            .field("failed", &self.0.failed.get())
            .finish()
    }
}

impl Completion {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_complete(&self) -> bool {
        self.0.complete.get()
    }

    pub fn is_failed(&self) -> bool {
        self.0.failed.get()
    }

    pub fn is_pending(&self) -> bool {
        !self.is_complete() && !self.is_failed()
    }

    /// Marks the resource ready and wakes every waiter. Later calls are ignored.
    pub fn resolve(&self) {
        if !self.is_pending() {
            return;
        }
        self.0.complete.set(true);
        for waiter in self.0.waiters.borrow_mut().drain(..) {
            // the receiving side may already be gone
            let _ = waiter.send(());
        }
    }

    /// Marks the resource as never becoming ready. Waiters observe `false`.
    pub fn fail(&self) {
        if !self.is_pending() {
            return;
        }
        self.0.failed.set(true);
        // dropping the senders closes the channels
        self.0.waiters.borrow_mut().clear();
    }

    /// Resolves to `true` once complete, `false` if the resource failed.
    pub fn wait(&self) -> LocalBoxFuture<'static, bool> {
        if self.is_complete() {
            return futures::future::ready(true).boxed_local();
        }
        if self.is_failed() {
            return futures::future::ready(false).boxed_local();
        }
        let (tx, rx) = oneshot_channel::<()>();
        self.0.waiters.borrow_mut().push(tx);
        async move { rx.receive().await.is_some() }.boxed_local()
    }
}

/// `true` once every completion resolved; `false` as soon as all have settled
/// and at least one failed.
pub async fn wait_all(completions: Vec<Completion>) -> bool {
    futures::future::join_all(completions.iter().map(Completion::wait))
        .await
        .into_iter()
        .all(|ok| ok)
}
