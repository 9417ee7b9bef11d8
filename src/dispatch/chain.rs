//! Interceptor chain state machine.
//!
//! # Protocol
//! ```text
//! before phase:  proceed() runs interceptors[next++]
//!                proceed_then(after) queues `after`, then does the same
//! past the end:  switch to unwinding
//! unwinding:     proceed() pops the last queued `after` and runs it;
//!                each `after` must call proceed() to keep unwinding
//! nothing left:  done
//! ```
//!
//! The last interceptor is always the dispatcher's execute-action step, which
//! calls `proceed()` from the response's completion hook. So the after phase
//! runs once the response has ended, in reverse registration order.
//!
//! Once the guard renders an error the chain is aborted: no further
//! interceptor or after callback runs.
//!
//! The chain holds its request context weakly. Whoever still has work to do
//! for the request keeps the [`Context`] alive, not the [`Proceed`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::handler::Interceptor;
use super::keys;
use crate::context::{Context, WeakContext};
use crate::error::HttpError;

type AfterFn = Box<dyn FnOnce(&Context, Proceed) -> Result<(), HttpError> + Send>;

#[derive(Default)]
struct Cursor {
    next: usize,
    unwinding: bool,
    finished: bool,
    aborted: bool,
    after: Vec<AfterFn>,
}

struct Chain {
    ctx: WeakContext,
    interceptors: Arc<[Arc<dyn Interceptor>]>,
    cursor: Mutex<Cursor>,
}

enum Step {
    Run(Arc<dyn Interceptor>),
    After(AfterFn),
    Done,
}

/// Continuation handed to each interceptor.
#[derive(Clone)]
pub struct Proceed {
    chain: Arc<Chain>,
}

impl Proceed {
    /// Start a fresh chain over `interceptors` for one request.
    pub(crate) fn start(
        ctx: &Context,
        interceptors: Arc<[Arc<dyn Interceptor>]>,
    ) -> Result<(), HttpError> {
        let chain = Arc::new(Chain {
            ctx: ctx.downgrade(),
            interceptors,
            cursor: Mutex::new(Cursor::default()),
        });
        ctx.seed(keys::CHAIN, ChainHandle(Arc::clone(&chain)))?;
        Proceed { chain }.proceed()
    }

    /// Continue the chain.
    pub fn proceed(&self) -> Result<(), HttpError> {
        self.advance(None)
    }

    /// Continue the chain and run `after` during the unwind.
    ///
    /// `after` receives the continuation and must call `proceed()` on it.
    pub fn proceed_then<F>(&self, after: F) -> Result<(), HttpError>
    where
        F: FnOnce(&Context, Proceed) -> Result<(), HttpError> + Send + 'static,
    {
        self.advance(Some(Box::new(after)))
    }

    /// The request context the chain runs in, unless the request is gone.
    pub fn context(&self) -> Option<Context> {
        self.chain.ctx.upgrade()
    }

    pub fn is_unwinding(&self) -> bool {
        self.cursor().unwinding
    }

    pub fn is_aborted(&self) -> bool {
        self.cursor().aborted
    }

    fn advance(&self, after: Option<AfterFn>) -> Result<(), HttpError> {
        let step = {
            let mut cursor = self.cursor();
            let mut next = None;
            if cursor.aborted {
                tracing::trace!("Interceptor chain aborted, not resuming");
                return Ok(());
            }
            if cursor.unwinding {
                if after.is_some() {
                    tracing::warn!("After callback queued while unwinding, ignored");
                }
            } else {
                if let Some(after) = after {
                    cursor.after.push(after);
                }
                match self.chain.interceptors.get(cursor.next) {
                    Some(interceptor) => {
                        cursor.next += 1;
                        next = Some(Step::Run(Arc::clone(interceptor)));
                    }
                    None => cursor.unwinding = true,
                }
            }
            match next {
                Some(step) => step,
                None => match cursor.after.pop() {
                    Some(after) => Step::After(after),
                    None => {
                        if !cursor.finished {
                            cursor.finished = true;
                            tracing::trace!("Interceptor chain finished");
                        }
                        Step::Done
                    }
                },
            }
        };

        if let Step::Done = step {
            return Ok(());
        }
        let Some(ctx) = self.context() else {
            tracing::debug!("Request context dropped, interceptor chain stopped");
            return Ok(());
        };
        match step {
            Step::Run(interceptor) => interceptor.execute(&ctx, self.clone()),
            Step::After(after) => after(&ctx, self.clone()),
            Step::Done => Ok(()),
        }
    }

    fn cursor(&self) -> MutexGuard<'_, Cursor> {
        self.chain
            .cursor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Proceed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let cursor = self.cursor();
        f.debug_struct("Proceed")
            .field("next", &cursor.next)
            .field("of", &self.chain.interceptors.len())
            .field("unwinding", &cursor.unwinding)
            .field("aborted", &cursor.aborted)
            .field("queued_after", &cursor.after.len())
            .finish()
    }
}

/// The chain of a request, seeded as `chain` so the guard can abort it.
pub(crate) struct ChainHandle(Arc<Chain>);

impl ChainHandle {
    pub(crate) fn abort(&self) {
        let dropped = {
            let mut cursor = self.0.cursor.lock().unwrap_or_else(PoisonError::into_inner);
            if cursor.aborted {
                return;
            }
            cursor.aborted = true;
            std::mem::take(&mut cursor.after)
        };
        tracing::trace!(skipped = dropped.len(), "Interceptor chain aborted");
    }
}
