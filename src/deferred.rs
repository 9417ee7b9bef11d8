//! Single-assignment deferred values.
//!
//! A [`Deferred`] collects callbacks until a result arrives, then runs them in
//! registration order on the resolving thread. Callbacks added afterwards run
//! immediately on the caller's thread. Used for values that arrive after the
//! chain has started, such as the request body.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;

use crate::error::{Error, HttpError, Result};

type Callback<T, E> = Box<dyn FnOnce(Arc<std::result::Result<T, E>>) + Send>;

struct State<T, E> {
    result: Option<Arc<std::result::Result<T, E>>>,
    callbacks: Vec<Callback<T, E>>,
}

/// A value (or error) that is set exactly once.
pub struct Deferred<T, E = HttpError> {
    state: Arc<Mutex<State<T, E>>>,
}

impl<T, E> Clone for Deferred<T, E> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T, E> Default for Deferred<T, E> {
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                result: None,
                callbacks: Vec::new(),
            })),
        }
    }
}

impl<T, E> Deferred<T, E>
where
    T: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `callback` with the result, now if it is present, otherwise once
    /// [`done`](Self::done) is called.
    pub fn add_callback<F>(&self, callback: F)
    where
        F: FnOnce(Arc<std::result::Result<T, E>>) + Send + 'static,
    {
        let mut state = self.lock();
        match state.result.clone() {
            Some(result) => {
                drop(state);
                callback(result);
            }
            None => state.callbacks.push(Box::new(callback)),
        }
    }

    pub fn has_result(&self) -> bool {
        self.lock().result.is_some()
    }

    /// The stored result, if any.
    pub fn result(&self) -> Option<Arc<std::result::Result<T, E>>> {
        self.lock().result.clone()
    }

    /// Store the result and run queued callbacks in registration order.
    ///
    /// A second call is rejected and the first result is kept.
    pub fn done(&self, result: std::result::Result<T, E>) -> Result<()> {
        let result = Arc::new(result);
        let callbacks = {
            let mut state = self.lock();
            if state.result.is_some() {
                tracing::warn!("Deferred value resolved twice, keeping the first result");
                return Err(Error::AlreadyResolved);
            }
            state.result = Some(Arc::clone(&result));
            std::mem::take(&mut state.callbacks)
        };
        for callback in callbacks {
            callback(Arc::clone(&result));
        }
        Ok(())
    }

    pub fn resolve(&self, value: T) -> Result<()> {
        self.done(Ok(value))
    }

    pub fn reject(&self, err: E) -> Result<()> {
        self.done(Err(err))
    }

    /// Wait for the result from async code.
    pub async fn wait(&self) -> Arc<std::result::Result<T, E>> {
        let (tx, rx) = oneshot::channel();
        self.add_callback(move |result| {
            let _ = tx.send(result);
        });
        match rx.await {
            Ok(result) => result,
            // The callback lives in our own state, which `self` keeps alive.
            Err(_) => std::future::pending().await,
        }
    }

    fn lock(&self) -> MutexGuard<'_, State<T, E>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T, E> std::fmt::Debug for Deferred<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("Deferred")
            .field("resolved", &state.result.is_some())
            .field("callbacks", &state.callbacks.len())
            .finish()
    }
}
