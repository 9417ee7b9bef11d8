//! Response writer handed to interceptors and actions.
//!
//! # Responsibilities
//! - Collect status, headers and body written by the chain
//! - Run header hooks once, right before headers are committed
//! - Run completion hooks once the response has ended
//! - Deliver the finished response to the server task
//!
//! # Design Decisions
//! - The body is buffered and sent in one piece on `end`
//! - Hooks run outside the writer lock, so they may use the writer again
//! - Writes after `end` are ignored and logged

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::Response;
use tokio::sync::oneshot;

type HeadersHook = Box<dyn FnOnce(&mut HeaderMap) + Send>;
type CompleteHook = Box<dyn FnOnce() + Send>;

struct WriterState {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
    headers_sent: bool,
    ended: bool,
    on_headers: Vec<HeadersHook>,
    on_complete: Vec<CompleteHook>,
    sink: Option<oneshot::Sender<Response>>,
}

/// A shared handle to the response under construction.
#[derive(Clone)]
pub struct ResponseWriter {
    state: Arc<Mutex<WriterState>>,
}

/// What a detached writer recorded.
#[derive(Debug, Clone)]
pub struct ResponseSnapshot {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
    pub ended: bool,
}

impl ResponseSnapshot {
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

impl ResponseWriter {
    fn with_sink(sink: Option<oneshot::Sender<Response>>) -> Self {
        Self {
            state: Arc::new(Mutex::new(WriterState {
                status: StatusCode::OK,
                headers: HeaderMap::new(),
                body: Vec::new(),
                headers_sent: false,
                ended: false,
                on_headers: Vec::new(),
                on_complete: Vec::new(),
                sink,
            })),
        }
    }

    /// A writer whose finished response is delivered through the receiver.
    ///
    /// The receiver fails if every writer handle is dropped before `end`.
    pub fn channel() -> (Self, oneshot::Receiver<Response>) {
        let (tx, rx) = oneshot::channel();
        (Self::with_sink(Some(tx)), rx)
    }

    /// A writer that only records what is written. Inspect with [`snapshot`](Self::snapshot).
    pub fn detached() -> Self {
        Self::with_sink(None)
    }

    /// Run `hook` on the headers right before they are committed.
    pub fn on_headers_sent<F>(&self, hook: F)
    where
        F: FnOnce(&mut HeaderMap) + Send + 'static,
    {
        let mut state = self.lock();
        if state.headers_sent {
            tracing::warn!("Header hook registered after headers were sent, ignored");
            return;
        }
        state.on_headers.push(Box::new(hook));
    }

    /// Run `hook` once the response has ended, immediately if it already has.
    pub fn on_complete<F>(&self, hook: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.lock();
        if state.ended {
            drop(state);
            hook();
            return;
        }
        state.on_complete.push(Box::new(hook));
    }

    pub fn set_status(&self, status: StatusCode) {
        let mut state = self.lock();
        if state.ended {
            tracing::debug!(status = %status, "Status set after response ended, ignored");
            return;
        }
        state.status = status;
    }

    pub fn set_header(&self, name: HeaderName, value: HeaderValue) {
        let mut state = self.lock();
        if state.ended {
            tracing::debug!(header = %name, "Header set after response ended, ignored");
            return;
        }
        state.headers.insert(name, value);
    }

    /// Set the status and merge `headers`, committing the headers.
    ///
    /// May be repeated until the response ends; later values win.
    pub fn write_head(&self, status: StatusCode, headers: HeaderMap) {
        {
            let mut state = self.lock();
            if state.ended {
                tracing::debug!(status = %status, "write_head after response ended, ignored");
                return;
            }
            state.status = status;
            merge_headers(&mut state.headers, headers);
        }
        self.commit_headers();
    }

    /// Append to the body, committing headers first if needed.
    pub fn write(&self, chunk: impl AsRef<[u8]>) {
        self.commit_headers();
        let mut state = self.lock();
        if state.ended {
            tracing::debug!("write after response ended, ignored");
            return;
        }
        state.body.extend_from_slice(chunk.as_ref());
    }

    /// Finish the response. Only the first call has an effect.
    ///
    /// Completion hooks run before the response is handed to the receiver.
    pub fn end(&self) {
        self.commit_headers();
        let (response, sink, hooks) = {
            let mut state = self.lock();
            if state.ended {
                tracing::debug!("Response already ended");
                return;
            }
            state.ended = true;
            let mut response = Response::new(Body::from(state.body.clone()));
            *response.status_mut() = state.status;
            *response.headers_mut() = state.headers.clone();
            (
                response,
                state.sink.take(),
                std::mem::take(&mut state.on_complete),
            )
        };

        for hook in hooks {
            hook();
        }
        if let Some(sink) = sink {
            if sink.send(response).is_err() {
                tracing::debug!("Response receiver dropped before the response ended");
            }
        }
    }

    pub fn end_with(&self, chunk: impl AsRef<[u8]>) {
        self.write(chunk);
        self.end();
    }

    /// Send a complete HTML page.
    pub fn html(&self, status: StatusCode, content: impl AsRef<[u8]>) {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/html; charset=utf-8"),
        );
        self.write_head(status, headers);
        self.end_with(content);
    }

    pub fn is_ended(&self) -> bool {
        self.lock().ended
    }

    pub fn status(&self) -> StatusCode {
        self.lock().status
    }

    pub fn snapshot(&self) -> ResponseSnapshot {
        let state = self.lock();
        ResponseSnapshot {
            status: state.status,
            headers: state.headers.clone(),
            body: state.body.clone(),
            ended: state.ended,
        }
    }

    /// Mark headers as sent and run header hooks, once.
    fn commit_headers(&self) {
        let (mut headers, hooks) = {
            let mut state = self.lock();
            if state.headers_sent || state.ended {
                return;
            }
            state.headers_sent = true;
            (
                std::mem::take(&mut state.headers),
                std::mem::take(&mut state.on_headers),
            )
        };
        for hook in hooks {
            hook(&mut headers);
        }
        let mut state = self.lock();
        // Anything written while the hooks ran wins over their values.
        let written = std::mem::replace(&mut state.headers, headers);
        merge_headers(&mut state.headers, written);
    }

    fn lock(&self) -> MutexGuard<'_, WriterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Replace every header of `source` in `target`, keeping multi-valued headers.
fn merge_headers(target: &mut HeaderMap, source: HeaderMap) {
    let mut current: Option<HeaderName> = None;
    for (name, value) in source {
        // `None` continues the previous header's values.
        if let Some(name) = name {
            target.remove(&name);
            current = Some(name);
        }
        if let Some(name) = &current {
            target.append(name.clone(), value);
        }
    }
}

impl std::fmt::Debug for ResponseWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("ResponseWriter")
            .field("status", &state.status)
            .field("headers_sent", &state.headers_sent)
            .field("ended", &state.ended)
            .finish_non_exhaustive()
    }
}
