//! Dispatcher builder and the per-request service.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, HeaderValue, Method, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use super::chain::Proceed;
use super::guard;
use super::handler::{Action, BoundAction, Interceptor};
use super::keys;
use crate::config::AppConfig;
use crate::context::{Context, Scope, WeakContext};
use crate::error::{HttpError, Result};
use crate::http::{read_post_data, HttpServer, QueryParams, RequestInfo, ResponseWriter, X_REQUEST_ID};
use crate::routing::PathMatcher;

/// Collects routes and interceptors until [`start`](Dispatcher::start).
pub struct Dispatcher {
    root: Context,
    config: AppConfig,
    matcher: PathMatcher<BoundAction>,
    interceptors: Vec<Arc<dyn Interceptor>>,
}

impl Dispatcher {
    /// Create a dispatcher over `root` and register the request helpers
    /// (`query`, `post-data`) on it.
    pub fn new(root: &Context, config: &AppConfig) -> Result<Self> {
        root.register_provider(keys::QUERY, Scope::Request, |ctx| {
            let request = ctx.get_as::<RequestInfo>(keys::REQUEST)?;
            Ok(QueryParams::parse(request.query().unwrap_or_default()))
        })?;

        let limit = config.limits.max_body_bytes;
        root.register_provider(keys::POST_DATA, Scope::Request, move |ctx| {
            let request = ctx.get_as::<RequestInfo>(keys::REQUEST)?;
            Ok(read_post_data(&request, limit))
        })?;

        Ok(Self {
            root: root.clone(),
            config: config.clone(),
            matcher: PathMatcher::new(),
            interceptors: Vec::new(),
        })
    }

    /// Append an interceptor. Interceptors run in the order they are added.
    pub fn add_interceptor(&mut self, interceptor: impl Interceptor) -> &mut Self {
        self.add_shared_interceptor(Arc::new(interceptor))
    }

    pub fn add_shared_interceptor(&mut self, interceptor: Arc<dyn Interceptor>) -> &mut Self {
        self.interceptors.push(interceptor);
        self
    }

    /// Route `pattern` to `action` for any method.
    pub fn add_action(&mut self, pattern: &str, action: impl Action) -> Result<&mut Self> {
        self.bind(pattern, None, Arc::new(action))
    }

    /// Route `pattern` to `action`, annotated with the methods it accepts.
    ///
    /// The annotation is enforced by [`CheckHttpMethod`](crate::interceptors::CheckHttpMethod).
    pub fn add_action_for(
        &mut self,
        pattern: &str,
        methods: impl IntoIterator<Item = Method>,
        action: impl Action,
    ) -> Result<&mut Self> {
        self.bind(pattern, Some(methods.into_iter().collect()), Arc::new(action))
    }

    /// Route `pattern` to an action shared with other routes, with an
    /// optional methods annotation.
    pub fn add_shared_action_for(
        &mut self,
        pattern: &str,
        methods: Option<Vec<Method>>,
        action: Arc<dyn Action>,
    ) -> Result<&mut Self> {
        self.bind(pattern, methods, action)
    }

    fn bind(
        &mut self,
        pattern: &str,
        methods: Option<Vec<Method>>,
        action: Arc<dyn Action>,
    ) -> Result<&mut Self> {
        self.matcher
            .add_action(pattern, BoundAction::new(pattern, methods, action))?;
        Ok(self)
    }

    /// The root context.
    pub fn context(&self) -> &Context {
        &self.root
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Freeze routes, interceptors and providers.
    pub fn start(self) -> DispatchService {
        self.root.seal();

        let mut interceptors = self.interceptors;
        interceptors.push(Arc::new(ExecuteAction));

        let server_name = HeaderValue::from_str(&self.config.server.name).unwrap_or_else(|_| {
            tracing::warn!(name = %self.config.server.name, "Invalid server name, using default");
            HeaderValue::from_static("mne")
        });

        tracing::info!(
            routes = self.matcher.len(),
            interceptors = interceptors.len() - 1,
            providers = self.root.registry().len(),
            "Dispatcher started"
        );

        DispatchService {
            root: self.root,
            config: self.config,
            matcher: self.matcher,
            interceptors: interceptors.into(),
            server_name,
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("routes", &self.matcher.len())
            .field("interceptors", &self.interceptors.len())
            .finish_non_exhaustive()
    }
}

/// A started dispatcher. Handles requests; can't be reconfigured.
pub struct DispatchService {
    root: Context,
    config: AppConfig,
    matcher: PathMatcher<BoundAction>,
    interceptors: Arc<[Arc<dyn Interceptor>]>,
    server_name: HeaderValue,
}

impl DispatchService {
    /// Run one request through the chain and wait for its response.
    pub async fn handle(&self, request: Request<Body>, remote: Option<SocketAddr>) -> Response {
        let request_id = request
            .headers()
            .get(X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let span = tracing::debug_span!(
            "request",
            request_id = %request_id,
            method = %request.method(),
            uri = %request.uri(),
        );

        let (response, delivered) = ResponseWriter::channel();
        self.install_headers_hook(&response);

        let _release = span.in_scope(|| {
            let ctx = self.root.child(Scope::Request);
            let release = ReleaseOnDrop(ctx.downgrade());
            let info = RequestInfo::from_request(request, remote);
            guard::exec(&ctx, || self.route(&ctx, info, response, request_id.clone()));
            release
        });

        match delivered.await {
            Ok(response) => response,
            Err(_) => {
                tracing::error!(request_id = %request_id, "Request finished without a response");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
                    "<h1>Server Error 500</h1><pre>request finished without a response</pre>",
                )
                    .into_response()
            }
        }
    }

    fn route(
        &self,
        ctx: &Context,
        info: RequestInfo,
        response: ResponseWriter,
        request_id: String,
    ) -> Result<(), HttpError> {
        ctx.seed(keys::RESPONSE, response)?;
        let info = ctx.seed(keys::REQUEST, info)?;
        ctx.seed(keys::REQUEST_ID, request_id)?;

        let path = urlencoding::decode(info.path())
            .map_err(|e| HttpError::bad_request("Malformed path encoding").with_source(e))?
            .into_owned();
        ctx.seed(keys::PATH, path)?;

        // Match the raw path so an encoded `/` stays inside its segment.
        let Some(found) = self.matcher.get_match(info.path()) else {
            return Err(HttpError::not_found());
        };
        tracing::debug!(pattern = %found.pattern, params = found.matches.len(), "Route matched");
        let matches = found
            .matches
            .try_map(|raw| urlencoding::decode(raw).map(|value| value.into_owned()))
            .map_err(|e| HttpError::bad_request("Malformed path encoding").with_source(e))?;
        ctx.seed(keys::ACTION, found.action.clone())?;
        ctx.seed(keys::MATCHES, matches)?;

        Proceed::start(ctx, Arc::clone(&self.interceptors))
    }

    fn install_headers_hook(&self, response: &ResponseWriter) {
        let server = self.server_name.clone();
        response.on_headers_sent(move |headers| {
            let date = chrono::Utc::now()
                .format("%a, %d %b %Y %H:%M:%S GMT")
                .to_string();
            if let Ok(date) = HeaderValue::from_str(&date) {
                headers.insert(header::DATE, date);
            }
            headers.insert(
                header::X_CONTENT_TYPE_OPTIONS,
                HeaderValue::from_static("nosniff"),
            );
            headers.insert(header::SERVER, server);
        });
    }

    /// Serve this dispatcher over plain HTTP until `shutdown` fires.
    pub async fn serve(
        self,
        listener: TcpListener,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let config = self.config.clone();
        HttpServer::new(self, config).run(listener, shutdown).await
    }

    /// The root context.
    pub fn context(&self) -> &Context {
        &self.root
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}

impl std::fmt::Debug for DispatchService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchService")
            .field("routes", &self.matcher.len())
            .field("interceptors", &self.interceptors.len())
            .finish_non_exhaustive()
    }
}

/// Runs the matched action, resuming the chain once the response ends.
struct ExecuteAction;

impl Interceptor for ExecuteAction {
    fn execute(&self, ctx: &Context, proceed: Proceed) -> Result<(), HttpError> {
        let response = ctx.get_as::<ResponseWriter>(keys::RESPONSE)?;
        let action = ctx.get_as::<BoundAction>(keys::ACTION)?;

        // Weak, so a request nobody answers can be dropped.
        let hook_ctx = ctx.downgrade();
        response.on_complete(move || {
            if let Some(ctx) = hook_ctx.upgrade() {
                guard::exec(&ctx, || proceed.proceed());
            }
        });
        action.execute(ctx)
    }
}

/// Clears the request context when the request is over, breaking any
/// reference cycle left between the context and callbacks stored in it.
struct ReleaseOnDrop(WeakContext);

impl Drop for ReleaseOnDrop {
    fn drop(&mut self) {
        if let Some(ctx) = self.0.upgrade() {
            ctx.release();
        }
    }
}
