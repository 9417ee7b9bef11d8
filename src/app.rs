//! Application bootstrap.
//!
//! # Data Flow
//! ```text
//! App::new(config)            root Context, `config` singleton
//!     → add_module(..)*
//!     → Dispatcher::new       registers `query`, `post-data`
//!     → Module::init(root)    pass 1: register providers
//!     → Module::start(disp)   pass 2: add routes and interceptors
//!     → Dispatcher::start     registry sealed
//!     → HttpServer::run / run_tls
//! ```
//!
//! Providers registered in `init` must not resolve other services; everything
//! is registered by the time `start` runs.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::Method;
use tokio::net::TcpListener;

use crate::config::{AppConfig, TlsConfig};
use crate::context::Context;
use crate::dispatch::{keys, Action, DispatchService, Dispatcher, Interceptor};
use crate::error::{Error, Result};
use crate::http::HttpServer;
use crate::lifecycle::Shutdown;
use crate::net::load_tls_config;

/// A unit of application wiring.
pub trait Module: Send + Sync {
    fn name(&self) -> &str;

    /// Register providers on the root context.
    fn init(&self, _ctx: &Context) -> Result<()> {
        Ok(())
    }

    /// Add routes and interceptors.
    fn start(&self, _dispatcher: &mut Dispatcher) -> Result<()> {
        Ok(())
    }
}

struct Route {
    pattern: String,
    methods: Option<Vec<Method>>,
    action: Arc<dyn Action>,
}

/// A module that only contributes routes and interceptors.
pub struct ActionModule {
    name: String,
    routes: Vec<Route>,
    interceptors: Vec<Arc<dyn Interceptor>>,
}

impl ActionModule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            routes: Vec::new(),
            interceptors: Vec::new(),
        }
    }

    pub fn action(mut self, pattern: impl Into<String>, action: impl Action) -> Self {
        self.routes.push(Route {
            pattern: pattern.into(),
            methods: None,
            action: Arc::new(action),
        });
        self
    }

    pub fn action_for(
        mut self,
        pattern: impl Into<String>,
        methods: impl IntoIterator<Item = Method>,
        action: impl Action,
    ) -> Self {
        self.routes.push(Route {
            pattern: pattern.into(),
            methods: Some(methods.into_iter().collect()),
            action: Arc::new(action),
        });
        self
    }

    pub fn interceptor(mut self, interceptor: impl Interceptor) -> Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }
}

impl Module for ActionModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&self, dispatcher: &mut Dispatcher) -> Result<()> {
        for interceptor in &self.interceptors {
            dispatcher.add_shared_interceptor(Arc::clone(interceptor));
        }
        for route in &self.routes {
            dispatcher.add_shared_action_for(
                &route.pattern,
                route.methods.clone(),
                Arc::clone(&route.action),
            )?;
        }
        Ok(())
    }
}

/// An application: root context, modules and server settings.
pub struct App {
    config: AppConfig,
    root: Context,
    modules: Vec<Box<dyn Module>>,
}

impl App {
    pub fn new(config: AppConfig) -> Result<Self> {
        let root = Context::root();
        root.register_instance(keys::CONFIG, config.clone())?;
        Ok(Self {
            config,
            root,
            modules: Vec::new(),
        })
    }

    /// The root context, for registering application services.
    pub fn context(&self) -> &Context {
        &self.root
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn add_module(mut self, module: impl Module + 'static) -> Self {
        self.modules.push(Box::new(module));
        self
    }

    /// Serve HTTPS with the given PEM certificate and key.
    pub fn with_credentials(mut self, cert_path: impl Into<String>, key_path: impl Into<String>) -> Self {
        self.config.listener.tls = Some(TlsConfig {
            cert_path: cert_path.into(),
            key_path: key_path.into(),
        });
        self
    }

    /// Run both module passes and start the dispatcher.
    pub fn build(self) -> Result<DispatchService> {
        let mut dispatcher = Dispatcher::new(&self.root, &self.config)?;

        for module in &self.modules {
            tracing::debug!(module = module.name(), "Initializing module");
            module.init(&self.root)?;
        }
        for module in &self.modules {
            tracing::debug!(module = module.name(), "Starting module");
            module.start(&mut dispatcher)?;
        }

        tracing::info!(modules = self.modules.len(), "Application ready");
        Ok(dispatcher.start())
    }

    /// Build and serve until `shutdown` fires.
    pub async fn run(self, shutdown: &Shutdown) -> Result<()> {
        let config = self.config.clone();
        let service = self.build()?;
        let server = HttpServer::new(service, config.clone());

        match &config.listener.tls {
            Some(tls) => {
                let addr: SocketAddr = config.listener.bind_address.parse().map_err(|e| {
                    Error::Io(std::io::Error::new(std::io::ErrorKind::InvalidInput, e))
                })?;
                let tls = load_tls_config(tls).await?;
                server.run_tls(addr, tls, shutdown.subscribe()).await?;
            }
            None => {
                let listener = TcpListener::bind(&config.listener.bind_address).await?;
                server.run(listener, shutdown.subscribe()).await?;
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("modules", &self.modules.iter().map(|m| m.name()).collect::<Vec<_>>())
            .field("bind_address", &self.config.listener.bind_address)
            .finish_non_exhaustive()
    }
}
