//! mne demo server
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ http::HttpServer (axum + tower-http layers)
//!                         │
//!                         ▼
//!                     DispatchService::handle
//!                         │  request Context (child of root)
//!                         │  seeds: request, response, path, matches, action
//!                         ▼
//!                     interceptors ─▶ ... ─▶ execute action
//!                         │                     │
//!                         │        response.end()
//!                         ▼                     │
//!     Client Response ◀── after callbacks, reverse order
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use axum::http::{Method, StatusCode};
use clap::Parser;
use serde_json::Value;

use mne::config::{load_config, AppConfig};
use mne::dispatch::{guard, keys};
use mne::http::PostData;
use mne::interceptors::{connect, CheckHttpMethod};
use mne::observability::logging;
use mne::routing::Matches;
use mne::{action_fn, ActionModule, App, HttpError, ResponseWriter, Shutdown, SimpleAction};

#[derive(Parser, Debug)]
#[command(name = "mne", version, about = "Demo server for the mne framework")]
struct Cli {
    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener bind address
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => AppConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }

    logging::init(&config.observability);
    tracing::info!("mne v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        tls = config.listener.tls.is_some(),
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    let app = App::new(config)?.add_module(demo_module());

    let shutdown = Shutdown::new();
    shutdown.trigger_on_signal();
    app.run(&shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

fn demo_module() -> ActionModule {
    ActionModule::new("demo")
        .interceptor(CheckHttpMethod)
        .interceptor(connect(|request, _response, proceed| {
            let started = std::time::Instant::now();
            let path = request.path().to_string();
            proceed.proceed_then(move |_, proceed| {
                tracing::debug!(path = %path, elapsed_ms = started.elapsed().as_millis() as u64, "Served");
                proceed.proceed()
            })
        }))
        .action("/", SimpleAction::new(StatusCode::OK, "<h1>mne</h1>"))
        .action_for(
            "/hello/:name/",
            [Method::GET],
            action_fn(|ctx| {
                let matches = ctx.get_as::<Matches>(keys::MATCHES)?;
                let name = matches.get("name").unwrap_or("world");
                let response = ctx.get_as::<ResponseWriter>(keys::RESPONSE)?;
                response.html(StatusCode::OK, format!("<h1>Hello, {}!</h1>", name));
                Ok(())
            }),
        )
        .action_for(
            "/echo/",
            [Method::POST],
            action_fn(|ctx| {
                let post_data = ctx.get_as::<PostData>(keys::POST_DATA)?;
                let response = ctx.get_as::<ResponseWriter>(keys::RESPONSE)?;
                let reply = move |result: Arc<Result<Value, HttpError>>| match result.as_ref() {
                    Ok(value) => {
                        response.set_header(
                            axum::http::header::CONTENT_TYPE,
                            axum::http::HeaderValue::from_static("application/json"),
                        );
                        response.end_with(value.to_string());
                        Ok(())
                    }
                    Err(e) => Err(HttpError::new(e.status(), e.message())),
                };
                post_data.add_callback(guard::wrap(ctx, reply));
                Ok(())
            }),
        )
}
