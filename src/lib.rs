//! # smartserve
//!
//! **smartserve** is a small coroutine-powered HTTP server that interprets
//! *SmartScript* templates. It runs on the `may` coroutine runtime.
//!
//! ## Overview
//!
//! A SmartScript file (`.smscr`) is literal text interleaved with directives:
//!
//! ```text
//! {$ FOR i 1 3 $}Row {$= i $} doubled is {$= i 2 * $}
//! {$END$}
//! ```
//!
//! The server maps each request path onto a document root and serves, in this
//! order of priority:
//!
//! 1. a handler registered for the exact path (the *workers table*),
//! 2. a `.smscr` script, executed against the request,
//! 3. a `/ext/<Name>` handler from the [`handlers::HandlerRegistry`],
//! 4. a static file.
//!
//! Paths under `/private` can only be reached through nested dispatch from a
//! script or handler, never directly by a client.
//!
//! ## Architecture
//!
//! - **[`script`]** - lexer, parser, AST and visitor-based engine
//! - **[`context`]** - response header, parameters, cookies and nested dispatch
//! - **[`dispatcher`]** - path to content resolution
//! - **[`handlers`]** - the [`handlers::WebWorker`] trait and built-in workers
//! - **[`server`]** - listener, connection workers and the session store
//! - **[`config`]** - YAML configuration and properties tables
//! - **[`logging`]** - `tracing-subscriber` setup
//!
//! ### Request Handling Flow
//!
//! ```mermaid
//! sequenceDiagram
//!     participant Client
//!     participant Listener
//!     participant Worker as Connection worker
//!     participant Sessions as SessionStore
//!     participant Dispatcher
//!     participant Engine as ScriptEngine
//!
//!     Client->>Listener: TCP connect
//!     Listener->>Worker: queue (stream, conn_id)
//!     Worker->>Worker: read + parse header
//!     Worker->>Sessions: resolve(sid cookie)
//!     Sessions-->>Worker: session map (+ new cookie)
//!     Worker->>Dispatcher: dispatch_request(path, direct=true)
//!     Dispatcher->>Engine: execute(script)
//!     Engine->>Dispatcher: dispatch(path) [nested, direct=false]
//!     Engine-->>Client: header + body
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use smartserve::config::ServerConfig;
//! use smartserve::handlers::HandlerRegistry;
//! use smartserve::runtime_config::RuntimeConfig;
//! use std::path::Path;
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = ServerConfig::load(Path::new("demos/server.yaml"))?;
//! let server = config.build_server(HandlerRegistry::with_builtins(), RuntimeConfig::from_env())?;
//! let handle = server.start(config.socket_addr())?;
//! handle.join().ok();
//! # Ok(())
//! # }
//! ```
//!
//! ## Runtime Considerations
//!
//! All connection handling runs in `may` coroutines. Stack size is
//! configurable via the `SMARTSERVE_STACK_SIZE` environment variable.

pub mod cli;
pub mod config;
pub mod context;
pub mod dispatcher;
pub mod handlers;
pub mod ids;
pub mod logging;
pub mod registry;
pub mod runtime_config;
pub mod script;
pub mod server;
pub mod static_files;
pub mod worker_pool;

pub use config::ServerConfig;
pub use context::{RequestContext, ResponseCookie};
pub use dispatcher::{Dispatch, DispatchError, RequestDispatcher};
pub use script::{parse_document, DocumentNode, ScriptEngine};
pub use server::{ServerHandle, ServerSettings, SmartHttpServer};
