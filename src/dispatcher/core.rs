use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Context as _};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::context::{ContextError, RequestContext};
use crate::handlers::{HandlerRegistry, WebWorker};
use crate::script::{parse_document, ParseError, ScriptEngine, ScriptError};
use crate::static_files::{normalize_url_path, MimeTypes, StaticFiles};

/// Extension that marks a file as a SmartScript to be executed.
pub const SCRIPT_EXTENSION: &str = ".smscr";
/// Prefix under which handlers are instantiated by name.
pub const HANDLER_PREFIX: &str = "/ext/";
/// Paths under this prefix are reachable only through internal dispatch.
pub const DEFAULT_INTERNAL_PREFIX: &str = "/private";
/// What `/` is served as.
pub const INDEX_PATH: &str = "/index.html";

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("access to `{0}` is forbidden")]
    Forbidden(String),
    #[error("`{0}` was not found")]
    NotFound(String),
    #[error("cannot parse script `{path}`: {source}")]
    Parse {
        path: String,
        #[source]
        source: ParseError,
    },
    #[error("script `{path}` failed: {source}")]
    Script {
        path: String,
        #[source]
        source: ScriptError,
    },
    #[error("no handler named `{0}`")]
    UnknownHandler(String),
    #[error("handler `{name}` failed: {message}")]
    Handler { name: String, message: String },
    #[error("cannot read `{path}`: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("context has no dispatcher attached")]
    NoDispatcher,
    #[error(transparent)]
    Context(#[from] ContextError),
}

impl DispatchError {
    /// HTTP status reported to the client for this failure.
    pub fn status_code(&self) -> u16 {
        match self {
            DispatchError::Forbidden(_) => 403,
            DispatchError::NotFound(_) => 404,
            _ => 500,
        }
    }
}

/// Routes a URL path to whatever renders it into a context.
///
/// `direct` is true only for the path the client asked for; re-entrant
/// dispatch from scripts and handlers passes false.
pub trait Dispatch: Send + Sync {
    fn dispatch_request(
        &self,
        ctx: &mut RequestContext,
        url_path: &str,
        direct: bool,
    ) -> Result<(), DispatchError>;
}

/// The server's dispatcher.
///
/// Resolution order for a path:
/// 1. a worker mounted on that exact path
/// 2. a `.smscr` script under the document root
/// 3. a handler named by the segment after `/ext/`
/// 4. a static file under the document root
pub struct RequestDispatcher {
    static_files: StaticFiles,
    mime_types: MimeTypes,
    workers: HashMap<String, Arc<dyn WebWorker>>,
    handlers: HandlerRegistry,
    internal_prefix: String,
}

impl std::fmt::Debug for RequestDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestDispatcher")
            .field("static_files", &self.static_files)
            .field("mime_types", &self.mime_types)
            .field("workers", &self.workers.keys().collect::<Vec<_>>())
            .field("internal_prefix", &self.internal_prefix)
            .finish_non_exhaustive()
    }
}

impl RequestDispatcher {
    pub fn new<P: Into<PathBuf>>(
        document_root: P,
        mime_types: MimeTypes,
        handlers: HandlerRegistry,
    ) -> Self {
        Self {
            static_files: StaticFiles::new(document_root),
            mime_types,
            workers: HashMap::new(),
            handlers,
            internal_prefix: DEFAULT_INTERNAL_PREFIX.to_string(),
        }
    }

    pub fn with_internal_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.internal_prefix = prefix.into().trim_end_matches('/').to_string();
        self
    }

    pub fn document_root(&self) -> &Path {
        self.static_files.base_dir()
    }

    /// Mount a worker on an exact URL path.
    pub fn register_worker(&mut self, url_path: impl Into<String>, worker: Arc<dyn WebWorker>) {
        self.workers.insert(url_path.into(), worker);
    }

    /// Mount every `path = handler name` entry of a workers table.
    ///
    /// # Errors
    ///
    /// Fails on the first handler name the registry does not know.
    pub fn mount_workers(&mut self, table: &HashMap<String, String>) -> anyhow::Result<()> {
        for (path, name) in table {
            let worker = self
                .handlers
                .create(name)
                .ok_or_else(|| anyhow!("unknown handler `{name}`"))
                .with_context(|| format!("while mounting worker for `{path}`"))?;
            info!(path = %path, handler = %name, "Mounted worker");
            self.register_worker(path.clone(), Arc::from(worker));
        }
        Ok(())
    }

    pub fn worker_paths(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = self.workers.keys().map(String::as_str).collect();
        paths.sort_unstable();
        paths
    }

    fn is_internal(&self, url_path: &str) -> bool {
        let prefix = self.internal_prefix.as_str();
        !prefix.is_empty()
            && url_path
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
    }

    fn run_worker(
        &self,
        worker: &dyn WebWorker,
        name: &str,
        ctx: &mut RequestContext,
    ) -> Result<(), DispatchError> {
        worker
            .process_request(ctx)
            .map_err(|err| match err.downcast::<DispatchError>() {
                Ok(inner) => inner,
                Err(err) => DispatchError::Handler {
                    name: name.to_string(),
                    message: format!("{err:#}"),
                },
            })
    }

    fn run_script(
        &self,
        ctx: &mut RequestContext,
        url_path: &str,
        file: &Path,
    ) -> Result<(), DispatchError> {
        if !file.is_file() {
            return Err(DispatchError::NotFound(url_path.to_string()));
        }
        let source = fs::read_to_string(file).map_err(|source| DispatchError::Io {
            path: url_path.to_string(),
            source,
        })?;
        let document = parse_document(&source).map_err(|source| DispatchError::Parse {
            path: url_path.to_string(),
            source,
        })?;
        ScriptEngine::new(&document, ctx)
            .execute()
            .map_err(|source| DispatchError::Script {
                path: url_path.to_string(),
                source,
            })
    }

    fn run_handler(&self, ctx: &mut RequestContext, name: &str) -> Result<(), DispatchError> {
        let worker = self
            .handlers
            .create(name)
            .filter(|_| !name.is_empty() && !name.contains('/'))
            .ok_or_else(|| DispatchError::UnknownHandler(name.to_string()))?;
        self.run_worker(worker.as_ref(), name, ctx)
    }

    fn serve_static(&self, ctx: &mut RequestContext, url_path: &str) -> Result<(), DispatchError> {
        let file = self
            .static_files
            .open(url_path, &self.mime_types)
            .map_err(|err| {
                debug!(path = %url_path, error = %err, "Static file unavailable");
                DispatchError::NotFound(url_path.to_string())
            })?;
        let sent = file.send(ctx)?;
        debug!(path = %url_path, bytes = sent, "Static file sent");
        Ok(())
    }
}

impl Dispatch for RequestDispatcher {
    fn dispatch_request(
        &self,
        ctx: &mut RequestContext,
        url_path: &str,
        direct: bool,
    ) -> Result<(), DispatchError> {
        let started = Instant::now();
        let Some(normalized) = normalize_url_path(url_path) else {
            warn!(path = %url_path, "Path escapes document root");
            return Err(DispatchError::Forbidden(url_path.to_string()));
        };
        let url_path = if normalized == "/" {
            INDEX_PATH
        } else {
            normalized.as_str()
        };

        if direct && self.is_internal(url_path) {
            warn!(path = %url_path, "Direct request for internal path rejected");
            return Err(DispatchError::Forbidden(url_path.to_string()));
        }
        let Some(file) = self.static_files.map_path(url_path) else {
            warn!(path = %url_path, "Path escapes document root");
            return Err(DispatchError::Forbidden(url_path.to_string()));
        };

        let result = if let Some(worker) = self.workers.get(url_path) {
            debug!(path = %url_path, direct, target = "worker", "Dispatching");
            self.run_worker(worker.as_ref(), url_path, ctx)
        } else if url_path.ends_with(SCRIPT_EXTENSION) {
            debug!(path = %url_path, direct, target = "script", "Dispatching");
            self.run_script(ctx, url_path, &file)
        } else if let Some(name) = url_path.strip_prefix(HANDLER_PREFIX) {
            debug!(path = %url_path, direct, target = "handler", handler = %name, "Dispatching");
            self.run_handler(ctx, name)
        } else {
            debug!(path = %url_path, direct, target = "static", "Dispatching");
            self.serve_static(ctx, url_path)
        };

        debug!(
            path = %url_path,
            elapsed_us = started.elapsed().as_micros() as u64,
            ok = result.is_ok(),
            "Dispatch finished"
        );
        result
    }
}
