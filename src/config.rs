//! Server configuration.
//!
//! The main file is YAML:
//!
//! ```yaml
//! address: 127.0.0.1
//! domain: localhost
//! port: 5721
//! worker_threads: 10
//! session_timeout_secs: 600
//! session_sweep_interval_secs: 300
//! document_root: webroot
//! mime_config: mime.properties
//! workers_config: workers.properties
//! internal_prefix: /private
//! ```
//!
//! Relative paths resolve against the directory holding the YAML file. The
//! mime and workers tables are properties files: `key = value` per line,
//! `#` or `!` starts a comment.

use anyhow::{bail, Context as _};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::dispatcher::{RequestDispatcher, DEFAULT_INTERNAL_PREFIX};
use crate::handlers::HandlerRegistry;
use crate::runtime_config::RuntimeConfig;
use crate::server::{ServerSettings, SmartHttpServer, MAX_HEADER_BYTES};
use crate::static_files::MimeTypes;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub address: String,
    /// Session cookie domain when a request has no `Host` header.
    pub domain: String,
    pub port: u16,
    pub worker_threads: usize,
    pub session_timeout_secs: u64,
    pub session_sweep_interval_secs: u64,
    pub document_root: PathBuf,
    pub mime_config: Option<PathBuf>,
    pub workers_config: Option<PathBuf>,
    pub internal_prefix: String,
    pub max_header_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            domain: "localhost".to_string(),
            port: 5721,
            worker_threads: 10,
            session_timeout_secs: 600,
            session_sweep_interval_secs: 300,
            document_root: PathBuf::from("webroot"),
            mime_config: None,
            workers_config: None,
            internal_prefix: DEFAULT_INTERNAL_PREFIX.to_string(),
            max_header_bytes: MAX_HEADER_BYTES,
        }
    }
}

impl ServerConfig {
    /// Load and validate a YAML configuration file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let mut config: ServerConfig = serde_yaml::from_str(&text)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        config.resolve_paths(base);
        config.validate()?;
        Ok(config)
    }

    /// Make relative paths relative to `base`.
    pub fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &Path| {
            if p.is_relative() {
                base.join(p)
            } else {
                p.to_path_buf()
            }
        };
        self.document_root = resolve(&self.document_root);
        self.mime_config = self.mime_config.as_deref().map(resolve);
        self.workers_config = self.workers_config.as_deref().map(resolve);
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.worker_threads == 0 {
            bail!("worker_threads must be at least 1");
        }
        if self.session_timeout_secs == 0 {
            bail!("session_timeout_secs must be at least 1");
        }
        if self.session_sweep_interval_secs == 0 {
            bail!("session_sweep_interval_secs must be at least 1");
        }
        if !self.internal_prefix.is_empty() && !self.internal_prefix.starts_with('/') {
            bail!("internal_prefix must start with `/`");
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }

    /// Mime table from `mime_config`, or the built-in table.
    pub fn load_mime_types(&self) -> anyhow::Result<MimeTypes> {
        match &self.mime_config {
            Some(path) => Ok(MimeTypes::new(load_properties(path)?)),
            None => Ok(default_mime_types()),
        }
    }

    /// Path to handler-name table from `workers_config`, empty if unset.
    pub fn load_workers(&self) -> anyhow::Result<HashMap<String, String>> {
        match &self.workers_config {
            Some(path) => load_properties(path),
            None => Ok(HashMap::new()),
        }
    }

    pub fn settings(&self, runtime: RuntimeConfig) -> ServerSettings {
        ServerSettings {
            domain: self.domain.clone(),
            worker_threads: self.worker_threads,
            session_timeout: Duration::from_secs(self.session_timeout_secs),
            sweep_interval: Duration::from_secs(self.session_sweep_interval_secs),
            stack_size: runtime.stack_size,
            max_header_bytes: self.max_header_bytes,
        }
    }

    /// Build the dispatcher, mounting every entry of the workers table.
    pub fn build_dispatcher(&self, handlers: HandlerRegistry) -> anyhow::Result<RequestDispatcher> {
        let mut dispatcher =
            RequestDispatcher::new(&self.document_root, self.load_mime_types()?, handlers)
                .with_internal_prefix(self.internal_prefix.as_str());
        dispatcher.mount_workers(&self.load_workers()?)?;
        Ok(dispatcher)
    }

    /// Build a ready-to-start server.
    pub fn build_server(
        &self,
        handlers: HandlerRegistry,
        runtime: RuntimeConfig,
    ) -> anyhow::Result<SmartHttpServer> {
        let dispatcher = self.build_dispatcher(handlers)?;
        Ok(SmartHttpServer::new(self.settings(runtime), Arc::new(dispatcher)))
    }
}

/// Parse properties text: `key = value` (or `key: value`) per line.
pub fn parse_properties(text: &str) -> anyhow::Result<HashMap<String, String>> {
    let mut map = HashMap::new();
    for (index, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
            continue;
        }
        let Some((key, value)) = line.split_once(['=', ':']) else {
            bail!("line {}: expected `key = value`, found `{line}`", index + 1);
        };
        let key = key.trim();
        if key.is_empty() {
            bail!("line {}: empty key", index + 1);
        }
        map.insert(key.to_string(), value.trim().to_string());
    }
    Ok(map)
}

pub fn load_properties(path: &Path) -> anyhow::Result<HashMap<String, String>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_properties(&text).with_context(|| format!("malformed properties file {}", path.display()))
}

/// Mime types used when no table is configured.
pub fn default_mime_types() -> MimeTypes {
    let table = [
        ("html", "text/html"),
        ("htm", "text/html"),
        ("txt", "text/plain"),
        ("css", "text/css"),
        ("js", "application/javascript"),
        ("json", "application/json"),
        ("png", "image/png"),
        ("jpg", "image/jpeg"),
        ("jpeg", "image/jpeg"),
        ("gif", "image/gif"),
        ("svg", "image/svg+xml"),
        ("ico", "image/x-icon"),
    ];
    MimeTypes::new(
        table
            .into_iter()
            .map(|(ext, mime)| (ext.to_string(), mime.to_string()))
            .collect(),
    )
}
