//! Request handlers ("web workers").
//!
//! A [`WebWorker`] renders a response straight into the request context.
//! Handlers are never loaded by reflection: every handler the server can run
//! is registered up front in a [`HandlerRegistry`] under a short name, and
//! both the workers table and `/ext/<Name>` URLs resolve against it.

use std::collections::HashMap;

use crate::context::RequestContext;

pub mod bg_color;
pub mod echo_params;
pub mod hello;
pub mod home;
pub mod sum;

pub use bg_color::BgColorWorker;
pub use echo_params::EchoParams;
pub use hello::HelloWorker;
pub use home::Home;
pub use sum::SumWorker;

/// A handler invoked with the connection's context.
pub trait WebWorker: Send + Sync {
    /// Render into `ctx`. Errors are reported as a 500 unless they wrap a
    /// [`DispatchError`](crate::dispatcher::DispatchError), which keeps its
    /// own status.
    fn process_request(&self, ctx: &mut RequestContext) -> anyhow::Result<()>;
}

pub type WorkerFactory = fn() -> Box<dyn WebWorker>;

/// Short handler name to factory.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    factories: HashMap<String, WorkerFactory>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with every built-in handler.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::registry::register_all(&mut registry);
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, factory: WorkerFactory) {
        self.factories.insert(name.into(), factory);
    }

    /// Instantiate a handler. Dotted names (`demo.workers.HelloWorker`)
    /// resolve by their last segment.
    pub fn create(&self, name: &str) -> Option<Box<dyn WebWorker>> {
        let key = short_name(name);
        self.factories.get(key).map(|factory| factory())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(short_name(name))
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

fn short_name(name: &str) -> &str {
    let trimmed = name.trim();
    trimmed.rsplit('.').next().unwrap_or(trimmed)
}

/// Minimal HTML escaping for values echoed back into pages.
pub(crate) fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dotted_names_resolve_by_last_segment() {
        let registry = HandlerRegistry::with_builtins();
        assert!(registry.contains("demo.workers.HelloWorker"));
        assert!(registry.create("HelloWorker").is_some());
        assert!(registry.create("demo.workers.Missing").is_none());
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("<a href=\"x\">&</a>"), "&lt;a href=&quot;x&quot;&gt;&amp;&lt;/a&gt;");
    }
}
