use std::collections::HashMap;
use std::fs::File;
use std::io;
use std::path::{Component, Path, PathBuf};

use crate::context::{ContextError, RequestContext};

/// Fallback content type for unknown extensions.
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// Extension to content-type table, keyed by lowercase extension.
#[derive(Debug, Clone, Default)]
pub struct MimeTypes {
    by_extension: HashMap<String, String>,
}

impl MimeTypes {
    pub fn new(table: HashMap<String, String>) -> Self {
        let by_extension = table
            .into_iter()
            .map(|(ext, mime)| (ext.trim_start_matches('.').to_lowercase(), mime))
            .collect();
        Self { by_extension }
    }

    pub fn get(&self, extension: &str) -> &str {
        self.by_extension
            .get(&extension.to_lowercase())
            .map(String::as_str)
            .unwrap_or(DEFAULT_MIME_TYPE)
    }

    pub fn for_path(&self, path: &Path) -> &str {
        self.get(path.extension().and_then(|s| s.to_str()).unwrap_or(""))
    }

    pub fn len(&self) -> usize {
        self.by_extension.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_extension.is_empty()
    }
}

/// An opened file ready to be streamed.
#[derive(Debug)]
pub struct StaticFile {
    pub path: PathBuf,
    pub mime_type: String,
    pub len: u64,
    file: File,
}

impl StaticFile {
    /// Stream the file into `ctx`, announcing its type and length.
    pub fn send(mut self, ctx: &mut RequestContext) -> Result<u64, ContextError> {
        ctx.set_mime_type(self.mime_type.as_str())?;
        ctx.set_content_length(self.len)?;
        let copied = io::copy(&mut self.file, ctx)?;
        Ok(copied)
    }
}

/// Canonical form of a URL path: `/` followed by its normal segments.
/// Empty and `.` segments are dropped; `None` when a segment would climb
/// out (`..`) or names a root or prefix.
pub fn normalize_url_path(url_path: &str) -> Option<String> {
    let mut normalized = String::with_capacity(url_path.len() + 1);
    for comp in Path::new(url_path.trim_start_matches('/')).components() {
        match comp {
            Component::Normal(segment) => {
                normalized.push('/');
                normalized.push_str(segment.to_str()?);
            }
            Component::CurDir => {}
            _ => return None,
        }
    }
    if normalized.is_empty() {
        normalized.push('/');
    }
    Some(normalized)
}

/// Files below a document root.
#[derive(Debug, Clone)]
pub struct StaticFiles {
    base_dir: PathBuf,
}

impl StaticFiles {
    pub fn new<P: Into<PathBuf>>(base: P) -> Self {
        Self {
            base_dir: base.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Map a URL path below the document root. `None` when the path would
    /// leave it (`..`, absolute or prefixed components).
    pub fn map_path(&self, url_path: &str) -> Option<PathBuf> {
        let mut pb = self.base_dir.clone();
        for comp in Path::new(url_path.trim_start_matches('/')).components() {
            match comp {
                Component::Normal(s) => pb.push(s),
                Component::CurDir => {}
                _ => return None,
            }
        }
        Some(pb)
    }

    /// Open a servable file: it must exist, be a regular readable file and
    /// carry an extension.
    pub fn open(&self, url_path: &str, mime_types: &MimeTypes) -> io::Result<StaticFile> {
        let path = self
            .map_path(url_path)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "invalid path"))?;
        if !path.is_file() {
            return Err(io::Error::new(io::ErrorKind::NotFound, "file not found"));
        }
        if path.extension().is_none() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                "file has no extension",
            ));
        }
        let file = File::open(&path)?;
        let len = file.metadata()?.len();
        let mime_type = mime_types.for_path(&path).to_string();
        Ok(StaticFile {
            path,
            mime_type,
            len,
            file,
        })
    }
}
