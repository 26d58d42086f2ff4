//! Per-request response context.
//!
//! A [`RequestContext`] accumulates response metadata (status, mime type,
//! encoding, cookies) and writes the header lazily, right before the first
//! payload byte. After that point every setter fails with
//! [`ContextError::HeaderCommitted`].
//!
//! It also carries the three parameter tiers:
//!
//! - query parameters, read-only, parsed from the request line
//! - persistent parameters, the *same* map instance the session holds
//! - temporary parameters, which live only as long as the request

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::io::{self, Write};
use std::sync::Arc;
use thiserror::Error;

use crate::dispatcher::{Dispatch, DispatchError};

/// Persistent parameter map shared between a session entry and every
/// request context that resolved to that session.
pub type SharedParams = Arc<Mutex<HashMap<String, String>>>;

pub fn new_shared_params() -> SharedParams {
    Arc::new(Mutex::new(HashMap::new()))
}

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("cannot change {0}: response header was already written")]
    HeaderCommitted(&'static str),
    #[error("unsupported character encoding `{0}`")]
    UnsupportedEncoding(String),
    #[error("invalid {field} `{value}` for a response header")]
    InvalidHeaderValue { field: &'static str, value: String },
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Character encodings a response body may be written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    #[default]
    Utf8,
    Latin1,
}

impl Encoding {
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_ascii_uppercase().as_str() {
            "UTF-8" | "UTF8" => Some(Self::Utf8),
            "ISO-8859-1" | "LATIN1" => Some(Self::Latin1),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Utf8 => "UTF-8",
            Self::Latin1 => "ISO-8859-1",
        }
    }

    /// Encode text; characters outside Latin-1 become `?`.
    pub fn encode(self, text: &str) -> Vec<u8> {
        match self {
            Self::Utf8 => text.as_bytes().to_vec(),
            Self::Latin1 => text
                .chars()
                .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
                .collect(),
        }
    }
}

/// An outgoing cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseCookie {
    pub name: String,
    pub value: String,
    pub domain: Option<String>,
    pub path: Option<String>,
    pub max_age: Option<u64>,
    pub http_only: bool,
}

impl ResponseCookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: None,
            path: None,
            max_age: None,
            http_only: false,
        }
    }

    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn max_age(mut self, seconds: u64) -> Self {
        self.max_age = Some(seconds);
        self
    }

    pub fn http_only(mut self) -> Self {
        self.http_only = true;
        self
    }

    /// Check that every field renders inside a single `Set-Cookie` value:
    /// no control characters, quotes or attribute separators.
    pub fn validate(&self) -> Result<(), ContextError> {
        let fields = [
            ("cookie name", Some(&self.name)),
            ("cookie value", Some(&self.value)),
            ("cookie domain", self.domain.as_ref()),
            ("cookie path", self.path.as_ref()),
        ];
        for (field, value) in fields {
            if let Some(value) = value {
                if value.chars().any(|c| c.is_control() || c == '"' || c == ';') {
                    return Err(invalid_header_value(field, value));
                }
            }
        }
        if self.name.is_empty() || self.name.contains(['=', ' ']) {
            return Err(invalid_header_value("cookie name", &self.name));
        }
        Ok(())
    }
}

fn invalid_header_value(field: &'static str, value: &str) -> ContextError {
    ContextError::InvalidHeaderValue {
        field,
        value: value.escape_debug().to_string(),
    }
}

/// Header text must stay on its own line.
fn check_header_text(field: &'static str, value: &str) -> Result<(), ContextError> {
    if value.chars().any(char::is_control) {
        Err(invalid_header_value(field, value))
    } else {
        Ok(())
    }
}

/// Renders the `Set-Cookie` header value.
impl fmt::Display for ResponseCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}=\"{}\"", self.name, self.value)?;
        if let Some(domain) = &self.domain {
            write!(f, "; Domain={domain}")?;
        }
        if let Some(path) = &self.path {
            write!(f, "; Path={path}")?;
        }
        if let Some(max_age) = self.max_age {
            write!(f, "; Max-Age={max_age}")?;
        }
        if self.http_only {
            f.write_str("; HttpOnly")?;
        }
        Ok(())
    }
}

pub struct RequestContext {
    output: Box<dyn Write + Send>,
    encoding: Encoding,
    status_code: u16,
    status_text: String,
    mime_type: String,
    content_length: Option<u64>,
    parameters: HashMap<String, String>,
    persistent_parameters: SharedParams,
    temporary_parameters: HashMap<String, String>,
    output_cookies: Vec<ResponseCookie>,
    header_generated: bool,
    dispatcher: Option<Arc<dyn Dispatch>>,
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("status_code", &self.status_code)
            .field("mime_type", &self.mime_type)
            .field("encoding", &self.encoding)
            .field("header_generated", &self.header_generated)
            .finish_non_exhaustive()
    }
}

impl RequestContext {
    pub fn new(
        output: Box<dyn Write + Send>,
        parameters: HashMap<String, String>,
        persistent_parameters: SharedParams,
        output_cookies: Vec<ResponseCookie>,
    ) -> Self {
        Self {
            output,
            encoding: Encoding::Utf8,
            status_code: 200,
            status_text: "OK".to_string(),
            mime_type: "text/html".to_string(),
            content_length: None,
            parameters,
            persistent_parameters,
            temporary_parameters: HashMap::new(),
            output_cookies,
            header_generated: false,
            dispatcher: None,
        }
    }

    /// Attach the dispatcher used by [`RequestContext::dispatch`].
    pub fn with_dispatcher(mut self, dispatcher: Arc<dyn Dispatch>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    fn ensure_mutable(&self, what: &'static str) -> Result<(), ContextError> {
        if self.header_generated {
            Err(ContextError::HeaderCommitted(what))
        } else {
            Ok(())
        }
    }

    pub fn set_status_code(&mut self, code: u16) -> Result<(), ContextError> {
        self.ensure_mutable("status code")?;
        self.status_code = code;
        Ok(())
    }

    pub fn set_status_text(&mut self, text: impl Into<String>) -> Result<(), ContextError> {
        self.ensure_mutable("status text")?;
        let text = text.into();
        check_header_text("status text", &text)?;
        self.status_text = text;
        Ok(())
    }

    /// Set status code and its canonical reason phrase together.
    pub fn set_status(&mut self, code: u16) -> Result<(), ContextError> {
        self.set_status_code(code)?;
        self.set_status_text(crate::server::status_reason(code))
    }

    pub fn set_mime_type(&mut self, mime: impl Into<String>) -> Result<(), ContextError> {
        self.ensure_mutable("mime type")?;
        let mime = mime.into();
        check_header_text("mime type", &mime)?;
        self.mime_type = mime;
        Ok(())
    }

    pub fn set_encoding(&mut self, label: &str) -> Result<(), ContextError> {
        self.ensure_mutable("encoding")?;
        self.encoding = Encoding::parse(label)
            .ok_or_else(|| ContextError::UnsupportedEncoding(label.to_string()))?;
        Ok(())
    }

    pub fn set_content_length(&mut self, length: u64) -> Result<(), ContextError> {
        self.ensure_mutable("content length")?;
        self.content_length = Some(length);
        Ok(())
    }

    pub fn add_cookie(&mut self, cookie: ResponseCookie) -> Result<(), ContextError> {
        self.ensure_mutable("cookies")?;
        cookie.validate()?;
        self.output_cookies.push(cookie);
        Ok(())
    }

    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn status_text(&self) -> &str {
        &self.status_text
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    pub fn cookies(&self) -> &[ResponseCookie] {
        &self.output_cookies
    }

    pub fn header_generated(&self) -> bool {
        self.header_generated
    }

    // --- query parameters ---

    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters.get(name).map(String::as_str)
    }

    pub fn parameter_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.parameters.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    // --- persistent parameters ---

    pub fn persistent_parameter(&self, name: &str) -> Option<String> {
        self.persistent_parameters.lock().get(name).cloned()
    }

    pub fn set_persistent_parameter(&self, name: impl Into<String>, value: impl Into<String>) {
        self.persistent_parameters
            .lock()
            .insert(name.into(), value.into());
    }

    pub fn remove_persistent_parameter(&self, name: &str) -> Option<String> {
        self.persistent_parameters.lock().remove(name)
    }

    pub fn persistent_parameter_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.persistent_parameters.lock().keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Handle to the persistent map itself.
    pub fn persistent_parameters(&self) -> &SharedParams {
        &self.persistent_parameters
    }

    // --- temporary parameters ---

    pub fn temporary_parameter(&self, name: &str) -> Option<&str> {
        self.temporary_parameters.get(name).map(String::as_str)
    }

    pub fn set_temporary_parameter(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.temporary_parameters.insert(name.into(), value.into());
    }

    pub fn remove_temporary_parameter(&mut self, name: &str) -> Option<String> {
        self.temporary_parameters.remove(name)
    }

    pub fn temporary_parameter_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .temporary_parameters
            .keys()
            .map(String::as_str)
            .collect();
        names.sort_unstable();
        names
    }

    // --- output ---

    fn header_bytes(&self) -> Vec<u8> {
        let mut header = format!("HTTP/1.1 {} {}\r\n", self.status_code, self.status_text);
        header.push_str("Content-Type: ");
        header.push_str(&self.mime_type);
        if self.mime_type.starts_with("text/") {
            header.push_str("; charset=");
            header.push_str(self.encoding.label());
        }
        header.push_str("\r\n");
        if let Some(length) = self.content_length {
            header.push_str(&format!("Content-Length: {length}\r\n"));
        }
        for cookie in &self.output_cookies {
            header.push_str(&format!("Set-Cookie: {cookie}\r\n"));
        }
        header.push_str("\r\n");
        // header text is always sent as ISO-8859-1
        Encoding::Latin1.encode(&header)
    }

    fn commit_header(&mut self) -> Result<(), ContextError> {
        if !self.header_generated {
            let header = self.header_bytes();
            self.output.write_all(&header)?;
            self.header_generated = true;
        }
        Ok(())
    }

    /// Write raw payload bytes, committing the header first if needed.
    pub fn write(&mut self, data: &[u8]) -> Result<(), ContextError> {
        self.commit_header()?;
        self.output.write_all(data)?;
        Ok(())
    }

    /// Write text encoded with the current encoding.
    pub fn write_str(&mut self, text: &str) -> Result<(), ContextError> {
        let bytes = self.encoding.encode(text);
        self.write(&bytes)
    }

    pub fn flush(&mut self) -> Result<(), ContextError> {
        self.output.flush()?;
        Ok(())
    }

    /// Complete the response: a context that never wrote a payload still
    /// sends its header, then everything is flushed.
    pub fn finish(&mut self) -> Result<(), ContextError> {
        self.commit_header()?;
        self.flush()
    }

    /// Render another path into this same context. The target is treated
    /// as an internal request, so internal-only paths are allowed.
    pub fn dispatch(&mut self, url_path: &str) -> Result<(), DispatchError> {
        let dispatcher = self
            .dispatcher
            .as_ref()
            .map(Arc::clone)
            .ok_or(DispatchError::NoDispatcher)?;
        dispatcher.dispatch_request(self, url_path, false)
    }
}

impl Write for RequestContext {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        RequestContext::write(self, buf).map_err(|err| match err {
            ContextError::Io(io) => io,
            other => io::Error::new(io::ErrorKind::Other, other),
        })?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.output.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Default)]
    struct Sink(Arc<Mutex<Vec<u8>>>);

    impl Write for Sink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn context(sink: &Sink) -> RequestContext {
        RequestContext::new(
            Box::new(sink.clone()),
            HashMap::new(),
            new_shared_params(),
            Vec::new(),
        )
    }

    #[test]
    fn test_header_precedes_body_once() {
        let sink = Sink::default();
        let mut ctx = context(&sink);
        ctx.write_str("a").unwrap();
        ctx.write_str("b").unwrap();
        let text = String::from_utf8(sink.0.lock().clone()).unwrap();
        assert_eq!(
            text,
            "HTTP/1.1 200 OK\r\nContent-Type: text/html; charset=UTF-8\r\n\r\nab"
        );
    }

    #[test]
    fn test_no_charset_for_binary_types() {
        let sink = Sink::default();
        let mut ctx = context(&sink);
        ctx.set_mime_type("image/png").unwrap();
        ctx.set_content_length(3).unwrap();
        ctx.write(b"PNG").unwrap();
        let text = String::from_utf8(sink.0.lock().clone()).unwrap();
        assert!(text.starts_with(
            "HTTP/1.1 200 OK\r\nContent-Type: image/png\r\nContent-Length: 3\r\n\r\n"
        ));
    }

    #[test]
    fn test_latin1_replaces_unmappable() {
        assert_eq!(Encoding::Latin1.encode("é€"), vec![0xE9, b'?']);
    }

    #[test]
    fn test_cookie_rendering() {
        let cookie = ResponseCookie::new("sid", "ABC")
            .domain("localhost")
            .path("/")
            .max_age(60)
            .http_only();
        assert_eq!(
            cookie.to_string(),
            "sid=\"ABC\"; Domain=localhost; Path=/; Max-Age=60; HttpOnly"
        );
    }
}
