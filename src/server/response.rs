use http::StatusCode;

use crate::context::{ContextError, RequestContext};
use crate::handlers::escape_html;

/// Canonical reason phrase for a status code.
pub fn status_reason(status: u16) -> &'static str {
    StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("Unknown")
}

/// Answer with an error page. Only valid while the header is uncommitted.
pub fn send_error(ctx: &mut RequestContext, status: u16, message: &str) -> Result<(), ContextError> {
    let reason = status_reason(status);
    ctx.set_status(status)?;
    ctx.set_mime_type("text/html")?;
    ctx.write_str(&format!(
        "<html><head><title>{status} {reason}</title></head><body><h1>{status} {reason}</h1><p>{}</p></body></html>",
        escape_html(message)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_reason() {
        assert_eq!(status_reason(200), "OK");
        assert_eq!(status_reason(403), "Forbidden");
        assert_eq!(status_reason(404), "Not Found");
        assert_eq!(status_reason(599), "Unknown");
    }
}
