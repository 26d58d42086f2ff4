//! Per-connection request handling.
//!
//! One call to [`serve_connection`] handles exactly one request:
//!
//! ```text
//! AwaitRequestLine -> ParseRequestLine -> ResolveSession
//!   -> ParseQueryParameters -> ValidateAccess + Dispatch -> Flush/Close
//! ```
//!
//! Access validation happens inside the dispatcher, since it owns the
//! document root and the internal prefix.

use std::collections::HashMap;
use std::io::{BufWriter, Read, Write};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use super::request::{
    decode_component, parse_query_params, parse_request, read_request_header, split_target,
    RequestError,
};
use super::response::send_error;
use super::session::{now_secs, SessionStore, SESSION_COOKIE};
use crate::context::{new_shared_params, RequestContext, ResponseCookie};
use crate::dispatcher::Dispatch;
use crate::ids::ConnectionId;

/// Everything a connection worker shares with its siblings.
pub struct ConnectionState {
    pub dispatcher: Arc<dyn Dispatch>,
    pub sessions: Arc<SessionStore>,
    /// Cookie domain used when the request carries no `Host` header.
    pub domain: String,
    pub max_header_bytes: usize,
}

/// Answer a request that failed before a session was resolved.
fn reject<S: Write + Send + 'static>(stream: S, conn_id: ConnectionId, err: &RequestError) {
    warn!(conn_id = %conn_id, error = %err, "Rejecting request");
    let mut ctx = RequestContext::new(
        Box::new(BufWriter::new(stream)),
        HashMap::new(),
        new_shared_params(),
        Vec::new(),
    );
    let result = send_error(&mut ctx, err.status_code(), &err.to_string()).and_then(|_| ctx.flush());
    if let Err(e) = result {
        debug!(conn_id = %conn_id, error = %e, "Failed to send error response");
    }
}

/// Handle one request on `stream`, then let it close.
pub fn serve_connection<S>(mut stream: S, state: &ConnectionState, conn_id: ConnectionId)
where
    S: Read + Write + Send + 'static,
{
    let started = Instant::now();

    let raw = match read_request_header(&mut stream, state.max_header_bytes) {
        Ok(Some(raw)) => raw,
        Ok(None) => {
            debug!(conn_id = %conn_id, "Connection closed before a full request header");
            return;
        }
        Err(RequestError::Io(e)) => {
            debug!(conn_id = %conn_id, error = %e, "Read failed");
            return;
        }
        Err(e) => return reject(stream, conn_id, &e),
    };

    let request = match parse_request(&raw) {
        Ok(request) => request,
        Err(e) => return reject(stream, conn_id, &e),
    };
    let (raw_path, query) = split_target(&request.target);
    let path = match decode_component(raw_path, false) {
        Ok(path) => path,
        Err(e) => return reject(stream, conn_id, &e),
    };

    let cookies = request.cookies();
    let session = state
        .sessions
        .resolve(cookies.get(SESSION_COOKIE).map(String::as_str), now_secs());
    let mut output_cookies = Vec::new();
    if session.is_new {
        let session_cookie = |domain: &str| {
            ResponseCookie::new(SESSION_COOKIE, session.sid.as_str())
                .domain(domain)
                .path("/")
                .http_only()
        };
        let mut cookie = session_cookie(request.host().unwrap_or(state.domain.as_str()));
        if let Err(e) = cookie.validate() {
            warn!(conn_id = %conn_id, error = %e, "Host unusable as cookie domain");
            cookie = session_cookie(state.domain.as_str());
        }
        output_cookies.push(cookie);
    }

    let query_result = parse_query_params(query);
    let mut ctx = RequestContext::new(
        Box::new(BufWriter::new(stream)),
        query_result.as_ref().cloned().unwrap_or_default(),
        session.parameters,
        output_cookies,
    )
    .with_dispatcher(Arc::clone(&state.dispatcher));

    info!(
        conn_id = %conn_id,
        method = %request.method,
        path = %path,
        version = %request.version,
        sid = %session.sid,
        new_session = session.is_new,
        "Request"
    );

    let outcome = match query_result {
        Ok(_) => state
            .dispatcher
            .dispatch_request(&mut ctx, &path, true)
            .map_err(|e| (e.status_code(), e.to_string())),
        Err(e) => Err((e.status_code(), e.to_string())),
    };

    if let Err((status, message)) = outcome {
        if ctx.header_generated() {
            error!(
                conn_id = %conn_id,
                path = %path,
                error = %message,
                "Request failed after the response header was sent"
            );
        } else {
            if status >= 500 {
                error!(conn_id = %conn_id, path = %path, status, error = %message, "Request failed");
            } else {
                warn!(conn_id = %conn_id, path = %path, status, error = %message, "Request rejected");
            }
            if let Err(e) = send_error(&mut ctx, status, &message) {
                debug!(conn_id = %conn_id, error = %e, "Failed to send error response");
            }
        }
    }

    if let Err(e) = ctx.finish() {
        debug!(conn_id = %conn_id, error = %e, "Finishing response failed");
    }
    debug!(
        conn_id = %conn_id,
        status = ctx.status_code(),
        elapsed_us = started.elapsed().as_micros() as u64,
        "Connection finished"
    );
}
