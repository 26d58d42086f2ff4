//! # Dispatcher Module
//!
//! Decides what renders a requested path and drives it against the
//! connection's [`RequestContext`](crate::context::RequestContext).
//!
//! ## Resolution Order
//!
//! 1. `/` is rewritten to `/index.html`
//! 2. Direct requests under the internal prefix (`/private`) are forbidden,
//!    as is any path that would leave the document root
//! 3. A worker mounted on the exact path (from the workers table)
//! 4. A path ending in `.smscr` is parsed and executed as a SmartScript
//! 5. `/ext/<Name>` instantiates the handler `Name` from the
//!    [`HandlerRegistry`](crate::handlers::HandlerRegistry)
//! 6. Anything else is a static file
//!
//! ## Re-entrant Dispatch
//!
//! Scripts and handlers call
//! [`RequestContext::dispatch`](crate::context::RequestContext::dispatch) to
//! render another path into the same response. Those calls are made with
//! `direct = false`, which is what lets handlers reach `/private/...` pages
//! that clients cannot request themselves.
//!
//! ## Error Handling
//!
//! Every failure is a [`DispatchError`]; [`DispatchError::status_code`] maps
//! it to the status the connection worker reports (403, 404 or 500).

mod core;

pub use core::{
    Dispatch, DispatchError, RequestDispatcher, DEFAULT_INTERNAL_PREFIX, HANDLER_PREFIX,
    INDEX_PATH, SCRIPT_EXTENSION,
};
