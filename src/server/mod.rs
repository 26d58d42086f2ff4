pub mod http_server;
pub mod request;
pub mod response;
pub mod session;
pub mod worker;

pub use http_server::{ServerHandle, ServerSettings, SmartHttpServer};
pub use request::{parse_request, RequestError, RequestHead, MAX_HEADER_BYTES};
pub use response::{send_error, status_reason};
pub use session::{SessionStore, SESSION_COOKIE};
pub use worker::{serve_connection, ConnectionState};
