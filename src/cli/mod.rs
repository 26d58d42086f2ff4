//! # CLI Module
//!
//! Command-line front end of the `smartserve` binary.
//!
//! ## Commands
//!
//! ### `serve`
//!
//! Load a YAML configuration and serve until SIGINT or SIGTERM:
//!
//! ```bash
//! smartserve serve --config demos/server.yaml
//! ```
//!
//! ### `render`
//!
//! Execute one script outside the server. The response header and body go to
//! stdout; `--param` supplies query parameters:
//!
//! ```bash
//! smartserve render demos/webroot/scripts/zbrajanje.smscr --param a=4 --param b=5
//! ```
//!
//! ### `tree`
//!
//! Parse a script and print it back in canonical form, or as JSON:
//!
//! ```bash
//! smartserve tree demos/webroot/scripts/fibonacci.smscr --json
//! ```
//!
//! Logging is configured through `SMARTSERVE_LOG_*` variables, see
//! [`crate::logging`].

mod commands;

pub use commands::{run_cli, Cli, Commands};
