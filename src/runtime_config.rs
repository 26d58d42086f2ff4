//! # Runtime Configuration Module
//!
//! Environment-variable tuning for the coroutine runtime.
//!
//! ## Environment Variables
//!
//! ### `SMARTSERVE_STACK_SIZE`
//!
//! Stack size for every coroutine the server spawns (listener, sweeper and
//! connection workers). Accepts decimal (`65536`) or hexadecimal (`0x10000`).
//!
//! Default: `0x10000` (64 KB). Script rendering recurses once per nested
//! `FOR`, so deeply nested scripts may need more.
//!
//! ```bash
//! export SMARTSERVE_STACK_SIZE=0x20000
//! smartserve serve --config demos/server.yaml
//! ```

use std::env;

pub const STACK_SIZE_ENV: &str = "SMARTSERVE_STACK_SIZE";
pub const DEFAULT_STACK_SIZE: usize = 0x10000;

/// Runtime configuration loaded from environment variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Stack size for coroutines in bytes
    pub stack_size: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            stack_size: DEFAULT_STACK_SIZE,
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let stack_size = env::var(STACK_SIZE_ENV)
            .ok()
            .and_then(|val| parse_size(&val))
            .unwrap_or(DEFAULT_STACK_SIZE);
        RuntimeConfig { stack_size }
    }

    /// Apply to the global `may` configuration.
    pub fn apply(&self, workers: usize) {
        may::config()
            .set_stack_size(self.stack_size)
            .set_workers(workers.max(1));
    }
}

/// Parse a size given in decimal or `0x` hexadecimal.
pub fn parse_size(value: &str) -> Option<usize> {
    let value = value.trim();
    match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => usize::from_str_radix(hex, 16).ok(),
        None => value.parse().ok(),
    }
}
