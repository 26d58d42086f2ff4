//! Cookie-keyed sessions.
//!
//! The [`SessionStore`] is owned by the server and shared by every
//! connection worker and the sweeper. Look-up, creation, extension and
//! eviction all happen under one lock, so a worker never observes a session
//! the sweeper is removing and two workers never mint colliding ids.
//!
//! Functions take `now` (seconds since the epoch) explicitly; callers pass
//! [`now_secs`].

use may::coroutine::JoinHandle;
use parking_lot::Mutex;
use rand::Rng;
use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

use crate::context::{new_shared_params, SharedParams};

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "sid";
/// Length of a generated session id.
pub const SESSION_ID_LEN: usize = 20;

#[derive(Debug, Clone)]
pub struct SessionEntry {
    pub sid: String,
    /// Expiry in seconds since the epoch; the session is dead at this instant.
    pub valid_until: u64,
    pub parameters: SharedParams,
}

impl SessionEntry {
    pub fn is_expired(&self, now: u64) -> bool {
        self.valid_until <= now
    }
}

/// Outcome of [`SessionStore::resolve`].
#[derive(Debug, Clone)]
pub struct ResolvedSession {
    pub sid: String,
    /// The session's own map, not a copy.
    pub parameters: SharedParams,
    /// True when a fresh session was minted and the client needs a cookie.
    pub is_new: bool,
}

#[derive(Debug)]
pub struct SessionStore {
    sessions: Mutex<HashMap<String, SessionEntry>>,
    timeout_secs: u64,
}

impl SessionStore {
    pub fn new(timeout_secs: u64) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            timeout_secs,
        }
    }

    pub fn timeout_secs(&self) -> u64 {
        self.timeout_secs
    }

    /// Find the live session named by `presented`, extending it, or mint a
    /// new one. An expired entry is discarded on the spot.
    pub fn resolve(&self, presented: Option<&str>, now: u64) -> ResolvedSession {
        let valid_until = now.saturating_add(self.timeout_secs);
        let mut sessions = self.sessions.lock();

        if let Some(sid) = presented {
            match sessions.get_mut(sid) {
                Some(entry) if !entry.is_expired(now) => {
                    entry.valid_until = valid_until;
                    return ResolvedSession {
                        sid: entry.sid.clone(),
                        parameters: Arc::clone(&entry.parameters),
                        is_new: false,
                    };
                }
                Some(_) => {
                    sessions.remove(sid);
                    debug!(sid = %sid, "Presented session expired");
                }
                None => debug!(sid = %sid, "Presented session unknown"),
            }
        }

        let mut sid = generate_session_id();
        while sessions.contains_key(&sid) {
            sid = generate_session_id();
        }
        let entry = SessionEntry {
            sid: sid.clone(),
            valid_until,
            parameters: new_shared_params(),
        };
        let parameters = Arc::clone(&entry.parameters);
        sessions.insert(sid.clone(), entry);
        debug!(sid = %sid, valid_until, "Session created");

        ResolvedSession {
            sid,
            parameters,
            is_new: true,
        }
    }

    /// Remove every expired entry, returning how many were removed.
    pub fn sweep(&self, now: u64) -> usize {
        let mut sessions = self.sessions.lock();
        let before = sessions.len();
        sessions.retain(|_, entry| !entry.is_expired(now));
        before - sessions.len()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }

    pub fn contains(&self, sid: &str) -> bool {
        self.sessions.lock().contains_key(sid)
    }

    pub fn valid_until(&self, sid: &str) -> Option<u64> {
        self.sessions.lock().get(sid).map(|e| e.valid_until)
    }
}

/// Twenty random uppercase ASCII letters.
pub fn generate_session_id() -> String {
    let mut rng = rand::thread_rng();
    (0..SESSION_ID_LEN)
        .map(|_| char::from(rng.gen_range(b'A'..=b'Z')))
        .collect()
}

pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Start the background sweeper coroutine.
pub fn spawn_sweeper(
    store: Arc<SessionStore>,
    interval: Duration,
    stack_size: usize,
) -> io::Result<JoinHandle<()>> {
    info!(interval_secs = interval.as_secs(), "Starting session sweeper");
    // SAFETY: may's Builder::spawn is unsafe because a coroutine must not
    // hold thread-local references across yields. The sweeper only touches
    // the Arc'd store and yields inside `sleep`.
    unsafe {
        may::coroutine::Builder::new()
            .name("session-sweeper".to_string())
            .stack_size(stack_size)
            .spawn(move || loop {
                may::coroutine::sleep(interval);
                let removed = store.sweep(now_secs());
                if removed > 0 {
                    debug!(removed, remaining = store.len(), "Swept expired sessions");
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_shape() {
        let sid = generate_session_id();
        assert_eq!(sid.len(), SESSION_ID_LEN);
        assert!(sid.chars().all(|c| c.is_ascii_uppercase()));
    }

    #[test]
    fn test_resolve_reuses_live_session() {
        let store = SessionStore::new(60);
        let first = store.resolve(None, 1_000);
        assert!(first.is_new);
        first.parameters.lock().insert("k".into(), "v".into());

        let second = store.resolve(Some(&first.sid), 1_030);
        assert!(!second.is_new);
        assert_eq!(second.sid, first.sid);
        assert!(Arc::ptr_eq(&first.parameters, &second.parameters));
        assert_eq!(store.valid_until(&first.sid), Some(1_090));
    }

    #[test]
    fn test_expired_session_is_replaced() {
        let store = SessionStore::new(60);
        let first = store.resolve(None, 1_000);
        let again = store.resolve(Some(&first.sid), 1_060);
        assert!(again.is_new);
        assert_ne!(again.sid, first.sid);
        assert!(!store.contains(&first.sid));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_sweep_removes_only_expired() {
        let store = SessionStore::new(10);
        let old = store.resolve(None, 0);
        let fresh = store.resolve(None, 5);
        assert_eq!(store.sweep(10), 1);
        assert!(!store.contains(&old.sid));
        assert!(store.contains(&fresh.sid));
    }
}
