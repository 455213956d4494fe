// Realtime session registry
// Tracks live connections and lets the HTTP side signal them

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Out-of-band instructions for a live session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionControl {
    /// Restart the engine from idle
    Reset,
}

#[derive(Debug, Clone)]
struct SessionHandle {
    created_at: DateTime<Utc>,
    control: mpsc::UnboundedSender<SessionControl>,
}

pub struct SessionManager {
    sessions: RwLock<HashMap<String, SessionHandle>>,
    max_sessions: usize,
}

impl SessionManager {
    pub fn new(max_sessions: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_sessions,
        }
    }

    /// Register a session; fails once `max_sessions` are live
    pub fn register(
        &self,
        session_id: &str,
        control: mpsc::UnboundedSender<SessionControl>,
    ) -> Result<(), String> {
        let mut sessions = self.sessions.write();
        if sessions.len() >= self.max_sessions {
            return Err(format!("Maximum sessions ({}) reached", self.max_sessions));
        }

        sessions.insert(
            session_id.to_string(),
            SessionHandle {
                created_at: Utc::now(),
                control,
            },
        );
        info!("Session registered: {} ({} live)", session_id, sessions.len());
        Ok(())
    }

    pub fn unregister(&self, session_id: &str) {
        if let Some(handle) = self.sessions.write().remove(session_id) {
            let lifetime = Utc::now().signed_duration_since(handle.created_at);
            info!(
                "Session unregistered: {} after {}s",
                session_id,
                lifetime.num_seconds()
            );
        }
    }

    pub fn count(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn max_sessions(&self) -> usize {
        self.max_sessions
    }

    pub fn session_ids(&self) -> Vec<String> {
        self.sessions.read().keys().cloned().collect()
    }

    /// Ask every live session to reset; returns how many accepted
    pub fn reset_all(&self) -> usize {
        let sessions = self.sessions.read();
        let mut delivered = 0;
        for (id, handle) in sessions.iter() {
            match handle.control.send(SessionControl::Reset) {
                Ok(()) => delivered += 1,
                Err(_) => debug!("Session {} is closing; reset skipped", id),
            }
        }
        delivered
    }
}
