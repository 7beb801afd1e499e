//! Bounded concurrent execution of independent sessions.
//!
//! Sessions wait on a counting semaphore before their first iteration, so at
//! most `max_concurrent_sessions` drive external tools at once. Every
//! submitted session is tracked by id with its own cancellation token until
//! it finishes. Cancelling never affects sessions submitted afterwards.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::SessionError;
use crate::record::SessionReport;
use crate::session::FeedbackSession;

pub type SessionHandle = JoinHandle<Result<SessionReport, SessionError>>;

pub struct SessionPool {
    permits: Arc<Semaphore>,
    running: Arc<DashMap<Uuid, CancellationToken>>,
}

/// Removes a session from the tracking map however its task ends.
struct Tracked {
    id: Uuid,
    running: Arc<DashMap<Uuid, CancellationToken>>,
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.running.remove(&self.id);
    }
}

impl SessionPool {
    pub fn new(max_concurrent_sessions: usize) -> Result<Self, SessionError> {
        if max_concurrent_sessions == 0 {
            return Err(SessionError::InvalidConfig(
                "max_concurrent_sessions must be at least 1".into(),
            ));
        }
        Ok(SessionPool {
            permits: Arc::new(Semaphore::new(max_concurrent_sessions)),
            running: Arc::new(DashMap::new()),
        })
    }

    /// Starts `session` on the runtime. It begins iterating once a permit is
    /// free.
    pub fn spawn(&self, session: FeedbackSession) -> (Uuid, SessionHandle) {
        let id = session.id();
        let token = CancellationToken::new();
        self.running.insert(id, token.clone());

        let permits = Arc::clone(&self.permits);
        let tracked = Tracked {
            id,
            running: Arc::clone(&self.running),
        };
        let handle = tokio::spawn(async move {
            let _tracked = tracked;
            let _permit = tokio::select! {
                biased;
                _ = token.cancelled() => return Err(SessionError::Cancelled),
                permit = permits.acquire_owned() => permit.map_err(|_| SessionError::Cancelled)?,
            };
            tracing::debug!(session = %id, "session admitted");
            session.run(&token).await
        });
        (id, handle)
    }

    /// Runs every session and waits for all of them, in submission order.
    pub async fn run_all(
        &self,
        sessions: impl IntoIterator<Item = FeedbackSession>,
    ) -> Vec<(Uuid, Result<SessionReport, SessionError>)> {
        let handles: Vec<(Uuid, SessionHandle)> =
            sessions.into_iter().map(|s| self.spawn(s)).collect();
        let mut results = Vec::with_capacity(handles.len());
        for (id, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(join) => Err(SessionError::Task(join)),
            };
            results.push((id, result));
        }
        results
    }

    /// Cancels one session. Returns `false` if it is not running.
    pub fn cancel(&self, id: &Uuid) -> bool {
        match self.running.get(id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancels every running and queued session. The pool stays usable.
    pub fn cancel_all(&self) -> usize {
        let mut cancelled = 0;
        for entry in self.running.iter() {
            entry.value().cancel();
            cancelled += 1;
        }
        cancelled
    }

    pub fn running(&self) -> Vec<Uuid> {
        self.running.iter().map(|e| *e.key()).collect()
    }

    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }
}
