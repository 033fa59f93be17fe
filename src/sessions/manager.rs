//! Agent session manager: at most one live session per conversation.
//!
//! The session table maps a conversation id to a slot guarded by its own
//! async mutex. The table lock is only held to look up or insert a slot; all
//! backend calls happen under the slot lock, so unrelated conversations never
//! wait on each other.

use super::envelope::parse_agent_output;
use super::traits::{AgentBackend, AgentSession, AgentTurnResult};
use crate::config::AgentConfig;
use crate::error::{ParleyError, Result};
use crate::util::RetryPolicy;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::task::JoinHandle;

#[derive(Debug, Default)]
struct Slot {
    session: Option<AgentSession>,
}

type SlotHandle = Arc<AsyncMutex<Slot>>;

/// Outcome of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub deleted: usize,
    /// Sessions skipped because a turn was in flight.
    pub busy: usize,
    pub failed: usize,
}

pub struct AgentSessionManager {
    backend: Arc<dyn AgentBackend>,
    slots: Mutex<HashMap<String, SlotHandle>>,
    retry: RetryPolicy,
    stale_after: chrono::Duration,
}

impl AgentSessionManager {
    pub fn new(backend: Arc<dyn AgentBackend>, config: &AgentConfig) -> Self {
        Self {
            backend,
            slots: Mutex::new(HashMap::new()),
            retry: RetryPolicy::new(
                config.max_retry,
                Duration::from_millis(config.retry_backoff_ms),
            ),
            stale_after: i64::try_from(config.stale_after_secs)
                .ok()
                .and_then(chrono::Duration::try_seconds)
                .unwrap_or(chrono::Duration::MAX),
        }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Lock the slot for `conversation_id`, creating it if needed.
    ///
    /// A slot removed from the table by a sweep while we waited on it is
    /// dead; we retry with whatever slot the table holds now.
    async fn lock_slot(&self, conversation_id: &str) -> OwnedMutexGuard<Slot> {
        loop {
            let handle = Arc::clone(
                self.slots
                    .lock()
                    .entry(conversation_id.to_string())
                    .or_default(),
            );
            let guard = handle.clone().lock_owned().await;
            let current = self
                .slots
                .lock()
                .get(conversation_id)
                .is_some_and(|live| Arc::ptr_eq(live, &handle));
            if current {
                return guard;
            }
        }
    }

    fn is_stale(&self, session: &AgentSession, now: DateTime<Utc>) -> bool {
        now - session.created_at >= self.stale_after
    }

    /// Drop the table entry for `conversation_id` if it still is `handle`.
    fn remove_slot(&self, conversation_id: &str, handle: &SlotHandle) {
        let mut slots = self.slots.lock();
        if slots.get(conversation_id).is_some_and(|live| Arc::ptr_eq(live, handle)) {
            slots.remove(conversation_id);
        }
    }

    /// A stale session is deleted and replaced, never reused.
    async fn ensure_session(&self, slot: &mut Slot, conversation_id: &str) -> Result<AgentSession> {
        let stale = slot
            .session
            .as_ref()
            .is_some_and(|s| self.is_stale(s, Utc::now()));
        if stale {
            if let Some(old) = slot.session.take() {
                tracing::info!(conversation_id, session_id = %old.id, "replacing stale agent session");
                self.delete_quietly(&old).await;
            }
        }
        if let Some(session) = &slot.session {
            return Ok(session.clone());
        }

        let id = self
            .retry
            .run(self.backend.name(), || self.backend.create_session(conversation_id))
            .await
            .map_err(|e| ParleyError::AgentInvocationFailed {
                attempts: 0,
                reason: format!("session creation failed: {e}"),
            })?;
        let session = AgentSession::new(id, conversation_id);
        tracing::info!(
            conversation_id,
            session_id = %session.id,
            "agent session created"
        );
        slot.session = Some(session.clone());
        Ok(session)
    }

    async fn invoke_locked(
        &self,
        slot: &mut Slot,
        session_id: &str,
        message: &str,
    ) -> Result<AgentTurnResult> {
        let live = slot
            .session
            .as_mut()
            .filter(|s| s.id == session_id)
            .ok_or_else(|| ParleyError::AgentInvocationFailed {
                attempts: 0,
                reason: format!("session {session_id} is no longer live"),
            })?;

        let mut attempts = 0u32;
        let outcome = self
            .retry
            .run(self.backend.name(), || {
                attempts += 1;
                self.backend.run(session_id, message)
            })
            .await;

        let retries = attempts.saturating_sub(1);
        live.retries_used = live.retries_used.saturating_add(retries);
        live.last_activity = Utc::now();

        match outcome {
            Ok(raw) => {
                let reply = parse_agent_output(&raw);
                tracing::debug!(
                    conversation_id = %live.conversation_id,
                    attempts,
                    need_more_info = reply.need_more_info,
                    "agent turn complete"
                );
                Ok(AgentTurnResult {
                    messages: reply.messages,
                    need_more_info: reply.need_more_info,
                    attempts,
                })
            }
            Err(error) => {
                tracing::error!(
                    conversation_id = %live.conversation_id,
                    attempts,
                    "agent invocation failed: {error}"
                );
                Err(ParleyError::AgentInvocationFailed {
                    attempts,
                    reason: error.to_string(),
                })
            }
        }
    }

    /// Return the conversation's live session, creating it on first use.
    ///
    /// Concurrent callers for the same conversation serialize on its slot,
    /// so exactly one session is ever created.
    pub async fn get_or_create(&self, conversation_id: &str) -> Result<AgentSession> {
        let mut slot = self.lock_slot(conversation_id).await;
        self.ensure_session(&mut slot, conversation_id).await
    }

    /// Send `message` to `session`, retrying transient failures on the same
    /// session up to the configured retry count.
    pub async fn invoke(&self, session: &AgentSession, message: &str) -> Result<AgentTurnResult> {
        let mut slot = self.lock_slot(&session.conversation_id).await;
        self.invoke_locked(&mut slot, &session.id, message).await
    }

    /// `get_or_create` and `invoke` under a single hold of the slot, so a
    /// sweep cannot slip in between.
    pub async fn run_turn(&self, conversation_id: &str, message: &str) -> Result<AgentTurnResult> {
        let mut slot = self.lock_slot(conversation_id).await;
        let session = self.ensure_session(&mut slot, conversation_id).await?;
        self.invoke_locked(&mut slot, &session.id, message).await
    }

    /// End a conversation: wait for any turn in flight, then delete its
    /// session and forget the conversation. Returns whether a session was
    /// deleted. A session the backend refused to delete is left to
    /// [`Self::purge_orphans`].
    pub async fn evict(&self, conversation_id: &str) -> bool {
        let Some(handle) = self.slots.lock().get(conversation_id).cloned() else {
            return false;
        };
        let mut slot = handle.clone().lock_owned().await;
        let deleted = match slot.session.take() {
            Some(session) => self.delete_quietly(&session).await,
            None => false,
        };
        self.remove_slot(conversation_id, &handle);
        drop(slot);
        deleted
    }

    pub fn live_sessions(&self) -> usize {
        let handles: Vec<SlotHandle> = self.slots.lock().values().cloned().collect();
        handles
            .iter()
            .filter(|h| h.try_lock().map_or(true, |slot| slot.session.is_some()))
            .count()
    }

    async fn delete_quietly(&self, session: &AgentSession) -> bool {
        match self.backend.delete_session(&session.id).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(session_id = %session.id, "failed to delete agent session: {e}");
                false
            }
        }
    }

    /// Delete sessions older than the configured age and forget empty slots.
    /// Slots with a turn in flight are skipped.
    pub async fn sweep_stale(&self) -> SweepReport {
        let now = Utc::now();
        let handles: Vec<(String, SlotHandle)> = self
            .slots
            .lock()
            .iter()
            .map(|(k, v)| (k.clone(), Arc::clone(v)))
            .collect();

        let mut report = SweepReport::default();
        for (conversation_id, handle) in handles {
            let Ok(mut slot) = handle.clone().try_lock_owned() else {
                report.busy += 1;
                continue;
            };
            let stale = slot.session.as_ref().is_some_and(|s| self.is_stale(s, now));
            if !(stale || slot.session.is_none()) {
                continue;
            }
            if let Some(session) = slot.session.take() {
                if self.delete_quietly(&session).await {
                    report.deleted += 1;
                } else {
                    report.failed += 1;
                    slot.session = Some(session);
                    continue;
                }
            }
            self.remove_slot(&conversation_id, &handle);
            drop(slot);
        }

        tracing::info!(
            deleted = report.deleted,
            busy = report.busy,
            failed = report.failed,
            "agent session sweep complete"
        );
        report
    }

    /// Run [`Self::sweep_stale`] every `every` until the returned task is
    /// aborted. The first sweep runs immediately.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every.max(Duration::from_millis(1)));
            loop {
                interval.tick().await;
                manager.sweep_stale().await;
            }
        })
    }

    /// Delete every backend session this manager does not track.
    ///
    /// Meant for backends whose sessions outlive the process, where a restart
    /// leaves agents nobody will use again. The in-process backend starts
    /// empty, so there it only catches sessions created behind the manager's
    /// back.
    pub async fn purge_orphans(&self) -> Result<SweepReport> {
        let handles: Vec<SlotHandle> = self.slots.lock().values().cloned().collect();
        let mut tracked = Vec::with_capacity(handles.len());
        for handle in handles {
            if let Some(session) = &handle.lock().await.session {
                tracked.push(session.id.clone());
            }
        }

        let mut report = SweepReport::default();
        for id in self.backend.list_sessions().await? {
            if tracked.contains(&id) {
                continue;
            }
            match self.backend.delete_session(&id).await {
                Ok(()) => report.deleted += 1,
                Err(e) => {
                    tracing::warn!(session_id = %id, "failed to delete orphaned agent session: {e}");
                    report.failed += 1;
                }
            }
        }
        tracing::info!(deleted = report.deleted, failed = report.failed, "orphaned agent sessions purged");
        Ok(report)
    }
}
