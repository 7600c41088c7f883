//! In-memory conversation store.
//!
//! Sessions live for the lifetime of the process and are only removed by
//! pruning once the store grows past its ceiling. The map itself sits behind
//! an async `RwLock`; each session has its own `Mutex` so a chat turn can hold
//! one session across the completion call without blocking the others.

use chrono::{DateTime, Utc};
use finbot_common::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Attempts at drawing a fresh identifier before giving up.
const MAX_ID_ATTEMPTS: usize = 8;

/// Shared, lockable handle to one session.
pub type SessionHandle = Arc<Mutex<Session>>;

/// One user utterance and its eventual reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub user: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bot: Option<String>,
}

impl Turn {
    fn new(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            bot: None,
        }
    }

}

/// Thumbs up / thumbs down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackKind {
    Positive,
    Negative,
}

impl FeedbackKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Negative => "negative",
        }
    }
}

/// A feedback vote recorded against a message index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feedback {
    #[serde(rename = "type")]
    pub kind: FeedbackKind,
    pub message_index: usize,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// A single user's conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub turns: Vec<Turn>,
    pub feedback: Vec<Feedback>,
}

impl Session {
    fn new(id: String) -> Self {
        Self {
            id,
            created_at: Utc::now(),
            turns: Vec::new(),
            feedback: Vec::new(),
        }
    }

    /// Append a turn with only the user side set; returns its index.
    pub fn append_user_turn(&mut self, text: impl Into<String>) -> usize {
        self.turns.push(Turn::new(text));
        self.turns.len() - 1
    }

    /// Set the reply of the turn at `index`. Never overwrites an existing reply.
    pub fn attach_reply(&mut self, index: usize, text: impl Into<String>) -> Result<()> {
        let len = self.turns.len();
        let turn = self.turns.get_mut(index).ok_or_else(|| {
            Error::Consistency(format!(
                "turn {index} out of range for session {} ({len} turns)",
                self.id
            ))
        })?;

        if turn.bot.is_some() {
            return Err(Error::Consistency(format!(
                "turn {index} of session {} already has a reply",
                self.id
            )));
        }

        turn.bot = Some(text.into());
        Ok(())
    }

    /// The last `n` turns in chronological order.
    pub fn recent_history(&self, n: usize) -> &[Turn] {
        let start = self.turns.len().saturating_sub(n);
        &self.turns[start..]
    }

    /// Record a feedback vote.
    pub fn add_feedback(
        &mut self,
        message_index: usize,
        kind: FeedbackKind,
        text: impl Into<String>,
    ) {
        self.feedback.push(Feedback {
            kind,
            message_index,
            text: text.into(),
            timestamp: Utc::now(),
        });
    }
}

/// Map entry: the session plus the creation data pruning orders by, kept
/// outside the session lock so pruning never waits on an in-flight turn.
#[derive(Debug)]
struct Slot {
    created_at: DateTime<Utc>,
    /// Creation order; breaks `created_at` ties.
    seq: u64,
    handle: SessionHandle,
}

/// Process-scoped session store.
///
/// Created empty at startup and dropped at process exit; nothing is persisted.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Slot>>,
    next_seq: AtomicU64,
}

impl SessionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the session for `id`, or create a fresh one under a new identifier.
    ///
    /// An unknown `id` is not adopted: the new session always gets a generated id.
    pub async fn get_or_create(&self, id: Option<&str>) -> Result<(SessionHandle, String)> {
        if let Some(id) = id {
            if let Some(slot) = self.sessions.read().await.get(id) {
                return Ok((Arc::clone(&slot.handle), id.to_string()));
            }
        }

        let mut sessions = self.sessions.write().await;

        // Another request may have been racing on the same id.
        if let Some(id) = id {
            if let Some(slot) = sessions.get(id) {
                return Ok((Arc::clone(&slot.handle), id.to_string()));
            }
        }

        let new_id = (0..MAX_ID_ATTEMPTS)
            .map(|_| uuid::Uuid::new_v4().to_string())
            .find(|candidate| !sessions.contains_key(candidate))
            .ok_or_else(|| Error::Internal("could not generate a unique session id".into()))?;

        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let session = Session::new(new_id.clone());
        let created_at = session.created_at;
        let handle = Arc::new(Mutex::new(session));
        sessions.insert(
            new_id.clone(),
            Slot {
                created_at,
                seq,
                handle: Arc::clone(&handle),
            },
        );

        tracing::debug!(session_id = %new_id, sessions = sessions.len(), "Created session");
        Ok((handle, new_id))
    }

    /// Look up a session handle.
    pub async fn get(&self, id: &str) -> Option<SessionHandle> {
        self.sessions
            .read()
            .await
            .get(id)
            .map(|slot| Arc::clone(&slot.handle))
    }

    async fn require(&self, id: &str) -> Result<SessionHandle> {
        self.get(id)
            .await
            .ok_or_else(|| Error::NotFound("Session not found".into()))
    }

    /// Append a user turn to session `id`; returns the turn index.
    pub async fn append_user_turn(&self, id: &str, text: &str) -> Result<usize> {
        let handle = self.require(id).await?;
        let mut session = handle.lock().await;
        Ok(session.append_user_turn(text))
    }

    /// Attach the reply for `turn_index` in session `id`.
    pub async fn attach_reply(&self, id: &str, turn_index: usize, text: &str) -> Result<()> {
        let handle = self.require(id).await?;
        let mut session = handle.lock().await;
        session.attach_reply(turn_index, text)
    }

    /// The last `n` turns of session `id`, oldest first.
    pub async fn recent_history(&self, id: &str, n: usize) -> Result<Vec<Turn>> {
        let handle = self.require(id).await?;
        let session = handle.lock().await;
        Ok(session.recent_history(n).to_vec())
    }

    /// Record feedback against session `id`. Unknown ids fail with `NotFound`
    /// and leave the store untouched.
    pub async fn add_feedback(
        &self,
        id: &str,
        message_index: usize,
        kind: FeedbackKind,
        text: &str,
    ) -> Result<()> {
        let handle = self.require(id).await?;
        let mut session = handle.lock().await;
        session.add_feedback(message_index, kind, text);
        Ok(())
    }

    /// Copy of a session's current state.
    pub async fn snapshot(&self, id: &str) -> Option<Session> {
        let handle = self.get(id).await?;
        let session = handle.lock().await;
        Some(session.clone())
    }

    /// Evict the oldest sessions once the store holds more than `ceiling`,
    /// shrinking it to `ceiling - evict_batch`. Returns how many were removed.
    pub async fn prune_if_oversized(&self, ceiling: usize, evict_batch: usize) -> usize {
        let mut sessions = self.sessions.write().await;
        if sessions.len() <= ceiling {
            return 0;
        }

        let target = ceiling.saturating_sub(evict_batch);
        let excess = sessions.len() - target;

        let mut by_age: Vec<(DateTime<Utc>, u64, String)> = sessions
            .iter()
            .map(|(id, slot)| (slot.created_at, slot.seq, id.clone()))
            .collect();
        by_age.sort_unstable();

        for (_, _, id) in by_age.into_iter().take(excess) {
            sessions.remove(&id);
        }

        tracing::info!(
            removed = excess,
            remaining = sessions.len(),
            ceiling,
            "Pruned oldest sessions"
        );
        excess
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.sessions.read().await.contains_key(id)
    }
}
