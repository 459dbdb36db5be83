use super::{Conversation, ConversationTurn, Role, SessionStore, TurnContent};
use crate::{Error, Result, backend::BackendResult};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info};

/// System note prepended to outgoing history once a session has prior turns.
pub const CONTINUATION_NOTE: &str =
    "This is a continuing conversation. Use the earlier turns as context for your reply.";

// Idle lock entries are pruned once the map grows past this.
const LOCK_PRUNE_THRESHOLD: usize = 1024;

/// History exactly as it should be sent to the chat backend.
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatch {
    pub turns: Vec<ConversationTurn>,
    /// Whether the continuation note was prepended.
    pub continued: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Exchange {
    pub reply: BackendResult<String>,
    pub continued: bool,
}

/// Per-session turn history on top of an injected [`SessionStore`].
///
/// Every operation on a session runs under that session's lock, so concurrent
/// calls for one caller never interleave their read-modify-write. Sessions do
/// not contend with each other.
pub struct ConversationAccumulator {
    store: Arc<dyn SessionStore>,
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
    max_turns: Option<usize>,
}

impl ConversationAccumulator {
    pub fn new(store: Arc<dyn SessionStore>, max_turns: Option<usize>) -> Self {
        Self {
            store,
            locks: Mutex::new(HashMap::new()),
            max_turns,
        }
    }

    fn session_lock(&self, session_id: &str) -> Result<Arc<AsyncMutex<()>>> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|e| Error::internal(format!("Mutex lock failed: {e}")))?;

        if locks.len() > LOCK_PRUNE_THRESHOLD {
            // Only the map holds these, so nobody is inside or waiting.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        }

        Ok(locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone())
    }

    async fn append_locked(&self, session_id: &str, turn: ConversationTurn) -> Result<()> {
        let mut conversation = self.store.get(session_id).await?;
        conversation.push(turn);
        if let Some(max) = self.max_turns {
            conversation.enforce_limit(max);
        }
        self.store.put(session_id, &conversation).await
    }

    fn dispatch_from(&self, conversation: &Conversation) -> Dispatch {
        let continued = conversation.len() > 1;
        let mut turns = Vec::with_capacity(conversation.len() + 1);
        if continued {
            turns.push(ConversationTurn::system(CONTINUATION_NOTE));
        }
        turns.extend(conversation.turns().iter().cloned());
        Dispatch { turns, continued }
    }

    pub async fn append_user_turn(&self, session_id: &str, content: TurnContent) -> Result<()> {
        let lock = self.session_lock(session_id)?;
        let _guard = lock.lock().await;
        self.append_locked(session_id, ConversationTurn::user(content))
            .await
    }

    pub async fn append_assistant_turn(&self, session_id: &str, content: TurnContent) -> Result<()> {
        let lock = self.session_lock(session_id)?;
        let _guard = lock.lock().await;
        self.append_locked(session_id, ConversationTurn::new(Role::Assistant, content))
            .await
    }

    /// The stored sequence, with the continuation note prepended when the
    /// session already holds more than one turn. The note is never stored.
    pub async fn snapshot_for_dispatch(&self, session_id: &str) -> Result<Dispatch> {
        let lock = self.session_lock(session_id)?;
        let _guard = lock.lock().await;
        let conversation = self.store.get(session_id).await?;
        Ok(self.dispatch_from(&conversation))
    }

    pub async fn reset(&self, session_id: &str) -> Result<()> {
        let lock = self.session_lock(session_id)?;
        let _guard = lock.lock().await;
        self.store.remove(session_id).await?;
        info!("Conversation reset for session: {}", session_id);
        Ok(())
    }

    /// Runs one chat round trip atomically for `session_id`: appends the user
    /// turn, hands the dispatched history to `dispatch`, and stores the user
    /// turn together with the reply once `dispatch` succeeds. A failed
    /// dispatch leaves the stored history untouched.
    pub async fn exchange<F, Fut>(
        &self,
        session_id: &str,
        content: TurnContent,
        dispatch: F,
    ) -> Result<Exchange>
    where
        F: FnOnce(Vec<ConversationTurn>) -> Fut,
        Fut: Future<Output = Result<BackendResult<String>>>,
    {
        if content.is_empty() {
            return Err(Error::validation("Provide a message and/or an image"));
        }

        let lock = self.session_lock(session_id)?;
        let _guard = lock.lock().await;

        let mut conversation = self.store.get(session_id).await?;
        conversation.push(ConversationTurn::user(content));
        let outgoing = self.dispatch_from(&conversation);
        debug!(
            "Dispatching {} turns for session {} (continued: {})",
            outgoing.turns.len(),
            session_id,
            outgoing.continued
        );

        let reply = dispatch(outgoing.turns).await?;

        conversation.push(ConversationTurn::assistant(reply.content().clone()));
        if let Some(max) = self.max_turns {
            conversation.enforce_limit(max);
        }
        self.store.put(session_id, &conversation).await?;

        Ok(Exchange {
            reply,
            continued: outgoing.continued,
        })
    }
}
