use super::{Conversation, ConversationTurn, Role, TurnContent};
use crate::{Error, Result};
use async_trait::async_trait;
use libsql::{Builder, Connection, Database};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{debug, info, warn};

/// Where conversations live between calls.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Returns an empty conversation for unknown sessions.
    async fn get(&self, session_id: &str) -> Result<Conversation>;

    /// Replaces the stored conversation for `session_id`.
    async fn put(&self, session_id: &str, conversation: &Conversation) -> Result<()>;

    async fn remove(&self, session_id: &str) -> Result<()>;
}

struct Sqlite {
    // Keeps the database alive for the connection.
    _db: Database,
    conn: Connection,
    write_lock: tokio::sync::Mutex<()>,
}

pub struct ConversationStore {
    sqlite: Option<Sqlite>,
    // In-memory fallback storage
    fallback: Mutex<HashMap<String, Conversation>>,
}

impl ConversationStore {
    pub async fn new(db_path: &str) -> Result<Self> {
        let mut store = Self::in_memory();

        // Try to initialize database
        match Self::open(db_path).await {
            Ok(sqlite) => {
                info!("Database initialized successfully: {}", db_path);
                store.sqlite = Some(sqlite);
            }
            Err(e) => {
                warn!(
                    "Database initialization failed, using in-memory fallback: {}",
                    e
                );
            }
        }

        Ok(store)
    }

    /// Store that never touches disk.
    pub fn in_memory() -> Self {
        Self {
            sqlite: None,
            fallback: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_persistent(&self) -> bool {
        self.sqlite.is_some()
    }

    async fn open(db_path: &str) -> Result<Sqlite> {
        let db = Builder::new_local(db_path).build().await?;
        let conn = db.connect()?;
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS conversation_turns (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at DATETIME NOT NULL
            )
            "#,
            (),
        )
        .await?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_conversation_turns_session ON conversation_turns (session_id, id)",
            (),
        )
        .await?;

        Ok(Sqlite {
            _db: db,
            conn,
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    async fn get_from_db(&self, sqlite: &Sqlite, session_id: &str) -> Result<Conversation> {
        let mut rows = sqlite
            .conn
            .query(
                "SELECT role, content, created_at FROM conversation_turns WHERE session_id = ? ORDER BY id ASC",
                [session_id],
            )
            .await?;

        let mut turns = Vec::new();
        while let Some(row) = rows.next().await? {
            let role_str: String = row.get(0)?;
            let role = Role::parse(&role_str)
                .ok_or_else(|| Error::internal(format!("Unknown stored role: {role_str}")))?;
            let content_json: String = row.get(1)?;
            let content: TurnContent = serde_json::from_str(&content_json)?;
            let created_at_str: String = row.get(2)?;
            let created_at = chrono::DateTime::parse_from_rfc3339(&created_at_str)
                .map_err(|e| Error::internal(format!("Failed to parse timestamp: {e}")))?
                .with_timezone(&chrono::Utc);

            turns.push(ConversationTurn {
                role,
                content,
                created_at,
            });
        }

        Ok(Conversation::from_turns(turns))
    }

    async fn put_to_db(
        &self,
        sqlite: &Sqlite,
        session_id: &str,
        conversation: &Conversation,
    ) -> Result<()> {
        let _guard = sqlite.write_lock.lock().await;
        let tx = sqlite.conn.transaction().await?;
        let written = async {
            tx.execute(
                "DELETE FROM conversation_turns WHERE session_id = ?",
                [session_id],
            )
            .await?;
            for turn in conversation.turns() {
                let content = serde_json::to_string(&turn.content)?;
                tx.execute(
                    "INSERT INTO conversation_turns (session_id, role, content, created_at) VALUES (?, ?, ?, ?)",
                    (
                        session_id,
                        turn.role.as_str(),
                        content.as_str(),
                        turn.created_at.to_rfc3339(),
                    ),
                )
                .await?;
            }
            Ok::<(), Error>(())
        }
        .await;

        match written {
            Ok(()) => {
                tx.commit().await?;
                Ok(())
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    warn!("Rollback failed for session {}: {}", session_id, rollback);
                }
                Err(e)
            }
        }
    }

    async fn remove_from_db(&self, sqlite: &Sqlite, session_id: &str) -> Result<()> {
        let _guard = sqlite.write_lock.lock().await;
        sqlite
            .conn
            .execute(
                "DELETE FROM conversation_turns WHERE session_id = ?",
                [session_id],
            )
            .await?;
        Ok(())
    }

    fn fallback(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Conversation>>> {
        self.fallback
            .lock()
            .map_err(|e| Error::internal(format!("Mutex lock failed: {e}")))
    }
}

#[async_trait]
impl SessionStore for ConversationStore {
    async fn get(&self, session_id: &str) -> Result<Conversation> {
        // A fallback entry is newer than anything in the database.
        if let Some(conversation) = self.fallback()?.get(session_id).cloned() {
            debug!(
                "Retrieved {} turns from fallback for session: {}",
                conversation.len(),
                session_id
            );
            return Ok(conversation);
        }

        if let Some(ref sqlite) = self.sqlite {
            match self.get_from_db(sqlite, session_id).await {
                Ok(conversation) => {
                    debug!(
                        "Retrieved {} turns from database for session: {}",
                        conversation.len(),
                        session_id
                    );
                    return Ok(conversation);
                }
                Err(e) => {
                    warn!("Failed to read from database: {}", e);
                }
            }
        }

        Ok(Conversation::default())
    }

    async fn put(&self, session_id: &str, conversation: &Conversation) -> Result<()> {
        if let Some(ref sqlite) = self.sqlite {
            match self.put_to_db(sqlite, session_id, conversation).await {
                Ok(()) => {
                    debug!("Conversation saved to database: {}", session_id);
                    self.fallback()?.remove(session_id);
                    return Ok(());
                }
                Err(e) => {
                    warn!("Failed to save to database, using fallback: {}", e);
                }
            }
        }

        self.fallback()?
            .insert(session_id.to_string(), conversation.clone());
        Ok(())
    }

    async fn remove(&self, session_id: &str) -> Result<()> {
        if let Some(ref sqlite) = self.sqlite {
            if let Err(e) = self.remove_from_db(sqlite, session_id).await {
                warn!("Failed to delete from database: {}", e);
            }
        }

        // A failed write may have left a copy in the fallback.
        self.fallback()?.remove(session_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::TurnImage;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn sample_conversation() -> Conversation {
        let mut conversation = Conversation::new();
        conversation.push(ConversationTurn::user(TurnContent::text("Hello")));
        conversation.push(ConversationTurn::assistant("Hi there!"));
        conversation
    }

    #[tokio::test]
    async fn test_file_database_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let store = ConversationStore::new(&db_path.to_string_lossy())
            .await
            .unwrap();
        assert!(store.is_persistent());

        let mut conversation = sample_conversation();
        conversation.push(ConversationTurn::user(
            TurnContent::text("and this?").with_image(TurnImage {
                mime_type: "image/jpeg".to_string(),
                data: "AQID".to_string(),
            }),
        ));
        store.put("s1", &conversation).await.unwrap();

        let loaded = store.get("s1").await.unwrap();
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded.turns()[0].role, Role::User);
        assert_eq!(loaded.turns()[1].content.text.as_deref(), Some("Hi there!"));
        assert_eq!(
            loaded.turns()[2].content.image.as_ref().unwrap().data,
            "AQID"
        );
        assert_eq!(loaded.turns()[0].created_at, conversation.turns()[0].created_at);
    }

    #[tokio::test]
    async fn test_put_replaces_previous_conversation() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let store = ConversationStore::new(&db_path.to_string_lossy())
            .await
            .unwrap();

        store.put("s1", &sample_conversation()).await.unwrap();
        let mut shorter = Conversation::new();
        shorter.push(ConversationTurn::user(TurnContent::text("only")));
        store.put("s1", &shorter).await.unwrap();

        let loaded = store.get("s1").await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.turns()[0].content.text.as_deref(), Some("only"));
    }

    #[tokio::test]
    async fn test_fallback_storage_when_db_fails() {
        let store = ConversationStore::new("/invalid/path/to/database.db")
            .await
            .unwrap();
        assert!(!store.is_persistent());

        store.put("fallback", &sample_conversation()).await.unwrap();
        assert_eq!(store.get("fallback").await.unwrap().len(), 2);

        store.remove("fallback").await.unwrap();
        assert!(store.get("fallback").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_write_is_not_shadowed_by_stale_row() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let store = ConversationStore::new(&db_path.to_string_lossy())
            .await
            .unwrap();

        store.put("s1", &sample_conversation()).await.unwrap();

        store
            .sqlite
            .as_ref()
            .unwrap()
            .conn
            .execute(
                "CREATE TRIGGER block_writes BEFORE INSERT ON conversation_turns BEGIN SELECT RAISE(ABORT, 'read only'); END",
                (),
            )
            .await
            .unwrap();

        let mut longer = sample_conversation();
        longer.push(ConversationTurn::user(TurnContent::text("still there?")));
        store.put("s1", &longer).await.unwrap();

        let loaded = store.get("s1").await.unwrap();
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded.turns()[2].content.text.as_deref(), Some("still there?"));

        store
            .sqlite
            .as_ref()
            .unwrap()
            .conn
            .execute("DROP TRIGGER block_writes", ())
            .await
            .unwrap();
        store.put("s1", &sample_conversation()).await.unwrap();
        assert_eq!(store.get("s1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let store = ConversationStore::in_memory();
        store.put("a", &sample_conversation()).await.unwrap();

        assert_eq!(store.get("a").await.unwrap().len(), 2);
        assert!(store.get("b").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_puts_to_different_sessions() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let store = Arc::new(
            ConversationStore::new(&db_path.to_string_lossy())
                .await
                .unwrap(),
        );

        let mut handles = vec![];
        for i in 0..10 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let mut conversation = Conversation::new();
                conversation.push(ConversationTurn::user(TurnContent::text(format!("m{i}"))));
                store.put(&format!("session-{i}"), &conversation).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        for i in 0..10 {
            let loaded = store.get(&format!("session-{i}")).await.unwrap();
            assert_eq!(loaded.len(), 1);
            assert_eq!(
                loaded.turns()[0].content.text.as_deref(),
                Some(format!("m{i}").as_str())
            );
        }
    }
}
