use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use log::{debug, warn};
use rusqlite::{params, Connection};

use crate::api::models::{Conversation, ConversationId};
use crate::error::CacheError;

fn db_path() -> Option<PathBuf> {
    let proj = ProjectDirs::from("org", "murmur", "Murmur")?;
    Some(proj.data_dir().join("cache.sqlite"))
}

/// Last fetched conversation list, kept so the sidebar has something to show
/// before the first network load completes.
pub struct Cache {
    conn: Connection,
}

impl Cache {
    pub fn open_default() -> Result<Self, CacheError> {
        let path = db_path().ok_or(CacheError::NoDataDir)?;
        Self::open(&path)
    }

    pub fn open(path: &Path) -> Result<Self, CacheError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, CacheError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, CacheError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS conversations (
                id TEXT PRIMARY KEY,
                position INTEGER NOT NULL,
                raw_json TEXT NOT NULL
            );
            "#,
        )?;
        Ok(Self { conn })
    }

    /// Replaces the cached list, keeping server order.
    pub fn store_conversations(&mut self, conversations: &[Conversation]) -> Result<(), CacheError> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM conversations", [])?;
        for (position, conversation) in conversations.iter().enumerate() {
            let raw = serde_json::to_string(conversation)?;
            tx.execute(
                "INSERT INTO conversations (id, position, raw_json) VALUES (?1, ?2, ?3)",
                params![conversation.id.as_str(), position as i64, raw],
            )?;
        }
        tx.commit()?;
        debug!("cached {} conversations", conversations.len());
        Ok(())
    }

    /// Rows that no longer decode are skipped.
    pub fn conversations(&self, limit: Option<usize>) -> Result<Vec<Conversation>, CacheError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, raw_json FROM conversations ORDER BY position ASC LIMIT ?1")?;
        let lim = limit.map_or(-1, |l| l as i64);
        let rows = stmt.query_map(params![lim], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (id, raw) = row?;
            match serde_json::from_str(&raw) {
                Ok(conversation) => out.push(conversation),
                Err(err) => warn!("skipping cached conversation {id}: {err}"),
            }
        }
        Ok(out)
    }

    pub fn remove_conversation(&self, id: &ConversationId) -> Result<bool, CacheError> {
        let removed = self.conn.execute("DELETE FROM conversations WHERE id = ?1", params![id.as_str()])?;
        Ok(removed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn conversation(id: &str, unread: u32) -> Conversation {
        serde_json::from_value(json!({ "_id": id, "unreadCount": unread })).unwrap()
    }

    fn ids(list: &[Conversation]) -> Vec<&str> {
        list.iter().map(|c| c.id.as_str()).collect()
    }

    #[test]
    fn keeps_server_order_and_replaces_wholesale() {
        let mut cache = Cache::open_in_memory().unwrap();
        cache.store_conversations(&[conversation("b", 0), conversation("a", 3)]).unwrap();
        assert_eq!(ids(&cache.conversations(None).unwrap()), ["b", "a"]);

        cache.store_conversations(&[conversation("c", 0), conversation("b", 1)]).unwrap();
        let stored = cache.conversations(None).unwrap();
        assert_eq!(ids(&stored), ["c", "b"]);
        assert_eq!(stored[1].unread_count, 1);
        assert_eq!(ids(&cache.conversations(Some(1)).unwrap()), ["c"]);
    }

    #[test]
    fn remove_drops_only_that_row() {
        let mut cache = Cache::open_in_memory().unwrap();
        cache.store_conversations(&[conversation("a", 0), conversation("b", 0)]).unwrap();
        let id = ConversationId::from("a");
        assert!(cache.remove_conversation(&id).unwrap());
        assert!(!cache.remove_conversation(&id).unwrap());
        assert_eq!(ids(&cache.conversations(None).unwrap()), ["b"]);
    }

    #[test]
    fn storing_the_same_list_twice_keeps_one_row_each() {
        let mut cache = Cache::open_in_memory().unwrap();
        let list = [conversation("a", 1), conversation("b", 0)];
        cache.store_conversations(&list).unwrap();
        cache.store_conversations(&list).unwrap();
        assert_eq!(ids(&cache.conversations(None).unwrap()), ["a", "b"]);
    }

    #[test]
    fn survives_reopen_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("cache.sqlite");
        Cache::open(&path).unwrap().store_conversations(&[conversation("a", 2)]).unwrap();

        let reopened = Cache::open(&path).unwrap();
        assert_eq!(reopened.conversations(None).unwrap()[0].unread_count, 2);
    }
}
