//! Persistent backend on SQLite.
//!
//! Documents live in a single `documents` table as JSON text. Queries are
//! translated to `json_extract` comparisons; field mutations are applied in
//! Rust inside a SQLite transaction so each commit is all-or-nothing.
//!
//! rusqlite is synchronous, so every call runs on the blocking pool behind a
//! mutex.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use directories::ProjectDirs;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

use crate::document::{stage_writes, DocKey, Document, Fields, Staged, Write};
use crate::error::{Result, StoreError};
use crate::feed::{Change, ChangeFeed};
use crate::migrations;
use crate::query::{Direction, Query};
use crate::store::{DocumentStore, TxFn};

pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    feed: ChangeFeed,
}

impl SqliteStore {
    /// Open (or create) the default application database.
    ///
    /// The database file is placed in the platform-appropriate data directory:
    /// - Linux:   `~/.local/share/waypost/waypost.db`
    /// - macOS:   `~/Library/Application Support/com.waypost.waypost/waypost.db`
    /// - Windows: `{FOLDERID_RoamingAppData}\waypost\waypost\data\waypost.db`
    pub fn open_default() -> Result<Self> {
        Self::open_at(&default_path()?)
    }

    /// Open (or create) a database at an explicit path.
    pub fn open_at(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        tracing::info!(path = %path.display(), "opening database");
        Self::from_conn(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_conn(Connection::open_in_memory()?)
    }

    fn from_conn(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        migrations::run_migrations(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            feed: ChangeFeed::new(),
        })
    }

    /// Return the filesystem path of the open database (if any).
    pub fn path(&self) -> Option<PathBuf> {
        let conn = self.conn.lock().ok()?;
        conn.path()
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|e| StoreError::Internal(format!("Lock poisoned: {e}")))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| StoreError::Internal(format!("Blocking task failed: {e}")))?
    }
}

/// Platform data path for the database file.
pub fn default_path() -> Result<PathBuf> {
    let project_dirs =
        ProjectDirs::from("com", "waypost", "waypost").ok_or(StoreError::NoDataDir)?;
    Ok(project_dirs.data_dir().join("waypost.db"))
}

fn read_fields(conn: &Connection, key: &DocKey) -> Result<Option<Fields>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT data FROM documents WHERE collection = ?1 AND id = ?2",
            params![key.collection, key.id],
            |row| row.get(0),
        )
        .optional()?;
    raw.map(|text| parse_fields(key, &text)).transpose()
}

fn parse_fields(key: &DocKey, text: &str) -> Result<Fields> {
    match serde_json::from_str(text)? {
        Value::Object(map) => Ok(map),
        _ => Err(StoreError::NotAnObject(key.to_string())),
    }
}

fn write_staged(conn: &Connection, staged: &[Staged]) -> Result<()> {
    let now = now_millis();
    for s in staged {
        match &s.after {
            Some(data) => {
                conn.execute(
                    "INSERT OR REPLACE INTO documents (collection, id, data, updated_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![
                        s.key.collection,
                        s.key.id,
                        serde_json::to_string(data)?,
                        now
                    ],
                )?;
            }
            None => {
                conn.execute(
                    "DELETE FROM documents WHERE collection = ?1 AND id = ?2",
                    params![s.key.collection, s.key.id],
                )?;
            }
        }
    }
    Ok(())
}

fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

fn json_path(field: &str) -> Result<String> {
    if field.is_empty() || !field.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(StoreError::UnsupportedQuery(format!(
            "field name '{field}'"
        )));
    }
    Ok(format!("'$.{field}'"))
}

fn to_sql_value(field: &str, value: &Value) -> Result<SqlValue> {
    match value {
        Value::String(s) => Ok(SqlValue::Text(s.clone())),
        // json_extract yields 0/1 for JSON booleans
        Value::Bool(b) => Ok(SqlValue::Integer(i64::from(*b))),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Ok(SqlValue::Integer(i)),
            None => Ok(SqlValue::Real(n.as_f64().unwrap_or(f64::NAN))),
        },
        _ => Err(StoreError::UnsupportedQuery(format!(
            "non-scalar equality on '{field}'"
        ))),
    }
}

fn run_query(conn: &Connection, query: &Query) -> Result<Vec<Document>> {
    let mut sql = String::from("SELECT id, data FROM documents WHERE collection = ?");
    let mut args: Vec<SqlValue> = vec![SqlValue::Text(query.collection.clone())];

    for (field, value) in &query.filters {
        sql.push_str(&format!(" AND json_extract(data, {}) = ?", json_path(field)?));
        args.push(to_sql_value(field, value)?);
    }

    match &query.order_by {
        Some((field, direction)) => {
            let dir = match direction {
                Direction::Ascending => "ASC",
                Direction::Descending => "DESC",
            };
            sql.push_str(&format!(
                " ORDER BY json_extract(data, {}) {dir}, id ASC",
                json_path(field)?
            ));
        }
        None => sql.push_str(" ORDER BY id ASC"),
    }

    if let Some(limit) = query.limit {
        sql.push_str(" LIMIT ?");
        args.push(SqlValue::Integer(limit as i64));
    }

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(args.iter()), |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;

    let mut docs = Vec::new();
    for row in rows {
        let (id, text) = row?;
        let key = DocKey::new(query.collection.clone(), id);
        let data = parse_fields(&key, &text)?;
        docs.push(Document { key, data });
    }
    Ok(docs)
}

fn commit_staged(conn: &mut Connection, writes: Vec<Write>) -> Result<Vec<Change>> {
    let tx = conn.transaction()?;
    let staged = stage_writes(|key| read_fields(&tx, key), writes)?;
    write_staged(&tx, &staged)?;
    tx.commit()?;
    Ok(staged.iter().filter_map(Change::from_staged).collect())
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn get(&self, key: &DocKey) -> Result<Option<Document>> {
        let key = key.clone();
        self.with_conn(move |conn| {
            Ok(read_fields(conn, &key)?.map(|data| Document { key, data }))
        })
        .await
    }

    async fn query(&self, query: &Query) -> Result<Vec<Document>> {
        let query = query.clone();
        self.with_conn(move |conn| run_query(conn, &query)).await
    }

    async fn commit(&self, writes: Vec<Write>) -> Result<Vec<Change>> {
        let changes = self
            .with_conn(move |conn| commit_staged(conn, writes))
            .await?;
        self.feed.publish(&changes);
        Ok(changes)
    }

    async fn transaction(&self, reads: Vec<DocKey>, body: TxFn) -> Result<Vec<Change>> {
        let changes = self
            .with_conn(move |conn| {
                let tx = conn.transaction()?;
                let mut snapshot = Vec::with_capacity(reads.len());
                for key in reads {
                    let data = read_fields(&tx, &key)?;
                    snapshot.push(data.map(|data| Document { key, data }));
                }
                // Dropping `tx` on the error path rolls back.
                let writes = body(&snapshot)?;
                let staged = stage_writes(|key| read_fields(&tx, key), writes)?;
                write_staged(&tx, &staged)?;
                tx.commit()?;
                Ok(staged
                    .iter()
                    .filter_map(Change::from_staged)
                    .collect::<Vec<_>>())
            })
            .await?;
        self.feed.publish(&changes);
        Ok(changes)
    }

    fn changes(&self) -> &ChangeFeed {
        &self.feed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::FieldOp;
    use serde_json::json;

    fn body(v: Value) -> Fields {
        v.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn open_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("test.db");
        let key = DocKey::new("users", "alice");

        {
            let store = SqliteStore::open_at(&path).expect("should open");
            assert!(store.path().is_some());
            store.set(&key, body(json!({ "name": "Alice" }))).await.unwrap();
        }

        let reopened = SqliteStore::open_at(&path).unwrap();
        let doc = reopened.get(&key).await.unwrap().unwrap();
        assert_eq!(doc.data["name"], "Alice");
    }

    #[tokio::test]
    async fn query_matches_strings_and_booleans() {
        let store = SqliteStore::open_in_memory().unwrap();
        for (id, read, ts) in [("n1", false, 10), ("n2", true, 30), ("n3", false, 20)] {
            store
                .set(
                    &DocKey::new("notifications", id),
                    body(json!({ "receiverId": "bob", "isRead": read, "timestamp": ts })),
                )
                .await
                .unwrap();
        }
        store
            .set(
                &DocKey::new("notifications", "other"),
                body(json!({ "receiverId": "eve", "isRead": false, "timestamp": 99 })),
            )
            .await
            .unwrap();

        let unread = store
            .query(
                &Query::collection("notifications")
                    .where_eq("receiverId", "bob")
                    .where_eq("isRead", false)
                    .order_by("timestamp", Direction::Descending),
            )
            .await
            .unwrap();
        let ids: Vec<_> = unread.iter().map(|d| d.key.id.as_str()).collect();
        assert_eq!(ids, vec!["n3", "n1"]);
    }

    #[tokio::test]
    async fn rejects_unsafe_field_names() {
        let store = SqliteStore::open_in_memory().unwrap();
        let err = store
            .query(&Query::collection("users").where_eq("name') OR 1=1 --", "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UnsupportedQuery(_)));
    }

    #[tokio::test]
    async fn failed_batch_rolls_back() {
        let store = SqliteStore::open_in_memory().unwrap();
        let a = DocKey::new("blocks", "a");
        let err = store
            .commit(vec![
                Write::Upsert(a.clone(), vec![FieldOp::union("blockedUserIds", "b")]),
                Write::Update(DocKey::new("blocks", "b"), vec![FieldOp::union("blockedByIds", "a")]),
            ])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
        assert!(store.get(&a).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn transaction_abort_leaves_documents() {
        let store = SqliteStore::open_in_memory().unwrap();
        let a = DocKey::new("friends", "a");
        store.set(&a, body(json!({ "friends": ["b"] }))).await.unwrap();

        let result = store
            .transaction(
                vec![a.clone()],
                Box::new(|_: &[Option<Document>]| Err(StoreError::Aborted("nope".into()))),
            )
            .await;
        assert!(matches!(result, Err(StoreError::Aborted(_))));
        assert!(store.get(&a).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn document_subscription_reports_removal() {
        let store = SqliteStore::open_in_memory().unwrap();
        let key = DocKey::new("friend_requests", "a_b");
        store.set(&key, body(json!({ "status": "pending" }))).await.unwrap();

        let (snapshot, mut sub) = store.subscribe_document(&key).await.unwrap();
        assert!(snapshot.is_some());

        store.delete(&key).await.unwrap();
        let change = sub.next().await.unwrap();
        assert_eq!(change.kind, crate::feed::ChangeKind::Removed);
        assert!(change.document.is_none());
    }
}
